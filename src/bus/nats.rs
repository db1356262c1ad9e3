use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use crate::bus::{Bus, BusMessage, BusSubscription};

pub struct NatsBus {
    client: async_nats::Client,
}

impl NatsBus {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = async_nats::connect(url).await?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Bus for NatsBus {
    async fn publish(&self, subject: &str, payload: Bytes) -> anyhow::Result<()> {
        self.client.publish(subject.to_string(), payload).await?;
        Ok(())
    }

    async fn subscribe(&self, subject: &str) -> anyhow::Result<BusSubscription> {
        let (sender, receiver) = mpsc::channel(1024);
        let mut subscriber = self.client.subscribe(subject.to_string()).await?;
        let subject = subject.to_string();
        tokio::spawn(async move {
            while let Some(message) = subscriber.next().await {
                let msg = BusMessage {
                    subject: message.subject.to_string(),
                    reply: message.reply.map(|reply| reply.to_string()),
                    payload: message.payload,
                };
                if sender.send(msg).await.is_err() {
                    break;
                }
            }
            debug!(%subject, "nats subscription closed");
        });
        Ok(BusSubscription {
            stream: ReceiverStream::new(receiver),
        })
    }

    async fn request(&self, subject: &str, payload: Bytes) -> anyhow::Result<Bytes> {
        let message = self.client.request(subject.to_string(), payload).await?;
        Ok(message.payload)
    }
}
