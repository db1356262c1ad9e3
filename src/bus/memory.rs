use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::bail;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use crate::bus::{Bus, BusMessage, BusSubscription};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// In-process bus with exact subject matching.
#[derive(Default)]
pub struct MemoryBus {
    subscribers: Mutex<HashMap<String, Vec<mpsc::Sender<BusMessage>>>>,
    next_inbox: AtomicU64,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    async fn deliver(&self, subject: &str, reply: Option<String>, payload: Bytes) -> usize {
        let senders = {
            let mut subscribers = self.subscribers.lock();
            let Some(senders) = subscribers.get_mut(subject) else {
                return 0;
            };
            senders.retain(|s| !s.is_closed());
            senders.clone()
        };
        let mut delivered = 0;
        for sender in senders {
            let msg = BusMessage {
                subject: subject.to_string(),
                reply: reply.clone(),
                payload: payload.clone(),
            };
            if sender.send(msg).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }
}

#[async_trait::async_trait]
impl Bus for MemoryBus {
    async fn publish(&self, subject: &str, payload: Bytes) -> anyhow::Result<()> {
        self.deliver(subject, None, payload).await;
        Ok(())
    }

    async fn subscribe(&self, subject: &str) -> anyhow::Result<BusSubscription> {
        let (sender, receiver) = mpsc::channel(1024);
        self.subscribers
            .lock()
            .entry(subject.to_string())
            .or_default()
            .push(sender);
        Ok(BusSubscription {
            stream: ReceiverStream::new(receiver),
        })
    }

    async fn request(&self, subject: &str, payload: Bytes) -> anyhow::Result<Bytes> {
        let inbox = format!("_INBOX.{}", self.next_inbox.fetch_add(1, Ordering::Relaxed));
        let mut replies = self.subscribe(&inbox).await?;
        let delivered = self.deliver(subject, Some(inbox.clone()), payload).await;
        let reply = if delivered == 0 {
            None
        } else {
            tokio::time::timeout(REQUEST_TIMEOUT, replies.stream.next()).await.ok().flatten()
        };
        self.subscribers.lock().remove(&inbox);
        match reply {
            Some(message) => Ok(message.payload),
            None if delivered == 0 => bail!("no responders on {subject}"),
            None => bail!("request on {subject} timed out"),
        }
    }
}
