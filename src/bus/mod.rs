use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

pub mod memory;
pub mod nats;

#[async_trait::async_trait]
pub trait Bus: Send + Sync {
    async fn publish(&self, subject: &str, payload: Bytes) -> anyhow::Result<()>;
    async fn subscribe(&self, subject: &str) -> anyhow::Result<BusSubscription>;
    async fn request(&self, subject: &str, payload: Bytes) -> anyhow::Result<Bytes>;
}

#[derive(Debug, Clone)]
pub struct BusMessage {
    pub subject: String,
    pub reply: Option<String>,
    pub payload: Bytes,
}

impl BusMessage {
    pub fn decode<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.payload)
    }
}

pub struct BusSubscription {
    pub stream: tokio_stream::wrappers::ReceiverStream<BusMessage>,
}

pub async fn request_json<Req, Resp>(bus: &dyn Bus, subject: &str, request: &Req) -> anyhow::Result<Resp>
where
    Req: Serialize + ?Sized,
    Resp: DeserializeOwned,
{
    let payload = serde_json::to_vec(request)?;
    let reply = bus.request(subject, Bytes::from(payload)).await?;
    Ok(serde_json::from_slice(&reply)?)
}

pub async fn publish_json<T: Serialize + ?Sized>(bus: &dyn Bus, subject: &str, value: &T) -> anyhow::Result<()> {
    let payload = serde_json::to_vec(value)?;
    bus.publish(subject, Bytes::from(payload)).await
}
