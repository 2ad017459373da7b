use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;

/// One undelivered-ack message pulled off the bus.
///
/// `ack` is consumed exactly once, after the message has been offered to
/// the lifecycle-event channel — never before, so a crash between receipt
/// and channel-offer causes redelivery rather than silent loss.
pub struct BusMessage {
    pub payload: Bytes,
    ack: BusAck,
}

impl BusMessage {
    pub fn new(payload: Bytes, ack: BusAck) -> Self {
        BusMessage { payload, ack }
    }

    pub async fn ack(self) -> anyhow::Result<()> {
        self.ack.call().await
    }
}

pub struct BusAck(Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>);

impl BusAck {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send + 'static,
    {
        BusAck(Box::new(f))
    }

    async fn call(self) -> anyhow::Result<()> {
        (self.0)().await
    }
}

/// A live subscription to the mutation stream, already positioned per the
/// durable consumer's stored offset.
#[async_trait]
pub trait BusSubscription: Send {
    /// Returns the next message, or `Ok(None)` when the subscription has
    /// ended and should be reconnected.
    async fn next(&mut self) -> anyhow::Result<Option<BusMessage>>;
}

/// Establishes a fresh [`BusSubscription`]. Reconnect/backoff lives one
/// layer up in [`crate::watcher::EventWatcher`]; this trait only knows how
/// to dial once.
#[async_trait]
pub trait BusConnector: Send + Sync {
    async fn connect(&self) -> anyhow::Result<Box<dyn BusSubscription>>;
}
