use std::collections::VecDeque;
use std::sync::atomic::{
    AtomicUsize,
    Ordering,
};
use std::sync::{
    Arc,
    Mutex,
};

use async_trait::async_trait;
use bytes::Bytes;
use rigctl_watch::{
    BusAck,
    BusConnector,
    BusMessage,
    BusSubscription,
};

/// Replays a fixed sequence of raw payloads on first connect, then ends
/// the subscription (`next` returns `Ok(None)`), so a test that never
/// reconnects sees exactly the messages it queued.
pub struct FakeBusConnector {
    payloads: Mutex<VecDeque<Bytes>>,
    acked: Arc<AtomicUsize>,
}

impl FakeBusConnector {
    pub fn with_messages(payloads: Vec<Vec<u8>>, acked: Arc<AtomicUsize>) -> Self {
        FakeBusConnector {
            payloads: Mutex::new(payloads.into_iter().map(Bytes::from).collect()),
            acked,
        }
    }
}

#[async_trait]
impl BusConnector for FakeBusConnector {
    async fn connect(&self) -> anyhow::Result<Box<dyn BusSubscription>> {
        let queue = std::mem::take(&mut *self.payloads.lock().unwrap());
        Ok(Box::new(FakeBusSubscription {
            queue: Mutex::new(queue),
            acked: self.acked.clone(),
        }))
    }
}

pub struct FakeBusSubscription {
    queue: Mutex<VecDeque<Bytes>>,
    acked: Arc<AtomicUsize>,
}

#[async_trait]
impl BusSubscription for FakeBusSubscription {
    async fn next(&mut self) -> anyhow::Result<Option<BusMessage>> {
        let payload = self.queue.lock().unwrap().pop_front();
        match payload {
            None => Ok(None),
            Some(payload) => {
                let acked = self.acked.clone();
                let ack = BusAck::new(move || {
                    Box::pin(async move {
                        acked.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                });
                Ok(Some(BusMessage::new(payload, ack)))
            },
        }
    }
}
