use anyhow::anyhow;
use async_nats::jetstream;
use async_nats::jetstream::consumer::pull;
use async_trait::async_trait;
use futures::StreamExt;

use crate::bus::{
    BusAck,
    BusConnector,
    BusMessage,
    BusSubscription,
};

/// Dials a durable, named JetStream pull consumer with `DeliverAll`
/// (replay) semantics and explicit ack, so stream position survives
/// controller restarts and unacked messages are redelivered on crash.
pub struct NatsBusConnector {
    url: String,
    stream_name: String,
    subject: String,
    consumer_name: String,
}

impl NatsBusConnector {
    pub fn new(url: impl Into<String>, stream_name: impl Into<String>, subject: impl Into<String>, consumer_name: impl Into<String>) -> Self {
        NatsBusConnector {
            url: url.into(),
            stream_name: stream_name.into(),
            subject: subject.into(),
            consumer_name: consumer_name.into(),
        }
    }
}

#[async_trait]
impl BusConnector for NatsBusConnector {
    async fn connect(&self) -> anyhow::Result<Box<dyn BusSubscription>> {
        let client = async_nats::connect(&self.url).await?;
        let js = jetstream::new(client);

        let stream = js
            .get_or_create_stream(jetstream::stream::Config {
                name: self.stream_name.clone(),
                subjects: vec![self.subject.clone()],
                ..Default::default()
            })
            .await?;

        let consumer = stream
            .get_or_create_consumer(&self.consumer_name, pull::Config {
                durable_name: Some(self.consumer_name.clone()),
                deliver_policy: jetstream::consumer::DeliverPolicy::All,
                ack_policy: jetstream::consumer::AckPolicy::Explicit,
                ..Default::default()
            })
            .await?;

        let messages = consumer.messages().await?;
        Ok(Box::new(NatsBusSubscription { messages }))
    }
}

struct NatsBusSubscription {
    messages: pull::Stream,
}

#[async_trait]
impl BusSubscription for NatsBusSubscription {
    async fn next(&mut self) -> anyhow::Result<Option<BusMessage>> {
        match self.messages.next().await {
            None => Ok(None),
            Some(Err(err)) => Err(anyhow!("jetstream pull error: {err}")),
            Some(Ok(msg)) => {
                let payload = msg.payload.clone();
                let ack = BusAck::new(move || Box::pin(async move { msg.ack().await.map_err(|e| anyhow!("ack failed: {e}")) }));
                Ok(Some(BusMessage::new(payload, ack)))
            },
        }
    }
}
