use std::time::Duration;

use rigctl_core::constants::{
    BUS_BACKOFF_INITIAL_SECS,
    BUS_BACKOFF_MAX_SECS,
};
use rigctl_core::errors::*;
use rigctl_core::model::LifecycleEvent;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::*;

use crate::bus::BusConnector;
use crate::mutation::map_mutation;

err_impl! {WatcherError,
    #[error("watcher stopped: {0}")]
    WatcherStopped(String),
}

/// Subscribes to the durable mutation stream and emits [`LifecycleEvent`]s
/// on a bounded channel. `Start` blocks until cancellation; `Events` is
/// called once, up front, to take the receiving half.
pub struct EventWatcher<C: BusConnector> {
    connector: C,
    tx: mpsc::Sender<LifecycleEvent>,
}

impl<C: BusConnector> EventWatcher<C> {
    pub fn new(connector: C, channel_capacity: usize) -> (Self, mpsc::Receiver<LifecycleEvent>) {
        let (tx, rx) = mpsc::channel(channel_capacity);
        (EventWatcher { connector, tx }, rx)
    }

    #[instrument(skip_all)]
    pub async fn start(&self, cancel: CancellationToken) -> EmptyResult {
        let mut backoff_secs = BUS_BACKOFF_INITIAL_SECS;

        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            match self.connector.connect().await {
                Ok(mut sub) => {
                    backoff_secs = BUS_BACKOFF_INITIAL_SECS;
                    loop {
                        tokio::select! {
                            _ = cancel.cancelled() => return Ok(()),
                            result = sub.next() => {
                                match result {
                                    Ok(Some(msg)) => self.handle_message(msg).await,
                                    Ok(None) => {
                                        warn!("bus subscription ended, reconnecting");
                                        break;
                                    },
                                    Err(err) => {
                                        warn!("bus subscription error, reconnecting: {err:?}");
                                        break;
                                    },
                                }
                            },
                        }
                    }
                },
                Err(err) => {
                    warn!("failed to connect to mutation bus, retrying in {backoff_secs}s: {err:?}");
                },
            }

            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(Duration::from_secs(backoff_secs)) => {},
            }
            backoff_secs = (backoff_secs * 2).min(BUS_BACKOFF_MAX_SECS);
        }
    }

    async fn handle_message(&self, msg: crate::bus::BusMessage) {
        let event = match serde_json::from_slice::<crate::mutation::MutationEnvelope>(&msg.payload) {
            Ok(env) => map_mutation(&env),
            Err(err) => {
                debug!("malformed mutation-bus payload, discarding: {err}");
                None
            },
        };

        if let Some(event) = event {
            if self.tx.try_send(event).is_err() {
                warn!("lifecycle event channel full, dropping event");
            }
        }

        if let Err(err) = msg.ack().await {
            warn!("failed to ack bus message: {err:?}");
        }
    }
}
