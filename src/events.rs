// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Outbound transfer-event channel.
//!
//! The transfer service and the confirmation watcher publish a
//! [`TransferEvent`] after every state transition; consumers (notification
//! senders, audit sinks) subscribe independently and never sit on the
//! transition path. Delivery is best-effort broadcast: a slow subscriber
//! drops lagged events rather than backpressuring the core.

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default capacity of the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// A transfer state transition, published after the ledger write committed.
#[derive(Debug, Clone)]
pub enum TransferEvent {
    Broadcasted {
        tx_id: String,
        account_id: String,
        chain_tx_id: String,
    },
    Confirmed {
        tx_id: String,
        account_id: String,
        chain_tx_id: String,
    },
    Failed {
        tx_id: String,
        account_id: String,
        reason: String,
    },
}

/// Handle for publishing and subscribing to transfer events.
#[derive(Clone)]
pub struct TransferEvents {
    sender: broadcast::Sender<TransferEvent>,
}

impl TransferEvents {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(DEFAULT_CAPACITY);
        Self { sender }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: TransferEvent) {
        if self.sender.send(event).is_err() {
            debug!("transfer event dropped: no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransferEvent> {
        self.sender.subscribe()
    }
}

impl Default for TransferEvents {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn the notification subscriber.
///
/// Stands in for a real delivery channel (email, push): it consumes events
/// and logs the message that would be sent.
pub fn spawn_notifier(events: &TransferEvents, shutdown: CancellationToken) {
    let mut receiver = events.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = receiver.recv() => match event {
                    Ok(TransferEvent::Broadcasted { tx_id, account_id, chain_tx_id }) => {
                        info!(
                            tx_id = %tx_id,
                            account_id = %account_id,
                            chain_tx_id = %chain_tx_id,
                            "notify: transfer sent, awaiting confirmation"
                        );
                    }
                    Ok(TransferEvent::Confirmed { tx_id, account_id, chain_tx_id }) => {
                        info!(
                            tx_id = %tx_id,
                            account_id = %account_id,
                            chain_tx_id = %chain_tx_id,
                            "notify: transfer confirmed"
                        );
                    }
                    Ok(TransferEvent::Failed { tx_id, account_id, reason }) => {
                        info!(
                            tx_id = %tx_id,
                            account_id = %account_id,
                            reason = %reason,
                            "notify: transfer failed"
                        );
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "notification subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                },
                _ = shutdown.cancelled() => return,
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let events = TransferEvents::new();
        let mut rx = events.subscribe();

        events.publish(TransferEvent::Broadcasted {
            tx_id: "t1".into(),
            account_id: "a1".into(),
            chain_tx_id: "c1".into(),
        });

        match rx.recv().await.unwrap() {
            TransferEvent::Broadcasted { tx_id, .. } => assert_eq!(tx_id, "t1"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_noop() {
        let events = TransferEvents::new();
        events.publish(TransferEvent::Failed {
            tx_id: "t1".into(),
            account_id: "a1".into(),
            reason: "rejected".into(),
        });
    }
}
