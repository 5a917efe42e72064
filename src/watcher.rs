// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Confirmation Watcher
//!
//! Background task that reconciles `Broadcasted` ledger transactions against
//! the gateway's execution receipts and promotes them to `Confirmed` or
//! `Failed`.
//!
//! ## Strategy
//!
//! Every tick the watcher:
//! 1. Loads up to a bounded batch of `Broadcasted` rows, oldest first.
//! 2. Looks up each receipt by chain transaction id.
//! 3. Applies the terminal transition via a conditional write keyed on the
//!    row still being `Broadcasted`, then publishes a transfer event.
//!
//! A missing receipt or a failed lookup leaves the row untouched: retry is
//! unbounded by design, to tolerate arbitrary confirmation latency. Rows are
//! reconciled on a later tick; a permanently unconfirmable transaction stays
//! `Broadcasted` and is visible to operators through the tick logs.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown. Ticks
//! are not reentrant — the next tick starts only after the previous one
//! finished or the tick-duration guard tripped.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::{TransferEvent, TransferEvents};
use crate::gateway::ChainGateway;
use crate::storage::{LedgerDb, LedgerDbError, TxState};

/// Reconciles broadcasted transfers with on-chain receipts.
pub struct ConfirmationWatcher {
    db: Arc<LedgerDb>,
    gateway: Arc<dyn ChainGateway>,
    events: TransferEvents,
    interval: Duration,
    batch: usize,
    tick_timeout: Duration,
}

impl ConfirmationWatcher {
    pub fn new(
        db: Arc<LedgerDb>,
        gateway: Arc<dyn ChainGateway>,
        events: TransferEvents,
        interval: Duration,
        batch: usize,
        tick_timeout: Duration,
    ) -> Self {
        Self {
            db,
            gateway,
            events,
            interval,
            batch,
            tick_timeout,
        }
    }

    /// Run the watcher loop until the cancellation token is triggered.
    ///
    /// This should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(watcher.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            batch = self.batch,
            "confirmation watcher starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("confirmation watcher shutting down");
                return;
            }

            if tokio::time::timeout(self.tick_timeout, self.tick())
                .await
                .is_err()
            {
                warn!(
                    timeout_secs = self.tick_timeout.as_secs(),
                    "watcher tick exceeded duration guard"
                );
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("confirmation watcher shutting down");
                    return;
                }
            }
        }
    }

    /// Execute one reconciliation sweep.
    async fn tick(&self) {
        let rows = match self.db.transactions_in_state(TxState::Broadcasted, self.batch) {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "watcher failed to load broadcasted transactions");
                return;
            }
        };

        if rows.is_empty() {
            return;
        }

        debug!(count = rows.len(), "watcher examining broadcasted transfers");

        for tx in rows {
            let Some(chain_tx_id) = tx.chain_tx_id.clone() else {
                // Broadcasted rows always carry a chain txid; a row without
                // one is corrupt and must not be touched here.
                warn!(tx_id = %tx.tx_id, "broadcasted row missing chain txid");
                continue;
            };

            match self.gateway.receipt(&chain_tx_id).await {
                Ok(Some(receipt)) if receipt.success => {
                    match self.db.transition_transaction(&tx.tx_id, TxState::Broadcasted, |t| {
                        t.mark_confirmed(receipt.raw.clone())
                    }) {
                        Ok(_) => {
                            info!(tx_id = %tx.tx_id, chain_tx_id = %chain_tx_id, "transfer confirmed");
                            self.events.publish(TransferEvent::Confirmed {
                                tx_id: tx.tx_id.clone(),
                                account_id: tx.account_id.clone(),
                                chain_tx_id,
                            });
                        }
                        Err(LedgerDbError::StateConflict { actual, .. }) => {
                            // Another actor already finalized this row.
                            debug!(tx_id = %tx.tx_id, state = %actual, "confirmation lost transition race");
                        }
                        Err(e) => {
                            warn!(tx_id = %tx.tx_id, error = %e, "failed to persist confirmation");
                        }
                    }
                }
                Ok(Some(receipt)) => {
                    let reason = "transaction failed on chain".to_string();
                    match self.db.transition_transaction(&tx.tx_id, TxState::Broadcasted, |t| {
                        t.mark_failed(Some("chain".to_string()), reason.clone())
                    }) {
                        Ok(_) => {
                            warn!(
                                tx_id = %tx.tx_id,
                                chain_tx_id = %chain_tx_id,
                                receipt = %receipt.raw,
                                "transfer failed on chain"
                            );
                            self.events.publish(TransferEvent::Failed {
                                tx_id: tx.tx_id.clone(),
                                account_id: tx.account_id.clone(),
                                reason,
                            });
                        }
                        Err(LedgerDbError::StateConflict { actual, .. }) => {
                            debug!(tx_id = %tx.tx_id, state = %actual, "failure lost transition race");
                        }
                        Err(e) => {
                            warn!(tx_id = %tx.tx_id, error = %e, "failed to persist chain failure");
                        }
                    }
                }
                Ok(None) => {
                    // Not yet mined/indexed; retry on a later tick.
                    debug!(tx_id = %tx.tx_id, chain_tx_id = %chain_tx_id, "receipt not yet available");
                }
                Err(e) => {
                    // Inconclusive lookup; the row must not be failed on
                    // this basis alone.
                    warn!(tx_id = %tx.tx_id, error = %e, "receipt lookup failed, will retry");
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
