// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Money movement: one custodial transfer from validation to broadcast.
//!
//! Each step is a commit point: validate → resolve account → fresh
//! availability check → decrypt key → insert `Pending` row → submit to the
//! gateway. An explicit gateway rejection marks the row `Failed` and is never
//! retried automatically. A transport failure leaves the row `Pending` —
//! the outcome on-chain is unknown and nothing may be re-broadcast.
//!
//! The availability pre-check is not atomic with the ledger insert: the
//! deployment runs a single writer process per store (see DESIGN.md).
//!
//! Callers may supply an idempotency token. Within the retention window a
//! duplicate token replays the first recorded outcome verbatim instead of
//! re-submitting, shielding client retries from double spends.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use lru::LruCache;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::amount::validate_amount;
use crate::balance::BalanceCalculator;
use crate::error::CoreError;
use crate::events::{TransferEvent, TransferEvents};
use crate::gateway::{ChainGateway, GatewayError};
use crate::storage::{LedgerDb, LedgerTransaction, TxState};
use crate::vault::KeyVault;

/// Max number of idempotency tokens retained at once.
const IDEMPOTENCY_CAPACITY: usize = 1024;

/// Outcome of a send, as returned to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct TransferReceipt {
    pub tx_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_tx_id: Option<String>,
    pub state: TxState,
}

// =============================================================================
// Idempotency
// =============================================================================

#[derive(Clone)]
enum CachedOutcome {
    Success(TransferReceipt),
    Failure {
        kind: FailureKind,
        code: Option<String>,
        message: String,
    },
}

#[derive(Clone, Copy)]
enum FailureKind {
    InvalidAmount,
    InvalidAddress,
    NotFound,
    InsufficientFunds,
    Conflict,
    GatewayFailure,
    GatewayUnavailable,
    Integrity,
    Internal,
}

impl CachedOutcome {
    fn record(result: &Result<TransferReceipt, CoreError>) -> Self {
        match result {
            Ok(receipt) => CachedOutcome::Success(receipt.clone()),
            Err(err) => {
                let (kind, code) = match err {
                    CoreError::InvalidAmount(_) => (FailureKind::InvalidAmount, None),
                    CoreError::InvalidAddress(_) => (FailureKind::InvalidAddress, None),
                    CoreError::NotFound(_) => (FailureKind::NotFound, None),
                    CoreError::InsufficientFunds => (FailureKind::InsufficientFunds, None),
                    CoreError::Conflict(_) => (FailureKind::Conflict, None),
                    CoreError::GatewayFailure { code, .. } => {
                        (FailureKind::GatewayFailure, code.clone())
                    }
                    CoreError::GatewayUnavailable(_) => (FailureKind::GatewayUnavailable, None),
                    CoreError::IntegrityError(_) => (FailureKind::Integrity, None),
                    CoreError::Vault(_) | CoreError::Store(_) => (FailureKind::Internal, None),
                };
                CachedOutcome::Failure {
                    kind,
                    code,
                    message: err.to_string(),
                }
            }
        }
    }

    fn replay(self) -> Result<TransferReceipt, CoreError> {
        match self {
            CachedOutcome::Success(receipt) => Ok(receipt),
            CachedOutcome::Failure {
                kind,
                code,
                message,
            } => Err(match kind {
                FailureKind::InvalidAmount => CoreError::InvalidAmount(message),
                FailureKind::InvalidAddress => CoreError::InvalidAddress(message),
                FailureKind::NotFound => CoreError::NotFound(message),
                FailureKind::InsufficientFunds => CoreError::InsufficientFunds,
                FailureKind::Conflict => CoreError::Conflict(message),
                FailureKind::GatewayFailure => CoreError::GatewayFailure {
                    code,
                    reason: message,
                },
                FailureKind::GatewayUnavailable => CoreError::GatewayUnavailable(message),
                FailureKind::Integrity => CoreError::IntegrityError(message),
                // An internal first failure replays as a conflict rather
                // than re-executing under the same token.
                FailureKind::Internal => CoreError::Conflict(message),
            }),
        }
    }
}

struct IdempotencyEntry {
    outcome: CachedOutcome,
    inserted_at: Instant,
}

/// TTL'd cache of recorded send outcomes, keyed by caller token.
pub struct IdempotencyCache {
    entries: Mutex<LruCache<String, IdempotencyEntry>>,
    ttl: Duration,
}

impl IdempotencyCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(
                NonZeroUsize::new(IDEMPOTENCY_CAPACITY).unwrap_or(NonZeroUsize::new(1).unwrap()),
            )),
            ttl,
        }
    }

    fn get(&self, key: &str) -> Option<CachedOutcome> {
        let mut entries = self.entries.lock().ok()?;
        if let Some(entry) = entries.get(key) {
            if entry.inserted_at.elapsed() <= self.ttl {
                return Some(entry.outcome.clone());
            }
            entries.pop(key);
        }
        None
    }

    fn store(&self, key: &str, outcome: CachedOutcome) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.put(
                key.to_string(),
                IdempotencyEntry {
                    outcome,
                    inserted_at: Instant::now(),
                },
            );
        }
    }
}

// =============================================================================
// TransferService
// =============================================================================

/// Orchestrates custodial transfers.
pub struct TransferService {
    db: Arc<LedgerDb>,
    gateway: Arc<dyn ChainGateway>,
    vault: Arc<KeyVault>,
    balances: Arc<BalanceCalculator>,
    events: TransferEvents,
    idempotency: IdempotencyCache,
}

impl TransferService {
    pub fn new(
        db: Arc<LedgerDb>,
        gateway: Arc<dyn ChainGateway>,
        vault: Arc<KeyVault>,
        balances: Arc<BalanceCalculator>,
        events: TransferEvents,
        idempotency_ttl: Duration,
    ) -> Self {
        Self {
            db,
            gateway,
            vault,
            balances,
            events,
            idempotency: IdempotencyCache::new(idempotency_ttl),
        }
    }

    /// Send `amount` tokens from a custody account to `to_address`.
    ///
    /// A successful return means the transfer was accepted by the gateway
    /// (`Broadcasted`), not that it settled; the confirmation watcher
    /// finalizes it asynchronously.
    pub async fn send(
        &self,
        account_id: &str,
        to_address: &str,
        amount: Decimal,
        idempotency_key: Option<&str>,
    ) -> Result<TransferReceipt, CoreError> {
        if let Some(key) = idempotency_key {
            if let Some(outcome) = self.idempotency.get(key) {
                tracing::info!(key, "replaying recorded transfer outcome");
                return outcome.replay();
            }
        }

        let result = self.send_inner(account_id, to_address, amount).await;

        if let Some(key) = idempotency_key {
            self.idempotency.store(key, CachedOutcome::record(&result));
        }
        result
    }

    async fn send_inner(
        &self,
        account_id: &str,
        to_address: &str,
        amount: Decimal,
    ) -> Result<TransferReceipt, CoreError> {
        let amount = validate_amount(amount)?;

        let account = self
            .db
            .account(account_id)?
            .ok_or_else(|| CoreError::NotFound(format!("account {account_id}")))?;

        // Advisory: only an affirmative "invalid" rejects here. If the
        // gateway is unreachable the submission itself will surface it.
        if let Ok(false) = self.gateway.is_valid_address(to_address).await {
            return Err(CoreError::InvalidAddress(to_address.to_string()));
        }

        let balances = self.balances.balances_fresh(account_id).await?;
        if amount > balances.available {
            return Err(CoreError::InsufficientFunds);
        }

        let private_key = self.vault.decrypt(&account.key_ciphertext)?;

        let tx = LedgerTransaction::new_pending(
            account.account_id.clone(),
            to_address.to_string(),
            amount,
        );
        self.db.insert_transaction(&tx)?;

        match self
            .gateway
            .send_token(&account.address, &private_key, to_address, amount)
            .await
        {
            Ok(chain_tx_id) => {
                let updated = self
                    .db
                    .transition_transaction(&tx.tx_id, TxState::Pending, |t| {
                        t.mark_broadcasted(chain_tx_id.clone())
                    })?;
                self.balances.invalidate(account_id);
                self.events.publish(TransferEvent::Broadcasted {
                    tx_id: updated.tx_id.clone(),
                    account_id: account.account_id.clone(),
                    chain_tx_id: chain_tx_id.clone(),
                });
                tracing::info!(
                    tx_id = %updated.tx_id,
                    chain_tx_id = %chain_tx_id,
                    amount = %amount,
                    "transfer broadcasted"
                );
                Ok(TransferReceipt {
                    tx_id: updated.tx_id,
                    chain_tx_id: Some(chain_tx_id),
                    state: TxState::Broadcasted,
                })
            }
            Err(GatewayError::Rejected { code, reason }) => {
                self.db
                    .transition_transaction(&tx.tx_id, TxState::Pending, |t| {
                        t.mark_failed(code.clone(), reason.clone())
                    })?;
                self.events.publish(TransferEvent::Failed {
                    tx_id: tx.tx_id.clone(),
                    account_id: account.account_id.clone(),
                    reason: reason.clone(),
                });
                tracing::warn!(tx_id = %tx.tx_id, reason = %reason, "transfer rejected by gateway");
                Err(CoreError::GatewayFailure { code, reason })
            }
            Err(err) => {
                // Inconclusive: the row stays Pending. Nothing with an
                // unknown on-chain outcome may be failed or re-broadcast.
                tracing::warn!(
                    tx_id = %tx.tx_id,
                    error = %err,
                    "gateway unreachable, transfer outcome unknown"
                );
                Err(err.into())
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::mock::MockGateway;
    use crate::storage::{AccountRole, CustodyAccount, StakePosition};
    use rust_decimal_macros::dec;

    struct Fixture {
        db: Arc<LedgerDb>,
        gateway: Arc<MockGateway>,
        service: TransferService,
        account: CustodyAccount,
        _dir: tempfile::TempDir,
    }

    fn setup() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(LedgerDb::open(&dir.path().join("test.redb")).unwrap());
        let gateway = Arc::new(MockGateway::new());
        let vault = Arc::new(KeyVault::new([1u8; 32]));
        let balances = Arc::new(BalanceCalculator::new(
            db.clone(),
            gateway.clone(),
            Duration::from_secs(60),
        ));

        let ciphertext = vault.encrypt("user-private-key").unwrap();
        let account = CustodyAccount::new(
            "user-1".into(),
            "addr-1".into(),
            ciphertext,
            AccountRole::User,
        );
        db.insert_account(&account).unwrap();

        let service = TransferService::new(
            db.clone(),
            gateway.clone(),
            vault,
            balances,
            TransferEvents::new(),
            Duration::from_secs(600),
        );

        Fixture {
            db,
            gateway,
            service,
            account,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn send_with_exact_available_broadcasts() {
        let f = setup();
        f.gateway.set_token_balance("addr-1", dec!(50.123456));

        let receipt = f
            .service
            .send(&f.account.account_id, "dest-addr", dec!(50.123456), None)
            .await
            .unwrap();

        assert_eq!(receipt.state, TxState::Broadcasted);
        let chain_tx_id = receipt.chain_tx_id.expect("chain txid present");
        assert!(!chain_tx_id.is_empty());

        let stored = f.db.transaction(&receipt.tx_id).unwrap().unwrap();
        assert_eq!(stored.state, TxState::Broadcasted);
        assert_eq!(stored.amount, dec!(50.123456));

        let sent = f.gateway.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].amount, dec!(50.123456));
        assert_eq!(sent[0].to, "dest-addr");
    }

    #[tokio::test]
    async fn insufficient_available_inserts_no_row() {
        let f = setup();
        f.gateway.set_token_balance("addr-1", dec!(50));

        let result = f
            .service
            .send(&f.account.account_id, "dest-addr", dec!(50.123456), None)
            .await;
        assert!(matches!(result, Err(CoreError::InsufficientFunds)));

        let rows = f
            .db
            .transactions_by_account(&f.account.account_id, 10, None)
            .unwrap();
        assert!(rows.is_empty());
        assert!(f.gateway.sent().is_empty());
    }

    #[tokio::test]
    async fn staked_principal_reduces_available() {
        let f = setup();
        f.gateway.set_token_balance("addr-1", dec!(100));
        f.db
            .insert_stake(&StakePosition::new_active(
                f.account.account_id.clone(),
                dec!(60),
                10,
                None,
            ))
            .unwrap();

        let result = f
            .service
            .send(&f.account.account_id, "dest-addr", dec!(50), None)
            .await;
        assert!(matches!(result, Err(CoreError::InsufficientFunds)));

        let ok = f
            .service
            .send(&f.account.account_id, "dest-addr", dec!(40), None)
            .await;
        assert!(ok.is_ok());
    }

    #[tokio::test]
    async fn rejects_bad_amounts() {
        let f = setup();
        for bad in [Decimal::ZERO, dec!(-1), dec!(0.0000001)] {
            let result = f
                .service
                .send(&f.account.account_id, "dest-addr", bad, None)
                .await;
            assert!(matches!(result, Err(CoreError::InvalidAmount(_))), "{bad}");
        }
    }

    #[tokio::test]
    async fn unknown_account_is_not_found() {
        let f = setup();
        let result = f.service.send("missing", "dest-addr", dec!(1), None).await;
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn invalid_destination_is_rejected_before_any_write() {
        let f = setup();
        f.gateway.set_token_balance("addr-1", dec!(10));
        f.gateway.mark_invalid_address("bad-addr");

        let result = f
            .service
            .send(&f.account.account_id, "bad-addr", dec!(1), None)
            .await;
        assert!(matches!(result, Err(CoreError::InvalidAddress(_))));
        assert!(f
            .db
            .transactions_by_account(&f.account.account_id, 10, None)
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn gateway_rejection_marks_row_failed() {
        let f = setup();
        f.gateway.set_token_balance("addr-1", dec!(10));
        f.gateway.script_send(Err(GatewayError::Rejected {
            code: Some("ENERGY".into()),
            reason: "insufficient energy".into(),
        }));

        let result = f
            .service
            .send(&f.account.account_id, "dest-addr", dec!(1), None)
            .await;
        assert!(matches!(result, Err(CoreError::GatewayFailure { .. })));

        let rows = f
            .db
            .transactions_by_account(&f.account.account_id, 10, None)
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].state, TxState::Failed);
        assert_eq!(rows[0].fail_code.as_deref(), Some("ENERGY"));
        assert_eq!(rows[0].fail_reason.as_deref(), Some("insufficient energy"));
        assert!(rows[0].chain_tx_id.is_none());
    }

    #[tokio::test]
    async fn gateway_outage_leaves_row_pending() {
        let f = setup();
        f.gateway.set_token_balance("addr-1", dec!(10));
        f.gateway
            .script_send(Err(GatewayError::Unavailable("timeout".into())));

        let result = f
            .service
            .send(&f.account.account_id, "dest-addr", dec!(1), None)
            .await;
        assert!(matches!(result, Err(CoreError::GatewayUnavailable(_))));

        let rows = f
            .db
            .transactions_by_account(&f.account.account_id, 10, None)
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].state, TxState::Pending);
        assert!(rows[0].fail_reason.is_none());
    }

    #[tokio::test]
    async fn duplicate_idempotency_token_replays_first_outcome() {
        let f = setup();
        f.gateway.set_token_balance("addr-1", dec!(100));

        let first = f
            .service
            .send(&f.account.account_id, "dest-addr", dec!(10), Some("tok-1"))
            .await
            .unwrap();

        // Same token, different amount: identical outcome, no new row.
        let second = f
            .service
            .send(&f.account.account_id, "dest-addr", dec!(99), Some("tok-1"))
            .await
            .unwrap();

        assert_eq!(first.tx_id, second.tx_id);
        assert_eq!(first.chain_tx_id, second.chain_tx_id);

        let rows = f
            .db
            .transactions_by_account(&f.account.account_id, 10, None)
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(f.gateway.sent().len(), 1);
    }

    #[tokio::test]
    async fn recorded_failures_replay_too() {
        let f = setup();
        f.gateway.set_token_balance("addr-1", dec!(5));

        let first = f
            .service
            .send(&f.account.account_id, "dest-addr", dec!(10), Some("tok-2"))
            .await;
        assert!(matches!(first, Err(CoreError::InsufficientFunds)));

        // Funds arrive, but the same token still replays the refusal.
        f.gateway.set_token_balance("addr-1", dec!(100));
        let replay = f
            .service
            .send(&f.account.account_id, "dest-addr", dec!(10), Some("tok-2"))
            .await;
        assert!(matches!(replay, Err(CoreError::InsufficientFunds)));
        assert!(f.gateway.sent().is_empty());
    }
}
