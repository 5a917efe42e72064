// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded ledger database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `accounts`: account_id → serialized CustodyAccount
//! - `owner_index`: owner_user_id → account_id
//! - `transactions`: tx_id → serialized LedgerTransaction
//! - `account_tx_index`: composite key (account_id|!timestamp|tx_id) → tx_id
//! - `stakes`: stake_id → serialized StakePosition
//!
//! ## Conditional transitions
//!
//! State changes on transactions and stakes go through
//! [`transition_transaction`](LedgerDb::transition_transaction) /
//! [`transition_stake`](LedgerDb::transition_stake), which read, verify the
//! expected prior state and write inside a single write transaction. A racing
//! writer that finds the row in another state gets
//! [`LedgerDbError::StateConflict`] instead of silently overwriting.

use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use rust_decimal::Decimal;

use super::records::{CustodyAccount, LedgerTransaction, StakePosition, StakeStatus, TxState};

// =============================================================================
// Table Definitions
// =============================================================================

/// Primary accounts table: account_id → serialized CustodyAccount (JSON bytes).
const ACCOUNTS: TableDefinition<&str, &[u8]> = TableDefinition::new("accounts");

/// Unique owner index: owner_user_id → account_id.
const OWNER_INDEX: TableDefinition<&str, &str> = TableDefinition::new("owner_index");

/// Primary transactions table: tx_id → serialized LedgerTransaction.
const TRANSACTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("transactions");

/// Index: composite key → tx_id.
/// Key format: `account_id|!timestamp_be|tx_id` for descending-time scans.
const ACCOUNT_TX_INDEX: TableDefinition<&[u8], &str> = TableDefinition::new("account_tx_index");

/// Primary stakes table: stake_id → serialized StakePosition.
const STAKES: TableDefinition<&str, &[u8]> = TableDefinition::new("stakes");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum LedgerDbError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("state conflict: expected {expected}, found {actual}")]
    StateConflict {
        expected: &'static str,
        actual: String,
    },
}

pub type LedgerDbResult<T> = Result<T, LedgerDbError>;

// =============================================================================
// Index Key Helpers
// =============================================================================

/// Build a composite key for the account_tx_index table.
///
/// Format: `account_id | inverted_timestamp_be_bytes | tx_id`
///
/// The inverted timestamp ensures newest-first ordering when scanning forward.
fn make_index_key(account_id: &str, timestamp: i64, tx_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(account_id.len() + 1 + 8 + 1 + tx_id.len());
    key.extend_from_slice(account_id.as_bytes());
    key.push(b'|');
    key.extend_from_slice(&(!timestamp as u64).to_be_bytes());
    key.push(b'|');
    key.extend_from_slice(tx_id.as_bytes());
    key
}

/// Build a prefix key for range scanning all transactions of an account.
fn make_prefix(account_id: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(account_id.len() + 1);
    prefix.extend_from_slice(account_id.as_bytes());
    prefix.push(b'|');
    prefix
}

/// Build the upper bound for a range scan (prefix with 0xFF bytes appended).
fn make_prefix_end(account_id: &str) -> Vec<u8> {
    let mut end = make_prefix(account_id);
    end.extend_from_slice(&[0xFF; 20]);
    end
}

// =============================================================================
// LedgerDb
// =============================================================================

/// Embedded ACID ledger store. The single source of truth.
pub struct LedgerDb {
    db: Database,
}

impl LedgerDb {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> LedgerDbResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(ACCOUNTS)?;
            let _ = write_txn.open_table(OWNER_INDEX)?;
            let _ = write_txn.open_table(TRANSACTIONS)?;
            let _ = write_txn.open_table(ACCOUNT_TX_INDEX)?;
            let _ = write_txn.open_table(STAKES)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    /// Insert a new account. One account per owner; addresses never reused.
    pub fn insert_account(&self, account: &CustodyAccount) -> LedgerDbResult<()> {
        let json = serde_json::to_vec(account)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut owner_table = write_txn.open_table(OWNER_INDEX)?;
            if owner_table.get(account.owner_user_id.as_str())?.is_some() {
                return Err(LedgerDbError::AlreadyExists(format!(
                    "account for owner {}",
                    account.owner_user_id
                )));
            }
            owner_table.insert(
                account.owner_user_id.as_str(),
                account.account_id.as_str(),
            )?;

            let mut accounts = write_txn.open_table(ACCOUNTS)?;
            accounts.insert(account.account_id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Look up an account by its identifier.
    pub fn account(&self, account_id: &str) -> LedgerDbResult<Option<CustodyAccount>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ACCOUNTS)?;
        match table.get(account_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Look up an account by its owning user.
    pub fn account_by_owner(&self, owner_user_id: &str) -> LedgerDbResult<Option<CustodyAccount>> {
        let read_txn = self.db.begin_read()?;
        let owner_table = read_txn.open_table(OWNER_INDEX)?;
        let account_id = match owner_table.get(owner_user_id)? {
            Some(v) => v.value().to_string(),
            None => return Ok(None),
        };
        let accounts = read_txn.open_table(ACCOUNTS)?;
        match accounts.get(account_id.as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Insert a new ledger transaction and its index entry.
    pub fn insert_transaction(&self, tx: &LedgerTransaction) -> LedgerDbResult<()> {
        let json = serde_json::to_vec(tx)?;
        let key = make_index_key(&tx.account_id, tx.created_at.timestamp(), &tx.tx_id);

        let write_txn = self.db.begin_write()?;
        {
            let mut tx_table = write_txn.open_table(TRANSACTIONS)?;
            if tx_table.get(tx.tx_id.as_str())?.is_some() {
                return Err(LedgerDbError::AlreadyExists(format!(
                    "transaction {}",
                    tx.tx_id
                )));
            }
            tx_table.insert(tx.tx_id.as_str(), json.as_slice())?;

            let mut idx_table = write_txn.open_table(ACCOUNT_TX_INDEX)?;
            idx_table.insert(key.as_slice(), tx.tx_id.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Look up a single transaction by id.
    pub fn transaction(&self, tx_id: &str) -> LedgerDbResult<Option<LedgerTransaction>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TRANSACTIONS)?;
        match table.get(tx_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Conditionally transition a transaction.
    ///
    /// `apply` runs only if the row is currently in `expected` state; the
    /// read-check-write happens inside one write transaction, so a concurrent
    /// transition cannot be lost or double-applied.
    pub fn transition_transaction(
        &self,
        tx_id: &str,
        expected: TxState,
        apply: impl FnOnce(&mut LedgerTransaction),
    ) -> LedgerDbResult<LedgerTransaction> {
        let write_txn = self.db.begin_write()?;
        let updated = {
            let mut table = write_txn.open_table(TRANSACTIONS)?;

            let existing_bytes = {
                let existing = table
                    .get(tx_id)?
                    .ok_or_else(|| LedgerDbError::NotFound(format!("transaction {tx_id}")))?;
                existing.value().to_vec()
            };

            let mut tx: LedgerTransaction = serde_json::from_slice(&existing_bytes)?;
            if tx.state != expected {
                return Err(LedgerDbError::StateConflict {
                    expected: expected.as_str(),
                    actual: tx.state.as_str().to_string(),
                });
            }

            apply(&mut tx);

            let json = serde_json::to_vec(&tx)?;
            table.insert(tx_id, json.as_slice())?;
            tx
        };
        write_txn.commit()?;
        Ok(updated)
    }

    /// All transactions currently in `state`, oldest first, up to `limit`.
    pub fn transactions_in_state(
        &self,
        state: TxState,
        limit: usize,
    ) -> LedgerDbResult<Vec<LedgerTransaction>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TRANSACTIONS)?;

        let mut matching = Vec::new();
        for entry in table.iter()? {
            let entry = entry?;
            let tx: LedgerTransaction = serde_json::from_slice(entry.1.value())?;
            if tx.state == state {
                matching.push(tx);
            }
        }

        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        matching.truncate(limit);
        Ok(matching)
    }

    /// Transactions of one account, newest first, optionally filtered by state.
    pub fn transactions_by_account(
        &self,
        account_id: &str,
        limit: usize,
        state: Option<TxState>,
    ) -> LedgerDbResult<Vec<LedgerTransaction>> {
        let read_txn = self.db.begin_read()?;
        let idx_table = read_txn.open_table(ACCOUNT_TX_INDEX)?;
        let tx_table = read_txn.open_table(TRANSACTIONS)?;

        let prefix = make_prefix(account_id);
        let prefix_end = make_prefix_end(account_id);

        let mut results = Vec::with_capacity(limit);
        for entry in idx_table.range(prefix.as_slice()..prefix_end.as_slice())? {
            let entry = entry?;
            let tx_id = entry.1.value().to_string();
            if let Some(value) = tx_table.get(tx_id.as_str())? {
                let tx: LedgerTransaction = serde_json::from_slice(value.value())?;
                if state.is_none_or(|s| tx.state == s) {
                    results.push(tx);
                }
            }
            if results.len() >= limit {
                break;
            }
        }

        Ok(results)
    }

    // =========================================================================
    // Stakes
    // =========================================================================

    /// Insert a new stake position.
    pub fn insert_stake(&self, stake: &StakePosition) -> LedgerDbResult<()> {
        let json = serde_json::to_vec(stake)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(STAKES)?;
            if table.get(stake.stake_id.as_str())?.is_some() {
                return Err(LedgerDbError::AlreadyExists(format!(
                    "stake {}",
                    stake.stake_id
                )));
            }
            table.insert(stake.stake_id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Look up a stake position by id.
    pub fn stake(&self, stake_id: &str) -> LedgerDbResult<Option<StakePosition>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(STAKES)?;
        match table.get(stake_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Conditionally mutate a stake position (same contract as
    /// [`transition_transaction`](Self::transition_transaction)). Accrual
    /// updates pass `expected = Active` and leave the status unchanged.
    pub fn transition_stake(
        &self,
        stake_id: &str,
        expected: StakeStatus,
        apply: impl FnOnce(&mut StakePosition),
    ) -> LedgerDbResult<StakePosition> {
        let write_txn = self.db.begin_write()?;
        let updated = {
            let mut table = write_txn.open_table(STAKES)?;

            let existing_bytes = {
                let existing = table
                    .get(stake_id)?
                    .ok_or_else(|| LedgerDbError::NotFound(format!("stake {stake_id}")))?;
                existing.value().to_vec()
            };

            let mut stake: StakePosition = serde_json::from_slice(&existing_bytes)?;
            if stake.status != expected {
                return Err(LedgerDbError::StateConflict {
                    expected: match expected {
                        StakeStatus::Active => "active",
                        StakeStatus::Closed => "closed",
                    },
                    actual: match stake.status {
                        StakeStatus::Active => "active".to_string(),
                        StakeStatus::Closed => "closed".to_string(),
                    },
                });
            }

            apply(&mut stake);

            let json = serde_json::to_vec(&stake)?;
            table.insert(stake_id, json.as_slice())?;
            stake
        };
        write_txn.commit()?;
        Ok(updated)
    }

    /// All stake positions of an account, newest first.
    pub fn stakes_by_account(&self, account_id: &str) -> LedgerDbResult<Vec<StakePosition>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(STAKES)?;

        let mut stakes = Vec::new();
        for entry in table.iter()? {
            let entry = entry?;
            let stake: StakePosition = serde_json::from_slice(entry.1.value())?;
            if stake.account_id == account_id {
                stakes.push(stake);
            }
        }

        stakes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(stakes)
    }

    /// Sum of principals locked in this account's active stakes.
    pub fn active_principal_sum(&self, account_id: &str) -> LedgerDbResult<Decimal> {
        let stakes = self.stakes_by_account(account_id)?;
        Ok(stakes
            .iter()
            .filter(|s| s.status == StakeStatus::Active)
            .map(|s| s.principal)
            .sum())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::records::AccountRole;
    use rust_decimal_macros::dec;

    fn temp_db() -> (LedgerDb, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = LedgerDb::open(&dir.path().join("test.redb")).unwrap();
        (db, dir)
    }

    fn sample_account(owner: &str) -> CustodyAccount {
        CustodyAccount::new(
            owner.to_string(),
            format!("addr-{owner}"),
            "ciphertext".to_string(),
            AccountRole::User,
        )
    }

    #[test]
    fn insert_and_get_account() {
        let (db, _dir) = temp_db();
        let account = sample_account("user-1");
        db.insert_account(&account).unwrap();

        let by_id = db.account(&account.account_id).unwrap().unwrap();
        assert_eq!(by_id.owner_user_id, "user-1");

        let by_owner = db.account_by_owner("user-1").unwrap().unwrap();
        assert_eq!(by_owner.account_id, account.account_id);
    }

    #[test]
    fn duplicate_owner_is_rejected() {
        let (db, _dir) = temp_db();
        db.insert_account(&sample_account("user-1")).unwrap();
        let result = db.insert_account(&sample_account("user-1"));
        assert!(matches!(result, Err(LedgerDbError::AlreadyExists(_))));
    }

    #[test]
    fn transaction_transition_happy_path() {
        let (db, _dir) = temp_db();
        let tx = LedgerTransaction::new_pending("acct-1".into(), "addr".into(), dec!(5));
        db.insert_transaction(&tx).unwrap();

        let updated = db
            .transition_transaction(&tx.tx_id, TxState::Pending, |t| {
                t.mark_broadcasted("chain-1".into())
            })
            .unwrap();
        assert_eq!(updated.state, TxState::Broadcasted);

        let stored = db.transaction(&tx.tx_id).unwrap().unwrap();
        assert_eq!(stored.chain_tx_id.as_deref(), Some("chain-1"));
    }

    #[test]
    fn transition_rejects_wrong_prior_state() {
        let (db, _dir) = temp_db();
        let tx = LedgerTransaction::new_pending("acct-1".into(), "addr".into(), dec!(5));
        db.insert_transaction(&tx).unwrap();

        db.transition_transaction(&tx.tx_id, TxState::Pending, |t| {
            t.mark_broadcasted("chain-1".into())
        })
        .unwrap();

        // A second actor expecting Pending loses the race.
        let result = db.transition_transaction(&tx.tx_id, TxState::Pending, |t| {
            t.mark_failed(None, "should not apply".into())
        });
        assert!(matches!(
            result,
            Err(LedgerDbError::StateConflict { expected: "pending", .. })
        ));

        // The winning transition stands.
        let stored = db.transaction(&tx.tx_id).unwrap().unwrap();
        assert_eq!(stored.state, TxState::Broadcasted);
    }

    #[test]
    fn transactions_in_state_is_oldest_first() {
        let (db, _dir) = temp_db();
        for i in 0..4 {
            let mut tx =
                LedgerTransaction::new_pending("acct-1".into(), "addr".into(), dec!(1));
            tx.created_at = chrono::Utc::now() - chrono::Duration::seconds(10 - i);
            tx.mark_broadcasted(format!("chain-{i}"));
            db.insert_transaction(&tx).unwrap();
        }

        let rows = db.transactions_in_state(TxState::Broadcasted, 3).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].created_at <= rows[1].created_at);
        assert!(rows[1].created_at <= rows[2].created_at);
    }

    #[test]
    fn transactions_by_account_newest_first_with_filter() {
        let (db, _dir) = temp_db();
        for i in 0..5 {
            let mut tx =
                LedgerTransaction::new_pending("acct-1".into(), "addr".into(), dec!(1));
            tx.created_at = chrono::Utc::now() - chrono::Duration::seconds(10 - i);
            if i % 2 == 0 {
                tx.mark_broadcasted(format!("chain-{i}"));
            }
            db.insert_transaction(&tx).unwrap();
        }
        // A row for another account must not leak in.
        let other = LedgerTransaction::new_pending("acct-2".into(), "addr".into(), dec!(1));
        db.insert_transaction(&other).unwrap();

        let all = db.transactions_by_account("acct-1", 10, None).unwrap();
        assert_eq!(all.len(), 5);
        assert!(all[0].created_at >= all[4].created_at);

        let broadcasted = db
            .transactions_by_account("acct-1", 10, Some(TxState::Broadcasted))
            .unwrap();
        assert_eq!(broadcasted.len(), 3);

        let limited = db.transactions_by_account("acct-1", 2, None).unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[test]
    fn stake_lifecycle_and_principal_sum() {
        let (db, _dir) = temp_db();
        let s1 = StakePosition::new_active("acct-1".into(), dec!(100), 10, None);
        let s2 = StakePosition::new_active("acct-1".into(), dec!(50.5), 10, None);
        let other = StakePosition::new_active("acct-2".into(), dec!(7), 10, None);
        db.insert_stake(&s1).unwrap();
        db.insert_stake(&s2).unwrap();
        db.insert_stake(&other).unwrap();

        assert_eq!(db.active_principal_sum("acct-1").unwrap(), dec!(150.5));

        db.transition_stake(&s1.stake_id, StakeStatus::Active, |s| s.mark_closed())
            .unwrap();
        assert_eq!(db.active_principal_sum("acct-1").unwrap(), dec!(50.5));

        // Closing twice conflicts.
        let result =
            db.transition_stake(&s1.stake_id, StakeStatus::Active, |s| s.mark_closed());
        assert!(matches!(result, Err(LedgerDbError::StateConflict { .. })));
    }

    #[test]
    fn make_index_key_ordering() {
        // Newer timestamps should produce smaller composite keys (descending)
        let key_old = make_index_key("acct", 1000, "tx1");
        let key_new = make_index_key("acct", 2000, "tx2");
        assert!(key_new < key_old, "newer timestamps should sort first");
    }
}
