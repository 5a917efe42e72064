// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Persisted record types: custody accounts, ledger transactions, stake
//! positions.
//!
//! A [`LedgerTransaction`] only ever moves forward through
//! `Pending → Broadcasted → {Confirmed | Failed}` (a gateway rejection may
//! fail it straight from `Pending`). Once a row carries a chain transaction
//! id it is never re-broadcast.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a custody account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountRole {
    /// Ordinary user-owned account.
    User,
    /// The single counterparty account for stake and settlement transfers.
    Treasury,
}

/// A custodially held wallet: one per user, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustodyAccount {
    /// Unique account identifier (UUID).
    pub account_id: String,
    /// Owning user identifier. Unique across accounts.
    pub owner_user_id: String,
    /// On-chain address.
    pub address: String,
    /// Private key, encrypted by the key vault. NEVER exposed via API.
    pub key_ciphertext: String,
    pub role: AccountRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CustodyAccount {
    pub fn new(
        owner_user_id: String,
        address: String,
        key_ciphertext: String,
        role: AccountRole,
    ) -> Self {
        let now = Utc::now();
        Self {
            account_id: Uuid::new_v4().to_string(),
            owner_user_id,
            address,
            key_ciphertext,
            role,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Ledger transaction state. Strictly forward-moving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxState {
    /// Row created, not yet submitted (or submission outcome unknown).
    Pending,
    /// Accepted by the gateway; awaiting on-chain confirmation.
    Broadcasted,
    /// Chain reports successful execution. Terminal.
    Confirmed,
    /// Rejected by the gateway or reverted on chain. Terminal.
    Failed,
}

impl TxState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxState::Pending => "pending",
            TxState::Broadcasted => "broadcasted",
            TxState::Confirmed => "confirmed",
            TxState::Failed => "failed",
        }
    }
}

/// Locally tracked record of one custodial transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub tx_id: String,
    /// Account the funds move out of.
    pub account_id: String,
    pub to_address: String,
    /// Token amount, 6 fractional digits.
    pub amount: Decimal,
    pub state: TxState,
    /// Chain transaction id, set exactly once when broadcasted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_tx_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail_reason: Option<String>,
    /// Raw execution receipt, set only on confirmation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LedgerTransaction {
    /// Create a new pending transfer row.
    pub fn new_pending(account_id: String, to_address: String, amount: Decimal) -> Self {
        let now = Utc::now();
        Self {
            tx_id: Uuid::new_v4().to_string(),
            account_id,
            to_address,
            amount,
            state: TxState::Pending,
            chain_tx_id: None,
            fail_code: None,
            fail_reason: None,
            receipt: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mark_broadcasted(&mut self, chain_tx_id: String) {
        self.state = TxState::Broadcasted;
        self.chain_tx_id = Some(chain_tx_id);
        self.updated_at = Utc::now();
    }

    pub fn mark_confirmed(&mut self, receipt: serde_json::Value) {
        self.state = TxState::Confirmed;
        self.receipt = Some(receipt);
        self.updated_at = Utc::now();
    }

    pub fn mark_failed(&mut self, code: Option<String>, reason: String) {
        self.state = TxState::Failed;
        self.fail_code = code;
        self.fail_reason = Some(reason);
        self.updated_at = Utc::now();
    }
}

/// Stake position status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StakeStatus {
    Active,
    Closed,
}

/// Principal moved to the treasury, accruing simple daily interest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StakePosition {
    pub stake_id: String,
    pub account_id: String,
    /// Fixed at creation; never partially withdrawn.
    pub principal: Decimal,
    /// Accrued interest. Non-negative, non-decreasing while active.
    pub accrued: Decimal,
    /// Daily interest rate in basis points (1 bp = 0.01%).
    pub daily_rate_bp: u32,
    pub status: StakeStatus,
    pub start_at: DateTime<Utc>,
    pub last_accrual_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    /// Chain transaction id of the opening settlement transfer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settlement_tx_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StakePosition {
    /// Create an active position. Callers must have settled the principal
    /// transfer first; `settlement_tx_id` references it.
    pub fn new_active(
        account_id: String,
        principal: Decimal,
        daily_rate_bp: u32,
        settlement_tx_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            stake_id: Uuid::new_v4().to_string(),
            account_id,
            principal,
            accrued: Decimal::ZERO,
            daily_rate_bp,
            status: StakeStatus::Active,
            start_at: now,
            last_accrual_at: now,
            closed_at: None,
            settlement_tx_id,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mark_closed(&mut self) {
        let now = Utc::now();
        self.status = StakeStatus::Closed;
        self.closed_at = Some(now);
        self.updated_at = now;
    }
}
