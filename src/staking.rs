// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Staking: principal moves to the treasury and earns simple daily interest.
//!
//! Interest accrues lazily — on read and before close, never on a timer.
//! `delta = principal × rate_bp/10000 × elapsed_days`, elapsed time clamped
//! to 365 days per accrual step, everything rounded to 6 decimal places half
//! away from zero. The rate applies to the fixed principal only
//! (non-compounding).
//!
//! A position never becomes Active without a successful settlement transfer,
//! and close is all-or-nothing: if the return transfer fails, the position
//! stays Active and the error surfaces.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::amount::{round6, validate_amount};
use crate::balance::BalanceCalculator;
use crate::error::CoreError;
use crate::storage::{LedgerDb, LedgerDbError, StakePosition, StakeStatus};
use crate::transfer::TransferService;
use crate::treasury::TreasuryResolver;

/// Upper clamp on a single accrual step, in days.
const MAX_ACCRUAL_DAYS: i64 = 365;

/// Accrued interest may never exceed this multiple of the principal.
const MAX_ACCRUED_MULTIPLE: i64 = 10;

/// Staking parameters from configuration.
#[derive(Debug, Clone)]
pub struct StakeSettings {
    pub daily_rate_bp: u32,
    pub min_amount: Decimal,
    pub max_amount: Decimal,
    /// Upper bound for any single settlement transfer.
    pub settlement_cap: Decimal,
}

/// A position with its live (unpersisted) accrued projection.
#[derive(Debug, Clone, Serialize)]
pub struct StakeView {
    #[serde(flatten)]
    pub position: StakePosition,
    /// Accrued interest as of now, including the not-yet-persisted tail.
    pub accrued_live: Decimal,
}

/// Result of closing a position.
#[derive(Debug, Clone, Serialize)]
pub struct CloseOutcome {
    pub stake_id: String,
    pub principal: Decimal,
    pub rewards: Decimal,
    pub total: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settlement_tx_id: Option<String>,
}

/// Fractional days between two instants, clamped to `[0, MAX_ACCRUAL_DAYS]`.
fn elapsed_days(from: DateTime<Utc>, to: DateTime<Utc>) -> Decimal {
    let ms = (to - from).num_milliseconds();
    if ms <= 0 {
        return Decimal::ZERO;
    }
    let days = Decimal::from(ms) / Decimal::from(86_400_000u64);
    days.min(Decimal::from(MAX_ACCRUAL_DAYS))
}

/// Interest earned over `days` at `rate_bp` basis points per day.
fn accrual_delta(principal: Decimal, rate_bp: u32, days: Decimal) -> Decimal {
    let daily_rate = Decimal::from(rate_bp) / Decimal::from(10_000u32);
    round6(principal * daily_rate * days)
}

/// Bring a position's accrued interest current. No-op at zero elapsed time.
fn accrue_in_place(stake: &mut StakePosition, now: DateTime<Utc>) {
    let days = elapsed_days(stake.last_accrual_at, now);
    if days.is_zero() {
        return;
    }
    let delta = accrual_delta(stake.principal, stake.daily_rate_bp, days);
    stake.accrued = round6((stake.accrued + delta).max(Decimal::ZERO));
    stake.last_accrual_at = now;
    stake.updated_at = now;
}

/// Opens, accrues and settles stake positions.
pub struct StakeEngine {
    db: Arc<LedgerDb>,
    balances: Arc<BalanceCalculator>,
    transfers: Arc<TransferService>,
    treasury: Arc<TreasuryResolver>,
    settings: StakeSettings,
}

impl StakeEngine {
    pub fn new(
        db: Arc<LedgerDb>,
        balances: Arc<BalanceCalculator>,
        transfers: Arc<TransferService>,
        treasury: Arc<TreasuryResolver>,
        settings: StakeSettings,
    ) -> Self {
        Self {
            db,
            balances,
            transfers,
            treasury,
            settings,
        }
    }

    /// Open a new position: move `principal` to the treasury, then record it.
    pub async fn open(
        &self,
        account_id: &str,
        principal: Decimal,
    ) -> Result<StakePosition, CoreError> {
        let principal = validate_amount(principal)?;
        if principal < self.settings.min_amount {
            return Err(CoreError::InvalidAmount(format!(
                "principal below minimum of {}",
                self.settings.min_amount
            )));
        }
        if principal > self.settings.max_amount {
            return Err(CoreError::InvalidAmount(format!(
                "principal above maximum of {}",
                self.settings.max_amount
            )));
        }

        let balances = self.balances.balances_fresh(account_id).await?;
        if principal > balances.available {
            return Err(CoreError::InsufficientFunds);
        }

        let treasury = self.treasury.resolve().await?;

        let receipt = self
            .transfers
            .send(account_id, &treasury.address, principal, None)
            .await?;

        let stake = StakePosition::new_active(
            account_id.to_string(),
            principal,
            self.settings.daily_rate_bp,
            receipt.chain_tx_id,
        );
        self.db.insert_stake(&stake)?;
        self.balances.invalidate(account_id);

        tracing::info!(
            stake_id = %stake.stake_id,
            account_id,
            principal = %principal,
            "stake opened"
        );
        Ok(stake)
    }

    /// All positions of an account, newest first, with live accrual.
    pub fn list(&self, account_id: &str) -> Result<Vec<StakeView>, CoreError> {
        if self.db.account(account_id)?.is_none() {
            return Err(CoreError::NotFound(format!("account {account_id}")));
        }

        let now = Utc::now();
        let views = self
            .db
            .stakes_by_account(account_id)?
            .into_iter()
            .map(|position| {
                let accrued_live = match position.status {
                    StakeStatus::Active => round6(
                        position.accrued
                            + accrual_delta(
                                position.principal,
                                position.daily_rate_bp,
                                elapsed_days(position.last_accrual_at, now),
                            ),
                    ),
                    StakeStatus::Closed => position.accrued,
                };
                StakeView {
                    position,
                    accrued_live,
                }
            })
            .collect();
        Ok(views)
    }

    /// Close a position: accrue, validate, return principal + rewards.
    pub async fn close(
        &self,
        account_id: &str,
        stake_id: &str,
    ) -> Result<CloseOutcome, CoreError> {
        let stake = self
            .db
            .stake(stake_id)?
            .filter(|s| s.account_id == account_id && s.status == StakeStatus::Active)
            .ok_or_else(|| {
                CoreError::NotFound(format!("stake {stake_id} not found or already closed"))
            })?;

        let now = Utc::now();
        let stake = self
            .accrue(&stake.stake_id, now)
            .map_err(already_closed_conflict)?;

        // Bounds check before moving any funds; violations indicate stored
        // data corruption, not caller error.
        if stake.principal <= Decimal::ZERO || stake.principal > self.settings.settlement_cap {
            return Err(CoreError::IntegrityError(format!(
                "stake {stake_id} has invalid principal {}",
                stake.principal
            )));
        }
        if stake.accrued < Decimal::ZERO
            || stake.accrued > stake.principal * Decimal::from(MAX_ACCRUED_MULTIPLE)
        {
            return Err(CoreError::IntegrityError(format!(
                "stake {stake_id} has invalid accrued amount {}",
                stake.accrued
            )));
        }

        let total = round6(stake.principal + stake.accrued);
        if total <= Decimal::ZERO || total > self.settings.settlement_cap {
            return Err(CoreError::IntegrityError(format!(
                "stake {stake_id} has invalid settlement total {total}"
            )));
        }

        let account = self
            .db
            .account(account_id)?
            .ok_or_else(|| CoreError::NotFound(format!("account {account_id}")))?;
        let treasury = self.treasury.resolve().await?;

        tracing::info!(
            stake_id,
            principal = %stake.principal,
            rewards = %stake.accrued,
            total = %total,
            "closing stake"
        );

        // If this fails the position stays Active; close is never partial.
        let receipt = self
            .transfers
            .send(&treasury.account_id, &account.address, total, None)
            .await?;

        self.db
            .transition_stake(stake_id, StakeStatus::Active, |s| s.mark_closed())
            .map_err(already_closed_conflict)?;
        self.balances.invalidate(account_id);
        self.balances.invalidate(&treasury.account_id);

        Ok(CloseOutcome {
            stake_id: stake.stake_id,
            principal: stake.principal,
            rewards: stake.accrued,
            total,
            settlement_tx_id: receipt.chain_tx_id,
        })
    }

    fn accrue(&self, stake_id: &str, now: DateTime<Utc>) -> Result<StakePosition, LedgerDbError> {
        self.db
            .transition_stake(stake_id, StakeStatus::Active, |s| accrue_in_place(s, now))
    }
}

fn already_closed_conflict(err: LedgerDbError) -> CoreError {
    match err {
        LedgerDbError::StateConflict { .. } => {
            CoreError::Conflict("stake is no longer active".to_string())
        }
        other => other.into(),
    }
}

// =============================================================================
// Tests
// =============================================================================
