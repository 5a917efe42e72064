// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Custody Server - Custodial Wallet & Staking Service
//!
//! This crate provides a custodial token wallet service: it holds users'
//! blockchain keys encrypted at rest, moves tokens on their behalf through
//! an external blockchain gateway, and offers an interest-bearing staking
//! product backed by those custodial funds. A local ledger is the source of
//! truth; a background watcher reconciles it against on-chain receipts.
//!
//! ## Modules
//!
//! - `api` - HTTP handlers (Axum)
//! - `balance` - Available-balance calculation (on-chain minus staking locks)
//! - `gateway` - Blockchain custody gateway client
//! - `staking` - Stake accrual and settlement engine
//! - `storage` - Embedded ledger store (redb)
//! - `transfer` - Money movement state machine
//! - `watcher` - Broadcast-to-confirmation reconciliation loop

pub mod amount;
pub mod api;
pub mod balance;
pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod oracle;
pub mod staking;
pub mod state;
pub mod storage;
pub mod transfer;
pub mod treasury;
pub mod vault;
pub mod watcher;
