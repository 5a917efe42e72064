// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Ledger Storage Module
//!
//! Durable storage for custody accounts, ledger transactions and stake
//! positions, backed by an embedded redb database.
//!
//! ## Consistency Model
//!
//! - The store is the single source of truth.
//! - Records are serialized as JSON values inside redb tables.
//! - State changes go through conditional (compare-and-swap) transitions
//!   executed inside single write transactions; a writer that finds a row
//!   outside its expected prior state is rejected, never merged.
//! - Reads across rows are eventually consistent with the latest commits.

pub mod ledger_db;
pub mod records;

pub use ledger_db::{LedgerDb, LedgerDbError, LedgerDbResult};
pub use records::{
    AccountRole, CustodyAccount, LedgerTransaction, StakePosition, StakeStatus, TxState,
};
