// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Balance calculator: on-chain balances minus staking locks.
//!
//! `available = max(0, token − Σ principal of active stakes)` — recomputed on
//! every call, never stored. Reads are served through a seconds-scale TTL
//! cache; anything that moves funds must use [`balances_fresh`]
//! (BalanceCalculator::balances_fresh), because a stale read could allow an
//! overdraft.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use lru::LruCache;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::CoreError;
use crate::gateway::ChainGateway;
use crate::storage::LedgerDb;

/// Max number of accounts kept in the balance cache.
const CACHE_CAPACITY: usize = 256;

/// Balance snapshot for one account.
#[derive(Debug, Clone, Serialize)]
pub struct Balances {
    pub account_id: String,
    pub address: String,
    /// Native coin balance (pays network fees, not custodial value).
    pub native: Decimal,
    /// On-chain token balance.
    pub token: Decimal,
    /// Principal locked in active stakes.
    pub locked: Decimal,
    /// Spendable token balance.
    pub available: Decimal,
}

struct CacheEntry {
    balances: Balances,
    inserted_at: Instant,
}

/// Combines gateway balances with ledger stake locks.
pub struct BalanceCalculator {
    db: Arc<LedgerDb>,
    gateway: Arc<dyn ChainGateway>,
    cache: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
}

impl BalanceCalculator {
    pub fn new(db: Arc<LedgerDb>, gateway: Arc<dyn ChainGateway>, ttl: Duration) -> Self {
        Self {
            db,
            gateway,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(CACHE_CAPACITY).unwrap_or(NonZeroUsize::new(1).unwrap()),
            )),
            ttl,
        }
    }

    /// Balances for an account, possibly served from the short-lived cache.
    pub async fn balances(&self, account_id: &str) -> Result<Balances, CoreError> {
        if let Some(cached) = self.cached(account_id) {
            return Ok(cached);
        }
        let balances = self.compute(account_id).await?;
        self.store(balances.clone());
        Ok(balances)
    }

    /// Balances recomputed from the gateway, bypassing the cache.
    ///
    /// This is the only form a transfer sufficiency check may rely on.
    pub async fn balances_fresh(&self, account_id: &str) -> Result<Balances, CoreError> {
        let balances = self.compute(account_id).await?;
        self.store(balances.clone());
        Ok(balances)
    }

    /// Drop the cached snapshot for an account (after a send or stake move).
    pub fn invalidate(&self, account_id: &str) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.pop(account_id);
        }
    }

    async fn compute(&self, account_id: &str) -> Result<Balances, CoreError> {
        let account = self
            .db
            .account(account_id)?
            .ok_or_else(|| CoreError::NotFound(format!("account {account_id}")))?;

        let native = self.gateway.native_balance(&account.address).await?;
        let token = self.gateway.token_balance(&account.address).await?;
        let locked = self.db.active_principal_sum(account_id)?;
        let available = (token - locked).max(Decimal::ZERO);

        Ok(Balances {
            account_id: account.account_id,
            address: account.address,
            native,
            token,
            locked,
            available,
        })
    }

    fn cached(&self, account_id: &str) -> Option<Balances> {
        let mut cache = self.cache.lock().ok()?;
        if let Some(entry) = cache.get(account_id) {
            if entry.inserted_at.elapsed() < self.ttl {
                return Some(entry.balances.clone());
            }
            cache.pop(account_id);
        }
        None
    }

    fn store(&self, balances: Balances) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(
                balances.account_id.clone(),
                CacheEntry {
                    balances,
                    inserted_at: Instant::now(),
                },
            );
        }
    }
}
