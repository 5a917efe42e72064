// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::balance::BalanceCalculator;
use crate::config::Config;
use crate::events::TransferEvents;
use crate::gateway::ChainGateway;
use crate::oracle::PriceOracle;
use crate::staking::{StakeEngine, StakeSettings};
use crate::storage::LedgerDb;
use crate::transfer::TransferService;
use crate::treasury::TreasuryResolver;
use crate::vault::KeyVault;

/// Shared handles for the HTTP layer and background tasks.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<LedgerDb>,
    pub gateway: Arc<dyn ChainGateway>,
    pub vault: Arc<KeyVault>,
    pub balances: Arc<BalanceCalculator>,
    pub transfers: Arc<TransferService>,
    pub stakes: Arc<StakeEngine>,
    pub treasury: Arc<TreasuryResolver>,
    pub oracle: Arc<dyn PriceOracle>,
    pub events: TransferEvents,
    pub fallback_price: Decimal,
}

impl AppState {
    /// Wire the service graph from its leaf components.
    pub fn build(
        config: &Config,
        db: Arc<LedgerDb>,
        gateway: Arc<dyn ChainGateway>,
        oracle: Arc<dyn PriceOracle>,
    ) -> Self {
        let vault = Arc::new(KeyVault::new(config.master_key));
        let events = TransferEvents::new();

        let balances = Arc::new(BalanceCalculator::new(
            db.clone(),
            gateway.clone(),
            config.balance_cache_ttl,
        ));
        let transfers = Arc::new(TransferService::new(
            db.clone(),
            gateway.clone(),
            vault.clone(),
            balances.clone(),
            events.clone(),
            config.idempotency_ttl,
        ));
        let treasury = Arc::new(TreasuryResolver::new(
            db.clone(),
            gateway.clone(),
            vault.clone(),
            config.treasury_owner_id.clone(),
        ));
        let stakes = Arc::new(StakeEngine::new(
            db.clone(),
            balances.clone(),
            transfers.clone(),
            treasury.clone(),
            StakeSettings {
                daily_rate_bp: config.stake_daily_rate_bp,
                min_amount: config.stake_min_amount,
                max_amount: config.stake_max_amount,
                settlement_cap: config.settlement_cap,
            },
        ));

        Self {
            db,
            gateway,
            vault,
            balances,
            transfers,
            stakes,
            treasury,
            oracle,
            events,
            fallback_price: config.fallback_price,
        }
    }
}
