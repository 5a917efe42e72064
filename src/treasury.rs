// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Treasury account resolution.
//!
//! Exactly one custody account carries the [`AccountRole::Treasury`] role: it
//! is the counterparty for every stake and settlement transfer. The resolver
//! is injected wherever that account is needed and locates it by a reserved
//! owner identity taken from configuration — there is no hardcoded identity
//! and no in-memory singleton. The wallet is provisioned lazily through the
//! gateway on first use.

use std::sync::Arc;

use crate::error::CoreError;
use crate::gateway::ChainGateway;
use crate::storage::{AccountRole, CustodyAccount, LedgerDb, LedgerDbError};
use crate::vault::KeyVault;

pub struct TreasuryResolver {
    db: Arc<LedgerDb>,
    gateway: Arc<dyn ChainGateway>,
    vault: Arc<KeyVault>,
    owner_id: String,
}

impl TreasuryResolver {
    pub fn new(
        db: Arc<LedgerDb>,
        gateway: Arc<dyn ChainGateway>,
        vault: Arc<KeyVault>,
        owner_id: String,
    ) -> Self {
        Self {
            db,
            gateway,
            vault,
            owner_id,
        }
    }

    /// Resolve the treasury account, provisioning it if missing.
    pub async fn resolve(&self) -> Result<CustodyAccount, CoreError> {
        if let Some(account) = self.db.account_by_owner(&self.owner_id)? {
            if account.role != AccountRole::Treasury {
                return Err(CoreError::IntegrityError(format!(
                    "account of reserved owner {} does not carry the treasury role",
                    self.owner_id
                )));
            }
            return Ok(account);
        }

        let keypair = self.gateway.create_wallet().await?;
        let ciphertext = self.vault.encrypt(&keypair.private_key)?;
        let account = CustodyAccount::new(
            self.owner_id.clone(),
            keypair.address,
            ciphertext,
            AccountRole::Treasury,
        );

        match self.db.insert_account(&account) {
            Ok(()) => {
                tracing::info!(
                    account_id = %account.account_id,
                    address = %account.address,
                    "treasury account provisioned"
                );
                Ok(account)
            }
            // Lost a provisioning race; the committed record wins.
            Err(LedgerDbError::AlreadyExists(_)) => self
                .db
                .account_by_owner(&self.owner_id)?
                .ok_or_else(|| CoreError::NotFound("treasury account".to_string())),
            Err(e) => Err(e.into()),
        }
    }
}
