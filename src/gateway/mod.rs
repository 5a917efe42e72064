// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Blockchain gateway integration.
//!
//! The custody service never talks to a chain node directly: wallet
//! creation, balance queries, transfer submission and receipt lookup all go
//! through an external custody REST gateway, consumed via the narrow
//! [`ChainGateway`] trait. The one distinction every caller must respect is
//! [`GatewayError::Rejected`] (explicit, terminal) versus
//! [`GatewayError::Unavailable`] (network/timeout, inconclusive).

pub mod http;
#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub use http::HttpGateway;

/// Errors from gateway operations.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The gateway answered and refused the operation. Terminal.
    #[error("gateway rejected: {reason}")]
    Rejected {
        code: Option<String>,
        reason: String,
    },

    /// Transport failure or timeout. The outcome on-chain is unknown.
    #[error("gateway unavailable: {0}")]
    Unavailable(String),

    /// The gateway answered with something we could not interpret.
    #[error("gateway response invalid: {0}")]
    InvalidResponse(String),
}

impl From<GatewayError> for crate::error::CoreError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Rejected { code, reason } => {
                crate::error::CoreError::GatewayFailure { code, reason }
            }
            GatewayError::Unavailable(msg) => crate::error::CoreError::GatewayUnavailable(msg),
            // An uninterpretable answer is as inconclusive as no answer.
            GatewayError::InvalidResponse(msg) => crate::error::CoreError::GatewayUnavailable(msg),
        }
    }
}

/// A freshly created custodial wallet. The private key exists in plaintext
/// only on this struct's way into the key vault.
#[derive(Debug, Clone)]
pub struct WalletKeypair {
    pub address: String,
    pub private_key: String,
}

/// Execution receipt for a broadcasted transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    /// Whether the chain reports successful execution.
    pub success: bool,
    /// Raw receipt payload as returned by the gateway.
    pub raw: serde_json::Value,
}

/// One historical transfer as reported by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRecord {
    pub chain_tx_id: String,
    pub from: String,
    pub to: String,
    pub amount: Decimal,
    pub timestamp_ms: i64,
    pub confirmed: bool,
}

/// A page of historical transfers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferPage {
    pub items: Vec<TransferRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Narrow contract the custody core consumes from the blockchain gateway.
#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Create a new wallet, returning its address and plaintext private key.
    async fn create_wallet(&self) -> Result<WalletKeypair, GatewayError>;

    /// Check whether an address is well-formed for the target chain.
    async fn is_valid_address(&self, address: &str) -> Result<bool, GatewayError>;

    /// Native coin balance of an address.
    async fn native_balance(&self, address: &str) -> Result<Decimal, GatewayError>;

    /// Token balance of an address.
    async fn token_balance(&self, address: &str) -> Result<Decimal, GatewayError>;

    /// Submit a signed token transfer. Returns the chain transaction id.
    async fn send_token(
        &self,
        from: &str,
        private_key: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<String, GatewayError>;

    /// Submit a signed native-coin transfer. Returns the chain transaction id.
    async fn send_native(
        &self,
        from: &str,
        private_key: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<String, GatewayError>;

    /// Look up the execution receipt for a chain transaction id.
    /// `None` means the receipt is not yet available.
    async fn receipt(&self, chain_tx_id: &str) -> Result<Option<Receipt>, GatewayError>;

    /// Historical token transfers touching an address, newest first.
    async fn list_token_transfers(
        &self,
        address: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<TransferPage, GatewayError>;

    /// Historical native transfers touching an address, newest first.
    async fn list_native_transfers(
        &self,
        address: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<TransferPage, GatewayError>;
}
