// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Scripted in-memory gateway for tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::{
    ChainGateway, GatewayError, Receipt, TransferPage, TransferRecord, WalletKeypair,
};

/// Scripted receipt outcome for one chain transaction id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptScript {
    /// Receipt not yet available.
    Pending,
    /// Receipt reports successful execution.
    Succeeds,
    /// Receipt reports a failed/reverted execution.
    Fails,
    /// The lookup itself errors (network/timeout).
    Errors,
}

/// One recorded transfer submission.
#[derive(Debug, Clone)]
pub struct SentTransfer {
    pub from: String,
    pub to: String,
    pub amount: Decimal,
    pub native: bool,
}

#[derive(Default)]
struct Inner {
    wallet_seq: u32,
    token_balances: HashMap<String, Decimal>,
    native_balances: HashMap<String, Decimal>,
    invalid_addresses: HashSet<String>,
    send_scripts: VecDeque<Result<String, GatewayError>>,
    send_seq: u32,
    sent: Vec<SentTransfer>,
    receipts: HashMap<String, ReceiptScript>,
    token_transfers: Vec<TransferRecord>,
}

/// In-memory [`ChainGateway`] with scriptable outcomes.
///
/// Sends succeed with generated txids unless an outcome was queued with
/// [`script_send`](Self::script_send). Receipts default to `Pending`.
#[derive(Default)]
pub struct MockGateway {
    inner: Mutex<Inner>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_token_balance(&self, address: &str, balance: Decimal) {
        let mut inner = self.inner.lock().unwrap();
        inner.token_balances.insert(address.to_string(), balance);
    }

    pub fn set_native_balance(&self, address: &str, balance: Decimal) {
        let mut inner = self.inner.lock().unwrap();
        inner.native_balances.insert(address.to_string(), balance);
    }

    pub fn mark_invalid_address(&self, address: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.invalid_addresses.insert(address.to_string());
    }

    /// Queue the outcome of the next transfer submission.
    pub fn script_send(&self, outcome: Result<String, GatewayError>) {
        let mut inner = self.inner.lock().unwrap();
        inner.send_scripts.push_back(outcome);
    }

    pub fn script_receipt(&self, chain_tx_id: &str, script: ReceiptScript) {
        let mut inner = self.inner.lock().unwrap();
        inner.receipts.insert(chain_tx_id.to_string(), script);
    }

    pub fn push_token_transfer(&self, record: TransferRecord) {
        let mut inner = self.inner.lock().unwrap();
        inner.token_transfers.push(record);
    }

    /// All transfer submissions recorded so far.
    pub fn sent(&self) -> Vec<SentTransfer> {
        self.inner.lock().unwrap().sent.clone()
    }

    fn record_send(
        &self,
        from: &str,
        to: &str,
        amount: Decimal,
        native: bool,
    ) -> Result<String, GatewayError> {
        let mut inner = self.inner.lock().unwrap();
        let outcome = match inner.send_scripts.pop_front() {
            Some(outcome) => outcome,
            None => {
                inner.send_seq += 1;
                Ok(format!("mock-tx-{}", inner.send_seq))
            }
        };
        // Only answered submissions reach the chain; an unavailable gateway
        // may or may not have seen the request, but the mock records nothing.
        if outcome.is_ok() || matches!(outcome, Err(GatewayError::Rejected { .. })) {
            inner.sent.push(SentTransfer {
                from: from.to_string(),
                to: to.to_string(),
                amount,
                native,
            });
        }
        outcome
    }
}

#[async_trait]
impl ChainGateway for MockGateway {
    async fn create_wallet(&self) -> Result<WalletKeypair, GatewayError> {
        let mut inner = self.inner.lock().unwrap();
        inner.wallet_seq += 1;
        Ok(WalletKeypair {
            address: format!("mock-addr-{}", inner.wallet_seq),
            private_key: format!("mock-key-{}", inner.wallet_seq),
        })
    }

    async fn is_valid_address(&self, address: &str) -> Result<bool, GatewayError> {
        let inner = self.inner.lock().unwrap();
        Ok(!inner.invalid_addresses.contains(address))
    }

    async fn native_balance(&self, address: &str) -> Result<Decimal, GatewayError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .native_balances
            .get(address)
            .copied()
            .unwrap_or(Decimal::ZERO))
    }

    async fn token_balance(&self, address: &str) -> Result<Decimal, GatewayError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .token_balances
            .get(address)
            .copied()
            .unwrap_or(Decimal::ZERO))
    }

    async fn send_token(
        &self,
        from: &str,
        _private_key: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<String, GatewayError> {
        self.record_send(from, to, amount, false)
    }

    async fn send_native(
        &self,
        from: &str,
        _private_key: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<String, GatewayError> {
        self.record_send(from, to, amount, true)
    }

    async fn receipt(&self, chain_tx_id: &str) -> Result<Option<Receipt>, GatewayError> {
        let inner = self.inner.lock().unwrap();
        match inner
            .receipts
            .get(chain_tx_id)
            .copied()
            .unwrap_or(ReceiptScript::Pending)
        {
            ReceiptScript::Pending => Ok(None),
            ReceiptScript::Succeeds => Ok(Some(Receipt {
                success: true,
                raw: serde_json::json!({"receipt": {"result": "SUCCESS"}, "id": chain_tx_id}),
            })),
            ReceiptScript::Fails => Ok(Some(Receipt {
                success: false,
                raw: serde_json::json!({"receipt": {"result": "REVERT"}, "id": chain_tx_id}),
            })),
            ReceiptScript::Errors => {
                Err(GatewayError::Unavailable("scripted outage".to_string()))
            }
        }
    }

    async fn list_token_transfers(
        &self,
        address: &str,
        limit: usize,
        _cursor: Option<&str>,
    ) -> Result<TransferPage, GatewayError> {
        let inner = self.inner.lock().unwrap();
        let items = inner
            .token_transfers
            .iter()
            .filter(|t| t.from == address || t.to == address)
            .take(limit)
            .cloned()
            .collect();
        Ok(TransferPage {
            items,
            next_cursor: None,
        })
    }

    async fn list_native_transfers(
        &self,
        _address: &str,
        _limit: usize,
        _cursor: Option<&str>,
    ) -> Result<TransferPage, GatewayError> {
        Ok(TransferPage {
            items: Vec::new(),
            next_cursor: None,
        })
    }
}
