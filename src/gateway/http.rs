// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP adapter for the custody REST gateway.
//!
//! The gateway holds the actual chain integration (key derivation, signing,
//! node RPC); this client only shapes requests and interprets answers. Every
//! call carries the configured timeout. A transport failure or timeout maps
//! to [`GatewayError::Unavailable`]; an answered refusal maps to
//! [`GatewayError::Rejected`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde_json::Value;

use super::{
    ChainGateway, GatewayError, Receipt, TransferPage, TransferRecord, WalletKeypair,
};

const USER_AGENT: &str = concat!("custody-server/", env!("CARGO_PKG_VERSION"));

/// Custody REST gateway client.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    http: Client,
    base_url: String,
}

impl HttpGateway {
    /// Build a client for the given base URL.
    ///
    /// `api_key`, when present, is sent as `x-api-key` on every request.
    pub fn new(
        base_url: &str,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key {
            let value = HeaderValue::from_str(key)
                .map_err(|_| GatewayError::InvalidResponse("invalid API key value".into()))?;
            headers.insert("x-api-key", value);
        }

        let http = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json(&self, path: &str) -> Result<(StatusCode, Value), GatewayError> {
        let response = self
            .http
            .get(self.url(path))
            .send()
            .await
            .map_err(classify_transport)?;
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        Ok((status, body))
    }

    /// Interpret a `{ok, txid, error}` send response.
    fn parse_send_response(status: StatusCode, body: &Value) -> Result<String, GatewayError> {
        let ok = body.get("ok").and_then(Value::as_bool).unwrap_or(false);
        let txid = body
            .get("txid")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty());

        if ok {
            if let Some(txid) = txid {
                return Ok(txid.to_string());
            }
            return Err(GatewayError::InvalidResponse(
                "send reported ok without a txid".to_string(),
            ));
        }

        let reason = body
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {status}: send failed without error message"));
        let code = body
            .get("code")
            .and_then(Value::as_str)
            .map(str::to_string);
        Err(GatewayError::Rejected { code, reason })
    }

    async fn send_transfer(
        &self,
        path: &str,
        from: &str,
        private_key: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<String, GatewayError> {
        let payload = serde_json::json!({
            "from": from,
            "pk": private_key,
            "to": to,
            "amount": amount,
        });

        let response = self
            .http
            .post(self.url(path))
            .json(&payload)
            .send()
            .await
            .map_err(classify_transport)?;
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        Self::parse_send_response(status, &body)
    }

    async fn fetch_balance(&self, path: &str, keys: &[&str]) -> Result<Decimal, GatewayError> {
        let (status, body) = self.get_json(path).await?;
        if !status.is_success() {
            let reason = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("balance query failed");
            return Err(GatewayError::Rejected {
                code: None,
                reason: format!("HTTP {status}: {reason}"),
            });
        }
        decimal_field(&body, keys).ok_or_else(|| {
            GatewayError::InvalidResponse(format!("balance response missing {keys:?}"))
        })
    }

    async fn fetch_transfers(
        &self,
        path: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<TransferPage, GatewayError> {
        let mut path = format!("{path}?limit={limit}");
        if let Some(cursor) = cursor {
            path.push_str(&format!("&cursor={cursor}"));
        }

        let (status, body) = self.get_json(&path).await?;
        if !status.is_success() {
            return Err(GatewayError::Rejected {
                code: None,
                reason: format!("HTTP {status}: transfer listing failed"),
            });
        }

        let items = body
            .get("data")
            .and_then(Value::as_array)
            .map(|entries| entries.iter().filter_map(parse_transfer).collect())
            .unwrap_or_default();
        let next_cursor = body
            .get("cursor")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(TransferPage { items, next_cursor })
    }
}

#[async_trait]
impl ChainGateway for HttpGateway {
    async fn create_wallet(&self) -> Result<WalletKeypair, GatewayError> {
        let (status, body) = self.get_json("/wallet/create").await?;
        if !status.is_success() {
            return Err(GatewayError::Rejected {
                code: None,
                reason: format!("HTTP {status}: wallet creation failed"),
            });
        }

        let address = body.get("address").and_then(Value::as_str);
        let private_key = body.get("privateKey").and_then(Value::as_str);
        match (address, private_key) {
            (Some(address), Some(private_key)) if !address.is_empty() && !private_key.is_empty() => {
                Ok(WalletKeypair {
                    address: address.to_string(),
                    private_key: private_key.to_string(),
                })
            }
            _ => Err(GatewayError::InvalidResponse(
                "wallet creation response missing address or privateKey".to_string(),
            )),
        }
    }

    async fn is_valid_address(&self, address: &str) -> Result<bool, GatewayError> {
        let (_, body) = self.get_json(&format!("/wallet/isAddress/{address}")).await?;
        Ok(body.get("ok").and_then(Value::as_bool).unwrap_or(false))
    }

    async fn native_balance(&self, address: &str) -> Result<Decimal, GatewayError> {
        self.fetch_balance(&format!("/wallet/balance/{address}"), &["balance", "native"])
            .await
    }

    async fn token_balance(&self, address: &str) -> Result<Decimal, GatewayError> {
        self.fetch_balance(&format!("/wallet/token/{address}"), &["balance", "token"])
            .await
    }

    async fn send_token(
        &self,
        from: &str,
        private_key: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<String, GatewayError> {
        self.send_transfer("/wallet/token/send", from, private_key, to, amount)
            .await
    }

    async fn send_native(
        &self,
        from: &str,
        private_key: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<String, GatewayError> {
        self.send_transfer("/wallet/native/send", from, private_key, to, amount)
            .await
    }

    async fn receipt(&self, chain_tx_id: &str) -> Result<Option<Receipt>, GatewayError> {
        let response = self
            .http
            .get(self.url(&format!("/wallet/tx/{chain_tx_id}")))
            .send()
            .await
            .map_err(classify_transport)?;

        if !response.status().is_success() {
            // The gateway answers 404 until the transaction is indexed.
            return Ok(None);
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        let result = body
            .get("receipt")
            .and_then(|r| r.get("result"))
            .and_then(Value::as_str);

        match result {
            Some(result) => Ok(Some(Receipt {
                success: result == "SUCCESS",
                raw: body,
            })),
            // Known transaction but no execution result yet.
            None => Ok(None),
        }
    }

    async fn list_token_transfers(
        &self,
        address: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<TransferPage, GatewayError> {
        self.fetch_transfers(&format!("/wallet/token/transfers/{address}"), limit, cursor)
            .await
    }

    async fn list_native_transfers(
        &self,
        address: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<TransferPage, GatewayError> {
        self.fetch_transfers(&format!("/wallet/native/transfers/{address}"), limit, cursor)
            .await
    }
}

fn classify_transport(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Unavailable("request timed out".to_string())
    } else {
        GatewayError::Unavailable(err.to_string())
    }
}

/// Read a decimal from the first matching key, accepting number or string.
fn decimal_field(body: &Value, keys: &[&str]) -> Option<Decimal> {
    for key in keys {
        if let Some(value) = body.get(*key) {
            match value {
                Value::Number(n) => {
                    if let Ok(parsed) = n.to_string().parse() {
                        return Some(parsed);
                    }
                }
                Value::String(s) => {
                    if let Ok(parsed) = s.parse() {
                        return Some(parsed);
                    }
                }
                _ => {}
            }
        }
    }
    None
}

/// Parse one transfer entry, skipping anything malformed.
fn parse_transfer(entry: &Value) -> Option<TransferRecord> {
    let chain_tx_id = entry
        .get("txid")
        .or_else(|| entry.get("transaction_id"))
        .and_then(Value::as_str)?
        .to_string();
    let from = entry.get("from").and_then(Value::as_str)?.to_string();
    let to = entry.get("to").and_then(Value::as_str)?.to_string();
    let amount = decimal_field(entry, &["amount", "value"])?;
    let timestamp_ms = entry
        .get("block_timestamp")
        .and_then(Value::as_i64)
        .unwrap_or_default();
    let confirmed = entry
        .get("confirmed")
        .and_then(Value::as_bool)
        .unwrap_or(true);

    Some(TransferRecord {
        chain_tx_id,
        from,
        to,
        amount,
        timestamp_ms,
        confirmed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parse_send_success() {
        let body = serde_json::json!({"ok": true, "txid": "abc123"});
        let txid = HttpGateway::parse_send_response(StatusCode::OK, &body).unwrap();
        assert_eq!(txid, "abc123");
    }

    #[test]
    fn parse_send_rejection_carries_reason() {
        let body = serde_json::json!({"ok": false, "error": "insufficient energy", "code": "ENERGY"});
        let err = HttpGateway::parse_send_response(StatusCode::OK, &body).unwrap_err();
        match err {
            GatewayError::Rejected { code, reason } => {
                assert_eq!(code.as_deref(), Some("ENERGY"));
                assert_eq!(reason, "insufficient energy");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn parse_send_ok_without_txid_is_invalid() {
        let body = serde_json::json!({"ok": true});
        assert!(matches!(
            HttpGateway::parse_send_response(StatusCode::OK, &body),
            Err(GatewayError::InvalidResponse(_))
        ));
    }

    #[test]
    fn decimal_field_accepts_number_and_string() {
        let body = serde_json::json!({"balance": 12.5});
        assert_eq!(decimal_field(&body, &["balance"]), Some(dec!(12.5)));

        let body = serde_json::json!({"token": "3.000001"});
        assert_eq!(
            decimal_field(&body, &["balance", "token"]),
            Some(dec!(3.000001))
        );

        let body = serde_json::json!({"balance": true});
        assert_eq!(decimal_field(&body, &["balance"]), None);
    }

    #[test]
    fn parse_transfer_skips_malformed_entries() {
        let good = serde_json::json!({
            "txid": "t1",
            "from": "A",
            "to": "B",
            "amount": "5.5",
            "block_timestamp": 1700000000000i64,
            "confirmed": true
        });
        let record = parse_transfer(&good).unwrap();
        assert_eq!(record.chain_tx_id, "t1");
        assert_eq!(record.amount, dec!(5.5));

        let missing_amount = serde_json::json!({"txid": "t2", "from": "A", "to": "B"});
        assert!(parse_transfer(&missing_amount).is_none());
    }
}
