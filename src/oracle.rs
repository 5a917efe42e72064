// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Price oracle: average buy/sell quotes from a P2P advert marketplace.
//!
//! The core only consumes the resulting decimal price. Every failure mode
//! (transport, malformed body, empty advert list) collapses to `None`;
//! callers substitute the configured fallback price. An oracle outage is a
//! recoverable condition, never an error surface.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::warn;

/// Quote direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteSide {
    Buy,
    Sell,
}

impl QuoteSide {
    fn trade_type(&self) -> &'static str {
        match self {
            QuoteSide::Buy => "BUY",
            QuoteSide::Sell => "SELL",
        }
    }
}

/// Average price quotes for an asset/fiat pair.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Average price over the top `sample` adverts; `None` when no quote is
    /// available.
    async fn average_price(
        &self,
        side: QuoteSide,
        asset: &str,
        fiat: &str,
        sample: usize,
    ) -> Option<Decimal>;
}

/// HTTP adapter querying a P2P advert search endpoint.
pub struct HttpPriceOracle {
    http: Client,
    base_url: String,
}

impl HttpPriceOracle {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0")
            .build()
            .expect("reqwest client construction cannot fail with static config");
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Pull the advert prices out of a `{data: [{adv: {price: "..."}}]}` body.
    fn advert_prices(body: &Value) -> Vec<Decimal> {
        body.get("data")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        item.get("adv")?
                            .get("price")?
                            .as_str()?
                            .parse::<Decimal>()
                            .ok()
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl PriceOracle for HttpPriceOracle {
    async fn average_price(
        &self,
        side: QuoteSide,
        asset: &str,
        fiat: &str,
        sample: usize,
    ) -> Option<Decimal> {
        let payload = serde_json::json!({
            "asset": asset,
            "fiat": fiat,
            "page": 1,
            "rows": sample,
            "tradeType": side.trade_type(),
        });

        let response = self
            .http
            .post(format!("{}/adv/search", self.base_url))
            .json(&payload)
            .send()
            .await;

        let body: Value = match response {
            Ok(r) if r.status().is_success() => match r.json().await {
                Ok(body) => body,
                Err(e) => {
                    warn!(error = %e, "price oracle returned unparseable body");
                    return None;
                }
            },
            Ok(r) => {
                warn!(status = %r.status(), "price oracle returned error status");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "price oracle unreachable");
                return None;
            }
        };

        let prices = Self::advert_prices(&body);
        if prices.is_empty() {
            return None;
        }

        let sum: Decimal = prices.iter().copied().sum();
        Some(sum / Decimal::from(prices.len() as u64))
    }
}

/// Oracle used when no endpoint is configured: never has a quote, so the
/// configured fallback price always applies.
pub struct NoopPriceOracle;

#[async_trait]
impl PriceOracle for NoopPriceOracle {
    async fn average_price(
        &self,
        _side: QuoteSide,
        _asset: &str,
        _fiat: &str,
        _sample: usize,
    ) -> Option<Decimal> {
        None
    }
}
