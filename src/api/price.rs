// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Price quote endpoint. Oracle outages degrade to the configured fallback.

use axum::{
    extract::{Query, State},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::oracle::QuoteSide;
use crate::state::AppState;

/// Cap on the advert sample size.
const MAX_SAMPLE: usize = 50;

#[derive(Debug, Deserialize)]
pub struct PriceQuery {
    pub asset: Option<String>,
    pub fiat: Option<String>,
    /// `buy` (default) or `sell`.
    pub side: Option<String>,
    pub sample: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct PriceResponse {
    pub asset: String,
    pub fiat: String,
    pub side: String,
    pub price: Decimal,
    /// `oracle` when quoted live, `fallback` when the oracle had no answer.
    pub source: String,
}

/// Average buy/sell price for an asset/fiat pair.
pub async fn get_price(
    State(state): State<AppState>,
    Query(query): Query<PriceQuery>,
) -> Result<Json<PriceResponse>, ApiError> {
    let asset = query.asset.unwrap_or_else(|| "TOKEN".to_string());
    let fiat = query.fiat.unwrap_or_else(|| "USD".to_string());
    let sample = query.sample.unwrap_or(10).clamp(1, MAX_SAMPLE);
    let side = match query.side.as_deref().unwrap_or("buy") {
        "buy" => QuoteSide::Buy,
        "sell" => QuoteSide::Sell,
        other => return Err(ApiError::bad_request(format!("unknown side: {other}"))),
    };

    let quoted = state.oracle.average_price(side, &asset, &fiat, sample).await;
    let (price, source) = match quoted {
        Some(price) => (price, "oracle"),
        None => (state.fallback_price, "fallback"),
    };

    Ok(Json(PriceResponse {
        asset,
        fiat,
        side: match side {
            QuoteSide::Buy => "buy".to_string(),
            QuoteSide::Sell => "sell".to_string(),
        },
        price,
        source: source.to_string(),
    }))
}
