// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Transfer endpoints: custodial sends and transaction history.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::accounts::resolve_account;
use crate::error::{ApiError, CoreError};
use crate::gateway::TransferPage;
use crate::state::AppState;
use crate::storage::{LedgerTransaction, TxState};
use crate::transfer::TransferReceipt;

/// Header carrying the caller's idempotency token.
const IDEMPOTENCY_HEADER: &str = "idempotency-key";

/// Cap on history page sizes.
const MAX_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub to_address: String,
    pub amount: Decimal,
}

/// Ledger transaction view.
#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub tx_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_tx_id: Option<String>,
    pub to_address: String,
    pub amount: Decimal,
    pub state: TxState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<LedgerTransaction> for TransactionResponse {
    fn from(tx: LedgerTransaction) -> Self {
        Self {
            tx_id: tx.tx_id,
            chain_tx_id: tx.chain_tx_id,
            to_address: tx.to_address,
            amount: tx.amount,
            state: tx.state,
            fail_code: tx.fail_code,
            fail_reason: tx.fail_reason,
            created_at: tx.created_at,
            updated_at: tx.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
    /// Filter by ledger state (`pending`, `broadcasted`, `confirmed`, `failed`).
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OnChainQuery {
    pub limit: Option<usize>,
    pub cursor: Option<String>,
    /// `token` (default) or `native`.
    pub kind: Option<String>,
}

/// Send tokens from a user's custody account.
///
/// Success means the transfer is `broadcasted`; final settlement is
/// reconciled asynchronously by the confirmation watcher. Clients retrying
/// on timeouts should set the `Idempotency-Key` header.
pub async fn send(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<SendRequest>,
) -> Result<(StatusCode, Json<TransferReceipt>), ApiError> {
    let account = resolve_account(&state, &user_id)?;

    let idempotency_key = headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty());

    let receipt = state
        .transfers
        .send(
            &account.account_id,
            request.to_address.trim(),
            request.amount,
            idempotency_key,
        )
        .await?;

    Ok((StatusCode::ACCEPTED, Json(receipt)))
}

/// List locally tracked transactions for a user, newest first.
pub async fn list_transactions(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<TransactionResponse>>, ApiError> {
    let account = resolve_account(&state, &user_id)?;

    let state_filter = match query.status.as_deref() {
        None => None,
        Some("pending") => Some(TxState::Pending),
        Some("broadcasted") => Some(TxState::Broadcasted),
        Some("confirmed") => Some(TxState::Confirmed),
        Some("failed") => Some(TxState::Failed),
        Some(other) => {
            return Err(ApiError::bad_request(format!("unknown status filter: {other}")))
        }
    };
    let limit = query.limit.unwrap_or(25).clamp(1, MAX_LIMIT);

    let transactions = state
        .db
        .transactions_by_account(&account.account_id, limit, state_filter)
        .map_err(CoreError::from)?;

    Ok(Json(
        transactions.into_iter().map(TransactionResponse::from).collect(),
    ))
}

/// List on-chain transfers for a user's address, as the gateway reports them.
pub async fn list_onchain_transfers(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<OnChainQuery>,
) -> Result<Json<TransferPage>, ApiError> {
    let account = resolve_account(&state, &user_id)?;

    let limit = query.limit.unwrap_or(25).clamp(1, MAX_LIMIT);
    let cursor = query.cursor.as_deref();

    let page = match query.kind.as_deref().unwrap_or("token") {
        "token" => {
            state
                .gateway
                .list_token_transfers(&account.address, limit, cursor)
                .await
        }
        "native" => {
            state
                .gateway
                .list_native_transfers(&account.address, limit, cursor)
                .await
        }
        other => return Err(ApiError::bad_request(format!("unknown transfer kind: {other}"))),
    }
    .map_err(CoreError::from)?;

    Ok(Json(page))
}
