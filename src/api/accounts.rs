// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Custody account endpoints: onboarding and balances.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::balance::Balances;
use crate::error::{ApiError, CoreError};
use crate::state::AppState;
use crate::storage::{AccountRole, CustodyAccount, LedgerDbError};

/// Request to provision a custody account for a user.
#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub user_id: String,
}

/// Account view returned to clients. Never includes key material.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub account_id: String,
    pub user_id: String,
    pub address: String,
    pub created_at: DateTime<Utc>,
}

impl From<CustodyAccount> for AccountResponse {
    fn from(account: CustodyAccount) -> Self {
        Self {
            account_id: account.account_id,
            user_id: account.owner_user_id,
            address: account.address,
            created_at: account.created_at,
        }
    }
}

/// Provision a custody account: one per user, created exactly once.
pub async fn create_account(
    State(state): State<AppState>,
    Json(request): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<AccountResponse>), ApiError> {
    let user_id = request.user_id.trim();
    if user_id.is_empty() {
        return Err(ApiError::bad_request("user_id must not be empty"));
    }
    if state
        .db
        .account_by_owner(user_id)
        .map_err(CoreError::from)?
        .is_some()
    {
        return Err(ApiError::conflict("account already exists for this user"));
    }

    let keypair = state.gateway.create_wallet().await.map_err(CoreError::from)?;
    let ciphertext = state
        .vault
        .encrypt(&keypair.private_key)
        .map_err(CoreError::from)?;

    let account = CustodyAccount::new(
        user_id.to_string(),
        keypair.address,
        ciphertext,
        AccountRole::User,
    );
    state.db.insert_account(&account).map_err(|e| match e {
        LedgerDbError::AlreadyExists(_) => {
            ApiError::conflict("account already exists for this user")
        }
        other => CoreError::from(other).into(),
    })?;

    tracing::info!(
        account_id = %account.account_id,
        address = %account.address,
        "custody account created"
    );
    Ok((StatusCode::CREATED, Json(account.into())))
}

/// Fetch the custody account of a user.
pub async fn get_account(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = resolve_account(&state, &user_id)?;
    Ok(Json(account.into()))
}

/// Fetch balances: native, token, locked-in-staking, available.
pub async fn get_balances(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Balances>, ApiError> {
    let account = resolve_account(&state, &user_id)?;
    let balances = state.balances.balances(&account.account_id).await?;
    Ok(Json(balances))
}

/// Look up the custody account behind a user id.
pub(super) fn resolve_account(state: &AppState, user_id: &str) -> Result<CustodyAccount, ApiError> {
    state
        .db
        .account_by_owner(user_id)
        .map_err(CoreError::from)?
        .ok_or_else(|| ApiError::not_found("account not found"))
}
