// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Staking endpoints: open, list, close.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;

use super::accounts::resolve_account;
use crate::error::ApiError;
use crate::staking::{CloseOutcome, StakeView};
use crate::state::AppState;
use crate::storage::StakePosition;

#[derive(Debug, Deserialize)]
pub struct OpenStakeRequest {
    pub amount: Decimal,
}

/// Open a stake: moves the principal to the treasury and starts accrual.
pub async fn open_stake(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<OpenStakeRequest>,
) -> Result<(StatusCode, Json<StakePosition>), ApiError> {
    let account = resolve_account(&state, &user_id)?;
    let stake = state.stakes.open(&account.account_id, request.amount).await?;
    Ok((StatusCode::CREATED, Json(stake)))
}

/// List a user's stake positions with live accrued interest, newest first.
pub async fn list_stakes(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<StakeView>>, ApiError> {
    let account = resolve_account(&state, &user_id)?;
    let views = state.stakes.list(&account.account_id)?;
    Ok(Json(views))
}

/// Close a stake: returns principal plus accrued rewards to the user.
pub async fn close_stake(
    State(state): State<AppState>,
    Path((user_id, stake_id)): Path<(String, String)>,
) -> Result<Json<CloseOutcome>, ApiError> {
    let account = resolve_account(&state, &user_id)?;
    let outcome = state.stakes.close(&account.account_id, &stake_id).await?;
    Ok(Json(outcome))
}
