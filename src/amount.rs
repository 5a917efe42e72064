// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Fixed-point token amount helpers.
//!
//! The custody token carries 6 fractional digits natively. All amounts that
//! enter the ledger are validated against that precision, and all interest
//! arithmetic is rounded to 6 decimal places half-away-from-zero.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::CoreError;

/// Native precision of the custody token.
pub const TOKEN_DECIMALS: u32 = 6;

/// Round to the token's native precision, half away from zero.
pub fn round6(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(TOKEN_DECIMALS, RoundingStrategy::MidpointAwayFromZero)
}

/// Validate that `value` is a positive amount expressible at 6 decimals.
pub fn validate_amount(value: Decimal) -> Result<Decimal, CoreError> {
    if value <= Decimal::ZERO {
        return Err(CoreError::InvalidAmount(
            "amount must be greater than zero".to_string(),
        ));
    }
    if value.normalize().scale() > TOKEN_DECIMALS {
        return Err(CoreError::InvalidAmount(format!(
            "amount has more than {TOKEN_DECIMALS} decimal places"
        )));
    }
    Ok(value)
}
