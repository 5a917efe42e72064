// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment at startup into a [`Config`]
//! value that the rest of the application borrows.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Directory for the embedded ledger database | `/data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `MASTER_KEY_HEX` | 32-byte key-vault master key (64 hex chars) | Required |
//! | `GATEWAY_URL` | Base URL of the blockchain custody gateway | Required |
//! | `GATEWAY_API_KEY` | API key sent as `x-api-key` to the gateway | Optional |
//! | `GATEWAY_TIMEOUT_SECS` | Per-call gateway timeout | `30` |
//! | `TREASURY_OWNER_ID` | Reserved owner identity of the treasury account | `treasury` |
//! | `STAKE_DAILY_RATE_BP` | Daily interest rate in basis points | `10` |
//! | `STAKE_MIN_AMOUNT` | Minimum stake principal | `10` |
//! | `STAKE_MAX_AMOUNT` | Maximum stake principal | `10000` |
//! | `SETTLEMENT_CAP` | Upper bound for any single settlement transfer | `1000000` |
//! | `WATCHER_INTERVAL_MS` | Confirmation watcher tick interval | `8000` |
//! | `WATCHER_BATCH` | Broadcasted rows examined per tick | `25` |
//! | `WATCHER_TICK_TIMEOUT_SECS` | Guard on a single watcher tick | `60` |
//! | `BALANCE_CACHE_TTL_SECS` | TTL of the read-side balance cache | `5` |
//! | `IDEMPOTENCY_TTL_SECS` | Retention window for idempotency tokens | `600` |
//! | `PRICE_ORACLE_URL` | Base URL of the price oracle | Optional |
//! | `FALLBACK_PRICE` | Price used when the oracle has no quote | `1.0` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use rust_decimal::Decimal;

/// Environment variable name for the ledger data directory.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// File name of the embedded ledger database inside `DATA_DIR`.
pub const LEDGER_DB_FILE: &str = "ledger.redb";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Parsed runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub master_key: [u8; 32],
    pub gateway_url: String,
    pub gateway_api_key: Option<String>,
    pub gateway_timeout: Duration,
    pub treasury_owner_id: String,
    pub stake_daily_rate_bp: u32,
    pub stake_min_amount: Decimal,
    pub stake_max_amount: Decimal,
    pub settlement_cap: Decimal,
    pub watcher_interval: Duration,
    pub watcher_batch: usize,
    pub watcher_tick_timeout: Duration,
    pub balance_cache_ttl: Duration,
    pub idempotency_ttl: Duration,
    pub price_oracle_url: Option<String>,
    pub fallback_price: Decimal,
}

impl Config {
    /// Load configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let master_key_hex = env::var("MASTER_KEY_HEX")
            .map_err(|_| ConfigError::Missing("MASTER_KEY_HEX"))?;
        let master_key = parse_master_key(&master_key_hex)?;

        let gateway_url = env::var("GATEWAY_URL").map_err(|_| ConfigError::Missing("GATEWAY_URL"))?;

        Ok(Self {
            host: env_or("HOST", "0.0.0.0"),
            port: parse_env("PORT", 8080)?,
            data_dir: PathBuf::from(env_or(DATA_DIR_ENV, "/data")),
            master_key,
            gateway_url,
            gateway_api_key: env::var("GATEWAY_API_KEY").ok().filter(|v| !v.is_empty()),
            gateway_timeout: Duration::from_secs(parse_env("GATEWAY_TIMEOUT_SECS", 30u64)?),
            treasury_owner_id: env_or("TREASURY_OWNER_ID", "treasury"),
            stake_daily_rate_bp: parse_env("STAKE_DAILY_RATE_BP", 10u32)?,
            stake_min_amount: parse_decimal_env("STAKE_MIN_AMOUNT", Decimal::from(10))?,
            stake_max_amount: parse_decimal_env("STAKE_MAX_AMOUNT", Decimal::from(10_000))?,
            settlement_cap: parse_decimal_env("SETTLEMENT_CAP", Decimal::from(1_000_000))?,
            watcher_interval: Duration::from_millis(parse_env("WATCHER_INTERVAL_MS", 8000u64)?),
            watcher_batch: parse_env("WATCHER_BATCH", 25usize)?,
            watcher_tick_timeout: Duration::from_secs(parse_env(
                "WATCHER_TICK_TIMEOUT_SECS",
                60u64,
            )?),
            balance_cache_ttl: Duration::from_secs(parse_env("BALANCE_CACHE_TTL_SECS", 5u64)?),
            idempotency_ttl: Duration::from_secs(parse_env("IDEMPOTENCY_TTL_SECS", 600u64)?),
            price_oracle_url: env::var("PRICE_ORACLE_URL").ok().filter(|v| !v.is_empty()),
            fallback_price: parse_decimal_env("FALLBACK_PRICE", Decimal::ONE)?,
        })
    }

    /// Path of the embedded ledger database file.
    pub fn ledger_db_path(&self) -> PathBuf {
        self.data_dir.join(LEDGER_DB_FILE)
    }
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

fn parse_decimal_env(name: &'static str, default: Decimal) -> Result<Decimal, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|e: rust_decimal::Error| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

fn parse_master_key(raw: &str) -> Result<[u8; 32], ConfigError> {
    let bytes = hex::decode(raw.trim()).map_err(|e| ConfigError::Invalid {
        name: "MASTER_KEY_HEX",
        reason: e.to_string(),
    })?;
    bytes.try_into().map_err(|_| ConfigError::Invalid {
        name: "MASTER_KEY_HEX",
        reason: "must be 32 bytes (64 hex chars)".to_string(),
    })
}
