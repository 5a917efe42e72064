// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use custody_server::api::router;
use custody_server::config::Config;
use custody_server::events::spawn_notifier;
use custody_server::gateway::{ChainGateway, HttpGateway};
use custody_server::oracle::{HttpPriceOracle, NoopPriceOracle, PriceOracle};
use custody_server::state::AppState;
use custody_server::storage::LedgerDb;
use custody_server::watcher::ConfirmationWatcher;

#[tokio::main]
async fn main() {
    init_tracing();

    let config = Config::from_env().unwrap_or_else(|e| {
        eprintln!("configuration error: {e}");
        std::process::exit(1);
    });

    let db = Arc::new(
        LedgerDb::open(&config.ledger_db_path()).expect("failed to open ledger database"),
    );

    let gateway: Arc<dyn ChainGateway> = Arc::new(
        HttpGateway::new(
            &config.gateway_url,
            config.gateway_api_key.as_deref(),
            config.gateway_timeout,
        )
        .expect("failed to build gateway client"),
    );

    let oracle: Arc<dyn PriceOracle> = match &config.price_oracle_url {
        Some(url) => Arc::new(HttpPriceOracle::new(url, Duration::from_secs(10))),
        None => Arc::new(NoopPriceOracle),
    };

    let state = AppState::build(&config, db.clone(), gateway.clone(), oracle);

    // Provision the treasury account up front so the first stake does not
    // pay the latency. Failure is tolerated: resolution retries on use.
    match state.treasury.resolve().await {
        Ok(account) => {
            tracing::info!(address = %account.address, "treasury account ready")
        }
        Err(e) => tracing::warn!(error = %e, "treasury bootstrap deferred"),
    }

    let shutdown = CancellationToken::new();

    spawn_notifier(&state.events, shutdown.clone());

    let watcher = ConfirmationWatcher::new(
        db,
        gateway,
        state.events.clone(),
        config.watcher_interval,
        config.watcher_batch,
        config.watcher_tick_timeout,
    );
    let watcher_handle = tokio::spawn(watcher.run(shutdown.clone()));

    let app = router(state);
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("failed to parse bind address");

    tracing::info!(%addr, "custody server listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind listener");
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .expect("server failed");

    // Let the watcher finish its in-flight tick before exiting.
    shutdown.cancel();
    let _ = watcher_handle.await;
    tracing::info!("custody server stopped");
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    if format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Resolve when the process receives SIGINT or SIGTERM, cancelling the
/// shared token so background tasks stop cleanly.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
    shutdown.cancel();
}
