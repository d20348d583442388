// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Vloo Labs

use std::{env, net::SocketAddr};

use tracing_subscriber::EnvFilter;

use vloo_rust_server::api::router;
use vloo_rust_server::config::{DATA_DIR_ENV, DEFAULT_PORT, HOST_ENV, LOG_FORMAT_ENV, PORT_ENV};
use vloo_rust_server::ledger::GiftLedger;
use vloo_rust_server::state::AppState;
use vloo_rust_server::storage::{AuditRepository, GiftDatabase, StoragePaths};

#[tokio::main]
async fn main() {
    init_tracing();

    // Open persistent storage
    let paths = match env::var(DATA_DIR_ENV) {
        Ok(dir) => StoragePaths::new(dir),
        Err(_) => StoragePaths::default(),
    };
    let db = GiftDatabase::open(&paths.gift_db_file()).expect("Failed to open gift database");

    // Initialize application state
    let ledger = GiftLedger::new(db);
    let state = AppState::new(ledger, AuditRepository::new(paths));
    let app = router(state);

    // Parse bind address
    let host = env::var(HOST_ENV).unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = env::var(PORT_ENV)
        .unwrap_or_else(|_| DEFAULT_PORT.to_string())
        .parse()
        .unwrap_or(DEFAULT_PORT);

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .expect("Failed to parse bind address");

    tracing::info!(%addr, "Vloo server listening (docs at /docs)");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind server address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server failed");
}

/// Resolve until Ctrl+C so axum can drain in-flight requests.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received");
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    let json = env::var(LOG_FORMAT_ENV)
        .map(|format| format == "json")
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
