#![allow(dead_code)]

mod config;
mod execution;
mod feeds;
mod models;
mod orderbook;
mod risk;
mod signals;
mod storage;
mod telemetry;

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::execution::auth::{ApiCredentials, AuthManager};
use crate::execution::executor::PairedExecutor;
use crate::execution::rest::ClobClient;
use crate::execution::venue::VenueApi;
use crate::feeds::market_ws::MarketStream;
use crate::models::order::ExecutionStatus;
use crate::models::position::PairedPosition;
use crate::orderbook::BookStore;
use crate::risk::position_ledger::PositionLedger;
use crate::risk::risk_manager::RiskManager;
use crate::signals::convergence::ConvergenceDetector;
use crate::signals::parity::ParityDetector;
use crate::storage::PositionStore;
use crate::telemetry::metrics::MetricsCollector;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("paribot starting — parity arbitrage on paired YES/NO books");

    let config = Config::from_env();
    if let Err(e) = config.validate() {
        error!("configuration invalid: {e}");
        std::process::exit(1);
    }

    info!(
        "config: markets={} min_edge={} slippage_buffer={} max_notional={} max_open_pairs={}",
        config.markets.len(),
        config.trading.min_edge,
        config.trading.slippage_buffer,
        config.trading.max_notional_per_trade,
        config.trading.max_open_pairs,
    );

    // === Storage and recovery ===

    let storage = match PositionStore::open(&config.db_path) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("cannot open state store at {}: {e}", config.db_path);
            std::process::exit(1);
        }
    };

    let ledger = Arc::new(PositionLedger::new(config.trading.max_open_pairs));
    for position in storage.get_open_positions() {
        info!(
            "recovered open position: id={} market={} size={}",
            position.position_id, position.condition_id, position.size
        );
        ledger.add(position).await;
    }

    // === Market data ===

    let books = Arc::new(BookStore::new());
    for market in &config.markets {
        books.add_market(
            &market.condition_id,
            &market.yes_token_id,
            &market.no_token_id,
            market.tick_size,
            market.neg_risk,
        );
        info!("tracking market {}", market.condition_id);
    }

    // === Venue client and auth ===

    let creds = match (&config.api_key, &config.api_secret, &config.api_passphrase) {
        (Some(key), Some(secret), Some(passphrase)) => Some(ApiCredentials {
            api_key: key.clone(),
            api_secret: secret.clone(),
            api_passphrase: passphrase.clone(),
        }),
        _ => None,
    };
    let auth = AuthManager::new(&config.private_key, config.connection.chain_id, creds.clone());
    let venue = Arc::new(ClobClient::new(&config.connection, auth));

    if let Err(e) = venue.init_auth().await {
        error!("venue authentication failed: {e}");
        std::process::exit(1);
    }
    info!("venue auth ready for {}", venue.wallet_address().await);

    // === Core components ===

    let detector = Arc::new(ParityDetector::new(
        books.clone(),
        &config.fees,
        &config.trading,
    ));
    let convergence = Arc::new(ConvergenceDetector::new(
        books.clone(),
        config.trading.convergence_threshold,
    ));
    let risk = Arc::new(RiskManager::new(
        config.risk.clone(),
        config.trading.clone(),
        ledger.clone(),
    ));
    let executor = Arc::new(PairedExecutor::new(
        venue.clone(),
        config.funder_address.clone(),
        Duration::from_secs(config.trading.order_timeout_seconds),
    ));
    let metrics = Arc::new(MetricsCollector::new());

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // === Stream task ===

    let stream = MarketStream::new(
        config.connection.clob_ws_url.clone(),
        Duration::from_secs(config.connection.ws_reconnect_delay_seconds),
        Duration::from_secs(config.connection.ws_ping_interval_seconds),
        creds,
    );
    stream.start(
        books.clone(),
        risk.clone(),
        metrics.clone(),
        shutdown_tx.subscribe(),
    );

    // === Trading task: gate → best signal → size check → dual-leg entry ===

    {
        let detector = detector.clone();
        let risk = risk.clone();
        let executor = executor.clone();
        let ledger = ledger.clone();
        let storage = storage.clone();
        let metrics = metrics.clone();
        let min_edge = config.trading.min_edge;
        let mut shutdown_rx = shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(100));
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let gate = risk.check_can_trade().await;
                        if !gate.passed {
                            debug!("trading blocked: {}", gate.message);
                            continue;
                        }

                        let Some(signal) = detector.best(min_edge) else { continue };
                        metrics.record_signal();

                        let size_check = risk
                            .check_trade_size(signal.max_size, signal.combined_cost)
                            .await;
                        if !size_check.passed {
                            debug!("size rejected: {}", size_check.message);
                            continue;
                        }

                        metrics.record_trade_attempt();
                        let result = executor.execute_entry(&signal, None).await;

                        match result.status {
                            ExecutionStatus::Complete | ExecutionStatus::Partial
                                if result.matched_size > Decimal::ZERO =>
                            {
                                let mut position = PairedPosition::from_entry(&result);
                                if let Some(err) = &result.error {
                                    position.notes = format!("needs review: {err}");
                                }
                                ledger.add(position.clone()).await;
                                if let Err(e) = storage.save_position(&position) {
                                    error!("position save failed: {e}");
                                }
                                if result.status == ExecutionStatus::Complete {
                                    metrics.record_trade_success();
                                } else {
                                    metrics.record_trade_partial();
                                }
                                risk.record_trade(result.error.is_none()).await;
                            }
                            _ => {
                                metrics.record_trade_failure();
                                risk.record_trade(false).await;
                                warn!(
                                    "entry failed for {}: {}",
                                    result.condition_id,
                                    result.error.unwrap_or_default()
                                );
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });
    }

    // === Exit task: convergence check over open positions ===

    {
        let convergence = convergence.clone();
        let executor = executor.clone();
        let ledger = ledger.clone();
        let storage = storage.clone();
        let risk = risk.clone();
        let metrics = metrics.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        for position in ledger.open_positions().await {
                            let (should_exit, reason) =
                                convergence.should_exit(&position.condition_id);
                            if !should_exit {
                                continue;
                            }
                            info!(
                                "exit triggered: id={} reason={reason:?}",
                                position.position_id
                            );

                            let result = executor
                                .execute_exit(
                                    &position.condition_id,
                                    &position.yes_token_id,
                                    &position.no_token_id,
                                    position.size,
                                )
                                .await;

                            if result.status == ExecutionStatus::Complete {
                                let proceeds = result.yes_leg.fill_notional()
                                    + result.no_leg.fill_notional();
                                if let Some(closed) = ledger
                                    .close(
                                        &position.position_id,
                                        result.yes_leg.price,
                                        result.no_leg.price,
                                        proceeds,
                                    )
                                    .await
                                {
                                    if let Err(e) = storage.save_position(&closed) {
                                        error!("position save failed: {e}");
                                    }
                                    metrics.record_position_closed(closed.realized_pnl);
                                    risk.record_pnl(closed.realized_pnl).await;
                                }
                            } else {
                                warn!(
                                    "exit incomplete for {}: {:?} {}",
                                    position.position_id,
                                    result.status,
                                    result.error.unwrap_or_default()
                                );
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });
    }

    // === Health task ===

    {
        let risk = risk.clone();
        let interval_secs = config.risk.health_check_interval_seconds;
        let mut shutdown_rx = shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let report = risk.health().await;
                        if report.healthy {
                            debug!("health ok");
                        } else {
                            warn!("health issues: {}", report.issues.join("; "));
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });
    }

    // === Persistence task ===

    {
        let ledger = ledger.clone();
        let storage = storage.clone();
        let metrics = metrics.clone();
        let risk = risk.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let positions = ledger.all_positions().await;
                        if let Err(e) = storage.save_positions(&positions) {
                            error!("state save failed: {e}");
                        }
                        if let Err(e) =
                            storage.save_state("session_metrics", metrics.session_metrics())
                        {
                            error!("metrics save failed: {e}");
                        }
                        if let Err(e) = storage.save_state("risk_status", risk.status().await) {
                            error!("risk status save failed: {e}");
                        }
                        debug!("state saved: {} positions", positions.len());
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });
    }

    info!("paribot running — trading, exit, health, and persistence loops active");

    wait_for_shutdown().await;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(());

    // Stop taking entries, flatten venue state, persist ours.
    if let Err(e) = venue.cancel_all().await {
        error!("cancel-all on shutdown failed: {e}");
    }
    let positions = ledger.all_positions().await;
    if let Err(e) = storage.save_positions(&positions) {
        error!("final state save failed: {e}");
    }
    if let Err(e) = storage.save_state("session_metrics", metrics.session_metrics()) {
        error!("final metrics save failed: {e}");
    }
    metrics.log_summary();

    info!("paribot shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}
