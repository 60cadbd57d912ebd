// ------------------------------------------------------------
// Data-plane entry point
// ------------------------------------------------------------
//
// This is the main runtime for the market-state collector.
//
// Responsibilities:
// - Initialize cryptography backend (rustls)
// - Load configuration
// - Bind the PUB endpoint and open the state store
// - Start one feed task per (exchange, instrument)
// - Run the fixed-cadence snapshot loop until shutdown
//
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use log::info;
use rustls::crypto::{CryptoProvider, ring};

use market_state_collector::aggregator::MarketAggregator;
use market_state_collector::collector::runner::spawn_feeds;
use market_state_collector::config::Config;
use market_state_collector::metrics::METRICS;
use market_state_collector::publisher::Publisher;
use market_state_collector::snapshot::run_snapshot_loop;
use market_state_collector::store::StateStore;

#[tokio::main]
async fn main() -> Result<()> {
    // rustls >= 0.23 requires an explicit CryptoProvider installation,
    // exactly once and as early as possible in the process lifecycle.
    CryptoProvider::install_default(ring::default_provider())
        .expect("failed to install rustls CryptoProvider");

    env_logger::init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.json".to_string());
    // A broken configuration is the only non-zero exit of this process.
    let config = Config::load(&config_path)?;

    let publisher = Publisher::bind(&config.bind_addr).await?;
    let store = Arc::new(StateStore::new(&config.db_path));
    store.start()?;

    let aggregator = Arc::new(MarketAggregator::new());
    let running = Arc::new(AtomicBool::new(true));

    let choice = config.exchange_choice();
    info!(
        "collecting {:?} x {:?}, depth {}, sampling every {} ms",
        choice.names(),
        config.instruments,
        config.order_book_depth,
        config.order_book_poll_frequency_in_ms
    );

    let _feeds = spawn_feeds(
        choice,
        &config.instruments,
        config.order_book_depth,
        &aggregator,
        &running,
    );

    let snapshot_task = tokio::spawn(run_snapshot_loop(
        aggregator,
        publisher,
        store.clone(),
        config.order_book_poll_frequency_in_ms,
        running.clone(),
    ));

    let metrics_task = tokio::spawn(async {
        let mut tick = tokio::time::interval(std::time::Duration::from_secs(30));
        tick.tick().await;
        loop {
            tick.tick().await;
            info!(
                "ws_active={} reconnects={} frames={} quotes={} published={} pub_drops={} db_rows={} db_drops={}",
                METRICS.ws_connections_active.load(Ordering::Relaxed),
                METRICS.ws_reconnects.load(Ordering::Relaxed),
                METRICS.frames_received.load(Ordering::Relaxed),
                METRICS.quotes_emitted.load(Ordering::Relaxed),
                METRICS.snapshots_published.load(Ordering::Relaxed),
                METRICS.publish_drops.load(Ordering::Relaxed),
                METRICS.db_rows_written.load(Ordering::Relaxed),
                METRICS.db_drops.load(Ordering::Relaxed),
            );
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    running.store(false, Ordering::SeqCst);
    metrics_task.abort();
    let _ = snapshot_task.await;
    store.stop();

    Ok(())
}
