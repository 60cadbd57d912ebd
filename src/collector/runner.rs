use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::time::{Duration, interval, sleep};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::aggregator::MarketAggregator;
use crate::config::ExchangeChoice;
use crate::exchanges::adapter::{ExchangeAdapter, ParseResult};
use crate::exchanges::make_feed;
use crate::metrics::METRICS;
use crate::util::now_ms;

/// Reconnect backoff: exponential from 1 s to 30 s, plus jitter of up to a
/// quarter of the current delay. Resets after a successful subscribe.
const RECONNECT_BASE_DELAY_MS: u64 = 1_000;
const RECONNECT_MAX_DELAY_MS: u64 = 30_000;

/// Application-level keepalive cadence for exchanges that require one.
const PING_INTERVAL_SECS: u64 = 20;

/// Starts all feeds for the configured selection.
///
/// This function is responsible for:
/// - Building one adapter per (exchange, instrument) pair
/// - Spawning an independent websocket task per adapter
///
/// DESIGN:
/// - One (exchange, instrument) pair → exactly one WebSocket connection
/// - Failures are isolated per connection
/// - Unsupported exchanges are skipped gracefully
///
/// This function does NOT:
/// - Perform reconnection logic (handled inside the WS loop)
/// - Parse messages (delegated to adapters)
/// - Apply exchange-specific behavior
///
pub fn spawn_feeds(
    choice: ExchangeChoice,
    instruments: &[String],
    depth: u32,
    aggregator: &Arc<MarketAggregator>,
    running: &Arc<AtomicBool>,
) -> Vec<tokio::task::JoinHandle<()>> {
    let mut handles = Vec::new();

    for instrument in instruments {
        for name in choice.names() {
            let Some(adapter) = make_feed(name, instrument, depth) else {
                warn!("exchange '{}' is not supported", name);
                continue;
            };

            info!("starting {} feed for {}", name, instrument);
            handles.push(tokio::spawn(run_feed(
                adapter,
                aggregator.clone(),
                running.clone(),
            )));
        }
    }

    handles
}

/// Runs a persistent websocket connection for exactly one feed.
///
/// This loop:
/// - Connects to the exchange WebSocket endpoint
/// - Subscribes to the adapter's streams
/// - Continuously reads and decodes messages
/// - Reconnects automatically on failure
///
/// GUARANTEES:
/// - This loop never exits voluntarily while `running` is set
/// - Failures cause a reconnect after a backoff delay with jitter
///
/// RESPONSIBILITIES:
/// - Connection lifecycle
/// - Subscription sending and keepalive
/// - Routing decoded quotes into the aggregator
///
/// NOT RESPONSIBLE FOR:
/// - Message parsing (adapter responsibility)
/// - Feature derivation (aggregator responsibility)
///
pub async fn run_feed(
    mut adapter: Box<dyn ExchangeAdapter>,
    aggregator: Arc<MarketAggregator>,
    running: Arc<AtomicBool>,
) {
    let mut delay_ms = RECONNECT_BASE_DELAY_MS;

    while running.load(Ordering::SeqCst) {
        match connect_async(adapter.ws_url()).await {
            Ok((ws, _)) => {
                METRICS.ws_connections_active.fetch_add(1, Ordering::Relaxed);
                info!(
                    "[{} {}] websocket connected",
                    adapter.name(),
                    adapter.instrument()
                );

                let result =
                    drive_connection(ws, adapter.as_mut(), &aggregator, &running, &mut delay_ms)
                        .await;

                METRICS.ws_connections_active.fetch_sub(1, Ordering::Relaxed);
                match result {
                    Ok(()) => debug!(
                        "[{} {}] connection closed",
                        adapter.name(),
                        adapter.instrument()
                    ),
                    Err(e) => warn!(
                        "[{} {}] connection lost: {}",
                        adapter.name(),
                        adapter.instrument(),
                        e
                    ),
                }
            }
            Err(e) => {
                warn!(
                    "[{} {}] connect failed: {}",
                    adapter.name(),
                    adapter.instrument(),
                    e
                );
            }
        }

        if !running.load(Ordering::SeqCst) {
            break;
        }

        let jitter = rand::random_range(0..=delay_ms / 4);
        debug!(
            "[{} {}] reconnecting in {} ms",
            adapter.name(),
            adapter.instrument(),
            delay_ms + jitter
        );
        METRICS.ws_reconnects.fetch_add(1, Ordering::Relaxed);
        sleep(Duration::from_millis(delay_ms + jitter)).await;
        delay_ms = (delay_ms * 2).min(RECONNECT_MAX_DELAY_MS);
    }
}

/// Drives a single established connection.
///
/// This function:
/// - Sends the subscription message
/// - Runs the read loop with a keepalive interval
/// - Emits one Quote per decoded market frame
///
/// TERMINATION:
/// - Returns Ok on EOF, Close, or shutdown
/// - Returns an error on any transport failure
///
async fn drive_connection(
    ws: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    adapter: &mut dyn ExchangeAdapter,
    aggregator: &Arc<MarketAggregator>,
    running: &Arc<AtomicBool>,
    delay_ms: &mut u64,
) -> anyhow::Result<()> {
    let (mut write, mut read) = ws.split();

    let sub = adapter.subscribe_message();
    write.send(Message::Text(sub.to_string().into())).await?;
    *delay_ms = RECONNECT_BASE_DELAY_MS;

    let mut ping = interval(Duration::from_secs(PING_INTERVAL_SECS));
    ping.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            msg = read.next() => {
                let Some(msg) = msg else {
                    return Ok(()); // EOF
                };

                match msg? {
                    Message::Text(text) => {
                        METRICS.frames_received.fetch_add(1, Ordering::Relaxed);
                        match adapter.handle_frame(&text) {
                            ParseResult::Market => {
                                let quote = adapter.quote(now_ms());
                                aggregator.on_quote(&quote, adapter.book());
                                METRICS.quotes_emitted.fetch_add(1, Ordering::Relaxed);
                            }
                            ParseResult::Control => {}
                            ParseResult::Error => {
                                METRICS.parse_errors.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                    }
                    Message::Ping(data) => {
                        write.send(Message::Pong(data)).await?;
                    }
                    Message::Close(_) => return Ok(()),
                    _ => {}
                }
            }

            _ = ping.tick() => {
                if let Some(p) = adapter.ping_message() {
                    write.send(Message::Text(p.into())).await?;
                }
            }
        }

        if !running.load(Ordering::SeqCst) {
            return Ok(());
        }
    }
}
