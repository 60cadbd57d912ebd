// ------------------------------------------------------------
// Paper-trading process
// ------------------------------------------------------------
//
// Subscribes to the collector's PUB endpoint, runs one imbalance taker
// per market key, and fills the resulting intents in a paper execution
// engine backed by a virtual wallet.
//
// Usage:
//   paper-trader [endpoint] [topic_filter]
// Defaults: tcp://127.0.0.1:5555, "state."
//
use std::collections::HashMap;

use anyhow::Result;
use log::{info, warn};

use market_state_collector::schema::MarketState;
use market_state_collector::subscriber::MarketSubscriber;
use market_state_collector::trader::paper::{OrderIntent, OrderSide, PaperExecutionEngine};
use market_state_collector::trader::strategy::{Action, ImbalanceTaker};
use market_state_collector::util::now_ms;

/// Base quantity per intent.
const ORDER_QTY: f64 = 0.25;

/// Wallet status cadence, in received states.
const STATUS_EVERY: u64 = 500;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let endpoint = args.next().unwrap_or_else(|| "tcp://127.0.0.1:5555".to_string());
    let filter = args.next().unwrap_or_else(|| "state.".to_string());

    let mut sub = MarketSubscriber::connect(&endpoint, &filter).await?;

    let mut takers: HashMap<String, ImbalanceTaker> = HashMap::new();
    let mut engine = PaperExecutionEngine::default();
    let mut states_seen: u64 = 0;

    loop {
        let received = tokio::select! {
            r = sub.recv_one() => r,
            _ = tokio::signal::ctrl_c() => break,
        };

        let state: MarketState = match received {
            Ok(Some((_topic, state))) => state,
            Ok(None) => continue,
            Err(e) => {
                warn!("subscriber connection lost: {}", e);
                break;
            }
        };

        engine.on_market(&state);
        states_seen += 1;

        let taker = takers.entry(state.key()).or_default();
        let intent = match taker.on_state(&state) {
            // Cross the spread so the paper engine fills immediately.
            Action::Buy => OrderIntent {
                key: state.key(),
                side: OrderSide::Buy,
                price: state.ask,
                qty: ORDER_QTY,
                ts_ms: now_ms(),
            },
            Action::Sell => OrderIntent {
                key: state.key(),
                side: OrderSide::Sell,
                price: state.bid,
                qty: ORDER_QTY,
                ts_ms: now_ms(),
            },
            Action::Hold => {
                if states_seen % STATUS_EVERY == 0 {
                    let w = engine.wallet();
                    info!(
                        "wallet cash={:.2} pos={:.4} avg_entry={:.2} realized={:.4} unrealized={:.4}",
                        w.cash, w.pos, w.avg_entry, w.realized_pnl, w.unrealized_pnl
                    );
                }
                continue;
            }
        };

        match engine.submit(&state, &intent) {
            Some(trade) => info!(
                "filled {:?} {:.4} {} @ {:.2} (pos {:.4})",
                trade.side, trade.qty, trade.key, trade.price, trade.pos_after
            ),
            None => info!(
                "rejected {:?} {:.4} {} (bid {:.2} ask {:.2})",
                intent.side, intent.qty, intent.key, state.bid, state.ask
            ),
        }
    }

    let w = engine.wallet();
    info!(
        "final wallet: cash={:.2} pos={:.4} realized={:.4} unrealized={:.4} ({} paper trades)",
        w.cash,
        w.pos,
        w.realized_pnl,
        w.unrealized_pnl,
        engine.trades().len()
    );
    Ok(())
}
