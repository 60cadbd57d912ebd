use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{info, warn};
use parking_lot::{Condvar, Mutex};
use rusqlite::{Connection, TransactionBehavior, params};

use crate::metrics::METRICS;
use crate::schema::StateSnapshot;

pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 200;
pub const DEFAULT_MAX_QUEUE: usize = 50_000;

/// Pragmas tuned for a single append-heavy writer, then the one table and
/// its two lookup indexes.
const STATE_STORE_SCHEMA: &str = r#"
PRAGMA journal_mode=WAL;
PRAGMA synchronous=NORMAL;
PRAGMA temp_store=MEMORY;
PRAGMA foreign_keys=ON;
PRAGMA busy_timeout=2000;

CREATE TABLE IF NOT EXISTS market_state (
  ts_ms INTEGER NOT NULL,
  exchange TEXT NOT NULL,
  instrument TEXT NOT NULL,
  mid REAL NOT NULL,
  spread REAL NOT NULL,
  r1 REAL NOT NULL,
  r5 REAL NOT NULL,
  r10 REAL NOT NULL,
  imbalance REAL NOT NULL,
  cross_ex_signal REAL NOT NULL,
  bid_v1 REAL NOT NULL, bid_v2 REAL NOT NULL, bid_v3 REAL NOT NULL, bid_v4 REAL NOT NULL, bid_v5 REAL NOT NULL,
  ask_v1 REAL NOT NULL, ask_v2 REAL NOT NULL, ask_v3 REAL NOT NULL, ask_v4 REAL NOT NULL, ask_v5 REAL NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_market_state_ts ON market_state(ts_ms);
CREATE INDEX IF NOT EXISTS idx_market_state_key ON market_state(exchange, instrument, ts_ms);
"#;

const INSERT_SQL: &str = "INSERT INTO market_state (
  ts_ms, exchange, instrument, mid, spread, r1, r5, r10, imbalance, cross_ex_signal,
  bid_v1, bid_v2, bid_v3, bid_v4, bid_v5,
  ask_v1, ask_v2, ask_v3, ask_v4, ask_v5
) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20)";

struct Shared {
    queue: Mutex<VecDeque<StateSnapshot>>,
    cv: Condvar,
    running: AtomicBool,
}

/// Durable append of StateSnapshots behind a bounded in-memory queue.
///
/// Producers (`push`) never block: at capacity the oldest pending snapshot
/// is evicted before insertion, preserving recency under bounded memory.
/// A dedicated OS thread drains the queue and commits one immediate
/// transaction per batch; a failed commit loses that batch and the writer
/// keeps going.
pub struct StateStore {
    db_path: String,
    flush_ms: u64,
    max_queue: usize,
    shared: Arc<Shared>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl StateStore {
    pub fn new(db_path: &str) -> Self {
        Self::with_limits(db_path, DEFAULT_FLUSH_INTERVAL_MS, DEFAULT_MAX_QUEUE)
    }

    pub fn with_limits(db_path: &str, flush_ms: u64, max_queue: usize) -> Self {
        Self {
            db_path: db_path.to_string(),
            flush_ms,
            max_queue,
            shared: Arc::new(Shared {
                queue: Mutex::new(VecDeque::new()),
                cv: Condvar::new(),
                running: AtomicBool::new(false),
            }),
            writer: Mutex::new(None),
        }
    }

    /// Open the store, apply pragmas, create the table and indexes, and
    /// spawn the writer thread. A failure here is fatal for the store: no
    /// thread is spawned and the error is returned.
    pub fn start(&self) -> Result<()> {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let open = || -> Result<Connection> {
            let conn = Connection::open(&self.db_path)
                .with_context(|| format!("failed to open state db {}", self.db_path))?;
            conn.execute_batch(STATE_STORE_SCHEMA)
                .context("failed to apply state db schema")?;
            Ok(conn)
        };

        let conn = match open() {
            Ok(conn) => conn,
            Err(e) => {
                self.shared.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        info!("state store open at {}", self.db_path);

        let shared = self.shared.clone();
        let flush_ms = self.flush_ms;
        let handle = std::thread::Builder::new()
            .name("state-db-writer".into())
            .spawn(move || writer_loop(conn, shared, flush_ms))
            .context("failed to spawn state db writer")?;

        *self.writer.lock() = Some(handle);
        Ok(())
    }

    /// Enqueue one snapshot. Never blocks; drops the oldest entry when the
    /// queue is at capacity. Silently ignored when the store is stopped.
    pub fn push(&self, s: StateSnapshot) {
        if !self.shared.running.load(Ordering::SeqCst) {
            return;
        }
        {
            let mut q = self.shared.queue.lock();
            enqueue_bounded(&mut q, s, self.max_queue);
        }
        self.shared.cv.notify_one();
    }

    /// Signal the writer, let it drain, and join it.
    pub fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shared.cv.notify_all();
        if let Some(handle) = self.writer.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for StateStore {
    fn drop(&mut self) {
        self.stop();
    }
}

fn enqueue_bounded(q: &mut VecDeque<StateSnapshot>, s: StateSnapshot, max_queue: usize) {
    if q.len() >= max_queue {
        q.pop_front();
        METRICS.db_drops.fetch_add(1, Ordering::Relaxed);
    }
    q.push_back(s);
}

fn writer_loop(mut conn: Connection, shared: Arc<Shared>, flush_ms: u64) {
    let mut batch: Vec<StateSnapshot> = Vec::with_capacity(4096);

    loop {
        {
            let mut q = shared.queue.lock();
            if q.is_empty() && shared.running.load(Ordering::SeqCst) {
                shared
                    .cv
                    .wait_for(&mut q, Duration::from_millis(flush_ms));
            }
            if q.is_empty() {
                if !shared.running.load(Ordering::SeqCst) {
                    break;
                }
                continue;
            }
            batch.clear();
            batch.extend(q.drain(..));
        }

        match insert_batch(&mut conn, &batch) {
            Ok(()) => {
                METRICS
                    .db_rows_written
                    .fetch_add(batch.len(), Ordering::Relaxed);
                METRICS.db_batches.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                METRICS.db_commit_errors.fetch_add(1, Ordering::Relaxed);
                warn!("state batch insert failed, {} rows lost: {}", batch.len(), e);
            }
        }
    }
}

/// One immediate transaction per batch. Dropping the transaction on an
/// early return rolls it back.
fn insert_batch(conn: &mut Connection, batch: &[StateSnapshot]) -> Result<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    {
        let mut stmt = tx.prepare_cached(INSERT_SQL)?;
        for s in batch {
            stmt.execute(params![
                s.ts_ms,
                s.exchange,
                s.instrument,
                s.mid,
                s.spread,
                s.r1,
                s.r5,
                s.r10,
                s.imbalance,
                s.cross_ex_signal,
                s.bid_vol[0],
                s.bid_vol[1],
                s.bid_vol[2],
                s.bid_vol[3],
                s.bid_vol[4],
                s.ask_vol[0],
                s.ask_vol[1],
                s.ask_vol[2],
                s.ask_vol[3],
                s.ask_vol[4],
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}
