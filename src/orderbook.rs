use std::cmp::Reverse;
use std::collections::BTreeMap;

/// Wrapper for f64 that implements `Ord` for use as a BTreeMap key.
///
/// Exchange prices are well-formed finite decimals; NaN never enters the
/// book because level parsing rejects it upstream.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
struct PriceKey(f64);

impl Eq for PriceKey {}

impl Ord for PriceKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0
            .partial_cmp(&other.0)
            .unwrap_or(std::cmp::Ordering::Equal)
    }
}

/// Which side of the book to walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookSide {
    Bid,
    Ask,
}

/// L2 depth ladder for one instrument on one exchange.
///
/// Bids iterate highest price first, asks lowest price first. Every stored
/// quantity is strictly positive; an update with qty <= 0 removes the
/// level. The book is not thread-safe: it is owned and mutated by exactly
/// one feed, and deep-copied (`Clone`) into the aggregator caches.
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    bids: BTreeMap<Reverse<PriceKey>, f64>,
    asks: BTreeMap<PriceKey, f64>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
    }

    /// Replace the whole book. Only strictly positive levels are kept;
    /// duplicate prices within the batch collapse to the last value.
    pub fn apply_snapshot(&mut self, bids: &[(f64, f64)], asks: &[(f64, f64)]) {
        self.clear();
        for &(px, qty) in bids {
            if qty > 0.0 {
                self.bids.insert(Reverse(PriceKey(px)), qty);
            }
        }
        for &(px, qty) in asks {
            if qty > 0.0 {
                self.asks.insert(PriceKey(px), qty);
            }
        }
    }

    /// Merge per-level updates on top of the existing book. qty <= 0
    /// removes the level, qty > 0 overwrites it.
    pub fn apply_delta(&mut self, bids: &[(f64, f64)], asks: &[(f64, f64)]) {
        for &(px, qty) in bids {
            if qty <= 0.0 {
                self.bids.remove(&Reverse(PriceKey(px)));
            } else {
                self.bids.insert(Reverse(PriceKey(px)), qty);
            }
        }
        for &(px, qty) in asks {
            if qty <= 0.0 {
                self.asks.remove(&PriceKey(px));
            } else {
                self.asks.insert(PriceKey(px), qty);
            }
        }
    }

    /// Highest bid, or 0.0 when the side is empty.
    pub fn best_bid(&self) -> f64 {
        self.bids.keys().next().map(|k| k.0.0).unwrap_or(0.0)
    }

    /// Lowest ask, or 0.0 when the side is empty.
    pub fn best_ask(&self) -> f64 {
        self.asks.keys().next().map(|k| k.0).unwrap_or(0.0)
    }

    /// Walk up to `n` levels in price order (bids descending, asks
    /// ascending), yielding `(price, qty)` pairs.
    pub fn top_n(&self, side: BookSide, n: usize) -> Vec<(f64, f64)> {
        match side {
            BookSide::Bid => self
                .bids
                .iter()
                .take(n)
                .map(|(k, &q)| (k.0.0, q))
                .collect(),
            BookSide::Ask => self
                .asks
                .iter()
                .take(n)
                .map(|(k, &q)| (k.0, q))
                .collect(),
        }
    }

    pub fn bid_levels(&self) -> usize {
        self.bids.len()
    }

    pub fn ask_levels(&self) -> usize {
        self.asks.len()
    }
}
