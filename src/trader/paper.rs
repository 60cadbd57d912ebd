use crate::schema::MarketState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

/// A limit-order intent produced by a strategy.
#[derive(Debug, Clone)]
pub struct OrderIntent {
    /// "exchange|symbol"
    pub key: String,
    pub side: OrderSide,
    pub price: f64,
    /// Base quantity.
    pub qty: f64,
    pub ts_ms: i64,
}

/// A simulated fill.
#[derive(Debug, Clone)]
pub struct PaperTrade {
    pub key: String,
    pub side: OrderSide,
    pub price: f64,
    pub qty: f64,
    pub ts_ms: i64,
    pub pos_after: f64,
}

/// Cash / position / PnL bookkeeping for the paper engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct WalletSnapshot {
    pub cash: f64,
    pub pos: f64,
    pub avg_entry: f64,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
}

#[derive(Debug)]
pub struct VirtualWallet {
    s: WalletSnapshot,
}

impl VirtualWallet {
    pub fn new(initial_cash: f64) -> Self {
        Self {
            s: WalletSnapshot {
                cash: initial_cash,
                ..Default::default()
            },
        }
    }

    pub fn snap(&self) -> &WalletSnapshot {
        &self.s
    }

    /// Mark unrealized PnL to the given mid.
    pub fn mark(&mut self, mid: f64) {
        if self.s.pos != 0.0 {
            self.s.unrealized_pnl = self.s.pos * (mid - self.s.avg_entry);
        } else {
            self.s.unrealized_pnl = 0.0;
        }
    }

    pub fn on_fill_buy(&mut self, qty: f64, price: f64) {
        self.s.cash -= qty * price;

        let new_pos = self.s.pos + qty;
        if self.s.pos == 0.0 {
            self.s.avg_entry = price;
        } else {
            self.s.avg_entry = (self.s.pos * self.s.avg_entry + qty * price) / new_pos;
        }
        self.s.pos = new_pos;
    }

    pub fn on_fill_sell(&mut self, qty: f64, price: f64) {
        self.s.cash += qty * price;
        self.s.realized_pnl += qty * (price - self.s.avg_entry);
        self.s.pos -= qty;

        if self.s.pos == 0.0 {
            self.s.avg_entry = 0.0;
        }
    }
}

/// Paper-engine policy knobs.
#[derive(Debug, Clone, Copy)]
pub struct PaperParams {
    pub initial_cash: f64,
    pub allow_short: bool,
    pub require_cash: bool,
}

impl Default for PaperParams {
    fn default() -> Self {
        Self {
            initial_cash: 10_000.0,
            allow_short: false,
            require_cash: true,
        }
    }
}

/// Fills marketable intents against the current top of book.
///
/// Buys fill at the ask, sells at the bid; an intent that does not cross
/// the spread is rejected, as is a buy without cash cover or a sell that
/// would exceed inventory when shorting is disabled.
pub struct PaperExecutionEngine {
    params: PaperParams,
    wallet: VirtualWallet,
    trades: Vec<PaperTrade>,
}

impl Default for PaperExecutionEngine {
    fn default() -> Self {
        Self::new(PaperParams::default())
    }
}

impl PaperExecutionEngine {
    pub fn new(params: PaperParams) -> Self {
        Self {
            params,
            wallet: VirtualWallet::new(params.initial_cash),
            trades: Vec::new(),
        }
    }

    pub fn wallet(&self) -> &WalletSnapshot {
        self.wallet.snap()
    }

    pub fn trades(&self) -> &[PaperTrade] {
        &self.trades
    }

    /// Re-mark the wallet on every market tick.
    pub fn on_market(&mut self, s: &MarketState) {
        self.wallet.mark(s.mid);
    }

    /// Try to fill one intent against the current state.
    pub fn submit(&mut self, s: &MarketState, intent: &OrderIntent) -> Option<PaperTrade> {
        if intent.qty <= 0.0 {
            return None;
        }
        if s.bid <= 0.0 || s.ask <= 0.0 {
            return None;
        }

        match intent.side {
            OrderSide::Buy => {
                if intent.price < s.ask {
                    return None;
                }
                if self.params.require_cash && self.wallet.snap().cash < intent.qty * s.ask {
                    return None;
                }

                self.wallet.on_fill_buy(intent.qty, s.ask);
                self.wallet.mark(s.mid);

                let trade = PaperTrade {
                    key: intent.key.clone(),
                    side: OrderSide::Buy,
                    price: s.ask,
                    qty: intent.qty,
                    ts_ms: intent.ts_ms,
                    pos_after: self.wallet.snap().pos,
                };
                self.trades.push(trade.clone());
                Some(trade)
            }
            OrderSide::Sell => {
                if !self.params.allow_short && self.wallet.snap().pos < intent.qty {
                    return None;
                }
                if intent.price > s.bid {
                    return None;
                }

                self.wallet.on_fill_sell(intent.qty, s.bid);
                self.wallet.mark(s.mid);

                let trade = PaperTrade {
                    key: intent.key.clone(),
                    side: OrderSide::Sell,
                    price: s.bid,
                    qty: intent.qty,
                    ts_ms: intent.ts_ms,
                    pos_after: self.wallet.snap().pos,
                };
                self.trades.push(trade.clone());
                Some(trade)
            }
        }
    }
}
