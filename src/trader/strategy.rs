use crate::schema::MarketState;

/// Strategy decision for one incoming market state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Enter long / flip to long / close a short.
    Buy,
    /// Enter short / flip to short / close a long.
    Sell,
    Hold,
}

/// Depth-imbalance taker.
///
/// Flat: enters long when imbalance exceeds +threshold, short below
/// -threshold. In position: exits when the hold timer runs out, or flips
/// immediately when the imbalance strongly reverses.
pub struct ImbalanceTaker {
    threshold: f64,
    hold_ticks: u32,

    /// +1 long, 0 flat, -1 short.
    position: i32,
    ticks_left: u32,
}

impl Default for ImbalanceTaker {
    fn default() -> Self {
        Self::new(0.6, 150)
    }
}

impl ImbalanceTaker {
    pub fn new(threshold: f64, hold_ticks: u32) -> Self {
        Self {
            threshold,
            hold_ticks,
            position: 0,
            ticks_left: 0,
        }
    }

    pub fn position(&self) -> i32 {
        self.position
    }

    pub fn on_state(&mut self, s: &MarketState) -> Action {
        let imbalance = s.imbalance;

        if self.ticks_left > 0 {
            self.ticks_left -= 1;
        }

        if self.position != 0 {
            // Exit when the hold timer expires.
            if self.ticks_left == 0 {
                let out = if self.position > 0 {
                    Action::Sell
                } else {
                    Action::Buy
                };
                self.position = 0;
                return out;
            }

            // Flip on a strong reversal.
            if self.position > 0 && imbalance < -self.threshold {
                self.position = -1;
                self.ticks_left = self.hold_ticks;
                return Action::Sell;
            }
            if self.position < 0 && imbalance > self.threshold {
                self.position = 1;
                self.ticks_left = self.hold_ticks;
                return Action::Buy;
            }

            return Action::Hold;
        }

        // Flat: entry signals.
        if imbalance > self.threshold {
            self.position = 1;
            self.ticks_left = self.hold_ticks;
            return Action::Buy;
        }
        if imbalance < -self.threshold {
            self.position = -1;
            self.ticks_left = self.hold_ticks;
            return Action::Sell;
        }

        Action::Hold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_imbalance(imbalance: f64) -> MarketState {
        MarketState {
            exchange: "binance".into(),
            instrument: "ETHUSDT".into(),
            imbalance,
            ..Default::default()
        }
    }

    #[test]
    fn enters_and_exits_on_timer() {
        let mut taker = ImbalanceTaker::new(0.6, 2);

        assert_eq!(taker.on_state(&state_with_imbalance(0.0)), Action::Hold);
        assert_eq!(taker.on_state(&state_with_imbalance(0.7)), Action::Buy);
        assert_eq!(taker.position(), 1);

        // Timer counts down, then the position is closed.
        assert_eq!(taker.on_state(&state_with_imbalance(0.0)), Action::Hold);
        assert_eq!(taker.on_state(&state_with_imbalance(0.0)), Action::Sell);
        assert_eq!(taker.position(), 0);
    }

    #[test]
    fn flips_on_strong_reversal() {
        let mut taker = ImbalanceTaker::new(0.6, 10);
        assert_eq!(taker.on_state(&state_with_imbalance(0.7)), Action::Buy);
        assert_eq!(taker.on_state(&state_with_imbalance(-0.8)), Action::Sell);
        assert_eq!(taker.position(), -1);
        assert_eq!(taker.on_state(&state_with_imbalance(0.9)), Action::Buy);
        assert_eq!(taker.position(), 1);
    }

    #[test]
    fn short_entry_from_flat() {
        let mut taker = ImbalanceTaker::new(0.6, 5);
        assert_eq!(taker.on_state(&state_with_imbalance(-0.7)), Action::Sell);
        assert_eq!(taker.position(), -1);
    }
}
