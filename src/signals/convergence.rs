use rust_decimal::Decimal;
use std::sync::Arc;

use crate::models::market::MarketBook;
use crate::orderbook::BookStore;

/// Why the convergence check did or did not fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Combined best bid cleared 1 − threshold; sell both sides now.
    SpreadConverged,
    /// Market vanished from the store; exit on last-known venue quotes.
    MarketNotFound,
    NoBids,
    StaleData,
    Hold,
}

/// Decides when an open paired position should be exited early.
///
/// Deliberately conservative: it fires only when the paired-exit bid
/// total clears the guaranteed-loss line. Holding to resolution is always
/// an acceptable fallback since the pair pays exactly $1 at settlement.
pub struct ConvergenceDetector {
    store: Arc<BookStore>,
    threshold: Decimal,
}

impl ConvergenceDetector {
    pub fn new(store: Arc<BookStore>, threshold: Decimal) -> Self {
        Self { store, threshold }
    }

    pub fn should_exit(&self, condition_id: &str) -> (bool, ExitReason) {
        match self.store.get_market(condition_id) {
            Some(market) => self.evaluate(&market),
            None => (true, ExitReason::MarketNotFound),
        }
    }

    /// Convergence check against one market's books.
    pub fn evaluate(&self, market: &MarketBook) -> (bool, ExitReason) {
        let (yes_bid, no_bid) = match (market.yes_book.best_bid(), market.no_book.best_bid()) {
            (Some((y, _)), Some((n, _))) => (y, n),
            _ => return (false, ExitReason::NoBids),
        };

        let combined_bid = yes_bid + no_bid;
        if combined_bid >= Decimal::ONE - self.threshold {
            return (true, ExitReason::SpreadConverged);
        }

        if market.is_stale() {
            return (false, ExitReason::StaleData);
        }

        (false, ExitReason::Hold)
    }

    /// What selling both sides at the current bids would fetch per share.
    pub fn exit_value(&self, condition_id: &str) -> Option<Decimal> {
        let market = self.store.get_market(condition_id)?;
        let (yes_bid, _) = market.yes_book.best_bid()?;
        let (no_bid, _) = market.no_book.best_bid()?;
        Some(yes_bid + no_bid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn store_with_bids(yes_bid: Decimal, no_bid: Decimal) -> Arc<BookStore> {
        let store = Arc::new(BookStore::new());
        store.add_market("cond", "yes", "no", dec!(0.01), false);
        store.apply_snapshot("yes", &[(yes_bid, dec!(100))], &[(dec!(0.99), dec!(10))], "");
        store.apply_snapshot("no", &[(no_bid, dec!(100))], &[(dec!(0.99), dec!(10))], "");
        store
    }

    #[test]
    fn fires_when_combined_bid_converges() {
        let store = store_with_bids(dec!(0.51), dec!(0.4895));
        let det = ConvergenceDetector::new(store, dec!(0.001));
        // 0.51 + 0.4895 = 0.9995 >= 0.999
        assert_eq!(det.should_exit("cond"), (true, ExitReason::SpreadConverged));
        assert_eq!(det.exit_value("cond"), Some(dec!(0.9995)));
    }

    #[test]
    fn holds_below_threshold() {
        let store = store_with_bids(dec!(0.48), dec!(0.47));
        let det = ConvergenceDetector::new(store, dec!(0.001));
        assert_eq!(det.should_exit("cond"), (false, ExitReason::Hold));
    }

    #[test]
    fn missing_market_prompts_immediate_exit() {
        let store = Arc::new(BookStore::new());
        let det = ConvergenceDetector::new(store, dec!(0.001));
        assert_eq!(det.should_exit("gone"), (true, ExitReason::MarketNotFound));
        assert_eq!(det.exit_value("gone"), None);
    }

    #[test]
    fn missing_bid_holds() {
        let store = Arc::new(BookStore::new());
        store.add_market("cond", "yes", "no", dec!(0.01), false);
        store.apply_snapshot("yes", &[(dec!(0.48), dec!(10))], &[], "");
        // NO side has no bids at all.
        store.apply_snapshot("no", &[], &[(dec!(0.52), dec!(10))], "");
        let det = ConvergenceDetector::new(store, dec!(0.001));
        assert_eq!(det.should_exit("cond"), (false, ExitReason::NoBids));
    }

    #[test]
    fn stale_books_hold_unless_converged() {
        let store = Arc::new(BookStore::new());
        let det = ConvergenceDetector::new(store, dec!(0.001));

        let mut market = MarketBook::new("cond".into(), "yes".into(), "no".into(), dec!(0.01), false);
        market.yes_book.set_snapshot(&[(dec!(0.48), dec!(100))], &[], "");
        market.no_book.set_snapshot(&[(dec!(0.47), dec!(100))], &[], "");
        market.yes_book.last_update = Some(Utc::now() - chrono::Duration::seconds(90));
        market.no_book.last_update = Some(Utc::now() - chrono::Duration::seconds(90));

        assert_eq!(det.evaluate(&market), (false, ExitReason::StaleData));

        // Convergence wins over staleness: the quote is executable either way.
        market.yes_book.bids.insert(dec!(0.52), dec!(10));
        market.no_book.bids.insert(dec!(0.48), dec!(10));
        assert_eq!(det.evaluate(&market), (true, ExitReason::SpreadConverged));
    }
}
