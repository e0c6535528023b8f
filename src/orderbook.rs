use dashmap::DashMap;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::models::market::MarketBook;
use crate::models::order::OrderSide;

/// Thread-safe store of paired YES/NO books for all tracked markets.
///
/// Keyed by condition id, with a token → condition reverse index so
/// stream updates route in O(1). Updates for tokens that were never
/// registered are dropped: the stream may carry markets the bot does not
/// trade.
pub struct BookStore {
    markets: DashMap<String, MarketBook>,
    token_index: DashMap<String, String>,
}

impl BookStore {
    pub fn new() -> Self {
        Self {
            markets: DashMap::new(),
            token_index: DashMap::new(),
        }
    }

    pub fn add_market(
        &self,
        condition_id: &str,
        yes_token_id: &str,
        no_token_id: &str,
        tick_size: Decimal,
        neg_risk: bool,
    ) {
        let market = MarketBook::new(
            condition_id.to_string(),
            yes_token_id.to_string(),
            no_token_id.to_string(),
            tick_size,
            neg_risk,
        );
        self.token_index
            .insert(yes_token_id.to_string(), condition_id.to_string());
        self.token_index
            .insert(no_token_id.to_string(), condition_id.to_string());
        self.markets.insert(condition_id.to_string(), market);
    }

    pub fn remove_market(&self, condition_id: &str) {
        if let Some((_, market)) = self.markets.remove(condition_id) {
            self.token_index.remove(&market.yes_token_id);
            self.token_index.remove(&market.no_token_id);
        }
    }

    /// Replace one token's book with a full snapshot.
    pub fn apply_snapshot(
        &self,
        token_id: &str,
        bids: &[(Decimal, Decimal)],
        asks: &[(Decimal, Decimal)],
        hash: &str,
    ) {
        self.with_token_book(token_id, |book| book.set_snapshot(bids, asks, hash));
    }

    /// Upsert a single level. `OrderSide::Buy` targets bids, `Sell` asks.
    /// Size of zero removes the level.
    pub fn apply_delta(&self, token_id: &str, side: OrderSide, price: Decimal, size: Decimal) {
        let is_bid = side == OrderSide::Buy;
        self.with_token_book(token_id, |book| book.update_level(is_bid, price, size));
    }

    /// Top-of-book hint from the stream. The hinted size is unknown, so a
    /// sentinel size of 1 keeps the best level well-defined until the next
    /// snapshot; a known size at the same price is left alone.
    pub fn apply_best(&self, token_id: &str, best_bid: Decimal, best_ask: Decimal) {
        self.with_token_book(token_id, |book| {
            if best_bid > Decimal::ZERO {
                let current = book.best_bid().map(|(p, _)| p);
                if current != Some(best_bid) {
                    book.update_level(true, best_bid, dec!(1));
                }
            }
            if best_ask > Decimal::ZERO {
                let current = book.best_ask().map(|(p, _)| p);
                if current != Some(best_ask) {
                    book.update_level(false, best_ask, dec!(1));
                }
            }
            book.touch();
        });
    }

    fn with_token_book<F: FnOnce(&mut crate::models::market::TokenBook)>(
        &self,
        token_id: &str,
        f: F,
    ) {
        let Some(condition_id) = self.token_index.get(token_id).map(|c| c.clone()) else {
            debug!("update for untracked token {token_id}, dropping");
            return;
        };
        let Some(mut market) = self.markets.get_mut(&condition_id) else {
            return;
        };
        if market.yes_token_id == token_id {
            f(&mut market.yes_book);
        } else if market.no_token_id == token_id {
            f(&mut market.no_book);
        }
        // Crossed books are kept (the stream is authoritative) but worth
        // flagging: a bid at or above the ask usually means a gapped feed.
        if market.is_crossed() {
            debug!("crossed book on {}", market.condition_id);
        }
    }

    pub fn get_market(&self, condition_id: &str) -> Option<MarketBook> {
        self.markets.get(condition_id).map(|m| m.clone())
    }

    pub fn get_market_by_token(&self, token_id: &str) -> Option<MarketBook> {
        let condition_id = self.token_index.get(token_id)?.clone();
        self.get_market(&condition_id)
    }

    pub fn markets(&self) -> Vec<MarketBook> {
        self.markets.iter().map(|e| e.value().clone()).collect()
    }

    pub fn token_ids(&self) -> Vec<String> {
        self.token_index.iter().map(|e| e.key().clone()).collect()
    }

    pub fn market_count(&self) -> usize {
        self.markets.len()
    }
}

impl Default for BookStore {
    fn default() -> Self {
        Self::new()
    }
}
