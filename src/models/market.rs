use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Yes,
    No,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Side::Yes => Side::No,
            Side::No => Side::Yes,
        }
    }
}

/// Orderbook for a single outcome token.
///
/// Bids and asks are price → size ladders. A level with size 0 is never
/// retained: removals happen at update time. `last_update` only moves
/// forward; a book that has never been updated reports infinite age.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBook {
    pub token_id: String,
    pub bids: BTreeMap<Decimal, Decimal>,
    pub asks: BTreeMap<Decimal, Decimal>,
    pub last_update: Option<DateTime<Utc>>,
    /// Book hash echoed from the upstream snapshot, for resync checks.
    pub hash: String,
}

impl TokenBook {
    pub fn new(token_id: String) -> Self {
        Self {
            token_id,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            last_update: None,
            hash: String::new(),
        }
    }

    /// Best bid (price, size). Highest price first.
    pub fn best_bid(&self) -> Option<(Decimal, Decimal)> {
        self.bids.iter().next_back().map(|(&p, &s)| (p, s))
    }

    /// Best ask (price, size). Lowest price first.
    pub fn best_ask(&self) -> Option<(Decimal, Decimal)> {
        self.asks.iter().next().map(|(&p, &s)| (p, s))
    }

    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => Some(ask - bid),
            _ => None,
        }
    }

    pub fn midpoint(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => Some((bid + ask) / Decimal::from(2)),
            _ => None,
        }
    }

    /// Upsert a single level. Size of zero (or below) removes the level.
    pub fn update_level(&mut self, is_bid: bool, price: Decimal, size: Decimal) {
        let side = if is_bid { &mut self.bids } else { &mut self.asks };
        if size <= Decimal::ZERO {
            side.remove(&price);
        } else {
            side.insert(price, size);
        }
        self.touch();
    }

    /// Replace both sides atomically with a full snapshot.
    pub fn set_snapshot(
        &mut self,
        bids: &[(Decimal, Decimal)],
        asks: &[(Decimal, Decimal)],
        hash: &str,
    ) {
        self.bids.clear();
        self.asks.clear();
        for &(price, size) in bids {
            if size > Decimal::ZERO {
                self.bids.insert(price, size);
            }
        }
        for &(price, size) in asks {
            if size > Decimal::ZERO {
                self.asks.insert(price, size);
            }
        }
        self.hash = hash.to_string();
        self.touch();
    }

    /// Stamp `last_update`, never moving it backwards.
    pub fn touch(&mut self) {
        let now = Utc::now();
        if self.last_update.map_or(true, |t| now >= t) {
            self.last_update = Some(now);
        }
    }

    pub fn age_seconds(&self) -> f64 {
        match self.last_update {
            Some(t) => (Utc::now() - t).num_milliseconds() as f64 / 1000.0,
            None => f64::INFINITY,
        }
    }
}

/// Paired YES/NO orderbooks for one binary market.
///
/// The parity invariant is YES + NO = $1 at resolution, so
/// `combined_ask < 1` means buying both sides locks in the difference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketBook {
    pub condition_id: String,
    pub yes_token_id: String,
    pub no_token_id: String,
    pub yes_book: TokenBook,
    pub no_book: TokenBook,
    pub tick_size: Decimal,
    /// Neg-risk markets route through a different exchange adapter.
    /// Opaque to the parity math, threaded through to order posting.
    pub neg_risk: bool,
}

/// Books older than this are not trusted for signal generation.
pub const STALE_AFTER_SECONDS: f64 = 60.0;

impl MarketBook {
    pub fn new(
        condition_id: String,
        yes_token_id: String,
        no_token_id: String,
        tick_size: Decimal,
        neg_risk: bool,
    ) -> Self {
        Self {
            condition_id,
            yes_book: TokenBook::new(yes_token_id.clone()),
            no_book: TokenBook::new(no_token_id.clone()),
            yes_token_id,
            no_token_id,
            tick_size,
            neg_risk,
        }
    }

    pub fn yes_best_ask(&self) -> Option<(Decimal, Decimal)> {
        self.yes_book.best_ask()
    }

    pub fn no_best_ask(&self) -> Option<(Decimal, Decimal)> {
        self.no_book.best_ask()
    }

    /// Sum of both best asks, the cost to buy one matched pair.
    pub fn combined_ask(&self) -> Option<Decimal> {
        match (self.yes_book.best_ask(), self.no_book.best_ask()) {
            (Some((y, _)), Some((n, _))) => Some(y + n),
            _ => None,
        }
    }

    /// Raw parity edge: 1 − (yes_ask + no_ask). Positive means a matched
    /// pair costs less than its resolution payout.
    pub fn parity_edge(&self) -> Option<Decimal> {
        self.combined_ask().map(|c| Decimal::ONE - c)
    }

    /// Maximum size executable on both sides at top of book.
    pub fn executable_size(&self) -> Option<Decimal> {
        match (self.yes_book.best_ask(), self.no_book.best_ask()) {
            (Some((_, ys)), Some((_, ns))) => Some(ys.min(ns)),
            _ => None,
        }
    }

    /// A crossed book (bid ≥ ask on either side) is accepted but suspect.
    pub fn is_crossed(&self) -> bool {
        let crossed = |book: &TokenBook| match (book.best_bid(), book.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => bid >= ask,
            _ => false,
        };
        crossed(&self.yes_book) || crossed(&self.no_book)
    }

    pub fn is_stale(&self) -> bool {
        self.yes_book.age_seconds() > STALE_AFTER_SECONDS
            || self.no_book.age_seconds() > STALE_AFTER_SECONDS
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        match (self.yes_book.last_update, self.no_book.last_update) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }
}
