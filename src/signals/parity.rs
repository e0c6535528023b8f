use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::config::{FeeConfig, TradingConfig};
use crate::models::market::MarketBook;
use crate::models::signal::ParitySignal;
use crate::orderbook::BookStore;

/// Scans paired books for YES_ask + NO_ask < $1 after costs.
///
/// O(1) per market: both best asks, summed. Sizing is capped at
/// top-of-book liquidity and the per-trade notional limit; the fee model
/// follows the venue's binary-payout schedule, which charges on the
/// cheaper of the two payoff legs.
pub struct ParityDetector {
    store: Arc<BookStore>,
    taker_fee_rate: Decimal,
    slippage_buffer: Decimal,
    max_notional_per_trade: Decimal,
    last_signals: DashMap<String, ParitySignal>,
}

impl ParityDetector {
    pub fn new(store: Arc<BookStore>, fees: &FeeConfig, trading: &TradingConfig) -> Self {
        Self {
            store,
            taker_fee_rate: fees.taker_fee_rate(),
            slippage_buffer: trading.slippage_buffer,
            max_notional_per_trade: trading.max_notional_per_trade,
            last_signals: DashMap::new(),
        }
    }

    /// Total taker fees for buying both sides at the given size.
    /// fee = rate · min(price, 1 − price) · size, per side.
    pub fn calculate_fees(&self, yes_price: Decimal, no_price: Decimal, size: Decimal) -> Decimal {
        if self.taker_fee_rate == Decimal::ZERO {
            return Decimal::ZERO;
        }
        let yes_factor = yes_price.min(Decimal::ONE - yes_price);
        let no_factor = no_price.min(Decimal::ONE - no_price);
        self.taker_fee_rate * yes_factor * size + self.taker_fee_rate * no_factor * size
    }

    /// Evaluate one market. Returns the signal with costs applied, or
    /// None when the book is stale, one-sided, or has no gross edge.
    pub fn check_market(&self, market: &MarketBook) -> Option<ParitySignal> {
        if market.is_stale() {
            return None;
        }

        let (yes_ask, yes_ask_size) = market.yes_book.best_ask()?;
        let (no_ask, no_ask_size) = market.no_book.best_ask()?;

        let combined_cost = yes_ask + no_ask;
        let gross_edge = Decimal::ONE - combined_cost;
        if gross_edge <= Decimal::ZERO {
            return None;
        }

        let liquidity_size = yes_ask_size.min(no_ask_size);
        if liquidity_size <= Decimal::ZERO {
            return None;
        }

        let notional_cap_size = self.max_notional_per_trade / combined_cost;
        let max_size = liquidity_size.min(notional_cap_size);

        let fees = self.calculate_fees(yes_ask, no_ask, max_size);
        let fee_per_share = if max_size > Decimal::ZERO {
            fees / max_size
        } else {
            Decimal::ZERO
        };

        let net_edge = gross_edge - fee_per_share - self.slippage_buffer;

        Some(ParitySignal {
            condition_id: market.condition_id.clone(),
            yes_token_id: market.yes_token_id.clone(),
            no_token_id: market.no_token_id.clone(),
            yes_ask,
            no_ask,
            combined_cost,
            gross_edge,
            fee_per_share,
            net_edge,
            max_size,
            timestamp: Utc::now(),
        })
    }

    /// Scan every tracked market. Signals clearing `min_edge` are returned
    /// ranked by net edge descending, condition id ascending on ties.
    pub fn scan(&self, min_edge: Decimal) -> Vec<ParitySignal> {
        let mut signals: Vec<ParitySignal> = Vec::new();

        for market in self.store.markets() {
            if let Some(signal) = self.check_market(&market) {
                if signal.net_edge >= min_edge {
                    self.last_signals
                        .insert(signal.condition_id.clone(), signal.clone());
                    signals.push(signal);
                }
            }
        }

        signals.sort_by(|a, b| {
            b.net_edge
                .cmp(&a.net_edge)
                .then_with(|| a.condition_id.cmp(&b.condition_id))
        });
        signals
    }

    /// Single best opportunity across all markets, if any.
    pub fn best(&self, min_edge: Decimal) -> Option<ParitySignal> {
        self.scan(min_edge).into_iter().next()
    }

    /// Most recent signal emitted for a market.
    pub fn last_signal(&self, condition_id: &str) -> Option<ParitySignal> {
        self.last_signals.get(condition_id).map(|s| s.clone())
    }
}
