use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::execution::venue::{MarketInfo, OrderRequest, TradeFill, VenueApi, VenueError};
use crate::models::order::{ExecutionResult, ExecutionStatus, LegOrder, LegStatus, OrderSide};
use crate::models::signal::ParitySignal;

const RECENT_TRADES_LIMIT: usize = 20;

/// Executes paired YES+NO orders.
///
/// The governing invariant is no naked exposure: both legs are sized
/// identically, and any fill imbalance left after the legs settle is
/// immediately sold back at the bid. A small realized loss from hedging
/// always beats carrying one-sided directional risk.
pub struct PairedExecutor<V: VenueApi> {
    venue: Arc<V>,
    funder: String,
    order_timeout: Duration,
    poll_interval: Duration,
    active: DashMap<String, ExecutionResult>,
    market_meta: DashMap<String, MarketInfo>,
}

impl<V: VenueApi> PairedExecutor<V> {
    pub fn new(venue: Arc<V>, funder: String, order_timeout: Duration) -> Self {
        Self {
            venue,
            funder,
            order_timeout,
            poll_interval: Duration::from_millis(500),
            active: DashMap::new(),
            market_meta: DashMap::new(),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Buy YES and NO concurrently at the signal's ask prices.
    pub async fn execute_entry(
        &self,
        signal: &ParitySignal,
        size: Option<Decimal>,
    ) -> ExecutionResult {
        let execution_id = Uuid::new_v4().to_string();
        let trade_size = size.unwrap_or(signal.max_size);

        let mut yes_leg = LegOrder::new(
            format!("{execution_id}-yes"),
            signal.yes_token_id.clone(),
            OrderSide::Buy,
            signal.yes_ask,
            trade_size,
        );
        let mut no_leg = LegOrder::new(
            format!("{execution_id}-no"),
            signal.no_token_id.clone(),
            OrderSide::Buy,
            signal.no_ask,
            trade_size,
        );

        self.active.insert(
            execution_id.clone(),
            ExecutionResult::new(
                execution_id.clone(),
                signal.condition_id.clone(),
                yes_leg.clone(),
                no_leg.clone(),
                signal.expected_total_profit(trade_size),
            ),
        );

        info!(
            "entry: market={} yes@{}+no@{}={} size={}",
            signal.condition_id, signal.yes_ask, signal.no_ask, signal.combined_cost, trade_size
        );

        let meta = match self.market_info(&signal.condition_id).await {
            Ok(m) => m,
            Err(e) => {
                yes_leg.status = LegStatus::Failed;
                no_leg.status = LegStatus::Failed;
                let mut result = ExecutionResult::new(
                    execution_id.clone(),
                    signal.condition_id.clone(),
                    yes_leg,
                    no_leg,
                    Decimal::ZERO,
                );
                result.status = ExecutionStatus::Failed;
                result.error = Some(format!("market metadata fetch failed: {e}"));
                self.active.remove(&execution_id);
                return result;
            }
        };

        // Both legs are submitted before either starts polling for fills.
        tokio::join!(
            self.submit_leg(&mut yes_leg, &meta),
            self.submit_leg(&mut no_leg, &meta)
        );
        self.update_active(&execution_id, &yes_leg, &no_leg, ExecutionStatus::InProgress);

        tokio::join!(self.track_leg(&mut yes_leg), self.track_leg(&mut no_leg));

        let mut result = ExecutionResult::new(
            execution_id.clone(),
            signal.condition_id.clone(),
            yes_leg,
            no_leg,
            signal.expected_total_profit(trade_size),
        );
        self.aggregate_entry(&mut result).await;

        self.active.remove(&execution_id);
        result
    }

    /// Sell both sides of an open pair at the current best bids.
    pub async fn execute_exit(
        &self,
        condition_id: &str,
        yes_token_id: &str,
        no_token_id: &str,
        size: Decimal,
    ) -> ExecutionResult {
        let execution_id = Uuid::new_v4().to_string();

        let quotes = tokio::join!(
            self.venue.get_price(yes_token_id),
            self.venue.get_price(no_token_id)
        );
        let (yes_quote, no_quote) = match quotes {
            (Ok(y), Ok(n)) => (y, n),
            (y, n) => {
                let e = y.err().or(n.err()).expect("one side errored");
                let mut result = ExecutionResult::new(
                    execution_id,
                    condition_id.to_string(),
                    LegOrder::new(
                        String::new(),
                        yes_token_id.to_string(),
                        OrderSide::Sell,
                        Decimal::ZERO,
                        size,
                    ),
                    LegOrder::new(
                        String::new(),
                        no_token_id.to_string(),
                        OrderSide::Sell,
                        Decimal::ZERO,
                        size,
                    ),
                    Decimal::ZERO,
                );
                result.status = ExecutionStatus::Failed;
                result.error = Some(format!("exit quote fetch failed: {e}"));
                return result;
            }
        };

        let mut yes_leg = LegOrder::new(
            format!("{execution_id}-yes-exit"),
            yes_token_id.to_string(),
            OrderSide::Sell,
            yes_quote.bid,
            size,
        );
        let mut no_leg = LegOrder::new(
            format!("{execution_id}-no-exit"),
            no_token_id.to_string(),
            OrderSide::Sell,
            no_quote.bid,
            size,
        );

        self.active.insert(
            execution_id.clone(),
            ExecutionResult::new(
                execution_id.clone(),
                condition_id.to_string(),
                yes_leg.clone(),
                no_leg.clone(),
                Decimal::ZERO,
            ),
        );

        info!(
            "exit: market={condition_id} yes_bid={} no_bid={} size={size}",
            yes_quote.bid, no_quote.bid
        );

        let meta = self
            .market_info(condition_id)
            .await
            .unwrap_or(MarketInfo {
                minimum_tick_size: Decimal::new(1, 2),
                neg_risk: false,
            });

        tokio::join!(
            self.submit_leg(&mut yes_leg, &meta),
            self.submit_leg(&mut no_leg, &meta)
        );
        self.update_active(&execution_id, &yes_leg, &no_leg, ExecutionStatus::InProgress);
        tokio::join!(self.track_leg(&mut yes_leg), self.track_leg(&mut no_leg));

        let mut result = ExecutionResult::new(
            execution_id.clone(),
            condition_id.to_string(),
            yes_leg,
            no_leg,
            Decimal::ZERO,
        );
        result.matched_size = result.yes_leg.filled_size.min(result.no_leg.filled_size);
        result.entry_cost = result.yes_leg.fill_notional() + result.no_leg.fill_notional();
        result.status = if result.yes_leg.status == LegStatus::Filled
            && result.no_leg.status == LegStatus::Filled
        {
            ExecutionStatus::Complete
        } else if result.matched_size > Decimal::ZERO
            || result.yes_leg.filled_size > Decimal::ZERO
            || result.no_leg.filled_size > Decimal::ZERO
        {
            ExecutionStatus::Partial
        } else {
            ExecutionStatus::Failed
        };
        result.completed_at = Some(chrono::Utc::now());

        self.active.remove(&execution_id);
        result
    }

    pub fn active_executions(&self) -> Vec<ExecutionResult> {
        self.active.iter().map(|e| e.value().clone()).collect()
    }

    async fn aggregate_entry(&self, result: &mut ExecutionResult) {
        let yes_filled = result.yes_leg.status == LegStatus::Filled;
        let no_filled = result.no_leg.status == LegStatus::Filled;

        if yes_filled && no_filled {
            result.status = ExecutionStatus::Complete;
            result.matched_size = result.yes_leg.filled_size.min(result.no_leg.filled_size);
            result.entry_cost =
                result.yes_leg.fill_notional() + result.no_leg.fill_notional();
            info!(
                "entry complete: id={} size={} cost={}",
                result.execution_id, result.matched_size, result.entry_cost
            );
        } else if result.needs_unwind() {
            result.status = ExecutionStatus::Unwinding;
            self.update_active(
                &result.execution_id,
                &result.yes_leg,
                &result.no_leg,
                ExecutionStatus::Unwinding,
            );
            self.unwind_partial(result).await;
        } else if result.yes_leg.filled_size > Decimal::ZERO {
            // Equal partial fills on both legs: already matched, keep them.
            result.status = ExecutionStatus::Partial;
            result.matched_size = result.yes_leg.filled_size;
            result.entry_cost = result.matched_size
                * (result.yes_leg.price + result.no_leg.price);
        } else {
            result.status = ExecutionStatus::Failed;
            result.error = Some("both legs failed to fill".to_string());
        }
        result.completed_at = Some(chrono::Utc::now());
    }

    /// Sell the over-filled side back at the bid so exposure stays
    /// matched. Best-effort but mandatory: a failure here is critical and
    /// leaves the excess flagged on the result for manual intervention.
    async fn unwind_partial(&self, result: &mut ExecutionResult) {
        let yes_filled = result.yes_leg.filled_size;
        let no_filled = result.no_leg.filled_size;
        let excess = result.imbalance();
        let over_token = if yes_filled > no_filled {
            result.yes_leg.token_id.clone()
        } else {
            result.no_leg.token_id.clone()
        };

        warn!(
            "unwinding: id={} yes_filled={yes_filled} no_filled={no_filled} excess={excess}",
            result.execution_id
        );

        match self
            .sell_at_bid(&result.condition_id, &over_token, excess)
            .await
        {
            Ok(()) => {
                debug!("unwind sell submitted for {excess} of {over_token}");
            }
            Err(e) => {
                error!(
                    "UNWIND FAILED: id={} token={over_token} excess={excess}: {e} — unpaired exposure requires manual intervention",
                    result.execution_id
                );
                result.error = Some(format!("unwind failed: {e}"));
            }
        }

        result.matched_size = yes_filled.min(no_filled);
        result.entry_cost =
            result.matched_size * (result.yes_leg.price + result.no_leg.price);
        result.status = if result.matched_size > Decimal::ZERO {
            ExecutionStatus::Partial
        } else {
            ExecutionStatus::Failed
        };
    }

    async fn sell_at_bid(
        &self,
        condition_id: &str,
        token_id: &str,
        size: Decimal,
    ) -> Result<(), VenueError> {
        let quote = self.venue.get_price(token_id).await?;
        if quote.bid <= Decimal::ZERO {
            return Err(VenueError::MissingBid(token_id.to_string()));
        }
        let meta = self.market_info(condition_id).await?;
        self.venue
            .post_order(&OrderRequest {
                token_id: token_id.to_string(),
                side: OrderSide::Sell,
                price: quote.bid,
                size,
                tick_size: meta.minimum_tick_size,
                neg_risk: meta.neg_risk,
                funder: self.funder.clone(),
            })
            .await?;
        Ok(())
    }

    async fn submit_leg(&self, leg: &mut LegOrder, meta: &MarketInfo) {
        leg.status = LegStatus::Submitted;
        leg.submitted_at = Some(chrono::Utc::now());

        let request = OrderRequest {
            token_id: leg.token_id.clone(),
            side: leg.side,
            price: leg.price,
            size: leg.size,
            tick_size: meta.minimum_tick_size,
            neg_risk: meta.neg_risk,
            funder: self.funder.clone(),
        };

        match self.venue.post_order(&request).await {
            Ok(ack) => {
                debug!("leg submitted: {} order={}", leg.leg_id, ack.order_id);
                leg.order_id = Some(ack.order_id);
            }
            Err(e) => {
                warn!("leg submit failed: {}: {e}", leg.leg_id);
                leg.status = LegStatus::Failed;
                leg.error = Some(format!("submit failed: {e}"));
            }
        }
    }

    /// Poll until the order leaves the open list with the target filled,
    /// or the timeout elapses; then cancel and reconcile partial fills.
    async fn track_leg(&self, leg: &mut LegOrder) {
        if leg.status != LegStatus::Submitted {
            return;
        }
        let Some(order_id) = leg.order_id.clone() else {
            return;
        };

        let deadline = Instant::now() + self.order_timeout;
        while Instant::now() < deadline {
            match self.venue.open_orders(None).await {
                Ok(open) => {
                    let still_open = open.iter().any(|o| o.order_id == order_id);
                    if !still_open {
                        if let Ok(trades) = self.venue.recent_trades(RECENT_TRADES_LIMIT).await
                        {
                            leg.filled_size = filled_for(&trades, &order_id);
                        }
                        if leg.filled_size >= leg.size {
                            leg.status = LegStatus::Filled;
                            leg.filled_at = Some(chrono::Utc::now());
                            return;
                        }
                        // Gone from the book but under target: keep
                        // reading fills until the deadline, the trades
                        // feed may lag.
                    }
                }
                Err(e) => {
                    debug!("open-orders poll failed for {order_id}: {e}");
                }
            }
            sleep(self.poll_interval).await;
        }

        self.cancel_and_reconcile(leg, &order_id).await;
    }

    /// Timeout path. A submitted order whose fills cannot be read is
    /// treated as potentially filled: cancel, re-read after a short
    /// delay, and proceed with the best-known filled size.
    async fn cancel_and_reconcile(&self, leg: &mut LegOrder, order_id: &str) {
        if let Err(e) = self.venue.cancel_order(order_id).await {
            warn!("cancel failed for {order_id}: {e}");
            leg.error = Some(format!("cancel failed: {e}"));
        }

        let mut trades = self.venue.recent_trades(RECENT_TRADES_LIMIT).await;
        if trades.is_err() {
            sleep(self.poll_interval).await;
            trades = self.venue.recent_trades(RECENT_TRADES_LIMIT).await;
        }

        match trades {
            Ok(trades) => {
                leg.filled_size = filled_for(&trades, order_id);
            }
            Err(e) => {
                warn!(
                    "reconcile failed for {order_id}: {e} — proceeding with last known fill {}",
                    leg.filled_size
                );
                leg.error = Some(format!("reconcile failed: {e}"));
            }
        }

        if leg.filled_size >= leg.size {
            leg.status = LegStatus::Filled;
            leg.filled_at = Some(chrono::Utc::now());
        } else if leg.filled_size > Decimal::ZERO {
            leg.status = LegStatus::Partial;
        } else {
            leg.status = LegStatus::Cancelled;
        }
    }

    async fn market_info(&self, condition_id: &str) -> Result<MarketInfo, VenueError> {
        if let Some(meta) = self.market_meta.get(condition_id) {
            return Ok(meta.clone());
        }
        let meta = self.venue.get_market_info(condition_id).await?;
        self.market_meta
            .insert(condition_id.to_string(), meta.clone());
        Ok(meta)
    }

    fn update_active(
        &self,
        execution_id: &str,
        yes_leg: &LegOrder,
        no_leg: &LegOrder,
        status: ExecutionStatus,
    ) {
        if let Some(mut entry) = self.active.get_mut(execution_id) {
            entry.yes_leg = yes_leg.clone();
            entry.no_leg = no_leg.clone();
            entry.status = status;
        }
    }
}

fn filled_for(trades: &[TradeFill], order_id: &str) -> Decimal {
    trades
        .iter()
        .filter(|t| t.order_id == order_id)
        .map(|t| t.size)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::venue::{BookSnapshot, OpenOrder, OrderAck, PriceQuote};
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    #[derive(Clone)]
    struct PlannedOrder {
        token_id: String,
        side: OrderSide,
        price: Decimal,
        size: Decimal,
        fill: Decimal,
        cancelled: bool,
    }

    #[derive(Default)]
    struct VenueState {
        fill_plans: HashMap<String, Decimal>,
        quotes: HashMap<String, PriceQuote>,
        reject_tokens: HashSet<String>,
        fail_sells: bool,
        orders: Vec<(String, PlannedOrder)>,
        next_id: u64,
    }

    /// Scripted venue: each token has a planned fill size. Orders that
    /// reach their plan vanish from the open list; under-filled orders
    /// rest until cancelled.
    struct MockVenue {
        state: Mutex<VenueState>,
    }

    impl MockVenue {
        fn new() -> Self {
            Self {
                state: Mutex::new(VenueState::default()),
            }
        }

        fn plan_fill(&self, token_id: &str, size: Decimal) {
            self.state
                .lock()
                .unwrap()
                .fill_plans
                .insert(token_id.to_string(), size);
        }

        fn set_quote(&self, token_id: &str, bid: Decimal, ask: Decimal) {
            self.state.lock().unwrap().quotes.insert(
                token_id.to_string(),
                PriceQuote {
                    bid,
                    ask,
                    mid: (bid + ask) / dec!(2),
                },
            );
        }

        fn reject_token(&self, token_id: &str) {
            self.state
                .lock()
                .unwrap()
                .reject_tokens
                .insert(token_id.to_string());
        }

        fn fail_sells(&self) {
            self.state.lock().unwrap().fail_sells = true;
        }

        fn posted(&self) -> Vec<PlannedOrder> {
            self.state
                .lock()
                .unwrap()
                .orders
                .iter()
                .map(|(_, o)| o.clone())
                .collect()
        }
    }

    #[async_trait]
    impl VenueApi for MockVenue {
        async fn get_book(&self, token_id: &str) -> Result<BookSnapshot, VenueError> {
            Ok(BookSnapshot {
                token_id: token_id.to_string(),
                bids: vec![],
                asks: vec![],
                hash: String::new(),
            })
        }

        async fn get_price(&self, token_id: &str) -> Result<PriceQuote, VenueError> {
            Ok(self
                .state
                .lock()
                .unwrap()
                .quotes
                .get(token_id)
                .copied()
                .unwrap_or(PriceQuote {
                    bid: dec!(0.45),
                    ask: dec!(0.55),
                    mid: dec!(0.50),
                }))
        }

        async fn get_market_info(&self, _condition_id: &str) -> Result<MarketInfo, VenueError> {
            Ok(MarketInfo {
                minimum_tick_size: dec!(0.01),
                neg_risk: false,
            })
        }

        async fn post_order(&self, request: &OrderRequest) -> Result<OrderAck, VenueError> {
            let mut state = self.state.lock().unwrap();
            if state.reject_tokens.contains(&request.token_id)
                && request.side == OrderSide::Buy
            {
                return Err(VenueError::Rejected("token rejected".into()));
            }
            if state.fail_sells && request.side == OrderSide::Sell {
                return Err(VenueError::Rejected("sells disabled".into()));
            }

            state.next_id += 1;
            let order_id = format!("ord-{}", state.next_id);
            let fill = state
                .fill_plans
                .get(&request.token_id)
                .copied()
                .unwrap_or(request.size)
                .min(request.size);
            state.orders.push((
                order_id.clone(),
                PlannedOrder {
                    token_id: request.token_id.clone(),
                    side: request.side,
                    price: request.price,
                    size: request.size,
                    fill,
                    cancelled: false,
                },
            ));
            Ok(OrderAck {
                order_id,
                status: "live".into(),
            })
        }

        async fn cancel_order(&self, order_id: &str) -> Result<(), VenueError> {
            let mut state = self.state.lock().unwrap();
            for (id, order) in state.orders.iter_mut() {
                if id == order_id {
                    order.cancelled = true;
                }
            }
            Ok(())
        }

        async fn cancel_all(&self) -> Result<(), VenueError> {
            Ok(())
        }

        async fn open_orders(&self, _market: Option<&str>) -> Result<Vec<OpenOrder>, VenueError> {
            let state = self.state.lock().unwrap();
            Ok(state
                .orders
                .iter()
                .filter(|(_, o)| !o.cancelled && o.fill < o.size)
                .map(|(id, o)| OpenOrder {
                    order_id: id.clone(),
                    token_id: o.token_id.clone(),
                    side: o.side,
                    price: o.price,
                    size: o.size,
                })
                .collect())
        }

        async fn recent_trades(&self, _limit: usize) -> Result<Vec<TradeFill>, VenueError> {
            let state = self.state.lock().unwrap();
            Ok(state
                .orders
                .iter()
                .filter(|(_, o)| o.fill > Decimal::ZERO)
                .map(|(id, o)| TradeFill {
                    trade_id: format!("t-{id}"),
                    order_id: id.clone(),
                    token_id: o.token_id.clone(),
                    side: o.side,
                    price: o.price,
                    size: o.fill,
                    fee: Decimal::ZERO,
                    timestamp: Some(Utc::now()),
                })
                .collect())
        }
    }

    fn signal(size: Decimal) -> ParitySignal {
        ParitySignal {
            condition_id: "cond".into(),
            yes_token_id: "yes".into(),
            no_token_id: "no".into(),
            yes_ask: dec!(0.48),
            no_ask: dec!(0.49),
            combined_cost: dec!(0.97),
            gross_edge: dec!(0.03),
            fee_per_share: Decimal::ZERO,
            net_edge: dec!(0.028),
            max_size: size,
            timestamp: Utc::now(),
        }
    }

    fn executor(venue: Arc<MockVenue>) -> PairedExecutor<MockVenue> {
        PairedExecutor::new(venue, "0xfunder".into(), Duration::from_millis(60))
            .with_poll_interval(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn entry_fills_both_legs() {
        let venue = Arc::new(MockVenue::new());
        let exec = executor(venue.clone());

        let result = exec.execute_entry(&signal(dec!(80)), None).await;

        assert_eq!(result.status, ExecutionStatus::Complete);
        assert_eq!(result.matched_size, dec!(80));
        assert_eq!(result.entry_cost, dec!(77.60));
        assert_eq!(result.yes_leg.status, LegStatus::Filled);
        assert_eq!(result.no_leg.status, LegStatus::Filled);
        assert!(result.error.is_none());
        assert_eq!(venue.posted().len(), 2, "no unwind order expected");
        assert!(exec.active_executions().is_empty());
    }

    #[tokio::test]
    async fn partial_fill_unwinds_exact_excess() {
        let venue = Arc::new(MockVenue::new());
        venue.plan_fill("no", dec!(30));
        venue.set_quote("yes", dec!(0.47), dec!(0.49));
        let exec = executor(venue.clone());

        let result = exec.execute_entry(&signal(dec!(50)), None).await;

        assert_eq!(result.status, ExecutionStatus::Partial);
        assert_eq!(result.matched_size, dec!(30));
        assert_eq!(result.yes_leg.filled_size, dec!(50));
        assert_eq!(result.no_leg.filled_size, dec!(30));
        // Matched cost basis only; the unwound excess is not in the pair.
        assert_eq!(result.entry_cost, dec!(30) * dec!(0.97));
        assert!(result.error.is_none());

        let sells: Vec<_> = venue
            .posted()
            .into_iter()
            .filter(|o| o.side == OrderSide::Sell)
            .collect();
        assert_eq!(sells.len(), 1);
        assert_eq!(sells[0].token_id, "yes");
        assert_eq!(sells[0].size, dec!(20));
        assert_eq!(sells[0].price, dec!(0.47));
    }

    #[tokio::test]
    async fn rejected_leg_unwinds_whole_fill() {
        let venue = Arc::new(MockVenue::new());
        venue.reject_token("no");
        let exec = executor(venue.clone());

        let result = exec.execute_entry(&signal(dec!(50)), None).await;

        // YES filled 50, NO never submitted: everything is excess.
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.matched_size, Decimal::ZERO);
        assert_eq!(result.no_leg.status, LegStatus::Failed);

        let sells: Vec<_> = venue
            .posted()
            .into_iter()
            .filter(|o| o.side == OrderSide::Sell)
            .collect();
        assert_eq!(sells.len(), 1);
        assert_eq!(sells[0].size, dec!(50));
    }

    #[tokio::test]
    async fn unfilled_legs_cancel_and_fail() {
        let venue = Arc::new(MockVenue::new());
        venue.plan_fill("yes", Decimal::ZERO);
        venue.plan_fill("no", Decimal::ZERO);
        let exec = executor(venue.clone());

        let result = exec.execute_entry(&signal(dec!(50)), None).await;

        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.yes_leg.status, LegStatus::Cancelled);
        assert_eq!(result.no_leg.status, LegStatus::Cancelled);
        assert_eq!(venue.posted().len(), 2, "no unwind for zero exposure");
    }

    #[tokio::test]
    async fn failed_unwind_flags_result() {
        let venue = Arc::new(MockVenue::new());
        venue.plan_fill("no", dec!(30));
        venue.fail_sells();
        let exec = executor(venue.clone());

        let result = exec.execute_entry(&signal(dec!(50)), None).await;

        // Matched 30 survives, but the 20 excess could not be sold.
        assert_eq!(result.status, ExecutionStatus::Partial);
        assert_eq!(result.matched_size, dec!(30));
        let err = result.error.expect("unwind failure recorded");
        assert!(err.contains("unwind failed"));
    }

    #[tokio::test]
    async fn size_override_shrinks_legs() {
        let venue = Arc::new(MockVenue::new());
        let exec = executor(venue.clone());

        let result = exec.execute_entry(&signal(dec!(80)), Some(dec!(10))).await;

        assert_eq!(result.matched_size, dec!(10));
        assert_eq!(result.entry_cost, dec!(9.70));
    }

    #[tokio::test]
    async fn exit_sells_both_sides_at_bids() {
        let venue = Arc::new(MockVenue::new());
        venue.set_quote("yes", dec!(0.51), dec!(0.53));
        venue.set_quote("no", dec!(0.4895), dec!(0.51));
        let exec = executor(venue.clone());

        let result = exec.execute_exit("cond", "yes", "no", dec!(80)).await;

        assert_eq!(result.status, ExecutionStatus::Complete);
        assert_eq!(result.matched_size, dec!(80));
        // 80 × (0.51 + 0.4895)
        assert_eq!(result.entry_cost, dec!(79.96));
        let posted = venue.posted();
        assert!(posted.iter().all(|o| o.side == OrderSide::Sell));
        assert_eq!(posted.len(), 2);
    }
}
