//! End-to-end pipeline tests: synthetic paired books driven through
//! detector → risk gate → dual-leg executor → ledger → convergence exit,
//! with a scripted venue standing in for the CLOB.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use paribot::config::{FeeConfig, RiskConfig, TradingConfig};
use paribot::execution::executor::PairedExecutor;
use paribot::execution::venue::{
    BookSnapshot, MarketInfo, OpenOrder, OrderAck, OrderRequest, PriceQuote, TradeFill, VenueApi,
    VenueError,
};
use paribot::models::order::{ExecutionStatus, OrderSide};
use paribot::models::position::{PairedPosition, PositionStatus};
use paribot::orderbook::BookStore;
use paribot::risk::position_ledger::PositionLedger;
use paribot::risk::risk_manager::{RiskManager, RiskViolation};
use paribot::signals::convergence::{ConvergenceDetector, ExitReason};
use paribot::signals::parity::ParityDetector;
use paribot::storage::PositionStore;

// ---------------------------------------------------------------------------
// Scripted venue
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct RestingOrder {
    order_id: String,
    token_id: String,
    side: OrderSide,
    price: Decimal,
    size: Decimal,
    fill: Decimal,
    cancelled: bool,
}

#[derive(Default)]
struct ScriptedState {
    fill_plans: HashMap<String, Decimal>,
    quotes: HashMap<String, PriceQuote>,
    orders: Vec<RestingOrder>,
    next_id: u64,
}

struct ScriptedVenue {
    state: Mutex<ScriptedState>,
}

impl ScriptedVenue {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ScriptedState::default()),
        })
    }

    fn plan_fill(&self, token_id: &str, size: Decimal) {
        self.state
            .lock()
            .unwrap()
            .fill_plans
            .insert(token_id.into(), size);
    }

    fn set_quote(&self, token_id: &str, bid: Decimal, ask: Decimal) {
        self.state.lock().unwrap().quotes.insert(
            token_id.into(),
            PriceQuote {
                bid,
                ask,
                mid: (bid + ask) / dec!(2),
            },
        );
    }

    fn posted(&self) -> Vec<RestingOrder> {
        self.state.lock().unwrap().orders.clone()
    }
}

#[async_trait]
impl VenueApi for ScriptedVenue {
    async fn get_book(&self, token_id: &str) -> Result<BookSnapshot, VenueError> {
        Ok(BookSnapshot {
            token_id: token_id.into(),
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
        state.next_id += 1;
        let order_id = format!("ord-{}", state.next_id);
        let fill = state
            .fill_plans
            .get(&request.token_id)
            .copied()
            .unwrap_or(request.size)
            .min(request.size);
        state.orders.push(RestingOrder {
            order_id: order_id.clone(),
            token_id: request.token_id.clone(),
            side: request.side,
            price: request.price,
            size: request.size,
            fill,
            cancelled: false,
        });
        Ok(OrderAck {
            order_id,
            status: "live".into(),
        })
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), VenueError> {
        let mut state = self.state.lock().unwrap();
        for order in state.orders.iter_mut() {
            if order.order_id == order_id {
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
            .filter(|o| !o.cancelled && o.fill < o.size)
            .map(|o| OpenOrder {
                order_id: o.order_id.clone(),
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
            .filter(|o| o.fill > Decimal::ZERO)
            .map(|o| TradeFill {
                trade_id: format!("t-{}", o.order_id),
                order_id: o.order_id.clone(),
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

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn seed_books(store: &BookStore) {
    store.add_market("cond-1", "yes-1", "no-1", dec!(0.01), false);
    store.apply_snapshot(
        "yes-1",
        &[(dec!(0.46), dec!(120))],
        &[(dec!(0.48), dec!(100))],
        "h-yes",
    );
    store.apply_snapshot(
        "no-1",
        &[(dec!(0.47), dec!(90))],
        &[(dec!(0.49), dec!(80))],
        "h-no",
    );
}

fn detector(store: Arc<BookStore>) -> ParityDetector {
    ParityDetector::new(store, &FeeConfig::default(), &TradingConfig::default())
}

fn fast_executor(venue: Arc<ScriptedVenue>) -> PairedExecutor<ScriptedVenue> {
    PairedExecutor::new(venue, "0xfunder".into(), Duration::from_millis(60))
        .with_poll_interval(Duration::from_millis(10))
}

fn risk_manager(ledger: Arc<PositionLedger>) -> RiskManager {
    let mut trading = TradingConfig::default();
    trading.cooldown_ms = 0;
    RiskManager::new(RiskConfig::default(), trading, ledger)
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn clean_parity_capture() {
    let store = Arc::new(BookStore::new());
    seed_books(&store);

    let det = detector(store.clone());
    let signal = det.best(dec!(0.005)).expect("edge present");
    assert_eq!(signal.combined_cost, dec!(0.97));
    assert_eq!(signal.gross_edge, dec!(0.03));
    assert_eq!(signal.net_edge, dec!(0.028));
    assert_eq!(signal.max_size, dec!(80));

    let ledger = Arc::new(PositionLedger::new(5));
    let risk = risk_manager(ledger.clone());
    assert!(risk.check_can_trade().await.passed);
    assert!(risk
        .check_trade_size(signal.max_size, signal.combined_cost)
        .await
        .passed);

    let venue = ScriptedVenue::new();
    let exec = fast_executor(venue.clone());
    let result = exec.execute_entry(&signal, None).await;

    assert_eq!(result.status, ExecutionStatus::Complete);
    assert_eq!(result.matched_size, dec!(80));
    assert_eq!(result.entry_cost, dec!(77.60));

    let position = PairedPosition::from_entry(&result);
    assert_eq!(position.size, result.yes_leg.filled_size.min(result.no_leg.filled_size));
    assert_eq!(position.expected_pnl_at_resolution(), dec!(2.40));
    ledger.add(position).await;
    risk.record_trade(true).await;

    assert_eq!(ledger.total_exposure().await, dec!(77.60));
    assert_eq!(ledger.open_count().await, 1);
}

#[tokio::test]
async fn partial_fill_is_unwound_and_booked_at_matched_size() {
    let store = Arc::new(BookStore::new());
    seed_books(&store);
    let det = detector(store.clone());
    let mut signal = det.best(dec!(0.005)).expect("edge present");
    signal.max_size = dec!(50);

    let venue = ScriptedVenue::new();
    venue.plan_fill("no-1", dec!(30));
    venue.set_quote("yes-1", dec!(0.46), dec!(0.48));

    let exec = fast_executor(venue.clone());
    let result = exec.execute_entry(&signal, None).await;

    assert_eq!(result.status, ExecutionStatus::Partial);
    assert_eq!(result.matched_size, dec!(30));
    assert!(result.error.is_none());

    // The exact excess was sold back at the bid.
    let sells: Vec<_> = venue
        .posted()
        .into_iter()
        .filter(|o| o.side == OrderSide::Sell)
        .collect();
    assert_eq!(sells.len(), 1);
    assert_eq!(sells[0].token_id, "yes-1");
    assert_eq!(sells[0].size, dec!(20));

    let ledger = Arc::new(PositionLedger::new(5));
    let risk = risk_manager(ledger.clone());
    ledger.add(PairedPosition::from_entry(&result)).await;
    risk.record_trade(true).await;

    let open = ledger.open_positions().await;
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].size, dec!(30));
    assert!(!risk.is_kill_switch_active().await);
}

#[tokio::test]
async fn convergence_exit_realizes_pnl() {
    let store = Arc::new(BookStore::new());
    seed_books(&store);

    let ledger = Arc::new(PositionLedger::new(5));
    let risk = risk_manager(ledger.clone());

    // Open the scenario position: 80 pairs at 0.48 + 0.49.
    let venue = ScriptedVenue::new();
    let det = detector(store.clone());
    let signal = det.best(dec!(0.005)).unwrap();
    let exec = fast_executor(venue.clone());
    let entry = exec.execute_entry(&signal, None).await;
    let position = PairedPosition::from_entry(&entry);
    let position_id = position.position_id.clone();
    ledger.add(position).await;

    // Books converge: combined bid reaches 0.9995.
    store.apply_snapshot("yes-1", &[(dec!(0.51), dec!(200))], &[(dec!(0.52), dec!(50))], "");
    store.apply_snapshot("no-1", &[(dec!(0.4895), dec!(200))], &[(dec!(0.50), dec!(50))], "");

    let convergence = ConvergenceDetector::new(store.clone(), dec!(0.001));
    let (should_exit, reason) = convergence.should_exit("cond-1");
    assert!(should_exit);
    assert_eq!(reason, ExitReason::SpreadConverged);

    venue.set_quote("yes-1", dec!(0.51), dec!(0.52));
    venue.set_quote("no-1", dec!(0.4895), dec!(0.50));

    let exit = exec.execute_exit("cond-1", "yes-1", "no-1", dec!(80)).await;
    assert_eq!(exit.status, ExecutionStatus::Complete);

    let proceeds = exit.yes_leg.fill_notional() + exit.no_leg.fill_notional();
    assert_eq!(proceeds, dec!(79.96));

    let closed = ledger
        .close(&position_id, exit.yes_leg.price, exit.no_leg.price, proceeds)
        .await
        .expect("close succeeds");
    assert_eq!(closed.status, PositionStatus::Closed);
    assert_eq!(closed.realized_pnl, dec!(2.36));

    risk.record_pnl(closed.realized_pnl).await;
    assert!(!risk.is_kill_switch_active().await);
    assert_eq!(ledger.total_realized_pnl().await, dec!(2.36));
}

#[tokio::test]
async fn daily_loss_latches_kill_switch_and_blocks_entries() {
    let ledger = Arc::new(PositionLedger::new(5));
    let risk = risk_manager(ledger);

    risk.record_pnl(dec!(-195)).await;
    assert!(risk.check_can_trade().await.passed);

    risk.record_pnl(dec!(-10)).await;
    let gate = risk.check_can_trade().await;
    assert!(!gate.passed);
    assert_eq!(gate.violation, Some(RiskViolation::KillSwitchTriggered));
}

#[tokio::test]
async fn restart_restores_open_positions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let store = Arc::new(BookStore::new());
    seed_books(&store);
    let det = detector(store.clone());
    let signal = det.best(dec!(0.005)).unwrap();

    let venue = ScriptedVenue::new();
    let exec = fast_executor(venue);
    let result = exec.execute_entry(&signal, None).await;
    let position = PairedPosition::from_entry(&result);

    {
        let storage = PositionStore::open(&path).unwrap();
        let ledger = PositionLedger::new(5);
        ledger.add(position.clone()).await;
        storage.save_positions(&ledger.all_positions().await).unwrap();
    }

    // Fresh process: reload and compare.
    let storage = PositionStore::open(&path).unwrap();
    let ledger = PositionLedger::new(5);
    for p in storage.get_open_positions() {
        ledger.add(p).await;
    }

    let restored = ledger.get(&position.position_id).await.expect("restored");
    assert_eq!(restored.size, position.size);
    assert_eq!(restored.yes_entry_price, position.yes_entry_price);
    assert_eq!(restored.no_entry_price, position.no_entry_price);
    assert_eq!(restored.entry_cost, position.entry_cost);
    assert_eq!(restored.status, PositionStatus::Open);
}
