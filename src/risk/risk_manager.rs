use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::config::{RiskConfig, TradingConfig};
use crate::risk::position_ledger::PositionLedger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskViolation {
    MaxDailyLoss,
    MaxPositionValue,
    MaxOpenPairs,
    CooldownActive,
    KillSwitchTriggered,
    ConsecutiveFailures,
}

/// Outcome of a pre-trade gate check. A rejection is a value, not an
/// error: the trading loop logs it and skips the cycle.
#[derive(Debug, Clone)]
pub struct RiskCheck {
    pub passed: bool,
    pub violation: Option<RiskViolation>,
    pub message: String,
}

impl RiskCheck {
    pub fn ok() -> Self {
        Self {
            passed: true,
            violation: None,
            message: String::new(),
        }
    }

    pub fn fail(violation: RiskViolation, message: impl Into<String>) -> Self {
        Self {
            passed: false,
            violation: Some(violation),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DailyStats {
    pub date: NaiveDate,
    pub trades_count: u64,
    pub realized_pnl: Decimal,
    pub peak_pnl: Decimal,
    pub max_drawdown: Decimal,
}

impl DailyStats {
    fn for_today() -> Self {
        Self {
            date: Utc::now().date_naive(),
            trades_count: 0,
            realized_pnl: Decimal::ZERO,
            peak_pnl: Decimal::ZERO,
            max_drawdown: Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HealthReport {
    pub healthy: bool,
    pub issues: Vec<String>,
}

struct RiskState {
    kill_switch: bool,
    kill_reason: Option<String>,
    last_trade: Option<Instant>,
    consecutive_failures: u32,
    daily: DailyStats,
    ws_connected: bool,
    last_ws_message: Option<DateTime<Utc>>,
}

/// Gates every entry and latches a kill switch on loss or failure streaks.
///
/// The kill switch is manual-reset only: once latched, no new entries
/// until an operator clears it. Existing positions still exit normally.
pub struct RiskManager {
    config: RiskConfig,
    trading: TradingConfig,
    ledger: Arc<PositionLedger>,
    state: Mutex<RiskState>,
}

impl RiskManager {
    pub fn new(config: RiskConfig, trading: TradingConfig, ledger: Arc<PositionLedger>) -> Self {
        Self {
            config,
            trading,
            ledger,
            state: Mutex::new(RiskState {
                kill_switch: false,
                kill_reason: None,
                last_trade: None,
                consecutive_failures: 0,
                daily: DailyStats::for_today(),
                ws_connected: false,
                last_ws_message: None,
            }),
        }
    }

    fn latch(state: &mut RiskState, reason: String) {
        if !state.kill_switch {
            error!("KILL SWITCH latched: {reason}");
        }
        state.kill_switch = true;
        state.kill_reason = Some(reason);
    }

    fn roll_daily(state: &mut RiskState) {
        let today = Utc::now().date_naive();
        if state.daily.date != today {
            info!("daily stats rollover: {} -> {}", state.daily.date, today);
            state.daily = DailyStats::for_today();
        }
    }

    /// Pre-trade gate. Checks run in order; the first violation wins.
    pub async fn check_can_trade(&self) -> RiskCheck {
        let can_open = self.ledger.can_open_new().await;
        let open_count = self.ledger.open_count().await;
        let exposure = self.ledger.total_exposure().await;

        let mut state = self.state.lock().await;
        Self::roll_daily(&mut state);

        if state.kill_switch {
            let reason = state.kill_reason.clone().unwrap_or_default();
            return RiskCheck::fail(
                RiskViolation::KillSwitchTriggered,
                format!("kill switch active: {reason}"),
            );
        }

        if let Some(last) = state.last_trade {
            let elapsed_ms = last.elapsed().as_millis() as u64;
            if elapsed_ms < self.trading.cooldown_ms {
                return RiskCheck::fail(
                    RiskViolation::CooldownActive,
                    format!(
                        "cooldown: {}ms remaining",
                        self.trading.cooldown_ms - elapsed_ms
                    ),
                );
            }
        }

        if !can_open {
            return RiskCheck::fail(
                RiskViolation::MaxOpenPairs,
                format!("max open pairs reached: {open_count}"),
            );
        }

        if state.daily.realized_pnl <= -self.config.max_daily_loss {
            let pnl = state.daily.realized_pnl;
            Self::latch(&mut state, format!("daily loss limit exceeded: {pnl}"));
            return RiskCheck::fail(
                RiskViolation::MaxDailyLoss,
                format!("daily loss limit exceeded: {pnl}"),
            );
        }

        if exposure >= self.config.max_position_value {
            return RiskCheck::fail(
                RiskViolation::MaxPositionValue,
                format!("max position value reached: {exposure}"),
            );
        }

        if state.consecutive_failures >= self.config.max_consecutive_failures {
            return RiskCheck::fail(
                RiskViolation::ConsecutiveFailures,
                format!("failure streak: {}", state.consecutive_failures),
            );
        }

        RiskCheck::ok()
    }

    /// Per-trade sizing gate against the notional and exposure caps.
    pub async fn check_trade_size(&self, size: Decimal, combined_cost: Decimal) -> RiskCheck {
        let notional = size * combined_cost;
        if notional > self.trading.max_notional_per_trade {
            return RiskCheck::fail(
                RiskViolation::MaxPositionValue,
                format!(
                    "trade notional {notional} exceeds max {}",
                    self.trading.max_notional_per_trade
                ),
            );
        }

        let exposure = self.ledger.total_exposure().await;
        if exposure + notional > self.config.max_position_value {
            return RiskCheck::fail(
                RiskViolation::MaxPositionValue,
                format!(
                    "trade would push exposure to {} (cap {})",
                    exposure + notional,
                    self.config.max_position_value
                ),
            );
        }

        RiskCheck::ok()
    }

    /// Post-trade accounting: starts the cooldown, resets or advances the
    /// failure streak, latches the kill switch at the streak threshold.
    pub async fn record_trade(&self, success: bool) {
        let mut state = self.state.lock().await;
        Self::roll_daily(&mut state);
        state.last_trade = Some(Instant::now());

        if success {
            state.consecutive_failures = 0;
            state.daily.trades_count += 1;
        } else {
            state.consecutive_failures += 1;
            if state.consecutive_failures >= self.config.max_consecutive_failures {
                let n = state.consecutive_failures;
                Self::latch(&mut state, format!("{n} consecutive failures"));
            }
        }
    }

    /// Fold realized P&L into today's stats; latch the kill switch when
    /// the day's total drops below the hard loss threshold.
    pub async fn record_pnl(&self, delta: Decimal) {
        let mut state = self.state.lock().await;
        Self::roll_daily(&mut state);

        state.daily.realized_pnl += delta;
        if state.daily.realized_pnl > state.daily.peak_pnl {
            state.daily.peak_pnl = state.daily.realized_pnl;
        }
        let drawdown = state.daily.peak_pnl - state.daily.realized_pnl;
        if drawdown > state.daily.max_drawdown {
            state.daily.max_drawdown = drawdown;
        }

        if state.daily.realized_pnl < -self.config.kill_switch_loss_threshold {
            let pnl = state.daily.realized_pnl;
            Self::latch(&mut state, format!("loss threshold exceeded: {pnl}"));
        }
    }

    pub async fn update_ws_status(&self, connected: bool, last_message: Option<DateTime<Utc>>) {
        let mut state = self.state.lock().await;
        state.ws_connected = connected;
        if let Some(ts) = last_message {
            state.last_ws_message = Some(ts);
        }
    }

    pub async fn health(&self) -> HealthReport {
        let open = self.ledger.open_count().await;
        let exposure = self.ledger.total_exposure().await;
        let state = self.state.lock().await;

        let mut issues = Vec::new();
        if !state.ws_connected {
            issues.push("websocket disconnected".to_string());
        }
        if let Some(ts) = state.last_ws_message {
            let age = (Utc::now() - ts).num_seconds();
            if age > 60 {
                issues.push(format!("stale data: {age}s since last stream message"));
            }
        }
        if state.kill_switch {
            issues.push(format!(
                "kill switch active: {}",
                state.kill_reason.clone().unwrap_or_default()
            ));
        }
        if state.consecutive_failures > 0 {
            issues.push(format!(
                "consecutive failures: {}",
                state.consecutive_failures
            ));
        }
        if state.daily.realized_pnl < Decimal::ZERO {
            issues.push(format!("daily P&L negative: {}", state.daily.realized_pnl));
        }

        tracing::debug!(
            "health: open={} exposure={} issues={}",
            open,
            exposure,
            issues.len()
        );

        HealthReport {
            healthy: issues.is_empty(),
            issues,
        }
    }

    pub async fn is_kill_switch_active(&self) -> bool {
        self.state.lock().await.kill_switch
    }

    /// Manual intervention only.
    pub async fn reset_kill_switch(&self) {
        let mut state = self.state.lock().await;
        state.kill_switch = false;
        state.kill_reason = None;
        info!("kill switch reset");
    }

    pub async fn daily_stats(&self) -> DailyStats {
        let mut state = self.state.lock().await;
        Self::roll_daily(&mut state);
        state.daily.clone()
    }

    /// Snapshot for periodic logging and persistence.
    pub async fn status(&self) -> serde_json::Value {
        let open = self.ledger.open_count().await;
        let exposure = self.ledger.total_exposure().await;
        let state = self.state.lock().await;
        serde_json::json!({
            "kill_switch_active": state.kill_switch,
            "kill_switch_reason": state.kill_reason,
            "consecutive_failures": state.consecutive_failures,
            "ws_connected": state.ws_connected,
            "daily": {
                "date": state.daily.date.to_string(),
                "trades_count": state.daily.trades_count,
                "realized_pnl": state.daily.realized_pnl.to_string(),
                "peak_pnl": state.daily.peak_pnl.to_string(),
                "max_drawdown": state.daily.max_drawdown.to_string(),
            },
            "open_positions": open,
            "total_exposure": exposure.to_string(),
        })
    }
}
