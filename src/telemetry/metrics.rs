use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::info;

/// Session counters, cheap enough to bump from any task.
pub struct MetricsCollector {
    session_start: DateTime<Utc>,
    signals_seen: AtomicU64,
    trade_attempts: AtomicU64,
    trade_successes: AtomicU64,
    trade_partials: AtomicU64,
    trade_failures: AtomicU64,
    positions_closed: AtomicU64,
    api_errors: AtomicU64,
    ws_reconnects: AtomicU64,
    realized_pnl: Mutex<Decimal>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            session_start: Utc::now(),
            signals_seen: AtomicU64::new(0),
            trade_attempts: AtomicU64::new(0),
            trade_successes: AtomicU64::new(0),
            trade_partials: AtomicU64::new(0),
            trade_failures: AtomicU64::new(0),
            positions_closed: AtomicU64::new(0),
            api_errors: AtomicU64::new(0),
            ws_reconnects: AtomicU64::new(0),
            realized_pnl: Mutex::new(Decimal::ZERO),
        }
    }

    pub fn record_signal(&self) {
        self.signals_seen.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_trade_attempt(&self) {
        self.trade_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_trade_success(&self) {
        self.trade_successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_trade_partial(&self) {
        self.trade_partials.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_trade_failure(&self) {
        self.trade_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_position_closed(&self, realized_pnl: Decimal) {
        self.positions_closed.fetch_add(1, Ordering::Relaxed);
        *self.realized_pnl.lock().expect("metrics lock") += realized_pnl;
    }

    pub fn record_api_error(&self) {
        self.api_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ws_reconnect(&self) {
        self.ws_reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn realized_pnl(&self) -> Decimal {
        *self.realized_pnl.lock().expect("metrics lock")
    }

    pub fn session_metrics(&self) -> Value {
        let uptime = (Utc::now() - self.session_start).num_seconds();
        json!({
            "session_start": self.session_start.to_rfc3339(),
            "uptime_seconds": uptime,
            "signals_seen": self.signals_seen.load(Ordering::Relaxed),
            "trade_attempts": self.trade_attempts.load(Ordering::Relaxed),
            "trade_successes": self.trade_successes.load(Ordering::Relaxed),
            "trade_partials": self.trade_partials.load(Ordering::Relaxed),
            "trade_failures": self.trade_failures.load(Ordering::Relaxed),
            "positions_closed": self.positions_closed.load(Ordering::Relaxed),
            "api_errors": self.api_errors.load(Ordering::Relaxed),
            "ws_reconnects": self.ws_reconnects.load(Ordering::Relaxed),
            "realized_pnl": self.realized_pnl().to_string(),
        })
    }

    pub fn log_summary(&self) {
        info!(
            "session: signals={} attempts={} ok={} partial={} failed={} closed={} pnl={}",
            self.signals_seen.load(Ordering::Relaxed),
            self.trade_attempts.load(Ordering::Relaxed),
            self.trade_successes.load(Ordering::Relaxed),
            self.trade_partials.load(Ordering::Relaxed),
            self.trade_failures.load(Ordering::Relaxed),
            self.positions_closed.load(Ordering::Relaxed),
            self.realized_pnl(),
        );
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn counters_accumulate() {
        let metrics = MetricsCollector::new();
        metrics.record_signal();
        metrics.record_trade_attempt();
        metrics.record_trade_success();
        metrics.record_position_closed(dec!(2.36));
        metrics.record_position_closed(dec!(-0.50));

        let snapshot = metrics.session_metrics();
        assert_eq!(snapshot["signals_seen"], 1);
        assert_eq!(snapshot["trade_successes"], 1);
        assert_eq!(snapshot["positions_closed"], 2);
        assert_eq!(metrics.realized_pnl(), dec!(1.86));
    }
}
