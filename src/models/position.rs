use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::order::ExecutionResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    Exiting,
    Closed,
    Resolved,
}

/// A matched YES+NO pair from a parity entry.
///
/// The pair pays exactly $1 per share at resolution regardless of outcome,
/// so the position either exits early at convergence or rides to
/// settlement. Once the status leaves Open it never returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairedPosition {
    pub position_id: String,
    pub condition_id: String,
    pub yes_token_id: String,
    pub no_token_id: String,

    pub size: Decimal,
    pub yes_entry_price: Decimal,
    pub no_entry_price: Decimal,
    pub entry_cost: Decimal,
    pub entry_time: DateTime<Utc>,

    pub yes_exit_price: Option<Decimal>,
    pub no_exit_price: Option<Decimal>,
    pub exit_proceeds: Option<Decimal>,
    pub exit_time: Option<DateTime<Utc>>,

    pub status: PositionStatus,
    pub realized_pnl: Decimal,

    pub execution_id: Option<String>,
    /// Set when a leg was left unpaired after a failed unwind.
    pub notes: String,
}

impl PairedPosition {
    /// Build a position from the matched part of an execution.
    pub fn from_entry(result: &ExecutionResult) -> Self {
        Self {
            position_id: result.execution_id.clone(),
            condition_id: result.condition_id.clone(),
            yes_token_id: result.yes_leg.token_id.clone(),
            no_token_id: result.no_leg.token_id.clone(),
            size: result.matched_size,
            yes_entry_price: result.yes_leg.price,
            no_entry_price: result.no_leg.price,
            entry_cost: result.entry_cost,
            entry_time: result.created_at,
            yes_exit_price: None,
            no_exit_price: None,
            exit_proceeds: None,
            exit_time: None,
            status: PositionStatus::Open,
            realized_pnl: Decimal::ZERO,
            execution_id: Some(result.execution_id.clone()),
            notes: String::new(),
        }
    }

    pub fn combined_entry_price(&self) -> Decimal {
        self.yes_entry_price + self.no_entry_price
    }

    /// P&L if held to resolution: the pair pays $1 per share.
    pub fn expected_pnl_at_resolution(&self) -> Decimal {
        (Decimal::ONE - self.combined_entry_price()) * self.size
    }

    pub fn calculate_exit_pnl(&self, yes_exit: Decimal, no_exit: Decimal) -> Decimal {
        (yes_exit + no_exit) * self.size - self.entry_cost
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// Terminal: sell-both exit at the given prices.
    pub fn close(&mut self, yes_exit: Decimal, no_exit: Decimal, proceeds: Decimal) {
        self.yes_exit_price = Some(yes_exit);
        self.no_exit_price = Some(no_exit);
        self.exit_proceeds = Some(proceeds);
        self.exit_time = Some(Utc::now());
        self.realized_pnl = proceeds - self.entry_cost;
        self.status = PositionStatus::Closed;
    }

    /// Terminal: market settled, pair paid out.
    pub fn resolve(&mut self, payout: Decimal) {
        self.exit_proceeds = Some(payout);
        self.exit_time = Some(Utc::now());
        self.realized_pnl = payout - self.entry_cost;
        self.status = PositionStatus::Resolved;
    }

    pub fn holding_time_seconds(&self) -> f64 {
        let end = self.exit_time.unwrap_or_else(Utc::now);
        (end - self.entry_time).num_milliseconds() as f64 / 1000.0
    }
}
