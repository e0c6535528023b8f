use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LegStatus {
    Pending,
    Submitted,
    Partial,
    Filled,
    Cancelled,
    Failed,
}

/// One side of a paired execution. Mutated only by the leg's own task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegOrder {
    pub leg_id: String,
    pub token_id: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub size: Decimal,
    pub order_id: Option<String>,
    pub filled_size: Decimal,
    pub status: LegStatus,
    pub error: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub filled_at: Option<DateTime<Utc>>,
}

impl LegOrder {
    pub fn new(leg_id: String, token_id: String, side: OrderSide, price: Decimal, size: Decimal) -> Self {
        Self {
            leg_id,
            token_id,
            side,
            price,
            size,
            order_id: None,
            filled_size: Decimal::ZERO,
            status: LegStatus::Pending,
            error: None,
            submitted_at: None,
            filled_at: None,
        }
    }

    pub fn fill_notional(&self) -> Decimal {
        self.price * self.filled_size
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Pending,
    InProgress,
    Complete,
    Partial,
    Failed,
    Unwinding,
}

/// Outcome of a dual-leg execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub execution_id: String,
    pub condition_id: String,
    pub yes_leg: LegOrder,
    pub no_leg: LegOrder,
    pub status: ExecutionStatus,
    /// Cost basis of the matched pair (sum over both legs for complete
    /// entries, matched size × combined price after an unwind).
    pub entry_cost: Decimal,
    pub expected_profit: Decimal,
    /// min(yes_filled, no_filled), the size actually paired.
    pub matched_size: Decimal,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn new(
        execution_id: String,
        condition_id: String,
        yes_leg: LegOrder,
        no_leg: LegOrder,
        expected_profit: Decimal,
    ) -> Self {
        Self {
            execution_id,
            condition_id,
            yes_leg,
            no_leg,
            status: ExecutionStatus::Pending,
            entry_cost: Decimal::ZERO,
            expected_profit,
            matched_size: Decimal::ZERO,
            created_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == ExecutionStatus::Complete
    }

    /// Unbalanced exposure that must be hedged or sold off.
    pub fn needs_unwind(&self) -> bool {
        self.yes_leg.filled_size != self.no_leg.filled_size
            && (self.yes_leg.filled_size > Decimal::ZERO
                || self.no_leg.filled_size > Decimal::ZERO)
    }

    /// Absolute fill imbalance between the two legs.
    pub fn imbalance(&self) -> Decimal {
        (self.yes_leg.filled_size - self.no_leg.filled_size).abs()
    }
}
