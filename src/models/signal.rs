use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Parity arbitrage opportunity: buying YES and NO together costs less
/// than the $1 they pay at resolution.
///
/// Immutable once minted; cheap to clone across the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParitySignal {
    pub condition_id: String,
    pub yes_token_id: String,
    pub no_token_id: String,
    pub yes_ask: Decimal,
    pub no_ask: Decimal,
    /// yes_ask + no_ask
    pub combined_cost: Decimal,
    /// 1 − combined_cost
    pub gross_edge: Decimal,
    pub fee_per_share: Decimal,
    /// gross_edge − fee_per_share − slippage_buffer
    pub net_edge: Decimal,
    /// Executable size after liquidity and notional caps.
    pub max_size: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl ParitySignal {
    pub fn is_profitable(&self) -> bool {
        self.net_edge > Decimal::ZERO
    }

    pub fn expected_total_profit(&self, size: Decimal) -> Decimal {
        self.net_edge * size
    }
}
