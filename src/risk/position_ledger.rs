use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::models::position::{PairedPosition, PositionStatus};

#[derive(Default)]
struct LedgerInner {
    positions: HashMap<String, PairedPosition>,
    by_market: HashMap<String, Vec<String>>,
}

/// Owns every paired position the bot holds.
///
/// All mutation goes through one mutex; readers get clones. Terminal
/// transitions (close, resolve) set realized P&L and never revert.
pub struct PositionLedger {
    max_open_pairs: usize,
    inner: Mutex<LedgerInner>,
}

impl PositionLedger {
    pub fn new(max_open_pairs: usize) -> Self {
        Self {
            max_open_pairs,
            inner: Mutex::new(LedgerInner::default()),
        }
    }

    pub async fn add(&self, position: PairedPosition) {
        let mut inner = self.inner.lock().await;
        let open = inner
            .positions
            .values()
            .filter(|p| p.status == PositionStatus::Open)
            .count();
        if open >= self.max_open_pairs {
            warn!(
                "ledger at {}/{} open pairs, adding {} anyway",
                open, self.max_open_pairs, position.position_id
            );
        }
        inner
            .by_market
            .entry(position.condition_id.clone())
            .or_default()
            .push(position.position_id.clone());
        info!(
            "position opened: id={} market={} size={} cost={}",
            position.position_id, position.condition_id, position.size, position.entry_cost
        );
        inner
            .positions
            .insert(position.position_id.clone(), position);
    }

    pub async fn get(&self, position_id: &str) -> Option<PairedPosition> {
        self.inner.lock().await.positions.get(position_id).cloned()
    }

    pub async fn open_positions(&self) -> Vec<PairedPosition> {
        self.inner
            .lock()
            .await
            .positions
            .values()
            .filter(|p| p.status == PositionStatus::Open)
            .cloned()
            .collect()
    }

    pub async fn all_positions(&self) -> Vec<PairedPosition> {
        self.inner.lock().await.positions.values().cloned().collect()
    }

    pub async fn positions_for_market(&self, condition_id: &str) -> Vec<PairedPosition> {
        let inner = self.inner.lock().await;
        inner
            .by_market
            .get(condition_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.positions.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Close with exit prices and proceeds. Returns the closed position,
    /// or None if the id is unknown or already terminal.
    pub async fn close(
        &self,
        position_id: &str,
        yes_exit: Decimal,
        no_exit: Decimal,
        proceeds: Decimal,
    ) -> Option<PairedPosition> {
        let mut inner = self.inner.lock().await;
        let position = inner.positions.get_mut(position_id)?;
        if !matches!(position.status, PositionStatus::Open | PositionStatus::Exiting) {
            return None;
        }
        position.close(yes_exit, no_exit, proceeds);
        info!(
            "position closed: id={} proceeds={} pnl={}",
            position_id, proceeds, position.realized_pnl
        );
        Some(position.clone())
    }

    /// Settle at resolution payout. Same terminality rules as `close`.
    pub async fn resolve(&self, position_id: &str, payout: Decimal) -> Option<PairedPosition> {
        let mut inner = self.inner.lock().await;
        let position = inner.positions.get_mut(position_id)?;
        if !matches!(position.status, PositionStatus::Open | PositionStatus::Exiting) {
            return None;
        }
        position.resolve(payout);
        info!("position resolved: id={} payout={}", position_id, payout);
        Some(position.clone())
    }

    pub async fn remove(&self, position_id: &str) -> Option<PairedPosition> {
        let mut inner = self.inner.lock().await;
        let position = inner.positions.remove(position_id)?;
        if let Some(ids) = inner.by_market.get_mut(&position.condition_id) {
            ids.retain(|id| id != position_id);
        }
        Some(position)
    }

    /// Entry cost summed over open positions only.
    pub async fn total_exposure(&self) -> Decimal {
        self.inner
            .lock()
            .await
            .positions
            .values()
            .filter(|p| p.status == PositionStatus::Open)
            .map(|p| p.entry_cost)
            .sum()
    }

    pub async fn market_exposure(&self, condition_id: &str) -> Decimal {
        self.positions_for_market(condition_id)
            .await
            .iter()
            .filter(|p| p.status == PositionStatus::Open)
            .map(|p| p.entry_cost)
            .sum()
    }

    pub async fn total_realized_pnl(&self) -> Decimal {
        self.inner
            .lock()
            .await
            .positions
            .values()
            .filter(|p| p.status != PositionStatus::Open)
            .map(|p| p.realized_pnl)
            .sum()
    }

    pub async fn open_count(&self) -> usize {
        self.inner
            .lock()
            .await
            .positions
            .values()
            .filter(|p| p.status == PositionStatus::Open)
            .count()
    }

    pub async fn can_open_new(&self) -> bool {
        self.open_count().await < self.max_open_pairs
    }
}
