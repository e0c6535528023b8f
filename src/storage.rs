use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{info, warn};

use crate::models::position::{PairedPosition, PositionStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    positions: HashMap<String, PairedPosition>,
    state: HashMap<String, Value>,
}

/// Durable state for restarts: every position ever opened plus a small
/// key → JSON map for session metadata.
///
/// Each mutation rewrites the whole file and renames it into place, so a
/// crash mid-write leaves the previous state intact.
pub struct PositionStore {
    path: PathBuf,
    state: Mutex<StoreState>,
}

impl PositionStore {
    /// Open the store, loading existing state. A missing file starts
    /// empty; a corrupt file is preserved aside and ignored.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<StoreState>(&bytes) {
                Ok(state) => {
                    info!(
                        "state loaded: {} positions from {}",
                        state.positions.len(),
                        path.display()
                    );
                    state
                }
                Err(e) => {
                    let backup = path.with_extension("corrupt");
                    warn!(
                        "state file unreadable ({e}), moving aside to {}",
                        backup.display()
                    );
                    let _ = fs::rename(&path, &backup);
                    StoreState::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreState::default(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    fn flush(&self, state: &StoreState) -> Result<(), StoreError> {
        let tmp = self.path.with_extension("tmp");
        let bytes = serde_json::to_vec_pretty(state)?;
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn save_position(&self, position: &PairedPosition) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("store lock");
        state
            .positions
            .insert(position.position_id.clone(), position.clone());
        self.flush(&state)
    }

    pub fn save_positions(&self, positions: &[PairedPosition]) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("store lock");
        for p in positions {
            state.positions.insert(p.position_id.clone(), p.clone());
        }
        self.flush(&state)
    }

    pub fn get_open_positions(&self) -> Vec<PairedPosition> {
        self.state
            .lock()
            .expect("store lock")
            .positions
            .values()
            .filter(|p| p.status == PositionStatus::Open)
            .cloned()
            .collect()
    }

    pub fn all_positions(&self) -> Vec<PairedPosition> {
        self.state
            .lock()
            .expect("store lock")
            .positions
            .values()
            .cloned()
            .collect()
    }

    pub fn save_state(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("store lock");
        state.state.insert(key.to_string(), value);
        self.flush(&state)
    }

    pub fn get_state(&self, key: &str) -> Option<Value> {
        self.state
            .lock()
            .expect("store lock")
            .state
            .get(key)
            .cloned()
    }
}
