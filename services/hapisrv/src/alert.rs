//! Bound checks on the locally tracked asset

use std::fmt;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::AssetConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertState {
    Normal,
    Low,
    High,
}

impl fmt::Display for AlertState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertState::Normal => "normal",
            AlertState::Low => "low",
            AlertState::High => "high",
        };
        write!(f, "{}", s)
    }
}

/// Tracks whether readings sit inside the configured bounds
///
/// Only transitions are logged, so a value that stays out of range does not
/// flood the log.
pub struct AssetAlert {
    asset_id: Option<i64>,
    lower: Option<f64>,
    upper: Option<f64>,
    state: Mutex<AlertState>,
}

impl AssetAlert {
    pub fn new(config: &AssetConfig) -> Self {
        Self {
            asset_id: config.id,
            lower: config.lower_bound,
            upper: config.upper_bound,
            state: Mutex::new(AlertState::Normal),
        }
    }

    pub fn evaluate(&self, value: f64) -> AlertState {
        let next = match (self.lower, self.upper) {
            (Some(lower), _) if value < lower => AlertState::Low,
            (_, Some(upper)) if value > upper => AlertState::High,
            _ => AlertState::Normal,
        };

        let mut state = self.state.lock();
        if *state != next {
            match next {
                AlertState::Normal => info!(
                    asset_id = ?self.asset_id,
                    "Asset back in range at {}", value
                ),
                _ => warn!(
                    asset_id = ?self.asset_id,
                    "Asset reading {} is {} (bounds {:?}..{:?})",
                    value, next, self.lower, self.upper
                ),
            }
            *state = next;
        }
        next
    }

    pub fn state(&self) -> AlertState {
        *self.state.lock()
    }
}
