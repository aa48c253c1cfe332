//! Scheduler control signals

use serde::{Deserialize, Serialize};
use std::fmt;

/// Signals accepted on the scheduler's control channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlSignal {
    Run,
    Pause,
    Stop,
}

impl ControlSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlSignal::Run => "run",
            ControlSignal::Pause => "pause",
            ControlSignal::Stop => "stop",
        }
    }
}

impl fmt::Display for ControlSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ControlSignal {
    type Err = String;

    /// Exact match only; the channel vocabulary is fixed
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "run" => Ok(ControlSignal::Run),
            "pause" => Ok(ControlSignal::Pause),
            "stop" => Ok(ControlSignal::Stop),
            other => Err(format!("Unknown control signal: '{}'", other)),
        }
    }
}
