//! Interval jobs and command sequences

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Target id of jobs that run a local computation instead of a device command
pub const VIRTUAL_TARGET: &str = "virtual";

// ============================================================================
// Time units
// ============================================================================

/// Recurrence unit of an interval job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Month,
    Week,
    Day,
    Hour,
    Minute,
}

impl TimeUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeUnit::Month => "month",
            TimeUnit::Week => "week",
            TimeUnit::Day => "day",
            TimeUnit::Hour => "hour",
            TimeUnit::Minute => "minute",
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TimeUnit {
    type Err = String;

    /// Case-insensitive; plural forms are accepted
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "month" | "months" => Ok(TimeUnit::Month),
            "week" | "weeks" => Ok(TimeUnit::Week),
            "day" | "days" => Ok(TimeUnit::Day),
            "hour" | "hours" => Ok(TimeUnit::Hour),
            "minute" | "minutes" => Ok(TimeUnit::Minute),
            _ => Err(format!(
                "Invalid time unit: '{}'. Valid values: month, week, day, hour, minute",
                s
            )),
        }
    }
}

// ============================================================================
// Job kinds
// ============================================================================

/// What happens with a job's response after execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Parse the response and store it as sensor data
    LogTelemetry,
    /// Poll only; the response is discarded
    LogStatus,
    /// Record the execution in the command audit log
    Command,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::LogTelemetry => "log_telemetry",
            JobKind::LogStatus => "log_status",
            JobKind::Command => "command",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "log_telemetry" | "telemetry" => Ok(JobKind::LogTelemetry),
            "log_status" | "status" => Ok(JobKind::LogStatus),
            "command" => Ok(JobKind::Command),
            _ => Err(format!(
                "Invalid job kind: '{}'. Valid values: log_telemetry, log_status, command",
                s
            )),
        }
    }
}

// ============================================================================
// Interval jobs
// ============================================================================

/// What a job executes: a single command or a named sequence, never both
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum JobTarget {
    Command(String),
    Sequence(String),
}

impl JobTarget {
    /// Build from the nullable `command` and `sequence` columns
    ///
    /// Blank strings count as unset. Exactly one of the two must be set.
    pub fn from_columns(command: Option<&str>, sequence: Option<&str>) -> Result<Self, String> {
        let command = command.map(str::trim).filter(|s| !s.is_empty());
        let sequence = sequence.map(str::trim).filter(|s| !s.is_empty());
        match (command, sequence) {
            (Some(c), None) => Ok(JobTarget::Command(c.to_string())),
            (None, Some(s)) => Ok(JobTarget::Sequence(s.to_string())),
            (Some(_), Some(_)) => Err("job sets both a command and a sequence".to_string()),
            (None, None) => Err("job sets neither a command nor a sequence".to_string()),
        }
    }

    pub fn command(&self) -> Option<&str> {
        match self {
            JobTarget::Command(c) => Some(c),
            JobTarget::Sequence(_) => None,
        }
    }

    pub fn sequence(&self) -> Option<&str> {
        match self {
            JobTarget::Sequence(s) => Some(s),
            JobTarget::Command(_) => None,
        }
    }
}

/// A recurring job definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalJob {
    pub job_id: i64,
    pub job_name: String,
    /// Target RTU id, or [`VIRTUAL_TARGET`]
    pub rtuid: String,
    pub target: JobTarget,
    pub kind: JobKind,
    pub time_unit: TimeUnit,
    /// Every N units when >= 0; -1 selects the fixed wall-clock form
    pub interval: i64,
    /// `HH:MM[:SS]` for daily jobs, `:SS` for minute jobs
    pub at_time: Option<String>,
    pub enabled: bool,
    pub timeout_secs: u64,
}

impl IntervalJob {
    pub fn is_virtual(&self) -> bool {
        self.rtuid.eq_ignore_ascii_case(VIRTUAL_TARGET)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ============================================================================
// Sequences
// ============================================================================

/// One command of a sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceStep {
    /// Owning sequence name
    pub name: String,
    pub step: i64,
    pub step_name: String,
    pub command: String,
    pub timeout_secs: u64,
}

impl SequenceStep {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// A named, ordered command list executed as one job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    pub name: String,
    steps: Vec<SequenceStep>,
}

impl Sequence {
    /// Steps are kept in ascending `step` order regardless of input order
    pub fn new(name: impl Into<String>, mut steps: Vec<SequenceStep>) -> Self {
        steps.sort_by_key(|s| s.step);
        Self {
            name: name.into(),
            steps,
        }
    }

    pub fn steps(&self) -> &[SequenceStep] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_unit_parse() {
        assert_eq!("Minute".parse::<TimeUnit>(), Ok(TimeUnit::Minute));
        assert_eq!("days".parse::<TimeUnit>(), Ok(TimeUnit::Day));
        assert!("fortnight".parse::<TimeUnit>().is_err());
    }

    #[test]
    fn test_job_kind_round_trips_through_text() {
        for kind in [JobKind::LogTelemetry, JobKind::LogStatus, JobKind::Command] {
            assert_eq!(kind.as_str().parse::<JobKind>(), Ok(kind));
        }
    }

    #[test]
    fn test_job_target_requires_exactly_one() {
        assert_eq!(
            JobTarget::from_columns(Some("env"), Some("")),
            Ok(JobTarget::Command("env".into()))
        );
        assert_eq!(
            JobTarget::from_columns(None, Some("irrigate")),
            Ok(JobTarget::Sequence("irrigate".into()))
        );
        assert!(JobTarget::from_columns(Some("env"), Some("irrigate")).is_err());
        assert!(JobTarget::from_columns(Some("  "), None).is_err());
    }

    #[test]
    fn test_sequence_sorts_steps() {
        let step = |n: i64| SequenceStep {
            name: "irrigate".into(),
            step: n,
            step_name: format!("s{}", n),
            command: format!("c{}", n),
            timeout_secs: 1,
        };
        let seq = Sequence::new("irrigate", vec![step(3), step(1), step(2)]);
        let order: Vec<i64> = seq.steps().iter().map(|s| s.step).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }
}
