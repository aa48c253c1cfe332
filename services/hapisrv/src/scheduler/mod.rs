//! Job Scheduler - tick-driven execution of interval jobs
//!
//! Jobs are loaded from `interval_schedule` once at startup and armed with a
//! [`Trigger`]. Every tick the scheduler consumes at most one control signal,
//! then fires the jobs that are due, one after another. A slow device delays
//! the jobs behind it in the same tick.

pub mod executor;
pub mod local;
pub mod trigger;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use errors::{HapiError, HapiResult};
use hapi_model::{ControlSignal, IntervalJob, JobTarget, Sequence};
use hapi_store::Store;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use executor::{FireOutcome, JobExecutor};
pub use trigger::Trigger;

/// Pending control signals; the loop drains one per tick
const CONTROL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Running,
    Paused,
    /// `stop` received; the node is shutting down
    Stopped,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerState::Running => write!(f, "running"),
            SchedulerState::Paused => write!(f, "paused"),
            SchedulerState::Stopped => write!(f, "stopped"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Disabled,
    Armed,
    Executing,
}

/// Sender side of the control channel, shared with the console
#[derive(Clone)]
pub struct ControlHandle {
    tx: mpsc::Sender<ControlSignal>,
    state: Arc<RwLock<SchedulerState>>,
}

impl ControlHandle {
    pub fn send(&self, signal: ControlSignal) -> HapiResult<()> {
        self.tx
            .try_send(signal)
            .map_err(|e| HapiError::Internal(format!("Control channel: {}", e)))
    }

    /// Parse and send a textual signal; unknown words are logged and dropped
    pub fn send_raw(&self, text: &str) -> HapiResult<bool> {
        match text.parse::<ControlSignal>() {
            Ok(signal) => self.send(signal).map(|_| true),
            Err(e) => {
                warn!("Ignoring control input: {}", e);
                Ok(false)
            },
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.read()
    }
}

struct ScheduledJob {
    job: IntervalJob,
    trigger: Option<Trigger>,
    next_due: Option<NaiveDateTime>,
    state: JobState,
}

/// What one tick did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub fired: Vec<i64>,
    pub stopped: bool,
}

pub struct Scheduler {
    store: Store,
    executor: Arc<JobExecutor>,
    control_rx: mpsc::Receiver<ControlSignal>,
    state: Arc<RwLock<SchedulerState>>,
    jobs: Vec<ScheduledJob>,
    sequences: HashMap<String, Sequence>,
    tick: Duration,
    cancel: CancellationToken,
}

impl Scheduler {
    /// New scheduler plus the handle used to control it
    ///
    /// `cancel` is the node's shutdown token: it ends the loop, and a `stop`
    /// control signal cancels it.
    pub fn new(
        store: Store,
        executor: Arc<JobExecutor>,
        tick: Duration,
        cancel: CancellationToken,
    ) -> (Self, ControlHandle) {
        let (tx, control_rx) = mpsc::channel(CONTROL_CAPACITY);
        let state = Arc::new(RwLock::new(SchedulerState::Running));
        let handle = ControlHandle {
            tx,
            state: Arc::clone(&state),
        };
        let scheduler = Self {
            store,
            executor,
            control_rx,
            state,
            jobs: Vec::new(),
            sequences: HashMap::new(),
            tick,
            cancel,
        };
        (scheduler, handle)
    }

    /// Read jobs and their sequences; malformed entries are logged and skipped
    pub async fn load(&mut self) -> HapiResult<usize> {
        let rows = self.store.load_jobs().await?;
        self.jobs.clear();
        self.sequences.clear();

        for row in rows {
            let job = match row {
                Ok(job) => job,
                Err(e) => {
                    warn!("Skipping job: {}", HapiError::from(e));
                    continue;
                },
            };

            if let JobTarget::Sequence(name) = &job.target {
                if let Err(e) = self.resolve_sequence(name).await {
                    warn!("Skipping job {}: {}", job.job_id, e);
                    continue;
                }
            }

            let state = if job.enabled {
                JobState::Armed
            } else {
                JobState::Disabled
            };
            self.jobs.push(ScheduledJob {
                job,
                trigger: None,
                next_due: None,
                state,
            });
        }

        info!("Loaded {} jobs", self.jobs.len());
        Ok(self.jobs.len())
    }

    async fn resolve_sequence(&mut self, name: &str) -> HapiResult<()> {
        if self.sequences.contains_key(name) {
            return Ok(());
        }
        let sequence = self.store.load_sequence(name).await?;
        if sequence.is_empty() {
            return Err(HapiError::configuration(format!(
                "Sequence '{}' has no steps",
                name
            )));
        }
        self.sequences.insert(name.to_string(), sequence);
        Ok(())
    }

    /// Register triggers for enabled jobs, counting from `start`
    pub fn arm(&mut self, start: NaiveDateTime) -> usize {
        let mut armed = 0;
        for scheduled in &mut self.jobs {
            if !scheduled.job.enabled {
                continue;
            }
            match Trigger::for_job(&scheduled.job) {
                Ok(Some(trigger)) => {
                    scheduled.next_due = trigger.first_due(start);
                    scheduled.trigger = Some(trigger);
                    debug!(
                        "Armed job {} '{}', first due {:?}",
                        scheduled.job.job_id, scheduled.job.job_name, scheduled.next_due
                    );
                    armed += 1;
                },
                Ok(None) => debug!(
                    "Job {} ({} / {}) is not scheduled",
                    scheduled.job.job_id, scheduled.job.time_unit, scheduled.job.interval
                ),
                Err(e) => warn!("Skipping job {}: {}", scheduled.job.job_id, e),
            }
        }
        info!("Armed {} of {} jobs", armed, self.jobs.len());
        armed
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.read()
    }

    pub fn job_state(&self, job_id: i64) -> Option<JobState> {
        self.jobs
            .iter()
            .find(|j| j.job.job_id == job_id)
            .map(|j| j.state)
    }

    pub fn sequence(&self, name: &str) -> Option<&Sequence> {
        self.sequences.get(name)
    }

    fn apply_control(&mut self) -> bool {
        let signal = match self.control_rx.try_recv() {
            Ok(signal) => signal,
            Err(_) => return false,
        };
        info!("Scheduler control: {}", signal);
        match signal {
            ControlSignal::Run => *self.state.write() = SchedulerState::Running,
            ControlSignal::Pause => *self.state.write() = SchedulerState::Paused,
            ControlSignal::Stop => {
                *self.state.write() = SchedulerState::Stopped;
                // Stop ends the whole node, not only this loop
                self.cancel.cancel();
                return true;
            },
        }
        false
    }

    /// One scheduler tick at wall-clock `now`
    ///
    /// Due jobs whose firing is skipped (paused) still move to their next
    /// due time, so nothing is caught up after a resume.
    pub async fn tick_at(&mut self, now: NaiveDateTime) -> TickReport {
        let mut report = TickReport::default();
        if self.apply_control() {
            report.stopped = true;
            return report;
        }
        let state = self.state();

        for i in 0..self.jobs.len() {
            let (Some(trigger), Some(due)) = (self.jobs[i].trigger, self.jobs[i].next_due) else {
                continue;
            };
            if due > now {
                continue;
            }

            if state == SchedulerState::Running {
                self.jobs[i].state = JobState::Executing;
                let job = self.jobs[i].job.clone();
                let sequence = job.target.sequence().and_then(|n| self.sequences.get(n));
                let outcome = self.executor.fire(&job, sequence, state).await;
                debug!("Job {} fired: {:?}", job.job_id, outcome);
                self.jobs[i].state = JobState::Armed;
                report.fired.push(job.job_id);
            }
            self.jobs[i].next_due = trigger.next_after(due, now);
        }
        report
    }

    /// Arm from now and tick until `stop` or cancellation
    pub async fn run(mut self) {
        self.arm(Local::now().naive_local());

        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Scheduler started with {}ms tick", self.tick.as_millis());

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.tick_at(Local::now().naive_local()).await;
                    if report.stopped {
                        info!("Stop received; shutting down the node");
                        break;
                    }
                }
                _ = self.cancel.cancelled() => {
                    info!("Scheduler received shutdown signal");
                    break;
                }
            }
        }

        info!("Scheduler stopped");
    }
}
