//! Job firing
//!
//! Shared by the scheduler tick loop and the console's ad-hoc `run` command.
//! Device and persistence failures are logged here and never propagate to
//! the caller's loop.

use std::sync::Arc;

use chrono::Utc;
use errors::HapiErrorTrait;
use hapi_model::{IntervalJob, JobKind, JobTarget, Rtu, Sequence};
use hapi_store::Store;
use tracing::{debug, info, warn};

use crate::device::Registry;
use crate::scheduler::local::{self, LocalInputs};
use crate::scheduler::SchedulerState;
use crate::status::StatusReporter;
use crate::telemetry::TelemetrySink;

/// Result of one firing
#[derive(Debug, Clone, PartialEq)]
pub enum FireOutcome {
    /// Scheduler paused or job disabled
    Skipped,
    /// Target RTU not in the online set
    RtuOffline,
    /// At least one command or computation ran
    Completed {
        /// Last successful device response, if any
        response: Option<String>,
        failed_steps: usize,
    },
    /// Nothing succeeded
    Failed,
}

pub struct JobExecutor {
    registry: Arc<Registry>,
    telemetry: TelemetrySink,
    store: Store,
    status: Arc<StatusReporter>,
}

impl JobExecutor {
    pub fn new(
        registry: Arc<Registry>,
        telemetry: TelemetrySink,
        store: Store,
        status: Arc<StatusReporter>,
    ) -> Self {
        Self {
            registry,
            telemetry,
            store,
            status,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Execute one job
    ///
    /// `sequence` must be the resolved sequence for sequence-targeted jobs.
    pub async fn fire(
        &self,
        job: &IntervalJob,
        sequence: Option<&Sequence>,
        state: SchedulerState,
    ) -> FireOutcome {
        if state != SchedulerState::Running || !job.enabled {
            debug!("Job {} skipped ({}, enabled={})", job.job_id, state, job.enabled);
            return FireOutcome::Skipped;
        }

        if job.is_virtual() {
            return self.fire_virtual(job, sequence).await;
        }

        let Some(rtu) = self.registry.find(&job.rtuid) else {
            info!("Job '{}' skipped: {} is not online", job.job_name, job.rtuid);
            return FireOutcome::RtuOffline;
        };

        let (response, failed_steps, attempted) = match (&job.target, sequence) {
            (JobTarget::Sequence(name), Some(seq)) => {
                let (response, failed) = self.run_sequence(&rtu, seq).await;
                debug!("Sequence '{}' finished with {} failed steps", name, failed);
                (response, failed, seq.steps().len())
            },
            (JobTarget::Sequence(name), None) => {
                warn!("Job {} references unresolved sequence '{}'", job.job_id, name);
                return FireOutcome::Failed;
            },
            (JobTarget::Command(command), _) => {
                match self.send(&rtu, command, job.timeout()).await {
                    Some(response) => (Some(response), 0, 1),
                    None => (None, 1, 1),
                }
            },
        };

        if failed_steps == attempted {
            return FireOutcome::Failed;
        }

        if let Some(ref response) = response {
            self.route(job, response).await;
        }
        FireOutcome::Completed {
            response,
            failed_steps,
        }
    }

    /// Run every step in order; a failed step does not stop the rest
    async fn run_sequence(&self, rtu: &Rtu, sequence: &Sequence) -> (Option<String>, usize) {
        let mut last = None;
        let mut failed = 0;
        for step in sequence.steps() {
            debug!("Sequence '{}' step {} ({})", sequence.name, step.step, step.step_name);
            match self.send(rtu, &step.command, step.timeout()).await {
                Some(response) => last = Some(response),
                None => failed += 1,
            }
        }
        (last, failed)
    }

    async fn send(&self, rtu: &Rtu, command: &str, timeout: std::time::Duration) -> Option<String> {
        match self
            .registry
            .link()
            .send(&rtu.address, self.registry.device_port(), timeout, command)
            .await
        {
            Ok(response) => Some(response),
            Err(e) => {
                warn!(
                    code = e.error_code(),
                    "Command '{}' to {} failed: {}", command, rtu.rtuid, e
                );
                None
            },
        }
    }

    async fn route(&self, job: &IntervalJob, response: &str) {
        let now = Utc::now();
        let result = match job.kind {
            JobKind::LogTelemetry => self
                .telemetry
                .log_device_response(response, now)
                .await
                .map(|_| ()),
            JobKind::LogStatus => Ok(()),
            JobKind::Command => self
                .store
                .insert_command_log(&job.rtuid, &job.job_name, now)
                .await
                .map_err(Into::into),
        };
        if let Err(e) = result {
            warn!("Failed to record result of job '{}': {}", job.job_name, e);
        }
    }

    async fn fire_virtual(&self, job: &IntervalJob, sequence: Option<&Sequence>) -> FireOutcome {
        let names: Vec<&str> = match (&job.target, sequence) {
            (JobTarget::Command(name), _) => vec![name.as_str()],
            (JobTarget::Sequence(_), Some(seq)) => {
                seq.steps().iter().map(|s| s.command.as_str()).collect()
            },
            (JobTarget::Sequence(name), None) => {
                warn!("Job {} references unresolved sequence '{}'", job.job_id, name);
                return FireOutcome::Failed;
            },
        };

        let inputs = LocalInputs {
            snapshot: self.status.snapshot(self.registry.online_count()),
        };
        let mut failed = 0;
        for name in &names {
            let values = match local::run(name, &inputs) {
                Ok(values) => values,
                Err(e) => {
                    warn!("Virtual job '{}': {}", job.job_name, e);
                    failed += 1;
                    continue;
                },
            };
            if let Err(e) = self.telemetry.log_virtual(&values, Utc::now()).await {
                warn!("Failed to log virtual job '{}': {}", job.job_name, e);
            }
        }

        if failed == names.len() {
            FireOutcome::Failed
        } else {
            FireOutcome::Completed {
                response: None,
                failed_steps: failed,
            }
        }
    }
}
