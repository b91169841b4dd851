use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::{EventSink, LogCategory};
use crate::model::Job;
use crate::orchestrator::{JobOrchestrator, WeightCategory};
use crate::outcome::{BatchResult, JobOutcome};
use crate::surface::AutomationSurface;
use crate::util::{now_rfc3339, sleep_unless_cancelled};
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const DELAY_TICK: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchMode {
    Initial,
    Cornet,
    All,
}

impl BatchMode {
    pub fn categories(&self) -> &'static [WeightCategory] {
        match self {
            BatchMode::Initial => &[WeightCategory::Initial],
            BatchMode::Cornet => &[WeightCategory::Cornet],
            BatchMode::All => &[WeightCategory::Initial, WeightCategory::Cornet],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BatchMode::Initial => "initial",
            BatchMode::Cornet => "cornet",
            BatchMode::All => "all",
        }
    }

    pub fn status_label(&self, success: bool) -> &'static str {
        match (self, success) {
            (_, false) => "Failed",
            (BatchMode::Initial, true) => "Initial Saved",
            (BatchMode::Cornet, true) => "Cornet Saved",
            (BatchMode::All, true) => "Completed",
        }
    }
}

impl FromStr for BatchMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "initial" => Ok(BatchMode::Initial),
            "cornet" => Ok(BatchMode::Cornet),
            "all" | "process_all" => Ok(BatchMode::All),
            other => Err(Error::Config(format!("unknown batch mode: {other}"))),
        }
    }
}

/// Runs jobs strictly one after another through a [`JobOrchestrator`].
pub struct BatchRunner<'a> {
    surface: &'a dyn AutomationSurface,
    cfg: &'a Config,
    events: &'a EventSink,
}

impl<'a> BatchRunner<'a> {
    pub fn new(surface: &'a dyn AutomationSurface, cfg: &'a Config, events: &'a EventSink) -> Self {
        Self {
            surface,
            cfg,
            events,
        }
    }

    /// Never fails: every job-level error or panic becomes a failed
    /// [`JobOutcome`]. `on_status` sees each job's outcome as it finishes.
    pub fn run(
        &self,
        jobs: &[Job],
        mode: BatchMode,
        delay_seconds: u64,
        on_status: &mut dyn FnMut(&JobOutcome, &str),
        stop: Option<&AtomicBool>,
    ) -> BatchResult {
        let orchestrator =
            JobOrchestrator::new(self.surface, &self.cfg.portal, &self.cfg.global, self.events);
        let never = AtomicBool::new(false);
        let stop_flag = stop.unwrap_or(&never);
        let total = jobs.len();

        let mut result = BatchResult {
            mode: mode.as_str().to_string(),
            started: now_rfc3339(),
            ..Default::default()
        };
        self.events.emit(
            LogCategory::Batch,
            format!("Starting {} batch over {total} jobs", mode.as_str()),
        );

        for (i, job) in jobs.iter().enumerate() {
            if stop_flag.load(Ordering::SeqCst) {
                result.skipped_count = total - i;
                self.events.warn(
                    LogCategory::Batch,
                    format!("Stop requested; {} jobs not started", result.skipped_count),
                );
                break;
            }

            self.events.emit(
                LogCategory::Batch,
                format!("Job {} ({}/{total})", job.job_no, i + 1),
            );
            let processed = catch_unwind(AssertUnwindSafe(|| {
                orchestrator.process(job, mode, Some(stop_flag))
            }));
            let outcome = match processed {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(err)) => JobOutcome::aborted(&job.job_no, job.portal_job_no(), err),
                Err(_) => JobOutcome::aborted(
                    &job.job_no,
                    job.portal_job_no(),
                    "job processing panicked",
                ),
            };

            let success = outcome.succeeded();
            let label = mode.status_label(success);
            if success {
                result.success_count += 1;
                self.events
                    .emit(LogCategory::Batch, format!("Job {}: {label}", job.job_no));
            } else {
                result.failure_count += 1;
                let why = outcome
                    .error
                    .clone()
                    .or_else(|| {
                        outcome
                            .failed_lots()
                            .map(|l| format!("lot {}", l.lot_no))
                            .reduce(|a, b| format!("{a}, {b}"))
                    })
                    .unwrap_or_else(|| "incomplete".to_string());
                self.events
                    .warn(LogCategory::Batch, format!("Job {}: {label} ({why})", job.job_no));
            }
            on_status(&outcome, label);
            result.jobs.push(outcome);

            if i + 1 < total && delay_seconds > 0 {
                sleep_unless_cancelled(Duration::from_secs(delay_seconds), DELAY_TICK, stop_flag);
            }
        }

        result.finished = now_rfc3339();
        self.events.emit(
            LogCategory::Batch,
            format!(
                "Batch finished: {} succeeded, {} failed",
                result.success_count, result.failure_count
            ),
        );
        result
    }
}
