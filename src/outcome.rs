use crate::error::Error;
use crate::orchestrator::WeightCategory;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LotOutcome {
    pub lot_no: String,
    pub category: WeightCategory,
    pub saved: bool,
    #[serde(default)]
    pub option: Option<String>,
    pub fields_written: usize,
    #[serde(default)]
    pub error_kind: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl LotOutcome {
    pub fn failed(lot_no: &str, category: WeightCategory, err: &Error) -> Self {
        Self {
            lot_no: lot_no.to_string(),
            category,
            saved: false,
            option: None,
            fields_written: 0,
            error_kind: Some(err.kind().to_string()),
            error: Some(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    NotStarted,
    Completed,
    Failed,
    /// A stop request arrived between lots.
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IdentifierOutcome {
    NotAttempted,
    Submitted { alerts: Vec<String> },
    /// Soft failure: the job's weights stay saved.
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutcome {
    pub job_no: String,
    pub portal_job_no: String,
    pub state: JobState,
    pub lots: Vec<LotOutcome>,
    pub identifier: IdentifierOutcome,
    #[serde(default)]
    pub error: Option<String>,
}

impl JobOutcome {
    pub fn new(job_no: &str, portal_job_no: &str) -> Self {
        Self {
            job_no: job_no.to_string(),
            portal_job_no: portal_job_no.to_string(),
            state: JobState::NotStarted,
            lots: Vec::new(),
            identifier: IdentifierOutcome::NotAttempted,
            error: None,
        }
    }

    pub fn aborted(job_no: &str, portal_job_no: &str, err: impl ToString) -> Self {
        Self {
            state: JobState::Failed,
            error: Some(err.to_string()),
            ..Self::new(job_no, portal_job_no)
        }
    }

    pub fn succeeded(&self) -> bool {
        self.state == JobState::Completed
    }

    pub fn failed_lots(&self) -> impl Iterator<Item = &LotOutcome> {
        self.lots.iter().filter(|l| !l.saved)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchResult {
    pub mode: String,
    pub success_count: usize,
    pub failure_count: usize,
    /// Jobs never started because a stop was requested.
    pub skipped_count: usize,
    pub started: String,
    pub finished: String,
    pub jobs: Vec<JobOutcome>,
}
