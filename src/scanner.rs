//! Live portal queue classification.

use crate::config;
use crate::error::{Error, Result};
use crate::events::{EventSink, LogCategory};
use crate::status::PortalStatus;
use crate::surface::QueueSource;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalJobRecord {
    pub job_no: String,
    #[serde(default)]
    pub request_no: String,
    #[serde(default)]
    pub raw_status_text: String,
    #[serde(default)]
    pub raw_timing_text: String,
}

#[derive(Debug, Clone)]
pub struct QueueRules {
    completed: Regex,
    needs_initial: Regex,
    action: Regex,
}

impl QueueRules {
    pub fn new(cfg: &config::Scanner) -> Result<Self> {
        let compile = |name: &str, pat: &str| {
            Regex::new(pat).map_err(|e| Error::Config(format!("scanner.{name}: {e}")))
        };
        Ok(Self {
            completed: compile("completed_pattern", &cfg.completed_pattern)?,
            needs_initial: compile("needs_initial_pattern", &cfg.needs_initial_pattern)?,
            action: compile("action_pattern", &cfg.action_pattern)?,
        })
    }

    /// Completion in the timing column takes the job out of the queue;
    /// a pending-initial flag beats an action link.
    pub fn classify(&self, record: &PortalJobRecord) -> PortalStatus {
        if self.completed.is_match(&record.raw_timing_text) {
            PortalStatus::NotInPortal
        } else if self.needs_initial.is_match(&record.raw_timing_text) {
            PortalStatus::NeedsInitialValues
        } else if self.action.is_match(&record.raw_status_text) {
            PortalStatus::Available
        } else {
            PortalStatus::InPortalNotReady
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PortalSnapshot {
    statuses: HashMap<String, PortalStatus>,
}

impl PortalSnapshot {
    pub fn from_records(rules: &QueueRules, records: &[PortalJobRecord]) -> Self {
        let mut statuses = HashMap::new();
        for record in records {
            let status = rules.classify(record);
            // The queue can list a job more than once; the most actionable row wins.
            statuses
                .entry(record.job_no.trim().to_string())
                .and_modify(|prev: &mut PortalStatus| {
                    if rank(status) < rank(*prev) {
                        *prev = status;
                    }
                })
                .or_insert(status);
        }
        Self { statuses }
    }

    pub fn status_for(&self, job_no: &str) -> PortalStatus {
        self.statuses
            .get(job_no.trim())
            .copied()
            .unwrap_or(PortalStatus::NotInPortal)
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    pub fn ready_jobs(&self) -> impl Iterator<Item = &str> {
        self.statuses
            .iter()
            .filter(|(_, s)| **s == PortalStatus::Available)
            .map(|(j, _)| j.as_str())
    }
}

fn rank(status: PortalStatus) -> u8 {
    match status {
        PortalStatus::Available => 0,
        PortalStatus::NeedsInitialValues => 1,
        PortalStatus::InPortalNotReady => 2,
        PortalStatus::NotInPortal => 3,
    }
}

pub struct PortalScanner {
    rules: QueueRules,
    queue_url: String,
    events: EventSink,
}

impl PortalScanner {
    pub fn new(cfg: &config::Config, events: EventSink) -> Result<Self> {
        Ok(Self {
            rules: QueueRules::new(&cfg.scanner)?,
            queue_url: cfg.portal.queue_url(),
            events,
        })
    }

    pub fn rules(&self) -> &QueueRules {
        &self.rules
    }

    /// A failed scan degrades to an empty snapshot, so every job reads
    /// as not in the portal rather than blocking the job list.
    pub fn scan(&self, source: &dyn QueueSource) -> PortalSnapshot {
        match source.scan_queue(&self.queue_url) {
            Ok(records) => {
                let snapshot = PortalSnapshot::from_records(&self.rules, &records);
                self.events.emit(
                    LogCategory::Status,
                    format!(
                        "Portal scan: {} rows, {} ready",
                        records.len(),
                        snapshot.ready_jobs().count()
                    ),
                );
                snapshot
            }
            Err(err) => {
                self.events
                    .warn(LogCategory::Status, format!("Portal scan failed: {err}"));
                PortalSnapshot::default()
            }
        }
    }
}
