//! Operator-facing surface: load, reconcile, select, run, monitor.
//!
//! A [`Session`] owns the loaded report and the current job rows. It is
//! meant to live on a worker thread; the foreground only sees the
//! [`EventSink`] stream and the values returned here.

use crate::batch::{BatchMode, BatchRunner};
use crate::config::Config;
use crate::db::{lookup_statuses, JobKey, StatusStore};
use crate::error::{Error, Result};
use crate::events::{EventSink, LogCategory};
use crate::loader::{ReportLoader, ReportSource};
use crate::model::{Job, Report, Weight};
use crate::outcome::{BatchResult, JobOutcome};
use crate::scanner::{PortalScanner, PortalSnapshot};
use crate::status::{combine, DbStatus, JobStatus, PortalStatus};
use crate::surface::{AutomationSurface, QueueSource};
use crate::util::sleep_unless_cancelled;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Run-in-progress flag shared by everything that drives the surface.
#[derive(Debug, Clone, Default)]
pub struct RunGuard {
    active: Arc<AtomicBool>,
}

impl RunGuard {
    pub fn try_acquire(&self) -> Result<RunTicket> {
        self.active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| Error::Busy)?;
        Ok(RunTicket {
            active: self.active.clone(),
        })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct RunTicket {
    active: Arc<AtomicBool>,
}

impl Drop for RunTicket {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobRow {
    pub selected: bool,
    pub job_no: String,
    pub request_no: String,
    pub lots: u32,
    pub button_weight: Weight,
    pub scrap_weight: Weight,
    pub db_status: String,
    pub portal_status: PortalStatus,
    pub status: JobStatus,
}

pub struct SessionParts {
    pub reports: Box<dyn ReportSource>,
    pub store: Box<dyn StatusStore>,
    pub surface: Option<Arc<dyn AutomationSurface>>,
    pub queue: Option<Arc<dyn QueueSource>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MonitorSummary {
    pub cycles: u64,
    pub newly_ready: Vec<String>,
    pub batches: Vec<BatchResult>,
}

pub struct Session {
    cfg: Config,
    parts: SessionParts,
    scanner: PortalScanner,
    events: EventSink,
    guard: RunGuard,
    report: Option<Report>,
    rows: Vec<JobRow>,
}

impl Session {
    pub fn new(cfg: Config, parts: SessionParts, events: EventSink) -> Result<Self> {
        let scanner = PortalScanner::new(&cfg, events.clone())?;
        Ok(Self {
            cfg,
            parts,
            scanner,
            events,
            guard: RunGuard::default(),
            report: None,
            rows: Vec::new(),
        })
    }

    pub fn run_guard(&self) -> RunGuard {
        self.guard.clone()
    }

    pub fn report(&self) -> Option<&Report> {
        self.report.as_ref()
    }

    pub fn load_report(&mut self, report_id: &str) -> Result<&[JobRow]> {
        let loader = ReportLoader::new(self.parts.reports.as_ref(), self.events.clone());
        let report = loader.load(report_id)?;
        self.report = Some(report);
        self.rows.clear();
        self.refresh_jobs()
    }

    pub fn refresh_jobs(&mut self) -> Result<&[JobRow]> {
        let report = self
            .report
            .as_ref()
            .ok_or_else(|| Error::Precondition("no report loaded".into()))?;

        let keys: Vec<JobKey> = report
            .jobs
            .iter()
            .map(|j| JobKey::new(j.portal_job_no(), j.request_no.as_str()))
            .collect();
        let db = lookup_statuses(
            self.parts.store.as_ref(),
            &keys,
            &self.cfg.database,
            &self.events,
        );
        let snapshot = match &self.parts.queue {
            Some(queue) => self.scanner.scan(queue.as_ref()),
            None => {
                self.events.warn(
                    LogCategory::Status,
                    "No portal session; every job reads as not in portal",
                );
                PortalSnapshot::default()
            }
        };

        self.rows = report
            .jobs
            .iter()
            .zip(db)
            .map(|(job, db_status)| build_row(job, &db_status, &snapshot))
            .collect();

        let ready = self.rows.iter().filter(|r| r.selected).count();
        self.events.emit(
            LogCategory::Status,
            format!("{} jobs, {ready} ready to process", self.rows.len()),
        );
        Ok(&self.rows)
    }

    pub fn get_jobs(&self) -> &[JobRow] {
        &self.rows
    }

    pub fn set_selection(&mut self, job_no: &str, selected: bool) -> Result<()> {
        let row = self
            .rows
            .iter_mut()
            .find(|r| r.job_no == job_no)
            .ok_or_else(|| Error::Precondition(format!("unknown job {job_no}")))?;
        row.selected = selected;
        Ok(())
    }

    pub fn select_only(&mut self, job_nos: &[String]) -> Result<()> {
        for job_no in job_nos {
            if !self.rows.iter().any(|r| &r.job_no == job_no) {
                return Err(Error::Precondition(format!("unknown job {job_no}")));
            }
        }
        for row in &mut self.rows {
            row.selected = job_nos.contains(&row.job_no);
        }
        Ok(())
    }

    pub fn selected_jobs(&self) -> Vec<Job> {
        let Some(report) = &self.report else {
            return Vec::new();
        };
        self.rows
            .iter()
            .filter(|r| r.selected)
            .filter_map(|r| report.job(&r.job_no).cloned())
            .collect()
    }

    pub fn run_batch(
        &self,
        mode: BatchMode,
        stop: Option<&AtomicBool>,
        on_status: &mut dyn FnMut(&JobOutcome, &str),
    ) -> Result<BatchResult> {
        let _ticket = self.guard.try_acquire()?;
        self.run_selected(mode, stop, on_status)
    }

    fn run_selected(
        &self,
        mode: BatchMode,
        stop: Option<&AtomicBool>,
        on_status: &mut dyn FnMut(&JobOutcome, &str),
    ) -> Result<BatchResult> {
        if self.report.is_none() {
            return Err(Error::Precondition("no report loaded".into()));
        }
        let surface = self
            .parts
            .surface
            .as_ref()
            .ok_or_else(|| Error::Precondition("no automation surface available".into()))?;
        let jobs = self.selected_jobs();
        if jobs.is_empty() {
            return Err(Error::Precondition("no jobs selected".into()));
        }
        let url = surface.read_current_url()?;
        if !self.cfg.portal.login_marker.is_empty() && url.contains(&self.cfg.portal.login_marker) {
            return Err(Error::Precondition(
                "portal session is not logged in (still on login page)".into(),
            ));
        }

        let runner = BatchRunner::new(surface.as_ref(), &self.cfg, &self.events);
        Ok(runner.run(
            &jobs,
            mode,
            self.cfg.global.job_delay_seconds,
            on_status,
            stop,
        ))
    }

    pub fn monitor(&mut self, cancel: &AtomicBool, max_cycles: Option<u64>) -> Result<MonitorSummary> {
        let _ticket = self.guard.try_acquire()?;
        let mode: BatchMode = self.cfg.monitor.mode.parse()?;
        let interval = Duration::from_secs(self.cfg.monitor.interval_seconds);
        let tick = Duration::from_millis(self.cfg.monitor.tick_ms);

        let mut summary = MonitorSummary::default();
        let mut previously_ready: HashSet<String> = HashSet::new();
        self.events.emit(
            LogCategory::Monitor,
            format!("Monitoring every {}s", interval.as_secs()),
        );

        while !cancel.load(Ordering::SeqCst) {
            summary.cycles += 1;
            let ready: Vec<String> = self
                .refresh_jobs()?
                .iter()
                .filter(|r| r.status == JobStatus::ReadyToProcess)
                .map(|r| r.job_no.clone())
                .collect();
            let fresh: Vec<String> = ready
                .iter()
                .filter(|j| !previously_ready.contains(*j))
                .cloned()
                .collect();
            previously_ready = ready.into_iter().collect();

            if fresh.is_empty() {
                info!(cycle = summary.cycles, "no newly ready jobs");
            } else {
                self.events.emit(
                    LogCategory::Monitor,
                    format!("Newly ready: {}", fresh.join(", ")),
                );
                summary.newly_ready.extend(fresh.iter().cloned());
                if self.cfg.monitor.auto_process {
                    self.select_only(&fresh)?;
                    match self.run_selected(mode, Some(cancel), &mut |_, _| {}) {
                        Ok(result) => summary.batches.push(result),
                        Err(err) => self
                            .events
                            .warn(LogCategory::Monitor, format!("Auto-process skipped: {err}")),
                    }
                }
            }

            if max_cycles.is_some_and(|max| summary.cycles >= max) {
                break;
            }
            if !sleep_unless_cancelled(interval, tick, cancel) {
                break;
            }
        }

        self.events.emit(
            LogCategory::Monitor,
            format!("Monitor stopped after {} cycles", summary.cycles),
        );
        Ok(summary)
    }
}

fn build_row(job: &Job, db_status: &DbStatus, snapshot: &PortalSnapshot) -> JobRow {
    let portal_status = snapshot.status_for(job.portal_job_no());
    let status = combine(db_status, portal_status);
    JobRow {
        selected: status.is_auto_selected(),
        job_no: job.job_no.clone(),
        request_no: job.request_no.clone(),
        lots: job.total_lots,
        button_weight: job.total_button_weight.clone(),
        scrap_weight: job.total_scrap_weight.clone(),
        db_status: db_status.to_string(),
        portal_status,
        status,
    }
}
