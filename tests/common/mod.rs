#![allow(dead_code)]

use assay_batch::config::Config;
use assay_batch::db::{JobKey, StatusStore};
use assay_batch::error::{Error, Result};
use assay_batch::loader::{RawReport, ReportSource};
use assay_batch::scanner::PortalJobRecord;
use assay_batch::surface::{AutomationSurface, QueueSource};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Config with every pause set to zero.
pub fn fast_config() -> Config {
    let mut cfg = Config::default();
    cfg.portal.settle_ms = 0;
    cfg.portal.alert_settle_ms = 0;
    cfg.global.job_delay_seconds = 0;
    cfg.global.auto_submit_identifier = true;
    cfg.database.retry_backoff_ms = 0;
    cfg.monitor.interval_seconds = 0;
    cfg.monitor.tick_ms = 1;
    cfg
}

fn strip(no: &str, lot: &str, initial: &str, cornet: &str, button: &str, scrap: &str) -> Value {
    json!({
        "strip_no": no,
        "lot_no": lot,
        "initial": initial,
        "ag": "0.1021",
        "cu": "0.0200",
        "pb": "0",
        "cornet": cornet,
        "lot_button_weight": button,
        "lot_scrap_weight": scrap,
    })
}

/// Job A with lots 1 and 2, job B with lot 1, and one CHECK_GOLD pair.
pub fn report_json() -> Value {
    json!({
        "success": true,
        "job_summary": [
            {"job_no": "A", "request_no": "R1", "total_lots": "2",
             "total_button_weight": "10.5", "total_scrap_weight": "1.2"},
            {"job_no": "B", "request_no": "R2", "total_lots": 1,
             "total_button_weight": 5.25, "total_scrap_weight": 0.5}
        ],
        "strips_data": {
            "A": {
                "1": [
                    strip("1", "1", "0.5012", "0.2510", "6.0", "0.7"),
                    strip("2", "1", "0.5008", "0.2505", "0", "0")
                ],
                "2": [
                    strip("1", "2", "0.4990", "0.2490", "4.5", "0.5"),
                    strip("2", "2", "0.5001", "0.2500", "4.5", "0.5")
                ]
            },
            "B": {
                "1": [
                    strip("1", "1", "0.5100", "0.2600", "5.25", "0.5"),
                    strip("2", "1", "0.5090", "0", "5.25", "0.5")
                ]
            },
            "CHECK_GOLD": [[
                {"strip_no": "1", "initial": "0.5000", "ag": "0.05", "cu": "0", "pb": "0", "cornet": "0.4990"},
                {"strip_no": "2", "initial": "0.5002", "ag": "0.05", "cu": "0", "pb": "0", "cornet": "0"}
            ]]
        },
        "check_gold_data": []
    })
}

pub fn raw_report(value: Value) -> RawReport {
    serde_json::from_value(value).expect("fixture parses")
}

pub struct FakeReports {
    pub payload: Value,
    pub fetches: AtomicUsize,
}

impl FakeReports {
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            fetches: AtomicUsize::new(0),
        }
    }
}

impl ReportSource for FakeReports {
    fn fetch(&self, _report_id: &str) -> Result<RawReport> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        serde_json::from_value(self.payload.clone()).map_err(|e| Error::data(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Navigate(String),
    Select(String, String),
    Fill(String, String),
    Click(String),
    Alert,
}

/// Scriptable portal: exact-match picker options, disabled actions,
/// alerts raised by clicks, and navigation failures by URL substring.
pub struct FakeSurface {
    pub calls: Mutex<Vec<Call>>,
    pub options: Mutex<Vec<String>>,
    pub disabled: Mutex<HashSet<String>>,
    pub alerts_on_click: Mutex<HashMap<String, Vec<String>>>,
    pending_alerts: Mutex<VecDeque<String>>,
    pub url: Mutex<String>,
    pub fail_navigation: Mutex<Vec<String>>,
    pub panic_navigation: Mutex<Vec<String>>,
}

impl FakeSurface {
    pub fn new(options: &[&str]) -> Self {
        let mut alerts = HashMap::new();
        alerts.insert(
            "submitQM".to_string(),
            vec!["Are you sure?".to_string(), "Submitted successfully".to_string()],
        );
        alerts.insert("savecornetvalues".to_string(), vec!["Cornet values saved".to_string()]);
        Self {
            calls: Mutex::new(Vec::new()),
            options: Mutex::new(options.iter().map(|s| s.to_string()).collect()),
            disabled: Mutex::new(HashSet::new()),
            alerts_on_click: Mutex::new(alerts),
            pending_alerts: Mutex::new(VecDeque::new()),
            url: Mutex::new("https://huid.manakonline.in/MANAK/home".to_string()),
            fail_navigation: Mutex::new(Vec::new()),
            panic_navigation: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Click(a) => Some(a),
                _ => None,
            })
            .collect()
    }

    pub fn fills(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Fill(f, v) => Some((f, v)),
                _ => None,
            })
            .collect()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Navigate(u) => Some(u),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl AutomationSurface for FakeSurface {
    fn navigate(&self, url: &str) -> Result<()> {
        self.record(Call::Navigate(url.to_string()));
        if self.panic_navigation.lock().unwrap().iter().any(|p| url.contains(p.as_str())) {
            panic!("driver crashed on {url}");
        }
        if self.fail_navigation.lock().unwrap().iter().any(|p| url.contains(p.as_str())) {
            return Err(Error::automation(format!("page did not load: {url}")));
        }
        *self.url.lock().unwrap() = url.to_string();
        Ok(())
    }

    fn select_option(&self, picker_id: &str, search_text: &str) -> Result<bool> {
        self.record(Call::Select(picker_id.to_string(), search_text.to_string()));
        Ok(self.options.lock().unwrap().iter().any(|o| o == search_text))
    }

    fn fill_field(&self, field_id: &str, value: &str) -> Result<()> {
        self.record(Call::Fill(field_id.to_string(), value.to_string()));
        Ok(())
    }

    fn click(&self, action_id: &str) -> Result<bool> {
        self.record(Call::Click(action_id.to_string()));
        if self.disabled.lock().unwrap().contains(action_id) {
            return Ok(false);
        }
        if let Some(alerts) = self.alerts_on_click.lock().unwrap().get(action_id) {
            self.pending_alerts.lock().unwrap().extend(alerts.iter().cloned());
        }
        Ok(true)
    }

    fn read_current_url(&self) -> Result<String> {
        Ok(self.url.lock().unwrap().clone())
    }

    fn accept_pending_alert(&self) -> Result<Option<String>> {
        self.record(Call::Alert);
        Ok(self.pending_alerts.lock().unwrap().pop_front())
    }
}

pub struct FakeQueue {
    pub rows: Mutex<Vec<PortalJobRecord>>,
    pub fail: bool,
}

impl FakeQueue {
    pub fn new(rows: Vec<PortalJobRecord>) -> Self {
        Self {
            rows: Mutex::new(rows),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            fail: true,
        }
    }
}

impl QueueSource for FakeQueue {
    fn scan_queue(&self, _queue_url: &str) -> Result<Vec<PortalJobRecord>> {
        if self.fail {
            return Err(Error::automation("queue table not found"));
        }
        Ok(self.rows.lock().unwrap().clone())
    }
}

pub fn queue_row(job_no: &str, status: &str, timing: &str) -> PortalJobRecord {
    PortalJobRecord {
        job_no: job_no.to_string(),
        request_no: String::new(),
        raw_status_text: status.to_string(),
        raw_timing_text: timing.to_string(),
    }
}

pub struct FakeStore {
    pub rows: HashMap<JobKey, Option<String>>,
    pub fail: bool,
    pub attempts: AtomicUsize,
}

impl FakeStore {
    pub fn new(rows: &[(&str, &str, Option<&str>)]) -> Self {
        Self {
            rows: rows
                .iter()
                .map(|(j, r, s)| (JobKey::new(*j, *r), s.map(str::to_string)))
                .collect(),
            fail: false,
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            rows: HashMap::new(),
            fail: true,
            attempts: AtomicUsize::new(0),
        }
    }
}

impl StatusStore for FakeStore {
    fn fetch_statuses(&self, keys: &[JobKey]) -> Result<HashMap<JobKey, Option<String>>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::Database("unable to open database file".into()));
        }
        Ok(keys
            .iter()
            .filter_map(|k| self.rows.get(k).map(|s| (k.clone(), s.clone())))
            .collect())
    }
}
