//! Report fetching and normalization.
//!
//! The API payload is loosely typed (numbers arrive as strings or numbers,
//! an empty `strips_data` arrives as `[]`). Everything is validated once in
//! [`normalize`]; downstream code only sees [`crate::model`] types.

use crate::config::Api;
use crate::error::{Error, Result};
use crate::events::{EventSink, LogCategory};
use crate::model::{Job, LotWeight, Report, Strip, StripNo, Weight, CHECK_GOLD_LOT};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

const CHECK_GOLD_KEY: &str = "CHECK_GOLD";

#[derive(Debug, Clone, Deserialize)]
pub struct RawReport {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub job_summary: Vec<RawJob>,
    /// `{jobNo: {lotNo: [strip]}}` plus `CHECK_GOLD: [[strip]]`.
    #[serde(default)]
    pub strips_data: Value,
    #[serde(default)]
    pub check_gold_data: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawJob {
    pub job_no: Scalar,
    pub request_no: Scalar,
    #[serde(default)]
    pub total_lots: Option<Scalar>,
    #[serde(default)]
    pub total_button_weight: Option<Scalar>,
    #[serde(default)]
    pub total_scrap_weight: Option<Scalar>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawStrip {
    #[serde(default)]
    pub strip_no: Option<Scalar>,
    #[serde(default)]
    pub lot_no: Option<Scalar>,
    #[serde(default)]
    pub initial: Option<Scalar>,
    #[serde(default)]
    pub ag: Option<Scalar>,
    #[serde(default)]
    pub cu: Option<Scalar>,
    #[serde(default)]
    pub pb: Option<Scalar>,
    #[serde(default)]
    pub cornet: Option<Scalar>,
    #[serde(default)]
    pub lot_button_weight: Option<Scalar>,
    #[serde(default)]
    pub lot_scrap_weight: Option<Scalar>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Text(String),
    Number(serde_json::Number),
}

impl Scalar {
    pub fn text(&self) -> String {
        match self {
            Scalar::Text(s) => s.trim().to_string(),
            Scalar::Number(n) => n.to_string(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Text(s) => s.trim().parse().ok(),
            Scalar::Number(n) => n.as_f64(),
        }
    }
}

fn weight_of(v: &Option<Scalar>) -> Option<Weight> {
    v.as_ref().map(|s| Weight::new(s.text()))
}

fn weight_or_zero(v: &Option<Scalar>) -> Weight {
    weight_of(v).unwrap_or_else(Weight::zero)
}

pub trait ReportSource: Send + Sync {
    fn fetch(&self, report_id: &str) -> Result<RawReport>;
}

impl<T: ReportSource + ?Sized> ReportSource for Box<T> {
    fn fetch(&self, report_id: &str) -> Result<RawReport> {
        (**self).fetch(report_id)
    }
}

impl<T: ReportSource + ?Sized> ReportSource for &T {
    fn fetch(&self, report_id: &str) -> Result<RawReport> {
        (**self).fetch(report_id)
    }
}

pub struct HttpReportSource {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpReportSource {
    pub fn new(cfg: &Api) -> Result<Self> {
        if cfg.base_url.trim().is_empty() {
            return Err(Error::Config("api.base_url is empty".into()));
        }
        let timeout = Duration::from_secs(cfg.timeout_seconds.max(1));
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .user_agent(&cfg.user_agent)
            .build();
        Ok(Self {
            base_url: cfg.base_url.trim().to_string(),
            agent,
        })
    }
}

impl ReportSource for HttpReportSource {
    fn fetch(&self, report_id: &str) -> Result<RawReport> {
        debug!("GET {}?report_id={}", self.base_url, report_id);
        let resp = self
            .agent
            .get(&self.base_url)
            .query("report_id", report_id)
            .call()?;
        if resp.status() != 200 {
            return Err(Error::Network(format!("http status {}", resp.status())));
        }
        resp.into_json::<RawReport>()
            .map_err(|e| Error::data(format!("report payload is not valid JSON: {e}")))
    }
}

pub struct ReportLoader<S: ReportSource> {
    source: S,
    events: EventSink,
}

impl<S: ReportSource> ReportLoader<S> {
    pub fn new(source: S, events: EventSink) -> Self {
        Self { source, events }
    }

    pub fn load(&self, report_id: &str) -> Result<Report> {
        let report_id = report_id.trim();
        if report_id.is_empty() {
            return Err(Error::Precondition("report id is empty".into()));
        }
        self.events
            .emit(LogCategory::Load, format!("Loading report {report_id}"));
        let raw = self.source.fetch(report_id)?;
        let report = normalize(report_id, raw, &self.events)?;
        self.events.emit(
            LogCategory::Load,
            format!(
                "Loaded report {report_id}: {} job entries",
                report.jobs.len()
            ),
        );
        Ok(report)
    }
}

pub fn normalize(report_id: &str, raw: RawReport, events: &EventSink) -> Result<Report> {
    if !raw.success {
        let msg = raw.error.unwrap_or_else(|| "unknown error".to_string());
        return Err(Error::Network(format!("report API reported failure: {msg}")));
    }
    if raw.job_summary.is_empty() {
        return Err(Error::data(format!("report {report_id} has no jobs")));
    }

    let empty = Map::new();
    let strips_data = raw.strips_data.as_object().unwrap_or(&empty);
    let check_gold = check_gold_strips(strips_data);
    debug!(
        "strips_data keys={:?} check_gold={} check_gold_data={}",
        strips_data.keys().collect::<Vec<_>>(),
        check_gold.len(),
        raw.check_gold_data.len()
    );

    let mut jobs = Vec::new();
    for raw_job in &raw.job_summary {
        let job = build_job(raw_job, strips_data, &check_gold, events)?;
        jobs.extend(explode(job));
    }

    Ok(Report {
        report_id: report_id.to_string(),
        jobs,
    })
}

fn build_job(
    raw: &RawJob,
    strips_data: &Map<String, Value>,
    check_gold: &[Strip],
    events: &EventSink,
) -> Result<Job> {
    let job_no = raw.job_no.text();
    if job_no.is_empty() {
        return Err(Error::data("job_summary entry without job_no"));
    }
    let request_no = raw.request_no.text();

    let mut strips = Vec::new();
    let mut lot_weights = Vec::new();
    if let Some(lots) = strips_data.get(&job_no).and_then(Value::as_object) {
        for (lot_key, lot_value) in lots {
            let Some(entries) = lot_value.as_array() else {
                continue;
            };
            let raw_strips = parse_raw_strips(entries, &job_no);
            lot_weights.push(lot_weight(lot_key, &raw_strips));
            for rs in &raw_strips {
                let lot_no = rs
                    .lot_no
                    .as_ref()
                    .map(Scalar::text)
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| lot_key.clone());
                match strip_from_raw(rs, lot_no, StripNo::parse) {
                    Some(strip) => strips.push(strip),
                    None => warn!(job = %job_no, lot = %lot_key, "dropping strip with unknown strip_no {:?}", rs.strip_no),
                }
            }
        }
    }

    if strips.is_empty() {
        events.warn(
            LogCategory::Load,
            format!("No strip data found for Job {job_no}; it cannot be processed"),
        );
    } else {
        strips.extend(check_gold.iter().cloned());
    }

    let total_lots = raw
        .total_lots
        .as_ref()
        .and_then(|s| s.text().parse::<u32>().ok())
        .unwrap_or(lot_weights.len().max(1) as u32);

    Ok(Job {
        job_no,
        request_no,
        total_lots,
        total_button_weight: weight_or_zero(&raw.total_button_weight),
        total_scrap_weight: weight_or_zero(&raw.total_scrap_weight),
        strips,
        lot_weights,
        original_job_no: None,
        lot_no: None,
    })
}

fn parse_raw_strips(entries: &[Value], job_no: &str) -> Vec<RawStrip> {
    entries
        .iter()
        .filter_map(|v| match serde_json::from_value::<RawStrip>(v.clone()) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!(job = %job_no, "skipping malformed strip entry: {e}");
                None
            }
        })
        .collect()
}

fn strip_from_raw(
    rs: &RawStrip,
    lot_no: String,
    parse_no: fn(&str) -> Option<StripNo>,
) -> Option<Strip> {
    let strip_no = parse_no(&rs.strip_no.as_ref()?.text())?;
    Some(Strip {
        strip_no,
        lot_no,
        initial: weight_of(&rs.initial),
        ag: weight_of(&rs.ag),
        cu: weight_of(&rs.cu),
        pb: weight_of(&rs.pb),
        cornet: weight_of(&rs.cornet),
    })
}

/// First non-zero lot button/scrap weight found among the lot's strips.
fn lot_weight(lot_no: &str, strips: &[RawStrip]) -> LotWeight {
    LotWeight {
        lot_no: lot_no.to_string(),
        button_weight: first_non_zero(strips, |s| &s.lot_button_weight),
        scrap_weight: first_non_zero(strips, |s| &s.lot_scrap_weight),
    }
}

fn first_non_zero(strips: &[RawStrip], pick: fn(&RawStrip) -> &Option<Scalar>) -> Weight {
    strips
        .iter()
        .filter_map(|s| pick(s).as_ref())
        .find(|v| v.as_f64().is_some_and(|w| w != 0.0))
        .map(|v| Weight::new(v.text()))
        .unwrap_or_else(Weight::zero)
}

/// Flattens `strips_data.CHECK_GOLD` and remaps strip "1"/"2" to C1/C2.
fn check_gold_strips(strips_data: &Map<String, Value>) -> Vec<Strip> {
    let Some(groups) = strips_data.get(CHECK_GOLD_KEY).and_then(Value::as_array) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for group in groups.iter().filter_map(Value::as_array) {
        for rs in parse_raw_strips(group, CHECK_GOLD_KEY) {
            match strip_from_raw(&rs, CHECK_GOLD_LOT.to_string(), StripNo::parse_check_gold) {
                Some(strip) => out.push(strip),
                None => warn!("dropping CHECK_GOLD strip with strip_no {:?}", rs.strip_no),
            }
        }
    }
    out
}

fn explode(job: Job) -> Vec<Job> {
    if job.lot_weights.len() <= 1 {
        return vec![job];
    }
    job.lot_weights
        .iter()
        .map(|lw| Job {
            job_no: format!("{} (Lot {})", job.job_no, lw.lot_no),
            request_no: job.request_no.clone(),
            total_lots: 1,
            total_button_weight: lw.button_weight.clone(),
            total_scrap_weight: lw.scrap_weight.clone(),
            strips: job.strips.clone(),
            lot_weights: job.lot_weights.clone(),
            original_job_no: Some(job.job_no.clone()),
            lot_no: Some(lw.lot_no.clone()),
        })
        .collect()
}
