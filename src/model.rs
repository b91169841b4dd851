//! Report → job → lot → strip model. Lot order is first appearance in the
//! payload and decides which lot submits the identifier.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const CHECK_GOLD_LOT: &str = "0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub report_id: String,
    pub jobs: Vec<Job>,
}

impl Report {
    pub fn job(&self, job_no: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.job_no == job_no)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Display number. For per-lot entries this is `"{original} (Lot {n})"`.
    pub job_no: String,
    pub request_no: String,
    pub total_lots: u32,
    pub total_button_weight: Weight,
    pub total_scrap_weight: Weight,
    /// Every strip of the job across all lots, CHECK_GOLD strips last.
    pub strips: Vec<Strip>,
    pub lot_weights: Vec<LotWeight>,
    pub original_job_no: Option<String>,
    pub lot_no: Option<String>,
}

impl Job {
    pub fn portal_job_no(&self) -> &str {
        self.original_job_no.as_deref().unwrap_or(&self.job_no)
    }

    pub fn lot_groups(&self) -> LotGroups {
        group_strips_by_lot(&self.strips)
    }

    pub fn lots_to_process(&self) -> Vec<String> {
        let groups = self.lot_groups();
        match &self.lot_no {
            Some(lot) => groups
                .lot_nos()
                .into_iter()
                .filter(|l| l == lot)
                .collect(),
            None => groups.lot_nos(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LotWeight {
    pub lot_no: String,
    pub button_weight: Weight,
    pub scrap_weight: Weight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StripNo {
    #[serde(rename = "1")]
    One,
    #[serde(rename = "2")]
    Two,
    #[serde(rename = "C1")]
    CheckOne,
    #[serde(rename = "C2")]
    CheckTwo,
}

impl StripNo {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "1" => Some(StripNo::One),
            "2" => Some(StripNo::Two),
            "C1" => Some(StripNo::CheckOne),
            "C2" => Some(StripNo::CheckTwo),
            _ => None,
        }
    }

    /// CHECK_GOLD groups tag their strips "1"/"2"; those become C1/C2.
    pub fn parse_check_gold(raw: &str) -> Option<Self> {
        match raw.trim() {
            "1" | "C1" => Some(StripNo::CheckOne),
            "2" | "C2" => Some(StripNo::CheckTwo),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StripNo::One => "1",
            StripNo::Two => "2",
            StripNo::CheckOne => "C1",
            StripNo::CheckTwo => "C2",
        }
    }

    pub fn is_check_gold(&self) -> bool {
        matches!(self, StripNo::CheckOne | StripNo::CheckTwo)
    }
}

impl fmt::Display for StripNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A weight exactly as the portal should receive it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Weight(String);

impl Weight {
    pub fn new(text: impl Into<String>) -> Self {
        Weight(text.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Blank or numerically zero values are never written to the portal.
    pub fn is_blank_or_zero(&self) -> bool {
        let s = self.0.trim();
        if s.is_empty() {
            return true;
        }
        match s.parse::<f64>() {
            Ok(v) => v == 0.0,
            Err(_) => false,
        }
    }

    pub fn zero() -> Self {
        Weight("0".into())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strip {
    pub strip_no: StripNo,
    pub lot_no: String,
    pub initial: Option<Weight>,
    pub ag: Option<Weight>,
    pub cu: Option<Weight>,
    pub pb: Option<Weight>,
    pub cornet: Option<Weight>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LotStrips {
    pub lot_no: String,
    pub strips: Vec<Strip>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LotGroups {
    pub lots: Vec<LotStrips>,
    pub check_gold: Vec<Strip>,
}

impl LotGroups {
    pub fn lot_nos(&self) -> Vec<String> {
        self.lots.iter().map(|l| l.lot_no.clone()).collect()
    }

    pub fn effective_strips(&self, lot_no: &str) -> Vec<Strip> {
        let mut out: Vec<Strip> = self
            .lots
            .iter()
            .find(|l| l.lot_no == lot_no)
            .map(|l| l.strips.clone())
            .unwrap_or_default();
        out.extend(self.check_gold.iter().cloned());
        out
    }
}

pub fn group_strips_by_lot(strips: &[Strip]) -> LotGroups {
    let mut groups = LotGroups::default();
    for strip in strips {
        if strip.lot_no == CHECK_GOLD_LOT {
            groups.check_gold.push(strip.clone());
            continue;
        }
        match groups.lots.iter_mut().find(|l| l.lot_no == strip.lot_no) {
            Some(lot) => lot.strips.push(strip.clone()),
            None => groups.lots.push(LotStrips {
                lot_no: strip.lot_no.clone(),
                strips: vec![strip.clone()],
            }),
        }
    }
    groups
}

pub fn is_last_lot<S: AsRef<str>>(lot_nos: &[S], current: &str) -> bool {
    lot_nos.last().is_some_and(|l| l.as_ref() == current)
}
