//! Per-job, per-lot portal state machine.
//!
//! One parametrized flow serves both weighing phases: a [`WeightCategory`]
//! decides which fields are written and which save action confirms them.
//! Lots are walked in source order; a failed lot never stops the remaining
//! lots unless `stop_job_on_lot_failure` is set.

use crate::batch::BatchMode;
use crate::config::{Global, Portal, PortalFields, StripFields};
use crate::error::{Error, Result};
use crate::events::{EventSink, LogCategory};
use crate::model::{is_last_lot, Job, Strip, StripNo, Weight};
use crate::outcome::{IdentifierOutcome, JobOutcome, JobState, LotOutcome};
use crate::surface::AutomationSurface;
use crate::util::pause_ms;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

const MAX_ALERTS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightCategory {
    Initial,
    Cornet,
}

impl WeightCategory {
    pub fn label(&self) -> &'static str {
        match self {
            WeightCategory::Initial => "initial",
            WeightCategory::Cornet => "cornet",
        }
    }

    fn save_action<'a>(&self, portal: &'a Portal) -> &'a str {
        match self {
            WeightCategory::Initial => &portal.actions.save_initial,
            WeightCategory::Cornet => &portal.actions.save_cornet,
        }
    }

    pub fn field_writes(
        &self,
        strips: &[Strip],
        fields: &PortalFields,
        mirror_cornet: bool,
    ) -> Vec<(String, Weight)> {
        let mut out = Vec::new();
        for strip in strips {
            let slot = slot_fields(fields, strip.strip_no);
            match self {
                WeightCategory::Initial => {
                    for (id, value) in [
                        (&slot.initial, &strip.initial),
                        (&slot.ag, &strip.ag),
                        (&slot.cu, &strip.cu),
                        (&slot.pb, &strip.pb),
                    ] {
                        push_write(&mut out, id, value);
                    }
                }
                WeightCategory::Cornet => {
                    push_write(&mut out, &slot.cornet, &strip.cornet);
                    if mirror_cornet && !strip.strip_no.is_check_gold() {
                        let gold = slot_fields(fields, check_gold_twin(strip.strip_no));
                        push_write(&mut out, &gold.cornet, &strip.cornet);
                    }
                }
            }
        }
        out
    }
}

fn push_write(out: &mut Vec<(String, Weight)>, field: &str, value: &Option<Weight>) {
    let Some(value) = value.as_ref().filter(|w| !w.is_blank_or_zero()) else {
        return;
    };
    if field.is_empty() {
        return;
    }
    // A later strip for the same target overrides an earlier one.
    out.retain(|(f, _)| f != field);
    out.push((field.to_string(), value.clone()));
}

fn slot_fields(fields: &PortalFields, no: StripNo) -> &StripFields {
    match no {
        StripNo::One => &fields.strip_1,
        StripNo::Two => &fields.strip_2,
        StripNo::CheckOne => &fields.check_1,
        StripNo::CheckTwo => &fields.check_2,
    }
}

fn check_gold_twin(no: StripNo) -> StripNo {
    match no {
        StripNo::One | StripNo::CheckOne => StripNo::CheckOne,
        StripNo::Two | StripNo::CheckTwo => StripNo::CheckTwo,
    }
}

/// Picker labels to try for a lot, most specific first. Only exact label
/// matches count.
pub fn lot_option_candidates(lot_no: &str, job_no: &str) -> Vec<String> {
    let mut out = Vec::with_capacity(2);
    if !job_no.is_empty() {
        out.push(format!("Lot {lot_no}:{job_no}"));
    }
    out.push(format!("Lot {lot_no}"));
    out
}

pub struct JobOrchestrator<'a> {
    surface: &'a dyn AutomationSurface,
    portal: &'a Portal,
    global: &'a Global,
    events: &'a EventSink,
}

impl<'a> JobOrchestrator<'a> {
    pub fn new(
        surface: &'a dyn AutomationSurface,
        portal: &'a Portal,
        global: &'a Global,
        events: &'a EventSink,
    ) -> Self {
        Self {
            surface,
            portal,
            global,
            events,
        }
    }

    pub fn process(&self, job: &Job, mode: BatchMode, stop: Option<&AtomicBool>) -> Result<JobOutcome> {
        let lots = job.lots_to_process();
        if job.strips.is_empty() || lots.is_empty() {
            return Err(Error::data(format!(
                "job {} has no strip data to process",
                job.job_no
            )));
        }

        let mut outcome = JobOutcome::new(&job.job_no, job.portal_job_no());
        let phases = mode.categories();
        for (i, category) in phases.iter().enumerate() {
            let final_phase = i + 1 == phases.len();
            let phase_ok = self.run_phase(job, *category, &lots, final_phase, stop, &mut outcome);
            if outcome.state == JobState::Stopped {
                break;
            }
            if !phase_ok {
                if !final_phase {
                    self.events.warn(
                        LogCategory::Batch,
                        format!(
                            "Job {}: {} phase incomplete, skipping remaining phases",
                            job.job_no,
                            category.label()
                        ),
                    );
                }
                break;
            }
        }

        if outcome.state == JobState::NotStarted {
            outcome.state = if outcome.lots.iter().all(|l| l.saved) {
                JobState::Completed
            } else {
                JobState::Failed
            };
        }
        Ok(outcome)
    }

    pub fn run_phase(
        &self,
        job: &Job,
        category: WeightCategory,
        lots: &[String],
        final_phase: bool,
        stop: Option<&AtomicBool>,
        outcome: &mut JobOutcome,
    ) -> bool {
        let all_lots = job.lot_groups().lot_nos();
        let mut all_ok = true;
        for lot_no in lots {
            if stop.is_some_and(|s| s.load(Ordering::SeqCst)) {
                self.events.warn(
                    LogCategory::Lot,
                    format!("Job {}: stop requested before lot {lot_no}", job.job_no),
                );
                outcome.state = JobState::Stopped;
                return false;
            }

            let lot = match self.run_lot(job, lot_no, category) {
                Ok(lot) => {
                    self.events.emit(
                        LogCategory::Lot,
                        format!(
                            "Job {} lot {lot_no}: {} weights saved ({} fields)",
                            job.job_no,
                            category.label(),
                            lot.fields_written
                        ),
                    );
                    lot
                }
                Err(err) => {
                    self.events.warn(
                        LogCategory::Lot,
                        format!(
                            "Job {} lot {lot_no}: {} failed: {err}",
                            job.job_no,
                            category.label()
                        ),
                    );
                    LotOutcome::failed(lot_no, category, &err)
                }
            };
            let saved = lot.saved;
            outcome.lots.push(lot);
            all_ok &= saved;

            if !saved {
                if self.global.stop_job_on_lot_failure {
                    return false;
                }
                continue;
            }

            if final_phase
                && self.global.auto_submit_identifier
                && all_ok
                && is_last_lot(&all_lots, lot_no)
            {
                outcome.identifier = self.submit_identifier(job);
            }
        }
        all_ok
    }

    fn run_lot(&self, job: &Job, lot_no: &str, category: WeightCategory) -> Result<LotOutcome> {
        let portal_job = job.portal_job_no();
        let url = self.portal.weighing_url(&job.request_no, portal_job);
        debug!(job = %job.job_no, lot = %lot_no, "navigate {url}");
        self.surface.navigate(&url)?;
        pause_ms(self.portal.settle_ms);

        let option = self.select_lot(lot_no, portal_job)?;
        let strips = job.lot_groups().effective_strips(lot_no);

        let mut written = 0;
        if category == WeightCategory::Initial {
            let (button, scrap) = scale_weights(job, lot_no);
            written += self.fill_and_save(
                &self.portal.fields.scrap_weight,
                &scrap,
                &self.portal.actions.save_scrap_weight,
            )?;
            written += self.fill_and_save(
                &self.portal.fields.button_weight,
                &button,
                &self.portal.actions.save_button_weight,
            )?;
        }

        let writes = category.field_writes(
            &strips,
            &self.portal.fields,
            self.portal.mirror_cornet_to_check_gold,
        );
        for (field, value) in &writes {
            self.surface.fill_field(field, value.as_str())?;
        }
        written += writes.len();

        let action = category.save_action(self.portal);
        if !self.surface.click(action)? {
            return Err(Error::automation(format!(
                "save action {action} is not available"
            )));
        }
        pause_ms(self.portal.alert_settle_ms);
        if category == WeightCategory::Cornet {
            for text in self.accept_alerts() {
                self.events.emit(
                    LogCategory::Lot,
                    format!("Job {} lot {lot_no}: confirmed \"{text}\"", job.job_no),
                );
            }
        }

        Ok(LotOutcome {
            lot_no: lot_no.to_string(),
            category,
            saved: true,
            option: Some(option),
            fields_written: written,
            error_kind: None,
            error: None,
        })
    }

    pub fn select_lot(&self, lot_no: &str, job_no: &str) -> Result<String> {
        for candidate in lot_option_candidates(lot_no, job_no) {
            if self.surface.select_option(&self.portal.lot_picker, &candidate)? {
                debug!(lot = %lot_no, "selected option {candidate}");
                return Ok(candidate);
            }
        }
        Err(Error::automation(format!(
            "no lot picker option for lot {lot_no} of job {job_no}"
        )))
    }

    fn fill_and_save(&self, field: &str, value: &Weight, action: &str) -> Result<usize> {
        if value.is_blank_or_zero() {
            return Ok(0);
        }
        self.surface.fill_field(field, value.as_str())?;
        if !self.surface.click(action)? {
            warn!("save action {action} unavailable after filling {field}");
        }
        pause_ms(self.portal.alert_settle_ms);
        Ok(1)
    }

    fn accept_alerts(&self) -> Vec<String> {
        let mut texts = Vec::new();
        for _ in 0..MAX_ALERTS {
            match self.surface.accept_pending_alert() {
                Ok(Some(text)) => {
                    texts.push(text);
                    pause_ms(self.portal.alert_settle_ms);
                }
                Ok(None) => break,
                Err(err) => {
                    warn!("accepting alert failed: {err}");
                    break;
                }
            }
        }
        texts
    }

    fn submit_identifier(&self, job: &Job) -> IdentifierOutcome {
        let action = &self.portal.actions.submit_identifier;
        let failure = match self.surface.click(action) {
            Ok(true) => {
                pause_ms(self.portal.alert_settle_ms);
                let alerts = self.accept_alerts();
                if !alerts.is_empty() {
                    self.events.emit(
                        LogCategory::Lot,
                        format!(
                            "Job {}: identifier submitted ({})",
                            job.portal_job_no(),
                            alerts.join(" / ")
                        ),
                    );
                    return IdentifierOutcome::Submitted { alerts };
                }
                Error::IdentifierSubmission("no confirmation appeared".into())
            }
            Ok(false) => {
                Error::IdentifierSubmission(format!("submit action {action} is not available"))
            }
            Err(err) => Error::IdentifierSubmission(err.to_string()),
        };
        self.events.warn(
            LogCategory::Lot,
            format!("Job {}: {failure}", job.portal_job_no()),
        );
        IdentifierOutcome::Failed {
            reason: failure.to_string(),
        }
    }
}

/// Button and scrap weight for a lot. A single-lot job falls back to the
/// job totals when the strips carry no lot weights.
fn scale_weights(job: &Job, lot_no: &str) -> (Weight, Weight) {
    let lot = job.lot_weights.iter().find(|l| l.lot_no == lot_no);
    let (mut button, mut scrap) = lot
        .map(|l| (l.button_weight.clone(), l.scrap_weight.clone()))
        .unwrap_or_else(|| (Weight::zero(), Weight::zero()));
    if job.lot_weights.len() <= 1 || job.lot_no.is_some() {
        if button.is_blank_or_zero() {
            button = job.total_button_weight.clone();
        }
        if scrap.is_blank_or_zero() {
            scrap = job.total_scrap_weight.clone();
        }
    }
    (button, scrap)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip(no: StripNo, cornet: &str) -> Strip {
        Strip {
            strip_no: no,
            lot_no: "1".into(),
            initial: Some(Weight::new("0.5")),
            ag: Some(Weight::new("0")),
            cu: None,
            pb: Some(Weight::new("0.01")),
            cornet: Some(Weight::new(cornet)),
        }
    }

    #[test]
    fn composite_label_is_tried_first() {
        assert_eq!(
            lot_option_candidates("1", "123"),
            vec!["Lot 1:123".to_string(), "Lot 1".to_string()]
        );
        assert_eq!(lot_option_candidates("3", ""), vec!["Lot 3".to_string()]);
    }

    #[test]
    fn initial_writes_skip_zero_and_cornet() {
        let fields = PortalFields::default();
        let writes = WeightCategory::Initial.field_writes(&[strip(StripNo::One, "0.4")], &fields, true);
        let ids: Vec<_> = writes.iter().map(|(f, _)| f.as_str()).collect();
        assert_eq!(ids, vec![fields.strip_1.initial.as_str(), fields.strip_1.pb.as_str()]);
    }

    #[test]
    fn real_check_gold_cornet_overrides_mirror() {
        let fields = PortalFields::default();
        let strips = [strip(StripNo::One, "0.4"), strip(StripNo::CheckOne, "0.7")];
        let writes = WeightCategory::Cornet.field_writes(&strips, &fields, true);
        let gold: Vec<_> = writes
            .iter()
            .filter(|(f, _)| *f == fields.check_1.cornet)
            .collect();
        assert_eq!(gold.len(), 1);
        assert_eq!(gold[0].1.as_str(), "0.7");
    }
}
