mod common;

use assay_batch::batch::{BatchMode, BatchRunner};
use assay_batch::events::EventSink;
use assay_batch::loader::normalize;
use assay_batch::model::Job;
use common::{fast_config, raw_report, report_json, FakeSurface};
use std::sync::atomic::AtomicBool;

/// `n` single-lot jobs B1..Bn sharing B's strips.
fn jobs(n: usize) -> Vec<Job> {
    let report = normalize("77", raw_report(report_json()), &EventSink::direct()).unwrap();
    let b = report.job("B").cloned().unwrap();
    (1..=n)
        .map(|i| Job {
            job_no: format!("B{i}"),
            ..b.clone()
        })
        .collect()
}

#[test]
fn one_failing_job_does_not_stop_the_batch() {
    let cfg = fast_config();
    let surface = FakeSurface::new(&["Lot 1"]);
    surface.fail_navigation.lock().unwrap().push("jobNo=B3".into());
    let events = EventSink::direct();
    let runner = BatchRunner::new(&surface, &cfg, &events);

    let jobs = jobs(5);
    let mut seen = Vec::new();
    let result = runner.run(
        &jobs,
        BatchMode::Initial,
        0,
        &mut |outcome, label| seen.push((outcome.job_no.clone(), label.to_string())),
        None,
    );

    assert_eq!(result.success_count, 4);
    assert_eq!(result.failure_count, 1);
    assert_eq!(result.jobs.len(), 5);
    assert!(surface.navigations().iter().any(|u| u.ends_with("jobNo=B5")));
    assert_eq!(seen.len(), 5);
    assert_eq!(seen[2], ("B3".to_string(), "Failed".to_string()));
    assert_eq!(seen[0].1, "Initial Saved");
}

#[test]
fn panicking_job_is_counted_as_failure() {
    let cfg = fast_config();
    let surface = FakeSurface::new(&["Lot 1"]);
    surface.panic_navigation.lock().unwrap().push("jobNo=B1".into());
    let events = EventSink::direct();
    let runner = BatchRunner::new(&surface, &cfg, &events);

    let result = runner.run(&jobs(2), BatchMode::Cornet, 0, &mut |_, _| {}, None);
    assert_eq!(result.success_count, 1);
    assert_eq!(result.failure_count, 1);
    assert!(result.jobs[0].error.as_deref().unwrap_or("").contains("panicked"));
}

#[test]
fn jobs_run_in_selection_order() {
    let cfg = fast_config();
    let surface = FakeSurface::new(&["Lot 1"]);
    let events = EventSink::direct();
    let runner = BatchRunner::new(&surface, &cfg, &events);

    let mut jobs = jobs(3);
    jobs.reverse();
    let result = runner.run(&jobs, BatchMode::Cornet, 0, &mut |_, _| {}, None);
    let order: Vec<_> = result.jobs.iter().map(|j| j.job_no.as_str()).collect();
    assert_eq!(order, vec!["B3", "B2", "B1"]);
    assert_eq!(result.mode, "cornet");
}

#[test]
fn stop_flag_skips_unstarted_jobs() {
    let cfg = fast_config();
    let surface = FakeSurface::new(&["Lot 1"]);
    let events = EventSink::direct();
    let runner = BatchRunner::new(&surface, &cfg, &events);
    let stop = AtomicBool::new(true);

    let result = runner.run(&jobs(3), BatchMode::All, 0, &mut |_, _| {}, Some(&stop));
    assert_eq!(result.skipped_count, 3);
    assert_eq!(result.success_count + result.failure_count, 0);
    assert!(surface.calls().is_empty());
}

#[test]
fn mode_parsing() {
    assert_eq!("initial".parse::<BatchMode>().unwrap(), BatchMode::Initial);
    assert_eq!(" Cornet ".parse::<BatchMode>().unwrap(), BatchMode::Cornet);
    assert_eq!("all".parse::<BatchMode>().unwrap(), BatchMode::All);
    assert!("everything".parse::<BatchMode>().is_err());
}
