mod common;

use assay_batch::config::{self, Config};
use assay_batch::events::EventSink;
use assay_batch::scanner::{PortalScanner, PortalSnapshot, QueueRules};
use assay_batch::status::PortalStatus;
use common::{queue_row, FakeQueue};

fn rules() -> QueueRules {
    QueueRules::new(&config::Scanner::default()).unwrap()
}

#[test]
fn rows_classify_by_timing_then_action() {
    let rules = rules();
    assert_eq!(
        rules.classify(&queue_row("1", "Fire Assaying", "Completed")),
        PortalStatus::NotInPortal
    );
    assert_eq!(
        rules.classify(&queue_row("2", "Fire Assaying", "Please Fill Initial Values")),
        PortalStatus::NeedsInitialValues
    );
    assert_eq!(
        rules.classify(&queue_row("3", "Fire Assaying", "00:12:40")),
        PortalStatus::Available
    );
    assert_eq!(
        rules.classify(&queue_row("4", "Sampling", "")),
        PortalStatus::InPortalNotReady
    );
}

#[test]
fn absent_jobs_are_not_in_portal() {
    let snapshot = PortalSnapshot::from_records(&rules(), &[queue_row("3", "Fire Assaying", "")]);
    assert_eq!(snapshot.status_for("3"), PortalStatus::Available);
    assert_eq!(snapshot.status_for(" 3 "), PortalStatus::Available);
    assert_eq!(snapshot.status_for("999"), PortalStatus::NotInPortal);
}

#[test]
fn duplicate_rows_keep_the_most_actionable() {
    let snapshot = PortalSnapshot::from_records(
        &rules(),
        &[
            queue_row("5", "Sampling", ""),
            queue_row("5", "Fire Assaying", ""),
            queue_row("5", "Fire Assaying", "Completed"),
        ],
    );
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.status_for("5"), PortalStatus::Available);
}

#[test]
fn scan_failure_degrades_to_empty_snapshot() {
    let (events, rx) = EventSink::channel();
    let scanner = PortalScanner::new(&Config::default(), events).unwrap();
    let snapshot = scanner.scan(&FakeQueue::failing());
    assert!(snapshot.is_empty());
    assert_eq!(snapshot.status_for("A"), PortalStatus::NotInPortal);
    drop(scanner);
    assert!(rx.iter().any(|e| e.message.contains("Portal scan failed")));
}

#[test]
fn scan_uses_configured_patterns() {
    let mut cfg = Config::default();
    cfg.scanner.action_pattern = r"(?i)assay(ing)?\s+now".into();
    let scanner = PortalScanner::new(&cfg, EventSink::direct()).unwrap();
    let queue = FakeQueue::new(vec![
        queue_row("A", "ASSAYING NOW", ""),
        queue_row("B", "Fire Assaying", ""),
    ]);
    let snapshot = scanner.scan(&queue);
    assert_eq!(snapshot.status_for("A"), PortalStatus::Available);
    assert_eq!(snapshot.status_for("B"), PortalStatus::InPortalNotReady);
}

#[test]
fn bad_pattern_is_a_config_error() {
    let mut cfg = config::Scanner::default();
    cfg.completed_pattern = "(".into();
    assert!(matches!(
        QueueRules::new(&cfg),
        Err(assay_batch::error::Error::Config(_))
    ));
}
