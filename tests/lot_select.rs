mod common;

use assay_batch::error::Error;
use assay_batch::events::EventSink;
use assay_batch::orchestrator::JobOrchestrator;
use common::{fast_config, Call, FakeSurface};

#[test]
fn composite_option_matches_exactly() {
    let cfg = fast_config();
    let surface = FakeSurface::new(&["Lot 1:123", "Lot 2:123"]);
    let events = EventSink::direct();
    let orch = JobOrchestrator::new(&surface, &cfg.portal, &cfg.global, &events);

    assert_eq!(orch.select_lot("1", "123").unwrap(), "Lot 1:123");
    assert_eq!(
        surface.calls(),
        vec![Call::Select("s2id_lotno".into(), "Lot 1:123".into())]
    );
}

#[test]
fn plain_option_is_the_fallback() {
    let cfg = fast_config();
    let surface = FakeSurface::new(&["Lot 1", "Lot 2"]);
    let events = EventSink::direct();
    let orch = JobOrchestrator::new(&surface, &cfg.portal, &cfg.global, &events);

    assert_eq!(orch.select_lot("2", "123").unwrap(), "Lot 2");
    assert_eq!(
        surface.calls(),
        vec![
            Call::Select("s2id_lotno".into(), "Lot 2:123".into()),
            Call::Select("s2id_lotno".into(), "Lot 2".into()),
        ]
    );
}

#[test]
fn prefix_lookalikes_do_not_match() {
    let cfg = fast_config();
    let surface = FakeSurface::new(&["Lot 10:123", "Lot 1:1234", "Lot 11"]);
    let events = EventSink::direct();
    let orch = JobOrchestrator::new(&surface, &cfg.portal, &cfg.global, &events);

    let err = orch.select_lot("1", "123").unwrap_err();
    assert!(matches!(err, Error::Automation(_)), "{err}");
}
