use assay_batch::config::Surface;
use assay_batch::error::Error;
use assay_batch::surface::bridge::BridgeSurface;
use assay_batch::surface::{AutomationSurface, QueueSource};
use std::time::{Duration, Instant};

const SCRIPTED: &str = r#"while read -r l; do
  case "$l" in
    *'"op":"ping"'*) echo '{"ok":true,"value":{"driver":"sh","ok":true}}' ;;
    *'"op":"fill_field"'*) echo '{"ok":false,"error":"element num_strip_weight_M11 not found"}' ;;
    *'"op":"current_url"'*) echo '{"ok":true,"value":"https://portal.test/MANAK/home"}' ;;
    *'"op":"accept_alert"'*) echo '{"ok":true,"value":null}' ;;
    *'"op":"scan_queue"'*) echo '{"ok":true,"value":[{"job_no":"A","request_no":"R1","raw_status_text":"Fire Assaying","raw_timing_text":"00:05:00"}]}' ;;
    *'"op":"quit"'*) exit 0 ;;
    *) echo '{"ok":true,"value":true}' ;;
  esac
done"#;

fn shell(script: &str, timeout_seconds: u64) -> Surface {
    Surface {
        program: "sh".into(),
        args: vec!["-c".into(), script.into()],
        request_timeout_seconds: timeout_seconds,
        log_stderr: false,
        ..Surface::default()
    }
}

#[test]
fn echo_bridge_answers_every_request() {
    let bridge =
        BridgeSurface::spawn(&shell(r#"while read l; do echo '{"ok":true,"value":true}'; done"#, 5))
            .unwrap();
    assert!(bridge.click("savesampleweight").unwrap());
    assert!(bridge.select_option("lotno", "Lot 1:A").unwrap());
    bridge.navigate("https://portal.test/form").unwrap();
}

#[test]
fn replies_are_decoded_per_operation() {
    let bridge = BridgeSurface::spawn(&shell(SCRIPTED, 5)).unwrap();

    let diag = bridge.doctor().unwrap();
    assert!(diag.ok);
    assert_eq!(diag.driver, "sh");

    assert_eq!(
        bridge.read_current_url().unwrap(),
        "https://portal.test/MANAK/home"
    );
    assert_eq!(bridge.accept_pending_alert().unwrap(), None);

    let rows = bridge.scan_queue("https://portal.test/queue").unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].job_no, "A");
    assert_eq!(rows[0].raw_timing_text, "00:05:00");
}

#[test]
fn failed_reply_is_an_automation_error_and_session_survives() {
    let bridge = BridgeSurface::spawn(&shell(SCRIPTED, 5)).unwrap();
    let err = bridge.fill_field("num_strip_weight_M11", "0.5").unwrap_err();
    assert!(
        matches!(err, Error::Automation(ref m) if m.contains("not found")),
        "{err:?}"
    );
    assert!(bridge.click("savesampleweight").unwrap());
}

#[test]
fn non_boolean_click_reply_is_rejected() {
    let bridge =
        BridgeSurface::spawn(&shell(r#"while read l; do echo '{"ok":true,"value":"yes"}'; done"#, 5))
            .unwrap();
    assert!(matches!(bridge.click("submitQM"), Err(Error::Automation(_))));
}

#[test]
fn silent_bridge_times_out_and_is_killed() {
    let bridge = BridgeSurface::spawn(&shell("sleep 30", 1)).unwrap();
    let started = Instant::now();
    let err = bridge.click("savesampleweight").unwrap_err();
    assert!(
        matches!(err, Error::Automation(ref m) if m.contains("exceeded timeout")),
        "{err:?}"
    );
    assert!(started.elapsed() < Duration::from_secs(10));

    let err = bridge.click("savesampleweight").unwrap_err();
    assert!(
        matches!(err, Error::Automation(ref m) if m.contains("not running")),
        "{err:?}"
    );
}

#[test]
fn exited_bridge_is_not_reused() {
    let bridge = BridgeSurface::spawn(&shell("exit 0", 5)).unwrap();
    std::thread::sleep(Duration::from_millis(200));
    assert!(matches!(bridge.navigate("https://portal.test"), Err(Error::Automation(_))));
    let err = bridge.navigate("https://portal.test").unwrap_err();
    assert!(err.to_string().contains("not running"), "{err}");
}

#[test]
fn spawn_rejects_missing_program() {
    let mut cfg = shell("", 5);
    cfg.program = " ".into();
    assert!(matches!(BridgeSurface::spawn(&cfg), Err(Error::Config(_))));

    cfg.program = "/nonexistent/portal-bridge".into();
    assert!(matches!(BridgeSurface::spawn(&cfg), Err(Error::Automation(_))));
}
