//! On-demand reconciliation (`scriv reconcile`) against a live daemon.

use crate::prelude::*;

#[test]
fn reconcile_reports_a_scan_summary() {
    let project = Project::empty();
    project.file("a.mp3", b"fake audio payload");
    project.file("b.mp3", b"fake audio payload");
    project.scriv().args(&["daemon", "start"]).passes();

    wait_for(SPEC_WAIT_MAX_MS, || {
        project.scriv().args(&["ping"]).passes().stdout().contains("pong")
    });

    project
        .scriv()
        .args(&["reconcile"])
        .passes()
        .stdout_has("scanned")
        .stdout_has("reconciled")
        .stdout_has("partial");
}

#[test]
fn reconcile_json_output_round_trips_report_fields() {
    let project = Project::empty();
    project.scriv().args(&["daemon", "start"]).passes();
    wait_for(SPEC_WAIT_MAX_MS, || {
        project.scriv().args(&["ping"]).passes().stdout().contains("pong")
    });

    let stdout = project.scriv().args(&["reconcile", "-o", "json"]).passes().stdout();
    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert!(report.get("files_scanned").is_some());
    assert!(report.get("jobs_created").is_some());
    assert!(report.get("duration_ms").is_some());
}
