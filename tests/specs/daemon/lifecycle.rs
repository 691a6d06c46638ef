//! Daemon lifecycle specs: start/stop/status and auto-start on demand.

use crate::prelude::*;

#[test]
fn status_reports_not_running_before_start() {
    let project = Project::empty();

    project.scriv().args(&["daemon", "status"]).passes().stdout_has("daemon not running");
}

#[test]
fn start_then_status_reports_running() {
    let project = Project::empty();

    project.scriv().args(&["daemon", "start"]).passes().stdout_has("daemon started");

    let running = wait_for(SPEC_WAIT_MAX_MS, || {
        project.scriv().args(&["daemon", "status"]).passes().stdout().contains("status: running")
    });
    assert!(running, "daemon should report running after start\n{}", project.daemon_log());
}

#[test]
fn starting_twice_reports_already_running() {
    let project = Project::empty();

    project.scriv().args(&["daemon", "start"]).passes();
    wait_for(SPEC_WAIT_MAX_MS, || {
        project.scriv().args(&["ping"]).passes().stdout().contains("pong")
    });

    project.scriv().args(&["daemon", "start"]).passes().stdout_has("daemon already running");
}

#[test]
fn stop_reports_stopped_and_status_flips_back() {
    let project = Project::empty();

    project.scriv().args(&["daemon", "start"]).passes();
    wait_for(SPEC_WAIT_MAX_MS, || {
        project.scriv().args(&["ping"]).passes().stdout().contains("pong")
    });

    project.scriv().args(&["daemon", "stop"]).passes().stdout_has("daemon stopped");

    let stopped = wait_for(SPEC_WAIT_MAX_MS, || {
        project.scriv().args(&["daemon", "status"]).passes().stdout().contains("daemon not running")
    });
    assert!(stopped, "daemon should report not running after stop");
}

#[test]
fn stop_when_not_running_is_a_no_op() {
    let project = Project::empty();

    project.scriv().args(&["daemon", "stop"]).passes().stdout_has("daemon not running");
}

#[test]
fn ping_auto_starts_the_daemon() {
    let project = Project::empty();

    // `ping` is a query command (DaemonClient::for_query), so it does NOT
    // auto-start; it should fail cleanly while nothing is running.
    project.scriv().args(&["ping"]).fails();

    project.scriv().args(&["daemon", "start"]).passes();
    let up = wait_for(SPEC_WAIT_MAX_MS, || {
        project.scriv().args(&["ping"]).passes().stdout().contains("pong")
    });
    assert!(up, "ping should succeed once the daemon is started");
}

#[test]
fn reconcile_auto_starts_the_daemon() {
    let project = Project::empty();

    // `reconcile` is an action command, so it should start the daemon on
    // its own without a prior `daemon start`.
    project.scriv().args(&["reconcile"]).passes().stdout_has("scanned");
}
