//! Daemon crash recovery: a SIGKILLed daemon leaves its queue state on disk,
//! and a fresh start reconciles the inbox and resumes serving jobs.

use crate::prelude::*;

#[test]
fn jobs_enqueued_before_a_crash_are_still_listed_after_restart() {
    let project = Project::empty();
    project.file("episode-one.mp3", b"fake audio payload");

    project.scriv().args(&["daemon", "start"]).passes();
    let detected = wait_for(SPEC_WAIT_MAX_MS, || {
        project.scriv().args(&["list"]).passes().stdout().contains("episode-one")
    });
    assert!(detected, "watcher should have enqueued the dropped file\n{}", project.daemon_log());

    let killed = project.daemon_kill();
    assert!(killed, "should be able to SIGKILL the daemon");

    let dead = wait_for(SPEC_WAIT_MAX_MS, || {
        project.scriv().args(&["daemon", "status"]).passes().stdout().contains("daemon not running")
    });
    assert!(dead, "daemon should be dead after SIGKILL");

    project.scriv().args(&["daemon", "start"]).passes();
    let recovered = wait_for(SPEC_WAIT_MAX_MS, || {
        project.scriv().args(&["list"]).passes().stdout().contains("episode-one")
    });
    assert!(recovered, "job record should survive the crash and restart\n{}", project.daemon_log());
}

#[test]
fn files_dropped_while_the_daemon_is_down_are_picked_up_by_boot_reconciliation() {
    let project = Project::empty();

    // No daemon running yet: this file is invisible to any watcher.
    project.file("offline-drop.wav", b"fake audio payload");

    project.scriv().args(&["daemon", "start"]).passes();

    let found = wait_for(SPEC_WAIT_MAX_MS, || {
        project.scriv().args(&["list"]).passes().stdout().contains("offline-drop")
    });
    assert!(found, "boot reconciliation should enqueue files that arrived while stopped\n{}", project.daemon_log());
}
