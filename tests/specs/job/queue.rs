//! Job queue control-surface specs: list/get/count/retry/delete/
//! set-priority/requeue/health against a real enqueued job.

use crate::prelude::*;

fn wait_for_job(project: &Project, needle: &str) -> serde_json::Value {
    let mut found = None;
    wait_for(SPEC_WAIT_MAX_MS, || {
        let stdout = project.scriv().args(&["list", "-o", "json"]).passes().stdout();
        let Ok(jobs) = serde_json::from_str::<Vec<serde_json::Value>>(&stdout) else {
            return false;
        };
        found = jobs.into_iter().find(|j| {
            j.get("display_name").and_then(|v| v.as_str()).unwrap_or_default().contains(needle)
        });
        found.is_some()
    });
    found.unwrap_or_else(|| panic!("job matching '{needle}' never appeared\n{}", project.daemon_log()))
}

#[test]
fn enqueued_file_appears_in_list_and_count() {
    let project = Project::empty();
    project.file("meeting-notes.mp3", b"fake audio payload");
    project.scriv().args(&["daemon", "start"]).passes();

    let job = wait_for_job(&project, "meeting-notes");
    assert_eq!(job["priority"], "normal");

    project.scriv().args(&["count"]).passes().stdout_has("1");
}

#[test]
fn get_shows_job_detail_by_id_prefix() {
    let project = Project::empty();
    project.file("interview.mp3", b"fake audio payload");
    project.scriv().args(&["daemon", "start"]).passes();

    let job = wait_for_job(&project, "interview");
    let id = job["id"].as_str().unwrap();
    let prefix = &id[..8];

    project.scriv().args(&["get", prefix]).passes().stdout_has("interview");
}

#[test]
fn set_priority_changes_dispatch_priority() {
    let project = Project::empty();
    project.file("urgent-call.mp3", b"fake audio payload");
    project.scriv().args(&["daemon", "start"]).passes();

    let job = wait_for_job(&project, "urgent-call");
    let id = job["id"].as_str().unwrap();
    let prefix = &id[..8];

    project.scriv().args(&["set-priority", prefix, "urgent"]).passes().stdout_has("urgent");

    let updated = wait_for_job(&project, "urgent-call");
    assert_eq!(updated["priority"], "urgent");
}

#[test]
fn delete_removes_the_job_record() {
    let project = Project::empty();
    project.file("scratch.mp3", b"fake audio payload");
    project.scriv().args(&["daemon", "start"]).passes();

    let job = wait_for_job(&project, "scratch");
    let id = job["id"].as_str().unwrap();
    let prefix = &id[..8].to_string();

    project.scriv().args(&["delete", prefix]).passes().stdout_has("deleted");

    let gone = wait_for(SPEC_WAIT_MAX_MS, || {
        project.scriv().args(&["get", prefix]).fails().stderr().contains("no job matches")
    });
    assert!(gone, "job should no longer be gettable after delete");
}

#[test]
fn unknown_id_prefix_reports_an_error() {
    let project = Project::empty();
    project.scriv().args(&["daemon", "start"]).passes();
    wait_for(SPEC_WAIT_MAX_MS, || {
        project.scriv().args(&["ping"]).passes().stdout().contains("pong")
    });

    project.scriv().args(&["get", "deadbeef"]).fails().stderr_has("no job matches");
}

#[test]
fn retry_completed_job_moves_it_back_to_waiting() {
    let project = Project::empty();
    project.file("rerun.mp3", b"fake audio payload");
    project.scriv().args(&["daemon", "start"]).passes();

    let completed = wait_for(SPEC_WAIT_MAX_MS, || {
        let stdout = project.scriv().args(&["list", "-o", "json"]).passes().stdout();
        serde_json::from_str::<Vec<serde_json::Value>>(&stdout)
            .unwrap_or_default()
            .iter()
            .any(|j| j["display_name"].as_str().unwrap_or_default().contains("rerun") && j["state"] == "completed")
    });
    assert!(completed, "job should complete against the test transcription stub\n{}", project.daemon_log());

    let jobs: Vec<serde_json::Value> =
        serde_json::from_str(&project.scriv().args(&["list", "-o", "json", "--state", "completed"]).passes().stdout())
            .unwrap();
    let job = jobs.iter().find(|j| j["display_name"].as_str().unwrap_or_default().contains("rerun")).unwrap();
    let prefix = &job["id"].as_str().unwrap()[..8];

    project.scriv().args(&["retry", prefix]).passes().stdout_has("retrying");
}
