// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized state from WAL replay.

use scriv_core::job::Priority;
use scriv_core::{Event, Job, JobId, JobState};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Sort key for the priority-indexed waiting lane: priority first (so
/// `Urgent` sorts before `Low`), then `enqueued_at_ms`, then job id as a
/// final tie-break so the key is always unique.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PriorityKey {
    pub priority: Priority,
    pub enqueued_at_ms: i64,
    pub job_id: JobId,
}

/// Derived queue state, rebuilt by replaying the WAL on top of the last
/// snapshot. This is the single source of truth the `JobQueue` operations
/// read and mutate through [`MaterializedState::apply_event`].
///
/// The waiting set is split across two lanes, mirroring a known pitfall
/// called out in the dispatch contract: `Priority::Normal` jobs live in a
/// plain FIFO (`waiting_fifo`), and every other priority lives in a
/// separate ordered index (`waiting_priority`). `lease_next`, `list`, and
/// `count_by_state` must consult both, never just one.
///
/// Both lanes are skipped by serde: `PriorityKey` is a multi-field struct
/// and serde_json cannot use one as a map key, and more fundamentally the
/// lanes are just an index over `jobs` — [`rebuild_waiting_index`] derives
/// them straight from job state rather than trusting a persisted copy.
///
/// [`rebuild_waiting_index`]: MaterializedState::rebuild_waiting_index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaterializedState {
    pub jobs: HashMap<JobId, Job>,
    #[serde(skip, default)]
    pub waiting_fifo: VecDeque<JobId>,
    #[serde(skip, default)]
    pub waiting_priority: BTreeMap<PriorityKey, JobId>,
    /// Whether dispatch is paused. Not event-sourced: this is ephemeral
    /// operator state, not a fact about any job, so it resets to `false`
    /// on restart rather than surviving WAL replay.
    #[serde(skip, default)]
    pub paused: bool,
}

impl MaterializedState {
    /// Get a job by id, or by unique id prefix (useful at the CLI).
    pub fn get_job(&self, id: &str) -> Option<&Job> {
        if let Some(job) = self.jobs.get(&JobId::new(id)) {
            return Some(job);
        }
        let matches: Vec<_> = self
            .jobs
            .iter()
            .filter(|(k, _)| k.as_str().starts_with(id))
            .collect();
        if matches.len() == 1 {
            Some(matches[0].1)
        } else {
            None
        }
    }

    fn priority_key(job: &Job) -> PriorityKey {
        PriorityKey {
            priority: job.priority,
            enqueued_at_ms: job.enqueued_at_ms,
            job_id: job.id.clone(),
        }
    }

    fn insert_into_waiting_index(&mut self, job: &Job) {
        match job.priority {
            Priority::Normal => {
                if !self.waiting_fifo.contains(&job.id) {
                    self.waiting_fifo.push_back(job.id.clone());
                }
            }
            _ => {
                self.waiting_priority.insert(Self::priority_key(job), job.id.clone());
            }
        }
    }

    fn remove_from_waiting_index(&mut self, job: &Job) {
        match job.priority {
            Priority::Normal => self.waiting_fifo.retain(|id| id != &job.id),
            _ => {
                self.waiting_priority.remove(&Self::priority_key(job));
            }
        }
    }

    /// Rebuild both waiting lanes from `jobs`. Neither lane is persisted
    /// (see the struct doc comment), so this must run once after loading a
    /// snapshot and replaying the WAL on top of it, before the queue serves
    /// its first `lease_next`.
    pub fn rebuild_waiting_index(&mut self) {
        self.waiting_fifo.clear();
        self.waiting_priority.clear();
        let mut waiting: Vec<Job> = self
            .jobs
            .values()
            .filter(|j| j.state == JobState::Waiting)
            .cloned()
            .collect();
        waiting.sort_by(|a, b| (a.enqueued_at_ms, &a.id).cmp(&(b.enqueued_at_ms, &b.id)));
        for job in &waiting {
            self.insert_into_waiting_index(job);
        }
    }

    /// Pick the id of the next job `lease_next` should hand out: the
    /// earliest-enqueued job at the best available priority, consulting
    /// both waiting lanes (§4.1 "Ordering guarantee").
    pub fn peek_next_waiting(&self) -> Option<JobId> {
        let best_priority_candidate = self
            .waiting_priority
            .iter()
            .next()
            .map(|(key, id)| (key.priority, id.clone()));

        match best_priority_candidate {
            Some((priority, id)) if priority < Priority::Normal => Some(id),
            _ => {
                if let Some(id) = self.waiting_fifo.front() {
                    Some(id.clone())
                } else {
                    best_priority_candidate.map(|(_, id)| id)
                }
            }
        }
    }

    /// All job ids currently in either waiting lane.
    pub fn waiting_ids(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self.waiting_fifo.iter().cloned().collect();
        ids.extend(self.waiting_priority.values().cloned());
        ids
    }

    pub fn count_by_state(&self) -> HashMap<JobState, usize> {
        let mut counts = HashMap::new();
        for job in self.jobs.values() {
            *counts.entry(job.state).or_insert(0) += 1;
        }
        counts
    }

    /// List job ids in a given state (or all states if `state` is `None`),
    /// ordered by dispatch order for `Waiting`, else by `enqueued_at_ms`.
    pub fn list_ids(&self, state: Option<JobState>) -> Vec<JobId> {
        match state {
            Some(JobState::Waiting) => self.waiting_ids(),
            Some(s) => {
                let mut ids: Vec<_> = self
                    .jobs
                    .values()
                    .filter(|j| j.state == s)
                    .map(|j| (j.enqueued_at_ms, j.id.clone()))
                    .collect();
                ids.sort();
                ids.into_iter().map(|(_, id)| id).collect()
            }
            None => {
                let mut ids: Vec<_> = self
                    .jobs
                    .values()
                    .map(|j| (j.enqueued_at_ms, j.id.clone()))
                    .collect();
                ids.sort();
                ids.into_iter().map(|(_, id)| id).collect()
            }
        }
    }

    /// Apply an event to derive state changes.
    ///
    /// All handlers MUST be idempotent: replaying the WAL after a crash
    /// must reproduce exactly the state that existed before the crash, not
    /// accumulate duplicate effects. Counters that an event advances (like
    /// `attempts_made` or `stalled_count`) are carried as the event's new
    /// total and assigned, never incremented, for this reason.
    pub fn apply_event(&mut self, event: &Event) {
        match event {
            Event::Enqueued {
                job_id,
                source_path,
                display_name,
                size_bytes,
                mtime_ms,
                priority,
                max_attempts,
                enqueued_at_ms,
            } => {
                if self.jobs.contains_key(job_id) {
                    return;
                }
                let job = Job::new_waiting(
                    job_id.clone(),
                    source_path.clone(),
                    display_name.clone(),
                    *size_bytes,
                    *mtime_ms,
                    *priority,
                    *max_attempts,
                    *enqueued_at_ms,
                );
                self.insert_into_waiting_index(&job);
                self.jobs.insert(job_id.clone(), job);
            }
            Event::Active {
                job_id,
                worker_id,
                lock_expires_at_ms,
                started_at_ms,
                attempts_made,
            } => {
                if let Some(job) = self.jobs.get_mut(job_id) {
                    if job.state != JobState::Active {
                        self.waiting_fifo.retain(|id| id != job_id);
                        let key = Self::priority_key(job);
                        self.waiting_priority.remove(&key);
                    }
                    job.state = JobState::Active;
                    job.lock_owner = Some(worker_id.clone());
                    job.lock_expires_at_ms = Some(*lock_expires_at_ms);
                    job.started_at_ms = Some(*started_at_ms);
                    job.attempts_made = *attempts_made;
                    job.error_code = None;
                    job.error_reason = None;
                }
            }
            Event::LeaseRenewed {
                job_id,
                worker_id,
                lock_expires_at_ms,
            } => {
                if let Some(job) = self.jobs.get_mut(job_id) {
                    if job.lock_owner.as_deref() == Some(worker_id.as_str()) {
                        job.lock_expires_at_ms = Some(*lock_expires_at_ms);
                    }
                }
            }
            Event::Completed {
                job_id,
                transcript_path,
                finished_at_ms,
            } => {
                if let Some(job) = self.jobs.get_mut(job_id) {
                    job.state = JobState::Completed;
                    job.transcript_path = Some(transcript_path.clone());
                    job.finished_at_ms = Some(*finished_at_ms);
                    job.error_code = None;
                    job.error_reason = None;
                    job.lock_owner = None;
                    job.lock_expires_at_ms = None;
                }
            }
            Event::Failed {
                job_id,
                error_code,
                error_reason,
                terminal,
                finished_at_ms,
            } => {
                if let Some(job) = self.jobs.get_mut(job_id) {
                    job.error_code = Some(*error_code);
                    job.error_reason = Some(error_reason.clone());
                    job.lock_owner = None;
                    job.lock_expires_at_ms = None;
                    if *terminal {
                        job.state = JobState::FailedTerminal;
                        job.finished_at_ms = Some(*finished_at_ms);
                    } else {
                        job.state = JobState::Waiting;
                        job.started_at_ms = None;
                        let job_clone = job.clone();
                        self.insert_into_waiting_index(&job_clone);
                    }
                }
            }
            Event::Stalled {
                job_id,
                terminal,
                stalled_count,
                finished_at_ms,
            } => {
                if let Some(job) = self.jobs.get_mut(job_id) {
                    job.stalled_count = *stalled_count;
                    job.error_code = Some(scriv_core::ErrorCode::ErrJobStalled);
                    job.error_reason = Some("lease expired without renewal".to_string());
                    job.lock_owner = None;
                    job.lock_expires_at_ms = None;
                    if *terminal {
                        job.state = JobState::FailedTerminal;
                        job.finished_at_ms = Some(*finished_at_ms);
                    } else {
                        job.state = JobState::Waiting;
                        job.started_at_ms = None;
                        let job_clone = job.clone();
                        self.insert_into_waiting_index(&job_clone);
                    }
                }
            }
            Event::Retried { job_id, .. } => {
                if let Some(job) = self.jobs.get_mut(job_id) {
                    if job.state == JobState::FailedTerminal {
                        job.state = JobState::Waiting;
                        job.error_code = None;
                        job.error_reason = None;
                        job.finished_at_ms = None;
                        let job_clone = job.clone();
                        self.insert_into_waiting_index(&job_clone);
                    }
                }
            }
            Event::Deleted { job_id } => {
                if let Some(job) = self.jobs.remove(job_id) {
                    self.remove_from_waiting_index(&job);
                }
            }
            Event::PriorityChanged { job_id, priority } => {
                if let Some(job) = self.jobs.get_mut(job_id) {
                    if matches!(job.state, JobState::Waiting | JobState::Delayed) {
                        let old = job.clone();
                        self.remove_from_waiting_index(&old);
                        job.priority = *priority;
                        let updated = job.clone();
                        self.insert_into_waiting_index(&updated);
                    } else {
                        job.priority = *priority;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
