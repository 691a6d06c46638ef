// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `scriv` job-queue commands: list/get/count/retry/delete/set-priority/
//! requeue/health/reconcile — the control-surface operations of §4.6.

use anyhow::{anyhow, Result};
use clap::Args;

use scriv_core::job::{Job, JobState, Priority};

use crate::client::DaemonClient;
use crate::color;
use crate::output::{format_time_ago, OutputFormat};
use crate::table::{Column, Table};

#[derive(Args)]
pub struct ListArgs {
    /// Filter by job state
    #[arg(long, value_parser = parse_job_state)]
    pub state: Option<JobState>,
    /// Number of jobs to skip
    #[arg(long, default_value_t = 0)]
    pub offset: usize,
    /// Maximum number of jobs to show
    #[arg(short = 'n', long, default_value_t = 50)]
    pub limit: usize,
}

#[derive(Args)]
pub struct IdArg {
    /// Job ID, or a unique prefix of one
    pub id: String,
}

#[derive(Args)]
pub struct SetPriorityArgs {
    /// Job ID, or a unique prefix of one
    pub id: String,
    /// New priority
    #[arg(value_parser = parse_priority)]
    pub priority: Priority,
}

fn parse_job_state(s: &str) -> Result<JobState, String> {
    match s {
        "waiting" => Ok(JobState::Waiting),
        "delayed" => Ok(JobState::Delayed),
        "active" => Ok(JobState::Active),
        "completed" => Ok(JobState::Completed),
        "failed_terminal" | "failed" => Ok(JobState::FailedTerminal),
        other => Err(format!(
            "invalid state '{other}' (expected one of: waiting, delayed, active, completed, failed_terminal)"
        )),
    }
}

fn parse_priority(s: &str) -> Result<Priority, String> {
    match s {
        "urgent" => Ok(Priority::Urgent),
        "high" => Ok(Priority::High),
        "normal" => Ok(Priority::Normal),
        "low" => Ok(Priority::Low),
        other => Err(format!("invalid priority '{other}' (expected one of: urgent, high, normal, low)")),
    }
}

/// Resolve a user-supplied id or unique prefix to a full job id, by
/// listing every job and matching on the id's prefix. Errors if zero or
/// more than one job matches.
async fn resolve_job_id(client: &DaemonClient, prefix: &str) -> Result<String> {
    let jobs = client.list(None, 0, usize::MAX).await?;
    let matches: Vec<&Job> = jobs.iter().filter(|j| j.id.as_str().starts_with(prefix)).collect();
    match matches.as_slice() {
        [] => Err(anyhow!("no job matches '{prefix}'")),
        [job] => Ok(job.id.as_str().to_string()),
        _ => Err(anyhow!("'{prefix}' matches {} jobs, use a longer prefix", matches.len())),
    }
}

pub async fn list(args: ListArgs, client: &DaemonClient, format: OutputFormat) -> Result<()> {
    let jobs = client.list(args.state, args.offset, args.limit).await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&jobs)?);
        }
        OutputFormat::Text => {
            if jobs.is_empty() {
                println!("{}", color::muted("no jobs"));
                return Ok(());
            }
            let mut table = Table::new(vec![
                Column::left("ID").with_max(12),
                Column::left("NAME"),
                Column::status("STATE"),
                Column::left("PRIORITY"),
                Column::right("ATTEMPTS"),
                Column::left("ENQUEUED"),
            ]);
            for job in &jobs {
                table.row(vec![
                    job.id.short(12).to_string(),
                    job.display_name.clone(),
                    job.state.to_string(),
                    job.priority.to_string(),
                    format!("{}/{}", job.attempts_made, job.max_attempts),
                    format_time_ago(job.enqueued_at_ms),
                ]);
            }
            table.render(&mut std::io::stdout());
        }
    }
    Ok(())
}

pub async fn count(client: &DaemonClient, format: OutputFormat) -> Result<()> {
    let counts = client.count_by_state().await?;
    match format {
        OutputFormat::Json => {
            let as_pairs: Vec<(String, usize)> =
                counts.iter().map(|(s, n)| (s.to_string(), *n)).collect();
            println!("{}", serde_json::to_string_pretty(&as_pairs)?);
        }
        OutputFormat::Text => {
            if counts.is_empty() {
                println!("{}", color::muted("no jobs"));
                return Ok(());
            }
            let mut table = Table::new(vec![Column::status("STATE"), Column::right("COUNT")]);
            for (state, n) in &counts {
                table.row(vec![state.to_string(), n.to_string()]);
            }
            table.render(&mut std::io::stdout());
        }
    }
    Ok(())
}

pub async fn get(args: IdArg, client: &DaemonClient, format: OutputFormat) -> Result<()> {
    let id = resolve_job_id(client, &args.id).await?;
    let job = client.get(&id).await?.ok_or_else(|| anyhow!("job '{id}' not found"))?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&job)?),
        OutputFormat::Text => print_job_detail(&job),
    }
    Ok(())
}

fn print_job_detail(job: &Job) {
    println!("{}: {}", color::header("id"), job.id);
    println!("{}: {}", color::header("name"), job.display_name);
    println!("{}: {}", color::header("source"), job.source_path);
    println!("{}: {}", color::header("state"), color::status(&job.state.to_string()));
    println!("{}: {}", color::header("priority"), job.priority);
    println!("{}: {}/{}", color::header("attempts"), job.attempts_made, job.max_attempts);
    println!("{}: {}", color::header("stalled_count"), job.stalled_count);
    println!("{}: {}", color::header("enqueued"), format_time_ago(job.enqueued_at_ms));
    if let Some(started) = job.started_at_ms {
        println!("{}: {}", color::header("started"), format_time_ago(started));
    }
    if let Some(finished) = job.finished_at_ms {
        println!("{}: {}", color::header("finished"), format_time_ago(finished));
    }
    if let Some(transcript) = &job.transcript_path {
        println!("{}: {}", color::header("transcript"), transcript);
    }
    if let Some(code) = job.error_code {
        println!("{}: {}", color::header("error_code"), code);
    }
    if let Some(reason) = &job.error_reason {
        println!("{}: {}", color::header("error_reason"), reason);
    }
}

pub async fn health(args: IdArg, client: &DaemonClient, format: OutputFormat) -> Result<()> {
    let id = resolve_job_id(client, &args.id).await?;
    let status = client.get_health(&id).await?.ok_or_else(|| anyhow!("job '{id}' not found"))?;

    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({ "status": status.to_string() }))?
        ),
        OutputFormat::Text => println!("{}", color::status(&status.to_string())),
    }
    Ok(())
}

pub async fn retry(args: IdArg, client: &DaemonClient) -> Result<()> {
    let id = resolve_job_id(client, &args.id).await?;
    client.retry(&id).await?;
    println!("retrying {id}");
    Ok(())
}

pub async fn delete(args: IdArg, client: &DaemonClient) -> Result<()> {
    let id = resolve_job_id(client, &args.id).await?;
    client.delete(&id).await?;
    println!("deleted {id}");
    Ok(())
}

pub async fn set_priority(args: SetPriorityArgs, client: &DaemonClient) -> Result<()> {
    let id = resolve_job_id(client, &args.id).await?;
    client.set_priority(&id, args.priority).await?;
    println!("set priority of {id} to {}", args.priority);
    Ok(())
}

pub async fn requeue(args: IdArg, client: &DaemonClient) -> Result<()> {
    let id = resolve_job_id(client, &args.id).await?;
    client.reactive_requeue(&id).await?;
    println!("requeued {id}");
    Ok(())
}

pub async fn reconcile(client: &DaemonClient, format: OutputFormat) -> Result<()> {
    let report = client.reconcile().await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => println!(
            "scanned {} files, created {} jobs, reconciled {} in-flight jobs, deleted {} partial artifacts ({}ms)",
            report.files_scanned,
            report.jobs_created,
            report.jobs_reconciled,
            report.partial_files_deleted,
            report.duration_ms,
        ),
    }
    Ok(())
}

pub async fn ping(client: &DaemonClient) -> Result<()> {
    client.ping().await?;
    println!("pong");
    Ok(())
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
