// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! scriv - control-surface CLI for the scrivd transcription dispatcher.

mod client;
mod client_lifecycle;
mod color;
mod commands;
mod daemon_process;
mod env;
mod output;
mod table;

use output::OutputFormat;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{daemon, job};

use crate::client::DaemonClient;

#[derive(Parser)]
#[command(
    name = "scriv",
    version,
    about = "Control surface for the scrivd transcription dispatcher"
)]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, default_value_t, global = true)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Daemon management
    Daemon(daemon::DaemonArgs),
    /// Liveness check
    Ping,
    /// Trigger an on-demand reconciliation pass
    Reconcile,
    /// List jobs
    List(job::ListArgs),
    /// Count jobs grouped by state
    Count,
    /// Show details of a job
    Get(job::IdArg),
    /// Show a job's computed health status
    Health(job::IdArg),
    /// Retry a job
    Retry(job::IdArg),
    /// Delete a job's record
    Delete(job::IdArg),
    /// Change a waiting job's dispatch priority
    SetPriority(job::SetPriorityArgs),
    /// Requeue a job reactively
    Requeue(job::IdArg),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        let msg = format_error(&e);
        if !msg.is_empty() {
            eprintln!("error: {msg}");
        }
        std::process::exit(1);
    }
}

/// Format an anyhow error, deduplicating the chain.
///
/// If the top-level Display already contains the source error text, we skip
/// the "Caused by" chain to avoid noisy duplicate output (common when
/// thiserror variants use `#[error("... {0}")]` with `#[from]`).
/// Otherwise we render the full chain so context isn't lost.
fn format_error(err: &anyhow::Error) -> String {
    let top = err.to_string();

    let chain_redundant = err.chain().skip(1).all(|cause| top.contains(&cause.to_string()));

    if chain_redundant {
        return top;
    }

    let mut buf = top;
    for (i, cause) in err.chain().skip(1).enumerate() {
        buf.push_str(&format!("\n\nCaused by:\n    {i}: {cause}"));
    }
    buf
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let format = cli.output;

    let command = match cli.command {
        Some(cmd) => cmd,
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
            return Ok(());
        }
    };

    // Daemon management doesn't need an existing connection.
    if let Commands::Daemon(args) = command {
        return daemon::daemon(args, format).await;
    }

    // Dispatch: action commands (mutate queue state) auto-start the daemon;
    // query commands (read-only) connect only.
    match command {
        Commands::Daemon(_) => unreachable!("handled above"),
        Commands::Ping => {
            let client = DaemonClient::for_query()?;
            job::ping(&client).await?
        }
        Commands::Reconcile => {
            let client = DaemonClient::for_action()?;
            job::reconcile(&client, format).await?
        }
        Commands::List(args) => {
            let client = DaemonClient::for_query()?;
            job::list(args, &client, format).await?
        }
        Commands::Count => {
            let client = DaemonClient::for_query()?;
            job::count(&client, format).await?
        }
        Commands::Get(args) => {
            let client = DaemonClient::for_query()?;
            job::get(args, &client, format).await?
        }
        Commands::Health(args) => {
            let client = DaemonClient::for_query()?;
            job::health(args, &client, format).await?
        }
        Commands::Retry(args) => {
            let client = DaemonClient::for_action()?;
            job::retry(args, &client).await?
        }
        Commands::Delete(args) => {
            let client = DaemonClient::for_action()?;
            job::delete(args, &client).await?
        }
        Commands::SetPriority(args) => {
            let client = DaemonClient::for_action()?;
            job::set_priority(args, &client).await?
        }
        Commands::Requeue(args) => {
            let client = DaemonClient::for_action()?;
            job::requeue(args, &client).await?
        }
    }

    Ok(())
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
