// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `scriv daemon` — start/stop/restart/status for `scrivd` (§4.7).

use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};
use std::path::PathBuf;
use std::process::Command;

use crate::client::DaemonClient;
use crate::client_lifecycle::daemon_stop;
use crate::output::OutputFormat;

#[derive(Args)]
pub struct DaemonArgs {
    #[command(subcommand)]
    pub command: Option<DaemonCommand>,
}

#[derive(Subcommand)]
pub enum DaemonCommand {
    /// Start the daemon (foreground or background)
    Start {
        /// Run in foreground (useful for debugging)
        #[arg(long)]
        foreground: bool,
    },
    /// Stop the daemon
    Stop,
    /// Stop and restart the daemon
    Restart,
    /// Check daemon status
    Status,
}

pub async fn daemon(args: DaemonArgs, format: OutputFormat) -> Result<()> {
    match args.command {
        Some(DaemonCommand::Start { foreground }) => start(foreground).await,
        Some(DaemonCommand::Stop) => stop().await,
        Some(DaemonCommand::Restart) => restart().await,
        Some(DaemonCommand::Status) => status(format).await,
        None => {
            use clap::CommandFactory;
            crate::Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}

async fn start(foreground: bool) -> Result<()> {
    if foreground {
        let scrivd_path = find_scrivd_binary()?;
        let status = Command::new(&scrivd_path).status()?;
        if !status.success() {
            return Err(anyhow!("daemon exited with status: {status}"));
        }
        return Ok(());
    }

    if let Ok(client) = DaemonClient::connect() {
        if client.ping().await.is_ok() {
            println!("daemon already running");
            return Ok(());
        }
    }

    match DaemonClient::for_action() {
        Ok(_client) => {
            println!("daemon started");
            Ok(())
        }
        Err(e) => Err(anyhow!("{e}")),
    }
}

async fn stop() -> Result<()> {
    match daemon_stop().await {
        Ok(true) => {
            println!("daemon stopped");
            Ok(())
        }
        Ok(false) => {
            println!("daemon not running");
            Ok(())
        }
        Err(e) => Err(anyhow!("failed to stop daemon: {e}")),
    }
}

async fn restart() -> Result<()> {
    let was_running =
        daemon_stop().await.map_err(|e| anyhow!("failed to stop daemon: {e}"))?;

    if was_running {
        // grace period for the OS to release the Unix socket after exit.
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    }

    match DaemonClient::for_action() {
        Ok(_client) => {
            println!("daemon restarted");
            Ok(())
        }
        Err(e) => Err(anyhow!("{e}")),
    }
}

async fn status(format: OutputFormat) -> Result<()> {
    let not_running = || match format {
        OutputFormat::Text => {
            println!("daemon not running");
            Ok(())
        }
        OutputFormat::Json => {
            println!(r#"{{ "status": "not_running" }}"#);
            Ok(())
        }
    };

    let client = match DaemonClient::connect() {
        Ok(c) => c,
        Err(_) => return not_running(),
    };

    let version = match client.hello().await {
        Ok(v) => v,
        Err(crate::client::ClientError::DaemonNotRunning) => return not_running(),
        Err(crate::client::ClientError::Io(ref e))
            if matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionRefused | std::io::ErrorKind::NotFound
            ) =>
        {
            return not_running();
        }
        Err(e) => return Err(anyhow!("{e}")),
    };

    let counts = client.count_by_state().await.unwrap_or_default();

    match format {
        OutputFormat::Text => {
            println!("status: running");
            println!("version: {version}");
            for (state, n) in &counts {
                println!("{state}: {n}");
            }
        }
        OutputFormat::Json => {
            let by_state: Vec<(String, usize)> =
                counts.iter().map(|(s, n)| (s.to_string(), *n)).collect();
            let obj = serde_json::json!({
                "status": "running",
                "version": version,
                "jobs_by_state": by_state,
            });
            println!("{}", serde_json::to_string_pretty(&obj)?);
        }
    }

    Ok(())
}

fn find_scrivd_binary() -> Result<PathBuf> {
    if let Some(path) = crate::env::daemon_binary() {
        return Ok(PathBuf::from(path));
    }

    let current_exe = std::env::current_exe().ok();

    let is_debug_build = current_exe
        .as_ref()
        .and_then(|p| p.to_str())
        .map(|s| s.contains("target/debug"))
        .unwrap_or(false);

    if is_debug_build {
        if let Some(manifest_dir) = crate::env::cargo_manifest_dir() {
            let dev_path = PathBuf::from(manifest_dir)
                .parent()
                .and_then(|p| p.parent())
                .map(|p| p.join("target/debug/scrivd"));
            if let Some(path) = dev_path {
                if path.exists() {
                    return Ok(path);
                }
            }
        }
    }

    if let Some(ref exe) = current_exe {
        if let Some(dir) = exe.parent() {
            let sibling = dir.join("scrivd");
            if sibling.exists() {
                return Ok(sibling);
            }
        }
    }

    Ok(PathBuf::from("scrivd"))
}

#[cfg(test)]
#[path = "daemon_tests.rs"]
mod tests;
