//! Test helpers for behavioral specifications.
//!
//! Provides a high-level DSL for testing `scriv`/`scrivd` CLI behavior.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

// Aggressive timeouts for fast tests.
//
// IMPORTANT:
//   Do NOT change these.
//   File a performance bug instead.
const SCRIV_TIMEOUT_CONNECT_MS: &str = "2000";
const SCRIV_TIMEOUT_EXIT_MS: &str = "500";
const SCRIV_TIMEOUT_IPC_MS: &str = "500";
const SCRIV_CONNECT_POLL_MS: &str = "5";

// Spec polling timeouts
pub const SPEC_POLL_INTERVAL_MS: u64 = 10;
pub const SPEC_WAIT_MAX_MS: u64 = 2000;

/// Returns the path to a binary, checking the llvm-cov target directory
/// first. Falls back to resolving relative to the test binary itself when
/// CARGO_MANIFEST_DIR is stale (e.g. compiled by a removed worktree into a
/// shared target directory).
fn binary_path(name: &str) -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));

    let llvm_cov_path = manifest_dir.join("target/llvm-cov-target/debug").join(name);
    if llvm_cov_path.exists() {
        return llvm_cov_path;
    }

    let standard = manifest_dir.join("target/debug").join(name);
    if standard.exists() {
        return standard;
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(debug_dir) = exe.parent().and_then(|d| d.parent()) {
            let fallback = debug_dir.join(name);
            if fallback.exists() {
                return fallback;
            }
        }
    }

    standard
}

fn scriv_binary() -> PathBuf {
    binary_path("scriv")
}

/// Returns the path to the scrivd daemon binary.
pub fn scrivd_binary() -> PathBuf {
    binary_path("scrivd")
}

/// Returns a Command configured to run the scriv binary.
pub fn scriv_cmd() -> Command {
    Command::new(scriv_binary())
}

/// Create a CLI builder for scriv commands.
pub fn cli() -> CliBuilder {
    CliBuilder::new()
}

/// High-level CLI builder for fluent test assertions.
pub struct CliBuilder {
    args: Vec<String>,
    dir: Option<PathBuf>,
    envs: Vec<(String, String)>,
}

impl CliBuilder {
    fn new() -> Self {
        Self {
            args: Vec::new(),
            dir: None,
            envs: vec![
                ("SCRIV_DAEMON_BINARY".into(), scrivd_binary().to_string_lossy().into()),
                ("SCRIV_TIMEOUT_CONNECT_MS".into(), SCRIV_TIMEOUT_CONNECT_MS.into()),
                ("SCRIV_TIMEOUT_EXIT_MS".into(), SCRIV_TIMEOUT_EXIT_MS.into()),
                ("SCRIV_TIMEOUT_IPC_MS".into(), SCRIV_TIMEOUT_IPC_MS.into()),
                ("SCRIV_CONNECT_POLL_MS".into(), SCRIV_CONNECT_POLL_MS.into()),
            ],
        }
    }

    /// Add CLI arguments.
    pub fn args(mut self, args: &[&str]) -> Self {
        self.args.extend(args.iter().map(|s| s.to_string()));
        self
    }

    /// Set working directory.
    pub fn pwd(mut self, path: impl Into<PathBuf>) -> Self {
        self.dir = Some(path.into());
        self
    }

    /// Set an environment variable.
    pub fn env(mut self, key: &str, value: impl AsRef<Path>) -> Self {
        self.envs.push((key.to_string(), value.as_ref().to_string_lossy().to_string()));
        self
    }

    /// Build the command without running it.
    pub fn command(self) -> Command {
        let mut cmd = scriv_cmd();
        cmd.args(&self.args);

        if let Some(dir) = self.dir {
            cmd.current_dir(dir);
        }

        for (key, value) in self.envs {
            cmd.env(key, value);
        }

        cmd
    }

    /// Run and expect success (exit code 0).
    pub fn passes(self) -> RunAssert {
        let mut cmd = self.command();
        let output = cmd.output().expect("command should run");
        assert!(
            output.status.success(),
            "expected command to pass, got exit code {:?}\nstdout: {}\nstderr: {}",
            output.status.code(),
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        RunAssert { output }
    }

    /// Run and expect failure (non-zero exit code).
    pub fn fails(self) -> RunAssert {
        let mut cmd = self.command();
        let output = cmd.output().expect("command should run");
        assert!(
            !output.status.success(),
            "expected command to fail, but it passed\nstdout: {}\nstderr: {}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        RunAssert { output }
    }
}

/// Result of a CLI run, for chaining assertions.
pub struct RunAssert {
    output: Output,
}

impl RunAssert {
    pub fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.output.stdout).into_owned()
    }

    pub fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.output.stderr).into_owned()
    }

    /// Assert stdout equals expected exactly (with diff on failure).
    pub fn stdout_eq(self, expected: &str) -> Self {
        let stdout = self.stdout();
        similar_asserts::assert_eq!(stdout, expected);
        self
    }

    pub fn stderr_eq(self, expected: &str) -> Self {
        let stderr = self.stderr();
        similar_asserts::assert_eq!(stderr, expected);
        self
    }

    pub fn stdout_has(self, expected: &str) -> Self {
        let stdout = self.stdout();
        assert!(stdout.contains(expected), "stdout does not contain '{}'\nstdout: {}", expected, stdout);
        self
    }

    pub fn stdout_lacks(self, unexpected: &str) -> Self {
        let stdout = self.stdout();
        assert!(!stdout.contains(unexpected), "stdout should not contain '{}'\nstdout: {}", unexpected, stdout);
        self
    }

    pub fn stderr_has(self, expected: &str) -> Self {
        let stderr = self.stderr();
        assert!(stderr.contains(expected), "stderr does not contain '{}'\nstderr: {}", expected, stderr);
        self
    }

    pub fn stderr_lacks(self, unexpected: &str) -> Self {
        let stderr = self.stderr();
        assert!(!stderr.contains(unexpected), "stderr should not contain '{}'\nstderr: {}", unexpected, stderr);
        self
    }
}

// =============================================================================
// Polling
// =============================================================================

/// Poll a condition until it returns true or timeout is reached.
pub fn wait_for<F>(timeout_ms: u64, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    let timeout = std::time::Duration::from_millis(timeout_ms);
    let poll_interval = std::time::Duration::from_millis(SPEC_POLL_INTERVAL_MS);

    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        std::thread::sleep(poll_interval);
    }
    false
}

// =============================================================================
// Project
// =============================================================================

/// An isolated scrivd deployment: a state directory plus the four
/// directory trees a job config needs (watch/output/completed/failed),
/// each its own tempdir so relocations across them are real filesystem
/// moves rather than same-directory renames.
pub struct Project {
    state_dir: tempfile::TempDir,
    watch_dir: tempfile::TempDir,
    output_dir: tempfile::TempDir,
    completed_dir: tempfile::TempDir,
    failed_dir: tempfile::TempDir,
}

impl Project {
    /// Create a project with a fresh job config pointed at isolated
    /// temp directories.
    pub fn empty() -> Self {
        let project = Self {
            state_dir: tempfile::tempdir().unwrap(),
            watch_dir: tempfile::tempdir().unwrap(),
            output_dir: tempfile::tempdir().unwrap(),
            completed_dir: tempfile::tempdir().unwrap(),
            failed_dir: tempfile::tempdir().unwrap(),
        };
        project.write_config();
        project
    }

    fn write_config(&self) {
        // `{input}`/`{output_dir}` are the executor's own substitution
        // placeholders (§9 subprocess_command_template), not format! args,
        // hence the doubled braces below.
        let config = format!(
            r#"watch_directory = {:?}
output_directory = {:?}
completed_directory = {:?}
failed_directory = {:?}
supported_formats = ["mp3", "wav"]
min_file_size = 1
max_workers = 2
max_attempts = 3
lease_duration_ms = 2000
renewal_interval_ms = 500
stall_scan_interval_ms = 500
max_stalled_count = 2
shutdown_timeout_ms = 2000
subprocess_command_template = ["sh", "-c", 'stem=$(basename "{{input}}"); stem="${{stem%.*}}"; echo transcript > "{{output_dir}}/$stem.txt"']
reconcile_depth = 3
watch_debounce_ms = 50
"#,
            self.watch_dir.path(),
            self.output_dir.path(),
            self.completed_dir.path(),
            self.failed_dir.path(),
        );
        std::fs::write(self.state_dir.path().join("config.toml"), config).unwrap();
    }

    pub fn watch_path(&self) -> &Path {
        self.watch_dir.path()
    }

    pub fn state_path(&self) -> &Path {
        self.state_dir.path()
    }

    pub fn completed_path(&self) -> &Path {
        self.completed_dir.path()
    }

    pub fn failed_path(&self) -> &Path {
        self.failed_dir.path()
    }

    /// Drop a fixture file into the watch directory (parent dirs created
    /// automatically), as if dropped there by whatever produces audio.
    pub fn file(&self, name: &str, content: &[u8]) -> PathBuf {
        let path = self.watch_dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    /// Run a scriv command scoped to this project's state directory.
    pub fn scriv(&self) -> CliBuilder {
        cli().env("SCRIV_STATE_DIR", self.state_path())
    }

    /// Read the daemon log file contents (for debugging test failures).
    pub fn daemon_log(&self) -> String {
        let log_path = self.state_path().join("daemon.log");
        std::fs::read_to_string(&log_path).unwrap_or_else(|_| "(no daemon log)".to_string())
    }

    /// Kill the daemon with SIGKILL (simulates a crash).
    /// Returns true if the process was found and killed.
    pub fn daemon_kill(&self) -> bool {
        let pid_file = self.state_path().join("daemon.pid");
        let Ok(content) = std::fs::read_to_string(&pid_file) else {
            return false;
        };
        let Ok(pid) = content.trim().parse::<u32>() else {
            return false;
        };
        Command::new("kill")
            .args(["-9", &pid.to_string()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

impl Drop for Project {
    fn drop(&mut self) {
        let mut cmd = self.scriv().args(&["daemon", "stop"]).command();
        cmd.stdout(Stdio::null()).stderr(Stdio::null());
        let _ = cmd.status();
    }
}
