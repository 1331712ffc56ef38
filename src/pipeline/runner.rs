//! External tool execution with captured output and a wall-clock limit.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;

use crate::domain::Secret;
use crate::error::{ReleaseError, Result};

/// A command line to execute for a stage
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub secret_env: Vec<(String, Secret)>,
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    /// Build from an argv vector; the first element is the executable.
    pub fn from_argv(argv: &[String]) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| ReleaseError::config("command must not be empty"))?;
        Ok(CommandSpec {
            program: program.clone(),
            args: args.to_vec(),
            cwd: None,
            env: Vec::new(),
            secret_env: Vec::new(),
            timeout: None,
        })
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn secret(mut self, key: impl Into<String>, value: Secret) -> Self {
        self.secret_env.push((key.into(), value));
        self
    }

    /// Zero seconds means no limit.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = (secs > 0).then(|| Duration::from_secs(secs));
        self
    }

    /// The command line for display; secrets are never part of it.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(|a| a.as_str()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Result of a finished command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code, -1 when killed by a signal
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Last `lines` lines of stderr (or stdout when stderr is empty).
    pub fn tail(&self, lines: usize) -> String {
        let source = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        let all: Vec<&str> = source.lines().collect();
        let start = all.len().saturating_sub(lines);
        all[start..].join("\n")
    }
}

/// Run `spec` to completion.
///
/// Spawn failures and timeouts are errors; a non-zero exit is not, the caller
/// decides what it means. A timed-out child is killed.
pub async fn run_command(spec: &CommandSpec) -> Result<CommandOutput> {
    let start = Instant::now();

    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = &spec.cwd {
        command.current_dir(cwd);
    }
    for (key, value) in &spec.env {
        command.env(key, value);
    }
    for (key, value) in &spec.secret_env {
        command.env(key, value.expose());
    }

    tracing::debug!(command = %spec.display(), "spawning");
    let child = command.spawn().map_err(|e| {
        ReleaseError::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {}", spec.program, e),
        ))
    })?;

    let output = match spec.timeout {
        Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| {
                ReleaseError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("{} timed out after {} seconds", spec.program, limit.as_secs()),
                ))
            })??,
        None => child.wait_with_output().await?,
    };

    let result = CommandOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        duration: start.elapsed(),
    };
    tracing::debug!(
        command = %spec.display(),
        exit_code = result.exit_code,
        duration_ms = result.duration.as_millis() as u64,
        "finished"
    );
    Ok(result)
}
