//! Command runner: feeds shell command lines through a throttled queue

use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Local};
use eyre::Result;
use serde::Serialize;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::RunnerConfig;
use crate::queue::{DeferredError, DeferredQueue, QueueStats};

/// Why a command did not succeed
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to spawn {shell}: {source}")]
    Spawn {
        shell: String,
        #[source]
        source: std::io::Error,
    },

    #[error("exited with status {code:?}")]
    Exit { code: Option<i32>, started_ms: u64 },
}

/// What happened when a command's turn came up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Execution {
    Ran { started_ms: u64, exit_code: i32 },
    Skipped,
}

/// Final status of one command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommandStatus {
    Succeeded,
    Failed,
    Skipped,
}

/// Per-command report
#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    /// 1-based position in the input
    pub index: usize,
    pub command: String,
    pub status: CommandStatus,
    /// Milliseconds between the start of the run and this command starting
    #[serde(rename = "started-ms")]
    pub started_ms: Option<u64>,
    #[serde(rename = "exit-code")]
    pub exit_code: Option<i32>,
    pub error: Option<String>,
}

impl CommandReport {
    fn from_result(index: usize, command: String, result: Result<Execution, DeferredError<CommandError>>) -> Self {
        let mut report = Self {
            index,
            command,
            status: CommandStatus::Failed,
            started_ms: None,
            exit_code: None,
            error: None,
        };

        match result {
            Ok(Execution::Ran { started_ms, exit_code }) => {
                report.status = CommandStatus::Succeeded;
                report.started_ms = Some(started_ms);
                report.exit_code = Some(exit_code);
            }
            Ok(Execution::Skipped) => {
                report.status = CommandStatus::Skipped;
            }
            Err(DeferredError::Rejected(CommandError::Exit { code, started_ms })) => {
                report.started_ms = Some(started_ms);
                report.exit_code = code;
                report.error = Some(format!("exited with status {:?}", code));
            }
            Err(e) => {
                report.error = Some(e.to_string());
            }
        }
        report
    }
}

/// Outcome of a whole run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    #[serde(rename = "started-at")]
    pub started_at: DateTime<Local>,
    pub reports: Vec<CommandReport>,
    pub stats: QueueStats,
}

impl RunSummary {
    /// Number of commands that failed
    pub fn failed(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| r.status == CommandStatus::Failed)
            .count()
    }
}

/// Parse command lines, skipping blanks and `#` comments
pub fn parse_commands(input: &str) -> Vec<String> {
    input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Run every command through the queue, in order, and collect the reports
pub async fn run_commands(
    queue: &DeferredQueue,
    runner: &RunnerConfig,
    commands: Vec<String>,
    inherit_stdout: bool,
) -> Result<RunSummary> {
    info!(
        count = commands.len(),
        interval = ?queue.interval(),
        await_completion = queue.await_completion(),
        "Running commands"
    );
    let started_at = Local::now();
    let origin = Instant::now();
    let failed = Arc::new(AtomicBool::new(false));

    let mut submitted = Vec::with_capacity(commands.len());
    for (i, command) in commands.into_iter().enumerate() {
        let job = Job {
            shell: runner.shell.clone(),
            line: command.clone(),
            origin,
            failed: failed.clone(),
            stop_on_failure: runner.stop_on_failure,
            inherit_stdout,
        };
        let deferred = queue.submit(move || job.run())?;
        submitted.push((i + 1, command, deferred));
    }

    let mut reports = Vec::with_capacity(submitted.len());
    for (index, command, deferred) in submitted {
        reports.push(CommandReport::from_result(index, command, deferred.await));
    }

    let stats = queue.stats().await?;
    Ok(RunSummary {
        started_at,
        reports,
        stats,
    })
}

/// One command line waiting for its turn
struct Job {
    shell: String,
    line: String,
    origin: Instant,
    failed: Arc<AtomicBool>,
    stop_on_failure: bool,
    inherit_stdout: bool,
}

impl Job {
    async fn run(self) -> std::result::Result<Execution, CommandError> {
        if self.stop_on_failure && self.failed.load(Ordering::SeqCst) {
            debug!(line = %self.line, "Job::run: earlier command failed, skipping");
            return Ok(Execution::Skipped);
        }

        let started_ms = self.origin.elapsed().as_millis() as u64;
        debug!(line = %self.line, started_ms, "Job::run: starting");

        let stdout = if self.inherit_stdout { Stdio::inherit() } else { Stdio::null() };
        let status = Command::new(&self.shell)
            .arg("-c")
            .arg(&self.line)
            .stdin(Stdio::null())
            .stdout(stdout)
            .status()
            .await
            .map_err(|source| {
                self.failed.store(true, Ordering::SeqCst);
                CommandError::Spawn {
                    shell: self.shell.clone(),
                    source,
                }
            })?;

        if status.success() {
            Ok(Execution::Ran {
                started_ms,
                exit_code: status.code().unwrap_or(0),
            })
        } else {
            warn!(line = %self.line, code = ?status.code(), "Command failed");
            self.failed.store(true, Ordering::SeqCst);
            Err(CommandError::Exit {
                code: status.code(),
                started_ms,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_commands_skips_blanks_and_comments() {
        let input = "echo one\n\n  # a comment\n  echo two  \n#another\n";
        assert_eq!(parse_commands(input), vec!["echo one", "echo two"]);
    }

    #[test]
    fn test_report_from_exit_error() {
        let report = CommandReport::from_result(
            3,
            "false".to_string(),
            Err(DeferredError::Rejected(CommandError::Exit {
                code: Some(1),
                started_ms: 500,
            })),
        );
        assert_eq!(report.status, CommandStatus::Failed);
        assert_eq!(report.exit_code, Some(1));
        assert_eq!(report.started_ms, Some(500));
    }

    #[test]
    fn test_report_from_abandoned() {
        let report = CommandReport::from_result(1, "x".to_string(), Err(DeferredError::Abandoned));
        assert_eq!(report.status, CommandStatus::Failed);
        assert!(report.error.unwrap().contains("abandoned"));
    }

    #[tokio::test]
    async fn test_run_commands_reports_in_order() {
        let queue = DeferredQueue::new(Duration::from_millis(20), false);
        let commands = vec!["true".to_string(), "exit 3".to_string(), "true".to_string()];

        let summary = run_commands(&queue, &RunnerConfig::default(), commands, false)
            .await
            .unwrap();

        let statuses: Vec<_> = summary.reports.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![CommandStatus::Succeeded, CommandStatus::Failed, CommandStatus::Succeeded]
        );
        assert_eq!(summary.reports[1].exit_code, Some(3));
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.stats.total_dispatched, 3);

        for (i, report) in summary.reports.iter().enumerate() {
            assert!(report.started_ms.unwrap() >= 20 * i as u64);
        }
    }

    #[tokio::test]
    async fn test_stop_on_failure_skips_later_commands() {
        let queue = DeferredQueue::new(Duration::from_millis(10), true);
        let runner = RunnerConfig {
            stop_on_failure: true,
            ..Default::default()
        };
        let commands = vec!["exit 1".to_string(), "true".to_string(), "true".to_string()];

        let summary = run_commands(&queue, &runner, commands, false).await.unwrap();

        assert_eq!(summary.reports[0].status, CommandStatus::Failed);
        assert_eq!(summary.reports[1].status, CommandStatus::Skipped);
        assert_eq!(summary.reports[2].status, CommandStatus::Skipped);
    }

    #[tokio::test]
    async fn test_empty_run_is_a_full_summary() {
        let queue = DeferredQueue::new(Duration::from_millis(10), false);

        let summary = run_commands(&queue, &RunnerConfig::default(), Vec::new(), false)
            .await
            .unwrap();

        assert!(summary.reports.is_empty());
        assert_eq!(summary.failed(), 0);
        assert_eq!(summary.stats, QueueStats::default());

        let json = serde_json::to_value(&summary).unwrap();
        assert!(json["started-at"].is_string());
        assert_eq!(json["stats"]["total-dispatched"], 0);
    }

    #[tokio::test]
    async fn test_missing_shell_is_reported() {
        let queue = DeferredQueue::new(Duration::ZERO, false);
        let runner = RunnerConfig {
            shell: "/nonexistent/shell".to_string(),
            ..Default::default()
        };

        let summary = run_commands(&queue, &runner, vec!["true".to_string()], false)
            .await
            .unwrap();

        assert_eq!(summary.reports[0].status, CommandStatus::Failed);
        assert!(summary.reports[0].error.as_ref().unwrap().contains("failed to spawn"));
    }
}
