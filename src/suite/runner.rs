use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use super::result::{Counts, InvocationRecord, SuiteStatus};
use crate::error::HarnessError;

/// Characters of captured output kept per stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputLimit {
    pub stdout: usize,
    pub stderr: usize,
}

impl OutputLimit {
    pub const fn new(stdout: usize, stderr: usize) -> Self {
        Self { stdout, stderr }
    }
}

/// One bounded subprocess run of the test runner.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub target: String,
    /// Program followed by its fixed arguments.
    pub command: Vec<String>,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub timeout: Duration,
    /// Structured report the invocation is expected to write.
    pub report_path: Option<PathBuf>,
    pub output_limit: OutputLimit,
}

/// What happened to the process, before any normalization.
#[derive(Debug)]
pub enum RunOutcome {
    Exited {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    TimedOut,
    Failed(HarnessError),
}

/// Run the invocation to completion or until its timeout, killing the
/// child in the latter case.
pub async fn run_invocation(invocation: &Invocation) -> RunOutcome {
    let Some((program, fixed_args)) = invocation.command.split_first() else {
        return RunOutcome::Failed(HarnessError::Invocation {
            target: invocation.target.clone(),
            message: "empty test runner command".into(),
        });
    };

    if let Some(report) = &invocation.report_path {
        if let Err(e) = prepare_report_path(report) {
            return RunOutcome::Failed(HarnessError::Invocation {
                target: invocation.target.clone(),
                message: format!("failed to prepare report {}: {}", report.display(), e),
            });
        }
    }

    debug!(invocation = %invocation.target, program = %program, args = ?invocation.args, "spawning");
    let child = Command::new(program)
        .args(fixed_args)
        .args(&invocation.args)
        .current_dir(&invocation.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let child = match child {
        Ok(child) => child,
        Err(e) => {
            return RunOutcome::Failed(HarnessError::Invocation {
                target: invocation.target.clone(),
                message: format!("failed to start {}: {}", program, e),
            })
        }
    };

    // Dropping the wait future on timeout drops the child, which kills it.
    match tokio::time::timeout(invocation.timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => RunOutcome::Exited {
            code: output.status.code(),
            stdout: truncate(
                &String::from_utf8_lossy(&output.stdout),
                invocation.output_limit.stdout,
            ),
            stderr: truncate(
                &String::from_utf8_lossy(&output.stderr),
                invocation.output_limit.stderr,
            ),
        },
        Ok(Err(e)) => RunOutcome::Failed(HarnessError::Invocation {
            target: invocation.target.clone(),
            message: e.to_string(),
        }),
        Err(_) => {
            warn!(
                invocation = %invocation.target,
                timeout_secs = invocation.timeout.as_secs_f64(),
                "invocation timed out"
            );
            RunOutcome::TimedOut
        }
    }
}

/// Remove a stale report so a previous run is never read back.
fn prepare_report_path(report: &Path) -> std::io::Result<()> {
    if let Some(parent) = report.parent() {
        std::fs::create_dir_all(parent)?;
    }
    match std::fs::remove_file(report) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[derive(Debug, Deserialize)]
struct StructuredReport {
    summary: ReportSummary,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ReportSummary {
    total: u32,
    passed: u32,
    failed: u32,
    skipped: u32,
    error: u32,
}

/// Counts from a pytest-json-report file; errors count as failures.
pub fn read_structured_report(path: &Path) -> Option<Counts> {
    let content = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<StructuredReport>(&content) {
        Ok(report) => {
            let s = report.summary;
            Some(Counts {
                total: s.total,
                passed: s.passed,
                failed: s.failed + s.error,
                skipped: s.skipped,
            })
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "unparsable structured report");
            None
        }
    }
}

/// Normalize using the structured report as the only source of counts.
/// Without one the invocation is indeterminate rather than guessed.
pub fn reported_record(invocation: &Invocation, outcome: RunOutcome) -> InvocationRecord {
    match outcome {
        RunOutcome::Exited {
            code,
            stdout,
            stderr,
        } => {
            let counts = invocation
                .report_path
                .as_deref()
                .and_then(read_structured_report);
            let (status, counts, error) = match counts {
                Some(counts) if counts.failed > 0 => (SuiteStatus::Failed, counts, None),
                Some(counts) => (SuiteStatus::Passed, counts, None),
                None => (
                    SuiteStatus::Indeterminate,
                    Counts::default(),
                    Some("no structured report produced".to_string()),
                ),
            };
            InvocationRecord {
                target: invocation.target.clone(),
                status,
                counts,
                return_code: code,
                stdout,
                stderr,
                error,
            }
        }
        other => failure_record(invocation, other),
    }
}

/// Normalize using only the exit code: 0 passes, anything else fails.
pub fn exit_code_record(invocation: &Invocation, outcome: RunOutcome) -> InvocationRecord {
    match outcome {
        RunOutcome::Exited {
            code,
            stdout,
            stderr,
        } => {
            let passed = code == Some(0);
            InvocationRecord {
                target: invocation.target.clone(),
                status: if passed {
                    SuiteStatus::Passed
                } else {
                    SuiteStatus::Failed
                },
                counts: if passed {
                    Counts::single_pass()
                } else {
                    Counts::single_failure()
                },
                return_code: code,
                stdout,
                stderr,
                error: None,
            }
        }
        other => failure_record(invocation, other),
    }
}

fn failure_record(invocation: &Invocation, outcome: RunOutcome) -> InvocationRecord {
    let (status, error) = match outcome {
        RunOutcome::TimedOut => (
            SuiteStatus::Timeout,
            HarnessError::InvocationTimeout {
                target: invocation.target.clone(),
                limit: invocation.timeout,
            }
            .to_string(),
        ),
        RunOutcome::Failed(e) => (SuiteStatus::Error, e.to_string()),
        RunOutcome::Exited { .. } => (SuiteStatus::Error, "unexpected exit".to_string()),
    };
    InvocationRecord {
        target: invocation.target.clone(),
        status,
        counts: Counts::single_failure(),
        return_code: None,
        stdout: String::new(),
        stderr: String::new(),
        error: Some(error),
    }
}

/// Keep at most `limit` characters, cutting on a character boundary.
pub fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
