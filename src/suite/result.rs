use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Status of a suite, a check, or a single invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuiteStatus {
    #[default]
    Pending,
    Passed,
    Failed,
    Error,
    Timeout,
    Skipped,
    /// Finished without a structured report; counts are unknown.
    Indeterminate,
}

impl SuiteStatus {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Passed => "PASSED",
            Self::Failed => "FAILED",
            Self::Error => "ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Skipped => "SKIPPED",
            Self::Indeterminate => "INDETERMINATE",
        }
    }
}

/// total/passed/failed/skipped as reported by one unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Counts {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
}

impl Counts {
    pub fn single_pass() -> Self {
        Self {
            total: 1,
            passed: 1,
            ..Self::default()
        }
    }

    pub fn single_failure() -> Self {
        Self {
            total: 1,
            failed: 1,
            ..Self::default()
        }
    }

    pub fn add(&mut self, other: Counts) {
        self.total += other.total;
        self.passed += other.passed;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }
}

/// One subprocess invocation of the test runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRecord {
    pub target: String,
    pub status: SuiteStatus,
    pub counts: Counts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_code: Option<i32>,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub stdout: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub stderr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A benchmark measured against a fixed threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub value: f64,
    pub threshold: f64,
    pub unit: String,
    pub status: SuiteStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl BenchmarkResult {
    /// Latency style: passes while strictly under the threshold.
    pub fn lower_is_better(value: f64, threshold: f64, unit: impl Into<String>) -> Self {
        Self {
            value,
            threshold,
            unit: unit.into(),
            status: if value < threshold {
                SuiteStatus::Passed
            } else {
                SuiteStatus::Failed
            },
            note: None,
        }
    }

    /// Throughput style: passes at or above the threshold.
    pub fn higher_is_better(value: f64, threshold: f64, unit: impl Into<String>) -> Self {
        Self {
            value,
            threshold,
            unit: unit.into(),
            status: if value >= threshold {
                SuiteStatus::Passed
            } else {
                SuiteStatus::Failed
            },
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn failed_with(mut self, note: impl Into<String>) -> Self {
        self.status = SuiteStatus::Failed;
        self.note = Some(note.into());
        self
    }
}

/// Outcome of a single request fired by a security check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeRecord {
    pub input: String,
    pub status: SuiteStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// An independently scored security check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub status: SuiteStatus,
    pub counts: Counts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub probes: Vec<ProbeRecord>,
}

impl CheckResult {
    pub fn new() -> Self {
        Self {
            status: SuiteStatus::Pending,
            counts: Counts::default(),
            reason: None,
            probes: Vec::new(),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            status: SuiteStatus::Skipped,
            reason: Some(reason.into()),
            ..Self::new()
        }
    }

    pub fn with_pass(mut self, probe: ProbeRecord) -> Self {
        self.counts.add(Counts::single_pass());
        self.probes.push(probe);
        self
    }

    pub fn with_failure(mut self, probe: ProbeRecord) -> Self {
        self.counts.add(Counts::single_failure());
        self.probes.push(probe);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Fix the status from the accumulated counts.
    pub fn finish(mut self) -> Self {
        if self.status != SuiteStatus::Skipped {
            self.status = if self.counts.failed == 0 {
                SuiteStatus::Passed
            } else {
                SuiteStatus::Failed
            };
        }
        self
    }
}

impl Default for CheckResult {
    fn default() -> Self {
        Self::new()
    }
}

/// One step of the end-to-end workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub name: String,
    pub status: SuiteStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compliance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Ordered per-invocation records of a suite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SuiteDetail {
    Invocation(InvocationRecord),
    Agent {
        agent: String,
        #[serde(flatten)]
        record: InvocationRecord,
    },
    Benchmark {
        name: String,
        #[serde(flatten)]
        result: BenchmarkResult,
    },
    Check {
        name: String,
        #[serde(flatten)]
        result: CheckResult,
    },
    WorkflowStep(WorkflowStep),
    Note {
        message: String,
    },
}

/// Normalized result of one suite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteResult {
    pub status: SuiteStatus,
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    /// Seconds.
    pub execution_time: f64,
    pub details: Vec<SuiteDetail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Default for SuiteResult {
    fn default() -> Self {
        Self::new()
    }
}

impl SuiteResult {
    pub fn new() -> Self {
        Self {
            status: SuiteStatus::Pending,
            total: 0,
            passed: 0,
            failed: 0,
            skipped: 0,
            execution_time: 0.0,
            details: Vec::new(),
            error: None,
        }
    }

    pub fn add_counts(&mut self, counts: Counts) {
        self.total += counts.total;
        self.passed += counts.passed;
        self.failed += counts.failed;
        self.skipped += counts.skipped;
    }

    pub fn push(&mut self, detail: SuiteDetail) {
        self.details.push(detail);
    }

    pub fn note(&mut self, message: impl Into<String>) {
        self.details.push(SuiteDetail::Note {
            message: message.into(),
        });
    }

    /// PASSED iff nothing failed.
    pub fn settle_by_failures(&mut self) {
        self.status = if self.failed == 0 {
            SuiteStatus::Passed
        } else {
            SuiteStatus::Failed
        };
    }

    pub fn finish(mut self, elapsed: Duration) -> Self {
        self.execution_time = elapsed.as_secs_f64();
        self
    }
}
