use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Local};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::suite::{SuiteKind, SuiteName, SuiteResult};

/// Brings the world the suites need up and down.
#[async_trait]
pub trait TestEnvironment: Send + Sync {
    /// A failure here ends the run as SETUP_FAILED.
    async fn setup(&self) -> Result<()>;

    /// Cleanup failures are logged, never fatal.
    async fn teardown(&self) -> std::io::Result<()>;
}

/// Runs one suite to a normalized result.
#[async_trait]
pub trait SuiteDriver: Send + Sync {
    /// An error aborts the remaining suites and ends the run as ERROR.
    async fn run(&self, suite: &SuiteKind) -> Result<SuiteResult>;
}

/// Overall run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    #[default]
    Pending,
    SetupFailed,
    Passed,
    /// Some tests passed and some failed.
    Partial,
    Failed,
    Error,
}

impl RunStatus {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::SetupFailed => "SETUP_FAILED",
            Self::Passed => "PASSED",
            Self::Partial => "PARTIAL",
            Self::Failed => "FAILED",
            Self::Error => "ERROR",
        }
    }

    pub fn is_success(&self) -> bool {
        *self == Self::Passed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    SettingUp,
    SetupFailed,
    RunningSuites,
    Aggregating,
    Teardown,
}

/// Accumulated outcome of one run. Each phase takes it by value and hands
/// it on.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub run_id: Uuid,
    pub timestamp: DateTime<Local>,
    pub overall_status: RunStatus,
    pub total_tests: u32,
    pub passed_tests: u32,
    pub failed_tests: u32,
    pub skipped_tests: u32,
    /// Seconds, measured up to the start of teardown.
    pub execution_time: f64,
    /// Ordered by declared suite order.
    pub test_suites: BTreeMap<SuiteName, SuiteResult>,
    pub error: Option<String>,
    pub phases: Vec<RunPhase>,
}

impl Default for RunResult {
    fn default() -> Self {
        Self::new()
    }
}

impl RunResult {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            timestamp: Local::now(),
            overall_status: RunStatus::Pending,
            total_tests: 0,
            passed_tests: 0,
            failed_tests: 0,
            skipped_tests: 0,
            execution_time: 0.0,
            test_suites: BTreeMap::new(),
            error: None,
            phases: Vec::new(),
        }
    }

    fn enter(mut self, phase: RunPhase) -> Self {
        self.phases.push(phase);
        self
    }

    /// Add a finished suite and its counts.
    pub fn record(mut self, name: SuiteName, suite: SuiteResult) -> Self {
        self.total_tests += suite.total;
        self.passed_tests += suite.passed;
        self.failed_tests += suite.failed;
        self.skipped_tests += suite.skipped;
        self.test_suites.insert(name, suite);
        self
    }

    /// Status from the counts alone.
    pub fn aggregate(mut self) -> Self {
        self.overall_status = if self.failed_tests == 0 {
            RunStatus::Passed
        } else if self.passed_tests > 0 {
            RunStatus::Partial
        } else {
            RunStatus::Failed
        };
        self
    }

    fn abort(mut self, status: RunStatus, message: String) -> Self {
        self.overall_status = status;
        self.error = Some(message);
        self
    }

    fn stamp(mut self, elapsed: Duration) -> Self {
        self.execution_time = elapsed.as_secs_f64();
        self
    }

    /// Percentage of passed tests; zero tests count as one.
    pub fn success_rate(&self) -> f64 {
        f64::from(self.passed_tests) / f64::from(self.total_tests.max(1)) * 100.0
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Drives setup, the planned suites, aggregation and teardown.
pub struct Orchestrator<E, D> {
    environment: E,
    driver: D,
    skip_setup: bool,
}

impl<E: TestEnvironment, D: SuiteDriver> Orchestrator<E, D> {
    pub fn new(environment: E, driver: D) -> Self {
        Self {
            environment,
            driver,
            skip_setup: false,
        }
    }

    pub fn with_skip_setup(mut self, skip_setup: bool) -> Self {
        self.skip_setup = skip_setup;
        self
    }

    /// Teardown runs exactly once, whatever phase the run ended in.
    pub async fn run(&self, suites: &[SuiteKind]) -> RunResult {
        let started = Instant::now();
        let run = RunResult::new();
        info!(run_id = %run.run_id, suites = suites.len(), "starting test run");

        let run = self
            .execute(run, suites)
            .await
            .stamp(started.elapsed())
            .enter(RunPhase::Teardown);

        match AssertUnwindSafe(self.environment.teardown())
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "teardown failed"),
            Err(payload) => warn!(panic = %panic_message(payload), "teardown panicked"),
        }

        info!(
            status = run.overall_status.display_name(),
            total = run.total_tests,
            passed = run.passed_tests,
            failed = run.failed_tests,
            "test run finished"
        );
        run
    }

    async fn execute(&self, run: RunResult, suites: &[SuiteKind]) -> RunResult {
        let run = if self.skip_setup {
            info!("skipping environment setup");
            run
        } else {
            let run = run.enter(RunPhase::SettingUp);
            match AssertUnwindSafe(self.environment.setup())
                .catch_unwind()
                .await
            {
                Ok(Ok(())) => run,
                Ok(Err(e)) => {
                    error!(error = %e, "environment setup failed");
                    return run
                        .enter(RunPhase::SetupFailed)
                        .abort(RunStatus::SetupFailed, e.to_string());
                }
                Err(payload) => {
                    let message = panic_message(payload);
                    error!(panic = %message, "environment setup panicked");
                    return run
                        .enter(RunPhase::SetupFailed)
                        .abort(RunStatus::Error, format!("setup panicked: {}", message));
                }
            }
        };

        let mut run = run.enter(RunPhase::RunningSuites);
        for suite in suites {
            let name = suite.name();
            info!(suite = %name, "running suite");
            match AssertUnwindSafe(self.driver.run(suite)).catch_unwind().await {
                Ok(Ok(result)) => {
                    info!(
                        suite = %name,
                        status = result.status.display_name(),
                        total = result.total,
                        passed = result.passed,
                        failed = result.failed,
                        "suite finished"
                    );
                    run = run.record(name, result);
                }
                Ok(Err(e)) => {
                    error!(suite = %name, error = %e, "suite aborted the run");
                    return run.abort(RunStatus::Error, format!("{}: {}", name, e));
                }
                Err(payload) => {
                    let message = panic_message(payload);
                    error!(suite = %name, panic = %message, "suite panicked");
                    return run.abort(RunStatus::Error, format!("{}: panicked: {}", name, message));
                }
            }
        }

        run.enter(RunPhase::Aggregating).aggregate()
    }
}
