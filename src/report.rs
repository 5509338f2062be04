use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use serde::Serialize;
use sysinfo::System;
use tracing::info;

use crate::error::{HarnessError, Result};
use crate::orchestrator::{RunResult, RunStatus};
use crate::suite::{SuiteName, SuiteResult};

const RULE_WIDTH: usize = 80;
const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemInfo {
    pub harness_version: String,
    pub platform: String,
    pub os_version: String,
    pub cpu_count: usize,
    pub memory_gb: f64,
}

impl SystemInfo {
    pub fn collect() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu();
        Self {
            harness_version: env!("CARGO_PKG_VERSION").to_string(),
            platform: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
            os_version: match (System::name(), System::os_version()) {
                (Some(name), Some(version)) => format!("{} {}", name, version),
                (Some(name), None) => name,
                _ => "unknown".to_string(),
            },
            cpu_count: sys.cpus().len(),
            memory_gb: (sys.total_memory() as f64 / BYTES_PER_GB * 100.0).round() / 100.0,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub timestamp: String,
    pub overall_status: RunStatus,
    pub total_tests: u32,
    pub passed_tests: u32,
    pub failed_tests: u32,
    pub skipped_tests: u32,
    pub execution_time: String,
    pub success_rate: String,
}

/// Persisted shape of a finished run.
#[derive(Debug, Serialize)]
pub struct TestReport<'a> {
    pub test_run_summary: RunSummary,
    pub test_suites: &'a BTreeMap<SuiteName, SuiteResult>,
    pub system_info: &'a SystemInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'a str>,
}

pub struct ReportGenerator {
    system_info: SystemInfo,
}

impl ReportGenerator {
    pub fn new() -> Self {
        Self::with_system_info(SystemInfo::collect())
    }

    pub fn with_system_info(system_info: SystemInfo) -> Self {
        Self { system_info }
    }

    pub fn build<'a>(&'a self, run: &'a RunResult) -> TestReport<'a> {
        TestReport {
            test_run_summary: RunSummary {
                run_id: run.run_id.to_string(),
                timestamp: run.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                overall_status: run.overall_status,
                total_tests: run.total_tests,
                passed_tests: run.passed_tests,
                failed_tests: run.failed_tests,
                skipped_tests: run.skipped_tests,
                execution_time: format!("{:.2} seconds", run.execution_time),
                success_rate: format!("{:.1}%", run.success_rate()),
            },
            test_suites: &run.test_suites,
            system_info: &self.system_info,
            error: run.error.as_deref(),
        }
    }

    pub fn render(&self, run: &RunResult) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.build(run))
    }

    /// Render and write the report, creating parent directories.
    pub fn write(&self, run: &RunResult, path: &Path) -> Result<String> {
        let report_err = |source: std::io::Error| HarnessError::Report {
            source,
            path: path.to_path_buf(),
        };

        let json = self.render(run).map_err(|e| report_err(e.into()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(report_err)?;
        }
        std::fs::write(path, &json).map_err(report_err)?;

        info!(path = %path.display(), "test report written");
        Ok(json)
    }

    /// Human-readable summary for the console.
    pub fn summary(&self, run: &RunResult) -> String {
        let rule = "=".repeat(RULE_WIDTH);
        let mut out = String::new();

        let _ = writeln!(out, "\n{}", rule);
        let _ = writeln!(out, "TEST RUN SUMMARY");
        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(out, "Overall Status: {}", run.overall_status.display_name());
        let _ = writeln!(out, "Total Tests: {}", run.total_tests);
        let _ = writeln!(out, "Passed: {}", run.passed_tests);
        let _ = writeln!(out, "Failed: {}", run.failed_tests);
        let _ = writeln!(out, "Skipped: {}", run.skipped_tests);
        let _ = writeln!(out, "Execution Time: {:.2} seconds", run.execution_time);
        let _ = writeln!(out, "Success Rate: {:.1}%", run.success_rate());

        if !run.test_suites.is_empty() {
            let _ = writeln!(out, "{}", "-".repeat(RULE_WIDTH));
            for (name, suite) in &run.test_suites {
                let _ = writeln!(
                    out,
                    "{:<20} {:<8} {:>4} passed {:>4} failed {:>4} skipped  {:.2}s",
                    name.as_str(),
                    suite.status.display_name(),
                    suite.passed,
                    suite.failed,
                    suite.skipped,
                    suite.execution_time
                );
            }
        }
        if let Some(error) = &run.error {
            let _ = writeln!(out, "Error: {}", error);
        }
        let _ = write!(out, "{}", rule);
        out
    }
}

impl Default for ReportGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suite::{Counts, SuiteStatus};
    use serde_json::Value;
    use tempfile::TempDir;

    fn generator() -> ReportGenerator {
        ReportGenerator::with_system_info(SystemInfo {
            harness_version: "0.1.0".into(),
            platform: "linux-x86_64".into(),
            os_version: "Linux 6.1".into(),
            cpu_count: 8,
            memory_gb: 15.52,
        })
    }

    fn sample_run() -> RunResult {
        let mut security = SuiteResult::new();
        security.add_counts(Counts {
            total: 5,
            passed: 4,
            failed: 1,
            skipped: 0,
        });
        security.note("probe battery finished");
        security.settle_by_failures();

        let mut unit = SuiteResult::new();
        unit.add_counts(Counts {
            total: 3,
            passed: 3,
            failed: 0,
            skipped: 0,
        });
        unit.settle_by_failures();

        RunResult::new()
            .record(SuiteName::Security, security)
            .record(SuiteName::Unit, unit)
            .aggregate()
    }

    #[test]
    fn test_render_summary_block() {
        let run = sample_run();
        let value: Value = serde_json::from_str(&generator().render(&run).unwrap()).unwrap();

        let summary = &value["test_run_summary"];
        assert_eq!(summary["overall_status"], "PARTIAL");
        assert_eq!(summary["total_tests"], 8);
        assert_eq!(summary["success_rate"], "87.5%");
        assert_eq!(summary["execution_time"], "0.00 seconds");
        assert_eq!(summary["run_id"], run.run_id.to_string());
        assert_eq!(summary["timestamp"].as_str().unwrap().len(), 19);
        assert!(value.get("error").is_none());

        assert_eq!(value["system_info"]["cpu_count"], 8);
        assert_eq!(value["system_info"]["memory_gb"], 15.52);
    }

    #[test]
    fn test_render_suites_in_declared_order() {
        let json = generator().render(&sample_run()).unwrap();
        let unit = json.find("\"unit_tests\"").unwrap();
        let security = json.find("\"security_tests\"").unwrap();
        assert!(unit < security);

        let value: Value = serde_json::from_str(&json).unwrap();
        let details = &value["test_suites"]["security_tests"]["details"];
        assert_eq!(details[0]["kind"], "note");
    }

    #[test]
    fn test_empty_run_success_rate() {
        let run = RunResult::new().aggregate();
        let generator = generator();
        let report = generator.build(&run);
        assert_eq!(report.test_run_summary.success_rate, "0.0%");
        assert_eq!(report.test_run_summary.overall_status, RunStatus::Passed);
    }

    #[test]
    fn test_collect_reads_host_info() {
        let info = SystemInfo::collect();
        assert!(info.cpu_count > 0);
        assert!(info.memory_gb > 0.0);
        assert_eq!(info.harness_version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_write_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("reports/nightly/run.json");

        let json = generator().write(&sample_run(), &path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), json);
    }

    #[test]
    fn test_write_to_unwritable_path_is_report_error() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("file");
        std::fs::write(&blocker, "").unwrap();

        let result = generator().write(&sample_run(), &blocker.join("run.json"));
        assert!(matches!(result, Err(HarnessError::Report { .. })));
    }

    #[test]
    fn test_console_summary() {
        let mut run = sample_run();
        run.error = Some("agent_tests: failed to invoke".into());
        let text = generator().summary(&run);

        assert!(text.contains("Overall Status: PARTIAL"));
        assert!(text.contains("Success Rate: 87.5%"));
        assert!(text.contains("security_tests"));
        assert!(text.contains("Error: agent_tests"));
        assert!(!text.contains(SuiteStatus::Pending.display_name()));
    }
}
