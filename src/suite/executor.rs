//! Subprocess-backed suites: unit, integration and per-agent tests.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use globset::GlobBuilder;
use tracing::{info, warn};
use walkdir::WalkDir;

use super::result::{SuiteDetail, SuiteResult, SuiteStatus};
use super::runner::{exit_code_record, reported_record, run_invocation, Invocation, OutputLimit};

const UNIT_OUTPUT: OutputLimit = OutputLimit::new(1000, 1000);
const INTEGRATION_OUTPUT: OutputLimit = OutputLimit::new(2000, 1000);
const AGENT_OUTPUT: OutputLimit = OutputLimit::new(1000, 500);

const VERBOSE_ARGS: [&str; 2] = ["-v", "--tb=short"];

pub fn unit_report(report_dir: &Path, index: usize) -> PathBuf {
    report_dir.join(format!("unit-{}.json", index))
}

pub fn integration_report(report_dir: &Path) -> PathBuf {
    report_dir.join("integration.json")
}

fn report_args(report: &Path) -> [String; 2] {
    [
        "--json-report".to_string(),
        format!("--json-report-file={}", report.display()),
    ]
}

#[derive(Debug, Clone)]
pub struct UnitSuite {
    pub project_root: PathBuf,
    pub targets: Vec<String>,
    pub command: Vec<String>,
    pub report_dir: PathBuf,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct IntegrationSuite {
    pub project_root: PathBuf,
    pub test_file: PathBuf,
    pub command: Vec<String>,
    pub report_dir: PathBuf,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AgentSuite {
    pub agents_dir: PathBuf,
    pub test_dir: String,
    pub command: Vec<String>,
    pub timeout: Duration,
}

/// Paths under `root` matching `pattern`, relative to `root` and sorted.
/// `*` never crosses a path separator.
pub fn expand_target(root: &Path, pattern: &str) -> Result<Vec<PathBuf>, globset::Error> {
    if !pattern.contains(['*', '?', '[']) {
        return Ok(if root.join(pattern).exists() {
            vec![PathBuf::from(pattern)]
        } else {
            Vec::new()
        });
    }

    let matcher = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()?
        .compile_matcher();
    let depth = Path::new(pattern).components().count();

    Ok(WalkDir::new(root)
        .min_depth(depth)
        .max_depth(depth)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            entry
                .path()
                .strip_prefix(root)
                .ok()
                .map(Path::to_path_buf)
        })
        .filter(|relative| matcher.is_match(relative))
        .collect())
}

/// Invocation-level precedence: timeout, then failures, then unknown counts.
pub fn settle_by_precedence(result: &mut SuiteResult) {
    let statuses: Vec<SuiteStatus> = result
        .details
        .iter()
        .filter_map(|detail| match detail {
            SuiteDetail::Invocation(record) | SuiteDetail::Agent { record, .. } => {
                Some(record.status)
            }
            _ => None,
        })
        .collect();

    result.status = if statuses.contains(&SuiteStatus::Timeout) {
        SuiteStatus::Timeout
    } else if result.failed > 0 {
        SuiteStatus::Failed
    } else if statuses.contains(&SuiteStatus::Indeterminate) {
        SuiteStatus::Error
    } else {
        SuiteStatus::Passed
    };
}

/// One invocation per target pattern; a timeout does not stop later
/// targets.
pub async fn run_unit(suite: &UnitSuite) -> SuiteResult {
    let started = Instant::now();
    let mut result = SuiteResult::new();

    for (index, pattern) in suite.targets.iter().enumerate() {
        let paths = match expand_target(&suite.project_root, pattern) {
            Ok(paths) => paths,
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "invalid test path pattern");
                result.note(format!("invalid test path pattern {}: {}", pattern, e));
                continue;
            }
        };
        if paths.is_empty() {
            info!(pattern = %pattern, "no test paths match");
            result.note(format!("no test paths match {}", pattern));
            continue;
        }

        let report = unit_report(&suite.report_dir, index);
        let mut args: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
        args.extend(VERBOSE_ARGS.map(String::from));
        args.extend(report_args(&report));

        let invocation = Invocation {
            target: pattern.clone(),
            command: suite.command.clone(),
            args,
            cwd: suite.project_root.clone(),
            timeout: suite.timeout,
            report_path: Some(report),
            output_limit: UNIT_OUTPUT,
        };

        info!(pattern = %pattern, paths = paths.len(), "running unit tests");
        let record = reported_record(&invocation, run_invocation(&invocation).await);
        result.add_counts(record.counts);
        result.push(SuiteDetail::Invocation(record));
    }

    settle_by_precedence(&mut result);
    result.finish(started.elapsed())
}

pub async fn run_integration(suite: &IntegrationSuite) -> SuiteResult {
    let started = Instant::now();
    let mut result = SuiteResult::new();

    if !suite.test_file.is_file() {
        warn!(file = %suite.test_file.display(), "integration test file not found");
        result.status = SuiteStatus::Skipped;
        result.skipped = 1;
        result.note(format!(
            "integration test file not found: {}",
            suite.test_file.display()
        ));
        return result.finish(started.elapsed());
    }

    let report = integration_report(&suite.report_dir);
    let mut args = vec![suite.test_file.display().to_string()];
    args.extend(VERBOSE_ARGS.map(String::from));
    args.extend(report_args(&report));

    let invocation = Invocation {
        target: suite.test_file.display().to_string(),
        command: suite.command.clone(),
        args,
        cwd: suite.project_root.clone(),
        timeout: suite.timeout,
        report_path: Some(report),
        output_limit: INTEGRATION_OUTPUT,
    };

    info!(file = %suite.test_file.display(), "running integration tests");
    let record = reported_record(&invocation, run_invocation(&invocation).await);
    result.add_counts(record.counts);
    result.push(SuiteDetail::Invocation(record));

    settle_by_precedence(&mut result);
    result.finish(started.elapsed())
}

/// Agents are the directories under the agents root that carry a test
/// directory, in name order.
pub fn discover_agents(agents_dir: &Path, test_dir: &str) -> std::io::Result<Vec<(String, PathBuf)>> {
    let mut agents = Vec::new();
    for entry in std::fs::read_dir(agents_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() && path.join(test_dir).is_dir() {
            agents.push((entry.file_name().to_string_lossy().into_owned(), path));
        }
    }
    agents.sort();
    Ok(agents)
}

/// Each agent's own test directory, judged by exit code alone. The runner
/// starts inside the agent directory, so the test directory is passed as is.
pub async fn run_agents(suite: &AgentSuite) -> SuiteResult {
    let started = Instant::now();
    let mut result = SuiteResult::new();

    let agents = match discover_agents(&suite.agents_dir, &suite.test_dir) {
        Ok(agents) => agents,
        Err(e) => {
            warn!(dir = %suite.agents_dir.display(), error = %e, "agents directory not readable");
            result.note(format!(
                "agents directory not readable: {}",
                suite.agents_dir.display()
            ));
            Vec::new()
        }
    };

    for (agent, dir) in agents {
        let mut args = vec![suite.test_dir.clone()];
        args.extend(VERBOSE_ARGS.map(String::from));

        let invocation = Invocation {
            target: agent.clone(),
            command: suite.command.clone(),
            args,
            cwd: dir,
            timeout: suite.timeout,
            report_path: None,
            output_limit: AGENT_OUTPUT,
        };

        info!(agent = %agent, "running agent tests");
        let record = exit_code_record(&invocation, run_invocation(&invocation).await);
        result.add_counts(record.counts);
        result.push(SuiteDetail::Agent { agent, record });
    }

    result.settle_by_failures();
    result.finish(started.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Copies `summary.json` from the first test path into the report file;
    /// a `hang` marker makes it sleep past any test timeout.
    const FAKE_PYTEST: &str = r#"
for a; do
  case "$a" in
    --json-report-file=*) report="${a#--json-report-file=}" ;;
  esac
done
target="$1"
if [ -f "$target/hang" ]; then sleep 30; fi
if [ -f "$target/summary.json" ]; then cp "$target/summary.json" "$report"; fi
echo "ran $target"
"#;

    fn fake_pytest() -> Vec<String> {
        vec!["sh".into(), "-c".into(), FAKE_PYTEST.into(), "sh".into()]
    }

    fn mkdirs(root: &Path, dirs: &[&str]) {
        for dir in dirs {
            std::fs::create_dir_all(root.join(dir)).unwrap();
        }
    }

    fn unit_suite(root: &Path, targets: &[&str]) -> UnitSuite {
        UnitSuite {
            project_root: root.to_path_buf(),
            targets: targets.iter().map(|t| t.to_string()).collect(),
            command: fake_pytest(),
            report_dir: root.join("reports"),
            timeout: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_expand_target_star_is_one_level() {
        let temp_dir = TempDir::new().unwrap();
        mkdirs(
            temp_dir.path(),
            &[
                "services/b/tests",
                "services/a/tests",
                "services/c/src",
                "services/d/nested/tests",
            ],
        );

        let paths = expand_target(temp_dir.path(), "services/*/tests").unwrap();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("services/a/tests"),
                PathBuf::from("services/b/tests")
            ]
        );
    }

    #[test]
    fn test_expand_target_literal() {
        let temp_dir = TempDir::new().unwrap();
        mkdirs(temp_dir.path(), &["tests/unit"]);

        assert_eq!(
            expand_target(temp_dir.path(), "tests/unit").unwrap(),
            vec![PathBuf::from("tests/unit")]
        );
        assert!(expand_target(temp_dir.path(), "tests/missing")
            .unwrap()
            .is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unit_sums_reports_and_notes_missing_targets() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        mkdirs(root, &["tests/unit", "services/auth/tests"]);
        std::fs::write(
            root.join("tests/unit/summary.json"),
            r#"{"summary":{"total":5,"passed":5}}"#,
        )
        .unwrap();
        std::fs::write(
            root.join("services/auth/tests/summary.json"),
            r#"{"summary":{"total":3,"passed":1,"failed":1,"skipped":1}}"#,
        )
        .unwrap();

        let suite = unit_suite(
            root,
            &["tests/unit", "app-agents/agents/*/tests", "services/*/tests"],
        );
        let result = run_unit(&suite).await;

        assert_eq!(result.status, SuiteStatus::Failed);
        assert_eq!(result.total, 8);
        assert_eq!(result.passed, 6);
        assert_eq!(result.failed, 1);
        assert_eq!(result.skipped, 1);
        assert!(result.details.iter().any(|d| matches!(
            d,
            SuiteDetail::Note { message } if message.contains("app-agents/agents/*/tests")
        )));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unit_without_report_is_error() {
        let temp_dir = TempDir::new().unwrap();
        mkdirs(temp_dir.path(), &["tests/unit"]);

        let result = run_unit(&unit_suite(temp_dir.path(), &["tests/unit"])).await;
        assert_eq!(result.status, SuiteStatus::Error);
        assert_eq!(result.total, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unit_timeout_does_not_stop_later_targets() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        mkdirs(root, &["tests/unit", "services/auth/tests"]);
        std::fs::write(root.join("tests/unit/hang"), "").unwrap();
        std::fs::write(
            root.join("services/auth/tests/summary.json"),
            r#"{"summary":{"total":2,"passed":2}}"#,
        )
        .unwrap();

        let mut suite = unit_suite(root, &["tests/unit", "services/*/tests"]);
        suite.timeout = Duration::from_millis(300);

        let result = run_unit(&suite).await;
        assert_eq!(result.status, SuiteStatus::Timeout);
        assert_eq!(result.failed, 1);
        assert_eq!(result.passed, 2);
        assert_eq!(result.details.len(), 2);
    }

    #[tokio::test]
    async fn test_integration_missing_file_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let suite = IntegrationSuite {
            project_root: temp_dir.path().to_path_buf(),
            test_file: temp_dir.path().join("tests/integration/test_missing.py"),
            command: fake_pytest(),
            report_dir: temp_dir.path().join("reports"),
            timeout: Duration::from_secs(10),
        };

        let result = run_integration(&suite).await;
        assert_eq!(result.status, SuiteStatus::Skipped);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.failed, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_integration_uses_report() {
        let temp_dir = TempDir::new().unwrap();
        let test_file = temp_dir.path().join("test_integration.py");
        std::fs::write(&test_file, "").unwrap();

        let script = r#"
for a; do case "$a" in --json-report-file=*) report="${a#--json-report-file=}" ;; esac; done
printf '{"summary":{"total":7,"passed":7}}' > "$report"
"#;
        let suite = IntegrationSuite {
            project_root: temp_dir.path().to_path_buf(),
            test_file,
            command: vec!["sh".into(), "-c".into(), script.into(), "sh".into()],
            report_dir: temp_dir.path().join("reports"),
            timeout: Duration::from_secs(10),
        };

        let result = run_integration(&suite).await;
        assert_eq!(result.status, SuiteStatus::Passed);
        assert_eq!(result.total, 7);
        assert_eq!(result.passed, 7);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_agents_judged_by_exit_code() {
        let temp_dir = TempDir::new().unwrap();
        let agents_dir = temp_dir.path().join("agents");
        mkdirs(
            &agents_dir,
            &["crawler/tests", "builder/tests", "no_tests/src"],
        );
        std::fs::write(agents_dir.join("crawler/broken"), "").unwrap();

        let suite = AgentSuite {
            agents_dir,
            test_dir: "tests".into(),
            command: vec![
                "sh".into(),
                "-c".into(),
                "if [ -f broken ]; then echo nope >&2; exit 1; fi".into(),
                "sh".into(),
            ],
            timeout: Duration::from_secs(10),
        };

        let result = run_agents(&suite).await;
        assert_eq!(result.status, SuiteStatus::Failed);
        assert_eq!(result.total, 2);
        assert_eq!(result.passed, 1);
        assert_eq!(result.failed, 1);

        let agents: Vec<&str> = result
            .details
            .iter()
            .filter_map(|d| match d {
                SuiteDetail::Agent { agent, .. } => Some(agent.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(agents, vec!["builder", "crawler"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_agent_runner_gets_test_dir_relative_to_agent() {
        let temp_dir = TempDir::new().unwrap();
        let agents_dir = temp_dir.path().join("app-agents/agents");
        mkdirs(&agents_dir, &["weather/tests"]);

        let suite = AgentSuite {
            agents_dir,
            test_dir: "tests".into(),
            command: vec![
                "sh".into(),
                "-c".into(),
                r#"[ "$1" = tests ] && test -d "$1""#.into(),
                "sh".into(),
            ],
            timeout: Duration::from_secs(10),
        };

        let result = run_agents(&suite).await;
        assert_eq!(result.status, SuiteStatus::Passed);
        assert_eq!(result.passed, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_report_read_back_from_other_working_dir() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("project");
        mkdirs(&root, &["tests/unit"]);
        std::fs::write(
            root.join("tests/unit/summary.json"),
            r#"{"summary":{"total":4,"passed":4}}"#,
        )
        .unwrap();

        let config = crate::config::HarnessConfig {
            project_root: root.clone(),
            transient_dir: PathBuf::from("reports"),
            ..crate::config::HarnessConfig::default()
        };
        let mut suite = unit_suite(&root, &["tests/unit"]);
        suite.report_dir = config.report_dir();

        let result = run_unit(&suite).await;
        assert_eq!(result.status, SuiteStatus::Passed);
        assert_eq!(result.passed, 4);
        assert!(unit_report(&suite.report_dir, 0).is_file());
    }

    #[tokio::test]
    async fn test_agents_missing_root_passes_vacuously() {
        let temp_dir = TempDir::new().unwrap();
        let suite = AgentSuite {
            agents_dir: temp_dir.path().join("absent"),
            test_dir: "tests".into(),
            command: fake_pytest(),
            timeout: Duration::from_secs(10),
        };

        let result = run_agents(&suite).await;
        assert_eq!(result.status, SuiteStatus::Passed);
        assert_eq!(result.total, 0);
    }
}
