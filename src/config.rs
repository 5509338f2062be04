use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};
use crate::suite::SuiteName;

/// Which suites the orchestrator invokes. Keys missing from a config file
/// stay enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteToggles {
    pub unit_tests: bool,
    pub integration_tests: bool,
    pub agent_tests: bool,
    pub performance_tests: bool,
    pub security_tests: bool,
    pub end_to_end_tests: bool,
}

impl Default for SuiteToggles {
    fn default() -> Self {
        Self {
            unit_tests: true,
            integration_tests: true,
            agent_tests: true,
            performance_tests: true,
            security_tests: true,
            end_to_end_tests: true,
        }
    }
}

impl SuiteToggles {
    pub fn is_enabled(&self, suite: SuiteName) -> bool {
        match suite {
            SuiteName::Unit => self.unit_tests,
            SuiteName::Integration => self.integration_tests,
            SuiteName::Agent => self.agent_tests,
            SuiteName::Performance => self.performance_tests,
            SuiteName::Security => self.security_tests,
            SuiteName::EndToEnd => self.end_to_end_tests,
        }
    }

    pub fn set(&mut self, suite: SuiteName, enabled: bool) {
        let slot = match suite {
            SuiteName::Unit => &mut self.unit_tests,
            SuiteName::Integration => &mut self.integration_tests,
            SuiteName::Agent => &mut self.agent_tests,
            SuiteName::Performance => &mut self.performance_tests,
            SuiteName::Security => &mut self.security_tests,
            SuiteName::EndToEnd => &mut self.end_to_end_tests,
        };
        *slot = enabled;
    }

    /// Enable exactly the given suites.
    pub fn restrict_to(&mut self, selected: &[SuiteName]) {
        for suite in SuiteName::ALL {
            self.set(suite, selected.contains(&suite));
        }
    }

    /// Enabled suites in declared execution order.
    pub fn enabled(&self) -> Vec<SuiteName> {
        SuiteName::ALL
            .into_iter()
            .filter(|s| self.is_enabled(*s))
            .collect()
    }
}

/// How the launcher brings the dependency service up when it is down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LaunchStrategy {
    /// Never launch; only wait for an externally managed service.
    None,
    Process {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        /// Relative paths resolve against the project root.
        working_dir: PathBuf,
    },
    Container {
        #[serde(default = "default_container_runtime")]
        runtime: String,
        image: String,
        /// `host:container` port mapping passed to the runtime.
        publish: String,
    },
}

fn default_container_runtime() -> String {
    "docker".into()
}

impl Default for LaunchStrategy {
    fn default() -> Self {
        Self::Process {
            program: "npm".into(),
            args: vec!["start".into()],
            working_dir: PathBuf::from("services/constitution-service"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    pub name: String,
    pub base_url: String,
    pub health_path: String,
    pub request_timeout_secs: u64,
    pub startup_grace_secs: u64,
    pub launch: LaunchStrategy,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "constitution-service".into(),
            base_url: "http://localhost:3001".into(),
            health_path: "/health".into(),
            request_timeout_secs: 5,
            startup_grace_secs: 10,
            launch: LaunchStrategy::default(),
        }
    }
}

impl ServiceSettings {
    pub fn health_url(&self) -> String {
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            self.health_path
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn startup_grace(&self) -> Duration {
        Duration::from_secs(self.startup_grace_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitSettings {
    /// Test path patterns relative to the project root; `*` matches one
    /// directory level.
    pub targets: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for UnitSettings {
    fn default() -> Self {
        Self {
            targets: vec![
                "tests/unit".into(),
                "app-agents/agents/*/tests".into(),
                "services/*/tests".into(),
            ],
            timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationSettings {
    pub test_file: PathBuf,
    pub timeout_secs: u64,
}

impl Default for IntegrationSettings {
    fn default() -> Self {
        Self {
            test_file: PathBuf::from("tests/integration/test_constitution_integration.py"),
            timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub agents_dir: PathBuf,
    /// Subdirectory that marks an agent as testable.
    pub test_dir: String,
    pub timeout_secs: u64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            agents_dir: PathBuf::from("app-agents/agents"),
            test_dir: "tests".into(),
            timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceSettings {
    pub response_time_threshold_secs: f64,
    pub response_time_request_timeout_secs: u64,
    pub throughput_threshold: f64,
    pub throughput_requests: usize,
    pub throughput_request_timeout_secs: u64,
}

impl Default for PerformanceSettings {
    fn default() -> Self {
        Self {
            response_time_threshold_secs: 2.0,
            response_time_request_timeout_secs: 10,
            throughput_threshold: 2.0,
            throughput_requests: 10,
            throughput_request_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySettings {
    pub probe_timeout_secs: u64,
    pub rate_limit_burst: usize,
    pub burst_timeout_secs: u64,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            probe_timeout_secs: 5,
            rate_limit_burst: 50,
            burst_timeout_secs: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowSettings {
    pub request_timeout_secs: u64,
    pub search_query: String,
    pub search_limit: u32,
    pub search_threshold: f64,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: 10,
            search_query: "user data encryption".into(),
            search_limit: 5,
            search_threshold: 0.5,
        }
    }
}

/// Full harness configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub test_suites: SuiteToggles,
    pub project_root: PathBuf,
    /// Structured per-invocation reports land here and are removed during
    /// teardown.
    pub transient_dir: PathBuf,
    pub service: ServiceSettings,
    pub wait_timeout_secs: u64,
    pub poll_interval_secs: u64,
    /// Test runner command; suite arguments are appended.
    pub pytest: Vec<String>,
    pub unit: UnitSettings,
    pub integration: IntegrationSettings,
    pub agents: AgentSettings,
    pub performance: PerformanceSettings,
    pub security: SecuritySettings,
    pub workflow: WorkflowSettings,
    pub tenant_id: i64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            test_suites: SuiteToggles::default(),
            project_root: PathBuf::from("."),
            transient_dir: std::env::temp_dir().join("speckit-runner"),
            service: ServiceSettings::default(),
            wait_timeout_secs: 60,
            poll_interval_secs: 2,
            pytest: vec!["python".into(), "-m".into(), "pytest".into()],
            unit: UnitSettings::default(),
            integration: IntegrationSettings::default(),
            agents: AgentSettings::default(),
            performance: PerformanceSettings::default(),
            security: SecuritySettings::default(),
            workflow: WorkflowSettings::default(),
            tenant_id: 1,
        }
    }
}

impl HarnessConfig {
    /// Load from a JSON file; keys absent from the file keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| HarnessError::ConfigIo {
            source,
            path: path.to_path_buf(),
        })?;
        serde_json::from_str(&content).map_err(|source| HarnessError::ConfigParse {
            source,
            path: path.to_path_buf(),
        })
    }

    /// Defaults when no path is given.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Relative paths resolve against the project root; the result is
    /// absolute so it means the same thing from any child's working
    /// directory.
    pub fn resolve(&self, relative: &Path) -> PathBuf {
        let joined = if relative.is_absolute() {
            relative.to_path_buf()
        } else {
            self.project_root.join(relative)
        };
        std::path::absolute(&joined).unwrap_or(joined)
    }

    pub fn report_dir(&self) -> PathBuf {
        self.resolve(&self.transient_dir)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}
