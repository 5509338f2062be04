mod benchmark;
mod executor;
mod result;
mod runner;
mod security;
mod workflow;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

pub use benchmark::BenchmarkEngine;
pub use executor::{AgentSuite, IntegrationSuite, UnitSuite};
pub use result::SuiteResult;
#[cfg(test)]
pub use result::{Counts, SuiteStatus};
pub use security::SecurityProbe;
pub use workflow::WorkflowProbe;

use crate::config::{HarnessConfig, PerformanceSettings, SecuritySettings, WorkflowSettings};
use crate::error::Result;
use crate::orchestrator::SuiteDriver;
use crate::service::ConstitutionClient;

/// Suite names in declared execution order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum,
)]
pub enum SuiteName {
    #[serde(rename = "unit_tests")]
    #[value(name = "unit_tests")]
    Unit,
    #[serde(rename = "integration_tests")]
    #[value(name = "integration_tests")]
    Integration,
    #[serde(rename = "agent_tests")]
    #[value(name = "agent_tests")]
    Agent,
    #[serde(rename = "performance_tests")]
    #[value(name = "performance_tests")]
    Performance,
    #[serde(rename = "security_tests")]
    #[value(name = "security_tests")]
    Security,
    #[serde(rename = "end_to_end_tests")]
    #[value(name = "end_to_end_tests")]
    EndToEnd,
}

impl SuiteName {
    pub const ALL: [SuiteName; 6] = [
        SuiteName::Unit,
        SuiteName::Integration,
        SuiteName::Agent,
        SuiteName::Performance,
        SuiteName::Security,
        SuiteName::EndToEnd,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unit => "unit_tests",
            Self::Integration => "integration_tests",
            Self::Agent => "agent_tests",
            Self::Performance => "performance_tests",
            Self::Security => "security_tests",
            Self::EndToEnd => "end_to_end_tests",
        }
    }
}

impl fmt::Display for SuiteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A suite together with everything it needs to run.
#[derive(Debug, Clone)]
pub enum SuiteKind {
    Unit(UnitSuite),
    Integration(IntegrationSuite),
    Agent(AgentSuite),
    Performance(PerformanceSettings),
    Security(SecuritySettings),
    EndToEnd(WorkflowSettings),
}

impl SuiteKind {
    pub fn name(&self) -> SuiteName {
        match self {
            Self::Unit(_) => SuiteName::Unit,
            Self::Integration(_) => SuiteName::Integration,
            Self::Agent(_) => SuiteName::Agent,
            Self::Performance(_) => SuiteName::Performance,
            Self::Security(_) => SuiteName::Security,
            Self::EndToEnd(_) => SuiteName::EndToEnd,
        }
    }

    pub fn from_config(name: SuiteName, config: &HarnessConfig) -> Self {
        match name {
            SuiteName::Unit => Self::Unit(UnitSuite {
                project_root: config.project_root.clone(),
                targets: config.unit.targets.clone(),
                command: config.pytest.clone(),
                report_dir: config.report_dir(),
                timeout: Duration::from_secs(config.unit.timeout_secs),
            }),
            SuiteName::Integration => Self::Integration(IntegrationSuite {
                project_root: config.project_root.clone(),
                test_file: config.resolve(&config.integration.test_file),
                command: config.pytest.clone(),
                report_dir: config.report_dir(),
                timeout: Duration::from_secs(config.integration.timeout_secs),
            }),
            SuiteName::Agent => Self::Agent(AgentSuite {
                agents_dir: config.resolve(&config.agents.agents_dir),
                test_dir: config.agents.test_dir.clone(),
                command: config.pytest.clone(),
                timeout: Duration::from_secs(config.agents.timeout_secs),
            }),
            SuiteName::Performance => Self::Performance(config.performance.clone()),
            SuiteName::Security => Self::Security(config.security.clone()),
            SuiteName::EndToEnd => Self::EndToEnd(config.workflow.clone()),
        }
    }
}

/// Enabled suites, in declared order. Disabled suites are absent.
pub fn plan(config: &HarnessConfig) -> Vec<SuiteKind> {
    config
        .test_suites
        .enabled()
        .into_iter()
        .map(|name| SuiteKind::from_config(name, config))
        .collect()
}

/// Every structured report file a run of `config` may write.
pub fn transient_reports(config: &HarnessConfig) -> Vec<PathBuf> {
    let dir = config.report_dir();
    (0..config.unit.targets.len())
        .map(|index| executor::unit_report(&dir, index))
        .chain(std::iter::once(executor::integration_report(&dir)))
        .collect()
}

/// Runs suites for real: subprocesses for test suites, HTTP for the rest.
pub struct LiveSuiteDriver {
    client: ConstitutionClient,
    tenant_id: i64,
}

impl LiveSuiteDriver {
    pub fn new(client: ConstitutionClient, tenant_id: i64) -> Self {
        Self { client, tenant_id }
    }
}

#[async_trait]
impl SuiteDriver for LiveSuiteDriver {
    async fn run(&self, suite: &SuiteKind) -> Result<SuiteResult> {
        let result = match suite {
            SuiteKind::Unit(unit) => executor::run_unit(unit).await,
            SuiteKind::Integration(integration) => executor::run_integration(integration).await,
            SuiteKind::Agent(agents) => executor::run_agents(agents).await,
            SuiteKind::Performance(settings) => {
                BenchmarkEngine::new(&self.client, settings, self.tenant_id)
                    .run_suite()
                    .await
            }
            SuiteKind::Security(settings) => {
                SecurityProbe::new(&self.client, settings, self.tenant_id)
                    .run_suite()
                    .await
            }
            SuiteKind::EndToEnd(settings) => {
                WorkflowProbe::new(&self.client, settings, self.tenant_id)
                    .run_suite()
                    .await
            }
        };
        Ok(result)
    }
}
