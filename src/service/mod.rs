mod client;
mod health;
mod launcher;
mod seed;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

pub use client::{
    BatchEvaluateRequest, BatchEvaluation, ConstitutionClient, Envelope, EvaluateRequest,
    Evaluation, PrincipleMatch, RawResponse, SearchRequest,
};
pub use health::HealthChecker;
pub use launcher::{ServiceDescriptor, ServiceLauncher};
pub use seed::TestDataSeeder;

use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result};
use crate::orchestrator::TestEnvironment;

/// Live environment: the dependency service plus the report files the
/// suites leave behind.
pub struct ServiceEnvironment {
    launcher: ServiceLauncher,
    services: Vec<ServiceDescriptor>,
    client: ConstitutionClient,
    wait_timeout: Duration,
    transient_reports: Vec<PathBuf>,
}

impl ServiceEnvironment {
    pub fn new(config: &HarnessConfig, client: ConstitutionClient) -> Result<Self> {
        let checker = HealthChecker::new(config.service.request_timeout())?;
        Ok(Self {
            launcher: ServiceLauncher::new(checker, config.poll_interval()),
            services: vec![ServiceDescriptor::from_config(config)],
            client,
            wait_timeout: config.wait_timeout(),
            transient_reports: crate::suite::transient_reports(config),
        })
    }
}

#[async_trait]
impl TestEnvironment for ServiceEnvironment {
    async fn setup(&self) -> Result<()> {
        info!("setting up test environment");

        for service in &self.services {
            if !self.launcher.ensure_running(service).await {
                return Err(HarnessError::Setup {
                    service: service.name.clone(),
                    reason: "service could not be started".into(),
                });
            }
        }

        if !self
            .launcher
            .wait_for_services(&self.services, self.wait_timeout)
            .await
        {
            let names: Vec<&str> = self.services.iter().map(|s| s.name.as_str()).collect();
            return Err(HarnessError::Setup {
                service: names.join(", "),
                reason: format!("not ready within {}s", self.wait_timeout.as_secs()),
            });
        }

        let outcome = TestDataSeeder::new(&self.client).seed().await;
        if !outcome.is_clean() {
            warn!(
                rejected = outcome.rejected,
                "some fixtures were not seeded; dependent suites may fail"
            );
        }

        info!("test environment ready");
        Ok(())
    }

    /// Removes only the report files the suites write; the directory and
    /// anything else in it stay.
    async fn teardown(&self) -> std::io::Result<()> {
        info!("cleaning up test environment");
        let mut first_error = None;
        for report in &self.transient_reports {
            match tokio::fs::remove_file(report).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %report.display(), error = %e, "could not remove report");
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
