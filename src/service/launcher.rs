use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use super::health::HealthChecker;
use crate::config::{HarnessConfig, LaunchStrategy};

/// Stand-in for deadlines too far away to represent.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

fn deadline_after(duration: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(duration).unwrap_or(now + FAR_FUTURE)
}

/// A dependency the harness needs before any suite can run.
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    pub name: String,
    pub health_url: String,
    /// Working directories are already resolved against the project root.
    pub launch: LaunchStrategy,
    pub startup_grace: Duration,
}

impl ServiceDescriptor {
    pub fn from_config(config: &HarnessConfig) -> Self {
        let launch = match &config.service.launch {
            LaunchStrategy::Process {
                program,
                args,
                working_dir,
            } => LaunchStrategy::Process {
                program: program.clone(),
                args: args.clone(),
                working_dir: config.resolve(working_dir),
            },
            other => other.clone(),
        };
        Self {
            name: config.service.name.clone(),
            health_url: config.service.health_url(),
            launch,
            startup_grace: config.service.startup_grace(),
        }
    }
}

/// Brings dependencies up and waits for them to report healthy.
#[derive(Debug, Clone)]
pub struct ServiceLauncher {
    checker: HealthChecker,
    poll_interval: Duration,
}

impl ServiceLauncher {
    pub fn new(checker: HealthChecker, poll_interval: Duration) -> Self {
        Self {
            checker,
            poll_interval,
        }
    }

    /// True once the service answers its health check. Launches it at most
    /// once, and only when it is not already healthy.
    pub async fn ensure_running(&self, service: &ServiceDescriptor) -> bool {
        if self.checker.check(&service.health_url).await {
            info!(service = %service.name, "service already running");
            return true;
        }

        info!(service = %service.name, "starting service");
        let Some(mut child) = self.spawn(service) else {
            return false;
        };

        let deadline = deadline_after(service.startup_grace);
        loop {
            sleep_until(deadline_after(self.poll_interval).min(deadline)).await;

            if self.checker.check(&service.health_url).await {
                info!(service = %service.name, "service started");
                return true;
            }

            // Container runtimes detach and exit 0; only a failing exit is final.
            match child.try_wait() {
                Ok(Some(status)) if !status.success() => {
                    error!(service = %service.name, %status, "launch command exited");
                    return false;
                }
                Ok(_) => {}
                Err(e) => debug!(service = %service.name, error = %e, "could not poll launch command"),
            }

            if Instant::now() >= deadline {
                error!(
                    service = %service.name,
                    grace_secs = service.startup_grace.as_secs(),
                    "service did not become healthy"
                );
                return false;
            }
        }
    }

    fn spawn(&self, service: &ServiceDescriptor) -> Option<Child> {
        let mut command = match &service.launch {
            LaunchStrategy::None => {
                warn!(service = %service.name, "launching disabled; service is not running");
                return None;
            }
            LaunchStrategy::Process {
                program,
                args,
                working_dir,
            } => {
                if !working_dir.is_dir() {
                    warn!(
                        service = %service.name,
                        dir = %working_dir.display(),
                        "service directory not found"
                    );
                    return None;
                }
                let mut command = Command::new(program);
                command.args(args).current_dir(working_dir);
                command
            }
            LaunchStrategy::Container {
                runtime,
                image,
                publish,
            } => {
                let mut command = Command::new(runtime);
                command.args(["run", "-d", "--rm", "-p", publish.as_str(), image.as_str()]);
                command
            }
        };

        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        match command.spawn() {
            Ok(child) => Some(child),
            Err(e) => {
                warn!(service = %service.name, error = %e, "failed to launch service");
                None
            }
        }
    }

    /// Poll every service until all are healthy or `timeout` elapses.
    pub async fn wait_for_services(&self, services: &[ServiceDescriptor], timeout: Duration) -> bool {
        let deadline = deadline_after(timeout);
        loop {
            if self.all_healthy(services).await {
                info!("all services are ready");
                return true;
            }

            if Instant::now() >= deadline {
                error!(timeout_secs = timeout.as_secs(), "timeout waiting for services");
                return false;
            }
            sleep_until(deadline_after(self.poll_interval).min(deadline)).await;
        }
    }

    async fn all_healthy(&self, services: &[ServiceDescriptor]) -> bool {
        for service in services {
            if !self.checker.check(&service.health_url).await {
                debug!(service = %service.name, "service not ready");
                return false;
            }
        }
        true
    }
}
