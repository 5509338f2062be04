mod config;
mod error;
mod orchestrator;
mod report;
mod service;
mod suite;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use config::HarnessConfig;
use orchestrator::Orchestrator;
use report::ReportGenerator;
use service::{ConstitutionClient, ServiceEnvironment};
use suite::{LiveSuiteDriver, SuiteName};

/// Spec-Kit test runner
#[derive(Debug, Parser)]
#[command(name = "speckit-runner", version, about)]
struct Cli {
    /// Configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the JSON test report here
    #[arg(long)]
    output: Option<PathBuf>,

    /// Run only this suite; repeat for several
    #[arg(long = "suite", value_enum)]
    suites: Vec<SuiteName>,

    /// Assume the environment is already up and seeded
    #[arg(long)]
    skip_setup: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = HarnessConfig::load_or_default(cli.config.as_deref())
        .context("Failed to load configuration")?;
    if !cli.suites.is_empty() {
        config.test_suites.restrict_to(&cli.suites);
    }

    let client = ConstitutionClient::new(&config.service.base_url, config.service.request_timeout())
        .context("Failed to create service client")?;
    let environment = ServiceEnvironment::new(&config, client.clone())
        .context("Failed to prepare test environment")?;
    let driver = LiveSuiteDriver::new(client, config.tenant_id);

    let run = Orchestrator::new(environment, driver)
        .with_skip_setup(cli.skip_setup)
        .run(&suite::plan(&config))
        .await;

    let reports = ReportGenerator::new();
    println!("{}", reports.summary(&run));
    if let Some(output) = &cli.output {
        reports
            .write(&run, output)
            .context("Failed to write test report")?;
    }

    Ok(if run.overall_status.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
