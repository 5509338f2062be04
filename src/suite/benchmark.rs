use std::time::{Duration, Instant};

use reqwest::StatusCode;
use tracing::{debug, info};

use super::result::{BenchmarkResult, SuiteDetail, SuiteResult, SuiteStatus};
use crate::config::PerformanceSettings;
use crate::service::{ConstitutionClient, EvaluateRequest};

const SECONDS: &str = "seconds";
const REQUESTS_PER_SECOND: &str = "requests/second";

/// Timed request sequences against the evaluate endpoint.
pub struct BenchmarkEngine<'a> {
    client: &'a ConstitutionClient,
    settings: &'a PerformanceSettings,
    tenant_id: i64,
}

impl<'a> BenchmarkEngine<'a> {
    pub fn new(client: &'a ConstitutionClient, settings: &'a PerformanceSettings, tenant_id: i64) -> Self {
        Self {
            client,
            settings,
            tenant_id,
        }
    }

    fn request(&self, action: String) -> EvaluateRequest {
        EvaluateRequest {
            action,
            tenant_id: self.tenant_id,
            metadata: None,
        }
    }

    /// Latency of a single evaluation.
    pub async fn response_time(&self) -> BenchmarkResult {
        let request = self.request("Test action for performance benchmark".into());
        let timeout = Duration::from_secs(self.settings.response_time_request_timeout_secs);

        let started = Instant::now();
        let response = self.client.evaluate(&request, Some(timeout)).await;
        let elapsed = started.elapsed().as_secs_f64();

        let result = BenchmarkResult::lower_is_better(
            elapsed,
            self.settings.response_time_threshold_secs,
            SECONDS,
        );
        match response {
            Ok(response) if response.status == StatusCode::OK => result,
            Ok(response) => result.failed_with(format!("unexpected status {}", response.status)),
            Err(e) => result.failed_with(format!("request failed: {}", e)),
        }
    }

    /// Successful sequential evaluations per second. Failed requests still
    /// spend elapsed time.
    pub async fn throughput(&self) -> BenchmarkResult {
        let timeout = Duration::from_secs(self.settings.throughput_request_timeout_secs);
        let count = self.settings.throughput_requests;
        let mut successes = 0usize;

        let started = Instant::now();
        for i in 0..count {
            let request = self.request(format!("Benchmark action {}", i));
            match self.client.evaluate(&request, Some(timeout)).await {
                Ok(response) if response.status.is_success() => successes += 1,
                Ok(response) => debug!(status = response.status.as_u16(), "benchmark request rejected"),
                Err(e) => debug!(error = %e, "benchmark request failed"),
            }
        }
        let elapsed = started.elapsed().as_secs_f64();

        let value = if elapsed > 0.0 {
            successes as f64 / elapsed
        } else {
            0.0
        };
        let result =
            BenchmarkResult::higher_is_better(value, self.settings.throughput_threshold, REQUESTS_PER_SECOND);
        if successes < count {
            result.with_note(format!("{} of {} requests failed", count - successes, count))
        } else {
            result
        }
    }

    /// Benchmark name to result, in execution order.
    pub async fn benchmark(&self) -> Vec<(String, BenchmarkResult)> {
        vec![
            ("response_time".to_string(), self.response_time().await),
            ("throughput".to_string(), self.throughput().await),
        ]
    }

    /// Benchmarks are measurements, not tests: they decide the suite
    /// status but add nothing to the run totals.
    pub async fn run_suite(&self) -> SuiteResult {
        let started = Instant::now();
        let mut result = SuiteResult::new();
        let mut all_passed = true;

        for (name, benchmark) in self.benchmark().await {
            info!(
                benchmark = %name,
                value = benchmark.value,
                threshold = benchmark.threshold,
                status = benchmark.status.display_name(),
                "benchmark finished"
            );
            all_passed &= benchmark.status == SuiteStatus::Passed;
            result.push(SuiteDetail::Benchmark {
                name,
                result: benchmark,
            });
        }

        result.status = if all_passed {
            SuiteStatus::Passed
        } else {
            SuiteStatus::Failed
        };
        result.finish(started.elapsed())
    }
}
