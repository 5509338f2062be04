use std::time::{Duration, Instant};

use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::task::JoinSet;
use tracing::{debug, info};

use super::result::{CheckResult, ProbeRecord, SuiteDetail, SuiteResult, SuiteStatus};
use super::runner::truncate;
use crate::config::SecuritySettings;
use crate::error::Result;
use crate::service::{ConstitutionClient, EvaluateRequest, RawResponse};

const PROBE_INPUT_LIMIT: usize = 100;

fn adversarial_payloads(tenant_id: i64) -> Vec<Value> {
    vec![
        json!({"action": "<script>alert('xss')</script>", "tenantId": tenant_id}),
        json!({"action": "'; DROP TABLE principles; --", "tenantId": tenant_id}),
        json!({"action": "A".repeat(10_000), "tenantId": tenant_id}),
        json!({"action": "Test", "tenantId": "invalid"}),
    ]
}

/// Adversarial-input and rate-limit checks against the evaluate endpoint.
pub struct SecurityProbe<'a> {
    client: &'a ConstitutionClient,
    settings: &'a SecuritySettings,
    tenant_id: i64,
}

impl<'a> SecurityProbe<'a> {
    pub fn new(client: &'a ConstitutionClient, settings: &'a SecuritySettings, tenant_id: i64) -> Self {
        Self {
            client,
            settings,
            tenant_id,
        }
    }

    /// A payload is handled safely when it is rejected with a 4xx, accepted
    /// without an error token in the body, or refused by the transport.
    pub async fn input_validation(&self) -> CheckResult {
        let timeout = Duration::from_secs(self.settings.probe_timeout_secs);
        let mut check = CheckResult::new();

        for payload in adversarial_payloads(self.tenant_id) {
            let input = truncate(&payload.to_string(), PROBE_INPUT_LIMIT);
            let response = self.client.post_json("/evaluate", &payload, Some(timeout)).await;
            let (safe, probe) = judge_payload(input, response);
            check = if safe {
                check.with_pass(probe)
            } else {
                check.with_failure(probe)
            };
        }

        check.finish()
    }

    pub fn authentication(&self) -> CheckResult {
        CheckResult::skipped("authentication not yet implemented")
    }

    /// Fires the burst concurrently. Absence of 429 is reported, never
    /// failed.
    pub async fn rate_limiting(&self) -> CheckResult {
        let burst = self.settings.rate_limit_burst;
        let timeout = Duration::from_secs(self.settings.burst_timeout_secs);

        let mut requests = JoinSet::new();
        for i in 0..burst {
            let client = self.client.clone();
            let request = EvaluateRequest {
                action: format!("Rate limit test {}", i),
                tenant_id: self.tenant_id,
                metadata: None,
            };
            requests.spawn(async move {
                match client.evaluate(&request, Some(timeout)).await {
                    Ok(response) => Some(response.status),
                    Err(e) => {
                        debug!(error = %e, "burst request failed");
                        None
                    }
                }
            });
        }

        let mut statuses = Vec::with_capacity(burst);
        while let Some(joined) = requests.join_next().await {
            statuses.push(joined.ok().flatten());
        }
        let limited = statuses
            .iter()
            .filter(|s| **s == Some(StatusCode::TOO_MANY_REQUESTS))
            .count();

        let reason = if limited > 0 {
            "rate limiting is active"
        } else {
            "rate limiting not implemented (acceptable for current phase)"
        };
        info!(burst, limited, "rate limit burst finished");

        CheckResult::new()
            .with_pass(ProbeRecord {
                input: format!("{} concurrent evaluations", statuses.len()),
                status: SuiteStatus::Passed,
                response_code: (limited > 0).then_some(StatusCode::TOO_MANY_REQUESTS.as_u16()),
                reason: Some(format!("{} of {} requests limited", limited, statuses.len())),
            })
            .with_reason(reason)
            .finish()
    }

    pub async fn run_suite(&self) -> SuiteResult {
        let started = Instant::now();
        let mut result = SuiteResult::new();

        let checks = [
            ("input_validation", self.input_validation().await),
            ("authentication", self.authentication()),
            ("rate_limiting", self.rate_limiting().await),
        ];
        for (name, check) in checks {
            info!(check = name, status = check.status.display_name(), "security check finished");
            result.add_counts(check.counts);
            result.push(SuiteDetail::Check {
                name: name.to_string(),
                result: check,
            });
        }

        result.settle_by_failures();
        result.finish(started.elapsed())
    }
}

fn judge_payload(input: String, response: Result<RawResponse>) -> (bool, ProbeRecord) {
    match response {
        Ok(response) => {
            let code = response.status;
            let safe = code.is_client_error()
                || (code == StatusCode::OK && !response.body.to_lowercase().contains("error"));
            let probe = ProbeRecord {
                input,
                status: if safe {
                    SuiteStatus::Passed
                } else {
                    SuiteStatus::Failed
                },
                response_code: Some(code.as_u16()),
                reason: (!safe).then(|| "unexpected response".to_string()),
            };
            (safe, probe)
        }
        Err(e) => {
            debug!(error = %e, "probe rejected by transport");
            let probe = ProbeRecord {
                input,
                status: SuiteStatus::Passed,
                response_code: None,
                reason: Some("request rejected".into()),
            };
            (true, probe)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ConstitutionClient {
        ConstitutionClient::new(&server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_input_validation_rejections_and_safe_accepts_pass() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/evaluate"))
            .and(body_partial_json(json!({"tenantId": "invalid"})))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/evaluate"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"data": {"compliance": "FAIL"}})),
            )
            .mount(&server)
            .await;

        let client = client(&server);
        let settings = SecuritySettings::default();
        let check = SecurityProbe::new(&client, &settings, 1)
            .input_validation()
            .await;

        assert_eq!(check.status, SuiteStatus::Passed);
        assert_eq!(check.counts.total, 4);
        assert_eq!(check.counts.passed, 4);
        assert!(check
            .probes
            .iter()
            .all(|p| p.input.chars().count() <= PROBE_INPUT_LIMIT));
    }

    #[tokio::test]
    async fn test_input_validation_leaked_error_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/evaluate"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("Internal Error: syntax near DROP"),
            )
            .mount(&server)
            .await;

        let client = client(&server);
        let settings = SecuritySettings::default();
        let check = SecurityProbe::new(&client, &settings, 1)
            .input_validation()
            .await;

        assert_eq!(check.status, SuiteStatus::Failed);
        assert_eq!(check.counts.failed, 4);
        assert_eq!(check.probes[0].reason.as_deref(), Some("unexpected response"));
    }

    #[tokio::test]
    async fn test_transport_rejection_is_safe() {
        let client =
            ConstitutionClient::new("http://127.0.0.1:9", Duration::from_millis(300)).unwrap();
        let settings = SecuritySettings::default();
        let check = SecurityProbe::new(&client, &settings, 1)
            .input_validation()
            .await;

        assert_eq!(check.status, SuiteStatus::Passed);
        assert_eq!(check.counts.passed, 4);
    }

    #[tokio::test]
    async fn test_no_429_still_passes_with_reason() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/evaluate"))
            .respond_with(ResponseTemplate::new(200))
            .expect(50)
            .mount(&server)
            .await;

        let client = client(&server);
        let settings = SecuritySettings::default();
        let check = SecurityProbe::new(&client, &settings, 1)
            .rate_limiting()
            .await;

        assert_eq!(check.status, SuiteStatus::Passed);
        assert_eq!(check.counts.passed, 1);
        assert!(check.reason.unwrap().contains("not implemented"));
    }

    #[tokio::test]
    async fn test_429_reports_active_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/evaluate"))
            .respond_with(ResponseTemplate::new(200))
            .up_to_n_times(10)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/evaluate"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = client(&server);
        let settings = SecuritySettings::default();
        let check = SecurityProbe::new(&client, &settings, 1)
            .rate_limiting()
            .await;

        assert_eq!(check.status, SuiteStatus::Passed);
        assert_eq!(check.reason.as_deref(), Some("rate limiting is active"));
        assert_eq!(check.probes[0].response_code, Some(429));
    }

    #[tokio::test]
    async fn test_suite_skips_authentication_without_counting_it() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/evaluate"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let client = client(&server);
        let settings = SecuritySettings {
            rate_limit_burst: 5,
            ..SecuritySettings::default()
        };
        let result = SecurityProbe::new(&client, &settings, 1).run_suite().await;

        assert_eq!(result.status, SuiteStatus::Passed);
        assert_eq!(result.total, 5);
        assert_eq!(result.passed, 5);
        assert!(result.details.iter().any(|d| matches!(
            d,
            SuiteDetail::Check { name, result } if name == "authentication" && result.status == SuiteStatus::Skipped
        )));
    }
}
