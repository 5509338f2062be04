use std::time::Duration;

use tracing::debug;

/// Single-shot health probe. Transport errors mean "not healthy".
#[derive(Debug, Clone)]
pub struct HealthChecker {
    client: reqwest::Client,
}

impl HealthChecker {
    pub fn new(timeout: Duration) -> crate::error::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub async fn check(&self, url: &str) -> bool {
        match self.client.get(url).send().await {
            Ok(response) => {
                let healthy = response.status() == reqwest::StatusCode::OK;
                debug!(url, status = response.status().as_u16(), healthy, "health check");
                healthy
            }
            Err(e) => {
                debug!(url, error = %e, "health check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_check_ok() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let checker = HealthChecker::new(Duration::from_secs(5)).unwrap();
        assert!(checker.check(&format!("{}/health", server.uri())).await);
    }

    #[tokio::test]
    async fn test_check_non_200_is_unhealthy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let checker = HealthChecker::new(Duration::from_secs(5)).unwrap();
        assert!(!checker.check(&format!("{}/health", server.uri())).await);
    }

    #[tokio::test]
    async fn test_check_timeout_is_unhealthy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let checker = HealthChecker::new(Duration::from_millis(100)).unwrap();
        assert!(!checker.check(&format!("{}/health", server.uri())).await);
    }

    #[tokio::test]
    async fn test_check_connection_refused_is_unhealthy() {
        let checker = HealthChecker::new(Duration::from_millis(500)).unwrap();
        assert!(!checker.check("http://127.0.0.1:9/health").await);
    }
}
