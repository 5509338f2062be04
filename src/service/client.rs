//! Typed client for the Constitution Service HTTP contract.

use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::Result;

const USER_AGENT_VALUE: &str = concat!("speckit-runner/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Serialize)]
pub struct NewTenant<'a> {
    pub name: &'a str,
    pub slug: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewPrinciple<'a> {
    pub principle: &'a str,
    pub category: &'a str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateRequest {
    pub action: String,
    pub tenant_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchEvaluateRequest {
    pub actions: Vec<String>,
    pub tenant_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchRequest<'a> {
    pub query: &'a str,
    pub limit: u32,
    pub threshold: f64,
}

/// `{data: ...}` envelope used by every API response.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub compliance: String,
    #[serde(default)]
    pub overall_score: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchEvaluation {
    pub results: Vec<Evaluation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrincipleMatch {
    pub similarity: f64,
}

/// Status and body of a response, read to completion.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: String,
}

impl RawResponse {
    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.body)
    }
}

#[derive(Debug, Clone)]
pub struct ConstitutionClient {
    client: reqwest::Client,
    base_url: String,
}

impl ConstitutionClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT_VALUE)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    /// POST any JSON body; `timeout` overrides the client default.
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        timeout: Option<Duration>,
    ) -> Result<RawResponse> {
        let url = self.api_url(path);
        let mut request = self.client.post(&url).json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(url = %url, status = status.as_u16(), "request completed");
        Ok(RawResponse { status, body })
    }

    pub async fn create_tenant(&self, tenant: &NewTenant<'_>) -> Result<StatusCode> {
        Ok(self.post_json("/tenants", tenant, None).await?.status)
    }

    pub async fn create_principle(&self, principle: &NewPrinciple<'_>) -> Result<StatusCode> {
        Ok(self.post_json("/principles", principle, None).await?.status)
    }

    pub async fn evaluate(
        &self,
        request: &EvaluateRequest,
        timeout: Option<Duration>,
    ) -> Result<RawResponse> {
        self.post_json("/evaluate", request, timeout).await
    }

    pub async fn evaluate_batch(
        &self,
        request: &BatchEvaluateRequest,
        timeout: Option<Duration>,
    ) -> Result<RawResponse> {
        self.post_json("/evaluate/batch", request, timeout).await
    }

    pub async fn search_principles(
        &self,
        request: &SearchRequest<'_>,
        timeout: Option<Duration>,
    ) -> Result<RawResponse> {
        self.post_json("/principles/search", request, timeout).await
    }
}
