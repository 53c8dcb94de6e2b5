//! Client for the external code-execution judge.
//!
//! The coordinator only knows the [`Judge`] trait; [`JdoodleClient`] speaks
//! the JDoodle `v1/execute` wire format over HTTP.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::JudgeConfig;
use crate::error::{CoordinatorError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRequest {
    pub script: String,
    pub language: String,
}

/// What every participant of a room sees after a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub output: String,
    pub error: String,
    pub time: String,
    pub memory: String,
}

impl ExecutionResult {
    /// Degraded result used when the judge could not be reached or understood
    pub fn from_error(err: &CoordinatorError) -> Self {
        let error = match err {
            CoordinatorError::ExternalServiceFailure(reason) => reason.clone(),
            other => other.to_string(),
        };

        Self {
            output: String::new(),
            error,
            time: "0".to_string(),
            memory: "0".to_string(),
        }
    }
}

pub trait Judge: Send + Sync {
    fn execute(&self, request: ExecutionRequest) -> BoxFuture<'_, Result<ExecutionResult>>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JdoodleRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    script: &'a str,
    language: &'a str,
    version_index: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JdoodleResponse {
    #[serde(default)]
    output: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    cpu_time: Option<Value>,
    #[serde(default)]
    memory: Option<Value>,
}

impl JdoodleResponse {
    fn into_result(self) -> ExecutionResult {
        ExecutionResult {
            output: self.output.unwrap_or_default(),
            error: self.error.unwrap_or_default(),
            time: metric_to_string(self.cpu_time),
            memory: metric_to_string(self.memory),
        }
    }
}

// The judge reports metrics as strings, numbers or null depending on the outcome.
fn metric_to_string(value: Option<Value>) -> String {
    match value {
        Some(Value::String(s)) if !s.is_empty() => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => "0".to_string(),
    }
}

pub struct JdoodleClient {
    config: JudgeConfig,
    client: reqwest::Client,
}

impl JdoodleClient {
    pub fn new(config: JudgeConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| CoordinatorError::internal(format!("Failed to create HTTP client: {}", e)))?;

        if config.client_id.is_empty() || config.client_secret.is_empty() {
            tracing::warn!("Judge credentials are not configured, executions will likely fail");
        }

        Ok(Self { config, client })
    }

    async fn run(&self, request: ExecutionRequest) -> Result<ExecutionResult> {
        let body = JdoodleRequest {
            client_id: &self.config.client_id,
            client_secret: &self.config.client_secret,
            script: &request.script,
            language: &request.language,
            version_index: &self.config.version_index,
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CoordinatorError::Timeout("judge request".to_string())
                } else {
                    CoordinatorError::external(format!("Request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let reported = serde_json::from_str::<JdoodleResponse>(&text)
                .ok()
                .and_then(|body| body.error)
                .filter(|error| !error.is_empty());

            return Err(CoordinatorError::external(
                reported.unwrap_or_else(|| format!("Judge responded with status {}", status)),
            ));
        }

        let parsed: JdoodleResponse = response
            .json()
            .await
            .map_err(|e| CoordinatorError::external(format!("Failed to parse judge response: {}", e)))?;

        tracing::debug!(language = %request.language, "Judge execution completed");
        Ok(parsed.into_result())
    }
}

impl Judge for JdoodleClient {
    fn execute(&self, request: ExecutionRequest) -> BoxFuture<'_, Result<ExecutionResult>> {
        Box::pin(self.run(request))
    }
}
