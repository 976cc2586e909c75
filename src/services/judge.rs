use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::core::config::{JudgeSettings, Settings};

/// Judge0 status id for a run that finished without runtime or compile errors.
pub(crate) const ACCEPTED_STATUS_ID: i64 = 3;

#[derive(Debug, Clone)]
pub(crate) struct JudgeRequest {
    pub(crate) source: String,
    pub(crate) language: String,
    pub(crate) stdin: String,
    pub(crate) cpu_time_limit_seconds: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct JudgeOutcome {
    pub(crate) status_id: i64,
    pub(crate) status: String,
    pub(crate) stdout: Option<String>,
    pub(crate) stderr: Option<String>,
    pub(crate) compile_output: Option<String>,
}

impl JudgeOutcome {
    pub(crate) fn accepted(&self) -> bool {
        self.status_id == ACCEPTED_STATUS_ID
    }
}

#[derive(Debug, Error)]
pub(crate) enum JudgeError {
    #[error("judge unreachable: {0}")]
    Transport(String),
    #[error("judge returned HTTP {status}: {body}")]
    Api { status: u16, body: String },
    #[error("judge response could not be parsed: {0}")]
    Decode(String),
    #[error("judge did not answer within {0:?}")]
    Timeout(Duration),
    #[error("language '{0}' is not supported")]
    UnsupportedLanguage(String),
}

/// Runs one program against one stdin. Implementations are stateless and safe to call
/// concurrently.
#[async_trait]
pub(crate) trait CodeJudge: Send + Sync {
    fn supports_language(&self, language: &str) -> bool {
        language_id(language).is_some()
    }

    async fn execute(&self, request: &JudgeRequest) -> Result<JudgeOutcome, JudgeError>;
}

pub(crate) fn language_id(language: &str) -> Option<u32> {
    match language.trim().to_ascii_lowercase().as_str() {
        "python" | "python3" | "py" => Some(71),
        "javascript" | "js" | "node" => Some(63),
        "java" => Some(62),
        "cpp" | "c++" => Some(54),
        "c" => Some(50),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct Judge0Status {
    id: i64,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct Judge0Response {
    #[serde(default)]
    stdout: Option<String>,
    #[serde(default)]
    stderr: Option<String>,
    #[serde(default)]
    compile_output: Option<String>,
    status: Judge0Status,
}

#[derive(Debug, Clone)]
pub(crate) struct Judge0Client {
    client: Client,
    base_url: String,
    api_key: String,
    api_key_header: String,
    max_retries: u32,
}

impl Judge0Client {
    pub(crate) fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let judge = settings.judge();
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(judge.request_timeout_seconds))
            .build()
            .context("Failed to build judge HTTP client")?;

        Ok(Self {
            client,
            base_url: judge.base_url.clone(),
            api_key: judge.api_key.clone(),
            api_key_header: judge.api_key_header.clone(),
            max_retries: judge.max_retries,
        })
    }

    async fn send_once(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<JudgeOutcome, JudgeError> {
        let mut request = self.client.post(url).json(payload);
        if !self.api_key.is_empty() {
            request = request.header(self.api_key_header.as_str(), self.api_key.as_str());
        }

        let response = request.send().await.map_err(|err| JudgeError::Transport(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(JudgeError::Api { status: status.as_u16(), body });
        }

        let body: Judge0Response =
            response.json().await.map_err(|err| JudgeError::Decode(err.to_string()))?;

        Ok(JudgeOutcome {
            status_id: body.status.id,
            status: body.status.description,
            stdout: body.stdout,
            stderr: body.stderr,
            compile_output: body.compile_output,
        })
    }
}

fn is_retryable(error: &JudgeError) -> bool {
    match error {
        JudgeError::Transport(_) => true,
        JudgeError::Api { status, .. } => {
            *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || *status >= 500
        }
        _ => false,
    }
}

#[async_trait]
impl CodeJudge for Judge0Client {
    async fn execute(&self, request: &JudgeRequest) -> Result<JudgeOutcome, JudgeError> {
        let language_id = language_id(&request.language)
            .ok_or_else(|| JudgeError::UnsupportedLanguage(request.language.clone()))?;

        let url = format!("{}/submissions?base64_encoded=false&wait=true", self.base_url);
        let payload = json!({
            "source_code": request.source,
            "language_id": language_id,
            "stdin": request.stdin,
            "cpu_time_limit": request.cpu_time_limit_seconds,
        });

        let mut attempt = 0;
        loop {
            match self.send_once(&url, &payload).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) if attempt < self.max_retries && is_retryable(&err) => {
                    tracing::warn!(attempt, error = %err, "Judge call failed, retrying");
                    tokio::time::sleep(JudgeSettings::retry_backoff(attempt)).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
