use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("completion transport error: {0}")]
    Transport(String),
    #[error("completion timed out after {0} ms")]
    Timeout(u64),
    #[error("completion service returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("completion response unreadable: {0}")]
    Response(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, UpstreamError>;
}

pub struct OpenAiCompletionClient {
    client: Client,
    endpoint: String,
    api_key: String,
    timeout_ms: Option<u64>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    text: String,
}

impl OpenAiCompletionClient {
    pub fn new(api_base: &str, api_key: String, timeout_ms: Option<u64>) -> Result<Self, String> {
        let mut builder = Client::builder();
        if let Some(ms) = timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        let client = builder.build().map_err(|e| e.to_string())?;
        Ok(Self {
            client,
            endpoint: format!("{}/completions", api_base.trim_end_matches('/')),
            api_key,
            timeout_ms,
        })
    }

    fn classify(&self, err: reqwest::Error) -> UpstreamError {
        match self.timeout_ms {
            Some(ms) if err.is_timeout() => UpstreamError::Timeout(ms),
            _ => UpstreamError::Transport(err.to_string()),
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompletionClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, UpstreamError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| match self.classify(e) {
                UpstreamError::Transport(msg) => UpstreamError::Response(msg),
                other => other,
            })?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.text)
            .ok_or_else(|| UpstreamError::Response("no choices in completion".to_string()))
    }
}
