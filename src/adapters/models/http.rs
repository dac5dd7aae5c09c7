//! Remote advisor backend over HTTP.
//!
//! Sends a chat-style JSON request with a bearer token and accepts the common
//! reply shapes (`choices[0].message.content`, `content[0].text`, `text`,
//! `output`). Requests are throttled client-side.

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{header, Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult, GenerationError};
use crate::domain::models::RemoteAdvisorConfig;
use crate::domain::ports::{ModelClient, ModelRequest};

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

pub struct HttpModelClient {
    name: String,
    client: Client,
    endpoint: String,
    model: Option<String>,
    api_key: Option<String>,
    max_tokens: u32,
    timeout_secs: u64,
    limiter: DefaultDirectRateLimiter,
}

impl HttpModelClient {
    /// Reads the bearer token from `config.api_key_env` once, at construction.
    pub fn new(name: impl Into<String>, config: &RemoteAdvisorConfig) -> DomainResult<Self> {
        let api_key = std::env::var(&config.api_key_env).ok().filter(|k| !k.is_empty());
        Self::with_api_key(name, config, api_key)
    }

    pub fn with_api_key(
        name: impl Into<String>,
        config: &RemoteAdvisorConfig,
        api_key: Option<String>,
    ) -> DomainResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DomainError::ValidationFailed(format!("Failed to create HTTP client: {e}")))?;
        let per_minute = NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            name: name.into(),
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
            max_tokens: config.max_tokens,
            timeout_secs: config.timeout_secs,
            limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
        })
    }

    fn backend_error(&self, message: impl Into<String>) -> GenerationError {
        GenerationError::Backend {
            backend: self.name.clone(),
            message: message.into(),
        }
    }
}

/// Text of the first choice/content block in any of the accepted shapes.
fn reply_text(body: &Value) -> Option<String> {
    let candidates = [
        body.pointer("/choices/0/message/content"),
        body.pointer("/choices/0/text"),
        body.pointer("/content/0/text"),
        body.get("text"),
        body.get("output"),
        body.get("response"),
    ];
    candidates
        .into_iter()
        .flatten()
        .find_map(Value::as_str)
        .map(str::to_string)
}

#[async_trait]
impl ModelClient for HttpModelClient {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, request), fields(backend = %self.name))]
    async fn complete(&self, request: &ModelRequest) -> Result<String, GenerationError> {
        self.limiter.until_ready().await;

        let mut messages = Vec::with_capacity(2);
        if !request.system.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: &request.system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });
        let body = ChatRequest {
            model: self.model.as_deref(),
            max_tokens: self.max_tokens,
            temperature: 0.0,
            messages,
        };

        let mut http = self
            .client
            .post(&self.endpoint)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }

        let response = http.send().await.map_err(|e| {
            if e.is_timeout() {
                GenerationError::Timeout {
                    backend: self.name.clone(),
                    secs: self.timeout_secs,
                }
            } else {
                self.backend_error(format!("request failed: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            if status == StatusCode::TOO_MANY_REQUESTS {
                warn!("advisor is rate limiting us");
            }
            return Err(self.backend_error(format!("API error {status}: {text}")));
        }

        let body: Value = response.json().await.map_err(|e| GenerationError::Unparseable {
            backend: self.name.clone(),
            message: e.to_string(),
        })?;
        let text = reply_text(&body).ok_or_else(|| GenerationError::Unparseable {
            backend: self.name.clone(),
            message: "no reply text in response".to_string(),
        })?;
        debug!(bytes = text.len(), "advisor replied");
        Ok(text)
    }
}
