//! HTTP client for the chat-completion API

use crate::inference::{
    emergency, CallOptions, ChatMessage, CredentialPool, InferenceError, Rotation,
    StructuredReply, DEFAULT_ENDPOINT, DEFAULT_MODEL,
};
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

static RATE_LIMIT_PHRASES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)rate[ _-]?limit|too many requests|quota exceeded|exceeded your current quota|requests per (?:min|minute|day)",
    )
    .unwrap()
});

/// Connection settings for [`InferenceClient`]
#[derive(Debug, Clone)]
pub struct InferenceSettings {
    pub endpoint: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Default time box of one call
    pub timeout: Duration,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: Some(0.2),
            max_tokens: Some(800),
            timeout: Duration::from_secs(20),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

/// Chat-completion client with credential rotation and offline fallback
///
/// Cheap to clone; clones share the HTTP client and the credential pool.
#[derive(Debug, Clone)]
pub struct InferenceClient {
    http: Client,
    settings: InferenceSettings,
    pool: Arc<CredentialPool>,
}

impl InferenceClient {
    pub fn new(http: Client, settings: InferenceSettings, pool: Arc<CredentialPool>) -> Self {
        Self {
            http,
            settings,
            pool,
        }
    }

    pub fn pool(&self) -> &Arc<CredentialPool> {
        &self.pool
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    pub fn timeout(&self) -> Duration {
        self.settings.timeout
    }

    /// Operator action: leaves permanent fallback and rewinds the credentials
    pub fn reset_rate_limit_state(&self) {
        self.pool.reset_rate_limit_state();
    }

    /// Sends one chat completion
    ///
    /// Rate limits never reach the caller: they rotate credentials or degrade
    /// to an offline reply tagged `fallback = true`. All other failures are
    /// returned as [`InferenceError`].
    pub async fn call(
        &self,
        messages: &[ChatMessage],
        options: &CallOptions,
        timeout: Duration,
    ) -> Result<StructuredReply, InferenceError> {
        let Some((mut index, mut key)) = self.pool.current() else {
            if self.pool.is_empty() {
                tracing::debug!("No inference credentials, answering offline");
            } else {
                tracing::debug!("Inference in permanent fallback, answering offline");
            }
            return Ok(emergency::generate(messages));
        };

        loop {
            match self.send(&key, messages, options, timeout).await {
                Ok(reply) => {
                    self.pool.record_success();
                    return Ok(reply);
                }
                Err(InferenceError::RateLimited) => match self.pool.on_rate_limit(index) {
                    Rotation::Retry {
                        index: next_index,
                        key: next_key,
                    } => {
                        index = next_index;
                        key = next_key;
                    }
                    Rotation::Exhausted => {
                        tracing::warn!("Inference credentials exhausted, answering offline");
                        return Ok(emergency::generate(messages));
                    }
                },
                Err(e) => {
                    tracing::debug!(error = %e, "Inference call failed");
                    return Err(e);
                }
            }
        }
    }

    async fn send(
        &self,
        key: &str,
        messages: &[ChatMessage],
        options: &CallOptions,
        timeout: Duration,
    ) -> Result<StructuredReply, InferenceError> {
        let model = options.model.as_deref().unwrap_or(&self.settings.model);
        let request = ChatRequest {
            model,
            messages,
            temperature: options.temperature.or(self.settings.temperature),
            max_tokens: options.max_tokens.or(self.settings.max_tokens),
        };

        tracing::debug!(model = model, messages = messages.len(), "Calling inference API");

        let exchange = async {
            let response = self
                .http
                .post(&self.settings.endpoint)
                .bearer_auth(key)
                .json(&request)
                .send()
                .await?;
            let status = response.status();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status, body))
        };

        let (status, body) = tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| InferenceError::Timeout {
                ms: timeout.as_millis() as u64,
            })?
            .map_err(|e| {
                if e.is_timeout() {
                    InferenceError::Timeout {
                        ms: timeout.as_millis() as u64,
                    }
                } else {
                    InferenceError::Network(e.to_string())
                }
            })?;

        interpret(status, &body, model)
    }
}

/// Maps one HTTP exchange to a reply or a normalized error
fn interpret(status: StatusCode, body: &str, model: &str) -> Result<StructuredReply, InferenceError> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(InferenceError::RateLimited);
    }

    let json: Option<Value> = serde_json::from_str(body).ok();
    let api_message = json
        .as_ref()
        .and_then(|v| v.pointer("/error/message"))
        .and_then(Value::as_str)
        .map(str::to_string);

    if let Some(message) = &api_message {
        if is_rate_limit_text(message) {
            return Err(InferenceError::RateLimited);
        }
    }

    if !status.is_success() {
        if is_rate_limit_text(body) {
            return Err(InferenceError::RateLimited);
        }
        return Err(match api_message {
            Some(message) => InferenceError::Api(message),
            None => InferenceError::Http(status.as_u16()),
        });
    }

    if let Some(message) = api_message {
        return Err(InferenceError::Api(message));
    }

    let json = json.ok_or_else(|| InferenceError::Parse("response body is not JSON".into()))?;
    let content = json
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| InferenceError::Parse("missing choices[0].message.content".into()))?;

    let model = json
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or(model)
        .to_string();

    Ok(StructuredReply {
        content: content.to_string(),
        model,
        fallback: false,
    })
}

/// Returns true if `text` uses known rate-limit phrasing
pub fn is_rate_limit_text(text: &str) -> bool {
    RATE_LIMIT_PHRASES.is_match(text)
}
