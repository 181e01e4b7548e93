//! Resilient inference client
//!
//! Wraps a chat-completion style HTTP API with credential rotation, rate-limit
//! detection and a deterministic offline fallback.
//!
//! # Degradation policy
//!
//! A detected rate limit rotates to the next credential of the shared
//! [`CredentialPool`]. When no credential remains, or the consecutive-hit
//! threshold is reached, the pool switches to permanent fallback: every later
//! call is answered by the [`emergency`] generator without touching the
//! network, until [`CredentialPool::reset_rate_limit_state`] is called.
//!
//! Fallback answers have the same shape as live ones; callers branch on
//! [`StructuredReply::fallback`].

mod client;
pub mod emergency;
mod pool;
pub mod reply;

pub use client::{InferenceClient, InferenceSettings};
pub use pool::{CredentialPool, RateLimitState, Rotation};
pub use reply::ParsedReply;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default chat-completion endpoint
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// Default model
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default number of consecutive rate-limit hits before permanent fallback
pub const DEFAULT_RATE_LIMIT_THRESHOLD: u32 = 3;

/// Model name reported on emergency replies
pub const FALLBACK_MODEL: &str = "offline-fallback";

/// Errors surfaced to callers of [`InferenceClient::call`]
///
/// `RateLimited` is only used internally; the client absorbs it into rotation
/// or fallback before returning.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InferenceError {
    #[error("Inference call timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("Inference API returned HTTP {0}")]
    Http(u16),

    #[error("Inference API error: {0}")]
    Api(String),

    #[error("Inference API rate limited")]
    RateLimited,

    #[error("Inference network error: {0}")]
    Network(String),

    #[error("Malformed inference response: {0}")]
    Parse(String),
}

/// One chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Per-call overrides; unset fields fall back to the client's settings
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// A reply from the inference service or the offline fallback
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructuredReply {
    /// Raw message content
    pub content: String,

    /// Model that produced the content
    pub model: String,

    /// True when the content was generated offline
    pub fallback: bool,
}

impl StructuredReply {
    /// Interprets the content as structured data
    pub fn parsed(&self) -> ParsedReply {
        ParsedReply::parse(&self.content)
    }
}
