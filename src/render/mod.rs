//! Rendering capability
//!
//! The engine never renders pages itself. It drives an external capability that
//! can `navigate(url)` and `evaluate(script)`, with replies arriving
//! asynchronously as JSON messages on an inbound channel.
//!
//! # Components
//!
//! - [`RenderingCapability`]: the trait a webview/headless-browser driver implements
//! - [`Script`]: typed DOM requests, with injectable JavaScript for real browsers
//! - [`PageMessage`]: the inbound message union (`EXTRACTION_RESULT`, ...)
//! - [`RenderSession`]: correlates replies to requests and applies timeouts
//! - [`StaticHtmlRenderer`]: built-in capability over plain HTTP + `scraper`

pub mod dom;
mod script;
mod session;
mod static_html;

pub use script::{Script, SelectorSpec, BRIDGE_OBJECT};
pub use session::RenderSession;
pub use static_html::{build_http_client, StaticHtmlRenderer};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

/// Error text fragments that identify a page refusing to be loaded or framed
const BLOCKED_SIGNATURES: &[&str] = &[
    "cors",
    "access-control-allow-origin",
    "x-frame-options",
    "frame-ancestors",
    "refused to display",
    "refused to frame",
    "blocked by client",
];

/// Errors raised by the rendering capability or the session around it
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Script evaluation failed: {0}")]
    Evaluation(String),

    #[error("No reply from page within {ms}ms")]
    Timeout { ms: u64 },

    #[error("Page message channel closed")]
    ChannelClosed,

    #[error("No page loaded")]
    NoPage,

    #[error("Unexpected page reply: {0}")]
    UnexpectedReply(String),
}

impl RenderError {
    /// Returns true if the error text carries a CORS / framing refusal signature
    pub fn is_blocked_by_origin(&self) -> bool {
        let text = self.to_string().to_lowercase();
        BLOCKED_SIGNATURES.iter().any(|sig| text.contains(sig))
    }
}

/// Messages posted back by the page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PageMessage {
    ExtractionResult {
        data: Value,
    },
    ExtractionError {
        error: String,
    },
    #[serde(rename_all = "camelCase")]
    CrawlerLinksExtracted {
        current_url: String,
        links: Vec<String>,
        depth: u32,
    },
    DomTextContent {
        data: String,
    },
}

/// A page message plus the correlation id of the script that produced it
///
/// Legacy bridges that cannot echo the id deliver `id: None`; the session then
/// falls back to matching by message type and current URL.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub id: Option<u64>,
    pub message: PageMessage,
}

impl InboundMessage {
    pub fn correlated(id: u64, message: PageMessage) -> Self {
        Self {
            id: Some(id),
            message,
        }
    }

    /// Parses a raw bridge message such as
    /// `{"type":"DOM_TEXT_CONTENT","id":4,"data":"..."}`
    pub fn from_json(raw: &str) -> Result<Self, RenderError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| RenderError::UnexpectedReply(format!("invalid JSON: {}", e)))?;
        let id = value.get("id").and_then(Value::as_u64);
        let message: PageMessage = serde_json::from_value(value)
            .map_err(|e| RenderError::UnexpectedReply(e.to_string()))?;
        Ok(Self { id, message })
    }
}

/// Sending half handed to capabilities for delivering page messages
pub type MessageSender = mpsc::UnboundedSender<InboundMessage>;

/// A script plus the correlation id its reply must carry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptEnvelope {
    pub id: u64,
    pub script: Script,
}

impl ScriptEnvelope {
    /// JavaScript to inject for this request
    pub fn to_js(&self) -> String {
        self.script.to_js(self.id)
    }
}

/// A page loader that can run scripts in the page context
///
/// `evaluate` returns as soon as the script is dispatched; its result is
/// delivered later through the [`MessageSender`] the capability was built with.
#[async_trait]
pub trait RenderingCapability: Send + Sync {
    /// Loads `url` in the managed view
    async fn navigate(&self, url: &str) -> Result<(), RenderError>;

    /// Dispatches a script into the current page
    async fn evaluate(&self, envelope: ScriptEnvelope) -> Result<(), RenderError>;
}
