//! Sumi-Harvest: structured fact extraction from live web pages
//!
//! This crate turns a query or a declarative target into structured data by
//! walking an ordered fallback chain (direct API, rendered DOM, inference-assisted
//! DOM analysis, proxy relay), and drives that chain across a bounded link graph
//! with a breadth-first crawler.

pub mod config;
pub mod crawler;
pub mod data_domain;
pub mod extract;
pub mod inference;
pub mod output;
pub mod progress;
pub mod render;
pub mod url;

use thiserror::Error;

pub use inference::InferenceError;
pub use render::RenderError;

/// Main error type for Sumi-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("Blocked by origin policy at {url}: {reason}")]
    BlockedByOrigin { url: String, reason: String },

    #[error("Parse error ({context}): {message}")]
    Parse { context: String, message: String },

    /// Reserved; never returned. Rate limits are absorbed by credential
    /// rotation and the offline fallback.
    #[error("Inference service is rate limited")]
    RateLimited,

    #[error("No configured target matches query '{query}'")]
    NoRelevantTarget { query: String },

    #[error("No extraction targets configured")]
    NoTargetsConfigured,

    #[error("A crawl run is already active on this crawler")]
    AlreadyRunning,

    #[error("No rendering capability available")]
    NoRenderer,

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarvestError {
    /// Short, stable label for the error kind (used in result payloads)
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Network { .. } | Self::Reqwest(_) | Self::Io(_) => "network",
            Self::BlockedByOrigin { .. } => "blocked_by_origin",
            Self::Parse { .. } | Self::UrlError(_) | Self::UrlParse(_) => "parse",
            Self::RateLimited => "rate_limited",
            Self::NoRelevantTarget { .. } => "no_relevant_target",
            Self::NoTargetsConfigured => "no_targets_configured",
            Self::AlreadyRunning => "already_running",
            Self::NoRenderer => "no_renderer",
            Self::Render(_) => "render",
            Self::Inference(_) => "inference",
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Sumi-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlConfig, CrawlRunResult, Crawler};
pub use extract::{ExtractionResult, ExtractionTarget, Extractor, SelectorSpec};
pub use inference::{InferenceClient, StructuredReply};
pub use progress::{EngineEvent, EventBus};
pub use url::{extract_domain, normalize_url};
