//! Uniform extraction result

use crate::HarvestError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;

/// Provenance tag of the locally generated placeholder
pub const PLACEHOLDER_SOURCE: &str = "Sample data (all sources failed)";

/// Provenance tag of an inference-first answer
pub const AI_ANALYSIS_SOURCE: &str = "AI analysis";

/// Outcome of one extraction attempt, whichever method produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub success: bool,
    pub data: Option<Value>,
    /// Human-readable provenance, e.g. `API:<url>`, `DOM:<url>`, `AI:<model>`
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Kind of the last error seen before giving up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    /// The data came from an offline inference fallback
    #[serde(default)]
    pub degraded: bool,
}

impl ExtractionResult {
    pub fn succeeded(data: Value, source: impl Into<String>, started: Instant) -> Self {
        Self {
            success: true,
            data: Some(data),
            source: source.into(),
            timestamp: Utc::now(),
            elapsed_ms: started.elapsed().as_millis() as u64,
            error: None,
            error_kind: None,
            degraded: false,
        }
    }

    pub fn failed(
        data: Option<Value>,
        source: impl Into<String>,
        error: Option<&HarvestError>,
        started: Instant,
    ) -> Self {
        Self {
            success: false,
            data,
            source: source.into(),
            timestamp: Utc::now(),
            elapsed_ms: started.elapsed().as_millis() as u64,
            error: Some(
                error
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "All extraction methods failed".to_string()),
            ),
            error_kind: error.map(|e| e.kind().to_string()),
            degraded: false,
        }
    }

    pub fn degraded(mut self) -> Self {
        self.degraded = true;
        self
    }

    pub fn is_placeholder(&self) -> bool {
        self.source == PLACEHOLDER_SOURCE
    }
}
