use crate::extract::{ExtractionTarget, ExtractorSettings, NamedTransform};
use crate::inference::{
    InferenceSettings, DEFAULT_ENDPOINT, DEFAULT_MODEL, DEFAULT_RATE_LIMIT_THRESHOLD,
};
use crate::render::SelectorSpec;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Main configuration structure for Sumi-Harvest
///
/// Every section is optional; an empty file yields the defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    pub inference: InferenceConfig,
    pub extraction: ExtractionConfig,
    pub crawler: CrawlerConfig,
    #[serde(rename = "target")]
    pub targets: Vec<TargetEntry>,
}

impl Config {
    /// Builds the extraction targets declared with `[[target]]`
    pub fn extraction_targets(&self) -> Vec<ExtractionTarget> {
        self.targets.iter().map(TargetEntry::to_target).collect()
    }
}

/// Inference service configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct InferenceConfig {
    /// Chat-completions endpoint
    pub endpoint: String,

    pub model: String,

    /// Credentials tried in order; rotated on rate limiting
    pub api_keys: Vec<String>,

    /// Rate-limit hits after which the emergency generator is used for good
    pub rate_limit_threshold: u32,

    /// Per-call timeout (milliseconds)
    pub timeout_ms: u64,

    pub temperature: Option<f32>,

    pub max_tokens: Option<u32>,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        let settings = InferenceSettings::default();
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_keys: Vec::new(),
            rate_limit_threshold: DEFAULT_RATE_LIMIT_THRESHOLD,
            timeout_ms: settings.timeout.as_millis() as u64,
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        }
    }
}

impl InferenceConfig {
    pub fn settings(&self) -> InferenceSettings {
        InferenceSettings {
            endpoint: self.endpoint.clone(),
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

/// Fallback chain configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ExtractionConfig {
    /// Ask the inference service about the raw query before trying targets
    pub inference_first: bool,

    /// Per-request timeout of direct API and proxy fetches (milliseconds)
    pub api_timeout_ms: u64,

    /// Time box of each fallback method (milliseconds)
    pub method_timeout_ms: u64,

    /// Wait after navigation before scripts run (milliseconds)
    pub settle_delay_ms: u64,

    /// Maximum characters of page text sent to the inference service
    pub text_capture_limit: usize,

    /// Relay prefix; the URL-encoded target URL is appended
    pub proxy_endpoint: Option<String>,

    /// Hosts known to refuse rendering; wildcard patterns like `*.example.com`
    pub blocked_hosts: Vec<String>,

    pub user_agent: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            inference_first: false,
            api_timeout_ms: 8_000,
            method_timeout_ms: 15_000,
            settle_delay_ms: 1_500,
            text_capture_limit: 4_000,
            proxy_endpoint: None,
            blocked_hosts: Vec::new(),
            user_agent: concat!("sumi-harvest/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ExtractionConfig {
    pub fn settings(&self) -> ExtractorSettings {
        ExtractorSettings {
            inference_first: self.inference_first,
            api_timeout: Duration::from_millis(self.api_timeout_ms),
            method_timeout: Duration::from_millis(self.method_timeout_ms),
            text_capture_limit: self.text_capture_limit,
            proxy_endpoint: self.proxy_endpoint.clone(),
            blocked_hosts: self.blocked_hosts.clone(),
        }
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Maximum number of pages visited per run
    pub max_pages: u32,

    /// Maximum link distance from the start URL
    pub depth_limit: u32,

    pub follow_external_links: bool,

    /// Pause after each processed page (milliseconds)
    pub delay_between_requests_ms: u64,

    /// When non-empty, a link must contain one of these substrings
    pub url_include_patterns: Vec<String>,

    /// Links containing any of these substrings are dropped
    pub url_exclude_patterns: Vec<String>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_pages: 50,
            depth_limit: 2,
            follow_external_links: false,
            delay_between_requests_ms: 1_000,
            url_include_patterns: Vec::new(),
            url_exclude_patterns: Vec::new(),
        }
    }
}

/// One `[[target]]` entry
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TargetEntry {
    pub url: String,

    pub display_name: String,

    #[serde(default)]
    pub keywords: Vec<String>,

    #[serde(default)]
    pub fallback_api_urls: Vec<String>,

    #[serde(default)]
    pub use_proxy: bool,

    #[serde(default = "default_ai_assist")]
    pub ai_assist: bool,

    /// `[target.fields.<name>]` tables
    #[serde(default)]
    pub fields: BTreeMap<String, FieldEntry>,
}

fn default_ai_assist() -> bool {
    true
}

/// Selector of one field plus an optional named transform
#[derive(Debug, Clone, Deserialize)]
pub struct FieldEntry {
    #[serde(flatten)]
    pub spec: SelectorSpec,

    /// One of `number`, `trim`, `lowercase`, `uppercase`
    #[serde(default)]
    pub transform: Option<String>,
}

impl TargetEntry {
    /// Converts the entry into an [`ExtractionTarget`]
    ///
    /// Unknown transform names are skipped here; validation rejects them
    /// before this point for loaded files.
    pub fn to_target(&self) -> ExtractionTarget {
        let mut target = ExtractionTarget::new(&self.url, &self.display_name)
            .with_keywords(self.keywords.iter().cloned())
            .with_proxy(self.use_proxy)
            .with_ai_assist(self.ai_assist);
        for api in &self.fallback_api_urls {
            target = target.with_api(api);
        }
        for (name, field) in &self.fields {
            target = target.with_field(name, field.spec.clone());
            if let Some(transform) = field.transform.as_deref().and_then(NamedTransform::from_name) {
                target.field_transforms.insert(name.clone(), transform.into_fn());
            }
        }
        target
    }
}
