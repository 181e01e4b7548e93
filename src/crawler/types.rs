//! Crawl configuration and run results

use crate::config::CrawlerConfig;
use crate::extract::{ExtractionResult, ExtractionTarget};
use crate::render::SelectorSpec;
use crate::url::LinkFilter;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// What to extract from every crawled page
#[derive(Debug, Clone)]
pub struct PageExtractionOptions {
    pub field_selectors: BTreeMap<String, SelectorSpec>,
    /// Allow inference over page text when selectors resolve nothing
    pub ai_assist: bool,
    /// Time box of the link-extraction round trip
    pub link_timeout: Duration,
}

impl Default for PageExtractionOptions {
    fn default() -> Self {
        let mut field_selectors = BTreeMap::new();
        field_selectors.insert("title".to_string(), SelectorSpec::text("title"));
        field_selectors.insert("heading".to_string(), SelectorSpec::text("h1"));
        Self {
            field_selectors,
            ai_assist: false,
            link_timeout: Duration::from_secs(10),
        }
    }
}

impl PageExtractionOptions {
    /// Builds the extraction target for one crawled page
    pub fn target_for(&self, url: &str) -> ExtractionTarget {
        let mut target = ExtractionTarget::new(url, url).with_ai_assist(self.ai_assist);
        target.field_selectors = self.field_selectors.clone();
        target
    }
}

/// Settings of one crawl run
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub start_url: String,
    pub max_pages: u32,
    pub depth_limit: u32,
    pub url_include_patterns: Vec<String>,
    pub url_exclude_patterns: Vec<String>,
    pub follow_external_links: bool,
    pub delay_between_requests_ms: u64,
    pub page_extraction: PageExtractionOptions,
}

impl CrawlConfig {
    /// Creates a config with the default limits (50 pages, depth 2, 1s delay)
    pub fn new(start_url: impl Into<String>) -> Self {
        Self::from_settings(start_url, &CrawlerConfig::default())
    }

    /// Creates a config from the `[crawler]` section of the config file
    pub fn from_settings(start_url: impl Into<String>, settings: &CrawlerConfig) -> Self {
        Self {
            start_url: start_url.into(),
            max_pages: settings.max_pages,
            depth_limit: settings.depth_limit,
            url_include_patterns: settings.url_include_patterns.clone(),
            url_exclude_patterns: settings.url_exclude_patterns.clone(),
            follow_external_links: settings.follow_external_links,
            delay_between_requests_ms: settings.delay_between_requests_ms,
            page_extraction: PageExtractionOptions::default(),
        }
    }

    pub fn link_filter(&self) -> LinkFilter {
        LinkFilter {
            follow_external_links: self.follow_external_links,
            include_patterns: self.url_include_patterns.clone(),
            exclude_patterns: self.url_exclude_patterns.clone(),
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_between_requests_ms)
    }
}

/// Terminal state of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    /// The queue emptied
    Completed,
    /// `stop()` was called
    Stopped,
    /// The page cap was reached
    Exhausted,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Exhausted => "exhausted",
        }
    }
}

/// One visited page
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlPageResult {
    pub url: String,
    pub depth: u32,
    /// Filled in once the page's links have been extracted
    pub outbound_links: Vec<String>,
    pub extraction: ExtractionResult,
    pub timestamp: DateTime<Utc>,
}

impl CrawlPageResult {
    pub fn new(url: String, depth: u32, extraction: ExtractionResult) -> Self {
        Self {
            url,
            depth,
            outbound_links: Vec::new(),
            extraction,
            timestamp: Utc::now(),
        }
    }
}

/// Accumulated result of one crawl run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlRunResult {
    pub start_url: String,
    pub status: RunStatus,
    pub pages_visited: u32,
    pub pages_succeeded: u32,
    pub pages_failed: u32,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub elapsed_ms: u64,
    pub pages: Vec<CrawlPageResult>,
}

impl CrawlRunResult {
    pub fn new(start_url: impl Into<String>) -> Self {
        Self {
            start_url: start_url.into(),
            status: RunStatus::Running,
            pages_visited: 0,
            pages_succeeded: 0,
            pages_failed: 0,
            start_time: Utc::now(),
            end_time: None,
            elapsed_ms: 0,
            pages: Vec::new(),
        }
    }

    /// Appends a page and counts it as succeeded or failed; returns its index
    pub fn record_page(&mut self, page: CrawlPageResult) -> usize {
        if page.extraction.success {
            self.pages_succeeded += 1;
        } else {
            self.pages_failed += 1;
        }
        self.pages.push(page);
        self.pages.len() - 1
    }

    /// Sets the terminal status and end time; only the first call has effect
    pub fn finalize(&mut self, status: RunStatus) -> bool {
        if self.end_time.is_some() {
            return false;
        }
        let end = Utc::now();
        self.status = status;
        self.elapsed_ms = (end - self.start_time).num_milliseconds().max(0) as u64;
        self.end_time = Some(end);
        true
    }

    pub fn is_finalized(&self) -> bool {
        self.end_time.is_some()
    }
}
