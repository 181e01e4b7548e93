//! The extraction fallback chain

use crate::data_domain::DataDomain;
use crate::extract::result::{AI_ANALYSIS_SOURCE, PLACEHOLDER_SOURCE};
use crate::extract::{ExtractionResult, ExtractionTarget};
use crate::inference::reply::extract_patterns;
use crate::inference::{CallOptions, ChatMessage, InferenceClient, ParsedReply};
use crate::progress::{EventBus, StepTracker};
use crate::render::{dom, RenderError, RenderSession};
use crate::url::{host_of, matches_any_wildcard};
use crate::{HarvestError, Result};
use reqwest::{Client, StatusCode};
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Progress steps of one extraction, in order
pub const EXTRACTION_STEPS: &[(&str, &str)] = &[
    ("init", "Initialize"),
    ("target-selection", "Select targets"),
    ("direct-api", "Query direct APIs"),
    ("dom-extract", "Extract from page"),
    ("ai-analysis", "Analyze page text"),
    ("proxy-relay", "Fetch through proxy"),
    ("completion", "Done"),
];

/// Tunables of the fallback chain
#[derive(Debug, Clone)]
pub struct ExtractorSettings {
    /// Ask the inference service before looking at targets
    pub inference_first: bool,
    /// Per-request timeout for direct API and proxy fetches
    pub api_timeout: Duration,
    /// Time box of each fallback method
    pub method_timeout: Duration,
    /// Maximum characters of page text sent for analysis
    pub text_capture_limit: usize,
    /// Relay prefix; the URL-encoded target URL is appended
    pub proxy_endpoint: Option<String>,
    /// Host patterns known to refuse rendering (`*.example.com` allowed)
    pub blocked_hosts: Vec<String>,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            inference_first: false,
            api_timeout: Duration::from_secs(8),
            method_timeout: Duration::from_secs(15),
            text_capture_limit: 4000,
            proxy_endpoint: None,
            blocked_hosts: Vec::new(),
        }
    }
}

/// Turns queries and targets into [`ExtractionResult`]s
///
/// Methods are tried strictly in order (direct API, DOM selectors, inference
/// over page text, proxy relay) and the first success wins. Failures are
/// absorbed; only misuse (no targets at all) is returned as an error.
#[derive(Clone)]
pub struct Extractor {
    http: Client,
    settings: ExtractorSettings,
    targets: Arc<Vec<ExtractionTarget>>,
    session: Option<Arc<RenderSession>>,
    inference: Option<InferenceClient>,
    bus: EventBus,
}

impl Extractor {
    pub fn new(http: Client, settings: ExtractorSettings) -> Self {
        Self {
            http,
            settings,
            targets: Arc::new(Vec::new()),
            session: None,
            inference: None,
            bus: EventBus::new(),
        }
    }

    pub fn with_targets(mut self, targets: Vec<ExtractionTarget>) -> Self {
        self.targets = Arc::new(targets);
        self
    }

    pub fn with_session(mut self, session: Arc<RenderSession>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_inference(mut self, inference: InferenceClient) -> Self {
        self.inference = Some(inference);
        self
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.bus = bus;
        self
    }

    pub fn targets(&self) -> &[ExtractionTarget] {
        &self.targets
    }

    pub fn session(&self) -> Option<&Arc<RenderSession>> {
        self.session.as_ref()
    }

    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    pub fn settings(&self) -> &ExtractorSettings {
        &self.settings
    }

    /// Extracts data for a free-text query
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::NoTargetsConfigured`] when no target exists and
    /// inference-first triage did not answer. Every other failure is reported
    /// as an unsuccessful [`ExtractionResult`] with placeholder data.
    pub async fn extract(&self, query: &str) -> Result<ExtractionResult> {
        let started = Instant::now();
        let mut steps = StepTracker::new(self.bus.clone(), EXTRACTION_STEPS);
        steps.start("init", Some(query.to_string()));
        steps.complete("init", None);

        tracing::info!(query = %query, "Starting extraction");

        if let Some(result) = self.triage(query, started).await {
            steps.complete("target-selection", Some("answered by inference".into()));
            finish(&mut steps, &result);
            return Ok(result);
        }

        if self.targets.is_empty() {
            steps.fail_in_progress("no targets configured");
            return Err(HarvestError::NoTargetsConfigured);
        }

        let relevant: Vec<&ExtractionTarget> = self
            .targets
            .iter()
            .filter(|t| t.matches_query(query))
            .collect();

        let domain = DataDomain::detect(query);

        if relevant.is_empty() {
            let err = HarvestError::NoRelevantTarget {
                query: query.to_string(),
            };
            tracing::info!("{}", err);
            steps.fail("target-selection", Some(err.to_string()));
            return Ok(placeholder(domain, Some(&err), started));
        }

        tracing::debug!("{} relevant target(s)", relevant.len());
        steps.complete(
            "target-selection",
            Some(format!("{} target(s)", relevant.len())),
        );

        let mut last_error = None;
        for (i, target) in relevant.iter().enumerate() {
            let is_last = i + 1 == relevant.len();
            match self.run_chain(target, &mut steps, is_last, started).await {
                Ok(result) => {
                    finish(&mut steps, &result);
                    return Ok(result);
                }
                Err(e) => {
                    tracing::debug!(name = %target.display_name, error = %e, "Target exhausted");
                    last_error = Some(e);
                }
            }
        }

        steps.fail_in_progress("all sources failed");
        tracing::warn!(query = %query, "All sources failed, returning sample data");
        let domain = match domain {
            DataDomain::Generic => relevant[0].data_domain(),
            detected => detected,
        };
        Ok(placeholder(domain, last_error.as_ref(), started))
    }

    /// Runs the fallback chain for one target
    ///
    /// Never fails: exhaustion yields an unsuccessful result with placeholder data.
    pub async fn extract_target(&self, target: &ExtractionTarget) -> ExtractionResult {
        let started = Instant::now();
        let mut steps = StepTracker::new(self.bus.clone(), EXTRACTION_STEPS);
        steps.start("init", Some(target.url.clone()));
        steps.complete("init", None);
        steps.complete("target-selection", Some(target.display_name.clone()));

        match self.run_chain(target, &mut steps, true, started).await {
            Ok(result) => {
                finish(&mut steps, &result);
                result
            }
            Err(e) => {
                steps.fail_in_progress("all sources failed");
                tracing::debug!(url = %target.url, error = %e, "All sources failed");
                placeholder(target.data_domain(), Some(&e), started)
            }
        }
    }

    async fn triage(&self, query: &str, started: Instant) -> Option<ExtractionResult> {
        if !self.settings.inference_first || query.trim().is_empty() {
            return None;
        }
        let inference = self.inference.as_ref()?;
        let domain = DataDomain::detect(query);
        let messages = [
            ChatMessage::system(domain.instruction()),
            ChatMessage::user(query),
        ];

        match inference
            .call(&messages, &CallOptions::default(), inference.timeout())
            .await
        {
            Ok(reply) if reply.fallback => {
                tracing::debug!("Inference triage answered offline, ignoring");
                None
            }
            Ok(reply) => match reply.parsed() {
                ParsedReply::StructuredFields(map) => {
                    tracing::info!(model = %reply.model, "Answered by inference triage");
                    Some(ExtractionResult::succeeded(
                        Value::Object(map),
                        AI_ANALYSIS_SOURCE,
                        started,
                    ))
                }
                other => {
                    tracing::debug!("Inference triage reply not structured: {:?}", other);
                    None
                }
            },
            Err(e) => {
                tracing::debug!(error = %e, "Inference triage failed");
                None
            }
        }
    }

    async fn run_chain(
        &self,
        target: &ExtractionTarget,
        steps: &mut StepTracker,
        is_last: bool,
        started: Instant,
    ) -> Result<ExtractionResult> {
        let mut chain = ChainProgress {
            steps,
            is_last,
            last_error: None,
        };

        if target.fallback_api_urls.is_empty() {
            chain.skip("direct-api");
        } else {
            chain.begin("direct-api", &target.display_name);
            match self.timed(self.try_apis(target, started)).await {
                Ok(result) => return Ok(chain.succeed("direct-api", result)),
                Err(e) => chain.fail("direct-api", e),
            }
        }

        let mut blocked = self.is_known_blocked(&target.url);
        if blocked {
            tracing::debug!(url = %target.url, "Known blocked host, skipping to proxy");
            chain.fail(
                "dom-extract",
                HarvestError::BlockedByOrigin {
                    url: target.url.clone(),
                    reason: "host is on the blocked list".into(),
                },
            );
            chain.skip("ai-analysis");
        } else if let Some(session) = &self.session {
            // Held until the page text has been read
            let _page = session.lease().await;
            chain.begin("dom-extract", &target.url);
            match self.timed(self.try_dom(session, target, started)).await {
                Ok(result) => return Ok(chain.succeed("dom-extract", result)),
                Err(e) => {
                    blocked = matches!(e, HarvestError::BlockedByOrigin { .. });
                    chain.fail("dom-extract", e);
                }
            }

            match &self.inference {
                Some(inference) if target.ai_assist && session.is_loaded(&target.url) => {
                    chain.begin("ai-analysis", &target.url);
                    match self
                        .timed(self.try_ai_dom(session, inference, target, started))
                        .await
                    {
                        Ok(result) => return Ok(chain.succeed("ai-analysis", result)),
                        Err(e) => chain.fail("ai-analysis", e),
                    }
                }
                _ => chain.skip("ai-analysis"),
            }
        } else {
            chain.fail("dom-extract", HarvestError::NoRenderer);
            chain.skip("ai-analysis");
        }

        if target.use_proxy {
            chain.begin("proxy-relay", &target.url);
            match self.timed(self.try_proxy(target, started)).await {
                Ok(result) => return Ok(chain.succeed("proxy-relay", result)),
                Err(e) => chain.fail("proxy-relay", e),
            }
        } else {
            if blocked {
                tracing::debug!(url = %target.url, "Blocked and target does not allow the proxy");
            }
            chain.skip("proxy-relay");
        }

        Err(chain.last_error.unwrap_or(HarvestError::Parse {
            context: target.url.clone(),
            message: "no extraction method applicable".into(),
        }))
    }

    async fn timed<F>(&self, method: F) -> Result<ExtractionResult>
    where
        F: Future<Output = Result<ExtractionResult>>,
    {
        let limit = self.settings.method_timeout;
        tokio::time::timeout(limit, method)
            .await
            .unwrap_or_else(|_| {
                Err(HarvestError::Render(RenderError::Timeout {
                    ms: limit.as_millis() as u64,
                }))
            })
    }

    fn is_known_blocked(&self, url: &str) -> bool {
        host_of(url)
            .map(|host| matches_any_wildcard(&self.settings.blocked_hosts, &host))
            .unwrap_or(false)
    }

    async fn try_apis(&self, target: &ExtractionTarget, started: Instant) -> Result<ExtractionResult> {
        let mut last_error = None;
        for api_url in &target.fallback_api_urls {
            match self.fetch_json(api_url).await {
                Ok(data) => {
                    tracing::debug!(url = %api_url, method = "api", "Direct API answered");
                    return Ok(ExtractionResult::succeeded(
                        target.apply_transforms(data),
                        format!("API:{}", api_url),
                        started,
                    ));
                }
                Err(e) => {
                    tracing::debug!(url = %api_url, method = "api", error = %e, "Direct API failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or(HarvestError::Parse {
            context: target.url.clone(),
            message: "no fallback API configured".into(),
        }))
    }

    async fn fetch_json(&self, api_url: &str) -> Result<Value> {
        let response = self
            .http
            .get(api_url)
            .timeout(self.settings.api_timeout)
            .send()
            .await
            .map_err(|e| network_error(api_url, &e))?;

        if response.status() != StatusCode::OK {
            return Err(HarvestError::Network {
                url: api_url.to_string(),
                message: format!("HTTP {}", response.status().as_u16()),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| network_error(api_url, &e))?;
        serde_json::from_str(&body).map_err(|e| HarvestError::Parse {
            context: api_url.to_string(),
            message: e.to_string(),
        })
    }

    async fn try_dom(
        &self,
        session: &RenderSession,
        target: &ExtractionTarget,
        started: Instant,
    ) -> Result<ExtractionResult> {
        session
            .navigate(&target.url)
            .await
            .map_err(|e| classify_render_error(&target.url, e))?;

        if target.field_selectors.is_empty() {
            return Err(HarvestError::Parse {
                context: target.url.clone(),
                message: "no field selectors".into(),
            });
        }

        let fields = session
            .extract_fields(&target.field_selectors, self.settings.method_timeout)
            .await
            .map_err(|e| classify_render_error(&target.url, e))?;

        if !target.has_required_fields(&fields) {
            return Err(HarvestError::Parse {
                context: target.url.clone(),
                message: "no required field resolved".into(),
            });
        }

        tracing::debug!(url = %target.url, method = "dom", "Selectors resolved");
        Ok(ExtractionResult::succeeded(
            target.apply_transforms(Value::Object(fields)),
            format!("DOM:{}", target.url),
            started,
        ))
    }

    async fn try_ai_dom(
        &self,
        session: &RenderSession,
        inference: &InferenceClient,
        target: &ExtractionTarget,
        started: Instant,
    ) -> Result<ExtractionResult> {
        let text = session
            .visible_text(self.settings.text_capture_limit, self.settings.method_timeout)
            .await
            .map_err(|e| classify_render_error(&target.url, e))?;

        if text.trim().is_empty() {
            return Err(HarvestError::Parse {
                context: target.url.clone(),
                message: "page has no visible text".into(),
            });
        }

        let domain = target.data_domain();
        let field_names: Vec<&str> = target.field_selectors.keys().map(String::as_str).collect();
        let prompt = if field_names.is_empty() {
            format!("Page: {}\n\n{}", target.url, text)
        } else {
            format!(
                "Fields: {}\nPage: {}\n\n{}",
                field_names.join(", "),
                target.url,
                text
            )
        };
        let messages = [
            ChatMessage::system(domain.instruction()),
            ChatMessage::user(prompt),
        ];

        let reply = inference
            .call(&messages, &CallOptions::default(), inference.timeout())
            .await?;

        if reply.fallback {
            // Offline answers carry no page facts; read the page text instead
            tracing::warn!(url = %target.url, "Inference degraded, matching patterns on page text");
            let fields = extract_patterns(&text, domain).ok_or_else(|| HarvestError::Parse {
                context: target.url.clone(),
                message: "offline inference and no recognizable pattern in page text".into(),
            })?;
            return Ok(ExtractionResult::succeeded(
                target.apply_transforms(Value::Object(fields)),
                format!("AI:{}", reply.model),
                started,
            )
            .degraded());
        }

        match reply.parsed() {
            ParsedReply::StructuredFields(map) => {
                tracing::debug!(url = %target.url, method = "ai", model = %reply.model, "Inference answered");
                Ok(ExtractionResult::succeeded(
                    target.apply_transforms(Value::Object(map)),
                    format!("AI:{}", reply.model),
                    started,
                ))
            }
            ParsedReply::Synthesized(text) | ParsedReply::Unparseable(text) => {
                Err(HarvestError::Parse {
                    context: format!("inference reply for {}", target.url),
                    message: truncate(&text, 120),
                })
            }
        }
    }

    async fn try_proxy(&self, target: &ExtractionTarget, started: Instant) -> Result<ExtractionResult> {
        let endpoint = self
            .settings
            .proxy_endpoint
            .as_deref()
            .ok_or_else(|| HarvestError::Network {
                url: target.url.clone(),
                message: "no proxy endpoint configured".into(),
            })?;

        let encoded: String = url::form_urlencoded::byte_serialize(target.url.as_bytes()).collect();
        let relay_url = format!("{}{}", endpoint, encoded);

        let response = self
            .http
            .get(&relay_url)
            .timeout(self.settings.api_timeout)
            .send()
            .await
            .map_err(|e| network_error(&relay_url, &e))?;

        if !response.status().is_success() {
            return Err(HarvestError::Network {
                url: relay_url,
                message: format!("HTTP {}", response.status().as_u16()),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| network_error(&relay_url, &e))?;
        let html = unwrap_relay_body(body);

        let fields = if target.field_selectors.is_empty() {
            let text = dom::visible_text(&html, self.settings.text_capture_limit);
            extract_patterns(&text, target.data_domain()).unwrap_or_default()
        } else {
            let fields = dom::select_fields(&html, &target.field_selectors);
            if target.has_required_fields(&fields) {
                fields
            } else {
                Map::new()
            }
        };

        if fields.is_empty() {
            return Err(HarvestError::Parse {
                context: relay_url,
                message: "no fields found in relayed page".into(),
            });
        }

        tracing::debug!(url = %target.url, method = "proxy", "Relayed page extracted");
        Ok(ExtractionResult::succeeded(
            target.apply_transforms(Value::Object(fields)),
            format!("Proxy:{}", target.url),
            started,
        ))
    }
}

/// Step reporting for one pass of the chain
///
/// Only the last relevant target reports failures and skips; earlier targets
/// leave their steps running so a later target can still report on them.
struct ChainProgress<'a> {
    steps: &'a mut StepTracker,
    is_last: bool,
    last_error: Option<HarvestError>,
}

impl ChainProgress<'_> {
    fn begin(&mut self, step: &str, detail: &str) {
        self.steps.start(step, Some(detail.to_string()));
    }

    fn succeed(&mut self, step: &str, result: ExtractionResult) -> ExtractionResult {
        self.steps.complete(step, Some(result.source.clone()));
        result
    }

    fn fail(&mut self, step: &str, error: HarvestError) {
        if self.is_last {
            self.steps.fail(step, Some(error.to_string()));
        }
        self.last_error = Some(error);
    }

    fn skip(&mut self, step: &str) {
        if self.is_last {
            self.steps.complete(step, Some("skipped".to_string()));
        }
    }
}

fn finish(steps: &mut StepTracker, result: &ExtractionResult) {
    steps.finish_at("completion", Some(result.source.clone()));
}

fn placeholder(domain: DataDomain, error: Option<&HarvestError>, started: Instant) -> ExtractionResult {
    ExtractionResult::failed(Some(domain.sample_payload()), PLACEHOLDER_SOURCE, error, started)
}

fn network_error(url: &str, e: &reqwest::Error) -> HarvestError {
    HarvestError::Network {
        url: url.to_string(),
        message: if e.is_timeout() {
            "request timed out".to_string()
        } else {
            e.to_string()
        },
    }
}

fn classify_render_error(url: &str, e: RenderError) -> HarvestError {
    if e.is_blocked_by_origin() {
        return HarvestError::BlockedByOrigin {
            url: url.to_string(),
            reason: e.to_string(),
        };
    }
    match e {
        RenderError::Navigation { url, message } => HarvestError::Network { url, message },
        other => HarvestError::Render(other),
    }
}

/// Some relays wrap the page as `{"contents": "<html>..."}`
fn unwrap_relay_body(body: String) -> String {
    if body.trim_start().starts_with('{') {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&body) {
            if let Some(Value::String(contents)) = map.get("contents") {
                return contents.clone();
            }
        }
    }
    body
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max).collect::<String>())
    }
}
