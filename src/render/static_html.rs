//! Built-in rendering capability over plain HTTP
//!
//! Fetches pages with `reqwest` and answers typed scripts with the [`dom`]
//! helpers. No JavaScript runs, so client-rendered content is invisible to it;
//! browser-backed capabilities cover that case.

use crate::render::{
    dom, InboundMessage, MessageSender, PageMessage, RenderError, RenderingCapability, Script,
    ScriptEnvelope,
};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

/// Builds the HTTP client shared by the static renderer and API calls
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use sumi_harvest::render::build_http_client;
///
/// let client = build_http_client("SumiHarvest/1.0", Duration::from_secs(10));
/// assert!(client.is_ok());
/// ```
pub fn build_http_client(user_agent: &str, timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

struct LoadedPage {
    url: Url,
    html: String,
}

/// A [`RenderingCapability`] that loads raw HTML instead of rendering it
pub struct StaticHtmlRenderer {
    client: Client,
    sender: MessageSender,
    page: Mutex<Option<LoadedPage>>,
}

impl StaticHtmlRenderer {
    pub fn new(client: Client, sender: MessageSender) -> Self {
        Self {
            client,
            sender,
            page: Mutex::new(None),
        }
    }

    fn set_page(&self, page: Option<LoadedPage>) {
        let mut guard = match self.page.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = page;
    }

    fn answer(&self, script: &Script) -> PageMessage {
        let guard = match self.page.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(page) = guard.as_ref() else {
            return PageMessage::ExtractionError {
                error: RenderError::NoPage.to_string(),
            };
        };

        match script {
            Script::ExtractFields { fields } => PageMessage::ExtractionResult {
                data: Value::Object(dom::select_fields(&page.html, fields)),
            },
            Script::ExtractLinks { current_url, depth } => PageMessage::CrawlerLinksExtracted {
                current_url: current_url.clone(),
                links: dom::collect_links(&page.html, &page.url),
                depth: *depth,
            },
            Script::VisibleText { max_chars } => PageMessage::DomTextContent {
                data: dom::visible_text(&page.html, *max_chars),
            },
        }
    }
}

#[async_trait]
impl RenderingCapability for StaticHtmlRenderer {
    async fn navigate(&self, url: &str) -> Result<(), RenderError> {
        self.set_page(None);
        let navigation_error = |message: String| RenderError::Navigation {
            url: url.to_string(),
            message,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| navigation_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(navigation_error(format!("HTTP {}", status.as_u16())));
        }

        let final_url = response.url().clone();
        let html = response
            .text()
            .await
            .map_err(|e| navigation_error(e.to_string()))?;

        self.set_page(Some(LoadedPage {
            url: final_url,
            html,
        }));
        Ok(())
    }

    async fn evaluate(&self, envelope: ScriptEnvelope) -> Result<(), RenderError> {
        let reply = self.answer(&envelope.script);
        self.sender
            .send(InboundMessage::correlated(envelope.id, reply))
            .map_err(|_| RenderError::ChannelClosed)
    }
}
