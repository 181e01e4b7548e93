//! Shared fixtures for the integration tests

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use sumi_harvest::extract::{Extractor, ExtractorSettings};
use sumi_harvest::render::{
    MessageSender, RenderError, RenderSession, RenderingCapability, ScriptEnvelope,
    StaticHtmlRenderer,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Static renderer that counts navigations
pub struct RecordingRenderer {
    inner: StaticHtmlRenderer,
    navigations: Arc<AtomicUsize>,
}

impl RecordingRenderer {
    pub fn new(sender: MessageSender, navigations: Arc<AtomicUsize>) -> Self {
        Self {
            inner: StaticHtmlRenderer::new(reqwest::Client::new(), sender),
            navigations,
        }
    }
}

#[async_trait]
impl RenderingCapability for RecordingRenderer {
    async fn navigate(&self, url: &str) -> Result<(), RenderError> {
        self.navigations.fetch_add(1, Ordering::SeqCst);
        self.inner.navigate(url).await
    }

    async fn evaluate(&self, envelope: ScriptEnvelope) -> Result<(), RenderError> {
        self.inner.evaluate(envelope).await
    }
}

/// A rendering session over a [`RecordingRenderer`] plus its navigation counter
pub fn recording_session() -> (Arc<RenderSession>, Arc<AtomicUsize>) {
    settled_session(Duration::ZERO)
}

/// Like [`recording_session`], waiting `settle` after every navigation
pub fn settled_session(settle: Duration) -> (Arc<RenderSession>, Arc<AtomicUsize>) {
    let navigations = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&navigations);
    let session =
        RenderSession::connect(move |tx| RecordingRenderer::new(tx, counter), settle);
    (Arc::new(session), navigations)
}

pub fn fast_settings() -> ExtractorSettings {
    ExtractorSettings {
        api_timeout: Duration::from_secs(2),
        method_timeout: Duration::from_secs(5),
        ..ExtractorSettings::default()
    }
}

/// Extractor with a recording session and no inference client
pub fn extractor_with_session() -> (Extractor, Arc<AtomicUsize>) {
    let (session, navigations) = recording_session();
    let extractor = Extractor::new(reqwest::Client::new(), fast_settings()).with_session(session);
    (extractor, navigations)
}

/// Minimal HTML page with a title, a heading and anchors
pub fn html_page(title: &str, links: &[String]) -> String {
    let anchors: String = links
        .iter()
        .map(|l| format!(r#"<a href="{}">{}</a>"#, l, l))
        .collect();
    format!(
        "<html><head><title>{}</title></head><body><h1>{}</h1>{}</body></html>",
        title, title, anchors
    )
}

pub async fn mount_page(server: &MockServer, page_path: &str, html: String) {
    Mock::given(method("GET"))
        .and(path(page_path))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string(html),
        )
        .mount(server)
        .await;
}
