//! Request/reply correlation over the rendering capability

use crate::render::{
    InboundMessage, MessageSender, PageMessage, RenderError, RenderingCapability, Script,
    ScriptEnvelope, SelectorSpec,
};
use crate::url::visited_key;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, MutexGuard};

/// Turns the fire-and-forget capability into `evaluate_and_await` calls
///
/// Every script is tagged with a fresh correlation id. Replies carrying another
/// id are stale (from a request that already timed out) and are discarded.
/// Replies without an id are accepted when their type fits the request; link
/// replies must also name the page that was asked.
///
/// The session renders one page at a time. Callers that navigate and then read
/// the page hold [`RenderSession::lease`] across both, so a concurrent caller
/// cannot swap the page in between.
pub struct RenderSession {
    capability: Arc<dyn RenderingCapability>,
    page: Mutex<()>,
    inbound: Mutex<mpsc::UnboundedReceiver<InboundMessage>>,
    next_id: AtomicU64,
    settle_delay: Duration,
    loaded_url: StdMutex<Option<String>>,
}

impl RenderSession {
    pub fn new(
        capability: Arc<dyn RenderingCapability>,
        inbound: mpsc::UnboundedReceiver<InboundMessage>,
        settle_delay: Duration,
    ) -> Self {
        Self {
            capability,
            page: Mutex::new(()),
            inbound: Mutex::new(inbound),
            next_id: AtomicU64::new(0),
            settle_delay,
            loaded_url: StdMutex::new(None),
        }
    }

    /// Builds a capability around a fresh message channel and wraps it
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    /// use sumi_harvest::render::{RenderSession, StaticHtmlRenderer};
    ///
    /// let client = reqwest::Client::new();
    /// let session = RenderSession::connect(
    ///     |tx| StaticHtmlRenderer::new(client, tx),
    ///     Duration::from_millis(0),
    /// );
    /// # let _ = session;
    /// ```
    pub fn connect<R, F>(build: F, settle_delay: Duration) -> Self
    where
        F: FnOnce(MessageSender) -> R,
        R: RenderingCapability + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        Self::new(Arc::new(build(tx)), rx, settle_delay)
    }

    /// Exclusive use of the rendered page until the guard is dropped
    ///
    /// Not reentrant: the session's own methods never take it.
    pub async fn lease(&self) -> MutexGuard<'_, ()> {
        self.page.lock().await
    }

    /// Navigates and waits the fixed settle delay
    pub async fn navigate(&self, url: &str) -> Result<(), RenderError> {
        tracing::debug!(url = %url, "Navigating");
        self.set_loaded_url(None);
        self.capability.navigate(url).await?;
        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }
        self.set_loaded_url(Some(url.to_string()));
        Ok(())
    }

    /// URL of the last successful navigation, if the page is still current
    pub fn loaded_url(&self) -> Option<String> {
        match self.loaded_url.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Returns true if `url` is the page currently loaded
    pub fn is_loaded(&self, url: &str) -> bool {
        self.loaded_url()
            .map(|loaded| visited_key(&loaded) == visited_key(url))
            .unwrap_or(false)
    }

    fn set_loaded_url(&self, url: Option<String>) {
        let mut guard = match self.loaded_url.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = url;
    }

    /// Dispatches `script` and waits for its reply
    pub async fn evaluate_and_await(
        &self,
        script: Script,
        timeout: Duration,
    ) -> Result<PageMessage, RenderError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let envelope = ScriptEnvelope { id, script };

        // Held for the whole round trip so no other caller consumes our reply
        let mut inbound = self.inbound.lock().await;
        self.capability.evaluate(envelope.clone()).await?;

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let message = tokio::time::timeout_at(deadline, inbound.recv())
                .await
                .map_err(|_| RenderError::Timeout {
                    ms: timeout.as_millis() as u64,
                })?
                .ok_or(RenderError::ChannelClosed)?;

            if accepts(&envelope, &message) {
                return Ok(message.message);
            }
            tracing::debug!(
                "Discarding stale page message (id {:?}) while waiting for {} #{}",
                message.id,
                envelope.script.name(),
                id
            );
        }
    }

    /// Runs the selector specs on the current page
    pub async fn extract_fields(
        &self,
        fields: &BTreeMap<String, SelectorSpec>,
        timeout: Duration,
    ) -> Result<Map<String, Value>, RenderError> {
        let script = Script::ExtractFields {
            fields: fields.clone(),
        };
        match self.evaluate_and_await(script, timeout).await? {
            PageMessage::ExtractionResult {
                data: Value::Object(map),
            } => Ok(map),
            PageMessage::ExtractionResult { data } => Err(RenderError::UnexpectedReply(format!(
                "field extraction returned non-object: {}",
                data
            ))),
            PageMessage::ExtractionError { error } => Err(RenderError::Evaluation(error)),
            other => Err(unexpected(&other)),
        }
    }

    /// Collects absolute outbound links of the current page
    pub async fn extract_links(
        &self,
        current_url: &str,
        depth: u32,
        timeout: Duration,
    ) -> Result<Vec<String>, RenderError> {
        let script = Script::ExtractLinks {
            current_url: current_url.to_string(),
            depth,
        };
        match self.evaluate_and_await(script, timeout).await? {
            PageMessage::CrawlerLinksExtracted { links, .. } => Ok(links),
            PageMessage::ExtractionError { error } => Err(RenderError::Evaluation(error)),
            other => Err(unexpected(&other)),
        }
    }

    /// Captures the visible text of the current page
    pub async fn visible_text(
        &self,
        max_chars: usize,
        timeout: Duration,
    ) -> Result<String, RenderError> {
        match self
            .evaluate_and_await(Script::VisibleText { max_chars }, timeout)
            .await?
        {
            PageMessage::DomTextContent { data } => Ok(data),
            PageMessage::ExtractionError { error } => Err(RenderError::Evaluation(error)),
            other => Err(unexpected(&other)),
        }
    }
}

fn unexpected(message: &PageMessage) -> RenderError {
    RenderError::UnexpectedReply(format!("{:?}", message))
}

fn accepts(envelope: &ScriptEnvelope, inbound: &InboundMessage) -> bool {
    match inbound.id {
        Some(id) => id == envelope.id,
        None => match (&envelope.script, &inbound.message) {
            (_, PageMessage::ExtractionError { .. }) => true,
            (Script::ExtractFields { .. }, PageMessage::ExtractionResult { .. }) => true,
            (Script::VisibleText { .. }, PageMessage::DomTextContent { .. }) => true,
            (
                Script::ExtractLinks {
                    current_url: asked,
                    ..
                },
                PageMessage::CrawlerLinksExtracted { current_url, .. },
            ) => visited_key(asked) == visited_key(current_url),
            _ => false,
        },
    }
}
