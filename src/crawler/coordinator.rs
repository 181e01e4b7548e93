//! Crawl coordination: the breadth-first run loop
//!
//! One run at a time per [`Crawler`]. Pages are processed strictly one after
//! another: extract, record, extract links, filter, enqueue, wait.

use crate::crawler::frontier::{CrawlQueueEntry, Frontier};
use crate::crawler::types::{CrawlConfig, CrawlPageResult, CrawlRunResult, RunStatus};
use crate::extract::Extractor;
use crate::progress::{EngineEvent, EventBus};
use crate::render::RenderSession;
use crate::url::{host_of, LinkFilter};
use crate::{HarvestError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, Notify};

/// Stop signal of the active run
#[derive(Debug, Default)]
struct RunControl {
    stopped: AtomicBool,
    wake: Notify,
}

impl RunControl {
    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.wake.notify_waiters();
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Sleeps for `delay`; returns false if the run was stopped meanwhile
    async fn pause(&self, delay: Duration) -> bool {
        if delay.is_zero() {
            return !self.is_stopped();
        }
        let notified = self.wake.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_stopped() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => !self.is_stopped(),
            _ = notified => false,
        }
    }
}

struct CrawlerInner {
    extractor: Extractor,
    bus: EventBus,
    active: Mutex<Option<Arc<RunControl>>>,
}

impl CrawlerInner {
    fn active(&self) -> std::sync::MutexGuard<'_, Option<Arc<RunControl>>> {
        match self.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Clears the active run when the run future completes or is dropped
struct ActiveRunGuard<'a> {
    inner: &'a CrawlerInner,
}

impl Drop for ActiveRunGuard<'_> {
    fn drop(&mut self) {
        *self.inner.active() = None;
    }
}

/// Bounded breadth-first crawler driving an [`Extractor`]
///
/// Cheap to clone; clones control the same crawler, so one task can run
/// [`start`](Self::start) while another calls [`stop`](Self::stop).
#[derive(Clone)]
pub struct Crawler {
    inner: Arc<CrawlerInner>,
}

impl Crawler {
    /// Creates a crawler publishing on the extractor's event bus
    pub fn new(extractor: Extractor) -> Self {
        let bus = extractor.events().clone();
        Self {
            inner: Arc::new(CrawlerInner {
                extractor,
                bus,
                active: Mutex::new(None),
            }),
        }
    }

    /// Subscribes to progress, step, completion and error events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.bus.subscribe()
    }

    pub fn is_active(&self) -> bool {
        self.inner.active().is_some()
    }

    /// Requests the active run to stop
    ///
    /// The run loop notices at its next check; an in-flight page finishes its
    /// extraction, is recorded, and nothing further is processed.
    pub fn stop(&self) {
        if let Some(control) = self.inner.active().as_ref() {
            tracing::info!("Stop requested");
            control.stop();
        }
    }

    /// Runs one crawl to completion
    ///
    /// # Errors
    ///
    /// - [`HarvestError::NoRenderer`] if the extractor has no rendering session
    /// - [`HarvestError::AlreadyRunning`] if a run is active on this crawler
    ///
    /// Page-level failures never abort the run; they are counted in
    /// `pages_failed`.
    pub async fn start(&self, config: CrawlConfig) -> Result<CrawlRunResult> {
        let session = self
            .inner
            .extractor
            .session()
            .cloned()
            .ok_or(HarvestError::NoRenderer)?;

        let control = {
            let mut active = self.inner.active();
            if active.is_some() {
                return Err(HarvestError::AlreadyRunning);
            }
            let control = Arc::new(RunControl::default());
            *active = Some(Arc::clone(&control));
            control
        };
        let _guard = ActiveRunGuard { inner: &self.inner };

        Ok(self.run(&config, &session, &control).await)
    }

    async fn run(
        &self,
        config: &CrawlConfig,
        session: &RenderSession,
        control: &RunControl,
    ) -> CrawlRunResult {
        let mut run = CrawlRunResult::new(&config.start_url);
        let mut frontier = Frontier::seeded(&config.start_url);
        let filter = config.link_filter();

        tracing::info!(
            start_url = %config.start_url,
            max_pages = config.max_pages,
            depth_limit = config.depth_limit,
            "Starting crawl run"
        );

        let status = loop {
            if control.is_stopped() {
                break RunStatus::Stopped;
            }
            if run.pages_visited >= config.max_pages {
                break RunStatus::Exhausted;
            }
            let Some(entry) = frontier.pop() else {
                break RunStatus::Completed;
            };

            // Skips are not charged the inter-request delay
            if frontier.is_visited(&entry.url) {
                tracing::trace!(url = %entry.url, "Already visited");
                continue;
            }
            if entry.depth > config.depth_limit {
                tracing::trace!(url = %entry.url, depth = entry.depth, "Beyond depth limit");
                continue;
            }

            frontier.mark_visited(&entry.url);
            run.pages_visited += 1;
            self.inner.bus.publish(EngineEvent::Progress {
                percent: percent(run.pages_visited, config.max_pages),
                message: format!("Visiting {}", entry.url),
                partial_result: None,
            });
            tracing::info!(
                url = %entry.url,
                depth = entry.depth,
                "Page {}/{}",
                run.pages_visited,
                config.max_pages
            );

            let target = config.page_extraction.target_for(&entry.url);
            let extraction = self.inner.extractor.extract_target(&target).await;
            if !extraction.success {
                tracing::debug!(url = %entry.url, error = ?extraction.error, "Page extraction failed");
            }
            let index = run.record_page(CrawlPageResult::new(
                entry.url.clone(),
                entry.depth,
                extraction,
            ));

            if control.is_stopped() {
                break RunStatus::Stopped;
            }

            let links = self.page_links(session, &entry, config).await;
            let followed = enqueue_links(&mut frontier, &filter, &entry, &links);
            tracing::debug!(
                url = %entry.url,
                found = links.len(),
                followed,
                queued = frontier.queued(),
                "Links processed"
            );
            run.pages[index].outbound_links = links;

            self.inner.bus.publish(EngineEvent::Progress {
                percent: percent(run.pages_visited, config.max_pages),
                message: format!("Visited {}", entry.url),
                partial_result: Some(Box::new(run.pages[index].clone())),
            });

            if !control.pause(config.delay()).await {
                break RunStatus::Stopped;
            }
        };

        run.finalize(status);
        tracing::info!(
            status = status.as_str(),
            visited = run.pages_visited,
            succeeded = run.pages_succeeded,
            failed = run.pages_failed,
            elapsed_ms = run.elapsed_ms,
            "Crawl run finished"
        );
        self.inner.bus.publish(EngineEvent::Completed {
            run: Box::new(run.clone()),
        });
        run
    }

    /// Extracts the outbound links of the page; failures yield no links
    async fn page_links(
        &self,
        session: &RenderSession,
        entry: &CrawlQueueEntry,
        config: &CrawlConfig,
    ) -> Vec<String> {
        let timeout = config.page_extraction.link_timeout;
        let _page = session.lease().await;

        if !session.is_loaded(&entry.url) {
            if let Err(e) = session.navigate(&entry.url).await {
                tracing::debug!(url = %entry.url, error = %e, "Page not loadable for links");
                return Vec::new();
            }
        }

        match session.extract_links(&entry.url, entry.depth, timeout).await {
            Ok(links) => links,
            Err(e) => {
                tracing::debug!(url = %entry.url, error = %e, "Link extraction failed");
                self.inner
                    .bus
                    .error(format!("Link extraction failed for {}: {}", entry.url, e));
                Vec::new()
            }
        }
    }
}

/// Filters candidate links and enqueues the survivors at `depth + 1`
fn enqueue_links(
    frontier: &mut Frontier,
    filter: &LinkFilter,
    entry: &CrawlQueueEntry,
    links: &[String],
) -> usize {
    let current_host = host_of(&entry.url).unwrap_or_default();
    let mut followed = 0;
    for link in links {
        let decision = filter.classify(link, &current_host);
        if !decision.should_follow() {
            tracing::trace!(link = %link, ?decision, "Link dropped");
            continue;
        }
        if frontier.is_visited(link) {
            continue;
        }
        frontier.push(link.clone(), entry.depth + 1);
        followed += 1;
    }
    followed
}

fn percent(visited: u32, max_pages: u32) -> f64 {
    if max_pages == 0 {
        return 100.0;
    }
    (f64::from(visited) / f64::from(max_pages) * 100.0).min(100.0)
}
