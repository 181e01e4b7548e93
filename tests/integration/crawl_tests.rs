//! Integration tests for the crawler
//!
//! These tests use wiremock to serve small link graphs and run the full
//! crawl cycle end-to-end over the static renderer.

use crate::common::{extractor_with_session, html_page, mount_page};
use std::time::Duration;
use sumi_harvest::crawler::{CrawlConfig, Crawler, RunStatus};
use sumi_harvest::extract::Extractor;
use sumi_harvest::progress::EngineEvent;
use sumi_harvest::HarvestError;
use tokio::sync::broadcast::error::TryRecvError;
use wiremock::MockServer;

fn quick_config(start_url: String) -> CrawlConfig {
    let mut config = CrawlConfig::new(start_url);
    config.delay_between_requests_ms = 0;
    config
}

/// Root page linking to `/p0` .. `/p{n-1}`, each of which exists
async fn mount_fan_out(server: &MockServer, n: usize) {
    let links: Vec<String> = (0..n).map(|i| format!("{}/p{}", server.uri(), i)).collect();
    mount_page(server, "/", html_page("Home", &links)).await;
    for i in 0..n {
        mount_page(server, &format!("/p{}", i), html_page(&format!("Page {}", i), &[])).await;
    }
}

#[tokio::test]
async fn test_crawl_respects_page_cap() {
    let server = MockServer::start().await;
    mount_fan_out(&server, 10).await;

    let (extractor, _) = extractor_with_session();
    let crawler = Crawler::new(extractor);

    let mut config = quick_config(format!("{}/", server.uri()));
    config.max_pages = 3;
    config.depth_limit = 1;

    let run = crawler.start(config).await.unwrap();

    assert_eq!(run.status, RunStatus::Exhausted);
    assert_eq!(run.pages_visited, 3);
    assert_eq!(run.pages.len(), 3);
    assert_eq!(run.pages_visited, run.pages_succeeded + run.pages_failed);
    assert_eq!(run.pages_succeeded, 3);

    assert_eq!(run.pages[0].depth, 0);
    assert_eq!(run.pages[0].outbound_links.len(), 10);
    assert_eq!(run.pages[1].url, format!("{}/p0", server.uri()));
    assert_eq!(run.pages[2].url, format!("{}/p1", server.uri()));
    assert!(run.pages[1..].iter().all(|p| p.depth == 1));

    let title = &run.pages[1].extraction.data.as_ref().unwrap()["title"];
    assert_eq!(title, "Page 0");

    assert!(run.end_time.is_some());
    assert!(!crawler.is_active());
}

#[tokio::test]
async fn test_crawl_stops_at_depth_limit() {
    let server = MockServer::start().await;
    let a = format!("{}/a", server.uri());
    let b = format!("{}/b", server.uri());
    mount_page(&server, "/", html_page("Home", &[a.clone()])).await;
    mount_page(&server, "/a", html_page("A", &[b])).await;
    mount_page(&server, "/b", html_page("B", &[])).await;

    let (extractor, _) = extractor_with_session();
    let mut config = quick_config(format!("{}/", server.uri()));
    config.depth_limit = 1;

    let run = Crawler::new(extractor).start(config).await.unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    let urls: Vec<&str> = run.pages.iter().map(|p| p.url.as_str()).collect();
    assert_eq!(urls, vec![format!("{}/", server.uri()).as_str(), a.as_str()]);
}

#[tokio::test]
async fn test_crawl_visits_each_page_once() {
    let server = MockServer::start().await;
    let root = format!("{}/", server.uri());
    let a = format!("{}/a", server.uri());
    // Cycles and fragment variants of the same pages
    mount_page(
        &server,
        "/",
        html_page("Home", &[a.clone(), format!("{}#top", a), root.clone()]),
    )
    .await;
    mount_page(&server, "/a", html_page("A", &[root.clone()])).await;

    let (extractor, _) = extractor_with_session();
    let run = Crawler::new(extractor)
        .start(quick_config(root))
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.pages_visited, 2);
}

#[tokio::test]
async fn test_failed_pages_are_counted_not_fatal() {
    let server = MockServer::start().await;
    let missing = format!("{}/missing", server.uri());
    mount_page(&server, "/", html_page("Home", &[missing])).await;

    let (extractor, _) = extractor_with_session();
    let run = Crawler::new(extractor)
        .start(quick_config(format!("{}/", server.uri())))
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.pages_visited, 2);
    assert_eq!(run.pages_succeeded, 1);
    assert_eq!(run.pages_failed, 1);
    assert!(run.pages[1].outbound_links.is_empty());
}

#[tokio::test]
async fn test_start_requires_renderer() {
    let extractor = Extractor::new(reqwest::Client::new(), Default::default());
    let err = Crawler::new(extractor)
        .start(CrawlConfig::new("https://example.com/"))
        .await
        .unwrap_err();
    assert!(matches!(err, HarvestError::NoRenderer));
}

#[tokio::test]
async fn test_stop_mid_run_completes_once() {
    let server = MockServer::start().await;
    mount_fan_out(&server, 5).await;

    let (extractor, _) = extractor_with_session();
    let crawler = Crawler::new(extractor);
    let mut events = crawler.subscribe();

    let mut config = quick_config(format!("{}/", server.uri()));
    config.delay_between_requests_ms = 30_000;

    let runner = {
        let crawler = crawler.clone();
        tokio::spawn(async move { crawler.start(config).await })
    };

    // Wait for the first page to be fully processed
    let first_page = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match events.recv().await {
                Ok(EngineEvent::Progress {
                    partial_result: Some(page),
                    ..
                }) => return page,
                Ok(_) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => panic!("event stream closed: {}", e),
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(first_page.depth, 0);

    assert!(crawler.is_active());
    let second = crawler
        .start(quick_config(format!("{}/", server.uri())))
        .await
        .unwrap_err();
    assert!(matches!(second, HarvestError::AlreadyRunning));

    crawler.stop();
    let run = tokio::time::timeout(Duration::from_secs(5), runner)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(run.status, RunStatus::Stopped);
    assert_eq!(run.pages_visited, 1);
    assert!(run.end_time.is_some());
    assert!(!crawler.is_active());

    let mut completed = 0;
    loop {
        match events.try_recv() {
            Ok(EngineEvent::Completed { run }) => {
                assert_eq!(run.status, RunStatus::Stopped);
                completed += 1;
            }
            Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    assert_eq!(completed, 1);

    // The crawler accepts a new run afterwards
    let mut config = quick_config(format!("{}/", server.uri()));
    config.max_pages = 1;
    let again = crawler.start(config).await.unwrap();
    assert_eq!(again.status, RunStatus::Exhausted);
}
