//! Fallback chain scenarios against mock APIs, pages and relays

use crate::common::{
    extractor_with_session, fast_settings, mount_page, recording_session, settled_session,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use sumi_harvest::data_domain::DataDomain;
use sumi_harvest::extract::{
    ExtractionTarget, Extractor, NamedTransform, SelectorSpec, PLACEHOLDER_SOURCE,
};
use sumi_harvest::inference::{CredentialPool, InferenceClient, InferenceSettings};
use sumi_harvest::progress::{EngineEvent, StepStatus};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn bitcoin_target(server: &MockServer) -> ExtractionTarget {
    ExtractionTarget::new(format!("{}/btc", server.uri()), "Bitcoin price")
        .with_keywords(["bitcoin", "btc"])
        .with_field("price", SelectorSpec::text(".price"))
        .with_transform("price", |v| NamedTransform::Number.apply(v))
        .with_api(format!("{}/api/simple/price", server.uri()))
}

#[tokio::test]
async fn test_direct_api_answers_without_rendering() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/simple/price"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"bitcoin": {"usd": 68000}})))
        .expect(1)
        .mount(&server)
        .await;

    let (extractor, navigations) = extractor_with_session();
    let extractor = extractor.with_targets(vec![bitcoin_target(&server)]);

    let result = extractor.extract("bitcoin price").await.unwrap();

    assert!(result.success);
    assert_eq!(result.data.unwrap()["bitcoin"]["usd"], 68000);
    assert!(result.source.starts_with("API:"));
    assert!(result.source.ends_with("/api/simple/price"));
    assert!(!result.degraded);
    assert_eq!(navigations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_failed_api_falls_back_to_dom() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/simple/price"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    mount_page(
        &server,
        "/btc",
        r#"<html><body><span class="price">$68,000.50</span></body></html>"#.to_string(),
    )
    .await;

    let (extractor, navigations) = extractor_with_session();
    let extractor = extractor.with_targets(vec![bitcoin_target(&server)]);

    let result = extractor.extract("btc").await.unwrap();

    assert!(result.success);
    assert_eq!(result.data.unwrap()["price"], 68000.5);
    assert_eq!(result.source, format!("DOM:{}/btc", server.uri()));
    assert_eq!(navigations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_all_sources_failing_yields_placeholder() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let (extractor, _) = extractor_with_session();
    let extractor = extractor.with_targets(vec![bitcoin_target(&server)]);

    let result = extractor.extract("bitcoin price").await.unwrap();

    assert!(!result.success);
    assert!(result.is_placeholder());
    assert_eq!(result.source, PLACEHOLDER_SOURCE);
    assert_eq!(result.data, Some(DataDomain::Crypto.sample_payload()));
    assert!(result.error.is_some());
    assert_eq!(result.error_kind.as_deref(), Some("network"));
}

#[tokio::test]
async fn test_blocked_host_goes_straight_to_proxy() {
    let server = MockServer::start().await;
    let page_url = format!("{}/quote", server.uri());
    Mock::given(method("GET"))
        .and(path("/relay"))
        .and(query_param("url", page_url.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "contents": "<html><body><div id=\"rate\">17.25</div></body></html>"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let target = ExtractionTarget::new(&page_url, "USD to MXN exchange rate")
        .with_keywords(["usd", "mxn"])
        .with_field("rate", SelectorSpec::text("#rate"))
        .with_transform("rate", |v| NamedTransform::Number.apply(v))
        .with_proxy(true);

    let mut settings = fast_settings();
    settings.blocked_hosts = vec!["127.0.0.1".to_string()];
    settings.proxy_endpoint = Some(format!("{}/relay?url=", server.uri()));

    let (session, navigations) = recording_session();
    let extractor = Extractor::new(reqwest::Client::new(), settings)
        .with_session(session)
        .with_targets(vec![target]);

    let result = extractor.extract("usd mxn rate").await.unwrap();

    assert!(result.success);
    assert_eq!(result.data.unwrap()["rate"], 17.25);
    assert_eq!(result.source, format!("Proxy:{}", page_url));
    assert_eq!(navigations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_inference_reads_page_when_selectors_miss() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/weather",
        "<html><body><p>Mexico City today: warm, clear skies.</p></body></html>".to_string(),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "gpt-4o-mini",
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "```json\n{\"location\": \"Mexico City\", \"temperature_c\": 24}\n```"
                }
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let inference = InferenceClient::new(
        reqwest::Client::new(),
        InferenceSettings {
            endpoint: format!("{}/v1/chat/completions", server.uri()),
            ..InferenceSettings::default()
        },
        Arc::new(CredentialPool::new(vec!["k1".to_string()], 3)),
    );
    let target = ExtractionTarget::new(format!("{}/weather", server.uri()), "Weather forecast")
        .with_field("temperature", SelectorSpec::text(".temp"));

    let (extractor, _) = extractor_with_session();
    let extractor = extractor
        .with_inference(inference)
        .with_targets(vec![target]);

    let result = extractor.extract("weather").await.unwrap();

    assert!(result.success);
    assert!(!result.degraded);
    assert_eq!(result.source, "AI:gpt-4o-mini");
    let data = result.data.unwrap();
    assert_eq!(data["location"], "Mexico City");
    assert_eq!(data["temperature_c"], 24);
}

#[tokio::test]
async fn test_offline_inference_matches_page_text_and_is_degraded() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/btc",
        "<html><body><p>Bitcoin trades at $64,250.75 right now.</p></body></html>".to_string(),
    )
    .await;

    // No credentials: every inference call is answered offline
    let inference = InferenceClient::new(
        reqwest::Client::new(),
        InferenceSettings::default(),
        Arc::new(CredentialPool::new(Vec::new(), 3)),
    );
    let target = ExtractionTarget::new(format!("{}/btc", server.uri()), "Bitcoin price")
        .with_field("price", SelectorSpec::text(".price"));

    let (extractor, _) = extractor_with_session();
    let extractor = extractor
        .with_inference(inference)
        .with_targets(vec![target]);

    let result = extractor.extract("bitcoin").await.unwrap();

    assert!(result.success);
    assert!(result.degraded);
    assert_eq!(result.source, "AI:offline-fallback");
    assert_eq!(result.data.unwrap()["price"], 64250.75);
}

#[tokio::test]
async fn test_repeated_extraction_is_stable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/simple/price"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"bitcoin": {"usd": 68000}})))
        .expect(2)
        .mount(&server)
        .await;

    let (extractor, _) = extractor_with_session();
    let extractor = extractor.with_targets(vec![bitcoin_target(&server)]);

    let first = extractor.extract("bitcoin price").await.unwrap();
    let second = extractor.extract("bitcoin price").await.unwrap();

    assert_eq!(first.success, second.success);
    assert_eq!(first.source, second.source);
    assert_eq!(first.data, second.data);
}

#[tokio::test]
async fn test_steps_are_reported_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/simple/price"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"bitcoin": {"usd": 1}})))
        .mount(&server)
        .await;

    let (extractor, _) = extractor_with_session();
    let extractor = extractor.with_targets(vec![bitcoin_target(&server)]);
    let mut events = extractor.events().subscribe();

    extractor.extract("bitcoin").await.unwrap();

    let mut completed = Vec::new();
    let mut last_status: BTreeMap<String, StepStatus> = BTreeMap::new();
    while let Ok(event) = events.try_recv() {
        if let EngineEvent::Step {
            step_id,
            status,
            detail,
        } = event
        {
            if status == StepStatus::Completed {
                completed.push((step_id.clone(), detail));
            }
            last_status.insert(step_id, status);
        }
    }

    let order: Vec<&str> = completed.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(
        order,
        vec![
            "init",
            "target-selection",
            "direct-api",
            "dom-extract",
            "ai-analysis",
            "proxy-relay",
            "completion"
        ]
    );
    // Methods after the winner are closed as skipped
    assert_eq!(completed[3].1.as_deref(), Some("skipped"));
    assert_eq!(completed[5].1.as_deref(), Some("skipped"));
    assert!(
        last_status.values().all(|s| *s == StepStatus::Completed),
        "steps left open: {:?}",
        last_status
    );
}

#[tokio::test]
async fn test_concurrent_extractions_read_their_own_page() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/a",
        r#"<html><body><p class="v">PAGE-A</p></body></html>"#.to_string(),
    )
    .await;
    mount_page(
        &server,
        "/b",
        r#"<html><body><p class="v">PAGE-B</p></body></html>"#.to_string(),
    )
    .await;

    // A long settle delay leaves room for the second navigation to interleave
    let (session, navigations) = settled_session(Duration::from_millis(200));
    let extractor = Extractor::new(reqwest::Client::new(), fast_settings()).with_session(session);
    let target = |page: &str| {
        ExtractionTarget::new(format!("{}{}", server.uri(), page), page)
            .with_field("v", SelectorSpec::text(".v"))
    };
    let (a, b) = (target("/a"), target("/b"));

    let (first, second) = tokio::join!(extractor.extract_target(&a), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        extractor.extract_target(&b).await
    });

    assert_eq!(first.source, format!("DOM:{}/a", server.uri()));
    assert_eq!(first.data.unwrap()["v"], "PAGE-A");
    assert_eq!(second.source, format!("DOM:{}/b", server.uri()));
    assert_eq!(second.data.unwrap()["v"], "PAGE-B");
    assert_eq!(navigations.load(Ordering::SeqCst), 2);
}

fn triage_extractor(server: &MockServer, keys: &[&str], targets: Vec<ExtractionTarget>) -> Extractor {
    let inference = InferenceClient::new(
        reqwest::Client::new(),
        InferenceSettings {
            endpoint: format!("{}/v1/chat/completions", server.uri()),
            ..InferenceSettings::default()
        },
        Arc::new(CredentialPool::new(
            keys.iter().map(|k| k.to_string()).collect(),
            3,
        )),
    );
    let mut settings = fast_settings();
    settings.inference_first = true;
    let (session, _) = recording_session();
    Extractor::new(reqwest::Client::new(), settings)
        .with_session(session)
        .with_inference(inference)
        .with_targets(targets)
}

async fn mount_completion(server: &MockServer, content: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "gpt-4o-mini",
            "choices": [{"message": {"role": "assistant", "content": content}}]
        })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_inference_first_answers_before_targets() {
    let server = MockServer::start().await;
    mount_completion(&server, "{\"bitcoin\": {\"usd\": 67000}}").await;
    Mock::given(method("GET"))
        .and(path("/api/simple/price"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"bitcoin": {"usd": 68000}})))
        .expect(0)
        .mount(&server)
        .await;

    let extractor = triage_extractor(&server, &["k1"], vec![bitcoin_target(&server)]);
    let result = extractor.extract("bitcoin price").await.unwrap();

    assert!(result.success);
    assert!(!result.degraded);
    assert_eq!(result.source, "AI analysis");
    assert_eq!(result.data.unwrap()["bitcoin"]["usd"], 67000);
}

#[tokio::test]
async fn test_unstructured_triage_reply_continues_the_chain() {
    let server = MockServer::start().await;
    mount_completion(&server, "No idea.").await;
    Mock::given(method("GET"))
        .and(path("/api/simple/price"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"bitcoin": {"usd": 68000}})))
        .expect(1)
        .mount(&server)
        .await;

    let extractor = triage_extractor(&server, &["k1"], vec![bitcoin_target(&server)]);
    let result = extractor.extract("bitcoin price").await.unwrap();

    assert!(result.success);
    assert!(result.source.starts_with("API:"));
    assert_eq!(result.data.unwrap()["bitcoin"]["usd"], 68000);
}

#[tokio::test]
async fn test_triage_answer_needs_no_targets() {
    let server = MockServer::start().await;
    mount_completion(&server, "```json\n{\"rate\": 17.3}\n```").await;

    let extractor = triage_extractor(&server, &["k1"], Vec::new());
    let result = extractor.extract("usd to mxn").await.unwrap();

    assert!(result.success);
    assert_eq!(result.source, "AI analysis");
    assert_eq!(result.data.unwrap()["rate"], 17.3);
}

#[tokio::test]
async fn test_offline_triage_reply_is_ignored() {
    let server = MockServer::start().await;

    // No credentials: the offline answer must not count as a triage result
    let extractor = triage_extractor(&server, &[], Vec::new());
    let err = extractor.extract("usd to mxn").await.unwrap_err();

    assert!(matches!(err, sumi_harvest::HarvestError::NoTargetsConfigured));
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}
