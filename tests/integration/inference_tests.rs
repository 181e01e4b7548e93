//! Credential rotation and permanent fallback against a mock inference endpoint

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use sumi_harvest::inference::{
    ChatMessage, CallOptions, CredentialPool, InferenceClient, InferenceSettings, FALLBACK_MODEL,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer, keys: &[&str]) -> InferenceClient {
    InferenceClient::new(
        reqwest::Client::new(),
        InferenceSettings {
            endpoint: format!("{}/v1/chat/completions", server.uri()),
            ..InferenceSettings::default()
        },
        Arc::new(CredentialPool::new(
            keys.iter().map(|k| k.to_string()).collect(),
            3,
        )),
    )
}

fn messages() -> Vec<ChatMessage> {
    vec![
        ChatMessage::system("Extract the exchange rate."),
        ChatMessage::user("usd to mxn"),
    ]
}

fn completion(content: &str) -> serde_json::Value {
    json!({
        "model": "gpt-4o-mini",
        "choices": [{"message": {"role": "assistant", "content": content}}]
    })
}

#[tokio::test]
async fn test_rate_limit_rotates_to_next_credential() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer k1"))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer k2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("{\"rate\": 17.1}")))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server, &["k1", "k2"]);
    let reply = client
        .call(&messages(), &CallOptions::default(), Duration::from_secs(5))
        .await
        .unwrap();

    assert!(!reply.fallback);
    assert_eq!(reply.model, "gpt-4o-mini");
    assert_eq!(reply.content, "{\"rate\": 17.1}");
    assert!(!client.pool().is_fallback_permanent());
    assert_eq!(client.pool().current().map(|(i, _)| i), Some(1));
}

#[tokio::test]
async fn test_exhausted_credentials_switch_to_permanent_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"error": {"message": "Rate limit reached for requests"}})),
        )
        .expect(2)
        .mount(&server)
        .await;

    let client = client(&server, &["k1", "k2"]);

    let first = client
        .call(&messages(), &CallOptions::default(), Duration::from_secs(5))
        .await
        .unwrap();
    assert!(first.fallback);
    assert_eq!(first.model, FALLBACK_MODEL);
    assert!(client.pool().is_fallback_permanent());

    // No further request reaches the endpoint
    let second = client
        .call(&messages(), &CallOptions::default(), Duration::from_secs(5))
        .await
        .unwrap();
    assert!(second.fallback);
    assert_eq!(first.content, second.content);

    client.reset_rate_limit_state();
    assert!(!client.pool().is_fallback_permanent());
    assert_eq!(client.pool().state().consecutive_rate_limit_hits, 0);
}

#[tokio::test]
async fn test_concurrent_rate_limits_rotate_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer k1"))
        .respond_with(ResponseTemplate::new(429).set_delay(Duration::from_millis(50)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer k2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("ok")))
        .mount(&server)
        .await;

    let client = client(&server, &["k1", "k2", "k3"]);
    let messages = messages();
    let options = CallOptions::default();
    let (a, b) = tokio::join!(
        client.call(&messages, &options, Duration::from_secs(5)),
        client.call(&messages, &options, Duration::from_secs(5)),
    );

    assert!(!a.unwrap().fallback);
    assert!(!b.unwrap().fallback);
    // Both callers hit the same stale credential; only one rotation happened
    assert_eq!(client.pool().current().map(|(i, _)| i), Some(1));
}

#[tokio::test]
async fn test_server_error_is_returned() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = client(&server, &["k1"]);
    let err = client
        .call(&messages(), &CallOptions::default(), Duration::from_secs(5))
        .await
        .unwrap_err();

    assert_eq!(err, sumi_harvest::InferenceError::Http(500));
    assert_eq!(client.pool().state().consecutive_rate_limit_hits, 0);
}
