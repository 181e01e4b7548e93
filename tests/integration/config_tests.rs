//! Targets loaded from a TOML file drive a real extraction

use crate::common::recording_session;
use serde_json::json;
use std::io::Write;
use sumi_harvest::config::{load_config_with_hash, parse_config};
use sumi_harvest::extract::Extractor;
use sumi_harvest::ConfigError;
use tempfile::NamedTempFile;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[tokio::test]
async fn test_configured_target_with_named_transform() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/rate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "rate": "$17.25",
            "pair": "usd/mxn"
        })))
        .mount(&server)
        .await;

    let file = write_config(&format!(
        r#"
[extraction]
api-timeout-ms = 2000
method-timeout-ms = 5000

[[target]]
url = "{uri}/fx"
display-name = "USD to MXN exchange rate"
keywords = ["peso"]
fallback-api-urls = ["{uri}/api/rate"]

[target.fields.rate]
selector = '#rate'
transform = "number"

[target.fields.pair]
selector = ".pair"
required = false
transform = "uppercase"
"#,
        uri = server.uri()
    ));

    let (config, hash) = load_config_with_hash(file.path()).unwrap();
    assert_eq!(hash.len(), 64);

    let (session, _) = recording_session();
    let extractor = Extractor::new(reqwest::Client::new(), config.extraction.settings())
        .with_session(session)
        .with_targets(config.extraction_targets());

    let result = extractor.extract("peso exchange rate").await.unwrap();

    assert!(result.success);
    let data = result.data.unwrap();
    assert_eq!(data["rate"], 17.25);
    assert_eq!(data["pair"], "USD/MXN");
}

#[test]
fn test_unknown_transform_is_rejected() {
    let err = parse_config(
        r#"
[[target]]
url = "https://example.com/fx"
display-name = "FX"

[target.fields.rate]
selector = ".rate"
transform = "reverse"
"#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::Validation(_)));
}

#[test]
fn test_crawler_section_feeds_crawl_config() {
    let config = parse_config(
        r#"
[crawler]
max-pages = 7
depth-limit = 3
follow-external-links = true
delay-between-requests-ms = 250
url-include-patterns = ["/docs/"]
"#,
    )
    .unwrap();

    let crawl = sumi_harvest::CrawlConfig::from_settings("https://example.com/", &config.crawler);
    assert_eq!(crawl.max_pages, 7);
    assert_eq!(crawl.depth_limit, 3);
    assert!(crawl.follow_external_links);
    assert_eq!(crawl.delay_between_requests_ms, 250);
    assert_eq!(crawl.url_include_patterns, vec!["/docs/"]);
}
