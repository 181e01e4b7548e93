use crate::config::types::{Config, CrawlerConfig, ExtractionConfig, InferenceConfig, TargetEntry};
use crate::extract::NamedTransform;
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_inference_config(&config.inference)?;
    validate_extraction_config(&config.extraction)?;
    validate_crawler_config(&config.crawler)?;
    validate_targets(&config.targets)?;
    Ok(())
}

fn validate_inference_config(config: &InferenceConfig) -> Result<(), ConfigError> {
    if config.endpoint.trim().is_empty() {
        return Err(ConfigError::Validation(
            "inference endpoint cannot be empty".to_string(),
        ));
    }
    validate_http_url("inference endpoint", &config.endpoint)?;

    if config.model.trim().is_empty() {
        return Err(ConfigError::Validation(
            "inference model cannot be empty".to_string(),
        ));
    }

    if config.rate_limit_threshold < 1 {
        return Err(ConfigError::Validation(
            "rate_limit_threshold must be >= 1, got 0".to_string(),
        ));
    }

    if config.timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "inference timeout_ms must be > 0".to_string(),
        ));
    }

    if let Some(temperature) = config.temperature {
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ConfigError::Validation(format!(
                "temperature must be between 0 and 2, got {}",
                temperature
            )));
        }
    }

    Ok(())
}

fn validate_extraction_config(config: &ExtractionConfig) -> Result<(), ConfigError> {
    if config.api_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "api_timeout_ms must be > 0".to_string(),
        ));
    }

    if config.method_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "method_timeout_ms must be > 0".to_string(),
        ));
    }

    if config.text_capture_limit == 0 {
        return Err(ConfigError::Validation(
            "text_capture_limit must be > 0".to_string(),
        ));
    }

    if let Some(proxy) = &config.proxy_endpoint {
        validate_http_url("proxy endpoint", proxy)?;
    }

    for host in &config.blocked_hosts {
        validate_domain_pattern(host)?;
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_pages < 1 {
        return Err(ConfigError::Validation(
            "max_pages must be >= 1, got 0".to_string(),
        ));
    }

    if config
        .url_include_patterns
        .iter()
        .chain(&config.url_exclude_patterns)
        .any(|p| p.is_empty())
    {
        return Err(ConfigError::InvalidPattern(
            "URL include/exclude patterns cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_targets(targets: &[TargetEntry]) -> Result<(), ConfigError> {
    for target in targets {
        validate_http_url("target url", &target.url)?;

        if target.display_name.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "Target '{}' must have a display name",
                target.url
            )));
        }

        for api in &target.fallback_api_urls {
            validate_http_url("fallback api url", api)?;
        }

        for (name, field) in &target.fields {
            if field.spec.selector.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Field '{}' of target '{}' has an empty selector",
                    name, target.display_name
                )));
            }

            if let Some(transform) = &field.transform {
                if NamedTransform::from_name(transform).is_none() {
                    return Err(ConfigError::Validation(format!(
                        "Unknown transform '{}' on field '{}' (expected one of: {})",
                        transform,
                        name,
                        NamedTransform::NAMES.join(", ")
                    )));
                }
            }
        }
    }

    Ok(())
}

/// Validates an absolute http(s) URL
fn validate_http_url(what: &str, raw: &str) -> Result<(), ConfigError> {
    let url = Url::parse(raw)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", what, raw, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use http or https",
            what, raw
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' has no host",
            what, raw
        )));
    }

    Ok(())
}

/// Validates a domain pattern (supports wildcards)
fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain pattern cannot be empty".to_string(),
        ));
    }

    match pattern.strip_prefix("*.") {
        Some(domain) => validate_domain_string(domain),
        None => validate_domain_string(pattern),
    }
}

/// Validates a domain string (without wildcard prefix)
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with(['.', '-']) || domain.ends_with(['.', '-']) {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' must contain at least one dot (e.g., 'example.com')",
            domain
        )));
    }

    Ok(())
}
