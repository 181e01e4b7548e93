use url::Url;

/// Extracts the lowercase host from a parsed URL
///
/// Ports are not part of the host, so `https://example.com:8080/` and
/// `https://example.com/` share the same host.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_harvest::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM:8080/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Parses a URL string and returns its lowercase host
///
/// Only `http` and `https` URLs are considered; anything else (including
/// `mailto:`, `javascript:` and unparseable input) yields `None`.
///
/// # Examples
///
/// ```
/// use sumi_harvest::url::host_of;
///
/// assert_eq!(host_of("https://Shop.Example.com/p/1"), Some("shop.example.com".to_string()));
/// assert_eq!(host_of("mailto:me@example.com"), None);
/// ```
pub fn host_of(url_str: &str) -> Option<String> {
    let url = Url::parse(url_str.trim()).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    extract_domain(&url)
}
