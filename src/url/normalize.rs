use crate::UrlError;
use url::{form_urlencoded, Url};

/// Query parameters that never change page content and are dropped from keys
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_eid", "ref", "source"];

/// Normalizes a URL so that equivalent spellings collapse to one visited-set key
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed or not http(s)
/// 2. Lowercase the host and strip a leading `www.`
/// 3. Collapse dot segments, repeated slashes and trailing slash (root stays `/`)
/// 4. Drop the fragment
/// 5. Drop tracking query parameters (`utm_*`, `fbclid`, ...)
/// 6. Sort remaining query parameters; drop an empty query string
///
/// The scheme is preserved: `http://` and `https://` pages are distinct keys.
///
/// # Examples
///
/// ```
/// use sumi_harvest::url::normalize_url;
///
/// let url = normalize_url("https://WWW.EXAMPLE.COM/page/?utm_source=x#top").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/page");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    let host = url.host_str().ok_or(UrlError::MissingDomain)?.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;

    let path = normalize_path(url.path());
    url.set_path(&path);
    url.set_fragment(None);

    if url.query().is_some() {
        let params = filter_and_sort_query_params(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            let query = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(params.iter().map(|(k, v)| (k.as_str(), v.as_str())))
                .finish();
            url.set_query(Some(&query));
        }
    }

    Ok(url)
}

/// Returns the visited-set key for a URL string
///
/// Falls back to the trimmed input when the URL cannot be normalized, so an
/// odd link is still deduplicated against itself.
pub fn visited_key(url_str: &str) -> String {
    match normalize_url(url_str) {
        Ok(url) => url.to_string(),
        Err(_) => url_str.trim().to_string(),
    }
}

fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    params.sort();
    params
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_is_preserved() {
        let result = normalize_url("http://example.com/page").unwrap();
        assert_eq!(result.as_str(), "http://example.com/page");
    }

    #[test]
    fn test_remove_www_and_lowercase_host() {
        let result = normalize_url("https://WWW.Example.com/Page").unwrap();
        assert_eq!(result.as_str(), "https://example.com/Page");
    }

    #[test]
    fn test_trailing_slash_and_root() {
        assert_eq!(
            normalize_url("https://example.com/page/").unwrap().as_str(),
            "https://example.com/page"
        );
        assert_eq!(
            normalize_url("https://example.com").unwrap().as_str(),
            "https://example.com/"
        );
    }

    #[test]
    fn test_dot_segments_and_repeated_slashes() {
        let result = normalize_url("https://example.com//a/../b/./c//").unwrap();
        assert_eq!(result.as_str(), "https://example.com/b/c");
    }

    #[test]
    fn test_query_cleanup() {
        let result =
            normalize_url("https://example.com/p?b=2&utm_medium=mail&a=1&fbclid=z").unwrap();
        assert_eq!(result.as_str(), "https://example.com/p?a=1&b=2");

        let result = normalize_url("https://example.com/p?utm_source=a&gclid=b").unwrap();
        assert_eq!(result.as_str(), "https://example.com/p");
    }

    #[test]
    fn test_query_values_stay_encoded() {
        let escaped = visited_key("https://example.com/s?q=a%26b");
        let split = visited_key("https://example.com/s?q=a&b=");
        assert_ne!(escaped, split);
        assert_eq!(escaped, "https://example.com/s?q=a%26b");
        assert_eq!(
            visited_key("https://example.com/s?z=1&q=x%3Dy"),
            "https://example.com/s?q=x%3Dy&z=1"
        );
    }

    #[test]
    fn test_fragment_removed() {
        let result = normalize_url("https://example.com/page#section").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_port_kept() {
        let result = normalize_url("http://127.0.0.1:8080/a/").unwrap();
        assert_eq!(result.as_str(), "http://127.0.0.1:8080/a");
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(matches!(
            normalize_url("ftp://example.com/file").unwrap_err(),
            UrlError::InvalidScheme(_)
        ));
        assert!(matches!(
            normalize_url("not a url").unwrap_err(),
            UrlError::Parse(_)
        ));
    }

    #[test]
    fn test_visited_key_collapses_equivalent_urls() {
        assert_eq!(
            visited_key("https://www.example.com/a/#x"),
            visited_key("https://example.com/a")
        );
        assert_eq!(visited_key("  weird link "), "weird link");
    }
}
