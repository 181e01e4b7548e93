/// Checks if a host matches a wildcard pattern
///
/// Two pattern forms are supported:
/// 1. Exact match: "example.com" matches only "example.com"
/// 2. Wildcard match: "*.example.com" matches "example.com" itself and any
///    subdomain of it, at any depth
///
/// Hosts are expected to be lowercase already (see [`super::extract_domain`]).
///
/// # Examples
///
/// ```
/// use sumi_harvest::url::matches_wildcard;
///
/// assert!(matches_wildcard("example.com", "example.com"));
/// assert!(matches_wildcard("*.example.com", "api.v2.example.com"));
/// assert!(!matches_wildcard("*.example.com", "myexample.com"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    if let Some(base) = pattern.strip_prefix("*.") {
        candidate == base || candidate.ends_with(&format!(".{}", base))
    } else {
        candidate == pattern
    }
}

/// Returns true if `host` matches any of the wildcard `patterns`
pub fn matches_any_wildcard(patterns: &[String], host: &str) -> bool {
    patterns.iter().any(|p| matches_wildcard(p, host))
}

/// Returns true if any non-empty pattern is a substring of `url`
///
/// This is the matching rule used by crawl include/exclude lists, e.g.
/// `"/product/"` scopes a crawl to product pages.
pub fn matches_any_substring(patterns: &[String], url: &str) -> bool {
    patterns
        .iter()
        .filter(|p| !p.is_empty())
        .any(|p| url.contains(p.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert!(matches_wildcard("example.com", "example.com"));
        assert!(!matches_wildcard("example.com", "blog.example.com"));
        assert!(!matches_wildcard("blog.example.com", "example.com"));
    }

    #[test]
    fn test_wildcard_matches_bare_and_nested() {
        assert!(matches_wildcard("*.example.com", "example.com"));
        assert!(matches_wildcard("*.example.com", "www.example.com"));
        assert!(matches_wildcard("*.example.com", "deep.nested.example.com"));
    }

    #[test]
    fn test_wildcard_no_partial_suffix() {
        assert!(!matches_wildcard("*.example.com", "notexample.com"));
        assert!(!matches_wildcard("*.example.com", "example.com.org"));
    }

    #[test]
    fn test_matches_any_wildcard() {
        let patterns = vec!["*.google.com".to_string(), "bank.example".to_string()];
        assert!(matches_any_wildcard(&patterns, "finance.google.com"));
        assert!(matches_any_wildcard(&patterns, "bank.example"));
        assert!(!matches_any_wildcard(&patterns, "example.org"));
        assert!(!matches_any_wildcard(&[], "google.com"));
    }

    #[test]
    fn test_substring_patterns() {
        let patterns = vec!["/product/".to_string()];
        assert!(matches_any_substring(&patterns, "https://shop.com/product/7"));
        assert!(!matches_any_substring(&patterns, "https://shop.com/products"));
    }

    #[test]
    fn test_empty_substring_pattern_never_matches() {
        let patterns = vec![String::new()];
        assert!(!matches_any_substring(&patterns, "https://shop.com/"));
        assert!(!matches_any_substring(&[], "https://shop.com/"));
    }
}
