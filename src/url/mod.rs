//! URL handling module for Sumi-Harvest
//!
//! This module provides URL normalization (visited-set keys), host extraction
//! for same-origin checks, wildcard host matching for the known-blocked list, and
//! substring pattern matching for crawl include/exclude rules.

mod domain;
mod matcher;
mod normalize;

pub use domain::{extract_domain, host_of};
pub use matcher::{matches_any_substring, matches_any_wildcard, matches_wildcard};
pub use normalize::{normalize_url, visited_key};

/// Decision made by [`LinkFilter`] for a single candidate link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkDecision {
    /// The link should be enqueued
    Follow,
    /// The link points at another host and external links are not followed
    External,
    /// The link matched one of the exclude patterns
    Excluded,
    /// Include patterns are configured and the link matched none of them
    NotIncluded,
    /// The link could not be parsed as an http(s) URL
    Invalid,
}

impl LinkDecision {
    /// Returns true if the link should be enqueued
    pub fn should_follow(&self) -> bool {
        matches!(self, Self::Follow)
    }
}

/// Link filtering rules applied to every outbound link discovered on a page
///
/// Rules are applied in this order:
/// 1. Same-origin (unless external links are followed)
/// 2. Exclude patterns (any substring match drops the link)
/// 3. Include patterns (if non-empty, at least one must match)
#[derive(Debug, Clone, Default)]
pub struct LinkFilter {
    pub follow_external_links: bool,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
}

impl LinkFilter {
    /// Classifies a candidate link found on `current_host`
    ///
    /// # Examples
    ///
    /// ```
    /// use sumi_harvest::url::{LinkDecision, LinkFilter};
    ///
    /// let filter = LinkFilter {
    ///     follow_external_links: false,
    ///     include_patterns: vec!["/product/".to_string()],
    ///     exclude_patterns: vec![],
    /// };
    /// assert_eq!(
    ///     filter.classify("https://shop.com/product/1", "shop.com"),
    ///     LinkDecision::Follow
    /// );
    /// assert_eq!(
    ///     filter.classify("https://other.com/product/1", "shop.com"),
    ///     LinkDecision::External
    /// );
    /// ```
    pub fn classify(&self, link: &str, current_host: &str) -> LinkDecision {
        let host = match host_of(link) {
            Some(h) => h,
            None => return LinkDecision::Invalid,
        };

        if !self.follow_external_links && !host.eq_ignore_ascii_case(current_host) {
            return LinkDecision::External;
        }

        if matches_any_substring(&self.exclude_patterns, link) {
            return LinkDecision::Excluded;
        }

        if !self.include_patterns.is_empty() && !matches_any_substring(&self.include_patterns, link)
        {
            return LinkDecision::NotIncluded;
        }

        LinkDecision::Follow
    }
}
