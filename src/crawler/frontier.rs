//! FIFO crawl frontier and visited set for one run

use crate::url::visited_key;
use std::collections::{HashSet, VecDeque};

/// A URL waiting to be visited, with its distance from the start URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlQueueEntry {
    pub url: String,
    pub depth: u32,
}

/// Breadth-first queue plus the set of normalized URLs already visited
///
/// Private to one crawl run; a new run starts with a new frontier.
#[derive(Debug, Default)]
pub struct Frontier {
    queue: VecDeque<CrawlQueueEntry>,
    visited: HashSet<String>,
}

impl Frontier {
    /// Creates a frontier seeded with `(start_url, 0)`
    pub fn seeded(start_url: &str) -> Self {
        let mut frontier = Self::default();
        frontier.push(start_url.to_string(), 0);
        frontier
    }

    pub fn push(&mut self, url: String, depth: u32) {
        self.queue.push_back(CrawlQueueEntry { url, depth });
    }

    pub fn pop(&mut self) -> Option<CrawlQueueEntry> {
        self.queue.pop_front()
    }

    pub fn is_visited(&self, url: &str) -> bool {
        self.visited.contains(&visited_key(url))
    }

    /// Marks `url` visited; returns false if it already was
    pub fn mark_visited(&mut self, url: &str) -> bool {
        self.visited.insert(visited_key(url))
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut frontier = Frontier::seeded("https://a.com/");
        frontier.push("https://a.com/1".into(), 1);
        frontier.push("https://a.com/2".into(), 1);

        let order: Vec<String> = std::iter::from_fn(|| frontier.pop().map(|e| e.url)).collect();
        assert_eq!(order, vec!["https://a.com/", "https://a.com/1", "https://a.com/2"]);
    }

    #[test]
    fn test_visited_uses_normalized_keys() {
        let mut frontier = Frontier::default();
        assert!(frontier.mark_visited("https://www.a.com/page/#top"));
        assert!(frontier.is_visited("https://a.com/page"));
        assert!(!frontier.mark_visited("https://A.com/page?utm_source=x"));
        assert_eq!(frontier.visited_count(), 1);
    }

    #[test]
    fn test_seeded_depth_is_zero() {
        let mut frontier = Frontier::seeded("https://a.com/");
        assert_eq!(frontier.queued(), 1);
        assert_eq!(
            frontier.pop(),
            Some(CrawlQueueEntry {
                url: "https://a.com/".into(),
                depth: 0
            })
        );
        assert_eq!(frontier.pop(), None);
    }
}
