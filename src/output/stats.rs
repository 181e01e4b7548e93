//! Statistics derived from a finished crawl run

use crate::crawler::{CrawlRunResult, RunStatus};
use crate::url::host_of;
use std::collections::{BTreeMap, BTreeSet};

/// Aggregated view of a [`CrawlRunResult`]
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlStatistics {
    pub status: RunStatus,
    pub pages_visited: u32,
    pub pages_succeeded: u32,
    pub pages_failed: u32,
    pub elapsed_ms: u64,
    pub total_links: usize,
    /// Pages per depth
    pub depth_breakdown: BTreeMap<u32, usize>,
    /// Successful pages per extraction method (`API`, `DOM`, `AI`, `Proxy`)
    pub method_breakdown: BTreeMap<String, usize>,
    /// Failed pages per error kind
    pub error_summary: BTreeMap<String, usize>,
    /// Pages whose data came from an offline fallback
    pub degraded_pages: usize,
    /// Hosts of all discovered outbound links
    pub discovered_domains: BTreeSet<String>,
}

impl CrawlStatistics {
    pub fn from_run(run: &CrawlRunResult) -> Self {
        let mut depth_breakdown = BTreeMap::new();
        let mut method_breakdown = BTreeMap::new();
        let mut error_summary = BTreeMap::new();
        let mut discovered_domains = BTreeSet::new();
        let mut total_links = 0;
        let mut degraded_pages = 0;

        for page in &run.pages {
            *depth_breakdown.entry(page.depth).or_insert(0) += 1;
            total_links += page.outbound_links.len();
            discovered_domains.extend(page.outbound_links.iter().filter_map(|l| host_of(l)));

            let extraction = &page.extraction;
            if extraction.degraded {
                degraded_pages += 1;
            }
            if extraction.success {
                *method_breakdown.entry(method_of(&extraction.source)).or_insert(0) += 1;
            } else {
                let kind = extraction
                    .error_kind
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string());
                *error_summary.entry(kind).or_insert(0) += 1;
            }
        }

        Self {
            status: run.status,
            pages_visited: run.pages_visited,
            pages_succeeded: run.pages_succeeded,
            pages_failed: run.pages_failed,
            elapsed_ms: run.elapsed_ms,
            total_links,
            depth_breakdown,
            method_breakdown,
            error_summary,
            degraded_pages,
            discovered_domains,
        }
    }

    /// Percentage of visited pages that produced data
    pub fn success_rate(&self) -> f64 {
        if self.pages_visited == 0 {
            return 0.0;
        }
        f64::from(self.pages_succeeded) / f64::from(self.pages_visited) * 100.0
    }
}

/// Method prefix of a provenance tag, e.g. `DOM` for `DOM:https://…`
fn method_of(source: &str) -> String {
    source
        .split_once(':')
        .map(|(method, _)| method)
        .unwrap_or(source)
        .to_string()
}

/// Prints crawl statistics to stdout
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  Status: {}", stats.status.as_str());
    println!("  Pages visited: {}", stats.pages_visited);
    println!("  Succeeded: {}", stats.pages_succeeded);
    println!("  Failed: {}", stats.pages_failed);
    println!("  Links found: {}", stats.total_links);
    println!("  Elapsed: {:.1}s", stats.elapsed_ms as f64 / 1000.0);
    println!();

    if !stats.method_breakdown.is_empty() {
        println!("Pages by Method:");
        for (method, count) in &stats.method_breakdown {
            println!("  {}: {}", method, count);
        }
        println!();
    }

    if !stats.error_summary.is_empty() {
        println!("Error Summary:");
        let mut error_counts: Vec<_> = stats.error_summary.iter().collect();
        error_counts.sort_by(|a, b| b.1.cmp(a.1));
        for (kind, count) in error_counts {
            println!("  {}: {}", kind, count);
        }
        println!();
    }

    if stats.degraded_pages > 0 {
        println!("Degraded pages (offline fallback): {}", stats.degraded_pages);
        println!();
    }

    println!(
        "Success Rate: {:.1}% ({} / {} pages produced data)",
        stats.success_rate(),
        stats.pages_succeeded,
        stats.pages_visited
    );
}
