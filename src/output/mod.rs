//! Output module for crawl summaries and reports
//!
//! This module handles:
//! - Deriving statistics from a finished crawl run
//! - Printing a console summary
//! - Writing a markdown report

mod markdown;
pub mod stats;

pub use markdown::{format_markdown_report, generate_markdown_report};
pub use stats::{print_statistics, CrawlStatistics};

use crate::crawler::CrawlRunResult;

/// Prints the console summary of a finished run
pub fn print_run_summary(run: &CrawlRunResult) {
    print_statistics(&CrawlStatistics::from_run(run));
}
