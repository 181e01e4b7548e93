//! Crawler module for bounded breadth-first crawling
//!
//! This module contains the crawl loop built on top of the extraction engine:
//! - Run configuration and per-page extraction options
//! - The FIFO frontier and visited set
//! - Run coordination with progress reporting and cooperative stop

mod coordinator;
mod frontier;
mod types;

pub use coordinator::Crawler;
pub use frontier::{CrawlQueueEntry, Frontier};
pub use types::{CrawlConfig, CrawlPageResult, CrawlRunResult, PageExtractionOptions, RunStatus};
