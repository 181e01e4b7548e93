//! Configuration module for Sumi-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every section is optional and falls back to defaults.
//!
//! # Example
//!
//! ```no_run
//! use sumi_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Crawler will visit at most {} pages", config.crawler.max_pages);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    Config, CrawlerConfig, ExtractionConfig, FieldEntry, InferenceConfig, TargetEntry,
};

pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};

/// Environment variable holding comma-separated inference credentials
pub const API_KEYS_ENV: &str = "SUMI_HARVEST_API_KEYS";

/// Splits a comma-separated credential list, dropping blanks
pub fn parse_api_keys(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}
