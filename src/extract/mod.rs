//! Extraction engine
//!
//! Turns a query or an [`ExtractionTarget`] into one [`ExtractionResult`] by
//! walking the fallback chain:
//!
//! 1. optional inference-first triage of the raw query
//! 2. relevance filtering of the configured targets
//! 3. per target: direct API, DOM selectors, inference over page text, proxy relay
//! 4. placeholder data tagged `Sample data (all sources failed)`
//!
//! # Example
//!
//! ```no_run
//! use sumi_harvest::extract::{Extractor, ExtractorSettings, ExtractionTarget};
//!
//! # async fn run() -> sumi_harvest::Result<()> {
//! let target = ExtractionTarget::new("https://example.com/btc", "Bitcoin price")
//!     .with_api("https://api.example.com/simple/price?ids=bitcoin&vs_currencies=usd");
//! let extractor = Extractor::new(reqwest::Client::new(), ExtractorSettings::default())
//!     .with_targets(vec![target]);
//!
//! let result = extractor.extract("bitcoin price").await?;
//! println!("{} via {}", result.success, result.source);
//! # Ok(())
//! # }
//! ```

mod engine;
mod result;
mod target;

pub use crate::render::SelectorSpec;
pub use engine::{Extractor, ExtractorSettings, EXTRACTION_STEPS};
pub use result::{ExtractionResult, AI_ANALYSIS_SOURCE, PLACEHOLDER_SOURCE};
pub use target::{ExtractionTarget, FieldTransform, NamedTransform};
