//! Offline answers used when no live inference call can succeed
//!
//! The generator classifies the request by task and data domain and returns
//! a canned reply in the shape a live answer for that task would have. Output
//! is a pure function of the messages.

use crate::data_domain::DataDomain;
use crate::inference::{ChatMessage, StructuredReply, FALLBACK_MODEL};
use crate::render::{Script, SelectorSpec};
use serde_json::{json, Value};
use std::collections::BTreeMap;

const CATEGORIZATION_KEYWORDS: &[&str] = &["categor", "classify", "classif", "label"];
const WORKFLOW_KEYWORDS: &[&str] = &["workflow", "steps", "script", "automat"];

/// Kind of task the caller asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Categorization,
    WorkflowAnalysis,
    Generic,
}

impl TaskKind {
    pub fn classify(text: &str) -> Self {
        let lower = text.to_lowercase();
        if CATEGORIZATION_KEYWORDS.iter().any(|k| lower.contains(k)) {
            Self::Categorization
        } else if WORKFLOW_KEYWORDS.iter().any(|k| lower.contains(k)) {
            Self::WorkflowAnalysis
        } else {
            Self::Generic
        }
    }
}

/// Builds the offline reply for `messages`
///
/// Only the system message and the last user message are considered. The task
/// is classified from both; the data domain from the user message first.
pub fn generate(messages: &[ChatMessage]) -> StructuredReply {
    let system = messages
        .iter()
        .find(|m| m.role == "system")
        .map(|m| m.content.as_str())
        .unwrap_or_default();
    let user = messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.as_str())
        .unwrap_or_default();

    let task = TaskKind::classify(&format!("{}\n{}", system, user));
    let domain = match DataDomain::detect(user) {
        DataDomain::Generic => DataDomain::detect(system),
        detected => detected,
    };

    tracing::debug!(?task, domain = %domain, "Generating offline inference reply");

    let content = match task {
        TaskKind::Categorization => Value::from(domain.categories().to_vec()).to_string(),
        TaskKind::WorkflowAnalysis => workflow(domain).to_string(),
        TaskKind::Generic => domain.sample_payload().to_string(),
    };

    StructuredReply {
        content,
        model: FALLBACK_MODEL.to_string(),
        fallback: true,
    }
}

fn workflow(domain: DataDomain) -> Value {
    let fields = domain_selectors(domain);
    let field_names: Vec<&str> = fields.keys().map(String::as_str).collect();
    let script = Script::ExtractFields {
        fields: fields.clone(),
    }
    .to_js(0);

    json!({
        "domain": domain.as_str(),
        "steps": [
            "Open the target page",
            "Wait for the page to settle",
            format!("Read the fields: {}", field_names.join(", ")),
            "Normalize the values into numbers where possible",
        ],
        "script": script,
    })
}

fn domain_selectors(domain: DataDomain) -> BTreeMap<String, SelectorSpec> {
    let entries: &[(&str, &str)] = match domain {
        DataDomain::Currency => &[
            ("rate", "[data-rate], .exchange-rate, .rate"),
            ("quote", "[data-quote], .currency-quote"),
        ],
        DataDomain::Crypto => &[
            ("price", "[data-price], .price, [itemprop=price]"),
            ("asset", "h1"),
        ],
        DataDomain::Weather => &[
            ("temperature", "[data-temperature], .temperature, .temp"),
            ("condition", ".condition, .weather-condition"),
        ],
        DataDomain::Generic => &[("title", "h1, title"), ("summary", "main p, article p")],
    };

    entries
        .iter()
        .map(|(name, selector)| (name.to_string(), SelectorSpec::text(*selector)))
        .collect()
}
