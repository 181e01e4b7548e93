//! Interpretation of inference replies
//!
//! Replies are free text that may or may not contain JSON. [`ParsedReply::parse`]
//! tries, in order: a fenced code block, an inline JSON object or array, and
//! finally the per-domain regex patterns of [`extract_patterns`].

use crate::data_domain::DataDomain;
use regex::Regex;
use serde_json::{Map, Number, Value};
use std::sync::LazyLock;

static FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").unwrap());

/// "1 USD = 17.25 MXN"
static PAIR_RATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b1\s*([a-z]{3})\s*(?:=|equals|is)\s*(\d+(?:\.\d+)?)\s*([a-z]{3})\b").unwrap()
});

/// "rate: 17.25", "exchange rate of 17.25"
static LOOSE_RATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:exchange\s+)?rate\b[^0-9\-]{0,20}(\d+(?:\.\d+)?)").unwrap()
});

static TEMPERATURE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(-?\d+(?:\.\d+)?)\s*°\s*([CF])\b").unwrap());

static PRICE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\s?(\d[\d,]*(?:\.\d+)?)").unwrap());

/// Structured interpretation of an inference reply
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedReply {
    /// Plain prose with no extractable fields
    Synthesized(String),

    /// Fields read from a JSON block or from domain patterns
    StructuredFields(Map<String, Value>),

    /// Empty output, or a JSON block that failed to parse
    Unparseable(String),
}

impl ParsedReply {
    /// Parses reply content
    ///
    /// # Examples
    ///
    /// ```
    /// use sumi_harvest::inference::ParsedReply;
    ///
    /// let reply = ParsedReply::parse("Sure!\n```json\n{\"rate\": 17.2}\n```");
    /// assert!(matches!(reply, ParsedReply::StructuredFields(ref m) if m["rate"] == 17.2));
    ///
    /// let reply = ParsedReply::parse("It is 21°C and sunny.");
    /// assert!(matches!(reply, ParsedReply::StructuredFields(ref m) if m["temperature_c"] == 21.0));
    ///
    /// assert!(matches!(ParsedReply::parse("No idea."), ParsedReply::Synthesized(_)));
    /// ```
    pub fn parse(content: &str) -> Self {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Self::Unparseable(content.to_string());
        }

        if let Some(value) = json_block(trimmed) {
            return match value {
                Value::Object(map) => Self::StructuredFields(map),
                Value::Array(items) => {
                    let mut map = Map::new();
                    map.insert("items".to_string(), Value::Array(items));
                    Self::StructuredFields(map)
                }
                other => Self::Synthesized(other.to_string()),
            };
        }

        if let Some(fields) = extract_patterns(trimmed, DataDomain::Generic) {
            return Self::StructuredFields(fields);
        }

        if trimmed.starts_with('{') || trimmed.starts_with('[') || trimmed.contains("```") {
            return Self::Unparseable(content.to_string());
        }

        Self::Synthesized(trimmed.to_string())
    }
}

fn json_block(text: &str) -> Option<Value> {
    if let Some(caps) = FENCED_BLOCK.captures(text) {
        if let Ok(value) = serde_json::from_str::<Value>(caps[1].trim()) {
            return Some(value);
        }
    }

    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (text.find(open), text.rfind(close)) {
            if start < end {
                if let Ok(value) = serde_json::from_str::<Value>(&text[start..=end]) {
                    return Some(value);
                }
            }
        }
    }

    None
}

/// Reads known fact patterns out of free text
///
/// `Currency` looks for a rate, `Weather` for a temperature, `Crypto` for a
/// dollar price, and `Generic` tries all three. Returns `None` when nothing
/// matched.
pub fn extract_patterns(text: &str, domain: DataDomain) -> Option<Map<String, Value>> {
    let mut fields = Map::new();

    let (rate, temperature, price) = match domain {
        DataDomain::Currency => (true, false, false),
        DataDomain::Weather => (false, true, false),
        DataDomain::Crypto => (false, false, true),
        DataDomain::Generic => (true, true, true),
    };

    if rate {
        if let Some(caps) = PAIR_RATE.captures(text) {
            fields.insert("base".into(), Value::String(caps[1].to_uppercase()));
            fields.insert("quote".into(), Value::String(caps[3].to_uppercase()));
            insert_number(&mut fields, "rate", &caps[2]);
        } else if let Some(caps) = LOOSE_RATE.captures(text) {
            insert_number(&mut fields, "rate", &caps[1]);
        }
    }

    if temperature {
        if let Some(caps) = TEMPERATURE.captures(text) {
            if let Ok(value) = caps[1].parse::<f64>() {
                let celsius = if &caps[2] == "F" {
                    ((value - 32.0) * 5.0 / 9.0 * 10.0).round() / 10.0
                } else {
                    value
                };
                if let Some(n) = Number::from_f64(celsius) {
                    fields.insert("temperature_c".into(), Value::Number(n));
                }
            }
        }
    }

    if price {
        if let Some(caps) = PRICE.captures(text) {
            insert_number(&mut fields, "price", &caps[1].replace(',', ""));
            fields.insert("currency".into(), Value::String("usd".into()));
        }
    }

    if fields.is_empty() {
        None
    } else {
        Some(fields)
    }
}

fn insert_number(fields: &mut Map<String, Value>, name: &str, raw: &str) {
    if let Some(n) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
        fields.insert(name.to_string(), Value::Number(n));
    }
}
