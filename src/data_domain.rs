//! Data domain detection
//!
//! Queries, targets and inference prompts are classified into a small set of
//! data domains by keyword matching. The domain drives the instruction sent to
//! the inference service, the regex patterns used to read its answers, and the
//! deterministic sample payloads used when every live source fails.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

const CRYPTO_KEYWORDS: &[&str] = &[
    "bitcoin", "btc", "ethereum", "eth", "crypto", "solana", "dogecoin",
];

const CURRENCY_KEYWORDS: &[&str] = &[
    "usd",
    "mxn",
    "eur",
    "gbp",
    "jpy",
    "exchange",
    "currency",
    "forex",
    "dolar",
    "dollar",
    "dollars",
    "peso",
    "pesos",
    "tipo de cambio",
];

const WEATHER_KEYWORDS: &[&str] = &[
    "weather",
    "clima",
    "temperature",
    "temperatura",
    "forecast",
    "pronostico",
    "rain",
    "lluvia",
];

/// The kind of facts a query or target is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataDomain {
    Currency,
    Crypto,
    Weather,
    Generic,
}

impl DataDomain {
    /// Detects the data domain of free text
    ///
    /// Crypto is checked before currency so "bitcoin price in usd" is crypto.
    ///
    /// # Examples
    ///
    /// ```
    /// use sumi_harvest::data_domain::DataDomain;
    ///
    /// assert_eq!(DataDomain::detect("USD to MXN"), DataDomain::Currency);
    /// assert_eq!(DataDomain::detect("bitcoin price usd"), DataDomain::Crypto);
    /// assert_eq!(DataDomain::detect("clima en Monterrey"), DataDomain::Weather);
    /// assert_eq!(DataDomain::detect("latest news"), DataDomain::Generic);
    /// ```
    pub fn detect(text: &str) -> Self {
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        let hit = |keywords: &[&str]| {
            keywords.iter().any(|k| {
                if k.contains(' ') {
                    lower.contains(k)
                } else {
                    words.iter().any(|w| w == k)
                }
            })
        };

        if hit(CRYPTO_KEYWORDS) {
            Self::Crypto
        } else if hit(CURRENCY_KEYWORDS) {
            Self::Currency
        } else if hit(WEATHER_KEYWORDS) {
            Self::Weather
        } else {
            Self::Generic
        }
    }

    /// Stable lowercase label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Currency => "currency",
            Self::Crypto => "crypto",
            Self::Weather => "weather",
            Self::Generic => "generic",
        }
    }

    /// Instruction sent to the inference service for this domain
    pub fn instruction(&self) -> &'static str {
        match self {
            Self::Currency => {
                "Extract the exchange rate. Reply with a JSON object with the fields \
                 base, quote and rate (a number)."
            }
            Self::Crypto => {
                "Extract the cryptocurrency price. Reply with a JSON object with the fields \
                 asset, currency and price (a number)."
            }
            Self::Weather => {
                "Extract the current weather. Reply with a JSON object with the fields \
                 location, temperature_c (a number) and condition."
            }
            Self::Generic => {
                "Extract the key facts of the page. Reply with a JSON object whose keys are \
                 the requested field names."
            }
        }
    }

    /// Category labels used by the offline categorization answer
    pub fn categories(&self) -> &'static [&'static str] {
        match self {
            Self::Currency => &["finance", "currency", "exchange-rate"],
            Self::Crypto => &["finance", "crypto", "market-price"],
            Self::Weather => &["weather", "forecast"],
            Self::Generic => &["general", "web-page"],
        }
    }

    /// Deterministic, schema-correct sample payload for this domain
    ///
    /// Used for the "all sources failed" placeholder and for offline inference
    /// answers, so consumers always see the same shape.
    pub fn sample_payload(&self) -> Value {
        match self {
            Self::Currency => json!({
                "base": "USD",
                "quote": "MXN",
                "rate": 17.0,
            }),
            Self::Crypto => json!({
                "asset": "bitcoin",
                "currency": "usd",
                "price": 60000.0,
            }),
            Self::Weather => json!({
                "location": "unknown",
                "temperature_c": 20.0,
                "condition": "unknown",
            }),
            Self::Generic => json!({
                "title": Value::Null,
                "items": [],
            }),
        }
    }
}

impl fmt::Display for DataDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
