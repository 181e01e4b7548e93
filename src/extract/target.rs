//! Extraction targets and field transforms

use crate::data_domain::DataDomain;
use crate::render::SelectorSpec;
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Pure post-processing applied to one extracted field
pub type FieldTransform = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Transforms that can be named in configuration files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedTransform {
    /// Parses "$68,000.50" style strings into numbers
    Number,
    Trim,
    Lowercase,
    Uppercase,
}

impl NamedTransform {
    pub const NAMES: &'static [&'static str] = &["number", "trim", "lowercase", "uppercase"];

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "number" => Some(Self::Number),
            "trim" => Some(Self::Trim),
            "lowercase" => Some(Self::Lowercase),
            "uppercase" => Some(Self::Uppercase),
            _ => None,
        }
    }

    pub fn apply(&self, value: Value) -> Value {
        match value {
            Value::Array(items) => Value::Array(items.into_iter().map(|v| self.apply(v)).collect()),
            Value::String(s) => match self {
                Self::Number => parse_number(&s).unwrap_or(Value::String(s)),
                Self::Trim => Value::String(s.trim().to_string()),
                Self::Lowercase => Value::String(s.to_lowercase()),
                Self::Uppercase => Value::String(s.to_uppercase()),
            },
            other => other,
        }
    }

    pub fn into_fn(self) -> FieldTransform {
        Arc::new(move |value| self.apply(value))
    }
}

fn parse_number(raw: &str) -> Option<Value> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    cleaned
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

/// Declarative description of one web source
///
/// Targets are immutable once built. Field transforms are arbitrary closures;
/// targets loaded from configuration use [`NamedTransform`]s.
#[derive(Clone)]
pub struct ExtractionTarget {
    pub url: String,
    pub display_name: String,
    pub keywords: Vec<String>,
    pub field_selectors: BTreeMap<String, SelectorSpec>,
    pub fallback_api_urls: Vec<String>,
    pub use_proxy: bool,
    /// Allow the inference-assisted DOM step for this target
    pub ai_assist: bool,
    pub field_transforms: BTreeMap<String, FieldTransform>,
}

impl fmt::Debug for ExtractionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionTarget")
            .field("url", &self.url)
            .field("display_name", &self.display_name)
            .field("keywords", &self.keywords)
            .field("field_selectors", &self.field_selectors)
            .field("fallback_api_urls", &self.fallback_api_urls)
            .field("use_proxy", &self.use_proxy)
            .field("ai_assist", &self.ai_assist)
            .field(
                "field_transforms",
                &self.field_transforms.keys().collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ExtractionTarget {
    pub fn new(url: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            display_name: display_name.into(),
            keywords: Vec::new(),
            field_selectors: BTreeMap::new(),
            fallback_api_urls: Vec::new(),
            use_proxy: false,
            ai_assist: true,
            field_transforms: BTreeMap::new(),
        }
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords.extend(keywords.into_iter().map(Into::into));
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, spec: SelectorSpec) -> Self {
        self.field_selectors.insert(name.into(), spec);
        self
    }

    pub fn with_api(mut self, url: impl Into<String>) -> Self {
        self.fallback_api_urls.push(url.into());
        self
    }

    pub fn with_proxy(mut self, use_proxy: bool) -> Self {
        self.use_proxy = use_proxy;
        self
    }

    pub fn with_ai_assist(mut self, ai_assist: bool) -> Self {
        self.ai_assist = ai_assist;
        self
    }

    pub fn with_transform<F>(mut self, field: impl Into<String>, transform: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.field_transforms.insert(field.into(), Arc::new(transform));
        self
    }

    /// Data domain inferred from the display name and keywords
    pub fn data_domain(&self) -> DataDomain {
        DataDomain::detect(&format!("{} {}", self.display_name, self.keywords.join(" ")))
    }

    /// Returns true if the target is relevant for `query`
    ///
    /// An empty query matches every target. Otherwise a target matches when the
    /// query is about the target's data domain, mentions one of its keywords,
    /// or mentions a word of its display name.
    pub fn matches_query(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }

        let query_domain = DataDomain::detect(&query);
        if query_domain != DataDomain::Generic && query_domain == self.data_domain() {
            return true;
        }

        let words: Vec<&str> = query
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        let keyword_hit = self
            .keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .any(|k| query.contains(&k));

        if keyword_hit {
            return true;
        }

        let name = self.display_name.to_lowercase();
        let mut name_words = name
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() >= 3);
        name_words.any(|w| words.contains(&w))
    }

    /// Applies field transforms to the top-level fields of `data`
    pub fn apply_transforms(&self, data: Value) -> Value {
        match data {
            Value::Object(map) if !self.field_transforms.is_empty() => {
                let transformed: Map<String, Value> = map
                    .into_iter()
                    .map(|(name, value)| match self.field_transforms.get(&name) {
                        Some(transform) => {
                            let value = transform(value);
                            (name, value)
                        }
                        None => (name, value),
                    })
                    .collect();
                Value::Object(transformed)
            }
            other => other,
        }
    }

    /// Returns true if a DOM reply counts as a successful extraction
    ///
    /// At least one required field must be non-null. When no field is marked
    /// required, any non-null field will do.
    pub fn has_required_fields(&self, data: &Map<String, Value>) -> bool {
        let resolved = |name: &String| data.get(name).map(|v| !v.is_null()).unwrap_or(false);
        let mut required = self
            .field_selectors
            .iter()
            .filter(|(_, spec)| spec.required)
            .map(|(name, _)| name)
            .peekable();

        if required.peek().is_none() {
            self.field_selectors.keys().any(resolved)
        } else {
            required.any(resolved)
        }
    }
}
