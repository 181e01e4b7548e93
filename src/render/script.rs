//! Typed page scripts
//!
//! Each [`Script`] describes one DOM query. Browser-backed capabilities inject
//! the JavaScript produced by [`Script::to_js`]; the built-in static renderer
//! interprets the typed request directly. Either way the reply comes back as a
//! [`PageMessage`](super::PageMessage) tagged with the correlation id.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Global object the injected scripts post their replies to
pub const BRIDGE_OBJECT: &str = "window.harvestBridge";

/// Describes one DOM query for a field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorSpec {
    /// CSS selector
    pub selector: String,

    /// Attribute to read; `None` reads the element's text content
    #[serde(default)]
    pub attribute: Option<String>,

    /// Collect every match instead of the first one
    #[serde(default)]
    pub multiple: bool,

    /// Whether this field counts towards a successful DOM extraction
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl SelectorSpec {
    /// Text content of the first element matching `selector`
    pub fn text(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            attribute: None,
            multiple: false,
            required: true,
        }
    }

    /// Attribute value of the first element matching `selector`
    pub fn attr(selector: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            attribute: Some(attribute.into()),
            ..Self::text(selector)
        }
    }

    pub fn all(mut self) -> Self {
        self.multiple = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// A DOM query to run in the page context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Script {
    /// Run every selector spec and reply with `{field: value | null}`
    ExtractFields {
        fields: BTreeMap<String, SelectorSpec>,
    },

    /// Collect every `href`, resolved to absolute http(s) URLs
    ExtractLinks { current_url: String, depth: u32 },

    /// Capture the page's visible text, capped at `max_chars`
    VisibleText { max_chars: usize },
}

impl Script {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::ExtractFields { .. } => "extract-fields",
            Self::ExtractLinks { .. } => "extract-links",
            Self::VisibleText { .. } => "visible-text",
        }
    }

    /// Builds the injectable JavaScript for this request
    ///
    /// The script posts exactly one JSON message carrying `id` to
    /// [`BRIDGE_OBJECT`].
    pub fn to_js(&self, id: u64) -> String {
        let body = match self {
            Self::ExtractFields { fields } => {
                let specs = serde_json::to_string(fields).unwrap_or_else(|_| "{}".to_string());
                format!(
                    r#"var specs = {specs};
    var data = {{}};
    Object.keys(specs).forEach(function (name) {{
      var s = specs[name];
      var nodes = Array.prototype.slice.call(document.querySelectorAll(s.selector));
      var values = nodes.map(function (n) {{
        var v = s.attribute ? n.getAttribute(s.attribute) : n.textContent;
        return v == null ? '' : String(v).replace(/\s+/g, ' ').trim();
      }}).filter(function (v) {{ return v.length > 0; }});
      data[name] = values.length === 0 ? null : (s.multiple ? values : values[0]);
    }});
    post({{ type: 'EXTRACTION_RESULT', id: id, data: data }});"#
                )
            }
            Self::ExtractLinks { current_url, depth } => {
                let current = serde_json::to_string(current_url).unwrap_or_else(|_| "\"\"".into());
                format!(
                    r#"var seen = {{}};
    var links = [];
    Array.prototype.slice.call(document.querySelectorAll('a[href]')).forEach(function (a) {{
      if (a.hasAttribute('download')) return;
      var href = a.href;
      if (!/^https?:/i.test(href)) return;
      href = href.split('#')[0];
      if (!seen[href]) {{ seen[href] = true; links.push(href); }}
    }});
    post({{ type: 'CRAWLER_LINKS_EXTRACTED', id: id, currentUrl: {current}, links: links, depth: {depth} }});"#
                )
            }
            Self::VisibleText { max_chars } => format!(
                r#"var text = (document.body && document.body.innerText) || '';
    post({{ type: 'DOM_TEXT_CONTENT', id: id, data: text.replace(/\s+/g, ' ').trim().slice(0, {max_chars}) }});"#
            ),
        };

        format!(
            r#"(function () {{
  var id = {id};
  var post = function (m) {{ {BRIDGE_OBJECT}.postMessage(JSON.stringify(m)); }};
  try {{
    {body}
  }} catch (e) {{
    post({{ type: 'EXTRACTION_ERROR', id: id, error: String((e && e.message) || e) }});
  }}
}})();
true;"#
        )
    }
}
