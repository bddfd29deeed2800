//! HTML sanitizing for merged and converted block content.
//!
//! Tools declare, per data field, which inline tags they accept. Content moving
//! between blocks (merge, conversion) is cleaned with the destination field's
//! rules so a block never ends up holding markup its tool cannot render.

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::LazyLock;

use regex_lite::{Captures, Regex};
use smol_str::SmolStr;

use crate::types::BlockData;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<\s*(/?)\s*([a-zA-Z][a-zA-Z0-9-]*)([^>]*)>").expect("tag pattern is valid")
});

/// Allowed markup for one data field.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SanitizeRules {
    allowed: BTreeSet<SmolStr>,
    keep_attributes: bool,
}

impl SanitizeRules {
    /// Rules that strip every tag, keeping only text.
    pub fn plain_text() -> Self {
        Self::default()
    }

    /// Rules that keep the given tags (case-insensitive) without attributes.
    pub fn allow<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed: tags
                .into_iter()
                .map(|t| SmolStr::new(t.as_ref().to_ascii_lowercase()))
                .collect(),
            keep_attributes: false,
        }
    }

    /// Keep attributes on allowed tags.
    pub fn with_attributes(mut self) -> Self {
        self.keep_attributes = true;
        self
    }

    pub fn allows(&self, tag: &str) -> bool {
        self.allowed.contains(tag.to_ascii_lowercase().as_str())
    }
}

/// Per-field sanitize rules for a tool.
pub type FieldRules = HashMap<SmolStr, SanitizeRules>;

/// Clean an HTML fragment with the given rules.
///
/// Disallowed tags are removed while their text content is kept.
pub fn sanitize_html(html: &str, rules: &SanitizeRules) -> String {
    TAG_RE
        .replace_all(html, |caps: &Captures| {
            let closing = &caps[1];
            let tag = caps[2].to_ascii_lowercase();
            if !rules.allows(&tag) {
                return String::new();
            }
            if closing.is_empty() && rules.keep_attributes {
                format!("<{}{}>", tag, &caps[3])
            } else {
                format!("<{closing}{tag}>")
            }
        })
        .into_owned()
}

/// Clean every string field of a data payload that has rules declared.
///
/// Fields without rules pass through untouched.
pub fn sanitize_data(data: &BlockData, rules: &FieldRules) -> BlockData {
    data.iter()
        .map(|(key, value)| {
            let cleaned = match (value, rules.get(key.as_str())) {
                (serde_json::Value::String(s), Some(field_rules)) => {
                    serde_json::Value::String(sanitize_html(s, field_rules))
                }
                _ => value.clone(),
            };
            (key.clone(), cleaned)
        })
        .collect()
}
