//! Tool contracts.
//!
//! Tools render and serialize a block's content. Their implementations live
//! outside this crate; the engine only talks to them through [`BlockTool`]
//! (one instance per block) and [`ToolDefinition`] (per tool type: factory,
//! capabilities, conversion and sanitize configuration).

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use futures_util::future::LocalBoxFuture;
use smol_str::SmolStr;

use crate::error::{BlockError, ToolError};
use crate::sanitize::{FieldRules, SanitizeRules, sanitize_html};
use crate::types::{BlockData, Tunes};

/// Content split at a caret position.
#[derive(Clone, Debug, PartialEq)]
pub struct SplitContents {
    /// What stays in the original block.
    pub retained: BlockData,
    /// What moves into the new sibling block.
    pub extracted: BlockData,
}

/// A live tool instance bound to one block.
pub trait BlockTool {
    /// Extract the current data. May be asynchronous (e.g. uploads in flight).
    fn save(&self) -> LocalBoxFuture<'_, Result<BlockData, ToolError>>;

    /// Replace the rendered content with `data`.
    fn set_data(&mut self, data: &BlockData) -> Result<(), ToolError>;

    /// Append another block's (already sanitized) data to this one.
    fn merge(&mut self, _data: &BlockData) -> Result<(), ToolError> {
        Err(ToolError::unsupported(self.name(), "merge"))
    }

    /// Split the content at a caret offset, truncating this instance.
    fn split_at(&mut self, _caret: usize) -> Result<SplitContents, ToolError> {
        Err(ToolError::unsupported(self.name(), "split"))
    }

    /// Whether the block has no meaningful content.
    fn is_empty(&self) -> bool {
        false
    }

    /// Nesting depth marker for hierarchical (list) content. `None` for flat tools.
    fn list_depth(&self) -> Option<usize> {
        None
    }

    /// Tool name, used in diagnostics.
    fn name(&self) -> &str;
}

/// Builds a tool instance from block data and tunes.
pub type ToolFactory = Rc<dyn Fn(&BlockData, &Tunes) -> Box<dyn BlockTool>>;

/// How a tool's data is exported to a plain string for conversion.
#[derive(Clone)]
pub enum ExportRule {
    /// Take a string field.
    Field(SmolStr),
    /// Compute the string from the whole payload.
    With(fn(&BlockData) -> String),
}

/// How a plain string becomes a tool's data during conversion.
#[derive(Clone)]
pub enum ImportRule {
    /// Store the string in a field.
    Field(SmolStr),
    /// Build the whole payload from the string.
    With(fn(&str) -> BlockData),
}

/// Conversion configuration of a tool.
#[derive(Clone, Default)]
pub struct ConversionConfig {
    pub export: Option<ExportRule>,
    pub import: Option<ImportRule>,
}

/// Per-tool-type definition: factory, capabilities and content rules.
pub struct ToolDefinition {
    name: SmolStr,
    factory: ToolFactory,
    mergeable: bool,
    conversion: ConversionConfig,
    sanitize: FieldRules,
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("mergeable", &self.mergeable)
            .field("exports", &self.conversion.export.is_some())
            .field("imports", &self.conversion.import.is_some())
            .finish_non_exhaustive()
    }
}

impl ToolDefinition {
    pub fn new<F>(name: impl Into<SmolStr>, factory: F) -> Self
    where
        F: Fn(&BlockData, &Tunes) -> Box<dyn BlockTool> + 'static,
    {
        Self {
            name: name.into(),
            factory: Rc::new(factory),
            mergeable: false,
            conversion: ConversionConfig::default(),
            sanitize: FieldRules::new(),
        }
    }

    /// Declare that blocks of this tool can absorb same-tool blocks.
    pub fn mergeable(mut self, mergeable: bool) -> Self {
        self.mergeable = mergeable;
        self
    }

    pub fn export(mut self, rule: ExportRule) -> Self {
        self.conversion.export = Some(rule);
        self
    }

    pub fn import(mut self, rule: ImportRule) -> Self {
        self.conversion.import = Some(rule);
        self
    }

    /// Declare sanitize rules for a data field.
    pub fn sanitize_field(mut self, field: impl Into<SmolStr>, rules: SanitizeRules) -> Self {
        self.sanitize.insert(field.into(), rules);
        self
    }

    pub fn name(&self) -> &SmolStr {
        &self.name
    }

    pub fn is_mergeable(&self) -> bool {
        self.mergeable
    }

    pub fn sanitize_rules(&self) -> &FieldRules {
        &self.sanitize
    }

    pub fn can_export(&self) -> bool {
        self.conversion.export.is_some()
    }

    pub fn can_import(&self) -> bool {
        self.conversion.import.is_some()
    }

    /// Build a tool instance.
    pub fn create(&self, data: &BlockData, tunes: &Tunes) -> Box<dyn BlockTool> {
        (self.factory)(data, tunes)
    }

    /// Export data to a conversion string.
    pub fn export_to_string(&self, data: &BlockData) -> Option<String> {
        match self.conversion.export.as_ref()? {
            ExportRule::Field(field) => Some(
                data.get(field.as_str())
                    .map(|v| match v {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .unwrap_or_default(),
            ),
            ExportRule::With(f) => Some(f(data)),
        }
    }

    /// Import a conversion string, cleaning it with the import field's rules first.
    ///
    /// Computed imports have no single field, so the string is stripped to plain text.
    pub fn import_from_string(&self, content: &str) -> Option<BlockData> {
        match self.conversion.import.as_ref()? {
            ImportRule::Field(field) => {
                let rules = self.sanitize.get(field).cloned().unwrap_or_default();
                let mut data = BlockData::new();
                data.insert(
                    field.to_string(),
                    serde_json::Value::String(sanitize_html(content, &rules)),
                );
                Some(data)
            }
            ImportRule::With(f) => Some(f(&sanitize_html(content, &SanitizeRules::plain_text()))),
        }
    }
}

/// Registered tools plus the configured default.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: HashMap<SmolStr, Rc<ToolDefinition>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any previous definition with the same name.
    pub fn register(&mut self, tool: ToolDefinition) -> &mut Self {
        self.tools.insert(tool.name.clone(), Rc::new(tool));
        self
    }

    pub fn get(&self, name: &str) -> Result<Rc<ToolDefinition>, BlockError> {
        self.tools
            .get(name)
            .cloned()
            .ok_or_else(|| BlockError::UnknownTool(name.into()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{TextTool, text_data};

    fn header() -> ToolDefinition {
        ToolDefinition::new("header", |data, _| Box::new(TextTool::new("header", data)))
            .export(ExportRule::Field("text".into()))
            .import(ImportRule::Field("text".into()))
            .sanitize_field("text", SanitizeRules::allow(["i"]))
    }

    #[test]
    fn test_export_import_field_rules() {
        let tool = header();
        assert_eq!(
            tool.export_to_string(&text_data("<b>Title</b>")).as_deref(),
            Some("<b>Title</b>")
        );
        let imported = tool.import_from_string("<b>big</b> <i>small</i>").unwrap();
        assert_eq!(imported["text"], "big <i>small</i>");
    }

    #[test]
    fn test_computed_rules() {
        let tool = ToolDefinition::new("code", |data, _| Box::new(TextTool::new("code", data)))
            .export(ExportRule::With(|data| {
                format!("code:{}", data.get("code").and_then(|v| v.as_str()).unwrap_or(""))
            }))
            .import(ImportRule::With(|s| {
                let mut data = BlockData::new();
                data.insert("code".into(), s.into());
                data
            }));
        let mut data = BlockData::new();
        data.insert("code".into(), "x = 1".into());
        assert_eq!(tool.export_to_string(&data).as_deref(), Some("code:x = 1"));
        assert_eq!(tool.import_from_string("<b>y</b>").unwrap()["code"], "y");
    }

    #[test]
    fn test_registry_unknown_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(header());
        assert!(registry.contains("header"));
        assert!(matches!(
            registry.get("quote"),
            Err(BlockError::UnknownTool(name)) if name == "quote"
        ));
    }
}
