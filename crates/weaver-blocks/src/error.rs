//! Error types for block operations.

use miette::Diagnostic;
use smol_str::SmolStr;
use thiserror::Error;

use crate::types::BlockId;

/// Errors raised by the block collection manager.
///
/// These are programmer-contract violations: the caller asked for something
/// that cannot exist (an absent block, an index outside the collection, a tool
/// nobody registered). Tool-level failures never surface here; they degrade
/// to "no data extracted" and are logged instead.
#[derive(Error, Debug, Diagnostic)]
#[non_exhaustive]
pub enum BlockError {
    /// No tool name was supplied and no default tool is configured.
    #[error("no tool name supplied and no default tool configured")]
    #[diagnostic(code(weaver::blocks::no_default_tool))]
    NoDefaultTool,

    /// The requested tool is not registered.
    #[error("unknown tool: {0}")]
    #[diagnostic(code(weaver::blocks::unknown_tool))]
    UnknownTool(SmolStr),

    /// The block is not part of the collection.
    #[error("block not found: {0}")]
    #[diagnostic(code(weaver::blocks::not_found))]
    BlockNotFound(BlockId),

    /// A block with this id is already in the collection.
    #[error("duplicate block id: {0}")]
    #[diagnostic(code(weaver::blocks::duplicate_id))]
    DuplicateId(BlockId),

    /// Index outside `[0, len)`.
    #[error("index {index} out of range for {len} blocks")]
    #[diagnostic(code(weaver::blocks::index_out_of_range))]
    IndexOutOfRange { index: usize, len: usize },

    /// The operation needs a current block and none is set.
    #[error("no current block")]
    #[diagnostic(code(weaver::blocks::no_current_block))]
    NoCurrentBlock,

    /// Conversion needs export/import rules the tools do not declare.
    #[error("cannot convert {from} to {to}: missing conversion config")]
    #[diagnostic(
        code(weaver::blocks::not_convertible),
        help("declare an export rule on the source tool and an import rule on the target tool")
    )]
    NotConvertible { from: SmolStr, to: SmolStr },

    /// The block's tool failed to produce data the operation depends on.
    #[error("could not extract data from block {0}")]
    #[diagnostic(code(weaver::blocks::extraction_failed))]
    ExtractionFailed(BlockId),

    /// A tool rejected an operation it was asked to perform.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Tool(#[from] ToolError),

    /// Reparenting would make a block its own ancestor.
    #[error("setting parent of {block} to {parent} would create a cycle")]
    #[diagnostic(code(weaver::blocks::parent_cycle))]
    ParentCycle { block: BlockId, parent: BlockId },
}

/// Failure reported by a tool implementation.
#[derive(Error, Debug, Clone, PartialEq, Diagnostic)]
#[error("tool {tool} failed: {message}")]
#[diagnostic(code(weaver::blocks::tool))]
pub struct ToolError {
    pub tool: SmolStr,
    pub message: String,
}

impl ToolError {
    pub fn new(tool: impl Into<SmolStr>, message: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Error for an operation the tool does not implement.
    pub fn unsupported(tool: impl Into<SmolStr>, operation: &str) -> Self {
        Self::new(tool, format!("{operation} is not supported"))
    }
}

/// Errors raised by the drag subsystem.
#[derive(Error, Debug, Diagnostic)]
#[non_exhaustive]
pub enum DragError {
    /// The operation is not valid in the current drag state.
    #[error("cannot {operation} while {state}")]
    #[diagnostic(code(weaver::drag::invalid_transition))]
    InvalidTransition {
        operation: &'static str,
        state: &'static str,
    },

    /// `drop` was called before any target was recorded.
    #[error("cannot drop without a target")]
    #[diagnostic(code(weaver::drag::missing_target))]
    MissingTarget,

    /// The block operation behind a drag step failed.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Block(#[from] BlockError),
}

/// Configuration parsing error.
#[derive(Error, Debug, Diagnostic)]
#[error("invalid blocks configuration: {0}")]
#[diagnostic(code(weaver::blocks::config))]
pub struct ConfigError(#[from] pub serde_json::Error);

/// Result type for block operations.
pub type Result<T> = std::result::Result<T, BlockError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = BlockError::IndexOutOfRange { index: 4, len: 2 };
        assert_eq!(err.to_string(), "index 4 out of range for 2 blocks");

        let err: BlockError = ToolError::unsupported("paragraph", "split").into();
        assert_eq!(err.to_string(), "tool paragraph failed: split is not supported");
    }

    #[test]
    fn test_drag_error_messages() {
        let err = DragError::InvalidTransition {
            operation: "drop",
            state: "idle",
        };
        assert_eq!(err.to_string(), "cannot drop while idle");

        let err: DragError = BlockError::BlockNotFound("x".into()).into();
        assert_eq!(err.to_string(), "block not found: x");
    }
}
