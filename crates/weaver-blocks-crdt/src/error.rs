//! Error types for the Loro document layer.

use miette::Diagnostic;
use thiserror::Error;

/// Errors that can occur during CRDT operations.
#[derive(Error, Debug, Diagnostic)]
#[non_exhaustive]
pub enum CrdtError {
    /// Failed to import CRDT data.
    #[error("failed to import CRDT data: {0}")]
    #[diagnostic(code(weaver::crdt::import))]
    Import(String),

    /// Failed to export CRDT data.
    #[error("failed to export CRDT data: {0}")]
    #[diagnostic(code(weaver::crdt::export))]
    Export(String),

    /// A block value could not be encoded.
    #[error("serialization error: {0}")]
    #[diagnostic(code(weaver::crdt::serialization))]
    Serialization(#[from] serde_json::Error),

    /// The document does not hold the block an operation names.
    #[error("block not in document: {0}")]
    #[diagnostic(code(weaver::crdt::missing_block))]
    MissingBlock(String),

    /// Loro CRDT error.
    #[error("loro error: {0}")]
    #[diagnostic(code(weaver::crdt::loro))]
    Loro(String),
}

impl From<loro::LoroError> for CrdtError {
    fn from(e: loro::LoroError) -> Self {
        CrdtError::Loro(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CrdtError>;
