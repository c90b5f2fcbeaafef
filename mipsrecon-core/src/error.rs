//! Top-level error enums composed from each module's leaf [`thiserror`] type, the way
//! a ROM loader composes one top-level error around leaf decode/decompression errors.

use crate::{basic_block::BasicBlockError, function::FunctionError};

#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("I/O error reading trace stream: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed trace record: {0}")]
    Malformed(String),
    #[error(transparent)]
    BasicBlock(#[from] BasicBlockError),
    #[error(transparent)]
    Function(#[from] FunctionError),
    #[error("OnMergingPastToLast detected a cycle starting at {0:#010x}")]
    MergeCycle(u32),
    #[error("parsing cancelled")]
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("I/O error loading {0}: {1}")]
    Io(String, #[source] std::io::Error),
    #[error("failed to parse manifest: {0}")]
    Manifest(#[from] serde_json::Error),
    #[error(transparent)]
    BasicBlock(#[from] BasicBlockError),
    #[error(transparent)]
    Function(#[from] FunctionError),
    #[error(transparent)]
    Trace(#[from] TraceError),
}
