//! Error taxonomy for the document-to-answer pipeline.
//!
//! [`PipelineError`] covers every per-component failure; [`AnswerError`]
//! wraps one of them with the [`Stage`] it occurred in, and is the only
//! error the answer pipeline surfaces. Only `RemoteCall` failures are
//! retry candidates; format and configuration errors never are.

use serde::Serialize;
use thiserror::Error;

/// A failure in one pipeline component.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The file's MIME type has no extractor.
    #[error("unsupported mime type: {0}")]
    UnsupportedType(String),

    /// The file's bytes could not be decoded as the claimed format.
    #[error("decode error: {0}")]
    Decode(String),

    /// Invalid configuration (chunking parameters, provider names, ...).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Folder recursion exceeded the depth cap.
    #[error("folder traversal exceeded the depth limit of {0}")]
    TraversalLimit(usize),

    /// A remote call failed after retries (network, auth, rate limit).
    #[error("remote call failed: {0}")]
    RemoteCall(String),

    /// The requested targets resolved to no usable documents.
    #[error("no documents resolved from the requested targets")]
    NoDocuments,
}

impl PipelineError {
    /// Whether retrying could help. Connectivity and rate-limit failures
    /// qualify; bad bytes and bad configuration never do.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::RemoteCall(_))
    }
}

/// The pipeline stage a terminal failure is attributed to. Serialized into
/// the boundary error payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Resolve,
    Fetch,
    Extract,
    Chunk,
    Embed,
    Index,
    Retrieve,
    Generate,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Resolve => "resolve",
            Stage::Fetch => "fetch",
            Stage::Extract => "extract",
            Stage::Chunk => "chunk",
            Stage::Embed => "embed",
            Stage::Index => "index",
            Stage::Retrieve => "retrieve",
            Stage::Generate => "generate",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal pipeline failure: the stage that failed plus its cause.
/// No partial answer accompanies this; the pipeline either completes
/// or returns this error.
#[derive(Error, Debug)]
#[error("{stage} stage failed: {cause}")]
pub struct AnswerError {
    pub stage: Stage,
    #[source]
    pub cause: PipelineError,
}

impl AnswerError {
    pub fn new(stage: Stage, cause: PipelineError) -> Self {
        Self { stage, cause }
    }
}
