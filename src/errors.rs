// Error taxonomy (spec.md S7) and the validation-context helper used at contract
// boundaries, in the style of the retained `contracts.rs` preconditions.

use std::collections::HashMap;

/// The error taxonomy every public, fallible operation in this crate returns.
#[derive(Debug, thiserror::Error)]
pub enum GraphRagError {
    /// A referenced node/edge/community is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Attempted create of an already-existing uid.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A stored document does not deserialize into its declared shape.
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// An extractor tuple or completion JSON response failed to parse.
    /// Recovered locally by the caller (builder skips the tuple, worker emits a
    /// zero-score fallback, summarizer writes a degraded community) — never bubbled
    /// past the component boundary that can recover from it.
    #[error("parse error: {0}")]
    ParseError(String),

    /// Rendezvous polling did not reach the completion threshold within the
    /// configured attempt budget.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Bus publish, store I/O, or a Completion/Embedding call failed with a
    /// retriable signal. Callers retry with bounded backoff before surfacing.
    #[error("transient upstream failure: {0}")]
    TransientUpstream(String),

    /// Catch-all for plumbing errors that don't warrant a dedicated variant.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, GraphRagError>;

impl GraphRagError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn already_exists(what: impl Into<String>) -> Self {
        Self::AlreadyExists(what.into())
    }

    /// The HTTP status code a surfaced instance of this error should carry.
    pub fn status_code(&self) -> u16 {
        match self {
            GraphRagError::NotFound(_) => 404,
            GraphRagError::AlreadyExists(_) => 409,
            GraphRagError::MalformedRecord(_) => 422,
            GraphRagError::ParseError(_) => 422,
            GraphRagError::Timeout(_) => 504,
            GraphRagError::TransientUpstream(_) => 503,
            GraphRagError::Other(_) => 500,
        }
    }
}

/// Validation context for readable precondition failures, mirroring `contracts.rs`'s
/// `ensure!`-at-the-boundary style but attaching structured attributes.
#[derive(Clone)]
pub struct ValidationContext {
    operation: String,
    attributes: HashMap<String, String>,
}

impl ValidationContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self { operation: operation.into(), attributes: HashMap::new() }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn validate(self, condition: bool, message: &str) -> Result<()> {
        if !condition {
            return Err(GraphRagError::MalformedRecord(format!(
                "{message} (operation: {}, attributes: {:?})",
                self.operation, self.attributes
            )));
        }
        Ok(())
    }
}
