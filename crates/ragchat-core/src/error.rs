//! Failure taxonomy for the retrieval and response pipeline.
//!
//! Recoverable failures ([`RagError::ExpansionFailure`],
//! [`RagError::VariantSearchFailure`]) are built, logged, and absorbed where
//! they happen. Only [`RagError::GenerationFailure`] and
//! [`RagError::IndexUnavailable`] are ever returned to callers of
//! [`ChatEngine::respond`](crate::chat::ChatEngine::respond).
//!
//! An empty retrieval is not an error; it surfaces as
//! [`ReplyKind::NoInformation`](crate::chat::ReplyKind::NoInformation).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    /// Query expansion call failed; retrieval continues with the original query.
    #[error("query expansion failed: {0}")]
    ExpansionFailure(String),

    /// One variant's index search failed; its results are treated as empty.
    #[error("search failed for variant '{variant}': {message}")]
    VariantSearchFailure { variant: String, message: String },

    /// The final answer could not be generated.
    #[error("generation failed: {0}")]
    GenerationFailure(String),

    /// The vector index has not been built yet.
    #[error("vector index unavailable: {0}")]
    IndexUnavailable(String),
}

impl RagError {
    /// Whether the pipeline absorbs this failure instead of surfacing it.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RagError::ExpansionFailure(_) | RagError::VariantSearchFailure { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, RagError>;
