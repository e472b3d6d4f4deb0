use crate::domain::order::ValidationError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Message body is not valid JSON: {0}")]
    MalformedMessage(#[source] serde_json::Error),

    #[error("Invalid order: {0}")]
    InvalidMessage(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Unexpected failure: {0}")]
    Unexpected(String),
}

impl PipelineError {
    /// Poison messages fail the same way on every delivery.
    pub fn is_poison(&self) -> bool {
        matches!(self, PipelineError::MalformedMessage(_) | PipelineError::InvalidMessage(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::MalformedMessage(_) => "malformed",
            PipelineError::InvalidMessage(_) => "invalid",
            PipelineError::Store(_) => "store",
            PipelineError::Unexpected(_) => "unexpected",
        }
    }
}
