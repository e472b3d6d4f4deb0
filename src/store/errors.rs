use crate::utils::IsTransient;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store rejected the request: {0}")]
    Rejected(String),

    #[error("object already exists: {0}")]
    AlreadyExists(String),

    #[error("failed to encode record: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("invalid store configuration: {0}")]
    Config(String),
}

impl IsTransient for StoreError {
    fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}
