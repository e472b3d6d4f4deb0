// ============================================================================
// Order Validation Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Order payload must be a JSON object")]
    NotAnObject,

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Field {0} must not be empty")]
    EmptyField(&'static str),

    #[error("Field {field} must be {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
}

impl ValidationError {
    /// Name of the offending field, if the error concerns one.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            ValidationError::NotAnObject => None,
            ValidationError::MissingField(field) | ValidationError::EmptyField(field) => Some(field),
            ValidationError::WrongType { field, .. } => Some(field),
        }
    }
}
