use clinicalflow_types::ResultStatus;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoreError {
    /// One or more input fields failed validation. The message lists every failing field as
    /// `field: message`, separated by `, `.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("lab result {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: ResultStatus,
        to: ResultStatus,
    },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl CoreError {
    /// True for errors that mean "the request clashes with current state" rather than "the
    /// request is malformed" or "the thing does not exist".
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::InvalidTransition { .. })
    }

    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
