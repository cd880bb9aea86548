use at_core::error::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum DcgError {
    #[error("storage error: {0}")]
    Storage(#[from] at_core::error::CoreError),
    #[error("unknown pack: {0}")]
    UnknownPack(String),
    #[error("block event {0} not found")]
    EventNotFound(String),
    #[error("exception {0} not found")]
    ExceptionNotFound(String),
    #[error("exception {0} is not pending approval")]
    ExceptionNotPending(String),
    #[error("exception {0} has expired")]
    ExceptionExpired(String),
    #[error("exception {0} command hash does not match")]
    ExceptionHashMismatch(String),
}

impl DcgError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DcgError::Storage(_) => ErrorKind::SystemUnavailable,
            DcgError::UnknownPack(_) => ErrorKind::ValidationError,
            DcgError::EventNotFound(_) | DcgError::ExceptionNotFound(_) => ErrorKind::NotFound,
            DcgError::ExceptionNotPending(_) | DcgError::ExceptionExpired(_) | DcgError::ExceptionHashMismatch(_) => {
                ErrorKind::Conflict
            }
        }
    }
}
