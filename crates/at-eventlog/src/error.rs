use at_core::error::{CoreError, ErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum EventLogError {
    #[error(transparent)]
    Storage(#[from] CoreError),
    #[error("cursor {0:?} is older than the retained window")]
    CursorExpired(String),
    #[error("cursor {0:?} is not well-formed")]
    InvalidCursor(String),
}

impl EventLogError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EventLogError::Storage(e) => e.kind,
            EventLogError::CursorExpired(_) => ErrorKind::CursorExpired,
            EventLogError::InvalidCursor(_) => ErrorKind::ValidationError,
        }
    }
}
