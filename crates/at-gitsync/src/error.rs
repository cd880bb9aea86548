use at_core::error::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum GitSyncError {
    #[error("operation {0} not found")]
    NotFound(String),
    #[error("operation {0} is in a terminal state and cannot be cancelled")]
    AlreadyTerminal(String),
    #[error("only the owning agent or an admin may cancel this operation")]
    NotOwner,
}

impl GitSyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GitSyncError::NotFound(_) => ErrorKind::NotFound,
            GitSyncError::AlreadyTerminal(_) => ErrorKind::Conflict,
            GitSyncError::NotOwner => ErrorKind::Forbidden,
        }
    }
}
