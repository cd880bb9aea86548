use at_core::error::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum CaamError {
    #[error("no pool found for this workspace/provider")]
    NoPoolFound,
    #[error("no active profile for this pool")]
    NoActiveProfile,
    #[error("profile {0} not found")]
    ProfileNotFound(String),
}

impl CaamError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CaamError::NoPoolFound => ErrorKind::NotFound,
            CaamError::NoActiveProfile => ErrorKind::NotFound,
            CaamError::ProfileNotFound(_) => ErrorKind::NotFound,
        }
    }
}
