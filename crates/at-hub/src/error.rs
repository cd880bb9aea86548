use at_core::error::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("unauthenticated")]
    Unauthenticated,
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error(transparent)]
    EventLog(#[from] at_eventlog::EventLogError),
    #[error("subscriber queue full, disconnecting")]
    BackpressureDisconnected,
    #[error("replay rate limit exceeded for this connection")]
    ReplayRateLimited,
    #[error("a replay is already in flight for this connection")]
    ReplayInFlight,
}

impl HubError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HubError::Unauthenticated => ErrorKind::Unauthenticated,
            HubError::Forbidden(_) => ErrorKind::Forbidden,
            HubError::EventLog(e) => e.kind(),
            HubError::BackpressureDisconnected => ErrorKind::SystemUnavailable,
            HubError::ReplayRateLimited => ErrorKind::RateLimited,
            HubError::ReplayInFlight => ErrorKind::Conflict,
        }
    }
}
