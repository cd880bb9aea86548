use at_core::error::ErrorKind;

/// Only the query path can fail — `record` never propagates an error to
/// its caller (SPEC_FULL.md §4.G).
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error(transparent)]
    EventLog(#[from] at_eventlog::EventLogError),
}

impl AuditError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuditError::EventLog(e) => e.kind(),
        }
    }
}
