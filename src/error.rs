use crate::core::SessionReport;
use uuid::Uuid;

/// Errors that abort a whole build request.
///
/// Per-target failures (launch, timeout, compile, unsupported target) are not
/// errors; they are reported inside [`crate::core::BuildOutcome`].
#[derive(thiserror::Error, Debug)]
pub enum RunnerError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid option `{option}`: {reason}")]
    InvalidOption { option: &'static str, reason: String },
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("packaging failed: {0}")]
    Packaging(String),
    /// Every target ran but the session could not be packaged; the outcomes survive.
    #[error("session {session_id} built but could not be packaged: {source}")]
    PackagingFailed {
        session_id: Uuid,
        report: Box<SessionReport>,
        #[source]
        source: Box<RunnerError>,
    },
    #[error("build task failed: {0}")]
    TaskFailed(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = RunnerError> = std::result::Result<T, E>;

impl RunnerError {
    /// Per-target outcomes that were produced before the request failed, if any.
    pub fn report(&self) -> Option<&SessionReport> {
        match self {
            RunnerError::PackagingFailed { report, .. } => Some(report.as_ref()),
            _ => None,
        }
    }
}
