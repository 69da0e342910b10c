use std::fmt;

/// Category of a reportable failure.
///
/// Everything below the round controller either recovers locally (stale
/// messages are dropped, duplicate edges collapse into set semantics,
/// malformed input lines are skipped) or aborts the process via an assertion,
/// so the only errors that travel upward are the ones the binary has to turn
/// into exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    /// Bad or missing command-line arguments.
    Usage,
    /// The edge-list file could not be opened or mapped.
    Io,
    /// Process-level setup failed (e.g. the logger could not be installed).
    Internal,
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Error type carried out of the library: a category plus a human-readable
/// message.
#[derive(Debug)]
pub struct DcscError {
    error_type: ErrorType,
    message: String,
}

impl DcscError {
    pub fn new(error_type: ErrorType, message: String) -> Self {
        Self { error_type, message }
    }

    pub fn error_type(&self) -> ErrorType {
        self.error_type
    }
}

impl fmt::Display for DcscError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.error_type, self.message)
    }
}

impl std::error::Error for DcscError {}

pub fn usage_error(message: String) -> DcscError {
    DcscError::new(ErrorType::Usage, message)
}

pub fn io_error(message: String) -> DcscError {
    DcscError::new(ErrorType::Io, message)
}

pub fn internal_error(message: String) -> DcscError {
    DcscError::new(ErrorType::Internal, message)
}
