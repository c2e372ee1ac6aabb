//! Error taxonomy shared by the reader, the analyses and the session.
//!
//! Every variant carries a human-readable message (`Display`) and a stable
//! machine code ([`Error::code`]) so callers can branch on the kind of
//! failure without parsing text.
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// No reader backend could decode the file.
    #[error("could not read {filename}: {message}")]
    Format { filename: String, message: String },

    #[error("invalid time window [{start:.3}, {end:.3}) s: {reason}")]
    InvalidWindow { start: f64, end: f64, reason: String },

    #[error("channel '{0}' is not present in the recording")]
    UnknownChannel(String),

    #[error("window has {available} samples but one segment needs {required}")]
    SegmentTooLong { required: usize, available: usize },

    #[error("band [{min:.2}, {max:.2}] Hz contains too few frequency bins")]
    EmptyBand { min: f64, max: f64 },

    /// The process-wide runtime could not be initialised. Fatal for sessions.
    #[error("analysis runtime failed to start: {0}")]
    RuntimeBootstrap(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("operation not allowed while file is {state}: {operation}")]
    InvalidState { state: String, operation: String },

    #[error("no loaded file named '{0}'")]
    UnknownFile(String),

    #[error("no analysis result with id '{0}'")]
    UnknownResult(String),

    #[error("annotation CSV line {line}: {message}")]
    Csv { line: usize, message: String },

    #[error("plot rendering failed: {0}")]
    Render(String),

    #[error("background job '{job}' panicked: {message}")]
    Worker { job: String, message: String },

    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable identifier for the failure kind, independent of the message.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Format { .. } => "FORMAT_ERROR",
            Error::InvalidWindow { .. } => "INVALID_WINDOW",
            Error::UnknownChannel(_) => "UNKNOWN_CHANNEL",
            Error::SegmentTooLong { .. } => "SEGMENT_TOO_LONG",
            Error::EmptyBand { .. } => "EMPTY_BAND",
            Error::RuntimeBootstrap(_) => "RUNTIME_BOOTSTRAP_FAILURE",
            Error::InvalidParameter(_) => "INVALID_PARAMETER",
            Error::InvalidState { .. } => "INVALID_STATE",
            Error::UnknownFile(_) => "UNKNOWN_FILE",
            Error::UnknownResult(_) => "UNKNOWN_RESULT",
            Error::Csv { .. } => "CSV_ERROR",
            Error::Render(_) => "RENDER_ERROR",
            Error::Worker { .. } => "WORKER_PANIC",
            Error::Json(_) => "JSON_ERROR",
            Error::Io(_) => "IO_ERROR",
        }
    }

    /// `true` for errors that leave the session usable and can be fixed by
    /// re-submitting with different input.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::RuntimeBootstrap(_))
    }

    pub(crate) fn invalid_window(start: f64, end: f64, reason: impl Into<String>) -> Self {
        Error::InvalidWindow { start, end, reason: reason.into() }
    }

    pub(crate) fn param(msg: impl Into<String>) -> Self {
        Error::InvalidParameter(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_differs_from_message() {
        let e = Error::Format { filename: "a.edf".into(), message: "truncated header".into() };
        assert_eq!(e.code(), "FORMAT_ERROR");
        assert!(e.to_string().contains("a.edf"));
        assert!(e.to_string().contains("truncated header"));
        assert_ne!(e.to_string(), e.code());
    }

    #[test]
    fn only_bootstrap_is_fatal() {
        assert!(!Error::RuntimeBootstrap("x".into()).is_recoverable());
        assert!(Error::EmptyBand { min: 1.0, max: 2.0 }.is_recoverable());
        assert!(Error::UnknownChannel("Cz".into()).is_recoverable());
    }
}
