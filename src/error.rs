use thiserror::Error;

/// File-level failures: these abort processing of one input file but never
/// abort the whole run. The pipeline logs them and records them in the run
/// summary.
#[derive(Debug, Clone, Error)]
pub enum CurveError {
    /// A required header parameter is missing or unparseable.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// The data section is unreadable, non-numeric, or has fewer than 2 rows.
    #[error("malformed data: {0}")]
    MalformedData(String),

    /// The ephemeris (period/duration) is non-positive or non-finite.
    #[error("invalid ephemeris: {0}")]
    InvalidEphemeris(String),
}

/// Run-fatal error carrying a process exit code.
///
/// Used for conditions the run cannot recover from (unwritable output
/// directory, failed CSV/PNG writes) and for the final "some files failed"
/// exit status.
#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
