//! Error taxonomy shared across the mirror crates.
//!
//! A transient network failure never reaches this type (the HTTP client
//! retries internally); everything past that boundary is one of the
//! variants below.

/// Shared error type for the ingestion/reconciliation engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The upstream returned 404 for a probed id. A data signal, not a fault.
    #[error("not found upstream: {0}")]
    NotFound(String),

    /// Retries against the upstream were exhausted.
    #[error("upstream request failed: {0}")]
    Upstream(String),

    /// Upstream returned 401/403. Fatal to the owning job.
    #[error("upstream authentication failed: {0}")]
    Authentication(String),

    /// A database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Configuration was missing or malformed at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// The operation observed a tripped cancellation handle.
    #[error("cancelled")]
    Cancelled,

    /// A job kind/id lock was already held (single-flight rejection).
    #[error("already running: {0}")]
    AlreadyRunning(String),

    /// An I/O operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Catch-all for states that should be unreachable.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn upstream<S: Into<String>>(msg: S) -> Self {
        Self::Upstream(msg.into())
    }

    pub fn authentication<S: Into<String>>(msg: S) -> Self {
        Self::Authentication(msg.into())
    }

    pub fn database<S: Into<String>>(msg: S) -> Self {
        Self::Database(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    pub fn already_running<S: Into<String>>(msg: S) -> Self {
        Self::AlreadyRunning(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error should be surfaced to the notifier as a job
    /// failure vs. just logged and absorbed into the per-record error count.
    pub fn is_fatal_to_job(&self) -> bool {
        matches!(
            self,
            Error::Authentication(_) | Error::Database(_) | Error::Config(_) | Error::Cancelled
        )
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::Database(e.to_string())
    }
}

/// Result type alias using the shared [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            Error::not_found("603").to_string(),
            "not found upstream: 603"
        );
        assert_eq!(Error::Cancelled.to_string(), "cancelled");
        assert_eq!(
            Error::already_running("full_sweep").to_string(),
            "already running: full_sweep"
        );
    }

    #[test]
    fn fatal_classification() {
        assert!(Error::authentication("bad token").is_fatal_to_job());
        assert!(Error::database("constraint violated").is_fatal_to_job());
        assert!(Error::Cancelled.is_fatal_to_job());
        assert!(!Error::not_found("1").is_fatal_to_job());
        assert!(!Error::upstream("timeout").is_fatal_to_job());
    }
}
