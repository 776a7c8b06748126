use std::path::PathBuf;

/// Error taxonomy for the retention engine and its collaborators.
///
/// Pure components (filters, the policy engine, the configuration loader) only ever return
/// `ConfigurationError` or propagate parse failures; everything that touches a subprocess or
/// the storage manager's namespace returns `StorageError`, `StateError` or `Fatal`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed configuration, or an unknown value in a recognized key. Reported to the user;
    /// the process exits non-zero before any storage mutation is attempted.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The driver subprocess exited non-zero, or produced output that could not be parsed.
    #[error("storage error: {command} against {path}: {reason}")]
    Storage {
        path: String,
        command: String,
        reason: String,
    },

    /// A snapshot referenced for destruction does not exist, or a safety precondition (prefix
    /// match, path match) was violated. Callers should log and continue, never propagate as a
    /// process-ending failure.
    #[error("state error: {0}")]
    State(String),

    /// The storage manager could not be contacted at all (binary missing, etc). Fatal: the
    /// process should exit non-zero immediately.
    #[error("fatal: could not contact storage manager: {0}")]
    Fatal(String),

    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
