//! Error types for the console client binary.
//!
//! [`ClientError`] wraps every failure that can stop the client during
//! startup or shutdown, so `main` can propagate with `?`.

/// Top-level error for the console client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: monafarms_core::ConfigError,
    },

    /// The stats store could not be opened or saved.
    #[error("stats error: {source}")]
    Stats {
        /// The underlying store error.
        #[from]
        source: monafarms_core::StoreError,
    },

    /// The backend failed during startup.
    #[error("backend error: {source}")]
    Backend {
        /// The underlying backend error.
        #[from]
        source: monafarms_core::BackendError,
    },

    /// Reading commands from the terminal failed.
    #[error("console I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// A background task panicked or was cancelled.
    #[error("background task failed: {message}")]
    Task {
        /// Description of the failure.
        message: String,
    },
}
