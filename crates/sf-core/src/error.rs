//! Unified error type for storyforge.
//!
//! All crates funnel their failures into [`Error`]. Session-level variants
//! mirror the transcode session lifecycle; the rest cover ambient failures
//! (I/O, configuration, upstream HTTP APIs).

/// Unified error type covering all failure modes in storyforge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The engine has not been loaded (or was torn down by `exit`).
    #[error("engine is not ready, make sure load() has completed")]
    NotReady,

    /// `load` was called while an engine is loaded or loading.
    #[error("engine was already loaded; check is_loaded() before calling load() again")]
    AlreadyLoaded,

    /// A command was submitted while another one is still running.
    #[error("engine can only run one command at a time")]
    Busy,

    /// The outstanding command was rejected because the engine exited.
    #[error("engine exited before the command completed")]
    EngineExited,

    /// A virtual filesystem operation failed.
    #[error("{op}('{path}') failed: {hint}")]
    FilesystemOperation {
        /// Operation name as the engine knows it (e.g. "readdir").
        op: String,
        /// Primary path argument of the operation.
        path: String,
        /// Human-readable, operation-specific explanation.
        hint: String,
    },

    /// An engine bootstrap artifact could not be retrieved.
    #[error("failed to fetch {location}: {message}")]
    BootstrapFetch {
        /// Location (URL or path) that was requested.
        location: String,
        /// Human-readable error description.
        message: String,
    },

    /// The engine loaded but does not export the configured entry point.
    #[error("entry point `{symbol}` is not defined by the engine loaded from {location}")]
    MissingEntryPoint {
        /// Symbol that was looked up.
        symbol: String,
        /// Location the engine was loaded from.
        location: String,
    },

    /// The engine reported a failure outside the filesystem surface
    /// (memory allocation, process spawn, ...).
    #[error("Engine error: {0}")]
    Engine(String),

    /// Configuration or input failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// An upstream HTTP API returned an error or an undecodable body.
    #[error("API error [{url}]: {message}")]
    Api {
        /// Requested URL.
        url: String,
        /// Human-readable error description.
        message: String,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the session must be loaded again before it can be used.
    ///
    /// Nothing in storyforge retries automatically; callers use this to
    /// decide between surfacing the error and re-running `load`.
    pub fn requires_reload(&self) -> bool {
        matches!(
            self,
            Error::NotReady
                | Error::EngineExited
                | Error::BootstrapFetch { .. }
                | Error::MissingEntryPoint { .. }
        )
    }

    /// Convenience constructor for [`Error::FilesystemOperation`].
    pub fn filesystem(
        op: impl Into<String>,
        path: impl Into<String>,
        hint: impl Into<String>,
    ) -> Self {
        Error::FilesystemOperation {
            op: op.into(),
            path: path.into(),
            hint: hint.into(),
        }
    }

    /// Convenience constructor for [`Error::BootstrapFetch`].
    pub fn bootstrap(location: impl Into<String>, message: impl Into<String>) -> Self {
        Error::BootstrapFetch {
            location: location.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Api`].
    pub fn api(url: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Api {
            url: url.into(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
