//! Error types for the verification engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving or verifying a listing page
///
/// The first four variants form the transient interaction taxonomy: they are
/// always eligible for a retry. `Interaction` is what a transient failure turns
/// into once its retry budget is spent.
#[derive(Error, Debug)]
pub enum Error {
    /// No element matched a selector
    #[error("Element not found: {0}")]
    NotFound(String),

    /// Element exists but cannot be interacted with yet
    #[error("Element not interactable: {0}")]
    NotInteractable(String),

    /// A previously located element was replaced or removed by the page
    #[error("Stale element reference: {0}")]
    Stale(String),

    /// A bounded wait elapsed before its condition held
    #[error("Timed out after {timeout_ms}ms waiting for {what}")]
    WaitTimeout { what: String, timeout_ms: u64 },

    /// A transient failure that outlived its retry budget
    #[error("{step}: {source}")]
    Interaction {
        step: String,
        #[source]
        source: Box<Error>,
    },

    /// A detail document could not be retrieved or parsed
    #[error("Failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// Failed to start the browser session
    #[error("Session initialization failed: {0}")]
    InitializationError(String),

    /// Failed to load a URL in the interactive session
    #[error("Failed to load URL: {0}")]
    LoadError(String),

    /// Invalid configuration or test-case input
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Malformed selector or markup
    #[error("Parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// CDP-specific error
    #[cfg(feature = "cdp")]
    #[error("CDP error: {0}")]
    CdpError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Wrap a transient failure as a fatal interaction failure for `step`.
    pub fn interaction(step: impl Into<String>, cause: Error) -> Self {
        Error::Interaction {
            step: step.into(),
            source: Box::new(cause),
        }
    }

    /// Whether this failure belongs to the transient interaction taxonomy.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_) | Error::NotInteractable(_) | Error::Stale(_) | Error::WaitTimeout { .. }
        )
    }

    /// Transient failures plus exhausted nested interactions.
    pub fn is_interaction(&self) -> bool {
        self.is_transient() || matches!(self, Error::Interaction { .. })
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Error::Stale(_))
    }
}

#[cfg(feature = "cdp")]
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::CdpError(err.to_string())
    }
}
