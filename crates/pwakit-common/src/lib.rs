//! # PwaKit Common
//!
//! The error type every PwaKit crate converts into, plus tracing setup.
//!
//! Crate-local errors (`NetError`, `CacheError`) convert into [`PwaKitError`]
//! at crate boundaries; [`PwaKitError::category`] feeds the `category` field
//! of failure logs.

use thiserror::Error;

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat};

/// Boxed underlying cause carried by the message-bearing variants.
pub type Source = Box<dyn std::error::Error + Send + Sync>;

fn boxed<E: std::error::Error + Send + Sync + 'static>(source: E) -> Option<Source> {
    Some(Box::new(source))
}

/// Every failure the offline agent can observe.
///
/// Agent handlers fold these into their reports; only constructors and the
/// CLI surface them directly.
#[derive(Error, Debug)]
pub enum PwaKitError {
    /// The network could not be reached.
    #[error("network: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Source>,
    },

    /// A bucket or entry was unusable.
    #[error("cache: {message}")]
    Cache {
        message: String,
        #[source]
        source: Option<Source>,
    },

    /// The durable store failed underneath a cache operation.
    #[error("storage: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<Source>,
    },

    #[error("config: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Source>,
    },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Unexpected failure; carries where it was raised.
    #[error("internal: {message}")]
    Internal {
        message: String,
        backtrace: Option<backtrace::Backtrace>,
    },
}

impl PwaKitError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    pub fn network_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: boxed(source),
        }
    }

    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
            source: None,
        }
    }

    pub fn cache_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Cache {
            message: message.into(),
            source: boxed(source),
        }
    }

    pub fn storage_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: boxed(source),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: boxed(source),
        }
    }

    /// Whether a later attempt could succeed, e.g. the next background sync.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PwaKitError::Network { .. } | PwaKitError::Storage { .. } | PwaKitError::Io(_)
        )
    }

    /// Stable name for the `category` log field.
    pub fn category(&self) -> &'static str {
        match self {
            PwaKitError::Network { .. } => "network",
            PwaKitError::Cache { .. } => "cache",
            PwaKitError::Storage { .. } => "storage",
            PwaKitError::Config { .. } => "config",
            PwaKitError::Io(_) => "io",
            PwaKitError::Json(_) => "json",
            PwaKitError::NotFound(_) => "not_found",
            PwaKitError::InvalidArgument(_) => "invalid_argument",
            PwaKitError::Internal { .. } => "internal",
        }
    }
}

/// Result type alias for PwaKit operations.
pub type Result<T> = std::result::Result<T, PwaKitError>;

/// Extension trait for Result.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, message: impl Into<String>) -> Result<T>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| PwaKitError::Internal {
            message: format!("{}: {}", message.into(), e),
            backtrace: Some(backtrace::Backtrace::new()),
        })
    }
}

/// Extension trait for Option.
pub trait OptionExt<T> {
    /// Convert None to a NotFound error.
    fn ok_or_not_found(self, resource: impl Into<String>) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, resource: impl Into<String>) -> Result<T> {
        self.ok_or_else(|| PwaKitError::NotFound(resource.into()))
    }
}
