//! Error handling for the visualization control plane
//!
//! This module defines the crate error type and a Result alias for use
//! throughout the session, source, telemetry and topology layers.

use thiserror::Error;

/// Main error type for insitu-steer operations
#[derive(Error, Debug)]
pub enum VisError {
    /// Errors related to configuration loading/validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// The render pipeline could not reach the visualization endpoint
    #[error("Connection error: {0}")]
    Connection(String),

    /// A registered source names a quantity the simulation does not provide
    #[error("Simulation quantity not found: {0}")]
    MissingQuantity(String),

    /// A simulation quantity does not have the component count its source
    /// was registered with
    #[error("Field '{quantity}' has {found} components, source expects {expected}")]
    ComponentMismatch {
        quantity: String,
        found: u8,
        expected: u8,
    },

    /// A collective operation across processes failed
    #[error("Collective error on rank {rank}: {message}")]
    Collective { rank: u32, message: String },

    /// Errors reported by the external render pipeline
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// The remote viewer asked the simulation to terminate
    #[error("Exit requested by remote viewer")]
    ExitRequested,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML configuration parse errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<VisError>,
    },
}

impl VisError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        VisError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error should stop the simulation rather than just
    /// disable visualization.
    pub fn is_fatal(&self) -> bool {
        match self {
            VisError::MissingQuantity(_)
            | VisError::ComponentMismatch { .. }
            | VisError::ExitRequested
            | VisError::Collective { .. } => true,
            VisError::WithContext { source, .. } => source.is_fatal(),
            _ => false,
        }
    }

    /// Whether this error means the viewer link was lost and the session's
    /// reconnect policy applies
    pub fn is_connection_loss(&self) -> bool {
        match self {
            VisError::Connection(_) | VisError::Pipeline(_) => true,
            VisError::WithContext { source, .. } => source.is_connection_loss(),
            _ => false,
        }
    }
}

/// Result type alias for insitu-steer operations
pub type Result<T> = std::result::Result<T, VisError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| VisError::from(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| VisError::from(e).with_context(f()))
    }
}
