//! Error types for SocialFlow.
//!
//! Library crates use [`SocialFlowError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics, and turns it into
//! an [`ErrorPayload`] when asked for machine-readable output.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// External collaborator that produced an upstream failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamStage {
    /// Transcript provider (unreachable, no captions, unreadable payload).
    Transcript,
    /// Generation backend (unreachable, rejected, timed out, empty payload).
    Generation,
}

impl std::fmt::Display for UpstreamStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transcript => f.write_str("transcript"),
            Self::Generation => f.write_str("generation"),
        }
    }
}

/// Top-level error type for all SocialFlow operations.
#[derive(Debug, thiserror::Error)]
pub enum SocialFlowError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A required field was missing or empty. Raised before any external call.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Transcript provider or generation backend failed.
    #[error("{stage} failure: {message}")]
    Upstream {
        stage: UpstreamStage,
        message: String,
    },

    /// History handed to the prompt assembler was malformed.
    #[error("assembly error: {message}")]
    Assembly { message: String },

    /// Conversation store, article sink, or journal read/write error.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SocialFlowError>;

/// Stable, caller-visible error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ConfigError,
    ValidationFailure,
    UpstreamFailure,
    AssemblyFailure,
    PersistenceFailure,
    IoError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigError => "config_error",
            Self::ValidationFailure => "validation_failure",
            Self::UpstreamFailure => "upstream_failure",
            Self::AssemblyFailure => "assembly_failure",
            Self::PersistenceFailure => "persistence_failure",
            Self::IoError => "io_error",
        }
    }
}

impl SocialFlowError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create an assembly error from any displayable message.
    pub fn assembly(msg: impl Into<String>) -> Self {
        Self::Assembly {
            message: msg.into(),
        }
    }

    /// Generation backend failure.
    pub fn generation(msg: impl Into<String>) -> Self {
        Self::Upstream {
            stage: UpstreamStage::Generation,
            message: msg.into(),
        }
    }

    /// Transcript provider failure.
    pub fn transcript(msg: impl Into<String>) -> Self {
        Self::Upstream {
            stage: UpstreamStage::Transcript,
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The stable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config { .. } => ErrorKind::ConfigError,
            Self::Validation { .. } => ErrorKind::ValidationFailure,
            Self::Upstream { .. } => ErrorKind::UpstreamFailure,
            Self::Assembly { .. } => ErrorKind::AssemblyFailure,
            Self::Persistence(_) => ErrorKind::PersistenceFailure,
            Self::Io { .. } => ErrorKind::IoError,
        }
    }

    /// Human-readable cause without the kind prefix.
    pub fn cause(&self) -> String {
        match self {
            Self::Config { message }
            | Self::Validation { message }
            | Self::Assembly { message } => message.clone(),
            Self::Upstream { stage, message } => format!("{stage}: {message}"),
            Self::Persistence(message) => message.clone(),
            Self::Io { path, source } => format!("{}: {source}", path.display()),
        }
    }
}

/// Serializable failure payload handed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub kind: ErrorKind,
    pub cause: String,
}

impl From<&SocialFlowError> for ErrorPayload {
    fn from(err: &SocialFlowError) -> Self {
        Self {
            kind: err.kind(),
            cause: err.cause(),
        }
    }
}
