//! Error taxonomy shared by every stage of the transcode pipeline.
//!
//! Each variant maps to one failure class and is never retried inside this
//! crate. Callers decide what to do with it.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TranscodeError>;

type BoxedCause = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("input validation failed for field '{field}': {reason} (value: {value})")]
    Validation {
        field: &'static str,
        value: String,
        reason: String,
    },
    #[error("security error [{kind}]: {message}")]
    Security {
        kind: SecurityErrorKind,
        message: String,
        #[source]
        cause: Option<BoxedCause>,
    },
    #[error(transparent)]
    ExternalTool(#[from] ExternalToolError),
    #[error("{context}: {source}")]
    Codec {
        context: String,
        #[source]
        source: image::ImageError,
    },
    #[error("{context}: {source}")]
    Resource {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("operation cancelled")]
    Cancelled,
}

impl TranscodeError {
    pub fn validation(
        field: &'static str,
        value: impl fmt::Display,
        reason: impl Into<String>,
    ) -> Self {
        Self::Validation {
            field,
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub fn security(kind: SecurityErrorKind, message: impl Into<String>) -> Self {
        Self::Security {
            kind,
            message: message.into(),
            cause: None,
        }
    }

    pub fn codec(context: impl Into<String>, source: image::ImageError) -> Self {
        Self::Codec {
            context: context.into(),
            source,
        }
    }

    pub fn resource(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Resource {
            context: context.into(),
            source,
        }
    }

    /// Attach an underlying cause to a security error. Other variants are returned unchanged.
    pub fn with_cause(self, cause: impl Into<BoxedCause>) -> Self {
        match self {
            Self::Security { kind, message, .. } => Self::Security {
                kind,
                message,
                cause: Some(cause.into()),
            },
            other => other,
        }
    }

    /// The security kind, if this is a policy violation.
    pub fn security_kind(&self) -> Option<SecurityErrorKind> {
        match self {
            Self::Security { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// The offending field, if this is a validation error.
    pub fn validation_field(&self) -> Option<&'static str> {
        match self {
            Self::Validation { field, .. } => Some(*field),
            _ => None,
        }
    }
}

/// Which policy boundary a [`TranscodeError::Security`] crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityErrorKind {
    CommandNotAllowed,
    DangerousCharacters,
    PathTraversal,
    AbsolutePath,
    PathTooLong,
    ArgumentTooLong,
    ExtensionNotAllowed,
    FileTooLarge,
    OutsideTempDir,
}

impl SecurityErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CommandNotAllowed => "command_not_allowed",
            Self::DangerousCharacters => "dangerous_characters",
            Self::PathTraversal => "path_traversal",
            Self::AbsolutePath => "absolute_path",
            Self::PathTooLong => "path_too_long",
            Self::ArgumentTooLong => "argument_too_long",
            Self::ExtensionNotAllowed => "extension_not_allowed",
            Self::FileTooLarge => "file_too_large",
            Self::OutsideTempDir => "outside_temp_dir",
        }
    }
}

impl fmt::Display for SecurityErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures of the external RAW converter, classified by cause.
#[derive(Error, Debug)]
pub enum ExternalToolError {
    #[error("{program} is not available; install it or add it to PATH")]
    Unavailable { program: String },
    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },
    #[error("{program} exited with {}: {stderr}", describe_exit(.code))]
    NonZeroExit {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} produced no output at {}", .path.display())]
    EmptyOutput { program: String, path: PathBuf },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("code {c}"),
        None => "a signal".to_string(),
    }
}
