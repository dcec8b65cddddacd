//! Error types for the query compiler.
//!
//! Three kinds of failure leave the compiler:
//! - [`ConfigError`]: invalid table or identifier names, detected before
//!   any SQL is built
//! - [`CompileError::UnsupportedPredicate`]: the query asks for something the
//!   chosen dialect or feature set cannot express
//! - [`CompileError::CompilerInvariant`]: the pass pipeline and the emitter
//!   disagree, which is always a compiler bug
//!
//! Compilation is deterministic, so none of these are retryable.

use thiserror::Error;

/// Invalid identifier or table configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Identifier does not match the identifier grammar
    #[error("invalid identifier '{name}': {reason}")]
    InvalidIdentifier { name: String, reason: &'static str },

    /// Identifier collides with a reserved SQL keyword
    #[error("identifier '{name}' is a reserved SQL keyword")]
    ReservedKeyword { name: String },

    /// JSON pointer could not be parsed
    #[error("invalid JSON pointer '{pointer}': {reason}")]
    InvalidJsonPointer { pointer: String, reason: &'static str },
}

/// Errors raised while compiling a query or set operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    /// Invalid schema or identifier configuration
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// The query cannot be expressed for this dialect or feature set
    #[error("unsupported predicate: {message}")]
    UnsupportedPredicate { message: String },

    /// Internal consistency check failed
    #[error("compiler invariant violated during {phase}: {message} [{context}]")]
    CompilerInvariant {
        phase: &'static str,
        message: String,
        context: String,
    },
}

impl CompileError {
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedPredicate {
            message: message.into(),
        }
    }

    pub fn invariant(
        phase: &'static str,
        message: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self::CompilerInvariant {
            phase,
            message: message.into(),
            context: context.into(),
        }
    }

    /// True for errors the caller can fix by rewriting the query or options.
    pub fn is_caller_fixable(&self) -> bool {
        !matches!(self, Self::CompilerInvariant { .. })
    }
}

/// Errors raised while binding named parameters to a compiled query.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindError {
    /// A named parameter had no supplied value
    #[error("missing value for parameter '{name}'")]
    MissingParameter { name: String },

    /// A LIKE-style parameter received a non-string value
    #[error("parameter '{name}' must be a string, got {found}")]
    ExpectedString { name: String, found: String },
}

/// Result type for compilation.
pub type CompileResult<T> = Result<T, CompileError>;
