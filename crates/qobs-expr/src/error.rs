//! Expression error types

use thiserror::Error;

pub type ExprResult<T> = Result<T, ExprError>;

/// Errors produced while compiling or running a manifest expression.
///
/// Compile-class errors ([`Syntax`](ExprError::Syntax) and
/// [`UnknownIdentifier`](ExprError::UnknownIdentifier)) carry a byte
/// offset into the expression text; run-class errors carry a textual
/// cause only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("unknown identifier `{name}` at offset {offset}")]
    UnknownIdentifier { name: String, offset: usize },

    #[error("unknown function `{name}` at offset {offset}")]
    UnknownFunction { name: String, offset: usize },

    #[error("type error: {0}")]
    Type(String),

    #[error("argument error in `{function}`: {message}")]
    Argument { function: String, message: String },
}

impl ExprError {
    /// Create a syntax error at the given byte offset
    pub fn syntax(offset: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            offset,
            message: message.into(),
        }
    }

    /// Create a run-time type error
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::Type(message.into())
    }

    /// Whether this error belongs to the compile phase
    pub fn is_compile_error(&self) -> bool {
        matches!(
            self,
            Self::Syntax { .. } | Self::UnknownIdentifier { .. } | Self::UnknownFunction { .. }
        )
    }
}
