//! Manifest loading error types

use qobs_expr::ExprError;
use std::path::PathBuf;
use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse manifest: {0}")]
    Parse(String),

    #[error("failed to parse [{section}] section: {message}")]
    Section { section: String, message: String },

    #[error("in expression `{expression}`: {source}")]
    Expression {
        expression: String,
        source: ExprError,
    },

    #[error("failed to read manifest at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ConfigError {
    /// Create a section decode error
    pub fn section(section: impl Into<String>, message: impl ToString) -> Self {
        Self::Section {
            section: section.into(),
            message: message.to_string(),
        }
    }

    /// Create an expression error carrying the offending expression text
    pub fn expression(expression: impl Into<String>, source: ExprError) -> Self {
        Self::Expression {
            expression: expression.into(),
            source,
        }
    }
}
