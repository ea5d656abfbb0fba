/*
 * error.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Error types for template registration, rendering and mounting.

use thiserror::Error;

/// Errors that can occur during template operations.
///
/// Rendering itself is forgiving: filter failures are caught per token and
/// rendered as the empty string, and malformed token syntax is kept as
/// literal text. The variants here surface from registration, settings and
/// mounting.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// A registry or settings call received an unusable argument.
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// A named template was not found.
    #[error("Template with name '{name}' not found")]
    NotFound { name: String },

    /// A filter step failed while rendering a token.
    #[error("Filter '{name}' failed: {message}")]
    Filter { name: String, message: String },

    /// Rendered markup could not be parsed into a tree.
    #[error("Markup error: {0}")]
    Markup(#[from] potion_dom::Error),
}

impl TemplateError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        TemplateError::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn filter(name: impl Into<String>, message: impl Into<String>) -> Self {
        TemplateError::Filter {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Result type for template operations.
pub type TemplateResult<T> = Result<T, TemplateError>;
