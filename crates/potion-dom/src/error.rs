//! Error types for markup parsing.

use thiserror::Error;

/// Result type alias for potion-dom operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while turning markup into a [`Document`](crate::Document).
///
/// The parser is lenient about HTML idioms (void elements, unclosed or
/// stray end tags, valueless attributes), so these only surface for input
/// the underlying tokenizer cannot make sense of at all.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// Markup syntax error reported by the tokenizer.
    #[error("markup syntax error at byte {position}: {message}")]
    Syntax {
        message: String,
        /// Byte offset into the parsed fragment.
        position: u64,
    },

    /// The fragment parsed, but could not be assembled into a tree.
    #[error("invalid markup structure: {message}")]
    InvalidStructure { message: String },
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::Syntax {
            message: err.to_string(),
            position: 0,
        }
    }
}
