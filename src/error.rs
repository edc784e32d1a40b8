//! Error types for document rewriting.

use thiserror::Error;

/// Errors that can occur while rewriting a merged document.
///
/// Only [`Error::Io`], [`Error::Zip`], [`Error::UnsupportedFormat`] and
/// [`Error::Utf8`] ever reach the caller of [`crate::rewrite_archive`]; the
/// others are scoped to a single part, logged, and recorded in the
/// [`crate::RewriteReport`].
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML parsing error in {part}: {message}")]
    Xml { part: String, message: String },

    #[error("Missing part: {0}")]
    PartMissing(String),

    #[error("Invalid relationships in {part}: {message}")]
    Relationships { part: String, message: String },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("UTF-8 decoding error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl Error {
    /// Build an XML error for `part` from any displayable cause.
    pub(crate) fn xml(part: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Error::Xml {
            part: part.into(),
            message: cause.to_string(),
        }
    }

    /// Whether this error is scoped to one part and must not abort the archive.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Xml { .. } | Error::PartMissing(_) | Error::Relationships { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
