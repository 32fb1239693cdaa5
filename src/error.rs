//! Error types for pdf_outline_merge.

use std::io;
use thiserror::Error;

/// Result type alias for pdf_outline_merge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort an export or a document-level operation.
///
/// Outline and link degradations (missing named destinations, links that do
/// not resolve, a merged document without a usable outline chain) are never
/// reported through this type; they are logged and the document is still
/// produced.
#[derive(Error, Debug)]
pub enum Error {
    /// The PDF bytes could not be parsed or written by `lopdf`.
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    /// I/O error when reading, writing or moving files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A required catalog entry was missing from the document trailer.
    #[error("PDF catalog entry is missing")]
    MissingCatalog,

    /// The catalog object was not a dictionary, preventing outline injection.
    #[error("PDF catalog entry is not a dictionary")]
    InvalidCatalog,

    /// None of the merged sources carried a page tree.
    #[error("page tree root not found in any source document")]
    PagesRootMissing,

    /// The export was asked to produce a document from zero pages.
    #[error("no pages to export")]
    NoPages,

    /// The rendering collaborator failed on a page.
    #[error("failed to render {url}: {message}")]
    Render {
        /// URL of the page being rendered.
        url: String,
        /// Renderer supplied description of the failure.
        message: String,
    },

    /// A page manifest or serialized outline could not be decoded.
    #[error("invalid manifest: {0}")]
    Manifest(#[from] serde_json::Error),
}

impl Error {
    /// Convenience constructor for renderer failures.
    pub fn render(url: impl Into<String>, message: impl ToString) -> Self {
        Self::Render {
            url: url.into(),
            message: message.to_string(),
        }
    }
}
