//! Core entry point for the pdf_outline_merge crate.
//!
//! Pages of a documentation site are rendered one by one into single-page
//! PDFs, each carrying an outline built from its headings.  The pages are then
//! merged into one document whose links between pages jump inside the
//! document instead of pointing back at the server the pages came from.

pub mod bookmarks;
pub mod error;
pub mod export;
pub mod extract;
pub mod links;
pub mod merge;
pub mod model;
pub mod names;
pub mod render;
pub mod text;

pub use error::{Error, Result};
