//! The interface to the browser that renders pages.

use std::time::Duration;

use crate::model::HeadingElement;

/// A headless browser page able to load a URL and print it as a PDF.
///
/// Implementations own one browser page; the export driver uses it for one
/// page at a time and always calls [`PageRenderer::close`] before returning,
/// including on failure.
pub trait PageRenderer {
    /// Error type reported by the renderer.
    type Error: std::fmt::Display;

    /// Navigates to `url`.
    fn navigate(&mut self, url: &str) -> Result<(), Self::Error>;

    /// Waits until the page finished loading, bounded by `timeout`.
    fn wait_until_idle(&mut self, timeout: Duration) -> Result<(), Self::Error>;

    /// Returns the elements named in `tags` below the elements matched by
    /// `scope`, in document order.
    fn collect_headings(
        &mut self,
        scope: &str,
        tags: &[String],
    ) -> Result<Vec<HeadingElement>, Self::Error>;

    /// Adds one hidden `<a href="#id">` per id at the top of the page so the
    /// PDF printer registers a named destination for each of them.
    fn inject_anchors(&mut self, ids: &[String]) -> Result<(), Self::Error>;

    /// Prints the current page state as PDF bytes.
    fn print_pdf(&mut self) -> Result<Vec<u8>, Self::Error>;

    /// Releases the browser page.
    fn close(&mut self) -> Result<(), Self::Error>;
}
