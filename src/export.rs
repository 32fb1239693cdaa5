//! Export driver: renders every page, then merges them into the final PDF.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info, warn};

use crate::bookmarks::{embed_outline, OutlineOptions};
use crate::error::{Error, Result};
use crate::extract::extract_outline;
use crate::links::{canonical_path, rehome_links, RehomeReport};
use crate::merge::{merge_files, MergeMode};
use crate::model::{NormalizedPage, OutlineForest, PdfOutlineEntry};
use crate::render::PageRenderer;

const DEFAULT_HEADING_TAGS: [&str; 6] = ["h1", "h2", "h3", "h4", "h5", "h6"];
const DEFAULT_OUTLINE_SCOPE: &str = "body";
const DEFAULT_PAGE_LOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings of one export run.
#[derive(Clone, Debug)]
pub struct ExportConfig {
    pages: Vec<NormalizedPage>,
    output_file: PathBuf,
    temp_dir: PathBuf,
    pdf_outlines: bool,
    enable_warnings: bool,
    heading_tags: Vec<String>,
    outline_scope: String,
    page_load_timeout: Duration,
}

impl ExportConfig {
    /// Creates a configuration writing to `output_file`, with per-page PDFs
    /// stored in `temp_dir`.
    pub fn new(output_file: impl Into<PathBuf>, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            pages: Vec::new(),
            output_file: output_file.into(),
            temp_dir: temp_dir.into(),
            pdf_outlines: true,
            enable_warnings: false,
            heading_tags: DEFAULT_HEADING_TAGS.iter().map(|tag| tag.to_string()).collect(),
            outline_scope: DEFAULT_OUTLINE_SCOPE.to_string(),
            page_load_timeout: DEFAULT_PAGE_LOAD_TIMEOUT,
        }
    }

    /// Appends a page rendered from `url`; its temporary PDF lives in the temp directory.
    pub fn with_page(mut self, url: impl Into<String>, title: impl Into<String>) -> Self {
        let page_path = self
            .temp_dir
            .join(format!("page-{:04}.pdf", self.pages.len() + 1));
        self.pages.push(NormalizedPage::new(url, page_path, title));
        self
    }

    /// Appends an already normalized page.
    pub fn with_normalized_page(mut self, page: NormalizedPage) -> Self {
        self.pages.push(page);
        self
    }

    /// Enables or disables outline generation and link rehoming.
    pub fn with_outlines(mut self, enabled: bool) -> Self {
        self.pdf_outlines = enabled;
        self
    }

    /// Enables or disables missing destination warnings.
    pub fn with_warnings(mut self, enabled: bool) -> Self {
        self.enable_warnings = enabled;
        self
    }

    /// Sets the heading tags, shallowest first.
    pub fn with_heading_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.heading_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the selector limiting where headings are collected.
    pub fn with_outline_scope(mut self, scope: impl Into<String>) -> Self {
        self.outline_scope = scope.into();
        self
    }

    /// Sets the upper bound for waiting on a page load.
    pub fn with_page_load_timeout(mut self, timeout: Duration) -> Self {
        self.page_load_timeout = timeout;
        self
    }

    /// Pages in render order.
    pub fn pages(&self) -> &[NormalizedPage] {
        &self.pages
    }

    /// Final output path.
    pub fn output_file(&self) -> &Path {
        &self.output_file
    }

    /// Whether outlines are generated.
    pub fn pdf_outlines(&self) -> bool {
        self.pdf_outlines
    }
}

/// Outcome of a successful export.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportSummary {
    /// Path of the written PDF.
    pub output_file: PathBuf,
    /// Number of exported pages.
    pub pages: usize,
    /// Link rehoming results; `None` when outlines were disabled or a single
    /// page was exported.
    pub links: Option<RehomeReport>,
}

/// Renders every configured page with `renderer` and writes the merged PDF.
///
/// The renderer is closed before this function returns, whether or not the
/// export succeeded.  Any page failure aborts the whole export.
pub fn export_pdf<R: PageRenderer>(renderer: &mut R, config: &ExportConfig) -> Result<ExportSummary> {
    let rendered = if config.pages.is_empty() {
        Err(Error::NoPages)
    } else {
        render_pages(renderer, config)
    };

    let closed = renderer.close();
    let entries = rendered?;
    if let Err(err) = closed {
        warn!("Failed to close the renderer: {err}");
    }

    assemble(config, entries)
}

fn render_pages<R: PageRenderer>(renderer: &mut R, config: &ExportConfig) -> Result<Vec<PdfOutlineEntry>> {
    let options = OutlineOptions {
        enable_warnings: config.enable_warnings,
    };
    let mut entries = Vec::with_capacity(config.pages.len());

    for (index, page) in config.pages.iter().enumerate() {
        info!(
            "Rendering page {}/{}: {}",
            index + 1,
            config.pages.len(),
            page.url
        );
        let forest = render_page(renderer, config, page, &options)?;
        entries.push(PdfOutlineEntry::new(canonical_path(&page.url), forest));
    }

    Ok(entries)
}

fn render_page<R: PageRenderer>(
    renderer: &mut R,
    config: &ExportConfig,
    page: &NormalizedPage,
    options: &OutlineOptions,
) -> Result<OutlineForest> {
    let failed = |err: R::Error| Error::render(page.url.as_str(), err);

    renderer.navigate(&page.url).map_err(failed)?;
    renderer
        .wait_until_idle(config.page_load_timeout)
        .map_err(failed)?;

    let mut forest = OutlineForest::new();
    if config.pdf_outlines {
        let headings = renderer
            .collect_headings(&config.outline_scope, &config.heading_tags)
            .map_err(failed)?;
        let extraction = extract_outline(&config.heading_tags, &headings);
        renderer
            .inject_anchors(&extraction.anchors)
            .map_err(failed)?;
        forest = extraction.forest;
    }

    let mut bytes = renderer.print_pdf().map_err(failed)?;
    if config.pdf_outlines {
        bytes = embed_outline(&bytes, &forest, options)?;
    }

    if let Some(parent) = page.page_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&page.page_path, &bytes)?;
    debug!(
        "Wrote {} ({} bytes, {} outline entries)",
        page.page_path.display(),
        bytes.len(),
        forest.len()
    );

    Ok(forest)
}

fn assemble(config: &ExportConfig, entries: Vec<PdfOutlineEntry>) -> Result<ExportSummary> {
    if let Some(parent) = config.output_file.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    if let [page] = config.pages.as_slice() {
        move_file(&page.page_path, &config.output_file)?;
        info!("Exported 1 page to {}", config.output_file.display());
        return Ok(ExportSummary {
            output_file: config.output_file.clone(),
            pages: 1,
            links: None,
        });
    }

    let mode = if config.pdf_outlines {
        MergeMode::Outlines
    } else {
        MergeMode::Pages
    };
    let paths: Vec<&Path> = config.pages.iter().map(|page| page.page_path.as_path()).collect();
    let mut merged = merge_files(&paths, mode)?;

    let links = config
        .pdf_outlines
        .then(|| rehome_links(&mut merged, &entries));
    if let Some(report) = &links {
        if !report.unresolved.is_empty() {
            info!(
                "{} links did not match an exported page and stay external",
                report.unresolved.len()
            );
        }
    }

    merged.save(&config.output_file)?;

    for page in &config.pages {
        if let Err(err) = fs::remove_file(&page.page_path) {
            warn!("Failed to remove {}: {err}", page.page_path.display());
        }
    }

    info!(
        "Exported {} pages to {}",
        config.pages.len(),
        config.output_file.display()
    );
    Ok(ExportSummary {
        output_file: config.output_file.clone(),
        pages: config.pages.len(),
        links,
    })
}

/// Moves `from` to `to`, copying when a rename across filesystems is refused.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
    }
}
