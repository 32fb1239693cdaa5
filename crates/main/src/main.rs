use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use log::info;
use lopdf::Document;
use pdf_outline_merge::bookmarks::{apply_outline, OutlineOptions};
use pdf_outline_merge::links::{rehome_links, walk_outline_chain};
use pdf_outline_merge::merge::{merge_documents, MergeMode};
use pdf_outline_merge::model::{OutlineForest, PdfOutlineEntry};
use serde::Deserialize;

/// Merges rendered documentation pages into one navigable PDF.
///
/// Set `RUST_LOG=info` (or `debug`) to see progress and link diagnostics.
#[derive(Parser)]
#[command(author, version, about = "Merge rendered pages into one PDF with bookmarks")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge the pages listed in a JSON manifest into one PDF.
    Merge {
        /// Manifest listing `{ "url", "pdf", "title", "outline" }` entries in page order.
        #[arg(long, short)]
        manifest: PathBuf,

        /// Path of the merged PDF.
        #[arg(long, short)]
        output: PathBuf,

        /// Concatenate pages without bookmarks or link rewriting.
        #[arg(long)]
        no_outlines: bool,

        /// Warn about bookmarks whose destination is not registered in the page.
        #[arg(long)]
        warnings: bool,
    },

    /// Print the bookmark tree of a PDF.
    #[command(aliases = ["toc"])]
    Outline {
        /// PDF file to inspect.
        pdf: PathBuf,
    },
}

/// One rendered page of a merge manifest.
#[derive(Deserialize)]
struct ManifestEntry {
    url: String,
    pdf: PathBuf,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    outline: OutlineForest,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Merge {
            manifest,
            output,
            no_outlines,
            warnings,
        } => run_merge(&manifest, &output, !no_outlines, warnings),
        Commands::Outline { pdf } => run_outline(&pdf),
    };

    if let Err(err) = result {
        eprintln!("Error: {}", err);
        print_error_sources(err.as_ref());
        std::process::exit(1);
    }
}

fn run_merge(
    manifest: &Path,
    output: &Path,
    outlines: bool,
    warnings: bool,
) -> Result<(), Box<dyn Error>> {
    let entries: Vec<ManifestEntry> = serde_json::from_slice(&fs::read(manifest)?)
        .map_err(pdf_outline_merge::Error::from)?;
    let base = manifest.parent().unwrap_or_else(|| Path::new(""));
    let options = OutlineOptions {
        enable_warnings: warnings,
    };

    let mut sources = Vec::with_capacity(entries.len());
    let mut outline_entries = Vec::with_capacity(entries.len());
    for entry in entries {
        info!(
            "Adding {} ({})",
            entry.title.as_deref().unwrap_or(&entry.url),
            entry.pdf.display()
        );
        let mut document = Document::load(base.join(&entry.pdf))?;
        if outlines && !entry.outline.is_empty() {
            apply_outline(&mut document, &entry.outline, &options)?;
        }
        sources.push(document);
        outline_entries.push(PdfOutlineEntry::new(entry.url, entry.outline));
    }

    let mode = if outlines {
        MergeMode::Outlines
    } else {
        MergeMode::Pages
    };
    let mut merged = merge_documents(sources, mode)?;

    if outlines {
        let report = rehome_links(&mut merged, &outline_entries);
        println!("Rewrote {} internal links", report.rewritten);
        if !report.unresolved.is_empty() {
            println!("Links left external:\n{}", report.unresolved.join("\n"));
        }
    }

    merged.save(output)?;
    info!("Saved {}", output.display());
    println!("Merged PDF is available at {}", output.display());
    Ok(())
}

fn run_outline(pdf: &Path) -> Result<(), Box<dyn Error>> {
    let document = Document::load(pdf)?;
    let Some(records) = walk_outline_chain(&document) else {
        println!("No outline found.");
        return Ok(());
    };

    for record in records {
        println!("{}{}", "  ".repeat(record.level), record.title);
    }
    Ok(())
}

fn print_error_sources(mut error: &(dyn Error + 'static)) {
    while let Some(source) = error.source() {
        eprintln!("  caused by: {}", source);
        error = source;
    }
}
