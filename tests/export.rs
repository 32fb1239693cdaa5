mod common;

use std::fs;
use std::time::Duration;

use common::{action_kind, link_actions, FakePage, FakeRenderer};
use lopdf::Document;
use pdf_outline_merge::export::{export_pdf, ExportConfig};
use pdf_outline_merge::links::walk_outline_chain;
use pdf_outline_merge::model::HeadingElement;
use pdf_outline_merge::Error;
use sha2::{Digest, Sha256};

fn fake_page(headings: &[(&str, &str)], links: &[&str]) -> FakePage {
    FakePage {
        headings: headings
            .iter()
            .map(|(tag, id)| HeadingElement::new(*tag, Some(*id), format!("Section {id}")))
            .collect(),
        links: links.iter().map(|link| link.to_string()).collect(),
    }
}

fn site_renderer() -> FakeRenderer {
    FakeRenderer::default()
        .with_page(
            "http://localhost:5173/guide/index.html",
            fake_page(
                &[("h1", "guide"), ("h2", "install"), ("h2", "configure")],
                &["http://localhost:5173/api.html#options"],
            ),
        )
        .with_page(
            "http://localhost:5173/api.html",
            fake_page(
                &[("h1", "api"), ("h2", "options"), ("h3", "timeout")],
                &[
                    "http://localhost:5173/guide/#configure",
                    "http://localhost:5173/changelog.html",
                    "https://github.com/",
                ],
            ),
        )
}

#[test]
fn exports_merged_document_with_outline_and_internal_links() {
    let dir = tempfile::tempdir().expect("temp dir");
    let output = dir.path().join("out").join("site.pdf");
    let config = ExportConfig::new(&output, dir.path().join("pages"))
        .with_page("http://localhost:5173/guide/index.html", "Guide")
        .with_page("http://localhost:5173/api.html", "API")
        .with_warnings(true)
        .with_page_load_timeout(Duration::from_secs(5));
    let mut renderer = site_renderer();

    let summary = export_pdf(&mut renderer, &config).expect("export");

    assert!(renderer.closed);
    assert_eq!(renderer.timeouts, [Duration::from_secs(5); 2]);
    assert_eq!(summary.pages, 2);
    assert_eq!(summary.output_file, output);
    for page in config.pages() {
        assert!(!page.page_path.exists(), "temp page should be removed");
    }

    let report = summary.links.expect("link report");
    assert_eq!(report.rewritten, 2);
    assert_eq!(report.unresolved, ["http://localhost:5173/changelog.html"]);

    let doc = Document::load(&output).expect("load output");
    assert_eq!(doc.get_pages().len(), 2);

    let records = walk_outline_chain(&doc).expect("outline");
    let titles: Vec<_> = records.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(
        titles,
        [
            "Section guide",
            "Section install",
            "Section configure",
            "Section api",
            "Section options",
            "Section timeout",
        ]
    );

    let kinds: Vec<_> = link_actions(&doc).iter().map(action_kind).collect();
    assert_eq!(kinds, ["GoTo", "GoTo", "URI", "URI"]);
}

#[test]
fn single_page_export_moves_the_rendered_file() {
    let dir = tempfile::tempdir().expect("temp dir");
    let output = dir.path().join("single.pdf");
    let config = ExportConfig::new(&output, dir.path().join("pages"))
        .with_page("http://localhost:5173/api.html", "API")
        .with_outlines(false);
    let mut renderer = site_renderer();

    let summary = export_pdf(&mut renderer, &config).expect("export");

    assert!(summary.links.is_none());
    assert!(!config.pages()[0].page_path.exists());
    let written = fs::read(&output).expect("read output");
    assert_eq!(renderer.printed.len(), 1);
    assert_eq!(
        Sha256::digest(&written),
        Sha256::digest(&renderer.printed[0]),
        "single page output must be the rendered file"
    );
}

#[test]
fn single_page_with_outline_keeps_its_bookmarks() {
    let dir = tempfile::tempdir().expect("temp dir");
    let output = dir.path().join("single.pdf");
    let config = ExportConfig::new(&output, dir.path().join("pages"))
        .with_page("http://localhost:5173/guide/index.html", "Guide");
    let mut renderer = site_renderer();

    let summary = export_pdf(&mut renderer, &config).expect("export");
    assert!(summary.links.is_none());

    let doc = Document::load(&output).expect("load output");
    assert_eq!(walk_outline_chain(&doc).expect("outline").len(), 3);
    assert_eq!(action_kind(&link_actions(&doc)[0]), "URI");
}

#[test]
fn render_failure_aborts_and_closes_renderer() {
    let dir = tempfile::tempdir().expect("temp dir");
    let output = dir.path().join("site.pdf");
    let config = ExportConfig::new(&output, dir.path().join("pages"))
        .with_page("http://localhost:5173/guide/index.html", "Guide")
        .with_page("http://localhost:5173/api.html", "API");
    let mut renderer = site_renderer();
    renderer.fail_on = Some("http://localhost:5173/api.html".to_string());

    let result = export_pdf(&mut renderer, &config);

    match result {
        Err(Error::Render { url, message }) => {
            assert_eq!(url, "http://localhost:5173/api.html");
            assert_eq!(message, "navigation timed out");
        }
        other => panic!("expected render error, got {other:?}"),
    }
    assert!(renderer.closed);
    assert!(!output.exists());
}

#[test]
fn unknown_page_is_a_render_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let config = ExportConfig::new(dir.path().join("site.pdf"), dir.path())
        .with_page("http://localhost:5173/missing.html", "Missing");
    let mut renderer = site_renderer();

    let result = export_pdf(&mut renderer, &config);
    assert!(matches!(result, Err(Error::Render { .. })));
    assert!(renderer.closed);
}

#[test]
fn zero_pages_is_fatal() {
    let dir = tempfile::tempdir().expect("temp dir");
    let config = ExportConfig::new(dir.path().join("site.pdf"), dir.path());
    let mut renderer = FakeRenderer::default();

    let result = export_pdf(&mut renderer, &config);
    assert!(matches!(result, Err(Error::NoPages)));
    assert!(renderer.closed);
}
