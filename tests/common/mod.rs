#![allow(dead_code)]

use std::collections::HashMap;
use std::time::Duration;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use pdf_outline_merge::model::HeadingElement;
use pdf_outline_merge::render::PageRenderer;

/// Vertical position of the `index`-th named destination on a fixture page.
pub fn anchor_top(index: usize) -> i64 {
    800 - 40 * index as i64
}

/// A single-page PDF with named destinations and URI links, shaped like a
/// browser print of a documentation page.
#[derive(Clone, Debug, Default)]
pub struct PageFixture {
    pub text: String,
    pub anchors: Vec<String>,
    pub links: Vec<String>,
    /// Names targeted by same-page `/Dest` link annotations.
    pub dest_links: Vec<String>,
    /// Names targeted by same-page `GoTo` action link annotations.
    pub goto_links: Vec<String>,
    /// Register anchors in a `/Names /Dests` tree instead of catalog `/Dests`.
    pub name_tree: bool,
}

impl PageFixture {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Self::default()
        }
    }

    pub fn anchor(mut self, id: &str) -> Self {
        self.anchors.push(id.to_string());
        self
    }

    pub fn link(mut self, url: &str) -> Self {
        self.links.push(url.to_string());
        self
    }

    pub fn dest_link(mut self, name: &str) -> Self {
        self.dest_links.push(name.to_string());
        self
    }

    pub fn goto_link(mut self, name: &str) -> Self {
        self.goto_links.push(name.to_string());
        self
    }

    pub fn with_name_tree(mut self) -> Self {
        self.name_tree = true;
        self
    }

    pub fn document(&self) -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(self.text.as_str())]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode content"),
        ));

        let page_id = doc.new_object_id();
        let link_annotation = |key: &str, value: Object| {
            let mut annotation = dictionary! {
                "Type" => "Annot",
                "Subtype" => "Link",
                "Rect" => vec![72.into(), 600.into(), 300.into(), 620.into()],
            };
            annotation.set(key, value);
            annotation
        };
        let mut annotations: Vec<Object> = Vec::new();
        for url in &self.links {
            let action_id = doc.add_object(dictionary! {
                "Type" => "Action",
                "S" => "URI",
                "URI" => Object::string_literal(url.as_str()),
            });
            let annotation = link_annotation("A", action_id.into());
            annotations.push(doc.add_object(annotation).into());
        }
        for name in &self.dest_links {
            let annotation = link_annotation("Dest", Object::Name(name.as_bytes().to_vec()));
            annotations.push(doc.add_object(annotation).into());
        }
        for name in &self.goto_links {
            let action = dictionary! {
                "S" => "GoTo",
                "D" => Object::string_literal(name.as_str()),
            };
            let annotation = link_annotation("A", action.into());
            annotations.push(doc.add_object(annotation).into());
        }

        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        };
        if !annotations.is_empty() {
            page.set("Annots", Object::Array(annotations));
        }
        doc.objects.insert(page_id, Object::Dictionary(page));

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );

        let mut catalog = dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        };
        let destination = |index: usize| {
            Object::Array(vec![
                page_id.into(),
                "XYZ".into(),
                0.into(),
                anchor_top(index).into(),
                0.into(),
            ])
        };
        if self.name_tree && !self.anchors.is_empty() {
            // Two leaves, the second using the dictionary form, plus a kid
            // pointing back at the tree root.
            let split = (self.anchors.len() + 1) / 2;
            let mut leaves = Vec::new();
            for (offset, chunk) in [&self.anchors[..split], &self.anchors[split..]].iter().enumerate() {
                let mut pairs = Vec::new();
                for (position, anchor) in chunk.iter().enumerate() {
                    let index = offset * split + position;
                    pairs.push(Object::string_literal(anchor.as_str()));
                    if offset == 0 {
                        pairs.push(destination(index));
                    } else {
                        pairs.push(Object::Dictionary(dictionary! { "D" => destination(index) }));
                    }
                }
                leaves.push(Object::from(doc.add_object(dictionary! { "Names" => pairs })));
            }
            let root_id = doc.new_object_id();
            leaves.push(root_id.into());
            doc.objects
                .insert(root_id, Object::Dictionary(dictionary! { "Kids" => leaves }));
            catalog.set("Names", dictionary! { "Dests" => root_id });
        } else if !self.anchors.is_empty() {
            let mut dests = Dictionary::new();
            for (index, anchor) in self.anchors.iter().enumerate() {
                dests.set(anchor.as_str(), destination(index));
            }
            let dests_id = doc.add_object(dests);
            catalog.set("Dests", dests_id);
        }
        let catalog_id = doc.add_object(catalog);
        doc.trailer.set("Root", catalog_id);

        doc
    }

    pub fn bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        self.document()
            .save_to(&mut buffer)
            .expect("save fixture page");
        buffer
    }
}

/// Reads a dictionary from the document or panics.
pub fn dict(doc: &Document, id: ObjectId) -> &Dictionary {
    doc.get_dictionary(id).expect("dictionary object")
}

/// Reads `key` of `dictionary` as a reference.
pub fn reference(dictionary: &Dictionary, key: &[u8]) -> Option<ObjectId> {
    dictionary.get(key).ok().and_then(|value| value.as_reference().ok())
}

/// Reads `key` of `dictionary` as an integer.
pub fn integer(dictionary: &Dictionary, key: &[u8]) -> Option<i64> {
    dictionary.get(key).ok().and_then(|value| value.as_i64().ok())
}

/// Returns the action dictionaries of every link annotation on every page, in page order.
pub fn link_actions(doc: &Document) -> Vec<Dictionary> {
    let mut actions = Vec::new();
    for page_id in doc.get_pages().into_values() {
        for annotation_id in pdf_outline_merge::names::annotation_ids(doc, page_id) {
            let annotation = dict(doc, annotation_id);
            let action = match annotation.get(b"A") {
                Ok(Object::Dictionary(action)) => action.clone(),
                Ok(Object::Reference(id)) => dict(doc, *id).clone(),
                _ => continue,
            };
            actions.push(action);
        }
    }
    actions
}

/// Returns the action type name (`URI`, `GoTo`) of an action dictionary.
pub fn action_kind(action: &Dictionary) -> String {
    match action.get(b"S") {
        Ok(Object::Name(name)) => String::from_utf8_lossy(name).into_owned(),
        _ => String::new(),
    }
}

/// A page known to the [`FakeRenderer`].
#[derive(Clone, Debug, Default)]
pub struct FakePage {
    pub headings: Vec<HeadingElement>,
    pub links: Vec<String>,
}

/// Renderer that prints fixture pages; injected anchors become named destinations.
#[derive(Debug, Default)]
pub struct FakeRenderer {
    pub pages: HashMap<String, FakePage>,
    pub fail_on: Option<String>,
    pub closed: bool,
    pub printed: Vec<Vec<u8>>,
    pub timeouts: Vec<Duration>,
    current: Option<String>,
    anchors: Vec<String>,
}

impl FakeRenderer {
    pub fn with_page(mut self, url: &str, page: FakePage) -> Self {
        self.pages.insert(url.to_string(), page);
        self
    }

    fn page(&self) -> Result<&FakePage, String> {
        let url = self.current.as_ref().ok_or("no page loaded")?;
        self.pages
            .get(url)
            .ok_or_else(|| format!("404 for {url}"))
    }
}

impl PageRenderer for FakeRenderer {
    type Error = String;

    fn navigate(&mut self, url: &str) -> Result<(), String> {
        if self.fail_on.as_deref() == Some(url) {
            return Err("navigation timed out".to_string());
        }
        self.current = Some(url.to_string());
        self.anchors.clear();
        Ok(())
    }

    fn wait_until_idle(&mut self, timeout: Duration) -> Result<(), String> {
        self.timeouts.push(timeout);
        Ok(())
    }

    fn collect_headings(&mut self, _scope: &str, _tags: &[String]) -> Result<Vec<HeadingElement>, String> {
        Ok(self.page()?.headings.clone())
    }

    fn inject_anchors(&mut self, ids: &[String]) -> Result<(), String> {
        self.anchors = ids.to_vec();
        Ok(())
    }

    fn print_pdf(&mut self) -> Result<Vec<u8>, String> {
        let page = self.page()?;
        let fixture = PageFixture {
            text: self.current.clone().unwrap_or_default(),
            anchors: self.anchors.clone(),
            links: page.links.clone(),
            ..PageFixture::default()
        };
        let bytes = fixture.bytes();
        self.printed.push(bytes.clone());
        Ok(bytes)
    }

    fn close(&mut self) -> Result<(), String> {
        self.closed = true;
        Ok(())
    }
}
