//! Data structures describing page outlines and the pages of an export.
//!
//! Outlines are held in a flat arena ([`OutlineForest`]) where nodes refer to
//! their children by index.  Nothing points back at a parent, so a forest can
//! cross a serialization boundary as-is.  On the wire a forest is represented
//! as a list of nested [`OutlineItem`] values, which is also the form produced
//! by frontends and accepted in page manifests.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// An RGB color with components in the `0.0..=1.0` range.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rgb {
    /// Red component.
    pub r: f32,
    /// Green component.
    pub g: f32,
    /// Blue component.
    pub b: f32,
}

impl Rgb {
    /// Creates a color, clamping every component into `0.0..=1.0`.
    pub fn new(r: f32, g: f32, b: f32) -> Self {
        Self {
            r: r.clamp(0.0, 1.0),
            g: g.clamp(0.0, 1.0),
            b: b.clamp(0.0, 1.0),
        }
    }

    /// Creates a color from 8-bit channel values.
    pub fn from_u8(r: u8, g: u8, b: u8) -> Self {
        Self::new(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0)
    }
}

/// Visual attributes of an outline entry in a viewer's bookmark panel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OutlineStyle {
    /// Render the entry in italics.
    #[serde(default)]
    pub italic: bool,
    /// Render the entry in bold.
    #[serde(default)]
    pub bold: bool,
    /// Optional text color.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Rgb>,
}

impl OutlineStyle {
    /// Returns the `/F` flags value: bit 0 is italic, bit 1 is bold.
    pub fn flags(&self) -> i64 {
        let mut flags = 0;
        if self.italic {
            flags |= 1;
        }
        if self.bold {
            flags |= 2;
        }
        flags
    }
}

/// A single entry of an outline forest.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OutlineNode {
    /// Decoded heading text.
    pub title: String,
    /// Percent-encoded anchor id, empty when the heading had no id.
    pub destination: String,
    /// Rank of the heading tag in the caller supplied tag list.
    pub depth: usize,
    /// Indices of the child nodes, in document order.
    pub children: Vec<usize>,
    /// Bookmark panel styling.
    pub style: OutlineStyle,
}

impl OutlineNode {
    /// Creates a childless node.
    pub fn new(title: impl Into<String>, destination: impl Into<String>, depth: usize) -> Self {
        Self {
            title: title.into(),
            destination: destination.into(),
            depth,
            ..Self::default()
        }
    }

    /// Sets the styling and returns the updated node.
    pub fn with_style(mut self, style: OutlineStyle) -> Self {
        self.style = style;
        self
    }
}

/// Arena of outline nodes for one page.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<OutlineItem>", into = "Vec<OutlineItem>")]
pub struct OutlineForest {
    nodes: Vec<OutlineNode>,
    roots: Vec<usize>,
}

impl OutlineForest {
    /// Creates an empty forest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the forest holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Total number of nodes across all trees.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Indices of the top-level nodes.
    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    /// Returns the node stored at `index`.
    ///
    /// # Panics
    ///
    /// Panics when `index` was not produced by this forest.
    pub fn node(&self, index: usize) -> &OutlineNode {
        &self.nodes[index]
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> &[OutlineNode] {
        &self.nodes
    }

    /// Child indices of `parent`, or the top-level indices when `parent` is `None`.
    pub fn children_of(&self, parent: Option<usize>) -> &[usize] {
        match parent {
            Some(index) => &self.nodes[index].children,
            None => &self.roots,
        }
    }

    /// Appends `node` as the last top-level node.
    pub fn push_root(&mut self, node: OutlineNode) -> usize {
        let index = self.insert(node);
        self.roots.push(index);
        index
    }

    /// Appends `node` as the last child of `parent`.
    pub fn push_child(&mut self, parent: usize, node: OutlineNode) -> usize {
        let index = self.insert(node);
        self.nodes[parent].children.push(index);
        index
    }

    /// Appends `node` under `parent`, or at the top level when `parent` is `None`.
    pub fn push(&mut self, parent: Option<usize>, node: OutlineNode) -> usize {
        match parent {
            Some(parent) => self.push_child(parent, node),
            None => self.push_root(node),
        }
    }

    fn insert(&mut self, mut node: OutlineNode) -> usize {
        node.children.clear();
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Node indices in pre-order (parent before children, siblings in order).
    pub fn preorder(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<usize> = self.roots.iter().rev().copied().collect();
        while let Some(index) = stack.pop() {
            order.push(index);
            stack.extend(self.nodes[index].children.iter().rev().copied());
        }
        order
    }

    /// Number of transitive descendants of `index`.
    pub fn descendant_count(&self, index: usize) -> usize {
        self.nodes[index]
            .children
            .iter()
            .map(|&child| 1 + self.descendant_count(child))
            .sum()
    }

    /// Builds a forest from nested items.
    pub fn from_items(items: &[OutlineItem]) -> Self {
        fn add(forest: &mut OutlineForest, parent: Option<usize>, item: &OutlineItem) {
            let node = OutlineNode::new(item.title.as_str(), item.destination.as_str(), item.depth)
                .with_style(item.style);
            let index = forest.push(parent, node);
            for child in &item.children {
                add(forest, Some(index), child);
            }
        }

        let mut forest = Self::new();
        for item in items {
            add(&mut forest, None, item);
        }
        forest
    }

    /// Converts the forest into nested items.
    pub fn to_items(&self) -> Vec<OutlineItem> {
        fn item(forest: &OutlineForest, index: usize) -> OutlineItem {
            let node = forest.node(index);
            OutlineItem {
                title: node.title.clone(),
                destination: node.destination.clone(),
                depth: node.depth,
                style: node.style,
                children: node.children.iter().map(|&c| item(forest, c)).collect(),
            }
        }

        self.roots.iter().map(|&root| item(self, root)).collect()
    }
}

impl From<Vec<OutlineItem>> for OutlineForest {
    fn from(items: Vec<OutlineItem>) -> Self {
        Self::from_items(&items)
    }
}

impl From<OutlineForest> for Vec<OutlineItem> {
    fn from(forest: OutlineForest) -> Self {
        forest.to_items()
    }
}

/// Nested, serialization-friendly form of an outline node.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OutlineItem {
    /// Heading text.
    pub title: String,
    /// Percent-encoded anchor id.
    #[serde(default)]
    pub destination: String,
    /// Heading rank.
    #[serde(default)]
    pub depth: usize,
    /// Styling flags and color.
    #[serde(flatten)]
    pub style: OutlineStyle,
    /// Nested entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<OutlineItem>,
}

/// A heading element reported by the rendering collaborator, in document order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadingElement {
    /// Tag name, e.g. `h2`.
    pub tag: String,
    /// Raw `id` attribute.
    #[serde(default)]
    pub id: Option<String>,
    /// Text content of the element.
    #[serde(default)]
    pub text: String,
    /// Styling to carry over onto the outline entry.
    #[serde(flatten)]
    pub style: OutlineStyle,
}

impl HeadingElement {
    /// Creates a heading element with the given tag, id and text.
    pub fn new(tag: impl Into<String>, id: Option<&str>, text: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            id: id.map(str::to_string),
            text: text.into(),
            style: OutlineStyle::default(),
        }
    }
}

/// One page of an export run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPage {
    /// Canonical URL the page is rendered from.
    pub url: String,
    /// Temporary single-page PDF path.
    pub page_path: PathBuf,
    /// Page title.
    #[serde(default)]
    pub title: String,
}

impl NormalizedPage {
    /// Creates a page description.
    pub fn new(url: impl Into<String>, page_path: impl Into<PathBuf>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            page_path: page_path.into(),
            title: title.into(),
        }
    }
}

/// The outline of one rendered page, keyed by the page's canonical location.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PdfOutlineEntry {
    /// Origin and pathname of the page, without query or fragment.
    pub canonical_path: String,
    /// Outline extracted from the page.
    pub forest: OutlineForest,
}

impl PdfOutlineEntry {
    /// Creates an entry.
    pub fn new(canonical_path: impl Into<String>, forest: OutlineForest) -> Self {
        Self {
            canonical_path: canonical_path.into(),
            forest,
        }
    }
}
