//! Bookmark management utilities built on top of `lopdf`.
//!
//! An [`OutlineForest`] is written into a document as the `/Outlines`
//! dictionary chain in two passes: the first allocates one object id per node
//! (pre-order, so parents are numbered before their children), the second
//! emits the dictionaries once every sibling and child id is known.

use std::collections::BTreeMap;

use log::{debug, warn};
use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::error::{Error, Result};
use crate::model::OutlineForest;
use crate::names;
use crate::text::hex_text_string;

/// Options controlling outline embedding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OutlineOptions {
    /// Check destinations against the document's named destinations and log
    /// the ones that are missing.
    pub enable_warnings: bool,
}

/// An outline node together with its allocated object ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutlineRef {
    /// Index of the node in its forest.
    pub node: usize,
    /// Object id of the node's outline item dictionary.
    pub object_id: ObjectId,
    /// Object id of the parent item, or of the outline root for top-level nodes.
    pub parent_id: ObjectId,
}

/// Embeds `forest` as the outline of the PDF in `pdf_bytes`.
///
/// Returns the input unchanged when the forest is empty.
pub fn embed_outline(
    pdf_bytes: &[u8],
    forest: &OutlineForest,
    options: &OutlineOptions,
) -> Result<Vec<u8>> {
    if forest.is_empty() {
        return Ok(pdf_bytes.to_vec());
    }

    let mut document = Document::load_mem(pdf_bytes)?;
    apply_outline(&mut document, forest, options)?;

    let mut buffer = Vec::new();
    document.save_to(&mut buffer)?;
    Ok(buffer)
}

/// Writes the `/Outlines` chain for `forest` into `document`.
///
/// Returns the id of the outline root, or `None` for an empty forest in which
/// case the catalog is left untouched.
pub fn apply_outline(
    document: &mut Document,
    forest: &OutlineForest,
    options: &OutlineOptions,
) -> Result<Option<ObjectId>> {
    if forest.is_empty() {
        return Ok(None);
    }

    if options.enable_warnings {
        warn_missing_destinations(document, forest);
    }

    let catalog_id = names::catalog_id(document)?;
    let outlines_id = document.new_object_id();
    let refs = assign_references(document, forest, outlines_id);

    link_outline_items(document, forest, &refs, None, None);
    insert_outlines_root(document, forest, &refs, outlines_id, catalog_id)?;

    debug!(
        "Embedded outline with {} entries as {:?}",
        forest.len(),
        outlines_id
    );
    Ok(Some(outlines_id))
}

/// Allocates one object id per node in pre-order.
///
/// The returned vector is indexed by node index.
pub fn assign_references(
    document: &mut Document,
    forest: &OutlineForest,
    outlines_id: ObjectId,
) -> Vec<OutlineRef> {
    fn assign(
        document: &mut Document,
        forest: &OutlineForest,
        node: usize,
        parent_id: ObjectId,
        refs: &mut [Option<OutlineRef>],
    ) {
        let object_id = document.new_object_id();
        refs[node] = Some(OutlineRef {
            node,
            object_id,
            parent_id,
        });
        for &child in &forest.node(node).children {
            assign(document, forest, child, object_id, refs);
        }
    }

    let mut refs = vec![None; forest.len()];
    for &root in forest.roots() {
        assign(document, forest, root, outlines_id, &mut refs);
    }
    refs.into_iter().flatten().collect()
}

fn link_outline_items(
    document: &mut Document,
    forest: &OutlineForest,
    refs: &[OutlineRef],
    parent: Option<usize>,
    parent_destination: Option<&str>,
) {
    let siblings = forest.children_of(parent);

    for (position, &index) in siblings.iter().enumerate() {
        let node = forest.node(index);
        let entry = refs[index];

        // Entries without an anchor jump to the nearest ancestor that has one.
        let destination = if node.destination.is_empty() {
            parent_destination.map(str::to_string)
        } else {
            Some(node.destination.clone())
        };

        let mut dictionary = Dictionary::new();
        dictionary.set(
            "Title",
            hex_text_string(&html_escape::decode_html_entities(&node.title)),
        );
        if let Some(destination) = &destination {
            dictionary.set("Dest", Object::Name(destination.as_bytes().to_vec()));
        }
        dictionary.set("Parent", Object::Reference(entry.parent_id));
        dictionary.set("F", Object::Integer(node.style.flags()));

        if let Some(color) = node.style.color {
            dictionary.set(
                "C",
                Object::Array(vec![
                    Object::Real(color.r.into()),
                    Object::Real(color.g.into()),
                    Object::Real(color.b.into()),
                ]),
            );
        }

        if position > 0 {
            dictionary.set("Prev", Object::Reference(refs[siblings[position - 1]].object_id));
        }

        if position + 1 < siblings.len() {
            dictionary.set("Next", Object::Reference(refs[siblings[position + 1]].object_id));
        }

        if let (Some(&first), Some(&last)) = (node.children.first(), node.children.last()) {
            dictionary.set("First", Object::Reference(refs[first].object_id));
            dictionary.set("Last", Object::Reference(refs[last].object_id));
            dictionary.set(
                "Count",
                Object::Integer(forest.descendant_count(index) as i64),
            );
        }

        document
            .objects
            .insert(entry.object_id, Object::Dictionary(dictionary));

        link_outline_items(document, forest, refs, Some(index), destination.as_deref());
    }
}

fn insert_outlines_root(
    document: &mut Document,
    forest: &OutlineForest,
    refs: &[OutlineRef],
    outlines_id: ObjectId,
    catalog_id: ObjectId,
) -> Result<()> {
    let mut dictionary = Dictionary::new();
    dictionary.set("Type", Object::Name(b"Outlines".to_vec()));
    if let Some(&first) = forest.roots().first() {
        dictionary.set("First", Object::Reference(refs[first].object_id));
    }
    if let Some(&last) = forest.roots().last() {
        dictionary.set("Last", Object::Reference(refs[last].object_id));
    }
    dictionary.set("Count", Object::Integer(forest.len() as i64));

    document
        .objects
        .insert(outlines_id, Object::Dictionary(dictionary));

    let catalog = document
        .objects
        .get_mut(&catalog_id)
        .ok_or(Error::MissingCatalog)?
        .as_dict_mut()
        .map_err(|_| Error::InvalidCatalog)?;
    catalog.set("Outlines", Object::Reference(outlines_id));

    Ok(())
}

/// Logs every node whose destination is not a registered named destination.
///
/// Returns the number of missing destinations.
pub fn warn_missing_destinations(document: &Document, forest: &OutlineForest) -> usize {
    let registered: BTreeMap<Vec<u8>, Object> = names::named_destinations(document);
    let mut missing = 0;

    for index in forest.preorder() {
        let node = forest.node(index);
        if node.destination.is_empty() {
            warn!("Outline entry \"{}\" has no destination id", node.title);
            missing += 1;
        } else if !registered.contains_key(node.destination.as_bytes()) {
            warn!(
                "Outline entry \"{}\" points at unknown destination \"{}\"",
                node.title, node.destination
            );
            missing += 1;
        }
    }

    missing
}
