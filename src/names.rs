//! Named destination lookup and small object graph helpers.
//!
//! Named destinations are read from both places a PDF may register them: the
//! catalog `/Dests` dictionary (PDF 1.1) and the `/Names /Dests` name tree.

use std::collections::{BTreeMap, HashSet};

use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::error::{Error, Result};

/// Returns the object id of the document catalog.
pub fn catalog_id(document: &Document) -> Result<ObjectId> {
    document
        .trailer
        .get(b"Root")
        .ok()
        .and_then(|root| root.as_reference().ok())
        .ok_or(Error::MissingCatalog)
}

/// Returns the document catalog dictionary.
pub fn catalog(document: &Document) -> Result<&Dictionary> {
    let id = catalog_id(document)?;
    document
        .get_object(id)
        .map_err(|_| Error::MissingCatalog)?
        .as_dict()
        .map_err(|_| Error::InvalidCatalog)
}

/// Collects every named destination registered in `document`.
///
/// Values are the explicit destination arrays; dictionary-form entries
/// contribute their `/D` array.
pub fn named_destinations(document: &Document) -> BTreeMap<Vec<u8>, Object> {
    let mut destinations = BTreeMap::new();
    let Ok(catalog) = catalog(document) else {
        return destinations;
    };

    if let Ok(Object::Dictionary(dests)) = catalog.get_deref(b"Dests", document) {
        for (name, value) in dests.iter() {
            if let Some(array) = explicit_destination(document, value) {
                destinations.insert(name.clone(), array);
            }
        }
    }

    if let Ok(Object::Dictionary(names)) = catalog.get_deref(b"Names", document) {
        if let Ok(Object::Dictionary(tree)) = names.get_deref(b"Dests", document) {
            let mut visited = HashSet::new();
            collect_name_tree(document, tree, &mut destinations, &mut visited);
        }
    }

    destinations
}

fn collect_name_tree(
    document: &Document,
    node: &Dictionary,
    destinations: &mut BTreeMap<Vec<u8>, Object>,
    visited: &mut HashSet<ObjectId>,
) {
    if let Ok(Object::Array(pairs)) = node.get_deref(b"Names", document) {
        for pair in pairs.chunks_exact(2) {
            let key = match document.dereference(&pair[0]).map(|(_, key)| key) {
                Ok(Object::String(bytes, _)) => bytes.clone(),
                Ok(Object::Name(bytes)) => bytes.clone(),
                _ => continue,
            };
            if let Some(array) = explicit_destination(document, &pair[1]) {
                destinations.entry(key).or_insert(array);
            }
        }
    }

    if let Ok(Object::Array(kids)) = node.get_deref(b"Kids", document) {
        for kid in kids {
            let Object::Reference(id) = kid else {
                continue;
            };
            if !visited.insert(*id) {
                continue;
            }
            if let Ok(Object::Dictionary(child)) = document.get_object(*id) {
                collect_name_tree(document, child, destinations, visited);
            }
        }
    }
}

/// Resolves a destination value to its explicit array form.
pub fn explicit_destination(document: &Document, value: &Object) -> Option<Object> {
    let (_, value) = document.dereference(value).ok()?;
    match value {
        Object::Array(array) => Some(Object::Array(array.clone())),
        Object::Dictionary(dictionary) => match dictionary.get_deref(b"D", document).ok()? {
            Object::Array(array) => Some(Object::Array(array.clone())),
            _ => None,
        },
        _ => None,
    }
}

/// Key under which a destination name is registered.
pub fn destination_key(name: &Object) -> Option<&[u8]> {
    match name {
        Object::Name(bytes) | Object::String(bytes, _) => Some(bytes.as_slice()),
        _ => None,
    }
}

/// Object ids of the annotations referenced from a page's `/Annots` array.
///
/// Inline annotation dictionaries are not returned.
pub fn annotation_ids(document: &Document, page_id: ObjectId) -> Vec<ObjectId> {
    let Ok(page) = document.get_dictionary(page_id) else {
        return Vec::new();
    };
    match page.get_deref(b"Annots", document) {
        Ok(Object::Array(annotations)) => annotations
            .iter()
            .filter_map(|object| object.as_reference().ok())
            .collect(),
        _ => Vec::new(),
    }
}

/// Returns the id of the `/Outlines` dictionary referenced from the catalog.
pub fn outlines_root_id(document: &Document) -> Option<ObjectId> {
    catalog(document)
        .ok()?
        .get(b"Outlines")
        .ok()?
        .as_reference()
        .ok()
}

/// Ids of all outline items below `outlines_id`, in pre-order.
///
/// Follows `/First` and `/Next`; an item reached twice ends that branch.
pub fn outline_item_ids(document: &Document, outlines_id: ObjectId) -> Vec<ObjectId> {
    fn walk(
        document: &Document,
        first: Option<ObjectId>,
        items: &mut Vec<ObjectId>,
        visited: &mut HashSet<ObjectId>,
    ) {
        let mut next = first;
        while let Some(id) = next {
            if !visited.insert(id) {
                return;
            }
            let Ok(item) = document.get_dictionary(id) else {
                return;
            };
            items.push(id);
            walk(document, reference(item, b"First"), items, visited);
            next = reference(item, b"Next");
        }
    }

    let mut items = Vec::new();
    let mut visited = HashSet::from([outlines_id]);
    if let Ok(root) = document.get_dictionary(outlines_id) {
        walk(document, reference(root, b"First"), &mut items, &mut visited);
    }
    items
}

/// Reads `key` as an indirect reference.
pub fn reference(dictionary: &Dictionary, key: &[u8]) -> Option<ObjectId> {
    dictionary.get(key).ok()?.as_reference().ok()
}
