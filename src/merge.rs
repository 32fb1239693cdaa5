//! Combines single-page PDFs into one document.
//!
//! Every source is renumbered into its own id range and its objects are
//! copied into one store under a single page tree.  In [`MergeMode::Outlines`]
//! the outline chains of the sources are kept and linked under one root, and
//! the merged ids of each source's outline items are reported so the link
//! rehomer can find them again without re-deriving the correspondence.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use log::{debug, info};
use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::error::{Error, Result};
use crate::names;

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE_PAGE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// How much structure of the sources is carried into the merged document.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MergeMode {
    /// Copy pages only; source outlines are dropped.
    #[default]
    Pages,
    /// Copy pages and keep every source outline under one root.
    Outlines,
}

/// The merged document together with the outline mapping of its sources.
#[derive(Debug)]
pub struct MergedDocument {
    /// The merged object graph.
    pub document: Document,
    /// For every source, in input order, the merged object ids of its outline
    /// items in pre-order.  Empty lists in [`MergeMode::Pages`].
    pub outline_items: Vec<Vec<ObjectId>>,
}

impl MergedDocument {
    /// Serializes the merged document.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.document.save_to(&mut buffer)?;
        Ok(buffer)
    }

    /// Writes the merged document to `path`.
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.document.save(path.as_ref())?;
        Ok(())
    }
}

/// Loads every file in `paths` and merges them in order.
pub fn merge_files<P: AsRef<Path>>(paths: &[P], mode: MergeMode) -> Result<MergedDocument> {
    let sources = paths
        .iter()
        .map(|path| Document::load(path.as_ref()).map_err(Error::from))
        .collect::<Result<Vec<_>>>()?;
    merge_documents(sources, mode)
}

/// Parses every buffer in `sources` and merges them in order.
pub fn merge_bytes<B: AsRef<[u8]>>(sources: &[B], mode: MergeMode) -> Result<MergedDocument> {
    let sources = sources
        .iter()
        .map(|bytes| Document::load_mem(bytes.as_ref()).map_err(Error::from))
        .collect::<Result<Vec<_>>>()?;
    merge_documents(sources, mode)
}

struct SourceParts {
    catalog_id: ObjectId,
    pages_root_id: Option<ObjectId>,
    outlines_id: Option<ObjectId>,
    outline_items: Vec<ObjectId>,
    pages: Vec<(ObjectId, Dictionary)>,
    objects: BTreeMap<ObjectId, Object>,
}

/// Merges `sources` in order into one document.
pub fn merge_documents(sources: Vec<Document>, mode: MergeMode) -> Result<MergedDocument> {
    if sources.is_empty() {
        return Err(Error::NoPages);
    }

    let version = sources[0].version.clone();
    let mut starting_id = 1;
    let mut parts = Vec::with_capacity(sources.len());

    for (index, mut source) in sources.into_iter().enumerate() {
        if mode == MergeMode::Outlines {
            let localized = localize_destinations(&mut source);
            debug!("Source {index}: localized {localized} named destinations");
        }

        // Object ids are indexes, so every source gets its own range.
        source.renumber_objects_with(starting_id);
        starting_id = source.max_id + 1;

        parts.push(split_source(source)?);
    }

    build_merged(parts, mode, version)
}

fn split_source(source: Document) -> Result<SourceParts> {
    let catalog_id = names::catalog_id(&source)?;
    let pages_root_id = names::catalog(&source)?
        .get(b"Pages")
        .ok()
        .and_then(|pages| pages.as_reference().ok());
    let outlines_id = names::outlines_root_id(&source);
    let outline_items = outlines_id
        .map(|id| names::outline_item_ids(&source, id))
        .unwrap_or_default();

    let pages = source
        .get_pages()
        .into_values()
        .filter_map(|page_id| {
            inherited_page_dictionary(&source, page_id).map(|page| (page_id, page))
        })
        .collect();

    Ok(SourceParts {
        catalog_id,
        pages_root_id,
        outlines_id,
        outline_items,
        pages,
        objects: source.objects,
    })
}

/// Clones a page dictionary, filling in attributes inherited from the page tree.
fn inherited_page_dictionary(document: &Document, page_id: ObjectId) -> Option<Dictionary> {
    let mut page = document.get_dictionary(page_id).ok()?.clone();
    let mut visited = HashSet::from([page_id]);
    let mut parent = names::reference(&page, b"Parent");

    while let Some(parent_id) = parent {
        if !visited.insert(parent_id) {
            break;
        }
        let Ok(node) = document.get_dictionary(parent_id) else {
            break;
        };
        for key in INHERITABLE_PAGE_KEYS {
            if !page.has(key) {
                if let Ok(value) = node.get(key) {
                    page.set(key, value.clone());
                }
            }
        }
        parent = names::reference(node, b"Parent");
    }

    Some(page)
}

fn build_merged(parts: Vec<SourceParts>, mode: MergeMode, version: String) -> Result<MergedDocument> {
    let mut document = Document::with_version(version);

    // Structure objects rebuilt below instead of being copied.
    let mut skipped: HashSet<ObjectId> = HashSet::new();
    for part in &parts {
        skipped.insert(part.catalog_id);
        skipped.extend(part.pages_root_id);
        skipped.extend(part.pages.iter().map(|(id, _)| *id));
        skipped.extend(part.outlines_id);
        if mode == MergeMode::Pages {
            skipped.extend(part.outline_items.iter().copied());
        }
        skipped.extend(
            part.objects
                .iter()
                .filter(|(_, object)| object.type_name().ok() == Some("Pages"))
                .map(|(id, _)| *id),
        );
    }

    let first = &parts[0];
    let catalog_id = first.catalog_id;
    let catalog = first
        .objects
        .get(&catalog_id)
        .ok_or(Error::MissingCatalog)?
        .as_dict()
        .map_err(|_| Error::InvalidCatalog)?
        .clone();
    let pages_root_id = parts
        .iter()
        .find_map(|part| part.pages_root_id)
        .ok_or(Error::PagesRootMissing)?;

    let mut kids = Vec::new();
    let mut outline_roots = Vec::new();
    let mut outline_items = Vec::with_capacity(parts.len());

    for part in parts {
        for (id, object) in part.objects {
            if Some(id) == part.outlines_id {
                if let (MergeMode::Outlines, Object::Dictionary(root)) = (mode, object) {
                    outline_roots.push((root, part.outline_items.len()));
                }
                continue;
            }
            if !skipped.contains(&id) {
                document.objects.insert(id, object);
            }
        }

        for (page_id, mut page) in part.pages {
            page.set("Parent", Object::Reference(pages_root_id));
            document.objects.insert(page_id, Object::Dictionary(page));
            kids.push(Object::Reference(page_id));
        }

        outline_items.push(match mode {
            MergeMode::Outlines => part.outline_items,
            MergeMode::Pages => Vec::new(),
        });
    }

    let page_count = kids.len();
    let mut pages_root = Dictionary::new();
    pages_root.set("Type", Object::Name(b"Pages".to_vec()));
    pages_root.set("Count", Object::Integer(page_count as i64));
    pages_root.set("Kids", Object::Array(kids));
    document
        .objects
        .insert(pages_root_id, Object::Dictionary(pages_root));

    document.max_id = document.objects.keys().map(|(id, _)| *id).max().unwrap_or(0);

    let mut catalog = catalog;
    catalog.set("Pages", Object::Reference(pages_root_id));
    catalog.remove(b"Outlines");

    if mode == MergeMode::Outlines {
        drop_named_destinations(&mut document, &mut catalog);
        if let Some(outlines_id) = link_outline_roots(&mut document, outline_roots) {
            catalog.set("Outlines", Object::Reference(outlines_id));
        }
    }

    document
        .objects
        .insert(catalog_id, Object::Dictionary(catalog));
    document.trailer.set("Root", Object::Reference(catalog_id));

    info!(
        "Merged {} pages ({} outline entries)",
        page_count,
        outline_items.iter().map(Vec::len).sum::<usize>()
    );

    Ok(MergedDocument {
        document,
        outline_items,
    })
}

/// Chains the top-level items of every source outline under a fresh root.
fn link_outline_roots(
    document: &mut Document,
    roots: Vec<(Dictionary, usize)>,
) -> Option<ObjectId> {
    let chains: Vec<(ObjectId, ObjectId, usize)> = roots
        .iter()
        .filter_map(|(root, count)| {
            let first = names::reference(root, b"First")?;
            let last = names::reference(root, b"Last")?;
            Some((first, last, *count))
        })
        .collect();

    if chains.is_empty() {
        return None;
    }

    let outlines_id = document.new_object_id();
    let mut previous_last: Option<ObjectId> = None;
    let mut total = 0;

    for &(first, last, count) in &chains {
        total += count;

        // Re-parent every top-level item of this source.
        let mut visited = HashSet::new();
        let mut next = Some(first);
        while let Some(id) = next {
            if !visited.insert(id) {
                break;
            }
            let Ok(item) = document.get_dictionary_mut(id) else {
                break;
            };
            item.set("Parent", Object::Reference(outlines_id));
            next = names::reference(item, b"Next");
        }

        if let Some(previous) = previous_last {
            if let Ok(item) = document.get_dictionary_mut(previous) {
                item.set("Next", Object::Reference(first));
            }
            if let Ok(item) = document.get_dictionary_mut(first) {
                item.set("Prev", Object::Reference(previous));
            }
        }
        previous_last = Some(last);
    }

    let mut root = Dictionary::new();
    root.set("Type", Object::Name(b"Outlines".to_vec()));
    root.set("First", Object::Reference(chains[0].0));
    if let Some(last) = previous_last {
        root.set("Last", Object::Reference(last));
    }
    root.set("Count", Object::Integer(total as i64));
    document
        .objects
        .insert(outlines_id, Object::Dictionary(root));

    Some(outlines_id)
}

/// Removes catalog-level named destinations, which only described the first source.
fn drop_named_destinations(document: &mut Document, catalog: &mut Dictionary) {
    catalog.remove(b"Dests");

    let mut inline_emptied = false;
    let names_id = match catalog.get_mut(b"Names") {
        Ok(Object::Dictionary(names)) => {
            names.remove(b"Dests");
            inline_emptied = names.iter().next().is_none();
            None
        }
        Ok(Object::Reference(id)) => Some(*id),
        _ => None,
    };

    if inline_emptied {
        catalog.remove(b"Names");
    }
    if let Some(id) = names_id {
        if let Ok(names) = document.get_dictionary_mut(id) {
            names.remove(b"Dests");
        }
    }
}

/// Replaces named destinations of outline items and link annotations with
/// their explicit destination arrays.
///
/// Returns the number of replaced destinations.
pub fn localize_destinations(document: &mut Document) -> usize {
    let named = names::named_destinations(document);
    if named.is_empty() {
        return 0;
    }

    const DEST: &[&[u8]] = &[b"Dest"];
    const ACTION_DEST: &[&[u8]] = &[b"A", b"D"];
    const D: &[&[u8]] = &[b"D"];

    let mut updates: Vec<(ObjectId, &[&[u8]], Object)> = Vec::new();
    let mut resolve = |id: ObjectId, path: &'static [&'static [u8]], value: Option<&Object>| {
        if let Some(target) = value.and_then(names::destination_key).and_then(|key| named.get(key)) {
            updates.push((id, path, target.clone()));
        }
    };

    if let Some(outlines_id) = names::outlines_root_id(document) {
        for id in names::outline_item_ids(document, outlines_id) {
            if let Ok(item) = document.get_dictionary(id) {
                resolve(id, DEST, item.get(b"Dest").ok());
            }
        }
    }

    for page_id in document.get_pages().into_values() {
        for annotation_id in names::annotation_ids(document, page_id) {
            let Ok(annotation) = document.get_dictionary(annotation_id) else {
                continue;
            };
            resolve(annotation_id, DEST, annotation.get(b"Dest").ok());

            match annotation.get(b"A") {
                Ok(Object::Dictionary(action)) if is_goto(action) => {
                    resolve(annotation_id, ACTION_DEST, action.get(b"D").ok());
                }
                Ok(Object::Reference(action_id)) => {
                    if let Ok(action) = document.get_dictionary(*action_id) {
                        if is_goto(action) {
                            resolve(*action_id, D, action.get(b"D").ok());
                        }
                    }
                }
                _ => {}
            }
        }
    }

    let count = updates.len();
    for (id, path, value) in updates {
        set_path(document, id, path, value);
    }
    count
}

fn is_goto(action: &Dictionary) -> bool {
    matches!(action.get(b"S"), Ok(Object::Name(name)) if name == b"GoTo")
}

fn set_path(document: &mut Document, id: ObjectId, path: &[&[u8]], value: Object) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let Ok(mut dictionary) = document.get_dictionary_mut(id) else {
        return;
    };
    for key in parents {
        match dictionary.get_mut(key).and_then(Object::as_dict_mut) {
            Ok(next) => dictionary = next,
            Err(_) => return,
        }
    }
    dictionary.set(*last, value);
}
