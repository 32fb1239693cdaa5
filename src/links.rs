//! Rewrites links to rendered pages into jumps within the merged document.
//!
//! Pages rendered from a preview server link to each other with absolute
//! `http(s)` URLs.  After merging, every such link whose target page is part
//! of the document is turned into a `GoTo` action pointing at the outline
//! destination of the linked heading (or of the page's first heading).

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use log::{debug, warn};
use lopdf::{Dictionary, Document, Object, ObjectId};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use regex::bytes::{Captures, Regex};

use crate::merge::MergedDocument;
use crate::model::{OutlineForest, PdfOutlineEntry};
use crate::names;
use crate::text::decode_text_string;

/// Summary of a rehoming pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RehomeReport {
    /// Number of annotations rewritten into in-document jumps.
    pub rewritten: usize,
    /// Decoded URLs under the origin of a rendered page that matched no
    /// rendered page.  Links to other sites are not listed.
    pub unresolved: Vec<String>,
    /// `true` when the merged document had no usable outline and nothing was done.
    pub skipped: bool,
}

/// One entry of a walked outline chain.
#[derive(Clone, Debug)]
pub struct OutlineRecord {
    /// Object id of the outline item.
    pub id: ObjectId,
    /// Nesting level, 0 for top-level items.
    pub level: usize,
    /// Decoded title.
    pub title: String,
    /// Destination array or name, when present.
    pub dest: Option<Object>,
}

/// Walks the `/Outlines` chain of `document` in pre-order.
///
/// Returns `None` when the catalog has no outline root or the root has no
/// first item.
pub fn walk_outline_chain(document: &Document) -> Option<Vec<OutlineRecord>> {
    fn walk(
        document: &Document,
        first: Option<ObjectId>,
        level: usize,
        records: &mut Vec<OutlineRecord>,
        seen: &mut HashSet<ObjectId>,
    ) {
        let mut next = first;
        while let Some(id) = next {
            if !seen.insert(id) {
                return;
            }
            let Ok(item) = document.get_dictionary(id) else {
                return;
            };
            let title = match item.get_deref(b"Title", document) {
                Ok(Object::String(bytes, _)) => decode_text_string(bytes),
                _ => String::new(),
            };
            records.push(OutlineRecord {
                id,
                level,
                title,
                dest: item.get_deref(b"Dest", document).ok().cloned(),
            });
            walk(document, names::reference(item, b"First"), level + 1, records, seen);
            next = names::reference(item, b"Next");
        }
    }

    let outlines_id = names::outlines_root_id(document)?;
    let root = document.get_dictionary(outlines_id).ok()?;
    let first = names::reference(root, b"First")?;

    let mut records = Vec::new();
    let mut seen = HashSet::from([outlines_id]);
    walk(document, Some(first), 0, &mut records, &mut seen);
    Some(records)
}

static OCTAL_ESCAPE: OnceLock<Regex> = OnceLock::new();

/// Bytes a browser percent-encodes in a URL fragment.
const FRAGMENT: &AsciiSet = &CONTROLS.add(b' ').add(b'"').add(b'<').add(b'>').add(b'`');

/// Bytes a browser percent-encodes in a URL path.
const PATH: &AsciiSet = &FRAGMENT.add(b'#').add(b'?').add(b'{').add(b'}');

/// Replaces backslash-octal escapes (`\57`, `\303\251`) with the bytes they
/// encode and reads the result as UTF-8.
pub fn decode_octal_escapes(raw: &[u8]) -> String {
    let pattern = OCTAL_ESCAPE.get_or_init(|| Regex::new(r"\\([0-7]{2,3})").expect("valid regex"));
    let decoded = pattern.replace_all(raw, |captures: &Captures| {
        std::str::from_utf8(&captures[1])
            .ok()
            .and_then(|digits| u8::from_str_radix(digits, 8).ok())
            .map_or_else(|| captures[0].to_vec(), |byte| vec![byte])
    });
    String::from_utf8_lossy(&decoded).into_owned()
}

/// Splits an `http(s)` URL into origin plus pathname and its fragment.
///
/// Query strings are dropped, scheme and host are lowercased and default
/// ports removed.  The path has its dot segments resolved, and both path and
/// fragment are percent-encoded the way a browser serializes them; existing
/// `%XX` escapes are kept.  Returns `None` for any other scheme.
pub fn split_url(url: &str) -> Option<(String, Option<String>)> {
    let (scheme, rest) = url.trim().split_once("://")?;
    let scheme = scheme.to_ascii_lowercase();
    let default_port = match scheme.as_str() {
        "http" => ":80",
        "https" => ":443",
        _ => return None,
    };

    let (rest, hash) = match rest.split_once('#') {
        Some((rest, hash)) if !hash.is_empty() => {
            (rest, Some(utf8_percent_encode(hash, FRAGMENT).to_string()))
        }
        Some((rest, _)) => (rest, None),
        None => (rest, None),
    };
    let rest = rest.split_once('?').map_or(rest, |(rest, _)| rest);

    let (authority, path) = match rest.find('/') {
        Some(index) => rest.split_at(index),
        None => (rest, "/"),
    };
    let authority = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    if authority.is_empty() {
        return None;
    }
    let mut host = authority.to_ascii_lowercase();
    if host.ends_with(default_port) {
        host.truncate(host.len() - default_port.len());
    }

    let path = normalize_path(path);
    Some((format!("{scheme}://{host}{path}"), hash))
}

/// Resolves `.` and `..` segments of an absolute path and percent-encodes it.
fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').skip(1).collect();
    let last = segments.len().saturating_sub(1);
    let mut kept: Vec<&str> = Vec::with_capacity(segments.len());

    for (position, segment) in segments.iter().enumerate() {
        match *segment {
            "." | ".." => {
                if *segment == ".." {
                    kept.pop();
                }
                if position == last {
                    kept.push("");
                }
            }
            other => kept.push(other),
        }
    }

    let resolved = format!("/{}", kept.join("/"));
    utf8_percent_encode(&resolved, PATH).to_string()
}

/// Origin (`scheme://host`) of a canonical page path.
fn origin_of(link: &str) -> &str {
    let after_scheme = link.find("://").map_or(0, |index| index + 3);
    match link[after_scheme..].find('/') {
        Some(index) => &link[..after_scheme + index],
        None => link,
    }
}

/// Compares an outline destination with a link fragment, ignoring how each
/// side escaped its characters.
fn same_fragment(destination: &str, hash: &str) -> bool {
    destination == hash || Iterator::eq(percent_decode_str(destination), percent_decode_str(hash))
}

/// Canonical lookup key of a page URL: origin plus pathname.
pub fn canonical_path(url: &str) -> String {
    split_url(url).map_or_else(|| url.to_string(), |(link, _)| link)
}

/// A node of one page's forest, addressed by page and node index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct NodeKey {
    page: usize,
    node: usize,
}

struct LinkIndex<'a> {
    entries: &'a [PdfOutlineEntry],
    /// Canonical page path to the page's nodes in pre-order.
    candidates: HashMap<String, Vec<NodeKey>>,
    /// Merged destination array of every node that has one.
    positions: HashMap<NodeKey, Object>,
    /// Origins of the rendered pages.
    origins: HashSet<String>,
}

impl<'a> LinkIndex<'a> {
    fn build(merged: &MergedDocument, entries: &'a [PdfOutlineEntry]) -> Self {
        let mut candidates: HashMap<String, Vec<NodeKey>> = HashMap::new();
        let mut positions = HashMap::new();
        let mut origins = HashSet::new();

        for (page, entry) in entries.iter().enumerate() {
            let order = entry.forest.preorder();
            let keys: Vec<NodeKey> = order.iter().map(|&node| NodeKey { page, node }).collect();

            let items = merged.outline_items.get(page).map(Vec::as_slice).unwrap_or(&[]);
            if items.len() == order.len() {
                for (key, item) in keys.iter().zip(items) {
                    if let Some(dest) = merged_destination(&merged.document, *item) {
                        positions.insert(*key, dest);
                    }
                }
            } else {
                warn!(
                    "Outline of {} has {} entries but the merged document holds {}; its links stay external",
                    entry.canonical_path,
                    order.len(),
                    items.len()
                );
            }

            let path = canonical_path(&entry.canonical_path);
            origins.insert(origin_of(&path).to_string());
            candidates.entry(path).or_default().extend(keys);
        }

        Self {
            entries,
            candidates,
            positions,
            origins,
        }
    }

    fn is_site_link(&self, link: &str) -> bool {
        self.origins.contains(origin_of(link))
    }

    fn forest(&self, key: NodeKey) -> &OutlineForest {
        &self.entries[key.page].forest
    }

    fn lookup(&self, link: &str) -> Option<&[NodeKey]> {
        if let Some(found) = self.candidates.get(link) {
            return Some(found.as_slice());
        }
        if link.ends_with('/') {
            return self
                .candidates
                .get(&format!("{link}index.html"))
                .map(Vec::as_slice);
        }
        None
    }

    /// Picks the node a link should jump to.
    fn resolve(&self, link: &str, hash: Option<&str>) -> Option<&Object> {
        let candidates = self.lookup(link)?;
        let mut chosen = *candidates.first()?;

        if let Some(hash) = hash {
            let exact = candidates.iter().find_map(|&key| {
                let forest = self.forest(key);
                let node = forest.node(key.node);
                if same_fragment(&node.destination, hash) {
                    return Some(key);
                }
                node.children
                    .iter()
                    .find(|&&child| same_fragment(&forest.node(child).destination, hash))
                    .map(|&child| NodeKey {
                        page: key.page,
                        node: child,
                    })
            });
            if let Some(exact) = exact {
                chosen = exact;
            }
        }

        // A heading without an anchor has no position; use the page's first one that does.
        self.positions
            .get(&chosen)
            .or_else(|| candidates.iter().find_map(|key| self.positions.get(key)))
    }
}

fn merged_destination(document: &Document, item_id: ObjectId) -> Option<Object> {
    let item = document.get_dictionary(item_id).ok()?;
    match item.get_deref(b"Dest", document).ok()? {
        array @ Object::Array(_) => Some(array.clone()),
        _ => None,
    }
}

/// Rewrites every resolvable internal link annotation of `merged`.
///
/// `entries` must list the outline of every merged source in merge order.
/// Links that do not resolve are left untouched; a merged document without a
/// usable outline is returned unchanged.
pub fn rehome_links(merged: &mut MergedDocument, entries: &[PdfOutlineEntry]) -> RehomeReport {
    let mut report = RehomeReport::default();

    if walk_outline_chain(&merged.document).is_none() {
        warn!("Merged document has no usable outline; internal links are left as URLs");
        report.skipped = true;
        return report;
    }

    let index = LinkIndex::build(merged, entries);
    let document = &merged.document;
    let mut rewrites: Vec<(ObjectId, Object)> = Vec::new();

    for page_id in document.get_pages().into_values() {
        for annotation_id in names::annotation_ids(document, page_id) {
            let Ok(annotation) = document.get_dictionary(annotation_id) else {
                continue;
            };
            let Some(raw) = uri_of(document, annotation) else {
                continue;
            };
            let uri = decode_octal_escapes(raw);
            let Some((link, hash)) = split_url(&uri) else {
                continue;
            };

            match index.resolve(&link, hash.as_deref()) {
                Some(dest) => rewrites.push((annotation_id, dest.clone())),
                None if index.is_site_link(&link) => {
                    debug!("No rendered page for {uri}; leaving it external");
                    report.unresolved.push(uri);
                }
                None => debug!("Leaving link to {uri} external"),
            }
        }
    }

    for (annotation_id, dest) in rewrites {
        if let Ok(annotation) = merged.document.get_dictionary_mut(annotation_id) {
            let mut action = Dictionary::new();
            action.set("S", Object::Name(b"GoTo".to_vec()));
            action.set("D", dest);
            annotation.set("A", Object::Dictionary(action));
            report.rewritten += 1;
        }
    }

    debug!(
        "Rehomed {} links, {} left external",
        report.rewritten,
        report.unresolved.len()
    );
    report
}

/// Returns the raw URI bytes of a link annotation's URI action.
fn uri_of<'a>(document: &'a Document, annotation: &'a Dictionary) -> Option<&'a [u8]> {
    let Object::Dictionary(action) = annotation.get_deref(b"A", document).ok()? else {
        return None;
    };
    match action.get(b"S") {
        Ok(Object::Name(name)) if name == b"URI" => {}
        _ => return None,
    }
    match action.get_deref(b"URI", document).ok()? {
        Object::String(bytes, _) => Some(bytes.as_slice()),
        _ => None,
    }
}
