//! Builds an outline forest from the flat heading sequence of a rendered page.

use indexmap::IndexSet;
use log::debug;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::model::{HeadingElement, OutlineForest, OutlineNode};

/// Characters escaped by a browser's `encodeURIComponent`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Result of running the extractor over one page.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Extraction {
    /// The outline forest.
    pub forest: OutlineForest,
    /// Destination ids that need a hidden same-document anchor on the page,
    /// in first-seen order without duplicates.
    pub anchors: Vec<String>,
}

/// Percent-encodes an element id the way browsers encode URI components.
pub fn encode_destination(id: &str) -> String {
    utf8_percent_encode(id, URI_COMPONENT).to_string()
}

/// Nests `headings` into a forest using their rank in `tags`.
///
/// `tags` lists heading tag names shallowest first.  Ranks that are skipped
/// (an `h3` straight under an `h1`) do not produce placeholder entries, and a
/// heading that is shallower than the current one climbs back up to the
/// nearest ancestor it fits under.
pub fn extract_outline<S: AsRef<str>>(tags: &[S], headings: &[HeadingElement]) -> Extraction {
    let mut forest = OutlineForest::new();
    // Parent links only live for the duration of the walk.
    let mut parents: Vec<Option<usize>> = Vec::with_capacity(headings.len());
    let mut anchors = IndexSet::new();
    let mut current: Option<usize> = None;

    for heading in headings {
        let Some(rank) = rank_of(tags, &heading.tag) else {
            debug!("Skipping <{}> outside of the outline tag list", heading.tag);
            continue;
        };

        let destination = heading
            .id
            .as_deref()
            .map(encode_destination)
            .unwrap_or_default();
        if !destination.is_empty() {
            anchors.insert(destination.clone());
        }

        let node = OutlineNode::new(heading.text.trim(), destination, rank).with_style(heading.style);

        let parent = loop {
            match current {
                None => break None,
                Some(index) => {
                    let depth = forest.node(index).depth;
                    if rank < depth {
                        current = parents[index];
                    } else if rank == depth {
                        break parents[index];
                    } else {
                        break Some(index);
                    }
                }
            }
        };

        let index = forest.push(parent, node);
        parents.push(parent);
        current = Some(index);
    }

    Extraction {
        forest,
        anchors: anchors.into_iter().collect(),
    }
}

fn rank_of<S: AsRef<str>>(tags: &[S], tag: &str) -> Option<usize> {
    tags.iter()
        .position(|candidate| candidate.as_ref().eq_ignore_ascii_case(tag))
}
