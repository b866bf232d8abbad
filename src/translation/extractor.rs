/*!
 * Segment extraction from content documents.
 *
 * Text nodes are grouped by their nearest paragraph-level element so that a
 * sentence broken up by inline markup is translated as one unit. Headings and
 * captions keep their exact text. Loose text inside block containers is joined
 * per container, everything else becomes one segment per node. A handful of
 * user-visible attributes are extracted too.
 *
 * Ordinals follow document order, so two runs over the same bytes always
 * produce the same segments.
 */

use log::debug;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;

use super::filters::{is_caption, SkipFilter};
use super::segment::{Anchor, Segment};
use crate::app_config::ExtractionConfig;
use crate::epub::{Document, NodeId};

/// Elements whose content is never translated
const SKIP_TAGS: &[&str] = &[
    "script", "style", "code", "pre", "head", "math", "svg", "video", "audio", "iframe", "canvas",
    "object", "embed", "noscript",
];

const PARAGRAPH_TAGS: &[&str] = &[
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "li", "figcaption", "th", "td", "blockquote",
];

const HEADING_TAGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6"];

const CONTAINER_TAGS: &[&str] = &["div", "section", "article", "main", "aside", "header", "footer"];

const TRANSLATABLE_ATTRIBUTES: &[&str] = &["alt", "title", "aria-label", "placeholder"];

/// Running totals across every document extracted by one extractor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionTotals {
    pub documents: usize,
    pub segments: usize,
    pub chars: usize,
}

/// Turns a parsed document into an ordered list of segments
#[derive(Debug, Clone)]
pub struct SegmentExtractor {
    filter: SkipFilter,
    index_pattern: String,
    totals: Arc<Mutex<ExtractionTotals>>,
}

impl SegmentExtractor {
    pub fn new(config: &ExtractionConfig) -> Result<Self> {
        Ok(Self::with_filter(SkipFilter::new(config)?, &config.index_item_pattern))
    }

    pub fn with_filter(filter: SkipFilter, index_pattern: &str) -> Self {
        Self {
            filter,
            index_pattern: index_pattern.to_lowercase(),
            totals: Arc::new(Mutex::new(ExtractionTotals::default())),
        }
    }

    /// Index pages are copied through untranslated
    pub fn is_index_item(&self, item_id: &str) -> bool {
        !self.index_pattern.is_empty() && item_id.to_lowercase().contains(&self.index_pattern)
    }

    pub fn totals(&self) -> ExtractionTotals {
        *self.totals.lock()
    }

    pub fn extract(&self, doc: &Document, item_id: &str) -> Vec<Segment> {
        if self.is_index_item(item_id) {
            debug!("Skipping index item {}", item_id);
            return Vec::new();
        }

        let candidates: Vec<NodeId> = doc
            .text_nodes()
            .into_iter()
            .filter(|id| !in_skipped_element(doc, *id))
            .collect();

        let mut found: Vec<(Anchor, String)> = Vec::new();
        let mut claimed: HashSet<NodeId> = HashSet::new();

        for (container, nodes) in group_by(doc, &candidates, |id| nearest(doc, id, PARAGRAPH_TAGS)) {
            claimed.extend(nodes.iter().copied());
            let full_text: String = nodes.iter().filter_map(|n| doc.text(*n)).collect();
            let keep_whole = doc.element_name(container).is_some_and(|n| HEADING_TAGS.contains(&n))
                || is_caption(&full_text);

            if keep_whole {
                let text = full_text.trim();
                if self.filter.should_skip(text) {
                    continue;
                }
                let anchored: Vec<NodeId> = nodes
                    .iter()
                    .copied()
                    .filter(|n| doc.text(*n).is_some_and(|t| !t.trim().is_empty()))
                    .collect();
                found.push((Anchor::Text { nodes: anchored }, text.to_string()));
            } else if let Some(segment) = self.joined(doc, &nodes) {
                found.push(segment);
            }
        }

        let unclaimed: Vec<NodeId> = candidates.iter().copied().filter(|id| !claimed.contains(id)).collect();
        let in_container = |id: NodeId| {
            doc.parent(id)
                .filter(|p| doc.element_name(*p).is_some_and(|n| CONTAINER_TAGS.contains(&n)))
        };
        for (_, nodes) in group_by(doc, &unclaimed, in_container) {
            claimed.extend(nodes.iter().copied());
            if let Some(segment) = self.joined(doc, &nodes) {
                found.push(segment);
            }
        }

        for id in candidates.iter().copied().filter(|id| !claimed.contains(id)) {
            let Some(text) = doc.text(id).map(str::trim) else {
                continue;
            };
            if !self.filter.should_skip(text) {
                found.push((Anchor::Text { nodes: vec![id] }, text.to_string()));
            }
        }

        for element in doc.elements() {
            let skipped = doc.element_name(element).is_some_and(|n| SKIP_TAGS.contains(&n))
                || in_skipped_element(doc, element);
            if skipped {
                continue;
            }
            for name in TRANSLATABLE_ATTRIBUTES {
                let Some(value) = doc.get_attribute(element, name).map(str::trim) else {
                    continue;
                };
                if !self.filter.should_skip(value) {
                    found.push((Anchor::Attribute { element, name: name.to_string() }, value.to_string()));
                }
            }
        }

        found.sort_by_key(|(anchor, _)| anchor.position());
        let segments: Vec<Segment> = found
            .into_iter()
            .enumerate()
            .map(|(ordinal, (anchor, text))| Segment::new(ordinal, anchor, text))
            .collect();

        {
            let mut totals = self.totals.lock();
            totals.documents += 1;
            totals.segments += segments.len();
            totals.chars += segments.iter().map(Segment::char_count).sum::<usize>();
        }
        debug!("Extracted {} segments from {}", segments.len(), item_id);
        segments
    }

    /// Join the non-blank nodes of a group with single spaces.
    ///
    /// Only the joined text is checked against the skip filter: a node holding
    /// a lone "." or "?" still belongs to its paragraph.
    fn joined(&self, doc: &Document, nodes: &[NodeId]) -> Option<(Anchor, String)> {
        let kept: Vec<(NodeId, &str)> = nodes
            .iter()
            .filter_map(|n| doc.text(*n).map(|t| (*n, t)))
            .filter(|(_, t)| !t.trim().is_empty())
            .collect();
        if kept.is_empty() {
            return None;
        }
        let text = kept.iter().map(|(_, t)| t.trim()).collect::<Vec<_>>().join(" ");
        if self.filter.should_skip(&text) {
            return None;
        }
        Some((Anchor::Text { nodes: kept.into_iter().map(|(n, _)| n).collect() }, text))
    }
}

fn in_skipped_element(doc: &Document, id: NodeId) -> bool {
    doc.ancestors(id)
        .any(|a| doc.element_name(a).is_some_and(|n| SKIP_TAGS.contains(&n)))
}

fn nearest(doc: &Document, id: NodeId, names: &[&str]) -> Option<NodeId> {
    doc.ancestors(id)
        .find(|a| doc.element_name(*a).is_some_and(|n| names.contains(&n)))
}

/// Group nodes by a key, keeping groups in order of first appearance
fn group_by<F>(_doc: &Document, nodes: &[NodeId], key: F) -> Vec<(NodeId, Vec<NodeId>)>
where
    F: Fn(NodeId) -> Option<NodeId>,
{
    let mut groups: Vec<(NodeId, Vec<NodeId>)> = Vec::new();
    let mut index: HashMap<NodeId, usize> = HashMap::new();
    for node in nodes {
        let Some(group) = key(*node) else {
            continue;
        };
        match index.get(&group) {
            Some(i) => groups[*i].1.push(*node),
            None => {
                index.insert(group, groups.len());
                groups.push((group, vec![*node]));
            }
        }
    }
    groups
}
