/*!
 * Units of translatable text and the batches they travel in.
 */

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::epub::{safe_item_id, NodeId};

/// Where a segment's text lives in the parsed document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anchor {
    /// One or more text nodes; the translation goes into the first, the rest are emptied
    Text { nodes: Vec<NodeId> },
    /// An attribute value of an element
    Attribute { element: NodeId, name: String },
}

impl Anchor {
    /// Document position used to order segments
    pub fn position(&self) -> NodeId {
        match self {
            Anchor::Text { nodes } => nodes.first().copied().unwrap_or(NodeId(0)),
            Anchor::Attribute { element, .. } => *element,
        }
    }
}

/// A unit of translatable text.
///
/// Segments longer than the configured maximum are split into parts that
/// share the ordinal and anchor; `joiner` is the exact text that separated a
/// part from the previous one, so the parts always rejoin into the original.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub ordinal: usize,
    #[serde(default)]
    pub part: usize,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub joiner: String,
    pub anchor: Anchor,
    pub text: String,
}

impl Segment {
    pub fn new(ordinal: usize, anchor: Anchor, text: impl Into<String>) -> Self {
        Self { ordinal, part: 0, joiner: String::new(), anchor, text: text.into() }
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// An ordered run of segments sent to the translator together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub item_id: String,
    pub batch_id: usize,
    pub segments: Vec<Segment>,
}

impl Batch {
    /// Key naming the batch's checkpoint files
    pub fn key(&self) -> String {
        batch_key(&self.item_id, self.batch_id)
    }

    pub fn texts(&self) -> Vec<String> {
        self.segments.iter().map(|s| s.text.clone()).collect()
    }

    pub fn char_count(&self) -> usize {
        self.segments.iter().map(Segment::char_count).sum()
    }

    /// Hash of the batch's source texts, used to notice stale checkpoint records
    pub fn source_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for segment in &self.segments {
            hasher.update(segment.text.as_bytes());
            hasher.update([0u8]);
        }
        format!("{:x}", hasher.finalize())
    }
}

pub fn batch_key(item_id: &str, batch_id: usize) -> String {
    format!("{}_{:03}", safe_item_id(item_id), batch_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_key_withNestedId_shouldBeFileSafe() {
        assert_eq!(batch_key("Text/ch1", 7), "Text_ch1_11c26c1f_007");
        assert_ne!(batch_key("Text/ch1", 7), batch_key("Text_ch1", 7));
    }

    #[test]
    fn test_anchor_serde_shouldBeTagged() {
        let anchor = Anchor::Attribute { element: NodeId(4), name: "alt".into() };
        let json = serde_json::to_string(&anchor).unwrap();
        assert_eq!(json, r#"{"kind":"attribute","element":4,"name":"alt"}"#);
        let back: Anchor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, anchor);
    }
}
