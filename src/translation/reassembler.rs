/*!
 * Writes translations back into a parsed document.
 *
 * Parts of a split segment are rejoined with their original separators
 * before being placed. For text anchors the first node receives the
 * translation after its own leading whitespace, the last node keeps only its
 * trailing whitespace and nodes in between are emptied. Anchors that no
 * longer resolve are logged and skipped.
 */

use log::warn;
use std::collections::BTreeMap;

use super::segment::{Anchor, Segment};
use crate::epub::Document;

/// What happened while applying translations to one document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReassemblyReport {
    pub applied: usize,
    pub skipped: usize,
}

/// A segment part paired with its translation
#[derive(Debug, Clone)]
pub struct TranslatedPart<'a> {
    pub segment: &'a Segment,
    pub translation: &'a str,
}

/// Apply translated parts to `doc` in place
pub fn apply_translations(doc: &mut Document, parts: &[TranslatedPart<'_>]) -> ReassemblyReport {
    let mut by_ordinal: BTreeMap<usize, Vec<&TranslatedPart<'_>>> = BTreeMap::new();
    for part in parts {
        by_ordinal.entry(part.segment.ordinal).or_default().push(part);
    }

    let mut report = ReassemblyReport::default();
    for (ordinal, mut pieces) in by_ordinal {
        pieces.sort_by_key(|p| p.segment.part);
        let mut translation = String::new();
        for (index, piece) in pieces.iter().enumerate() {
            if index > 0 {
                translation.push_str(&piece.segment.joiner);
            }
            translation.push_str(piece.translation);
        }

        let anchor = &pieces[0].segment.anchor;
        if place(doc, anchor, &translation) {
            report.applied += 1;
        } else {
            warn!("Segment {} no longer matches the document ({:?}); left untranslated", ordinal, anchor);
            report.skipped += 1;
        }
    }
    report
}

fn place(doc: &mut Document, anchor: &Anchor, translation: &str) -> bool {
    match anchor {
        Anchor::Attribute { element, name } => {
            doc.get_attribute(*element, name).is_some() && doc.set_attribute(*element, name, translation)
        }
        Anchor::Text { nodes } => {
            let Some((first, rest)) = nodes.split_first() else {
                return false;
            };
            if !nodes.iter().all(|n| doc.is_text(*n)) {
                return false;
            }
            let leading = doc.text(*first).map(leading_whitespace).unwrap_or_default();
            let last = rest.last().unwrap_or(first);
            let trailing = doc.text(*last).map(trailing_whitespace).unwrap_or_default();

            match rest.split_last() {
                None => {
                    doc.replace_text(*first, &format!("{}{}{}", leading, translation, trailing));
                }
                Some((last, middle)) => {
                    doc.replace_text(*first, &format!("{}{}", leading, translation));
                    for node in middle {
                        doc.replace_text(*node, "");
                    }
                    doc.replace_text(*last, &trailing);
                }
            }
            true
        }
    }
}

fn leading_whitespace(text: &str) -> String {
    text[..text.len() - text.trim_start().len()].to_string()
}

fn trailing_whitespace(text: &str) -> String {
    text[text.trim_end().len()..].to_string()
}
