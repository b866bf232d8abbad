/*!
 * Table of contents adapter.
 *
 * EPUB 3 navigation documents and EPUB 2 NCX files are both turned into the
 * same tree of `TocEntry` values, so nothing downstream cares which one a
 * book shipped with.
 */

use serde::{Deserialize, Serialize};

use super::dom::{Document, NodeId};
use super::opf::resolve_href;

/// One entry of the table of contents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TocEntry {
    pub title: String,
    /// Archive path of the target, with fragment if any; empty for pure headings
    pub href: String,
    pub children: Vec<TocEntry>,
}

impl TocEntry {
    /// Indented outline, one entry per line
    pub fn render_outline(entries: &[TocEntry]) -> String {
        let mut lines = Vec::new();
        fn walk(entries: &[TocEntry], depth: usize, lines: &mut Vec<String>) {
            for entry in entries {
                lines.push(format!("{}{}", "  ".repeat(depth), entry.title));
                walk(&entry.children, depth + 1, lines);
            }
        }
        walk(entries, 0, &mut lines);
        lines.join("\n")
    }

    /// Total number of entries in the tree
    pub fn count(entries: &[TocEntry]) -> usize {
        entries.iter().map(|e| 1 + Self::count(&e.children)).sum()
    }
}

fn clean(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Build the tree from an EPUB 3 navigation document at `nav_path`
pub fn from_nav(nav_path: &str, data: &[u8]) -> Vec<TocEntry> {
    let doc = Document::parse(data);
    let navs: Vec<NodeId> = doc
        .elements()
        .into_iter()
        .filter(|id| doc.element_name(*id) == Some("nav"))
        .collect();
    let toc_nav = navs
        .iter()
        .copied()
        .find(|id| {
            doc.get_attribute(*id, "epub:type")
                .is_some_and(|t| t.split_whitespace().any(|v| v == "toc"))
        })
        .or_else(|| navs.first().copied());

    let Some(nav) = toc_nav else {
        return Vec::new();
    };
    let Some(list) = doc.children(nav).iter().copied().find(|c| doc.element_name(*c) == Some("ol")) else {
        return Vec::new();
    };
    nav_list(&doc, nav_path, list)
}

fn nav_list(doc: &Document, base: &str, list: NodeId) -> Vec<TocEntry> {
    let mut entries = Vec::new();
    for li in doc.children(list).iter().copied().filter(|c| doc.element_name(*c) == Some("li")) {
        let mut title = String::new();
        let mut href = String::new();
        let mut children = Vec::new();
        for child in doc.children(li).iter().copied() {
            match doc.element_name(child) {
                Some("a") => {
                    title = clean(&doc.text_content(child));
                    href = doc
                        .get_attribute(child, "href")
                        .map(|h| resolve_href(base, h))
                        .unwrap_or_default();
                }
                Some("span") if title.is_empty() => title = clean(&doc.text_content(child)),
                Some("ol") => children = nav_list(doc, base, child),
                _ => {}
            }
        }
        if !title.is_empty() || !children.is_empty() {
            entries.push(TocEntry { title, href, children });
        }
    }
    entries
}

/// Build the tree from an NCX document at `ncx_path`
pub fn from_ncx(ncx_path: &str, data: &[u8]) -> Vec<TocEntry> {
    let doc = Document::parse(data);
    match doc.find_first(&["navmap"]) {
        Some(map) => nav_points(&doc, ncx_path, map),
        None => Vec::new(),
    }
}

fn nav_points(doc: &Document, base: &str, parent: NodeId) -> Vec<TocEntry> {
    doc.children(parent)
        .iter()
        .copied()
        .filter(|c| doc.element_name(*c) == Some("navpoint"))
        .map(|point| {
            let mut title = String::new();
            let mut href = String::new();
            for child in doc.children(point).iter().copied() {
                match doc.element_name(child) {
                    Some("navlabel") => title = clean(&doc.text_content(child)),
                    Some("content") => {
                        href = doc
                            .get_attribute(child, "src")
                            .map(|s| resolve_href(base, s))
                            .unwrap_or_default();
                    }
                    _ => {}
                }
            }
            TocEntry { title, href, children: nav_points(doc, base, point) }
        })
        .collect()
}
