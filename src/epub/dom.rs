/*!
 * Lenient markup tree for EPUB content documents.
 *
 * Content documents are XHTML in theory and tag soup in practice, so the tree
 * never rejects input: mismatched and stray end tags are tolerated, HTML void
 * elements never open a scope, and anything the reader cannot tokenize is kept
 * as plain text. Every node remembers the exact bytes it was parsed from, so a
 * document serializes back byte-for-byte until it is mutated; only touched
 * text nodes and start tags are re-rendered.
 *
 * Node ids are arena indices handed out in document order. They are stable for
 * a given input, which is what lets segment anchors survive a restart.
 */

use log::debug;
use quick_xml::escape::{escape, partial_escape, resolve_html5_entity, unescape_with};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Elements that never have content or an end tag in HTML
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Position of a node in the document arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

/// One attribute of a start tag
#[derive(Debug, Clone)]
pub struct Attribute {
    /// Name as written in the source
    pub name: String,
    /// Unescaped value
    pub value: String,
}

/// An element and the bytes needed to reproduce it
#[derive(Debug, Clone)]
pub struct Element {
    /// Lower-cased local name used for matching
    pub name: String,
    raw_name: String,
    start_raw: Vec<u8>,
    end_raw: Option<Vec<u8>>,
    attributes: Vec<Attribute>,
    self_closing: bool,
    dirty: bool,
}

/// A run of character data
#[derive(Debug, Clone)]
pub struct TextNode {
    raw: Vec<u8>,
    text: String,
    replaced: Option<String>,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Document,
    Element(Element),
    Text(TextNode),
    /// Comments, declarations, doctypes, CDATA, stray end tags
    Raw(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// A parsed content document
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Document {
    /// Parse markup into a tree. Never fails.
    pub fn parse(data: &[u8]) -> Self {
        let mut doc = Document {
            nodes: vec![Node { kind: NodeKind::Document, parent: None, children: Vec::new() }],
        };
        let mut stack: Vec<NodeId> = vec![NodeId(0)];

        let source = mask_stray_angles(data);
        let mut reader = Reader::from_reader(&*source);
        {
            let config = reader.config_mut();
            config.trim_text(false);
            config.check_end_names = false;
            config.allow_unmatched_ends = true;
        }

        let mut buf = Vec::new();
        let mut start = 0usize;
        loop {
            buf.clear();
            let event = reader.read_event_into(&mut buf);
            let end = (reader.buffer_position() as usize).min(data.len());
            let current = *stack.last().unwrap_or(&NodeId(0));

            match event {
                Ok(Event::Eof) => {
                    if start < data.len() {
                        doc.push_text(current, &data[start..]);
                    }
                    break;
                }
                Ok(Event::Start(tag) | Event::Empty(tag)) if tag.name().as_ref().is_empty() => {
                    doc.push_text(current, &data[start..end]);
                }
                Ok(Event::Start(tag)) => {
                    let raw = data[start..end].to_vec();
                    let element = element_from_tag(&tag, raw, false);
                    let is_void = VOID_ELEMENTS.contains(&element.name.as_str());
                    let id = doc.push(current, NodeKind::Element(element));
                    if !is_void {
                        stack.push(id);
                    }
                }
                Ok(Event::Empty(tag)) => {
                    let raw = data[start..end].to_vec();
                    let element = element_from_tag(&tag, raw, true);
                    doc.push(current, NodeKind::Element(element));
                }
                Ok(Event::End(tag)) => {
                    let raw = data[start..end].to_vec();
                    let name = local_name(tag.name().as_ref());
                    let open = stack
                        .iter()
                        .rposition(|id| id.0 != 0 && doc.element_name(*id) == Some(name.as_str()));
                    match open {
                        Some(position) => {
                            let id = stack[position];
                            stack.truncate(position);
                            if let NodeKind::Element(element) = &mut doc.nodes[id.0].kind {
                                element.end_raw = Some(raw);
                            }
                        }
                        None => {
                            doc.push(current, NodeKind::Raw(raw));
                        }
                    }
                }
                Ok(Event::Text(_)) => {
                    doc.push_text(current, &data[start..end]);
                }
                Ok(_) => {
                    doc.push(current, NodeKind::Raw(data[start..end].to_vec()));
                }
                Err(e) => {
                    debug!("Markup reader stopped at byte {}: {}; keeping the rest as text", start, e);
                    if start < data.len() {
                        doc.push_text(current, &data[start..]);
                    }
                    break;
                }
            }
            start = end;
        }

        doc
    }

    fn push(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node { kind, parent: Some(parent), children: Vec::new() });
        self.nodes[parent.0].children.push(id);
        id
    }

    fn push_text(&mut self, parent: NodeId, raw: &[u8]) -> NodeId {
        let decoded = String::from_utf8_lossy(raw);
        let text = match unescape_with(&decoded, resolve_html5_entity) {
            Ok(unescaped) => unescaped.into_owned(),
            Err(_) => decoded.to_string(),
        };
        self.push(parent, NodeKind::Text(TextNode { raw: raw.to_vec(), text, replaced: None }))
    }

    /// The synthetic root
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Number of nodes in the arena
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(id.0).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Lower-cased element name, or None for non-elements
    pub fn element_name(&self, id: NodeId) -> Option<&str> {
        match self.nodes.get(id.0).map(|n| &n.kind) {
            Some(NodeKind::Element(element)) => Some(element.name.as_str()),
            _ => None,
        }
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.nodes.get(id.0).map(|n| &n.kind), Some(NodeKind::Text(_)))
    }

    /// Current content of a text node
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.nodes.get(id.0).map(|n| &n.kind) {
            Some(NodeKind::Text(node)) => Some(node.replaced.as_deref().unwrap_or(&node.text)),
            _ => None,
        }
    }

    /// Ancestors from the parent up to (excluding) the synthetic root
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors { doc: self, next: self.parent(id) }
    }

    /// All text node ids in document order
    pub fn text_nodes(&self) -> Vec<NodeId> {
        (0..self.nodes.len())
            .map(NodeId)
            .filter(|id| self.is_text(*id))
            .collect()
    }

    /// All element ids in document order
    pub fn elements(&self) -> Vec<NodeId> {
        (0..self.nodes.len())
            .map(NodeId)
            .filter(|id| self.element_name(*id).is_some())
            .collect()
    }

    /// Text node descendants of `id` in document order
    pub fn descendant_texts(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut pending: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = pending.pop() {
            if self.is_text(next) {
                out.push(next);
            }
            pending.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    /// Concatenated text of all descendants
    pub fn text_content(&self, id: NodeId) -> String {
        self.descendant_texts(id)
            .into_iter()
            .filter_map(|t| self.text(t))
            .collect()
    }

    /// First element with one of the given names, in document order
    pub fn find_first(&self, names: &[&str]) -> Option<NodeId> {
        self.elements()
            .into_iter()
            .find(|id| self.element_name(*id).is_some_and(|n| names.contains(&n)))
    }

    pub fn get_attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        match self.nodes.get(id.0).map(|n| &n.kind) {
            Some(NodeKind::Element(element)) => element
                .attributes
                .iter()
                .find(|a| a.name.eq_ignore_ascii_case(name))
                .map(|a| a.value.as_str()),
            _ => None,
        }
    }

    pub fn attributes(&self, id: NodeId) -> &[Attribute] {
        match self.nodes.get(id.0).map(|n| &n.kind) {
            Some(NodeKind::Element(element)) => &element.attributes,
            _ => &[],
        }
    }

    /// Replace the content of a text node. Returns false if `id` is not a text node.
    pub fn replace_text(&mut self, id: NodeId, value: &str) -> bool {
        match self.nodes.get_mut(id.0).map(|n| &mut n.kind) {
            Some(NodeKind::Text(node)) => {
                node.replaced = Some(value.to_string());
                true
            }
            _ => false,
        }
    }

    /// Overwrite (or add) an attribute. Returns false if `id` is not an element.
    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> bool {
        match self.nodes.get_mut(id.0).map(|n| &mut n.kind) {
            Some(NodeKind::Element(element)) => {
                match element.attributes.iter_mut().find(|a| a.name.eq_ignore_ascii_case(name)) {
                    Some(attribute) => attribute.value = value.to_string(),
                    None => element.attributes.push(Attribute { name: name.to_string(), value: value.to_string() }),
                }
                element.dirty = true;
                true
            }
            _ => false,
        }
    }

    /// Render the tree back to markup
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.nodes.len() * 16);
        self.write_node(self.root(), &mut out);
        out
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.serialize()).into_owned()
    }

    fn write_node(&self, id: NodeId, out: &mut Vec<u8>) {
        let node = &self.nodes[id.0];
        match &node.kind {
            NodeKind::Document => {}
            NodeKind::Element(element) => {
                if element.dirty {
                    out.extend_from_slice(render_start_tag(element).as_bytes());
                } else {
                    out.extend_from_slice(&element.start_raw);
                }
            }
            NodeKind::Text(text) => match &text.replaced {
                Some(value) => out.extend_from_slice(partial_escape(value.as_str()).as_bytes()),
                None => out.extend_from_slice(&text.raw),
            },
            NodeKind::Raw(raw) => out.extend_from_slice(raw),
        }

        for child in &node.children {
            self.write_node(*child, out);
        }

        if let NodeKind::Element(element) = &node.kind {
            if let Some(end) = &element.end_raw {
                out.extend_from_slice(end);
            }
        }
    }

    /// Human-readable text of the document, one trimmed line per text run,
    /// skipping script and style content
    pub fn plain_text(&self) -> String {
        let mut lines = Vec::new();
        for id in self.text_nodes() {
            let hidden = self
                .ancestors(id)
                .any(|a| matches!(self.element_name(a), Some("script") | Some("style")));
            if hidden {
                continue;
            }
            if let Some(text) = self.text(id) {
                lines.extend(text.lines().map(str::trim).filter(|l| !l.is_empty()).map(String::from));
            }
        }
        lines.join("\n")
    }
}

/// Iterator over the element ancestors of a node
pub struct Ancestors<'a> {
    doc: &'a Document,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        if current.0 == 0 {
            self.next = None;
            return None;
        }
        self.next = self.doc.parent(current);
        Some(current)
    }
}

fn local_name(name: &[u8]) -> String {
    let name = String::from_utf8_lossy(name);
    let local = name.rsplit(':').next().unwrap_or(&name);
    local.to_ascii_lowercase()
}

/// Copy of `data` with every `<` that cannot open markup blanked out, so the
/// reader keeps it in the surrounding text. Same length as `data`; node bytes
/// are still taken from the original.
fn mask_stray_angles(data: &[u8]) -> Cow<'_, [u8]> {
    let mut masked: Option<Vec<u8>> = None;
    let mut i = 0;
    while i < data.len() {
        if data[i] != b'<' {
            i += 1;
        } else if opens_markup(data.get(i + 1).copied()) {
            i = markup_end(data, i);
        } else {
            masked.get_or_insert_with(|| data.to_vec())[i] = b' ';
            i += 1;
        }
    }
    masked.map_or(Cow::Borrowed(data), Cow::Owned)
}

fn opens_markup(next: Option<u8>) -> bool {
    match next {
        Some(b) => b.is_ascii_alphabetic() || b >= 0x80 || matches!(b, b'_' | b':' | b'/' | b'!' | b'?'),
        None => false,
    }
}

/// Index just past the tag, comment, CDATA section or instruction at `start`
fn markup_end(data: &[u8], start: usize) -> usize {
    let rest = &data[start..];
    let closing: Option<&[u8]> = if rest.starts_with(b"<!--") {
        Some(b"-->")
    } else if rest.starts_with(b"<![CDATA[") {
        Some(b"]]>")
    } else if rest.starts_with(b"<?") {
        Some(b"?>")
    } else {
        None
    };
    if let Some(closing) = closing {
        return rest
            .windows(closing.len())
            .skip(2)
            .position(|w| w == closing)
            .map_or(data.len(), |p| start + 2 + p + closing.len());
    }

    let mut quote: Option<u8> = None;
    for (offset, &b) in rest.iter().enumerate().skip(1) {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'>' => return start + offset + 1,
            None => {}
        }
    }
    data.len()
}

fn element_from_tag(tag: &BytesStart<'_>, raw: Vec<u8>, self_closing: bool) -> Element {
    let raw_name = String::from_utf8_lossy(tag.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attribute in tag.attributes().with_checks(false) {
        let Ok(attribute) = attribute else {
            break;
        };
        let name = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let decoded = String::from_utf8_lossy(&attribute.value).into_owned();
        let value = match unescape_with(&decoded, resolve_html5_entity) {
            Ok(Cow::Borrowed(_)) => decoded,
            Ok(Cow::Owned(unescaped)) => unescaped,
            Err(_) => decoded,
        };
        attributes.push(Attribute { name, value });
    }

    Element {
        name: local_name(tag.name().as_ref()),
        raw_name,
        start_raw: raw,
        end_raw: None,
        attributes,
        self_closing,
        dirty: false,
    }
}

fn render_start_tag(element: &Element) -> String {
    let mut tag = format!("<{}", element.raw_name);
    for attribute in &element.attributes {
        tag.push(' ');
        tag.push_str(&attribute.name);
        tag.push_str("=\"");
        tag.push_str(&escape(attribute.value.as_str()));
        tag.push('"');
    }
    tag.push_str(if element.self_closing { "/>" } else { ">" });
    tag
}
