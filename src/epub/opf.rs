/*!
 * Container and package document handling.
 *
 * Both files are read through the lenient markup tree so that a slightly
 * broken package still opens, and so that rewriting the metadata only touches
 * the text of the elements being changed.
 */

use serde::{Deserialize, Serialize};

use super::dom::{Document, NodeId};
use crate::errors::EpubError;

pub const CONTAINER_PATH: &str = "META-INF/container.xml";

/// A manifest entry
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestItem {
    pub id: String,
    /// href exactly as written in the manifest
    pub href: String,
    /// Archive path after resolving href against the package directory
    pub path: String,
    pub media_type: String,
    pub properties: Vec<String>,
}

impl ManifestItem {
    pub fn is_document(&self) -> bool {
        matches!(self.media_type.as_str(), "application/xhtml+xml" | "text/html")
    }

    pub fn has_property(&self, property: &str) -> bool {
        self.properties.iter().any(|p| p == property)
    }
}

/// One metadata value with the attributes of its element
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetaValue {
    pub value: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<(String, String)>,
}

/// Dublin Core metadata, each field an ordered list of values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookMetadata {
    pub title: Vec<MetaValue>,
    pub language: Vec<MetaValue>,
    pub creator: Vec<MetaValue>,
    pub publisher: Vec<MetaValue>,
    pub identifier: Vec<MetaValue>,
    pub date: Vec<MetaValue>,
    pub rights: Vec<MetaValue>,
    pub coverage: Vec<MetaValue>,
    pub description: Vec<MetaValue>,
}

impl BookMetadata {
    pub fn first_title(&self) -> Option<&str> {
        self.title.first().map(|v| v.value.as_str())
    }

    pub fn first_description(&self) -> Option<&str> {
        self.description.first().map(|v| v.value.as_str())
    }

    /// Copy with the first title, description and language replaced, the
    /// same way `rewrite_metadata` changes the package document
    pub fn with_update(&self, update: &MetadataUpdate) -> Self {
        let mut updated = self.clone();
        let wanted = [
            ("title", update.title.as_deref()),
            ("description", update.description.as_deref()),
            ("language", update.language.as_deref()),
        ];
        for (name, value) in wanted {
            if let (Some(value), Some(field)) = (value, updated.field_mut(name)) {
                if let Some(first) = field.first_mut() {
                    first.value = value.to_string();
                }
            }
        }
        updated
    }

    fn field_mut(&mut self, name: &str) -> Option<&mut Vec<MetaValue>> {
        match name {
            "title" => Some(&mut self.title),
            "language" => Some(&mut self.language),
            "creator" => Some(&mut self.creator),
            "publisher" => Some(&mut self.publisher),
            "identifier" => Some(&mut self.identifier),
            "date" => Some(&mut self.date),
            "rights" => Some(&mut self.rights),
            "coverage" => Some(&mut self.coverage),
            "description" => Some(&mut self.description),
            _ => None,
        }
    }
}

/// The parsed package document
#[derive(Debug, Clone)]
pub struct PackageDocument {
    pub manifest: Vec<ManifestItem>,
    /// idrefs in reading order
    pub spine: Vec<String>,
    /// `toc` attribute of the spine (EPUB 2 NCX reference)
    pub spine_toc: Option<String>,
    pub metadata: BookMetadata,
}

impl PackageDocument {
    pub fn item(&self, id: &str) -> Option<&ManifestItem> {
        self.manifest.iter().find(|m| m.id == id)
    }
}

/// Replacement values for the package metadata of the translated book
#[derive(Debug, Clone, Default)]
pub struct MetadataUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
}

/// Read the package document path from META-INF/container.xml
pub fn rootfile_path(container: &[u8]) -> Result<String, EpubError> {
    let doc = Document::parse(container);
    doc.elements()
        .into_iter()
        .filter(|id| doc.element_name(*id) == Some("rootfile"))
        .find_map(|id| doc.get_attribute(id, "full-path").map(str::to_string))
        .filter(|p| !p.is_empty())
        .ok_or_else(|| EpubError::MissingContainer("no rootfile full-path".to_string()))
}

/// Resolve an href relative to the directory of `base` into an archive path.
///
/// Fragments are kept, percent-escapes are decoded, `..` segments collapse.
pub fn resolve_href(base: &str, href: &str) -> String {
    let root = url::Url::parse("epub://book/").ok();
    let resolved = root
        .and_then(|r| r.join(base).ok())
        .and_then(|b| b.join(href).ok());
    match resolved {
        Some(url) => {
            let path = percent_decode(url.path().trim_start_matches('/'));
            match url.fragment() {
                Some(fragment) => format!("{}#{}", path, fragment),
                None => path,
            }
        }
        None => href.to_string(),
    }
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            if let Ok(value) = u8::from_str_radix(&input[i + 1..i + 3], 16) {
                out.push(value);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn metadata_root(doc: &Document) -> Option<NodeId> {
    doc.find_first(&["metadata"])
}

/// Parse the package document at `opf_path`
pub fn parse_package(opf_path: &str, data: &[u8]) -> Result<PackageDocument, EpubError> {
    let doc = Document::parse(data);

    let manifest_root = doc.find_first(&["manifest"]).ok_or_else(|| EpubError::MalformedXml {
        path: opf_path.to_string(),
        message: "package document has no manifest".to_string(),
    })?;

    let manifest = doc
        .children(manifest_root)
        .iter()
        .filter(|id| doc.element_name(**id) == Some("item"))
        .filter_map(|id| {
            let item_id = doc.get_attribute(*id, "id")?.to_string();
            let href = doc.get_attribute(*id, "href")?.to_string();
            Some(ManifestItem {
                path: resolve_href(opf_path, &href),
                id: item_id,
                href,
                media_type: doc.get_attribute(*id, "media-type").unwrap_or_default().to_string(),
                properties: doc
                    .get_attribute(*id, "properties")
                    .unwrap_or_default()
                    .split_whitespace()
                    .map(str::to_string)
                    .collect(),
            })
        })
        .collect();

    let spine_root = doc.find_first(&["spine"]);
    let spine = spine_root
        .map(|root| {
            doc.children(root)
                .iter()
                .filter(|id| doc.element_name(**id) == Some("itemref"))
                .filter_map(|id| doc.get_attribute(*id, "idref").map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    let spine_toc = spine_root.and_then(|root| doc.get_attribute(root, "toc").map(str::to_string));

    let mut metadata = BookMetadata::default();
    if let Some(root) = metadata_root(&doc) {
        for child in doc.children(root) {
            let Some(name) = doc.element_name(*child) else {
                continue;
            };
            let name = name.to_string();
            if let Some(field) = metadata.field_mut(&name) {
                let value = doc.text_content(*child).trim().to_string();
                let attributes = doc
                    .attributes(*child)
                    .iter()
                    .map(|a| (a.name.clone(), a.value.clone()))
                    .collect();
                field.push(MetaValue { value, attributes });
            }
        }
    }

    Ok(PackageDocument { manifest, spine, spine_toc, metadata })
}

/// Rewrite title, description and language in the package document.
///
/// Only the first element of each kind is changed; fields absent from the
/// original are not added. All other bytes are left as they were.
pub fn rewrite_metadata(data: &[u8], update: &MetadataUpdate) -> Vec<u8> {
    let mut doc = Document::parse(data);
    let Some(root) = metadata_root(&doc) else {
        return data.to_vec();
    };

    let wanted = [
        ("title", update.title.as_deref()),
        ("description", update.description.as_deref()),
        ("language", update.language.as_deref()),
    ];

    for (name, value) in wanted {
        let Some(value) = value else {
            continue;
        };
        let target = doc
            .children(root)
            .iter()
            .copied()
            .find(|id| doc.element_name(*id) == Some(name));
        if let Some(element) = target {
            let texts = doc.descendant_texts(element);
            if let Some((first, rest)) = texts.split_first() {
                doc.replace_text(*first, value);
                for other in rest {
                    doc.replace_text(*other, "");
                }
            }
        }
    }

    doc.serialize()
}
