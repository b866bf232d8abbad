/*!
 * EPUB container access.
 *
 * - `package`: zip entries in and out
 * - `opf`: container.xml, the package document and its metadata
 * - `toc`: navigation document / NCX to `TocEntry`
 * - `dom`: the lenient markup tree used for content documents
 */

use log::{debug, warn};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;

use crate::errors::EpubError;

pub mod dom;
pub mod opf;
pub mod package;
pub mod toc;

pub use self::dom::{Document, NodeId};
pub use self::opf::{BookMetadata, MetaValue, MetadataUpdate};
pub use self::toc::TocEntry;

use self::opf::PackageDocument;
use self::package::EpubPackage;

/// One content document of the book
#[derive(Debug, Clone)]
pub struct DocumentItem {
    /// Manifest id
    pub id: String,
    /// Archive path
    pub name: String,
    pub media_type: String,
    pub content: Vec<u8>,
}

impl DocumentItem {
    /// Id usable as a file name component
    pub fn safe_id(&self) -> String {
        safe_item_id(&self.id)
    }
}

/// Item id usable as a file name.
///
/// Ids without path separators are returned as they are. Otherwise the
/// separators become `_` and a short hash of the original id is appended, so
/// `a/b` and `a_b` never share a file.
pub fn safe_item_id(id: &str) -> String {
    if !id.contains(['/', '\\']) {
        return id.to_string();
    }
    let digest = format!("{:x}", Sha256::digest(id.as_bytes()));
    format!("{}_{}", id.replace(['/', '\\'], "_"), &digest[..8])
}

/// An opened EPUB
#[derive(Debug, Clone)]
pub struct EpubBook {
    package: EpubPackage,
    opf_path: String,
    opf: PackageDocument,
    items: Vec<DocumentItem>,
}

impl EpubBook {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, EpubError> {
        let package = EpubPackage::read(path.as_ref())?;
        Self::from_package(package)
    }

    pub fn from_package(package: EpubPackage) -> Result<Self, EpubError> {
        let container = package
            .get(opf::CONTAINER_PATH)
            .ok_or_else(|| EpubError::MissingContainer(opf::CONTAINER_PATH.to_string()))?;
        let opf_path = opf::rootfile_path(container)?;
        let opf_data = package
            .get(&opf_path)
            .ok_or_else(|| EpubError::MissingPackage(opf_path.clone()))?;
        let opf = opf::parse_package(&opf_path, opf_data)?;

        let mut items = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let spine_items = opf.spine.iter().filter_map(|idref| opf.item(idref));
        let other_items = opf.manifest.iter().filter(|m| !opf.spine.contains(&m.id));

        for manifest_item in spine_items.chain(other_items) {
            if !manifest_item.is_document() || !seen.insert(manifest_item.id.clone()) {
                continue;
            }
            match package.get(&manifest_item.path) {
                Some(content) => items.push(DocumentItem {
                    id: manifest_item.id.clone(),
                    name: manifest_item.path.clone(),
                    media_type: manifest_item.media_type.clone(),
                    content: content.to_vec(),
                }),
                None => warn!("Manifest item {} points at missing entry {}", manifest_item.id, manifest_item.path),
            }
        }
        debug!("Opened book with {} content documents", items.len());

        Ok(Self { package, opf_path, opf, items })
    }

    /// Content documents in reading order
    pub fn items(&self) -> &[DocumentItem] {
        &self.items
    }

    pub fn item(&self, id: &str) -> Option<&DocumentItem> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn metadata(&self) -> &BookMetadata {
        &self.opf.metadata
    }

    /// Table of contents, from the navigation document or the NCX
    pub fn toc(&self) -> Vec<TocEntry> {
        if let Some(nav) = self.opf.manifest.iter().find(|m| m.has_property("nav")) {
            if let Some(data) = self.package.get(&nav.path) {
                let entries = toc::from_nav(&nav.path, data);
                if !entries.is_empty() {
                    return entries;
                }
            }
        }

        let ncx = self
            .opf
            .spine_toc
            .as_deref()
            .and_then(|id| self.opf.item(id))
            .or_else(|| self.opf.manifest.iter().find(|m| m.media_type == "application/x-dtbncx+xml"));
        match ncx.and_then(|item| self.package.get(&item.path).map(|data| (item, data))) {
            Some((item, data)) => toc::from_ncx(&item.path, data),
            None => Vec::new(),
        }
    }

    /// Write a copy of the book with some content documents and the metadata replaced.
    ///
    /// `replacements` maps item ids to new content.
    pub fn write<P: AsRef<Path>>(
        &self,
        path: P,
        replacements: &HashMap<String, Vec<u8>>,
        metadata: &MetadataUpdate,
    ) -> Result<(), EpubError> {
        let mut by_name: HashMap<String, Vec<u8>> = HashMap::new();
        for (id, content) in replacements {
            match self.item(id) {
                Some(item) => {
                    by_name.insert(item.name.clone(), content.clone());
                }
                None => warn!("Ignoring replacement for unknown item {}", id),
            }
        }
        if let Some(opf_data) = self.package.get(&self.opf_path) {
            by_name.insert(self.opf_path.clone(), opf::rewrite_metadata(opf_data, metadata));
        }
        self.package.write_with_replacements(path.as_ref(), &by_name)
    }
}
