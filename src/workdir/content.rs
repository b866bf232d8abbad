/*!
 * Mirrors of the book's content inside the working directory.
 *
 * Original and translated HTML, plain text, chapter files and batch text
 * dumps are written for people inspecting a run. Only the translated HTML of
 * an item is read back (to skip finished items on resume), so every mirror
 * write except that one is best-effort and only logs on failure.
 */

use anyhow::Result;
use log::{debug, warn};
use std::fs;
use std::path::PathBuf;

use super::WorkDir;
use crate::epub::{BookMetadata, Document, DocumentItem, TocEntry};
use crate::file_utils::FileManager;
use crate::translation::segment::Batch;

/// Which side of the translation a mirror holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorKind {
    Original,
    Translated,
}

impl MirrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::Translated => "translated",
        }
    }
}

/// Reads and writes content mirrors
#[derive(Debug, Clone)]
pub struct ContentManager {
    workdir: WorkDir,
}

impl ContentManager {
    pub fn new(workdir: WorkDir) -> Self {
        Self { workdir }
    }

    pub fn translated_html_path(&self, safe_id: &str) -> PathBuf {
        self.workdir.item_dir(safe_id).join("translated.html")
    }

    /// `html_items/{id}/{kind}.html` and `.txt`
    pub fn save_item(&self, kind: MirrorKind, safe_id: &str, html: &[u8], text: &str) -> Result<()> {
        let dir = self.workdir.item_dir(safe_id);
        FileManager::write_atomic(dir.join(format!("{}.html", kind.as_str())), html)?;
        FileManager::write_to_file(dir.join(format!("{}.txt", kind.as_str())), text)?;
        Ok(())
    }

    /// Translated HTML saved by an earlier run
    pub fn load_translated_item(&self, safe_id: &str) -> Option<Vec<u8>> {
        let path = self.translated_html_path(safe_id);
        match fs::read(&path) {
            Ok(data) => Some(data),
            Err(e) => {
                debug!("No translated HTML at {}: {}", path.display(), e);
                None
            }
        }
    }

    /// `chapters_{kind}/{id}_{title}.html` and `.txt`
    pub fn save_chapter(&self, kind: MirrorKind, item: &DocumentItem, doc: &Document) {
        let title = chapter_title(doc).unwrap_or_else(|| item.id.clone());
        let base = format!("{}_{}", item.safe_id(), FileManager::sanitize_filename(&title));
        let dir = self.workdir.chapters_dir(kind);

        let html = doc.serialize();
        let result = FileManager::write_atomic(dir.join(format!("{}.html", base)), &html)
            .and_then(|_| FileManager::write_to_file(dir.join(format!("{}.txt", base)), &doc.plain_text()));
        if let Err(e) = result {
            warn!("Could not save chapter mirror for {}: {}", item.id, e);
        }
    }

    /// Text dumps of one batch; `translations` is `None` before translation
    pub fn save_batch(&self, batch: &Batch, translations: Option<&[String]>) {
        let dir = self
            .workdir
            .item_dir(&crate::epub::safe_item_id(&batch.item_id))
            .join("batches")
            .join(format!("batch_{:03}", batch.batch_id));
        let original = batch.texts().join("\n\n");

        let mut result = FileManager::write_to_file(dir.join("original.txt"), &original);
        if result.is_ok() && translations.is_none() {
            let standalone = self.workdir.batches_dir().join(format!("{}.txt", batch.key()));
            result = FileManager::write_to_file(standalone, &original);
        }
        if let Some(translations) = translations.filter(|_| result.is_ok()) {
            let parallel: String = batch
                .segments
                .iter()
                .zip(translations)
                .map(|(segment, translated)| format!("[{}]\n{}\n---\n{}\n\n", segment.ordinal, segment.text, translated))
                .collect();
            result = FileManager::write_to_file(dir.join("translated.txt"), &translations.join("\n\n"))
                .and_then(|_| FileManager::write_to_file(dir.join("parallel.txt"), &parallel));
        }
        if let Err(e) = result {
            warn!("Could not save batch mirror {}: {}", batch.key(), e);
        }
    }

    pub fn save_metadata(&self, kind: MirrorKind, metadata: &BookMetadata) {
        let path = self.workdir.metadata_dir().join(format!("metadata_{}.json", kind.as_str()));
        if let Err(e) = FileManager::write_json_atomic(&path, metadata) {
            warn!("Could not save {}: {}", path.display(), e);
        }
    }

    pub fn save_toc(&self, toc: &[TocEntry]) {
        let path = self.workdir.metadata_dir().join("toc.json");
        if let Err(e) = FileManager::write_json_atomic(&path, &toc) {
            warn!("Could not save {}: {}", path.display(), e);
        }
    }
}

/// `<title>`, else the first top-level heading
fn chapter_title(doc: &Document) -> Option<String> {
    ["title", "h1", "h2"].into_iter().find_map(|name| {
        doc.find_first(&[name])
            .map(|id| doc.text_content(id).split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|title| !title.is_empty())
    })
}
