/*!
 * Per-book working directory.
 *
 * Every book gets a `{stem}_workdir` directory next to it holding the
 * checkpoint, the translation cache, terminology and human-readable mirrors
 * of the content. Paths are derived here so that nothing else builds them by
 * hand.
 */

use anyhow::Result;
use log::warn;
use std::fs;
use std::path::{Path, PathBuf};

use crate::file_utils::FileManager;

pub mod content;

pub use self::content::{ContentManager, MirrorKind};

/// Files whose presence tells humans and tools that a phase finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoneMarker {
    ChaptersOriginal,
    Batches,
    Preparation,
    Translation,
}

impl DoneMarker {
    pub const ALL: [DoneMarker; 4] = [Self::ChaptersOriginal, Self::Batches, Self::Preparation, Self::Translation];

    fn relative_path(self) -> &'static str {
        match self {
            Self::ChaptersOriginal => "chapters_original/chapters_completed.done",
            Self::Batches => "batches/batches_completed.done",
            Self::Preparation => "preparation_completed.done",
            Self::Translation => "translation_completed.done",
        }
    }
}

/// Paths inside one book's working directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkDir {
    root: PathBuf,
}

impl WorkDir {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    /// `{input parent}/{input stem}_workdir`
    pub fn for_input<P: AsRef<Path>>(input: P) -> Self {
        let input = input.as_ref();
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "book".to_string());
        let parent = input.parent().unwrap_or_else(|| Path::new(""));
        Self::new(parent.join(format!("{}_workdir", stem)))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        self.root.join("checkpoint")
    }

    pub fn status_file(&self) -> PathBuf {
        self.checkpoint_dir().join("status.json")
    }

    /// Batch descriptors, statuses and translated outputs
    pub fn checkpoint_batches_dir(&self) -> PathBuf {
        self.checkpoint_dir().join("batches")
    }

    pub fn html_items_dir(&self) -> PathBuf {
        self.root.join("html_items")
    }

    pub fn item_dir(&self, safe_id: &str) -> PathBuf {
        self.html_items_dir().join(safe_id)
    }

    pub fn batches_dir(&self) -> PathBuf {
        self.root.join("batches")
    }

    pub fn chapters_dir(&self, kind: MirrorKind) -> PathBuf {
        self.root.join(format!("chapters_{}", kind.as_str()))
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.root.join("metadata")
    }

    pub fn terminology_dir(&self) -> PathBuf {
        self.root.join("terminology")
    }

    pub fn cache_file(&self) -> PathBuf {
        self.root.join("translation_cache.json")
    }

    pub fn marker(&self, marker: DoneMarker) -> PathBuf {
        self.root.join(marker.relative_path())
    }

    /// Create the directories the checkpoint store writes into.
    ///
    /// Content directories are created by their writers so that their
    /// presence means something.
    pub fn ensure_layout(&self) -> Result<()> {
        FileManager::ensure_dir(&self.root)?;
        FileManager::ensure_dir(self.checkpoint_batches_dir())?;
        Ok(())
    }

    pub fn write_marker(&self, marker: DoneMarker) -> Result<()> {
        let stamp = chrono::Local::now().to_rfc3339();
        FileManager::write_to_file(self.marker(marker), &format!("{}\n", stamp))
    }

    pub fn has_marker(&self, marker: DoneMarker) -> bool {
        FileManager::file_exists(self.marker(marker))
    }

    /// Remove every done marker; missing ones are fine
    pub fn remove_markers(&self) {
        for marker in DoneMarker::ALL {
            let path = self.marker(marker);
            if path.exists() {
                if let Err(e) = fs::remove_file(&path) {
                    warn!("Could not remove {}: {}", path.display(), e);
                }
            }
        }
    }
}
