/*!
 * File-backed checkpoint store.
 *
 * Layout inside the working directory:
 * - `checkpoint/status.json`: the `CheckpointState`
 * - `checkpoint/batches/batch_{key}_status.json`: one `BatchStatus` per batch
 * - `checkpoint/batches/batch_{key}_translated.json`: one `BatchOutput` per batch
 * - `checkpoint/batches/item_{id}_batches.json`: the batch descriptors of an item
 *
 * Every file is written through a temporary file and renamed into place.
 */

use anyhow::Result;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

use super::state::{CheckpointState, LocalStep, PhaseUpdate};
use super::{BatchOutput, BatchStatus, ItemBatchInfo, ResumableJobContext};
use crate::epub::safe_item_id;
use crate::file_utils::FileManager;
use crate::workdir::{MirrorKind, WorkDir};

/// Checkpoint persisted under a book's working directory
#[derive(Debug)]
pub struct CheckpointStore {
    workdir: WorkDir,
    state: Mutex<CheckpointState>,
}

impl CheckpointStore {
    /// Open the checkpoint for `input` in its default working directory
    pub fn open<P: AsRef<Path>, Q: AsRef<Path>>(input: P, output: Q) -> Result<Self> {
        let workdir = WorkDir::for_input(input.as_ref());
        Self::open_in(workdir, input, output)
    }

    /// Open or start a checkpoint in `workdir`.
    ///
    /// A saved state is reused only when it was recorded for the same input
    /// content; steps whose artifacts have disappeared are reset.
    pub fn open_in<P: AsRef<Path>, Q: AsRef<Path>>(workdir: WorkDir, input: P, output: Q) -> Result<Self> {
        let input = input.as_ref();
        let output = output.as_ref().display().to_string();
        let hash = FileManager::hash_file(input)?;
        workdir.ensure_layout()?;

        let fresh = || CheckpointState::new(input.display().to_string(), output.clone(), hash.clone());
        let state = match Self::read_status(&workdir) {
            Ok(Some(mut saved)) if saved.source_file_hash == hash => {
                info!("Resuming from checkpoint at {:.1}%", saved.total_progress);
                saved.target_file = output.clone();
                saved
            }
            Ok(Some(_)) => {
                warn!("{} changed since the last run, starting over", input.display());
                wipe(&workdir);
                workdir.ensure_layout()?;
                fresh()
            }
            Ok(None) => fresh(),
            Err(e) => {
                warn!("Checkpoint unreadable, starting over: {}", e);
                fresh()
            }
        };

        let store = Self { workdir, state: Mutex::new(state) };
        store.validate_artifacts();
        store.save();
        Ok(store)
    }

    /// Saved state of a working directory without opening it for writing
    pub fn read_status(workdir: &WorkDir) -> Result<Option<CheckpointState>> {
        let path = workdir.status_file();
        if !FileManager::file_exists(&path) {
            return Ok(None);
        }
        FileManager::read_json(&path).map(Some)
    }

    pub fn workdir(&self) -> &WorkDir {
        &self.workdir
    }

    fn artifacts_present(&self, step: LocalStep, state: &CheckpointState) -> bool {
        let workdir = &self.workdir;
        match step {
            LocalStep::Parsing => FileManager::dir_exists(workdir.root()),
            LocalStep::ContentExtraction | LocalStep::ChapterOrganization => {
                FileManager::dir_exists(workdir.html_items_dir())
                    && FileManager::dir_has_entries(workdir.chapters_dir(MirrorKind::Original))
            }
            LocalStep::BatchDivision | LocalStep::TranslationPreparation => {
                FileManager::dir_has_entries(workdir.batches_dir())
                    && FileManager::dir_has_entries(workdir.checkpoint_batches_dir())
            }
            LocalStep::TerminologyExtraction => {
                state.terminology.terms_file.as_deref().is_none_or(FileManager::file_exists)
            }
            LocalStep::TermProtection => true,
        }
    }

    /// Reset steps flagged complete whose outputs are gone
    fn validate_artifacts(&self) {
        let mut state = self.state.lock();
        let mut changed = false;
        for step in LocalStep::ALL {
            if state.local_processing.get(step) && !self.artifacts_present(step, &state) {
                warn!("Step {} was recorded as done but its files are missing; it will run again", step.name());
                state.local_processing.set(step, false);
                changed = true;
                if step == LocalStep::BatchDivision {
                    state.translation = Default::default();
                    state.preprocessing = Default::default();
                    state.postprocessing = Default::default();
                }
            }
        }
        if changed {
            state.total_progress = state.computed_progress();
        }
    }

    fn write_state(&self, state: &CheckpointState) -> bool {
        match FileManager::write_json_atomic(self.workdir.status_file(), state) {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to save checkpoint: {:#}", e);
                false
            }
        }
    }

    fn status_path(&self, batch_key: &str) -> PathBuf {
        self.workdir.checkpoint_batches_dir().join(format!("batch_{}_status.json", batch_key))
    }

    fn output_path(&self, batch_key: &str) -> PathBuf {
        self.workdir.checkpoint_batches_dir().join(format!("batch_{}_translated.json", batch_key))
    }

    fn info_path(&self, item_id: &str) -> PathBuf {
        self.workdir
            .checkpoint_batches_dir()
            .join(format!("item_{}_batches.json", safe_item_id(item_id)))
    }
}

fn write_record<T: Serialize>(path: &Path, value: &T) -> bool {
    match FileManager::write_json_atomic(path, value) {
        Ok(()) => true,
        Err(e) => {
            error!("Failed to save {}: {:#}", path.display(), e);
            false
        }
    }
}

fn read_record<T: DeserializeOwned>(path: &Path) -> Option<T> {
    if !FileManager::file_exists(path) {
        return None;
    }
    match FileManager::read_json(path) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Ignoring unreadable checkpoint record: {:#}", e);
            None
        }
    }
}

/// Remove persisted checkpoint data and done markers
fn wipe(workdir: &WorkDir) {
    let dir = workdir.checkpoint_dir();
    if dir.exists() {
        if let Err(e) = fs::remove_dir_all(&dir) {
            error!("Could not remove {}: {}", dir.display(), e);
        }
    }
    workdir.remove_markers();
}

impl ResumableJobContext for CheckpointStore {
    fn state(&self) -> CheckpointState {
        self.state.lock().clone()
    }

    fn update_phase(&self, update: PhaseUpdate) -> bool {
        let mut state = self.state.lock();
        state.apply(update);
        self.write_state(&state)
    }

    fn is_step_completed(&self, step: LocalStep) -> bool {
        let state = self.state.lock();
        if !state.local_processing.get(step) {
            return false;
        }
        let present = self.artifacts_present(step, &state);
        if !present {
            debug!("Step {} flagged complete but its files are missing", step.name());
        }
        present
    }

    fn save_batch_status(&self, status: &BatchStatus) -> bool {
        write_record(&self.status_path(&status.batch_key), status)
    }

    fn load_batch_status(&self, batch_key: &str) -> Option<BatchStatus> {
        read_record(&self.status_path(batch_key))
    }

    fn save_batch_info(&self, info: &ItemBatchInfo) -> bool {
        write_record(&self.info_path(&info.item_id), info)
    }

    fn load_batch_info(&self, item_id: &str) -> Option<ItemBatchInfo> {
        read_record(&self.info_path(item_id))
    }

    fn save_batch_output(&self, output: &BatchOutput) -> bool {
        write_record(&self.output_path(&output.batch_key), output)
    }

    fn load_batch_output(&self, batch_key: &str) -> Option<BatchOutput> {
        read_record(&self.output_path(batch_key))
    }

    fn save(&self) -> bool {
        let state = self.state.lock();
        self.write_state(&state)
    }

    fn clear(&self) -> bool {
        let mut state = self.state.lock();
        wipe(&self.workdir);
        if let Err(e) = self.workdir.ensure_layout() {
            error!("Could not recreate checkpoint directory: {:#}", e);
            return false;
        }
        *state = state.reset();
        info!("Checkpoint cleared");
        self.write_state(&state)
    }
}
