use anyhow::{Context, Result, anyhow};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::app_config::Config;
use crate::checkpoint::{CheckpointState, CheckpointStore, ResumableJobContext};
use crate::file_utils::FileManager;
use crate::job::{JobOptions, JobReport, Phase, TranslationJob};
use crate::translation::{LlmTranslator, Translator};
use crate::workdir::WorkDir;

// @module: Application controller for book translation

/// Runs jobs for single books or whole folders
pub struct Controller {
    // @field: App configuration
    config: Config,
    // @field: Translator override, used instead of the configured provider
    translator: Option<Arc<dyn Translator>>,
    // @field: Job currently running, flushed on interrupt
    current_job: Mutex<Option<Arc<TranslationJob>>>,
}

impl Controller {
    // @method: Create a controller with the given configuration
    pub fn with_config(config: Config) -> Result<Self> {
        Ok(Self { config, translator: None, current_job: Mutex::new(None) })
    }

    /// Controller whose jobs use `translator` instead of the configured provider
    pub fn with_translator(config: Config, translator: Arc<dyn Translator>) -> Result<Self> {
        Ok(Self { config, translator: Some(translator), current_job: Mutex::new(None) })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn translator(&self) -> Arc<dyn Translator> {
        match &self.translator {
            Some(translator) => translator.clone(),
            None => Arc::new(LlmTranslator::from_config(&self.config)),
        }
    }

    /// Open a job for one book
    pub fn open_job(&self, input: &Path, output: Option<&Path>, options: &JobOptions) -> Result<TranslationJob> {
        if !FileManager::file_exists(input) {
            return Err(anyhow!("Input file does not exist: {:?}", input));
        }
        TranslationJob::open(self.config.clone(), input, output, self.translator(), options)
    }

    // @method: Run a phase for a book or every book in a folder
    pub async fn run(&self, phase: Phase, input: &Path, output: Option<&Path>, options: &JobOptions) -> Result<()> {
        if input.is_dir() {
            self.run_folder(phase, input, output, options).await
        } else {
            self.run_book(phase, input, output, options).await.map(|_| ())
        }
    }

    /// Run a phase for one book
    pub async fn run_book(
        &self,
        phase: Phase,
        input: &Path,
        output: Option<&Path>,
        options: &JobOptions,
    ) -> Result<Option<JobReport>> {
        info!("{}: {} ({} → {})", provider_label(&self.config), input.display(), self.config.source_language, self.config.target_language);
        let job = Arc::new(self.open_job(input, output, options)?);
        *self.current_job.lock() = Some(job.clone());

        let result = job.run(phase).await;
        if let Err(e) = &result {
            error!("Translation of {:?} failed: {:#}", input, e);
            job.flush();
        }
        *self.current_job.lock() = None;
        result
    }

    // @method: Process every EPUB below a folder, one after another
    pub async fn run_folder(&self, phase: Phase, input_dir: &Path, output_dir: Option<&Path>, options: &JobOptions) -> Result<()> {
        let books: Vec<PathBuf> = FileManager::find_files(input_dir, "epub")?
            .into_iter()
            .filter(|path| !is_translated_output(path))
            .collect();
        if books.is_empty() {
            warn!("No EPUB files found in {:?}", input_dir);
            return Ok(());
        }

        let folder_pb = ProgressBar::new(books.len() as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} books ({percent}%) {msg} {eta}")
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        folder_pb.set_style(style.progress_chars("█▓▒░"));
        folder_pb.set_message("Processing books");

        let mut failures = 0;
        for book in &books {
            let output = output_dir.and_then(|dir| {
                FileManager::generate_output_path(book).file_name().map(|name| dir.join(name))
            });
            if let Err(e) = self.run_book(phase, book, output.as_deref(), options).await {
                error!("Skipping {:?}: {:#}", book, e);
                failures += 1;
            }
            folder_pb.inc(1);
        }
        folder_pb.finish_with_message("Done");

        info!("Processed {} books, {} failed", books.len() - failures, failures);
        if failures > 0 {
            return Err(anyhow!("{} of {} books failed", failures, books.len()));
        }
        Ok(())
    }

    /// Checkpoint state of a book, if it has one
    pub fn status(&self, input: &Path) -> Result<Option<CheckpointState>> {
        CheckpointStore::read_status(&WorkDir::for_input(input))
            .with_context(|| format!("Failed to read checkpoint of {:?}", input))
    }

    /// Wipe a book's checkpoint
    pub fn clear(&self, input: &Path, output: Option<&Path>) -> Result<()> {
        let output = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| FileManager::generate_output_path(input));
        let store = CheckpointStore::open(input, &output)?;
        if !store.clear() {
            return Err(anyhow!("Checkpoint of {:?} could not be cleared", input));
        }
        Ok(())
    }

    /// Save whatever the running job has; called before exiting on a signal
    pub fn flush_current(&self) {
        if let Some(job) = self.current_job.lock().as_ref() {
            warn!("Saving progress of {:?}", job.input());
            job.flush();
        }
    }
}

fn provider_label(config: &Config) -> String {
    format!("{} - {}", config.translation.provider.display_name(), config.translation.get_model())
}

/// Books written by an earlier run are not inputs
fn is_translated_output(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with("translated_"))
        .unwrap_or(false)
}

/// One-line summary of a checkpoint for the `status` command
pub fn describe_status(state: &CheckpointState) -> String {
    let local = &state.local_processing;
    let translation = &state.translation;
    format!(
        "{:.1}% | prepared: {} | terminology: {} ({} terms) | items {}/{} | batches {}/{} | chars {}/{} | finished: {}",
        state.total_progress,
        local.translation_preparation_completed,
        state.terminology.completed,
        state.terminology.terms_count,
        translation.items_completed,
        translation.items_total,
        translation.batches_completed,
        translation.batches_total,
        translation.translated_chars,
        translation.total_chars,
        state.is_finished(),
    )
}
