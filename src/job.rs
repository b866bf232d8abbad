/*!
 * One book's translation job.
 *
 * A `TranslationJob` is built once per input file and owns everything the
 * phases share: configuration, working directory, job context, dispatcher,
 * extractor and divider. Phases:
 *
 * - `prepare`: parse the book, write content mirrors, extract segments and
 *   divide them into batches with checkpoint records
 * - `extract_terminology`: ask the model for terms to keep untranslated
 * - `translate`: dispatch unfinished batches, reassemble each item and write
 *   the translated book
 *
 * Finished steps, items and batches are skipped on later runs unless the
 * job was opened with `force`.
 */

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, error, info, warn};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::app_config::Config;
use crate::checkpoint::{
    BatchOutput, BatchStatus, CheckpointState, CheckpointStore, ItemBatchInfo, LocalStep, MemoryJobContext,
    PhaseUpdate, ResumableJobContext,
};
use crate::epub::{Document, DocumentItem, EpubBook, MetadataUpdate};
use crate::file_utils::FileManager;
use crate::translation::reassembler::{TranslatedPart, apply_translations};
use crate::translation::segment::Batch;
use crate::translation::terminology::{TerminologyExtractor, preserved_terms};
use crate::translation::{BatchDispatcher, DispatchSettings, DispatchStats, SegmentExtractor, TextDivider, Translator};
use crate::workdir::{ContentManager, DoneMarker, MirrorKind, WorkDir};

/// Which part of the pipeline to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Prepare,
    Terminology,
    Translate,
    All,
}

/// How a job is opened
#[derive(Debug, Clone)]
pub struct JobOptions {
    /// Discard checkpoint and cache before starting
    pub force: bool,
    /// Persist progress under the working directory
    pub use_checkpoint: bool,
    pub show_progress: bool,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self { force: false, use_checkpoint: true, show_progress: false }
    }
}

/// Sizes found by the preparation phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrepareSummary {
    pub items: usize,
    pub segments: usize,
    pub chars: usize,
    pub batches: usize,
}

/// Outcome of the translation phase
#[derive(Debug, Clone)]
pub struct JobReport {
    pub output: PathBuf,
    pub items: usize,
    /// Batches sent to the dispatcher in this run
    pub batches_dispatched: usize,
    /// Batches whose translations were loaded from the checkpoint
    pub batches_reused: usize,
    pub stats: DispatchStats,
}

pub struct TranslationJob {
    config: Config,
    input: PathBuf,
    output: PathBuf,
    workdir: WorkDir,
    content: ContentManager,
    context: Arc<dyn ResumableJobContext>,
    dispatcher: BatchDispatcher,
    extractor: SegmentExtractor,
    divider: TextDivider,
    terminology: TerminologyExtractor,
    book: OnceCell<EpubBook>,
    progress: ProgressBar,
    batches_dispatched: AtomicUsize,
    batches_reused: AtomicUsize,
}

impl TranslationJob {
    /// Open a job for `input`, writing to `output` or `translated_{name}` next to the input
    pub fn open(
        config: Config,
        input: &Path,
        output: Option<&Path>,
        translator: Arc<dyn Translator>,
        options: &JobOptions,
    ) -> Result<Self> {
        let output = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| FileManager::generate_output_path(input));
        let workdir = WorkDir::for_input(input);
        let context: Arc<dyn ResumableJobContext> = if options.use_checkpoint {
            Arc::new(CheckpointStore::open_in(workdir.clone(), input, &output)?)
        } else {
            FileManager::ensure_dir(workdir.root())?;
            Arc::new(MemoryJobContext::new(&input.display().to_string(), &output.display().to_string()))
        };

        let job = Self::with_context(config, input, &output, translator, context, workdir)?;
        if options.force {
            info!("Forced restart, previous progress is discarded");
            job.context.clear();
        } else {
            job.load_cache();
        }
        if options.show_progress {
            job.progress.set_draw_target(ProgressDrawTarget::stderr());
        }
        Ok(job)
    }

    /// Build a job around an existing context
    pub fn with_context(
        config: Config,
        input: &Path,
        output: &Path,
        translator: Arc<dyn Translator>,
        context: Arc<dyn ResumableJobContext>,
        workdir: WorkDir,
    ) -> Result<Self> {
        let extractor = SegmentExtractor::new(&config.extraction)?;
        let divider = TextDivider::new(&config.processing, &config.extraction)?;
        let dispatcher = BatchDispatcher::new(translator, DispatchSettings::from_config(&config));

        let progress = ProgressBar::hidden();
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} batches ({percent}%) {msg} {eta}")
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        progress.set_style(style.progress_chars("█▓▒░"));

        Ok(Self {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            content: ContentManager::new(workdir.clone()),
            terminology: TerminologyExtractor::new(workdir.terminology_dir()),
            workdir,
            context,
            dispatcher,
            extractor,
            divider,
            config,
            book: OnceCell::new(),
            progress,
            batches_dispatched: AtomicUsize::new(0),
            batches_reused: AtomicUsize::new(0),
        })
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn workdir(&self) -> &WorkDir {
        &self.workdir
    }

    pub fn context(&self) -> &Arc<dyn ResumableJobContext> {
        &self.context
    }

    pub fn dispatcher(&self) -> &BatchDispatcher {
        &self.dispatcher
    }

    pub fn status(&self) -> CheckpointState {
        self.context.state()
    }

    fn book(&self) -> Result<&EpubBook> {
        self.book
            .get_or_try_init(|| EpubBook::open(&self.input))
            .with_context(|| format!("Failed to open book: {:?}", self.input))
    }

    /// Run one phase; only the translation phases produce a report
    pub async fn run(&self, phase: Phase) -> Result<Option<JobReport>> {
        match phase {
            Phase::Prepare => {
                self.prepare()?;
                Ok(None)
            }
            Phase::Terminology => {
                self.extract_terminology().await?;
                Ok(None)
            }
            Phase::Translate => self.translate().await.map(Some),
            Phase::All => {
                self.prepare()?;
                self.extract_terminology().await?;
                self.translate().await.map(Some)
            }
        }
    }

    fn mark_step(&self, step: LocalStep) {
        self.context.update_phase(PhaseUpdate::LocalStep { step, completed: true });
    }

    fn write_marker(&self, marker: DoneMarker) {
        if let Err(e) = self.workdir.write_marker(marker) {
            warn!("Could not write done marker: {:#}", e);
        }
    }

    /// Local processing: mirrors, segments, batches and their checkpoint records
    pub fn prepare(&self) -> Result<PrepareSummary> {
        let book = self.book()?;
        info!("Preparing {:?} ({} content documents)", self.input, book.items().len());

        if !self.context.is_step_completed(LocalStep::Parsing) {
            self.context.update_phase(PhaseUpdate::LocalDetail {
                key: "items_count".to_string(),
                value: serde_json::json!(book.items().len()),
            });
            self.mark_step(LocalStep::Parsing);
        }

        if !self.context.is_step_completed(LocalStep::ContentExtraction)
            || !self.context.is_step_completed(LocalStep::ChapterOrganization)
        {
            self.save_originals(book)?;
            self.write_marker(DoneMarker::ChaptersOriginal);
            self.mark_step(LocalStep::ContentExtraction);
            self.mark_step(LocalStep::ChapterOrganization);
        }

        let summary = if self.context.is_step_completed(LocalStep::BatchDivision) {
            debug!("Batches already divided");
            let translation = self.context.state().translation;
            PrepareSummary {
                items: translation.items_total,
                segments: translation.total_segments,
                chars: translation.total_chars,
                batches: translation.batches_total,
            }
        } else {
            self.divide(book)
        };

        self.mark_step(LocalStep::TranslationPreparation);
        self.write_marker(DoneMarker::Preparation);
        info!(
            "Prepared {} items: {} segments, {} characters in {} batches",
            summary.items, summary.segments, summary.chars, summary.batches
        );
        Ok(summary)
    }

    fn save_originals(&self, book: &EpubBook) -> Result<()> {
        for item in book.items() {
            let doc = Document::parse(&item.content);
            self.content
                .save_item(MirrorKind::Original, &item.safe_id(), &item.content, &doc.plain_text())
                .with_context(|| format!("Failed to save content of {}", item.id))?;
            self.content.save_chapter(MirrorKind::Original, item, &doc);
        }
        self.content.save_metadata(MirrorKind::Original, book.metadata());
        self.content.save_toc(&book.toc());
        Ok(())
    }

    fn divide_item(&self, item: &DocumentItem) -> Vec<Batch> {
        let doc = Document::parse(&item.content);
        let segments = self.extractor.extract(&doc, &item.id);
        self.divider.group(&item.id, self.divider.optimize(segments))
    }

    fn divide(&self, book: &EpubBook) -> PrepareSummary {
        let mut summary = PrepareSummary { items: book.items().len(), ..Default::default() };
        for item in book.items() {
            let batches = self.divide_item(item);
            for batch in &batches {
                let finished = self
                    .context
                    .load_batch_status(&batch.key())
                    .is_some_and(|status| status.is_done_for(batch));
                if !finished {
                    self.context.save_batch_status(&BatchStatus::pending(batch));
                }
                self.content.save_batch(batch, None);
                summary.segments += batch.segments.len();
                summary.chars += batch.char_count();
            }
            summary.batches += batches.len();
            debug!("{}: {} batches", item.id, batches.len());
            self.context.save_batch_info(&ItemBatchInfo::new(&item.id, &item.name, batches));
        }

        self.context.update_phase(PhaseUpdate::TranslationTotals {
            items_total: summary.items,
            total_segments: summary.segments,
            total_chars: summary.chars,
            batches_total: summary.batches,
        });
        self.write_marker(DoneMarker::Batches);
        self.mark_step(LocalStep::BatchDivision);
        summary
    }

    /// Terminology analysis; returns the number of terms known afterwards
    pub async fn extract_terminology(&self) -> Result<usize> {
        if !self.config.processing.use_terminology {
            info!("Terminology analysis disabled");
            self.context.update_phase(PhaseUpdate::Terminology { completed: true, terms_file: None, terms_count: 0 });
            return Ok(0);
        }

        let book = self.book()?;
        let index_text = book
            .items()
            .iter()
            .find(|item| self.extractor.is_index_item(&item.id))
            .map(|item| Document::parse(&item.content).plain_text());
        let terms = self
            .terminology
            .extract(&self.dispatcher, &book.toc(), index_text.as_deref())
            .await;
        self.dispatcher.translator().set_preserved_terms(&preserved_terms(&terms));

        let terms_file = self.terminology.terms_file();
        if FileManager::file_exists(&terms_file) {
            self.context.update_phase(PhaseUpdate::Terminology {
                completed: true,
                terms_file: Some(terms_file.display().to_string()),
                terms_count: terms.len(),
            });
            self.mark_step(LocalStep::TerminologyExtraction);
            self.mark_step(LocalStep::TermProtection);
        } else {
            warn!("Terminology analysis did not complete, translating without a term list");
        }
        Ok(terms.len())
    }

    /// Translate every item and write the translated book
    pub async fn translate(&self) -> Result<JobReport> {
        if !self.context.is_step_completed(LocalStep::TranslationPreparation) {
            self.prepare()?;
        }
        if let Some(terms) = self.terminology.load_existing() {
            self.dispatcher.translator().set_preserved_terms(&preserved_terms(&terms));
        }

        let book = self.book()?;
        let state = self.context.state();
        info!(
            "Translating {} items from {} to {} ({:.1}% already done)",
            book.items().len(),
            self.config.source_language,
            self.config.target_language,
            state.total_progress
        );
        self.progress.set_length(state.translation.batches_total as u64);
        self.progress.set_message("Translating");

        let workers = self.config.processing.max_workers.max(1);
        let results: Vec<Result<(String, Vec<u8>)>> = stream::iter(book.items())
            .map(|item| self.translate_item(item))
            .buffer_unordered(workers)
            .collect()
            .await;
        let mut replacements = HashMap::new();
        for result in results {
            let (id, html) = result?;
            replacements.insert(id, html);
        }
        self.context.update_phase(PhaseUpdate::TranslationCompleted);
        self.progress.finish_with_message("Translated");

        self.finalize(book, &replacements).await?;

        let stats = self.dispatcher.stats();
        info!(
            "Done: {} batches sent, {} calls ({} failed), {} cache hits, {} segments kept in the source language",
            stats.batches, stats.external_calls, stats.failed_calls, stats.cache_hits, stats.degraded
        );
        info!("Output: {:?}", self.output);

        Ok(JobReport {
            output: self.output.clone(),
            items: replacements.len(),
            batches_dispatched: self.batches_dispatched.load(Ordering::SeqCst),
            batches_reused: self.batches_reused.load(Ordering::SeqCst),
            stats,
        })
    }

    fn item_is_finished(&self, item: &DocumentItem, info: &ItemBatchInfo) -> bool {
        self.context.state().is_item_completed(&item.id)
            && info.batches.iter().all(|batch| {
                self.context
                    .load_batch_status(&batch.key())
                    .is_some_and(|status| status.is_done_for(batch))
            })
    }

    async fn translate_item(&self, item: &DocumentItem) -> Result<(String, Vec<u8>)> {
        let safe_id = item.safe_id();
        let info = match self.context.load_batch_info(&item.id) {
            Some(info) => info,
            None => {
                let info = ItemBatchInfo::new(&item.id, &item.name, self.divide_item(item));
                self.context.save_batch_info(&info);
                info
            }
        };

        if self.item_is_finished(item, &info) {
            if let Some(html) = self.content.load_translated_item(&safe_id) {
                debug!("{} already translated", item.id);
                self.batches_reused.fetch_add(info.batch_count, Ordering::SeqCst);
                self.progress.inc(info.batch_count as u64);
                return Ok((item.id.clone(), html));
            }
        }
        self.context.update_phase(PhaseUpdate::ItemStarted { item_id: item.id.clone() });

        let html = if info.batches.is_empty() {
            item.content.clone()
        } else {
            let workers = self.config.processing.max_workers.max(1);
            let translated: Vec<(Batch, Vec<String>)> = stream::iter(info.batches)
                .map(|batch| self.translate_batch(batch))
                .buffer_unordered(workers)
                .collect()
                .await;

            let mut doc = Document::parse(&item.content);
            let parts: Vec<TranslatedPart<'_>> = translated
                .iter()
                .flat_map(|(batch, translations)| {
                    batch
                        .segments
                        .iter()
                        .zip(translations)
                        .map(|(segment, translation)| TranslatedPart { segment, translation: translation.as_str() })
                })
                .collect();
            let report = apply_translations(&mut doc, &parts);
            if report.skipped > 0 {
                warn!("{}: {} segments could not be placed", item.id, report.skipped);
            }
            self.content.save_chapter(MirrorKind::Translated, item, &doc);
            doc.serialize()
        };

        let text = Document::parse(&html).plain_text();
        self.content
            .save_item(MirrorKind::Translated, &safe_id, &html, &text)
            .with_context(|| format!("Failed to save translation of {}", item.id))?;
        self.context.update_phase(PhaseUpdate::ItemCompleted { item_id: item.id.clone() });
        Ok((item.id.clone(), html))
    }

    /// Stored translations of a batch finished in an earlier run
    fn finished_output(&self, batch: &Batch) -> Option<Vec<String>> {
        let key = batch.key();
        let status = self.context.load_batch_status(&key)?;
        if !status.is_done_for(batch) {
            return None;
        }
        let output = self.context.load_batch_output(&key)?;
        (output.source_hash == status.source_hash && output.translations.len() == batch.segments.len())
            .then_some(output.translations)
    }

    async fn translate_batch(&self, batch: Batch) -> (Batch, Vec<String>) {
        let key = batch.key();
        if let Some(translations) = self.finished_output(&batch) {
            self.batches_reused.fetch_add(1, Ordering::SeqCst);
            if !self.context.state().is_batch_completed(&key) {
                self.record_batch(&batch);
            }
            self.progress.inc(1);
            return (batch, translations);
        }

        let outcome = self.dispatcher.translate_batch(&batch.texts()).await;
        self.batches_dispatched.fetch_add(1, Ordering::SeqCst);

        if outcome.success {
            let output = BatchOutput {
                batch_key: key.clone(),
                source_hash: batch.source_hash(),
                translations: outcome.translations.clone(),
            };
            let status = BatchStatus { translation_completed: true, ..BatchStatus::pending(&batch) };
            if self.context.save_batch_output(&output) && self.context.save_batch_status(&status) {
                self.record_batch(&batch);
            }
        } else {
            warn!("Batch {} kept {} texts untranslated, it will be retried on the next run", key, outcome.degraded);
        }

        self.content.save_batch(&batch, Some(&outcome.translations));
        if self.dispatcher.unsaved_cache_entries() >= self.config.processing.cache_save_interval.max(1) {
            self.flush_cache();
        }
        self.progress.inc(1);
        (batch, outcome.translations)
    }

    fn record_batch(&self, batch: &Batch) {
        self.context.update_phase(PhaseUpdate::BatchCompleted {
            batch_key: batch.key(),
            segments: batch.segments.len(),
            chars: batch.char_count(),
        });
    }

    /// Translate title and description, then write the book
    async fn finalize(&self, book: &EpubBook, replacements: &HashMap<String, Vec<u8>>) -> Result<()> {
        let metadata = book.metadata();
        let title = match metadata.first_title().filter(|t| !t.trim().is_empty()) {
            Some(title) => Some(self.dispatcher.translate_text(title).await),
            None => None,
        };
        let description = match metadata.first_description().filter(|d| !d.trim().is_empty()) {
            Some(description) => Some(self.dispatcher.translate_text(description).await),
            None => None,
        };
        let update = MetadataUpdate {
            title,
            description,
            language: Some(self.config.target_language.clone()),
        };
        self.content.save_metadata(MirrorKind::Translated, &metadata.with_update(&update));

        if let Some(parent) = self.output.parent().filter(|p| !p.as_os_str().is_empty()) {
            FileManager::ensure_dir(parent)?;
        }
        book.write(&self.output, replacements, &update)
            .with_context(|| format!("Failed to write translated book: {:?}", self.output))?;

        self.flush_cache();
        self.context.update_phase(PhaseUpdate::Postprocessing { completed: true });
        self.write_marker(DoneMarker::Translation);
        Ok(())
    }

    fn load_cache(&self) {
        match self.dispatcher.load_cache(self.workdir.cache_file()) {
            Ok(0) => {}
            Ok(count) => info!("Loaded {} cached translations", count),
            Err(e) => warn!("Ignoring unreadable translation cache: {:#}", e),
        }
    }

    fn flush_cache(&self) {
        if let Err(e) = self.dispatcher.save_cache(self.workdir.cache_file()) {
            error!("Failed to save translation cache: {:#}", e);
        }
    }

    /// Best-effort save of checkpoint and cache, used on interrupt
    pub fn flush(&self) {
        if !self.context.save() {
            error!("Checkpoint could not be saved");
        }
        self.flush_cache();
    }
}
