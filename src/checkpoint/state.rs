/*!
 * The persisted job state and the updates that move it forward.
 *
 * All changes go through `CheckpointState::apply`, which also recomputes the
 * overall progress. Progress is weighted by phase (terminology 5%,
 * preprocessing 5%, translation 85% by characters, postprocessing 5%) and
 * never decreases for the lifetime of a state.
 */

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const TERMINOLOGY_WEIGHT: f64 = 5.0;
const PREPROCESSING_WEIGHT: f64 = 5.0;
const TRANSLATION_WEIGHT: f64 = 85.0;
const POSTPROCESSING_WEIGHT: f64 = 5.0;

/// Steps of local processing and terminology, tracked individually
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocalStep {
    Parsing,
    ContentExtraction,
    ChapterOrganization,
    BatchDivision,
    TerminologyExtraction,
    TermProtection,
    TranslationPreparation,
}

impl LocalStep {
    pub const ALL: [LocalStep; 7] = [
        Self::Parsing,
        Self::ContentExtraction,
        Self::ChapterOrganization,
        Self::BatchDivision,
        Self::TerminologyExtraction,
        Self::TermProtection,
        Self::TranslationPreparation,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Parsing => "parsing_completed",
            Self::ContentExtraction => "content_extraction_completed",
            Self::ChapterOrganization => "chapter_organization_completed",
            Self::BatchDivision => "batch_division_completed",
            Self::TerminologyExtraction => "terminology_extraction_completed",
            Self::TermProtection => "term_protection_completed",
            Self::TranslationPreparation => "translation_preparation_completed",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalProcessing {
    pub parsing_completed: bool,
    pub content_extraction_completed: bool,
    pub chapter_organization_completed: bool,
    pub batch_division_completed: bool,
    pub terminology_extraction_completed: bool,
    pub term_protection_completed: bool,
    pub translation_preparation_completed: bool,
    pub details: BTreeMap<String, serde_json::Value>,
}

impl LocalProcessing {
    pub fn get(&self, step: LocalStep) -> bool {
        match step {
            LocalStep::Parsing => self.parsing_completed,
            LocalStep::ContentExtraction => self.content_extraction_completed,
            LocalStep::ChapterOrganization => self.chapter_organization_completed,
            LocalStep::BatchDivision => self.batch_division_completed,
            LocalStep::TerminologyExtraction => self.terminology_extraction_completed,
            LocalStep::TermProtection => self.term_protection_completed,
            LocalStep::TranslationPreparation => self.translation_preparation_completed,
        }
    }

    pub fn set(&mut self, step: LocalStep, completed: bool) {
        let flag = match step {
            LocalStep::Parsing => &mut self.parsing_completed,
            LocalStep::ContentExtraction => &mut self.content_extraction_completed,
            LocalStep::ChapterOrganization => &mut self.chapter_organization_completed,
            LocalStep::BatchDivision => &mut self.batch_division_completed,
            LocalStep::TerminologyExtraction => &mut self.terminology_extraction_completed,
            LocalStep::TermProtection => &mut self.term_protection_completed,
            LocalStep::TranslationPreparation => &mut self.translation_preparation_completed,
        };
        *flag = completed;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminologyPhase {
    pub completed: bool,
    pub terms_file: Option<String>,
    pub terms_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingPhase {
    pub completed: bool,
    pub items_processed: usize,
    pub items_total: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationPhase {
    pub completed: bool,
    pub items_total: usize,
    pub items_completed: usize,
    pub completed_items: Vec<String>,
    pub current_item: Option<String>,
    pub translated_segments: usize,
    pub total_segments: usize,
    pub translated_chars: usize,
    pub total_chars: usize,
    pub batches_total: usize,
    pub batches_completed: usize,
    pub completed_batches: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostprocessingPhase {
    pub completed: bool,
}

/// Everything `status.json` holds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointState {
    pub source_file: String,
    pub target_file: String,
    pub source_file_hash: String,
    pub created_at: String,
    pub last_updated: String,
    #[serde(default = "default_auto_resume")]
    pub auto_resume_enabled: bool,
    #[serde(default)]
    pub local_processing: LocalProcessing,
    #[serde(default)]
    pub terminology: TerminologyPhase,
    #[serde(default)]
    pub preprocessing: PreprocessingPhase,
    #[serde(default)]
    pub translation: TranslationPhase,
    #[serde(default)]
    pub postprocessing: PostprocessingPhase,
    #[serde(default)]
    pub total_progress: f64,
}

fn default_auto_resume() -> bool {
    true
}

/// One change to the state
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseUpdate {
    LocalStep { step: LocalStep, completed: bool },
    LocalDetail { key: String, value: serde_json::Value },
    Terminology { completed: bool, terms_file: Option<String>, terms_count: usize },
    /// Sizes known once batches are divided
    TranslationTotals { items_total: usize, total_segments: usize, total_chars: usize, batches_total: usize },
    /// Counted once per batch key
    BatchCompleted { batch_key: String, segments: usize, chars: usize },
    ItemStarted { item_id: String },
    /// Counted once per item; also advances preprocessing
    ItemCompleted { item_id: String },
    TranslationCompleted,
    Postprocessing { completed: bool },
}

impl CheckpointState {
    pub fn new(source_file: impl Into<String>, target_file: impl Into<String>, source_file_hash: impl Into<String>) -> Self {
        let now = chrono::Local::now().to_rfc3339();
        Self {
            source_file: source_file.into(),
            target_file: target_file.into(),
            source_file_hash: source_file_hash.into(),
            created_at: now.clone(),
            last_updated: now,
            auto_resume_enabled: true,
            local_processing: LocalProcessing::default(),
            terminology: TerminologyPhase::default(),
            preprocessing: PreprocessingPhase::default(),
            translation: TranslationPhase::default(),
            postprocessing: PostprocessingPhase::default(),
            total_progress: 0.0,
        }
    }

    /// Same identity, no progress
    pub fn reset(&self) -> Self {
        Self::new(self.source_file.clone(), self.target_file.clone(), self.source_file_hash.clone())
    }

    pub fn is_batch_completed(&self, batch_key: &str) -> bool {
        self.translation.completed_batches.iter().any(|k| k == batch_key)
    }

    pub fn is_item_completed(&self, item_id: &str) -> bool {
        self.translation.completed_items.iter().any(|i| i == item_id)
    }

    /// Whether every phase has finished
    pub fn is_finished(&self) -> bool {
        self.postprocessing.completed
    }

    /// Merge one update and refresh progress and timestamp
    pub fn apply(&mut self, update: PhaseUpdate) {
        match update {
            PhaseUpdate::LocalStep { step, completed } => self.local_processing.set(step, completed),
            PhaseUpdate::LocalDetail { key, value } => {
                self.local_processing.details.insert(key, value);
            }
            PhaseUpdate::Terminology { completed, terms_file, terms_count } => {
                self.terminology = TerminologyPhase { completed, terms_file, terms_count };
            }
            PhaseUpdate::TranslationTotals { items_total, total_segments, total_chars, batches_total } => {
                let translation = &mut self.translation;
                translation.items_total = items_total;
                translation.total_segments = total_segments;
                translation.total_chars = total_chars;
                translation.batches_total = batches_total;
                self.preprocessing.items_total = items_total;
            }
            PhaseUpdate::BatchCompleted { batch_key, segments, chars } => {
                if !self.is_batch_completed(&batch_key) {
                    let translation = &mut self.translation;
                    translation.completed_batches.push(batch_key);
                    translation.batches_completed += 1;
                    translation.translated_segments += segments;
                    translation.translated_chars += chars;
                }
            }
            PhaseUpdate::ItemStarted { item_id } => self.translation.current_item = Some(item_id),
            PhaseUpdate::ItemCompleted { item_id } => {
                if !self.is_item_completed(&item_id) {
                    self.translation.completed_items.push(item_id);
                    self.translation.items_completed += 1;
                    let preprocessing = &mut self.preprocessing;
                    preprocessing.items_processed = (preprocessing.items_processed + 1).min(preprocessing.items_total.max(1));
                    preprocessing.completed = preprocessing.items_processed >= preprocessing.items_total;
                }
            }
            PhaseUpdate::TranslationCompleted => {
                self.translation.completed = true;
                self.translation.current_item = None;
                self.preprocessing.completed = true;
                self.preprocessing.items_processed = self.preprocessing.items_total;
            }
            PhaseUpdate::Postprocessing { completed } => self.postprocessing.completed = completed,
        }
        self.total_progress = self.total_progress.max(self.computed_progress());
        self.last_updated = chrono::Local::now().to_rfc3339();
    }

    /// Weighted progress from the phase records alone, in `[0, 100]`
    pub fn computed_progress(&self) -> f64 {
        let fraction = |done: usize, total: usize| if total == 0 { 0.0 } else { (done as f64 / total as f64).min(1.0) };

        let terminology = if self.terminology.completed { 1.0 } else { 0.0 };
        let preprocessing = if self.preprocessing.completed {
            1.0
        } else {
            fraction(self.preprocessing.items_processed, self.preprocessing.items_total)
        };
        let translation = if self.translation.completed {
            1.0
        } else {
            fraction(self.translation.translated_chars, self.translation.total_chars)
        };
        let postprocessing = if self.postprocessing.completed { 1.0 } else { 0.0 };

        let total = terminology * TERMINOLOGY_WEIGHT
            + preprocessing * PREPROCESSING_WEIGHT
            + translation * TRANSLATION_WEIGHT
            + postprocessing * POSTPROCESSING_WEIGHT;
        total.clamp(0.0, 100.0)
    }
}
