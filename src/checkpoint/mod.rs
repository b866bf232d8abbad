/*!
 * Resumable job state.
 *
 * The pipeline only talks to `ResumableJobContext`. `CheckpointStore` keeps
 * everything under the book's working directory so an interrupted run picks
 * up where it stopped; `MemoryJobContext` keeps the same records in memory
 * for runs without persistence and for tests.
 *
 * Persistence failures never abort a job: saves report `false` and the job
 * carries on without resumability for that write.
 */

use serde::{Deserialize, Serialize};

pub mod memory;
pub mod state;
pub mod store;

pub use self::memory::MemoryJobContext;
pub use self::state::{CheckpointState, LocalStep, PhaseUpdate};
pub use self::store::CheckpointStore;

use crate::translation::segment::Batch;

/// Per-batch record, the unit of resumption
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchStatus {
    pub batch_key: String,
    pub item_id: String,
    pub batch_number: usize,
    pub segments_count: usize,
    pub chars_count: usize,
    /// Hash of the batch texts the status was recorded for
    #[serde(default)]
    pub source_hash: String,
    pub translation_completed: bool,
}

impl BatchStatus {
    /// A pending status for `batch`
    pub fn pending(batch: &Batch) -> Self {
        Self {
            batch_key: batch.key(),
            item_id: batch.item_id.clone(),
            batch_number: batch.batch_id,
            segments_count: batch.segments.len(),
            chars_count: batch.char_count(),
            source_hash: batch.source_hash(),
            translation_completed: false,
        }
    }

    /// Completed and recorded for exactly these texts
    pub fn is_done_for(&self, batch: &Batch) -> bool {
        self.translation_completed && self.source_hash == batch.source_hash()
    }
}

/// Batch descriptors of one document item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemBatchInfo {
    pub item_id: String,
    pub item_name: String,
    pub batch_count: usize,
    pub batches: Vec<Batch>,
}

impl ItemBatchInfo {
    pub fn new(item_id: &str, item_name: &str, batches: Vec<Batch>) -> Self {
        Self {
            item_id: item_id.to_string(),
            item_name: item_name.to_string(),
            batch_count: batches.len(),
            batches,
        }
    }
}

/// Translations of one batch, in segment order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOutput {
    pub batch_key: String,
    pub source_hash: String,
    pub translations: Vec<String>,
}

/// What the pipeline needs from a checkpoint backend.
///
/// Implementations are shared between concurrently running batches, so every
/// method takes `&self` and must be safe to call from several tasks.
pub trait ResumableJobContext: Send + Sync {
    /// Snapshot of the current state
    fn state(&self) -> CheckpointState;

    /// Apply an update and persist the state; `false` if persisting failed
    fn update_phase(&self, update: PhaseUpdate) -> bool;

    /// Stored flag, cross-checked against the artifacts the step leaves behind
    fn is_step_completed(&self, step: LocalStep) -> bool;

    fn save_batch_status(&self, status: &BatchStatus) -> bool;
    fn load_batch_status(&self, batch_key: &str) -> Option<BatchStatus>;

    fn save_batch_info(&self, info: &ItemBatchInfo) -> bool;
    fn load_batch_info(&self, item_id: &str) -> Option<ItemBatchInfo>;

    /// Must be durable before the batch status is flagged complete
    fn save_batch_output(&self, output: &BatchOutput) -> bool;
    fn load_batch_output(&self, batch_key: &str) -> Option<BatchOutput>;

    /// Persist the state as it is now
    fn save(&self) -> bool;

    /// Drop all progress and persisted records
    fn clear(&self) -> bool;
}
