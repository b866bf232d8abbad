/*!
 * In-memory job context for runs without persistence.
 */

use parking_lot::Mutex;
use std::collections::HashMap;

use super::state::{CheckpointState, LocalStep, PhaseUpdate};
use super::{BatchOutput, BatchStatus, ItemBatchInfo, ResumableJobContext};

#[derive(Debug)]
struct Records {
    state: CheckpointState,
    statuses: HashMap<String, BatchStatus>,
    infos: HashMap<String, ItemBatchInfo>,
    outputs: HashMap<String, BatchOutput>,
}

/// Keeps every record in memory; nothing survives the process
#[derive(Debug)]
pub struct MemoryJobContext {
    records: Mutex<Records>,
}

impl MemoryJobContext {
    pub fn new(source_file: &str, target_file: &str) -> Self {
        Self {
            records: Mutex::new(Records {
                state: CheckpointState::new(source_file, target_file, ""),
                statuses: HashMap::new(),
                infos: HashMap::new(),
                outputs: HashMap::new(),
            }),
        }
    }
}

impl Default for MemoryJobContext {
    fn default() -> Self {
        Self::new("", "")
    }
}

impl ResumableJobContext for MemoryJobContext {
    fn state(&self) -> CheckpointState {
        self.records.lock().state.clone()
    }

    fn update_phase(&self, update: PhaseUpdate) -> bool {
        self.records.lock().state.apply(update);
        true
    }

    fn is_step_completed(&self, step: LocalStep) -> bool {
        self.records.lock().state.local_processing.get(step)
    }

    fn save_batch_status(&self, status: &BatchStatus) -> bool {
        self.records.lock().statuses.insert(status.batch_key.clone(), status.clone());
        true
    }

    fn load_batch_status(&self, batch_key: &str) -> Option<BatchStatus> {
        self.records.lock().statuses.get(batch_key).cloned()
    }

    fn save_batch_info(&self, info: &ItemBatchInfo) -> bool {
        self.records.lock().infos.insert(info.item_id.clone(), info.clone());
        true
    }

    fn load_batch_info(&self, item_id: &str) -> Option<ItemBatchInfo> {
        self.records.lock().infos.get(item_id).cloned()
    }

    fn save_batch_output(&self, output: &BatchOutput) -> bool {
        self.records.lock().outputs.insert(output.batch_key.clone(), output.clone());
        true
    }

    fn load_batch_output(&self, batch_key: &str) -> Option<BatchOutput> {
        self.records.lock().outputs.get(batch_key).cloned()
    }

    fn save(&self) -> bool {
        true
    }

    fn clear(&self) -> bool {
        let mut records = self.records.lock();
        records.state = records.state.reset();
        records.statuses.clear();
        records.infos.clear();
        records.outputs.clear();
        true
    }
}
