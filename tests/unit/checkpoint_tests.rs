/*!
 * Tests for the working directory and the file-backed checkpoint
 */

use anyhow::Result;
use std::path::Path;

use yaetwai::checkpoint::{BatchOutput, BatchStatus, CheckpointStore, ItemBatchInfo, LocalStep, PhaseUpdate, ResumableJobContext};
use yaetwai::epub::NodeId;
use yaetwai::translation::{Anchor, Batch, Segment};
use yaetwai::workdir::WorkDir;

use crate::common;

fn sample_batch(item_id: &str, batch_id: usize, texts: &[&str]) -> Batch {
    let segments = texts
        .iter()
        .enumerate()
        .map(|(i, text)| Segment::new(i, Anchor::Text { nodes: vec![NodeId(i + 1)] }, *text))
        .collect();
    Batch { item_id: item_id.to_string(), batch_id, segments }
}

/// The working directory is named after the input file
#[test]
fn test_for_input_withEpubPath_shouldUseStemWorkdir() {
    let workdir = WorkDir::for_input(Path::new("/books/novel.epub"));
    assert_eq!(workdir.root(), Path::new("/books/novel_workdir"));
    assert_eq!(workdir.status_file(), Path::new("/books/novel_workdir/checkpoint/status.json"));
    assert_eq!(workdir.cache_file(), Path::new("/books/novel_workdir/translation_cache.json"));
}

/// Batch records survive closing and reopening the store
#[test]
fn test_store_withSavedRecords_shouldLoadThemAfterReopen() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_sample_epub(temp_dir.path(), "book.epub")?;
    let output = temp_dir.path().join("out.epub");
    let batch = sample_batch("chapter1", 0, &["Hello", "World"]);

    {
        let store = CheckpointStore::open(&input, &output)?;
        let done = BatchStatus { translation_completed: true, ..BatchStatus::pending(&batch) };
        assert!(store.save_batch_status(&done));
        assert!(store.save_batch_output(&BatchOutput {
            batch_key: batch.key(),
            source_hash: batch.source_hash(),
            translations: vec!["Bonjour".to_string(), "Monde".to_string()],
        }));
        assert!(store.save_batch_info(&ItemBatchInfo::new("chapter1", "OEBPS/text/chapter1.xhtml", vec![batch.clone()])));
        store.update_phase(PhaseUpdate::LocalStep { step: LocalStep::Parsing, completed: true });
    }

    let store = CheckpointStore::open(&input, &output)?;
    let status = store.load_batch_status(&batch.key()).expect("batch status");
    assert!(status.is_done_for(&batch));
    assert!(!status.is_done_for(&sample_batch("chapter1", 0, &["Hello", "Changed"])));
    assert_eq!(store.load_batch_output(&batch.key()).expect("batch output").translations, vec!["Bonjour", "Monde"]);
    assert_eq!(store.load_batch_info("chapter1").expect("batch info").batches, vec![batch]);
    assert!(store.is_step_completed(LocalStep::Parsing));
    Ok(())
}

/// Clearing drops the records and resets the state
#[test]
fn test_clear_withSavedRecords_shouldForgetThem() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_sample_epub(temp_dir.path(), "book.epub")?;
    let store = CheckpointStore::open(&input, temp_dir.path().join("out.epub"))?;
    let batch = sample_batch("chapter2", 1, &["Text"]);
    store.save_batch_status(&BatchStatus::pending(&batch));
    store.update_phase(PhaseUpdate::LocalStep { step: LocalStep::Parsing, completed: true });

    assert!(store.clear());

    assert!(store.load_batch_status(&batch.key()).is_none());
    assert!(!store.is_step_completed(LocalStep::Parsing));
    let saved = CheckpointStore::read_status(store.workdir())?.expect("state after clear");
    assert!(!saved.local_processing.parsing_completed);
    Ok(())
}

/// No status file means no state
#[test]
fn test_read_status_withEmptyWorkdir_shouldReturnNone() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let workdir = WorkDir::new(temp_dir.path().join("nothing_workdir"));
    assert!(CheckpointStore::read_status(&workdir)?.is_none());
    Ok(())
}
