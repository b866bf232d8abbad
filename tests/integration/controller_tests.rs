/*!
 * Controller tests: status, clear and folder runs
 */

use anyhow::Result;
use std::fs;
use std::sync::Arc;

use yaetwai::app_controller::describe_status;
use yaetwai::providers::mock::MockTranslator;
use yaetwai::{Controller, JobOptions, Phase};

use crate::common;

fn controller(mock: Arc<MockTranslator>) -> Result<Controller> {
    Controller::with_translator(common::test_config("fr"), mock)
}

/// Status is empty before the first run and finished after it
#[tokio::test]
async fn test_status_beforeAndAfterRun_shouldReflectCheckpoint() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_sample_epub(temp_dir.path(), "book.epub")?;
    let controller = controller(Arc::new(MockTranslator::working()))?;

    assert!(controller.status(&input)?.is_none());

    controller.run(Phase::All, &input, None, &JobOptions::default()).await?;

    let state = controller.status(&input)?.expect("checkpoint after a run");
    assert!(state.is_finished());
    assert_eq!(state.translation.batches_completed, state.translation.batches_total);
    assert!(describe_status(&state).starts_with("100.0%"));

    Ok(())
}

/// Clearing wipes batch records and done markers but keeps the working directory
#[tokio::test]
async fn test_clear_afterRun_shouldResetCheckpoint() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_sample_epub(temp_dir.path(), "book.epub")?;
    let controller = controller(Arc::new(MockTranslator::working()))?;
    controller.run(Phase::All, &input, None, &JobOptions::default()).await?;
    let workdir = temp_dir.path().join("book_workdir");
    assert!(workdir.join("translation_completed.done").exists());

    controller.clear(&input, None)?;

    let state = controller.status(&input)?.expect("checkpoint after clear");
    assert!(!state.is_finished());
    assert_eq!(state.translation.batches_completed, 0);
    assert!(!state.local_processing.parsing_completed);
    assert!(!workdir.join("translation_completed.done").exists());
    assert!(common::status_files(&workdir.join("checkpoint").join("batches"))?.is_empty());

    Ok(())
}

/// Only the preparation phase runs: no translator calls, no output book
#[tokio::test]
async fn test_run_prepare_withSampleBook_shouldNotWriteOutput() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_sample_epub(temp_dir.path(), "book.epub")?;
    let mock = Arc::new(MockTranslator::working());
    let controller = controller(mock.clone())?;

    controller.run(Phase::Prepare, &input, None, &JobOptions::default()).await?;

    assert_eq!(mock.request_count(), 0);
    assert!(!temp_dir.path().join("translated_book.epub").exists());
    let state = controller.status(&input)?.expect("checkpoint after prepare");
    assert!(state.local_processing.translation_preparation_completed);
    assert!(state.translation.batches_total > 0);

    Ok(())
}

/// Every book of a folder is translated; earlier outputs are not picked up as inputs
#[tokio::test]
async fn test_run_folder_withTwoBooks_shouldTranslateEach() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    common::create_sample_epub(temp_dir.path(), "first.epub")?;
    common::create_sample_epub(temp_dir.path(), "second.epub")?;
    let controller = controller(Arc::new(MockTranslator::working()))?;

    controller.run(Phase::All, temp_dir.path(), None, &JobOptions::default()).await?;
    assert!(temp_dir.path().join("translated_first.epub").exists());
    assert!(temp_dir.path().join("translated_second.epub").exists());

    controller.run(Phase::All, temp_dir.path(), None, &JobOptions::default()).await?;
    let epubs = fs::read_dir(temp_dir.path())?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "epub"))
        .count();
    assert_eq!(epubs, 4);

    Ok(())
}

/// A folder run into an output folder keeps the `translated_` names there
#[tokio::test]
async fn test_run_folder_withOutputDir_shouldWriteIntoIt() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let books = temp_dir.path().join("books");
    let out = temp_dir.path().join("out");
    fs::create_dir_all(&books)?;
    common::create_sample_epub(&books, "story.epub")?;
    let controller = controller(Arc::new(MockTranslator::working()))?;

    controller.run(Phase::All, &books, Some(&out), &JobOptions::default()).await?;

    assert!(out.join("translated_story.epub").exists());
    assert!(!books.join("translated_story.epub").exists());

    Ok(())
}

/// Missing input is reported, not panicked on
#[test]
fn test_run_withMissingInput_shouldFail() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let controller = controller(Arc::new(MockTranslator::working()))?;
    let missing = temp_dir.path().join("missing.epub");

    let result = tokio_test::block_on(async {
        controller.run(Phase::All, &missing, None, &JobOptions::default()).await
    });

    assert!(result.is_err());
    Ok(())
}
