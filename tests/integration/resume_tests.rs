/*!
 * Interrupted, repeated and forced runs
 */

use anyhow::Result;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use yaetwai::providers::mock::MockTranslator;
use yaetwai::{Config, JobOptions, Phase, TranslationJob};

use crate::common;

fn open_job(config: Config, input: &Path, mock: Arc<MockTranslator>, options: &JobOptions) -> Result<TranslationJob> {
    TranslationJob::open(config, input, None, mock, options)
}

/// Every `*_translated.json` batch output with its bytes
fn batch_outputs(dir: &Path) -> Result<BTreeMap<PathBuf, Vec<u8>>> {
    let mut outputs = BTreeMap::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.to_string_lossy().ends_with("_translated.json") {
            let data = fs::read(&path)?;
            outputs.insert(path, data);
        }
    }
    Ok(outputs)
}

fn status_for_output(output: &Path) -> PathBuf {
    PathBuf::from(output.to_string_lossy().replace("_translated.json", "_status.json"))
}

/// Only batches whose status was lost are sent again; finished ones are left alone
#[tokio::test]
async fn test_translate_withSomeStatusesMissing_shouldRedispatchOnlyThoseBatches() -> Result<()> {
    common::init_test_logging();
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_sample_epub(temp_dir.path(), "book.epub")?;

    let first = open_job(common::test_config("fr"), &input, Arc::new(MockTranslator::working()), &JobOptions::default())?;
    let first_report = first.run(Phase::All).await?.expect("translation report");
    let total = first.status().translation.batches_total;
    assert_eq!(first_report.batches_dispatched, total);
    let first_book = fs::read(first.output())?;
    let batches_dir = first.workdir().checkpoint_batches_dir();
    drop(first);

    let before = batch_outputs(&batches_dir)?;
    assert_eq!(before.len(), total);
    let lost: Vec<PathBuf> = before.keys().take(2).map(|p| status_for_output(p)).collect();
    for status in &lost {
        fs::remove_file(status)?;
    }

    let mock = Arc::new(MockTranslator::working());
    let second = open_job(common::test_config("fr"), &input, mock.clone(), &JobOptions::default())?;
    let report = second.run(Phase::Translate).await?.expect("translation report");

    assert_eq!(report.batches_dispatched, 2);
    assert_eq!(report.batches_reused, total - 2);
    // two batch calls plus title and description
    assert_eq!(mock.request_count(), 4);

    let after = batch_outputs(&batches_dir)?;
    for (path, data) in &before {
        if !lost.contains(&status_for_output(path)) {
            assert_eq!(after.get(path), Some(data), "finished batch output was rewritten: {:?}", path);
        }
    }
    for status in &lost {
        assert!(status.exists());
    }
    assert_eq!(fs::read(second.output())?, first_book);

    Ok(())
}

/// A run cut short keeps its finished batches; the next run only sends the rest
#[tokio::test(start_paused = true)]
async fn test_translate_afterInterruptAndFlush_shouldResumeWithFinishedBatches() -> Result<()> {
    common::init_test_logging();
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_sample_epub(temp_dir.path(), "book.epub")?;

    // two workers, 50ms per call: the first two batches are done when the run is cut at 60ms
    let first = open_job(common::test_config("fr"), &input, Arc::new(MockTranslator::slow(50)), &JobOptions::default())?;
    let cut = tokio::time::timeout(Duration::from_millis(60), first.run(Phase::Translate)).await;
    assert!(cut.is_err());
    first.flush();
    let total = first.status().translation.batches_total;
    let done = first.status().translation.batches_completed;
    assert!(done > 0 && done < total, "{} of {} batches done", done, total);
    assert!(!first.output().exists());
    drop(first);

    let mock = Arc::new(MockTranslator::working());
    let second = open_job(common::test_config("fr"), &input, mock.clone(), &JobOptions::default())?;
    assert_eq!(second.status().translation.batches_completed, done);
    let report = second.run(Phase::Translate).await?.expect("translation report");

    assert_eq!(report.batches_reused, done);
    assert_eq!(report.batches_dispatched + report.batches_reused, total);
    // batch calls for the rest plus title and description
    assert_eq!(mock.request_count(), total - done + 2);
    assert!(second.status().is_finished());
    let chapter2 = String::from_utf8(common::read_zip_entry(second.output(), "OEBPS/text/chapter2.xhtml")?)?;
    assert!(chapter2.contains("[fr] The light never failed while he was there."));

    Ok(())
}

/// With a save interval of one entry the cache is on disk before the run ends
#[tokio::test(start_paused = true)]
async fn test_translate_withCacheSaveIntervalOne_shouldSaveCacheBeforeFinishing() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_sample_epub(temp_dir.path(), "book.epub")?;
    let mut config = common::test_config("fr");
    config.processing.cache_translations = true;
    config.processing.cache_save_interval = 1;

    let job = open_job(config, &input, Arc::new(MockTranslator::slow(50)), &JobOptions::default())?;
    let cache_file = job.workdir().cache_file();
    assert!(!cache_file.exists());

    let cut = tokio::time::timeout(Duration::from_millis(60), job.run(Phase::Translate)).await;
    assert!(cut.is_err());
    assert!(!job.output().exists());

    // no flush: the file was written after a finished batch
    assert!(cache_file.exists());
    let cache: serde_json::Value = serde_json::from_slice(&fs::read(&cache_file)?)?;
    assert!(cache.to_string().contains("[fr] "), "cache holds no translation: {}", cache);

    Ok(())
}

/// A finished book is rebuilt from the checkpoint without batch calls
#[tokio::test]
async fn test_run_all_withFinishedBook_shouldReuseEveryBatch() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_sample_epub(temp_dir.path(), "book.epub")?;

    let first = open_job(common::test_config("fr"), &input, Arc::new(MockTranslator::working()), &JobOptions::default())?;
    first.run(Phase::All).await?;
    let total = first.status().translation.batches_total;
    drop(first);

    let mock = Arc::new(MockTranslator::working());
    let second = open_job(common::test_config("fr"), &input, mock.clone(), &JobOptions::default())?;
    let report = second.run(Phase::All).await?.expect("translation report");

    assert_eq!(report.batches_dispatched, 0);
    assert_eq!(report.batches_reused, total);
    assert!(mock.requests().iter().all(|texts| texts.len() == 1));
    assert_eq!(second.status().translation.batches_completed, total);
    assert!(second.status().is_finished());

    Ok(())
}

/// `force` discards the checkpoint and translates everything again
#[tokio::test]
async fn test_run_all_withForce_shouldTranslateEverythingAgain() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_sample_epub(temp_dir.path(), "book.epub")?;

    let first = open_job(common::test_config("fr"), &input, Arc::new(MockTranslator::working()), &JobOptions::default())?;
    first.run(Phase::All).await?;
    let total = first.status().translation.batches_total;
    drop(first);

    let options = JobOptions { force: true, ..JobOptions::default() };
    let second = open_job(common::test_config("fr"), &input, Arc::new(MockTranslator::working()), &options)?;
    assert_eq!(second.status().translation.batches_completed, 0);
    let report = second.run(Phase::All).await?.expect("translation report");

    assert_eq!(report.batches_dispatched, total);
    assert_eq!(report.batches_reused, 0);

    Ok(())
}

/// Cached translations answer repeated batches without calling the translator
#[tokio::test]
async fn test_translate_withWarmCache_shouldNotCallTranslator() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_sample_epub(temp_dir.path(), "book.epub")?;
    let mut config = common::test_config("fr");
    config.processing.cache_translations = true;

    let first = open_job(config.clone(), &input, Arc::new(MockTranslator::working()), &JobOptions::default())?;
    first.run(Phase::All).await?;
    let first_book = fs::read(first.output())?;
    let cache_file = first.workdir().cache_file();
    let batches_dir = first.workdir().checkpoint_batches_dir();
    drop(first);
    assert!(cache_file.exists());

    for status in common::status_files(&batches_dir)? {
        fs::remove_file(status)?;
    }

    let mock = Arc::new(MockTranslator::working());
    let second = open_job(config, &input, mock.clone(), &JobOptions::default())?;
    let report = second.run(Phase::Translate).await?.expect("translation report");

    assert!(report.batches_dispatched > 0);
    assert_eq!(mock.request_count(), 0);
    assert!(report.stats.cache_hits > 0);
    assert_eq!(report.stats.external_calls, 0);
    assert_eq!(fs::read(second.output())?, first_book);

    Ok(())
}

/// A changed input invalidates the old checkpoint
#[tokio::test]
async fn test_open_withChangedInput_shouldStartFresh() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_sample_epub(temp_dir.path(), "book.epub")?;

    let first = open_job(common::test_config("fr"), &input, Arc::new(MockTranslator::working()), &JobOptions::default())?;
    first.run(Phase::All).await?;
    let old_hash = first.status().source_file_hash;
    drop(first);

    let edited = common::CHAPTER2_XHTML.replace("every evening", "every single evening");
    common::write_epub(
        &input,
        &[
            ("META-INF/container.xml", common::CONTAINER_XML),
            ("OEBPS/content.opf", common::CONTENT_OPF),
            ("OEBPS/nav.xhtml", common::NAV_XHTML),
            ("OEBPS/text/chapter1.xhtml", common::CHAPTER1_XHTML),
            ("OEBPS/text/chapter2.xhtml", edited.as_str()),
            ("OEBPS/text/index.xhtml", common::INDEX_XHTML),
            ("OEBPS/style.css", common::STYLE_CSS),
        ],
    )?;

    let mock = Arc::new(MockTranslator::working());
    let second = open_job(common::test_config("fr"), &input, mock.clone(), &JobOptions::default())?;
    let state = second.status();
    assert_ne!(state.source_file_hash, old_hash);
    assert!(!state.local_processing.batch_division_completed);
    assert_eq!(state.translation.batches_completed, 0);

    let report = second.run(Phase::All).await?.expect("translation report");
    assert_eq!(report.batches_reused, 0);
    let chapter2 = String::from_utf8(common::read_zip_entry(second.output(), "OEBPS/text/chapter2.xhtml")?)?;
    assert!(chapter2.contains("[fr] The keeper climbed the stairs every single evening."));

    Ok(())
}

/// Deleted batch mirrors force the division step to run again on open
#[tokio::test]
async fn test_open_withMissingBatchArtifacts_shouldRedoDivision() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_sample_epub(temp_dir.path(), "book.epub")?;

    let first = open_job(common::test_config("fr"), &input, Arc::new(MockTranslator::working()), &JobOptions::default())?;
    let summary = first.prepare()?;
    let batches_dir = first.workdir().batches_dir();
    drop(first);
    fs::remove_dir_all(&batches_dir)?;

    let second = open_job(common::test_config("fr"), &input, Arc::new(MockTranslator::working()), &JobOptions::default())?;
    assert!(!second.status().local_processing.batch_division_completed);
    assert!(second.status().local_processing.parsing_completed);

    let again = second.prepare()?;
    assert_eq!(again, summary);
    assert!(second.status().local_processing.batch_division_completed);
    assert!(batches_dir.exists());

    Ok(())
}
