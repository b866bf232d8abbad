/*!
 * End-to-end tests: sample book in, translated book out
 */

use anyhow::Result;
use std::sync::Arc;

use yaetwai::providers::mock::MockTranslator;
use yaetwai::{Controller, JobOptions, Phase, TranslationJob};

use crate::common;

fn read_entry_string(path: &std::path::Path, name: &str) -> Result<String> {
    Ok(String::from_utf8(common::read_zip_entry(path, name)?)?)
}

/// The whole pipeline writes a valid book next to the input
#[tokio::test]
async fn test_run_all_withWorkingTranslator_shouldWriteTranslatedBook() -> Result<()> {
    common::init_test_logging();
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_sample_epub(temp_dir.path(), "book.epub")?;
    let controller = Controller::with_translator(common::test_config("fr"), Arc::new(MockTranslator::working()))?;

    controller.run(Phase::All, &input, None, &JobOptions::default()).await?;

    let output = temp_dir.path().join("translated_book.epub");
    assert!(output.exists());

    let names = common::zip_entry_names(&output)?;
    assert_eq!(names[0], "mimetype");
    assert_eq!(common::read_zip_entry(&output, "mimetype")?, b"application/epub+zip");
    assert_eq!(names.len(), 8);

    let chapter2 = read_entry_string(&output, "OEBPS/text/chapter2.xhtml")?;
    assert!(chapter2.contains("<h2>[fr] Chapter Two</h2>"));
    assert!(chapter2.contains("<p>[fr] The keeper climbed the stairs every evening.</p>"));
    assert!(chapter2.contains("<pre><code>let lamp = Lamp::new();</code></pre>"));
    assert!(chapter2.contains("<head><title>Chapter Two</title></head>"));

    let opf = read_entry_string(&output, "OEBPS/content.opf")?;
    assert!(opf.contains(&format!("<dc:title>[fr] {}</dc:title>", common::BOOK_TITLE)));
    assert!(opf.contains(&format!("<dc:description>[fr] {}</dc:description>", common::BOOK_DESCRIPTION)));
    assert!(opf.contains("<dc:language>fr</dc:language>"));

    Ok(())
}

/// Items without translatable segments are copied byte for byte
#[tokio::test]
async fn test_run_all_withIndexItem_shouldKeepBytesIdentical() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_sample_epub(temp_dir.path(), "book.epub")?;
    let output = temp_dir.path().join("out").join("book_fr.epub");
    let controller = Controller::with_translator(common::test_config("fr"), Arc::new(MockTranslator::working()))?;

    controller.run(Phase::All, &input, Some(&output), &JobOptions::default()).await?;

    assert_eq!(common::read_zip_entry(&output, "OEBPS/text/index.xhtml")?, common::INDEX_XHTML.as_bytes());
    assert_eq!(common::read_zip_entry(&output, "OEBPS/style.css")?, common::STYLE_CSS.as_bytes());
    assert_eq!(common::read_zip_entry(&output, "META-INF/container.xml")?, common::CONTAINER_XML.as_bytes());

    Ok(())
}

/// Heading, paragraph and alt text land in one batch and go back to their places
#[tokio::test]
async fn test_translate_withHeadingParagraphAndAlt_shouldReplaceAtAnchors() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_sample_epub(temp_dir.path(), "book.epub")?;
    let mut config = common::test_config("zh-CN");
    config.processing.batch_size = 10;
    let mock = MockTranslator::working().with_translations(&[
        ("Chapter 1: Overview", "第一章：概述"),
        ("This is a test. It has two sentences.", "这是一个测试。它有两句话。"),
        ("A diagram", "一个图表"),
    ]);
    let job = TranslationJob::open(config, &input, None, Arc::new(mock), &JobOptions::default())?;

    job.prepare()?;
    let info = job.context().load_batch_info("chapter1").expect("batch info of chapter1");
    assert_eq!(info.batch_count, 1);
    assert_eq!(info.batches[0].texts(), common::CHAPTER1_TEXTS.map(String::from).to_vec());

    job.translate().await?;

    let chapter1 = read_entry_string(job.output(), "OEBPS/text/chapter1.xhtml")?;
    let expected = common::CHAPTER1_XHTML
        .replace("<h1>Chapter 1: Overview</h1>", "<h1>第一章：概述</h1>")
        .replace(
            "<p>This is a test. It has two sentences.</p>",
            "<p>这是一个测试。它有两句话。</p>",
        )
        .replace("alt=\"A diagram\"", "alt=\"一个图表\"");
    assert_eq!(chapter1, expected);

    Ok(())
}

/// Inline markup inside a paragraph survives translation
#[tokio::test]
async fn test_translate_withInlineMarkup_shouldKeepMarkupAndTranslateOnce() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_sample_epub(temp_dir.path(), "book.epub")?;
    let mock = Arc::new(MockTranslator::working());
    let job = TranslationJob::open(common::test_config("fr"), &input, None, mock.clone(), &JobOptions::default())?;

    job.run(Phase::All).await?;

    let sent: Vec<String> = mock.requests().into_iter().flatten().collect();
    assert!(sent.contains(&"Ships passed far out at sea, never stopping.".to_string()));
    let chapter2 = read_entry_string(job.output(), "OEBPS/text/chapter2.xhtml")?;
    assert!(chapter2.contains("<em>"));
    assert!(chapter2.contains("[fr] Ships passed far out at sea, never stopping."));

    Ok(())
}

/// Preparation makes no translator calls and fills the batch totals
#[tokio::test]
async fn test_prepare_withSampleBook_shouldRecordBatchesWithoutCalls() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_sample_epub(temp_dir.path(), "book.epub")?;
    let mock = Arc::new(MockTranslator::working());
    let job = TranslationJob::open(common::test_config("fr"), &input, None, mock.clone(), &JobOptions::default())?;

    let summary = job.prepare()?;

    assert_eq!(mock.request_count(), 0);
    assert_eq!(summary.items, 4);
    assert!(summary.batches >= 5);
    let state = job.status();
    assert!(state.local_processing.translation_preparation_completed);
    assert_eq!(state.translation.batches_total, summary.batches);
    assert_eq!(state.translation.total_chars, summary.chars);
    assert!(state.total_progress < 100.0);

    let workdir = job.workdir();
    assert!(workdir.status_file().exists());
    assert_eq!(common::status_files(&workdir.checkpoint_batches_dir())?.len(), summary.batches);
    assert!(workdir.html_items_dir().join("chapter1").join("original.html").exists());
    assert!(workdir.root().join("preparation_completed.done").exists());

    Ok(())
}

/// Progress only moves forward across the phases and ends at 100
#[tokio::test]
async fn test_run_phases_withSampleBook_shouldReportMonotonicProgress() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_sample_epub(temp_dir.path(), "book.epub")?;
    let job = TranslationJob::open(
        common::test_config("fr"),
        &input,
        None,
        Arc::new(MockTranslator::working()),
        &JobOptions::default(),
    )?;

    let mut seen = vec![job.status().total_progress];
    job.prepare()?;
    seen.push(job.status().total_progress);
    job.extract_terminology().await?;
    seen.push(job.status().total_progress);
    job.translate().await?;
    seen.push(job.status().total_progress);

    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "progress went backwards: {:?}", seen);
    assert!((seen[seen.len() - 1] - 100.0).abs() < 1e-6);
    assert!(job.status().is_finished());

    Ok(())
}

/// Terminology from the model is stored and handed to the translator
#[tokio::test]
async fn test_run_all_withTerminology_shouldSaveAndPreserveTerms() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_sample_epub(temp_dir.path(), "book.epub")?;
    let mut config = common::test_config("fr");
    config.processing.use_terminology = true;
    let reply = r#"{"domain_analysis": "fiction", "terms": [
        {"term": "Fresnel lens", "preserve": true, "reason": "proper name"},
        {"term": "keeper", "preserve": false, "reason": "common word"}
    ]}"#;
    let mock = Arc::new(MockTranslator::working().with_system_reply(reply));
    let job = TranslationJob::open(config, &input, None, mock.clone(), &JobOptions::default())?;

    job.run(Phase::All).await?;

    assert_eq!(mock.preserved_terms(), vec!["Fresnel lens".to_string()]);
    let state = job.status();
    assert!(state.terminology.completed);
    assert_eq!(state.terminology.terms_count, 2);
    assert!(state.local_processing.term_protection_completed);
    assert!(job.workdir().terminology_dir().join("final_terminology.json").exists());

    Ok(())
}

/// A translator that never answers leaves the source text and unfinished batches
#[tokio::test]
async fn test_run_all_withFailingTranslator_shouldKeepSourceAndLeaveBatchesOpen() -> Result<()> {
    common::init_test_logging();
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_sample_epub(temp_dir.path(), "book.epub")?;
    let job = TranslationJob::open(
        common::test_config("fr"),
        &input,
        None,
        Arc::new(MockTranslator::failing()),
        &JobOptions::default(),
    )?;

    let report = job.run(Phase::All).await?.expect("translation report");

    assert!(report.stats.degraded > 0);
    let state = job.status();
    assert_eq!(state.translation.batches_completed, 0);
    assert!(state.translation.completed_batches.is_empty());
    let chapter2 = read_entry_string(job.output(), "OEBPS/text/chapter2.xhtml")?;
    assert!(chapter2.contains("<p>The keeper climbed the stairs every evening.</p>"));

    Ok(())
}

/// Multi-text calls that fail are retried one text at a time
#[tokio::test]
async fn test_run_all_withFailingBatchCalls_shouldFallBackToSingleTexts() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_sample_epub(temp_dir.path(), "book.epub")?;
    let job = TranslationJob::open(
        common::test_config("fr"),
        &input,
        None,
        Arc::new(MockTranslator::fail_batches()),
        &JobOptions::default(),
    )?;

    let report = job.run(Phase::All).await?.expect("translation report");

    assert_eq!(report.stats.degraded, 0);
    assert_eq!(job.status().translation.batches_completed, report.batches_dispatched);
    let chapter2 = read_entry_string(job.output(), "OEBPS/text/chapter2.xhtml")?;
    assert!(chapter2.contains("<p>[fr] In winter the storms came from the north.</p>"));

    Ok(())
}

/// Without a checkpoint the book is still translated and no state file is written
#[tokio::test]
async fn test_run_all_withoutCheckpoint_shouldNotWriteStatus() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_sample_epub(temp_dir.path(), "book.epub")?;
    let options = JobOptions { use_checkpoint: false, ..JobOptions::default() };
    let job = TranslationJob::open(
        common::test_config("fr"),
        &input,
        None,
        Arc::new(MockTranslator::working()),
        &options,
    )?;

    job.run(Phase::All).await?;

    assert!(job.output().exists());
    assert!(!job.workdir().status_file().exists());
    assert!(job.status().is_finished());

    Ok(())
}
