/*!
 * Tests for reading and writing EPUB files
 */

use anyhow::Result;
use std::collections::HashMap;

use yaetwai::epub::{EpubBook, MetadataUpdate, TocEntry};

use crate::common;

/// Spine items come first, other content documents after them
#[test]
fn test_open_withSampleBook_shouldListItemsInReadingOrder() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_sample_epub(temp_dir.path(), "book.epub")?;

    let book = EpubBook::open(&input)?;

    let ids: Vec<&str> = book.items().iter().map(|item| item.id.as_str()).collect();
    assert_eq!(ids, vec!["chapter1", "chapter2", "index", "nav"]);
    let chapter1 = book.item("chapter1").expect("chapter1");
    assert_eq!(chapter1.name, "OEBPS/text/chapter1.xhtml");
    assert_eq!(chapter1.content, common::CHAPTER1_XHTML.as_bytes());
    assert!(book.item("css").is_none());
    Ok(())
}

/// Metadata and the navigation document are read
#[test]
fn test_open_withSampleBook_shouldReadMetadataAndToc() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_sample_epub(temp_dir.path(), "book.epub")?;

    let book = EpubBook::open(&input)?;

    assert_eq!(book.metadata().first_title(), Some(common::BOOK_TITLE));
    assert_eq!(book.metadata().first_description(), Some(common::BOOK_DESCRIPTION));
    let toc = book.toc();
    assert_eq!(TocEntry::count(&toc), 3);
    assert_eq!(toc[0].title, "Chapter 1: Overview");
    assert_eq!(toc[0].href, "OEBPS/text/chapter1.xhtml");
    assert_eq!(TocEntry::render_outline(&toc), "Chapter 1: Overview\nChapter Two\nIndex");
    Ok(())
}

/// A file that is not a zip archive is an error
#[test]
fn test_open_withPlainTextFile_shouldFail() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_test_file(temp_dir.path(), "broken.epub", "not a zip")?;

    assert!(EpubBook::open(&input).is_err());
    Ok(())
}

/// A zip without container.xml is not a book
#[test]
fn test_open_withoutContainer_shouldFail() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::write_epub(&temp_dir.path().join("bare.epub"), &[("OEBPS/content.opf", common::CONTENT_OPF)])?;

    assert!(EpubBook::open(&input).is_err());
    Ok(())
}

/// Replaced items and metadata are written, everything else is kept
#[test]
fn test_write_withReplacement_shouldUpdateOnlyThatItem() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_sample_epub(temp_dir.path(), "book.epub")?;
    let output = temp_dir.path().join("copy.epub");
    let book = EpubBook::open(&input)?;

    let new_chapter = common::CHAPTER2_XHTML.replace("Chapter Two", "Chapitre deux");
    let replacements = HashMap::from([("chapter2".to_string(), new_chapter.clone().into_bytes())]);
    let update = MetadataUpdate {
        title: Some("Le gardien du phare".to_string()),
        description: None,
        language: Some("fr".to_string()),
    };
    book.write(&output, &replacements, &update)?;

    let names = common::zip_entry_names(&output)?;
    assert_eq!(names[0], "mimetype");
    let copy = EpubBook::open(&output)?;
    assert_eq!(copy.item("chapter2").expect("chapter2").content, new_chapter.as_bytes());
    assert_eq!(copy.item("chapter1").expect("chapter1").content, common::CHAPTER1_XHTML.as_bytes());
    assert_eq!(copy.metadata().first_title(), Some("Le gardien du phare"));
    assert_eq!(copy.metadata().first_description(), Some(common::BOOK_DESCRIPTION));
    assert_eq!(copy.metadata().language[0].value, "fr");
    Ok(())
}
