/*!
 * Tests for file utility functions
 */

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use yaetwai::file_utils::FileManager;

use crate::common;

/// Test that file_exists returns true for existing files
#[test]
fn test_file_exists_withExistingFile_shouldReturnTrue() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let test_file = common::create_test_file(temp_dir.path(), "test_file_exists.tmp", "test content")?;

    assert!(FileManager::file_exists(&test_file));
    Ok(())
}

/// Test that file_exists returns false for non-existent files and directories
#[test]
fn test_file_exists_withMissingFileOrDir_shouldReturnFalse() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    assert!(!FileManager::file_exists("non_existent_file.tmp"));
    assert!(!FileManager::file_exists(temp_dir.path()));
    Ok(())
}

/// Test that ensure_dir creates nested directories
#[test]
fn test_ensure_dir_withNonExistentDir_shouldCreateDirectory() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let nested = temp_dir.path().join("a").join("b");

    FileManager::ensure_dir(&nested)?;

    assert!(FileManager::dir_exists(&nested));
    assert!(!FileManager::dir_has_entries(&nested));
    assert!(FileManager::dir_has_entries(temp_dir.path()));
    Ok(())
}

/// Only files with the wanted extension are found, sorted, in subfolders too
#[test]
fn test_find_files_withMixedExtensions_shouldReturnSortedMatches() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let sub = temp_dir.path().join("sub");
    fs::create_dir_all(&sub)?;
    common::create_test_file(temp_dir.path(), "b.epub", "")?;
    common::create_test_file(temp_dir.path(), "notes.txt", "")?;
    common::create_test_file(&sub, "a.EPUB", "")?;

    let found = FileManager::find_files(temp_dir.path(), ".epub")?;

    let expected: Vec<PathBuf> = vec![temp_dir.path().join("b.epub"), sub.join("a.EPUB")];
    let mut expected_sorted = expected.clone();
    expected_sorted.sort();
    assert_eq!(found, expected_sorted);
    Ok(())
}

/// The default output sits next to the input with a `translated_` prefix
#[test]
fn test_generate_output_path_withValidInput_shouldCreateCorrectPath() {
    let output_path = FileManager::generate_output_path(Path::new("/tmp/input/novel.epub"));
    assert_eq!(output_path, Path::new("/tmp/input/translated_novel.epub"));
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Record {
    name: String,
    count: usize,
}

/// JSON written atomically reads back to the same value
#[test]
fn test_write_json_atomic_withRecord_shouldReadBack() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = temp_dir.path().join("records").join("record.json");
    let record = Record { name: "chapter1".to_string(), count: 3 };

    FileManager::write_json_atomic(&path, &record)?;
    let loaded: Record = FileManager::read_json(&path)?;

    assert_eq!(loaded, record);
    Ok(())
}

/// Hashes depend on content only
#[test]
fn test_hash_file_withSameAndDifferentContent_shouldCompareByContent() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let a = common::create_test_file(temp_dir.path(), "a.txt", "same")?;
    let b = common::create_test_file(temp_dir.path(), "b.txt", "same")?;
    let c = common::create_test_file(temp_dir.path(), "c.txt", "other")?;

    let hash_a = FileManager::hash_file(&a)?;
    assert_eq!(hash_a.len(), 64);
    assert_eq!(hash_a, FileManager::hash_file(&b)?);
    assert_ne!(hash_a, FileManager::hash_file(&c)?);
    Ok(())
}

/// read_to_string reports missing files as errors
#[test]
fn test_read_to_string_withMissingFile_shouldFail() {
    assert!(FileManager::read_to_string("definitely_missing_file.txt").is_err());
}
