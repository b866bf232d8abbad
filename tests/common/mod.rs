/*!
 * Common test utilities for the yaetwai test suite
 */

use anyhow::Result;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use yaetwai::app_config::{Config, TranslationProvider};

pub const BOOK_TITLE: &str = "The Lighthouse Keeper";
pub const BOOK_DESCRIPTION: &str = "A short story about a lighthouse.";

pub const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#;

pub const CONTENT_OPF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="bookid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="bookid">urn:uuid:5b1c3f52-0000-4000-8000-000000000001</dc:identifier>
    <dc:title>The Lighthouse Keeper</dc:title>
    <dc:language>en</dc:language>
    <dc:creator>Test Author</dc:creator>
    <dc:description>A short story about a lighthouse.</dc:description>
  </metadata>
  <manifest>
    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
    <item id="chapter1" href="text/chapter1.xhtml" media-type="application/xhtml+xml"/>
    <item id="chapter2" href="text/chapter2.xhtml" media-type="application/xhtml+xml"/>
    <item id="index" href="text/index.xhtml" media-type="application/xhtml+xml"/>
    <item id="css" href="style.css" media-type="text/css"/>
  </manifest>
  <spine>
    <itemref idref="chapter1"/>
    <itemref idref="chapter2"/>
    <itemref idref="index"/>
  </spine>
</package>
"#;

pub const NAV_XHTML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head><title>Contents</title></head>
<body>
<nav epub:type="toc">
<ol>
<li><a href="text/chapter1.xhtml">Chapter 1: Overview</a></li>
<li><a href="text/chapter2.xhtml">Chapter Two</a></li>
<li><a href="text/index.xhtml">Index</a></li>
</ol>
</nav>
</body>
</html>
"#;

pub const CHAPTER1_XHTML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>Chapter 1: Overview</title><link rel="stylesheet" href="../style.css"/></head>
<body>
<h1>Chapter 1: Overview</h1>
<p>This is a test. It has two sentences.</p>
<img src="../images/diagram.png" alt="A diagram"/>
</body>
</html>
"#;

pub const CHAPTER2_XHTML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>Chapter Two</title></head>
<body>
<h2>Chapter Two</h2>
<p>The keeper climbed the stairs every evening.</p>
<p>He trimmed the wick and polished the great lens.</p>
<p>Ships passed far out at sea, <em>never</em> stopping.</p>
<p>In winter the storms came from the north.</p>
<p>The light never failed while he was there.</p>
<pre><code>let lamp = Lamp::new();</code></pre>
</body>
</html>
"#;

pub const INDEX_XHTML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>Index</title></head>
<body>
<h1>Index</h1>
<p>Fresnel lens, 12</p>
<p>Keeper, 3, 7</p>
</body>
</html>
"#;

pub const CHAPTER1_TEXTS: [&str; 3] = ["Chapter 1: Overview", "This is a test. It has two sentences.", "A diagram"];

pub const STYLE_CSS: &str = "body { font-family: serif; }\n";

/// Route library logs through the test harness; `RUST_LOG=debug` shows them
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test file with the given content in the specified directory
pub fn create_test_file(dir: &Path, filename: &str, content: &str) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    fs::write(&file_path, content)?;
    Ok(file_path)
}

/// Write an EPUB with the given entries; `mimetype` comes first and stored
pub fn write_epub(path: &Path, entries: &[(&str, &str)]) -> Result<PathBuf> {
    let file = File::create(path)?;
    let mut zip = ZipWriter::new(file);
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file("mimetype", stored)?;
    zip.write_all(b"application/epub+zip")?;
    for (name, content) in entries {
        zip.start_file(*name, deflated)?;
        zip.write_all(content.as_bytes())?;
    }
    zip.finish()?;
    Ok(path.to_path_buf())
}

/// The sample book: two chapters, a navigation document and an index page
pub fn create_sample_epub(dir: &Path, filename: &str) -> Result<PathBuf> {
    write_epub(
        &dir.join(filename),
        &[
            ("META-INF/container.xml", CONTAINER_XML),
            ("OEBPS/content.opf", CONTENT_OPF),
            ("OEBPS/nav.xhtml", NAV_XHTML),
            ("OEBPS/text/chapter1.xhtml", CHAPTER1_XHTML),
            ("OEBPS/text/chapter2.xhtml", CHAPTER2_XHTML),
            ("OEBPS/text/index.xhtml", INDEX_XHTML),
            ("OEBPS/style.css", STYLE_CSS),
        ],
    )
}

/// Configuration for pipeline tests: no rate limit, no waiting between retries,
/// small batches, no terminology call and no cache unless a test turns them on
pub fn test_config(target_language: &str) -> Config {
    let mut config = Config::default();
    config.source_language = "en".to_string();
    config.target_language = target_language.to_string();
    config.translation.provider = TranslationProvider::LMStudio;
    for provider in &mut config.translation.available_providers {
        provider.rate_limit = None;
    }
    config.translation.common.retry_count = 0;
    config.translation.common.retry_backoff_ms = 1;
    config.processing.batch_size = 2;
    config.processing.max_workers = 2;
    config.processing.cache_translations = false;
    config.processing.use_terminology = false;
    config
}

/// Read one entry of a zip archive
pub fn read_zip_entry(path: &Path, name: &str) -> Result<Vec<u8>> {
    let mut archive = zip::ZipArchive::new(File::open(path)?)?;
    let mut entry = archive.by_name(name)?;
    let mut data = Vec::new();
    std::io::Read::read_to_end(&mut entry, &mut data)?;
    Ok(data)
}

/// Names of a zip archive's entries, in archive order
pub fn zip_entry_names(path: &Path) -> Result<Vec<String>> {
    let mut archive = zip::ZipArchive::new(File::open(path)?)?;
    let mut names = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        names.push(archive.by_index(i)?.name().to_string());
    }
    Ok(names)
}

/// Batch status files in a checkpoint directory, sorted
pub fn status_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.to_string_lossy().ends_with("_status.json"))
        .collect();
    files.sort();
    Ok(files)
}
