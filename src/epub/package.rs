/*!
 * Zip-level access to an EPUB file.
 *
 * Entries are read fully into memory and written back in their original order
 * with their original compression and timestamps, except that `mimetype` is
 * always first and stored, as OCF requires.
 */

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::errors::EpubError;

#[derive(Debug, Clone)]
pub struct ZipEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub compression: CompressionMethod,
    pub last_modified: zip::DateTime,
    pub unix_mode: Option<u32>,
    pub is_dir: bool,
}

#[derive(Debug, Clone, Default)]
pub struct EpubPackage {
    pub entries: Vec<ZipEntry>,
}

impl EpubPackage {
    pub fn read(path: &Path) -> Result<Self, EpubError> {
        let file = File::open(path)?;
        let mut zip = ZipArchive::new(file)?;
        let mut entries = Vec::with_capacity(zip.len());
        for i in 0..zip.len() {
            let mut file = zip.by_index(i)?;
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)?;
            entries.push(ZipEntry {
                name: file.name().to_string(),
                data,
                compression: file.compression(),
                last_modified: file.last_modified().unwrap_or_default(),
                unix_mode: file.unix_mode(),
                is_dir: file.is_dir(),
            });
        }
        Ok(Self { entries })
    }

    /// Look an entry up by its archive path
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.data.as_slice())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    pub fn write_with_replacements(
        &self,
        output_path: &Path,
        replacements: &HashMap<String, Vec<u8>>,
    ) -> Result<(), EpubError> {
        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(output_path)?;
        let mut zout = ZipWriter::new(file);

        let ordered = self
            .entries
            .iter()
            .filter(|e| e.name == "mimetype")
            .chain(self.entries.iter().filter(|e| e.name != "mimetype"));

        for entry in ordered {
            let data = replacements.get(&entry.name).unwrap_or(&entry.data);
            let compression = if entry.name == "mimetype" {
                CompressionMethod::Stored
            } else {
                entry.compression
            };
            let mut options = SimpleFileOptions::default()
                .compression_method(compression)
                .last_modified_time(entry.last_modified);
            if let Some(mode) = entry.unix_mode {
                options = options.unix_permissions(mode);
            }
            if entry.is_dir || entry.name.ends_with('/') {
                zout.add_directory(entry.name.as_str(), options)?;
            } else {
                zout.start_file(entry.name.as_str(), options)?;
                zout.write_all(data)?;
            }
        }
        zout.finish()?;
        Ok(())
    }
}
