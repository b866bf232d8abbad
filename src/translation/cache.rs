/*!
 * Translation cache.
 *
 * Identical strings are translated once per language pair. The cache itself
 * does no locking; the dispatcher keeps it under the same lock as its
 * counters so that lookups and stores are never observed half done.
 *
 * On disk the cache is a JSON object of language pairs, each a map of
 * source text to translated text.
 */

use log::{debug, warn};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::Result;

use crate::file_utils::FileManager;

/// Cache key combining source text, source language, and target language
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    source_text: String,
    source_language: String,
    target_language: String,
}

impl CacheKey {
    fn new(source_text: &str, source_language: &str, target_language: &str) -> Self {
        Self {
            source_text: source_text.to_string(),
            source_language: source_language.to_string(),
            target_language: target_language.to_string(),
        }
    }

    fn pair(&self) -> String {
        language_pair(&self.source_language, &self.target_language)
    }
}

fn language_pair(source_language: &str, target_language: &str) -> String {
    format!("{}|{}", source_language, target_language)
}

type CacheFile = BTreeMap<String, BTreeMap<String, String>>;

/// In-memory translation cache with hit/miss accounting
#[derive(Debug, Default)]
pub struct TranslationCache {
    entries: HashMap<CacheKey, String>,
    hits: usize,
    misses: usize,
    unsaved: usize,
    enabled: bool,
}

impl TranslationCache {
    pub fn new(enabled: bool) -> Self {
        Self { enabled, ..Self::default() }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn get(&mut self, source_text: &str, source_language: &str, target_language: &str) -> Option<String> {
        if !self.enabled {
            return None;
        }
        let key = CacheKey::new(source_text, source_language, target_language);
        match self.entries.get(&key) {
            Some(translation) => {
                self.hits += 1;
                Some(translation.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn store(&mut self, source_text: &str, source_language: &str, target_language: &str, translation: &str) {
        if !self.enabled {
            return;
        }
        let key = CacheKey::new(source_text, source_language, target_language);
        if self.entries.insert(key, translation.to_string()).as_deref() != Some(translation) {
            self.unsaved += 1;
        }
    }

    /// (hits, misses, hit rate)
    pub fn stats(&self) -> (usize, usize, f64) {
        let total = self.hits + self.misses;
        let hit_rate = if total > 0 { self.hits as f64 / total as f64 } else { 0.0 };
        (self.hits, self.misses, hit_rate)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries stored since the last load or save
    pub fn unsaved(&self) -> usize {
        self.unsaved
    }

    /// Merge entries from a cache file. A missing file is not an error.
    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<usize> {
        let path = path.as_ref();
        if !FileManager::file_exists(path) {
            return Ok(0);
        }
        let file: CacheFile = FileManager::read_json(path)?;
        let mut loaded = 0;
        for (pair, entries) in file {
            let Some((source_language, target_language)) = pair.split_once('|') else {
                warn!("Ignoring cache section with malformed language pair '{}'", pair);
                continue;
            };
            for (source_text, translation) in entries {
                self.entries
                    .insert(CacheKey::new(&source_text, source_language, target_language), translation);
                loaded += 1;
            }
        }
        self.unsaved = 0;
        debug!("Loaded {} cached translations from {}", loaded, path.display());
        Ok(loaded)
    }

    pub fn save_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let mut file = CacheFile::new();
        for (key, translation) in &self.entries {
            file.entry(key.pair())
                .or_default()
                .insert(key.source_text.clone(), translation.clone());
        }
        FileManager::write_json_atomic(path.as_ref(), &file)?;
        self.unsaved = 0;
        debug!("Saved {} cached translations to {}", self.entries.len(), path.as_ref().display());
        Ok(())
    }
}
