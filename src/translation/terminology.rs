/*!
 * Terminology analysis.
 *
 * Before translating, the book's table of contents and index are sent to the
 * model once to collect domain terms that must stay in the source language.
 * The result is saved in the working directory and reused on later runs.
 * Any failure here only means translating without a term list.
 */

use log::{error, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;

use super::dispatcher::BatchDispatcher;
use super::prompts::TERMINOLOGY_SYSTEM_PROMPT;
use crate::epub::TocEntry;
use crate::file_utils::FileManager;

const INDEX_CHAR_LIMIT: usize = 8000;
const MIN_TERM_CHARS: usize = 2;

static JSON_OBJECT: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(?s)(\{.*\})").ok());
static QUOTED_TERM: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r#"term[:\s]+"([^"]+)""#).ok());

/// How one term should be treated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermInfo {
    pub preserve: bool,
    #[serde(default)]
    pub reason: String,
}

/// Term to treatment, sorted by term
pub type Terminology = BTreeMap<String, TermInfo>;

#[derive(Debug, Deserialize)]
struct AnalysisReply {
    #[serde(default)]
    domain_analysis: Option<String>,
    #[serde(default)]
    terms: Vec<ReplyTerm>,
}

#[derive(Debug, Deserialize)]
struct ReplyTerm {
    #[serde(default)]
    term: String,
    #[serde(default)]
    preserve: bool,
    #[serde(default)]
    reason: String,
}

/// Runs the analysis and owns the saved term files
#[derive(Debug, Clone)]
pub struct TerminologyExtractor {
    dir: PathBuf,
}

impl TerminologyExtractor {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }

    pub fn terms_file(&self) -> PathBuf {
        self.dir.join("final_terminology.json")
    }

    /// Terminology saved by an earlier run, if readable
    pub fn load_existing(&self) -> Option<Terminology> {
        let path = self.terms_file();
        if !FileManager::file_exists(&path) {
            return None;
        }
        match FileManager::read_json::<_, Terminology>(&path) {
            Ok(terms) => {
                info!("Loaded {} terms from {}", terms.len(), path.display());
                Some(terms)
            }
            Err(e) => {
                warn!("Could not load existing terminology: {}", e);
                None
            }
        }
    }

    /// Reuse saved terminology or ask the model for it.
    ///
    /// Errors from the model are logged and yield an empty list.
    pub async fn extract(
        &self,
        dispatcher: &BatchDispatcher,
        toc: &[TocEntry],
        index_text: Option<&str>,
    ) -> Terminology {
        if let Some(existing) = self.load_existing() {
            return existing;
        }

        let context = build_context(toc, index_text);
        info!("Sending book structure for terminology analysis");
        let terms = match dispatcher.complete_with_system_prompt(&context, TERMINOLOGY_SYSTEM_PROMPT).await {
            Ok(reply) => parse_reply(&reply),
            Err(e) => {
                error!("Terminology analysis failed: {}", e);
                return Terminology::new();
            }
        };

        if let Err(e) = self.save(&terms) {
            error!("Error saving terminology: {}", e);
        }
        info!("Terminology analysis complete, identified {} terms", terms.len());
        terms
    }

    /// Write the JSON file plus a plain list of preserved terms
    pub fn save(&self, terms: &Terminology) -> Result<()> {
        FileManager::ensure_dir(&self.dir)?;
        FileManager::write_json_atomic(self.terms_file(), terms)?;
        let list: String = preserved_terms(terms).iter().map(|t| format!("{}\n", t)).collect();
        FileManager::write_to_file(self.dir.join("terms.txt"), &list)?;
        Ok(())
    }
}

/// Terms flagged to stay untranslated
pub fn preserved_terms(terms: &Terminology) -> Vec<String> {
    terms
        .iter()
        .filter(|(_, info)| info.preserve)
        .map(|(term, _)| term.clone())
        .collect()
}

/// The user message describing the book's structure
pub fn build_context(toc: &[TocEntry], index_text: Option<&str>) -> String {
    let mut context = String::from(
        "I'm analyzing a technical e-book and need to identify terminology that should be preserved (not translated) during translation. Please help me analyze the book structure below.\n\n",
    );

    let outline = TocEntry::render_outline(toc);
    context.push_str("=== TABLE OF CONTENTS ===\n\n");
    context.push_str(if outline.is_empty() { "Not available" } else { &outline });
    context.push_str("\n\n=== BOOK INDEX ===\n\n");
    match index_text.map(str::trim).filter(|t| !t.is_empty()) {
        Some(index) if index.chars().count() > INDEX_CHAR_LIMIT => {
            context.extend(index.chars().take(INDEX_CHAR_LIMIT));
            context.push_str("...[content truncated]");
        }
        Some(index) => context.push_str(index),
        None => context.push_str("Not available"),
    }
    context.push_str(
        "\n\nBased on this book structure, please identify technical terms, proper names, programming concepts, and other domain-specific terminology that should NOT be translated. Consider terms from the table of contents and index, but also infer other related terms that might appear in the book.",
    );
    context
}

/// Parse the model's answer; falls back to scraping quoted terms when the
/// JSON does not parse
pub fn parse_reply(reply: &str) -> Terminology {
    let json = JSON_OBJECT
        .as_ref()
        .and_then(|re| re.captures(reply))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(reply);

    let mut terms = Terminology::new();
    match serde_json::from_str::<AnalysisReply>(json) {
        Ok(parsed) => {
            if let Some(analysis) = parsed.domain_analysis.filter(|a| !a.is_empty()) {
                info!("Domain analysis: {}", analysis);
            }
            for entry in parsed.terms {
                let term = entry.term.trim();
                if term.chars().count() >= MIN_TERM_CHARS {
                    terms.insert(term.to_string(), TermInfo { preserve: entry.preserve, reason: entry.reason });
                }
            }
        }
        Err(e) => {
            error!("Failed to parse terminology reply as JSON: {}", e);
            if let Some(re) = QUOTED_TERM.as_ref() {
                for capture in re.captures_iter(reply) {
                    let term = capture[1].trim();
                    if term.chars().count() >= MIN_TERM_CHARS {
                        terms.insert(
                            term.to_string(),
                            TermInfo { preserve: true, reason: "Extracted from unstructured reply".to_string() },
                        );
                    }
                }
            }
        }
    }
    terms
}
