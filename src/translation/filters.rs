/*!
 * Text that is never worth sending to the translator.
 *
 * The built-in list catches markup that leaked into text nodes from broken
 * documents, runs of symbols, and caption words standing on their own. It is
 * a heuristic default: users can extend it or switch it off in the config.
 */

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::app_config::ExtractionConfig;

const DEFAULT_SKIP_PATTERNS: &[&str] = &[
    r"^\s*<\?xml.*\?>\s*$",
    r"^\s*xml\s+version=.*",
    r"(?i)^\s*<!DOCTYPE.*>\s*$",
    r"^\s*</?html.*>\s*$",
    r"^\s*html.*>\s*$",
    r"(?i)^\s*html\s*$",
    r"^\s*</?body.*>\s*$",
    r"^\s*body.*>\s*$",
    r"(?i)^\s*body\s*$",
    r"^\s*</?head.*>\s*$",
    r"^\s*head.*>\s*$",
    r"(?i)^\s*head\s*$",
    r"^\s*\W+$",
    r"^\s*↪\s*$",
    r"(?i)^\s*(figure|table|listing|example)\s*$",
    r"(?i)^\s*fig\.\s*\d+\s*$",
];

/// Captions and numbered titles that must stay in one piece
const CAPTION_PATTERNS: &[&str] = &[
    r"^\s*[Ff]igure\s+\d+",
    r"^\s*[Tt]able\s+\d+",
    r"^\s*[Ll]isting\s+\d+",
    r"^\s*\d+\.\d+\s+",
    r"^\s*Example\s+\d+",
];

static DEFAULT_SKIP: Lazy<Vec<Regex>> = Lazy::new(|| compile_all(DEFAULT_SKIP_PATTERNS));
static CAPTIONS: Lazy<Vec<Regex>> = Lazy::new(|| compile_all(CAPTION_PATTERNS));

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
}

/// Whether text starts like a figure/table/listing caption or a numbered title
pub fn is_caption(text: &str) -> bool {
    CAPTIONS.iter().any(|re| re.is_match(text))
}

/// Decides which strings are excluded from translation
#[derive(Debug, Clone)]
pub struct SkipFilter {
    patterns: Vec<Regex>,
}

impl SkipFilter {
    pub fn new(config: &ExtractionConfig) -> Result<Self> {
        let mut patterns = if config.disable_default_skip_patterns {
            Vec::new()
        } else {
            DEFAULT_SKIP.clone()
        };
        for extra in &config.extra_skip_patterns {
            patterns.push(Regex::new(extra).with_context(|| format!("Invalid skip pattern: {}", extra))?);
        }
        Ok(Self { patterns })
    }

    pub fn should_skip(&self, text: &str) -> bool {
        if text.trim().is_empty() {
            return true;
        }
        self.patterns.iter().any(|re| re.is_match(text))
    }
}

impl Default for SkipFilter {
    fn default() -> Self {
        Self { patterns: DEFAULT_SKIP.clone() }
    }
}
