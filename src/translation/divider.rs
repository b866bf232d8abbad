/*!
 * Long-segment splitting and batch grouping.
 *
 * Splitting never loses text: every part after the first records the exact
 * separator that preceded it, so `part0 + joiner1 + part1 + ...` is always
 * the original segment text. Paragraph breaks are preferred, then sentence
 * ends; a text with neither is left whole even if it is over the limit.
 */

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

use anyhow::{Context, Result};

use super::segment::{Batch, Segment};
use crate::app_config::{ExtractionConfig, ProcessingConfig};

static PARAGRAPH_BREAK: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\n\s*\n").ok());
/// Latin terminators need trailing whitespace; CJK ones end a sentence on their own
static SENTENCE_END: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"[.!?]\s+|[。！？]+[」』）”]*\s*").ok());

const TERMINAL_PUNCTUATION: &[char] = &['.', ',', ';', ':', '?', '!'];

/// A piece of text and the separator that came before it
#[derive(Debug, Clone, PartialEq)]
struct Piece {
    joiner: String,
    text: String,
}

/// Splits over-long segments and groups segments into batches
#[derive(Debug, Clone)]
pub struct TextDivider {
    max_segment_chars: usize,
    batch_size: usize,
    batch_char_budget: usize,
    new_paragraph_min_chars: usize,
    new_paragraph_keywords: Option<Regex>,
}

impl TextDivider {
    pub fn new(processing: &ProcessingConfig, extraction: &ExtractionConfig) -> Result<Self> {
        let new_paragraph_keywords = if extraction.new_paragraph_keywords.is_empty() {
            None
        } else {
            let alternatives: Vec<String> =
                extraction.new_paragraph_keywords.iter().map(|k| regex::escape(k)).collect();
            let pattern = format!(r"^(?:{})\b", alternatives.join("|"));
            Some(Regex::new(&pattern).context("Invalid new paragraph keywords")?)
        };

        Ok(Self {
            max_segment_chars: processing.chunk_size.max(1),
            batch_size: processing.batch_size.max(1),
            batch_char_budget: processing.chunk_size.max(1),
            new_paragraph_min_chars: extraction.new_paragraph_min_chars,
            new_paragraph_keywords,
        })
    }

    /// Split segments that hold several paragraphs or exceed the maximum length.
    ///
    /// Parts keep the ordinal and anchor of the segment they came from.
    pub fn optimize(&self, segments: Vec<Segment>) -> Vec<Segment> {
        let mut out = Vec::with_capacity(segments.len());
        for segment in segments {
            let long = segment.char_count() > self.max_segment_chars;
            if !long && !segment.text.contains("\n\n") {
                out.push(segment);
                continue;
            }

            let pieces = self.split(&segment.text);
            if pieces.len() <= 1 {
                out.push(segment);
                continue;
            }

            debug!("Split segment {} into {} parts", segment.ordinal, pieces.len());
            for (part, piece) in pieces.into_iter().enumerate() {
                out.push(Segment {
                    ordinal: segment.ordinal,
                    part,
                    joiner: piece.joiner,
                    anchor: segment.anchor.clone(),
                    text: piece.text,
                });
            }
        }
        out
    }

    fn split(&self, text: &str) -> Vec<Piece> {
        let paragraphs = split_keeping(text, PARAGRAPH_BREAK.as_ref(), false);
        let mut result = Vec::new();
        for paragraph in paragraphs {
            if char_len(&paragraph.text) <= self.max_segment_chars {
                result.push(paragraph);
                continue;
            }
            // punctuation stays with the sentence, the whitespace becomes the joiner
            let mut sentences = split_keeping(&paragraph.text, SENTENCE_END.as_ref(), true).into_iter();
            let Some(mut current) = sentences.next() else {
                continue;
            };
            current.joiner = paragraph.joiner;
            for sentence in sentences {
                let merged_len = char_len(&current.text) + char_len(&sentence.joiner) + char_len(&sentence.text);
                if merged_len <= self.max_segment_chars {
                    current.text.push_str(&sentence.joiner);
                    current.text.push_str(&sentence.text);
                } else {
                    result.push(std::mem::replace(&mut current, sentence));
                }
            }
            result.push(current);
        }
        result
    }

    /// Whether a segment looks like the start of a new paragraph or heading
    pub fn is_new_paragraph(&self, text: &str) -> bool {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return false;
        }
        if self.new_paragraph_keywords.as_ref().is_some_and(|re| re.is_match(trimmed)) {
            return true;
        }
        char_len(trimmed) < self.new_paragraph_min_chars && !trimmed.ends_with(TERMINAL_PUNCTUATION)
    }

    /// Group segments into batches of at most `batch_size`.
    ///
    /// A segment that starts a new paragraph also closes the current batch
    /// when adding it would push the batch past the character budget, so
    /// batches tend to break at paragraph boundaries.
    pub fn group(&self, item_id: &str, segments: Vec<Segment>) -> Vec<Batch> {
        let mut batches = Vec::new();
        let mut current: Vec<Segment> = Vec::new();
        let mut current_chars = 0usize;

        let mut close = |current: &mut Vec<Segment>, current_chars: &mut usize| {
            let batch_id = batches.len();
            batches.push(Batch { item_id: item_id.to_string(), batch_id, segments: std::mem::take(current) });
            *current_chars = 0;
        };

        for segment in segments {
            let chars = segment.char_count();
            let over_budget = current_chars + chars > self.batch_char_budget;
            if !current.is_empty() && over_budget && self.is_new_paragraph(&segment.text) {
                close(&mut current, &mut current_chars);
            }

            current_chars += chars;
            current.push(segment);

            if current.len() >= self.batch_size {
                close(&mut current, &mut current_chars);
            }
        }
        if !current.is_empty() {
            close(&mut current, &mut current_chars);
        }
        batches
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Split on every match of `re`. With `keep_terminator` the non-whitespace
/// start of a match stays with the left piece; the rest becomes the right
/// piece's joiner.
fn split_keeping(text: &str, re: Option<&Regex>, keep_terminator: bool) -> Vec<Piece> {
    let Some(re) = re else {
        return vec![Piece { joiner: String::new(), text: text.to_string() }];
    };

    let mut pieces: Vec<Piece> = Vec::new();
    let mut lead = String::new();
    let mut joiner = String::new();
    let mut last = 0;

    let mut push = |pieces: &mut Vec<Piece>, joiner: String, chunk: &str| {
        if chunk.is_empty() {
            match pieces.last_mut() {
                Some(prev) => prev.text.push_str(&joiner),
                None => lead.push_str(&joiner),
            }
        } else if pieces.is_empty() {
            pieces.push(Piece { joiner: String::new(), text: format!("{}{}{}", lead, joiner, chunk) });
        } else {
            pieces.push(Piece { joiner, text: chunk.to_string() });
        }
    };

    for m in re.find_iter(text) {
        let kept = if keep_terminator { m.as_str().trim_end().len() } else { 0 };
        let split_at = m.start() + kept;
        push(&mut pieces, std::mem::take(&mut joiner), &text[last..split_at]);
        joiner = text[split_at..m.end()].to_string();
        last = m.end();
    }
    push(&mut pieces, joiner, &text[last..]);

    if pieces.is_empty() {
        pieces.push(Piece { joiner: String::new(), text: text.to_string() });
    }
    pieces
}
