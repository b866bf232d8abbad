/*!
 * Segment extraction, batching and translation.
 *
 * - `segment`: segments, anchors and batches
 * - `filters`: text that is never translated
 * - `extractor`: content document to ordered segments
 * - `divider`: splitting long segments and grouping batches
 * - `core`: the `Translator` trait and its LLM implementation
 * - `dispatcher`: cache, retries, fallback and concurrency around a `Translator`
 * - `cache`, `rate_limit`, `prompts`: supporting pieces
 * - `reassembler`: translations back into the document
 * - `terminology`: term list shared with the prompts
 */

pub use self::core::{LlmTranslator, Translator};
pub use self::dispatcher::{BatchDispatcher, BatchOutcome, DispatchSettings, DispatchStats};
pub use self::divider::TextDivider;
pub use self::extractor::SegmentExtractor;
pub use self::segment::{Anchor, Batch, Segment};

pub mod cache;
pub mod core;
pub mod dispatcher;
pub mod divider;
pub mod extractor;
pub mod filters;
pub mod prompts;
pub mod rate_limit;
pub mod reassembler;
pub mod segment;
pub mod terminology;
