/*!
 * Mock translator for testing.
 *
 * Simulates the behaviours the pipeline has to cope with:
 * - `MockTranslator::working()` - always succeeds
 * - `MockTranslator::failing()` - every call fails with a transient error
 * - `MockTranslator::fail_batches()` - multi-text calls fail, single texts succeed
 * - `MockTranslator::intermittent(n)` - every nth call fails
 * - `MockTranslator::slow(ms)` - succeeds after a delay
 *
 * Every call is counted and recorded so tests can assert what was sent.
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::errors::ProviderError;
use crate::translation::core::Translator;

/// Behavior mode for the mock translator
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBehavior {
    Working,
    Failing,
    FailBatches,
    Intermittent { fail_every: usize },
    Slow { delay_ms: u64 },
    /// Replies with empty strings
    Empty,
}

/// Scripted translator
#[derive(Debug)]
pub struct MockTranslator {
    behavior: MockBehavior,
    request_count: Arc<AtomicUsize>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    requests: Mutex<Vec<Vec<String>>>,
    dictionary: HashMap<String, String>,
    system_reply: Option<String>,
    preserved_terms: Mutex<Vec<String>>,
}

impl MockTranslator {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            request_count: Arc::new(AtomicUsize::new(0)),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            dictionary: HashMap::new(),
            system_reply: None,
            preserved_terms: Mutex::new(Vec::new()),
        }
    }

    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    pub fn fail_batches() -> Self {
        Self::new(MockBehavior::FailBatches)
    }

    pub fn intermittent(fail_every: usize) -> Self {
        Self::new(MockBehavior::Intermittent { fail_every })
    }

    pub fn slow(delay_ms: u64) -> Self {
        Self::new(MockBehavior::Slow { delay_ms })
    }

    /// Fixed translations for specific source strings
    pub fn with_translations(mut self, pairs: &[(&str, &str)]) -> Self {
        self.dictionary
            .extend(pairs.iter().map(|(source, target)| (source.to_string(), target.to_string())));
        self
    }

    /// Reply returned by `translate_with_system_prompt`
    pub fn with_system_reply(mut self, reply: impl Into<String>) -> Self {
        self.system_reply = Some(reply.into());
        self
    }

    /// Shared call counter, usable after the mock has been moved into an `Arc<dyn Translator>`
    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.request_count.clone()
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Every text list received by `translate_batch`, in call order
    pub fn requests(&self) -> Vec<Vec<String>> {
        self.requests.lock().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn preserved_terms(&self) -> Vec<String> {
        self.preserved_terms.lock().clone()
    }

    fn translate_one(&self, text: &str, target_language: &str) -> String {
        match self.dictionary.get(text) {
            Some(translation) => translation.clone(),
            None => format!("[{}] {}", target_language, text),
        }
    }

    fn should_fail(&self, call_number: usize, batch_len: usize) -> bool {
        match self.behavior {
            MockBehavior::Failing => true,
            MockBehavior::FailBatches => batch_len > 1,
            MockBehavior::Intermittent { fail_every } => fail_every > 0 && call_number % fail_every == 0,
            _ => false,
        }
    }
}

#[async_trait]
impl Translator for MockTranslator {
    async fn translate_batch(
        &self,
        texts: &[String],
        _source_language: &str,
        target_language: &str,
    ) -> Result<Vec<String>, ProviderError> {
        let call_number = self.request_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().push(texts.to_vec());

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if let MockBehavior::Slow { delay_ms } = self.behavior {
            tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.should_fail(call_number, texts.len()) {
            return Err(ProviderError::ConnectionError(format!("mock failure on call {}", call_number)));
        }
        if self.behavior == MockBehavior::Empty {
            return Ok(vec![String::new(); texts.len()]);
        }
        Ok(texts.iter().map(|t| self.translate_one(t, target_language)).collect())
    }

    async fn translate_with_system_prompt(&self, text: &str, _system_prompt: &str) -> Result<String, ProviderError> {
        let call_number = self.request_count.fetch_add(1, Ordering::SeqCst) + 1;
        if self.should_fail(call_number, 1) {
            return Err(ProviderError::ConnectionError(format!("mock failure on call {}", call_number)));
        }
        Ok(self.system_reply.clone().unwrap_or_else(|| text.to_string()))
    }

    fn set_preserved_terms(&self, terms: &[String]) {
        *self.preserved_terms.lock() = terms.to_vec();
    }
}
