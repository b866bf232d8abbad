/*!
 * Batch dispatch.
 *
 * Sits between the pipeline and the `Translator`: answers from the cache
 * where it can, sends the remaining texts of a batch in one call, retries
 * transient failures with exponential backoff, falls back to one call per
 * text when a batch keeps failing, and as a last resort keeps the source
 * text so a single bad segment never stops a book.
 *
 * Cache and counters share one lock. It is never held across an await.
 * In-flight calls are bounded by a semaphore and spaced by the rate limiter.
 * A text already being translated for another batch is not sent again: the
 * later batch waits for the first one's result.
 */

use log::{debug, warn};
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};

use anyhow::Result;

use super::cache::TranslationCache;
use super::core::Translator;
use super::rate_limit::RateLimiter;
use crate::app_config::Config;
use crate::errors::ProviderError;

/// Counters across every batch handled by one dispatcher
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub batches: usize,
    pub segments: usize,
    pub chars: usize,
    pub external_calls: usize,
    pub failed_calls: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    /// Segments that kept their source text because every attempt failed
    pub degraded: usize,
}

/// Result of one batch
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    /// One translation per input text, in order
    pub translations: Vec<String>,
    /// False when at least one text fell back to its source
    pub success: bool,
    pub degraded: usize,
    /// Counters after this batch
    pub stats: DispatchStats,
}

/// Exponential backoff with jitter
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let base = self.base_delay.saturating_mul(factor);
        let jitter_ms = (self.base_delay.as_millis() / 2) as u64;
        let jitter = if jitter_ms > 0 { rand::rng().random_range(0..=jitter_ms) } else { 0 };
        base + Duration::from_millis(jitter)
    }
}

/// Tuning knobs, normally taken from the config
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub source_language: String,
    pub target_language: String,
    pub max_workers: usize,
    pub requests_per_minute: Option<u32>,
    pub retry: RetryPolicy,
    pub cache_enabled: bool,
}

impl DispatchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            source_language: config.source_language.clone(),
            target_language: config.target_language.clone(),
            max_workers: config.processing.max_workers,
            requests_per_minute: config.translation.get_rate_limit(),
            retry: RetryPolicy {
                max_retries: config.translation.common.retry_count,
                base_delay: Duration::from_millis(config.translation.common.retry_backoff_ms),
            },
            cache_enabled: config.processing.cache_translations,
        }
    }
}

/// State of a text some batch is translating
#[derive(Debug, Clone, PartialEq)]
enum Flight {
    Pending,
    Done(String),
    /// Every attempt failed; the source text was kept
    Degraded,
}

struct Shared {
    cache: TranslationCache,
    stats: DispatchStats,
    in_flight: HashMap<String, watch::Receiver<Flight>>,
}

/// Texts one batch has claimed in `Shared::in_flight`.
///
/// Dropping it releases every claim not finished yet, so waiting batches
/// notice a cancelled owner and translate the text themselves.
struct Claims<'a> {
    dispatcher: &'a BatchDispatcher,
    senders: HashMap<String, watch::Sender<Flight>>,
}

impl Claims<'_> {
    fn finish(&mut self, text: &str, flight: Flight) {
        if let Some(sender) = self.senders.remove(text) {
            sender.send_replace(flight);
            self.dispatcher.shared.lock().in_flight.remove(text);
        }
    }
}

impl Drop for Claims<'_> {
    fn drop(&mut self) {
        if self.senders.is_empty() {
            return;
        }
        let mut shared = self.dispatcher.shared.lock();
        for text in self.senders.keys() {
            shared.in_flight.remove(text);
        }
    }
}

pub struct BatchDispatcher {
    translator: Arc<dyn Translator>,
    shared: Mutex<Shared>,
    limiter: RateLimiter,
    permits: Semaphore,
    retry: RetryPolicy,
    source_language: String,
    target_language: String,
}

impl BatchDispatcher {
    pub fn new(translator: Arc<dyn Translator>, settings: DispatchSettings) -> Self {
        Self {
            translator,
            shared: Mutex::new(Shared {
                cache: TranslationCache::new(settings.cache_enabled),
                stats: DispatchStats::default(),
                in_flight: HashMap::new(),
            }),
            limiter: RateLimiter::per_minute(settings.requests_per_minute),
            permits: Semaphore::new(settings.max_workers.max(1)),
            retry: settings.retry,
            source_language: settings.source_language,
            target_language: settings.target_language,
        }
    }

    pub fn translator(&self) -> &Arc<dyn Translator> {
        &self.translator
    }

    pub fn stats(&self) -> DispatchStats {
        let shared = self.shared.lock();
        let (hits, misses, _) = shared.cache.stats();
        DispatchStats { cache_hits: hits, cache_misses: misses, ..shared.stats }
    }

    /// Translate one batch. Never fails; see `BatchOutcome::success`.
    pub async fn translate_batch(&self, texts: &[String]) -> BatchOutcome {
        let mut results: Vec<Option<String>> = vec![None; texts.len()];
        let mut degraded = 0usize;
        // unique uncached texts and the positions they fill
        let mut pending: Vec<(String, Vec<usize>)> = Vec::new();
        // texts another batch is already translating
        let mut waiting: Vec<(String, Vec<usize>, watch::Receiver<Flight>)> = Vec::new();
        let mut claims = Claims { dispatcher: self, senders: HashMap::new() };
        {
            let mut shared = self.shared.lock();
            shared.stats.batches += 1;
            shared.stats.segments += texts.len();
            shared.stats.chars += texts.iter().map(|t| t.chars().count()).sum::<usize>();
            for (index, text) in texts.iter().enumerate() {
                if let Some(hit) = shared.cache.get(text, &self.source_language, &self.target_language) {
                    results[index] = Some(hit);
                } else if let Some(entry) = pending.iter_mut().find(|(t, _)| t == text) {
                    entry.1.push(index);
                } else if let Some(entry) = waiting.iter_mut().find(|(t, _, _)| t == text) {
                    entry.1.push(index);
                } else if let Some(receiver) = shared.in_flight.get(text) {
                    waiting.push((text.clone(), vec![index], receiver.clone()));
                } else {
                    let (sender, receiver) = watch::channel(Flight::Pending);
                    shared.in_flight.insert(text.clone(), receiver);
                    claims.senders.insert(text.clone(), sender);
                    pending.push((text.clone(), vec![index]));
                }
            }
        }

        if !pending.is_empty() {
            let request: Vec<String> = pending.iter().map(|(t, _)| t.clone()).collect();
            let batch_result = self
                .with_retry(|| self.translator.translate_batch(&request, &self.source_language, &self.target_language))
                .await;

            let mut retry_singly: Vec<(String, Vec<usize>)> = Vec::new();
            let mut finished: Vec<(String, Flight)> = Vec::new();
            match batch_result {
                Ok(translations) if translations.len() == pending.len() => {
                    let mut shared = self.shared.lock();
                    for ((source, positions), translation) in pending.into_iter().zip(translations) {
                        if translation.trim().is_empty() {
                            retry_singly.push((source, positions));
                            continue;
                        }
                        shared.cache.store(&source, &self.source_language, &self.target_language, &translation);
                        for position in positions {
                            results[position] = Some(translation.clone());
                        }
                        finished.push((source, Flight::Done(translation)));
                    }
                }
                Ok(translations) => {
                    warn!("Translator returned {} texts for {}, retrying one by one", translations.len(), pending.len());
                    retry_singly = pending;
                }
                Err(e) => {
                    warn!("Batch of {} texts failed ({}), retrying one by one", pending.len(), e);
                    retry_singly = pending;
                }
            }
            for (source, flight) in finished {
                claims.finish(&source, flight);
            }

            for (source, positions) in retry_singly {
                let translated = self.translate_single(&source).await;
                if translated.is_none() {
                    degraded += positions.len();
                }
                let flight = translated.clone().map(Flight::Done).unwrap_or(Flight::Degraded);
                let value = translated.unwrap_or_else(|| source.clone());
                for position in positions {
                    results[position] = Some(value.clone());
                }
                claims.finish(&source, flight);
            }
        }
        drop(claims);

        for (source, positions, mut receiver) in waiting {
            let resolved = receiver.wait_for(|f| *f != Flight::Pending).await.map(|f| (*f).clone());
            let flight = match resolved {
                Ok(flight) => flight,
                Err(_) => {
                    debug!("Batch translating a shared text went away; translating it here");
                    self.translate_single(&source).await.map(Flight::Done).unwrap_or(Flight::Degraded)
                }
            };
            let value = match flight {
                Flight::Done(translation) => translation,
                _ => {
                    degraded += positions.len();
                    source
                }
            };
            for position in positions {
                results[position] = Some(value.clone());
            }
        }

        if degraded > 0 {
            self.shared.lock().stats.degraded += degraded;
        }
        let translations: Vec<String> = results
            .into_iter()
            .zip(texts.iter())
            .map(|(r, t)| r.unwrap_or_else(|| t.clone()))
            .collect();
        BatchOutcome { translations, success: degraded == 0, degraded, stats: self.stats() }
    }

    /// Translate a single text with the same cache and fallback rules
    pub async fn translate_text(&self, text: &str) -> String {
        let outcome = self.translate_batch(std::slice::from_ref(&text.to_string())).await;
        outcome.translations.into_iter().next().unwrap_or_else(|| text.to_string())
    }

    /// One text, one call, with retries. `None` when every attempt failed.
    async fn translate_single(&self, text: &str) -> Option<String> {
        let single = [text.to_string()];
        let result = self
            .with_retry(|| self.translator.translate_batch(&single, &self.source_language, &self.target_language))
            .await;
        match result {
            Ok(mut translations) if translations.len() == 1 && !translations[0].trim().is_empty() => {
                let translation = translations.remove(0);
                self.shared
                    .lock()
                    .cache
                    .store(text, &self.source_language, &self.target_language, &translation);
                Some(translation)
            }
            Ok(_) => {
                warn!("Translator returned no usable text for a single segment; keeping the source");
                None
            }
            Err(e) => {
                warn!("Giving up on segment after retries ({}); keeping the source", e);
                None
            }
        }
    }

    /// Call the translator with a custom system prompt, paced and retried
    pub async fn complete_with_system_prompt(&self, text: &str, system_prompt: &str) -> Result<String, ProviderError> {
        self.with_retry(|| self.translator.translate_with_system_prompt(text, system_prompt))
            .await
    }

    async fn with_retry<T, F, Fut>(&self, call: F) -> Result<T, ProviderError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 0u32;
        loop {
            let result = {
                let _permit = self
                    .permits
                    .acquire()
                    .await
                    .map_err(|_| ProviderError::RequestFailed("dispatcher is shut down".to_string()))?;
                self.limiter.acquire().await;
                self.shared.lock().stats.external_calls += 1;
                call().await
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) => {
                    self.shared.lock().stats.failed_calls += 1;
                    if !e.is_transient() || attempt >= self.retry.max_retries {
                        return Err(e);
                    }
                    attempt += 1;
                    let delay = self.retry.delay(attempt);
                    debug!("Attempt {} failed ({}), retrying in {:?}", attempt, e, delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    pub fn load_cache<P: AsRef<Path>>(&self, path: P) -> Result<usize> {
        self.shared.lock().cache.load_from_file(path)
    }

    pub fn save_cache<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut shared = self.shared.lock();
        if !shared.cache.is_enabled() {
            return Ok(());
        }
        shared.cache.save_to_file(path)
    }

    /// Cache entries added since the last load or save
    pub fn unsaved_cache_entries(&self) -> usize {
        self.shared.lock().cache.unsaved()
    }
}
