/*!
 * The translation collaborator.
 *
 * `Translator` is the seam between the pipeline and whatever does the actual
 * translating. `LlmTranslator` implements it over a chat-completion
 * `Provider`: a batch goes out as one request with the texts joined by a
 * separator line, and the reply is split on the same separator.
 *
 * Implementations make one attempt per call. Retries, pacing and fallbacks
 * live in the dispatcher.
 */

use async_trait::async_trait;
use log::{debug, warn};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use super::prompts::{batch_separator, with_preserved_terms, PromptTemplate};
use crate::app_config::Config;
use crate::errors::ProviderError;
use crate::language_utils::get_language_name;
use crate::providers::{create_provider, CompletionRequest, Provider};

/// Translates lists of strings from one language to another
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `texts`, returning exactly one string per input, in order
    async fn translate_batch(
        &self,
        texts: &[String],
        source_language: &str,
        target_language: &str,
    ) -> Result<Vec<String>, ProviderError>;

    /// Send `text` with a caller-supplied system prompt and return the raw reply
    async fn translate_with_system_prompt(&self, text: &str, system_prompt: &str) -> Result<String, ProviderError>;

    /// Terms that must come through untranslated
    fn set_preserved_terms(&self, _terms: &[String]) {}
}

/// Token usage statistics for tracking API consumption
#[derive(Debug, Clone)]
pub struct TokenUsageStats {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub requests: u64,
    pub start_time: Instant,
    /// Total time spent waiting on the provider
    pub api_duration: Duration,
    pub provider: String,
    pub model: String,
}

impl TokenUsageStats {
    pub fn with_provider_info(provider: String, model: String) -> Self {
        Self {
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
            requests: 0,
            start_time: Instant::now(),
            api_duration: Duration::from_secs(0),
            provider,
            model,
        }
    }

    pub fn add_token_usage(&mut self, prompt_tokens: Option<u64>, completion_tokens: Option<u64>) {
        if let Some(pt) = prompt_tokens {
            self.prompt_tokens += pt;
            self.total_tokens += pt;
        }
        if let Some(ct) = completion_tokens {
            self.completion_tokens += ct;
            self.total_tokens += ct;
        }
    }

    pub fn tokens_per_minute(&self) -> f64 {
        let duration_minutes = if self.api_duration.as_secs_f64() > 0.0 {
            self.api_duration.as_secs_f64() / 60.0
        } else {
            self.start_time.elapsed().as_secs_f64() / 60.0
        };
        if duration_minutes > 0.0 { self.total_tokens as f64 / duration_minutes } else { 0.0 }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} / {}: {} requests, {} prompt + {} completion = {} tokens ({:.0} tokens/min, {:.1}s in API)",
            self.provider,
            self.model,
            self.requests,
            self.prompt_tokens,
            self.completion_tokens,
            self.total_tokens,
            self.tokens_per_minute(),
            self.api_duration.as_secs_f64()
        )
    }
}

/// Translator backed by a chat-completion provider
#[derive(Debug)]
pub struct LlmTranslator {
    provider: Arc<dyn Provider>,
    custom_prompt: Option<String>,
    temperature: f32,
    max_tokens: u32,
    preserved_terms: RwLock<Vec<String>>,
    usage: Mutex<TokenUsageStats>,
}

impl LlmTranslator {
    pub fn new(provider: Arc<dyn Provider>, config: &Config) -> Self {
        let usage = TokenUsageStats::with_provider_info(
            config.translation.provider.display_name().to_string(),
            config.translation.get_model(),
        );
        Self {
            provider,
            custom_prompt: config.translation.common.system_prompt.clone(),
            temperature: config.translation.common.temperature,
            max_tokens: config.translation.common.max_tokens,
            preserved_terms: RwLock::new(Vec::new()),
            usage: Mutex::new(usage),
        }
    }

    /// Build the translator for the provider selected in `config`
    pub fn from_config(config: &Config) -> Self {
        Self::new(create_provider(&config.translation), config)
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub fn token_usage(&self) -> TokenUsageStats {
        self.usage.lock().clone()
    }

    fn system_prompt(&self, source_language: &str, target_language: &str, separator: Option<&str>) -> String {
        let source_name = get_language_name(source_language).unwrap_or_else(|_| source_language.to_string());
        let target_name = get_language_name(target_language).unwrap_or_else(|_| target_language.to_string());

        let rendered = match (&self.custom_prompt, separator) {
            (Some(custom), None) => PromptTemplate::new(custom).render(&source_name, &target_name, ""),
            (Some(custom), Some(separator)) => format!(
                "{}\nThe input contains several sections separated by '{}'. Reply only with the translations, separated by the same separator marker.",
                PromptTemplate::new(custom).render(&source_name, &target_name, separator),
                separator
            ),
            (None, None) => PromptTemplate::single().render(&source_name, &target_name, ""),
            (None, Some(separator)) => PromptTemplate::batch().render(&source_name, &target_name, separator),
        };
        with_preserved_terms(rendered, &self.preserved_terms.read())
    }

    async fn request(&self, system: String, user: String) -> Result<String, ProviderError> {
        let started = Instant::now();
        let response = self
            .provider
            .complete(CompletionRequest { system, user, temperature: self.temperature, max_tokens: self.max_tokens })
            .await;

        let mut usage = self.usage.lock();
        usage.requests += 1;
        usage.api_duration += started.elapsed();
        if let Ok(response) = &response {
            usage.add_token_usage(response.prompt_tokens, response.completion_tokens);
        }
        response.map(|r| r.text)
    }
}

#[async_trait]
impl Translator for LlmTranslator {
    async fn translate_batch(
        &self,
        texts: &[String],
        source_language: &str,
        target_language: &str,
    ) -> Result<Vec<String>, ProviderError> {
        match texts {
            [] => Ok(Vec::new()),
            [single] => {
                let system = self.system_prompt(source_language, target_language, None);
                let reply = self.request(system, single.clone()).await?;
                Ok(vec![clean_translation(&reply)])
            }
            _ => {
                let stamp = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default();
                let separator = batch_separator(stamp);
                let system = self.system_prompt(source_language, target_language, Some(&separator));
                let reply = self.request(system, texts.join(&separator)).await?;
                split_batch_reply(&reply, &separator, texts)
            }
        }
    }

    async fn translate_with_system_prompt(&self, text: &str, system_prompt: &str) -> Result<String, ProviderError> {
        if text.trim().is_empty() {
            return Ok(text.to_string());
        }
        self.request(system_prompt.to_string(), text.to_string()).await
    }

    fn set_preserved_terms(&self, terms: &[String]) {
        debug!("Preserving {} terms in prompts", terms.len());
        *self.preserved_terms.write() = terms.to_vec();
    }
}

/// Split a batch reply into one translation per input text.
///
/// A reply with the wrong number of sections is an error: there is no telling
/// which section belongs to which text.
fn split_batch_reply(reply: &str, separator: &str, texts: &[String]) -> Result<Vec<String>, ProviderError> {
    let parts: Vec<String> = reply.split(separator).map(clean_translation).collect();
    if parts.len() != texts.len() {
        warn!("Expected {} translations, got {}", texts.len(), parts.len());
        return Err(ProviderError::ParseError(format!(
            "batch reply has {} sections for {} texts",
            parts.len(),
            texts.len()
        )));
    }
    Ok(parts)
}

/// Strip the chatter models sometimes put around a translation
pub fn clean_translation(text: &str) -> String {
    const PREFIXES: &[&str] = &["Translation:", "Translated text:", "Here's the translation:"];

    let mut cleaned = text.trim();
    for prefix in PREFIXES {
        if let Some(rest) = cleaned.strip_prefix(prefix) {
            cleaned = rest.trim();
        }
    }
    let quoted = cleaned.len() >= 2
        && ((cleaned.starts_with('"') && cleaned.ends_with('"'))
            || (cleaned.starts_with('\'') && cleaned.ends_with('\'')));
    if quoted {
        cleaned = &cleaned[1..cleaned.len() - 1];
    }
    cleaned.to_string()
}
