/*!
 * Prompt templates for book translation and terminology analysis.
 */

/// Marker placed between texts of one batch request
pub fn batch_separator(stamp: u64) -> String {
    format!("-----TRANSLATE_SEPARATOR_{}-----", stamp)
}

/// System prompt template with `{source_language}`, `{target_language}`
/// and `{separator}` placeholders
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    const GUIDELINES: &'static str = "Preserve original formatting, maintain the original meaning, and ensure a natural and fluent translation. \
Analyze the subject matter domain of the content and identify domain-specific terminology. \
DO NOT translate any professional terminology, including technical terms, product names, programming languages, \
scientific concepts, industry standards, and specialized jargon. Keep these in their original form. \
Look for terms that have specific meaning within a technical or scientific context.";

    pub fn new(template: &str) -> Self {
        Self { template: template.to_string() }
    }

    /// Prompt for a single text
    pub fn single() -> Self {
        Self::new(&format!(
            "You are a highly skilled translator from {{source_language}} to {{target_language}} specializing in technical and academic content. \
Translate the following text into {{target_language}}. {} \
Reply only with the translation, no explanations or additional text.",
            Self::GUIDELINES
        ))
    }

    /// Prompt for several texts joined by a separator
    pub fn batch() -> Self {
        Self::new(&format!(
            "You are a highly skilled translator from {{source_language}} to {{target_language}} specializing in technical and academic content. \
Translate each section of text separated by '{{separator}}' into {{target_language}}. {} \
Reply only with the translations, separated by the same separator marker.",
            Self::GUIDELINES
        ))
    }

    pub fn render(&self, source_language: &str, target_language: &str, separator: &str) -> String {
        self.template
            .replace("{source_language}", source_language)
            .replace("{target_language}", target_language)
            .replace("{separator}", separator)
    }
}

/// Append the preserved-term list to a rendered system prompt
pub fn with_preserved_terms(prompt: String, terms: &[String]) -> String {
    if terms.is_empty() {
        return prompt;
    }
    format!(
        "{}\n\nKeep the following terms exactly as written, untranslated: {}",
        prompt,
        terms.join(", ")
    )
}

pub const TERMINOLOGY_SYSTEM_PROMPT: &str = r#"You are an expert terminology analyst specializing in technical and professional content. I will provide you with a book's table of contents and index (if available). Your task is to analyze this structure and identify domain-specific terminology that should be preserved (not translated) during translation.

You should:
1. Analyze the book structure to understand the domain and subject matter
2. Identify technical terms, specialized vocabulary, and proper nouns
3. Include both terms explicitly mentioned and those likely to appear based on context
4. Consider programming languages, frameworks, tools, design patterns, and technical concepts

Provide your response as a JSON object with the following structure:
{
  "domain_analysis": "Your analysis of the book's domain and subject matter",
  "terms": [
    {"term": "term1", "preserve": true, "reason": "Why this should be preserved"},
    {"term": "term2", "preserve": true, "reason": "Why this should be preserved"},
    ...
  ]
}

Be comprehensive in your analysis, as missed terms might be incorrectly translated."#;
