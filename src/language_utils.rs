/*!
 * Language tags used in prompts.
 *
 * Accepts ISO 639-1 and ISO 639-2/3 codes, optionally followed by a region
 * or script subtag (`zh-CN`, `pt_BR`), and turns them into the English
 * language names the translation prompts use.
 */

use anyhow::{anyhow, Result};
use isolang::Language;

/// Split a language tag into its primary code and optional region
fn split_tag(code: &str) -> (String, Option<String>) {
    let trimmed = code.trim();
    let mut parts = trimmed.splitn(2, ['-', '_']);
    let primary = parts.next().unwrap_or_default().to_lowercase();
    let region = parts.next().map(|r| r.to_uppercase());
    (primary, region)
}

/// Resolve the primary subtag of a language tag to an isolang language
fn lookup(primary: &str) -> Option<Language> {
    match primary.len() {
        2 => Language::from_639_1(primary),
        3 => Language::from_639_3(primary).or_else(|| Language::from_639_3(&part2b_to_part2t(primary))),
        _ => None,
    }
}

/// Map the ISO 639-2/B codes that differ from their 639-2/T counterpart
fn part2b_to_part2t(code: &str) -> String {
    match code {
        "fre" => "fra",
        "ger" => "deu",
        "dut" => "nld",
        "gre" => "ell",
        "chi" => "zho",
        "cze" => "ces",
        "ice" => "isl",
        "alb" => "sqi",
        "arm" => "hye",
        "baq" => "eus",
        "bur" => "mya",
        "per" => "fas",
        "geo" => "kat",
        "may" => "msa",
        "mac" => "mkd",
        "rum" => "ron",
        "slo" => "slk",
        "wel" => "cym",
        other => other,
    }
    .to_string()
}

/// Fail when the primary subtag is not a known ISO 639 code
pub fn validate_language_code(code: &str) -> Result<()> {
    let (primary, _) = split_tag(code);
    lookup(&primary)
        .map(|_| ())
        .ok_or_else(|| anyhow!("Invalid language code: {}", code))
}

/// Check if two language tags name the same language (regions ignored)
pub fn language_codes_match(code1: &str, code2: &str) -> bool {
    let (first, _) = split_tag(code1);
    let (second, _) = split_tag(code2);
    match (lookup(&first), lookup(&second)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Get the language name from a tag
///
/// Chinese variants are spelled out because the script matters to the model.
pub fn get_language_name(code: &str) -> Result<String> {
    let (primary, region) = split_tag(code);
    let lang = lookup(&primary).ok_or_else(|| anyhow!("Invalid language code: {}", code))?;

    if lang == Language::Zho {
        return Ok(match region.as_deref() {
            Some("TW") | Some("HK") | Some("MO") | Some("HANT") => "Traditional Chinese".to_string(),
            _ => "Simplified Chinese".to_string(),
        });
    }

    Ok(lang.to_name().to_string())
}
