/*!
 * Tests for language utility functions
 */

use yaetwai::language_utils::{get_language_name, language_codes_match};

/// Test retrieval of language names from codes
#[test]
fn test_get_language_name_withValidCodes_shouldReturnCorrectName() {
    assert_eq!(get_language_name("en").unwrap(), "English");
    assert_eq!(get_language_name("eng").unwrap(), "English");
    assert_eq!(get_language_name("fr").unwrap(), "French");
    assert_eq!(get_language_name("fre").unwrap(), "French");
    assert_eq!(get_language_name(" DE ").unwrap(), "German");
}

/// Chinese tags resolve to the script the model should write
#[test]
fn test_get_language_name_withChineseRegions_shouldPickScript() {
    assert_eq!(get_language_name("zh").unwrap(), "Simplified Chinese");
    assert_eq!(get_language_name("zh-CN").unwrap(), "Simplified Chinese");
    assert_eq!(get_language_name("zh_TW").unwrap(), "Traditional Chinese");
    assert_eq!(get_language_name("zh-HK").unwrap(), "Traditional Chinese");
}

/// Test retrieval with invalid codes
#[test]
fn test_get_language_name_withInvalidCodes_shouldReturnError() {
    assert!(get_language_name("xyz").is_err());
    assert!(get_language_name("").is_err());
    assert!(get_language_name("e").is_err());
}

/// Test matching of different language code formats
#[test]
fn test_language_codes_match_withMatchingCodes_shouldReturnTrue() {
    assert!(language_codes_match("en", "eng"));
    assert!(language_codes_match("fr", "fre"));
    assert!(language_codes_match("fra", "fre"));
    assert!(language_codes_match("EN", "eng"));
    assert!(language_codes_match("pt-BR", "por"));
}

/// Test non-matching codes
#[test]
fn test_language_codes_match_withDifferentCodes_shouldReturnFalse() {
    assert!(!language_codes_match("en", "fra"));
    assert!(!language_codes_match("eng", "fre"));
    assert!(!language_codes_match("xyz", "xyz"));
}
