/*!
 * Tests for application configuration functionality
 */

use anyhow::Result;
use yaetwai::app_config::{Config, LogLevel, TranslationProvider};

use crate::common;

/// Test default configuration values
#[test]
fn test_default_config_withNoParameters_shouldHaveCorrectDefaults() {
    let config = Config::default();

    assert_eq!(config.source_language, "en");
    assert_eq!(config.target_language, "zh-CN");
    assert_eq!(config.translation.provider, TranslationProvider::DeepSeek);
    assert_eq!(config.translation.available_providers.len(), 4);
    assert!(config.processing.cache_translations);
    assert!(config.processing.use_terminology);
    assert_eq!(config.processing.cache_save_interval, 50);
    assert_eq!(config.extraction.index_item_pattern, "index");
    assert_eq!(config.log_level, LogLevel::Info);
}

/// Test configuration validation
#[test]
fn test_config_validation_withVariousConfigs_shouldValidateCorrectly() {
    let mut config = Config::default();
    config.translation.provider = TranslationProvider::LMStudio;
    assert!(config.validate().is_ok());

    config.source_language = "xyz".to_string();
    assert!(config.validate().is_err());
    config.source_language = "en".to_string();

    config.target_language = String::new();
    assert!(config.validate().is_err());
    config.target_language = "fr".to_string();

    config.processing.batch_size = 0;
    assert!(config.validate().is_err());
    config.processing.batch_size = 10;

    config.processing.max_workers = 0;
    assert!(config.validate().is_err());
    config.processing.max_workers = 4;

    config.translation.provider = TranslationProvider::OpenAI;
    config.set_api_key("sk-test");
    assert!(config.validate().is_ok());
}

/// Provider names parse case-insensitively
#[test]
fn test_provider_from_str_withKnownNames_shouldParse() {
    assert_eq!("DeepSeek".parse::<TranslationProvider>().unwrap(), TranslationProvider::DeepSeek);
    assert_eq!("lmstudio".parse::<TranslationProvider>().unwrap(), TranslationProvider::LMStudio);
    assert_eq!("ANTHROPIC".parse::<TranslationProvider>().unwrap(), TranslationProvider::Anthropic);
    assert!("ollama".parse::<TranslationProvider>().is_err());
}

/// Model overrides only touch the active provider
#[test]
fn test_set_model_withActiveProvider_shouldOnlyChangeThatEntry() {
    let mut config = Config::default();
    config.translation.provider = TranslationProvider::OpenAI;
    config.set_model("gpt-4o-mini");

    assert_eq!(config.translation.get_model(), "gpt-4o-mini");
    config.translation.provider = TranslationProvider::DeepSeek;
    assert_eq!(config.translation.get_model(), "deepseek-chat");
}

/// A missing config file is created with the defaults, an existing one is read back
#[test]
fn test_load_or_create_withMissingThenExistingFile_shouldCreateThenRead() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = temp_dir.path().join("conf.json");

    let (created, was_created) = Config::load_or_create(&path)?;
    assert!(was_created);
    assert!(path.exists());
    assert_eq!(created.processing.batch_size, 10);

    common::create_test_file(temp_dir.path(), "conf.json", r#"{"target_language": "de", "processing": {"max_workers": 2}}"#)?;
    let (loaded, was_created) = Config::load_or_create(&path)?;
    assert!(!was_created);
    assert_eq!(loaded.target_language, "de");
    assert_eq!(loaded.processing.max_workers, 2);
    assert_eq!(loaded.processing.batch_size, 10);

    Ok(())
}

/// A broken config file is an error, not a silent default
#[test]
fn test_load_or_create_withInvalidJson_shouldFail() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = common::create_test_file(temp_dir.path(), "conf.json", "{ not json")?;

    assert!(Config::load_or_create(&path).is_err());
    Ok(())
}
