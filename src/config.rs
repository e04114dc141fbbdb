//! Static configuration read from the environment.
//! Runtime overrides (source language, language list, memory sync settings)
//! are stored through `settings::SettingsService` and take precedence.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,

    // Languages
    pub source_language: String,
    pub available_languages: Vec<String>,

    // AI translation
    pub ai_enabled: bool,
    pub ai_api_key: String,
    pub ai_api_url: String,
    pub ai_model: String,
    pub ai_max_tokens: u32,
    pub ai_timeout: Duration,
    pub ai_max_retries: u32,

    // Translation memory
    pub memory_enabled: bool,
    pub memory_auto_sync: bool,
    pub memory_sync_interval_hours: u32,

    // Template scanning
    pub scan_paths: Vec<PathBuf>,

    /// TTL of the per-language value cache.
    pub cache_ttl: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("lexicache.db"),
            source_language: "es".to_string(),
            available_languages: vec!["es".to_string(), "en".to_string()],
            ai_enabled: false,
            ai_api_key: String::new(),
            ai_api_url: "https://api.openai.com/v1/chat/completions".to_string(),
            ai_model: "gpt-4o-mini".to_string(),
            ai_max_tokens: 2000,
            ai_timeout: Duration::from_secs(30),
            ai_max_retries: 0,
            memory_enabled: true,
            memory_auto_sync: false,
            memory_sync_interval_hours: 24,
            scan_paths: vec![PathBuf::from("resources/views")],
            cache_ttl: Duration::from_secs(1800),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            db_path: std::env::var("LEXICACHE_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),

            source_language: std::env::var("TRANSLATIONS_SOURCE_LANGUAGE")
                .map(|v| v.trim().to_lowercase())
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.source_language),
            available_languages: std::env::var("TRANSLATIONS_LANGUAGES")
                .ok()
                .map(|v| split_list(&v))
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.available_languages),

            ai_enabled: env_bool("TRANSLATIONS_AI_ENABLED", defaults.ai_enabled),
            ai_api_key: std::env::var("TRANSLATIONS_AI_KEY").unwrap_or_default(),
            ai_api_url: std::env::var("TRANSLATIONS_AI_URL").unwrap_or(defaults.ai_api_url),
            ai_model: std::env::var("TRANSLATIONS_AI_MODEL").unwrap_or(defaults.ai_model),
            ai_max_tokens: env_parse("TRANSLATIONS_AI_MAX_TOKENS", defaults.ai_max_tokens),
            ai_timeout: Duration::from_secs(env_parse("TRANSLATIONS_AI_TIMEOUT_SECS", 30)),
            ai_max_retries: env_parse("AI_MAX_RETRIES", defaults.ai_max_retries),

            memory_enabled: env_bool("TRANSLATIONS_MEMORY_ENABLED", defaults.memory_enabled),
            memory_auto_sync: env_bool("TRANSLATIONS_MEMORY_AUTO_SYNC", defaults.memory_auto_sync),
            memory_sync_interval_hours: env_parse(
                "TRANSLATIONS_MEMORY_SYNC_INTERVAL_HOURS",
                defaults.memory_sync_interval_hours,
            ),

            scan_paths: std::env::var("TRANSLATIONS_SCAN_PATHS")
                .ok()
                .map(|v| split_list(&v).into_iter().map(PathBuf::from).collect())
                .unwrap_or(defaults.scan_paths),

            cache_ttl: Duration::from_secs(env_parse("TRANSLATIONS_CACHE_TTL_SECS", 1800)),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_list_drops_blanks() {
        assert_eq!(split_list(" es, en ,,fr "), vec!["es", "en", "fr"]);
        assert!(split_list(" , ").is_empty());
    }

    #[test]
    fn defaults_match_documented_values() {
        let c = Config::default();
        assert_eq!(c.source_language, "es");
        assert_eq!(c.available_languages, vec!["es", "en"]);
        assert!(!c.ai_enabled);
        assert!(c.memory_enabled);
        assert_eq!(c.ai_timeout, Duration::from_secs(30));
        assert_eq!(c.ai_max_retries, 0);
    }
}
