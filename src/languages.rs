//! Source language and configured language list.
//! Settings override the static config; the source language is always
//! part of the list and can never be removed.

use std::sync::Arc;

use tracing::info;

use crate::error::{Error, Result};
use crate::settings::{SettingsService, AVAILABLE_LANGUAGES, SOURCE_LANGUAGE};
use crate::source::SqliteSourceStore;

/// Display metadata: (code, flag, name).
const LANGUAGE_META: &[(&str, &str, &str)] = &[
    ("es", "🇪🇸", "Español"),
    ("en", "🇺🇸", "English"),
    ("pt", "🇧🇷", "Português"),
    ("de", "🇩🇪", "Deutsch"),
    ("fr", "🇫🇷", "Français"),
    ("it", "🇮🇹", "Italiano"),
    ("ja", "🇯🇵", "日本語"),
    ("zh", "🇨🇳", "中文"),
    ("ko", "🇰🇷", "한국어"),
    ("ru", "🇷🇺", "Русский"),
    ("ar", "🇸🇦", "العربية"),
    ("hi", "🇮🇳", "हिन्दी"),
    ("nl", "🇳🇱", "Nederlands"),
    ("sv", "🇸🇪", "Svenska"),
    ("pl", "🇵🇱", "Polski"),
    ("tr", "🇹🇷", "Türkçe"),
];

/// Native display name of a language code, if known.
pub fn language_name(code: &str) -> Option<&'static str> {
    LANGUAGE_META
        .iter()
        .find(|(c, _, _)| *c == code)
        .map(|(_, _, name)| *name)
}

pub fn language_flag(code: &str) -> Option<&'static str> {
    LANGUAGE_META
        .iter()
        .find(|(c, _, _)| *c == code)
        .map(|(_, flag, _)| *flag)
}

/// Lowercase + trim, 2 to 10 characters.
pub fn normalize_code(lang: &str) -> Result<String> {
    let code = lang.trim().to_lowercase();
    if !(2..=10).contains(&code.chars().count()) {
        return Err(Error::InvalidInput(format!(
            "language code must be 2-10 characters: {lang:?}"
        )));
    }
    Ok(code)
}

pub struct LanguageManager {
    settings: Arc<SettingsService>,
    source: Arc<SqliteSourceStore>,
    default_source: String,
    default_languages: Vec<String>,
}

impl LanguageManager {
    pub fn new(
        settings: Arc<SettingsService>,
        source: Arc<SqliteSourceStore>,
        default_source: &str,
        default_languages: &[String],
    ) -> Self {
        Self {
            settings,
            source,
            default_source: default_source.to_string(),
            default_languages: default_languages.to_vec(),
        }
    }

    pub fn source_lang(&self) -> Result<String> {
        let stored = self.settings.get(SOURCE_LANGUAGE, "")?;
        if stored.is_empty() {
            Ok(self.default_source.clone())
        } else {
            Ok(stored)
        }
    }

    /// Switch the source language. It must already be configured.
    pub fn set_source_lang(&self, lang: &str) -> Result<()> {
        let code = normalize_code(lang)?;
        if !self.languages()?.contains(&code) {
            return Err(Error::InvalidInput(format!(
                "language '{code}' is not configured"
            )));
        }
        self.settings.set(SOURCE_LANGUAGE, &code)?;
        self.source.invalidate_cache();
        info!(lang = %code, "source language changed");
        Ok(())
    }

    /// Configured languages; the source is prepended when missing.
    pub fn languages(&self) -> Result<Vec<String>> {
        let src = self.source_lang()?;
        let raw = self.settings.get(AVAILABLE_LANGUAGES, "")?;

        let stored: Vec<String> = if raw.is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&raw).unwrap_or_default()
        };
        let mut langs = if stored.is_empty() {
            self.default_languages.clone()
        } else {
            stored
        };

        if !langs.contains(&src) {
            langs.insert(0, src);
        }
        Ok(langs)
    }

    /// Every configured language except the source.
    pub fn target_languages(&self) -> Result<Vec<String>> {
        let src = self.source_lang()?;
        Ok(self
            .languages()?
            .into_iter()
            .filter(|l| *l != src)
            .collect())
    }

    /// Persist the list, prepending the source when missing and dropping duplicates.
    pub fn save_languages(&self, langs: &[String]) -> Result<()> {
        let src = self.source_lang()?;
        let mut out: Vec<String> = Vec::with_capacity(langs.len() + 1);
        if !langs.contains(&src) {
            out.push(src);
        }
        for lang in langs {
            if !out.contains(lang) {
                out.push(lang.clone());
            }
        }
        self.settings
            .set(AVAILABLE_LANGUAGES, &serde_json::to_string(&out)?)
    }

    pub fn add_language(&self, lang: &str) -> Result<Vec<String>> {
        let code = normalize_code(lang)?;
        let mut langs = self.languages()?;
        if langs.contains(&code) {
            return Err(Error::InvalidInput(format!("language '{code}' already exists")));
        }
        langs.push(code.clone());
        self.save_languages(&langs)?;
        self.source.invalidate_cache();
        info!(lang = %code, "language added");
        self.languages()
    }

    /// Remove a language and delete its strings. The source language is refused.
    pub fn remove_language(&self, lang: &str) -> Result<Vec<String>> {
        if lang == self.source_lang()? {
            return Err(Error::InvalidInput("cannot remove source language".into()));
        }

        let langs: Vec<String> = self
            .languages()?
            .into_iter()
            .filter(|l| l != lang)
            .collect();
        self.save_languages(&langs)?;
        self.source.delete_lang(lang)?;
        info!(lang, "language removed");
        self.languages()
    }
}
