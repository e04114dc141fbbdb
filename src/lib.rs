//! Lexicache: localized string store with a content-hashed translation
//! memory in front of an AI translator.
//! Library root: module wiring, tracing setup and the shared app context.

pub mod config;
pub mod db;
pub mod error;
pub mod languages;
pub mod scanner;
pub mod settings;
pub mod source;
pub mod sync;
pub mod translate;
pub mod usage;

use std::sync::Arc;

use tracing::info;

pub use config::Config;
pub use error::{Error, Result};

use languages::LanguageManager;
use scanner::{SyncReport, TemplateScanner, TranslationScanner};
use settings::SettingsService;
use source::SqliteSourceStore;
use sync::MemorySync;
use translate::{MemoryStore, OpenAiTranslator, TranslationOrchestrator, Translator};
use usage::UsageLog;

/// Install the global fmt subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("lexicache=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Every store and service, opened against one database file.
pub struct AppContext {
    pub config: Config,
    pub settings: Arc<SettingsService>,
    pub source: Arc<SqliteSourceStore>,
    pub languages: Arc<LanguageManager>,
    pub memory: Arc<MemoryStore>,
    pub usage: Arc<UsageLog>,
    pub orchestrator: TranslationOrchestrator,
    pub sync: Arc<MemorySync>,
}

impl AppContext {
    /// Open all stores with the given translator.
    /// Must be called from within a Tokio runtime (the usage log spawns its writer).
    pub fn open(config: Config, translator: Arc<dyn Translator>) -> Result<Self> {
        let db_path = config.db_path.as_path();

        let settings = Arc::new(SettingsService::open(db_path)?);
        let source = Arc::new(SqliteSourceStore::open(db_path, config.cache_ttl)?);
        let memory = Arc::new(MemoryStore::open(db_path)?);
        let usage = UsageLog::open(db_path)?;

        let languages = Arc::new(LanguageManager::new(
            Arc::clone(&settings),
            Arc::clone(&source),
            &config.source_language,
            &config.available_languages,
        ));

        let orchestrator = TranslationOrchestrator::new(
            Arc::clone(&memory),
            source.clone(),
            Arc::clone(&languages),
            translator,
            config.memory_enabled,
        )
        .with_usage_log(Arc::clone(&usage));

        let sync = Arc::new(MemorySync::new(
            Arc::clone(&memory),
            source.clone(),
            Arc::clone(&settings),
            Arc::clone(&languages),
            config.memory_auto_sync,
            config.memory_sync_interval_hours,
        ));

        info!(
            db = %config.db_path.display(),
            memory_enabled = config.memory_enabled,
            "lexicache context ready"
        );

        Ok(Self {
            config,
            settings,
            source,
            languages,
            memory,
            usage,
            orchestrator,
            sync,
        })
    }

    /// Open all stores with the OpenAI-compatible translator from `config`.
    pub fn from_config(config: Config) -> Result<Self> {
        let translator = OpenAiTranslator::new(&config)
            .map_err(|e| Error::Config(format!("translator setup failed: {e}")))?;
        if !translator.is_enabled() {
            info!("AI translation disabled; only memory hits will be applied");
        }
        Self::open(config, Arc::new(translator))
    }

    /// Scan the configured template paths plus `extra` scanners and register
    /// every discovered key in every configured language.
    pub fn sync_texts(&self, extra: &[&dyn TranslationScanner]) -> Result<SyncReport> {
        let templates = TemplateScanner::new(self.config.scan_paths.clone())?;
        let mut scanners: Vec<&dyn TranslationScanner> = Vec::with_capacity(extra.len() + 1);
        scanners.push(&templates);
        scanners.extend_from_slice(extra);

        let source_lang = self.languages.source_lang()?;
        let languages = self.languages.languages()?;
        scanner::sync_texts(&scanners, self.source.as_ref(), &languages, &source_lang)
    }

    /// Flush pending usage records.
    pub async fn shutdown(&self) {
        self.usage.shutdown().await;
    }
}
