//! Periodic import of existing translations into memory.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::db::now_unix;
use crate::error::{Error, Result};
use crate::languages::LanguageManager;
use crate::settings::{SettingsService, MEMORY_AUTO_SYNC, MEMORY_LAST_SYNC, MEMORY_SYNC_INTERVAL};
use crate::source::SourceTextStore;
use crate::translate::{ImportReport, MemoryStore};

const MAX_INTERVAL_HOURS: u32 = 720;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemoryConfig {
    pub auto_sync_enabled: bool,
    pub sync_interval_hours: u32,
    /// Unix seconds of the last completed sync.
    pub last_sync: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    Disabled,
    NotDue { hours_since: i64, interval_hours: u32 },
    NoTargetLanguages,
    Completed(ImportReport),
}

pub struct MemorySync {
    memory: Arc<MemoryStore>,
    source: Arc<dyn SourceTextStore>,
    settings: Arc<SettingsService>,
    languages: Arc<LanguageManager>,
    default_auto_sync: bool,
    default_interval_hours: u32,
}

impl MemorySync {
    pub fn new(
        memory: Arc<MemoryStore>,
        source: Arc<dyn SourceTextStore>,
        settings: Arc<SettingsService>,
        languages: Arc<LanguageManager>,
        default_auto_sync: bool,
        default_interval_hours: u32,
    ) -> Self {
        Self {
            memory,
            source,
            settings,
            languages,
            default_auto_sync,
            default_interval_hours,
        }
    }

    /// Auto-sync is on when either the stored setting or the static config
    /// enables it. The stored interval wins over the config.
    pub fn memory_config(&self) -> Result<MemoryConfig> {
        let auto_sync_enabled =
            self.settings.get(MEMORY_AUTO_SYNC, "0")? == "1" || self.default_auto_sync;
        let sync_interval_hours = self
            .settings
            .get(MEMORY_SYNC_INTERVAL, "")?
            .parse::<u32>()
            .ok()
            .filter(|h| *h > 0)
            .unwrap_or(self.default_interval_hours);
        let last_sync = self.settings.get(MEMORY_LAST_SYNC, "")?.parse::<i64>().ok();

        Ok(MemoryConfig {
            auto_sync_enabled,
            sync_interval_hours,
            last_sync,
        })
    }

    pub fn set_memory_config(&self, auto_sync_enabled: bool, sync_interval_hours: u32) -> Result<()> {
        if !(1..=MAX_INTERVAL_HOURS).contains(&sync_interval_hours) {
            return Err(Error::InvalidInput(format!(
                "sync interval must be 1-{MAX_INTERVAL_HOURS} hours, got {sync_interval_hours}"
            )));
        }
        self.settings
            .set(MEMORY_AUTO_SYNC, if auto_sync_enabled { "1" } else { "0" })?;
        self.settings
            .set(MEMORY_SYNC_INTERVAL, &sync_interval_hours.to_string())?;
        info!(auto_sync_enabled, sync_interval_hours, "memory sync config saved");
        Ok(())
    }

    pub fn should_run(&self, force: bool) -> Result<bool> {
        Ok(self.check_due(force, now_unix())?.is_none())
    }

    /// Import existing translations unless the job is disabled or not due.
    /// `force` skips both checks.
    pub fn run(&self, force: bool) -> Result<SyncOutcome> {
        if let Some(skip) = self.check_due(force, now_unix())? {
            debug!(?skip, "memory sync skipped");
            return Ok(skip);
        }

        let source_lang = self.languages.source_lang()?;
        let targets = self.languages.target_languages()?;
        if targets.is_empty() {
            warn!("no target languages configured, memory sync skipped");
            return Ok(SyncOutcome::NoTargetLanguages);
        }

        let report =
            self.memory
                .import_from_source_records(self.source.as_ref(), &source_lang, &targets)?;
        self.settings.set(MEMORY_LAST_SYNC, &now_unix().to_string())?;
        Ok(SyncOutcome::Completed(report))
    }

    /// Run the job every `interval` until `token` is cancelled. Each tick
    /// honours the auto-sync flag and configured interval.
    pub fn spawn_loop(self: Arc<Self>, interval: Duration, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("memory sync loop stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        match self.run(false) {
                            Ok(SyncOutcome::Completed(report)) => info!(
                                imported = report.imported,
                                skipped = report.skipped,
                                "scheduled memory sync done"
                            ),
                            Ok(_) => {}
                            Err(e) => warn!(error = %e, "scheduled memory sync failed"),
                        }
                    }
                }
            }
        })
    }

    fn check_due(&self, force: bool, now: i64) -> Result<Option<SyncOutcome>> {
        if force {
            return Ok(None);
        }

        let config = self.memory_config()?;
        if !config.auto_sync_enabled {
            return Ok(Some(SyncOutcome::Disabled));
        }
        if let Some(last) = config.last_sync {
            let hours_since = (now - last).max(0) / 3600;
            if hours_since < i64::from(config.sync_interval_hours) {
                return Ok(Some(SyncOutcome::NotDue {
                    hours_since,
                    interval_hours: config.sync_interval_hours,
                }));
            }
        }
        Ok(None)
    }
}
