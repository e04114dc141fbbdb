//! Batch translation: memory first, external translator second.
//!
//! Every `(item, target language)` pair is processed in input order. A pair
//! that already has a value is left alone unless `force` is set. A memory hit
//! writes the remembered text without calling out; a miss calls the
//! translator and feeds the result back into memory.
//!
//! Translator failures are counted in [`BatchReport::errors`] and the batch
//! moves on. Storage errors abort the call.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::{MemoryStore, QualityIssue, Translator};
use crate::error::{Error, Result};
use crate::languages::LanguageManager;
use crate::source::SourceTextStore;
use crate::usage::{UsageLog, UsageRecord};

/// Largest item list accepted by `translate_batch`.
pub const MAX_BATCH_ITEMS: usize = 10;

/// Values sent to one quality review.
pub const QUALITY_CHECK_LIMIT: usize = 50;

/// One source string to translate, addressed by group and key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub group: String,
    pub key: String,
}

impl BatchItem {
    pub fn new(group: &str, key: &str) -> Result<Self> {
        let item = Self {
            group: group.trim().to_string(),
            key: key.trim().to_string(),
        };
        item.validate()?;
        Ok(item)
    }

    fn validate(&self) -> Result<()> {
        if self.group.trim().is_empty() {
            return Err(Error::InvalidInput(format!(
                "batch item has an empty group (key {:?})",
                self.key
            )));
        }
        if self.key.trim().is_empty() {
            return Err(Error::InvalidInput(format!(
                "batch item has an empty key (group {:?})",
                self.group
            )));
        }
        Ok(())
    }

    fn full_key(&self) -> String {
        format!("{}.{}", self.group, self.key)
    }
}

/// Reject the whole batch if any item is malformed.
pub fn validate_items(items: &[BatchItem]) -> Result<()> {
    items.iter().try_for_each(BatchItem::validate)
}

/// Aggregate outcome of a batch. `from_memory` is a subset of `translated`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub translated: u32,
    pub from_memory: u32,
    pub errors: u32,
    pub tokens_used: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenEstimate {
    pub texts_count: usize,
    pub target_langs: usize,
    pub need_translation: usize,
    pub estimated_tokens: u64,
}

/// Findings of a quality review over one language.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QualityReport {
    pub issues: Vec<QualityIssue>,
    /// Values sent for review.
    pub checked: usize,
}

enum PairOutcome {
    Skipped,
    FromMemory,
    Translated { tokens: u64 },
    Failed,
}

pub struct TranslationOrchestrator {
    memory: Arc<MemoryStore>,
    source: Arc<dyn SourceTextStore>,
    languages: Arc<LanguageManager>,
    translator: Arc<dyn Translator>,
    usage: Option<Arc<UsageLog>>,
    memory_enabled: bool,
}

impl TranslationOrchestrator {
    pub fn new(
        memory: Arc<MemoryStore>,
        source: Arc<dyn SourceTextStore>,
        languages: Arc<LanguageManager>,
        translator: Arc<dyn Translator>,
        memory_enabled: bool,
    ) -> Self {
        Self {
            memory,
            source,
            languages,
            translator,
            usage: None,
            memory_enabled,
        }
    }

    /// Record every external call in the usage log.
    pub fn with_usage_log(mut self, usage: Arc<UsageLog>) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Translate up to [`MAX_BATCH_ITEMS`] explicitly chosen items.
    pub async fn translate_batch(
        &self,
        items: &[BatchItem],
        target_langs: &[String],
        force: bool,
    ) -> Result<BatchReport> {
        if items.is_empty() || items.len() > MAX_BATCH_ITEMS {
            return Err(Error::InvalidInput(format!(
                "batch must hold 1 to {MAX_BATCH_ITEMS} items, got {}",
                items.len()
            )));
        }
        self.run("translate_batch", items, target_langs, force).await
    }

    /// Translate a single key. `None` targets every non-source language.
    pub async fn translate_key(
        &self,
        group: &str,
        key: &str,
        target_langs: Option<&[String]>,
        force: bool,
    ) -> Result<BatchReport> {
        let item = BatchItem::new(group, key)?;
        let src = self.languages.source_lang()?;
        if self.source.get(&item.group, &item.key, &src)?.is_none() {
            return Err(Error::NotFound(format!(
                "source text {} ({src})",
                item.full_key()
            )));
        }

        let targets = self.resolve_targets(target_langs)?;
        self.run("translate_key", &[item], &targets, force).await
    }

    /// Translate every source key, optionally limited to one group.
    /// Stored rows with an empty group or key are skipped with a warning.
    pub async fn translate_missing(
        &self,
        group: Option<&str>,
        target_langs: Option<&[String]>,
        force: bool,
    ) -> Result<BatchReport> {
        let src = self.languages.source_lang()?;
        let items: Vec<BatchItem> = self
            .source
            .list_by_lang(&src, group)?
            .into_iter()
            .filter_map(|r| {
                let id = r.id;
                let item = BatchItem {
                    group: r.group,
                    key: r.key,
                };
                match item.validate() {
                    Ok(()) => Some(item),
                    Err(e) => {
                        warn!(id, error = %e, "malformed source row, skipped");
                        None
                    }
                }
            })
            .collect();

        if items.is_empty() {
            return Err(Error::NotFound(match group {
                Some(g) => format!("no source keys in group {g:?}"),
                None => "no source keys".into(),
            }));
        }

        let targets = self.resolve_targets(target_langs)?;
        self.run("translate_missing", &items, &targets, force).await
    }

    /// Rough token cost of translating every missing pair.
    pub fn token_estimate(&self, group: Option<&str>) -> Result<TokenEstimate> {
        let src = self.languages.source_lang()?;
        let targets = self.languages.target_languages()?;
        let sources = self.source.list_by_lang(&src, group)?;

        let total_chars: usize = sources.iter().map(|s| s.value.chars().count()).sum();

        let mut need_translation = 0;
        for record in &sources {
            for lang in &targets {
                let present = self
                    .source
                    .get(&record.group, &record.key, lang)?
                    .is_some_and(|t| !t.value.is_empty());
                if !present {
                    need_translation += 1;
                }
            }
        }

        let avg_chars = total_chars / sources.len().max(1);
        let tokens_per_call = 50 + (avg_chars / 4) as u64 * 2;

        Ok(TokenEstimate {
            texts_count: sources.len(),
            target_langs: targets.len(),
            need_translation,
            estimated_tokens: need_translation as u64 * tokens_per_call,
        })
    }

    /// Have the translator review up to [`QUALITY_CHECK_LIMIT`] non-empty
    /// values of `lang`, sent as `group.key: value` lines.
    pub async fn quality_check(&self, lang: &str) -> Result<QualityReport> {
        let values: Vec<String> = self
            .source
            .list_by_lang(lang, None)?
            .into_iter()
            .filter(|r| !r.value.is_empty())
            .take(QUALITY_CHECK_LIMIT)
            .map(|r| format!("{}: {}", r.full_key(), r.value))
            .collect();
        if values.is_empty() {
            return Err(Error::NotFound(format!("no translations for {lang}")));
        }

        let checked = values.len();
        let review = self
            .translator
            .review(&values.join("\n"))
            .instrument(info_span!("quality_check", lang, checked))
            .await?;

        if let Some(usage) = &self.usage {
            let mut record = UsageRecord::new(
                "quality_check",
                self.translator.model(),
                review.usage,
                format!("{lang}: {} issues", review.issues.len()),
            );
            record.items_count = checked as u32;
            usage.record(record);
        }

        info!(lang, checked, issues = review.issues.len(), "quality check finished");
        Ok(QualityReport {
            issues: review.issues,
            checked,
        })
    }

    fn resolve_targets(&self, target_langs: Option<&[String]>) -> Result<Vec<String>> {
        match target_langs {
            Some(langs) => Ok(langs.to_vec()),
            None => self.languages.target_languages(),
        }
    }

    async fn run(
        &self,
        action: &'static str,
        items: &[BatchItem],
        target_langs: &[String],
        force: bool,
    ) -> Result<BatchReport> {
        validate_items(items)?;

        let src = self.languages.source_lang()?;
        let mut targets: Vec<&str> = Vec::with_capacity(target_langs.len());
        for lang in target_langs {
            if lang != &src && !targets.contains(&lang.as_str()) {
                targets.push(lang);
            }
        }

        let batch_id = Uuid::new_v4();
        let span = info_span!(
            "translate",
            %batch_id,
            action,
            items = items.len(),
            langs = targets.len(),
            force
        );

        async {
            let mut report = BatchReport::default();

            for item in items {
                let source_text = self
                    .source
                    .get(&item.group, &item.key, &src)?
                    .map(|r| r.value)
                    .unwrap_or_default();
                if source_text.is_empty() {
                    debug!(key = %item.full_key(), "empty source text, skipped");
                    continue;
                }

                for lang in &targets {
                    let outcome = self
                        .translate_pair(action, item, &source_text, &src, lang, force)
                        .await?;
                    match outcome {
                        PairOutcome::Skipped => {}
                        PairOutcome::FromMemory => {
                            report.translated += 1;
                            report.from_memory += 1;
                        }
                        PairOutcome::Translated { tokens } => {
                            report.translated += 1;
                            report.tokens_used += tokens;
                        }
                        PairOutcome::Failed => report.errors += 1,
                    }
                }
            }

            info!(
                translated = report.translated,
                from_memory = report.from_memory,
                errors = report.errors,
                tokens_used = report.tokens_used,
                "batch finished"
            );
            Ok::<_, Error>(report)
        }
        .instrument(span)
        .await
    }

    async fn translate_pair(
        &self,
        action: &str,
        item: &BatchItem,
        source_text: &str,
        source_lang: &str,
        target_lang: &str,
        force: bool,
    ) -> Result<PairOutcome> {
        if !force {
            let existing = self.source.get(&item.group, &item.key, target_lang)?;
            if existing.is_some_and(|r| !r.value.is_empty()) {
                return Ok(PairOutcome::Skipped);
            }
        }

        if self.memory_enabled {
            if let Some(hit) = self.memory.find_exact(source_text, source_lang, target_lang)? {
                self.source
                    .upsert(&item.group, &item.key, target_lang, &hit.target_text)?;
                return Ok(PairOutcome::FromMemory);
            }
        }

        let context = item.full_key();
        let translation = match self
            .translator
            .translate(source_text, target_lang, Some(&context))
            .await
        {
            Ok(t) => t,
            Err(e) => {
                warn!(key = %context, target_lang, error = %e, "translation failed");
                return Ok(PairOutcome::Failed);
            }
        };

        let text = translation.text.trim();
        if text.is_empty() {
            warn!(key = %context, target_lang, "translator returned empty text");
            return Ok(PairOutcome::Failed);
        }

        self.source.upsert(&item.group, &item.key, target_lang, text)?;

        if let Some(usage) = &self.usage {
            usage.record(UsageRecord::new(
                action,
                self.translator.model(),
                translation.usage,
                format!("{context} → {target_lang}"),
            ));
        }

        if self.memory_enabled {
            self.memory
                .remember(source_text, text, source_lang, target_lang, Some(&context))?;
        }

        Ok(PairOutcome::Translated {
            tokens: translation.usage.total_tokens,
        })
    }
}
