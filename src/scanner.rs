//! Discover translatable strings and register them in the source store.
//!
//! `TemplateScanner` walks template directories for `t('group.key', 'fallback')`
//! calls. Additional sources plug in through [`TranslationScanner`].

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::source::SourceTextStore;

/// Group used for keys without a dot.
pub const ROOT_GROUP: &str = "_root";

const TEMPLATE_EXTENSIONS: &[&str] = &["php", "html"];
const T_CALL_PATTERN: &str = r"t\(\s*'([^']+)'\s*,\s*'([^']*)'\s*\)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScannedKey {
    pub group: String,
    pub key: String,
    /// Source-language text used when the key is first registered.
    pub fallback: String,
}

/// A source of translatable strings.
pub trait TranslationScanner: Send + Sync {
    fn scan(&self) -> Result<Vec<ScannedKey>>;
}

pub struct TemplateScanner {
    paths: Vec<PathBuf>,
    pattern: Regex,
}

impl TemplateScanner {
    pub fn new(paths: Vec<PathBuf>) -> Result<Self> {
        let pattern = Regex::new(T_CALL_PATTERN)
            .map_err(|e| Error::Config(format!("invalid template pattern: {e}")))?;
        Ok(Self { paths, pattern })
    }

    /// Extract `t()` calls from one file's content, in order of appearance.
    /// Calls whose key splits into an empty group or key are skipped.
    pub fn scan_source(&self, content: &str) -> Vec<ScannedKey> {
        self.pattern
            .captures_iter(content)
            .filter_map(|caps| {
                let (group, key) = split_key(&caps[1]);
                if group.trim().is_empty() || key.trim().is_empty() {
                    warn!(key = &caps[1], "malformed template key, skipped");
                    return None;
                }
                Some(ScannedKey {
                    group: group.to_string(),
                    key: key.to_string(),
                    fallback: caps[2].to_string(),
                })
            })
            .collect()
    }

    fn collect_files(&self, dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
        let mut entries = fs::read_dir(dir)?
            .map(|e| e.map(|e| e.path()))
            .collect::<std::io::Result<Vec<_>>>()?;
        entries.sort();

        for path in entries {
            if path.is_dir() {
                self.collect_files(&path, out)?;
            } else if path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| TEMPLATE_EXTENSIONS.contains(&e))
            {
                out.push(path);
            }
        }
        Ok(())
    }
}

impl TranslationScanner for TemplateScanner {
    /// Duplicate `group.key` pairs collapse: the last fallback wins, the
    /// first position is kept.
    fn scan(&self) -> Result<Vec<ScannedKey>> {
        let mut files = Vec::new();
        for root in &self.paths {
            if !root.is_dir() {
                debug!(path = %root.display(), "scan path missing, skipped");
                continue;
            }
            self.collect_files(root, &mut files)?;
        }

        let mut found: Vec<ScannedKey> = Vec::new();
        let mut index: HashMap<(String, String), usize> = HashMap::new();

        for file in &files {
            let content = match fs::read_to_string(file) {
                Ok(c) => c,
                Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                    warn!(path = %file.display(), "template is not valid UTF-8, skipped");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            for item in self.scan_source(&content) {
                match index.get(&(item.group.clone(), item.key.clone())) {
                    Some(&i) => found[i].fallback = item.fallback,
                    None => {
                        index.insert((item.group.clone(), item.key.clone()), found.len());
                        found.push(item);
                    }
                }
            }
        }

        info!(files = files.len(), keys = found.len(), "template scan finished");
        Ok(found)
    }
}

/// `group.key` split on the first dot; no dot means the root group.
pub(crate) fn split_key(full: &str) -> (&str, &str) {
    match full.split_once('.') {
        Some((group, key)) => (group, key),
        None => (ROOT_GROUP, full),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub created: u32,
    pub updated: u32,
}

/// Register every scanned key in every language.
/// Missing records are created (source language gets the fallback, others
/// stay empty). An empty source value is filled from a non-empty fallback;
/// anything already translated is left alone.
pub fn sync_texts(
    scanners: &[&dyn TranslationScanner],
    store: &dyn SourceTextStore,
    languages: &[String],
    source_lang: &str,
) -> Result<SyncReport> {
    let mut report = SyncReport::default();

    for scanner in scanners {
        for item in scanner.scan()? {
            if item.group.trim().is_empty() || item.key.trim().is_empty() {
                warn!(group = %item.group, key = %item.key, "scanned key without group or key, skipped");
                continue;
            }
            for lang in languages {
                let is_source = lang == source_lang;
                match store.get(&item.group, &item.key, lang)? {
                    None => {
                        let value = if is_source { item.fallback.as_str() } else { "" };
                        store.upsert(&item.group, &item.key, lang, value)?;
                        report.created += 1;
                    }
                    Some(existing)
                        if is_source && existing.value.is_empty() && !item.fallback.is_empty() =>
                    {
                        store.upsert(&item.group, &item.key, lang, &item.fallback)?;
                        report.updated += 1;
                    }
                    Some(_) => {}
                }
            }
        }
    }

    info!(created = report.created, updated = report.updated, "texts synced");
    Ok(report)
}
