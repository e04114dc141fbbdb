//! Localized string records addressed by `(group, key, lang)`.
//! An empty value means the string is untranslated in that language.

pub mod cache;
pub mod sqlite;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use sqlite::SqliteSourceStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: i64,
    pub group: String,
    pub key: String,
    pub lang: String,
    pub value: String,
}

impl SourceRecord {
    /// `group.key`, used as memory context and in usage details.
    pub fn full_key(&self) -> String {
        format!("{}.{}", self.group, self.key)
    }
}

/// Read/write access to localized strings.
pub trait SourceTextStore: Send + Sync {
    fn get(&self, group: &str, key: &str, lang: &str) -> Result<Option<SourceRecord>>;

    /// Insert or replace the value for `(group, key, lang)`.
    fn upsert(&self, group: &str, key: &str, lang: &str, value: &str) -> Result<()>;

    /// All records of a language ordered by group then key.
    fn list_by_lang(&self, lang: &str, group: Option<&str>) -> Result<Vec<SourceRecord>>;
}
