//! SQLite-backed string store (`site_translations`).
//! Reads of whole languages go through the LRU language cache; every write
//! invalidates it.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::cache::{LangCache, LangValues};
use super::{SourceRecord, SourceTextStore};
use crate::db::{now_unix, open_connection, placeholders};
use crate::error::{Error, Result};
use crate::scanner::split_key;

/// Languages kept in the value cache at once.
const LANG_CACHE_CAPACITY: usize = 32;

const SELECT_COLUMNS: &str = r#"id, "group", key, lang, value"#;

/// Translated-value count for one language.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LangCoverage {
    pub count: u64,
    pub total: u64,
    /// Percentage rounded to one decimal.
    pub percent: f64,
}

/// Missing translations of one group, per target language.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupCoverage {
    pub group: String,
    pub total_keys: u64,
    pub missing_by_lang: BTreeMap<String, u64>,
    pub total_missing: u64,
}

pub struct SqliteSourceStore {
    conn: Mutex<Connection>,
    cache: LangCache,
}

impl SqliteSourceStore {
    /// Open (or create) the string table at the given path.
    pub fn open(db_path: &Path, cache_ttl: Duration) -> Result<Self> {
        let conn = open_connection(db_path)?;

        conn.execute_batch(
            r#"CREATE TABLE IF NOT EXISTS site_translations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                "group" TEXT NOT NULL,
                key TEXT NOT NULL,
                lang TEXT NOT NULL,
                value TEXT NOT NULL DEFAULT '',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS st_unique_group_key_lang
                ON site_translations("group", key, lang);
            CREATE INDEX IF NOT EXISTS idx_st_lang
                ON site_translations(lang);"#,
        )?;

        info!(path = %db_path.display(), "string store opened");

        Ok(Self {
            conn: Mutex::new(conn),
            cache: LangCache::new(LANG_CACHE_CAPACITY, cache_ttl),
        })
    }

    pub fn get_by_id(&self, id: i64) -> Result<Option<SourceRecord>> {
        let conn = self.conn.lock();
        let record = conn
            .query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM site_translations WHERE id = ?1"),
                params![id],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Create a key in every language without touching existing rows.
    /// The source language gets `source_value`, the others start empty.
    /// Returns how many rows were created.
    pub fn create_key(
        &self,
        group: &str,
        key: &str,
        source_value: &str,
        source_lang: &str,
        languages: &[String],
    ) -> Result<usize> {
        if group.trim().is_empty() || key.trim().is_empty() {
            return Err(Error::InvalidInput("group and key are required".into()));
        }

        let now = now_unix();
        let mut created = 0;
        {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare_cached(
                r#"INSERT INTO site_translations ("group", key, lang, value, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                 ON CONFLICT("group", key, lang) DO NOTHING"#,
            )?;
            for lang in languages {
                let value = if lang == source_lang { source_value } else { "" };
                created += stmt.execute(params![group, key, lang, value, now])?;
            }
        }

        self.cache.invalidate();
        info!(group, key, created, "string key created");
        Ok(created)
    }

    /// Replace the value of a record. Returns false if the id is unknown.
    pub fn update_value(&self, id: i64, value: &str) -> Result<bool> {
        let changed = self.conn.lock().execute(
            "UPDATE site_translations SET value = ?1, updated_at = ?2 WHERE id = ?3",
            params![value, now_unix(), id],
        )?;
        self.cache.invalidate();
        Ok(changed > 0)
    }

    /// Empty a translated value. Source-language text cannot be cleared.
    pub fn clear_value(&self, id: i64, source_lang: &str) -> Result<bool> {
        let record = self
            .get_by_id(id)?
            .ok_or_else(|| Error::NotFound(format!("string record {id}")))?;
        if record.lang == source_lang {
            return Err(Error::InvalidInput(
                "cannot clear source language text".into(),
            ));
        }
        self.update_value(id, "")
    }

    pub fn delete(&self, id: i64) -> Result<bool> {
        let changed = self
            .conn
            .lock()
            .execute("DELETE FROM site_translations WHERE id = ?1", params![id])?;
        self.cache.invalidate();
        Ok(changed > 0)
    }

    /// Delete records by id, never touching source-language rows.
    pub fn bulk_delete(&self, ids: &[i64], source_lang: &str) -> Result<usize> {
        if ids.is_empty() {
            return Err(Error::InvalidInput("at least one id is required".into()));
        }

        let sql = format!(
            "DELETE FROM site_translations WHERE lang != ?{} AND id IN ({})",
            ids.len() + 1,
            placeholders(ids.len())
        );
        let mut values: Vec<rusqlite::types::Value> =
            ids.iter().map(|id| (*id).into()).collect();
        values.push(source_lang.to_string().into());

        let deleted = self.conn.lock().execute(&sql, params_from_iter(values))?;
        self.cache.invalidate();
        Ok(deleted)
    }

    /// Drop every record of a language.
    pub fn delete_lang(&self, lang: &str) -> Result<usize> {
        let deleted = self
            .conn
            .lock()
            .execute("DELETE FROM site_translations WHERE lang = ?1", params![lang])?;
        self.cache.invalidate();
        info!(lang, deleted, "language strings deleted");
        Ok(deleted)
    }

    /// Sorted distinct groups present in a language.
    pub fn groups(&self, lang: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"SELECT DISTINCT "group" FROM site_translations WHERE lang = ?1 ORDER BY "group""#,
        )?;
        let groups = stmt
            .query_map(params![lang], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(groups)
    }

    /// Every value of a language, grouped. Served from the cache when fresh.
    pub fn all_for_lang(&self, lang: &str) -> Result<Arc<LangValues>> {
        if let Some(values) = self.cache.get(lang) {
            return Ok(values);
        }

        let generation = self.cache.generation();
        let mut values = LangValues::new();
        for record in self.list_by_lang(lang, None)? {
            values
                .entry(record.group)
                .or_insert_with(HashMap::new)
                .insert(record.key, record.value);
        }

        let values = Arc::new(values);
        if self.cache.insert(lang, Arc::clone(&values), generation) {
            debug!(lang, groups = values.len(), "language values cached");
        } else {
            debug!(lang, "store written during load, values not cached");
        }
        Ok(values)
    }

    /// Single value lookup with a fallback, through the language cache.
    pub fn value_or(&self, group: &str, key: &str, lang: &str, default: &str) -> Result<String> {
        let values = self.all_for_lang(lang)?;
        Ok(values
            .get(group)
            .and_then(|g| g.get(key))
            .cloned()
            .unwrap_or_else(|| default.to_string()))
    }

    /// Template lookup of a `group.key` (no dot means the root group).
    /// Missing or empty values yield `default`; so does a failed read,
    /// which is logged instead of surfacing in the page.
    pub fn t(&self, full_key: &str, lang: &str, default: &str) -> String {
        self.lookup(full_key, lang)
            .unwrap_or_else(|| default.to_string())
    }

    /// Like [`SqliteSourceStore::t`] for structured values: a value holding a
    /// JSON array or object comes back decoded, anything else as a string.
    /// `None` when the value is missing, empty or unreadable.
    pub fn t_raw(&self, full_key: &str, lang: &str) -> Option<serde_json::Value> {
        let raw = self.lookup(full_key, lang)?;
        match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(v @ (serde_json::Value::Array(_) | serde_json::Value::Object(_))) => Some(v),
            _ => Some(serde_json::Value::String(raw)),
        }
    }

    fn lookup(&self, full_key: &str, lang: &str) -> Option<String> {
        let (group, key) = split_key(full_key);
        match self.all_for_lang(lang) {
            Ok(values) => values
                .get(group)
                .and_then(|g| g.get(key))
                .filter(|v| !v.is_empty())
                .cloned(),
            Err(e) => {
                warn!(key = full_key, lang, error = %e, "translation lookup failed, using default");
                None
            }
        }
    }

    /// `key -> value` for one group of a language.
    pub fn group_values(&self, group: &str, lang: &str) -> Result<HashMap<String, String>> {
        let values = self.all_for_lang(lang)?;
        Ok(values.get(group).cloned().unwrap_or_default())
    }

    pub fn invalidate_cache(&self) {
        self.cache.invalidate();
    }

    /// Non-empty values per language against the source key count.
    pub fn coverage(
        &self,
        languages: &[String],
        source_lang: &str,
    ) -> Result<BTreeMap<String, LangCoverage>> {
        let conn = self.conn.lock();
        let total = count_lang(&conn, source_lang, None)?;

        let mut stats = BTreeMap::new();
        for lang in languages {
            let count = count_translated(&conn, lang, None)?;
            let percent = if total > 0 {
                ((count as f64 / total as f64) * 1000.0).round() / 10.0
            } else {
                0.0
            };
            stats.insert(lang.clone(), LangCoverage { count, total, percent });
        }
        Ok(stats)
    }

    /// Missing translations per group of the source language.
    pub fn coverage_by_group(
        &self,
        languages: &[String],
        source_lang: &str,
    ) -> Result<Vec<GroupCoverage>> {
        let groups = self.groups(source_lang)?;
        let conn = self.conn.lock();

        let mut stats = Vec::with_capacity(groups.len());
        for group in groups {
            let total_keys = count_lang(&conn, source_lang, Some(&group))?;
            let mut missing_by_lang = BTreeMap::new();
            for lang in languages.iter().filter(|l| l.as_str() != source_lang) {
                let translated = count_translated(&conn, lang, Some(&group))?;
                missing_by_lang.insert(lang.clone(), total_keys.saturating_sub(translated));
            }
            let total_missing = missing_by_lang.values().sum();
            stats.push(GroupCoverage {
                group,
                total_keys,
                missing_by_lang,
                total_missing,
            });
        }
        Ok(stats)
    }
}

impl SourceTextStore for SqliteSourceStore {
    fn get(&self, group: &str, key: &str, lang: &str) -> Result<Option<SourceRecord>> {
        let conn = self.conn.lock();
        let record = conn
            .query_row(
                &format!(
                    r#"SELECT {SELECT_COLUMNS} FROM site_translations
                     WHERE "group" = ?1 AND key = ?2 AND lang = ?3"#
                ),
                params![group, key, lang],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    fn upsert(&self, group: &str, key: &str, lang: &str, value: &str) -> Result<()> {
        self.conn.lock().execute(
            r#"INSERT INTO site_translations ("group", key, lang, value, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT("group", key, lang) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at"#,
            params![group, key, lang, value, now_unix()],
        )?;
        self.cache.invalidate();
        Ok(())
    }

    fn list_by_lang(&self, lang: &str, group: Option<&str>) -> Result<Vec<SourceRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&format!(
            r#"SELECT {SELECT_COLUMNS} FROM site_translations
             WHERE lang = ?1 AND (?2 IS NULL OR "group" = ?2)
             ORDER BY "group", key"#
        ))?;
        let records = stmt
            .query_map(params![lang, group], row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<SourceRecord> {
    Ok(SourceRecord {
        id: row.get(0)?,
        group: row.get(1)?,
        key: row.get(2)?,
        lang: row.get(3)?,
        value: row.get(4)?,
    })
}

fn count_lang(conn: &Connection, lang: &str, group: Option<&str>) -> rusqlite::Result<u64> {
    conn.query_row(
        r#"SELECT COUNT(*) FROM site_translations
         WHERE lang = ?1 AND (?2 IS NULL OR "group" = ?2)"#,
        params![lang, group],
        |row| row.get::<_, i64>(0).map(|n| n as u64),
    )
}

fn count_translated(conn: &Connection, lang: &str, group: Option<&str>) -> rusqlite::Result<u64> {
    conn.query_row(
        r#"SELECT COUNT(*) FROM site_translations
         WHERE lang = ?1 AND value != '' AND (?2 IS NULL OR "group" = ?2)"#,
        params![lang, group],
        |row| row.get::<_, i64>(0).map(|n| n as u64),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteSourceStore {
        SqliteSourceStore::open(Path::new(":memory:"), Duration::from_secs(60)).unwrap()
    }

    fn langs(codes: &[&str]) -> Vec<String> {
        codes.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn upsert_then_get() {
        let s = store();
        s.upsert("home", "title", "es", "Inicio").unwrap();
        s.upsert("home", "title", "es", "Portada").unwrap();

        let rec = s.get("home", "title", "es").unwrap().unwrap();
        assert_eq!(rec.value, "Portada");
        assert_eq!(rec.full_key(), "home.title");
        assert!(s.get("home", "title", "en").unwrap().is_none());
    }

    #[test]
    fn create_key_seeds_every_language_once() {
        let s = store();
        let all = langs(&["es", "en", "fr"]);
        assert_eq!(s.create_key("home", "title", "Inicio", "es", &all).unwrap(), 3);

        assert_eq!(s.get("home", "title", "es").unwrap().unwrap().value, "Inicio");
        assert_eq!(s.get("home", "title", "fr").unwrap().unwrap().value, "");

        s.upsert("home", "title", "en", "Home").unwrap();
        assert_eq!(s.create_key("home", "title", "Otro", "es", &all).unwrap(), 0);
        assert_eq!(s.get("home", "title", "en").unwrap().unwrap().value, "Home");
        assert_eq!(s.get("home", "title", "es").unwrap().unwrap().value, "Inicio");
    }

    #[test]
    fn create_key_rejects_blank_names() {
        let s = store();
        let err = s.create_key(" ", "title", "x", "es", &langs(&["es"])).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn writes_invalidate_language_cache() {
        let s = store();
        s.upsert("home", "title", "en", "Home").unwrap();
        assert_eq!(s.value_or("home", "title", "en", "?").unwrap(), "Home");

        s.upsert("home", "title", "en", "Start").unwrap();
        assert_eq!(s.value_or("home", "title", "en", "?").unwrap(), "Start");
        assert_eq!(s.value_or("home", "missing", "en", "?").unwrap(), "?");

        let group = s.group_values("home", "en").unwrap();
        assert_eq!(group.get("title").map(String::as_str), Some("Start"));
    }

    #[test]
    fn clear_value_protects_source_language() {
        let s = store();
        s.upsert("home", "title", "es", "Inicio").unwrap();
        s.upsert("home", "title", "en", "Home").unwrap();
        let es = s.get("home", "title", "es").unwrap().unwrap();
        let en = s.get("home", "title", "en").unwrap().unwrap();

        assert!(matches!(
            s.clear_value(es.id, "es").unwrap_err(),
            Error::InvalidInput(_)
        ));
        assert!(s.clear_value(en.id, "es").unwrap());
        assert_eq!(s.get("home", "title", "en").unwrap().unwrap().value, "");
        assert!(matches!(s.clear_value(999, "es").unwrap_err(), Error::NotFound(_)));
    }

    #[test]
    fn bulk_delete_skips_source_rows() {
        let s = store();
        s.create_key("home", "title", "Inicio", "es", &langs(&["es", "en", "fr"]))
            .unwrap();
        let ids: Vec<i64> = ["es", "en", "fr"]
            .iter()
            .map(|l| s.get("home", "title", l).unwrap().unwrap().id)
            .collect();

        assert_eq!(s.bulk_delete(&ids, "es").unwrap(), 2);
        assert!(s.get("home", "title", "es").unwrap().is_some());
        assert!(s.get("home", "title", "en").unwrap().is_none());
        assert!(s.bulk_delete(&[], "es").is_err());
    }

    #[test]
    fn list_by_lang_filters_and_orders() {
        let s = store();
        s.upsert("b", "z", "es", "1").unwrap();
        s.upsert("a", "y", "es", "2").unwrap();
        s.upsert("a", "x", "es", "3").unwrap();
        s.upsert("a", "x", "en", "3").unwrap();

        let keys: Vec<String> = s
            .list_by_lang("es", None)
            .unwrap()
            .iter()
            .map(SourceRecord::full_key)
            .collect();
        assert_eq!(keys, vec!["a.x", "a.y", "b.z"]);
        assert_eq!(s.list_by_lang("es", Some("b")).unwrap().len(), 1);
        assert_eq!(s.groups("es").unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn coverage_counts_non_empty_values() {
        let s = store();
        let all = langs(&["es", "en", "fr"]);
        s.create_key("home", "title", "Inicio", "es", &all).unwrap();
        s.create_key("home", "body", "Texto", "es", &all).unwrap();
        s.create_key("shop", "cart", "Carrito", "es", &all).unwrap();
        s.upsert("home", "title", "en", "Home").unwrap();

        let cov = s.coverage(&all, "es").unwrap();
        assert_eq!(cov["es"], LangCoverage { count: 3, total: 3, percent: 100.0 });
        assert_eq!(cov["en"].count, 1);
        assert_eq!(cov["en"].percent, 33.3);
        assert_eq!(cov["fr"].count, 0);

        let groups = s.coverage_by_group(&all, "es").unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].group, "home");
        assert_eq!(groups[0].missing_by_lang["en"], 1);
        assert_eq!(groups[0].missing_by_lang["fr"], 2);
        assert_eq!(groups[0].total_missing, 3);
        assert!(!groups[0].missing_by_lang.contains_key("es"));
    }

    #[test]
    fn delete_lang_removes_only_that_language() {
        let s = store();
        s.create_key("home", "title", "Inicio", "es", &langs(&["es", "en"]))
            .unwrap();
        assert_eq!(s.delete_lang("en").unwrap(), 1);
        assert!(s.get("home", "title", "es").unwrap().is_some());
    }

    #[test]
    fn t_falls_back_on_missing_or_empty_values() {
        let s = store();
        s.upsert("home", "title", "en", "Home").unwrap();
        s.upsert("home", "body", "en", "").unwrap();
        s.upsert("_root", "greeting", "en", "Hello").unwrap();
        s.upsert("footer", "legal.copy", "en", "Rights").unwrap();

        assert_eq!(s.t("home.title", "en", "Inicio"), "Home");
        assert_eq!(s.t("home.body", "en", "Cuerpo"), "Cuerpo");
        assert_eq!(s.t("home.nope", "en", "x"), "x");
        assert_eq!(s.t("greeting", "en", "Hola"), "Hello");
        assert_eq!(s.t("footer.legal.copy", "en", "Derechos"), "Rights");
        assert_eq!(s.t("home.title", "de", "Inicio"), "Inicio");
    }

    #[test]
    fn t_returns_default_when_the_read_fails() {
        let s = store();
        s.upsert("home", "title", "en", "Home").unwrap();
        s.conn.lock().execute_batch("DROP TABLE site_translations").unwrap();
        s.invalidate_cache();

        assert_eq!(s.t("home.title", "en", "Inicio"), "Inicio");
        assert_eq!(s.t_raw("home.title", "en"), None);
    }

    #[test]
    fn t_raw_decodes_structured_values_only() {
        let s = store();
        s.upsert("home", "slides", "en", r#"["One","Two"]"#).unwrap();
        s.upsert("home", "meta", "en", r#"{"title":"Home"}"#).unwrap();
        s.upsert("home", "count", "en", "42").unwrap();
        s.upsert("home", "title", "en", "Home").unwrap();
        s.upsert("home", "blank", "en", "").unwrap();

        assert_eq!(s.t_raw("home.slides", "en"), Some(serde_json::json!(["One", "Two"])));
        assert_eq!(s.t_raw("home.meta", "en"), Some(serde_json::json!({"title": "Home"})));
        assert_eq!(s.t_raw("home.count", "en"), Some(serde_json::json!("42")));
        assert_eq!(s.t_raw("home.title", "en"), Some(serde_json::json!("Home")));
        assert_eq!(s.t_raw("home.blank", "en"), None);
        assert_eq!(s.t_raw("home.missing", "en"), None);
    }
}
