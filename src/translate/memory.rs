//! Persistent translation memory backed by SQLite.
//! Key: (blake3 content hash, source_lang, target_lang), enforced by a unique
//! index. Hits bump `usage_count` and upserts go through single statements,
//! so concurrent callers never lose increments or create duplicates.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::hasher::content_hash;
use crate::db::{now_unix, open_connection, placeholders};
use crate::error::Result;
use crate::source::SourceTextStore;

/// Maximum rows returned by `search`.
pub const SEARCH_LIMIT: usize = 50;

const SELECT_COLUMNS: &str = "id, source_lang, target_lang, source_text, target_text, \
     source_hash, context, usage_count, created_at, updated_at";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: i64,
    pub source_lang: String,
    pub target_lang: String,
    pub source_text: String,
    pub target_text: String,
    pub source_hash: String,
    pub context: Option<String>,
    pub usage_count: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Manual edit of an existing entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemoryEdit {
    /// Replacing the source text recomputes the content hash.
    pub source_text: Option<String>,
    pub target_text: String,
    pub context: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryStats {
    pub total_entries: u64,
    /// Hits beyond the first use of each entry.
    pub total_reuses: u64,
    pub language_pairs: Vec<LanguagePairCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LanguagePairCount {
    pub source_lang: String,
    pub target_lang: String,
    pub count: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub imported: u64,
    pub skipped: u64,
}

pub struct MemoryStore {
    conn: Mutex<Connection>,
}

impl MemoryStore {
    /// Open (or create) the memory table at the given path.
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = open_connection(db_path)?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS translation_memories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_lang TEXT NOT NULL,
                target_lang TEXT NOT NULL,
                source_text TEXT NOT NULL,
                target_text TEXT NOT NULL,
                source_hash TEXT NOT NULL,
                context TEXT,
                usage_count INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS tm_unique_hash_langs
                ON translation_memories(source_hash, source_lang, target_lang);
            CREATE INDEX IF NOT EXISTS idx_tm_source_hash
                ON translation_memories(source_hash);",
        )?;

        info!(path = %db_path.display(), "translation memory opened");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Exact lookup by content hash and language pair.
    /// A hit increments `usage_count` in the same statement and returns the
    /// updated entry; a miss has no side effect.
    pub fn find_exact(
        &self,
        source_text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<Option<MemoryEntry>> {
        let hash = content_hash(source_text);
        let conn = self.conn.lock();
        let entry = conn
            .query_row(
                &format!(
                    "UPDATE translation_memories SET usage_count = usage_count + 1
                     WHERE source_hash = ?1 AND source_lang = ?2 AND target_lang = ?3
                     RETURNING {SELECT_COLUMNS}"
                ),
                params![hash, source_lang, target_lang],
                row_to_entry,
            )
            .optional()?;

        if let Some(ref e) = entry {
            debug!(id = e.id, usage_count = e.usage_count, source_lang, target_lang, "memory hit");
        }
        Ok(entry)
    }

    /// Store a translation for future reuse.
    /// An existing entry for the same key gets its texts and context replaced
    /// and keeps its `usage_count`; a new entry starts at 1.
    pub fn remember(
        &self,
        source_text: &str,
        target_text: &str,
        source_lang: &str,
        target_lang: &str,
        context: Option<&str>,
    ) -> Result<MemoryEntry> {
        let hash = content_hash(source_text);
        let conn = self.conn.lock();
        let entry = conn.query_row(
            &format!(
                "INSERT INTO translation_memories
                 (source_lang, target_lang, source_text, target_text, source_hash,
                  context, usage_count, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7)
                 ON CONFLICT(source_hash, source_lang, target_lang) DO UPDATE SET
                    source_text = excluded.source_text,
                    target_text = excluded.target_text,
                    context = excluded.context,
                    updated_at = excluded.updated_at
                 RETURNING {SELECT_COLUMNS}"
            ),
            params![
                source_lang,
                target_lang,
                source_text,
                target_text,
                hash,
                context,
                now_unix()
            ],
            row_to_entry,
        )?;

        debug!(id = entry.id, source_lang, target_lang, "memory remembered");
        Ok(entry)
    }

    /// Insert only when no entry exists for the key. Returns whether a row
    /// was created; existing entries are never touched.
    fn remember_if_absent(
        &self,
        source_text: &str,
        target_text: &str,
        source_lang: &str,
        target_lang: &str,
        context: Option<&str>,
    ) -> Result<bool> {
        let inserted = self.conn.lock().execute(
            "INSERT INTO translation_memories
             (source_lang, target_lang, source_text, target_text, source_hash,
              context, usage_count, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7)
             ON CONFLICT(source_hash, source_lang, target_lang) DO NOTHING",
            params![
                source_lang,
                target_lang,
                source_text,
                target_text,
                content_hash(source_text),
                context,
                now_unix()
            ],
        )?;
        Ok(inserted > 0)
    }

    /// Whether an entry exists for the key. No side effect.
    pub fn exists(&self, source_text: &str, source_lang: &str, target_lang: &str) -> Result<bool> {
        let found = self
            .conn
            .lock()
            .query_row(
                "SELECT 1 FROM translation_memories
                 WHERE source_hash = ?1 AND source_lang = ?2 AND target_lang = ?3",
                params![content_hash(source_text), source_lang, target_lang],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn get(&self, id: i64) -> Result<Option<MemoryEntry>> {
        let entry = self
            .conn
            .lock()
            .query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM translation_memories WHERE id = ?1"),
                params![id],
                row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    /// Apply a manual edit. Returns None if the id is unknown.
    /// Moving an entry onto another entry's key fails with a storage error.
    pub fn update(&self, id: i64, edit: &MemoryEdit) -> Result<Option<MemoryEntry>> {
        let hash = edit.source_text.as_deref().map(content_hash);
        let conn = self.conn.lock();
        let entry = conn
            .query_row(
                &format!(
                    "UPDATE translation_memories SET
                        source_text = COALESCE(?1, source_text),
                        source_hash = COALESCE(?2, source_hash),
                        target_text = ?3,
                        context = ?4,
                        updated_at = ?5
                     WHERE id = ?6
                     RETURNING {SELECT_COLUMNS}"
                ),
                params![
                    edit.source_text,
                    hash,
                    edit.target_text,
                    edit.context,
                    now_unix(),
                    id
                ],
                row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    /// Entries for the admin list, most recently updated first.
    pub fn list(&self, page: usize, per_page: usize) -> Result<Vec<MemoryEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {SELECT_COLUMNS} FROM translation_memories
             ORDER BY updated_at DESC, id DESC LIMIT ?1 OFFSET ?2"
        ))?;
        let offset = page.saturating_sub(1) * per_page;
        let entries = stmt
            .query_map(params![per_page as i64, offset as i64], row_to_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    pub fn stats(&self) -> Result<MemoryStats> {
        let conn = self.conn.lock();
        let (total_entries, total_usage): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(usage_count), 0) FROM translation_memories",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let mut stmt = conn.prepare_cached(
            "SELECT source_lang, target_lang, COUNT(*) FROM translation_memories
             GROUP BY source_lang, target_lang
             ORDER BY source_lang, target_lang",
        )?;
        let language_pairs = stmt
            .query_map([], |row| {
                Ok(LanguagePairCount {
                    source_lang: row.get(0)?,
                    target_lang: row.get(1)?,
                    count: row.get::<_, i64>(2)? as u64,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(MemoryStats {
            total_entries: total_entries as u64,
            total_reuses: (total_usage - total_entries).max(0) as u64,
            language_pairs,
        })
    }

    pub fn delete(&self, id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .lock()
            .execute("DELETE FROM translation_memories WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    pub fn bulk_delete(&self, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "DELETE FROM translation_memories WHERE id IN ({})",
            placeholders(ids.len())
        );
        let deleted = self.conn.lock().execute(&sql, params_from_iter(ids))?;
        Ok(deleted)
    }

    /// Remove every entry. Returns how many were deleted.
    pub fn purge_all(&self) -> Result<usize> {
        let deleted = self
            .conn
            .lock()
            .execute("DELETE FROM translation_memories", [])?;
        info!(deleted, "translation memory purged");
        Ok(deleted)
    }

    /// Case-insensitive substring search over source and target text,
    /// most used first, capped at `SEARCH_LIMIT`.
    pub fn search(&self, query: &str) -> Result<Vec<MemoryEntry>> {
        let needle = query.to_lowercase();
        // LIKE folds ASCII only, so it can narrow the scan for ASCII
        // queries but would miss e.g. "ÁRBOL" against "árbol".
        let pattern = needle.is_ascii().then(|| like_contains(&needle));

        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&format!(
            r"SELECT {SELECT_COLUMNS} FROM translation_memories
             WHERE ?1 IS NULL
                OR source_text LIKE ?1 ESCAPE '\'
                OR target_text LIKE ?1 ESCAPE '\'
             ORDER BY usage_count DESC, id ASC"
        ))?;

        let mut results = Vec::new();
        for entry in stmt.query_map(params![pattern], row_to_entry)? {
            let entry = entry?;
            if entry.source_text.to_lowercase().contains(&needle)
                || entry.target_text.to_lowercase().contains(&needle)
            {
                results.push(entry);
                if results.len() == SEARCH_LIMIT {
                    break;
                }
            }
        }
        Ok(results)
    }

    /// Seed memory from strings that are already translated.
    /// For every non-empty source record and target language with a
    /// non-empty value, an entry is created unless one exists for that
    /// content and pair. Existing entries are never overwritten, so running
    /// it again over unchanged data imports nothing.
    pub fn import_from_source_records(
        &self,
        source: &dyn SourceTextStore,
        source_lang: &str,
        target_langs: &[String],
    ) -> Result<ImportReport> {
        let mut report = ImportReport::default();

        for record in source.list_by_lang(source_lang, None)? {
            if record.value.is_empty() {
                continue;
            }
            for target_lang in target_langs.iter().filter(|l| l.as_str() != source_lang) {
                let target = source
                    .get(&record.group, &record.key, target_lang)?
                    .filter(|t| !t.value.is_empty());
                let Some(target) = target else {
                    report.skipped += 1;
                    continue;
                };

                let created = self.remember_if_absent(
                    &record.value,
                    &target.value,
                    source_lang,
                    target_lang,
                    Some(&record.full_key()),
                )?;
                if created {
                    report.imported += 1;
                } else {
                    report.skipped += 1;
                }
            }
        }

        info!(
            imported = report.imported,
            skipped = report.skipped,
            source_lang,
            "memory import finished"
        );
        Ok(report)
    }
}

/// `%needle%` with LIKE wildcards in the needle taken literally.
fn like_contains(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<MemoryEntry> {
    Ok(MemoryEntry {
        id: row.get(0)?,
        source_lang: row.get(1)?,
        target_lang: row.get(2)?,
        source_text: row.get(3)?,
        target_text: row.get(4)?,
        source_hash: row.get(5)?,
        context: row.get(6)?,
        usage_count: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::Error;
    use crate::source::SqliteSourceStore;

    fn store() -> MemoryStore {
        MemoryStore::open(Path::new(":memory:")).unwrap()
    }

    fn langs(codes: &[&str]) -> Vec<String> {
        codes.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn remember_twice_keeps_one_entry_with_latest_text() {
        let m = store();
        let first = m.remember("Hola", "Hello", "es", "en", None).unwrap();
        let second = m.remember("Hola", "Hi", "es", "en", Some("home.title")).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.target_text, "Hi");
        assert_eq!(second.context.as_deref(), Some("home.title"));
        assert_eq!(m.stats().unwrap().total_entries, 1);
    }

    #[test]
    fn normalized_text_shares_an_entry() {
        let m = store();
        m.remember("Hola", "Hello", "es", "en", None).unwrap();
        let hit = m.find_exact("  HOLA ", "es", "en").unwrap().unwrap();
        assert_eq!(hit.target_text, "Hello");
        assert_eq!(hit.source_hash, content_hash("hola"));
    }

    #[test]
    fn hit_increments_usage_count() {
        let m = store();
        let created = m.remember("Hola", "Hello", "es", "en", None).unwrap();
        assert_eq!(created.usage_count, 1);

        let hit = m.find_exact("Hola", "es", "en").unwrap().unwrap();
        assert_eq!(hit.usage_count, 2);
        assert_eq!(m.get(created.id).unwrap().unwrap().usage_count, 2);
    }

    #[test]
    fn miss_has_no_side_effect() {
        let m = store();
        m.remember("Hola", "Hello", "es", "en", None).unwrap();
        assert!(m.find_exact("Adiós", "es", "en").unwrap().is_none());
        assert_eq!(m.stats().unwrap().total_reuses, 0);
    }

    #[test]
    fn language_pairs_are_isolated() {
        let m = store();
        m.remember("Hola", "Hello", "es", "en", None).unwrap();
        assert!(m.find_exact("Hola", "es", "fr").unwrap().is_none());
        assert!(m.find_exact("Hola", "en", "es").unwrap().is_none());
        assert!(m.exists("Hola", "es", "en").unwrap());
        assert!(!m.exists("Hola", "es", "fr").unwrap());
    }

    #[test]
    fn overwrite_keeps_usage_count_but_recreation_starts_at_one() {
        let m = store();
        let e = m.remember("Hola", "Hello", "es", "en", None).unwrap();
        m.find_exact("Hola", "es", "en").unwrap();
        m.find_exact("Hola", "es", "en").unwrap();

        let overwritten = m.remember("Hola", "Hi", "es", "en", None).unwrap();
        assert_eq!(overwritten.usage_count, 3);

        assert!(m.delete(e.id).unwrap());
        let recreated = m.remember("Hola", "Hi", "es", "en", None).unwrap();
        assert_eq!(recreated.usage_count, 1);
    }

    #[test]
    fn stats_report_reuses_and_pairs() {
        let m = store();
        m.remember("uno", "one", "es", "en", None).unwrap();
        m.remember("dos", "two", "es", "en", None).unwrap();
        m.remember("tres", "trois", "es", "fr", None).unwrap();
        // usage counts become [1, 3, 2]
        for _ in 0..2 {
            m.find_exact("dos", "es", "en").unwrap();
        }
        m.find_exact("tres", "es", "fr").unwrap();

        let stats = m.stats().unwrap();
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.total_reuses, 3);
        let pairs: Vec<(&str, &str, u64)> = stats
            .language_pairs
            .iter()
            .map(|p| (p.source_lang.as_str(), p.target_lang.as_str(), p.count))
            .collect();
        assert_eq!(pairs, vec![("es", "en", 2), ("es", "fr", 1)]);
    }

    #[test]
    fn empty_store_stats() {
        let stats = store().stats().unwrap();
        assert_eq!(stats.total_entries, 0);
        assert_eq!(stats.total_reuses, 0);
        assert!(stats.language_pairs.is_empty());
    }

    #[test]
    fn manual_edit_recomputes_hash() {
        let m = store();
        let e = m.remember("Hola", "Hello", "es", "en", None).unwrap();

        let edited = m
            .update(
                e.id,
                &MemoryEdit {
                    source_text: Some("Buenas".into()),
                    target_text: "Hi there".into(),
                    context: Some("greeting".into()),
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(edited.source_hash, content_hash("buenas"));
        assert_eq!(edited.usage_count, 1);
        assert!(m.find_exact("Hola", "es", "en").unwrap().is_none());
        assert_eq!(
            m.find_exact("buenas", "es", "en").unwrap().unwrap().target_text,
            "Hi there"
        );

        let target_only = m
            .update(e.id, &MemoryEdit { target_text: "Hey".into(), ..Default::default() })
            .unwrap()
            .unwrap();
        assert_eq!(target_only.source_text, "Buenas");
        assert_eq!(target_only.context, None);
        assert!(m.update(404, &MemoryEdit::default()).unwrap().is_none());
    }

    #[test]
    fn edit_onto_existing_key_is_a_storage_error() {
        let m = store();
        m.remember("Hola", "Hello", "es", "en", None).unwrap();
        let other = m.remember("Adiós", "Bye", "es", "en", None).unwrap();

        let err = m
            .update(
                other.id,
                &MemoryEdit {
                    source_text: Some("hola".into()),
                    target_text: "Hello".into(),
                    context: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[test]
    fn removal_operations() {
        let m = store();
        let a = m.remember("a", "A", "es", "en", None).unwrap();
        let b = m.remember("b", "B", "es", "en", None).unwrap();
        let c = m.remember("c", "C", "es", "en", None).unwrap();
        m.remember("d", "D", "es", "en", None).unwrap();

        assert!(m.delete(a.id).unwrap());
        assert!(!m.delete(a.id).unwrap());
        assert_eq!(m.bulk_delete(&[b.id, c.id, 999]).unwrap(), 2);
        assert_eq!(m.bulk_delete(&[]).unwrap(), 0);
        assert_eq!(m.purge_all().unwrap(), 1);
        assert_eq!(m.stats().unwrap().total_entries, 0);
    }

    #[test]
    fn search_is_case_insensitive_and_ranked_by_usage() {
        let m = store();
        m.remember("Buenos días", "Good morning", "es", "en", None).unwrap();
        m.remember("Buenas noches", "Good night", "es", "en", None).unwrap();
        m.remember("Gracias", "Thanks", "es", "en", None).unwrap();
        m.find_exact("Buenas noches", "es", "en").unwrap();

        let hits = m.search("GOOD").unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].source_text, "Buenas noches");

        assert_eq!(m.search("DÍAS").unwrap().len(), 1);
        assert_eq!(m.search("thanks").unwrap()[0].source_text, "Gracias");
        assert!(m.search("100%").unwrap().is_empty());
    }

    #[test]
    fn search_treats_like_wildcards_literally() {
        let m = store();
        m.remember("100% natural", "100% natural", "es", "en", None).unwrap();
        m.remember("1000 naturales", "1000 natural", "es", "en", None).unwrap();
        m.remember("snake_case", "snake_case", "es", "en", None).unwrap();
        m.remember("snakeXcase", "snakeXcase", "es", "en", None).unwrap();
        m.remember(r"C:\temp", r"C:\temp", "es", "en", None).unwrap();

        let hits = m.search("100%").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source_text, "100% natural");

        let hits = m.search("E_C").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source_text, "snake_case");

        assert_eq!(m.search(r":\t").unwrap().len(), 1);
        assert_eq!(like_contains(r"a%b_c\"), r"%a\%b\_c\\%");
    }

    #[test]
    fn search_folds_non_ascii_case() {
        let m = store();
        m.remember("árbol", "tree", "es", "en", None).unwrap();
        m.remember("Über", "over", "de", "en", None).unwrap();

        assert_eq!(m.search("ÁRBOL").unwrap().len(), 1);
        assert_eq!(m.search("über").unwrap().len(), 1);
        assert_eq!(m.search("TREE").unwrap().len(), 1);
    }

    #[test]
    fn search_is_capped() {
        let m = store();
        for i in 0..60 {
            m.remember(&format!("texto {i}"), &format!("text {i}"), "es", "en", None)
                .unwrap();
        }
        assert_eq!(m.search("text").unwrap().len(), SEARCH_LIMIT);
    }

    #[test]
    fn list_pages_entries() {
        let m = store();
        for i in 0..5 {
            m.remember(&format!("t{i}"), "x", "es", "en", None).unwrap();
        }
        assert_eq!(m.list(1, 2).unwrap().len(), 2);
        assert_eq!(m.list(3, 2).unwrap().len(), 1);
        assert!(m.list(4, 2).unwrap().is_empty());
    }

    #[test]
    fn import_is_additive_and_idempotent() {
        let m = store();
        let src = SqliteSourceStore::open(Path::new(":memory:"), Duration::from_secs(60)).unwrap();
        let all = langs(&["es", "en", "fr"]);
        src.create_key("home", "title", "Inicio", "es", &all).unwrap();
        src.create_key("home", "body", "Texto", "es", &all).unwrap();
        src.create_key("home", "empty", "", "es", &all).unwrap();
        src.upsert("home", "title", "en", "Home").unwrap();
        src.upsert("home", "title", "fr", "Accueil").unwrap();
        src.upsert("home", "empty", "en", "Nothing").unwrap();

        // A pre-existing entry must survive untouched.
        m.remember("inicio", "Start", "es", "en", None).unwrap();

        let first = m.import_from_source_records(&src, "es", &all).unwrap();
        assert_eq!(first, ImportReport { imported: 1, skipped: 3 });
        assert_eq!(m.find_exact("Inicio", "es", "en").unwrap().unwrap().target_text, "Start");
        let fr = m.find_exact("Inicio", "es", "fr").unwrap().unwrap();
        assert_eq!(fr.target_text, "Accueil");
        assert_eq!(fr.context.as_deref(), Some("home.title"));

        let second = m.import_from_source_records(&src, "es", &all).unwrap();
        assert_eq!(second.imported, 0);
        assert_eq!(second.skipped, 4);
    }
}
