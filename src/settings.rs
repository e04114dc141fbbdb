//! Key/value runtime settings (`translation_settings`) with an explicit
//! in-process cache. Every `set` invalidates the cache; `invalidate` is
//! available for writes made by other processes.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params, Connection};
use tracing::debug;

use crate::db::open_connection;
use crate::error::Result;

pub const SOURCE_LANGUAGE: &str = "source_language";
pub const AVAILABLE_LANGUAGES: &str = "available_languages";
pub const MEMORY_AUTO_SYNC: &str = "memory_auto_sync";
pub const MEMORY_SYNC_INTERVAL: &str = "memory_sync_interval";
pub const MEMORY_LAST_SYNC: &str = "memory_last_sync";

pub struct SettingsService {
    conn: Mutex<Connection>,
    cache: Mutex<Option<Arc<HashMap<String, String>>>>,
}

impl SettingsService {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = open_connection(db_path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS translation_settings (
                key_name TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            cache: Mutex::new(None),
        })
    }

    /// Stored value, or `default` when the key is unset.
    pub fn get(&self, key: &str, default: &str) -> Result<String> {
        let all = self.load()?;
        Ok(all.get(key).cloned().unwrap_or_else(|| default.to_string()))
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO translation_settings (key_name, value) VALUES (?1, ?2)
             ON CONFLICT(key_name) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        self.invalidate();
        debug!(key, "setting stored");
        Ok(())
    }

    pub fn invalidate(&self) {
        *self.cache.lock() = None;
    }

    fn load(&self) -> Result<Arc<HashMap<String, String>>> {
        if let Some(all) = self.cache.lock().as_ref() {
            return Ok(Arc::clone(all));
        }

        let all = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare("SELECT key_name, value FROM translation_settings")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<HashMap<String, String>>>()?;
            Arc::new(rows)
        };

        *self.cache.lock() = Some(Arc::clone(&all));
        Ok(all)
    }
}
