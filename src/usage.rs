//! Append-only log of external translator calls.
//! `record` only pushes onto a channel; a background task writes the queue
//! to `ai_usage_logs` every 300ms. Write failures are logged and dropped.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{params, Connection};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::db::{now_unix, open_connection};
use crate::error::Result;
use crate::translate::TokenUsage;

/// One external translate call.
#[derive(Debug, Clone)]
pub struct UsageRecord {
    /// "translate_batch", "translate_key", "translate_missing" or "quality_check"
    pub action: String,
    pub model: String,
    pub usage: TokenUsage,
    pub items_count: u32,
    pub details: String,
    pub created_at: i64,
}

impl UsageRecord {
    pub fn new(action: &str, model: &str, usage: TokenUsage, details: String) -> Self {
        Self {
            action: action.to_string(),
            model: model.to_string(),
            usage,
            items_count: 1,
            details,
            created_at: now_unix(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsageTotals {
    pub tokens: u64,
    pub calls: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsageStats {
    pub today: UsageTotals,
    pub all_time: UsageTotals,
}

pub struct UsageLog {
    tx: Mutex<Option<mpsc::UnboundedSender<UsageRecord>>>,
    flush_task: Mutex<Option<JoinHandle<()>>>,
    read_conn: Mutex<Connection>,
}

impl UsageLog {
    /// Open (or create) the usage table and start the background flush loop.
    /// Must be called from within a Tokio runtime.
    pub fn open(db_path: &Path) -> Result<Arc<Self>> {
        let read_conn = open_connection(db_path)?;
        read_conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS ai_usage_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                action TEXT NOT NULL,
                model TEXT,
                prompt_tokens INTEGER NOT NULL DEFAULT 0,
                completion_tokens INTEGER NOT NULL DEFAULT 0,
                total_tokens INTEGER NOT NULL DEFAULT 0,
                items_count INTEGER NOT NULL DEFAULT 1,
                details TEXT,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_usage_created
                ON ai_usage_logs(created_at);",
        )?;

        let writer = open_connection(db_path)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let flush_task = tokio::spawn(flush_loop(rx, writer));
        info!(path = %db_path.display(), "usage log opened");

        Ok(Arc::new(Self {
            tx: Mutex::new(Some(tx)),
            flush_task: Mutex::new(Some(flush_task)),
            read_conn: Mutex::new(read_conn),
        }))
    }

    /// Queue a record for async batch write. Never blocks, never fails.
    pub fn record(&self, record: UsageRecord) {
        match self.tx.lock().as_ref() {
            Some(tx) => {
                if let Err(e) = tx.send(record) {
                    warn!(error = %e, "usage writer gone, record dropped");
                }
            }
            None => warn!(action = %record.action, "usage log closed, record dropped"),
        }
    }

    /// Close the channel and wait for pending records to be written.
    pub async fn shutdown(&self) {
        drop(self.tx.lock().take());
        let task = self.flush_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "usage flush task failed");
            }
        }
    }

    /// Token and call totals for today (UTC) and all time.
    pub fn stats(&self) -> Result<UsageStats> {
        let now = now_unix();
        let midnight = now - now.rem_euclid(86_400);

        let conn = self.read_conn.lock();
        let totals = |since: i64| -> rusqlite::Result<UsageTotals> {
            conn.query_row(
                "SELECT COALESCE(SUM(total_tokens), 0), COUNT(*) FROM ai_usage_logs
                 WHERE created_at >= ?1",
                params![since],
                |row| {
                    Ok(UsageTotals {
                        tokens: row.get::<_, i64>(0)? as u64,
                        calls: row.get::<_, i64>(1)? as u64,
                    })
                },
            )
        };

        Ok(UsageStats {
            today: totals(midnight)?,
            all_time: totals(i64::MIN)?,
        })
    }
}

const FLUSH_INTERVAL: Duration = Duration::from_millis(300);

const INSERT_USAGE: &str = "INSERT INTO ai_usage_logs
     (action, model, prompt_tokens, completion_tokens, total_tokens,
      items_count, details, created_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)";

/// Buffer records and write them once per tick. Drains the buffer one last
/// time when every sender is gone.
async fn flush_loop(mut rx: mpsc::UnboundedReceiver<UsageRecord>, conn: Connection) {
    let mut ticker = tokio::time::interval(FLUSH_INTERVAL);
    let mut pending: Vec<UsageRecord> = Vec::new();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !pending.is_empty() {
                    flush_batch(&conn, &pending);
                    pending.clear();
                }
            }
            msg = rx.recv() => match msg {
                Some(record) => pending.push(record),
                None => {
                    if !pending.is_empty() {
                        flush_batch(&conn, &pending);
                    }
                    debug!("usage writer stopped");
                    return;
                }
            }
        }
    }
}

fn flush_batch(conn: &Connection, records: &[UsageRecord]) {
    match write_batch(conn, records) {
        Ok(()) => debug!(count = records.len(), "usage batch written"),
        Err(e) => warn!(error = %e, count = records.len(), "usage batch dropped"),
    }
}

/// All records of a batch land in one transaction or none do.
fn write_batch(conn: &Connection, records: &[UsageRecord]) -> rusqlite::Result<()> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare_cached(INSERT_USAGE)?;
        for r in records {
            stmt.execute(params![
                r.action,
                r.model,
                r.usage.prompt_tokens as i64,
                r.usage.completion_tokens as i64,
                r.usage.total_tokens as i64,
                r.items_count,
                r.details,
                r.created_at,
            ])?;
        }
    }
    tx.commit()
}
