//! Database module
//!
//! Backs two concerns with one SQLite file: the shared key/value cache that
//! the session store and load balancer live in (a hash-of-hashes keyed by
//! `(key, field)`), and the audit log of every inbound/outbound message,
//! which doubles as the voter message history replayed into threads.

mod schema;

pub use schema::*;

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Database lock poisoned")]
    Poisoned,
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    // ==================== Cache Operations ====================

    /// Read all fields of a hash. Returns `None` when the key has no fields.
    pub fn get_hash(&self, key: &str) -> DbResult<Option<HashMap<String, String>>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT field, value FROM cache WHERE key = ?1")?;
        let rows = stmt.query_map(params![key], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let fields: HashMap<String, String> = rows.collect::<Result<_, _>>()?;
        Ok(if fields.is_empty() { None } else { Some(fields) })
    }

    /// Merge-upsert fields into a hash. Fields not named are left untouched.
    pub fn merge_hash(&self, key: &str, fields: &[(&str, &str)]) -> DbResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO cache (key, field, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key, field) DO UPDATE SET value = excluded.value",
            )?;
            for (field, value) in fields {
                stmt.execute(params![key, field, value])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Read a single field of a hash
    pub fn get_field(&self, key: &str, field: &str) -> DbResult<Option<String>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT value FROM cache WHERE key = ?1 AND field = ?2",
            params![key, field],
            |row| row.get(0),
        )
        .optional()
        .map_err(DbError::from)
    }

    /// Delete a single field of a hash
    pub fn delete_field(&self, key: &str, field: &str) -> DbResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM cache WHERE key = ?1 AND field = ?2",
            params![key, field],
        )?;
        Ok(())
    }

    /// Batched read of plain (single-field) values for several keys, in one
    /// statement. Used by the load balancer to read both pool counters in a
    /// single round trip. Results are positional; absent keys yield `None`.
    pub fn get_values(&self, keys: &[&str]) -> DbResult<Vec<Option<String>>> {
        let conn = self.lock()?;
        let placeholders = (1..=keys.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql =
            format!("SELECT key, value FROM cache WHERE field = 'value' AND key IN ({placeholders})");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(keys.iter()), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let found: HashMap<String, String> = rows.collect::<Result<_, _>>()?;
        Ok(keys.iter().map(|k| found.get(*k).cloned()).collect())
    }

    /// Write a plain (single-field) value
    pub fn set_value(&self, key: &str, value: &str) -> DbResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO cache (key, field, value) VALUES (?1, 'value', ?2)
             ON CONFLICT(key, field) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    // ==================== Audit Log / Message History ====================

    /// Record one message. Callers treat this as best effort: failures are
    /// logged at the call site and never abort the surrounding handler.
    pub fn record_audit(&self, entry: &AuditEntry) -> DbResult<()> {
        let conn = self.lock()?;
        let id = uuid::Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO audit_log (id, voter_id, direction, automated, sender_name, body, channel_id, thread_id, successful, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                id,
                entry.voter_id,
                entry.direction.as_str(),
                entry.automated,
                entry.sender_name,
                entry.body,
                entry.channel_id,
                entry.thread_id,
                entry.successful,
                entry.created_at_secs,
            ],
        )?;
        Ok(())
    }

    /// Message history for a voter, ascending by time. `since` bounds the
    /// result to strictly newer messages; `None` means all history.
    pub fn history(&self, voter_id: &str, since_secs: Option<i64>) -> DbResult<Vec<HistoryMessage>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT created_at, body, direction, automated, sender_name
             FROM audit_log
             WHERE voter_id = ?1 AND created_at > ?2
             ORDER BY created_at ASC, rowid ASC",
        )?;
        let rows = stmt.query_map(
            params![voter_id, since_secs.unwrap_or(i64::MIN)],
            |row| {
                Ok(HistoryMessage {
                    timestamp_secs: row.get(0)?,
                    body: row.get(1)?,
                    direction: Direction::parse(row.get::<_, String>(2)?.as_str()),
                    automated: row.get(3)?,
                    sender_name: row.get(4)?,
                })
            },
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }
}
