//! Embedded transactional store: SQLite for queryable state, a JSONL
//! recovery log for crash-safe replay.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::record::{Filter, Record};

/// One entry in the append-only recovery log
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct LogEntry {
    op: LogOp,
    collection: String,
    id: String,
    body: Value,
    at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
enum LogOp {
    Put,
    Delete,
}

/// A persistent store backed by a single SQLite file plus a sibling
/// `.jsonl` recovery log. Tables are created lazily on first use of a
/// given collection.
pub struct Store {
    conn: Mutex<Connection>,
    log_path: PathBuf,
    log: Mutex<File>,
}

impl Store {
    /// Open (or create) a store rooted at `db_path`. The recovery log
    /// lives alongside it at `db_path` with a `.jsonl` extension.
    pub fn open(db_path: impl AsRef<Path>) -> StoreResult<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let log_path = log_path_for(db_path);
        let log = OpenOptions::new().create(true).append(true).open(&log_path)?;

        let store = Self {
            conn: Mutex::new(conn),
            log_path,
            log: Mutex::new(log),
        };
        store.replay_log()?;
        Ok(store)
    }

    /// Open an in-memory store. Useful for tests; the recovery log still
    /// writes to a real file since replay is the thing under test.
    pub fn open_in_memory(log_path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let log_path = log_path.as_ref().to_path_buf();
        let log = OpenOptions::new().create(true).append(true).open(&log_path)?;
        Ok(Self {
            conn: Mutex::new(conn),
            log_path,
            log: Mutex::new(log),
        })
    }

    fn ensure_table(&self, conn: &Connection, collection: &str) -> StoreResult<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS \"{collection}\" (
                id TEXT PRIMARY KEY,
                updated_at INTEGER NOT NULL,
                body TEXT NOT NULL
            )"
        );
        conn.execute(&sql, [])?;
        let idx_sql = format!(
            "CREATE TABLE IF NOT EXISTS \"{collection}__index\" (
                id TEXT NOT NULL,
                field TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (id, field)
            )"
        );
        conn.execute(&idx_sql, [])?;
        Ok(())
    }

    fn append_log(&self, op: LogOp, collection: &str, id: &str, body: &Value) -> StoreResult<()> {
        let entry = LogEntry {
            op,
            collection: collection.to_string(),
            id: id.to_string(),
            body: body.clone(),
            at: crate::record::now_ms(),
        };
        let line = serde_json::to_string(&entry)?;
        let mut log = self.log.lock().expect("log mutex poisoned");
        writeln!(log, "{line}")?;
        log.flush()?;
        Ok(())
    }

    /// Insert a new record. Errors if a record with the same id already exists.
    pub fn create<T: Record>(&self, record: &T) -> StoreResult<()> {
        let collection = T::collection_name();
        let conn = self.conn.lock().expect("conn mutex poisoned");
        self.ensure_table(&conn, collection)?;
        let body = serde_json::to_value(record)?;
        self.put_tx(&conn, collection, record.id(), record.updated_at(), &record.indexed_fields(), &body)?;
        drop(conn);
        self.append_log(LogOp::Put, collection, record.id(), &body)
    }

    /// Replace an existing record in place, keyed by id.
    pub fn update<T: Record>(&self, record: &T) -> StoreResult<()> {
        let collection = T::collection_name();
        let conn = self.conn.lock().expect("conn mutex poisoned");
        self.ensure_table(&conn, collection)?;
        let body = serde_json::to_value(record)?;
        self.put_tx(&conn, collection, record.id(), record.updated_at(), &record.indexed_fields(), &body)?;
        drop(conn);
        self.append_log(LogOp::Put, collection, record.id(), &body)
    }

    fn put_tx(
        &self,
        conn: &Connection,
        collection: &str,
        id: &str,
        updated_at: i64,
        indexed: &std::collections::HashMap<String, crate::record::IndexValue>,
        body: &Value,
    ) -> StoreResult<()> {
        let body_text = serde_json::to_string(body)?;
        conn.execute(
            &format!(
                "INSERT INTO \"{collection}\" (id, updated_at, body) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET updated_at = excluded.updated_at, body = excluded.body"
            ),
            params![id, updated_at, body_text],
        )?;
        conn.execute(&format!("DELETE FROM \"{collection}__index\" WHERE id = ?1"), params![id])?;
        for (field, value) in indexed {
            conn.execute(
                &format!("INSERT INTO \"{collection}__index\" (id, field, value) VALUES (?1, ?2, ?3)"),
                params![id, field, value.to_sql_text()],
            )?;
        }
        Ok(())
    }

    /// Fetch a single record by id.
    pub fn get<T: Record>(&self, id: &str) -> StoreResult<T> {
        let collection = T::collection_name();
        let conn = self.conn.lock().expect("conn mutex poisoned");
        self.ensure_table(&conn, collection)?;
        let body: Option<String> = conn
            .query_row(
                &format!("SELECT body FROM \"{collection}\" WHERE id = ?1"),
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        match body {
            Some(text) => Ok(serde_json::from_str(&text)?),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    /// Delete a record by id. No error if it doesn't exist.
    pub fn delete<T: Record>(&self, id: &str) -> StoreResult<()> {
        let collection = T::collection_name();
        let conn = self.conn.lock().expect("conn mutex poisoned");
        self.ensure_table(&conn, collection)?;
        conn.execute(&format!("DELETE FROM \"{collection}\" WHERE id = ?1"), params![id])?;
        conn.execute(&format!("DELETE FROM \"{collection}__index\" WHERE id = ?1"), params![id])?;
        drop(conn);
        self.append_log(LogOp::Delete, collection, id, &Value::Null)
    }

    /// List records matching all of the given filters (AND semantics).
    /// An empty filter list returns every record in the collection.
    pub fn list<T: Record>(&self, filters: &[Filter]) -> StoreResult<Vec<T>> {
        let collection = T::collection_name();
        let conn = self.conn.lock().expect("conn mutex poisoned");
        self.ensure_table(&conn, collection)?;

        if filters.is_empty() {
            let mut stmt = conn.prepare(&format!("SELECT body FROM \"{collection}\" ORDER BY id"))?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            let mut out = Vec::new();
            for row in rows {
                out.push(serde_json::from_str(&row?)?);
            }
            return Ok(out);
        }

        let mut sql = format!("SELECT body FROM \"{collection}\" WHERE id IN (");
        sql.push_str("SELECT id FROM (");
        let clauses: Vec<String> = filters
            .iter()
            .enumerate()
            .map(|(i, f)| {
                format!(
                    "SELECT id FROM \"{collection}__index\" WHERE field = ?{a} AND value {op} ?{b}",
                    a = i * 2 + 1,
                    b = i * 2 + 2,
                    op = f.op.as_sql(),
                )
            })
            .collect();
        sql.push_str(&clauses.join(" INTERSECT "));
        sql.push_str(") ids) ORDER BY id");

        let mut stmt = conn.prepare(&sql)?;
        let mut bind_params: Vec<String> = Vec::new();
        for f in filters {
            bind_params.push(f.field.clone());
            bind_params.push(f.value.to_sql_text());
        }
        let param_refs: Vec<&dyn rusqlite::ToSql> =
            bind_params.iter().map(|p| p as &dyn rusqlite::ToSql).collect();
        let rows = stmt.query_map(param_refs.as_slice(), |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row?)?);
        }
        Ok(out)
    }

    /// Rebuild the index table for a collection from its stored bodies.
    /// Used after a schema change to a Record's `indexed_fields`.
    pub fn rebuild_indexes<T: Record>(&self) -> StoreResult<()> {
        let collection = T::collection_name();
        let conn = self.conn.lock().expect("conn mutex poisoned");
        self.ensure_table(&conn, collection)?;
        let mut stmt = conn.prepare(&format!("SELECT id, body FROM \"{collection}\""))?;
        let rows: Vec<(String, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<_, _>>()?;
        for (id, body_text) in rows {
            let record: T = serde_json::from_str(&body_text)?;
            conn.execute(&format!("DELETE FROM \"{collection}__index\" WHERE id = ?1"), params![id])?;
            for (field, value) in record.indexed_fields() {
                conn.execute(
                    &format!("INSERT INTO \"{collection}__index\" (id, field, value) VALUES (?1, ?2, ?3)"),
                    params![id, field, value.to_sql_text()],
                )?;
            }
        }
        Ok(())
    }

    /// Replay the recovery log into SQLite. Entries already reflected by
    /// a prior clean shutdown are idempotent no-ops (upsert/delete by id).
    fn replay_log(&self) -> StoreResult<()> {
        if !self.log_path.exists() {
            return Ok(());
        }
        let file = File::open(&self.log_path)?;
        let reader = BufReader::new(file);
        let conn = self.conn.lock().expect("conn mutex poisoned");
        let mut replayed = 0u64;
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: LogEntry = match serde_json::from_str(&line) {
                Ok(e) => e,
                Err(e) => {
                    warn!(line = lineno, error = %e, "skipping corrupt recovery log entry");
                    continue;
                }
            };
            self.ensure_table(&conn, &entry.collection)?;
            match entry.op {
                LogOp::Put => {
                    let updated_at = entry
                        .body
                        .get("updated_at")
                        .and_then(Value::as_i64)
                        .unwrap_or_else(crate::record::now_ms);
                    let body_text = serde_json::to_string(&entry.body)?;
                    conn.execute(
                        &format!(
                            "INSERT INTO \"{}\" (id, updated_at, body) VALUES (?1, ?2, ?3)
                             ON CONFLICT(id) DO UPDATE SET updated_at = excluded.updated_at, body = excluded.body",
                            entry.collection
                        ),
                        params![entry.id, updated_at, body_text],
                    )?;
                }
                LogOp::Delete => {
                    conn.execute(
                        &format!("DELETE FROM \"{}\" WHERE id = ?1", entry.collection),
                        params![entry.id],
                    )?;
                }
            }
            replayed += 1;
        }
        debug!(entries = replayed, "replayed recovery log");
        Ok(())
    }

    /// Truncate the recovery log. Safe once the SQLite file is known
    /// durable (e.g. after a clean checkpoint) — call sparingly.
    pub fn compact_log(&self) -> StoreResult<()> {
        let mut log = self.log.lock().expect("log mutex poisoned");
        *log = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.log_path)?;
        Ok(())
    }
}

fn log_path_for(db_path: &Path) -> PathBuf {
    let mut path = db_path.to_path_buf();
    path.set_extension("jsonl");
    path
}
