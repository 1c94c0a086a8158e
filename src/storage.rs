use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

use crate::logging::{self, obj, v_str, Domain};

const SESSION_SLOT: &str = "session-storage";

/// Local persistence: the active session id and a log of exported files.
pub struct StateStore {
    conn: Connection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportEntry {
    pub ts: i64,
    pub kind: String,
    pub format: String,
    pub path: String,
    pub bytes: i64,
    pub sha256: String,
}

impl StateStore {
    pub fn new(path: &str) -> Result<Self> {
        let mut store = Self { conn: Connection::open(path)? };
        store.init()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let mut store = Self { conn: Connection::open_in_memory()? };
        store.init()?;
        Ok(store)
    }

    pub fn init(&mut self) -> Result<()> {
        self.conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS session (
                slot TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS exports (
                ts INTEGER NOT NULL,
                kind TEXT NOT NULL,
                format TEXT NOT NULL,
                path TEXT NOT NULL,
                bytes INTEGER NOT NULL,
                sha256 TEXT NOT NULL
            );
            COMMIT;",
        )?;
        Ok(())
    }

    pub fn session_id(&self) -> Result<Option<String>> {
        let id = self
            .conn
            .query_row(
                "SELECT session_id FROM session WHERE slot = ?1",
                params![SESSION_SLOT],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Record the session produced by a completed generation run.
    pub fn set_session_id(&mut self, id: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO session (slot, session_id, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(slot) DO UPDATE SET session_id = excluded.session_id,
                                             updated_at = excluded.updated_at",
            params![SESSION_SLOT, id, chrono::Utc::now().timestamp()],
        )?;
        logging::info(Domain::Session, "session_set", obj(&[("session_id", v_str(id))]));
        Ok(())
    }

    pub fn clear_session_id(&mut self) -> Result<()> {
        self.conn
            .execute("DELETE FROM session WHERE slot = ?1", params![SESSION_SLOT])?;
        logging::info(Domain::Session, "session_cleared", obj(&[]));
        Ok(())
    }

    pub fn record_export(&mut self, entry: &ExportEntry) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO exports (ts, kind, format, path, bytes, sha256)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![entry.ts, entry.kind, entry.format, entry.path, entry.bytes, entry.sha256],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn exports(&self) -> Result<Vec<ExportEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT ts, kind, format, path, bytes, sha256 FROM exports ORDER BY rowid",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ExportEntry {
                ts: row.get(0)?,
                kind: row.get(1)?,
                format: row.get(2)?,
                path: row.get(3)?,
                bytes: row.get(4)?,
                sha256: row.get(5)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}
