//! SQLite-backed descriptor store.
//!
//! Descriptors are kept in their JSON array form, one row per subject.

use chrono::{SecondsFormat, Utc};
use rollcall_core::{DescriptorError, FaceDescriptor, KnownSet, SubjectId};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS subjects (
    id          TEXT PRIMARY KEY,
    label       TEXT NOT NULL DEFAULT '',
    descriptor  TEXT NOT NULL,
    dims        INTEGER NOT NULL,
    enrolled_at TEXT NOT NULL
);
";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("descriptor: {0}")]
    Descriptor(#[from] DescriptorError),
    #[error("creating database directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Summary row for listing enrolled subjects.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrolledSubject {
    pub subject: SubjectId,
    pub label: String,
    pub dims: usize,
    pub enrolled_at: String,
}

pub struct DescriptorStore {
    conn: Connection,
}

impl DescriptorStore {
    /// Open (and create if needed) the store at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        tracing::debug!(path = %path.display(), "opened descriptor store");
        Self::init(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Insert or replace the descriptor for `subject`.
    pub fn upsert(
        &self,
        subject: &SubjectId,
        label: &str,
        descriptor: &FaceDescriptor,
    ) -> Result<(), StoreError> {
        let json = descriptor.to_json()?;
        let enrolled_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        self.conn.execute(
            "INSERT INTO subjects (id, label, descriptor, dims, enrolled_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                label = excluded.label,
                descriptor = excluded.descriptor,
                dims = excluded.dims,
                enrolled_at = excluded.enrolled_at",
            params![subject.as_str(), label, json, descriptor.len() as i64, enrolled_at],
        )?;
        tracing::info!(%subject, dims = descriptor.len(), "stored descriptor");
        Ok(())
    }

    /// All enrolled descriptors in enrollment order.
    ///
    /// Rows whose descriptor no longer parses are skipped with a warning.
    pub fn known_set(&self) -> Result<KnownSet, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, descriptor FROM subjects ORDER BY enrolled_at, id")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut known = KnownSet::new();
        for row in rows {
            let (id, json) = row?;
            match FaceDescriptor::from_json(&json) {
                Ok(descriptor) => known.insert(id, descriptor),
                Err(err) => {
                    tracing::warn!(subject = %id, error = %err, "skipping unreadable descriptor")
                }
            }
        }
        Ok(known)
    }

    #[cfg(test)]
    pub fn get(&self, subject: &SubjectId) -> Result<Option<FaceDescriptor>, StoreError> {
        use rusqlite::OptionalExtension;
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT descriptor FROM subjects WHERE id = ?1",
                params![subject.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(json.map(|j| FaceDescriptor::from_json(&j)).transpose()?)
    }

    pub fn list(&self) -> Result<Vec<EnrolledSubject>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, label, dims, enrolled_at FROM subjects ORDER BY enrolled_at, id")?;
        let rows = stmt.query_map([], |row| {
            Ok(EnrolledSubject {
                subject: SubjectId::new(row.get::<_, String>(0)?),
                label: row.get(1)?,
                dims: row.get::<_, i64>(2)? as usize,
                enrolled_at: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Remove a subject. Returns false if it was not enrolled.
    pub fn remove(&self, subject: &SubjectId) -> Result<bool, StoreError> {
        let n = self
            .conn
            .execute("DELETE FROM subjects WHERE id = ?1", params![subject.as_str()])?;
        Ok(n > 0)
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM subjects", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    #[cfg(test)]
    fn insert_raw(&self, id: &str, json: &str, enrolled_at: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO subjects (id, label, descriptor, dims, enrolled_at)
             VALUES (?1, '', ?2, 0, ?3)",
            params![id, json, enrolled_at],
        )?;
        Ok(())
    }
}
