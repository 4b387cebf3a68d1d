//! Snapshot blob codec.
//!
//! A snapshot is a batch of retired namespace nodes stored as one relational
//! table, serialized as an SQLite database file and compressed with zstd:
//!
//! ```text
//! history(path TEXT, timestamp REAL, data TEXT, directory TEXT, name TEXT)
//! INDEX name_idx ON history(name)
//! INDEX path_idx ON history(path)
//! ```
//!
//! `name` serves point lookups by entity (`name GLOB 'entity,*'`). `path` is
//! not read by any query today but the index stays in the format.
//!
//! Decoding stages the database in a temporary file that lives as long as the
//! returned [`SnapshotDb`].

use crate::error::{CodecError, CodecResult};
use rusqlite::{params, Connection, OpenFlags};
use serde::Serialize;
use std::io::Write;
use tempfile::NamedTempFile;

/// Name of the table inside every snapshot.
pub const TABLE_NAME: &str = "history";

/// Default zstd compression level.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

const SCHEMA: &str = "
    CREATE TABLE history (path TEXT, timestamp REAL, data TEXT, directory TEXT, name TEXT);
    CREATE INDEX name_idx ON history (name);
    CREATE INDEX path_idx ON history (path);
";

const SELECT_COLUMNS: &str = "SELECT path, timestamp, data, directory, name FROM history";

/// One retired node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotRow {
    /// Full node path at the time it was retired.
    pub path: String,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    /// Node payload, if it had one.
    pub data: Option<String>,
    /// Parent directory of the node.
    pub directory: String,
    /// Node name.
    pub name: String,
}

/// Encodes and decodes snapshot blobs.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotCodec {
    level: i32,
}

impl Default for SnapshotCodec {
    fn default() -> Self {
        Self::new(DEFAULT_COMPRESSION_LEVEL)
    }
}

impl SnapshotCodec {
    /// Creates a codec with the given zstd level.
    #[must_use]
    pub const fn new(level: i32) -> Self {
        Self { level }
    }

    /// Builds the table for `rows` and returns the compressed blob.
    pub fn encode(&self, rows: &[SnapshotRow]) -> CodecResult<Vec<u8>> {
        let staging = NamedTempFile::new()?;
        let mut conn = Connection::open(staging.path())?;
        conn.execute_batch(SCHEMA)?;

        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO history (path, timestamp, data, directory, name) VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for row in rows {
                stmt.execute(params![row.path, row.timestamp, row.data, row.directory, row.name])?;
            }
        }
        tx.commit()?;
        conn.close().map_err(|(_, e)| e)?;

        let raw = std::fs::read(staging.path())?;
        let compressed = zstd::encode_all(raw.as_slice(), self.level)?;
        tracing::debug!(
            rows = rows.len(),
            raw_bytes = raw.len(),
            compressed_bytes = compressed.len(),
            "encoded snapshot"
        );
        Ok(compressed)
    }

    /// Decompresses `blob` into a temporary database and opens it read-only.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::CorruptSnapshot`] if the blob does not decompress
    /// or does not contain the expected table.
    pub fn open(&self, blob: &[u8]) -> CodecResult<SnapshotDb> {
        let raw = zstd::decode_all(blob)
            .map_err(|e| CodecError::corrupt_snapshot(format!("decompression failed: {e}")))?;

        let mut staging = NamedTempFile::new()?;
        staging.write_all(&raw)?;
        staging.flush()?;

        let conn = Connection::open_with_flags(
            staging.path(),
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let db = SnapshotDb {
            conn,
            _staging: staging,
        };
        db.len()
            .map_err(|e| CodecError::corrupt_snapshot(format!("unreadable table: {e}")))?;
        Ok(db)
    }
}

/// A decoded snapshot, backed by a temporary database file.
///
/// The file is removed when this value is dropped.
pub struct SnapshotDb {
    conn: Connection,
    _staging: NamedTempFile,
}

impl SnapshotDb {
    /// Number of rows.
    pub fn len(&self) -> CodecResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT count(*) FROM history", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Returns true if the snapshot holds no rows.
    pub fn is_empty(&self) -> CodecResult<bool> {
        Ok(self.len()? == 0)
    }

    /// All rows, ordered by timestamp then name.
    pub fn rows(&self) -> CodecResult<Vec<SnapshotRow>> {
        self.query(&format!("{SELECT_COLUMNS} ORDER BY timestamp, name"), None)
    }

    /// Rows whose `name` matches an SQLite glob, ordered by timestamp then name.
    pub fn rows_matching(&self, pattern: &str) -> CodecResult<Vec<SnapshotRow>> {
        self.query(
            &format!("{SELECT_COLUMNS} WHERE name GLOB ?1 ORDER BY timestamp, name"),
            Some(pattern),
        )
    }

    /// Distinct names matching an SQLite glob.
    pub fn names_matching(&self, pattern: &str) -> CodecResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT name FROM history WHERE name GLOB ?1 ORDER BY name")?;
        let names = stmt
            .query_map(params![pattern], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    fn query(&self, sql: &str, pattern: Option<&str>) -> CodecResult<Vec<SnapshotRow>> {
        let mut stmt = self.conn.prepare(sql)?;
        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<SnapshotRow> {
            Ok(SnapshotRow {
                path: row.get(0)?,
                timestamp: row.get(1)?,
                data: row.get(2)?,
                directory: row.get(3)?,
                name: row.get(4)?,
            })
        };
        let rows = match pattern {
            Some(p) => stmt.query_map(params![p], map_row)?.collect::<Result<Vec<_>, _>>()?,
            None => stmt.query_map([], map_row)?.collect::<Result<Vec<_>, _>>()?,
        };
        Ok(rows)
    }
}

impl std::fmt::Debug for SnapshotDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotDb")
            .field("staging", &self._staging.path())
            .finish()
    }
}
