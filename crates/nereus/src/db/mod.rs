//! `SQLite` storage layer for Nereus.
//!
//! The [`Store`] is the single source of truth for the graph. It follows a
//! single-writer / many-reader discipline:
//!
//! - One writer connection behind a `Mutex`. Every mutation takes it and runs
//!   inside an `IMMEDIATE` transaction, so writes are serialized whole-file units.
//! - A pool of read-only connections. Readers open a [`Snapshot`] (a pinned WAL
//!   read transaction) and never touch the writer lock.
//! - A monotonic version counter, bumped once after every committed mutation.
//!
//! ## Module Structure
//!
//! - `schema` - Database schema (DDL)
//! - `helpers` - Row conversion and parsing utilities
//! - `snapshot` - Read transactions over pooled reader connections
//! - `files` - File writes and reads
//! - `symbols` - Symbol reads and search
//! - `relations` - Atomic per-file replace and relation reads
//! - `file_relations` - File-level include/import edges
//! - `integrity` - Statistics and referential integrity checks

mod file_relations;
mod files;
mod helpers;
mod integrity;
mod relations;
mod schema;
mod snapshot;
mod symbols;

pub use file_relations::OutgoingFileRelation;
pub use relations::{GraphEdge, Neighbor};
pub use snapshot::Snapshot;

pub use files::normalize_path;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, OptionalExtension};

use crate::error::{Error, Result};
use crate::types::{FileId, FileRelationKind, RelationKind, SymbolId, SymbolKind, Visibility};
use schema::{SCHEMA, SCHEMA_VERSION};

/// Default time a connection waits on a locked database before failing.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Idle reader connections kept for reuse.
const MAX_IDLE_READERS: usize = 8;

/// Per-file metadata written by [`Store::upsert_file`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileMeta {
    /// Module derived from the path
    pub module: String,
    /// Whether the file matched a critical-path pattern
    pub is_critical: bool,
}

/// A symbol to insert as part of a file's contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSymbol {
    /// Symbol name
    pub name: String,
    /// Symbol kind
    pub kind: SymbolKind,
    /// First line (1-indexed)
    pub line_start: u32,
    /// Last line (1-indexed, inclusive)
    pub line_end: u32,
    /// Free-text signature
    pub signature: Option<String>,
    /// Visibility
    pub visibility: Visibility,
}

/// A relation endpoint inside a [`FileContents`] batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolRef {
    /// Index into [`FileContents::symbols`]
    Local(usize),
    /// A symbol of another file, found by the relation's target name
    Existing(SymbolId),
    /// No symbol of another file has the target name yet; the edge waits on
    /// the placeholder and binds when a definition is indexed
    Pending,
    /// An explicit external reference; stays on the placeholder for good
    External,
}

impl SymbolRef {
    /// Whether the edge was resolved by name across files and keeps tracking
    /// definitions of that name.
    #[must_use]
    pub fn is_by_name(self) -> bool {
        matches!(self, Self::Existing(_) | Self::Pending)
    }
}

/// A relation to insert as part of a file's contents.
///
/// The source is always a symbol of the batch: relations belong to the file
/// that owns their source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRelation {
    /// Index into [`FileContents::symbols`]
    pub source: usize,
    /// Target endpoint
    pub target: SymbolRef,
    /// Relation kind
    pub kind: RelationKind,
    /// Target name as reported by the extractor
    pub target_name: String,
    /// File the extractor said the target lives in, if any
    pub target_hint: Option<String>,
    /// Line where the relation was observed
    pub line: Option<u32>,
}

/// A file-level edge to insert as part of a file's contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFileRelation {
    /// Path as written in the source file
    pub target_path: String,
    /// Edge kind
    pub kind: FileRelationKind,
    /// Line of the directive
    pub line: Option<u32>,
}

/// Everything one file contributes to the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileContents {
    /// Hash of the bytes these contents were extracted from
    pub content_hash: Option<u64>,
    /// Symbols owned by the file
    pub symbols: Vec<NewSymbol>,
    /// Relations whose source is one of `symbols`
    pub relations: Vec<NewRelation>,
    /// Include/import edges to other files
    pub includes: Vec<NewFileRelation>,
}

/// What a [`Store::replace_file_contents`] call changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaceOutcome {
    /// The file that was written
    pub file_id: FileId,
    /// Generated ids, in the order of [`FileContents::symbols`]
    pub symbol_ids: Vec<SymbolId>,
    /// Relation rows written for this file (after merging duplicates)
    pub relations_written: usize,
    /// Incoming relations from other files bound again to the new symbols
    pub repointed: usize,
    /// Incoming relations left with no target at all, now on the placeholder
    pub orphaned: usize,
    /// Relations from other files that gained a target in this file
    pub bound: usize,
}

/// `SQLite` database wrapper for the Nereus graph.
pub struct Store {
    writer: Mutex<Connection>,
    readers: Mutex<Vec<Connection>>,
    path: PathBuf,
    busy_timeout: Duration,
    version: AtomicU64,
}

impl Store {
    /// Open or create the graph database with the default busy timeout.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))
    }

    /// Open or create the graph database.
    ///
    /// Creates the parent directory, switches the database to WAL mode,
    /// applies the schema and checks the stored schema version.
    pub fn open_with_timeout(path: &Path, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(SCHEMA)?;
        Self::check_schema_version(&conn)?;

        tracing::debug!(path = %path.display(), "Opened graph database");

        Ok(Self {
            writer: Mutex::new(conn),
            readers: Mutex::new(Vec::new()),
            path: path.to_path_buf(),
            busy_timeout,
            version: AtomicU64::new(0),
        })
    }

    fn check_schema_version(conn: &Connection) -> Result<()> {
        let stored: Option<i64> = conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match stored {
            None => {
                conn.execute(
                    "INSERT INTO meta (key, value) VALUES ('schema_version', ?1)",
                    [SCHEMA_VERSION],
                )?;
                Ok(())
            }
            Some(v) if v == SCHEMA_VERSION => Ok(()),
            Some(v) => Err(Error::Config(format!(
                "database schema version {v} does not match expected {SCHEMA_VERSION}; \
                 delete {} and re-index",
                conn.path().unwrap_or("the database")
            ))),
        }
    }

    /// Path of the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current store version.
    ///
    /// Starts at 0 for each open store and grows by one per committed
    /// mutation. Readers compare versions to detect that the graph changed.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Record one committed mutation.
    fn bump_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Acquire the writer lock.
    ///
    /// Holding the guard makes the caller the single logical writer.
    pub(crate) fn writer(&self) -> Result<MutexGuard<'_, Connection>> {
        self.writer.lock().map_err(|e| {
            Error::Internal(format!(
                "writer connection mutex poisoned (a thread panicked while holding the lock): {e}"
            ))
        })
    }

    /// Take an idle reader connection, opening a new one if the pool is empty.
    fn checkout_reader(&self) -> Result<Connection> {
        let idle = self
            .readers
            .lock()
            .map_err(|e| Error::Internal(format!("reader pool mutex poisoned: {e}")))?
            .pop();
        if let Some(conn) = idle {
            return Ok(conn);
        }

        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        conn.pragma_update(None, "query_only", "ON")?;
        tracing::trace!(path = %self.path.display(), "Opened reader connection");
        Ok(conn)
    }

    /// Return a reader connection to the pool.
    fn checkin_reader(&self, conn: Connection) {
        match self.readers.lock() {
            Ok(mut idle) if idle.len() < MAX_IDLE_READERS => idle.push(conn),
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "Reader pool poisoned, closing connection"),
        }
    }

    /// Get the current unix timestamp in nanoseconds.
    // u128 nanoseconds won't exceed i64::MAX until year 2262
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn now_ns() -> Result<i64> {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .map_err(|e| {
                Error::Config(format!(
                    "System clock is before Unix epoch: {e}. Fix system time before indexing."
                ))
            })
    }

    /// Update `SQLite` query planner statistics.
    ///
    /// Worth calling after a full rebuild, not after incremental updates.
    pub fn analyze(&self) -> Result<()> {
        let conn = self.writer()?;
        conn.execute_batch("ANALYZE")?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn open_creates_schema_and_placeholder() {
        let (_dir, store) = temp_store();
        let conn = store.writer().unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for table in ["file_relations", "files", "meta", "relations", "symbols"] {
            assert!(tables.contains(&table.to_string()), "missing table {table}");
        }

        let placeholder: String = conn
            .query_row("SELECT name FROM symbols WHERE id = 0", [], |row| row.get(0))
            .unwrap();
        assert_eq!(placeholder, "<external>");
    }

    #[test]
    fn reopen_keeps_data_and_schema_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.db");
        {
            let store = Store::open(&path).unwrap();
            write_file(&store, "a.c", &["alpha"], vec![]);
        }

        let store = Store::open(&path).unwrap();
        let snap = store.snapshot().unwrap();
        assert!(snap.get_file("a.c").unwrap().is_some());
    }

    #[test]
    fn mismatched_schema_version_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.db");
        {
            let store = Store::open(&path).unwrap();
            store
                .writer()
                .unwrap()
                .execute("UPDATE meta SET value = 999 WHERE key = 'schema_version'", [])
                .unwrap();
        }

        let result = Store::open(&path);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn every_mutation_bumps_version() {
        let (_dir, store) = temp_store();
        assert_eq!(store.version(), 0);

        store.upsert_file("a.c", &FileMeta::default()).unwrap();
        assert_eq!(store.version(), 1);

        write_file(&store, "a.c", &["alpha"], vec![]);
        assert_eq!(store.version(), 2);

        store.delete_file("a.c").unwrap();
        assert_eq!(store.version(), 3);
    }

    #[test]
    fn writer_lock_is_shared_across_threads() {
        let (_dir, store) = temp_store();
        let store = std::sync::Arc::new(store);

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let store = std::sync::Arc::clone(&store);
                std::thread::spawn(move || {
                    write_file(&store, &format!("f{i}.c"), &["fn_a", "fn_b"], vec![]);
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("writer thread should not panic");
        }

        assert_eq!(store.version(), 4);
        assert_eq!(store.snapshot().unwrap().list_files().unwrap().len(), 4);
    }
}
