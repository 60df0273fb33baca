//! File writes and reads for the graph store.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};

use super::file_relations::bind_pending_file_relations;
use super::relations::{capture_incoming, requeue_orphans};
use super::helpers::{FILES_COLUMNS, row_to_indexed_file};
use super::{FileMeta, Snapshot, Store};
use crate::error::{Error, Result};
use crate::types::{EXTERNAL_NAME, FileId, IndexedFile};

/// Normalize a file path to use forward slashes for consistent DB storage.
///
/// A leading `./` is dropped so `./src/a.c` and `src/a.c` name the same row.
#[must_use]
pub fn normalize_path(path: &Path) -> String {
    let s = path.to_string_lossy();
    let s = if cfg!(windows) || s.contains('\\') {
        s.replace('\\', "/")
    } else {
        s.into_owned()
    };
    match s.strip_prefix("./") {
        Some(rest) => rest.to_string(),
        None => s,
    }
}

/// Create or update the file row inside an open transaction.
///
/// Returns the file id and whether the row was created.
pub(super) fn upsert_file_in(conn: &Connection, path: &str, meta: &FileMeta) -> Result<(FileId, bool)> {
    if path == EXTERNAL_NAME || path.is_empty() {
        return Err(Error::Config(format!("'{path}' is not a valid file path")));
    }

    let existing: Option<i64> = conn
        .query_row("SELECT id FROM files WHERE path = ?1", [path], |row| {
            row.get(0)
        })
        .optional()?;

    if let Some(id) = existing {
        conn.execute(
            "UPDATE files SET module = ?2, is_critical = ?3 WHERE id = ?1",
            params![id, meta.module, meta.is_critical],
        )?;
        return Ok((FileId::from(id), false));
    }

    conn.execute(
        "INSERT INTO files (path, module, is_critical) VALUES (?1, ?2, ?3)",
        params![path, meta.module, meta.is_critical],
    )?;
    let file_id = FileId::from(conn.last_insert_rowid());
    let bound = bind_pending_file_relations(conn, file_id, path)?;
    if bound > 0 {
        tracing::debug!(path, bound, "Bound pending includes to new file");
    }
    Ok((file_id, true))
}

impl Store {
    /// Insert or update a file record, returning the file ID.
    ///
    /// Leaves the content hash and the file's symbols untouched. A newly
    /// created file picks up pending include edges that already name it.
    pub fn upsert_file(&self, path: &str, meta: &FileMeta) -> Result<FileId> {
        let mut conn = self.writer()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let (file_id, created) = upsert_file_in(&tx, path, meta)?;
        tx.commit()?;
        drop(conn);

        let version = self.bump_version();
        tracing::trace!(path, %file_id, created, version, "Upserted file");
        Ok(file_id)
    }

    /// Delete a file and everything it owns.
    ///
    /// Cascades to its symbols, every relation touching those symbols, and
    /// its outgoing file relations. Incoming include edges become pending
    /// again, and so do name-resolved edges that had no other target.
    /// Returns `false` if the file was not indexed.
    pub fn delete_file(&self, path: &str) -> Result<bool> {
        let mut conn = self.writer()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let file_id: Option<i64> = tx
            .query_row("SELECT id FROM files WHERE path = ?1 AND id != 0", [path], |row| {
                row.get(0)
            })
            .optional()?;
        let Some(file_id) = file_id.map(FileId::from) else {
            return Ok(false);
        };

        let incoming = capture_incoming(&tx, file_id)?;
        tx.execute("DELETE FROM files WHERE id = ?1", [file_id.as_i64()])?;
        let orphaned = requeue_orphans(&tx, &incoming)?;
        tx.commit()?;
        drop(conn);

        let version = self.bump_version();
        tracing::debug!(path, orphaned, version, "Deleted file from graph");
        Ok(true)
    }

    /// Remove every indexed file, keeping the schema and the placeholder.
    pub fn clear(&self) -> Result<()> {
        let mut conn = self.writer()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let removed = tx.execute("DELETE FROM files WHERE id != 0", [])?;
        tx.commit()?;
        drop(conn);

        let version = self.bump_version();
        tracing::info!(removed, version, "Cleared graph");
        Ok(())
    }
}

impl Snapshot<'_> {
    /// Get a file by path.
    pub fn get_file(&self, path: &str) -> Result<Option<IndexedFile>> {
        self.conn()
            .query_row(
                &format!("SELECT {FILES_COLUMNS} FROM files f WHERE f.path = ?1 AND f.id != 0"),
                [path],
                row_to_indexed_file,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Get a file by its database ID.
    pub fn get_file_by_id(&self, id: FileId) -> Result<Option<IndexedFile>> {
        self.conn()
            .query_row(
                &format!("SELECT {FILES_COLUMNS} FROM files f WHERE f.id = ?1 AND f.id != 0"),
                [id.as_i64()],
                row_to_indexed_file,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Get all indexed files, ordered by path.
    pub fn list_files(&self) -> Result<Vec<IndexedFile>> {
        let mut stmt = self.conn().prepare_cached(&format!(
            "SELECT {FILES_COLUMNS} FROM files f WHERE f.id != 0 ORDER BY f.path"
        ))?;

        let files = stmt
            .query_map([], row_to_indexed_file)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(files)
    }

    /// Get all files flagged critical, ordered by path.
    pub fn critical_files(&self) -> Result<Vec<IndexedFile>> {
        let mut stmt = self.conn().prepare_cached(&format!(
            "SELECT {FILES_COLUMNS} FROM files f WHERE f.id != 0 AND f.is_critical = 1 ORDER BY f.path"
        ))?;

        let files = stmt
            .query_map([], row_to_indexed_file)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(files)
    }
}
