//! Consistent read views over the store.
//!
//! A [`Snapshot`] owns a pooled reader connection with an open read
//! transaction. Under WAL, the first read inside that transaction fixes the
//! database state it sees; later commits by the writer stay invisible until
//! the snapshot is dropped. Every query in a traversal goes through one
//! snapshot, so a traversal never observes a half-old, half-new graph.

use rusqlite::Connection;

use super::Store;
use crate::error::Result;

/// A pinned, read-only view of the graph.
pub struct Snapshot<'s> {
    store: &'s Store,
    conn: Option<Connection>,
    version: u64,
}

impl Store {
    /// Open a read snapshot.
    ///
    /// Never waits on the writer lock. The recorded version is read just
    /// before the snapshot is pinned, so the view contains at least that
    /// version's writes.
    pub fn snapshot(&self) -> Result<Snapshot<'_>> {
        let conn = self.checkout_reader()?;
        let version = self.version();

        conn.execute_batch("BEGIN DEFERRED")?;
        // A deferred transaction has no read mark until its first read.
        if let Err(e) = conn.query_row("SELECT COUNT(*) FROM meta", [], |row| row.get::<_, i64>(0))
        {
            if let Err(rollback) = conn.execute_batch("ROLLBACK") {
                tracing::warn!(error = %rollback, "Failed to roll back unpinned snapshot");
            }
            return Err(e.into());
        }

        Ok(Snapshot {
            store: self,
            conn: Some(conn),
            version,
        })
    }
}

impl Snapshot<'_> {
    /// Store version observed when the snapshot was taken.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn conn(&self) -> &Connection {
        match &self.conn {
            Some(conn) => conn,
            // Only `drop` takes the connection.
            None => unreachable!("snapshot connection used after release"),
        }
    }
}

impl Drop for Snapshot<'_> {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        match conn.execute_batch("COMMIT") {
            Ok(()) => self.store.checkin_reader(conn),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to end snapshot, closing reader connection");
            }
        }
    }
}
