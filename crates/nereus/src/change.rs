//! Change detection by content hash.
//!
//! A file needs re-indexing when the hash of its current bytes differs from
//! the hash stored with its last successful ingestion. Anything that prevents
//! the comparison counts as "changed": skipping a file wrongly is worse than
//! indexing it twice.

use xxhash_rust::xxh3::xxh3_64;

use crate::db::Store;

/// Deterministic 64-bit digest of a file's bytes.
#[must_use]
pub fn content_hash(bytes: &[u8]) -> u64 {
    xxh3_64(bytes)
}

/// Compares current file bytes against the stored content hash.
#[derive(Clone, Copy)]
pub struct ChangeDetector<'s> {
    store: &'s Store,
}

impl<'s> ChangeDetector<'s> {
    /// Create a detector reading from `store`.
    #[must_use]
    pub fn new(store: &'s Store) -> Self {
        Self { store }
    }

    /// Whether `path` must be re-extracted given its current bytes.
    ///
    /// True for unseen files, files without a stored hash, and on any store error.
    #[must_use]
    pub fn needs_reindex(&self, path: &str, current_bytes: &[u8]) -> bool {
        self.needs_reindex_hashed(path, content_hash(current_bytes))
    }

    /// Like [`Self::needs_reindex`] with an already computed hash.
    #[must_use]
    pub fn needs_reindex_hashed(&self, path: &str, hash: u64) -> bool {
        let stored = self
            .store
            .snapshot()
            .and_then(|snap| snap.get_file(path));
        match stored {
            Ok(Some(file)) => file.content_hash != Some(hash),
            Ok(None) => true,
            Err(e) => {
                tracing::warn!(path, error = %e, "Could not read stored hash, assuming changed");
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::temp_store;
    use crate::db::{FileContents, FileMeta};

    #[test]
    fn hash_is_deterministic_and_content_sensitive() {
        assert_eq!(content_hash(b"int main;"), content_hash(b"int main;"));
        assert_ne!(content_hash(b"int main;"), content_hash(b"int main();"));
    }

    #[test]
    fn unseen_file_needs_reindex() {
        let (_dir, store) = temp_store();
        assert!(ChangeDetector::new(&store).needs_reindex("new.c", b"x"));
    }

    #[test]
    fn unchanged_bytes_skip_and_changed_bytes_reindex() {
        let (_dir, store) = temp_store();
        let bytes = b"void init(void) {}";
        let contents = FileContents {
            content_hash: Some(content_hash(bytes)),
            ..FileContents::default()
        };
        store
            .write_file("system.c", &FileMeta::default(), &contents)
            .unwrap();

        let detector = ChangeDetector::new(&store);
        assert!(!detector.needs_reindex("system.c", bytes));
        assert!(detector.needs_reindex("system.c", b"void init(int) {}"));
    }

    #[test]
    fn file_without_hash_needs_reindex() {
        let (_dir, store) = temp_store();
        store.upsert_file("a.c", &FileMeta::default()).unwrap();

        assert!(ChangeDetector::new(&store).needs_reindex("a.c", b""));
    }

    #[test]
    fn store_failure_assumes_changed() {
        let (dir, store) = temp_store();
        // Make new reader connections fail by removing the database directory.
        crate::db::test_support::drop_idle_readers(&store);
        std::fs::remove_dir_all(dir.path()).unwrap();

        assert!(ChangeDetector::new(&store).needs_reindex("a.c", b"x"));
    }
}
