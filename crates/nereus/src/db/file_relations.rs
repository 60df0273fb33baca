//! File-level include/import edges.
//!
//! These are kept next to the symbol relations so whole-file impact does not
//! need a per-symbol walk. A target that is not indexed yet is stored with a
//! NULL `target_file_id` and bound when a file with a matching path appears.

use rusqlite::{Connection, OptionalExtension, params};

use super::helpers::{FILES_COLUMNS, FILES_WIDTH, parse_file_relation_kind, row_to_indexed_file_at};
use super::{NewFileRelation, Snapshot};
use crate::error::Result;
use crate::types::{FileId, FileRelationKind, IndexedFile};

/// An outgoing include/import edge of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingFileRelation {
    /// Path as written in the including file
    pub target_path: String,
    /// The indexed target, if any
    pub target: Option<IndexedFile>,
    /// Edge kind
    pub kind: FileRelationKind,
    /// Line of the directive
    pub line: Option<u32>,
}

/// Join `target` onto the directory of `source`, collapsing `.` and `..`.
///
/// Returns `None` when `..` climbs above the workspace root.
fn join_relative(source: &str, target: &str) -> Option<String> {
    let mut parts: Vec<&str> = source.split('/').collect();
    parts.pop();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

/// Find the indexed file an include path names.
///
/// Tries the path relative to the including file, then the path as written,
/// then the shortest indexed path ending in `/<target>`.
fn resolve_target_file(conn: &Connection, source_path: &str, target: &str) -> Result<Option<FileId>> {
    let mut stmt = conn.prepare_cached("SELECT id FROM files WHERE path = ?1 AND id != 0")?;
    if let Some(joined) = join_relative(source_path, target)
        && let Some(id) = stmt.query_row([&joined], |row| row.get::<_, i64>(0)).optional()?
    {
        return Ok(Some(FileId::from(id)));
    }
    if let Some(id) = stmt.query_row([target], |row| row.get::<_, i64>(0)).optional()? {
        return Ok(Some(FileId::from(id)));
    }

    conn.query_row(
        "SELECT id FROM files
         WHERE id != 0 AND substr(path, -(length(?1) + 1)) = '/' || ?1
         ORDER BY length(path), path LIMIT 1",
        [target],
        |row| row.get::<_, i64>(0),
    )
    .optional()
    .map(|id| id.map(FileId::from))
    .map_err(Into::into)
}

/// Replace a file's outgoing file relations inside an open transaction.
pub(super) fn replace_file_relations(
    conn: &Connection,
    file_id: FileId,
    source_path: &str,
    includes: &[NewFileRelation],
) -> Result<usize> {
    conn.execute(
        "DELETE FROM file_relations WHERE source_file_id = ?1",
        [file_id.as_i64()],
    )?;

    let mut insert = conn.prepare_cached(
        "INSERT INTO file_relations (source_file_id, target_path, target_file_id, relation_type, line)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (source_file_id, target_path, relation_type) DO NOTHING",
    )?;

    let mut written = 0;
    for include in includes {
        let target_path = include
            .target_path
            .strip_prefix("./")
            .unwrap_or(&include.target_path);
        let target_file = resolve_target_file(conn, source_path, target_path)?;
        written += insert.execute(params![
            file_id.as_i64(),
            target_path,
            target_file.map(FileId::as_i64),
            include.kind.as_str(),
            include.line,
        ])?;
    }
    Ok(written)
}

/// Point pending file relations at a newly created file.
pub(super) fn bind_pending_file_relations(
    conn: &Connection,
    file_id: FileId,
    path: &str,
) -> Result<usize> {
    let bound = conn.execute(
        "UPDATE file_relations SET target_file_id = ?1
         WHERE target_file_id IS NULL
           AND (target_path = ?2 OR substr(?2, -(length(target_path) + 1)) = '/' || target_path)",
        params![file_id.as_i64(), path],
    )?;
    Ok(bound)
}

impl Snapshot<'_> {
    /// Files that include or import `file_id`, with the edge kind and first line.
    pub fn includers_of(
        &self,
        file_id: FileId,
    ) -> Result<Vec<(IndexedFile, FileRelationKind, Option<u32>)>> {
        let mut stmt = self.conn().prepare_cached(&format!(
            "SELECT {FILES_COLUMNS}, MIN(fr.relation_type), MIN(fr.line)
             FROM file_relations fr
             JOIN files f ON f.id = fr.source_file_id
             WHERE fr.target_file_id = ?1 AND fr.source_file_id != ?1
             GROUP BY f.id
             ORDER BY f.path"
        ))?;

        let rows = stmt
            .query_map([file_id.as_i64()], |row| {
                Ok((
                    row_to_indexed_file_at(row, 0)?,
                    parse_file_relation_kind(&row.get::<_, String>(FILES_WIDTH)?)?,
                    row.get(FILES_WIDTH + 1)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Outgoing include/import edges of `file_id`, in line order.
    pub fn includes_of(&self, file_id: FileId) -> Result<Vec<OutgoingFileRelation>> {
        let mut stmt = self.conn().prepare_cached(&format!(
            "SELECT fr.target_path, fr.relation_type, fr.line, {FILES_COLUMNS}
             FROM file_relations fr
             LEFT JOIN files f ON f.id = fr.target_file_id
             WHERE fr.source_file_id = ?1
             ORDER BY fr.line, fr.target_path"
        ))?;

        let rows = stmt
            .query_map([file_id.as_i64()], |row| {
                let target = match row.get::<_, Option<i64>>(3)? {
                    Some(_) => Some(row_to_indexed_file_at(row, 3)?),
                    None => None,
                };
                Ok(OutgoingFileRelation {
                    target_path: row.get(0)?,
                    kind: parse_file_relation_kind(&row.get::<_, String>(1)?)?,
                    line: row.get(2)?,
                    target,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::*;
    use crate::db::{FileContents, FileMeta, Store};

    fn write_with_includes(store: &Store, path: &str, includes: &[&str]) -> FileId {
        let contents = FileContents {
            content_hash: Some(1),
            includes: includes
                .iter()
                .zip(1u32..)
                .map(|(p, line)| NewFileRelation {
                    target_path: (*p).to_string(),
                    kind: FileRelationKind::Includes,
                    line: Some(line),
                })
                .collect(),
            ..FileContents::default()
        };
        store
            .write_file(path, &FileMeta::default(), &contents)
            .unwrap()
            .file_id
    }

    #[test]
    fn join_relative_collapses_dot_segments() {
        assert_eq!(
            join_relative("src/main.c", "lcd/lcd.h").as_deref(),
            Some("src/lcd/lcd.h")
        );
        assert_eq!(
            join_relative("src/app/main.c", "../lcd.h").as_deref(),
            Some("src/lcd.h")
        );
        assert_eq!(join_relative("main.c", "../x.h"), None);
    }

    #[test]
    fn include_resolves_relative_to_source_dir() {
        let (_dir, store) = temp_store();
        let header = write_with_includes(&store, "src/system.h", &[]);
        let main = write_with_includes(&store, "src/main.c", &["system.h"]);

        let snap = store.snapshot().unwrap();
        let includes = snap.includes_of(main).unwrap();
        assert_eq!(includes.len(), 1);
        assert_eq!(includes[0].target.as_ref().map(|f| f.id), Some(header));
    }

    #[test]
    fn pending_include_binds_when_target_is_created() {
        let (_dir, store) = temp_store();
        let main = write_with_includes(&store, "main.c", &["drivers/lcd.h"]);

        {
            let snap = store.snapshot().unwrap();
            assert!(snap.includes_of(main).unwrap()[0].target.is_none());
        }

        let header = write_with_includes(&store, "src/drivers/lcd.h", &[]);

        let snap = store.snapshot().unwrap();
        let includers = snap.includers_of(header).unwrap();
        assert_eq!(includers.len(), 1);
        assert_eq!(includers[0].0.path.to_str(), Some("main.c"));
        assert_eq!(includers[0].1, FileRelationKind::Includes);
    }

    #[test]
    fn deleting_target_makes_include_pending_again() {
        let (_dir, store) = temp_store();
        write_with_includes(&store, "lcd.h", &[]);
        let main = write_with_includes(&store, "main.c", &["lcd.h"]);

        store.delete_file("lcd.h").unwrap();

        let snap = store.snapshot().unwrap();
        let includes = snap.includes_of(main).unwrap();
        assert_eq!(includes.len(), 1);
        assert!(includes[0].target.is_none());
    }

    #[test]
    fn self_include_is_not_an_includer() {
        let (_dir, store) = temp_store();
        let id = write_with_includes(&store, "loop.h", &["loop.h"]);

        let snap = store.snapshot().unwrap();
        assert!(snap.includers_of(id).unwrap().is_empty());
    }

    #[test]
    fn upsert_alone_binds_pending_include() {
        let (_dir, store) = temp_store();
        write_with_includes(&store, "main.c", &["lcd.h"]);

        let header = store.upsert_file("lcd.h", &FileMeta::default()).unwrap();

        let snap = store.snapshot().unwrap();
        assert_eq!(snap.includers_of(header).unwrap().len(), 1);
    }
}
