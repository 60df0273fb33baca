//! Atomic per-file replace and symbol relation reads.
//!
//! A file's symbols are never edited in place. Re-indexing deletes the old
//! set and inserts the new one inside a single `IMMEDIATE` transaction, then
//! rebinds the name-resolved edges of other files: every edge naming a new
//! non-private symbol (and hinting at this file, if it hints at all) gains
//! it as a target, and an edge left with no target waits on the placeholder. The
//! graph therefore does not depend on the order files are indexed in. A
//! reader either sees the whole old file or the whole new file.

use std::collections::{BTreeMap, BTreeSet};

use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};

use super::file_relations::replace_file_relations;
use super::files::upsert_file_in;
use super::helpers::{
    FILES_COLUMNS, FILES_WIDTH, SYMBOLS_COLUMNS, SYMBOLS_WIDTH, hash_to_sql, parse_relation_kind,
    relation_kind_list, row_to_indexed_file_at, row_to_symbol_at,
};
use super::{FileContents, FileMeta, ReplaceOutcome, Snapshot, Store, SymbolRef};
use crate::error::{Error, Result};
use crate::types::{
    EXTERNAL_SYMBOL_ID, FileId, IndexedFile, Relation, RelationKind, Symbol, SymbolId, Visibility,
};

/// A symbol reached over one relation hop, with the file that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Neighbor {
    /// The neighbouring symbol
    pub symbol: Symbol,
    /// Its owning file
    pub file: IndexedFile,
    /// First line where the relation was observed
    pub line: Option<u32>,
}

/// A bare source-to-target edge, for whole-graph algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphEdge {
    /// Source symbol
    pub source: SymbolId,
    /// Target symbol
    pub target: SymbolId,
}

/// The edges one relation record produced when resolved by name: every row
/// sharing these fields is a fan-out of the same record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(super) struct NameGroup {
    source_id: i64,
    relation_type: String,
    target_name: String,
    target_hint: String,
}

/// Where and how often a [`NameGroup`] was observed.
#[derive(Debug, Clone)]
pub(super) struct GroupSite {
    location_file_id: i64,
    location_line: Option<u32>,
    count: u32,
}

const UPSERT_RELATION: &str = "INSERT INTO relations
        (source_id, target_id, relation_type, target_name, target_hint, by_name,
         location_file_id, location_line, count)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
     ON CONFLICT (source_id, target_id, relation_type, target_name, target_hint, by_name)
     DO UPDATE SET
        count = count + excluded.count,
        location_line = COALESCE(min(location_line, excluded.location_line), location_line, excluded.location_line)";

fn row_to_group(row: &rusqlite::Row) -> rusqlite::Result<(NameGroup, GroupSite)> {
    Ok((
        NameGroup {
            source_id: row.get(0)?,
            relation_type: row.get(1)?,
            target_name: row.get(2)?,
            target_hint: row.get(3)?,
        },
        GroupSite {
            location_file_id: row.get(4)?,
            location_line: row.get(5)?,
            count: row.get(6)?,
        },
    ))
}

/// Name-resolved groups from other files with a target in `file_id`.
pub(super) fn capture_incoming(
    conn: &Connection,
    file_id: FileId,
) -> Result<Vec<(NameGroup, GroupSite)>> {
    let mut stmt = conn.prepare_cached(
        "SELECT r.source_id, r.relation_type, r.target_name, r.target_hint,
                MIN(r.location_file_id), MIN(r.location_line), MAX(r.count)
         FROM relations r
         JOIN symbols t ON t.id = r.target_id
         JOIN symbols s ON s.id = r.source_id
         WHERE t.file_id = ?1 AND s.file_id != ?1 AND r.by_name = 1
         GROUP BY r.source_id, r.relation_type, r.target_name, r.target_hint",
    )?;
    let groups = stmt
        .query_map([file_id.as_i64()], row_to_group)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(groups)
}

/// Name-resolved groups from files other than `file_id` that a non-private
/// symbol `name` defined at `path` satisfies.
fn groups_naming(
    conn: &Connection,
    name: &str,
    path: &str,
    file_id: FileId,
) -> Result<Vec<(NameGroup, GroupSite)>> {
    let mut stmt = conn.prepare_cached(
        "SELECT r.source_id, r.relation_type, r.target_name, r.target_hint,
                MIN(r.location_file_id), MIN(r.location_line), MAX(r.count)
         FROM relations r
         JOIN symbols s ON s.id = r.source_id
         WHERE r.by_name = 1 AND r.target_name = ?1
           AND (r.target_hint = '' OR r.target_hint = ?2)
           AND s.file_id != ?3
         GROUP BY r.source_id, r.relation_type, r.target_name, r.target_hint",
    )?;
    let groups = stmt
        .query_map(params![name, path, file_id.as_i64()], row_to_group)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(groups)
}

fn insert_group_edge(conn: &Connection, group: &NameGroup, site: &GroupSite, target: i64) -> Result<()> {
    conn.prepare_cached(
        "INSERT OR IGNORE INTO relations
            (source_id, target_id, relation_type, target_name, target_hint, by_name,
             location_file_id, location_line, count)
         VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?7, ?8)",
    )?
    .execute(params![
        group.source_id,
        target,
        group.relation_type,
        group.target_name,
        group.target_hint,
        site.location_file_id,
        site.location_line,
        site.count,
    ])?;
    Ok(())
}

/// Put each group that lost its last target back on the placeholder.
///
/// Returns how many groups became pending.
pub(super) fn requeue_orphans(
    conn: &Connection,
    groups: &[(NameGroup, GroupSite)],
) -> Result<usize> {
    let mut has_target = conn.prepare_cached(
        "SELECT EXISTS (SELECT 1 FROM relations
             WHERE source_id = ?1 AND relation_type = ?2 AND target_name = ?3
               AND target_hint = ?4 AND by_name = 1 AND target_id != 0)",
    )?;
    let mut orphaned = 0;
    for (group, site) in groups {
        let bound: bool = has_target.query_row(
            params![
                group.source_id,
                group.relation_type,
                group.target_name,
                group.target_hint
            ],
            |row| row.get(0),
        )?;
        if !bound {
            insert_group_edge(conn, group, site, EXTERNAL_SYMBOL_ID.as_i64())?;
            orphaned += 1;
        }
    }
    Ok(orphaned)
}

fn existing_endpoint(conn: &Connection, id: SymbolId) -> Result<i64> {
    if id.is_external() {
        return Ok(EXTERNAL_SYMBOL_ID.as_i64());
    }
    let found: Option<i64> = conn
        .query_row("SELECT id FROM symbols WHERE id = ?1", [id.as_i64()], |row| {
            row.get(0)
        })
        .optional()?;
    found.ok_or_else(|| Error::UnresolvedEndpoint(format!("symbol {id} does not exist")))
}

fn local_endpoint(ids: &[SymbolId], index: usize) -> Result<i64> {
    ids.get(index).map(|id| id.as_i64()).ok_or_else(|| {
        Error::UnresolvedEndpoint(format!(
            "symbol index {index} outside batch of {} symbols",
            ids.len()
        ))
    })
}

/// Replace everything `file_id` owns, inside an open transaction.
fn replace_in(
    conn: &Connection,
    file_id: FileId,
    path: &str,
    contents: &FileContents,
) -> Result<ReplaceOutcome> {
    let indexed_at = Store::now_ns()?;
    let incoming = capture_incoming(conn, file_id)?;

    // Cascades to the file's outgoing relations and to the captured incoming ones.
    conn.execute("DELETE FROM symbols WHERE file_id = ?1", [file_id.as_i64()])?;

    let mut insert_symbol = conn.prepare_cached(
        "INSERT INTO symbols (file_id, name, kind, line_start, line_end, signature, visibility)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    let mut symbol_ids = Vec::with_capacity(contents.symbols.len());
    for sym in &contents.symbols {
        insert_symbol.execute(params![
            file_id.as_i64(),
            sym.name,
            sym.kind.as_str(),
            sym.line_start,
            sym.line_end,
            sym.signature,
            sym.visibility.as_str(),
        ])?;
        symbol_ids.push(SymbolId::from(conn.last_insert_rowid()));
    }

    let mut upsert = conn.prepare_cached(UPSERT_RELATION)?;
    for rel in &contents.relations {
        let source = local_endpoint(&symbol_ids, rel.source)?;
        let target = match rel.target {
            SymbolRef::Local(index) => local_endpoint(&symbol_ids, index)?,
            SymbolRef::Existing(id) => existing_endpoint(conn, id)?,
            SymbolRef::Pending | SymbolRef::External => EXTERNAL_SYMBOL_ID.as_i64(),
        };
        upsert.execute(params![
            source,
            target,
            rel.kind.as_str(),
            rel.target_name,
            rel.target_hint.as_deref().unwrap_or(""),
            rel.target.is_by_name(),
            file_id.as_i64(),
            rel.line,
            1,
        ])?;
    }

    // Non-private definitions other files can bind to by name. Every symbol with
    // the name is a target, as in eager resolution.
    let mut visible: BTreeMap<&str, Vec<i64>> = BTreeMap::new();
    for (sym, id) in contents.symbols.iter().zip(&symbol_ids) {
        if sym.visibility != Visibility::Private {
            visible.entry(sym.name.as_str()).or_default().push(id.as_i64());
        }
    }

    let captured: BTreeSet<NameGroup> = incoming.iter().map(|(g, _)| g.clone()).collect();
    let mut groups: BTreeMap<NameGroup, GroupSite> = incoming.iter().cloned().collect();
    for name in visible.keys() {
        for (group, site) in groups_naming(conn, name, path, file_id)? {
            groups.entry(group).or_insert(site);
        }
    }

    let mut drop_placeholder = conn.prepare_cached(
        "DELETE FROM relations
         WHERE source_id = ?1 AND relation_type = ?2 AND target_name = ?3
           AND target_hint = ?4 AND by_name = 1 AND target_id = 0",
    )?;
    let mut repointed = 0;
    let mut bound = 0;
    let mut lost = Vec::new();
    for (group, site) in groups {
        let hint_matches = group.target_hint.is_empty() || group.target_hint == path;
        let targets = visible
            .get(group.target_name.as_str())
            .filter(|_| hint_matches);
        let Some(targets) = targets else {
            lost.push((group, site));
            continue;
        };
        for &target in targets {
            insert_group_edge(conn, &group, &site, target)?;
        }
        drop_placeholder.execute(params![
            group.source_id,
            group.relation_type,
            group.target_name,
            group.target_hint
        ])?;
        if captured.contains(&group) {
            repointed += 1;
        } else {
            bound += 1;
        }
    }
    let orphaned = requeue_orphans(conn, &lost)?;

    replace_file_relations(conn, file_id, path, &contents.includes)?;

    conn.execute(
        "UPDATE files SET content_hash = ?2, indexed_at = ?3 WHERE id = ?1",
        params![
            file_id.as_i64(),
            contents.content_hash.map(hash_to_sql),
            indexed_at
        ],
    )?;

    let relations_written: usize = conn.query_row(
        "SELECT COUNT(*) FROM relations r JOIN symbols s ON s.id = r.source_id WHERE s.file_id = ?1",
        [file_id.as_i64()],
        |row| row.get(0),
    )?;

    Ok(ReplaceOutcome {
        file_id,
        symbol_ids,
        relations_written,
        repointed,
        orphaned,
        bound,
    })
}

impl Store {
    /// Atomically replace all symbols and relations owned by `file_id`.
    ///
    /// Either every new symbol, relation and include edge is stored together
    /// with the new content hash, or nothing changes. Fails with
    /// [`Error::UnresolvedEndpoint`] if any relation endpoint is neither in the
    /// batch nor an existing symbol of another file.
    pub fn replace_file_contents(
        &self,
        file_id: FileId,
        contents: &FileContents,
    ) -> Result<ReplaceOutcome> {
        let mut conn = self.writer()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let path: String = tx
            .query_row(
                "SELECT path FROM files WHERE id = ?1 AND id != 0",
                [file_id.as_i64()],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("file id {file_id}")))?;

        let outcome = replace_in(&tx, file_id, &path, contents)?;
        tx.commit()?;
        drop(conn);

        let version = self.bump_version();
        tracing::debug!(
            path = %path,
            symbols = outcome.symbol_ids.len(),
            relations = outcome.relations_written,
            repointed = outcome.repointed,
            orphaned = outcome.orphaned,
            bound = outcome.bound,
            version,
            "Replaced file contents"
        );
        Ok(outcome)
    }

    /// Create or update a file and replace its contents in one transaction.
    ///
    /// The ingestion path: a file that fails here is never left half-created.
    pub fn write_file(
        &self,
        path: &str,
        meta: &FileMeta,
        contents: &FileContents,
    ) -> Result<ReplaceOutcome> {
        let mut conn = self.writer()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let (file_id, created) = upsert_file_in(&tx, path, meta)?;
        let outcome = replace_in(&tx, file_id, path, contents)?;
        tx.commit()?;
        drop(conn);

        let version = self.bump_version();
        tracing::debug!(
            path,
            created,
            symbols = outcome.symbol_ids.len(),
            relations = outcome.relations_written,
            repointed = outcome.repointed,
            orphaned = outcome.orphaned,
            bound = outcome.bound,
            version,
            "Wrote file"
        );
        Ok(outcome)
    }
}

fn row_to_neighbor(row: &rusqlite::Row) -> rusqlite::Result<Neighbor> {
    Ok(Neighbor {
        symbol: row_to_symbol_at(row, 0)?,
        file: row_to_indexed_file_at(row, SYMBOLS_WIDTH)?,
        line: row.get(SYMBOLS_WIDTH + FILES_WIDTH)?,
    })
}

impl Snapshot<'_> {
    /// Symbols with a relation of one of `kinds` into `target`.
    ///
    /// One entry per caller symbol, ordered by name, path and id so
    /// traversals are deterministic.
    pub fn callers_of(&self, target: SymbolId, kinds: &[RelationKind]) -> Result<Vec<Neighbor>> {
        let mut stmt = self.conn().prepare_cached(&format!(
            "SELECT {SYMBOLS_COLUMNS}, {FILES_COLUMNS}, MIN(r.location_line)
             FROM relations r
             JOIN symbols s ON s.id = r.source_id
             JOIN files f ON f.id = s.file_id
             WHERE r.target_id = ?1 AND r.relation_type IN ({}) AND s.id != 0
             GROUP BY s.id
             ORDER BY s.name, f.path, s.id",
            relation_kind_list(kinds)
        ))?;

        let rows = stmt
            .query_map([target.as_i64()], row_to_neighbor)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Symbols that `source` has a relation of one of `kinds` into.
    ///
    /// The placeholder is never returned.
    pub fn callees_of(&self, source: SymbolId, kinds: &[RelationKind]) -> Result<Vec<Neighbor>> {
        let mut stmt = self.conn().prepare_cached(&format!(
            "SELECT {SYMBOLS_COLUMNS}, {FILES_COLUMNS}, MIN(r.location_line)
             FROM relations r
             JOIN symbols s ON s.id = r.target_id
             JOIN files f ON f.id = s.file_id
             WHERE r.source_id = ?1 AND r.relation_type IN ({}) AND s.id != 0
             GROUP BY s.id
             ORDER BY s.name, f.path, s.id",
            relation_kind_list(kinds)
        ))?;

        let rows = stmt
            .query_map([source.as_i64()], row_to_neighbor)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Files other than `file_id` owning a symbol with a relation of one of
    /// `kinds` into a symbol of `file_id`, with the first observed line.
    pub fn dependent_files(
        &self,
        file_id: FileId,
        kinds: &[RelationKind],
    ) -> Result<Vec<(IndexedFile, Option<u32>)>> {
        let mut stmt = self.conn().prepare_cached(&format!(
            "SELECT {FILES_COLUMNS}, MIN(r.location_line)
             FROM relations r
             JOIN symbols t ON t.id = r.target_id
             JOIN symbols s ON s.id = r.source_id
             JOIN files f ON f.id = s.file_id
             WHERE t.file_id = ?1 AND s.file_id != ?1 AND t.id != 0
               AND r.relation_type IN ({})
             GROUP BY f.id
             ORDER BY f.path",
            relation_kind_list(kinds)
        ))?;

        let rows = stmt
            .query_map([file_id.as_i64()], |row| {
                Ok((row_to_indexed_file_at(row, 0)?, row.get(FILES_WIDTH)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// All resolved edges of the given kinds, placeholder excluded.
    pub fn edges(&self, kinds: &[RelationKind]) -> Result<Vec<GraphEdge>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT source_id, target_id FROM relations
             WHERE relation_type IN ({}) AND source_id != 0 AND target_id != 0
             ORDER BY source_id, target_id",
            relation_kind_list(kinds)
        ))?;

        let rows = stmt
            .query_map([], |row| {
                Ok(GraphEdge {
                    source: SymbolId::from(row.get::<_, i64>(0)?),
                    target: SymbolId::from(row.get::<_, i64>(1)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Every relation whose source is `source`, placeholder targets included.
    pub fn relations_from(&self, source: SymbolId) -> Result<Vec<Relation>> {
        let mut stmt = self.conn().prepare_cached(
            "SELECT source_id, target_id, relation_type, target_name, target_hint,
                    location_file_id, location_line, count
             FROM relations WHERE source_id = ?1
             ORDER BY relation_type, target_name, target_hint, target_id",
        )?;

        let rows = stmt
            .query_map([source.as_i64()], |row| {
                Ok(Relation {
                    source_id: SymbolId::from(row.get::<_, i64>(0)?),
                    target_id: SymbolId::from(row.get::<_, i64>(1)?),
                    kind: parse_relation_kind(&row.get::<_, String>(2)?)?,
                    target_name: row.get(3)?,
                    target_hint: Some(row.get::<_, String>(4)?).filter(|h| !h.is_empty()),
                    location_file_id: FileId::from(row.get::<_, i64>(5)?),
                    location_line: row.get(6)?,
                    count: row.get(7)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
