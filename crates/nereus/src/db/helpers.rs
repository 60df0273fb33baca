//! Helper functions for database row conversion and parsing.
//!
//! Column lists are qualified with the table aliases used throughout the
//! query modules (`f` for files, `s` for symbols), so the same constant works
//! in single-table selects and in joins. Row converters take the column offset
//! where their block starts.

use std::path::PathBuf;

use crate::types::{
    FileId, FileRelationKind, IndexedFile, RelationKind, Symbol, SymbolId, SymbolKind, Visibility,
};

/// SQL column list for the files table (alias `f`).
///
/// Use with `row_to_indexed_file` for consistent column ordering.
pub(crate) const FILES_COLUMNS: &str =
    "f.id, f.path, f.module, f.is_critical, f.content_hash, f.indexed_at";

/// Number of columns in [`FILES_COLUMNS`].
pub(crate) const FILES_WIDTH: usize = 6;

/// SQL column list for the symbols table (alias `s`).
///
/// Use with `row_to_symbol` for consistent column ordering.
pub(crate) const SYMBOLS_COLUMNS: &str =
    "s.id, s.file_id, s.name, s.kind, s.line_start, s.line_end, s.signature, s.visibility";

/// Number of columns in [`SYMBOLS_COLUMNS`].
pub(crate) const SYMBOLS_WIDTH: usize = 8;

fn conversion_failure(column: usize, what: &str, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        format!("Unknown {what} '{value}' in database. Database may be corrupted or from a newer version.").into(),
    )
}

/// Parse a symbol kind string from the database.
///
/// Returns an error for unrecognized values, indicating possible database corruption.
pub(crate) fn parse_symbol_kind(s: &str) -> rusqlite::Result<SymbolKind> {
    SymbolKind::parse(s).ok_or_else(|| conversion_failure(0, "symbol kind", s))
}

/// Parse a visibility string from the database.
pub(crate) fn parse_visibility(s: &str) -> rusqlite::Result<Visibility> {
    Visibility::parse(s).ok_or_else(|| conversion_failure(0, "visibility", s))
}

/// Parse a relation type string from the database.
pub(crate) fn parse_relation_kind(s: &str) -> rusqlite::Result<RelationKind> {
    RelationKind::parse(s).ok_or_else(|| conversion_failure(0, "relation type", s))
}

/// Parse a file relation type string from the database.
pub(crate) fn parse_file_relation_kind(s: &str) -> rusqlite::Result<FileRelationKind> {
    FileRelationKind::parse(s).ok_or_else(|| conversion_failure(0, "file relation type", s))
}

/// Store a content hash in a signed `SQLite` integer, bit for bit.
#[allow(clippy::cast_possible_wrap)]
pub(crate) fn hash_to_sql(hash: u64) -> i64 {
    hash as i64
}

/// Inverse of [`hash_to_sql`].
#[allow(clippy::cast_sign_loss)]
pub(crate) fn hash_from_sql(value: i64) -> u64 {
    value as u64
}

/// Render relation kinds as a SQL `IN` list body.
///
/// The values come from [`RelationKind::as_str`], never from user input.
pub(crate) fn relation_kind_list(kinds: &[RelationKind]) -> String {
    kinds
        .iter()
        .map(|k| format!("'{}'", k.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Convert a row block starting at `offset` to an [`IndexedFile`].
///
/// Expected columns: see [`FILES_COLUMNS`].
pub(crate) fn row_to_indexed_file_at(
    row: &rusqlite::Row,
    offset: usize,
) -> rusqlite::Result<IndexedFile> {
    Ok(IndexedFile {
        id: FileId::from(row.get::<_, i64>(offset)?),
        path: PathBuf::from(row.get::<_, String>(offset + 1)?),
        module: row.get(offset + 2)?,
        is_critical: row.get(offset + 3)?,
        content_hash: row.get::<_, Option<i64>>(offset + 4)?.map(hash_from_sql),
        indexed_at: row.get(offset + 5)?,
    })
}

/// Convert a database row to an [`IndexedFile`].
pub(crate) fn row_to_indexed_file(row: &rusqlite::Row) -> rusqlite::Result<IndexedFile> {
    row_to_indexed_file_at(row, 0)
}

/// Convert a row block starting at `offset` to a [`Symbol`].
///
/// Expected columns: see [`SYMBOLS_COLUMNS`].
pub(crate) fn row_to_symbol_at(row: &rusqlite::Row, offset: usize) -> rusqlite::Result<Symbol> {
    Ok(Symbol {
        id: SymbolId::from(row.get::<_, i64>(offset)?),
        file_id: FileId::from(row.get::<_, i64>(offset + 1)?),
        name: row.get(offset + 2)?,
        kind: parse_symbol_kind(&row.get::<_, String>(offset + 3)?)?,
        line_start: row.get(offset + 4)?,
        line_end: row.get(offset + 5)?,
        signature: row.get(offset + 6)?,
        visibility: parse_visibility(&row.get::<_, String>(offset + 7)?)?,
    })
}

/// Convert a database row to a [`Symbol`].
pub(crate) fn row_to_symbol(row: &rusqlite::Row) -> rusqlite::Result<Symbol> {
    row_to_symbol_at(row, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_survives_signed_storage() {
        for hash in [0, 1, u64::MAX, 0x8000_0000_0000_0000] {
            assert_eq!(hash_from_sql(hash_to_sql(hash)), hash);
        }
    }

    #[test]
    fn unknown_kind_is_a_conversion_failure() {
        let err = parse_symbol_kind("lambda").unwrap_err();
        assert!(err.to_string().contains("lambda"));
    }

    #[test]
    fn relation_kind_list_quotes_each_kind() {
        let list = relation_kind_list(&RelationKind::IMPACT);
        assert_eq!(list, "'calls', 'uses_type'");
    }
}
