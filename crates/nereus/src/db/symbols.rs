//! Symbol reads and search.

use rusqlite::{OptionalExtension, params};
use tracing::trace;

use super::helpers::{
    FILES_COLUMNS, SYMBOLS_COLUMNS, SYMBOLS_WIDTH, row_to_indexed_file_at, row_to_symbol,
    row_to_symbol_at,
};
use super::Snapshot;
use crate::error::Result;
use crate::types::{FileId, IndexedFile, Symbol, SymbolId, SymbolKind};

/// Translate a `*`/`?` wildcard pattern to a `LIKE` pattern with `\` escapes.
///
/// A pattern without wildcards matches as a substring.
pub(crate) fn wildcard_to_like(pattern: &str) -> String {
    let mut like = String::with_capacity(pattern.len() + 2);
    let mut has_wildcard = false;
    for c in pattern.chars() {
        match c {
            '*' => {
                like.push('%');
                has_wildcard = true;
            }
            '?' => {
                like.push('_');
                has_wildcard = true;
            }
            '%' | '_' | '\\' => {
                like.push('\\');
                like.push(c);
            }
            other => like.push(other),
        }
    }
    if has_wildcard {
        like
    } else {
        format!("%{like}%")
    }
}

fn row_to_symbol_with_file(row: &rusqlite::Row) -> rusqlite::Result<(Symbol, IndexedFile)> {
    Ok((
        row_to_symbol_at(row, 0)?,
        row_to_indexed_file_at(row, SYMBOLS_WIDTH)?,
    ))
}

impl Snapshot<'_> {
    /// List the symbols of a file in source order.
    pub fn symbols_in_file(&self, file_id: FileId) -> Result<Vec<Symbol>> {
        let mut stmt = self.conn().prepare_cached(&format!(
            "SELECT {SYMBOLS_COLUMNS} FROM symbols s WHERE s.file_id = ?1 AND s.id != 0
             ORDER BY s.line_start, s.name"
        ))?;

        let symbols = stmt
            .query_map([file_id.as_i64()], row_to_symbol)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(symbols)
    }

    /// Get a symbol by its database ID.
    pub fn get_symbol(&self, id: SymbolId) -> Result<Option<Symbol>> {
        trace!(symbol_id = %id, "Looking up symbol by ID");
        self.conn()
            .query_row(
                &format!("SELECT {SYMBOLS_COLUMNS} FROM symbols s WHERE s.id = ?1"),
                [id.as_i64()],
                row_to_symbol,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Whether a symbol row exists. The placeholder always does.
    pub fn symbol_exists(&self, id: SymbolId) -> Result<bool> {
        let found: Option<i64> = self
            .conn()
            .query_row("SELECT 1 FROM symbols WHERE id = ?1", [id.as_i64()], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(found.is_some())
    }

    /// Symbols named exactly `name`, optionally restricted to one file path.
    ///
    /// Ordered by path then line. The placeholder never matches.
    pub fn find_symbols(
        &self,
        name: &str,
        file: Option<&str>,
    ) -> Result<Vec<(Symbol, IndexedFile)>> {
        let mut stmt = self.conn().prepare_cached(&format!(
            "SELECT {SYMBOLS_COLUMNS}, {FILES_COLUMNS}
             FROM symbols s JOIN files f ON f.id = s.file_id
             WHERE s.name = ?1 AND s.id != 0 AND (?2 IS NULL OR f.path = ?2)
             ORDER BY f.path, s.line_start, s.id"
        ))?;

        let rows = stmt
            .query_map(params![name, file], row_to_symbol_with_file)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Search symbols by wildcard pattern (`*` any run, `?` one character).
    ///
    /// Exact name matches sort first, then shorter names.
    pub fn search_symbols(
        &self,
        pattern: &str,
        kind: Option<SymbolKind>,
        limit: usize,
    ) -> Result<Vec<(Symbol, IndexedFile)>> {
        if pattern.is_empty() {
            return Ok(vec![]);
        }

        let like = wildcard_to_like(pattern);
        // usize limit fits in i64 on all supported platforms
        #[allow(clippy::cast_possible_wrap)]
        let limit_i64 = limit as i64;

        let mut stmt = self.conn().prepare_cached(&format!(
            "SELECT {SYMBOLS_COLUMNS}, {FILES_COLUMNS}
             FROM symbols s JOIN files f ON f.id = s.file_id
             WHERE s.name LIKE ?1 ESCAPE '\\' AND s.id != 0 AND (?2 IS NULL OR s.kind = ?2)
             ORDER BY CASE WHEN s.name = ?3 THEN 0 ELSE 1 END, length(s.name), s.name, f.path
             LIMIT ?4"
        ))?;

        let rows = stmt
            .query_map(
                params![like, kind.map(|k| k.as_str()), pattern, limit_i64],
                row_to_symbol_with_file,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Symbols owned by files flagged critical.
    pub fn critical_symbols(&self) -> Result<Vec<(Symbol, IndexedFile)>> {
        let mut stmt = self.conn().prepare_cached(&format!(
            "SELECT {SYMBOLS_COLUMNS}, {FILES_COLUMNS}
             FROM symbols s JOIN files f ON f.id = s.file_id
             WHERE f.is_critical = 1 AND s.id != 0
             ORDER BY f.path, s.line_start"
        ))?;

        let rows = stmt
            .query_map([], row_to_symbol_with_file)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
