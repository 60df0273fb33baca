//! Store statistics and referential integrity checks.

use std::collections::BTreeMap;

use super::Snapshot;
use super::helpers::parse_symbol_kind;
use crate::error::Result;
use crate::types::{DatabaseStats, IntegrityViolation};

impl Snapshot<'_> {
    /// Get statistics about the store contents. The placeholder is not counted.
    pub fn stats(&self) -> Result<DatabaseStats> {
        let conn = self.conn();
        let mut stats = DatabaseStats::default();

        let count = |sql: &str| -> Result<usize> {
            Ok(conn.query_row(sql, [], |row| row.get::<_, usize>(0))?)
        };
        stats.file_count = count("SELECT COUNT(*) FROM files WHERE id != 0")?;
        stats.critical_file_count =
            count("SELECT COUNT(*) FROM files WHERE id != 0 AND is_critical = 1")?;
        stats.relation_count = count("SELECT COUNT(*) FROM relations")?;
        stats.unresolved_relation_count =
            count("SELECT COUNT(*) FROM relations WHERE target_id = 0")?;
        stats.file_relation_count = count("SELECT COUNT(*) FROM file_relations")?;

        let mut stmt =
            conn.prepare("SELECT kind, COUNT(*) FROM symbols WHERE id != 0 GROUP BY kind")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, usize>(1)?))
        })?;

        let mut by_kind = BTreeMap::new();
        for row in rows {
            let (kind_str, n) = row?;
            if let Ok(kind) = parse_symbol_kind(&kind_str) {
                by_kind.insert(kind, n);
                stats.symbol_count += n;
            } else {
                tracing::warn!(
                    kind = %kind_str,
                    count = n,
                    "Unknown symbol kind in database, skipping from stats"
                );
                stats.skipped_unknown_kinds += n;
            }
        }
        stats.symbols_by_kind = by_kind.into_iter().collect();

        Ok(stats)
    }

    /// Check that every relation references existing symbols.
    ///
    /// Combines `PRAGMA foreign_key_check` with an explicit dangling-endpoint
    /// query and a placeholder check. An empty result means the graph is
    /// consistent.
    pub fn verify_integrity(&self) -> Result<Vec<IntegrityViolation>> {
        let conn = self.conn();
        let mut violations = Vec::new();

        let mut stmt = conn.prepare("PRAGMA foreign_key_check")?;
        let rows = stmt.query_map([], |row| {
            Ok(IntegrityViolation {
                table: row.get(0)?,
                rowid: row.get::<_, Option<i64>>(1)?.unwrap_or(-1),
                detail: format!("missing parent row in {}", row.get::<_, String>(2)?),
            })
        })?;
        for row in rows {
            violations.push(row?);
        }

        let mut stmt = conn.prepare(
            "SELECT r.id, s.id IS NULL, t.id IS NULL
             FROM relations r
             LEFT JOIN symbols s ON s.id = r.source_id
             LEFT JOIN symbols t ON t.id = r.target_id
             WHERE s.id IS NULL OR t.id IS NULL",
        )?;
        let rows = stmt.query_map([], |row| {
            let source_missing: bool = row.get(1)?;
            let target_missing: bool = row.get(2)?;
            let detail = match (source_missing, target_missing) {
                (true, true) => "source and target symbols missing",
                (true, false) => "source symbol missing",
                _ => "target symbol missing",
            };
            Ok(IntegrityViolation {
                table: "relations".to_string(),
                rowid: row.get(0)?,
                detail: detail.to_string(),
            })
        })?;
        for row in rows {
            violations.push(row?);
        }

        if !self.symbol_exists(crate::types::EXTERNAL_SYMBOL_ID)? {
            violations.push(IntegrityViolation {
                table: "symbols".to_string(),
                rowid: 0,
                detail: "external placeholder missing".to_string(),
            });
        }

        if !violations.is_empty() {
            tracing::warn!(count = violations.len(), "Integrity check found violations");
        }
        Ok(violations)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::test_support::*;
    use crate::db::SymbolRef;
    use crate::types::SymbolKind;

    #[test]
    fn stats_count_graph_without_placeholder() {
        let (_dir, store) = temp_store();
        write_file(
            &store,
            "a.c",
            &["main", "helper"],
            vec![
                call(0, SymbolRef::Local(1), "helper", 2),
                call(0, SymbolRef::External, "printf", 3),
            ],
        );

        let stats = store.snapshot().unwrap().stats().unwrap();
        assert_eq!(stats.file_count, 1);
        assert_eq!(stats.symbol_count, 2);
        assert_eq!(stats.relation_count, 2);
        assert_eq!(stats.unresolved_relation_count, 1);
        assert_eq!(stats.symbols_by_kind, vec![(SymbolKind::Function, 2)]);
    }

    #[test]
    fn fresh_store_is_consistent() {
        let (_dir, store) = temp_store();
        assert!(store.snapshot().unwrap().verify_integrity().unwrap().is_empty());
    }

    #[test]
    fn dangling_relation_is_reported() {
        let (_dir, store) = temp_store();
        let outcome = write_file(&store, "a.c", &["main"], vec![]);
        {
            let conn = store.writer().unwrap();
            conn.pragma_update(None, "foreign_keys", "OFF").unwrap();
            conn.execute(
                "INSERT INTO relations (source_id, target_id, relation_type, target_name, location_file_id)
                 VALUES (?1, 9999, 'calls', 'ghost', ?2)",
                [outcome.symbol_ids[0].as_i64(), outcome.file_id.as_i64()],
            )
            .unwrap();
            conn.pragma_update(None, "foreign_keys", "ON").unwrap();
        }

        let violations = store.snapshot().unwrap().verify_integrity().unwrap();
        assert!(
            violations
                .iter()
                .any(|v| v.table == "relations" && v.detail == "target symbol missing")
        );
    }
}
