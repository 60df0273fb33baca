//! Database schema definition.
//!
//! Every table that hangs off `files` or `symbols` cascades on delete, so
//! removing a file can never leave a relation pointing at a missing symbol.
//! Row id 0 in `files` and `symbols` is the `<external>` placeholder that
//! unresolved relation targets are bound to.
//!
//! A relation with `by_name = 1` was resolved across files by its target name
//! (restricted to `target_hint` when that is not empty). Such an edge points
//! at every public symbol with that name, or at the placeholder while there is
//! none, and gains targets as new definitions are indexed.

/// Schema version stored in `meta`. Bump when the DDL changes incompatibly.
pub(crate) const SCHEMA_VERSION: i64 = 2;

/// `SQLite` schema for the Nereus graph database.
pub(crate) const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY,
    path TEXT NOT NULL UNIQUE,
    module TEXT NOT NULL DEFAULT '',
    is_critical INTEGER NOT NULL DEFAULT 0,
    content_hash INTEGER,
    indexed_at INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_files_module ON files(module);

CREATE TABLE IF NOT EXISTS symbols (
    id INTEGER PRIMARY KEY,
    file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    line_start INTEGER NOT NULL,
    line_end INTEGER NOT NULL,
    signature TEXT,
    visibility TEXT NOT NULL DEFAULT 'public',
    UNIQUE (file_id, name, kind, line_start)
);

CREATE INDEX IF NOT EXISTS idx_symbols_name ON symbols(name);
CREATE INDEX IF NOT EXISTS idx_symbols_file ON symbols(file_id);

CREATE TABLE IF NOT EXISTS relations (
    id INTEGER PRIMARY KEY,
    source_id INTEGER NOT NULL REFERENCES symbols(id) ON DELETE CASCADE,
    target_id INTEGER NOT NULL REFERENCES symbols(id) ON DELETE CASCADE,
    relation_type TEXT NOT NULL,
    target_name TEXT NOT NULL,
    target_hint TEXT NOT NULL DEFAULT '',
    by_name INTEGER NOT NULL DEFAULT 0,
    location_file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    location_line INTEGER,
    count INTEGER NOT NULL DEFAULT 1,
    UNIQUE (source_id, target_id, relation_type, target_name, target_hint, by_name)
);

CREATE INDEX IF NOT EXISTS idx_relations_target ON relations(target_id, relation_type);
CREATE INDEX IF NOT EXISTS idx_relations_source ON relations(source_id, relation_type);
CREATE INDEX IF NOT EXISTS idx_relations_location ON relations(location_file_id);
CREATE INDEX IF NOT EXISTS idx_relations_by_name ON relations(target_name) WHERE by_name = 1;

CREATE TABLE IF NOT EXISTS file_relations (
    id INTEGER PRIMARY KEY,
    source_file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    target_path TEXT NOT NULL,
    target_file_id INTEGER REFERENCES files(id) ON DELETE SET NULL,
    relation_type TEXT NOT NULL,
    line INTEGER,
    UNIQUE (source_file_id, target_path, relation_type)
);

CREATE INDEX IF NOT EXISTS idx_file_relations_target ON file_relations(target_file_id);
CREATE INDEX IF NOT EXISTS idx_file_relations_pending ON file_relations(target_path)
    WHERE target_file_id IS NULL;

INSERT OR IGNORE INTO files (id, path, module, is_critical, content_hash, indexed_at)
    VALUES (0, '<external>', '', 0, NULL, 0);
INSERT OR IGNORE INTO symbols (id, file_id, name, kind, line_start, line_end, signature, visibility)
    VALUES (0, 0, '<external>', 'external', 0, 0, NULL, 'public');
";
