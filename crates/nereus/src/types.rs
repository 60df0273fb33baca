//! Domain types for the Nereus code knowledge graph.
//!
//! These types represent the core domain model:
//! - **Entities**: `IndexedFile`, `Symbol`, `Relation`, `FileRelation` (stored in database)
//! - **Results**: `DatabaseStats`, `IntegrityViolation` (store-level reports)
//!
//! ## Design Decisions
//!
//! | Decision | Choice | Rationale |
//! |----------|--------|-----------|
//! | Symbol identity | (file, name, kind, line_start) | Edits are delete-old + insert-new |
//! | Unresolved targets | Placeholder symbol id 0 | Relations always reference a real row |
//! | Content hash | xxh3-64 stored as `i64` | `SQLite` integers are signed |
//! | module | Stored on the file | Scope classification needs no path parsing at query time |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

// ============================================================================
// Strongly-typed ID wrappers
// ============================================================================

/// A strongly-typed symbol ID to prevent mixing with file IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolId(pub i64);

impl SymbolId {
    /// Extract the raw i64 value.
    #[must_use]
    pub fn as_i64(self) -> i64 {
        self.0
    }

    /// Whether this is the reserved placeholder for unresolved targets.
    #[must_use]
    pub fn is_external(self) -> bool {
        self == EXTERNAL_SYMBOL_ID
    }
}

impl From<i64> for SymbolId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A strongly-typed file ID to prevent mixing with symbol IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(pub i64);

impl FileId {
    /// Extract the raw i64 value.
    #[must_use]
    pub fn as_i64(self) -> i64 {
        self.0
    }
}

impl From<i64> for FileId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reserved file owning the external placeholder symbol.
pub const EXTERNAL_FILE_ID: FileId = FileId(0);

/// Reserved symbol that unresolvable relation targets are bound to.
pub const EXTERNAL_SYMBOL_ID: SymbolId = SymbolId(0);

/// Path and name used for the reserved placeholder rows.
pub const EXTERNAL_NAME: &str = "<external>";

// ============================================================================
// Enums
// ============================================================================

/// Symbol kinds reported by extractors.
///
/// Normalized across languages; an extractor maps its own vocabulary onto these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    /// Free function
    Function,
    /// Function associated with a type
    Method,
    /// Struct type
    Struct,
    /// Class type
    Class,
    /// Enum type
    Enum,
    /// Union type
    Union,
    /// Type alias or typedef
    Typedef,
    /// Interface or trait
    Interface,
    /// Preprocessor or language macro
    Macro,
    /// Variable (global or static)
    Variable,
    /// Constant value
    Constant,
    /// Field of a compound type
    Field,
    /// Module or namespace
    Module,
    /// The reserved placeholder for unresolved targets
    External,
}

impl SymbolKind {
    /// Convert to database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Struct => "struct",
            Self::Class => "class",
            Self::Enum => "enum",
            Self::Union => "union",
            Self::Typedef => "typedef",
            Self::Interface => "interface",
            Self::Macro => "macro",
            Self::Variable => "variable",
            Self::Constant => "constant",
            Self::Field => "field",
            Self::Module => "module",
            Self::External => "external",
        }
    }

    /// Parse the database/CLI string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let kind = match s {
            "function" => Self::Function,
            "method" => Self::Method,
            "struct" => Self::Struct,
            "class" => Self::Class,
            "enum" => Self::Enum,
            "union" => Self::Union,
            "typedef" => Self::Typedef,
            "interface" => Self::Interface,
            "macro" => Self::Macro,
            "variable" => Self::Variable,
            "constant" => Self::Constant,
            "field" => Self::Field,
            "module" => Self::Module,
            "external" => Self::External,
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Visibility levels, normalized across languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Visible everywhere (`extern` linkage in C)
    #[default]
    Public,
    /// Visible within the package or module
    Internal,
    /// Visible only within the defining file (`static` in C)
    Private,
}

impl Visibility {
    /// Convert to database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Internal => "internal",
            Self::Private => "private",
        }
    }

    /// Parse the database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "public" => Some(Self::Public),
            "internal" => Some(Self::Internal),
            "private" => Some(Self::Private),
            _ => None,
        }
    }
}

/// Typed, directed symbol-to-symbol relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// Function or method call
    Calls,
    /// Symbol-level include (e.g. a macro pulled in from a header)
    Includes,
    /// Symbol-level import
    Imports,
    /// Type annotation or usage
    UsesType,
    /// Function return type
    ReturnsType,
    /// Function parameter type
    HasParamType,
    /// Class inheritance
    Inherits,
    /// Interface implementation
    Implements,
    /// Variable read or write
    UsesVariable,
    /// Macro expansion
    UsesMacro,
    /// Constructor call
    Instantiates,
    /// Anything else
    References,
}

impl RelationKind {
    /// Relation kinds that count as a dependency for file impact.
    pub const IMPACT: [Self; 2] = [Self::Calls, Self::UsesType];

    /// Relation kinds that count as "uses this type".
    pub const TYPE_USE: [Self; 3] = [Self::UsesType, Self::ReturnsType, Self::HasParamType];

    /// Convert to database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Calls => "calls",
            Self::Includes => "includes",
            Self::Imports => "imports",
            Self::UsesType => "uses_type",
            Self::ReturnsType => "returns_type",
            Self::HasParamType => "has_param_type",
            Self::Inherits => "inherits",
            Self::Implements => "implements",
            Self::UsesVariable => "uses_variable",
            Self::UsesMacro => "uses_macro",
            Self::Instantiates => "instantiates",
            Self::References => "references",
        }
    }

    /// Parse the database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let kind = match s {
            "calls" => Self::Calls,
            "includes" => Self::Includes,
            "imports" => Self::Imports,
            "uses_type" => Self::UsesType,
            "returns_type" => Self::ReturnsType,
            "has_param_type" => Self::HasParamType,
            "inherits" => Self::Inherits,
            "implements" => Self::Implements,
            "uses_variable" => Self::UsesVariable,
            "uses_macro" => Self::UsesMacro,
            "instantiates" => Self::Instantiates,
            "references" => Self::References,
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse file-to-file edge kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileRelationKind {
    /// `#include` style textual inclusion
    #[default]
    Includes,
    /// Module import
    Imports,
}

impl FileRelationKind {
    /// Convert to database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Includes => "includes",
            Self::Imports => "imports",
        }
    }

    /// Parse the database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "includes" => Some(Self::Includes),
            "imports" => Some(Self::Imports),
            _ => None,
        }
    }
}

// ============================================================================
// Core Entities (stored in database)
// ============================================================================

/// A source file tracked by the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedFile {
    /// Database ID
    pub id: FileId,
    /// Path relative to the workspace root, `/`-separated
    pub path: PathBuf,
    /// Module derived from the path
    pub module: String,
    /// Flagged high-impact by configuration
    pub is_critical: bool,
    /// Hash of the bytes last indexed (`None` until contents are written)
    pub content_hash: Option<u64>,
    /// Unix timestamp (nanoseconds) of the last successful ingestion
    pub indexed_at: i64,
}

/// A named code entity owned by exactly one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    /// Database ID
    pub id: SymbolId,
    /// Owning file
    pub file_id: FileId,
    /// Symbol name as written in source
    pub name: String,
    /// What kind of entity this is
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

/// A directed edge between two symbols.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    /// Source symbol
    pub source_id: SymbolId,
    /// Target symbol (the placeholder when unresolved)
    pub target_id: SymbolId,
    /// Relation kind
    pub kind: RelationKind,
    /// Target name as reported by the extractor
    pub target_name: String,
    /// File the target was restricted to, if the extractor named one
    pub target_hint: Option<String>,
    /// File where the edge was observed
    pub location_file_id: FileId,
    /// Line where the edge was first observed
    pub location_line: Option<u32>,
    /// Number of occurrences
    pub count: u32,
}

/// A coarse file-to-file edge (includes/imports).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRelation {
    /// Including file
    pub source_file_id: FileId,
    /// Path as written in the including file
    pub target_path: String,
    /// Resolved target file, `None` until the target is indexed
    pub target_file_id: Option<FileId>,
    /// Edge kind
    pub kind: FileRelationKind,
    /// Line of the include directive
    pub line: Option<u32>,
}

// ============================================================================
// Store-level reports
// ============================================================================

/// Statistics about the store contents.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DatabaseStats {
    /// Indexed files (placeholder excluded)
    pub file_count: usize,
    /// Symbols (placeholder excluded)
    pub symbol_count: usize,
    /// Symbol-level relations
    pub relation_count: usize,
    /// Relations bound to the placeholder
    pub unresolved_relation_count: usize,
    /// File-level relations
    pub file_relation_count: usize,
    /// Files flagged critical
    pub critical_file_count: usize,
    /// Symbol counts by kind
    pub symbols_by_kind: Vec<(SymbolKind, usize)>,
    /// Rows with unrecognized kinds (version skew or corruption)
    pub skipped_unknown_kinds: usize,
}

/// A referential-integrity problem found by `Store::verify_integrity`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityViolation {
    /// Table holding the offending row
    pub table: String,
    /// Row id of the offending row
    pub rowid: i64,
    /// What is wrong
    pub detail: String,
}

impl fmt::Display for IntegrityViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} row {}: {}", self.table, self.rowid, self.detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_kind_round_trips_through_db_string() {
        for kind in [
            SymbolKind::Function,
            SymbolKind::Typedef,
            SymbolKind::Macro,
            SymbolKind::External,
        ] {
            assert_eq!(SymbolKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(SymbolKind::parse("lambda"), None);
    }

    #[test]
    fn relation_kind_serde_matches_db_string() {
        let json = serde_json::to_string(&RelationKind::UsesType).unwrap();
        assert_eq!(json, "\"uses_type\"");
        let parsed: RelationKind = serde_json::from_str("\"has_param_type\"").unwrap();
        assert_eq!(parsed.as_str(), "has_param_type");
    }

    #[test]
    fn placeholder_symbol_is_external() {
        assert!(EXTERNAL_SYMBOL_ID.is_external());
        assert!(!SymbolId(7).is_external());
    }

    #[test]
    fn visibility_defaults_to_public() {
        assert_eq!(Visibility::default(), Visibility::Public);
        assert_eq!(Visibility::parse("private"), Some(Visibility::Private));
    }
}
