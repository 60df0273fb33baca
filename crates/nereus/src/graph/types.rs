//! Result types of the traversal engine.

use serde::Serialize;

use super::Scope;
use crate::types::{FileRelationKind, IndexedFile, Symbol};

/// A symbol reached by a traversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraversalHit {
    /// The symbol reached
    pub symbol: Symbol,
    /// Its owning file
    pub file: IndexedFile,
    /// Hops from the root (1 = direct)
    pub depth: u32,
    /// Line of the relation that discovered this hit
    pub line: Option<u32>,
    /// Distance of the hit's file from the root's file
    pub scope: Scope,
    /// The hit's file is flagged critical
    pub critical: bool,
}

/// The traversal from one matched root symbol.
#[derive(Debug, Clone, Serialize)]
pub struct RootTraversal {
    /// The root symbol
    pub root: Symbol,
    /// The root's owning file
    pub file: IndexedFile,
    /// Hits grouped by depth; `levels[0]` is depth 1
    pub levels: Vec<Vec<TraversalHit>>,
    /// The depth cap cut off further hits
    pub depth_limited: bool,
    /// Cancelled before finishing
    pub truncated: bool,
}

impl RootTraversal {
    /// All hits in depth order.
    pub fn hits(&self) -> impl Iterator<Item = &TraversalHit> {
        self.levels.iter().flatten()
    }
}

/// Result of a symbol traversal over every root matching the query.
///
/// Ambiguous names produce one [`RootTraversal`] per match.
#[derive(Debug, Clone, Serialize)]
pub struct Traversal {
    /// One entry per matched root, ordered by path and line
    pub roots: Vec<RootTraversal>,
    /// Depth actually used
    pub max_depth: u32,
    /// Some root had hits beyond `max_depth`
    pub depth_limited: bool,
    /// The requested depth exceeded the configured ceiling and was clamped
    pub depth_capped: bool,
    /// Cancelled; completed levels are kept
    pub truncated: bool,
    /// Store version the snapshot was taken at
    pub store_version: u64,
}

impl Traversal {
    /// All hits of all roots.
    pub fn hits(&self) -> impl Iterator<Item = &TraversalHit> {
        self.roots.iter().flat_map(RootTraversal::hits)
    }

    /// Whether no root produced any hit.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hits().next().is_none()
    }

    /// Whether the query name matched more than one symbol.
    #[must_use]
    pub fn is_ambiguous(&self) -> bool {
        self.roots.len() > 1
    }
}

/// Why a file is impacted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactReason {
    /// Includes or imports the file
    Includes,
    /// Calls or uses a type from the file
    Calls,
}

impl ImpactReason {
    /// Lower-case label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Includes => "includes",
            Self::Calls => "calls",
        }
    }
}

/// Whether an impacted file depends on the target itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Depends on the target file
    Direct,
    /// Depends on an impacted file
    Transitive,
}

/// One impacted file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImpactEntry {
    /// The impacted file
    pub file: IndexedFile,
    /// How it depends on the file one level closer to the target
    pub reason: ImpactReason,
    /// Hops from the target file
    pub depth: u32,
    /// Direct or transitive
    pub provenance: Provenance,
    /// First line of the dependency, when known
    pub line: Option<u32>,
    /// Distance from the target file
    pub scope: Scope,
    /// The impacted file is flagged critical
    pub critical: bool,
}

/// Result of a file impact query.
#[derive(Debug, Clone, Serialize)]
pub struct FileImpact {
    /// The file being analyzed
    pub target: IndexedFile,
    /// Impacted files in depth order, by path within a depth
    pub entries: Vec<ImpactEntry>,
    /// Depth actually used
    pub max_depth: u32,
    /// Further impacted files exist beyond `max_depth`
    pub depth_limited: bool,
    /// Cancelled; completed levels are kept
    pub truncated: bool,
    /// Store version the snapshot was taken at
    pub store_version: u64,
}

impl FileImpact {
    /// Files depending on the target itself.
    pub fn direct(&self) -> impl Iterator<Item = &ImpactEntry> {
        self.entries
            .iter()
            .filter(|e| e.provenance == Provenance::Direct)
    }

    /// Files depending on the target through another impacted file.
    pub fn transitive(&self) -> impl Iterator<Item = &ImpactEntry> {
        self.entries
            .iter()
            .filter(|e| e.provenance == Provenance::Transitive)
    }
}

/// One edge of an include tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncludeNode {
    /// Path as written in the including file
    pub target_path: String,
    /// The indexed file it resolved to, if any
    pub file: Option<IndexedFile>,
    /// Path of the including file
    pub included_from: String,
    /// Includes or imports
    pub kind: FileRelationKind,
    /// Line of the directive
    pub line: Option<u32>,
    /// Hops from the root file
    pub depth: u32,
}

/// Files reachable from a root file over include/import edges.
#[derive(Debug, Clone, Serialize)]
pub struct IncludeTree {
    /// The root file
    pub root: IndexedFile,
    /// Edges grouped by depth
    pub levels: Vec<Vec<IncludeNode>>,
    /// Further includes exist beyond the depth used
    pub depth_limited: bool,
    /// Cancelled; completed levels are kept
    pub truncated: bool,
    /// Store version the snapshot was taken at
    pub store_version: u64,
}

/// A shortest call path between two symbols.
#[derive(Debug, Clone, Serialize)]
pub struct CallChain {
    /// Symbols from caller to callee, each with its file
    steps: Vec<(Symbol, IndexedFile)>,
}

impl CallChain {
    /// Build a chain; `None` if `steps` is empty.
    #[must_use]
    pub fn new(steps: Vec<(Symbol, IndexedFile)>) -> Option<Self> {
        if steps.is_empty() {
            return None;
        }
        Some(Self { steps })
    }

    /// The steps, first caller first.
    #[must_use]
    pub fn steps(&self) -> &[(Symbol, IndexedFile)] {
        &self.steps
    }

    /// Number of call edges in the chain.
    #[must_use]
    pub fn hops(&self) -> usize {
        self.steps.len() - 1
    }
}

/// A strongly connected group of symbols in the call graph.
#[derive(Debug, Clone, Serialize)]
pub struct CallCycle {
    /// Members ordered by name and path
    pub members: Vec<(Symbol, IndexedFile)>,
}
