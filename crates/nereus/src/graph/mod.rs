//! Traversal engine.
//!
//! Depth-bounded, cycle-safe walks over one store snapshot:
//! - Symbol queries (who calls this, what does this call, who uses this type)
//! - File impact (which files are affected by a change to this one)
//! - Include trees, shortest call chains, and call cycles
//!
//! ## Design
//!
//! - Every walk is a level-synchronous BFS with a visited set,
//!   never recursion, so cycles terminate and depth is shortest-path depth.
//! - `SQLite` answers one-hop neighbour queries; whole-graph algorithms
//!   (strongly connected components) run on a `petgraph` graph map.
//! - Long walks poll a [`CancelToken`] and return completed levels with
//!   `truncated = true` instead of failing.

mod cancel;
mod impact;
mod scope;
mod traversal;
mod types;
mod walk;

pub use cancel::CancelToken;
pub use scope::Scope;
pub use traversal::{Direction, GraphQuery};
pub use types::{
    CallChain, CallCycle, FileImpact, ImpactEntry, ImpactReason, IncludeNode, IncludeTree,
    Provenance, RootTraversal, Traversal, TraversalHit,
};
