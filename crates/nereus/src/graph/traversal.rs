//! Symbol-level traversals.
//!
//! A [`GraphQuery`] owns one [`Snapshot`] for its whole lifetime, so every
//! level of every traversal it runs sees the same committed graph even while
//! ingestion keeps writing.

use std::collections::{HashMap, HashSet};

use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use super::walk::walk;
use super::{CallChain, CallCycle, CancelToken, RootTraversal, Scope, Traversal, TraversalHit};
use crate::config::TraversalConfig;
use crate::db::{Neighbor, Snapshot, Store};
use crate::error::{Error, Result};
use crate::types::{IndexedFile, RelationKind, Symbol, SymbolId};

/// Which way edges are followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Towards symbols that reference the root
    Callers,
    /// Towards symbols the root references
    Callees,
}

/// Read-only queries over one snapshot of the graph.
pub struct GraphQuery<'s> {
    pub(super) snap: Snapshot<'s>,
    pub(super) limits: TraversalConfig,
}

impl<'s> GraphQuery<'s> {
    /// Take a snapshot of `store` to query.
    pub fn new(store: &'s Store, limits: TraversalConfig) -> Result<Self> {
        Ok(Self {
            snap: store.snapshot()?,
            limits,
        })
    }

    /// The snapshot every query reads from.
    #[must_use]
    pub fn snapshot(&self) -> &Snapshot<'s> {
        &self.snap
    }

    /// Depth to use for a request, and whether it had to be clamped.
    ///
    /// `None` means the configured default; 0 is raised to 1.
    #[must_use]
    pub fn effective_depth(&self, requested: Option<u32>) -> (u32, bool) {
        let requested = requested.unwrap_or(self.limits.default_depth).max(1);
        if requested > self.limits.max_depth {
            (self.limits.max_depth.max(1), true)
        } else {
            (requested, false)
        }
    }

    /// Symbols named `name`, restricted to `file_hint` when given.
    pub fn resolve_roots(
        &self,
        name: &str,
        file_hint: Option<&str>,
    ) -> Result<Vec<(Symbol, IndexedFile)>> {
        let roots = self.snap.find_symbols(name, file_hint)?;
        if roots.is_empty() {
            return Err(Error::NotFound(match file_hint {
                Some(file) => format!("symbol '{name}' in {file}"),
                None => format!("symbol '{name}'"),
            }));
        }
        Ok(roots)
    }

    /// Transitive callers of every symbol named `name`.
    pub fn callers(
        &self,
        name: &str,
        file_hint: Option<&str>,
        depth: Option<u32>,
        cancel: &CancelToken,
    ) -> Result<Traversal> {
        let roots = self.resolve_roots(name, file_hint)?;
        let (depth, capped) = self.effective_depth(depth);
        self.traverse(roots, Direction::Callers, &[RelationKind::Calls], depth, capped, cancel)
    }

    /// Transitive callees of every symbol named `name`.
    pub fn callees(
        &self,
        name: &str,
        file_hint: Option<&str>,
        depth: Option<u32>,
        cancel: &CancelToken,
    ) -> Result<Traversal> {
        let roots = self.resolve_roots(name, file_hint)?;
        let (depth, capped) = self.effective_depth(depth);
        self.traverse(roots, Direction::Callees, &[RelationKind::Calls], depth, capped, cancel)
    }

    /// Symbols using a type named `name` in a field, parameter, or return type.
    pub fn type_users(
        &self,
        name: &str,
        file_hint: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<Traversal> {
        let roots = self.resolve_roots(name, file_hint)?;
        self.traverse(roots, Direction::Callers, &RelationKind::TYPE_USE, 1, false, cancel)
    }

    /// Walk from each root separately over `kinds`.
    pub fn traverse(
        &self,
        roots: Vec<(Symbol, IndexedFile)>,
        direction: Direction,
        kinds: &[RelationKind],
        depth: u32,
        depth_capped: bool,
        cancel: &CancelToken,
    ) -> Result<Traversal> {
        let mut result = Traversal {
            roots: Vec::with_capacity(roots.len()),
            max_depth: depth,
            depth_limited: false,
            depth_capped,
            truncated: false,
            store_version: self.snap.version(),
        };

        for (root, file) in roots {
            let walked = walk(&[root.id], depth, cancel, |&id| {
                let neighbors = match direction {
                    Direction::Callers => self.snap.callers_of(id, kinds)?,
                    Direction::Callees => self.snap.callees_of(id, kinds)?,
                };
                Ok(neighbors
                    .into_iter()
                    .map(|n| (n.symbol.id, to_hit(&file, n)))
                    .collect())
            })?;

            let levels = number_levels(walked.levels, |hit, depth| hit.depth = depth);
            result.depth_limited |= walked.depth_limited;
            result.truncated |= walked.truncated;
            result.roots.push(RootTraversal {
                root,
                file,
                levels,
                depth_limited: walked.depth_limited,
                truncated: walked.truncated,
            });
        }

        debug!(
            ?direction,
            roots = result.roots.len(),
            hits = result.hits().count(),
            depth,
            truncated = result.truncated,
            "Traversal complete"
        );
        Ok(result)
    }

    /// Shortest call path from a symbol named `from` to one named `to`.
    ///
    /// Searches up to the configured maximum depth. `Ok(None)` when no path
    /// exists within it.
    pub fn call_chain(&self, from: &str, to: &str) -> Result<Option<CallChain>> {
        let sources = self.resolve_roots(from, None)?;
        let targets: HashSet<SymbolId> = self
            .resolve_roots(to, None)?
            .into_iter()
            .map(|(s, _)| s.id)
            .collect();

        if let Some(hit) = sources.iter().find(|(s, _)| targets.contains(&s.id)) {
            return Ok(CallChain::new(vec![hit.clone()]));
        }

        let start: Vec<SymbolId> = sources.iter().map(|(s, _)| s.id).collect();
        let walked = walk(&start, self.limits.max_depth, &CancelToken::new(), |&id| {
            Ok(self
                .snap
                .callees_of(id, &[RelationKind::Calls])?
                .into_iter()
                .map(|n| (n.symbol.id, (id, n.symbol, n.file)))
                .collect())
        })?;

        let mut parent: HashMap<SymbolId, (SymbolId, Symbol, IndexedFile)> = HashMap::new();
        let mut found = None;
        'levels: for level in walked.levels {
            for (from_id, symbol, file) in level {
                let id = symbol.id;
                parent.insert(id, (from_id, symbol, file));
                if targets.contains(&id) {
                    found = Some(id);
                    break 'levels;
                }
            }
        }
        let Some(mut current) = found else {
            return Ok(None);
        };

        let mut steps = Vec::new();
        while let Some((prev, symbol, file)) = parent.remove(&current) {
            steps.push((symbol, file));
            current = prev;
        }
        let origin = sources
            .into_iter()
            .find(|(s, _)| s.id == current)
            .ok_or_else(|| Error::Internal(format!("call chain lost its origin {current}")))?;
        steps.push(origin);
        steps.reverse();
        Ok(CallChain::new(steps))
    }

    /// Groups of symbols that call each other, directly or through others.
    ///
    /// Includes single symbols that call themselves.
    pub fn call_cycles(&self) -> Result<Vec<CallCycle>> {
        let edges = self.snap.edges(&[RelationKind::Calls])?;
        let graph: DiGraphMap<SymbolId, ()> =
            DiGraphMap::from_edges(edges.iter().map(|e| (e.source, e.target)));

        let mut cycles = Vec::new();
        for component in tarjan_scc(&graph) {
            let is_cycle = component.len() > 1
                || component
                    .first()
                    .is_some_and(|&id| graph.contains_edge(id, id));
            if !is_cycle {
                continue;
            }

            let mut members = Vec::with_capacity(component.len());
            for id in component {
                members.push(self.symbol_with_file(id)?);
            }
            members.sort_by(|(a, fa), (b, fb)| a.name.cmp(&b.name).then(fa.path.cmp(&fb.path)));
            cycles.push(CallCycle { members });
        }
        cycles.sort_by(|a, b| {
            let key = |c: &CallCycle| c.members.first().map(|(s, f)| (s.name.clone(), f.path.clone()));
            key(a).cmp(&key(b))
        });

        debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            cycles = cycles.len(),
            "Cycle detection complete"
        );
        Ok(cycles)
    }

    /// Symbols owned by files flagged critical.
    pub fn critical_symbols(&self) -> Result<Vec<(Symbol, IndexedFile)>> {
        self.snap.critical_symbols()
    }

    fn symbol_with_file(&self, id: SymbolId) -> Result<(Symbol, IndexedFile)> {
        let symbol = self
            .snap
            .get_symbol(id)?
            .ok_or_else(|| Error::NotFound(format!("symbol id: {id}")))?;
        let file = self
            .snap
            .get_file_by_id(symbol.file_id)?
            .ok_or_else(|| Error::NotFound(format!("file id: {}", symbol.file_id)))?;
        Ok((symbol, file))
    }
}

fn to_hit(root_file: &IndexedFile, neighbor: Neighbor) -> TraversalHit {
    TraversalHit {
        scope: Scope::classify(root_file, &neighbor.file),
        critical: neighbor.file.is_critical,
        symbol: neighbor.symbol,
        file: neighbor.file,
        depth: 0,
        line: neighbor.line,
    }
}

/// Stamp each payload with its 1-based level number.
pub(super) fn number_levels<N>(levels: Vec<Vec<N>>, mut set: impl FnMut(&mut N, u32)) -> Vec<Vec<N>> {
    (1u32..)
        .zip(levels)
        .map(|(depth, mut level)| {
            for node in &mut level {
                set(node, depth);
            }
            level
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SymbolRef;
    use crate::db::test_support::*;

    fn names(traversal: &Traversal) -> Vec<(String, u32)> {
        traversal
            .hits()
            .map(|h| (h.symbol.name.clone(), h.depth))
            .collect()
    }

    fn query(store: &Store) -> GraphQuery<'_> {
        GraphQuery::new(store, TraversalConfig::default()).unwrap()
    }

    /// `a.c`: a -> b -> c, all in one file.
    fn chain_store() -> (tempfile::TempDir, Store) {
        let (dir, store) = temp_store();
        write_file(
            &store,
            "a.c",
            &["a", "b", "c"],
            vec![call(0, SymbolRef::Local(1), "b", 1), call(1, SymbolRef::Local(2), "c", 11)],
        );
        (dir, store)
    }

    #[test]
    fn callers_respect_depth() {
        let (_dir, store) = chain_store();
        let q = query(&store);
        let cancel = CancelToken::new();

        let two = q.callers("c", None, Some(2), &cancel).unwrap();
        assert_eq!(names(&two), vec![("b".to_string(), 1), ("a".to_string(), 2)]);
        assert!(!two.depth_limited);

        let one = q.callers("c", None, Some(1), &cancel).unwrap();
        assert_eq!(names(&one), vec![("b".to_string(), 1)]);
        assert!(one.depth_limited);
    }

    #[test]
    fn callees_follow_edges_forward() {
        let (_dir, store) = chain_store();
        let q = query(&store);

        let result = q.callees("a", None, None, &CancelToken::new()).unwrap();
        assert_eq!(names(&result), vec![("b".to_string(), 1), ("c".to_string(), 2)]);
        assert!(result.hits().all(|h| h.scope == Scope::Local));
    }

    #[test]
    fn depth_is_clamped_and_zero_raised() {
        let (_dir, store) = chain_store();
        let q = query(&store);

        assert_eq!(q.effective_depth(None), (3, false));
        assert_eq!(q.effective_depth(Some(0)), (1, false));
        assert_eq!(q.effective_depth(Some(50)), (10, true));

        let result = q.callers("c", None, Some(50), &CancelToken::new()).unwrap();
        assert!(result.depth_capped);
        assert_eq!(result.max_depth, 10);
    }

    #[test]
    fn zero_callers_is_empty_not_error() {
        let (_dir, store) = chain_store();
        let result = query(&store)
            .callers("a", None, None, &CancelToken::new())
            .unwrap();
        assert!(result.is_empty());
        assert_eq!(result.roots.len(), 1);
    }

    #[test]
    fn unknown_symbol_is_not_found() {
        let (_dir, store) = chain_store();
        let result = query(&store).callers("missing", None, None, &CancelToken::new());
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn cancelled_query_is_truncated() {
        let (_dir, store) = chain_store();
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = query(&store).callers("c", None, None, &cancel).unwrap();
        assert!(result.truncated);
        assert!(result.is_empty());
    }

    #[test]
    fn call_chain_finds_shortest_path() {
        let (_dir, store) = chain_store();
        let q = query(&store);

        let chain = q.call_chain("a", "c").unwrap().unwrap();
        let path: Vec<_> = chain.steps().iter().map(|(s, _)| s.name.as_str()).collect();
        assert_eq!(path, vec!["a", "b", "c"]);
        assert_eq!(chain.hops(), 2);

        assert!(q.call_chain("c", "a").unwrap().is_none());
        assert_eq!(q.call_chain("b", "b").unwrap().unwrap().hops(), 0);
    }

    #[test]
    fn call_cycles_found_with_tarjan() {
        let (_dir, store) = temp_store();
        write_file(
            &store,
            "ring.c",
            &["a", "b", "c", "solo", "self_loop"],
            vec![
                call(0, SymbolRef::Local(1), "b", 1),
                call(1, SymbolRef::Local(0), "a", 11),
                call(2, SymbolRef::Local(3), "solo", 21),
                call(4, SymbolRef::Local(4), "self_loop", 41),
            ],
        );

        let cycles = query(&store).call_cycles().unwrap();
        let groups: Vec<Vec<&str>> = cycles
            .iter()
            .map(|c| c.members.iter().map(|(s, _)| s.name.as_str()).collect())
            .collect();
        assert_eq!(groups, vec![vec!["a", "b"], vec!["self_loop"]]);
    }
}
