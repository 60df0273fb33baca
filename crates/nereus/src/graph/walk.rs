//! Level-synchronous breadth-first walk.
//!
//! Every traversal in the crate goes through [`walk`]: the roots are marked
//! visited up front, each node keeps the depth at which it was first
//! discovered, and a node is never expanded twice. That makes cycles
//! terminate without any recursion.

use std::collections::HashSet;
use std::hash::Hash;

use super::CancelToken;
use crate::error::Result;

/// Levels discovered by [`walk`]; `levels[0]` holds depth 1.
#[derive(Debug, Clone)]
pub(crate) struct Walk<N> {
    pub levels: Vec<Vec<N>>,
    /// The last level still has undiscovered neighbours
    pub depth_limited: bool,
    /// Cancelled mid-level; the incomplete level was discarded
    pub truncated: bool,
}

/// Breadth-first expansion from `roots` up to `max_depth` levels.
///
/// `expand` returns the neighbours of a node as `(key, payload)` pairs in a
/// deterministic order. A neighbour whose key was already seen is skipped.
/// Cancellation is checked before each expansion.
pub(crate) fn walk<K, N, F>(
    roots: &[K],
    max_depth: u32,
    cancel: &CancelToken,
    mut expand: F,
) -> Result<Walk<N>>
where
    K: Clone + Eq + Hash,
    F: FnMut(&K) -> Result<Vec<(K, N)>>,
{
    let mut visited: HashSet<K> = roots.iter().cloned().collect();
    let mut frontier: Vec<K> = roots.to_vec();
    let mut result = Walk {
        levels: Vec::new(),
        depth_limited: false,
        truncated: false,
    };

    for _ in 0..max_depth {
        let mut next = Vec::new();
        let mut level = Vec::new();
        for node in &frontier {
            if cancel.is_cancelled() {
                result.truncated = true;
                return Ok(result);
            }
            for (key, payload) in expand(node)? {
                if visited.insert(key.clone()) {
                    next.push(key);
                    level.push(payload);
                }
            }
        }
        if level.is_empty() {
            return Ok(result);
        }
        result.levels.push(level);
        frontier = next;
    }

    // Expand the last frontier once more so callers know whether the cap cut anything off.
    for node in &frontier {
        if cancel.is_cancelled() {
            // Unknown counts as limited.
            result.depth_limited = true;
            break;
        }
        if expand(node)?.iter().any(|(key, _)| !visited.contains(key)) {
            result.depth_limited = true;
            break;
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn graph(edges: &[(u32, u32)]) -> HashMap<u32, Vec<u32>> {
        let mut adj: HashMap<u32, Vec<u32>> = HashMap::new();
        for &(from, to) in edges {
            adj.entry(from).or_default().push(to);
        }
        adj
    }

    fn run(adj: &HashMap<u32, Vec<u32>>, root: u32, depth: u32, cancel: &CancelToken) -> Walk<u32> {
        walk(&[root], depth, cancel, |n| {
            Ok(adj
                .get(n)
                .map(|v| v.iter().map(|&t| (t, t)).collect())
                .unwrap_or_default())
        })
        .unwrap()
    }

    #[test]
    fn depth_is_fixed_at_first_discovery() {
        // 1 reaches 3 directly and through 2.
        let adj = graph(&[(1, 2), (1, 3), (2, 3), (3, 4)]);
        let walk = run(&adj, 1, 5, &CancelToken::new());

        assert_eq!(walk.levels, vec![vec![2, 3], vec![4]]);
        assert!(!walk.depth_limited);
        assert!(!walk.truncated);
    }

    #[test]
    fn cycle_terminates_without_revisiting_root() {
        let adj = graph(&[(1, 2), (2, 1)]);
        let walk = run(&adj, 1, 10, &CancelToken::new());

        assert_eq!(walk.levels, vec![vec![2]]);
    }

    #[test]
    fn depth_cap_is_reported() {
        let adj = graph(&[(1, 2), (2, 3), (3, 4)]);

        let capped = run(&adj, 1, 2, &CancelToken::new());
        assert_eq!(capped.levels, vec![vec![2], vec![3]]);
        assert!(capped.depth_limited);

        let exact = run(&adj, 1, 3, &CancelToken::new());
        assert!(!exact.depth_limited);
    }

    #[test]
    fn cancellation_keeps_completed_levels() {
        let adj = graph(&[(1, 2), (2, 3), (3, 4)]);
        let cancel = CancelToken::new();
        let mut expansions = 0;

        let walk = walk(&[1u32], 5, &cancel, |n| {
            expansions += 1;
            if expansions == 2 {
                cancel.cancel();
            }
            Ok(adj
                .get(n)
                .map(|v| v.iter().map(|&t| (t, t)).collect())
                .unwrap_or_default())
        })
        .unwrap();

        assert_eq!(walk.levels, vec![vec![2], vec![3]]);
        assert!(walk.truncated);
    }

    #[test]
    fn empty_graph_yields_no_levels() {
        let walk = run(&HashMap::new(), 1, 3, &CancelToken::new());
        assert!(walk.levels.is_empty());
        assert!(!walk.depth_limited);
    }
}
