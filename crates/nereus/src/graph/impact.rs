//! File-level impact and include trees.

use std::collections::HashMap;

use tracing::debug;

use super::traversal::{GraphQuery, number_levels};
use super::walk::walk;
use super::{
    CancelToken, FileImpact, ImpactEntry, ImpactReason, IncludeNode, IncludeTree, Provenance,
    Scope,
};
use crate::db::normalize_path;
use crate::error::{Error, Result};
use crate::types::{FileId, IndexedFile, RelationKind};

impl GraphQuery<'_> {
    /// Files affected by a change to `path`.
    ///
    /// Direct impact is every file that includes `path` or calls (or uses a
    /// type from) one of its symbols. With `transitive`, the same expansion
    /// repeats from each impacted file up to the configured impact depth.
    pub fn file_impact(
        &self,
        path: &str,
        transitive: bool,
        cancel: &CancelToken,
    ) -> Result<FileImpact> {
        let target = self.file(path)?;
        let max_depth = if transitive {
            self.limits.impact_depth.clamp(1, self.limits.max_depth.max(1))
        } else {
            1
        };

        let walked = walk(&[target.id], max_depth, cancel, |&id| {
            Ok(self
                .impacted_by(id)?
                .into_iter()
                .map(|(file, reason, line)| {
                    let entry = ImpactEntry {
                        scope: Scope::classify(&target, &file),
                        critical: file.is_critical,
                        file,
                        reason,
                        depth: 0,
                        provenance: Provenance::Direct,
                        line,
                    };
                    (entry.file.id, entry)
                })
                .collect())
        })?;

        let entries: Vec<ImpactEntry> = number_levels(walked.levels, |entry, depth| {
            entry.depth = depth;
            if depth > 1 {
                entry.provenance = Provenance::Transitive;
            }
        })
        .into_iter()
        .flatten()
        .collect();

        debug!(
            path,
            transitive,
            impacted = entries.len(),
            truncated = walked.truncated,
            "File impact computed"
        );
        Ok(FileImpact {
            target,
            entries,
            max_depth,
            depth_limited: walked.depth_limited,
            truncated: walked.truncated,
            store_version: self.snap.version(),
        })
    }

    /// Files depending on `file_id` in one hop, ordered by path.
    ///
    /// A file that both includes and calls into the target is reported once,
    /// as an include.
    fn impacted_by(&self, file_id: FileId) -> Result<Vec<(IndexedFile, ImpactReason, Option<u32>)>> {
        let mut by_file: HashMap<FileId, (IndexedFile, ImpactReason, Option<u32>)> = HashMap::new();
        for (file, _, line) in self.snap.includers_of(file_id)? {
            by_file.insert(file.id, (file, ImpactReason::Includes, line));
        }
        for (file, line) in self.snap.dependent_files(file_id, &RelationKind::IMPACT)? {
            by_file
                .entry(file.id)
                .or_insert((file, ImpactReason::Calls, line));
        }

        let mut impacted: Vec<_> = by_file.into_values().collect();
        impacted.sort_by(|a, b| a.0.path.cmp(&b.0.path));
        Ok(impacted)
    }

    /// Files reachable from `path` over include and import edges.
    ///
    /// Targets that do not resolve to an indexed file appear as leaves.
    pub fn include_tree(
        &self,
        path: &str,
        depth: Option<u32>,
        cancel: &CancelToken,
    ) -> Result<IncludeTree> {
        let root = self.file(path)?;
        let (depth, _) = self.effective_depth(depth);

        let walked = walk(&[normalize_path(&root.path)], depth, cancel, |from: &String| {
            let Some(file) = self.snap.get_file(from)? else {
                return Ok(Vec::new());
            };
            Ok(self
                .snap
                .includes_of(file.id)?
                .into_iter()
                .map(|edge| {
                    let key = edge
                        .target
                        .as_ref()
                        .map_or_else(|| edge.target_path.clone(), |f| normalize_path(&f.path));
                    let node = IncludeNode {
                        target_path: edge.target_path,
                        file: edge.target,
                        included_from: from.clone(),
                        kind: edge.kind,
                        line: edge.line,
                        depth: 0,
                    };
                    (key, node)
                })
                .collect())
        })?;

        Ok(IncludeTree {
            root,
            levels: number_levels(walked.levels, |node, depth| node.depth = depth),
            depth_limited: walked.depth_limited,
            truncated: walked.truncated,
            store_version: self.snap.version(),
        })
    }

    fn file(&self, path: &str) -> Result<IndexedFile> {
        self.snap
            .get_file(path)?
            .ok_or_else(|| Error::NotFound(format!("file: {path}")))
    }
}
