//! Turning extractor records into store-ready contents.
//!
//! Relation targets are looked up in this order:
//!
//! 1. An explicit external marker binds to the placeholder.
//! 2. A file hint restricts candidates to that file.
//! 3. Symbols of the same file, by name.
//! 4. Public symbols of other files, by name.
//!
//! Several candidates produce one edge each; ambiguity is never settled by
//! picking one. No candidate at all binds to the placeholder and keeps the
//! name and hint, so a later ingestion defining it can claim the edge. The
//! store applies the same rule when definitions arrive later, so the graph
//! is the same whatever order files are indexed in.

use std::collections::{HashMap, HashSet};

use tracing::trace;

use crate::db::{FileContents, NewFileRelation, NewRelation, NewSymbol, Snapshot, SymbolRef};
use crate::error::Result;
use crate::extractor::{Extraction, RelationRecord, TargetRef};
use crate::types::{SymbolId, Visibility};

/// Resolved contents plus what could not be resolved.
#[derive(Debug, Default)]
pub(crate) struct Resolved {
    pub contents: FileContents,
    /// Relations bound to the placeholder because no symbol matched
    pub unresolved: usize,
    /// Relations dropped because their source is not a symbol of the file
    pub dropped: usize,
    /// Symbols dropped because their identity key repeated
    pub duplicates: usize,
}

struct Resolver<'a, 's> {
    snap: &'a Snapshot<'s>,
    path: &'a str,
    symbols: &'a [NewSymbol],
    local: HashMap<&'a str, Vec<usize>>,
    foreign: HashMap<(String, Option<String>), Vec<SymbolId>>,
}

impl Resolver<'_, '_> {
    fn source_index(&self, record: &RelationRecord) -> Option<usize> {
        let candidates = self.local.get(record.source.as_str())?;
        let Some(line) = record.source_line else {
            return candidates.first().copied();
        };
        candidates
            .iter()
            .copied()
            .find(|&i| self.symbols[i].line_start == line)
            .or_else(|| {
                candidates.iter().copied().find(|&i| {
                    self.symbols[i].line_start <= line && line <= self.symbols[i].line_end
                })
            })
            .or_else(|| candidates.first().copied())
    }

    fn foreign_candidates(&mut self, name: &str, file: Option<&str>) -> Result<Vec<SymbolId>> {
        let key = (name.to_string(), file.map(str::to_string));
        if let Some(ids) = self.foreign.get(&key) {
            return Ok(ids.clone());
        }

        let ids: Vec<SymbolId> = self
            .snap
            .find_symbols(name, file)?
            .into_iter()
            .filter(|(s, f)| {
                s.visibility != Visibility::Private && f.path.to_str() != Some(self.path)
            })
            .map(|(s, _)| s.id)
            .collect();

        self.foreign.insert(key, ids.clone());
        Ok(ids)
    }

    fn targets(&mut self, target: &TargetRef) -> Result<Vec<SymbolRef>> {
        if target.external {
            return Ok(vec![SymbolRef::External]);
        }

        if let Some(file) = target.file.as_deref()
            && file != self.path
        {
            let ids = self.foreign_candidates(&target.name, Some(file))?;
            return Ok(ids.into_iter().map(SymbolRef::Existing).collect());
        }

        if let Some(local) = self.local.get(target.name.as_str()) {
            return Ok(local.iter().map(|&i| SymbolRef::Local(i)).collect());
        }
        if target.file.is_some() {
            // Hinted at this very file but not defined here.
            return Ok(Vec::new());
        }

        let ids = self.foreign_candidates(&target.name, None)?;
        Ok(ids.into_iter().map(SymbolRef::Existing).collect())
    }
}

/// Resolve one file's extraction against the store as seen by `snap`.
///
/// The file's own previously stored symbols are never candidates: they are
/// about to be replaced.
pub(crate) fn resolve(
    snap: &Snapshot<'_>,
    path: &str,
    content_hash: u64,
    extraction: &Extraction,
) -> Result<Resolved> {
    let mut resolved = Resolved::default();

    let mut seen = HashSet::new();
    let mut symbols = Vec::with_capacity(extraction.symbols.len());
    for record in &extraction.symbols {
        if !seen.insert((record.name.as_str(), record.kind, record.line_start)) {
            trace!(path, name = %record.name, line = record.line_start, "Duplicate symbol, keeping first");
            resolved.duplicates += 1;
            continue;
        }
        symbols.push(NewSymbol {
            name: record.name.clone(),
            kind: record.kind,
            line_start: record.line_start,
            line_end: record.line_end.max(record.line_start),
            signature: record.signature.clone(),
            visibility: record.visibility,
        });
    }

    let mut local: HashMap<&str, Vec<usize>> = HashMap::new();
    for (index, sym) in symbols.iter().enumerate() {
        local.entry(sym.name.as_str()).or_default().push(index);
    }

    let mut relations = Vec::with_capacity(extraction.relations.len());
    {
        let mut resolver = Resolver {
            snap,
            path,
            symbols: &symbols,
            local,
            foreign: HashMap::new(),
        };

        for record in &extraction.relations {
            let Some(source) = resolver.source_index(record) else {
                trace!(path, source = %record.source, "Relation source is not a symbol of this file, dropping");
                resolved.dropped += 1;
                continue;
            };

            let mut targets = resolver.targets(&record.target)?;
            if targets.is_empty() {
                resolved.unresolved += 1;
                targets.push(SymbolRef::Pending);
            }
            for target in targets {
                relations.push(NewRelation {
                    source,
                    target,
                    kind: record.relation_type,
                    target_name: record.target.name.clone(),
                    target_hint: record
                        .target
                        .file
                        .clone()
                        .filter(|_| target.is_by_name()),
                    line: record.line,
                });
            }
        }
    }

    let includes = extraction
        .includes
        .iter()
        .map(|inc| NewFileRelation {
            target_path: inc.path.replace('\\', "/"),
            kind: inc.kind,
            line: inc.line,
        })
        .collect();

    resolved.contents = FileContents {
        content_hash: Some(content_hash),
        symbols,
        relations,
        includes,
    };
    Ok(resolved)
}
