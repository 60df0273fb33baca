//! Shared helpers for integration tests.
//!
//! Files are written in a tiny line language understood by [`LineExtractor`]:
//!
//! ```text
//! fn init               function `init` on this line
//! private fn helper     non-exported function
//! type lcd_t            struct `lcd_t`
//! call init lcd_init    `init` calls `lcd_init`
//! call init x@lcd.c     call resolved only against `lcd.c`
//! ext init printf       call to an external library function
//! uses init lcd_t       `init` uses type `lcd_t`
//! include lcd.h         file-level include
//! !                     extractor error
//! ```

#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use nereus::{
    Extraction, ExtractionError, Extractor, IncludeRecord, Nereus, RelationKind, RelationRecord,
    SymbolKind, SymbolRecord, TargetRef, Visibility,
};
use tempfile::TempDir;

/// Fake extractor for the line language above.
#[derive(Default)]
pub struct LineExtractor {
    calls: AtomicUsize,
}

impl LineExtractor {
    /// How many times `extract` has run.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn symbol(name: &str, kind: SymbolKind, line: u32, visibility: Visibility) -> SymbolRecord {
    SymbolRecord {
        name: name.to_string(),
        kind,
        line_start: line,
        line_end: line,
        signature: None,
        visibility,
    }
}

fn target(spec: &str, external: bool) -> TargetRef {
    match spec.split_once('@') {
        Some((name, file)) => TargetRef {
            name: name.to_string(),
            file: Some(file.to_string()),
            external,
        },
        None => TargetRef {
            external,
            ..TargetRef::named(spec)
        },
    }
}

impl Extractor for LineExtractor {
    fn extract(&self, _path: &str, content: &[u8]) -> Result<Extraction, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text =
            std::str::from_utf8(content).map_err(|e| ExtractionError::Rejected(e.to_string()))?;

        let mut out = Extraction::default();
        for (line, raw) in (1u32..).zip(text.lines()) {
            let words: Vec<&str> = raw.split_whitespace().collect();
            let relation = |kind, external: bool| RelationRecord {
                source: words[1].to_string(),
                source_line: None,
                target: target(words[2], external),
                relation_type: kind,
                line: Some(line),
            };
            match words.as_slice() {
                [] => {}
                ["!", ..] => return Err(ExtractionError::Rejected(format!("syntax error on line {line}"))),
                ["fn", name] => out.symbols.push(symbol(name, SymbolKind::Function, line, Visibility::Public)),
                ["private", "fn", name] => {
                    out.symbols.push(symbol(name, SymbolKind::Function, line, Visibility::Private));
                }
                ["type", name] => out.symbols.push(symbol(name, SymbolKind::Struct, line, Visibility::Public)),
                ["call", _, _] => out.relations.push(relation(RelationKind::Calls, false)),
                ["ext", _, _] => out.relations.push(relation(RelationKind::Calls, true)),
                ["uses", _, _] => out.relations.push(relation(RelationKind::UsesType, false)),
                ["include", path] => out.includes.push(IncludeRecord {
                    path: (*path).to_string(),
                    kind: nereus::FileRelationKind::Includes,
                    line: Some(line),
                }),
                _ => return Err(ExtractionError::Rejected(format!("cannot parse line {line}: {raw}"))),
            }
        }
        Ok(out)
    }
}

/// Write `content` to `path` under `root`, creating directories.
pub fn write(root: &Path, path: &str, content: &str) {
    let full = root.join(path);
    if let Some(parent) = full.parent() {
        fs::create_dir_all(parent).expect("should create parent dirs");
    }
    fs::write(full, content).expect("should write file");
}

/// A temporary workspace holding `files`, opened with a [`LineExtractor`].
pub fn workspace(files: &[(&str, &str)]) -> (TempDir, Nereus, Arc<LineExtractor>) {
    let dir = tempfile::tempdir().expect("should create temp dir");
    for (path, content) in files {
        write(dir.path(), path, content);
    }
    let extractor = Arc::new(LineExtractor::default());
    let nereus = Nereus::with_extractor(dir.path(), Arc::clone(&extractor) as Arc<dyn Extractor>)
        .expect("should open graph");
    (dir, nereus, extractor)
}

/// `main.c` calls `init` in `system.c`, which calls `lcd_init` in `lcd.c`.
pub fn lcd_scenario() -> (TempDir, Nereus, Arc<LineExtractor>) {
    let (dir, nereus, extractor) = workspace(&[
        ("src/app/main.c", "fn main\ncall main init\n"),
        ("src/sys/system.c", "fn init\ncall init lcd_init\next init printf\n"),
        ("src/drivers/lcd.c", "fn lcd_init\n"),
    ]);
    nereus.sync().expect("sync should succeed");
    (dir, nereus, extractor)
}

/// Names and depths of every hit, in traversal order.
pub fn hit_names(traversal: &nereus::Traversal) -> Vec<(String, u32)> {
    traversal
        .hits()
        .map(|h| (h.symbol.name.clone(), h.depth))
        .collect()
}
