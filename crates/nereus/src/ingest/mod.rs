//! The ingestion pipeline.
//!
//! For each file: read bytes, gate on the content hash, run the extractor,
//! resolve the records against the store, and replace the file's contents
//! in one transaction. An extractor failure leaves the file at its last
//! indexed state. A store failure is retried once before it is reported.
//!
//! Batches run the read/hash/extract stage on a bounded `rayon` pool and
//! funnel every write through a single [`BatchWriter`] thread.

mod batch_writer;
mod resolve;

pub use batch_writer::WriteStats;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use tracing::{debug, info, trace, warn};

use crate::change::{ChangeDetector, content_hash};
use crate::config::{Config, ModuleRule, PathMatcher};
use crate::db::{FileMeta, Store, normalize_path};
use crate::error::{Error, IngestError, Result};
use crate::extractor::{Extraction, ExtractorRegistry};
use batch_writer::{BatchWriter, WriteJob};
use resolve::resolve;

/// What ingesting one file did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Content hash unchanged, nothing was extracted or written
    pub skipped: bool,
    /// Symbols stored for the file
    pub symbols: usize,
    /// Relation rows stored for the file
    pub relations: usize,
    /// Relations bound to the placeholder for lack of a target
    pub unresolved: usize,
    /// Relations dropped because their source is not a symbol of the file
    pub dropped: usize,
    /// Repeated symbols ignored
    pub duplicate_symbols: usize,
    /// Incoming edges from other files moved onto the new symbols
    pub repointed: usize,
    /// Incoming edges whose target disappeared
    pub orphaned: usize,
    /// Pending edges from other files bound to the new symbols
    pub bound: usize,
    /// The first commit attempt failed and the retry succeeded
    pub retried: bool,
}

impl IngestStats {
    fn unchanged() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Per-file result of a batch.
#[derive(Debug, Clone)]
pub enum FileStatus {
    /// Extracted and committed
    Indexed(IngestStats),
    /// Content hash unchanged
    Unchanged,
    /// Left at its previous state
    Failed(IngestError),
}

/// One file's outcome within a batch.
#[derive(Debug, Clone)]
pub struct FileOutcome {
    /// Workspace-relative path
    pub path: String,
    /// What happened
    pub status: FileStatus,
}

/// Result of [`Pipeline::ingest_batch`].
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Per-file outcomes, ordered by path
    pub outcomes: Vec<FileOutcome>,
    /// Aggregate write statistics
    pub stats: WriteStats,
    /// Wall-clock time for the whole batch
    pub duration: Duration,
}

impl BatchReport {
    /// Files extracted and committed.
    #[must_use]
    pub fn indexed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, FileStatus::Indexed(_)))
            .count()
    }

    /// Files skipped because their content was unchanged.
    #[must_use]
    pub fn unchanged(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, FileStatus::Unchanged))
            .count()
    }

    /// Per-file failures.
    pub fn errors(&self) -> impl Iterator<Item = &IngestError> {
        self.outcomes.iter().filter_map(|o| match &o.status {
            FileStatus::Failed(e) => Some(e),
            _ => None,
        })
    }
}

/// Result of [`Pipeline::sync`].
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// Ingestion of every discovered file
    pub batch: BatchReport,
    /// Indexed files deleted because they no longer exist
    pub removed: Vec<String>,
    /// Files with a configured extension but no extractor
    pub unsupported: usize,
    /// Directories that could not be read
    pub directories_skipped: Vec<(PathBuf, String)>,
}

/// Output of the read/hash/extract stage for one file.
pub(crate) struct PreparedFile {
    pub path: String,
    pub meta: FileMeta,
    pub hash: u64,
    pub extraction: Extraction,
}

enum Prepared {
    Unchanged,
    Ready(PreparedFile),
}

struct Settings {
    modules: ModuleRule,
    critical: PathMatcher,
    exclude: PathMatcher,
    extensions: Vec<String>,
    max_file_size: u64,
    parallel_workers: usize,
}

/// Ingests files into a [`Store`].
///
/// Cheap to clone; clones share the store and extractors.
#[derive(Clone)]
pub struct Pipeline {
    store: Arc<Store>,
    extractors: Arc<ExtractorRegistry>,
    workspace_root: Arc<PathBuf>,
    settings: Arc<Settings>,
}

impl Pipeline {
    /// Create a pipeline for the workspace at `workspace_root`.
    pub fn new(
        store: Arc<Store>,
        extractors: ExtractorRegistry,
        workspace_root: &Path,
        config: &Config,
    ) -> Result<Self> {
        let settings = Settings {
            modules: config.modules.clone(),
            critical: PathMatcher::new(&config.criticality.critical_paths)?,
            exclude: PathMatcher::new(&config.indexing.exclude)?,
            extensions: config
                .indexing
                .extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            max_file_size: config.indexing.max_file_size,
            parallel_workers: config.indexing.parallel_workers.max(1),
        };
        Ok(Self {
            store,
            extractors: Arc::new(extractors),
            workspace_root: Arc::new(workspace_root.to_path_buf()),
            settings: Arc::new(settings),
        })
    }

    /// The workspace root files are resolved against.
    #[must_use]
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Workspace-relative, `/`-separated form of `path`.
    ///
    /// Relative paths are taken as relative to the workspace root. Absolute
    /// paths must lie under it.
    pub fn relative_path(&self, path: &Path) -> Result<String> {
        let relative = if path.is_absolute() {
            path.strip_prefix(self.workspace_root.as_path())
                .map_err(|_| {
                    Error::Config(format!(
                        "{} is outside the workspace {}",
                        path.display(),
                        self.workspace_root.display()
                    ))
                })?
        } else {
            path
        };
        Ok(normalize_path(relative))
    }

    /// Metadata derived from a relative path.
    #[must_use]
    pub fn file_meta(&self, path: &str) -> FileMeta {
        FileMeta {
            module: self.settings.modules.module_for(path),
            is_critical: self.settings.critical.is_match(path),
        }
    }

    /// Ingest one file.
    ///
    /// Returns `skipped = true` without extracting if the content hash is
    /// unchanged. On an extractor error the stored state of the file is left
    /// untouched.
    pub fn ingest(&self, path: &Path) -> Result<IngestStats> {
        let path = self.relative_path(path)?;
        match self.prepare(&path)? {
            Prepared::Unchanged => {
                trace!(path = %path, "Unchanged, skipping");
                Ok(IngestStats::unchanged())
            }
            Prepared::Ready(file) => self.commit(&file),
        }
    }

    /// Read, hash, gate and extract. Touches the store only to read.
    fn prepare(&self, path: &str) -> Result<Prepared> {
        let abs = self.workspace_root.join(path);
        let size = std::fs::metadata(&abs)?.len();
        if size > self.settings.max_file_size {
            return Err(Error::Extraction {
                path: path.into(),
                message: format!(
                    "file is {size} bytes, limit is {}",
                    self.settings.max_file_size
                ),
            });
        }

        let bytes = std::fs::read(&abs)?;
        let hash = content_hash(&bytes);
        if !ChangeDetector::new(&self.store).needs_reindex_hashed(path, hash) {
            return Ok(Prepared::Unchanged);
        }

        let extractor = self
            .extractors
            .for_path(path)
            .ok_or_else(|| Error::Extraction {
                path: path.into(),
                message: "no extractor registered for this file type".to_string(),
            })?;
        let extraction = extractor.extract(path, &bytes).map_err(|e| {
            warn!(path, error = %e, "Extraction failed, keeping previous state");
            Error::Extraction {
                path: path.into(),
                message: e.to_string(),
            }
        })?;

        Ok(Prepared::Ready(PreparedFile {
            path: path.to_string(),
            meta: self.file_meta(path),
            hash,
            extraction,
        }))
    }

    /// Resolve and write a prepared file, retrying once.
    pub(crate) fn commit(&self, file: &PreparedFile) -> Result<IngestStats> {
        match self.try_commit(file) {
            Ok(stats) => Ok(stats),
            Err(first) => {
                warn!(path = %file.path, error = %first, "Store write failed, retrying once");
                match self.try_commit(file) {
                    Ok(stats) => Ok(IngestStats {
                        retried: true,
                        ..stats
                    }),
                    Err(second) => Err(Error::Transaction {
                        path: file.path.clone().into(),
                        source: Box::new(second),
                    }),
                }
            }
        }
    }

    fn try_commit(&self, file: &PreparedFile) -> Result<IngestStats> {
        // Resolve against the latest committed state; endpoints that vanish
        // before the write fail validation and get re-resolved on retry.
        let resolved = {
            let snap = self.store.snapshot()?;
            resolve(&snap, &file.path, file.hash, &file.extraction)?
        };
        let outcome = self
            .store
            .write_file(&file.path, &file.meta, &resolved.contents)?;

        Ok(IngestStats {
            skipped: false,
            symbols: outcome.symbol_ids.len(),
            relations: outcome.relations_written,
            unresolved: resolved.unresolved,
            dropped: resolved.dropped,
            duplicate_symbols: resolved.duplicates,
            repointed: outcome.repointed,
            orphaned: outcome.orphaned,
            bound: outcome.bound,
            retried: false,
        })
    }

    /// Ingest many files.
    ///
    /// Files are prepared in parallel on a pool of `parallel_workers` threads
    /// and committed one transaction per file by a single writer thread.
    /// Per-file failures are collected in the report and never abort the batch.
    pub fn ingest_batch<P: AsRef<Path> + Sync>(&self, paths: &[P]) -> Result<BatchReport> {
        let start = Instant::now();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.settings.parallel_workers)
            .thread_name(|i| format!("nereus-ingest-{i}"))
            .build()
            .map_err(|e| Error::Internal(format!("failed to build worker pool: {e}")))?;

        let writer = BatchWriter::new(self.clone());
        pool.install(|| {
            paths.par_iter().for_each(|path| {
                let path = path.as_ref();
                let job = match self.relative_path(path) {
                    Err(e) => WriteJob::Failed(IngestError::from_error(path.to_path_buf(), &e)),
                    Ok(rel) if !self.extractors.supports(&rel) => {
                        WriteJob::Failed(IngestError::unsupported_language(PathBuf::from(&rel)))
                    }
                    Ok(rel) => match self.prepare(&rel) {
                        Ok(Prepared::Ready(file)) => WriteJob::Ready(Box::new(file)),
                        Ok(Prepared::Unchanged) => WriteJob::Unchanged(rel),
                        Err(e) => WriteJob::Failed(IngestError::from_error(PathBuf::from(&rel), &e)),
                    },
                };
                writer.send(job);
            });
        });
        let mut result = writer.finish()?;
        result.outcomes.sort_by(|a, b| a.path.cmp(&b.path));

        let report = BatchReport {
            outcomes: result.outcomes,
            stats: result.stats,
            duration: start.elapsed(),
        };
        info!(
            indexed = report.indexed(),
            unchanged = report.unchanged(),
            failed = report.errors().count(),
            duration_ms = u64::try_from(report.duration.as_millis()).unwrap_or(u64::MAX),
            "Batch ingestion complete"
        );
        Ok(report)
    }

    /// Bring the store in line with the workspace tree.
    ///
    /// Ingests every discoverable file (unchanged ones are skipped by hash)
    /// and deletes indexed files that no longer exist on disk.
    pub fn sync(&self) -> Result<SyncReport> {
        let mut discovered = Vec::new();
        let mut directories_skipped = Vec::new();
        self.walk_dir(&self.workspace_root, &mut discovered, &mut directories_skipped);

        let (files, unsupported): (Vec<_>, Vec<_>) = discovered
            .into_iter()
            .partition(|p| self.extractors.supports(p));
        if !unsupported.is_empty() {
            debug!(count = unsupported.len(), "Files without an extractor, skipping");
        }

        let batch = self.ingest_batch(&files)?;

        let on_disk: HashSet<&str> = files.iter().map(String::as_str).collect();
        let indexed = self.store.snapshot()?.list_files()?;
        let mut removed = Vec::new();
        for file in indexed {
            let path = normalize_path(&file.path);
            if on_disk.contains(path.as_str()) || self.workspace_root.join(&path).is_file() {
                continue;
            }
            if self.store.delete_file(&path)? {
                debug!(path = %path, "Removed deleted file from graph");
                removed.push(path);
            }
        }

        info!(
            discovered = files.len(),
            removed = removed.len(),
            "Workspace sync complete"
        );
        Ok(SyncReport {
            batch,
            removed,
            unsupported: unsupported.len(),
            directories_skipped,
        })
    }

    /// Collect indexable files under `dir` as relative paths.
    ///
    /// Hidden entries and symlinks are skipped; exclude globs apply to both
    /// directories and files.
    fn walk_dir(
        &self,
        dir: &Path,
        files: &mut Vec<String>,
        directories_skipped: &mut Vec<(PathBuf, String)>,
    ) {
        let entries = match std::fs::read_dir(dir) {
            Ok(e) => e,
            Err(e) => {
                warn!(
                    directory = %dir.display(),
                    error = %e,
                    "Cannot read directory, skipping"
                );
                directories_skipped.push((dir.to_path_buf(), e.to_string()));
                return;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(
                        directory = %dir.display(),
                        error = %e,
                        "Failed to read directory entry, skipping"
                    );
                    continue;
                }
            };

            let path = entry.path();
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            let Ok(rel) = path.strip_prefix(self.workspace_root.as_path()) else {
                continue;
            };
            let rel = normalize_path(rel);
            if self.settings.exclude.is_match(&rel) {
                trace!(path = %rel, "Excluded");
                continue;
            }

            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                self.walk_dir(&path, files, directories_skipped);
            } else if file_type.is_file() && self.has_indexed_extension(&rel) {
                files.push(rel);
            }
        }
    }

    fn has_indexed_extension(&self, path: &str) -> bool {
        Path::new(path)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .is_some_and(|ext| self.settings.extensions.iter().any(|e| *e == ext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{ExtractionError, Extractor, RelationRecord, SymbolRecord, TargetRef};
    use crate::types::{RelationKind, SymbolKind, Visibility};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Each line `name` defines a function; `name -> other` adds a call.
    struct LineExtractor {
        calls: AtomicUsize,
    }

    impl Extractor for LineExtractor {
        fn extract(&self, _path: &str, content: &[u8]) -> std::result::Result<Extraction, ExtractionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let text = std::str::from_utf8(content)
                .map_err(|e| ExtractionError::Rejected(e.to_string()))?;
            let mut extraction = Extraction::default();
            for (line, raw) in (1u32..).zip(text.lines()) {
                if raw.starts_with('!') {
                    return Err(ExtractionError::Rejected("syntax error".into()));
                }
                let mut parts = raw.split("->").map(str::trim);
                let Some(name) = parts.next().filter(|n| !n.is_empty()) else {
                    continue;
                };
                if let Some(target) = parts.next() {
                    extraction.relations.push(RelationRecord {
                        source: name.to_string(),
                        source_line: None,
                        target: TargetRef::named(target),
                        relation_type: RelationKind::Calls,
                        line: Some(line),
                    });
                } else {
                    extraction.symbols.push(SymbolRecord {
                        name: name.to_string(),
                        kind: SymbolKind::Function,
                        line_start: line,
                        line_end: line,
                        signature: None,
                        visibility: Visibility::Public,
                    });
                }
            }
            Ok(extraction)
        }
    }

    fn setup(files: &[(&str, &str)]) -> (tempfile::TempDir, Pipeline, Arc<LineExtractor>) {
        let dir = tempfile::tempdir().unwrap();
        for (path, content) in files {
            let full = dir.path().join(path);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(full, content).unwrap();
        }
        let store = Arc::new(Store::open(&dir.path().join(".nereus/graph.db")).unwrap());
        let extractor = Arc::new(LineExtractor {
            calls: AtomicUsize::new(0),
        });
        let mut registry = ExtractorRegistry::new();
        registry.register("c", Arc::clone(&extractor) as Arc<dyn Extractor>);
        let pipeline = Pipeline::new(store, registry, dir.path(), &Config::default()).unwrap();
        (dir, pipeline, extractor)
    }

    #[test]
    fn second_ingest_of_unchanged_file_is_skipped() {
        let (_dir, pipeline, extractor) = setup(&[("main.c", "main\nmain -> init\n")]);

        let first = pipeline.ingest(Path::new("main.c")).unwrap();
        assert!(!first.skipped);
        assert_eq!(first.symbols, 1);
        assert_eq!(first.unresolved, 1);

        let version = pipeline.store.version();
        let second = pipeline.ingest(Path::new("main.c")).unwrap();
        assert!(second.skipped);
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
        assert_eq!(pipeline.store.version(), version);
    }

    #[test]
    fn extraction_failure_keeps_previous_state() {
        let (dir, pipeline, _) = setup(&[("a.c", "alpha\n")]);
        pipeline.ingest(Path::new("a.c")).unwrap();

        std::fs::write(dir.path().join("a.c"), "beta\n!broken\n").unwrap();
        let result = pipeline.ingest(Path::new("a.c"));
        assert!(matches!(result, Err(Error::Extraction { .. })));

        let snap = pipeline.store.snapshot().unwrap();
        let file = snap.get_file("a.c").unwrap().unwrap();
        let names: Vec<_> = snap
            .symbols_in_file(file.id)
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["alpha"]);
    }

    #[test]
    fn oversized_file_is_rejected() {
        let big = "x\n".repeat(600_000);
        let (_dir, pipeline, extractor) = setup(&[("big.c", big.as_str())]);

        let result = pipeline.ingest(Path::new("big.c"));
        assert!(matches!(result, Err(Error::Extraction { .. })));
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn absolute_path_outside_workspace_is_rejected() {
        let (_dir, pipeline, _) = setup(&[]);
        let outside = tempfile::tempdir().unwrap();

        let result = pipeline.ingest(&outside.path().join("x.c"));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn batch_reports_outside_path_as_invalid_path() {
        let (_dir, pipeline, extractor) = setup(&[("a.c", "alpha\n")]);
        let outside = tempfile::tempdir().unwrap();
        let stray = outside.path().join("x.c");
        std::fs::write(&stray, "alpha\n").unwrap();

        let report = pipeline
            .ingest_batch(&[PathBuf::from("a.c"), stray])
            .unwrap();

        assert_eq!(report.indexed(), 1);
        let kinds: Vec<_> = report.errors().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![crate::error::IngestErrorKind::InvalidPath]);
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn file_meta_uses_module_rule_and_critical_globs() {
        let (_dir, pipeline, _) = setup(&[]);

        let meta = pipeline.file_meta("src/auth/login.c");
        assert_eq!(meta.module, "auth");
        assert!(meta.is_critical);
        assert!(!pipeline.file_meta("src/lcd/init.c").is_critical);
    }

    #[test]
    fn batch_isolates_failures() {
        let (_dir, pipeline, _) = setup(&[
            ("a.c", "alpha\n"),
            ("b.c", "!broken\n"),
            ("c.c", "gamma\ngamma -> alpha\n"),
            ("notes.txt", "hello\n"),
        ]);

        let report = pipeline
            .ingest_batch(&["a.c", "b.c", "c.c", "notes.txt"])
            .unwrap();

        assert_eq!(report.indexed(), 2);
        let errors: Vec<_> = report.errors().collect();
        assert_eq!(errors.len(), 2);
        assert!(
            errors
                .iter()
                .any(|e| e.kind == crate::error::IngestErrorKind::UnsupportedLanguage)
        );
        assert_eq!(
            report.outcomes.iter().map(|o| o.path.as_str()).collect::<Vec<_>>(),
            vec!["a.c", "b.c", "c.c", "notes.txt"]
        );
    }

    #[test]
    fn sync_indexes_tree_and_removes_deleted_files() {
        let (dir, pipeline, _) = setup(&[
            ("src/lcd/lcd.c", "lcd_init\n"),
            ("src/system.c", "init\ninit -> lcd_init\n"),
            ("build/gen.c", "generated\n"),
            (".hidden/x.c", "hidden\n"),
            ("README.md", "docs\n"),
        ]);

        let report = pipeline.sync().unwrap();
        assert_eq!(report.batch.indexed(), 2);
        assert!(report.removed.is_empty());

        std::fs::remove_file(dir.path().join("src/lcd/lcd.c")).unwrap();
        let report = pipeline.sync().unwrap();
        assert_eq!(report.removed, vec!["src/lcd/lcd.c"]);
        assert_eq!(report.batch.unchanged(), 1);

        let snap = pipeline.store.snapshot().unwrap();
        assert!(snap.verify_integrity().unwrap().is_empty());
        assert_eq!(snap.list_files().unwrap().len(), 1);
    }
}
