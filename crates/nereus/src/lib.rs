//! # Nereus: Incremental Code Knowledge Graph
//!
//! Nereus keeps a persistent graph of source files, the symbols they define,
//! and the relations between them (calls, includes, type uses) in `SQLite`.
//! Files are re-indexed incrementally by content hash, and the graph answers
//! impact questions with depth-bounded, cycle-safe traversals.
//!
//! ## Design Philosophy
//!
//! - **Extraction is external** - an [`Extractor`] turns file bytes into
//!   symbol and relation records; Nereus stores and connects them
//! - **Whole files or nothing** - each file's symbols and relations are
//!   replaced in one transaction, so readers never see a half-indexed file
//! - **Readers never wait** - queries run on a snapshot while ingestion writes
//! - **Bounded answers** - every traversal has a depth cap and reports when
//!   it was capped or cancelled instead of failing
//!
//! ## Quick Start
//!
//! ```no_run
//! use nereus::Nereus;
//! use std::path::Path;
//!
//! let nereus = Nereus::new(Path::new("/path/to/workspace"))?;
//!
//! // Index the workspace
//! let report = nereus.sync()?;
//! println!("Indexed {} files", report.batch.indexed());
//!
//! // Who calls lcd_init, up to two hops away?
//! let callers = nereus.get_callers("lcd_init", None, Some(2))?;
//! for hit in callers.hits() {
//!     println!("{} ({}) depth {}", hit.symbol.name, hit.file.path.display(), hit.depth);
//! }
//!
//! // Which files does a change to lcd.c affect?
//! let impact = nereus.get_file_impact(Path::new("src/lcd/lcd.c"), true)?;
//! println!("{} direct dependents", impact.direct().count());
//! # Ok::<(), nereus::Error>(())
//! ```

mod change;
mod config;
mod db;
mod error;
mod extractor;
mod graph;
mod ingest;
mod types;

pub use change::{ChangeDetector, content_hash};
pub use config::{
    CONFIG_DIR, CONFIG_FILE, Config, CriticalityConfig, DEPTH_CEILING, DatabaseConfig,
    ExtractorCommand, IndexingConfig, ModuleRule, PathMatcher, TraversalConfig,
};
pub use db::{
    FileContents, FileMeta, GraphEdge, Neighbor, NewFileRelation, NewRelation, NewSymbol,
    OutgoingFileRelation, ReplaceOutcome, Snapshot, Store, SymbolRef, normalize_path,
};
pub use error::{Error, IngestError, IngestErrorKind, Result};
pub use extractor::{
    CommandExtractor, Extraction, ExtractionError, Extractor, ExtractorRegistry, IncludeRecord,
    RelationRecord, SymbolRecord, TargetRef,
};
pub use graph::{
    CallChain, CallCycle, CancelToken, Direction, FileImpact, GraphQuery, ImpactEntry,
    ImpactReason, IncludeNode, IncludeTree, Provenance, RootTraversal, Scope, Traversal,
    TraversalHit,
};
pub use ingest::{
    BatchReport, FileOutcome, FileStatus, IngestStats, Pipeline, SyncReport, WriteStats,
};
pub use types::{
    DatabaseStats, EXTERNAL_FILE_ID, EXTERNAL_NAME, EXTERNAL_SYMBOL_ID, FileId, FileRelation,
    FileRelationKind, IndexedFile, IntegrityViolation, Relation, RelationKind, Symbol, SymbolId,
    SymbolKind, Visibility,
};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

/// Most rows [`Nereus::search_symbols`] returns.
pub const SEARCH_LIMIT: usize = 200;

/// Code knowledge graph for one workspace.
///
/// `Nereus` is the main entry point: it owns the [`Store`], the ingestion
/// [`Pipeline`], and the traversal limits from the workspace [`Config`].
/// All methods take `&self`; ingestion and queries may run concurrently
/// from different threads.
pub struct Nereus {
    workspace_root: PathBuf,
    config: Config,
    store: Arc<Store>,
    pipeline: Pipeline,
}

impl Nereus {
    /// Open the graph for a workspace using its `.nereus/config.yaml`.
    ///
    /// Missing configuration means defaults. Extractors come from the
    /// `extractors` section of the configuration.
    pub fn new(workspace_root: &Path) -> Result<Self> {
        let root = canonical_root(workspace_root)?;
        let config = Config::load(&root)?;
        let extractors = ExtractorRegistry::from_config(&config);
        Self::with_config(&root, config, extractors)
    }

    /// Open the graph with `extractor` handling every file.
    pub fn with_extractor(workspace_root: &Path, extractor: Arc<dyn Extractor>) -> Result<Self> {
        let root = canonical_root(workspace_root)?;
        let config = Config::load(&root)?;
        Self::with_config(&root, config, ExtractorRegistry::single(extractor))
    }

    /// Open the graph with an explicit configuration and extractor registry.
    pub fn with_config(
        workspace_root: &Path,
        config: Config,
        extractors: ExtractorRegistry,
    ) -> Result<Self> {
        config.validate()?;
        let workspace_root = canonical_root(workspace_root)?;
        let store = Arc::new(Store::open_with_timeout(
            &config.database_path(&workspace_root),
            Duration::from_millis(config.database.busy_timeout_ms),
        )?);
        let pipeline = Pipeline::new(Arc::clone(&store), extractors, &workspace_root, &config)?;

        info!(
            workspace = %workspace_root.display(),
            database = %store.path().display(),
            "Opened knowledge graph"
        );
        Ok(Self {
            workspace_root,
            config,
            store,
            pipeline,
        })
    }

    /// The canonical workspace root.
    #[must_use]
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// The configuration in effect.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// The ingestion pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    // === Ingestion ===

    /// Ingest one file. Unchanged content is skipped.
    pub fn ingest(&self, path: &Path) -> Result<IngestStats> {
        self.pipeline.ingest(path)
    }

    /// Ingest many files in parallel. Per-file failures are in the report.
    pub fn ingest_batch<P: AsRef<Path> + Sync>(&self, paths: &[P]) -> Result<BatchReport> {
        self.pipeline.ingest_batch(paths)
    }

    /// Index every discoverable file and drop files that no longer exist.
    pub fn sync(&self) -> Result<SyncReport> {
        self.pipeline.sync()
    }

    /// Remove a file and everything it owns. Returns whether it was indexed.
    pub fn remove_file(&self, path: &Path) -> Result<bool> {
        let path = self.pipeline.relative_path(path)?;
        self.store.delete_file(&path)
    }

    /// Clear the graph and index the workspace from scratch.
    pub fn rebuild(&self) -> Result<SyncReport> {
        self.store.clear()?;
        let report = self.sync()?;
        self.store.analyze()?;
        Ok(report)
    }

    // === Queries ===

    /// A query handle over one snapshot, for several consistent queries.
    pub fn query(&self) -> Result<GraphQuery<'_>> {
        GraphQuery::new(&self.store, self.config.traversal)
    }

    /// Transitive callers of the symbols named `name`.
    ///
    /// `max_depth` of `None` uses the configured default.
    pub fn get_callers(
        &self,
        name: &str,
        file_hint: Option<&Path>,
        max_depth: Option<u32>,
    ) -> Result<Traversal> {
        self.get_callers_with(name, file_hint, max_depth, &CancelToken::new())
    }

    /// [`Self::get_callers`] with a cancellation token.
    pub fn get_callers_with(
        &self,
        name: &str,
        file_hint: Option<&Path>,
        max_depth: Option<u32>,
        cancel: &CancelToken,
    ) -> Result<Traversal> {
        let hint = self.hint(file_hint)?;
        self.query()?
            .callers(name, hint.as_deref(), max_depth, cancel)
    }

    /// Transitive callees of the symbols named `name`.
    pub fn get_callees(
        &self,
        name: &str,
        file_hint: Option<&Path>,
        max_depth: Option<u32>,
    ) -> Result<Traversal> {
        self.get_callees_with(name, file_hint, max_depth, &CancelToken::new())
    }

    /// [`Self::get_callees`] with a cancellation token.
    pub fn get_callees_with(
        &self,
        name: &str,
        file_hint: Option<&Path>,
        max_depth: Option<u32>,
        cancel: &CancelToken,
    ) -> Result<Traversal> {
        let hint = self.hint(file_hint)?;
        self.query()?
            .callees(name, hint.as_deref(), max_depth, cancel)
    }

    /// Files affected by a change to `path`.
    pub fn get_file_impact(&self, path: &Path, transitive: bool) -> Result<FileImpact> {
        self.get_file_impact_with(path, transitive, &CancelToken::new())
    }

    /// [`Self::get_file_impact`] with a cancellation token.
    pub fn get_file_impact_with(
        &self,
        path: &Path,
        transitive: bool,
        cancel: &CancelToken,
    ) -> Result<FileImpact> {
        let path = self.pipeline.relative_path(path)?;
        self.query()?.file_impact(&path, transitive, cancel)
    }

    /// Symbols whose name matches `pattern` (`*` and `?` wildcards, else substring).
    pub fn search_symbols(
        &self,
        pattern: &str,
        kind: Option<SymbolKind>,
    ) -> Result<Vec<(Symbol, IndexedFile)>> {
        self.store
            .snapshot()?
            .search_symbols(pattern, kind, SEARCH_LIMIT)
    }

    /// Files reachable from `path` over include and import edges.
    pub fn include_tree(&self, path: &Path, max_depth: Option<u32>) -> Result<IncludeTree> {
        let path = self.pipeline.relative_path(path)?;
        self.query()?
            .include_tree(&path, max_depth, &CancelToken::new())
    }

    /// Symbols using the type named `name`.
    pub fn type_users(&self, name: &str, file_hint: Option<&Path>) -> Result<Traversal> {
        let hint = self.hint(file_hint)?;
        self.query()?
            .type_users(name, hint.as_deref(), &CancelToken::new())
    }

    /// Shortest call path from `from` to `to`, if any.
    pub fn call_chain(&self, from: &str, to: &str) -> Result<Option<CallChain>> {
        self.query()?.call_chain(from, to)
    }

    /// Symbols owned by critical files.
    pub fn critical_symbols(&self) -> Result<Vec<(Symbol, IndexedFile)>> {
        self.query()?.critical_symbols()
    }

    /// Call cycles in the graph.
    pub fn call_cycles(&self) -> Result<Vec<CallCycle>> {
        self.query()?.call_cycles()
    }

    // === Administration ===

    /// Store contents summary.
    pub fn stats(&self) -> Result<DatabaseStats> {
        self.store.snapshot()?.stats()
    }

    /// Monotonic counter bumped after every committed write.
    #[must_use]
    pub fn store_version(&self) -> u64 {
        self.store.version()
    }

    /// Referential integrity problems; empty when consistent.
    pub fn verify_integrity(&self) -> Result<Vec<IntegrityViolation>> {
        self.store.snapshot()?.verify_integrity()
    }

    fn hint(&self, file_hint: Option<&Path>) -> Result<Option<String>> {
        file_hint
            .map(|p| self.pipeline.relative_path(p))
            .transpose()
    }
}

fn canonical_root(workspace_root: &Path) -> Result<PathBuf> {
    workspace_root.canonicalize().map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("workspace root not found: {}", workspace_root.display()),
        ))
    })
}
