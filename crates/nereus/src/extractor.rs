//! The extractor boundary.
//!
//! Nereus does not parse source code itself. An [`Extractor`] turns one file's
//! bytes into symbol, relation and include records; the ingestion pipeline
//! resolves and stores them. Extractors must be deterministic: the same bytes
//! must always yield the same records.
//!
//! [`CommandExtractor`] runs an external program per file and reads the
//! records as JSON from its stdout:
//!
//! ```json
//! {
//!   "symbols": [{"name": "init", "kind": "function", "line_start": 3, "line_end": 9}],
//!   "relations": [{"source": "init", "target": "lcd_init", "relation_type": "calls", "line": 5}],
//!   "includes": [{"path": "lcd.h", "line": 1}]
//! }
//! ```

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;
use crate::types::{FileRelationKind, RelationKind, SymbolKind, Visibility};

/// Placeholder in extractor arguments replaced by the file path.
pub const PATH_PLACEHOLDER: &str = "{path}";

/// A symbol reported by an extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolRecord {
    /// Symbol name
    pub name: String,
    /// Symbol kind
    pub kind: SymbolKind,
    /// First line (1-indexed)
    pub line_start: u32,
    /// Last line; defaults to `line_start`
    #[serde(default)]
    pub line_end: u32,
    /// Free-text signature
    #[serde(default)]
    pub signature: Option<String>,
    /// Visibility; defaults to public
    #[serde(default)]
    pub visibility: Visibility,
}

/// The target side of a relation record.
///
/// Accepts either a bare name or an object with an optional defining file
/// hint and an explicit external marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TargetSpec")]
pub struct TargetRef {
    /// Target symbol name
    pub name: String,
    /// Workspace-relative path of the file defining the target, if known
    pub file: Option<String>,
    /// The extractor knows the target lives outside the workspace
    pub external: bool,
}

impl TargetRef {
    /// A target known only by name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file: None,
            external: false,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TargetSpec {
    Name(String),
    Full {
        name: String,
        #[serde(default)]
        file: Option<String>,
        #[serde(default)]
        external: bool,
    },
}

impl From<TargetSpec> for TargetRef {
    fn from(spec: TargetSpec) -> Self {
        match spec {
            TargetSpec::Name(name) => Self::named(name),
            TargetSpec::Full {
                name,
                file,
                external,
            } => Self {
                name,
                file,
                external,
            },
        }
    }
}

/// A relation reported by an extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationRecord {
    /// Name of the source symbol, which must be one of the file's symbols
    pub source: String,
    /// Start line of the source symbol, to pick between same-named symbols
    #[serde(default)]
    pub source_line: Option<u32>,
    /// Target of the relation
    pub target: TargetRef,
    /// Relation kind
    pub relation_type: RelationKind,
    /// Line where the relation occurs
    #[serde(default)]
    pub line: Option<u32>,
}

/// A file-level include/import reported by an extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludeRecord {
    /// Included path as written
    pub path: String,
    /// Edge kind; defaults to `includes`
    #[serde(default)]
    pub kind: FileRelationKind,
    /// Line of the directive
    #[serde(default)]
    pub line: Option<u32>,
}

/// Everything an extractor reports for one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extraction {
    /// Symbols defined in the file
    #[serde(default)]
    pub symbols: Vec<SymbolRecord>,
    /// Relations whose source is one of `symbols`
    #[serde(default)]
    pub relations: Vec<RelationRecord>,
    /// Include/import directives
    #[serde(default)]
    pub includes: Vec<IncludeRecord>,
}

impl Extraction {
    /// Parse extractor JSON output.
    pub fn from_json(bytes: &[u8]) -> Result<Self, ExtractionError> {
        let mut extraction: Self = serde_json::from_slice(bytes)?;
        for sym in &mut extraction.symbols {
            if sym.line_end < sym.line_start {
                sym.line_end = sym.line_start;
            }
        }
        Ok(extraction)
    }
}

/// Why an extractor could not produce records for a file.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The extractor program could not be started
    #[error("failed to run extractor '{command}': {source}")]
    Spawn {
        /// Program that failed to start
        command: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The extractor exited unsuccessfully
    #[error("extractor exited with {status}: {stderr}")]
    Failed {
        /// Exit status description
        status: String,
        /// Captured stderr, trimmed
        stderr: String,
    },

    /// The extractor ran past its deadline and was killed
    #[error("extractor timed out after {0:?}")]
    Timeout(Duration),

    /// The extractor output was not valid records
    #[error("malformed extractor output: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Communication with the extractor failed
    #[error("extractor I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The extractor rejected the file (syntax errors and the like)
    #[error("{0}")]
    Rejected(String),
}

/// Produces records for one file.
pub trait Extractor: Send + Sync {
    /// Extract records from `content`, the bytes of the file at `path`.
    fn extract(&self, path: &str, content: &[u8]) -> Result<Extraction, ExtractionError>;
}

/// How long pipe threads get to drain after a timed-out extractor is killed.
const PIPE_GRACE: Duration = Duration::from_millis(500);

/// Runs an external program per file.
#[derive(Debug, Clone)]
pub struct CommandExtractor {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandExtractor {
    /// Create an extractor running `command` with `args`.
    #[must_use]
    pub fn new(command: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            args,
            timeout,
        }
    }

    /// Joins `handle` once it finishes, or drops it at `until`.
    ///
    /// Returns `false` when the thread was left running, which happens when
    /// a grandchild of the killed extractor still holds the pipe open.
    fn settle<T>(handle: thread::JoinHandle<T>, until: Instant) -> bool {
        while !handle.is_finished() {
            if Instant::now() >= until {
                drop(handle);
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
        let _ = handle.join();
        true
    }

    fn spawn_reader<R: Read + Send + 'static>(mut source: R) -> thread::JoinHandle<Vec<u8>> {
        thread::spawn(move || {
            let mut buf = Vec::new();
            // A read error just truncates the output; the exit status decides.
            let _ = source.read_to_end(&mut buf);
            buf
        })
    }
}

impl Extractor for CommandExtractor {
    fn extract(&self, path: &str, content: &[u8]) -> Result<Extraction, ExtractionError> {
        let args: Vec<String> = self
            .args
            .iter()
            .map(|a| a.replace(PATH_PLACEHOLDER, path))
            .collect();

        let mut child = Command::new(&self.command)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ExtractionError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        // Feed stdin from its own thread so a chatty child cannot deadlock us.
        let stdin = child.stdin.take();
        let input = content.to_vec();
        let writer = thread::spawn(move || -> std::io::Result<()> {
            if let Some(mut stdin) = stdin {
                match stdin.write_all(&input) {
                    Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                    other => other?,
                }
            }
            Ok(())
        });
        let stdout = child.stdout.take().map(Self::spawn_reader);
        let stderr = child.stderr.take().map(Self::spawn_reader);

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                let until = Instant::now() + PIPE_GRACE;
                let mut detached = usize::from(!Self::settle(writer, until));
                for handle in [stdout, stderr].into_iter().flatten() {
                    detached += usize::from(!Self::settle(handle, until));
                }
                tracing::warn!(path, command = %self.command, detached, "Extractor timed out");
                return Err(ExtractionError::Timeout(self.timeout));
            }
            thread::sleep(Duration::from_millis(5));
        };

        let join = |handle: Option<thread::JoinHandle<Vec<u8>>>| {
            handle
                .map(|h| h.join().unwrap_or_default())
                .unwrap_or_default()
        };
        let out = join(stdout);
        let err = join(stderr);
        match writer.join() {
            Ok(result) => result?,
            Err(_) => {
                return Err(ExtractionError::Rejected(
                    "stdin writer thread panicked".to_string(),
                ));
            }
        }

        if !status.success() {
            return Err(ExtractionError::Failed {
                status: status.to_string(),
                stderr: String::from_utf8_lossy(&err).trim().to_string(),
            });
        }
        Extraction::from_json(&out)
    }
}

/// Maps file extensions to extractors.
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    by_extension: HashMap<String, Arc<dyn Extractor>>,
    fallback: Option<Arc<dyn Extractor>>,
}

impl std::fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut extensions: Vec<_> = self.by_extension.keys().collect();
        extensions.sort();
        f.debug_struct("ExtractorRegistry")
            .field("extensions", &extensions)
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

impl ExtractorRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build [`CommandExtractor`]s for every configured extension.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let timeout = Duration::from_secs(config.indexing.extractor_timeout_secs);
        let mut registry = Self::new();
        for (ext, cmd) in &config.extractors {
            registry.register(
                ext,
                Arc::new(CommandExtractor::new(&cmd.command, cmd.args.clone(), timeout)),
            );
        }
        registry
    }

    /// A registry that sends every file to `extractor`.
    #[must_use]
    pub fn single(extractor: Arc<dyn Extractor>) -> Self {
        Self {
            by_extension: HashMap::new(),
            fallback: Some(extractor),
        }
    }

    /// Register `extractor` for files ending in `.ext` (leading dot optional).
    pub fn register(&mut self, ext: &str, extractor: Arc<dyn Extractor>) {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        self.by_extension.insert(ext, extractor);
    }

    /// Extractor responsible for `path`, if any.
    #[must_use]
    pub fn for_path(&self, path: &str) -> Option<&Arc<dyn Extractor>> {
        let ext = Path::new(path)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase());
        ext.and_then(|e| self.by_extension.get(&e))
            .or(self.fallback.as_ref())
    }

    /// Whether any extractor handles `path`.
    #[must_use]
    pub fn supports(&self, path: &str) -> bool {
        self.for_path(path).is_some()
    }

    /// Whether no extractor is registered at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_extension.is_empty() && self.fallback.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    impl Extractor for Fixed {
        fn extract(&self, _path: &str, _content: &[u8]) -> Result<Extraction, ExtractionError> {
            Err(ExtractionError::Rejected(self.0.to_string()))
        }
    }

    #[test]
    fn parses_bare_and_full_targets() {
        let json = br#"{
            "symbols": [{"name": "init", "kind": "function", "line_start": 3}],
            "relations": [
                {"source": "init", "target": "lcd_init", "relation_type": "calls", "line": 5},
                {"source": "init", "target": {"name": "printf", "external": true}, "relation_type": "calls"}
            ],
            "includes": [{"path": "lcd.h"}]
        }"#;

        let extraction = Extraction::from_json(json).unwrap();
        assert_eq!(extraction.symbols[0].line_end, 3);
        assert_eq!(extraction.symbols[0].visibility, Visibility::Public);
        assert_eq!(extraction.relations[0].target, TargetRef::named("lcd_init"));
        assert!(extraction.relations[1].target.external);
        assert_eq!(extraction.includes[0].kind, FileRelationKind::Includes);
    }

    #[test]
    fn unknown_kind_is_malformed() {
        let json = br#"{"symbols": [{"name": "x", "kind": "lambda", "line_start": 1}]}"#;
        assert!(matches!(
            Extraction::from_json(json),
            Err(ExtractionError::Malformed(_))
        ));
    }

    #[test]
    fn registry_dispatches_by_extension() {
        let mut registry = ExtractorRegistry::new();
        registry.register(".c", Arc::new(Fixed("c")));
        registry.register("PY", Arc::new(Fixed("py")));

        assert!(registry.supports("src/main.c"));
        assert!(registry.supports("tool.py"));
        assert!(!registry.supports("README.md"));

        let err = registry.for_path("a.C").unwrap().extract("a.C", b"").unwrap_err();
        assert_eq!(err.to_string(), "c");
    }

    #[test]
    fn single_registry_handles_everything() {
        let registry = ExtractorRegistry::single(Arc::new(Fixed("any")));
        assert!(registry.supports("Makefile"));
    }

    #[cfg(unix)]
    #[test]
    fn command_extractor_reads_stdin_and_substitutes_path() {
        // `sh -c` echoes a record whose name is the path argument and whose
        // line count comes from stdin.
        let script = r#"n=$(wc -l | tr -d ' '); printf '{"symbols":[{"name":"%s","kind":"module","line_start":1,"line_end":%s}]}' "$1" "$n""#;
        let extractor = CommandExtractor::new(
            "sh",
            vec!["-c".into(), script.into(), "sh".into(), "{path}".into()],
            Duration::from_secs(10),
        );

        let extraction = extractor.extract("src/a.c", b"one\ntwo\nthree\n").unwrap();
        assert_eq!(extraction.symbols[0].name, "src/a.c");
        assert_eq!(extraction.symbols[0].line_end, 3);
    }

    #[cfg(unix)]
    #[test]
    fn command_extractor_reports_failure_status() {
        let extractor = CommandExtractor::new(
            "sh",
            vec!["-c".into(), "echo 'syntax error' >&2; exit 3".into()],
            Duration::from_secs(10),
        );

        match extractor.extract("a.c", b"") {
            Err(ExtractionError::Failed { stderr, .. }) => assert_eq!(stderr, "syntax error"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn command_extractor_times_out() {
        let extractor = CommandExtractor::new(
            "sh",
            vec!["-c".into(), "sleep 5".into()],
            Duration::from_millis(100),
        );

        assert!(matches!(
            extractor.extract("a.c", b""),
            Err(ExtractionError::Timeout(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn timeout_returns_while_grandchild_holds_pipes() {
        // The background sleep outlives the killed shell and keeps stdout open.
        let extractor = CommandExtractor::new(
            "sh",
            vec!["-c".into(), "sleep 5 & sleep 5".into()],
            Duration::from_millis(100),
        );

        let start = Instant::now();
        let result = extractor.extract("a.c", &vec![b'x'; 1 << 20]);

        assert!(matches!(result, Err(ExtractionError::Timeout(_))));
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let extractor = CommandExtractor::new(
            "nereus-no-such-extractor",
            vec![],
            Duration::from_secs(1),
        );
        assert!(matches!(
            extractor.extract("a.c", b""),
            Err(ExtractionError::Spawn { .. })
        ));
    }
}
