//! Background writer for parallel ingestion.
//!
//! Worker threads read, hash and extract files concurrently; the results go
//! over an MPSC channel to one background thread that resolves and commits
//! them, one transaction per file. Only this thread writes during a batch,
//! so readers always see whole files appear one at a time.
//!
//! ```text
//!  rayon workers                       writer thread
//!  ─────────────                       ─────────────
//!  read + hash + extract  ──send──▶    recv()
//!  read + hash + extract  ──send──▶    resolve against a fresh snapshot
//!  ...                                 write_file (retry once)
//!  drop sender                         record outcome, return WriteStats
//! ```

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use tracing::{debug, error, warn};

use super::{FileOutcome, FileStatus, Pipeline, PreparedFile};
use crate::error::{Error, IngestError, Result};

/// Statistics about the batch writing process.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WriteStats {
    /// Files committed
    pub files_written: usize,
    /// Symbols written across all committed files
    pub symbols_written: usize,
    /// Relation rows owned by the committed files
    pub relations_written: usize,
    /// Relations bound to the placeholder for lack of a target
    pub unresolved: usize,
    /// Commits that needed their one retry
    pub retries: usize,
    /// Files whose commit failed after the retry
    pub failures: usize,
}

/// Work sent to the writer thread.
pub(crate) enum WriteJob {
    /// Extracted and ready to resolve and commit
    Ready(Box<PreparedFile>),
    /// Content hash unchanged, nothing to write
    Unchanged(String),
    /// Failed before reaching the writer
    Failed(IngestError),
}

/// Result returned when the batch writer finishes.
#[derive(Debug)]
pub(crate) struct BatchWriteResult {
    pub stats: WriteStats,
    pub outcomes: Vec<FileOutcome>,
}

/// A background thread owning all store writes for one batch.
pub(crate) struct BatchWriter {
    sender: Sender<WriteJob>,
    handle: JoinHandle<BatchWriteResult>,
}

impl BatchWriter {
    /// Start the writer thread.
    pub(crate) fn new(pipeline: Pipeline) -> Self {
        let (sender, receiver) = mpsc::channel();
        let handle = thread::spawn(move || Self::writer_thread(&pipeline, receiver));
        Self { sender, handle }
    }

    /// Queue a job. Never blocks.
    ///
    /// If the writer thread is gone the job is lost; `finish` reports why.
    pub(crate) fn send(&self, job: WriteJob) {
        if let Err(e) = self.sender.send(job) {
            let path = match &e.0 {
                WriteJob::Ready(file) => file.path.clone(),
                WriteJob::Unchanged(path) => path.clone(),
                WriteJob::Failed(err) => err.path.display().to_string(),
            };
            error!(file = %path, "Failed to send to batch writer (receiver disconnected)");
        }
    }

    /// Close the channel, wait for the writer to drain it, and return its results.
    pub(crate) fn finish(self) -> Result<BatchWriteResult> {
        drop(self.sender);

        match self.handle.join() {
            Ok(result) => Ok(result),
            Err(panic_payload) => {
                let msg = if let Some(s) = panic_payload.downcast_ref::<&str>() {
                    format!("Batch writer thread panicked: {s}")
                } else if let Some(s) = panic_payload.downcast_ref::<String>() {
                    format!("Batch writer thread panicked: {s}")
                } else {
                    "Batch writer thread panicked with unknown payload".to_string()
                };
                error!(panic_msg = %msg, "Background batch writer thread panicked");
                Err(Error::Internal(msg))
            }
        }
    }

    #[allow(clippy::needless_pass_by_value)] // Receiver is consumed by the loop
    fn writer_thread(pipeline: &Pipeline, receiver: Receiver<WriteJob>) -> BatchWriteResult {
        let mut stats = WriteStats::default();
        let mut outcomes = Vec::new();

        for job in receiver {
            let outcome = match job {
                WriteJob::Ready(file) => match pipeline.commit(&file) {
                    Ok(ingest) => {
                        stats.files_written += 1;
                        stats.symbols_written += ingest.symbols;
                        stats.relations_written += ingest.relations;
                        stats.unresolved += ingest.unresolved;
                        if ingest.retried {
                            stats.retries += 1;
                        }
                        FileOutcome {
                            path: file.path.clone(),
                            status: FileStatus::Indexed(ingest),
                        }
                    }
                    Err(e) => {
                        // One bad file never stops the batch.
                        warn!(file = %file.path, error = %e, "Failed to write file to database");
                        stats.failures += 1;
                        stats.retries += 1;
                        FileOutcome {
                            path: file.path.clone(),
                            status: FileStatus::Failed(IngestError::from_error(
                                file.path.clone().into(),
                                &e,
                            )),
                        }
                    }
                },
                WriteJob::Unchanged(path) => FileOutcome {
                    path,
                    status: FileStatus::Unchanged,
                },
                WriteJob::Failed(err) => FileOutcome {
                    path: err.path.display().to_string(),
                    status: FileStatus::Failed(err),
                },
            };
            outcomes.push(outcome);
        }

        debug!(
            files = stats.files_written,
            symbols = stats.symbols_written,
            relations = stats.relations_written,
            unresolved = stats.unresolved,
            failures = stats.failures,
            "Batch writer finished"
        );

        BatchWriteResult { stats, outcomes }
    }
}
