//! Batch orchestration.
//!
//! Drives every pending entry through acquire, extract, store and ledger
//! append, strictly in original order, one entry at a time. A failure at any
//! stage is entry-local: the entry stays in the working pending queue and
//! processing continues. Both durable tables are rewritten exactly once at
//! batch end; a crash mid-batch loses the in-flight run but never touches
//! the prior durable state.

use std::io::{BufRead, IsTerminal, Write};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::acquire::{Acquire, AcquireError};
use crate::artifact::{ArtifactRecord, ArtifactStore, StoreError};
use crate::config::PipelineConfig;
use crate::spectrogram::{ExtractError, SpectrogramExtractor};
use crate::tables::{self, DatasetRow, PendingEntry, TableError};

/// Fatal batch errors. Per-entry failures never surface here; only the
/// durable tables can abort a run.
#[derive(Debug, Error)]
pub enum BatchError {
    /// Reading or committing a durable table failed.
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Entry-local failure from one of the three fallible stages.
#[derive(Debug, Error)]
pub enum StageError {
    /// Acquisition failed (unreachable, unsupported stream, decode error).
    #[error(transparent)]
    Acquire(#[from] AcquireError),
    /// Extraction failed (waveform shorter than one analysis window).
    #[error(transparent)]
    Extract(#[from] ExtractError),
    /// Artifact storage failed (write error or identifier collision).
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl StageError {
    fn stage(&self) -> &'static str {
        match self {
            StageError::Acquire(_) => "acquire",
            StageError::Extract(_) => "extract",
            StageError::Store(_) => "store",
        }
    }
}

/// Operator decision about entries still pending at batch end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Keep the unprocessed entries for a future run.
    Retain,
    /// Drop the unprocessed entries from the pending table.
    Discard,
}

/// Seam for the batch-end disposition question. Invoked only when entries
/// remain unprocessed.
pub trait DispositionPrompt {
    /// Resolve what to do with `remaining` unprocessed entries.
    fn resolve(&mut self, remaining: usize) -> Disposition;
}

/// Interactive prompt on stdin. Retains the entries whenever input is
/// unavailable, so a non-interactive run never silently loses data.
pub struct StdinPrompt;

impl DispositionPrompt for StdinPrompt {
    fn resolve(&mut self, remaining: usize) -> Disposition {
        if !std::io::stdin().is_terminal() {
            info!(remaining, "Non-interactive run, retaining unprocessed entries");
            return Disposition::Retain;
        }
        print!("There are {remaining} unprocessed entries. Delete them? (y/n) ");
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(_) if line.trim().eq_ignore_ascii_case("y") => Disposition::Discard,
            _ => Disposition::Retain,
        }
    }
}

/// Outcome of one batch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    /// Entries that completed all stages and gained an output row.
    pub processed: usize,
    /// Entries that failed some stage during this run.
    pub failed: usize,
    /// Entries left in the committed pending table.
    pub remaining: usize,
    /// Operator decision, when a prompt was needed.
    pub disposition: Option<Disposition>,
}

/// One-batch orchestrator owning the working copies of both tables.
pub struct Pipeline<A: Acquire, P: DispositionPrompt> {
    config: PipelineConfig,
    acquirer: A,
    extractor: SpectrogramExtractor,
    store: ArtifactStore,
    prompt: P,
}

impl<A: Acquire, P: DispositionPrompt> Pipeline<A, P> {
    /// Build a pipeline over `config`, using `acquirer` for media fetch
    /// and `prompt` for the batch-end disposition question.
    pub fn new(config: PipelineConfig, acquirer: A, prompt: P) -> Self {
        let extractor = SpectrogramExtractor::new(config.channel_policy);
        let store = ArtifactStore::new(&config.artifact_dir);
        Self {
            config,
            acquirer,
            extractor,
            store,
            prompt,
        }
    }

    /// Run one batch: process every pending entry in order, then commit
    /// both tables exactly once.
    pub fn run(&mut self) -> Result<BatchSummary, BatchError> {
        let pending = tables::load_pending(&self.config.pending_table_path)?;
        let mut ledger = tables::load_output(&self.config.output_table_path)?;
        info!(
            pending = pending.len(),
            ledger_rows = ledger.len(),
            "Starting batch"
        );

        let mut retained = Vec::new();
        let mut processed = 0usize;
        for entry in pending {
            match self.process_entry(&entry, &mut ledger) {
                Ok(record) => {
                    processed += 1;
                    debug!(
                        reference = %entry.reference,
                        artifact = %record.identifier,
                        label = %entry.label,
                        "Entry committed"
                    );
                }
                Err(err) => {
                    warn!(
                        reference = %entry.reference,
                        stage = err.stage(),
                        "Entry failed, keeping it pending: {err}"
                    );
                    retained.push(entry);
                }
            }
        }

        let failed = retained.len();
        let mut disposition = None;
        if !retained.is_empty() {
            let choice = self.prompt.resolve(retained.len());
            if choice == Disposition::Discard {
                warn!(
                    discarded = retained.len(),
                    "Discarding unprocessed entries at operator request"
                );
                retained.clear();
            }
            disposition = Some(choice);
        }

        // Output first: if the pending rewrite fails after this point the
        // worst case is re-processing on the next run, never lost rows.
        tables::save_output(&self.config.output_table_path, &ledger)?;
        tables::save_pending(&self.config.pending_table_path, &retained)?;
        info!(processed, failed, remaining = retained.len(), "Batch committed");
        Ok(BatchSummary {
            processed,
            failed,
            remaining: retained.len(),
            disposition,
        })
    }

    /// Run one entry through acquire, extract and store, then append its
    /// ledger row. The artifact index is the ledger row count read at store
    /// time, so identifiers keep increasing across entries within the run.
    fn process_entry(
        &mut self,
        entry: &PendingEntry,
        ledger: &mut Vec<DatasetRow>,
    ) -> Result<ArtifactRecord, StageError> {
        let waveform = self.acquirer.acquire(&entry.reference)?;
        let spectrogram = self.extractor.extract(&waveform)?;
        let record = self.store.store(&spectrogram, ledger.len())?;
        ledger.push(DatasetRow {
            artifact_path: record.storage_path.to_string_lossy().into_owned(),
            label: entry.label.clone(),
        });
        Ok(record)
    }
}
