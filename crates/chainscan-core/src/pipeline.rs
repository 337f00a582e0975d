//! The pipeline orchestrator: one complete scan run.
//!
//! # Phases
//! 1. Load the checkpoint (missing ⇒ genesis, unreadable ⇒ fatal).
//! 2. Seek: replay the store up to the checkpoint with export muted.
//! 3. Reconcile: number canonical blocks, skip orphans, export transactions.
//! 4. Flush the sink, then persist the new checkpoint.
//!
//! On a fatal error the sink is flushed and the last committed tip is saved
//! best-effort, then the error is returned with the last known block number
//! and checkpoint attached.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checkpoint::{CheckpointManager, FileCheckpointStore};
use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::feed::{BlockDecoder, BlockFeed};
use crate::reconcile::{BlockSink, ChainReconciler, ReconcileStats, Termination};
use crate::seek::SeekEngine;

/// Summary of one run, printed by the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub start_checkpoint: Option<String>,
    pub end_checkpoint: Option<String>,
    /// Number of the first block exported in this run.
    pub first_block: Option<u64>,
    /// Number of the last committed block (exported in this or an earlier run).
    pub last_block: Option<u64>,
    pub blocks_exported: u64,
    pub orphans_skipped: u64,
    /// Records replayed by the seek.
    pub records_skipped: u64,
    pub records_scanned: u64,
    pub transactions_exported: u64,
    pub termination: Termination,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Wires checkpoint, seek and reconciler together.
pub struct Pipeline {
    checkpoint: CheckpointManager,
    seek: SeekEngine,
    reconciler: ChainReconciler,
}

impl Pipeline {
    pub fn new(checkpoint: CheckpointManager, seek: SeekEngine, reconciler: ChainReconciler) -> Self {
        Self {
            checkpoint,
            seek,
            reconciler,
        }
    }

    /// Build a pipeline backed by the checkpoint file named in `config`.
    pub fn from_config(
        config: &ScanConfig,
        stop: Option<Arc<AtomicBool>>,
    ) -> Result<Self, ScanError> {
        config.validate()?;
        let store = FileCheckpointStore::new(&config.checkpoint_path);
        let mut reconciler = ChainReconciler::new(config.max_records, config.progress_every);
        if let Some(flag) = stop {
            reconciler = reconciler.with_stop_flag(flag);
        }
        Ok(Self::new(
            CheckpointManager::new(Box::new(store)),
            SeekEngine::new(config.progress_every),
            reconciler,
        ))
    }

    /// Run one scan over `feed`, exporting into `sink`.
    pub fn run<F, D, S>(
        &self,
        feed: &mut F,
        decoder: &D,
        sink: &mut S,
    ) -> Result<RunReport, ScanError>
    where
        F: BlockFeed + ?Sized,
        D: BlockDecoder + ?Sized,
        S: BlockSink + ?Sized,
    {
        let started_at = Utc::now();
        let start_checkpoint = self
            .checkpoint
            .load()
            .map_err(|e| e.at_position(None, None))?;
        tracing::info!(checkpoint = ?start_checkpoint, "Starting scan");

        let seek = match self.seek.seek(feed, decoder, start_checkpoint.as_deref()) {
            Ok(seek) => seek,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    checkpoint = ?start_checkpoint,
                    "Seek failed, checkpoint left unchanged"
                );
                let _ = sink.flush();
                return Err(e.at_position(None, start_checkpoint));
            }
        };
        let records_skipped = seek.skipped;
        let mut state = seek.state;
        let first_number = state.next_number();

        let mut stats = ReconcileStats::default();
        let outcome = self
            .reconciler
            .run(feed, decoder, &mut state, sink, &mut stats);
        let flushed = sink.flush();

        let termination = match (outcome, flushed) {
            (Ok(termination), Ok(())) => termination,
            (Err(e), Ok(())) => {
                let saved = self.checkpoint.save_best_effort(state.checkpoint());
                tracing::error!(
                    error = %e,
                    block_number = ?state.block_number,
                    checkpoint = ?state.tip,
                    saved,
                    "Scan aborted"
                );
                return Err(e.at_position(state.block_number, state.tip));
            }
            (outcome, Err(flush_err)) => {
                // Unknown how much reached the sink: keep the previous checkpoint.
                let e = match outcome {
                    Err(e) => e,
                    Ok(_) => flush_err,
                };
                tracing::error!(
                    error = %e,
                    block_number = ?state.block_number,
                    checkpoint = ?state.tip,
                    "Sink flush failed, checkpoint not saved"
                );
                return Err(e.at_position(state.block_number, state.tip));
            }
        };

        if let Some(tip) = state.checkpoint() {
            if let Err(e) = self.checkpoint.force_save(tip) {
                tracing::error!(error = %e, checkpoint = tip, "Checkpoint save failed");
                return Err(e.at_position(state.block_number, state.tip.clone()));
            }
        }

        tracing::info!(
            last_block = ?state.block_number,
            hash = ?state.tip,
            blocks = stats.blocks,
            records = stats.records,
            orphans = stats.orphans,
            %termination,
            "Scan finished"
        );

        Ok(RunReport {
            start_checkpoint,
            end_checkpoint: state.tip.clone(),
            first_block: (stats.blocks > 0).then_some(first_number),
            last_block: state.block_number,
            blocks_exported: stats.blocks,
            orphans_skipped: stats.orphans,
            records_skipped,
            records_scanned: state.scanned,
            transactions_exported: stats.records,
            termination,
            started_at,
            finished_at: Utc::now(),
        })
    }
}
