//! Chain reconciler: the steady-state loop after the seek.
//!
//! Drives [`advance`] from the seek's [`ScanState`], hands every confirmed
//! block to a [`BlockSink`] and commits it only once the sink succeeded.
//! Orphans are logged and counted, never exported, never numbered.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::classify::{advance, Accepted, Advance};
use crate::cursor::ScanState;
use crate::error::ScanError;
use crate::feed::{BlockDecoder, BlockFeed};
use crate::types::Block;

/// Receives canonical blocks in chain order.
pub trait BlockSink {
    /// Handle one block. Returns the number of records written for it.
    fn accept_block(&mut self, block: &Block, number: u64) -> Result<u64, ScanError>;

    /// Push buffered output to its destination.
    fn flush(&mut self) -> Result<(), ScanError>;
}

/// Why the loop stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The feed reported no more records.
    EndOfStore,
    /// The feed failed; treated as a normal end of input.
    FeedBroken { reason: String },
    /// The per-run record ceiling was reached.
    RecordLimit { limit: u64 },
    /// The stop flag was raised.
    Stopped,
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EndOfStore => write!(f, "end of store"),
            Self::FeedBroken { reason } => write!(f, "feed broken: {reason}"),
            Self::RecordLimit { limit } => write!(f, "record limit {limit} reached"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Counters for one reconciler run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileStats {
    pub blocks: u64,
    pub orphans: u64,
    pub records: u64,
}

/// Steady-state loop configuration.
#[derive(Debug, Clone, Default)]
pub struct ChainReconciler {
    /// Safety ceiling on records fetched in this run.
    max_records: Option<u64>,
    progress_every: u64,
    stop: Option<Arc<AtomicBool>>,
}

impl ChainReconciler {
    pub fn new(max_records: Option<u64>, progress_every: u64) -> Self {
        Self {
            max_records,
            progress_every: progress_every.max(1),
            stop: None,
        }
    }

    /// Stop cleanly (without flushing pending siblings) once `flag` is set.
    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop = Some(flag);
        self
    }

    /// Run until the feed ends, breaks, hits the ceiling or is stopped.
    ///
    /// `state` is updated in place so the caller can still read the last
    /// committed tip if this returns an error.
    pub fn run<F, D, S>(
        &self,
        feed: &mut F,
        decoder: &D,
        state: &mut ScanState,
        sink: &mut S,
        stats: &mut ReconcileStats,
    ) -> Result<Termination, ScanError>
    where
        F: BlockFeed + ?Sized,
        D: BlockDecoder + ?Sized,
        S: BlockSink + ?Sized,
    {
        let start_scanned = state.scanned;

        loop {
            if self.stop_requested() {
                tracing::info!(block_number = ?state.block_number, "Stop requested");
                return Ok(Termination::Stopped);
            }
            if let Some(limit) = self.max_records {
                if state.scanned - start_scanned >= limit {
                    tracing::warn!(limit, block_number = ?state.block_number, "Record limit reached");
                    return Ok(Termination::RecordLimit { limit });
                }
            }

            match advance(feed, decoder, state)? {
                Advance::Accepted(acc) => self.export(acc, state, sink, stats)?,
                Advance::Pending => {}
                Advance::Orphan(block) => {
                    stats.orphans += 1;
                    log_orphan(&block, state);
                }
                Advance::End(last) => {
                    if let Some(acc) = last {
                        self.export(acc, state, sink, stats)?;
                    }
                    tracing::info!(block_number = ?state.block_number, "End of block store reached");
                    return Ok(Termination::EndOfStore);
                }
                Advance::FeedBroken(e) => {
                    tracing::warn!(
                        error = %e,
                        block_number = ?state.block_number,
                        pending = state.candidates.len(),
                        "Block feed failed, ending run"
                    );
                    return Ok(Termination::FeedBroken {
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    fn export<S: BlockSink + ?Sized>(
        &self,
        acc: Accepted,
        state: &mut ScanState,
        sink: &mut S,
        stats: &mut ReconcileStats,
    ) -> Result<(), ScanError> {
        for orphan in &acc.orphans {
            stats.orphans += 1;
            log_orphan(orphan, state);
        }
        stats.records += sink.accept_block(&acc.block, acc.number)?;
        state.commit(&acc.block, acc.number);
        stats.blocks += 1;

        if state.orphan_mode {
            state.orphan_mode = false;
            tracing::info!(
                block_number = acc.number,
                hash = %acc.block.hash,
                siblings_dropped = acc.orphans.len(),
                "Resumption point settled"
            );
        }

        if acc.number % self.progress_every == 0 {
            tracing::info!(
                block_number = acc.number,
                hash = %acc.block.hash,
                records = stats.records,
                orphans = stats.orphans,
                "Scan progress"
            );
        }
        Ok(())
    }

    fn stop_requested(&self) -> bool {
        self.stop
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

fn log_orphan(block: &Block, state: &ScanState) {
    if state.orphan_mode {
        tracing::info!(
            hash = %block.hash,
            parent = %block.parent_hash,
            block_number = ?state.block_number,
            "Skipping orphan sibling of the resumption block"
        );
    } else {
        tracing::warn!(
            hash = %block.hash,
            parent = %block.parent_hash,
            block_number = ?state.block_number,
            "Skipping orphan block"
        );
    }
}
