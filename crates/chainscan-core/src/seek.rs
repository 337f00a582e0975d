//! Seek engine: finds the resumption point for a saved checkpoint.
//!
//! The block store has no index, so the seek replays it from the start with
//! export muted, running the same classification as the steady-state loop.
//! That numbers every canonical block below the checkpoint exactly the way
//! the previous run did, and leaves the cursor holding the blocks that
//! claim the checkpoint as their parent:
//!
//! ```text
//! checkpoint P:  … A  P  B1(P)  B1'(P)  B2(B1') …
//!                      ▲  └──── sibling group ────┘
//!                      │  seek stops here: P committed, candidates [B1],
//!                      │  B1' joins as sibling, B2 decides B1' is canonical
//!                      └─ accepted when B1 names it as parent
//! ```
//!
//! The checkpoint block does not have to be in the store. If a block naming
//! the checkpoint as parent turns up before the checkpoint block itself was
//! committed, that block opens the sibling group and the checkpoint becomes
//! the tip directly. Numbering then continues from the replayed prefix, so
//! it is only exact when the store holds the history below the checkpoint.

use crate::classify::{classify, fetch, flush, Accepted, Advance, Fetched};
use crate::cursor::ScanState;
use crate::error::ScanError;
use crate::feed::{BlockDecoder, BlockFeed};
use crate::types::Block;

/// Result of a successful seek.
#[derive(Debug)]
pub struct SeekOutcome {
    /// State to hand to the reconciler.
    pub state: ScanState,
    /// Records consumed that belong to already-exported history.
    pub skipped: u64,
    /// `true` if the checkpoint is the last block of the store.
    pub at_end: bool,
}

/// Replays the store up to the checkpoint.
#[derive(Debug, Clone)]
pub struct SeekEngine {
    progress_every: u64,
}

impl SeekEngine {
    pub fn new(progress_every: u64) -> Self {
        Self {
            progress_every: progress_every.max(1),
        }
    }

    /// Position `feed` just past `checkpoint`.
    ///
    /// With no checkpoint the feed is left untouched and numbering starts at 0.
    /// Fails with [`ScanError::SeekExhausted`] if the store ends, breaks or
    /// holds an undecodable record before the checkpoint is reached, and with
    /// [`ScanError::CheckpointOrphaned`] if the checkpoint block loses to a
    /// sibling.
    pub fn seek<F, D>(
        &self,
        feed: &mut F,
        decoder: &D,
        checkpoint: Option<&str>,
    ) -> Result<SeekOutcome, ScanError>
    where
        F: BlockFeed + ?Sized,
        D: BlockDecoder + ?Sized,
    {
        let Some(target) = checkpoint.filter(|h| !h.is_empty()) else {
            tracing::info!("No checkpoint, starting from the first block in the store");
            return Ok(SeekOutcome {
                state: ScanState::new(),
                skipped: 0,
                at_end: false,
            });
        };

        tracing::info!(checkpoint = target, "Seeking block store");
        let mut state = ScanState::new();

        loop {
            let fetched = match fetch(feed, decoder, &mut state) {
                Ok(fetched) => fetched,
                Err(ScanError::Decode { source, .. }) => {
                    tracing::warn!(error = %source, "Undecodable record during seek");
                    return Err(ScanError::SeekExhausted {
                        checkpoint: target.to_string(),
                        scanned: state.scanned,
                        source: Some(source),
                    });
                }
                Err(e) => return Err(e),
            };

            let step = match fetched {
                Fetched::Block(block) => {
                    if block.parent_hash == target
                        && !state.candidates.iter().any(|c| c.hash == target)
                    {
                        return Ok(self.anchor(state, block, target));
                    }
                    classify(&mut state, block)
                }
                Fetched::End => Advance::End(flush(&mut state)),
                Fetched::Broken(e) => Advance::FeedBroken(e),
            };

            match step {
                Advance::Accepted(acc) => {
                    if self.settle(&mut state, acc, target)? {
                        // The confirming successor is the first pending candidate.
                        state.orphan_mode = true;
                        let skipped = state.scanned - state.candidates.len() as u64;
                        tracing::info!(
                            checkpoint = target,
                            block_number = ?state.block_number,
                            skipped,
                            "Found resumption point"
                        );
                        return Ok(SeekOutcome {
                            state,
                            skipped,
                            at_end: false,
                        });
                    }
                }
                Advance::Orphan(block) => {
                    if block.hash == target {
                        return Err(ScanError::CheckpointOrphaned {
                            checkpoint: target.to_string(),
                        });
                    }
                }
                Advance::Pending => {}
                Advance::End(Some(mut acc)) => {
                    // Siblings still undecided at end of store: keep the one
                    // the previous run already exported.
                    if let Some(pos) = acc.orphans.iter().position(|o| o.hash == target) {
                        let kept = acc.orphans.remove(pos);
                        let loser = std::mem::replace(&mut acc.block, kept);
                        acc.orphans.push(loser);
                    }
                    if self.settle(&mut state, acc, target)? {
                        tracing::info!(
                            checkpoint = target,
                            block_number = ?state.block_number,
                            "Checkpoint is the last block in the store, nothing to do"
                        );
                        let skipped = state.scanned;
                        return Ok(SeekOutcome {
                            state,
                            skipped,
                            at_end: true,
                        });
                    }
                    return Err(exhausted(target, &state));
                }
                Advance::End(None) => return Err(exhausted(target, &state)),
                Advance::FeedBroken(e) => {
                    tracing::warn!(error = %e, "Block feed failed during seek");
                    return Err(exhausted(target, &state));
                }
            }
        }
    }

    /// Resume at `child` when the checkpoint block itself was never seen.
    ///
    /// Whatever is still pending is flushed first, so the checkpoint takes
    /// the number after the last replayed block.
    fn anchor(&self, mut state: ScanState, child: Block, target: &str) -> SeekOutcome {
        if let Some(acc) = flush(&mut state) {
            state.commit(&acc.block, acc.number);
        }
        let number = state.next_number();
        state.anchor(target, number);
        state.candidates.push(child);
        state.orphan_mode = true;

        let skipped = state.scanned - 1;
        tracing::warn!(
            checkpoint = target,
            block_number = number,
            skipped,
            "Checkpoint block not in store, resuming at its children"
        );
        SeekOutcome {
            state,
            skipped,
            at_end: false,
        }
    }

    /// Commit a replayed block. Returns `true` once the checkpoint block is committed.
    fn settle(
        &self,
        state: &mut ScanState,
        acc: Accepted,
        target: &str,
    ) -> Result<bool, ScanError> {
        if acc.orphans.iter().any(|o| o.hash == target) {
            return Err(ScanError::CheckpointOrphaned {
                checkpoint: target.to_string(),
            });
        }
        state.commit(&acc.block, acc.number);
        if acc.number % self.progress_every == 0 {
            tracing::info!(block_number = acc.number, scanned = state.scanned, "Seek progress");
        }
        Ok(acc.block.hash == target)
    }
}

impl Default for SeekEngine {
    fn default() -> Self {
        Self::new(1_000)
    }
}

fn exhausted(target: &str, state: &ScanState) -> ScanError {
    ScanError::SeekExhausted {
        checkpoint: target.to_string(),
        scanned: state.scanned,
        source: None,
    }
}
