//! Scan cursor: the transient state threaded from the seek into the reconciler.

use serde::Serialize;

use crate::types::Block;

/// Where the scan stands in the chain.
///
/// The cursor knows:
/// - the last block committed as canonical (its number and hash)
/// - the group of sibling blocks still waiting for a successor to pick one
/// - running counters for the run report
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanState {
    /// Number of the last committed block; genesis is block 0.
    pub block_number: Option<u64>,
    /// Hash of the last committed block. This is the checkpoint value.
    pub tip: Option<String>,
    /// Decoded blocks sharing one parent, in store order, none confirmed yet.
    #[serde(skip)]
    pub candidates: Vec<Block>,
    /// `true` from the end of the seek until the reconciler confirms the
    /// first block after the checkpoint. Orphans rejected while it is set are
    /// siblings of the resumption block.
    pub orphan_mode: bool,
    /// Records fetched and decoded.
    pub scanned: u64,
    /// Blocks committed as canonical.
    pub committed: u64,
    /// Blocks rejected as orphans.
    pub orphans: u64,
}

impl ScanState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number the next accepted block will receive.
    pub fn next_number(&self) -> u64 {
        self.block_number.map_or(0, |n| n + 1)
    }

    /// Current checkpoint value, if any block was committed.
    pub fn checkpoint(&self) -> Option<&str> {
        self.tip.as_deref()
    }

    /// Record `block` as canonical under `number`.
    ///
    /// Callers commit only after the block has been fully handled, so a
    /// failure in between leaves the previous tip as the checkpoint.
    pub fn commit(&mut self, block: &Block, number: u64) {
        debug_assert_eq!(number, self.next_number());
        self.block_number = Some(number);
        self.tip = Some(block.hash.clone());
        self.committed += 1;
    }

    /// Take `hash` as the tip without having decoded its block.
    ///
    /// Used when the store holds children of the checkpoint but not the
    /// checkpoint block itself. Pending candidates are dropped.
    pub fn anchor(&mut self, hash: &str, number: u64) {
        self.block_number = Some(number);
        self.tip = Some(hash.to_string());
        self.candidates.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(hash: &str, parent: &str) -> Block {
        Block {
            hash: hash.into(),
            parent_hash: parent.into(),
            timestamp: 0,
            merkle_root: String::new(),
            transactions: vec![],
        }
    }

    #[test]
    fn numbering_starts_at_zero() {
        let mut state = ScanState::new();
        assert_eq!(state.next_number(), 0);
        assert!(state.checkpoint().is_none());

        state.commit(&block("g", ""), 0);
        assert_eq!(state.next_number(), 1);
        assert_eq!(state.checkpoint(), Some("g"));

        state.commit(&block("b1", "g"), 1);
        assert_eq!(state.block_number, Some(1));
        assert_eq!(state.committed, 2);
    }

    #[test]
    fn anchor_sets_tip_without_commit() {
        let mut state = ScanState::new();
        state.candidates.push(block("x", "w"));
        state.anchor("p", 4);
        assert_eq!(state.checkpoint(), Some("p"));
        assert_eq!(state.next_number(), 5);
        assert_eq!(state.committed, 0);
        assert!(state.candidates.is_empty());
    }
}
