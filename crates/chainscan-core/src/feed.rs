//! Collaborator traits at the edges of the scan, plus in-memory implementations.
//!
//! The scan core never touches the on-disk block layout, the block wire format
//! or script parsing directly; it talks to these three traits.

use std::collections::VecDeque;

use crate::error::{DecodeError, FeedError};
use crate::types::{Block, RawBlock};

/// Forward-only cursor over raw block records, in storage order.
///
/// Storage order is not chain order: sibling blocks may appear in any
/// position relative to each other.
pub trait BlockFeed {
    /// Fetch the next record. `Ok(None)` means the store is exhausted, and
    /// must keep being returned on every later call.
    fn fetch_next(&mut self) -> Result<Option<RawBlock>, FeedError>;
}

/// Turns one raw record into a structured [`Block`].
pub trait BlockDecoder {
    fn decode(&self, raw: &RawBlock) -> Result<Block, DecodeError>;
}

/// Derives a human-readable address from an output's locking script.
pub trait AddressResolver {
    /// `None` when the script has no address form.
    fn resolve(&self, script_pubkey: &[u8]) -> Option<String>;
}

impl<F: BlockFeed + ?Sized> BlockFeed for Box<F> {
    fn fetch_next(&mut self) -> Result<Option<RawBlock>, FeedError> {
        (**self).fetch_next()
    }
}

impl<D: BlockDecoder + ?Sized> BlockDecoder for Box<D> {
    fn decode(&self, raw: &RawBlock) -> Result<Block, DecodeError> {
        (**self).decode(raw)
    }
}

impl<R: AddressResolver + ?Sized> AddressResolver for Box<R> {
    fn resolve(&self, script_pubkey: &[u8]) -> Option<String> {
        (**self).resolve(script_pubkey)
    }
}

// ─── In-memory implementations ────────────────────────────────────────────────

/// Feed over a fixed list of records, optionally failing after the last one.
#[derive(Debug, Default)]
pub struct MemoryBlockFeed {
    records: VecDeque<RawBlock>,
    fail_at_end: Option<String>,
}

impl MemoryBlockFeed {
    pub fn new(records: impl IntoIterator<Item = RawBlock>) -> Self {
        Self {
            records: records.into_iter().collect(),
            fail_at_end: None,
        }
    }

    /// Feed of JSON-encoded blocks, readable by [`JsonBlockDecoder`].
    pub fn from_blocks<'a>(blocks: impl IntoIterator<Item = &'a Block>) -> Self {
        Self::new(blocks.into_iter().map(JsonBlockDecoder::encode))
    }

    /// Report a broken store instead of a clean end once the records run out.
    pub fn fail_at_end(mut self, reason: impl Into<String>) -> Self {
        self.fail_at_end = Some(reason.into());
        self
    }

    /// Records not fetched yet.
    pub fn remaining(&self) -> usize {
        self.records.len()
    }
}

impl BlockFeed for MemoryBlockFeed {
    fn fetch_next(&mut self) -> Result<Option<RawBlock>, FeedError> {
        match self.records.pop_front() {
            Some(raw) => Ok(Some(raw)),
            None => match &self.fail_at_end {
                Some(reason) => Err(FeedError::Other(reason.clone())),
                None => Ok(None),
            },
        }
    }
}

/// Decoder for records holding a JSON-serialized [`Block`].
///
/// Used for fixtures and tests where building real consensus bytes is noise.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonBlockDecoder;

impl JsonBlockDecoder {
    pub fn encode(block: &Block) -> RawBlock {
        // Serializing plain strings and integers cannot fail.
        serde_json::to_vec(block).unwrap_or_default()
    }
}

impl BlockDecoder for JsonBlockDecoder {
    fn decode(&self, raw: &RawBlock) -> Result<Block, DecodeError> {
        serde_json::from_slice(raw).map_err(|e| DecodeError::new(e.to_string()))
    }
}

/// Resolver that renders the script as hex, and leaves empty scripts unresolved.
#[derive(Debug, Default, Clone, Copy)]
pub struct HexScriptResolver;

impl AddressResolver for HexScriptResolver {
    fn resolve(&self, script_pubkey: &[u8]) -> Option<String> {
        if script_pubkey.is_empty() {
            None
        } else {
            Some(hex::encode(script_pubkey))
        }
    }
}
