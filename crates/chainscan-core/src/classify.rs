//! Advance-and-classify: the one place that fetches, decodes and compares.
//!
//! The steady-state loop calls [`advance`]; the seek calls [`fetch`] and
//! [`classify`] separately so it can look at a block before it is compared.
//! Each decoded block is compared against the pending sibling group held in
//! the [`ScanState`]:
//!
//! ```text
//! candidates: [B1, B1']           (both claim parent P)
//!   next = B2, parent B1'    →  Accepted(B1'), orphans [B1], candidates [B2]
//!   next = B1'', parent P    →  Pending, candidates [B1, B1', B1'']
//!   next = X, parent Q       →  Orphan(X)
//!   end of store             →  End(Accepted(B1')), orphans [B1]
//! ```
//!
//! A block is only confirmed once a successor names it as parent, or once the
//! store ends, in which case the last sibling in store order wins.

use crate::cursor::ScanState;
use crate::error::{FeedError, ScanError};
use crate::feed::{BlockDecoder, BlockFeed};
use crate::types::Block;

/// A block confirmed canonical but not yet committed to the [`ScanState`].
#[derive(Debug, Clone)]
pub struct Accepted {
    pub block: Block,
    /// Number this block receives once committed.
    pub number: u64,
    /// Siblings that lost to `block`.
    pub orphans: Vec<Block>,
}

/// Outcome of one [`advance`] step.
#[derive(Debug)]
pub enum Advance {
    /// A pending block was confirmed by its successor.
    Accepted(Accepted),
    /// The block joined the pending group and awaits confirmation.
    Pending,
    /// The block extends nothing we know of and is not a pending sibling.
    Orphan(Block),
    /// Store exhausted; carries the flushed last candidate, if any.
    End(Option<Accepted>),
    /// The feed failed; pending candidates are left unconfirmed.
    FeedBroken(FeedError),
}

/// One record pulled from the feed, not yet classified.
#[derive(Debug)]
pub enum Fetched {
    Block(Block),
    End,
    Broken(FeedError),
}

/// Fetch one record and decode it, counting it in `state.scanned`.
///
/// Decode failures are returned as [`ScanError::Decode`].
pub fn fetch<F, D>(feed: &mut F, decoder: &D, state: &mut ScanState) -> Result<Fetched, ScanError>
where
    F: BlockFeed + ?Sized,
    D: BlockDecoder + ?Sized,
{
    let raw = match feed.fetch_next() {
        Ok(Some(raw)) => raw,
        Ok(None) => return Ok(Fetched::End),
        Err(e) => return Ok(Fetched::Broken(e)),
    };

    let block = decoder.decode(&raw).map_err(|source| ScanError::Decode {
        scanned: state.scanned,
        source,
    })?;
    state.scanned += 1;
    Ok(Fetched::Block(block))
}

/// Fetch one record, decode it and classify it against `state`.
///
/// Decode failures are fatal and returned as [`ScanError::Decode`].
pub fn advance<F, D>(
    feed: &mut F,
    decoder: &D,
    state: &mut ScanState,
) -> Result<Advance, ScanError>
where
    F: BlockFeed + ?Sized,
    D: BlockDecoder + ?Sized,
{
    Ok(match fetch(feed, decoder, state)? {
        Fetched::Block(block) => classify(state, block),
        Fetched::End => Advance::End(flush(state)),
        Fetched::Broken(e) => Advance::FeedBroken(e),
    })
}

/// Compare `block` against the pending group and update `state`.
pub fn classify(state: &mut ScanState, block: Block) -> Advance {
    if state.candidates.is_empty() {
        match state.tip.as_deref() {
            Some(tip) if block.parent_hash != tip => {
                state.orphans += 1;
                return Advance::Orphan(block);
            }
            _ => {
                state.candidates.push(block);
                return Advance::Pending;
            }
        }
    }

    if let Some(pos) = state.candidates.iter().position(|c| block.extends(c)) {
        let mut group = std::mem::replace(&mut state.candidates, vec![block]);
        let confirmed = group.remove(pos);
        return Advance::Accepted(accept(state, confirmed, group));
    }

    if state.candidates.first().is_some_and(|c| block.is_sibling_of(c)) {
        state.candidates.push(block);
        return Advance::Pending;
    }

    state.orphans += 1;
    Advance::Orphan(block)
}

/// Confirm the last pending candidate; earlier siblings become orphans.
pub fn flush(state: &mut ScanState) -> Option<Accepted> {
    let mut group = std::mem::take(&mut state.candidates);
    let last = group.pop()?;
    Some(accept(state, last, group))
}

fn accept(state: &mut ScanState, block: Block, orphans: Vec<Block>) -> Accepted {
    state.orphans += orphans.len() as u64;
    Accepted {
        number: state.next_number(),
        block,
        orphans,
    }
}
