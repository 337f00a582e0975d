//! Error types for the chainscan pipeline.

use thiserror::Error;

/// Failure reported by a [`BlockFeed`](crate::feed::BlockFeed).
///
/// In steady state a broken feed ends the run like an exhausted one; during
/// the seek it becomes [`ScanError::SeekExhausted`] because the checkpoint
/// was never reached.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("IO error reading block store: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bad magic {found} in {file} at offset {offset}")]
    BadMagic {
        file: String,
        offset: u64,
        found: String,
    },

    #[error("Truncated record in {file} at offset {offset}: wanted {wanted} bytes")]
    Truncated {
        file: String,
        offset: u64,
        wanted: u64,
    },

    #[error("{0}")]
    Other(String),
}

/// Malformed block bytes. Always fatal: offsets after a corrupt record cannot be trusted.
#[derive(Debug, Error)]
#[error("Block decode failed: {reason}")]
pub struct DecodeError {
    pub reason: String,
}

impl DecodeError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Errors that can occur during a scan.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decode error after {scanned} records: {source}")]
    Decode {
        scanned: u64,
        #[source]
        source: DecodeError,
    },

    /// The seek ran out of readable records before reaching the checkpoint.
    /// `source` is set when it stopped on a record that failed to decode.
    #[error("Block store exhausted after {scanned} records without reaching checkpoint {checkpoint}")]
    SeekExhausted {
        checkpoint: String,
        scanned: u64,
        #[source]
        source: Option<DecodeError>,
    },

    #[error("Checkpoint {checkpoint} belongs to an orphaned block; history below the checkpoint was rewritten")]
    CheckpointOrphaned { checkpoint: String },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Scan aborted at block {block_number:?} (checkpoint {checkpoint:?}): {source}")]
    Fatal {
        block_number: Option<u64>,
        checkpoint: Option<String>,
        #[source]
        source: Box<ScanError>,
    },
}

impl ScanError {
    /// Wrap with the last known position so the operator can inspect the checkpoint.
    pub fn at_position(self, block_number: Option<u64>, checkpoint: Option<String>) -> Self {
        match self {
            already @ Self::Fatal { .. } => already,
            other => Self::Fatal {
                block_number,
                checkpoint,
                source: Box::new(other),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_wraps_once() {
        let err = ScanError::Config("rotate_every must be > 0".into())
            .at_position(Some(10), Some("00ab".into()))
            .at_position(Some(11), None);
        match err {
            ScanError::Fatal {
                block_number,
                checkpoint,
                source,
            } => {
                assert_eq!(block_number, Some(10));
                assert_eq!(checkpoint.as_deref(), Some("00ab"));
                assert!(matches!(*source, ScanError::Config(_)));
            }
            other => panic!("expected Fatal, got {other:?}"),
        }
    }

    #[test]
    fn seek_exhausted_keeps_decode_cause() {
        use std::error::Error as _;

        let err = ScanError::SeekExhausted {
            checkpoint: "00ab".into(),
            scanned: 3,
            source: Some(DecodeError::new("bad varint")),
        };
        let cause = err.source().map(|e| e.to_string());
        assert_eq!(cause.as_deref(), Some("Block decode failed: bad varint"));

        let plain = ScanError::SeekExhausted {
            checkpoint: "00ab".into(),
            scanned: 3,
            source: None,
        };
        assert!(plain.source().is_none());
    }
}
