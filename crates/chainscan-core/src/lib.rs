//! chainscan-core — resumable, orphan-aware block scanning and transaction export.
//!
//! # Architecture
//!
//! ```text
//! Pipeline
//!   ├── CheckpointManager  (load / save the resumption hash)
//!   ├── SeekEngine         (replay the store up to the checkpoint)
//!   ├── ChainReconciler    (number canonical blocks, skip orphans)
//!   │      └── advance()   (fetch → decode → classify, also used by the seek)
//!   └── BlockSink          (ExportWriter: one CSV record per transaction)
//!
//! BlockFeed / BlockDecoder / AddressResolver are supplied by a chain crate.
//! ```

pub mod checkpoint;
pub mod classify;
pub mod config;
pub mod cursor;
pub mod error;
pub mod export;
pub mod feed;
pub mod pipeline;
pub mod reconcile;
pub mod seek;
pub mod types;

pub use checkpoint::{CheckpointManager, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
pub use classify::{advance, classify, fetch, Accepted, Advance, Fetched};
pub use config::{ScanConfig, ScanConfigBuilder};
pub use cursor::ScanState;
pub use error::{DecodeError, FeedError, ScanError};
pub use export::ExportWriter;
pub use feed::{AddressResolver, BlockDecoder, BlockFeed};
pub use pipeline::{Pipeline, RunReport};
pub use reconcile::{BlockSink, ChainReconciler, Termination};
pub use seek::{SeekEngine, SeekOutcome};
pub use types::{Block, RawBlock, Transaction, TxInput, TxOutput};
