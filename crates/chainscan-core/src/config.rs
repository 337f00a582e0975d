//! Scan configuration and its fluent builder.
//!
//! # Example
//!
//! ```rust
//! use chainscan_core::config::ScanConfigBuilder;
//!
//! let config = ScanConfigBuilder::new()
//!     .blocks_dir("/data/bitcoin/blocks")
//!     .checkpoint_path(".seek.dat")
//!     .output_path("blocks.csv")
//!     .max_records(1_000_000)
//!     .build_config();
//! assert_eq!(config.rotate_every, 500_000);
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ScanError;
use crate::export::ROTATE_EVERY;

/// Configuration for one scanner instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Directory holding the raw `blk*.dat` files.
    pub blocks_dir: PathBuf,
    /// Network name: `bitcoin`, `testnet`, `signet` or `regtest`.
    pub network: String,
    /// File holding the resumption hash.
    pub checkpoint_path: PathBuf,
    /// CSV output file.
    pub output_path: PathBuf,
    /// Append to an existing output file instead of truncating it.
    pub append: bool,
    /// Re-emit the CSV header every N records.
    pub rotate_every: u64,
    /// Safety ceiling on records fetched after the seek. `None` = no ceiling.
    pub max_records: Option<u64>,
    /// Log progress every N blocks.
    pub progress_every: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            blocks_dir: PathBuf::from("blocks"),
            network: "bitcoin".into(),
            checkpoint_path: PathBuf::from(".seek.dat"),
            output_path: PathBuf::from("blocks.csv"),
            append: false,
            rotate_every: ROTATE_EVERY,
            max_records: None,
            progress_every: 1_000,
        }
    }
}

impl ScanConfig {
    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ScanError> {
        if self.rotate_every == 0 {
            return Err(ScanError::Config("rotate_every must be greater than 0".into()));
        }
        if self.progress_every == 0 {
            return Err(ScanError::Config("progress_every must be greater than 0".into()));
        }
        if self.max_records == Some(0) {
            return Err(ScanError::Config("max_records must be greater than 0 when set".into()));
        }
        Ok(())
    }
}

/// Fluent builder for [`ScanConfig`].
#[derive(Default)]
pub struct ScanConfigBuilder {
    config: ScanConfig,
}

impl ScanConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ScanConfig::default(),
        }
    }

    /// Start from an existing config (e.g. one loaded from a file).
    pub fn from_config(config: ScanConfig) -> Self {
        Self { config }
    }

    pub fn blocks_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.blocks_dir = dir.into();
        self
    }

    pub fn network(mut self, network: impl Into<String>) -> Self {
        self.config.network = network.into();
        self
    }

    pub fn checkpoint_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.checkpoint_path = path.into();
        self
    }

    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output_path = path.into();
        self
    }

    pub fn append(mut self, append: bool) -> Self {
        self.config.append = append;
        self
    }

    pub fn rotate_every(mut self, n: u64) -> Self {
        self.config.rotate_every = n;
        self
    }

    pub fn max_records(mut self, n: u64) -> Self {
        self.config.max_records = Some(n);
        self
    }

    pub fn progress_every(mut self, n: u64) -> Self {
        self.config.progress_every = n;
        self
    }

    pub fn build_config(self) -> ScanConfig {
        self.config
    }
}
