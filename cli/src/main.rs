//! chainscan CLI: export Bitcoin Core block files to CSV, resuming where the
//! last run stopped.
//!
//! # Commands
//! ```text
//! chainscan scan       --blocks-dir <dir> [--output blocks.csv] [--checkpoint .seek.dat]
//! chainscan checkpoint show|set|reset [--checkpoint .seek.dat]
//! chainscan info       --blocks-dir <dir>
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use chainscan_bitcoin::{block_file_magic, parse_network, BlkFileFeed};

mod cmd_checkpoint;
mod cmd_scan;
mod logging;

use cmd_scan::ScanArgs;
use logging::{init_tracing, LogConfig};

#[derive(Parser)]
#[command(
    name = "chainscan",
    about = "Resumable, orphan-aware Bitcoin block file to CSV exporter",
    long_about = "
chainscan reads the raw blk*.dat files of a Bitcoin Core node, skips blocks
that lost a fork, and writes one CSV row per non-coinbase transaction. The
hash of the last exported block is kept in a checkpoint file so the next run
resumes after it.

ENVIRONMENT VARIABLES:
  CHAINSCAN_BLOCKS_DIR   Directory holding blk*.dat
  CHAINSCAN_NETWORK      bitcoin | testnet | signet | regtest
  CHAINSCAN_CHECKPOINT   Checkpoint file (default .seek.dat)
  CHAINSCAN_OUTPUT       CSV output file (default blocks.csv)
  CHAINSCAN_LOG_LEVEL    Default log level (RUST_LOG overrides)
",
    version
)]
struct Cli {
    /// Enable debug logging for chainscan crates
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Default log level
    #[arg(long, global = true, env = "CHAINSCAN_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit JSON structured logs
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the block files and export transactions
    Scan(ScanArgs),

    /// Inspect or modify the checkpoint file
    Checkpoint {
        /// Checkpoint file
        #[arg(long, env = "CHAINSCAN_CHECKPOINT", default_value = ".seek.dat")]
        checkpoint: PathBuf,

        #[command(subcommand)]
        action: CheckpointAction,
    },

    /// Show the block files and checkpoint a scan would use
    Info {
        /// Directory holding blk*.dat
        #[arg(long, env = "CHAINSCAN_BLOCKS_DIR")]
        blocks_dir: PathBuf,
        /// Network name
        #[arg(long, env = "CHAINSCAN_NETWORK", default_value = "bitcoin")]
        network: String,
        /// Checkpoint file
        #[arg(long, env = "CHAINSCAN_CHECKPOINT", default_value = ".seek.dat")]
        checkpoint: PathBuf,
    },
}

#[derive(Subcommand)]
enum CheckpointAction {
    /// Print the stored block hash
    Show,
    /// Store a block hash to resume after
    Set {
        /// 64-character block hash
        hash: String,
    },
    /// Delete the checkpoint so the next scan starts from genesis
    Reset,
}

impl Cli {
    fn log_config(&self) -> LogConfig {
        let mut config = LogConfig {
            level: self.log_level.clone(),
            json: self.log_json,
            ..LogConfig::default()
        };
        if self.verbose {
            for component in ["chainscan_core", "chainscan_bitcoin", "chainscan"] {
                config.components.insert(component.into(), "debug".into());
            }
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_config());

    match cli.command {
        Commands::Scan(args) => cmd_scan::run(args).await,

        Commands::Checkpoint { checkpoint, action } => match action {
            CheckpointAction::Show => cmd_checkpoint::show(&checkpoint),
            CheckpointAction::Set { hash } => cmd_checkpoint::set(&checkpoint, &hash),
            CheckpointAction::Reset => cmd_checkpoint::reset(&checkpoint),
        },

        Commands::Info {
            blocks_dir,
            network,
            checkpoint,
        } => cmd_info(&blocks_dir, &network, &checkpoint),
    }
}

fn cmd_info(blocks_dir: &std::path::Path, network: &str, checkpoint: &std::path::Path) -> Result<()> {
    let network = parse_network(network)?;
    let magic = block_file_magic(network);
    let feed = BlkFileFeed::open(blocks_dir, magic)
        .with_context(|| format!("opening block directory {}", blocks_dir.display()))?;

    println!("chainscan v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Network:     {network}");
    println!("Magic:       {}", hex::encode(magic));
    println!("Blocks dir:  {}", blocks_dir.display());
    println!("Block files: {}", feed.files().len());
    if let (Some(first), Some(last)) = (feed.files().first(), feed.files().last()) {
        println!("  first:     {}", first.display());
        println!("  last:      {}", last.display());
    }
    match cmd_checkpoint::load(checkpoint)? {
        Some(hash) => println!("Checkpoint:  {hash} ({})", checkpoint.display()),
        None => println!("Checkpoint:  none, next scan starts from genesis"),
    }
    Ok(())
}
