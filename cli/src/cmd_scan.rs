//! `chainscan scan`: one resumable export run.
//!
//! Settings come from an optional JSON config file, overridden by flags and
//! `CHAINSCAN_*` variables. The scan itself is synchronous and runs on a
//! blocking thread; Ctrl-C raises the stop flag so the run ends after the
//! current block and still saves its checkpoint.

use std::fs::{File, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use chainscan_bitcoin::{
    block_file_magic, parse_network, BitcoinAddressResolver, BitcoinBlockDecoder, BlkFileFeed,
    Network,
};
use chainscan_core::{ExportWriter, Pipeline, RunReport, ScanConfig, ScanConfigBuilder};

#[derive(Args, Debug, Default)]
pub struct ScanArgs {
    /// JSON config file; flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory holding blk*.dat
    #[arg(long, env = "CHAINSCAN_BLOCKS_DIR")]
    pub blocks_dir: Option<PathBuf>,

    /// bitcoin | testnet | signet | regtest
    #[arg(long, env = "CHAINSCAN_NETWORK")]
    pub network: Option<String>,

    /// Checkpoint file
    #[arg(long, env = "CHAINSCAN_CHECKPOINT")]
    pub checkpoint: Option<PathBuf>,

    /// CSV output file
    #[arg(short, long, env = "CHAINSCAN_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Append to the output file instead of truncating it
    #[arg(long)]
    pub append: bool,

    /// Repeat the CSV header every N records
    #[arg(long)]
    pub rotate_every: Option<u64>,

    /// Stop after fetching N records past the checkpoint
    #[arg(long)]
    pub max_records: Option<u64>,

    /// Log progress every N blocks
    #[arg(long)]
    pub progress_every: Option<u64>,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

impl ScanArgs {
    /// Merge the config file (if any) with the flags.
    pub fn resolve(&self) -> Result<ScanConfig> {
        let base = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            None => ScanConfig::default(),
        };

        let mut builder = ScanConfigBuilder::from_config(base);
        if let Some(dir) = &self.blocks_dir {
            builder = builder.blocks_dir(dir);
        }
        if let Some(network) = &self.network {
            builder = builder.network(network);
        }
        if let Some(path) = &self.checkpoint {
            builder = builder.checkpoint_path(path);
        }
        if let Some(path) = &self.output {
            builder = builder.output_path(path);
        }
        if self.append {
            builder = builder.append(true);
        }
        if let Some(n) = self.rotate_every {
            builder = builder.rotate_every(n);
        }
        if let Some(n) = self.max_records {
            builder = builder.max_records(n);
        }
        if let Some(n) = self.progress_every {
            builder = builder.progress_every(n);
        }

        let config = builder.build_config();
        config.validate()?;
        Ok(config)
    }
}

pub async fn run(args: ScanArgs) -> Result<()> {
    let config = args.resolve()?;
    let network = parse_network(&config.network)?;

    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current block");
            flag.store(true, Ordering::SeqCst);
        }
    });

    let report = tokio::task::spawn_blocking(move || scan(&config, network, stop))
        .await
        .context("scan task panicked")??;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn scan(config: &ScanConfig, network: Network, stop: Arc<AtomicBool>) -> Result<RunReport> {
    let mut feed = BlkFileFeed::open(&config.blocks_dir, block_file_magic(network))
        .with_context(|| format!("opening block directory {}", config.blocks_dir.display()))?;

    let (out, fresh) = open_output(&config.output_path, config.append)?;
    let mut sink = ExportWriter::new(out, BitcoinAddressResolver::new(network))
        .with_rotate_every(config.rotate_every);
    if fresh {
        sink.begin()?;
    }

    let pipeline = Pipeline::from_config(config, Some(stop))?;
    let report = pipeline.run(&mut feed, &BitcoinBlockDecoder, &mut sink)?;
    if sink.unresolved() > 0 {
        tracing::debug!(outputs = sink.unresolved(), "Outputs without an address form");
    }
    sink.finish()
        .with_context(|| format!("closing {}", config.output_path.display()))?;
    Ok(report)
}

/// Open the CSV output. Returns whether the header still has to be written,
/// which is the case unless appending to a file that already has content.
fn open_output(path: &Path, append: bool) -> Result<(BufWriter<File>, bool)> {
    let file = if append {
        OpenOptions::new().create(true).append(true).open(path)
    } else {
        File::create(path)
    }
    .with_context(|| format!("opening output {}", path.display()))?;

    let existing = file
        .metadata()
        .with_context(|| format!("reading metadata of {}", path.display()))?
        .len();
    Ok((BufWriter::with_capacity(1 << 20, file), existing == 0))
}

fn print_report(report: &RunReport) {
    let elapsed = report.finished_at - report.started_at;
    println!("Scan finished: {}", report.termination);
    println!(
        "  checkpoint:   {} -> {}",
        report.start_checkpoint.as_deref().unwrap_or("genesis"),
        report.end_checkpoint.as_deref().unwrap_or("genesis"),
    );
    match (report.first_block, report.last_block) {
        (Some(first), Some(last)) => println!("  blocks:       {first}..={last}"),
        (None, Some(last)) => println!("  blocks:       none new (tip {last})"),
        _ => println!("  blocks:       none"),
    }
    println!("  exported:     {} blocks, {} transactions", report.blocks_exported, report.transactions_exported);
    println!("  orphans:      {}", report.orphans_skipped);
    println!("  records:      {} scanned, {} replayed by seek", report.records_scanned, report.records_skipped);
    println!("  elapsed:      {:.1}s", elapsed.num_milliseconds() as f64 / 1000.0);
}
