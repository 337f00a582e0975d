//! `chainscan checkpoint`: read, overwrite or clear the resumption hash.

use std::path::Path;

use anyhow::{bail, Context, Result};

use chainscan_core::checkpoint::{CheckpointStore, FileCheckpointStore};

pub fn load(path: &Path) -> Result<Option<String>> {
    FileCheckpointStore::new(path)
        .load()
        .with_context(|| format!("reading checkpoint {}", path.display()))
}

pub fn show(path: &Path) -> Result<()> {
    match load(path)? {
        Some(hash) => println!("{hash}"),
        None => println!("no checkpoint at {}", path.display()),
    }
    Ok(())
}

pub fn set(path: &Path, hash: &str) -> Result<()> {
    let hash = hash.trim().to_ascii_lowercase();
    validate_hash(&hash)?;
    FileCheckpointStore::new(path)
        .save(&hash)
        .with_context(|| format!("writing checkpoint {}", path.display()))?;
    tracing::info!(checkpoint = %hash, path = %path.display(), "Checkpoint set");
    println!("{hash}");
    Ok(())
}

pub fn reset(path: &Path) -> Result<()> {
    FileCheckpointStore::new(path)
        .delete()
        .with_context(|| format!("removing checkpoint {}", path.display()))?;
    tracing::info!(path = %path.display(), "Checkpoint reset");
    println!("checkpoint cleared, next scan starts from genesis");
    Ok(())
}

fn validate_hash(hash: &str) -> Result<()> {
    let bytes = hex::decode(hash).with_context(|| format!("{hash:?} is not hex"))?;
    if bytes.len() != 32 {
        bail!("block hash must be 32 bytes, got {}", bytes.len());
    }
    Ok(())
}
