//! Network selection: name parsing and the block file magic for each network.

use std::str::FromStr;

use bitcoin::Network;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NetworkError {
    #[error("unknown network {0:?} (expected bitcoin, testnet, signet or regtest)")]
    Unknown(String),
}

/// Parse a network name. Accepts the `bitcoin` crate names plus the
/// `main` / `mainnet` / `test` aliases used by node configs.
pub fn parse_network(name: &str) -> Result<Network, NetworkError> {
    let normalized = name.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "main" | "mainnet" => Ok(Network::Bitcoin),
        "test" | "testnet3" => Ok(Network::Testnet),
        other => Network::from_str(other).map_err(|_| NetworkError::Unknown(name.to_string())),
    }
}

/// The four bytes that open every record in this network's `blk*.dat` files.
pub fn block_file_magic(network: Network) -> [u8; 4] {
    network.magic().to_bytes()
}
