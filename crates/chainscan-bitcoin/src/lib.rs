//! chainscan-bitcoin — Bitcoin Core block store support for chainscan.
//!
//! Supplies the three collaborators the core pipeline is generic over:
//!
//! | Trait             | Implementation            |
//! |-------------------|---------------------------|
//! | `BlockFeed`       | [`BlkFileFeed`]           |
//! | `BlockDecoder`    | [`BitcoinBlockDecoder`]   |
//! | `AddressResolver` | [`BitcoinAddressResolver`]|

pub mod address;
pub mod blk;
pub mod decoder;
pub mod network;

pub use address::BitcoinAddressResolver;
pub use blk::BlkFileFeed;
pub use decoder::{to_block, BitcoinBlockDecoder};
pub use network::{block_file_magic, parse_network, NetworkError};

pub use bitcoin::Network;
