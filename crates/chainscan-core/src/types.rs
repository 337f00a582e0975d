//! Decoded block and transaction types shared by every stage of the scan.

use serde::{Deserialize, Serialize};

// ─── Block ────────────────────────────────────────────────────────────────────

/// A decoded block: header fields plus its transactions in block order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block hash (hex, display order).
    pub hash: String,
    /// Hash of the block this one declares as its predecessor.
    pub parent_hash: String,
    /// Unix timestamp from the header (seconds since epoch).
    pub timestamp: i64,
    /// Merkle root (hex).
    pub merkle_root: String,
    /// Transactions, coinbase first.
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Returns `true` if `self` declares `parent` as its predecessor.
    pub fn extends(&self, parent: &Block) -> bool {
        self.parent_hash == parent.hash
    }

    /// Returns `true` if `self` and `other` claim the same parent.
    pub fn is_sibling_of(&self, other: &Block) -> bool {
        self.parent_hash == other.parent_hash
    }

    /// Transactions that carry real inputs.
    pub fn non_coinbase(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.iter().filter(|tx| !tx.is_coinbase)
    }
}

// ─── Transaction ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub txid: String,
    /// Serialized size in bytes.
    pub size: u64,
    pub is_coinbase: bool,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    /// Sum of all output values, saturating at `u64::MAX`.
    pub fn total_output_value(&self) -> u64 {
        self.outputs
            .iter()
            .fold(0u64, |acc, out| acc.saturating_add(out.value))
    }
}

/// Reference to the output being spent, typically `txid:vout`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub previous_output: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    /// Locking script bytes; resolved into an address at export time.
    #[serde(with = "hex::serde")]
    pub script_pubkey: Vec<u8>,
    /// Amount in the chain's smallest unit.
    pub value: u64,
}

/// One undecoded record as read from the block store.
pub type RawBlock = Vec<u8>;

// ─── Tests ────────────────────────────────────────────────────────────────────
