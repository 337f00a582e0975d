//! Consensus decoding of raw block records into [`chainscan_core::Block`].

use bitcoin::consensus::deserialize;

use chainscan_core::error::DecodeError;
use chainscan_core::feed::BlockDecoder;
use chainscan_core::types::{Block, RawBlock, Transaction, TxInput, TxOutput};

/// Decodes consensus-serialized Bitcoin blocks.
#[derive(Debug, Default, Clone, Copy)]
pub struct BitcoinBlockDecoder;

impl BlockDecoder for BitcoinBlockDecoder {
    fn decode(&self, raw: &RawBlock) -> Result<Block, DecodeError> {
        let block: bitcoin::Block = deserialize(raw)
            .map_err(|e| DecodeError::new(format!("{} byte block record: {e}", raw.len())))?;
        Ok(to_block(&block))
    }
}

/// Project a decoded Bitcoin block onto the chain-agnostic model.
pub fn to_block(block: &bitcoin::Block) -> Block {
    Block {
        hash: block.block_hash().to_string(),
        parent_hash: block.header.prev_blockhash.to_string(),
        timestamp: i64::from(block.header.time),
        merkle_root: block.header.merkle_root.to_string(),
        transactions: block.txdata.iter().map(to_transaction).collect(),
    }
}

fn to_transaction(tx: &bitcoin::Transaction) -> Transaction {
    Transaction {
        txid: tx.compute_txid().to_string(),
        size: tx.total_size() as u64,
        is_coinbase: tx.is_coinbase(),
        inputs: tx
            .input
            .iter()
            .map(|input| TxInput {
                previous_output: input.previous_output.to_string(),
            })
            .collect(),
        outputs: tx
            .output
            .iter()
            .map(|output| TxOutput {
                script_pubkey: output.script_pubkey.to_bytes(),
                value: output.value.to_sat(),
            })
            .collect(),
    }
}
