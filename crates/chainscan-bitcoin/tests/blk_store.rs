//! Scans a synthetic `blocks/` directory of consensus-encoded blocks.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use bitcoin::absolute::LockTime;
use bitcoin::block::{Header, Version as BlockVersion};
use bitcoin::consensus::serialize;
use bitcoin::hashes::Hash;
use bitcoin::pow::CompactTarget;
use bitcoin::transaction::Version;
use bitcoin::{
    Address, Amount, Block, BlockHash, Network, OutPoint, ScriptBuf, Sequence, Transaction, TxIn,
    TxMerkleNode, TxOut, Txid, Witness,
};

use chainscan_bitcoin::{block_file_magic, BitcoinAddressResolver, BitcoinBlockDecoder, BlkFileFeed};
use chainscan_core::checkpoint::{CheckpointManager, MemoryCheckpointStore};
use chainscan_core::export::{ExportWriter, HEADER};
use chainscan_core::reconcile::ChainReconciler;
use chainscan_core::seek::SeekEngine;
use chainscan_core::Pipeline;

const P2WPKH: &str = "0014751e76e8199196d454941c45d1b3a323f1433bd6";

fn tx_in(previous_output: OutPoint, script_sig: ScriptBuf) -> TxIn {
    TxIn {
        previous_output,
        script_sig,
        sequence: Sequence::MAX,
        witness: Witness::new(),
    }
}

fn coinbase(tag: u8) -> Transaction {
    Transaction {
        version: Version::ONE,
        lock_time: LockTime::ZERO,
        input: vec![tx_in(OutPoint::null(), ScriptBuf::from_bytes(vec![0x01, tag]))],
        output: vec![TxOut {
            value: Amount::from_sat(5_000_000_000),
            script_pubkey: ScriptBuf::from_bytes(hex::decode(P2WPKH).unwrap()),
        }],
    }
}

fn spend(tag: u8) -> Transaction {
    let prev = OutPoint {
        txid: Txid::from_slice(&[tag; 32]).unwrap(),
        vout: 1,
    };
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![tx_in(prev, ScriptBuf::new())],
        output: vec![
            TxOut {
                value: Amount::from_sat(7_000),
                script_pubkey: ScriptBuf::from_bytes(hex::decode(P2WPKH).unwrap()),
            },
            TxOut {
                value: Amount::from_sat(0),
                script_pubkey: ScriptBuf::from_bytes(vec![0x6a]),
            },
        ],
    }
}

fn block(prev: BlockHash, tag: u8) -> Block {
    Block {
        header: Header {
            version: BlockVersion::TWO,
            prev_blockhash: prev,
            merkle_root: TxMerkleNode::all_zeros(),
            time: 1_600_000_000 + u32::from(tag),
            bits: CompactTarget::from_consensus(0x207f_ffff),
            nonce: u32::from(tag),
        },
        txdata: vec![coinbase(tag), spend(tag)],
    }
}

fn write_blk(dir: &Path, name: &str, blocks: &[&Block]) {
    let magic = block_file_magic(Network::Regtest);
    let mut f = File::create(dir.join(name)).unwrap();
    for b in blocks {
        let raw = serialize(*b);
        f.write_all(&magic).unwrap();
        f.write_all(&(raw.len() as u32).to_le_bytes()).unwrap();
        f.write_all(&raw).unwrap();
    }
    f.write_all(&[0u8; 32]).unwrap();
}

fn scan(dir: &Path, store: &MemoryCheckpointStore) -> Vec<String> {
    let mut feed = BlkFileFeed::open(dir, block_file_magic(Network::Regtest)).unwrap();
    let mut sink = ExportWriter::new(Vec::new(), BitcoinAddressResolver::new(Network::Regtest));
    sink.begin().unwrap();
    Pipeline::new(
        CheckpointManager::new(Box::new(store.clone())),
        SeekEngine::default(),
        ChainReconciler::new(None, 100),
    )
    .run(&mut feed, &BitcoinBlockDecoder, &mut sink)
    .unwrap();
    String::from_utf8(sink.finish().unwrap())
        .unwrap()
        .lines()
        .filter(|l| *l != HEADER)
        .map(str::to_string)
        .collect()
}

#[test]
fn orphaned_block_across_files_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let g = block(BlockHash::all_zeros(), 0);
    let b1 = block(g.block_hash(), 1);
    let b1_stale = block(g.block_hash(), 2);
    let b2 = block(b1.block_hash(), 3);

    write_blk(dir.path(), "blk00000.dat", &[&g, &b1_stale]);
    write_blk(dir.path(), "blk00001.dat", &[&b1, &b2]);

    let store = MemoryCheckpointStore::new();
    let rows = scan(dir.path(), &store);

    let exported: Vec<String> = [&g, &b1, &b2]
        .iter()
        .map(|b| b.txdata[1].compute_txid().to_string())
        .collect();
    assert_eq!(rows.len(), 3);
    for (i, (row, txid)) in rows.iter().zip(&exported).enumerate() {
        assert!(row.starts_with(&format!("\"{txid}\",\"{i}\",")), "row {i}: {row}");
    }
    let stale = b1_stale.txdata[1].compute_txid().to_string();
    assert!(rows.iter().all(|r| !r.contains(&stale)));
    assert_eq!(store.get(), Some(b2.block_hash().to_string()));
}

#[test]
fn rows_carry_regtest_addresses_and_sentinel() {
    let dir = tempfile::tempdir().unwrap();
    let g = block(BlockHash::all_zeros(), 0);
    write_blk(dir.path(), "blk00000.dat", &[&g]);

    let rows = scan(dir.path(), &MemoryCheckpointStore::new());
    assert_eq!(rows.len(), 1);
    let script = ScriptBuf::from_bytes(hex::decode(P2WPKH).unwrap());
    let address = Address::from_script(&script, Network::Regtest).unwrap();
    assert!(address.to_string().starts_with("bcrt1q"));
    assert!(rows[0].contains(&format!("\"{address},7000;txout_addr_decode_error,0\"")));
    assert!(rows[0].ends_with("\"7000\""));
}

#[test]
fn second_scan_resumes_from_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let g = block(BlockHash::all_zeros(), 0);
    let b1 = block(g.block_hash(), 1);
    write_blk(dir.path(), "blk00000.dat", &[&g, &b1]);

    let store = MemoryCheckpointStore::new();
    assert_eq!(scan(dir.path(), &store).len(), 2);

    let b2 = block(b1.block_hash(), 2);
    write_blk(dir.path(), "blk00001.dat", &[&b2]);
    let rows = scan(dir.path(), &store);
    assert_eq!(rows.len(), 1);
    assert!(rows[0].contains(&format!("\",\"2\",\"{}\",", 1_600_000_002)));
}
