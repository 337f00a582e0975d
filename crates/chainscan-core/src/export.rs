//! Transaction exporter: one CSV record per non-coinbase transaction.
//!
//! Every field is wrapped in `"`. Multi-valued fields separate their items
//! with `;`, and an output item is `address,value`:
//!
//! ```text
//! "txid","170","1231731025","7dac…","275","1","0437…:0","2","1Q2T…,1000000000;12cb…,4000000000","5000000000"
//! ```
//!
//! The header is written once at the start of the sink and again after every
//! [`ROTATE_EVERY`] records, so the stream stays self-describing when it is
//! split downstream.

use std::fmt::Write as _;
use std::io::Write;

use crate::error::ScanError;
use crate::feed::AddressResolver;
use crate::reconcile::BlockSink;
use crate::types::{Block, Transaction};

/// Column header line (without terminator).
pub const HEADER: &str = "id,block_number,block_time,merkle_root,tx_size,num_inputs,tx_inputs,num_outputs,tx_outputs,amount_transacted";

/// Records between header re-emissions.
pub const ROTATE_EVERY: u64 = 500_000;

/// Written in place of an address the resolver could not derive.
pub const UNRESOLVED_ADDRESS: &str = "txout_addr_decode_error";

const QUOTE: char = '"';
const FIELD_SEP: char = ',';
const ITEM_SEP: char = ';';

/// Streams transaction records to any [`Write`].
pub struct ExportWriter<W: Write, R: AddressResolver> {
    out: W,
    resolver: R,
    rotate_every: u64,
    records: u64,
    unresolved: u64,
    line: String,
}

impl<W: Write, R: AddressResolver> ExportWriter<W, R> {
    pub fn new(out: W, resolver: R) -> Self {
        Self {
            out,
            resolver,
            rotate_every: ROTATE_EVERY,
            records: 0,
            unresolved: 0,
            line: String::with_capacity(1024),
        }
    }

    /// Override the header rotation interval (must be non-zero).
    pub fn with_rotate_every(mut self, n: u64) -> Self {
        self.rotate_every = n.max(1);
        self
    }

    /// Write the initial header line.
    pub fn begin(&mut self) -> Result<(), ScanError> {
        self.out.write_all(HEADER.as_bytes())?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    /// Records written so far.
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Outputs recorded with [`UNRESOLVED_ADDRESS`] so far.
    pub fn unresolved(&self) -> u64 {
        self.unresolved
    }

    /// Export every non-coinbase transaction of `block` under `number`.
    ///
    /// All rows of the block go out in one write. If it fails, the counters
    /// are left as they were and the block counts as not written.
    pub fn write_block(&mut self, block: &Block, number: u64) -> Result<u64, ScanError> {
        self.line.clear();
        let mut written = 0;
        let mut unresolved = 0;
        for tx in block.non_coinbase() {
            unresolved += self.format_record(tx, block, number);
            written += 1;
            self.line.push('\n');
            let records = self.records + written;
            if records % self.rotate_every == 0 {
                self.line.push_str(HEADER);
                self.line.push('\n');
                tracing::info!(records, block_number = number, "Header re-emitted");
            }
        }
        if written == 0 {
            return Ok(0);
        }

        self.out.write_all(self.line.as_bytes())?;
        self.records += written;
        self.unresolved += unresolved;
        Ok(written)
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(mut self) -> Result<W, ScanError> {
        self.out.flush()?;
        Ok(self.out)
    }

    /// Append one row to the block buffer. Returns the outputs left unresolved.
    fn format_record(&mut self, tx: &Transaction, block: &Block, number: u64) -> u64 {
        let mut unresolved = 0;
        let line = &mut self.line;

        push_field(line, &tx.txid);
        push_display(line, number);
        push_display(line, block.timestamp);
        push_field(line, &block.merkle_root);
        push_display(line, tx.size);

        push_display(line, tx.inputs.len());
        line.push(QUOTE);
        for (i, input) in tx.inputs.iter().enumerate() {
            if i > 0 {
                line.push(ITEM_SEP);
            }
            line.push_str(&input.previous_output);
        }
        line.push(QUOTE);
        line.push(FIELD_SEP);

        push_display(line, tx.outputs.len());
        line.push(QUOTE);
        for (i, output) in tx.outputs.iter().enumerate() {
            if i > 0 {
                line.push(ITEM_SEP);
            }
            match self.resolver.resolve(&output.script_pubkey) {
                Some(address) => line.push_str(&address),
                None => {
                    unresolved += 1;
                    line.push_str(UNRESOLVED_ADDRESS);
                }
            }
            line.push(FIELD_SEP);
            let _ = write!(line, "{}", output.value);
        }
        line.push(QUOTE);
        line.push(FIELD_SEP);

        line.push(QUOTE);
        let _ = write!(line, "{}", tx.total_output_value());
        line.push(QUOTE);
        unresolved
    }
}

impl<W: Write, R: AddressResolver> BlockSink for ExportWriter<W, R> {
    fn accept_block(&mut self, block: &Block, number: u64) -> Result<u64, ScanError> {
        self.write_block(block, number)
    }

    fn flush(&mut self) -> Result<(), ScanError> {
        self.out.flush()?;
        Ok(())
    }
}

fn push_field(line: &mut String, value: &str) {
    line.push(QUOTE);
    line.push_str(value);
    line.push(QUOTE);
    line.push(FIELD_SEP);
}

fn push_display(line: &mut String, value: impl std::fmt::Display) {
    let _ = write!(line, "{QUOTE}{value}{QUOTE}{FIELD_SEP}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::HexScriptResolver;
    use crate::types::{TxInput, TxOutput};

    /// Outputs are `(script hex, value)`; an empty script does not resolve.
    fn tx(id: &str, coinbase: bool, inputs: &[&str], outputs: &[(&str, u64)]) -> Transaction {
        Transaction {
            txid: id.into(),
            size: 226,
            is_coinbase: coinbase,
            inputs: inputs
                .iter()
                .map(|i| TxInput {
                    previous_output: i.to_string(),
                })
                .collect(),
            outputs: outputs
                .iter()
                .map(|(script, value)| TxOutput {
                    script_pubkey: hex::decode(script).unwrap(),
                    value: *value,
                })
                .collect(),
        }
    }

    fn block(transactions: Vec<Transaction>) -> Block {
        Block {
            hash: "bb".into(),
            parent_hash: "aa".into(),
            timestamp: 1_231_731_025,
            merkle_root: "7dac".into(),
            transactions,
        }
    }

    fn export(blocks: &[(Block, u64)], rotate_every: u64) -> (String, u64) {
        let mut writer =
            ExportWriter::new(Vec::new(), HexScriptResolver).with_rotate_every(rotate_every);
        writer.begin().unwrap();
        for (b, n) in blocks {
            writer.write_block(b, *n).unwrap();
        }
        let records = writer.records();
        (String::from_utf8(writer.finish().unwrap()).unwrap(), records)
    }

    #[test]
    fn formats_record_fields() {
        let b = block(vec![tx(
            "f4184f",
            false,
            &["0437cd:0", "0437cd:1"],
            &[("ab", 1_000), ("cd", 4_000)],
        )]);
        let (out, _) = export(&[(b, 170)], ROTATE_EVERY);
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines[0], HEADER);
        assert_eq!(
            lines[1],
            r#""f4184f","170","1231731025","7dac","226","2","0437cd:0;0437cd:1","2","ab,1000;cd,4000","5000""#
        );
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn coinbase_is_never_exported() {
        let b = block(vec![
            tx("cb", true, &["0000:4294967295"], &[("51", 50)]),
            tx("t1", false, &["aa:0"], &[("51", 1)]),
            tx("t2", false, &["aa:1"], &[("51", 2)]),
        ]);
        let (out, records) = export(&[(b, 5)], ROTATE_EVERY);
        assert_eq!(records, 2);
        assert!(!out.contains("\"cb\""));
    }

    #[test]
    fn unresolved_address_uses_sentinel() {
        let b = block(vec![tx("t1", false, &["aa:0"], &[("", 7)])]);
        let mut writer = ExportWriter::new(Vec::new(), HexScriptResolver);
        writer.write_block(&b, 1).unwrap();
        assert_eq!(writer.unresolved(), 1);
        let out = String::from_utf8(writer.finish().unwrap()).unwrap();
        assert!(out.contains(r#""txout_addr_decode_error,7""#));
    }

    #[test]
    fn header_reemitted_before_record_after_rotation() {
        let txs = (0..5)
            .map(|i| tx(&format!("t{i}"), false, &["aa:0"], &[("51", 1)]))
            .collect();
        let (out, records) = export(&[(block(txs), 1)], 2);
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(records, 5);
        // header, t0, t1, header, t2, t3, header, t4
        assert_eq!(lines.len(), 8);
        assert_eq!(lines[3], HEADER);
        assert!(lines[4].starts_with("\"t2\""));
        assert_eq!(lines[6], HEADER);
        assert!(out.ends_with('\n'));
    }

    #[test]
    fn default_rotation_is_500k() {
        let b = block(vec![tx("t", false, &["aa:0"], &[("51", 1)])]);
        let mut writer = ExportWriter::new(Vec::new(), HexScriptResolver);
        for _ in 0..ROTATE_EVERY + 1 {
            writer.write_block(&b, 1).unwrap();
        }
        let out = String::from_utf8(writer.finish().unwrap()).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len() as u64, ROTATE_EVERY + 2);
        assert_eq!(lines[ROTATE_EVERY as usize], HEADER);
        assert!(lines[ROTATE_EVERY as usize + 1].starts_with("\"t\""));
    }

    /// Accepts `budget` writes, then fails every later one.
    struct FlakyWriter {
        buf: Vec<u8>,
        budget: usize,
    }

    impl Write for FlakyWriter {
        fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
            if self.budget == 0 {
                return Err(std::io::Error::other("disk full"));
            }
            self.budget -= 1;
            self.buf.extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_block_write_leaves_no_rows() {
        let first = block(vec![tx("a1", false, &["aa:0"], &[("51", 1)])]);
        let second = block(vec![
            tx("b1", false, &["aa:1"], &[("", 2)]),
            tx("b2", false, &["aa:2"], &[("51", 3)]),
        ]);
        let out = FlakyWriter {
            buf: Vec::new(),
            budget: 1,
        };
        let mut writer = ExportWriter::new(out, HexScriptResolver);

        assert_eq!(writer.write_block(&first, 1).unwrap(), 1);
        assert!(matches!(writer.write_block(&second, 2), Err(ScanError::Io(_))));
        assert_eq!(writer.records(), 1);
        assert_eq!(writer.unresolved(), 0);

        let text = String::from_utf8(writer.finish().unwrap().buf).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.starts_with("\"a1\""));
        assert!(!text.contains("\"b1\""));
    }
}
