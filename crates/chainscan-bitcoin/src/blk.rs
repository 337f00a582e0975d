//! Raw block feed over Bitcoin Core `blk*.dat` files.
//!
//! Each file is a sequence of records:
//!
//! ```text
//! ┌──────────┬─────────────┬──────────────────────┐
//! │ magic(4) │ len(u32 LE) │ consensus block(len) │  …repeated
//! └──────────┴─────────────┴──────────────────────┘
//! ```
//!
//! Files are pre-allocated, so a zeroed magic marks the unused tail and the
//! feed moves to the next file. Records come out in the order the node wrote
//! them, which is not chain order. If the directory holds an `xor.dat` key
//! the file contents are de-obfuscated while reading.

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use chainscan_core::error::FeedError;
use chainscan_core::feed::BlockFeed;
use chainscan_core::types::RawBlock;

const XOR_KEY_FILE: &str = "xor.dat";
const XOR_KEY_LEN: usize = 8;
/// Larger than any valid block; a bigger length means a corrupt header.
const MAX_RECORD_LEN: u32 = 32 * 1024 * 1024;

/// Forward-only reader over every `blkNNNNN.dat` in a directory.
pub struct BlkFileFeed {
    files: Vec<PathBuf>,
    next_file: usize,
    current: Option<BlkReader>,
    magic: [u8; 4],
    xor_key: Option<[u8; XOR_KEY_LEN]>,
}

impl BlkFileFeed {
    /// Open `dir` and list its block files in numeric order.
    pub fn open(dir: impl AsRef<Path>, magic: [u8; 4]) -> Result<Self, FeedError> {
        let dir = dir.as_ref();
        let mut numbered = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if let Some(n) = blk_file_number(&path) {
                numbered.push((n, path));
            }
        }
        numbered.sort_by_key(|(n, _)| *n);
        let files: Vec<PathBuf> = numbered.into_iter().map(|(_, p)| p).collect();

        let xor_key = read_xor_key(&dir.join(XOR_KEY_FILE))?;
        tracing::info!(
            dir = %dir.display(),
            files = files.len(),
            obfuscated = xor_key.is_some(),
            "Opened block store"
        );

        Ok(Self {
            files,
            next_file: 0,
            current: None,
            magic,
            xor_key,
        })
    }

    /// Block files found, in read order.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    fn open_next_file(&mut self) -> Result<bool, FeedError> {
        let Some(path) = self.files.get(self.next_file).cloned() else {
            return Ok(false);
        };
        self.next_file += 1;
        tracing::debug!(file = %path.display(), "Reading block file");
        let file = File::open(&path)?;
        self.current = Some(BlkReader {
            name: path.display().to_string(),
            reader: BufReader::with_capacity(1 << 20, file),
            offset: 0,
            xor_key: self.xor_key,
        });
        Ok(true)
    }
}

impl BlockFeed for BlkFileFeed {
    fn fetch_next(&mut self) -> Result<Option<RawBlock>, FeedError> {
        loop {
            if self.current.is_none() && !self.open_next_file()? {
                return Ok(None);
            }
            let Some(reader) = self.current.as_mut() else {
                return Ok(None);
            };
            match reader.next_record(self.magic)? {
                Some(raw) => return Ok(Some(raw)),
                None => self.current = None,
            }
        }
    }
}

struct BlkReader {
    name: String,
    reader: BufReader<File>,
    offset: u64,
    xor_key: Option<[u8; XOR_KEY_LEN]>,
}

impl BlkReader {
    /// Next record, or `None` at end of file / start of the zeroed tail.
    fn next_record(&mut self, magic: [u8; 4]) -> Result<Option<RawBlock>, FeedError> {
        let start = self.offset;
        let mut header = [0u8; 8];
        let got = self.read_full(&mut header)?;
        if got == 0 {
            return Ok(None);
        }
        if header[..4] == [0u8; 4] {
            return Ok(None);
        }
        if got < header.len() {
            return Err(self.truncated(start, header.len() as u64));
        }
        if header[..4] != magic {
            return Err(FeedError::BadMagic {
                file: self.name.clone(),
                offset: start,
                found: hex::encode(&header[..4]),
            });
        }

        let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        if len > MAX_RECORD_LEN {
            return Err(FeedError::Other(format!(
                "record length {len} in {} at offset {start} exceeds {MAX_RECORD_LEN}",
                self.name
            )));
        }
        let mut raw = vec![0u8; len as usize];
        if self.read_full(&mut raw)? < raw.len() {
            return Err(self.truncated(start, len as u64 + 8));
        }
        Ok(Some(raw))
    }

    /// Fill `buf` as far as the file allows; returns the bytes read.
    fn read_full(&mut self, buf: &mut [u8]) -> Result<usize, FeedError> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(FeedError::Io(e)),
            }
        }
        if let Some(key) = self.xor_key {
            for (i, byte) in buf[..filled].iter_mut().enumerate() {
                *byte ^= key[((self.offset + i as u64) % XOR_KEY_LEN as u64) as usize];
            }
        }
        self.offset += filled as u64;
        Ok(filled)
    }

    fn truncated(&self, offset: u64, wanted: u64) -> FeedError {
        FeedError::Truncated {
            file: self.name.clone(),
            offset,
            wanted,
        }
    }
}

/// `blk00042.dat` → `Some(42)`.
fn blk_file_number(path: &Path) -> Option<u32> {
    let name = path.file_name()?.to_str()?;
    let digits = name.strip_prefix("blk")?.strip_suffix(".dat")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn read_xor_key(path: &Path) -> Result<Option<[u8; XOR_KEY_LEN]>, FeedError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(FeedError::Io(e)),
    };
    let key: [u8; XOR_KEY_LEN] = bytes.as_slice().try_into().map_err(|_| {
        FeedError::Other(format!(
            "{} must hold {XOR_KEY_LEN} bytes, found {}",
            path.display(),
            bytes.len()
        ))
    })?;
    // An all-zero key means the store is not obfuscated.
    Ok((key != [0u8; XOR_KEY_LEN]).then_some(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MAGIC: [u8; 4] = [0xf9, 0xbe, 0xb4, 0xd9];

    fn record(payload: &[u8]) -> Vec<u8> {
        let mut out = MAGIC.to_vec();
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn write_file(dir: &Path, name: &str, bytes: &[u8]) {
        let mut f = File::create(dir.join(name)).unwrap();
        f.write_all(bytes).unwrap();
    }

    fn drain(feed: &mut BlkFileFeed) -> Vec<RawBlock> {
        let mut out = vec![];
        while let Some(raw) = feed.fetch_next().unwrap() {
            out.push(raw);
        }
        out
    }

    #[test]
    fn file_number_parsing() {
        assert_eq!(blk_file_number(Path::new("/x/blk00000.dat")), Some(0));
        assert_eq!(blk_file_number(Path::new("blk01234.dat")), Some(1234));
        assert_eq!(blk_file_number(Path::new("rev00000.dat")), None);
        assert_eq!(blk_file_number(Path::new("blk.dat")), None);
        assert_eq!(blk_file_number(Path::new("blkabc.dat")), None);
    }

    #[test]
    fn reads_files_in_numeric_order_and_skips_padding() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = record(b"one");
        first.extend(record(b"two"));
        first.extend([0u8; 64]); // pre-allocated tail
        write_file(dir.path(), "blk00000.dat", &first);
        write_file(dir.path(), "blk00001.dat", &record(b"three"));
        write_file(dir.path(), "rev00000.dat", b"ignored");

        let mut feed = BlkFileFeed::open(dir.path(), MAGIC).unwrap();
        assert_eq!(feed.files().len(), 2);
        assert_eq!(
            drain(&mut feed),
            vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]
        );
        assert!(feed.fetch_next().unwrap().is_none());
    }

    #[test]
    fn wrong_magic_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = record(b"x");
        bytes[0] = 0x0b;
        write_file(dir.path(), "blk00000.dat", &bytes);

        let mut feed = BlkFileFeed::open(dir.path(), MAGIC).unwrap();
        assert!(matches!(feed.fetch_next(), Err(FeedError::BadMagic { offset: 0, .. })));
    }

    #[test]
    fn truncated_record_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = record(b"abcdef");
        bytes.truncate(bytes.len() - 2);
        write_file(dir.path(), "blk00000.dat", &bytes);

        let mut feed = BlkFileFeed::open(dir.path(), MAGIC).unwrap();
        assert!(matches!(feed.fetch_next(), Err(FeedError::Truncated { wanted: 14, .. })));
    }

    #[test]
    fn xor_obfuscated_store() {
        let dir = tempfile::tempdir().unwrap();
        let key = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let mut bytes = record(b"hello");
        bytes.extend(record(b"world!"));
        for (i, b) in bytes.iter_mut().enumerate() {
            *b ^= key[i % 8];
        }
        write_file(dir.path(), "blk00000.dat", &bytes);
        write_file(dir.path(), XOR_KEY_FILE, &key);

        let mut feed = BlkFileFeed::open(dir.path(), MAGIC).unwrap();
        assert_eq!(drain(&mut feed), vec![b"hello".to_vec(), b"world!".to_vec()]);
    }

    #[test]
    fn empty_directory_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut feed = BlkFileFeed::open(dir.path(), MAGIC).unwrap();
        assert!(feed.fetch_next().unwrap().is_none());
    }

    #[test]
    fn missing_directory_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        assert!(BlkFileFeed::open(dir.path().join("nope"), MAGIC).is_err());
    }
}
