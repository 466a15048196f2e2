//! Block-caching `Read + Seek` adapter over ranged reads.

use std::collections::HashMap;
use std::io::{self, Read, Seek, SeekFrom};

/// Default block size for remote range requests (512 KiB).
pub const DEFAULT_BLOCK_SIZE: usize = 512 * 1024;

/// Default maximum number of blocks kept in memory per open object.
const DEFAULT_MAX_BLOCKS: usize = 64;

/// A source of bytes addressable by absolute offset.
pub trait RangeSource {
    /// Total size in bytes.
    fn size(&self) -> u64;

    /// Read `len` bytes starting at `offset`. May return fewer bytes only at end of object.
    fn read_range(&mut self, offset: u64, len: usize) -> io::Result<Vec<u8>>;
}

/// Adapts a [`RangeSource`] to `Read + Seek`, fetching fixed-size blocks on demand.
///
/// TIFF decoders seek back and forth between the header, the offset tables and
/// the tiles they need; blocks are kept in a small LRU so those revisits do
/// not trigger new requests.
#[derive(Debug)]
pub struct BlockReader<S> {
    source: S,
    position: u64,
    block_size: usize,
    /// Loaded blocks indexed by block number.
    blocks: HashMap<u64, Vec<u8>>,
    /// Access order for LRU eviction (most recently used at the back).
    access_order: Vec<u64>,
    max_blocks: usize,
}

impl<S: RangeSource> BlockReader<S> {
    /// Wrap a source with the default block size.
    pub fn new(source: S) -> Self {
        Self::with_block_size(source, DEFAULT_BLOCK_SIZE)
    }

    /// Wrap a source with an explicit block size.
    pub fn with_block_size(source: S, block_size: usize) -> Self {
        Self {
            source,
            position: 0,
            block_size: block_size.max(1),
            blocks: HashMap::new(),
            access_order: Vec::new(),
            max_blocks: DEFAULT_MAX_BLOCKS,
        }
    }

    /// The wrapped source.
    pub fn source(&self) -> &S {
        &self.source
    }

    fn touch(&mut self, index: u64) {
        if let Some(pos) = self.access_order.iter().position(|k| *k == index) {
            self.access_order.remove(pos);
            self.access_order.push(index);
        }
    }

    fn load_block(&mut self, index: u64) -> io::Result<()> {
        if self.blocks.contains_key(&index) {
            self.touch(index);
            return Ok(());
        }

        let offset = index * self.block_size as u64;
        let len = (self.source.size() - offset).min(self.block_size as u64) as usize;
        let data = self.source.read_range(offset, len)?;
        if data.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("empty range read at offset {offset}"),
            ));
        }

        while self.blocks.len() >= self.max_blocks && !self.access_order.is_empty() {
            let oldest = self.access_order.remove(0);
            self.blocks.remove(&oldest);
        }
        self.blocks.insert(index, data);
        self.access_order.push(index);
        Ok(())
    }
}

impl<S: RangeSource> Read for BlockReader<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.position >= self.source.size() {
            return Ok(0);
        }

        let index = self.position / self.block_size as u64;
        self.load_block(index)?;

        let Some(block) = self.blocks.get(&index) else {
            return Ok(0);
        };
        let start = (self.position % self.block_size as u64) as usize;
        if start >= block.len() {
            return Ok(0);
        }
        let n = buf.len().min(block.len() - start);
        buf[..n].copy_from_slice(&block[start..start + n]);
        self.position += n as u64;
        Ok(n)
    }
}

impl<S: RangeSource> Seek for BlockReader<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.source.size().checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        };
        match target {
            Some(position) => {
                self.position = position;
                Ok(position)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MemorySource {
        data: Vec<u8>,
        requests: usize,
    }

    impl RangeSource for MemorySource {
        fn size(&self) -> u64 {
            self.data.len() as u64
        }

        fn read_range(&mut self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
            self.requests += 1;
            let start = offset as usize;
            let end = (start + len).min(self.data.len());
            Ok(self.data[start..end].to_vec())
        }
    }

    fn reader(len: usize, block_size: usize) -> BlockReader<MemorySource> {
        let data = (0..len).map(|i| (i % 251) as u8).collect();
        BlockReader::with_block_size(MemorySource { data, requests: 0 }, block_size)
    }

    #[test]
    fn test_read_across_blocks() {
        let mut r = reader(100, 16);
        let mut buf = Vec::new();
        r.read_to_end(&mut buf).unwrap();
        assert_eq!(buf.len(), 100);
        assert_eq!(buf[99], 99);
        assert_eq!(r.source().requests, 7);
    }

    #[test]
    fn test_seek_and_read() {
        let mut r = reader(100, 16);
        r.seek(SeekFrom::Start(40)).unwrap();
        let mut buf = [0u8; 4];
        r.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [40, 41, 42, 43]);

        r.seek(SeekFrom::End(-2)).unwrap();
        let mut tail = Vec::new();
        r.read_to_end(&mut tail).unwrap();
        assert_eq!(tail, vec![98, 99]);

        assert!(r.seek(SeekFrom::Current(-1000)).is_err());
    }

    #[test]
    fn test_revisited_blocks_are_cached() {
        let mut r = reader(64, 16);
        let mut buf = [0u8; 8];
        for _ in 0..5 {
            r.seek(SeekFrom::Start(0)).unwrap();
            r.read_exact(&mut buf).unwrap();
        }
        assert_eq!(r.source().requests, 1);
    }
}
