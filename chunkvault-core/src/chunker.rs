//! Content-defined chunk cutting.
//!
//! [`ChunkCutter`] decides where chunks end. It is fed bytes and never does
//! I/O itself; [`SliceChunker`] drives it over an in-memory slice and the
//! storage crate drives it over an async reader. Both use the same
//! end-of-stream rule so they cut identical spans for identical bytes.
//!
//! Policy, applied after every byte:
//! - a chunk that reaches `max_size` is always cut;
//! - a rolling-checksum boundary cuts only once the chunk is above
//!   `min_size`;
//! - inside the final read-ahead window of the stream, rolling-checksum
//!   boundaries are ignored so the tail merges into the last chunk;
//! - whatever remains at end of stream is the final chunk, however small.

use crate::chunk::Span;
use crate::config::ChunkerConfig;
use crate::rollsum::RollSum;

/// Offset at which the final read-ahead window of a `len`-byte stream begins.
///
/// Readers fill `lookahead`-sized buffers back to back, so the last fill
/// starts at the greatest multiple of `lookahead` below `len`.
pub fn tail_window_start(len: u64, lookahead: usize) -> u64 {
    if len == 0 {
        return 0;
    }
    let lookahead = lookahead as u64;
    ((len - 1) / lookahead) * lookahead
}

/// Chunk boundary state machine
#[derive(Clone)]
pub struct ChunkCutter {
    rollsum: RollSum,
    pending: usize,
    min_size: usize,
    max_size: usize,
}

impl ChunkCutter {
    pub fn new(config: &ChunkerConfig) -> Self {
        Self {
            rollsum: RollSum::with_blob_bits(config.blob_bits),
            pending: 0,
            min_size: config.min_size,
            max_size: config.max_size,
        }
    }

    /// Feed one byte. Returns true if the current chunk ends after it.
    #[inline]
    pub fn feed(&mut self, byte: u8, in_tail: bool) -> bool {
        self.pending += 1;
        let on_split = self.rollsum.roll(byte);
        let cut = self.pending >= self.max_size
            || (on_split && !in_tail && self.pending > self.min_size);
        if cut {
            self.pending = 0;
        }
        cut
    }

    /// Feed bytes until the first cut. Returns how many bytes were consumed
    /// when a cut happened (the cut falls right after the last of them), or
    /// `None` if all of `buf` went into the pending chunk.
    pub fn find_cut(&mut self, buf: &[u8], in_tail: bool) -> Option<usize> {
        for (i, &byte) in buf.iter().enumerate() {
            if self.feed(byte, in_tail) {
                return Some(i + 1);
            }
        }
        None
    }

    /// Bytes accumulated since the last cut
    pub fn pending(&self) -> usize {
        self.pending
    }
}

/// Iterator over the chunk spans of an in-memory buffer.
///
/// Works over borrowed slices or owned buffers such as a memory map.
pub struct SliceChunker<T> {
    data: T,
    cutter: ChunkCutter,
    start: usize,
    tail_start: usize,
}

impl<T: AsRef<[u8]>> SliceChunker<T> {
    pub fn new(data: T, config: &ChunkerConfig) -> Self {
        let len = data.as_ref().len() as u64;
        Self {
            data,
            cutter: ChunkCutter::new(config),
            start: 0,
            tail_start: tail_window_start(len, config.lookahead) as usize,
        }
    }

    /// Borrow the bytes covered by a span this chunker produced
    pub fn slice(&self, span: Span) -> &[u8] {
        &self.data.as_ref()[span.range()]
    }
}

impl<T: AsRef<[u8]>> Iterator for SliceChunker<T> {
    type Item = Span;

    fn next(&mut self) -> Option<Span> {
        let data = self.data.as_ref();
        if self.start >= data.len() {
            return None;
        }
        let from = self.start;
        let mut pos = from;

        if pos < self.tail_start {
            if let Some(n) = self.cutter.find_cut(&data[pos..self.tail_start], false) {
                self.start = pos + n;
                return Some(Span::new(from as u64, self.start as u64));
            }
            pos = self.tail_start;
        }

        self.start = match self.cutter.find_cut(&data[pos..], true) {
            Some(n) => pos + n,
            None => data.len(),
        };
        Some(Span::new(from as u64, self.start as u64))
    }
}
