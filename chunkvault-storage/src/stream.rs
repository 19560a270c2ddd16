//! Chunk sources
//!
//! A [`ChunkSource`] yields the chunks of one input in order. Two sources
//! exist: [`StreamChunker`] reads an async byte stream through a pair of
//! read-ahead buffers, and [`SliceChunker`] walks an in-memory buffer (used
//! for memory-mapped files). For identical bytes both produce identical
//! chunks.

use bytes::{Bytes, BytesMut};
use chunkvault_core::chunk::Span;
use chunkvault_core::chunker::{ChunkCutter, SliceChunker};
use chunkvault_core::config::ChunkerConfig;
use chunkvault_core::error::Result;
use std::future::Future;
use tokio::io::{AsyncRead, AsyncReadExt};

/// One chunk cut from an input: its position and its bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChunk {
    pub span: Span,
    pub data: Bytes,
}

/// Ordered producer of chunks
pub trait ChunkSource {
    /// Next chunk, or `None` once the input is exhausted
    fn next_chunk(&mut self) -> impl Future<Output = Result<Option<RawChunk>>> + Send;
}

/// Content-defined chunker over an async reader.
///
/// Keeps the current buffer plus one buffer of read-ahead, each filled with
/// exactly `lookahead` bytes unless the stream ends. When the read-ahead
/// buffer comes back empty the current buffer is the last one, and rolling
/// checksum cuts are suppressed inside it.
pub struct StreamChunker<R> {
    reader: R,
    cutter: ChunkCutter,
    lookahead: usize,
    current: Vec<u8>,
    ahead: Vec<u8>,
    pos: usize,
    pending: BytesMut,
    offset: u64,
    primed: bool,
    eof: bool,
}

impl<R: AsyncRead + Unpin + Send> StreamChunker<R> {
    pub fn new(reader: R, config: &ChunkerConfig) -> Self {
        Self {
            reader,
            cutter: ChunkCutter::new(config),
            lookahead: config.lookahead,
            current: Vec::with_capacity(config.lookahead),
            ahead: Vec::with_capacity(config.lookahead),
            pos: 0,
            pending: BytesMut::with_capacity(config.max_size),
            offset: 0,
            primed: false,
            eof: false,
        }
    }

    /// Total bytes handed out as chunks so far
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Fill `buf` with up to `lookahead` bytes. Short only at end of stream.
    async fn fill(reader: &mut R, buf: &mut Vec<u8>, lookahead: usize, eof: &mut bool) -> Result<()> {
        buf.clear();
        if *eof {
            return Ok(());
        }
        buf.resize(lookahead, 0);

        let mut filled = 0;
        while filled < lookahead {
            let n = reader.read(&mut buf[filled..]).await?;
            if n == 0 {
                *eof = true;
                break;
            }
            filled += n;
        }

        buf.truncate(filled);
        Ok(())
    }

    fn emit(&mut self) -> RawChunk {
        let data = self.pending.split().freeze();
        let from = self.offset;
        self.offset += data.len() as u64;
        RawChunk {
            span: Span::new(from, self.offset),
            data,
        }
    }

    /// Read the next chunk from the stream
    pub async fn read_chunk(&mut self) -> Result<Option<RawChunk>> {
        if !self.primed {
            self.primed = true;
            Self::fill(&mut self.reader, &mut self.current, self.lookahead, &mut self.eof).await?;
            Self::fill(&mut self.reader, &mut self.ahead, self.lookahead, &mut self.eof).await?;
        }

        loop {
            if self.pos == self.current.len() {
                if self.ahead.is_empty() {
                    if self.pending.is_empty() {
                        return Ok(None);
                    }
                    return Ok(Some(self.emit()));
                }

                std::mem::swap(&mut self.current, &mut self.ahead);
                self.pos = 0;
                Self::fill(&mut self.reader, &mut self.ahead, self.lookahead, &mut self.eof).await?;
                continue;
            }

            let in_tail = self.ahead.is_empty();
            let rest = &self.current[self.pos..];
            match self.cutter.find_cut(rest, in_tail) {
                Some(n) => {
                    self.pending.extend_from_slice(&rest[..n]);
                    self.pos += n;
                    return Ok(Some(self.emit()));
                }
                None => {
                    self.pending.extend_from_slice(rest);
                    self.pos = self.current.len();
                }
            }
        }
    }
}

impl<R: AsyncRead + Unpin + Send> ChunkSource for StreamChunker<R> {
    fn next_chunk(&mut self) -> impl Future<Output = Result<Option<RawChunk>>> + Send {
        self.read_chunk()
    }
}

impl<T: AsRef<[u8]> + Send> ChunkSource for SliceChunker<T> {
    fn next_chunk(&mut self) -> impl Future<Output = Result<Option<RawChunk>>> + Send {
        let chunk = self.next().map(|span| RawChunk {
            span,
            data: Bytes::copy_from_slice(self.slice(span)),
        });
        async move { Ok(chunk) }
    }
}
