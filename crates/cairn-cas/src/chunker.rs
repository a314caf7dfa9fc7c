//! Fixed-size chunker for splitting data into content-addressed chunks.

use bytes::Bytes;
use cairn_types::{ChunkRef, Digest, HashAlgorithm};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::CasError;

/// A single chunk of data with its content-addressed digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Ordinal position within the original stream (0, 1, 2, ...).
    pub offset: u64,
    /// Hash of `data`.
    pub digest: Digest,
    /// The raw chunk data.
    pub data: Bytes,
}

impl Chunk {
    /// The metadata entry describing this chunk.
    pub fn to_ref(&self) -> ChunkRef {
        ChunkRef {
            offset: self.offset,
            digest: self.digest,
            size: self.data.len() as u32,
        }
    }
}

/// Fixed-size chunker that splits data into chunks of a configured size.
///
/// The last chunk may be smaller than `chunk_size`.
/// Empty data produces zero chunks.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: u32,
    hash: HashAlgorithm,
}

impl Chunker {
    /// Create a new chunker. A zero chunk size is rejected.
    pub fn new(chunk_size: u32, hash: HashAlgorithm) -> Result<Self, CasError> {
        if chunk_size == 0 {
            return Err(CasError::InvalidChunkSize(chunk_size));
        }
        Ok(Self { chunk_size, hash })
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    pub fn hash(&self) -> HashAlgorithm {
        self.hash
    }

    /// Split an in-memory buffer into fixed-size chunks.
    #[cfg(test)]
    fn chunk(&self, data: &[u8]) -> Vec<Chunk> {
        data.chunks(self.chunk_size as usize)
            .enumerate()
            .map(|(i, slice)| Chunk {
                offset: i as u64,
                digest: self.hash.digest(slice),
                data: Bytes::copy_from_slice(slice),
            })
            .collect()
    }

    /// Chunk an async reader incrementally.
    pub fn stream<R: AsyncRead + Unpin>(&self, reader: R) -> ChunkStream<R> {
        ChunkStream {
            reader,
            chunker: *self,
            next_offset: 0,
            done: false,
        }
    }

    /// Split data from an async reader into fixed-size chunks.
    ///
    /// Reads the entire stream, producing chunks as it goes.
    #[cfg(test)]
    async fn chunk_stream(
        &self,
        reader: impl AsyncRead + Unpin,
    ) -> Result<Vec<Chunk>, CasError> {
        let mut stream = self.stream(reader);
        let mut chunks = Vec::new();
        while let Some(chunk) = stream.next_chunk().await? {
            chunks.push(chunk);
        }
        Ok(chunks)
    }
}

/// Incremental chunking over an [`AsyncRead`].
pub struct ChunkStream<R> {
    reader: R,
    chunker: Chunker,
    next_offset: u64,
    done: bool,
}

impl<R: AsyncRead + Unpin> ChunkStream<R> {
    /// Read the next block. Returns `None` once the stream is exhausted.
    ///
    /// Short reads from the underlying reader are retried until either a
    /// full block is collected or EOF is reached, so only the final block
    /// can be shorter than the chunk size.
    pub async fn next_chunk(&mut self) -> Result<Option<Chunk>, CasError> {
        if self.done {
            return Ok(None);
        }

        let chunk_size = self.chunker.chunk_size as usize;
        let mut buf = vec![0u8; chunk_size];
        let mut filled = 0;

        while filled < chunk_size {
            let n = self.reader.read(&mut buf[filled..]).await?;
            if n == 0 {
                self.done = true;
                break;
            }
            filled += n;
        }

        if filled == 0 {
            return Ok(None);
        }

        buf.truncate(filled);
        let chunk = Chunk {
            offset: self.next_offset,
            digest: self.chunker.hash.digest(&buf),
            data: Bytes::from(buf),
        };
        self.next_offset += 1;
        Ok(Some(chunk))
    }
}
