//! Lazy, single-pass reader over a committed revision.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use bytes::{Buf, Bytes};
use cairn_store::{Store, StoreError};
use cairn_types::{ChunkRef, FileMetadata};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};

use crate::error::EngineError;

type ChunkFetch = Pin<Box<dyn Future<Output = Result<Bytes, StoreError>> + Send>>;

/// Reconstructs a file by fetching its chunks in ascending offset order.
///
/// Nothing is fetched until the first read, and each chunk is fetched
/// exactly once. Chunks can be taken whole with
/// [`next_chunk`](Self::next_chunk), or the reader can be used as an
/// [`AsyncRead`] byte stream (e.g. with [`tokio::io::copy`]). A store
/// error surfaces from `poll_read` as an [`io::Error`] wrapping the
/// [`EngineError`].
pub struct FileReader {
    store: Arc<dyn Store>,
    metadata: FileMetadata,
    next: usize,
    /// Fetch in flight for `metadata.chunks[next]`.
    pending: Option<(ChunkRef, ChunkFetch)>,
    /// Unread tail of the last chunk handed to `poll_read`.
    buffered: Bytes,
}

impl FileReader {
    pub(crate) fn new(store: Arc<dyn Store>, mut metadata: FileMetadata) -> Self {
        metadata.chunks.sort_by_key(|c| c.offset);
        Self {
            store,
            metadata,
            next: 0,
            pending: None,
            buffered: Bytes::new(),
        }
    }

    /// Metadata of the revision being read.
    pub fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    /// Fetch the next chunk's bytes, or `None` after the last one.
    ///
    /// After a partial [`AsyncRead`] read, returns the unread rest of the
    /// current chunk first.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, EngineError> {
        std::future::poll_fn(|cx| self.poll_next_chunk(cx)).await
    }

    fn poll_next_chunk(
        &mut self,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<Bytes>, EngineError>> {
        if !self.buffered.is_empty() {
            return Poll::Ready(Ok(Some(std::mem::take(&mut self.buffered))));
        }

        let (chunk, mut fetch) = match self.pending.take() {
            Some(pending) => pending,
            None => {
                let Some(chunk) = self.metadata.chunks.get(self.next).copied() else {
                    return Poll::Ready(Ok(None));
                };
                let store = Arc::clone(&self.store);
                let fetch: ChunkFetch =
                    Box::pin(async move { store.get_chunk(chunk.digest).await });
                (chunk, fetch)
            }
        };

        let data = match fetch.as_mut().poll(cx) {
            Poll::Pending => {
                self.pending = Some((chunk, fetch));
                return Poll::Pending;
            }
            Poll::Ready(Err(e)) => return Poll::Ready(Err(e.into())),
            Poll::Ready(Ok(data)) => data,
        };
        if data.len() != chunk.size as usize {
            return Poll::Ready(Err(EngineError::ChunkSizeMismatch {
                offset: chunk.offset,
                expected: chunk.size,
                actual: data.len(),
            }));
        }

        self.next += 1;
        Poll::Ready(Ok(Some(data)))
    }

    /// Drain the remaining chunks into one buffer.
    pub async fn read_to_end(mut self) -> Result<Vec<u8>, EngineError> {
        let mut out = Vec::with_capacity(self.metadata.length as usize);
        while let Some(data) = self.next_chunk().await? {
            out.extend_from_slice(&data);
        }
        Ok(out)
    }

    /// Stream the remaining chunks into `writer`, returning the bytes written.
    pub async fn copy_to<W>(mut self, writer: &mut W) -> Result<u64, EngineError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut written = 0u64;
        while let Some(data) = self.next_chunk().await? {
            writer.write_all(&data).await?;
            written += data.len() as u64;
        }
        writer.flush().await?;
        Ok(written)
    }
}

impl AsyncRead for FileReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        while this.buffered.is_empty() {
            match ready!(this.poll_next_chunk(cx)) {
                Ok(Some(data)) => this.buffered = data,
                Ok(None) => return Poll::Ready(Ok(())),
                Err(e) => return Poll::Ready(Err(io::Error::other(e))),
            }
        }

        let n = buf.remaining().min(this.buffered.len());
        buf.put_slice(&this.buffered[..n]);
        this.buffered.advance(n);
        Poll::Ready(Ok(()))
    }
}
