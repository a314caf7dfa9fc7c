//! Content addressing and chunking.
//!
//! This crate provides [`Chunker`], which splits a byte sequence into
//! fixed-size blocks, each named by the digest of its bytes. Boundaries are
//! purely byte-count based: inserting a byte near the start of a file shifts
//! every later boundary.
//!
//! [`ChunkStream`] does the same incrementally over an `AsyncRead`, so a
//! caller never holds more than one block of a file in memory.

mod chunker;
mod error;

pub use chunker::{Chunk, ChunkStream, Chunker};
pub use error::CasError;
