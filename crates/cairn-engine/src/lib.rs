//! Chunk manager tying the chunker and a store together.
//!
//! The [`ChunkManager`] exposes the write / lookup / read pipeline for file
//! revisions. Writes follow a two-phase discipline: every chunk of a file is
//! durably stored before the [`FileMetadata`](cairn_types::FileMetadata) that
//! references them is committed, so a reader that can see a revision can
//! always read all of its bytes back.

pub mod error;
pub mod manager;
pub mod reader;

pub use error::EngineError;
pub use manager::{ChunkManager, ManagerConfig};
pub use reader::FileReader;

#[cfg(test)]
mod tests;
