//! Chunk and revision-metadata storage for cairn.
//!
//! This crate defines the [`Store`] trait, the pluggability seam every
//! backend implements, along with:
//!
//! - [`MemoryStore`]: reference in-memory backend behind a single `RwLock`.
//! - [`FileStore`]: durable on-disk backend with a 2-level fan-out chunk layout
//!   and an atomically rewritten revision log per file.
//! - [`FaultyStore`]: wrapper that injects chunk-write failures, for testing
//!   the chunks-before-metadata commit order.

mod error;
mod faulty_store;
mod file_store;
mod memory_store;
mod traits;

pub use error::StoreError;
pub use faulty_store::FaultyStore;
pub use file_store::FileStore;
pub use memory_store::MemoryStore;
pub use traits::Store;
