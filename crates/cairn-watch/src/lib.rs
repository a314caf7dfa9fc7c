//! Filesystem discovery for cairn.
//!
//! [`FsWatcher`] walks a tree once at startup and then follows live change
//! notifications for the same tree, handing every regular file it finds to
//! a single consumer through [`Discoveries`]. Each handoff is a rendezvous:
//! producers wait until the consumer has taken the event.

pub mod error;
pub mod filter;
mod handoff;
pub mod watcher;

pub use error::WatchError;
pub use filter::ExcludeSet;
pub use watcher::{Discoveries, FileDiscovery, FsWatcher, WatchConfig};
