//! Shared services used by the sync engine

mod autosave;
mod corpus;
mod locks;
mod queue;
mod store;

pub use autosave::AutosaveQueue;
pub use corpus::{LocalIndex, LocalLibrary};
pub use locks::KeyedLocks;
pub use queue::PendingChangeQueue;
pub use store::{CacheBatch, LocalStore};
