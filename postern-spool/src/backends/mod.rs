//! Backing store implementations for the mail queue
//!
//! - `memory`: in-memory storage for tests and transient deployments
//! - `file`: one directory on disk, used in production

pub mod file;
pub mod memory;

pub use file::{FileBackingStore, FileBackingStoreBuilder};
pub use memory::MemoryBackingStore;
