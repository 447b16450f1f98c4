pub mod backends;
pub mod config;
pub mod error;
pub mod queue;
pub mod record;
pub mod r#trait;

pub use backends::{FileBackingStore, FileBackingStoreBuilder, MemoryBackingStore};
pub use config::{MemoryConfig, QueueConfig, SpoolConfig};
pub use error::{Result, SerializationError, SpoolError, ValidationError};
pub use queue::{ClaimGuard, ClaimedMail, MailQueue};
pub use record::{SpoolEntry, SpoolRecord};
pub use r#trait::BackingStore;
