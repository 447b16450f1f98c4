pub mod config;
pub mod context;
pub mod error;
pub mod manager;
pub mod stats;

pub use config::ManagerConfig;
pub use context::QueueContext;
pub use error::{ManagerError, Result};
pub use manager::SpoolManager;
pub use stats::{ManagerStats, StatsSnapshot};
