//! Error types for the postern-manager crate.

use postern_processor::ConfigError;
use postern_spool::SpoolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("Spool error: {0}")]
    Spool(#[from] SpoolError),

    #[error("Processor configuration error: {0}")]
    Config(#[from] ConfigError),

    /// `start` was called on a manager that is already running.
    #[error("Spool manager is already running")]
    AlreadyRunning,
}

pub type Result<T> = std::result::Result<T, ManagerError>;
