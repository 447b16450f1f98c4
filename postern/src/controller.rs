use std::sync::{Arc, LazyLock};

use postern_common::{Address, Signal, internal, logging};
use postern_manager::{ManagerConfig, QueueContext, SpoolManager};
use postern_processor::{ConfigError, ProcessorDescriptor, ProcessorRouter, Registry};
use postern_spool::{MailQueue, QueueConfig, SpoolConfig};
use postern_tracing::traced;
use serde::Deserialize;
use tokio::sync::broadcast;

/// Everything a running postern needs, as read from `postern.config.ron`
#[derive(Debug, Default, Deserialize)]
pub struct Postern {
    #[serde(default)]
    spool: SpoolConfig,
    #[serde(default)]
    queue: QueueConfig,
    #[serde(default)]
    manager: ManagerConfig,
    /// Sender shown on notifications such as bounces
    #[serde(default)]
    postmaster: Option<Address>,
    /// Where mail that is given up on is kept; logged and dropped when absent
    #[serde(default, alias = "dead_letters")]
    dead_letter: Option<SpoolConfig>,
    #[serde(alias = "processor", default)]
    processors: Vec<ProcessorDescriptor>,
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

/// Wait for CTRL+C or SIGTERM and broadcast a shutdown; a second CTRL+C
/// returns, forcing the process down without waiting for the grace period.
#[traced(instrument(level = tracing::Level::TRACE))]
async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!("CTRL+C entered -- Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!("Terminate Signal received, shutting down");
        }
    };

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    tokio::signal::ctrl_c().await?;
    internal!(level = WARN, "Forcing shutdown");

    Ok(())
}

impl Postern {
    /// Resolve the configured processors against `registry`
    ///
    /// # Errors
    /// If a matcher or mailet is unknown or rejects its parameters, or the
    /// processors do not form a valid router
    pub fn router(&self, registry: &Registry) -> Result<ProcessorRouter, ConfigError> {
        registry.router(&self.processors, self.manager.max_dispatches)
    }

    /// Open the spool and build a manager over it, without starting it
    ///
    /// # Errors
    /// If a spool cannot be opened or the processors cannot be resolved
    pub fn build(self, registry: &Registry) -> anyhow::Result<SpoolManager> {
        let router = Arc::new(self.router(registry)?);

        let store = self.spool.into_backing_store()?;
        let queue = Arc::new(MailQueue::new(store, self.queue));

        let dead_letters = self
            .dead_letter
            .map(SpoolConfig::into_backing_store)
            .transpose()?;

        let context = QueueContext::new(queue.clone())
            .with_postmaster(self.postmaster)
            .with_dead_letters(dead_letters);

        Ok(SpoolManager::with_context(
            queue,
            router,
            Arc::new(context),
            self.manager,
        ))
    }

    /// Run the spool manager until shutdown
    ///
    /// # Errors
    ///
    /// This function will return an error if the spool cannot be opened or
    /// the processor configuration is invalid.
    #[traced(instrument(level = tracing::Level::TRACE, skip_all, err), timing(precision = "s"))]
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();

        let manager = self.build(&Registry::with_builtins())?;

        internal!("Controller running");

        let ret = tokio::select! {
            r = manager.serve(SHUTDOWN_BROADCAST.subscribe()) => {
                r.map_err(anyhow::Error::from)
            }
            r = shutdown() => {
                r
            }
        };

        internal!("Shutting down...");

        ret
    }
}
