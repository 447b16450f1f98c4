pub mod address;
pub mod error;
pub mod logging;
pub mod mail;
pub mod state;

pub use address::{Address, Domain};
pub use error::{AddressError, ContentError};
pub use mail::{Attributes, Content, Mail, MailBuilder, MailId};
pub use state::State;
pub use tracing;

/// Process-wide lifecycle signal, broadcast to every long-running component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
    Finalised,
}
