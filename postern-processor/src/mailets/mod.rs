//! Built-in mailets
//!
//! | Name | Parameters | Effect |
//! |---|---|---|
//! | `Null` | none | ghosts the mail |
//! | `ToProcessor` | `processor`, optional `notice` | moves the mail to another processor |
//! | `SetAttribute` | any | copies every parameter onto the mail as an attribute |
//! | `RemoveAttribute` | `name` (comma separated) | removes attributes |
//! | `LogMessage` | optional `message` | logs the mail and leaves it alone |
//! | `Bounce` | optional `message` | notifies the sender, then ghosts the mail |
//! | `Forward` | `forwardto` (comma separated) | re-injects a copy for new recipients, then ghosts the mail |
//! | `ToDeadLetter` | optional `reason` | hands the mail to the dead-letter hook, then ghosts it |

mod attribute;
mod dead_letter;
mod log;
mod notify;
mod state;

pub use attribute::{RemoveAttribute, SetAttribute};
pub use dead_letter::ToDeadLetter;
pub use log::LogMessage;
pub use notify::{Bounce, Forward};
pub use state::{Null, ToProcessor};

use crate::{Mailet, Registry};

fn boxed(mailet: impl Mailet + 'static) -> Box<dyn Mailet> {
    Box::new(mailet)
}

pub(crate) fn register(registry: &mut Registry) {
    registry
        .register_mailet("Null", |_| Ok(boxed(Null)))
        .register_mailet("ToProcessor", |p| ToProcessor::from_parameters(p).map(boxed))
        .register_mailet("SetAttribute", |p| Ok(boxed(SetAttribute::from_parameters(p))))
        .register_mailet("RemoveAttribute", |p| {
            RemoveAttribute::from_parameters(p).map(boxed)
        })
        .register_mailet("LogMessage", |p| Ok(boxed(LogMessage::from_parameters(p))))
        .register_mailet("Bounce", |p| Ok(boxed(Bounce::from_parameters(p))))
        .register_mailet("Forward", |p| Forward::from_parameters(p).map(boxed))
        .register_mailet("ToDeadLetter", |p| Ok(boxed(ToDeadLetter::from_parameters(p))));
}
