pub mod error;
pub mod mailet;
pub mod mailets;
pub mod matcher;
pub mod matchers;
pub mod processor;
pub mod registry;
pub mod router;

pub use error::{ConfigError, MailetError, MatcherError, ProcessorError};
pub use mailet::{Mailet, MailetContext, MockContext};
pub use matcher::Matcher;
pub use processor::{Processor, Serviced};
pub use registry::{Parameters, ProcessorDescriptor, Registry, StepDescriptor};
pub use router::{Outcome, ProcessorRouter, RouteReport, Routed, RouterBuilder};
