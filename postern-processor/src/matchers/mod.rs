//! Built-in matchers
//!
//! | Name | Condition | Selects |
//! |---|---|---|
//! | `All` | none | every recipient |
//! | `RecipientIs` | address list | the listed recipients |
//! | `HostIs` | domain list | recipients at the listed domains |
//! | `SenderIs` | address list | every recipient, when the sender is listed |
//! | `SenderIsNull` | none | every recipient, when there is no sender |
//! | `HasAttribute` | `name` or `name=value` | every recipient, when the attribute is set |
//! | `HasError` | none | every recipient, when an error was recorded |

mod attribute;
mod recipient;
mod sender;

pub use attribute::{HasAttribute, HasError};
pub use recipient::{All, HostIs, RecipientIs};
pub use sender::{SenderIs, SenderIsNull};

use crate::{ConfigError, Matcher, Registry};

fn condition<'a>(name: &str, condition: Option<&'a str>) -> Result<&'a str, ConfigError> {
    condition
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ConfigError::MissingCondition {
            name: name.to_string(),
        })
}

fn boxed(matcher: impl Matcher + 'static) -> Box<dyn Matcher> {
    Box::new(matcher)
}

pub(crate) fn register(registry: &mut Registry) {
    registry
        .register_matcher("All", |_| Ok(boxed(All)))
        .register_matcher("RecipientIs", |c| {
            RecipientIs::new(condition("RecipientIs", c)?).map(boxed)
        })
        .register_matcher("HostIs", |c| Ok(boxed(HostIs::new(condition("HostIs", c)?))))
        .register_matcher("SenderIs", |c| {
            SenderIs::new(condition("SenderIs", c)?).map(boxed)
        })
        .register_matcher("SenderIsNull", |_| Ok(boxed(SenderIsNull)))
        .register_matcher("HasAttribute", |c| {
            Ok(boxed(HasAttribute::new(condition("HasAttribute", c)?)))
        })
        .register_matcher("HasError", |_| Ok(boxed(HasError)));
}
