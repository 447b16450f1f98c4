//! Routing state tags
//!
//! Every [`Mail`](crate::Mail) carries a [`State`]: either the name of the
//! processor it should visit next, or the terminal tag [`State::GHOST`].

use std::{
    borrow::Borrow,
    fmt::{self, Display},
    ops::Deref,
    sync::Arc,
};

use serde::{Deserialize, Serialize};

/// A routing tag selecting the next processor for a mail
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State(Arc<str>);

impl State {
    /// Initial state assigned to freshly injected mail
    pub const ROOT: &'static str = "root";

    /// State of mail that failed processing, and the gate for deferred retries
    pub const ERROR: &'static str = "error";

    /// Terminal state; mail in this state is disposed
    pub const GHOST: &'static str = "ghost";

    #[must_use]
    pub fn new(s: impl Into<Arc<str>>) -> Self {
        Self(s.into())
    }

    #[must_use]
    pub fn root() -> Self {
        Self::new(Self::ROOT)
    }

    #[must_use]
    pub fn error() -> Self {
        Self::new(Self::ERROR)
    }

    #[must_use]
    pub fn ghost() -> Self {
        Self::new(Self::GHOST)
    }

    #[must_use]
    pub fn is_ghost(&self) -> bool {
        &*self.0 == Self::GHOST
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        &*self.0 == Self::ERROR
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for State {
    fn default() -> Self {
        Self::root()
    }
}

impl Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Deref for State {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Borrow<str> for State {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for State {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for State {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for State {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

impl From<&str> for State {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for State {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_well_known_states() {
        assert!(State::ghost().is_ghost());
        assert!(State::error().is_error());
        assert_eq!(State::default(), State::root());
        assert!(!State::from("transport").is_ghost());
    }

    #[test]
    fn test_lookup_by_str() {
        let mut map = HashMap::new();
        map.insert(State::from("transport"), 1);

        assert_eq!(map.get("transport"), Some(&1));
        assert_eq!(State::from("transport"), "transport");
    }
}
