//! Mailbox addresses
//!
//! Addresses are stored as a local part and a [`Domain`]. Domains compare
//! case-insensitively (they are normalised to lowercase on construction),
//! local parts are kept verbatim.

use std::{
    fmt::{self, Display},
    ops::Deref,
    str::FromStr,
    sync::Arc,
};

use serde::{Deserialize, Serialize};

use crate::error::AddressError;

const MAX_LOCAL_PART: usize = 64;
const MAX_DOMAIN: usize = 255;

/// A domain name, normalised to lowercase
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Domain(Arc<str>);

impl Domain {
    #[must_use]
    pub fn new(s: impl AsRef<str>) -> Self {
        Self(Arc::from(s.as_ref().to_ascii_lowercase()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(&self) -> Result<(), AddressError> {
        let valid = !self.0.is_empty()
            && self.0.len() <= MAX_DOMAIN
            && self
                .0
                .split('.')
                .all(|label| !label.is_empty() && label.bytes().all(is_domain_byte));

        // Address literals such as `[192.0.2.1]` are passed through untouched.
        let literal = self.0.starts_with('[') && self.0.ends_with(']');

        if valid || literal {
            Ok(())
        } else {
            Err(AddressError::InvalidDomain(self.0.to_string()))
        }
    }
}

const fn is_domain_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

impl Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Deref for Domain {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for Domain {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Domain {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Domain {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// A single mailbox: `local-part@domain`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address {
    local_part: Arc<str>,
    domain: Domain,
}

impl Address {
    /// Build an address from already separated parts
    ///
    /// # Errors
    /// If either part is empty or malformed
    pub fn new(local_part: &str, domain: &str) -> Result<Self, AddressError> {
        if local_part.is_empty() || local_part.len() > MAX_LOCAL_PART {
            return Err(AddressError::InvalidLocalPart(local_part.to_string()));
        }

        let domain = Domain::new(domain);
        domain.validate()?;

        Ok(Self {
            local_part: Arc::from(local_part),
            domain,
        })
    }

    #[must_use]
    pub fn local_part(&self) -> &str {
        &self.local_part
    }

    #[must_use]
    pub const fn domain(&self) -> &Domain {
        &self.domain
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local_part, self.domain)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    /// Accepts bare mailboxes (`a@x`), angle-bracketed paths (`<a@x>`) and
    /// header style mailboxes (`Alice <a@x>`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AddressError::Empty);
        }

        let parsed = mailparse::addrparse(s).map_err(|e| AddressError::Parse(e.to_string()))?;
        let addr = match parsed.first() {
            Some(mailparse::MailAddr::Single(single)) if parsed.len() == 1 => single.addr.clone(),
            _ => return Err(AddressError::NotSingle(s.to_string())),
        };

        let (local_part, domain) = addr
            .rsplit_once('@')
            .ok_or_else(|| AddressError::MissingAtSign(addr.clone()))?;

        Self::new(local_part, domain)
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl TryFrom<&str> for Address {
    type Error = AddressError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_parse_forms() {
        let bare: Address = "alice@example.com".parse().expect("bare address");
        let angled: Address = "<alice@example.com>".parse().expect("angled address");
        let named: Address = "Alice <alice@EXAMPLE.com>".parse().expect("named address");

        assert_eq!(bare, angled);
        assert_eq!(bare, named);
        assert_eq!(bare.local_part(), "alice");
        assert_eq!(bare.domain().as_str(), "example.com");
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!("".parse::<Address>(), Err(AddressError::Empty));
        assert!(matches!(
            "postmaster".parse::<Address>(),
            Err(AddressError::MissingAtSign(_) | AddressError::Parse(_))
        ));
        assert!("a@x, b@y".parse::<Address>().is_err());
        assert!(Address::new("a", "bad domain").is_err());
        assert!(Address::new("", "example.com").is_err());
    }

    #[test]
    fn test_address_literal_domain() {
        let addr = Address::new("root", "[192.0.2.1]").expect("literal domain");
        assert_eq!(addr.to_string(), "root@[192.0.2.1]");
    }

    #[test]
    fn test_serde_as_string() {
        let addr: Address = "a@x".parse().expect("address");
        let ron = ron::to_string(&addr).expect("serialize");
        assert_eq!(ron, "\"a@x\"");

        let back: Address = ron::from_str(&ron).expect("deserialize");
        assert_eq!(back, addr);
    }
}
