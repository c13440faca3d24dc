use crate::core::error::ChordError;
use fixedstr::{str128, str8};
use std::cmp::Ordering;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Represents a networking address; composed of host + port
#[derive(Copy, Debug, PartialEq)]
pub struct Address {
    host: str128, // up to 128 bytes (on stack)
    port: str8,   // up to 8 bytes (on stack)
}

#[allow(useless_deprecated)]
impl Clone for Address {
    #[deprecated(note = "This type is Copy; prefer implicit copying instead of .clone()")]
    fn clone(&self) -> Self {
        *self
    }
}

impl Address {
    /// Create a new Address
    pub fn new(host: &str, port: &str) -> Address {
        Address {
            host: str128::from(host),
            port: str8::from(port),
        }
    }

    /// Get the host
    pub fn host(&self) -> &str {
        self.host.as_str()
    }

    /// Get the port
    pub fn port(&self) -> &str {
        self.port.as_str()
    }
}

impl Eq for Address {}

// Hashing and ordering go through the string views so that they agree with `PartialEq`.
impl Hash for Address {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host().hash(state);
        self.port().hash(state);
    }
}

impl Ord for Address {
    fn cmp(&self, other: &Self) -> Ordering {
        self.host()
            .cmp(other.host())
            .then_with(|| self.port().cmp(other.port()))
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The `host:port` rendering is also the input of the ring hash.
impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host(), self.port())
    }
}

impl FromStr for Address {
    type Err = ChordError;

    /// Parses `host:port`. The split happens on the last colon so bracketed IPv6 hosts survive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| ChordError::Validation(format!("address {s:?} is missing a port")))?;
        if host.is_empty() || host.len() > 127 {
            return Err(ChordError::Validation(format!(
                "address {s:?} has an invalid host"
            )));
        }
        if port.parse::<u16>().is_err() {
            return Err(ChordError::Validation(format!(
                "address {s:?} has an invalid port"
            )));
        }
        Ok(Address::new(host, port))
    }
}
