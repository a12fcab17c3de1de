//! Client source identifier.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// The 32-bit value a client stamps on every packet so devices can address
/// their replies back to it. Written as exactly 8 hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Source(u32);

impl Source {
    /// Create a source from its raw value.
    pub fn new(value: u32) -> Self {
        Source(value)
    }

    /// Pick a random, non-zero source.
    pub fn random() -> Self {
        // zero asks devices to broadcast their replies
        Source(rand::random::<u32>().max(1))
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl FromStr for Source {
    type Err = Error;

    /// # Examples
    ///
    /// ```
    /// use lifx_lan_client::Source;
    ///
    /// let source: Source = "12345678".parse().unwrap();
    /// assert_eq!(source.to_string(), "12345678");
    /// assert!("Test".parse::<Source>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 8 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::range(format!(
                "source must be exactly 8 hex characters, got {s:?}"
            )));
        }
        u32::from_str_radix(s, 16)
            .map(Source)
            .map_err(|e| Error::range(e.to_string()))
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

impl TryFrom<String> for Source {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Source> for String {
    fn from(source: Source) -> Self {
        source.to_string()
    }
}
