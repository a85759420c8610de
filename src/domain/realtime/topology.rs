//! Subscription topologies for event fanout.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::ValidationError;

/// How subscribers are addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    /// One connection per key; a new subscriber replaces the old one.
    Single,
    /// A set of connections per key.
    Grouped,
    /// One flat, unkeyed collection.
    Set,
}

impl Topology {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topology::Single => "single",
            Topology::Grouped => "grouped",
            Topology::Set => "set",
        }
    }

    /// Returns true if subscribers of this topology are addressed by key.
    pub fn is_keyed(&self) -> bool {
        !matches!(self, Topology::Set)
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Topology {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(Topology::Single),
            "grouped" => Ok(Topology::Grouped),
            "set" => Ok(Topology::Set),
            other => Err(ValidationError::invalid_format(
                "topology",
                format!("unknown topology '{}'", other),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_topologies() {
        assert_eq!("single".parse::<Topology>().unwrap(), Topology::Single);
        assert_eq!("grouped".parse::<Topology>().unwrap(), Topology::Grouped);
        assert_eq!("set".parse::<Topology>().unwrap(), Topology::Set);
    }

    #[test]
    fn rejects_unknown_topology() {
        assert!("broadcast".parse::<Topology>().is_err());
    }

    #[test]
    fn only_set_is_unkeyed() {
        assert!(Topology::Single.is_keyed());
        assert!(Topology::Grouped.is_keyed());
        assert!(!Topology::Set.is_keyed());
    }
}
