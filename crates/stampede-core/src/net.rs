//! Net labels: the caller-side names for electrical connection points.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A named connection point. Device posts wired to equal nets share a node.
///
/// The names `"0"` and `"gnd"` (any case) denote the ground reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Net(String);

impl Net {
    /// Create a net from a label.
    pub fn new(name: impl Into<String>) -> Self {
        Net(name.into())
    }

    /// The ground net.
    pub fn ground() -> Self {
        Net("gnd".to_string())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn is_ground(&self) -> bool {
        self.0 == "0" || self.0.eq_ignore_ascii_case("gnd")
    }
}

impl fmt::Display for Net {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Net {
    fn from(name: &str) -> Self {
        Net::new(name)
    }
}

impl From<String> for Net {
    fn from(name: String) -> Self {
        Net(name)
    }
}

impl From<&Net> for Net {
    fn from(net: &Net) -> Self {
        net.clone()
    }
}

impl From<u32> for Net {
    fn from(n: u32) -> Self {
        Net(n.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ground_aliases() {
        assert!(Net::ground().is_ground());
        assert!(Net::from("0").is_ground());
        assert!(Net::from("GND").is_ground());
        assert!(Net::from(0u32).is_ground());
        assert!(!Net::from("out").is_ground());
        assert!(!Net::from(10u32).is_ground());
    }

    #[test]
    fn test_display_and_name() {
        assert_eq!(Net::from("vcc").to_string(), "vcc");
        assert_eq!(Net::from(3u32).name(), "3");
    }
}
