//! Policy traversal order.

use serde::{Deserialize, Serialize};

/// The order in which a chain walks its policy list.
///
/// The order is fixed when a chain is constructed. Request-direction chains
/// conventionally run [`Traversal::Forward`]; response-direction chains run
/// [`Traversal::Reverse`] so that the policy closest to the client sees the
/// response last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Traversal {
    /// Walk policies in insertion order.
    Forward,
    /// Walk policies from last to first.
    Reverse,
}

impl Traversal {
    /// Returns the traversal name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Reverse => "reverse",
        }
    }
}

impl std::fmt::Display for Traversal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&Traversal::Reverse).unwrap();
        assert_eq!(json, "\"reverse\"");

        let parsed: Traversal = serde_json::from_str("\"forward\"").unwrap();
        assert_eq!(parsed, Traversal::Forward);
    }

    #[test]
    fn test_display() {
        assert_eq!(Traversal::Forward.to_string(), "forward");
        assert_eq!(Traversal::Reverse.to_string(), "reverse");
    }
}
