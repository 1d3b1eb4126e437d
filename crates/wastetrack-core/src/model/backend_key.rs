use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one configured backend project
///
/// The wire form (`"primary"`, `"secondary"`) is what appears in
/// establishment tokens and configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKey {
    Primary,
    Secondary,
}

impl BackendKey {
    /// All keys in registry order
    pub const ALL: [BackendKey; 2] = [BackendKey::Primary, BackendKey::Secondary];

    /// Wire form of the key
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKey::Primary => "primary",
            BackendKey::Secondary => "secondary",
        }
    }

    /// Parse the wire form; `None` for anything unrecognized
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "primary" => Some(BackendKey::Primary),
            "secondary" => Some(BackendKey::Secondary),
            _ => None,
        }
    }

    pub fn is_primary(&self) -> bool {
        matches!(self, BackendKey::Primary)
    }
}

impl fmt::Display for BackendKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_and_unknown_keys() {
        assert_eq!(BackendKey::parse("primary"), Some(BackendKey::Primary));
        assert_eq!(BackendKey::parse("secondary"), Some(BackendKey::Secondary));
        assert_eq!(BackendKey::parse("Primary"), None);
        assert_eq!(BackendKey::parse(""), None);
    }

    #[test]
    fn test_serde_uses_wire_form() {
        let json = serde_json::to_string(&BackendKey::Secondary).unwrap();
        assert_eq!(json, "\"secondary\"");
    }
}
