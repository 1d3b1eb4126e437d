use serde::Serialize;
use std::fmt;

use crate::model::BackendKey;

/// Whether a query targets one backend or all of them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeMode {
    Single,
    Federated,
}

impl fmt::Display for ScopeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeMode::Single => f.write_str("single"),
            ScopeMode::Federated => f.write_str("federated"),
        }
    }
}

/// Backend and establishment restriction applied to every query
///
/// Derived from identity and the admin establishment filter; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopeContext {
    pub mode: ScopeMode,
    pub backend: Option<BackendKey>,
    pub establishment_id: Option<String>,
}

impl ScopeContext {
    /// All backends, no establishment restriction
    pub fn federated() -> Self {
        Self {
            mode: ScopeMode::Federated,
            backend: None,
            establishment_id: None,
        }
    }

    /// One backend, optionally restricted to an establishment
    pub fn single(backend: BackendKey, establishment_id: Option<String>) -> Self {
        Self {
            mode: ScopeMode::Single,
            backend: Some(backend),
            establishment_id,
        }
    }

    /// Single mode with nothing resolvable; an assignment step must run first
    pub fn unassigned() -> Self {
        Self {
            mode: ScopeMode::Single,
            backend: None,
            establishment_id: None,
        }
    }

    pub fn is_federated(&self) -> bool {
        self.mode == ScopeMode::Federated
    }

    pub fn needs_assignment(&self) -> bool {
        self.mode == ScopeMode::Single && self.backend.is_none()
    }

    /// Backends this scope reads from, in registry order
    pub fn backends(&self) -> Vec<BackendKey> {
        match (self.mode, self.backend) {
            (ScopeMode::Federated, _) => BackendKey::ALL.to_vec(),
            (ScopeMode::Single, Some(key)) => vec![key],
            (ScopeMode::Single, None) => Vec::new(),
        }
    }
}

impl Default for ScopeContext {
    fn default() -> Self {
        Self::unassigned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backends_per_mode() {
        assert_eq!(ScopeContext::federated().backends(), BackendKey::ALL.to_vec());
        assert_eq!(
            ScopeContext::single(BackendKey::Secondary, None).backends(),
            vec![BackendKey::Secondary]
        );
        assert!(ScopeContext::unassigned().backends().is_empty());
        assert!(ScopeContext::unassigned().needs_assignment());
        assert!(!ScopeContext::federated().needs_assignment());
    }
}
