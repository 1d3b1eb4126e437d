//! Establishments and the composite token used to select one

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{Result, TrackError};
use crate::model::BackendKey;

/// Separator between backend key and establishment id in a token
pub const TOKEN_SEPARATOR: char = '-';

/// Wire form of the "no restriction" establishment filter
pub const FILTER_ALL: &str = "all";

/// A physical site, bound to exactly one backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstablishmentRef {
    pub id: String,
    pub name: String,
    pub backend: BackendKey,
}

impl EstablishmentRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>, backend: BackendKey) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            backend,
        }
    }

    /// Composite token selecting this establishment
    pub fn token(&self) -> EstablishmentToken {
        EstablishmentToken::new(self.backend, self.id.clone())
    }
}

/// Composite `"<backendKey>-<establishmentId>"` selection token
///
/// Only the first separator splits; establishment ids may contain `-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EstablishmentToken {
    backend: BackendKey,
    establishment_id: String,
}

impl EstablishmentToken {
    pub fn new(backend: BackendKey, establishment_id: impl Into<String>) -> Self {
        Self {
            backend,
            establishment_id: establishment_id.into(),
        }
    }

    /// Parse a composite token
    ///
    /// # Errors
    ///
    /// Returns `InvalidEstablishmentToken` when the separator is missing, the
    /// backend key is unknown, or the id is empty.
    pub fn parse(token: &str) -> Result<Self> {
        let invalid = || TrackError::InvalidEstablishmentToken {
            token: token.to_string(),
        };

        let (key, id) = token.split_once(TOKEN_SEPARATOR).ok_or_else(invalid)?;
        let backend = BackendKey::parse(key).ok_or_else(invalid)?;
        if id.is_empty() {
            return Err(invalid());
        }

        Ok(Self::new(backend, id))
    }

    pub fn backend(&self) -> BackendKey {
        self.backend
    }

    pub fn establishment_id(&self) -> &str {
        &self.establishment_id
    }
}

impl fmt::Display for EstablishmentToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.backend, TOKEN_SEPARATOR, self.establishment_id
        )
    }
}

/// Establishment restriction chosen by an administrator
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EstablishmentFilter {
    /// Federated view across every establishment
    #[default]
    All,
    Specific(EstablishmentToken),
}

impl EstablishmentFilter {
    /// Parse the UI control value: `"all"` (or empty) or a composite token
    ///
    /// # Errors
    ///
    /// Returns `InvalidEstablishmentToken` for a malformed token.
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.is_empty() || value == FILTER_ALL {
            return Ok(EstablishmentFilter::All);
        }
        EstablishmentToken::parse(value).map(EstablishmentFilter::Specific)
    }

    pub fn is_all(&self) -> bool {
        matches!(self, EstablishmentFilter::All)
    }

    pub fn token(&self) -> Option<&EstablishmentToken> {
        match self {
            EstablishmentFilter::All => None,
            EstablishmentFilter::Specific(token) => Some(token),
        }
    }
}

impl fmt::Display for EstablishmentFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EstablishmentFilter::All => f.write_str(FILTER_ALL),
            EstablishmentFilter::Specific(token) => write!(f, "{}", token),
        }
    }
}
