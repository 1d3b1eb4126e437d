//! Deployment configuration
//!
//! Describes the configured backends, engine limits and table descriptor
//! overrides. Loaded from TOML; `DeploymentConfig::default()` is the
//! standard SST/HPL deployment.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::errors::{Result, TrackError};
use crate::model::{BackendKey, EstablishmentRef};
use crate::tables::{TableConfig, TableRegistry};

/// Rows per request used by full-table fetches
pub const DEFAULT_FETCH_WINDOW: usize = 1000;

/// Largest page a list view may request
pub const DEFAULT_MAX_PAGE_SIZE: usize = 500;

/// How federated queries paginate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FederatedPaging {
    /// Each backend contributes its own page window; no cross-backend re-sort
    #[default]
    PerBackend,
    /// Fetch up to `cap` rows per backend, merge-sort, then slice the page
    Global { cap: usize },
}

/// The single establishment of a backend without multi-establishment support
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoleEstablishment {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub key: BackendKey,
    pub display_name: String,
    /// Marker in free-text role names that assigns users to this backend
    #[serde(default)]
    pub role_marker: Option<String>,
    #[serde(default)]
    pub sole_establishment: Option<SoleEstablishment>,
}

impl BackendConfig {
    pub fn new(key: BackendKey, display_name: impl Into<String>) -> Self {
        Self {
            key,
            display_name: display_name.into(),
            role_marker: None,
            sole_establishment: None,
        }
    }

    /// The sole establishment as a reference bound to this backend
    pub fn sole_establishment_ref(&self) -> Option<EstablishmentRef> {
        self.sole_establishment
            .as_ref()
            .map(|e| EstablishmentRef::new(e.id.clone(), e.name.clone(), self.key))
    }

    /// True if `role` carries this backend's marker (case-insensitive)
    pub fn role_matches(&self, role: &str) -> bool {
        self.role_marker.as_deref().is_some_and(|marker| {
            !marker.is_empty() && role.to_ascii_lowercase().contains(&marker.to_ascii_lowercase())
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub backends: Vec<BackendConfig>,
    #[serde(default = "default_fetch_window")]
    pub fetch_window: usize,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
    #[serde(default)]
    pub federated_paging: FederatedPaging,
    /// Descriptors added to, or replacing, the standard tables
    #[serde(default)]
    pub tables: Vec<TableConfig>,
}

fn default_fetch_window() -> usize {
    DEFAULT_FETCH_WINDOW
}

fn default_max_page_size() -> usize {
    DEFAULT_MAX_PAGE_SIZE
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        let mut hpl = BackendConfig::new(BackendKey::Secondary, "HPL");
        hpl.role_marker = Some("hpl".to_string());
        hpl.sole_establishment = Some(SoleEstablishment {
            id: "1".to_string(),
            name: "HPL".to_string(),
        });

        Self {
            backends: vec![BackendConfig::new(BackendKey::Primary, "SST"), hpl],
            fetch_window: DEFAULT_FETCH_WINDOW,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            federated_paging: FederatedPaging::PerBackend,
            tables: Vec::new(),
        }
    }
}

impl DeploymentConfig {
    /// Parse and validate a TOML document
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for malformed TOML or an inconsistent deployment.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: DeploymentConfig =
            toml::from_str(content).map_err(|e| TrackError::InvalidConfig {
                reason: format!("TOML parse error: {}", e),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the file cannot be read or is invalid.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| TrackError::InvalidConfig {
            reason: format!("cannot read {}: {}", path.display(), e),
        })?;
        Self::from_toml_str(&content)
    }

    /// # Errors
    ///
    /// Returns `InvalidConfig` when no primary backend is configured, a key is
    /// configured twice, or a limit is zero.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for backend in &self.backends {
            if !seen.insert(backend.key) {
                return Err(TrackError::InvalidConfig {
                    reason: format!("backend '{}' configured twice", backend.key),
                });
            }
            if backend.display_name.trim().is_empty() {
                return Err(TrackError::InvalidConfig {
                    reason: format!("backend '{}' has an empty display name", backend.key),
                });
            }
        }
        if !seen.contains(&BackendKey::Primary) {
            return Err(TrackError::InvalidConfig {
                reason: "no primary backend configured".to_string(),
            });
        }
        if self.fetch_window == 0 {
            return Err(TrackError::InvalidConfig {
                reason: "fetch_window must be positive".to_string(),
            });
        }
        if self.max_page_size == 0 {
            return Err(TrackError::InvalidConfig {
                reason: "max_page_size must be positive".to_string(),
            });
        }
        if let FederatedPaging::Global { cap: 0 } = self.federated_paging {
            return Err(TrackError::InvalidConfig {
                reason: "federated_paging cap must be positive".to_string(),
            });
        }
        Ok(())
    }

    pub fn backend(&self, key: BackendKey) -> Option<&BackendConfig> {
        self.backends.iter().find(|b| b.key == key)
    }

    /// Standard tables with this deployment's overrides applied
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if an override is invalid.
    pub fn table_registry(&self) -> Result<TableRegistry> {
        let mut registry = TableRegistry::standard();
        for table in &self.tables {
            registry.register(table.clone().into_descriptor()?);
        }
        Ok(registry)
    }
}
