//! Backend client registry
//!
//! One handle per configured backend, fixed for the life of the process.
//! Lookups never fail: unknown keys resolve to the primary backend.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use wastetrack_core::backend::BackendClient;
use wastetrack_core::config::DeploymentConfig;
use wastetrack_core::errors::{Result, TrackError};
use wastetrack_core::model::BackendKey;

/// A configured backend: key, display name and query client
#[derive(Clone)]
pub struct BackendHandle {
    key: BackendKey,
    display_name: String,
    client: Arc<dyn BackendClient>,
}

impl BackendHandle {
    pub fn new(key: BackendKey, display_name: impl Into<String>, client: Arc<dyn BackendClient>) -> Self {
        Self {
            key,
            display_name: display_name.into(),
            client,
        }
    }

    pub fn key(&self) -> BackendKey {
        self.key
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn client(&self) -> &dyn BackendClient {
        self.client.as_ref()
    }
}

impl fmt::Debug for BackendHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendHandle")
            .field("key", &self.key)
            .field("display_name", &self.display_name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct BackendRegistry {
    primary: BackendHandle,
    /// Sorted by key
    secondaries: Vec<BackendHandle>,
}

impl BackendRegistry {
    /// # Errors
    ///
    /// Returns `InvalidConfig` when no primary handle is given or a key
    /// appears twice.
    pub fn new(handles: Vec<BackendHandle>) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for handle in &handles {
            if !seen.insert(handle.key) {
                return Err(TrackError::InvalidConfig {
                    reason: format!("backend '{}' registered twice", handle.key),
                });
            }
        }

        let mut primary = None;
        let mut secondaries = Vec::new();
        for handle in handles {
            if handle.key.is_primary() {
                primary = Some(handle);
            } else {
                secondaries.push(handle);
            }
        }
        secondaries.sort_by_key(|h| h.key);

        let primary = primary.ok_or_else(|| TrackError::InvalidConfig {
            reason: "no primary backend registered".to_string(),
        })?;

        Ok(Self {
            primary,
            secondaries,
        })
    }

    /// Pair every configured backend with its client
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` when a configured backend has no client, or
    /// under the same conditions as [`BackendRegistry::new`].
    pub fn from_config(
        config: &DeploymentConfig,
        clients: impl IntoIterator<Item = (BackendKey, Arc<dyn BackendClient>)>,
    ) -> Result<Self> {
        let mut clients: Vec<_> = clients.into_iter().collect();
        let mut handles = Vec::with_capacity(config.backends.len());

        for backend in &config.backends {
            let position = clients
                .iter()
                .position(|(key, _)| *key == backend.key)
                .ok_or_else(|| TrackError::InvalidConfig {
                    reason: format!("no client supplied for backend '{}'", backend.key),
                })?;
            let (_, client) = clients.swap_remove(position);
            handles.push(BackendHandle::new(backend.key, backend.display_name.clone(), client));
        }

        Self::new(handles)
    }

    /// Handle for a wire key; absent or unrecognized keys give the primary
    pub fn resolve(&self, key: Option<&str>) -> &BackendHandle {
        key.and_then(BackendKey::parse)
            .and_then(|k| self.get(k))
            .unwrap_or(&self.primary)
    }

    pub fn get(&self, key: BackendKey) -> Option<&BackendHandle> {
        if key.is_primary() {
            return Some(&self.primary);
        }
        self.secondaries.iter().find(|h| h.key == key)
    }

    pub fn primary(&self) -> &BackendHandle {
        &self.primary
    }

    pub fn secondaries(&self) -> impl Iterator<Item = &BackendHandle> {
        self.secondaries.iter()
    }

    /// All handles in key order, primary first
    pub fn iter(&self) -> impl Iterator<Item = &BackendHandle> {
        std::iter::once(&self.primary).chain(self.secondaries.iter())
    }

    pub fn for_each_backend<F>(&self, f: F)
    where
        F: FnMut(&BackendHandle),
    {
        self.iter().for_each(f);
    }
}
