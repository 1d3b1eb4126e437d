//! Lookup caches feeding form selectors (units, supplies, agreements)

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::{BackendKey, ScopeContext};

/// Entity kinds that have a lookup cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupKind {
    Units,
    Supplies,
    Agreements,
}

impl LookupKind {
    pub const ALL: [LookupKind; 3] = [LookupKind::Units, LookupKind::Supplies, LookupKind::Agreements];

    /// Table backing this lookup
    pub fn table(&self) -> &'static str {
        match self {
            LookupKind::Units => "units",
            LookupKind::Supplies => "supplies",
            LookupKind::Agreements => "agreements",
        }
    }
}

impl fmt::Display for LookupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// Lightweight record listed in a selector
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupRecord {
    pub id: String,
    pub display_name: String,
    pub backend: BackendKey,
    pub establishment_id: Option<String>,
}

/// Cached records for one lookup kind
///
/// Rebuilt wholesale; `loaded_for` remembers the scope the records belong to.
#[derive(Debug, Clone, Default)]
pub struct LookupCache {
    records: Vec<LookupRecord>,
    loaded_for: Option<ScopeContext>,
    stale: bool,
}

impl LookupCache {
    pub fn loaded(records: Vec<LookupRecord>, scope: ScopeContext) -> Self {
        Self {
            records,
            loaded_for: Some(scope),
            stale: false,
        }
    }

    pub fn records(&self) -> &[LookupRecord] {
        &self.records
    }

    /// Records that belong to one backend
    pub fn records_for(&self, backend: BackendKey) -> impl Iterator<Item = &LookupRecord> {
        self.records.iter().filter(move |r| r.backend == backend)
    }

    pub fn loaded_for(&self) -> Option<&ScopeContext> {
        self.loaded_for.as_ref()
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    /// True when the records cannot be served for `scope`
    pub fn needs_reload(&self, scope: &ScopeContext) -> bool {
        self.stale || self.loaded_for.as_ref() != Some(scope)
    }
}
