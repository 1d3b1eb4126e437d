//! View-state store
//!
//! Explicit context value owning the signed-in identity, the list filters of
//! the active view, the derived scope and the lookup caches. Every component
//! receives it by reference; nothing is global. Setters are synchronous;
//! async population (cache reloads) happens in callers that write results
//! back through `store_cache`.

use std::collections::BTreeMap;

use crate::model::{
    EstablishmentFilter, Identity, ListFilters, LookupCache, LookupKind, LookupRecord, ScopeContext,
};
use crate::scope::resolve_scope;
use crate::sequencer::RequestSequencer;

#[derive(Debug, Clone, Default)]
pub struct ViewState {
    identity: Option<Identity>,
    filters: ListFilters,
    scope: ScopeContext,
    active_view: Option<String>,
    caches: BTreeMap<LookupKind, LookupCache>,
    sequencer: RequestSequencer,
}

impl ViewState {
    /// Empty state, as at process start
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    pub fn list_filters(&self) -> &ListFilters {
        &self.filters
    }

    pub fn establishment_filter(&self) -> &EstablishmentFilter {
        &self.filters.establishment_filter
    }

    pub fn scope(&self) -> &ScopeContext {
        &self.scope
    }

    pub fn active_view(&self) -> Option<&str> {
        self.active_view.as_deref()
    }

    pub fn cache(&self, kind: LookupKind) -> Option<&LookupCache> {
        self.caches.get(&kind)
    }

    /// Records of a lookup cache, empty if never loaded
    pub fn lookup_records(&self, kind: LookupKind) -> &[LookupRecord] {
        self.caches.get(&kind).map(LookupCache::records).unwrap_or(&[])
    }

    pub fn sequencer(&self) -> &RequestSequencer {
        &self.sequencer
    }

    /// Replace the identity wholesale and recompute the scope
    pub fn set_identity(&mut self, identity: Identity) {
        self.identity = Some(identity);
        self.recompute_scope();
    }

    pub fn clear_identity(&mut self) {
        self.identity = None;
        self.recompute_scope();
    }

    pub fn set_establishment_filter(&mut self, filter: EstablishmentFilter) {
        self.filters.establishment_filter = filter;
        self.recompute_scope();
    }

    /// Replace the list filters (explicit filter-apply action)
    pub fn set_list_filters(&mut self, filters: ListFilters) {
        self.filters = filters;
        self.recompute_scope();
    }

    /// Switch the active view; filters reset when the view changes
    ///
    /// Returns true if the view changed.
    pub fn set_active_view(&mut self, view: impl Into<String>) -> bool {
        let view = view.into();
        if self.active_view.as_deref() == Some(view.as_str()) {
            return false;
        }
        self.active_view = Some(view);
        self.filters = ListFilters::default();
        self.recompute_scope();
        true
    }

    /// Mark a cache stale so the next `cache_needs_reload` check reloads it
    pub fn invalidate_cache(&mut self, kind: LookupKind) {
        self.caches.entry(kind).or_default().mark_stale();
    }

    /// Write freshly loaded records for the current scope
    pub fn store_cache(&mut self, kind: LookupKind, records: Vec<LookupRecord>) {
        self.caches
            .insert(kind, LookupCache::loaded(records, self.scope.clone()));
    }

    /// True when the cache is stale, missing, or loaded for another scope
    pub fn cache_needs_reload(&self, kind: LookupKind) -> bool {
        self.caches
            .get(&kind)
            .map_or(true, |cache| cache.needs_reload(&self.scope))
    }

    /// Sign-out: drop everything and invalidate in-flight requests
    pub fn reset(&mut self) {
        self.sequencer.reset();
        *self = Self {
            sequencer: self.sequencer.clone(),
            ..Self::default()
        };
    }

    fn recompute_scope(&mut self) {
        self.scope = resolve_scope(self.identity.as_ref(), &self.filters.establishment_filter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BackendKey, BackendScopedId, EstablishmentRef, ScopeMode};

    fn admin() -> Identity {
        Identity::new("u-admin", "admin@example.org", "admin", None)
    }

    fn record(id: &str) -> LookupRecord {
        LookupRecord {
            id: id.to_string(),
            display_name: id.to_string(),
            backend: BackendKey::Primary,
            establishment_id: None,
        }
    }

    #[test]
    fn test_new_state_is_empty_and_unassigned() {
        let state = ViewState::new();
        assert!(!state.is_authenticated());
        assert!(state.scope().needs_assignment());
        assert!(state.lookup_records(LookupKind::Units).is_empty());
    }

    #[test]
    fn test_filter_change_recomputes_scope() {
        let mut state = ViewState::new();
        state.set_identity(admin());
        assert!(state.scope().is_federated());

        state.set_establishment_filter(EstablishmentFilter::parse("primary-7").unwrap());
        assert_eq!(state.scope().mode, ScopeMode::Single);
        assert_eq!(state.scope().establishment_id.as_deref(), Some("7"));
    }

    #[test]
    fn test_view_switch_resets_filters() {
        let mut state = ViewState::new();
        state.set_identity(admin());
        state.set_active_view("units");

        let mut filters = ListFilters::default();
        filters.unit_ids.insert(BackendScopedId::new(BackendKey::Primary, "1"));
        filters.establishment_filter = EstablishmentFilter::parse("primary-7").unwrap();
        state.set_list_filters(filters);
        assert!(!state.scope().is_federated());

        assert!(!state.set_active_view("units"));
        assert!(state.list_filters().has_unit_filter());

        assert!(state.set_active_view("hazardous_waste"));
        assert_eq!(state.list_filters(), &ListFilters::default());
        assert!(state.scope().is_federated());
    }

    #[test]
    fn test_cache_lifecycle() {
        let mut state = ViewState::new();
        state.set_identity(Identity::new(
            "u",
            "u@example.org",
            "staff",
            Some(EstablishmentRef::new("7", "Norte", BackendKey::Primary)),
        ));

        assert!(state.cache_needs_reload(LookupKind::Units));
        state.store_cache(LookupKind::Units, vec![record("1")]);
        assert!(!state.cache_needs_reload(LookupKind::Units));

        state.invalidate_cache(LookupKind::Units);
        assert!(state.cache_needs_reload(LookupKind::Units));
        assert_eq!(state.lookup_records(LookupKind::Units).len(), 1);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut state = ViewState::new();
        state.set_identity(admin());
        state.store_cache(LookupKind::Supplies, vec![record("s1")]);
        let ticket = state.sequencer().begin("units");

        state.reset();

        assert!(state.identity().is_none());
        assert!(state.cache(LookupKind::Supplies).is_none());
        assert!(state.scope().needs_assignment());
        assert!(!state.sequencer().is_current(&ticket));
    }
}
