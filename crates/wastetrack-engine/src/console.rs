//! Console orchestration
//!
//! `Console` owns the view state and wires the registry, table descriptors,
//! query engine, cache loader and mutation service together. Every
//! operation a list view or form performs goes through it, so scope changes
//! always happen before the cache reloads they trigger.

use std::collections::BTreeMap;
use std::sync::Arc;

use wastetrack_core::backend::{BackendClient, Predicate};
use wastetrack_core::config::DeploymentConfig;
use wastetrack_core::errors::Result;
use wastetrack_core::model::{
    AggregatedRow, BackendKey, EstablishmentFilter, ListFilters, LookupKind, LookupRecord,
    PageRequest, QueryOutcome, Row,
};
use wastetrack_core::state::ViewState;

use crate::cache::CacheLoader;
use crate::mutation::MutationService;
use crate::query::{Latest, QueryEngine};
use crate::registry::BackendRegistry;
use crate::session::{self, AuthOutcome};

#[derive(Debug)]
pub struct Console {
    config: DeploymentConfig,
    registry: Arc<BackendRegistry>,
    engine: QueryEngine,
    loader: CacheLoader,
    mutations: MutationService,
    state: ViewState,
}

impl Console {
    /// # Errors
    ///
    /// `InvalidConfig` if the configuration or a table override is invalid.
    pub fn new(config: DeploymentConfig, registry: BackendRegistry) -> Result<Self> {
        config.validate()?;
        let registry = Arc::new(registry);
        let tables = Arc::new(config.table_registry()?);
        let engine = QueryEngine::new(Arc::clone(&registry), tables, &config);

        Ok(Self {
            loader: CacheLoader::new(engine.clone()),
            mutations: MutationService::new(engine.clone()),
            engine,
            registry,
            config,
            state: ViewState::new(),
        })
    }

    /// Build the registry from `config` and one client per configured backend
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if a configured backend has no client.
    pub fn from_clients(
        config: DeploymentConfig,
        clients: BTreeMap<BackendKey, Arc<dyn BackendClient>>,
    ) -> Result<Self> {
        let registry = BackendRegistry::from_config(&config, clients)?;
        Self::new(config, registry)
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn config(&self) -> &DeploymentConfig {
        &self.config
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    pub fn engine(&self) -> &QueryEngine {
        &self.engine
    }

    /// Authenticate, then warm every lookup cache for the new scope
    ///
    /// Cache failures do not fail the login; the caches stay marked for
    /// reload.
    pub async fn login(&mut self) -> AuthOutcome {
        let outcome =
            session::require_authenticated(&self.registry, &self.config, &mut self.state).await;

        if let AuthOutcome::Authenticated(_) = &outcome {
            if let Err(err) = self.loader.ensure_all(&mut self.state).await {
                tracing::warn!(error = %err, "Lookup caches not loaded after login");
            }
        }
        outcome
    }

    pub async fn logout(&mut self) {
        session::sign_out(&self.registry, &mut self.state).await;
    }

    /// Set the administrator's establishment filter and reload the caches
    /// the new scope invalidates
    ///
    /// # Errors
    ///
    /// The first cache reload error; the filter and scope are already applied.
    pub async fn change_establishment_filter(&mut self, filter: EstablishmentFilter) -> Result<()> {
        self.state.set_establishment_filter(filter);
        self.loader.ensure_all(&mut self.state).await
    }

    /// Returns true if the view changed (and its filters were reset)
    pub fn switch_view(&mut self, view: &str) -> bool {
        self.state.set_active_view(view)
    }

    /// Apply list filters, reloading caches if the establishment filter moved
    /// the scope
    ///
    /// # Errors
    ///
    /// The first cache reload error.
    pub async fn apply_filters(&mut self, filters: ListFilters) -> Result<()> {
        self.state.set_list_filters(filters);
        self.loader.ensure_all(&mut self.state).await
    }

    /// One page of `table` under the current scope and filters
    ///
    /// Issues a ticket for the table so a response overtaken by a newer
    /// `list` of the same table comes back as `Superseded`.
    ///
    /// # Errors
    ///
    /// As [`QueryEngine::query`].
    pub async fn list(&self, table: &str, page: PageRequest) -> Result<Latest<QueryOutcome>> {
        let sequencer = self.state.sequencer();
        let ticket = sequencer.begin(table);
        self.engine
            .query_latest(
                sequencer,
                &ticket,
                self.state.scope(),
                table,
                self.state.list_filters(),
                None,
                page,
            )
            .await
    }

    /// Records for a form selector, loading the cache if needed
    ///
    /// # Errors
    ///
    /// As [`CacheLoader::reload`].
    pub async fn lookup(&mut self, kind: LookupKind) -> Result<&[LookupRecord]> {
        self.loader.ensure(kind, &mut self.state).await?;
        Ok(self.state.lookup_records(kind))
    }

    /// # Errors
    ///
    /// As [`MutationService::insert`].
    pub async fn insert(
        &mut self,
        table: &str,
        backend: Option<BackendKey>,
        rows: Vec<Row>,
    ) -> Result<Vec<AggregatedRow>> {
        self.mutations
            .insert(&mut self.state, table, backend, rows)
            .await
    }

    /// # Errors
    ///
    /// As [`MutationService::update`].
    pub async fn update(
        &mut self,
        table: &str,
        backend: Option<BackendKey>,
        predicates: Vec<Predicate>,
        patch: Row,
    ) -> Result<Vec<AggregatedRow>> {
        self.mutations
            .update(&mut self.state, table, backend, predicates, patch)
            .await
    }

    /// # Errors
    ///
    /// As [`MutationService::delete`].
    pub async fn delete(
        &mut self,
        table: &str,
        backend: Option<BackendKey>,
        predicates: Vec<Predicate>,
    ) -> Result<u64> {
        self.mutations
            .delete(&mut self.state, table, backend, predicates)
            .await
    }
}
