//! Mutation service
//!
//! Inserts, updates and deletes against the backend the scope points at.
//! A successful write to a table that feeds a lookup cache invalidates and
//! reloads that cache before returning, so the next form sees fresh data.
//! A failed write leaves the view state untouched.

use std::time::Instant;

use serde_json::Value;
use wastetrack_core::backend::Predicate;
use wastetrack_core::errors::{ExError, Result, TrackError};
use wastetrack_core::model::{AggregatedRow, BackendKey, Row, ScopeContext};
use wastetrack_core::state::ViewState;
use wastetrack_core::tables::{EstablishmentPath, TableDescriptor, TableShape};
use wastetrack_core::{log_op_end, log_op_error, log_op_start};

use crate::cache::CacheLoader;
use crate::query::QueryEngine;
use crate::registry::BackendHandle;

#[derive(Debug, Clone)]
pub struct MutationService {
    engine: QueryEngine,
    loader: CacheLoader,
}

/// Where a write goes and what it may touch
struct Target<'a> {
    handle: &'a BackendHandle,
    descriptor: &'a TableDescriptor,
    shape: &'a TableShape,
}

impl MutationService {
    pub fn new(engine: QueryEngine) -> Self {
        let loader = CacheLoader::new(engine.clone());
        Self { engine, loader }
    }

    /// Insert rows, stamping the scope's establishment on directly scoped tables
    ///
    /// `backend` picks the target in federated scope and must agree with the
    /// bound backend in single scope.
    ///
    /// # Errors
    ///
    /// `Validation`, `UnknownTable` or `EstablishmentUnassigned` before the
    /// write; `Mutation` naming the backend if the write fails.
    pub async fn insert(
        &self,
        state: &mut ViewState,
        table: &str,
        backend: Option<BackendKey>,
        rows: Vec<Row>,
    ) -> Result<Vec<AggregatedRow>> {
        let start = Instant::now();
        log_op_start!("mutation_insert", table = table);

        let result = self.run_insert(state.scope(), table, backend, rows).await;
        self.finish("mutation_insert", start, state, table, result).await
    }

    /// Apply `patch` to the rows matching `predicates`
    ///
    /// In single scope, directly scoped tables are additionally restricted to
    /// the scope's establishment.
    ///
    /// # Errors
    ///
    /// As [`MutationService::insert`].
    pub async fn update(
        &self,
        state: &mut ViewState,
        table: &str,
        backend: Option<BackendKey>,
        predicates: Vec<Predicate>,
        patch: Row,
    ) -> Result<Vec<AggregatedRow>> {
        let start = Instant::now();
        log_op_start!("mutation_update", table = table);

        let result = self
            .run_update(state.scope(), table, backend, predicates, patch)
            .await;
        self.finish("mutation_update", start, state, table, result).await
    }

    /// Delete the rows matching `predicates`, returning how many went
    ///
    /// # Errors
    ///
    /// As [`MutationService::insert`].
    pub async fn delete(
        &self,
        state: &mut ViewState,
        table: &str,
        backend: Option<BackendKey>,
        predicates: Vec<Predicate>,
    ) -> Result<u64> {
        let start = Instant::now();
        log_op_start!("mutation_delete", table = table);

        let result = self.run_delete(state.scope(), table, backend, predicates).await;
        self.finish("mutation_delete", start, state, table, result).await
    }

    async fn run_insert(
        &self,
        scope: &ScopeContext,
        table: &str,
        backend: Option<BackendKey>,
        mut rows: Vec<Row>,
    ) -> Result<Vec<AggregatedRow>> {
        let target = self.target(scope, table, backend)?;

        // The establishments table is scoped by its own key; new rows keep theirs
        if let (EstablishmentPath::Direct { column }, Some(id)) =
            (&target.shape.establishment_path, scope.establishment_id.as_deref())
        {
            for row in rows.iter_mut().filter(|_| column != "id") {
                if row.get(column).map_or(true, Value::is_null) {
                    row.insert(column.clone(), Value::from(id));
                }
            }
        }

        let stored = target
            .handle
            .client()
            .insert(&target.descriptor.name, rows)
            .await
            .map_err(|err| mutation_error(target.handle, table, &err))?;

        Ok(stored
            .into_iter()
            .map(|row| AggregatedRow::new(target.handle.key(), target.handle.display_name(), row))
            .collect())
    }

    async fn run_update(
        &self,
        scope: &ScopeContext,
        table: &str,
        backend: Option<BackendKey>,
        predicates: Vec<Predicate>,
        patch: Row,
    ) -> Result<Vec<AggregatedRow>> {
        let target = self.target(scope, table, backend)?;
        let Some(predicates) = self.scoped_predicates(scope, &target, predicates).await? else {
            return Ok(Vec::new());
        };

        let updated = target
            .handle
            .client()
            .update(&target.descriptor.name, &predicates, patch)
            .await
            .map_err(|err| mutation_error(target.handle, table, &err))?;

        Ok(updated
            .into_iter()
            .map(|row| AggregatedRow::new(target.handle.key(), target.handle.display_name(), row))
            .collect())
    }

    async fn run_delete(
        &self,
        scope: &ScopeContext,
        table: &str,
        backend: Option<BackendKey>,
        predicates: Vec<Predicate>,
    ) -> Result<u64> {
        let target = self.target(scope, table, backend)?;
        let Some(predicates) = self.scoped_predicates(scope, &target, predicates).await? else {
            return Ok(0);
        };

        target
            .handle
            .client()
            .delete(&target.descriptor.name, &predicates)
            .await
            .map_err(|err| mutation_error(target.handle, table, &err))
    }

    fn target(
        &self,
        scope: &ScopeContext,
        table: &str,
        requested: Option<BackendKey>,
    ) -> Result<Target<'_>> {
        let descriptor = self.engine.tables().require(table)?;
        if scope.needs_assignment() {
            return Err(TrackError::EstablishmentUnassigned);
        }

        let key = match (scope.is_federated(), scope.backend, requested) {
            (true, _, Some(key)) => key,
            (true, _, None) => {
                return Err(TrackError::validation(
                    "a target backend is required when writing from the federated view",
                ))
            }
            (false, Some(bound), Some(key)) if key != bound => {
                return Err(TrackError::validation(format!(
                    "scope is bound to '{}', cannot write to '{}'",
                    bound, key
                )))
            }
            (false, Some(bound), _) => bound,
            (false, None, _) => return Err(TrackError::EstablishmentUnassigned),
        };

        let handle = self
            .engine
            .registry()
            .get(key)
            .ok_or_else(|| TrackError::validation(format!("backend '{}' is not configured", key)))?;
        let shape = descriptor.shape(key).ok_or_else(|| {
            TrackError::validation(format!(
                "{} is not available on {}",
                table,
                handle.display_name()
            ))
        })?;

        Ok(Target {
            handle,
            descriptor,
            shape,
        })
    }

    /// Caller predicates plus the establishment restriction of a single scope
    ///
    /// Tables scoped through a parent row are narrowed to the ids of their
    /// in-establishment rows first. `None` means no row is in scope and the
    /// write must not be sent.
    async fn scoped_predicates(
        &self,
        scope: &ScopeContext,
        target: &Target<'_>,
        mut predicates: Vec<Predicate>,
    ) -> Result<Option<Vec<Predicate>>> {
        if predicates.is_empty() {
            return Err(TrackError::validation(
                "refusing to modify every row: no predicate given",
            ));
        }
        let Some(id) = scope.establishment_id.as_deref().filter(|_| !scope.is_federated()) else {
            return Ok(Some(predicates));
        };

        match &target.shape.establishment_path {
            EstablishmentPath::None => {}
            EstablishmentPath::Direct { column } => {
                predicates.push(Predicate::eq(column.as_str(), id));
            }
            EstablishmentPath::Joined { .. } => {
                let ids = self
                    .engine
                    .establishment_row_ids(target.handle, target.descriptor, target.shape, id, &predicates)
                    .await
                    .map_err(|err| TrackError::Mutation {
                        backend: target.handle.display_name().to_string(),
                        table: target.descriptor.name.clone(),
                        message: err.to_string(),
                    })?;
                if ids.is_empty() {
                    tracing::debug!(
                        backend = target.handle.display_name(),
                        table = %target.descriptor.name,
                        establishment_id = id,
                        "No matching rows in establishment; write skipped"
                    );
                    return Ok(None);
                }
                predicates.push(Predicate::in_list("id", ids));
            }
        }
        Ok(Some(predicates))
    }

    /// Log the outcome and refresh the affected lookup cache on success
    async fn finish<T>(
        &self,
        op: &'static str,
        start: Instant,
        state: &mut ViewState,
        table: &str,
        result: Result<T>,
    ) -> Result<T> {
        let value = match result {
            Ok(value) => value,
            Err(err) => {
                let duration_ms = start.elapsed().as_millis() as u64;
                log_op_error!(op, err.clone(), duration_ms = duration_ms, table = table);
                return Err(err);
            }
        };

        if let Some(kind) = self.engine.tables().get(table).and_then(|d| d.lookup) {
            state.invalidate_cache(kind);
            if let Err(err) = self.loader.reload(kind, state).await {
                // Cache stays stale and reloads on next use
                tracing::warn!(
                    op = op,
                    table = table,
                    lookup = %kind,
                    error = %err,
                    "Cache reload after write failed"
                );
            }
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        log_op_end!(op, duration_ms = duration_ms, table = table);
        Ok(value)
    }
}

fn mutation_error(handle: &BackendHandle, table: &str, err: &ExError) -> TrackError {
    let message = if err.message().is_empty() {
        err.code().to_string()
    } else {
        err.message().to_string()
    };
    TrackError::Mutation {
        backend: handle.display_name().to_string(),
        table: table.to_string(),
        message,
    }
}
