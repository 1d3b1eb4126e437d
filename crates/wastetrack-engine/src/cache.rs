//! Lookup cache loader
//!
//! Fills the view state's lookup caches (units, supplies, agreements) with
//! every record visible under the current scope. Caches are rebuilt
//! wholesale and tagged with the scope they were loaded for, so a scope
//! change makes them reload on next use.

use std::time::Instant;

use wastetrack_core::errors::{Result, TrackError};
use wastetrack_core::model::{AggregatedRow, LookupKind, LookupRecord};
use wastetrack_core::state::ViewState;
use wastetrack_core::tables::TableDescriptor;
use wastetrack_core::{log_op_end, log_op_error, log_op_start};

use crate::query::QueryEngine;

#[derive(Debug, Clone)]
pub struct CacheLoader {
    engine: QueryEngine,
}

impl CacheLoader {
    pub fn new(engine: QueryEngine) -> Self {
        Self { engine }
    }

    /// Fetch the kind's table for the current scope and replace the cache
    ///
    /// # Errors
    ///
    /// `EstablishmentUnassigned` before assignment, `UnknownTable` if no
    /// table backs the kind, or the backend error in single mode. The cache
    /// is left untouched on error. If a federated backend fails, the other
    /// backends' records are stored and the cache stays marked for reload.
    pub async fn reload(&self, kind: LookupKind, state: &mut ViewState) -> Result<()> {
        let start = Instant::now();
        log_op_start!("cache_reload", lookup = %kind);

        let result = self.fetch_records(kind, state).await;
        let duration_ms = start.elapsed().as_millis() as u64;
        match result {
            Ok((records, failed_backends)) => {
                let count = records.len();
                state.store_cache(kind, records);
                if !failed_backends.is_empty() {
                    // Partial records are served but retried on next use
                    state.invalidate_cache(kind);
                    tracing::warn!(
                        lookup = %kind,
                        failed_backends = ?failed_backends,
                        "Lookup cache loaded without every backend"
                    );
                }
                log_op_end!("cache_reload", duration_ms = duration_ms, lookup = %kind, rows = count);
                Ok(())
            }
            Err(err) => {
                log_op_error!("cache_reload", err.clone(), duration_ms = duration_ms, lookup = %kind);
                Err(err)
            }
        }
    }

    /// Reload only when the cache is stale, missing or loaded for another scope
    ///
    /// Returns true if a reload happened.
    ///
    /// # Errors
    ///
    /// As [`CacheLoader::reload`].
    pub async fn ensure(&self, kind: LookupKind, state: &mut ViewState) -> Result<bool> {
        if !state.cache_needs_reload(kind) {
            return Ok(false);
        }
        self.reload(kind, state).await?;
        Ok(true)
    }

    /// `ensure` every lookup kind, stopping at the first error
    ///
    /// # Errors
    ///
    /// As [`CacheLoader::reload`].
    pub async fn ensure_all(&self, state: &mut ViewState) -> Result<()> {
        for kind in LookupKind::ALL {
            self.ensure(kind, state).await?;
        }
        Ok(())
    }

    /// Records for `kind` and the backends that failed to deliver theirs
    async fn fetch_records(
        &self,
        kind: LookupKind,
        state: &ViewState,
    ) -> Result<(Vec<LookupRecord>, Vec<String>)> {
        let descriptor = self
            .engine
            .tables()
            .for_lookup(kind)
            .ok_or_else(|| TrackError::UnknownTable {
                table: kind.table().to_string(),
            })?;

        let scoped = self
            .engine
            .fetch_scoped(state.scope(), &descriptor.name)
            .await?;

        let records = scoped
            .rows
            .iter()
            .filter_map(|row| to_record(descriptor, row))
            .collect();
        Ok((records, scoped.failed_backends))
    }
}

fn to_record(descriptor: &TableDescriptor, row: &AggregatedRow) -> Option<LookupRecord> {
    let id = row.get_str("id")?;
    let display_name = row
        .get_str(&descriptor.display_column)
        .unwrap_or_else(|| id.clone());

    Some(LookupRecord {
        id,
        display_name,
        backend: row.source_backend,
        establishment_id: row.get_str("establishment_id"),
    })
}
