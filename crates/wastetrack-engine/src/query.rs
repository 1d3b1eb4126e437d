//! Aggregating query engine
//!
//! Turns a scope, a table name and the list filters into backend requests:
//! - single mode: one request against the bound backend, restricted to the
//!   scope's establishment when the backend's table shape declares a path
//! - federated mode: the same request issued concurrently to every backend,
//!   each with its own shape, rows annotated with their origin
//!
//! A backend without the table (`RelationNotFound`) contributes nothing. In
//! federated mode any other backend failure is logged and reported through
//! `QueryOutcome::failed_backends`; sibling backends are never aborted.
//!
//! Logging:
//! - `log_op_start!` / `log_op_end!` / `log_op_error!` around each query
//! - `debug` for skipped backends, `warn` for failed ones

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use serde_json::Value;
use wastetrack_core::backend::{Predicate, RowSet, SelectRequest};
use wastetrack_core::config::{DeploymentConfig, FederatedPaging};
use wastetrack_core::errors::{BackendResult, Result, TrackError};
use wastetrack_core::model::{
    cell_text, AggregatedRow, BackendKey, ListFilters, PageRequest, QueryOutcome, Row,
    ScopeContext, SortSpec,
};
use wastetrack_core::schema::{EVENT_BACKEND_FAILED, EVENT_BACKEND_SKIPPED, EVENT_SUPERSEDED};
use wastetrack_core::sequencer::{RequestSequencer, RequestTicket};
use wastetrack_core::tables::{TableDescriptor, TableRegistry, TableShape};
use wastetrack_core::{log_op_end, log_op_error, log_op_start};
use wastetrack_core_types::RequestId;

use crate::registry::{BackendHandle, BackendRegistry};

/// A response that may have been overtaken by a newer request
#[derive(Debug, Clone)]
pub enum Latest<T> {
    Current(T),
    /// A newer ticket was issued for the same context; discard the response
    Superseded,
}

impl<T> Latest<T> {
    pub fn is_current(&self) -> bool {
        matches!(self, Latest::Current(_))
    }

    pub fn into_current(self) -> Option<T> {
        match self {
            Latest::Current(value) => Some(value),
            Latest::Superseded => None,
        }
    }
}

/// Every row of a table visible under a scope, plus the backends that could
/// not deliver theirs
#[derive(Debug, Clone, Default)]
pub struct ScopedRows {
    pub rows: Vec<AggregatedRow>,
    /// Display names of federated backends that failed; their rows are missing
    pub failed_backends: Vec<String>,
}

impl ScopedRows {
    pub fn is_complete(&self) -> bool {
        self.failed_backends.is_empty()
    }
}

/// Read-side of the console: aggregated list queries and full-table fetches
#[derive(Debug, Clone)]
pub struct QueryEngine {
    registry: Arc<BackendRegistry>,
    tables: Arc<TableRegistry>,
    fetch_window: usize,
    max_page_size: usize,
    paging: FederatedPaging,
}

impl QueryEngine {
    pub fn new(
        registry: Arc<BackendRegistry>,
        tables: Arc<TableRegistry>,
        config: &DeploymentConfig,
    ) -> Self {
        Self {
            registry,
            tables,
            fetch_window: config.fetch_window,
            max_page_size: config.max_page_size,
            paging: config.federated_paging,
        }
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    pub fn tables(&self) -> &TableRegistry {
        &self.tables
    }

    pub fn fetch_window(&self) -> usize {
        self.fetch_window
    }

    /// One page of `table` under `scope`
    ///
    /// `sort` overrides the sort stored in `filters`; with neither, the
    /// table's default sort applies.
    ///
    /// # Errors
    ///
    /// - `UnknownTable` / `Validation` before any request is dispatched
    /// - `EstablishmentUnassigned` if the scope still needs assignment
    /// - `BackendQuery` for a failing backend in single mode
    pub async fn query(
        &self,
        scope: &ScopeContext,
        table: &str,
        filters: &ListFilters,
        sort: Option<&SortSpec>,
        page: PageRequest,
    ) -> Result<QueryOutcome> {
        let start = Instant::now();
        let request_id = RequestId::new();
        log_op_start!(
            "aggregate_query",
            table = table,
            scope_mode = %scope.mode,
            request_id = request_id.as_str()
        );

        let result = self
            .run_query(scope, table, filters, sort, page, request_id.clone())
            .await;

        let duration_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(outcome) => {
                log_op_end!(
                    "aggregate_query",
                    duration_ms = duration_ms,
                    table = table,
                    rows = outcome.rows.len(),
                    total = outcome.total_count,
                    request_id = request_id.as_str()
                );
            }
            Err(err) => {
                log_op_error!(
                    "aggregate_query",
                    err.clone(),
                    duration_ms = duration_ms,
                    table = table,
                    request_id = request_id.as_str()
                );
            }
        }
        result
    }

    /// Run `query` and drop the response if `ticket` was overtaken meanwhile
    ///
    /// Errors of a superseded request are discarded along with its rows.
    ///
    /// # Errors
    ///
    /// As [`QueryEngine::query`], for current tickets only.
    #[allow(clippy::too_many_arguments)]
    pub async fn query_latest(
        &self,
        sequencer: &RequestSequencer,
        ticket: &RequestTicket,
        scope: &ScopeContext,
        table: &str,
        filters: &ListFilters,
        sort: Option<&SortSpec>,
        page: PageRequest,
    ) -> Result<Latest<QueryOutcome>> {
        let result = self.query(scope, table, filters, sort, page).await;

        if !sequencer.is_current(ticket) {
            tracing::debug!(
                op = "aggregate_query",
                event = EVENT_SUPERSEDED,
                table = table,
                context = ticket.context(),
                seq = ticket.seq(),
                "Discarding superseded response"
            );
            return Ok(Latest::Superseded);
        }

        result.map(Latest::Current)
    }

    /// Every row of `table` visible under `scope`, fetched window by window
    ///
    /// Used by lookup caches. Establishment restriction applies as in
    /// [`QueryEngine::query`]; list filters and paging do not.
    ///
    /// # Errors
    ///
    /// `EstablishmentUnassigned`, `UnknownTable`, or the first backend error
    /// in single mode. Federated failures are logged and reported in
    /// [`ScopedRows::failed_backends`].
    pub async fn fetch_scoped(&self, scope: &ScopeContext, table: &str) -> Result<ScopedRows> {
        let descriptor = self.tables.require(table)?;
        let targets = self.targets(scope)?;

        let plans: Vec<(&BackendHandle, SelectRequest)> = targets
            .into_iter()
            .filter_map(|handle| {
                let shape = descriptor.shape(handle.key())?;
                let establishment_id = scope.establishment_id.as_deref();
                let request = base_request(descriptor, shape, establishment_id)
                    .order(descriptor.default_sort.clone());
                Some((handle, request))
            })
            .collect();

        let window = self.fetch_window;
        let results = join_all(plans.iter().map(|(handle, request)| async move {
            (*handle, fetch_all(handle, request, window).await)
        }))
        .await;

        let mut scoped = ScopedRows::default();
        for (handle, result) in results {
            match result {
                Ok(fetched) => scoped.rows.extend(annotate(handle, fetched)),
                Err(TrackError::RelationNotFound { .. }) => {
                    log_backend_skipped(handle, table, "relation not found");
                }
                Err(err) if scope.is_federated() => {
                    log_backend_failed(handle, table, &err.to_string());
                    scoped.failed_backends.push(handle.display_name().to_string());
                }
                Err(err) => return Err(err),
            }
        }
        Ok(scoped)
    }

    /// Ids of the rows of `descriptor` on `handle` matching `predicates` and
    /// belonging to `establishment_id` through the shape's establishment path
    ///
    /// # Errors
    ///
    /// The first backend error of the underlying `fetch_all`.
    pub async fn establishment_row_ids(
        &self,
        handle: &BackendHandle,
        descriptor: &TableDescriptor,
        shape: &TableShape,
        establishment_id: &str,
        predicates: &[Predicate],
    ) -> Result<Vec<Value>> {
        let request = predicates.iter().cloned().fold(
            base_request(descriptor, shape, Some(establishment_id)),
            SelectRequest::filter,
        );
        let rows = fetch_all(handle, &request, self.fetch_window).await?;
        Ok(rows
            .into_iter()
            .filter_map(|mut row| row.remove("id").filter(|id| !id.is_null()))
            .collect())
    }

    async fn run_query(
        &self,
        scope: &ScopeContext,
        table: &str,
        filters: &ListFilters,
        sort: Option<&SortSpec>,
        page: PageRequest,
        request_id: RequestId,
    ) -> Result<QueryOutcome> {
        let descriptor = self.tables.require(table)?;
        let stored_sort = filters.sort();
        let sort = descriptor.resolve_sort(sort.or(stored_sort.as_ref()))?;
        self.validate(filters, page)?;
        let targets = self.targets(scope)?;

        let global_cap = match self.paging {
            FederatedPaging::Global { cap } if scope.is_federated() => Some(cap),
            _ => None,
        };

        let establishment_id = if scope.is_federated() {
            None
        } else {
            scope.establishment_id.as_deref()
        };

        let mut plans = Vec::new();
        for handle in targets {
            let Some(shape) = descriptor.shape(handle.key()) else {
                log_backend_skipped(handle, table, "table not declared for backend");
                continue;
            };
            let Some(request) =
                list_request(descriptor, shape, handle.key(), establishment_id, filters, &sort)
            else {
                log_backend_skipped(handle, table, "no unit ids for backend");
                continue;
            };
            let request = match global_cap {
                Some(cap) => request.range(0, cap),
                None => request.range(page.offset(), page.size),
            };
            plans.push((handle, request));
        }

        let results: Vec<(&BackendHandle, BackendResult<RowSet>)> =
            join_all(plans.iter().map(|(handle, request)| async move {
                (*handle, handle.client().select(request).await)
            }))
            .await;

        let mut outcome = QueryOutcome::empty(request_id);
        for (handle, result) in results {
            match result {
                Ok(set) => {
                    outcome.total_count += set.count.unwrap_or(set.rows.len() as u64);
                    outcome.rows.extend(annotate(handle, set.rows));
                }
                Err(err) if err.is_relation_not_found() => {
                    log_backend_skipped(handle, table, "relation not found");
                }
                Err(err) if scope.is_federated() => {
                    log_backend_failed(handle, table, &err.to_string());
                    outcome.failed_backends.push(handle.display_name().to_string());
                }
                Err(err) => {
                    return Err(TrackError::from_backend(handle.display_name(), table, &err));
                }
            }
        }

        if global_cap.is_some() {
            sort_aggregated(&mut outcome.rows, &sort);
            outcome.rows = outcome
                .rows
                .into_iter()
                .skip(page.offset())
                .take(page.size)
                .collect();
        }

        Ok(outcome)
    }

    fn validate(&self, filters: &ListFilters, page: PageRequest) -> Result<()> {
        if page.size == 0 {
            return Err(TrackError::validation("page size must be positive"));
        }
        if page.size > self.max_page_size {
            return Err(TrackError::validation(format!(
                "page size {} exceeds the maximum of {}",
                page.size, self.max_page_size
            )));
        }
        filters.date_range.validate()
    }

    /// Handles a scope reads from, in registry order
    fn targets(&self, scope: &ScopeContext) -> Result<Vec<&BackendHandle>> {
        if scope.needs_assignment() {
            return Err(TrackError::EstablishmentUnassigned);
        }
        if scope.is_federated() {
            return Ok(self.registry.iter().collect());
        }

        scope
            .backends()
            .into_iter()
            .map(|key| {
                self.registry
                    .get(key)
                    .ok_or_else(|| TrackError::InvalidConfig {
                        reason: format!("scope bound to unconfigured backend '{}'", key),
                    })
            })
            .collect()
    }
}

/// Fetch every row matching `request`, `window` rows per request
///
/// Stops on a short page, or once the reported exact count is reached, so
/// N rows take `ceil(N / window)` requests and an empty table takes one.
/// Rows keep the backend's order.
///
/// # Errors
///
/// The first failing page aborts the fetch; nothing fetched so far is returned.
pub async fn fetch_all(
    handle: &BackendHandle,
    request: &SelectRequest,
    window: usize,
) -> Result<Vec<Row>> {
    let window = window.max(1);
    let mut rows = Vec::new();
    let mut pages: u64 = 0;

    loop {
        let page_request = request.clone().range(rows.len(), window).with_count();
        let set = handle
            .client()
            .select(&page_request)
            .await
            .map_err(|err| TrackError::from_backend(handle.display_name(), &request.table, &err))?;
        pages += 1;

        let received = set.rows.len();
        rows.extend(set.rows);

        let reached_count = set.count.is_some_and(|total| rows.len() as u64 >= total);
        if received < window || reached_count {
            break;
        }
    }

    tracing::debug!(
        backend = handle.display_name(),
        table = %request.table,
        rows = rows.len(),
        pages = pages,
        "Fetched full table"
    );
    Ok(rows)
}

/// Select shape and establishment predicate for one backend
fn base_request(
    descriptor: &TableDescriptor,
    shape: &TableShape,
    establishment_id: Option<&str>,
) -> SelectRequest {
    let restricted = establishment_id.is_some() && shape.establishment_path.is_scoped();
    let mut request =
        SelectRequest::new(descriptor.name.as_str()).select(shape.select_for(restricted));

    if let (Some(id), Some(column)) = (
        establishment_id.filter(|_| restricted),
        shape.establishment_path.predicate_column(),
    ) {
        request = request.filter(Predicate::eq(column, id));
    }
    request
}

/// Full list request for one backend, or `None` when the backend cannot
/// contribute (unit filter holds no id for it)
fn list_request(
    descriptor: &TableDescriptor,
    shape: &TableShape,
    backend: BackendKey,
    establishment_id: Option<&str>,
    filters: &ListFilters,
    sort: &SortSpec,
) -> Option<SelectRequest> {
    let mut request = base_request(descriptor, shape, establishment_id)
        .order(sort.clone())
        .with_count();

    if let Some(date_column) = &descriptor.date_column {
        if let Some(from) = filters.date_range.from {
            request = request.filter(Predicate::gte(date_column.as_str(), from.to_string()));
        }
        if let Some(end) = filters.date_range.exclusive_end() {
            request = request.filter(Predicate::lt(date_column.as_str(), end.to_string()));
        }
    }

    if let (true, Some(unit_column)) = (filters.has_unit_filter(), &shape.unit_column) {
        let ids = filters.unit_ids_for(backend);
        if ids.is_empty() {
            return None;
        }
        request = request.filter(Predicate::in_list(unit_column.as_str(), ids));
    }

    Some(request)
}

fn annotate(handle: &BackendHandle, rows: Vec<Row>) -> impl Iterator<Item = AggregatedRow> + '_ {
    rows.into_iter()
        .map(move |row| AggregatedRow::new(handle.key(), handle.display_name(), row))
}

/// Stable merge order across backends; nulls last in both directions
fn sort_aggregated(rows: &mut [AggregatedRow], sort: &SortSpec) {
    rows.sort_by(|a, b| {
        let left = a.get(&sort.column).filter(|v| !v.is_null());
        let right = b.get(&sort.column).filter(|v| !v.is_null());
        match (left, right) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(l), Some(r)) => {
                let ordering = compare_cells(l, r);
                if sort.direction.is_ascending() {
                    ordering
                } else {
                    ordering.reverse()
                }
            }
        }
    });
}

fn compare_cells(left: &Value, right: &Value) -> Ordering {
    if let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) {
        return l.partial_cmp(&r).unwrap_or(Ordering::Equal);
    }
    cell_text(left).cmp(&cell_text(right))
}

fn log_backend_skipped(handle: &BackendHandle, table: &str, reason: &str) {
    tracing::debug!(
        op = "aggregate_query",
        event = EVENT_BACKEND_SKIPPED,
        backend = handle.display_name(),
        table = table,
        reason = reason,
        "Backend contributes no rows"
    );
}

fn log_backend_failed(handle: &BackendHandle, table: &str, message: &str) {
    tracing::warn!(
        op = "aggregate_query",
        event = EVENT_BACKEND_FAILED,
        backend = handle.display_name(),
        table = table,
        error = message,
        "Backend failed; continuing without its rows"
    );
}
