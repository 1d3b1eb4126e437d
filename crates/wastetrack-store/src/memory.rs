//! In-memory backend
//!
//! Holds tables of JSON rows and answers `SelectRequest`s the way the hosted
//! backend does for the subset the engine relies on:
//!
//! - `Embed` selections join a related row through a declared relation
//!   (`foreign key -> target.id`); inner embeds drop base rows without a match
//! - dotted predicate paths (`units.establishment_id`) read embedded objects
//!   and filter base rows
//! - ordering puts nulls last in both directions
//! - `count` reports the number of matching rows before the range is applied
//!
//! Setup methods take `&self` so a backend can be reconfigured after it has
//! been shared behind an `Arc`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use wastetrack_core::backend::{
    BackendClient, Predicate, PredicateOp, RowRange, RowSet, SelectRequest, Selection,
};
use wastetrack_core::errors::ExError;
use wastetrack_core::model::{Row, Session, SortSpec};

use crate::errors::{
    missing_relationship, relation_not_found, session_rejected, state_unavailable, Result,
};

/// Row operation kinds, for the request log and failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Select,
    Insert,
    Update,
    Delete,
}

/// Foreign-key relationship from `table.foreign_key` to `target.id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub table: String,
    /// Name used in select embeds and dotted predicate paths
    pub name: String,
    pub foreign_key: String,
    pub target: String,
}

impl Relation {
    pub fn new(
        table: impl Into<String>,
        name: impl Into<String>,
        foreign_key: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            name: name.into(),
            foreign_key: foreign_key.into(),
            target: target.into(),
        }
    }
}

/// One request received by the backend
#[derive(Debug, Clone, PartialEq)]
pub struct RequestRecord {
    pub operation: Operation,
    pub table: String,
    pub select: Vec<Selection>,
    pub predicates: Vec<Predicate>,
    pub range: Option<RowRange>,
    pub count: bool,
}

impl RequestRecord {
    fn select(request: &SelectRequest) -> Self {
        Self {
            operation: Operation::Select,
            table: request.table.clone(),
            select: request.select.clone(),
            predicates: request.predicates.clone(),
            range: request.range,
            count: request.count,
        }
    }

    fn mutation(operation: Operation, table: &str, predicates: &[Predicate]) -> Self {
        Self {
            operation,
            table: table.to_string(),
            select: Vec::new(),
            predicates: predicates.to_vec(),
            range: None,
            count: false,
        }
    }

    /// True if any predicate targets `column`
    pub fn has_predicate_on(&self, column: &str) -> bool {
        self.predicates.iter().any(|p| p.column == column)
    }

    /// Value of the equality predicate on `column`, if present
    pub fn eq_value(&self, column: &str) -> Option<&Value> {
        self.predicates.iter().find_map(|p| match &p.op {
            PredicateOp::Eq(value) if p.column == column => Some(value),
            _ => None,
        })
    }
}

#[derive(Debug, Clone)]
struct Failure {
    operation: Option<Operation>,
    table: String,
    error: ExError,
}

#[derive(Debug, Default)]
struct State {
    tables: BTreeMap<String, Vec<Row>>,
    relations: Vec<Relation>,
    session: Option<Session>,
    reject_sessions: bool,
    session_updates: usize,
    failures: Vec<Failure>,
    requests: Vec<RequestRecord>,
}

impl State {
    fn injected(&self, operation: Operation, table: &str) -> Option<ExError> {
        self.failures
            .iter()
            .find(|f| f.table == table && f.operation.map_or(true, |op| op == operation))
            .map(|f| f.error.clone())
    }

    fn relation(&self, table: &str, name: &str) -> Option<&Relation> {
        self.relations
            .iter()
            .find(|r| r.table == table && r.name == name)
    }

    fn related_row(&self, relation: &Relation, row: &Row) -> Option<&Row> {
        let key = row.get(&relation.foreign_key).filter(|v| !v.is_null())?;
        self.tables
            .get(&relation.target)?
            .iter()
            .find(|target| target.get("id").is_some_and(|id| loose_eq(id, key)))
    }
}

/// In-process implementation of the backend query capability
#[derive(Debug)]
pub struct MemoryBackend {
    name: String,
    state: Mutex<State>,
}

impl MemoryBackend {
    /// Empty backend; `name` appears in errors and logs
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(State::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state.lock().map_err(|_| state_unavailable(&self.name))
    }

    /// Create or replace a table
    pub fn put_table(&self, table: impl Into<String>, rows: Vec<Row>) {
        if let Ok(mut state) = self.state.lock() {
            state.tables.insert(table.into(), rows);
        }
    }

    pub fn with_table(self, table: impl Into<String>, rows: Vec<Row>) -> Self {
        self.put_table(table, rows);
        self
    }

    pub fn add_relation(&self, relation: Relation) {
        if let Ok(mut state) = self.state.lock() {
            state.relations.retain(|r| !(r.table == relation.table && r.name == relation.name));
            state.relations.push(relation);
        }
    }

    pub fn with_relation(self, relation: Relation) -> Self {
        self.add_relation(relation);
        self
    }

    /// Install a session as if the user had signed in on this backend
    pub fn put_session(&self, session: Option<Session>) {
        if let Ok(mut state) = self.state.lock() {
            state.session = session;
        }
    }

    pub fn with_session(self, session: Session) -> Self {
        self.put_session(Some(session));
        self
    }

    /// Refuse every propagated session (untrusted issuer)
    pub fn set_reject_sessions(&self, reject: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.reject_sessions = reject;
        }
    }

    /// Fail every operation on `table` with `error`
    pub fn fail_table(&self, table: impl Into<String>, error: ExError) {
        self.push_failure(None, table.into(), error);
    }

    /// Fail one kind of operation on `table` with `error`
    pub fn fail_operation(&self, operation: Operation, table: impl Into<String>, error: ExError) {
        self.push_failure(Some(operation), table.into(), error);
    }

    fn push_failure(&self, operation: Option<Operation>, table: String, error: ExError) {
        if let Ok(mut state) = self.state.lock() {
            state.failures.push(Failure {
                operation,
                table,
                error,
            });
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.failures.clear();
        }
    }

    /// Every request received so far, oldest first
    pub fn requests(&self) -> Vec<RequestRecord> {
        self.state
            .lock()
            .map(|s| s.requests.clone())
            .unwrap_or_default()
    }

    /// Requests received for one table
    pub fn requests_for(&self, table: &str) -> Vec<RequestRecord> {
        self.requests()
            .into_iter()
            .filter(|r| r.table == table)
            .collect()
    }

    pub fn clear_requests(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.requests.clear();
        }
    }

    /// Snapshot of a table's stored rows
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.tables.get(table).cloned())
            .unwrap_or_default()
    }

    /// Session currently held, without going through the async client
    pub fn session(&self) -> Option<Session> {
        self.state.lock().ok().and_then(|s| s.session.clone())
    }

    /// Number of sessions accepted through `set_session`
    pub fn session_updates(&self) -> usize {
        self.state.lock().map(|s| s.session_updates).unwrap_or(0)
    }

    fn run_select(&self, state: &State, request: &SelectRequest) -> Result<RowSet> {
        let base = state
            .tables
            .get(&request.table)
            .ok_or_else(|| relation_not_found(&self.name, &request.table))?;

        let mut embeds = Vec::new();
        for selection in &request.select {
            if let Selection::Embed {
                relation,
                columns,
                inner,
            } = selection
            {
                let declared = state
                    .relation(&request.table, relation)
                    .ok_or_else(|| missing_relationship(&self.name, &request.table, relation))?;
                embeds.push((declared, columns.as_slice(), *inner));
            }
        }

        for predicate in &request.predicates {
            if let Some((relation, _)) = predicate.column.split_once('.') {
                if !embeds.iter().any(|(r, _, _)| r.name == relation) {
                    return Err(missing_relationship(&self.name, &request.table, relation));
                }
            }
        }

        let mut matched = Vec::new();
        'rows: for row in base {
            let mut working = row.clone();
            for (relation, columns, inner) in &embeds {
                match state.related_row(relation, row) {
                    Some(target) => {
                        working.insert(relation.name.clone(), Value::Object(project(target, columns)));
                    }
                    None if *inner => continue 'rows,
                    None => {
                        working.insert(relation.name.clone(), Value::Null);
                    }
                }
            }
            if request.predicates.iter().all(|p| matches(&working, p)) {
                matched.push(working);
            }
        }

        if let Some(order) = &request.order {
            sort_rows(&mut matched, order);
        }

        let count = request.count.then_some(matched.len() as u64);
        let windowed: Vec<Row> = match request.range {
            Some(range) => matched
                .into_iter()
                .skip(range.offset)
                .take(range.limit)
                .collect(),
            None => matched,
        };

        let rows = windowed
            .into_iter()
            .map(|row| project_selection(row, &request.select))
            .collect();

        Ok(RowSet { rows, count })
    }
}

#[async_trait]
impl BackendClient for MemoryBackend {
    async fn select(&self, request: &SelectRequest) -> Result<RowSet> {
        let mut state = self.lock()?;
        state.requests.push(RequestRecord::select(request));
        if let Some(error) = state.injected(Operation::Select, &request.table) {
            return Err(error);
        }

        let result = self.run_select(&state, request)?;
        tracing::debug!(
            backend = %self.name,
            table = %request.table,
            rows = result.rows.len(),
            "Served select"
        );
        Ok(result)
    }

    async fn insert(&self, table: &str, rows: Vec<Row>) -> Result<Vec<Row>> {
        let mut state = self.lock()?;
        state
            .requests
            .push(RequestRecord::mutation(Operation::Insert, table, &[]));
        if let Some(error) = state.injected(Operation::Insert, table) {
            return Err(error);
        }

        let existing = state
            .tables
            .get_mut(table)
            .ok_or_else(|| relation_not_found(&self.name, table))?;

        let mut next_id = existing
            .iter()
            .filter_map(|r| r.get("id").and_then(numeric_id))
            .max()
            .unwrap_or(0)
            + 1;

        let mut stored = Vec::with_capacity(rows.len());
        for mut row in rows {
            if row.get("id").map_or(true, Value::is_null) {
                row.insert("id".to_string(), Value::from(next_id));
                next_id += 1;
            }
            existing.push(row.clone());
            stored.push(row);
        }
        Ok(stored)
    }

    async fn update(&self, table: &str, predicates: &[Predicate], patch: Row) -> Result<Vec<Row>> {
        let mut state = self.lock()?;
        state
            .requests
            .push(RequestRecord::mutation(Operation::Update, table, predicates));
        if let Some(error) = state.injected(Operation::Update, table) {
            return Err(error);
        }

        let existing = state
            .tables
            .get_mut(table)
            .ok_or_else(|| relation_not_found(&self.name, table))?;

        let mut updated = Vec::new();
        for row in existing.iter_mut() {
            if predicates.iter().all(|p| matches(row, p)) {
                for (column, value) in &patch {
                    row.insert(column.clone(), value.clone());
                }
                updated.push(row.clone());
            }
        }
        Ok(updated)
    }

    async fn delete(&self, table: &str, predicates: &[Predicate]) -> Result<u64> {
        let mut state = self.lock()?;
        state
            .requests
            .push(RequestRecord::mutation(Operation::Delete, table, predicates));
        if let Some(error) = state.injected(Operation::Delete, table) {
            return Err(error);
        }

        let existing = state
            .tables
            .get_mut(table)
            .ok_or_else(|| relation_not_found(&self.name, table))?;

        let before = existing.len();
        existing.retain(|row| !predicates.iter().all(|p| matches(row, p)));
        Ok((before - existing.len()) as u64)
    }

    async fn current_session(&self) -> Result<Option<Session>> {
        Ok(self.lock()?.session.clone())
    }

    async fn set_session(&self, session: &Session) -> Result<()> {
        let mut state = self.lock()?;
        if state.reject_sessions {
            return Err(session_rejected(&self.name));
        }
        state.session = Some(session.clone());
        state.session_updates += 1;
        Ok(())
    }

    async fn sign_out(&self) -> Result<()> {
        self.lock()?.session = None;
        Ok(())
    }
}

fn project(row: &Row, columns: &[String]) -> Row {
    if columns.is_empty() || columns.iter().any(|c| c == "*") {
        return row.clone();
    }
    columns
        .iter()
        .filter_map(|c| row.get(c).map(|v| (c.clone(), v.clone())))
        .collect()
}

fn project_selection(mut row: Row, select: &[Selection]) -> Row {
    if select.iter().any(|s| matches!(s, Selection::All)) {
        return row;
    }

    let mut projected = Row::new();
    for selection in select {
        let key = match selection {
            Selection::Column(column) => column,
            Selection::Embed { relation, .. } => relation,
            Selection::All => continue,
        };
        if let Some(value) = row.remove(key) {
            projected.insert(key.clone(), value);
        }
    }
    projected
}

fn lookup<'a>(row: &'a Row, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = row.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn matches(row: &Row, predicate: &Predicate) -> bool {
    let value = lookup(row, &predicate.column).filter(|v| !v.is_null());
    match (&predicate.op, value) {
        (PredicateOp::IsNull, value) => value.is_none(),
        (_, None) => false,
        (PredicateOp::Eq(expected), Some(value)) => loose_eq(value, expected),
        (PredicateOp::Neq(expected), Some(value)) => !loose_eq(value, expected),
        (PredicateOp::Gte(bound), Some(value)) => {
            matches!(compare(value, bound), Some(Ordering::Greater | Ordering::Equal))
        }
        (PredicateOp::Lt(bound), Some(value)) => matches!(compare(value, bound), Some(Ordering::Less)),
        (PredicateOp::Lte(bound), Some(value)) => {
            matches!(compare(value, bound), Some(Ordering::Less | Ordering::Equal))
        }
        (PredicateOp::In(values), Some(value)) => values.iter().any(|v| loose_eq(value, v)),
    }
}

fn sort_rows(rows: &mut [Row], order: &SortSpec) {
    rows.sort_by(|a, b| {
        let left = lookup(a, &order.column).filter(|v| !v.is_null());
        let right = lookup(b, &order.column).filter(|v| !v.is_null());
        match (left, right) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(l), Some(r)) => {
                let ordering = compare(l, r).unwrap_or(Ordering::Equal);
                if order.direction.is_ascending() {
                    ordering
                } else {
                    ordering.reverse()
                }
            }
        }
    });
}

/// Text form of a scalar; ids arrive as numbers or strings interchangeably
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (scalar_text(a), scalar_text(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x.partial_cmp(&y);
    }
    Some(scalar_text(a)?.cmp(&scalar_text(b)?))
}

fn numeric_id(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}
