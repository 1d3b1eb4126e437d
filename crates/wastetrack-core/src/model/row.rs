//! Rows returned by backends and their aggregated form

use serde::Serialize;
use wastetrack_core_types::RequestId;

use crate::model::BackendKey;

/// A record as returned by a backend
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Cell rendered as text; `None` for null
///
/// Ids arrive as numbers from one backend and strings from another, so
/// comparisons and lookups go through this form.
pub fn cell_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Backend row annotated with its provenance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedRow {
    pub source_backend: BackendKey,
    pub source_display_name: String,
    pub row: Row,
}

impl AggregatedRow {
    pub fn new(source_backend: BackendKey, source_display_name: impl Into<String>, row: Row) -> Self {
        Self {
            source_backend,
            source_display_name: source_display_name.into(),
            row,
        }
    }

    /// Field value by column name
    pub fn get(&self, column: &str) -> Option<&serde_json::Value> {
        self.row.get(column)
    }

    /// Field value rendered as a string (strings unquoted, numbers formatted)
    pub fn get_str(&self, column: &str) -> Option<String> {
        cell_text(self.row.get(column)?)
    }
}

/// Result of an aggregated query
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub rows: Vec<AggregatedRow>,
    /// Total matching rows, summed across backends
    pub total_count: u64,
    pub request_id: RequestId,
    /// Display names of backends whose contribution was dropped after an error
    pub failed_backends: Vec<String>,
}

impl QueryOutcome {
    pub fn empty(request_id: RequestId) -> Self {
        Self {
            rows: Vec::new(),
            total_count: 0,
            request_id,
            failed_backends: Vec::new(),
        }
    }

    pub fn is_partial(&self) -> bool {
        !self.failed_backends.is_empty()
    }
}
