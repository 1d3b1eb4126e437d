//! List filters, sorting and paging parameters

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::errors::{Result, TrackError};
use crate::model::{BackendKey, EstablishmentFilter};

/// Inclusive date range applied to a table's date column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        Self { from, to }
    }

    pub fn is_empty(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    /// Reject ranges whose start lies after their end
    ///
    /// # Errors
    ///
    /// Returns `Validation` for an inverted range.
    pub fn validate(&self) -> Result<()> {
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(TrackError::validation(format!(
                    "date range starts after it ends ({} > {})",
                    from, to
                )));
            }
        }
        Ok(())
    }

    /// Exclusive upper bound: the day after `to`
    ///
    /// Lets timestamp columns match every instant of the last day.
    pub fn exclusive_end(&self) -> Option<NaiveDate> {
        self.to.and_then(|to| to.checked_add_days(Days::new(1)))
    }
}

/// An id that is only meaningful on one backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BackendScopedId {
    pub backend: BackendKey,
    pub id: String,
}

impl BackendScopedId {
    pub fn new(backend: BackendKey, id: impl Into<String>) -> Self {
        Self {
            backend,
            id: id.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn is_ascending(&self) -> bool {
        matches!(self, SortDirection::Asc)
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => f.write_str("asc"),
            SortDirection::Desc => f.write_str("desc"),
        }
    }
}

/// Single sort key and direction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub column: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Desc,
        }
    }

    /// Parse `column` or `column:asc|desc`
    ///
    /// # Errors
    ///
    /// Returns `Validation` for an empty column or unknown direction.
    pub fn parse(value: &str) -> Result<Self> {
        let (column, direction) = match value.split_once(':') {
            Some((column, dir)) => {
                let direction = match dir.trim().to_ascii_lowercase().as_str() {
                    "asc" => SortDirection::Asc,
                    "desc" => SortDirection::Desc,
                    other => {
                        return Err(TrackError::validation(format!(
                            "unknown sort direction '{}'",
                            other
                        )))
                    }
                };
                (column.trim(), direction)
            }
            None => (value.trim(), SortDirection::Asc),
        };

        if column.is_empty() {
            return Err(TrackError::validation("sort column is empty"));
        }

        Ok(Self {
            column: column.to_string(),
            direction,
        })
    }
}

/// Zero-based page index and page size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub index: usize,
    pub size: usize,
}

/// Default rows per page in list views
pub const DEFAULT_PAGE_SIZE: usize = 25;

impl PageRequest {
    pub fn new(index: usize, size: usize) -> Self {
        Self { index, size }
    }

    pub fn first(size: usize) -> Self {
        Self { index: 0, size }
    }

    pub fn offset(&self) -> usize {
        self.index.saturating_mul(self.size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::first(DEFAULT_PAGE_SIZE)
    }
}

/// Filters last applied in the active list view
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListFilters {
    pub date_range: DateRange,
    pub unit_ids: BTreeSet<BackendScopedId>,
    pub establishment_filter: EstablishmentFilter,
    pub sort_key: Option<String>,
    pub sort_direction: SortDirection,
}

impl ListFilters {
    /// Sort selected by the user, if any
    pub fn sort(&self) -> Option<SortSpec> {
        self.sort_key.as_ref().map(|column| SortSpec {
            column: column.clone(),
            direction: self.sort_direction,
        })
    }

    /// Unit ids that belong to `backend`
    pub fn unit_ids_for(&self, backend: BackendKey) -> Vec<&str> {
        self.unit_ids
            .iter()
            .filter(|u| u.backend == backend)
            .map(|u| u.id.as_str())
            .collect()
    }

    pub fn has_unit_filter(&self) -> bool {
        !self.unit_ids.is_empty()
    }
}
