//! Backend query capability
//!
//! A `BackendClient` is the hosted data project as seen from the console:
//! row selection with predicates, ordering, ranges and exact counts, row
//! mutations, and the authenticated session. The transport behind it is
//! opaque; `wastetrack-store` provides an in-memory implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::errors::{BackendResult, TrackError};
use crate::model::{Row, Session, SortSpec};

/// One element of a select shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Selection {
    /// Every column of the base table (`*`)
    All,
    Column(String),
    /// Embedded related rows; `inner` drops base rows without a match
    Embed {
        relation: String,
        columns: Vec<String>,
        inner: bool,
    },
}

impl Selection {
    pub fn column(name: impl Into<String>) -> Self {
        Selection::Column(name.into())
    }

    pub fn embed(relation: impl Into<String>, columns: &[&str]) -> Self {
        Selection::Embed {
            relation: relation.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            inner: false,
        }
    }

    pub fn embed_inner(relation: impl Into<String>, columns: &[&str]) -> Self {
        Selection::Embed {
            relation: relation.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            inner: true,
        }
    }

    /// Parse `*`, `column`, `relation(a,b)` or `relation!inner(a,b)`
    ///
    /// # Errors
    ///
    /// Returns `Validation` for empty or unbalanced expressions.
    pub fn parse(expr: &str) -> crate::errors::Result<Self> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(TrackError::validation("empty select expression"));
        }
        if expr == "*" {
            return Ok(Selection::All);
        }

        let Some(open) = expr.find('(') else {
            return Ok(Selection::Column(expr.to_string()));
        };
        if !expr.ends_with(')') {
            return Err(TrackError::validation(format!(
                "unbalanced select expression '{}'",
                expr
            )));
        }

        let head = &expr[..open];
        let (relation, inner) = match head.strip_suffix("!inner") {
            Some(relation) => (relation, true),
            None => (head, false),
        };
        if relation.is_empty() {
            return Err(TrackError::validation(format!(
                "select expression '{}' has no relation",
                expr
            )));
        }

        let columns = expr[open + 1..expr.len() - 1]
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Selection::Embed {
            relation: relation.to_string(),
            columns,
            inner,
        })
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::All => f.write_str("*"),
            Selection::Column(name) => f.write_str(name),
            Selection::Embed {
                relation,
                columns,
                inner,
            } => {
                let marker = if *inner { "!inner" } else { "" };
                write!(f, "{}{}({})", relation, marker, columns.join(","))
            }
        }
    }
}

impl TryFrom<String> for Selection {
    type Error = TrackError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Selection::parse(&value)
    }
}

impl From<Selection> for String {
    fn from(value: Selection) -> Self {
        value.to_string()
    }
}

/// Comparison applied by a predicate
#[derive(Debug, Clone, PartialEq)]
pub enum PredicateOp {
    Eq(Value),
    Neq(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    IsNull,
}

/// Row filter on a column path
///
/// Dotted paths (`units.establishment_id`) address a column of an embedded
/// relation.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: String,
    pub op: PredicateOp,
}

impl Predicate {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            op: PredicateOp::Eq(value.into()),
        }
    }

    pub fn neq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            op: PredicateOp::Neq(value.into()),
        }
    }

    pub fn gte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            op: PredicateOp::Gte(value.into()),
        }
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            op: PredicateOp::Lt(value.into()),
        }
    }

    pub fn lte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            op: PredicateOp::Lte(value.into()),
        }
    }

    pub fn in_list<V: Into<Value>>(column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self {
            column: column.into(),
            op: PredicateOp::In(values.into_iter().map(Into::into).collect()),
        }
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            op: PredicateOp::IsNull,
        }
    }
}

/// Offset/limit window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowRange {
    pub offset: usize,
    pub limit: usize,
}

/// A filtered, ordered, ranged row selection
#[derive(Debug, Clone, PartialEq)]
pub struct SelectRequest {
    pub table: String,
    pub select: Vec<Selection>,
    pub predicates: Vec<Predicate>,
    pub order: Option<SortSpec>,
    pub range: Option<RowRange>,
    /// Ask for the exact number of matching rows
    pub count: bool,
}

impl SelectRequest {
    /// Select every column of `table`
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            select: vec![Selection::All],
            predicates: Vec::new(),
            order: None,
            range: None,
            count: false,
        }
    }

    pub fn select(mut self, shape: Vec<Selection>) -> Self {
        self.select = shape;
        self
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn order(mut self, sort: SortSpec) -> Self {
        self.order = Some(sort);
        self
    }

    pub fn range(mut self, offset: usize, limit: usize) -> Self {
        self.range = Some(RowRange { offset, limit });
        self
    }

    pub fn with_count(mut self) -> Self {
        self.count = true;
        self
    }
}

/// Rows returned by a select, plus the exact count when requested
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    pub rows: Vec<Row>,
    pub count: Option<u64>,
}

/// The hosted backend as seen from the console
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Run a row selection
    ///
    /// # Errors
    ///
    /// `RelationNotFound` when the table or an embedded relation does not
    /// exist; any other kind for backend-side failures.
    async fn select(&self, request: &SelectRequest) -> BackendResult<RowSet>;

    /// Insert rows, returning them as stored
    async fn insert(&self, table: &str, rows: Vec<Row>) -> BackendResult<Vec<Row>>;

    /// Apply `patch` to every row matching all predicates
    async fn update(&self, table: &str, predicates: &[Predicate], patch: Row)
        -> BackendResult<Vec<Row>>;

    /// Delete every row matching all predicates, returning how many went
    async fn delete(&self, table: &str, predicates: &[Predicate]) -> BackendResult<u64>;

    /// Session currently held by this backend client
    async fn current_session(&self) -> BackendResult<Option<Session>>;

    /// Adopt a session issued by another backend
    ///
    /// # Errors
    ///
    /// `Unauthorised` when the backend does not trust the token.
    async fn set_session(&self, session: &Session) -> BackendResult<()>;

    /// Drop the current session
    async fn sign_out(&self) -> BackendResult<()>;
}
