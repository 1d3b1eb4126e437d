//! Table descriptor registry
//!
//! Every queryable table is described once: its display and date columns,
//! which columns may be sorted, the lookup cache it feeds, and one shape per
//! backend. A shape is the per-backend adapter: what to select (embedded
//! relations differ between projects), which path carries establishment
//! ownership, and which column holds the unit id.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::backend::Selection;
use crate::errors::{Result, TrackError};
use crate::model::{BackendKey, LookupKind, SortSpec};

/// Where a table's establishment ownership lives
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EstablishmentPath {
    /// The table is not partitioned by establishment on this backend
    #[default]
    None,
    /// Foreign key on the table itself
    Direct { column: String },
    /// Foreign key on a joined parent entity
    Joined { relation: String, column: String },
}

impl EstablishmentPath {
    pub fn direct(column: impl Into<String>) -> Self {
        EstablishmentPath::Direct {
            column: column.into(),
        }
    }

    pub fn joined(relation: impl Into<String>, column: impl Into<String>) -> Self {
        EstablishmentPath::Joined {
            relation: relation.into(),
            column: column.into(),
        }
    }

    /// Column path an establishment predicate must target
    pub fn predicate_column(&self) -> Option<String> {
        match self {
            EstablishmentPath::None => None,
            EstablishmentPath::Direct { column } => Some(column.clone()),
            EstablishmentPath::Joined { relation, column } => {
                Some(format!("{}.{}", relation, column))
            }
        }
    }

    pub fn is_scoped(&self) -> bool {
        !matches!(self, EstablishmentPath::None)
    }
}

/// Per-backend select/column adapter for one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableShape {
    #[serde(default = "default_select")]
    pub select: Vec<Selection>,
    #[serde(default)]
    pub establishment_path: EstablishmentPath,
    #[serde(default)]
    pub unit_column: Option<String>,
}

fn default_select() -> Vec<Selection> {
    vec![Selection::All]
}

impl Default for TableShape {
    fn default() -> Self {
        Self {
            select: default_select(),
            establishment_path: EstablishmentPath::None,
            unit_column: None,
        }
    }
}

impl TableShape {
    pub fn new(select: Vec<Selection>, establishment_path: EstablishmentPath) -> Self {
        Self {
            select,
            establishment_path,
            unit_column: None,
        }
    }

    pub fn with_unit_column(mut self, column: impl Into<String>) -> Self {
        self.unit_column = Some(column.into());
        self
    }

    /// Select shape for a query, restricted to one establishment or not
    ///
    /// A joined establishment path needs its relation embedded as an inner
    /// join carrying the ownership column, otherwise the predicate cannot
    /// exclude rows.
    pub fn select_for(&self, establishment_restricted: bool) -> Vec<Selection> {
        let mut select = self.select.clone();
        let EstablishmentPath::Joined { relation, column } = &self.establishment_path else {
            return select;
        };
        if !establishment_restricted {
            return select;
        }

        let existing = select.iter_mut().find_map(|s| match s {
            Selection::Embed {
                relation: r,
                columns,
                inner,
            } if r.as_str() == relation.as_str() => Some((columns, inner)),
            _ => None,
        });

        match existing {
            Some((columns, inner)) => {
                *inner = true;
                if !columns.iter().any(|c| c == column || c == "*") {
                    columns.push(column.clone());
                }
            }
            None => select.push(Selection::Embed {
                relation: relation.clone(),
                columns: vec![column.clone()],
                inner: true,
            }),
        }

        select
    }
}

/// Everything the engine knows about one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub name: String,
    /// Column shown in selectors and summaries
    pub display_column: String,
    /// Column the date-range filter applies to
    pub date_column: Option<String>,
    pub sortable: Vec<String>,
    pub default_sort: SortSpec,
    /// Lookup cache fed by this table
    pub lookup: Option<LookupKind>,
    pub shapes: BTreeMap<BackendKey, TableShape>,
}

impl TableDescriptor {
    pub fn new(name: impl Into<String>, display_column: impl Into<String>, default_sort: SortSpec) -> Self {
        let default_column = default_sort.column.clone();
        Self {
            name: name.into(),
            display_column: display_column.into(),
            date_column: None,
            sortable: vec![default_column],
            default_sort,
            lookup: None,
            shapes: BTreeMap::new(),
        }
    }

    pub fn with_date_column(mut self, column: impl Into<String>) -> Self {
        self.date_column = Some(column.into());
        self
    }

    pub fn with_sortable(mut self, columns: &[&str]) -> Self {
        for column in columns {
            if !self.sortable.iter().any(|c| c == column) {
                self.sortable.push(column.to_string());
            }
        }
        self
    }

    pub fn with_lookup(mut self, kind: LookupKind) -> Self {
        self.lookup = Some(kind);
        self
    }

    pub fn with_shape(mut self, backend: BackendKey, shape: TableShape) -> Self {
        self.shapes.insert(backend, shape);
        self
    }

    /// Shape for a backend; `None` when the table does not exist there
    pub fn shape(&self, backend: BackendKey) -> Option<&TableShape> {
        self.shapes.get(&backend)
    }

    pub fn is_sortable(&self, column: &str) -> bool {
        self.sortable.iter().any(|c| c == column)
    }

    /// Requested sort, or the table default when none was given
    ///
    /// # Errors
    ///
    /// Returns `Validation` when the column is not sortable for this table.
    pub fn resolve_sort(&self, requested: Option<&SortSpec>) -> Result<SortSpec> {
        match requested {
            None => Ok(self.default_sort.clone()),
            Some(sort) if self.is_sortable(&sort.column) => Ok(sort.clone()),
            Some(sort) => Err(TrackError::validation(format!(
                "column '{}' is not sortable on {}",
                sort.column, self.name
            ))),
        }
    }
}

/// Table descriptor as written in a deployment file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    pub name: String,
    pub display_column: String,
    #[serde(default)]
    pub date_column: Option<String>,
    #[serde(default)]
    pub sortable: Vec<String>,
    pub default_sort: SortSpec,
    #[serde(default)]
    pub lookup: Option<LookupKind>,
    /// Keyed by backend wire name
    #[serde(default)]
    pub shapes: BTreeMap<String, TableShape>,
}

impl TableConfig {
    /// Validate and convert into a descriptor
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for unknown backend keys or a default sort
    /// column that is not listed as sortable.
    pub fn into_descriptor(self) -> Result<TableDescriptor> {
        let mut shapes = BTreeMap::new();
        for (key, shape) in self.shapes {
            let backend = BackendKey::parse(&key).ok_or_else(|| TrackError::InvalidConfig {
                reason: format!("table {} declares unknown backend '{}'", self.name, key),
            })?;
            shapes.insert(backend, shape);
        }

        let mut sortable = self.sortable;
        if sortable.is_empty() {
            sortable.push(self.default_sort.column.clone());
        }
        if !sortable.contains(&self.default_sort.column) {
            return Err(TrackError::InvalidConfig {
                reason: format!(
                    "table {} default sort '{}' is not sortable",
                    self.name, self.default_sort.column
                ),
            });
        }

        Ok(TableDescriptor {
            name: self.name,
            display_column: self.display_column,
            date_column: self.date_column,
            sortable,
            default_sort: self.default_sort,
            lookup: self.lookup,
            shapes,
        })
    }
}

/// Registry of table descriptors, resolved once at startup
#[derive(Debug, Clone, Default)]
pub struct TableRegistry {
    tables: BTreeMap<String, TableDescriptor>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a descriptor
    pub fn register(&mut self, descriptor: TableDescriptor) {
        self.tables.insert(descriptor.name.clone(), descriptor);
    }

    pub fn get(&self, name: &str) -> Option<&TableDescriptor> {
        self.tables.get(name)
    }

    /// # Errors
    ///
    /// Returns `UnknownTable` when no descriptor is registered.
    pub fn require(&self, name: &str) -> Result<&TableDescriptor> {
        self.get(name).ok_or_else(|| TrackError::UnknownTable {
            table: name.to_string(),
        })
    }

    /// Descriptor backing a lookup cache
    pub fn for_lookup(&self, kind: LookupKind) -> Option<&TableDescriptor> {
        self.tables.values().find(|t| t.lookup == Some(kind))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Descriptors of the standard SST/HPL deployment
    ///
    /// The secondary project has no multi-establishment concept: none of its
    /// shapes declare an establishment path, and several tables lack the
    /// joined relations the primary project carries.
    pub fn standard() -> Self {
        use BackendKey::{Primary, Secondary};

        let mut registry = Self::new();

        registry.register(
            TableDescriptor::new("establishments", "name", SortSpec::asc("name"))
                .with_shape(Primary, TableShape::new(vec![Selection::All], EstablishmentPath::direct("id"))),
        );

        registry.register(
            TableDescriptor::new("units", "name", SortSpec::asc("name"))
                .with_sortable(&["created_at"])
                .with_lookup(LookupKind::Units)
                .with_shape(
                    Primary,
                    TableShape::new(vec![Selection::All], EstablishmentPath::direct("establishment_id"))
                        .with_unit_column("id"),
                )
                .with_shape(
                    Secondary,
                    TableShape::new(vec![Selection::All], EstablishmentPath::None).with_unit_column("id"),
                ),
        );

        registry.register(
            TableDescriptor::new("supplies", "name", SortSpec::asc("name"))
                .with_sortable(&["category", "stock"])
                .with_lookup(LookupKind::Supplies)
                .with_shape(
                    Primary,
                    TableShape::new(vec![Selection::All], EstablishmentPath::direct("establishment_id")),
                )
                .with_shape(Secondary, TableShape::default()),
        );

        registry.register(
            TableDescriptor::new("agreements", "name", SortSpec::asc("name"))
                .with_date_column("start_date")
                .with_sortable(&["provider", "start_date", "end_date"])
                .with_lookup(LookupKind::Agreements)
                .with_shape(
                    Primary,
                    TableShape::new(vec![Selection::All], EstablishmentPath::direct("establishment_id")),
                )
                .with_shape(Secondary, TableShape::default()),
        );

        for (table, date_column) in [("hazardous_waste", "collected_on"), ("waste_records", "recorded_on")] {
            registry.register(
                TableDescriptor::new(table, "waste_type", SortSpec::desc(date_column))
                    .with_date_column(date_column)
                    .with_sortable(&["waste_type", "weight_kg"])
                    .with_shape(
                        Primary,
                        TableShape::new(
                            vec![
                                Selection::All,
                                Selection::embed_inner("units", &["name", "establishment_id"]),
                            ],
                            EstablishmentPath::joined("units", "establishment_id"),
                        )
                        .with_unit_column("unit_id"),
                    )
                    .with_shape(
                        Secondary,
                        TableShape::new(
                            vec![Selection::All, Selection::embed("units", &["name"])],
                            EstablishmentPath::None,
                        )
                        .with_unit_column("unit_id"),
                    ),
            );
        }

        registry.register(
            TableDescriptor::new("supply_movements", "movement_type", SortSpec::desc("moved_on"))
                .with_date_column("moved_on")
                .with_sortable(&["quantity", "movement_type"])
                .with_shape(
                    Primary,
                    TableShape::new(
                        vec![
                            Selection::All,
                            Selection::embed_inner("supplies", &["name", "establishment_id"]),
                            Selection::embed("units", &["name"]),
                        ],
                        EstablishmentPath::joined("supplies", "establishment_id"),
                    )
                    .with_unit_column("unit_id"),
                )
                .with_shape(
                    Secondary,
                    TableShape::new(
                        vec![Selection::All, Selection::embed("supplies", &["name"])],
                        EstablishmentPath::None,
                    )
                    .with_unit_column("unit_id"),
                ),
        );

        registry.register(
            TableDescriptor::new("equipment_loans", "equipment", SortSpec::desc("loaned_on"))
                .with_date_column("loaned_on")
                .with_sortable(&["equipment", "returned_on"])
                .with_shape(
                    Primary,
                    TableShape::new(
                        vec![
                            Selection::All,
                            Selection::embed_inner("units", &["name", "establishment_id"]),
                        ],
                        EstablishmentPath::joined("units", "establishment_id"),
                    )
                    .with_unit_column("unit_id"),
                )
                .with_shape(
                    Secondary,
                    TableShape::new(vec![Selection::All], EstablishmentPath::None).with_unit_column("unit_id"),
                ),
        );

        registry.register(
            TableDescriptor::new("removals", "waste_type", SortSpec::desc("removed_on"))
                .with_date_column("removed_on")
                .with_sortable(&["weight_kg", "waste_type"])
                .with_shape(
                    Primary,
                    TableShape::new(
                        vec![
                            Selection::All,
                            Selection::embed_inner("agreements", &["name", "establishment_id"]),
                        ],
                        EstablishmentPath::joined("agreements", "establishment_id"),
                    ),
                )
                .with_shape(
                    Secondary,
                    TableShape::new(
                        vec![Selection::All, Selection::embed("agreements", &["name"])],
                        EstablishmentPath::None,
                    ),
                ),
        );

        registry
    }
}
