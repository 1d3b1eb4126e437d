pub mod backend_key;
pub mod establishment;
pub mod filters;
pub mod identity;
pub mod lookup;
pub mod row;
pub mod scope;

pub use backend_key::BackendKey;
pub use establishment::{EstablishmentFilter, EstablishmentRef, EstablishmentToken};
pub use filters::{
    BackendScopedId, DateRange, ListFilters, PageRequest, SortDirection, SortSpec, DEFAULT_PAGE_SIZE,
};
pub use identity::{Identity, Role, Session};
pub use lookup::{LookupCache, LookupKind, LookupRecord};
pub use row::{cell_text, AggregatedRow, QueryOutcome, Row};
pub use scope::{ScopeContext, ScopeMode};
