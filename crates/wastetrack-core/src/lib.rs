//! WasteTrack Core - domain model and synchronous kernel
//!
//! This crate provides the foundations shared by the store and engine:
//! - Domain model: backends, identity, establishments, scope, filters, rows
//! - Backend query capability (`BackendClient`) and request types
//! - Table descriptor registry with per-backend shapes
//! - Scope resolver and view-state store
//! - Request sequencer for discarding stale responses
//! - Deployment configuration
//! - Error and logging facilities

pub mod backend;
pub mod config;
pub mod errors;
pub mod logging_facility;
pub mod model;
pub mod scope;
pub mod sequencer;
pub mod state;
pub mod tables;

// Logging macros refer to schema constants through this path
pub use wastetrack_core_types::schema;

// Re-export commonly used types
pub use backend::{BackendClient, Predicate, RowSet, SelectRequest, Selection};
pub use config::{DeploymentConfig, FederatedPaging};
pub use errors::{ExError, ExErrorKind, Result, TrackError};
pub use model::{BackendKey, Identity, ScopeContext};
pub use scope::resolve_scope;
pub use sequencer::{RequestSequencer, RequestTicket};
pub use state::ViewState;
pub use tables::{TableDescriptor, TableRegistry};
