//! WasteTrack Engine - Orchestration layer
//!
//! Coordinates the configured backends on behalf of the console:
//! - Backend client registry
//! - Session propagation and identity resolution
//! - Aggregating query engine with federated fan-out and full-table fetch
//! - Lookup cache loader and mutation service
//! - `Console`, the dependency-injected entry point tying them together

pub mod cache;
pub mod console;
pub mod mutation;
pub mod query;
pub mod registry;
pub mod session;

pub use cache::CacheLoader;
pub use console::Console;
pub use mutation::MutationService;
pub use query::{fetch_all, Latest, QueryEngine, ScopedRows};
pub use registry::{BackendHandle, BackendRegistry};
pub use session::AuthOutcome;
