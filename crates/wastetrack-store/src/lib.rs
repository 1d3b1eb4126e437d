//! WasteTrack Store - in-memory backend and seed loading
//!
//! Provides:
//! - `MemoryBackend`, an in-process implementation of `BackendClient`
//!   with relations, embeds, predicates, ordering, ranges and exact counts
//! - Seed Format v0 (YAML) parser and loader
//! - Failure injection and a request log for engine tests

pub mod errors;
pub mod memory;
pub mod seed;

// Re-export key types
pub use errors::Result;
pub use memory::{MemoryBackend, Operation, Relation, RequestRecord};
