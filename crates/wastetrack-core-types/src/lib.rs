//! Core types shared across WasteTrack crates
//!
//! This crate provides foundational types used by the error and logging
//! facilities and by every backend-facing component:
//!
//! - **Correlation types**: RequestId
//! - **Sensitive data**: Sensitive<T> marker for session tokens
//! - **Schema constants**: Canonical field keys and event names

pub mod correlation;
pub mod schema;
pub mod sensitive;

pub use correlation::RequestId;
pub use sensitive::Sensitive;
