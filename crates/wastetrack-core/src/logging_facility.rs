//! Structured logging for the console engine
//!
//! `init` installs the process subscriber once (the CLI calls it from
//! `main`); library code only emits events, through the lifecycle macros
//! for public operations and plain `tracing` calls for per-backend detail.
//! Tests install `init_test_capture` instead and assert on captured fields.
//!
//! ```rust
//! use wastetrack_core::logging_facility::{init, Profile};
//!
//! init(Profile::from_name("prod"));
//! ```

pub mod init;
pub mod macros;
pub mod test_capture;

pub use init::{init, Profile};
pub use test_capture::{init_test_capture, CapturedEvent, TestCapture};
