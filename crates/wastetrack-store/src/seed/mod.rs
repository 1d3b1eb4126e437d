//! Seed import
//!
//! Provides:
//! - Seed Format v0 schema
//! - YAML parser with validation
//! - Loader building a `MemoryBackend` from a parsed seed

pub mod format_v0;
pub mod loader;
pub mod parser;

pub use format_v0::{SeedSession, SeedV0};
pub use loader::{load_seed, load_seed_file, load_seed_str};
pub use parser::{parse_seed_file, parse_seed_str};
