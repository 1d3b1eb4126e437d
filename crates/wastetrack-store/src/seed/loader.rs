//! Build an in-memory backend from a seed

use std::path::Path;

use crate::errors::Result;
use crate::memory::MemoryBackend;
use crate::seed::format_v0::SeedV0;
use crate::seed::parser::{parse_seed_file, parse_seed_str};

/// Populate a new backend called `name` from a parsed seed
pub fn load_seed(name: &str, seed: SeedV0) -> MemoryBackend {
    let backend = MemoryBackend::new(name);
    let table_count = seed.tables.len();

    for (table, rows) in seed.tables {
        backend.put_table(table, rows);
    }
    for relation in seed.relations {
        backend.add_relation(relation);
    }
    backend.put_session(seed.session.as_ref().map(|s| s.to_session()));

    tracing::debug!(backend = %name, tables = table_count, "Loaded seed");

    backend
}

/// Parse, validate and load a YAML seed
pub fn load_seed_str(name: &str, content: &str) -> Result<MemoryBackend> {
    Ok(load_seed(name, parse_seed_str(content)?))
}

/// Read, parse, validate and load a YAML seed file
pub fn load_seed_file(name: &str, path: &Path) -> Result<MemoryBackend> {
    Ok(load_seed(name, parse_seed_file(path)?))
}
