//! Seed parser with validation
//!
//! Parses YAML and validates schema version, session fields and that every
//! relation joins two declared tables

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::errors::{io_error, seed_validation, Result};
use crate::seed::format_v0::SeedV0;

/// Parse a seed file from a path
pub fn parse_seed_file(path: &Path) -> Result<SeedV0> {
    let content = fs::read_to_string(path).map_err(|e| io_error("seed_read", e))?;
    parse_seed_str(&content)
}

/// Parse a seed from a string
pub fn parse_seed_str(content: &str) -> Result<SeedV0> {
    let seed: SeedV0 = serde_yaml::from_str(content)
        .map_err(|e| seed_validation(&format!("YAML parse error: {}", e)))?;

    validate_seed(&seed)?;

    Ok(seed)
}

fn validate_seed(seed: &SeedV0) -> Result<()> {
    if seed.schema_version != 0 {
        return Err(seed_validation(&format!(
            "Unsupported schema_version: {}. Expected 0",
            seed.schema_version
        )));
    }

    if let Some(session) = &seed.session {
        if session.user_id.trim().is_empty() || session.access_token.trim().is_empty() {
            return Err(seed_validation(
                "Session requires a non-empty user_id and access_token",
            ));
        }
    }

    let mut names = HashSet::new();
    for relation in &seed.relations {
        for table in [&relation.table, &relation.target] {
            if !seed.tables.contains_key(table) {
                return Err(seed_validation(&format!(
                    "Relation {} references undeclared table: {}",
                    relation.name, table
                )));
            }
        }
        if !names.insert((&relation.table, &relation.name)) {
            return Err(seed_validation(&format!(
                "Duplicate relation {} on table {}",
                relation.name, relation.table
            )));
        }
    }

    Ok(())
}
