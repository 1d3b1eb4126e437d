//! Seed Format v0 schema
//!
//! Defines the YAML structure of a backend seed:
//!
//! ```yaml
//! schema_version: 0
//! session:
//!   user_id: u-1
//!   email: staff@example.org
//!   access_token: token-1
//! relations:
//!   - table: hazardous_waste
//!     name: units
//!     foreign_key: unit_id
//!     target: units
//! tables:
//!   units:
//!     - { id: 1, name: ICU, establishment_id: 7 }
//!   hazardous_waste: []
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use wastetrack_core::model::{Row, Session};

use crate::memory::Relation;

/// Top-level seed file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedV0 {
    /// Schema version (must be 0 for this format)
    pub schema_version: u32,

    /// Session the backend holds at start, as after an interactive sign-in
    #[serde(default)]
    pub session: Option<SeedSession>,

    #[serde(default)]
    pub relations: Vec<Relation>,

    /// Table name to rows; an empty list declares an empty table
    #[serde(default)]
    pub tables: BTreeMap<String, Vec<Row>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedSession {
    pub user_id: String,
    pub email: String,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl SeedSession {
    pub fn to_session(&self) -> Session {
        let session = Session::new(&self.user_id, &self.email, &self.access_token);
        match &self.refresh_token {
            Some(token) => session.with_refresh_token(token),
            None => session,
        }
    }
}
