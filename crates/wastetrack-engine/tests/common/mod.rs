// Shared fixture: a two-backend deployment seeded with in-memory data.
// SST (primary) has two establishments (7 "Norte", 8 "Sur"); HPL (secondary)
// is single-establishment and has no equipment_loans table.

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::{json, Value};
use wastetrack_core::backend::BackendClient;
use wastetrack_core::config::DeploymentConfig;
use wastetrack_core::model::{BackendKey, EstablishmentRef, Identity, Row, Session};
use wastetrack_engine::{BackendHandle, BackendRegistry, QueryEngine};
use wastetrack_store::{MemoryBackend, Relation};

pub const ACCESS_TOKEN: &str = "token-admin";

pub fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        _ => panic!("test rows must be objects"),
    }
}

pub fn rows(values: Vec<Value>) -> Vec<Row> {
    values.into_iter().map(row).collect()
}

pub struct Fixture {
    pub primary: Arc<MemoryBackend>,
    pub secondary: Arc<MemoryBackend>,
    pub config: DeploymentConfig,
    pub registry: Arc<BackendRegistry>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(DeploymentConfig::default())
    }

    pub fn with_config(config: DeploymentConfig) -> Self {
        let primary = Arc::new(primary_backend());
        let secondary = Arc::new(secondary_backend());
        let registry = Arc::new(
            BackendRegistry::new(vec![
                BackendHandle::new(BackendKey::Primary, "SST", primary.clone() as Arc<dyn BackendClient>),
                BackendHandle::new(BackendKey::Secondary, "HPL", secondary.clone() as Arc<dyn BackendClient>),
            ])
            .unwrap(),
        );
        Self {
            primary,
            secondary,
            config,
            registry,
        }
    }

    pub fn engine(&self) -> QueryEngine {
        let tables = Arc::new(self.config.table_registry().unwrap());
        QueryEngine::new(self.registry.clone(), tables, &self.config)
    }

    pub fn clear_requests(&self) {
        self.primary.clear_requests();
        self.secondary.clear_requests();
    }

    /// Sign in on the primary backend as `user_id`
    pub fn sign_in(&self, user_id: &str) -> Session {
        let session = Session::new(user_id, format!("{}@example.org", user_id), ACCESS_TOKEN);
        self.primary.put_session(Some(session.clone()));
        session
    }
}

pub fn admin() -> Identity {
    Identity::new("u-admin", "admin@example.org", "admin", None)
}

pub fn staff_at(id: &str, backend: BackendKey) -> Identity {
    Identity::new(
        "u-staff",
        "staff@example.org",
        "staff",
        Some(EstablishmentRef::new(id, "Site", backend)),
    )
}

fn primary_backend() -> MemoryBackend {
    MemoryBackend::new("SST")
        .with_table(
            "profiles",
            rows(vec![
                json!({"id": "u-admin", "email": "admin@example.org", "role": "admin"}),
                json!({"id": "u-norte", "email": "norte@example.org", "role": "staff",
                       "establishment_backend": "primary", "establishment_id": 7}),
                json!({"id": "u-legacy", "email": "legacy@example.org", "role": "staff",
                       "establishment_id": 8}),
                json!({"id": "u-hpl", "email": "hpl@example.org", "role": "Staff HPL"}),
                json!({"id": "u-hpl-explicit", "email": "hx@example.org", "role": "staff",
                       "establishment_backend": "secondary", "establishment_id": "1"}),
                json!({"id": "u-stray", "email": "stray@example.org", "role": "Staff HPL",
                       "establishment_backend": "tertiary", "establishment_id": 7}),
            ]),
        )
        .with_table(
            "establishments",
            rows(vec![
                json!({"id": 7, "name": "Norte"}),
                json!({"id": 8, "name": "Sur"}),
            ]),
        )
        .with_table(
            "units",
            rows(vec![
                json!({"id": 1, "name": "ICU", "establishment_id": 7}),
                json!({"id": 2, "name": "Laboratory", "establishment_id": 7}),
                json!({"id": 3, "name": "Pharmacy", "establishment_id": 8}),
            ]),
        )
        .with_table(
            "supplies",
            rows(vec![
                json!({"id": 1, "name": "Gloves", "category": "ppe", "stock": 400, "establishment_id": 7}),
                json!({"id": 2, "name": "Sharps bin", "category": "waste", "stock": 20, "establishment_id": 8}),
            ]),
        )
        .with_table(
            "agreements",
            rows(vec![json!({"id": 1, "name": "Incineration 2024", "provider": "Ecoserv",
                             "start_date": "2024-01-01", "establishment_id": 7})]),
        )
        .with_table(
            "hazardous_waste",
            rows(vec![
                json!({"id": 1, "unit_id": 1, "waste_type": "sharps", "weight_kg": 2.5, "collected_on": "2024-01-10"}),
                json!({"id": 2, "unit_id": 2, "waste_type": "chemical", "weight_kg": 1.0, "collected_on": "2024-01-12"}),
                json!({"id": 3, "unit_id": 3, "waste_type": "sharps", "weight_kg": 4.0, "collected_on": "2024-01-15"}),
                json!({"id": 4, "unit_id": 1, "waste_type": "biological", "weight_kg": 3.2, "collected_on": "2024-02-01"}),
            ]),
        )
        .with_table("waste_records", Vec::new())
        .with_table(
            "equipment_loans",
            rows(vec![
                json!({"id": 1, "unit_id": 1, "equipment": "Ventilator", "loaned_on": "2024-01-05"}),
                json!({"id": 2, "unit_id": 3, "equipment": "Monitor", "loaned_on": "2024-01-06"}),
                json!({"id": 3, "unit_id": 2, "equipment": "Infusion pump", "loaned_on": "2024-01-09"}),
            ]),
        )
        .with_table("supply_movements", Vec::new())
        .with_table("removals", Vec::new())
        .with_relation(Relation::new("hazardous_waste", "units", "unit_id", "units"))
        .with_relation(Relation::new("waste_records", "units", "unit_id", "units"))
        .with_relation(Relation::new("equipment_loans", "units", "unit_id", "units"))
        .with_relation(Relation::new("supply_movements", "supplies", "supply_id", "supplies"))
        .with_relation(Relation::new("supply_movements", "units", "unit_id", "units"))
        .with_relation(Relation::new("removals", "agreements", "agreement_id", "agreements"))
}

fn secondary_backend() -> MemoryBackend {
    MemoryBackend::new("HPL")
        .with_table(
            "units",
            rows(vec![
                json!({"id": 1, "name": "Ward A"}),
                json!({"id": 2, "name": "Ward B"}),
            ]),
        )
        .with_table(
            "supplies",
            rows(vec![json!({"id": 1, "name": "Masks", "category": "ppe", "stock": 90})]),
        )
        .with_table("agreements", Vec::new())
        .with_table(
            "hazardous_waste",
            rows(vec![
                json!({"id": 1, "unit_id": 1, "waste_type": "sharps", "weight_kg": 1.5, "collected_on": "2024-01-11"}),
                json!({"id": 2, "unit_id": 2, "waste_type": "chemical", "weight_kg": 0.5, "collected_on": "2024-01-13"}),
                json!({"id": 3, "unit_id": 1, "waste_type": "sharps", "weight_kg": 2.0, "collected_on": "2024-01-20"}),
            ]),
        )
        .with_table("waste_records", Vec::new())
        .with_table("supply_movements", Vec::new())
        .with_table("removals", Vec::new())
        .with_relation(Relation::new("hazardous_waste", "units", "unit_id", "units"))
        .with_relation(Relation::new("waste_records", "units", "unit_id", "units"))
        .with_relation(Relation::new("supply_movements", "supplies", "supply_id", "supplies"))
}
