// Integration tests for writes and the cache refresh that follows them

mod common;

use serde_json::json;

use common::{admin, row, staff_at, Fixture};
use wastetrack_core::backend::Predicate;
use wastetrack_core::errors::{ExError, ExErrorKind, TrackError};
use wastetrack_core::model::{BackendKey, LookupKind};
use wastetrack_core::state::ViewState;
use wastetrack_engine::{CacheLoader, MutationService};
use wastetrack_store::Operation;

/// A state whose caches are warm for `identity`'s scope
async fn warm_state(fixture: &Fixture, identity: wastetrack_core::model::Identity) -> ViewState {
    let mut state = ViewState::new();
    state.set_identity(identity);
    CacheLoader::new(fixture.engine())
        .ensure_all(&mut state)
        .await
        .unwrap();
    state
}

#[tokio::test]
async fn test_insert_stamps_establishment_and_refreshes_cache() {
    // Given staff at establishment 7 with a warm units cache
    let fixture = Fixture::new();
    let service = MutationService::new(fixture.engine());
    let mut state = warm_state(&fixture, staff_at("7", BackendKey::Primary)).await;
    assert_eq!(state.lookup_records(LookupKind::Units).len(), 2);

    // When a unit is created without an establishment
    let stored = service
        .insert(&mut state, "units", None, vec![row(json!({"name": "Radiology"}))])
        .await
        .unwrap();

    // Then it lands on the primary, stamped with 7, and the cache shows it
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].source_display_name, "SST");
    assert_eq!(stored[0].get_str("establishment_id").as_deref(), Some("7"));
    assert_eq!(stored[0].get_str("id").as_deref(), Some("4"));

    let names: Vec<&str> = state
        .lookup_records(LookupKind::Units)
        .iter()
        .map(|r| r.display_name.as_str())
        .collect();
    assert_eq!(names, vec!["ICU", "Laboratory", "Radiology"]);
    assert!(!state.cache_needs_reload(LookupKind::Units));
}

#[tokio::test]
async fn test_federated_insert_requires_target_backend() {
    let fixture = Fixture::new();
    let service = MutationService::new(fixture.engine());
    let mut state = warm_state(&fixture, admin()).await;
    fixture.clear_requests();

    let result = service
        .insert(&mut state, "units", None, vec![row(json!({"name": "Ward C"}))])
        .await;

    assert!(matches!(result, Err(TrackError::Validation { .. })));
    assert!(fixture.primary.requests().is_empty());
    assert!(fixture.secondary.requests().is_empty());
}

#[tokio::test]
async fn test_federated_insert_into_secondary() {
    let fixture = Fixture::new();
    let service = MutationService::new(fixture.engine());
    let mut state = warm_state(&fixture, admin()).await;

    let stored = service
        .insert(
            &mut state,
            "units",
            Some(BackendKey::Secondary),
            vec![row(json!({"name": "Ward C"}))],
        )
        .await
        .unwrap();

    // Federated writes carry no establishment stamp
    assert!(stored[0].get("establishment_id").is_none());
    assert_eq!(fixture.secondary.rows("units").len(), 3);
    let cache = state.cache(LookupKind::Units).unwrap();
    assert!(cache
        .records_for(BackendKey::Secondary)
        .any(|r| r.display_name == "Ward C"));
}

#[tokio::test]
async fn test_single_scope_rejects_other_backend() {
    let fixture = Fixture::new();
    let service = MutationService::new(fixture.engine());
    let mut state = warm_state(&fixture, staff_at("7", BackendKey::Primary)).await;

    let result = service
        .insert(
            &mut state,
            "units",
            Some(BackendKey::Secondary),
            vec![row(json!({"name": "Ward C"}))],
        )
        .await;

    assert!(matches!(result, Err(TrackError::Validation { .. })));
    assert_eq!(fixture.secondary.rows("units").len(), 2);
}

#[tokio::test]
async fn test_failed_insert_leaves_state_untouched() {
    // Given a warm cache and a backend refusing inserts
    let fixture = Fixture::new();
    let service = MutationService::new(fixture.engine());
    let mut state = warm_state(&fixture, staff_at("7", BackendKey::Primary)).await;
    fixture.primary.fail_operation(
        Operation::Insert,
        "units",
        ExError::new(ExErrorKind::Mutation).with_message("duplicate key"),
    );

    // When the insert is attempted
    let result = service
        .insert(&mut state, "units", None, vec![row(json!({"name": "ICU"}))])
        .await;

    // Then the error names the backend and the cache is neither stale nor changed
    let err = result.unwrap_err();
    assert_eq!(err.to_string(), "Could not save units in SST: duplicate key");
    assert!(!state.cache_needs_reload(LookupKind::Units));
    assert_eq!(state.lookup_records(LookupKind::Units).len(), 2);
}

#[tokio::test]
async fn test_reload_failure_after_write_still_succeeds() {
    let fixture = Fixture::new();
    let service = MutationService::new(fixture.engine());
    let mut state = warm_state(&fixture, staff_at("7", BackendKey::Primary)).await;
    fixture.primary.fail_operation(
        Operation::Select,
        "supplies",
        ExError::new(ExErrorKind::BackendQuery).with_message("timeout"),
    );

    let result = service
        .insert(
            &mut state,
            "supplies",
            None,
            vec![row(json!({"name": "Apron", "category": "ppe", "stock": 10}))],
        )
        .await;

    assert!(result.is_ok());
    assert_eq!(fixture.primary.rows("supplies").len(), 3);
    assert!(state.cache_needs_reload(LookupKind::Supplies));
}

#[tokio::test]
async fn test_update_is_restricted_to_scope_establishment() {
    let fixture = Fixture::new();
    let service = MutationService::new(fixture.engine());
    let mut state = warm_state(&fixture, staff_at("7", BackendKey::Primary)).await;

    // Unit 3 belongs to establishment 8
    let foreign = service
        .update(
            &mut state,
            "units",
            None,
            vec![Predicate::eq("id", 3)],
            row(json!({"name": "Renamed"})),
        )
        .await
        .unwrap();
    let own = service
        .update(
            &mut state,
            "units",
            None,
            vec![Predicate::eq("id", 1)],
            row(json!({"name": "Intensive Care"})),
        )
        .await
        .unwrap();

    assert!(foreign.is_empty());
    assert_eq!(own.len(), 1);
    assert!(state
        .lookup_records(LookupKind::Units)
        .iter()
        .any(|r| r.display_name == "Intensive Care"));
    let updates: Vec<_> = fixture
        .primary
        .requests_for("units")
        .into_iter()
        .filter(|r| r.operation == Operation::Update)
        .collect();
    assert!(updates.iter().all(|r| r.has_predicate_on("establishment_id")));
}

#[tokio::test]
async fn test_joined_table_writes_stay_within_scope_establishment() {
    // Given staff at establishment 7; hazardous_waste 3 and equipment_loans 2
    // hang off unit 3, which belongs to establishment 8
    let fixture = Fixture::new();
    let service = MutationService::new(fixture.engine());
    let mut state = warm_state(&fixture, staff_at("7", BackendKey::Primary)).await;
    fixture.clear_requests();

    // When deleting and updating those foreign rows by id
    let deleted = service
        .delete(&mut state, "hazardous_waste", None, vec![Predicate::eq("id", 3)])
        .await
        .unwrap();
    let updated = service
        .update(
            &mut state,
            "equipment_loans",
            None,
            vec![Predicate::eq("id", 2)],
            row(json!({"equipment": "Stolen"})),
        )
        .await
        .unwrap();

    // Then nothing is written and the rows survive unchanged
    assert_eq!(deleted, 0);
    assert!(updated.is_empty());
    assert_eq!(fixture.primary.rows("hazardous_waste").len(), 4);
    assert!(fixture
        .primary
        .rows("equipment_loans")
        .iter()
        .any(|r| r.get("equipment") == Some(&json!("Monitor"))));
    assert!(fixture
        .primary
        .requests()
        .iter()
        .all(|r| r.operation != Operation::Delete && r.operation != Operation::Update));
}

#[tokio::test]
async fn test_joined_table_writes_reach_own_establishment_rows() {
    // Given staff at establishment 7
    let fixture = Fixture::new();
    let service = MutationService::new(fixture.engine());
    let mut state = warm_state(&fixture, staff_at("7", BackendKey::Primary)).await;
    fixture.clear_requests();

    // When deleting every sharps record; row 1 is unit 1 (est 7), row 3 unit 3 (est 8)
    let deleted = service
        .delete(
            &mut state,
            "hazardous_waste",
            None,
            vec![Predicate::eq("waste_type", "sharps")],
        )
        .await
        .unwrap();

    // Then only the in-establishment row goes, through an id restriction
    assert_eq!(deleted, 1);
    let remaining: Vec<String> = fixture
        .primary
        .rows("hazardous_waste")
        .iter()
        .filter_map(|r| r.get("id").map(|v| v.to_string()))
        .collect();
    assert_eq!(remaining, vec!["2", "3", "4"]);

    let deletes: Vec<_> = fixture
        .primary
        .requests_for("hazardous_waste")
        .into_iter()
        .filter(|r| r.operation == Operation::Delete)
        .collect();
    assert_eq!(deletes.len(), 1);
    assert!(deletes[0].has_predicate_on("id"));
}

#[tokio::test]
async fn test_federated_joined_delete_is_not_narrowed() {
    // Given an administrator in the federated view
    let fixture = Fixture::new();
    let service = MutationService::new(fixture.engine());
    let mut state = warm_state(&fixture, admin()).await;

    // When deleting a primary row of establishment 8
    let deleted = service
        .delete(
            &mut state,
            "hazardous_waste",
            Some(BackendKey::Primary),
            vec![Predicate::eq("id", 3)],
        )
        .await
        .unwrap();

    // Then it goes: administrators are not bound to an establishment
    assert_eq!(deleted, 1);
    assert_eq!(fixture.primary.rows("hazardous_waste").len(), 3);
}

#[tokio::test]
async fn test_update_and_delete_require_predicates() {
    let fixture = Fixture::new();
    let service = MutationService::new(fixture.engine());
    let mut state = warm_state(&fixture, staff_at("7", BackendKey::Primary)).await;

    let update = service
        .update(&mut state, "units", None, Vec::new(), row(json!({"name": "x"})))
        .await;
    let delete = service.delete(&mut state, "units", None, Vec::new()).await;

    assert!(matches!(update, Err(TrackError::Validation { .. })));
    assert!(matches!(delete, Err(TrackError::Validation { .. })));
    assert_eq!(fixture.primary.rows("units").len(), 3);
}

#[tokio::test]
async fn test_delete_returns_count_and_refreshes_cache() {
    let fixture = Fixture::new();
    let service = MutationService::new(fixture.engine());
    let mut state = warm_state(&fixture, staff_at("7", BackendKey::Primary)).await;

    let deleted = service
        .delete(&mut state, "units", None, vec![Predicate::eq("id", 2)])
        .await
        .unwrap();

    assert_eq!(deleted, 1);
    let names: Vec<&str> = state
        .lookup_records(LookupKind::Units)
        .iter()
        .map(|r| r.display_name.as_str())
        .collect();
    assert_eq!(names, vec!["ICU"]);
}

#[tokio::test]
async fn test_write_to_non_lookup_table_leaves_caches_alone() {
    let fixture = Fixture::new();
    let service = MutationService::new(fixture.engine());
    let mut state = warm_state(&fixture, staff_at("7", BackendKey::Primary)).await;
    fixture.clear_requests();

    service
        .insert(
            &mut state,
            "hazardous_waste",
            None,
            vec![row(json!({"unit_id": 1, "waste_type": "sharps", "weight_kg": 1.2,
                            "collected_on": "2024-03-01"}))],
        )
        .await
        .unwrap();

    let selects = fixture
        .primary
        .requests()
        .into_iter()
        .filter(|r| r.operation == Operation::Select)
        .count();
    assert_eq!(selects, 0);
}
