// Integration tests for the aggregating query engine

mod common;

use chrono::NaiveDate;
use serde_json::json;

use common::Fixture;
use wastetrack_core::backend::PredicateOp;
use wastetrack_core::config::{DeploymentConfig, FederatedPaging};
use wastetrack_core::errors::{ExError, ExErrorKind, TrackError};
use wastetrack_core::model::{
    BackendKey, BackendScopedId, DateRange, ListFilters, PageRequest, ScopeContext, SortSpec,
};
use wastetrack_core::sequencer::RequestSequencer;
use wastetrack_engine::Latest;

fn norte() -> ScopeContext {
    ScopeContext::single(BackendKey::Primary, Some("7".to_string()))
}

fn hpl() -> ScopeContext {
    ScopeContext::single(BackendKey::Secondary, Some("1".to_string()))
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

#[tokio::test]
async fn test_staff_query_hits_only_bound_backend() {
    // Given staff bound to establishment 7 on the primary backend
    let fixture = Fixture::new();
    let engine = fixture.engine();

    // When listing units
    let outcome = engine
        .query(&norte(), "units", &ListFilters::default(), None, PageRequest::first(25))
        .await
        .unwrap();

    // Then one primary request restricted to establishment 7 was sent
    let requests = fixture.primary.requests_for("units");
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].eq_value("establishment_id"), Some(&json!("7")));
    assert!(fixture.secondary.requests().is_empty());

    let names: Vec<Option<String>> = outcome.rows.iter().map(|r| r.get_str("name")).collect();
    assert_eq!(names, vec![Some("ICU".to_string()), Some("Laboratory".to_string())]);
    assert_eq!(outcome.total_count, 2);
    assert!(outcome
        .rows
        .iter()
        .all(|r| r.source_backend == BackendKey::Primary && r.source_display_name == "SST"));
}

#[tokio::test]
async fn test_joined_table_is_restricted_through_relation() {
    let fixture = Fixture::new();
    let engine = fixture.engine();

    let outcome = engine
        .query(&norte(), "hazardous_waste", &ListFilters::default(), None, PageRequest::first(25))
        .await
        .unwrap();

    let requests = fixture.primary.requests_for("hazardous_waste");
    assert_eq!(requests[0].eq_value("units.establishment_id"), Some(&json!("7")));
    let mut ids: Vec<String> = outcome.rows.iter().filter_map(|r| r.get_str("id")).collect();
    ids.sort();
    assert_eq!(ids, vec!["1", "2", "4"]);
}

#[tokio::test]
async fn test_secondary_scope_sends_no_establishment_predicate() {
    // Given an administrator filtered to the secondary's sole establishment
    let fixture = Fixture::new();
    let engine = fixture.engine();

    // When listing hazardous waste
    let outcome = engine
        .query(&hpl(), "hazardous_waste", &ListFilters::default(), None, PageRequest::first(25))
        .await
        .unwrap();

    // Then only the secondary was asked, without an establishment column
    assert!(fixture.primary.requests().is_empty());
    let requests = fixture.secondary.requests_for("hazardous_waste");
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].has_predicate_on("establishment_id"));
    assert!(!requests[0].has_predicate_on("units.establishment_id"));
    assert_eq!(outcome.rows.len(), 3);
    assert!(outcome.rows.iter().all(|r| r.source_display_name == "HPL"));
}

#[tokio::test]
async fn test_federated_query_skips_backend_without_table() {
    // Given the secondary has no equipment_loans table
    let fixture = Fixture::new();
    let engine = fixture.engine();

    // When an administrator lists equipment loans across backends
    let outcome = engine
        .query(
            &ScopeContext::federated(),
            "equipment_loans",
            &ListFilters::default(),
            None,
            PageRequest::first(25),
        )
        .await
        .unwrap();

    // Then the primary's rows come back and nothing is reported as failed
    assert_eq!(outcome.rows.len(), 3);
    assert_eq!(outcome.total_count, 3);
    assert!(outcome.failed_backends.is_empty());
    assert_eq!(fixture.secondary.requests_for("equipment_loans").len(), 1);
}

#[tokio::test]
async fn test_federated_query_reports_failed_backend() {
    let fixture = Fixture::new();
    fixture.secondary.fail_table(
        "hazardous_waste",
        ExError::new(ExErrorKind::BackendQuery).with_message("statement timeout"),
    );
    let engine = fixture.engine();

    let outcome = engine
        .query(
            &ScopeContext::federated(),
            "hazardous_waste",
            &ListFilters::default(),
            None,
            PageRequest::first(25),
        )
        .await
        .unwrap();

    assert_eq!(outcome.rows.len(), 4);
    assert_eq!(outcome.failed_backends, vec!["HPL".to_string()]);
    assert!(outcome.rows.iter().all(|r| r.source_backend == BackendKey::Primary));
}

#[tokio::test]
async fn test_federated_rows_are_annotated_per_backend() {
    let fixture = Fixture::new();
    let engine = fixture.engine();

    let outcome = engine
        .query(
            &ScopeContext::federated(),
            "hazardous_waste",
            &ListFilters::default(),
            None,
            PageRequest::first(25),
        )
        .await
        .unwrap();

    let primary = outcome
        .rows
        .iter()
        .filter(|r| r.source_backend == BackendKey::Primary)
        .count();
    let secondary = outcome
        .rows
        .iter()
        .filter(|r| r.source_backend == BackendKey::Secondary)
        .count();
    assert_eq!((primary, secondary), (4, 3));
    assert_eq!(outcome.total_count, 7);
}

#[tokio::test]
async fn test_validation_errors_dispatch_nothing() {
    let fixture = Fixture::new();
    let engine = fixture.engine();
    let federated = ScopeContext::federated();

    let zero_page = engine
        .query(&federated, "units", &ListFilters::default(), None, PageRequest::first(0))
        .await;
    assert!(matches!(zero_page, Err(TrackError::Validation { .. })));

    let huge_page = engine
        .query(&federated, "units", &ListFilters::default(), None, PageRequest::first(100_000))
        .await;
    assert!(matches!(huge_page, Err(TrackError::Validation { .. })));

    let mut inverted = ListFilters::default();
    inverted.date_range = DateRange::new(Some(date("2024-02-01")), Some(date("2024-01-01")));
    let bad_range = engine
        .query(&federated, "agreements", &inverted, None, PageRequest::first(25))
        .await;
    assert!(matches!(bad_range, Err(TrackError::Validation { .. })));

    let bad_sort = engine
        .query(
            &federated,
            "units",
            &ListFilters::default(),
            Some(&SortSpec::asc("password")),
            PageRequest::first(25),
        )
        .await;
    assert!(matches!(bad_sort, Err(TrackError::Validation { .. })));

    let unknown = engine
        .query(&federated, "patients", &ListFilters::default(), None, PageRequest::first(25))
        .await;
    assert!(matches!(unknown, Err(TrackError::UnknownTable { .. })));

    assert!(fixture.primary.requests().is_empty());
    assert!(fixture.secondary.requests().is_empty());
}

#[tokio::test]
async fn test_unassigned_scope_is_rejected() {
    let fixture = Fixture::new();
    let engine = fixture.engine();

    let result = engine
        .query(
            &ScopeContext::unassigned(),
            "units",
            &ListFilters::default(),
            None,
            PageRequest::first(25),
        )
        .await;

    assert!(matches!(result, Err(TrackError::EstablishmentUnassigned)));
    assert!(fixture.primary.requests().is_empty());
}

#[tokio::test]
async fn test_date_range_uses_exclusive_upper_bound() {
    let fixture = Fixture::new();
    let engine = fixture.engine();
    let mut filters = ListFilters::default();
    filters.date_range = DateRange::new(Some(date("2024-01-01")), Some(date("2024-01-01")));

    let outcome = engine
        .query(&norte(), "agreements", &filters, None, PageRequest::first(25))
        .await
        .unwrap();

    assert_eq!(outcome.rows.len(), 1);
    let request = &fixture.primary.requests_for("agreements")[0];
    let bounds: Vec<&PredicateOp> = request
        .predicates
        .iter()
        .filter(|p| p.column == "start_date")
        .map(|p| &p.op)
        .collect();
    assert_eq!(
        bounds,
        vec![&PredicateOp::Gte(json!("2024-01-01")), &PredicateOp::Lt(json!("2024-01-02"))]
    );
}

#[tokio::test]
async fn test_unit_filter_skips_backend_without_ids() {
    // Given a unit filter naming only a primary unit
    let fixture = Fixture::new();
    let engine = fixture.engine();
    let mut filters = ListFilters::default();
    filters
        .unit_ids
        .insert(BackendScopedId::new(BackendKey::Primary, "1"));

    // When listing hazardous waste across backends
    let outcome = engine
        .query(
            &ScopeContext::federated(),
            "hazardous_waste",
            &filters,
            None,
            PageRequest::first(25),
        )
        .await
        .unwrap();

    // Then the secondary was never asked
    assert!(fixture.secondary.requests().is_empty());
    let mut ids: Vec<String> = outcome.rows.iter().filter_map(|r| r.get_str("id")).collect();
    ids.sort();
    assert_eq!(ids, vec!["1", "4"]);
    assert!(fixture.primary.requests_for("hazardous_waste")[0].has_predicate_on("unit_id"));
}

#[tokio::test]
async fn test_per_backend_paging_windows_each_backend() {
    // Given the default federated paging
    let mut config = DeploymentConfig::default();
    config.federated_paging = FederatedPaging::PerBackend;
    let fixture = Fixture::with_config(config);
    let engine = fixture.engine();

    // When the second page of two is requested (default sort: newest first)
    let outcome = engine
        .query(
            &ScopeContext::federated(),
            "hazardous_waste",
            &ListFilters::default(),
            None,
            PageRequest::new(1, 2),
        )
        .await
        .unwrap();

    // Then each backend applies the window to its own rows
    for backend in [&fixture.primary, &fixture.secondary] {
        let windows: Vec<Option<(usize, usize)>> = backend
            .requests_for("hazardous_waste")
            .iter()
            .map(|r| r.range.as_ref().map(|range| (range.offset, range.limit)))
            .collect();
        assert_eq!(windows, vec![Some((2, 2))]);
    }

    // And the pages are concatenated in registry order without re-sorting
    let provenance: Vec<(&str, Option<String>)> = outcome
        .rows
        .iter()
        .map(|r| (r.source_display_name.as_str(), r.get_str("id")))
        .collect();
    assert_eq!(
        provenance,
        vec![
            ("SST", Some("2".to_string())),
            ("SST", Some("1".to_string())),
            ("HPL", Some("1".to_string())),
        ]
    );
    assert_eq!(outcome.total_count, 7);
}

#[tokio::test]
async fn test_global_paging_merges_across_backends() {
    // Given federated paging over a merged, capped window
    let mut config = DeploymentConfig::default();
    config.federated_paging = FederatedPaging::Global { cap: 100 };
    let fixture = Fixture::with_config(config);
    let engine = fixture.engine();

    // When the first page of three is requested (default sort: newest first)
    let outcome = engine
        .query(
            &ScopeContext::federated(),
            "hazardous_waste",
            &ListFilters::default(),
            None,
            PageRequest::first(3),
        )
        .await
        .unwrap();

    // Then rows interleave by date regardless of backend
    let dates: Vec<Option<String>> = outcome
        .rows
        .iter()
        .map(|r| r.get_str("collected_on"))
        .collect();
    assert_eq!(
        dates,
        vec![
            Some("2024-02-01".to_string()),
            Some("2024-01-20".to_string()),
            Some("2024-01-15".to_string()),
        ]
    );
    let backends: Vec<BackendKey> = outcome.rows.iter().map(|r| r.source_backend).collect();
    assert_eq!(
        backends,
        vec![BackendKey::Primary, BackendKey::Secondary, BackendKey::Primary]
    );
    assert_eq!(outcome.total_count, 7);
}

#[tokio::test]
async fn test_single_mode_failure_names_backend() {
    let fixture = Fixture::new();
    fixture.primary.fail_table(
        "units",
        ExError::new(ExErrorKind::BackendQuery).with_message("connection reset"),
    );
    let engine = fixture.engine();

    let result = engine
        .query(&norte(), "units", &ListFilters::default(), None, PageRequest::first(25))
        .await;

    match result {
        Err(TrackError::BackendQuery { backend, table, message }) => {
            assert_eq!(backend, "SST");
            assert_eq!(table, "units");
            assert_eq!(message, "connection reset");
        }
        other => panic!("expected BackendQuery, got {:?}", other),
    }
}

#[tokio::test]
async fn test_single_mode_missing_table_is_empty() {
    let fixture = Fixture::new();
    let engine = fixture.engine();

    let outcome = engine
        .query(&hpl(), "equipment_loans", &ListFilters::default(), None, PageRequest::first(25))
        .await
        .unwrap();

    assert!(outcome.rows.is_empty());
    assert_eq!(outcome.total_count, 0);
    assert!(outcome.failed_backends.is_empty());
}

#[tokio::test]
async fn test_query_latest_discards_superseded_response() {
    // Given two tickets for the same list, the second issued last
    let fixture = Fixture::new();
    let engine = fixture.engine();
    let sequencer = RequestSequencer::new();
    let older = sequencer.begin("units");
    let newer = sequencer.begin("units");
    let filters = ListFilters::default();

    // When both responses arrive
    let stale = engine
        .query_latest(&sequencer, &older, &norte(), "units", &filters, None, PageRequest::first(25))
        .await
        .unwrap();
    let fresh = engine
        .query_latest(&sequencer, &newer, &norte(), "units", &filters, None, PageRequest::first(25))
        .await
        .unwrap();

    // Then only the newer one is kept
    assert!(matches!(stale, Latest::Superseded));
    assert_eq!(fresh.into_current().map(|o| o.rows.len()), Some(2));
}

#[tokio::test]
async fn test_fetch_scoped_restricts_and_skips_missing_tables() {
    let fixture = Fixture::new();
    let engine = fixture.engine();

    let units = engine.fetch_scoped(&norte(), "units").await.unwrap();
    let loans = engine
        .fetch_scoped(&ScopeContext::federated(), "equipment_loans")
        .await
        .unwrap();

    assert_eq!(units.rows.len(), 2);
    assert_eq!(loans.rows.len(), 3);
    assert!(loans.is_complete());
    assert!(loans.rows.iter().all(|r| r.source_backend == BackendKey::Primary));
}

#[tokio::test]
async fn test_fetch_scoped_reports_failed_backend() {
    let fixture = Fixture::new();
    fixture.secondary.fail_table(
        "units",
        ExError::new(ExErrorKind::BackendQuery).with_message("statement timeout"),
    );
    let engine = fixture.engine();

    let units = engine
        .fetch_scoped(&ScopeContext::federated(), "units")
        .await
        .unwrap();

    assert!(!units.is_complete());
    assert_eq!(units.failed_backends, vec!["HPL".to_string()]);
    assert_eq!(units.rows.len(), 3);
}
