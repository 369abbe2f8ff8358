//! Customer matching integration tests against in-memory backends.

mod common;

use common::{manager, organization, qb_customer, InMemoryStore, MockBooks, MockLedger};
use qbsync_service::models::MappingStatus;
use qbsync_service::services::store::MappingFilter;
use qbsync_service::services::CustomerMatcher;
use std::collections::HashMap;
use std::sync::Arc;

fn matcher(
    store: Arc<InMemoryStore>,
    ledger: MockLedger,
    books: MockBooks,
) -> CustomerMatcher {
    CustomerMatcher::new(store, Arc::new(ledger), Arc::new(books))
}

#[tokio::test]
async fn code_match_is_proposed_and_persisted() {
    let store = Arc::new(InMemoryStore::new());
    let ledger = MockLedger {
        organizations: vec![organization("org-1", "Acme Industries", Some("1042"))],
        ..Default::default()
    };
    let books = MockBooks {
        customers: vec![qb_customer("21", "1042 Acme Industries")],
        ..Default::default()
    };

    let summary = matcher(store.clone(), ledger, books)
        .run_matching()
        .await
        .expect("Matching run failed");

    assert_eq!(summary.organizations, 1);
    assert_eq!(summary.mappings_written, 1);
    assert_eq!(summary.proposed, 1);

    let mappings = store.customer_mappings();
    assert_eq!(mappings.len(), 1);
    assert_eq!(mappings[0].qb_customer_id.as_deref(), Some("21"));
    assert_eq!(mappings[0].status, "proposed");
    assert_eq!(mappings[0].match_method, "org_code");
    assert!(mappings[0].confidence >= 0.9);
}

#[tokio::test]
async fn weak_candidates_land_in_needs_review() {
    let store = Arc::new(InMemoryStore::new());
    let ledger = MockLedger {
        organizations: vec![organization("org-1", "Northern Lumber Supply", None)],
        ..Default::default()
    };
    let books = MockBooks {
        customers: vec![qb_customer("21", "Completely Different Company")],
        ..Default::default()
    };

    let summary = matcher(store.clone(), ledger, books)
        .run_matching()
        .await
        .expect("Matching run failed");

    assert_eq!(summary.needs_review, 1);
    let mappings = store.customer_mappings();
    assert_eq!(mappings[0].status, "needs_review");
    assert!(mappings[0].qb_customer_id.is_none());
}

#[tokio::test]
async fn rerun_preserves_reviewer_decisions() {
    let store = Arc::new(InMemoryStore::new());
    let ledger = MockLedger {
        organizations: vec![organization("org-1", "Acme Industries", Some("1042"))],
        ..Default::default()
    };
    let books = MockBooks {
        customers: vec![qb_customer("21", "1042 Acme Industries")],
        ..Default::default()
    };
    let matcher = matcher(store.clone(), ledger, books);

    matcher.run_matching().await.expect("First run failed");
    let id = store.customer_mappings()[0].id;
    matcher
        .reject_mapping(id, "reviewer", Some("wrong company"))
        .await
        .expect("Reject failed");

    let summary = matcher.run_matching().await.expect("Second run failed");

    assert_eq!(summary.mappings_preserved, 1);
    assert_eq!(summary.mappings_written, 0);
    let mappings = store.customer_mappings();
    assert_eq!(mappings[0].status, "rejected");
    assert_eq!(mappings[0].reviewed_by.as_deref(), Some("reviewer"));
}

#[tokio::test]
async fn one_row_per_manager() {
    let store = Arc::new(InMemoryStore::new());
    let mut managers = HashMap::new();
    managers.insert(
        "org-1".to_string(),
        vec![manager("mgr-1", "Pat Doe"), manager("mgr-2", "Sam Roe")],
    );
    let ledger = MockLedger {
        organizations: vec![organization("org-1", "Acme Industries", Some("1042"))],
        managers,
        ..Default::default()
    };
    let books = MockBooks {
        customers: vec![qb_customer("21", "1042 Acme Industries")],
        ..Default::default()
    };

    matcher(store.clone(), ledger, books)
        .run_matching()
        .await
        .expect("Matching run failed");

    let mappings = store.customer_mappings();
    assert_eq!(mappings.len(), 2);
    let manager_ids: Vec<&str> = mappings.iter().map(|m| m.manager_id.as_str()).collect();
    assert!(manager_ids.contains(&"mgr-1"));
    assert!(manager_ids.contains(&"mgr-2"));
}

#[tokio::test]
async fn clear_keeps_decided_rows() {
    let store = Arc::new(InMemoryStore::new());
    let ledger = MockLedger {
        organizations: vec![
            organization("org-1", "Acme Industries", Some("1042")),
            organization("org-2", "Unmatched Org", None),
        ],
        ..Default::default()
    };
    let books = MockBooks {
        customers: vec![qb_customer("21", "1042 Acme Industries")],
        ..Default::default()
    };
    let matcher = matcher(store.clone(), ledger, books);

    matcher.run_matching().await.expect("Matching run failed");
    let approved_id = store
        .customer_mappings()
        .iter()
        .find(|m| m.organization_id == "org-1")
        .expect("Missing org-1 mapping")
        .id;
    matcher
        .approve_mapping(approved_id, "reviewer", None)
        .await
        .expect("Approve failed");

    let deleted = matcher
        .clear_unapproved_mappings()
        .await
        .expect("Clear failed");

    assert_eq!(deleted, 1);
    let remaining = store.customer_mappings();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].organization_id, "org-1");

    // The approved row keeps its audit history; only the cleared
    // organization loses its logs.
    let logs = store.match_logs("customer");
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].entity_id, "org-1");
}

#[tokio::test]
async fn manual_mapping_is_approved_at_full_confidence() {
    let store = Arc::new(InMemoryStore::new());
    let ledger = MockLedger {
        organizations: vec![organization("org-1", "Acme Industries", None)],
        ..Default::default()
    };
    let books = MockBooks {
        customers: vec![qb_customer("33", "Acme (QB)")],
        ..Default::default()
    };

    let mapping = matcher(store.clone(), ledger, books)
        .create_manual_mapping("org-1", "", "33")
        .await
        .expect("Manual mapping failed");

    assert_eq!(mapping.mapping_status(), MappingStatus::Approved);
    assert_eq!(mapping.qb_customer_id.as_deref(), Some("33"));
    assert_eq!(mapping.confidence, 1.0);
    assert_eq!(mapping.match_method, "manual");
}

#[tokio::test]
async fn matching_run_writes_audit_log() {
    let store = Arc::new(InMemoryStore::new());
    let ledger = MockLedger {
        organizations: vec![organization("org-1", "Acme Industries", Some("1042"))],
        ..Default::default()
    };
    let books = MockBooks {
        customers: vec![qb_customer("21", "1042 Acme Industries")],
        ..Default::default()
    };

    matcher(store.clone(), ledger, books)
        .run_matching()
        .await
        .expect("Matching run failed");

    let logs = store.match_logs("customer");
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].entity_id, "org-1");
    assert_eq!(logs[0].best_match_id.as_deref(), Some("21"));
    assert!(!logs[0].candidates.is_empty());
}

#[tokio::test]
async fn status_filter_narrows_listing() {
    let store = Arc::new(InMemoryStore::new());
    let ledger = MockLedger {
        organizations: vec![
            organization("org-1", "Acme Industries", Some("1042")),
            organization("org-2", "No Counterpart Ltd", None),
        ],
        ..Default::default()
    };
    let books = MockBooks {
        customers: vec![qb_customer("21", "1042 Acme Industries")],
        ..Default::default()
    };
    let matcher = matcher(store.clone(), ledger, books);
    matcher.run_matching().await.expect("Matching run failed");

    let proposed = matcher
        .get_mappings(&MappingFilter {
            status: Some("proposed".to_string()),
            search: None,
        })
        .await
        .expect("Listing failed");

    assert_eq!(proposed.len(), 1);
    assert_eq!(proposed[0].organization_id, "org-1");
}
