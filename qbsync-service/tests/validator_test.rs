//! Invoice validation integration tests against in-memory backends.

mod common;

use common::{
    invoice, line, seed_customer_mapping, seed_sku_mapping, InMemoryStore, MockLedger,
};
use qbsync_service::models::{IssueCode, IssueSeverity, LedgerInvoiceStatus, ValidationStatus};
use qbsync_service::services::{InvoiceValidator, SyncStore};
use std::sync::Arc;

fn validator(store: Arc<InMemoryStore>, ledger: MockLedger) -> InvoiceValidator {
    InvoiceValidator::new(store, Arc::new(ledger))
}

fn standard_invoice() -> qbsync_service::models::LedgerInvoice {
    invoice(
        "inv-1",
        "INV-0001",
        "org-1",
        vec![line("HW-100", "Widget", "2", "50.00")],
    )
}

#[tokio::test]
async fn fully_mapped_invoice_is_ready() {
    let store = Arc::new(InMemoryStore::new());
    seed_customer_mapping(&store, "org-1", "Acme", "21").await;
    seed_sku_mapping(&store, "HW-100", "5").await;
    let ledger = MockLedger {
        invoices: vec![standard_invoice()],
        ..Default::default()
    };

    let validation = validator(store.clone(), ledger)
        .validate_invoice("inv-1")
        .await
        .expect("Validation failed");

    assert_eq!(validation.validation_status(), ValidationStatus::Ready);
    assert!(validation.customer_mapping_ok);
    assert!(validation.skus_mapped);
    assert!(validation.ready_for_sync);
    assert_eq!(validation.confidence, 1.0);
    assert!(validation.issues.is_empty());
}

#[tokio::test]
async fn missing_customer_mapping_blocks() {
    let store = Arc::new(InMemoryStore::new());
    seed_sku_mapping(&store, "HW-100", "5").await;
    let ledger = MockLedger {
        invoices: vec![standard_invoice()],
        ..Default::default()
    };

    let validation = validator(store.clone(), ledger)
        .validate_invoice("inv-1")
        .await
        .expect("Validation failed");

    assert_eq!(validation.validation_status(), ValidationStatus::Blocked);
    assert!(!validation.customer_mapping_ok);
    assert!(!validation.ready_for_sync);
    assert!(validation
        .issues
        .iter()
        .any(|i| i.code == IssueCode::CustomerNoMapping));
}

#[tokio::test]
async fn missing_sku_mapping_blocks_and_names_offenders() {
    let store = Arc::new(InMemoryStore::new());
    seed_customer_mapping(&store, "org-1", "Acme", "21").await;
    seed_sku_mapping(&store, "HW-100", "5").await;
    let ledger = MockLedger {
        invoices: vec![invoice(
            "inv-1",
            "INV-0001",
            "org-1",
            vec![
                line("HW-100", "Widget", "2", "50.00"),
                line("HW-200", "Gadget", "1", "75.00"),
            ],
        )],
        ..Default::default()
    };

    let validation = validator(store.clone(), ledger)
        .validate_invoice("inv-1")
        .await
        .expect("Validation failed");

    assert_eq!(validation.validation_status(), ValidationStatus::Blocked);
    let issue = validation
        .issues
        .iter()
        .find(|i| i.code == IssueCode::SkuNoMapping)
        .expect("Missing SKU_NO_MAPPING issue");
    assert_eq!(issue.skus, vec!["HW-200".to_string()]);
    // One of two SKUs mapped: 0.4 * 1.0 + 0.6 * 0.5.
    assert!((validation.confidence - 0.7).abs() < 1e-9);
}

#[tokio::test]
async fn needs_creation_warns_but_does_not_block() {
    let store = Arc::new(InMemoryStore::new());
    seed_customer_mapping(&store, "org-1", "Acme", "21").await;
    store
        .upsert_sku_mapping(
            &qbsync_service::models::NewSkuMapping {
                sku_code: "HW-100".to_string(),
                sku_name: "Widget".to_string(),
                qb_item_id: None,
                qb_item_name: None,
                qb_item_type: None,
                status: qbsync_service::models::SkuMappingStatus::NeedsCreation,
                confidence: 0.0,
                match_method: qbsync_service::models::SkuMatchMethod::NoMatch,
            },
            false,
        )
        .await
        .expect("Seed failed");
    let ledger = MockLedger {
        invoices: vec![standard_invoice()],
        ..Default::default()
    };

    let validation = validator(store.clone(), ledger)
        .validate_invoice("inv-1")
        .await
        .expect("Validation failed");

    assert_eq!(validation.validation_status(), ValidationStatus::Ready);
    let issue = validation
        .issues
        .iter()
        .find(|i| i.code == IssueCode::SkuNeedsCreation)
        .expect("Missing SKU_NEEDS_CREATION warning");
    assert_eq!(issue.severity, IssueSeverity::Warning);
    assert_eq!(validation.confidence, 1.0);
}

#[tokio::test]
async fn draft_invoice_is_blocked() {
    let store = Arc::new(InMemoryStore::new());
    seed_customer_mapping(&store, "org-1", "Acme", "21").await;
    seed_sku_mapping(&store, "HW-100", "5").await;
    let mut inv = standard_invoice();
    inv.status = LedgerInvoiceStatus::Draft;
    let ledger = MockLedger {
        invoices: vec![inv],
        ..Default::default()
    };

    let validation = validator(store.clone(), ledger)
        .validate_invoice("inv-1")
        .await
        .expect("Validation failed");

    assert_eq!(validation.validation_status(), ValidationStatus::Blocked);
    assert!(validation
        .issues
        .iter()
        .any(|i| i.code == IssueCode::InvoiceDraft));
}

#[tokio::test]
async fn synced_rows_are_immutable() {
    let store = Arc::new(InMemoryStore::new());
    seed_customer_mapping(&store, "org-1", "Acme", "21").await;
    seed_sku_mapping(&store, "HW-100", "5").await;
    let ledger = MockLedger {
        invoices: vec![standard_invoice()],
        ..Default::default()
    };
    let validator = validator(store.clone(), ledger);

    validator
        .validate_invoice("inv-1")
        .await
        .expect("Validation failed");
    validator
        .mark_as_synced("inv-1", "qb-77")
        .await
        .expect("Mark synced failed");

    // Re-validating after sync must not reopen the row.
    let validation = validator
        .validate_invoice("inv-1")
        .await
        .expect("Re-validation failed");

    assert_eq!(validation.validation_status(), ValidationStatus::Synced);
    assert_eq!(validation.qb_invoice_id.as_deref(), Some("qb-77"));
    assert!(!validation.ready_for_sync);
}

#[tokio::test]
async fn approve_requires_ready_status() {
    let store = Arc::new(InMemoryStore::new());
    seed_sku_mapping(&store, "HW-100", "5").await;
    let ledger = MockLedger {
        invoices: vec![standard_invoice()],
        ..Default::default()
    };
    let validator = validator(store.clone(), ledger);

    // Blocked: no customer mapping seeded.
    validator
        .validate_invoice("inv-1")
        .await
        .expect("Validation failed");
    let err = validator
        .approve_for_sync("inv-1", "reviewer")
        .await
        .expect_err("Expected approval to fail on a blocked invoice");

    assert!(err.to_string().contains("cannot be approved"));
}

#[tokio::test]
async fn approve_stamps_reviewer() {
    let store = Arc::new(InMemoryStore::new());
    seed_customer_mapping(&store, "org-1", "Acme", "21").await;
    seed_sku_mapping(&store, "HW-100", "5").await;
    let ledger = MockLedger {
        invoices: vec![standard_invoice()],
        ..Default::default()
    };
    let validator = validator(store.clone(), ledger);

    validator
        .validate_invoice("inv-1")
        .await
        .expect("Validation failed");
    let approved = validator
        .approve_for_sync("inv-1", "reviewer")
        .await
        .expect("Approval failed");

    assert_eq!(approved.approved_by.as_deref(), Some("reviewer"));
    assert!(approved.approved_utc.is_some());
}

#[tokio::test]
async fn run_pending_skips_already_validated() {
    let store = Arc::new(InMemoryStore::new());
    seed_customer_mapping(&store, "org-1", "Acme", "21").await;
    seed_sku_mapping(&store, "HW-100", "5").await;
    let ledger = MockLedger {
        invoices: vec![
            standard_invoice(),
            invoice(
                "inv-2",
                "INV-0002",
                "org-1",
                vec![line("HW-100", "Widget", "1", "50.00")],
            ),
        ],
        ..Default::default()
    };
    let validator = validator(store.clone(), ledger);

    validator
        .validate_invoice("inv-1")
        .await
        .expect("Validation failed");
    let summary = validator
        .validate_all_pending(None, None, None)
        .await
        .expect("Pending run failed");

    assert_eq!(summary.total, 1);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(store.validations().len(), 2);
}

#[tokio::test]
async fn clear_all_keeps_synced_rows() {
    let store = Arc::new(InMemoryStore::new());
    seed_customer_mapping(&store, "org-1", "Acme", "21").await;
    seed_sku_mapping(&store, "HW-100", "5").await;
    let ledger = MockLedger {
        invoices: vec![
            standard_invoice(),
            invoice(
                "inv-2",
                "INV-0002",
                "org-1",
                vec![line("HW-100", "Widget", "1", "50.00")],
            ),
        ],
        ..Default::default()
    };
    let validator = validator(store.clone(), ledger);

    validator
        .validate_invoice("inv-1")
        .await
        .expect("Validation failed");
    validator
        .validate_invoice("inv-2")
        .await
        .expect("Validation failed");
    validator
        .mark_as_synced("inv-1", "qb-77")
        .await
        .expect("Mark synced failed");

    let deleted = validator
        .clear_all_validations()
        .await
        .expect("Clear failed");

    assert_eq!(deleted, 1);
    let remaining = store.validations();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].invoice_id, "inv-1");
    assert_eq!(remaining[0].status, "synced");
}
