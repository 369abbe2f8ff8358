//! Customer matching between ledger organizations and QuickBooks customers.
//!
//! Matching is two-phase: a structured-code pass (QuickBooks display names
//! carry a leading 4-digit organization code) and a fuzzy-name fallback.
//! Batch runs propose mappings; humans approve or reject them, and the
//! batch never overwrites a decided row.

use crate::clients::{LedgerConnector, QuickBooks};
use crate::models::{
    CustomerMapping, CustomerMatchMethod, LedgerManager, MappingStatus, MatchCandidate,
    MatchFactors, MatchLogEntry, NewCustomerMapping, QbCustomer,
};
use crate::services::fuzzy;
use crate::services::metrics::MATCH_OPERATIONS;
use crate::services::store::{MappingFilter, SyncStore};
use serde::Serialize;
use service_core::error::AppError;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Matching algorithm version stamped on audit rows.
const ALGORITHM_VERSION: &str = "1.0";

/// Minimum confidence for a mapping to be proposed rather than flagged for
/// review.
const PROPOSE_THRESHOLD: f64 = 0.70;

/// Fuzzy candidates below this similarity are discarded outright.
const FUZZY_FLOOR: f64 = 0.60;

/// One scored QuickBooks customer candidate for an organization.
#[derive(Debug, Clone)]
pub struct CustomerCandidate {
    pub qb_id: String,
    pub qb_name: String,
    pub qb_email: Option<String>,
    pub score: f64,
    pub method: CustomerMatchMethod,
    pub factors: MatchFactors,
}

/// Outcome of a full matching run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchingRunSummary {
    pub organizations: usize,
    pub mappings_written: usize,
    pub mappings_preserved: usize,
    pub proposed: usize,
    pub needs_review: usize,
}

/// Aggregate counts over the mapping table.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MappingStats {
    pub total: usize,
    pub approved: usize,
    pub rejected: usize,
    pub proposed: usize,
    pub needs_review: usize,
    pub with_qb_link: usize,
}

/// Score every eligible QuickBooks customer against one organization.
///
/// Sub-entity customers (`NNNN-NN` prefix) are never auto-selected and
/// inactive customers are skipped. Results are sorted best-first.
pub fn score_organization(
    org_code: Option<&str>,
    org_name: &str,
    customers: &[QbCustomer],
) -> Vec<CustomerCandidate> {
    let padded_code = org_code.map(fuzzy::pad_org_number);
    let eligible: Vec<&QbCustomer> = customers
        .iter()
        .filter(|c| c.active && !fuzzy::is_sub_customer(&c.display_name))
        .collect();

    let similarities = |customer: &QbCustomer| {
        let stripped = fuzzy::strip_org_prefix(&customer.display_name);
        let name_similarity = fuzzy::string_similarity(org_name, &stripped);
        let token_similarity = fuzzy::token_similarity(org_name, &stripped);
        let combined = 0.6 * name_similarity + 0.4 * token_similarity;
        (name_similarity, token_similarity, combined)
    };

    let mut candidates: Vec<CustomerCandidate> = Vec::new();

    if let Some(code) = &padded_code {
        for &customer in &eligible {
            if fuzzy::extract_org_number(&customer.display_name).as_deref() != Some(code.as_str()) {
                continue;
            }
            let (name_similarity, token_similarity, combined) = similarities(customer);
            let mut score: f64 = 0.90;
            if combined > 0.80 {
                score += 0.10;
            } else if combined > 0.50 {
                score += 0.05;
            }
            candidates.push(CustomerCandidate {
                qb_id: customer.id.clone(),
                qb_name: customer.display_name.clone(),
                qb_email: customer.email.clone(),
                score: score.min(1.0),
                method: CustomerMatchMethod::OrgCode,
                factors: MatchFactors {
                    code_match: true,
                    name_similarity,
                    token_similarity,
                },
            });
        }
    }

    // Fuzzy names only come into play when no code candidate exists.
    if candidates.is_empty() {
        for &customer in &eligible {
            let (name_similarity, token_similarity, combined) = similarities(customer);
            if combined < FUZZY_FLOOR {
                continue;
            }
            let score = if combined > 0.85 {
                0.70 * combined
            } else {
                0.50 * combined
            };
            candidates.push(CustomerCandidate {
                qb_id: customer.id.clone(),
                qb_name: customer.display_name.clone(),
                qb_email: customer.email.clone(),
                score,
                method: CustomerMatchMethod::FuzzyName,
                factors: MatchFactors {
                    code_match: false,
                    name_similarity,
                    token_similarity,
                },
            });
        }
    }

    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    candidates
}

/// Matches ledger organizations to QuickBooks customers and manages the
/// mapping lifecycle.
pub struct CustomerMatcher {
    store: Arc<dyn SyncStore>,
    ledger: Arc<dyn LedgerConnector>,
    books: Arc<dyn QuickBooks>,
}

impl CustomerMatcher {
    pub fn new(
        store: Arc<dyn SyncStore>,
        ledger: Arc<dyn LedgerConnector>,
        books: Arc<dyn QuickBooks>,
    ) -> Self {
        Self {
            store,
            ledger,
            books,
        }
    }

    /// Run matching for every active customer organization, writing one
    /// mapping row per (organization, manager) pair. Rows a reviewer has
    /// decided are never touched.
    #[instrument(skip(self))]
    pub async fn run_matching(&self) -> Result<MatchingRunSummary, AppError> {
        let customers = self.books.query_customers().await?;
        let organizations = self.ledger.list_customer_organizations().await?;
        let manager_index = self.ledger.manager_index().await?;

        info!(
            organizations = organizations.len(),
            qb_customers = customers.len(),
            "Starting customer matching run"
        );

        let mut summary = MatchingRunSummary::default();

        for org in organizations.iter().filter(|o| o.active) {
            summary.organizations += 1;
            let started = Instant::now();

            let candidates = score_organization(org.code.as_deref(), &org.name, &customers);
            let best = candidates.first();

            let (qb_id, qb_name, qb_email, confidence, method, factors) = match best {
                Some(c) => (
                    Some(c.qb_id.clone()),
                    Some(c.qb_name.clone()),
                    c.qb_email.clone(),
                    c.score,
                    c.method,
                    c.factors.clone(),
                ),
                None => (
                    None,
                    None,
                    None,
                    0.0,
                    CustomerMatchMethod::NoMatch,
                    MatchFactors::default(),
                ),
            };

            let status = if best.is_some() && confidence >= PROPOSE_THRESHOLD {
                summary.proposed += 1;
                MappingStatus::Proposed
            } else {
                summary.needs_review += 1;
                MappingStatus::NeedsReview
            };

            MATCH_OPERATIONS
                .with_label_values(&["customer", method.as_str()])
                .inc();

            // One row per manager, or a single org-wide row when the
            // organization has no managers.
            let managers: Vec<(String, Option<LedgerManager>)> = match manager_index.get(&org.id)
            {
                Some(list) if !list.is_empty() => list
                    .iter()
                    .map(|m| (m.id.clone(), Some(m.clone())))
                    .collect(),
                _ => vec![(String::new(), None)],
            };

            for (manager_id, manager) in managers {
                let mapping = NewCustomerMapping {
                    organization_id: org.id.clone(),
                    manager_id,
                    organization_name: org.name.clone(),
                    manager_name: manager.as_ref().map(|m| m.name.clone()),
                    manager_email: manager.as_ref().and_then(|m| m.email.clone()),
                    qb_customer_id: qb_id.clone(),
                    qb_customer_name: qb_name.clone(),
                    qb_customer_email: qb_email.clone(),
                    status,
                    confidence,
                    match_method: method,
                    factors: factors.clone(),
                };

                if self.store.upsert_customer_mapping(&mapping, true).await? {
                    summary.mappings_written += 1;
                } else {
                    summary.mappings_preserved += 1;
                }
            }

            let log = MatchLogEntry {
                entity_type: "customer".to_string(),
                entity_id: org.id.clone(),
                algorithm_version: ALGORITHM_VERSION.to_string(),
                candidate_count: candidates.len() as i32,
                best_match_id: best.map(|c| c.qb_id.clone()),
                best_match_score: best.map(|c| c.score),
                candidates: candidates
                    .iter()
                    .take(5)
                    .map(|c| MatchCandidate {
                        id: c.qb_id.clone(),
                        name: c.qb_name.clone(),
                        score: c.score,
                        method: c.method.as_str().to_string(),
                    })
                    .collect(),
                criteria: format!(
                    "org_code={}, org_name={}",
                    org.code.as_deref().unwrap_or("-"),
                    org.name
                ),
                execution_ms: started.elapsed().as_millis() as i64,
            };
            if let Err(e) = self.store.insert_match_log(&log).await {
                warn!(organization_id = %org.id, error = %e, "Failed to write match log");
            }
        }

        info!(
            written = summary.mappings_written,
            preserved = summary.mappings_preserved,
            proposed = summary.proposed,
            needs_review = summary.needs_review,
            "Customer matching run finished"
        );
        Ok(summary)
    }

    pub async fn get_mappings(
        &self,
        filter: &MappingFilter,
    ) -> Result<Vec<CustomerMapping>, AppError> {
        self.store.list_customer_mappings(filter).await
    }

    pub async fn get_mapping_stats(&self) -> Result<MappingStats, AppError> {
        let mappings = self
            .store
            .list_customer_mappings(&MappingFilter::default())
            .await?;

        let mut stats = MappingStats {
            total: mappings.len(),
            ..Default::default()
        };
        for mapping in &mappings {
            match mapping.mapping_status() {
                MappingStatus::Approved => stats.approved += 1,
                MappingStatus::Rejected => stats.rejected += 1,
                MappingStatus::Proposed => stats.proposed += 1,
                MappingStatus::NeedsReview => stats.needs_review += 1,
            }
            if mapping.qb_customer_id.is_some() {
                stats.with_qb_link += 1;
            }
        }
        Ok(stats)
    }

    #[instrument(skip(self, notes))]
    pub async fn approve_mapping(
        &self,
        id: i64,
        reviewed_by: &str,
        notes: Option<&str>,
    ) -> Result<CustomerMapping, AppError> {
        self.store
            .set_customer_mapping_status(id, MappingStatus::Approved, reviewed_by, notes)
            .await
    }

    #[instrument(skip(self, notes))]
    pub async fn reject_mapping(
        &self,
        id: i64,
        reviewed_by: &str,
        notes: Option<&str>,
    ) -> Result<CustomerMapping, AppError> {
        self.store
            .set_customer_mapping_status(id, MappingStatus::Rejected, reviewed_by, notes)
            .await
    }

    /// Create a reviewer-chosen mapping directly. Overwrites any existing
    /// row for the pair, decided or not.
    #[instrument(skip(self))]
    pub async fn create_manual_mapping(
        &self,
        organization_id: &str,
        manager_id: &str,
        qb_customer_id: &str,
    ) -> Result<CustomerMapping, AppError> {
        let org = self
            .ledger
            .get_organization(organization_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!(
                    "Organization {} not found in ledger",
                    organization_id
                ))
            })?;
        let customer = self
            .books
            .get_customer(qb_customer_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!(
                    "QuickBooks customer {} not found",
                    qb_customer_id
                ))
            })?;

        let manager = if manager_id.is_empty() {
            None
        } else {
            self.ledger.get_manager(manager_id).await?
        };

        let mapping = NewCustomerMapping {
            organization_id: organization_id.to_string(),
            manager_id: manager_id.to_string(),
            organization_name: org.name,
            manager_name: manager.as_ref().map(|m| m.name.clone()),
            manager_email: manager.as_ref().and_then(|m| m.email.clone()),
            qb_customer_id: Some(customer.id.clone()),
            qb_customer_name: Some(customer.display_name.clone()),
            qb_customer_email: customer.email.clone(),
            status: MappingStatus::Approved,
            confidence: 1.0,
            match_method: CustomerMatchMethod::Manual,
            factors: MatchFactors::default(),
        };

        self.store.upsert_customer_mapping(&mapping, false).await?;
        self.store
            .get_customer_mapping(organization_id, manager_id)
            .await?
            .ok_or_else(|| {
                AppError::InternalError(anyhow::anyhow!("Manual mapping vanished after upsert"))
            })
    }

    /// Point an existing mapping at a different QuickBooks customer.
    #[instrument(skip(self))]
    pub async fn update_qb_customer(
        &self,
        id: i64,
        qb_customer_id: &str,
    ) -> Result<CustomerMapping, AppError> {
        let customer = self
            .books
            .get_customer(qb_customer_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!(
                    "QuickBooks customer {} not found",
                    qb_customer_id
                ))
            })?;

        self.store
            .repoint_customer_mapping(id, &customer.id, &customer.display_name)
            .await
    }

    /// Delete every undecided mapping and its match logs. Approved and
    /// rejected rows survive, and so does their audit history.
    #[instrument(skip(self))]
    pub async fn clear_unapproved_mappings(&self) -> Result<u64, AppError> {
        let deleted = self.store.delete_undecided_customer_mappings().await?;
        self.store.delete_match_logs_for_unmapped("customer").await?;
        info!(deleted = deleted, "Cleared undecided customer mappings");
        Ok(deleted)
    }
}
