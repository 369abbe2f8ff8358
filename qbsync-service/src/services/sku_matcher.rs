//! SKU matching between ledger line items and QuickBooks items.
//!
//! Exact code wins, then exact normalized name, then fuzzy name above a
//! floor. Items QuickBooks has soft-deleted (renamed with a "(deleted)"
//! marker) are never candidates.
//!
//! A matching run is ephemeral: it reports classifications and writes the
//! audit log, but a durable SkuMapping row exists only once a human
//! approves a match or creates the missing item. "The algorithm suggests
//! X" and "X is authorized for sync" are different statements.

use crate::clients::{LedgerConnector, QuickBooks};
use crate::models::{
    MatchCandidate, MatchLogEntry, NewSkuMapping, QbItem, SkuMapping, SkuMappingStatus,
    SkuMatchMethod, SkuUsage,
};
use crate::services::fuzzy;
use crate::services::metrics::MATCH_OPERATIONS;
use crate::services::store::{MappingFilter, SyncStore};
use serde::Serialize;
use service_core::error::AppError;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

const ALGORITHM_VERSION: &str = "1.0";

/// Fuzzy name similarity below this is not a match.
const FUZZY_FLOOR: f64 = 0.80;

/// One scored QuickBooks item candidate.
#[derive(Debug, Clone)]
pub struct SkuCandidate {
    pub item_id: String,
    pub item_name: String,
    pub item_type: Option<String>,
    pub method: SkuMatchMethod,
    pub score: f64,
}

/// Classification of one ledger SKU against the item catalog.
#[derive(Debug, Clone)]
pub struct SkuMatch {
    pub sku: SkuUsage,
    pub qb_item_id: Option<String>,
    pub qb_item_name: Option<String>,
    pub qb_item_type: Option<String>,
    pub method: SkuMatchMethod,
    pub confidence: f64,
}

/// Outcome of a full SKU matching run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SkuMatchingRunSummary {
    pub skus: usize,
    pub matched: usize,
    pub unmatched: usize,
}

/// Counts over a fresh classification pass, broken down by match type.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SkuMatchStats {
    pub total: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub exact_code: usize,
    pub exact_name: usize,
    pub fuzzy_name: usize,
    pub no_match: usize,
}

fn item_eligible(item: &QbItem) -> bool {
    item.active && !item.name.to_lowercase().contains("(deleted)")
}

/// Score every eligible catalog item against one SKU, best-first.
pub fn score_sku(sku: &SkuUsage, items: &[QbItem]) -> Vec<SkuCandidate> {
    let normalized_name = fuzzy::normalize(&sku.name);
    let mut candidates: Vec<SkuCandidate> = Vec::new();

    for item in items.iter().filter(|i| item_eligible(i)) {
        let (method, score) = if sku
            .sku_code
            .as_deref()
            .is_some_and(|code| item.sku.as_deref() == Some(code))
        {
            (SkuMatchMethod::ExactCode, 1.0)
        } else if !normalized_name.is_empty()
            && fuzzy::normalize(&item.name) == normalized_name
        {
            (SkuMatchMethod::ExactName, 0.95)
        } else {
            let similarity = fuzzy::combined_similarity(&sku.name, &item.name);
            if similarity < FUZZY_FLOOR {
                continue;
            }
            (SkuMatchMethod::FuzzyName, similarity * 0.90)
        };

        candidates.push(SkuCandidate {
            item_id: item.id.clone(),
            item_name: item.name.clone(),
            item_type: item.item_type.clone(),
            method,
            score,
        });
    }

    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    candidates
}

/// Classify one SKU: the best candidate, or a no-match.
pub fn classify(sku: &SkuUsage, items: &[QbItem]) -> SkuMatch {
    match score_sku(sku, items).into_iter().next() {
        Some(best) => SkuMatch {
            sku: sku.clone(),
            qb_item_id: Some(best.item_id),
            qb_item_name: Some(best.item_name),
            qb_item_type: best.item_type,
            method: best.method,
            confidence: best.score,
        },
        None => SkuMatch {
            sku: sku.clone(),
            qb_item_id: None,
            qb_item_name: None,
            qb_item_type: None,
            method: SkuMatchMethod::NoMatch,
            confidence: 0.0,
        },
    }
}

/// Matches ledger SKUs to QuickBooks items and manages the mapping table.
pub struct SkuMatcher {
    store: Arc<dyn SyncStore>,
    ledger: Arc<dyn LedgerConnector>,
    books: Arc<dyn QuickBooks>,
}

impl SkuMatcher {
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

    /// Snapshot of what is being classified: every SKU in use on
    /// sync-eligible invoices, against the live item catalog.
    async fn gather(&self) -> Result<(Vec<SkuUsage>, Vec<QbItem>), AppError> {
        let skus = self.ledger.collect_invoice_skus().await?;
        let items = match self.books.query_items().await {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "Item catalog unavailable, treating all SKUs as unmatched");
                Vec::new()
            }
        };
        Ok((skus, items))
    }

    /// Classify one in-use SKU against the live catalog.
    async fn classify_one(&self, sku_code: &str) -> Result<SkuMatch, AppError> {
        let skus = self.ledger.collect_invoice_skus().await?;
        let sku = skus
            .into_iter()
            .find(|s| s.key() == sku_code)
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!(
                    "SKU {} does not appear on any sync-eligible invoice",
                    sku_code
                ))
            })?;
        let items = self.books.query_items().await?;
        Ok(classify(&sku, &items))
    }

    /// Match every SKU in use on sync-eligible invoices. Classifications
    /// are reported and audit-logged but nothing is persisted to the
    /// mapping table; approval is a separate step. An unreachable item
    /// catalog degrades to "everything unmatched" rather than failing the
    /// run.
    #[instrument(skip(self))]
    pub async fn match_invoice_skus(&self) -> Result<SkuMatchingRunSummary, AppError> {
        let (skus, items) = self.gather().await?;

        info!(
            skus = skus.len(),
            qb_items = items.len(),
            "Starting SKU matching run"
        );

        let mut summary = SkuMatchingRunSummary {
            skus: skus.len(),
            ..Default::default()
        };

        for sku in &skus {
            let started = Instant::now();
            let candidates = score_sku(sku, &items);
            let result = classify(sku, &items);

            MATCH_OPERATIONS
                .with_label_values(&["sku", result.method.as_str()])
                .inc();

            if result.qb_item_id.is_some() {
                summary.matched += 1;
            } else {
                summary.unmatched += 1;
            }

            let log = MatchLogEntry {
                entity_type: "sku".to_string(),
                entity_id: sku.key().to_string(),
                algorithm_version: ALGORITHM_VERSION.to_string(),
                candidate_count: candidates.len() as i32,
                best_match_id: result.qb_item_id.clone(),
                best_match_score: result.qb_item_id.as_ref().map(|_| result.confidence),
                candidates: candidates
                    .iter()
                    .take(5)
                    .map(|c| MatchCandidate {
                        id: c.item_id.clone(),
                        name: c.item_name.clone(),
                        score: c.score,
                        method: c.method.as_str().to_string(),
                    })
                    .collect(),
                criteria: format!("sku_code={}, sku_name={}", sku.key(), sku.name),
                execution_ms: started.elapsed().as_millis() as i64,
            };
            if let Err(e) = self.store.insert_match_log(&log).await {
                warn!(sku = %sku.key(), error = %e, "Failed to write match log");
            }
        }

        info!(
            matched = summary.matched,
            unmatched = summary.unmatched,
            "SKU matching run finished"
        );
        Ok(summary)
    }

    pub async fn get_mappings(
        &self,
        filter: &MappingFilter,
    ) -> Result<Vec<SkuMapping>, AppError> {
        self.store.list_sku_mappings(filter).await
    }

    /// Classify everything fresh and tally by match type. This reads the
    /// ledger and catalog, not the mapping table, so the numbers reflect
    /// what a run would report right now.
    pub async fn get_match_stats(&self) -> Result<SkuMatchStats, AppError> {
        let (skus, items) = self.gather().await?;

        let mut stats = SkuMatchStats {
            total: skus.len(),
            ..Default::default()
        };
        for sku in &skus {
            let result = classify(sku, &items);
            if result.qb_item_id.is_some() {
                stats.matched += 1;
            } else {
                stats.unmatched += 1;
            }
            match result.method {
                SkuMatchMethod::ExactCode => stats.exact_code += 1,
                SkuMatchMethod::ExactName => stats.exact_name += 1,
                SkuMatchMethod::FuzzyName => stats.fuzzy_name += 1,
                SkuMatchMethod::NoMatch => stats.no_match += 1,
            }
        }
        Ok(stats)
    }

    /// Approve the current match for one SKU, persisting it as an approved
    /// mapping row. The classification is recomputed against the live
    /// catalog so stale suggestions cannot be approved.
    #[instrument(skip(self))]
    pub async fn approve_match(&self, sku_code: &str) -> Result<SkuMapping, AppError> {
        let result = self.classify_one(sku_code).await?;

        if result.qb_item_id.is_none() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "SKU {} has no QuickBooks item match to approve",
                sku_code
            )));
        }

        let approved = NewSkuMapping {
            sku_code: sku_code.to_string(),
            sku_name: result.sku.name.clone(),
            qb_item_id: result.qb_item_id.clone(),
            qb_item_name: result.qb_item_name.clone(),
            qb_item_type: result.qb_item_type.clone(),
            status: SkuMappingStatus::Approved,
            confidence: result.confidence,
            match_method: result.method,
        };
        self.store.upsert_sku_mapping(&approved, false).await?;

        self.store.get_sku_mapping(sku_code).await?.ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!("SKU mapping vanished after approval"))
        })
    }

    /// Approve every SKU that currently matches an item. No-matches are
    /// skipped, as are rows already approved for the identical item and
    /// rows a human has rejected.
    #[instrument(skip(self))]
    pub async fn approve_all_matches(&self) -> Result<usize, AppError> {
        let skus = self.ledger.collect_invoice_skus().await?;
        let items = self.books.query_items().await?;

        let mut approved = 0;
        for sku in &skus {
            let result = classify(sku, &items);
            let Some(item_id) = result.qb_item_id.clone() else {
                continue;
            };

            if let Some(existing) = self.store.get_sku_mapping(sku.key()).await? {
                let decided_same = existing.mapping_status() == SkuMappingStatus::Approved
                    && existing.qb_item_id.as_deref() == Some(item_id.as_str());
                let rejected = existing.mapping_status() == SkuMappingStatus::Rejected;
                if decided_same || rejected {
                    continue;
                }
            }

            let update = NewSkuMapping {
                sku_code: sku.key().to_string(),
                sku_name: sku.name.clone(),
                qb_item_id: result.qb_item_id.clone(),
                qb_item_name: result.qb_item_name.clone(),
                qb_item_type: result.qb_item_type.clone(),
                status: SkuMappingStatus::Approved,
                confidence: result.confidence,
                match_method: result.method,
            };
            self.store.upsert_sku_mapping(&update, false).await?;
            approved += 1;
        }

        info!(approved = approved, "Approved all current SKU matches");
        Ok(approved)
    }

    /// Create a QuickBooks item for an unmatched SKU and persist the link
    /// as an approved mapping.
    #[instrument(skip(self))]
    pub async fn create_item_for_sku(
        &self,
        sku_code: &str,
        item_type: &str,
    ) -> Result<SkuMapping, AppError> {
        if let Some(existing) = self.store.get_sku_mapping(sku_code).await? {
            if let Some(item_id) = existing.qb_item_id.as_deref() {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "SKU {} is already matched to item {}",
                    sku_code,
                    item_id
                )));
            }
        }

        let result = self.classify_one(sku_code).await?;
        if let Some(item_id) = result.qb_item_id.as_deref() {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "SKU {} is already matched to item {}",
                sku_code,
                item_id
            )));
        }

        let item = self
            .books
            .create_item(&result.sku.name, Some(sku_code), item_type)
            .await?;

        let update = NewSkuMapping {
            sku_code: sku_code.to_string(),
            sku_name: result.sku.name.clone(),
            qb_item_id: Some(item.id.clone()),
            qb_item_name: Some(item.name.clone()),
            qb_item_type: item.item_type.clone(),
            status: SkuMappingStatus::Approved,
            confidence: 1.0,
            match_method: SkuMatchMethod::ExactCode,
        };
        self.store.upsert_sku_mapping(&update, false).await?;

        self.store.get_sku_mapping(sku_code).await?.ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!("SKU mapping vanished after item creation"))
        })
    }
}
