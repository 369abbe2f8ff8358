//! Database service for qbsync-service.

use crate::models::{
    CustomerMapping, InvoiceValidation, MappingStatus, MatchLogEntry, NewCustomerMapping,
    NewSkuMapping, NewValidation, SkuMapping,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::{
    MappingFilter, SyncStore, ValidationFilter, ValidationUpsert,
};
use async_trait::async_trait;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "qbsync-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl SyncStore for Database {
    // =========================================================================
    // Customer Mapping Operations
    // =========================================================================

    #[instrument(skip(self), fields(organization_id = %organization_id))]
    async fn get_customer_mapping(
        &self,
        organization_id: &str,
        manager_id: &str,
    ) -> Result<Option<CustomerMapping>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_customer_mapping"])
            .start_timer();

        let mapping = sqlx::query_as::<_, CustomerMapping>(
            r#"
            SELECT * FROM customer_mappings
            WHERE organization_id = $1 AND manager_id = $2
            "#,
        )
        .bind(organization_id)
        .bind(manager_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get customer mapping: {}", e))
        })?;

        timer.observe_duration();
        Ok(mapping)
    }

    #[instrument(skip(self), fields(organization_id = %organization_id))]
    async fn resolve_customer_mapping(
        &self,
        organization_id: &str,
        manager_id: &str,
    ) -> Result<Option<CustomerMapping>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["resolve_customer_mapping"])
            .start_timer();

        // Exact (organization, manager) row first, then the
        // organization-wide row, then any row for the organization.
        let mapping = sqlx::query_as::<_, CustomerMapping>(
            r#"
            SELECT * FROM customer_mappings
            WHERE organization_id = $1
            ORDER BY
                CASE
                    WHEN manager_id = $2 THEN 0
                    WHEN manager_id = '' THEN 1
                    ELSE 2
                END,
                updated_utc DESC
            LIMIT 1
            "#,
        )
        .bind(organization_id)
        .bind(manager_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to resolve customer mapping: {}", e))
        })?;

        timer.observe_duration();
        Ok(mapping)
    }

    #[instrument(skip(self, filter))]
    async fn list_customer_mappings(
        &self,
        filter: &MappingFilter,
    ) -> Result<Vec<CustomerMapping>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_customer_mappings"])
            .start_timer();

        let search = filter.search.as_ref().map(|s| format!("%{}%", s));

        let mappings = sqlx::query_as::<_, CustomerMapping>(
            r#"
            SELECT * FROM customer_mappings
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::text IS NULL
                   OR organization_id ILIKE $2
                   OR organization_name ILIKE $2
                   OR manager_name ILIKE $2
                   OR qb_customer_name ILIKE $2)
            ORDER BY organization_id, manager_id
            "#,
        )
        .bind(&filter.status)
        .bind(search)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list customer mappings: {}", e))
        })?;

        timer.observe_duration();
        Ok(mappings)
    }

    #[instrument(skip(self, mapping), fields(organization_id = %mapping.organization_id))]
    async fn upsert_customer_mapping(
        &self,
        mapping: &NewCustomerMapping,
        preserve_decided: bool,
    ) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["upsert_customer_mapping"])
            .start_timer();

        let factors = serde_json::to_value(&mapping.factors)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Invalid factors: {}", e)))?;

        // RETURNING only fires when the row is actually written, so a None
        // result means a decided row was preserved.
        let sql = if preserve_decided {
            r#"
            INSERT INTO customer_mappings (
                organization_id, manager_id, organization_name, manager_name,
                manager_email, qb_customer_id, qb_customer_name,
                qb_customer_email, status, confidence, match_method, factors
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (organization_id, manager_id) DO UPDATE SET
                organization_name = EXCLUDED.organization_name,
                manager_name = EXCLUDED.manager_name,
                manager_email = EXCLUDED.manager_email,
                qb_customer_id = EXCLUDED.qb_customer_id,
                qb_customer_name = EXCLUDED.qb_customer_name,
                qb_customer_email = EXCLUDED.qb_customer_email,
                status = EXCLUDED.status,
                confidence = EXCLUDED.confidence,
                match_method = EXCLUDED.match_method,
                factors = EXCLUDED.factors,
                updated_utc = NOW()
            WHERE customer_mappings.status NOT IN ('approved', 'rejected')
            RETURNING id
            "#
        } else {
            r#"
            INSERT INTO customer_mappings (
                organization_id, manager_id, organization_name, manager_name,
                manager_email, qb_customer_id, qb_customer_name,
                qb_customer_email, status, confidence, match_method, factors
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (organization_id, manager_id) DO UPDATE SET
                organization_name = EXCLUDED.organization_name,
                manager_name = EXCLUDED.manager_name,
                manager_email = EXCLUDED.manager_email,
                qb_customer_id = EXCLUDED.qb_customer_id,
                qb_customer_name = EXCLUDED.qb_customer_name,
                qb_customer_email = EXCLUDED.qb_customer_email,
                status = EXCLUDED.status,
                confidence = EXCLUDED.confidence,
                match_method = EXCLUDED.match_method,
                factors = EXCLUDED.factors,
                updated_utc = NOW()
            RETURNING id
            "#
        };

        let written: Option<(i64,)> = sqlx::query_as(sql)
            .bind(&mapping.organization_id)
            .bind(&mapping.manager_id)
            .bind(&mapping.organization_name)
            .bind(&mapping.manager_name)
            .bind(&mapping.manager_email)
            .bind(&mapping.qb_customer_id)
            .bind(&mapping.qb_customer_name)
            .bind(&mapping.qb_customer_email)
            .bind(mapping.status.as_str())
            .bind(mapping.confidence)
            .bind(mapping.match_method.as_str())
            .bind(factors)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!(
                    "Failed to upsert customer mapping: {}",
                    e
                ))
            })?;

        timer.observe_duration();
        Ok(written.is_some())
    }

    #[instrument(skip(self), fields(mapping_id = %id))]
    async fn set_customer_mapping_status(
        &self,
        id: i64,
        status: MappingStatus,
        reviewed_by: &str,
        notes: Option<&str>,
    ) -> Result<CustomerMapping, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["set_customer_mapping_status"])
            .start_timer();

        let mapping = sqlx::query_as::<_, CustomerMapping>(
            r#"
            UPDATE customer_mappings
            SET status = $2,
                reviewed_by = $3,
                reviewed_utc = NOW(),
                review_notes = $4,
                updated_utc = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(reviewed_by)
        .bind(notes)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update mapping status: {}", e))
        })?;

        timer.observe_duration();
        mapping.ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Customer mapping {} not found", id))
        })
    }

    #[instrument(skip(self), fields(mapping_id = %id, qb_customer_id = %qb_customer_id))]
    async fn repoint_customer_mapping(
        &self,
        id: i64,
        qb_customer_id: &str,
        qb_customer_name: &str,
    ) -> Result<CustomerMapping, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["repoint_customer_mapping"])
            .start_timer();

        let mapping = sqlx::query_as::<_, CustomerMapping>(
            r#"
            UPDATE customer_mappings
            SET qb_customer_id = $2,
                qb_customer_name = $3,
                status = 'approved',
                confidence = 1.0,
                match_method = 'manual',
                updated_utc = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(qb_customer_id)
        .bind(qb_customer_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to repoint mapping: {}", e))
        })?;

        timer.observe_duration();
        mapping.ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Customer mapping {} not found", id))
        })
    }

    #[instrument(skip(self))]
    async fn delete_undecided_customer_mappings(&self) -> Result<u64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_undecided_customer_mappings"])
            .start_timer();

        let result = sqlx::query(
            r#"
            DELETE FROM customer_mappings
            WHERE status NOT IN ('approved', 'rejected')
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to delete mappings: {}", e))
        })?;

        timer.observe_duration();
        Ok(result.rows_affected())
    }

    // =========================================================================
    // SKU Mapping Operations
    // =========================================================================

    #[instrument(skip(self), fields(sku_code = %sku_code))]
    async fn get_sku_mapping(&self, sku_code: &str) -> Result<Option<SkuMapping>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_sku_mapping"])
            .start_timer();

        let mapping = sqlx::query_as::<_, SkuMapping>(
            r#"SELECT * FROM sku_mappings WHERE sku_code = $1"#,
        )
        .bind(sku_code)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get SKU mapping: {}", e))
        })?;

        timer.observe_duration();
        Ok(mapping)
    }

    #[instrument(skip(self, filter))]
    async fn list_sku_mappings(
        &self,
        filter: &MappingFilter,
    ) -> Result<Vec<SkuMapping>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_sku_mappings"])
            .start_timer();

        let search = filter.search.as_ref().map(|s| format!("%{}%", s));

        let mappings = sqlx::query_as::<_, SkuMapping>(
            r#"
            SELECT * FROM sku_mappings
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::text IS NULL
                   OR sku_code ILIKE $2
                   OR sku_name ILIKE $2
                   OR qb_item_name ILIKE $2)
            ORDER BY sku_code
            "#,
        )
        .bind(&filter.status)
        .bind(search)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list SKU mappings: {}", e))
        })?;

        timer.observe_duration();
        Ok(mappings)
    }

    #[instrument(skip(self, mapping), fields(sku_code = %mapping.sku_code))]
    async fn upsert_sku_mapping(
        &self,
        mapping: &NewSkuMapping,
        preserve_decided: bool,
    ) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["upsert_sku_mapping"])
            .start_timer();

        let sql = if preserve_decided {
            r#"
            INSERT INTO sku_mappings (
                sku_code, sku_name, qb_item_id, qb_item_name, qb_item_type,
                status, confidence, match_method
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (sku_code) DO UPDATE SET
                sku_name = EXCLUDED.sku_name,
                qb_item_id = EXCLUDED.qb_item_id,
                qb_item_name = EXCLUDED.qb_item_name,
                qb_item_type = EXCLUDED.qb_item_type,
                status = EXCLUDED.status,
                confidence = EXCLUDED.confidence,
                match_method = EXCLUDED.match_method,
                updated_utc = NOW()
            WHERE sku_mappings.status NOT IN ('approved', 'rejected')
            RETURNING id
            "#
        } else {
            r#"
            INSERT INTO sku_mappings (
                sku_code, sku_name, qb_item_id, qb_item_name, qb_item_type,
                status, confidence, match_method
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (sku_code) DO UPDATE SET
                sku_name = EXCLUDED.sku_name,
                qb_item_id = EXCLUDED.qb_item_id,
                qb_item_name = EXCLUDED.qb_item_name,
                qb_item_type = EXCLUDED.qb_item_type,
                status = EXCLUDED.status,
                confidence = EXCLUDED.confidence,
                match_method = EXCLUDED.match_method,
                updated_utc = NOW()
            RETURNING id
            "#
        };

        let written: Option<(i64,)> = sqlx::query_as(sql)
            .bind(&mapping.sku_code)
            .bind(&mapping.sku_name)
            .bind(&mapping.qb_item_id)
            .bind(&mapping.qb_item_name)
            .bind(&mapping.qb_item_type)
            .bind(mapping.status.as_str())
            .bind(mapping.confidence)
            .bind(mapping.match_method.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to upsert SKU mapping: {}", e))
            })?;

        timer.observe_duration();
        Ok(written.is_some())
    }

    // =========================================================================
    // Invoice Validation Operations
    // =========================================================================

    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    async fn get_validation(
        &self,
        invoice_id: &str,
    ) -> Result<Option<InvoiceValidation>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_validation"])
            .start_timer();

        let validation = sqlx::query_as::<_, InvoiceValidation>(
            r#"SELECT * FROM invoice_validations WHERE invoice_id = $1"#,
        )
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get validation: {}", e))
        })?;

        timer.observe_duration();
        Ok(validation)
    }

    #[instrument(skip(self, filter))]
    async fn list_validations(
        &self,
        filter: &ValidationFilter,
    ) -> Result<Vec<InvoiceValidation>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_validations"])
            .start_timer();

        let search = filter.search.as_ref().map(|s| format!("%{}%", s));

        let validations = sqlx::query_as::<_, InvoiceValidation>(
            r#"
            SELECT * FROM invoice_validations
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::text IS NULL
                   OR invoice_id ILIKE $2
                   OR invoice_number ILIKE $2)
              AND ($3 = false OR ready_for_sync = true)
            ORDER BY updated_utc DESC
            "#,
        )
        .bind(&filter.status)
        .bind(search)
        .bind(filter.ready_only)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list validations: {}", e))
        })?;

        timer.observe_duration();
        Ok(validations)
    }

    #[instrument(skip(self, validation), fields(invoice_id = %validation.invoice_id))]
    async fn upsert_validation(
        &self,
        validation: &NewValidation,
    ) -> Result<ValidationUpsert, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["upsert_validation"])
            .start_timer();

        let outcome = &validation.outcome;
        let issues = serde_json::to_value(&outcome.issues)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Invalid issues: {}", e)))?;

        // Synced rows are immutable; re-validation also clears any prior
        // approval since the outcome it endorsed no longer stands.
        let written: Option<(i64,)> = sqlx::query_as(
            r#"
            INSERT INTO invoice_validations (
                invoice_id, invoice_number, status, customer_mapping_ok,
                skus_mapped, issues, confidence, ready_for_sync
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (invoice_id) DO UPDATE SET
                invoice_number = EXCLUDED.invoice_number,
                status = EXCLUDED.status,
                customer_mapping_ok = EXCLUDED.customer_mapping_ok,
                skus_mapped = EXCLUDED.skus_mapped,
                issues = EXCLUDED.issues,
                confidence = EXCLUDED.confidence,
                ready_for_sync = EXCLUDED.ready_for_sync,
                approved_by = NULL,
                approved_utc = NULL,
                updated_utc = NOW()
            WHERE invoice_validations.status <> 'synced'
            RETURNING id
            "#,
        )
        .bind(&validation.invoice_id)
        .bind(&validation.invoice_number)
        .bind(outcome.status.as_str())
        .bind(outcome.customer_mapping_ok)
        .bind(outcome.skus_mapped)
        .bind(issues)
        .bind(outcome.confidence)
        .bind(outcome.ready_for_sync)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to upsert validation: {}", e))
        })?;

        timer.observe_duration();
        Ok(if written.is_some() {
            ValidationUpsert::Written
        } else {
            ValidationUpsert::SkippedSynced
        })
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    async fn approve_validation_for_sync(
        &self,
        invoice_id: &str,
        approved_by: &str,
    ) -> Result<InvoiceValidation, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["approve_validation_for_sync"])
            .start_timer();

        let approved = sqlx::query_as::<_, InvoiceValidation>(
            r#"
            UPDATE invoice_validations
            SET approved_by = $2,
                approved_utc = NOW(),
                updated_utc = NOW()
            WHERE invoice_id = $1 AND status = 'ready'
            RETURNING *
            "#,
        )
        .bind(invoice_id)
        .bind(approved_by)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to approve validation: {}", e))
        })?;

        timer.observe_duration();

        match approved {
            Some(v) => Ok(v),
            None => match self.get_validation(invoice_id).await? {
                Some(v) => Err(AppError::Conflict(anyhow::anyhow!(
                    "Invoice {} is {} and cannot be approved for sync",
                    invoice_id,
                    v.status
                ))),
                None => Err(AppError::NotFound(anyhow::anyhow!(
                    "No validation found for invoice {}",
                    invoice_id
                ))),
            },
        }
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id, qb_invoice_id = %qb_invoice_id))]
    async fn mark_validation_synced(
        &self,
        invoice_id: &str,
        invoice_number: Option<&str>,
        qb_invoice_id: &str,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_validation_synced"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO invoice_validations (
                invoice_id, invoice_number, status, customer_mapping_ok,
                skus_mapped, issues, confidence, ready_for_sync,
                qb_invoice_id, synced_utc
            )
            VALUES ($1, $2, 'synced', true, true, '[]'::jsonb, 1.0, false, $3, NOW())
            ON CONFLICT (invoice_id) DO UPDATE SET
                status = 'synced',
                ready_for_sync = false,
                qb_invoice_id = EXCLUDED.qb_invoice_id,
                synced_utc = NOW(),
                updated_utc = NOW()
            "#,
        )
        .bind(invoice_id)
        .bind(invoice_number)
        .bind(qb_invoice_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to mark validation synced: {}", e))
        })?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    async fn delete_validation(&self, invoice_id: &str) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_validation"])
            .start_timer();

        let result = sqlx::query(r#"DELETE FROM invoice_validations WHERE invoice_id = $1"#)
            .bind(invoice_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete validation: {}", e))
            })?;

        timer.observe_duration();
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn delete_all_validations(&self) -> Result<u64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_all_validations"])
            .start_timer();

        // Synced rows stay: they are the record of what was written.
        let result = sqlx::query(r#"DELETE FROM invoice_validations WHERE status <> 'synced'"#)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete validations: {}", e))
            })?;

        timer.observe_duration();
        Ok(result.rows_affected())
    }

    // =========================================================================
    // Match Audit Log Operations
    // =========================================================================

    #[instrument(skip(self, entry), fields(entity_type = %entry.entity_type, entity_id = %entry.entity_id))]
    async fn insert_match_log(&self, entry: &MatchLogEntry) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_match_log"])
            .start_timer();

        let candidates = serde_json::to_value(&entry.candidates)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Invalid candidates: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO match_logs (
                entity_type, entity_id, algorithm_version, candidate_count,
                best_match_id, best_match_score, candidates, criteria,
                execution_ms
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&entry.entity_type)
        .bind(&entry.entity_id)
        .bind(&entry.algorithm_version)
        .bind(entry.candidate_count)
        .bind(&entry.best_match_id)
        .bind(entry.best_match_score)
        .bind(candidates)
        .bind(&entry.criteria)
        .bind(entry.execution_ms)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to insert match log: {}", e))
        })?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self), fields(entity_type = %entity_type))]
    async fn delete_match_logs(&self, entity_type: &str) -> Result<u64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_match_logs"])
            .start_timer();

        let result = sqlx::query(r#"DELETE FROM match_logs WHERE entity_type = $1"#)
            .bind(entity_type)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete match logs: {}", e))
            })?;

        timer.observe_duration();
        Ok(result.rows_affected())
    }

    #[instrument(skip(self), fields(entity_type = %entity_type))]
    async fn delete_match_logs_for_unmapped(&self, entity_type: &str) -> Result<u64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_match_logs_for_unmapped"])
            .start_timer();

        let query = match entity_type {
            "customer" => {
                r#"
                DELETE FROM match_logs
                WHERE entity_type = 'customer'
                  AND NOT EXISTS (
                      SELECT 1 FROM customer_mappings cm
                      WHERE cm.organization_id = match_logs.entity_id
                  )
                "#
            }
            "sku" => {
                r#"
                DELETE FROM match_logs
                WHERE entity_type = 'sku'
                  AND NOT EXISTS (
                      SELECT 1 FROM sku_mappings sm
                      WHERE sm.sku_code = match_logs.entity_id
                  )
                "#
            }
            other => {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "No mapping table for entity type {}",
                    other
                )));
            }
        };

        let result = sqlx::query(query).execute(&self.pool).await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to delete match logs: {}", e))
        })?;

        timer.observe_duration();
        Ok(result.rows_affected())
    }
}
