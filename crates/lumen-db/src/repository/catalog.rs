//! # Catalog Repository
//!
//! Read access to catalog products for the checkout path, plus the
//! inserts the seed tooling needs.
//!
//! The catalog service owns the product lifecycle (pricing, activation,
//! branch scoping); this repository only reads what the sale core
//! snapshots onto lines. Products must be either global or owned by the
//! selling branch to be sellable there.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use lumen_core::{CatalogProduct, TaxCategory};

/// Repository for catalog product reads.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    /// Creates a new CatalogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    /// Gets a product by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<CatalogProduct>> {
        let product = sqlx::query_as::<_, CatalogProduct>(
            r#"
            SELECT id, branch_owner, description, brand, tax_category,
                   unit_value_cents, is_active, created_at
            FROM products
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Lists active products, newest first.
    pub async fn list_active(&self, limit: u32) -> DbResult<Vec<CatalogProduct>> {
        let products = sqlx::query_as::<_, CatalogProduct>(
            r#"
            SELECT id, branch_owner, description, brand, tax_category,
                   unit_value_cents, is_active, created_at
            FROM products
            WHERE is_active = 1
            ORDER BY created_at DESC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Inserts a product (seed tooling / catalog sync).
    pub async fn insert(&self, product: &CatalogProduct) -> DbResult<()> {
        debug!(id = %product.id, description = %product.description, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, branch_owner, description, brand, tax_category,
                unit_value_cents, is_active, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&product.id)
        .bind(&product.branch_owner)
        .bind(&product.description)
        .bind(&product.brand)
        .bind(product.tax_category)
        .bind(product.unit_value_cents)
        .bind(product.is_active)
        .bind(product.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Creates and inserts a product with a fresh UUID.
    pub async fn create(
        &self,
        branch_owner: Option<&str>,
        description: &str,
        brand: &str,
        tax_category: TaxCategory,
        unit_value_cents: i64,
    ) -> DbResult<CatalogProduct> {
        let product = CatalogProduct {
            id: Uuid::new_v4().to_string(),
            branch_owner: branch_owner.map(str::to_string),
            description: description.to_string(),
            brand: brand.to_string(),
            tax_category,
            unit_value_cents,
            is_active: true,
            created_at: Utc::now(),
        };
        self.insert(&product).await?;
        Ok(product)
    }

    /// Provisions a product: inserts it together with its stock record
    /// at each given branch, atomically.
    ///
    /// `branches` pairs each branch with (initial quantity, minimum
    /// threshold). Sales at a branch without a record fail with
    /// `ProductNotProvisioned`; this is the entry point that prevents
    /// that.
    pub async fn provision(
        &self,
        branch_owner: Option<&str>,
        description: &str,
        brand: &str,
        tax_category: TaxCategory,
        unit_value_cents: i64,
        branches: &[(&str, i64, i64)],
    ) -> DbResult<CatalogProduct> {
        let now = Utc::now();
        let product = CatalogProduct {
            id: Uuid::new_v4().to_string(),
            branch_owner: branch_owner.map(str::to_string),
            description: description.to_string(),
            brand: brand.to_string(),
            tax_category,
            unit_value_cents,
            is_active: true,
            created_at: now,
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO products (
                id, branch_owner, description, brand, tax_category,
                unit_value_cents, is_active, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&product.id)
        .bind(&product.branch_owner)
        .bind(&product.description)
        .bind(&product.brand)
        .bind(product.tax_category)
        .bind(product.unit_value_cents)
        .bind(product.is_active)
        .bind(product.created_at)
        .execute(&mut *tx)
        .await?;

        for (branch_id, initial_quantity, min_threshold) in branches {
            sqlx::query(
                r#"
                INSERT INTO stock_records (branch_id, product_id, quantity, min_threshold, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(branch_id)
            .bind(&product.id)
            .bind(initial_quantity)
            .bind(min_threshold)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(id = %product.id, branches = branches.len(), "Product provisioned");
        Ok(product)
    }

    /// Fetches a product for sale at a branch, inside the caller's
    /// transaction.
    ///
    /// Rejects inactive products and products owned by a different
    /// branch; both are reported as not found so the register message
    /// stays uniform.
    pub async fn fetch_sellable(
        conn: &mut SqliteConnection,
        product_id: &str,
        branch_id: &str,
    ) -> DbResult<CatalogProduct> {
        let product = sqlx::query_as::<_, CatalogProduct>(
            r#"
            SELECT id, branch_owner, description, brand, tax_category,
                   unit_value_cents, is_active, created_at
            FROM products
            WHERE id = ?1
              AND is_active = 1
              AND (branch_owner IS NULL OR branch_owner = ?2)
            "#,
        )
        .bind(product_id)
        .bind(branch_id)
        .fetch_optional(&mut *conn)
        .await?;

        product.ok_or_else(|| DbError::not_found("Sellable product", product_id))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_insert_and_get_product() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.catalog();

        let product = repo
            .create(None, "Luna monofocal CR-39", "Essilor", TaxCategory::Taxed, 10_000)
            .await
            .unwrap();

        let found = repo.get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(found.description, "Luna monofocal CR-39");
        assert_eq!(found.unit_value_cents, 10_000);
        assert!(found.is_active);
    }

    #[tokio::test]
    async fn test_provision_creates_stock_records() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let product = db
            .catalog()
            .provision(
                None,
                "Líquido limpiador 60ml",
                "OptiClean",
                TaxCategory::Taxed,
                1_200,
                &[("b-lima", 24, 6), ("b-cusco", 0, 6)],
            )
            .await
            .unwrap();

        let lima = db.stock().get("b-lima", &product.id).await.unwrap().unwrap();
        assert_eq!(lima.quantity, 24);
        assert_eq!(lima.min_threshold, 6);

        let cusco = db.stock().get("b-cusco", &product.id).await.unwrap().unwrap();
        assert_eq!(cusco.quantity, 0);
    }

    #[tokio::test]
    async fn test_fetch_sellable_scopes_by_branch() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.catalog();

        let global = repo
            .create(None, "Estuche rígido", "Generic", TaxCategory::Taxed, 1_500)
            .await
            .unwrap();
        let owned = repo
            .create(Some("b-lima"), "Montura exclusiva", "RayBan", TaxCategory::Taxed, 45_000)
            .await
            .unwrap();

        let mut conn = db.pool().acquire().await.unwrap();

        // Global product sells anywhere
        assert!(
            CatalogRepository::fetch_sellable(&mut conn, &global.id, "b-cusco")
                .await
                .is_ok()
        );

        // Branch-owned product only sells at its branch
        assert!(
            CatalogRepository::fetch_sellable(&mut conn, &owned.id, "b-lima")
                .await
                .is_ok()
        );
        let err = CatalogRepository::fetch_sellable(&mut conn, &owned.id, "b-cusco")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
