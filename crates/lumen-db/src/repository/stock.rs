//! # Stock Ledger
//!
//! Guarded quantity-on-hand adjustments per (branch, product).
//!
//! ## The Oversell Guard
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │              Two registers sell the last units at once                  │
//! │                                                                         │
//! │  stock_records: (b1, lens-x) quantity = 5                               │
//! │                                                                         │
//! │  Register A: adjust(-3)          Register B: adjust(-3)                 │
//! │       │                               │                                 │
//! │       ▼                               │  (waits on SQLite write lock)   │
//! │  UPDATE ... SET quantity = quantity - 3                                 │
//! │  WHERE ... AND quantity - 3 >= 0      │                                 │
//! │       │  rows_affected = 1 ✓          ▼                                 │
//! │       │                          UPDATE ... quantity = 2 - 3 >= 0? NO  │
//! │       │                               │  rows_affected = 0              │
//! │       ▼                               ▼                                 │
//! │  quantity = 2, commit            InsufficientStock { available: 2 }    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The decrement and its guard are one UPDATE statement, so the check
//! and the write cannot be separated by a rival writer. A failed guard
//! leaves the row untouched and the follow-up read tells the caller
//! whether the record was missing or merely short.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use lumen_core::{CoreError, StockRecord};

/// Repository for stock record operations.
///
/// All quantity mutations go through [`StockLedger::adjust`]; records
/// are created only by explicit provisioning, never as a side effect
/// of a sale.
#[derive(Debug, Clone)]
pub struct StockLedger {
    pool: SqlitePool,
}

impl StockLedger {
    /// Creates a new StockLedger.
    pub fn new(pool: SqlitePool) -> Self {
        StockLedger { pool }
    }

    /// Provisions a stock record for a product at a branch.
    ///
    /// Catalog management calls this when a product is introduced to a
    /// branch. Fails with a unique violation if the pair already exists.
    pub async fn provision(
        &self,
        branch_id: &str,
        product_id: &str,
        initial_quantity: i64,
        min_threshold: i64,
    ) -> DbResult<StockRecord> {
        debug!(branch_id, product_id, initial_quantity, "Provisioning stock record");

        let record = StockRecord {
            branch_id: branch_id.to_string(),
            product_id: product_id.to_string(),
            quantity: initial_quantity,
            min_threshold,
            updated_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO stock_records (branch_id, product_id, quantity, min_threshold, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&record.branch_id)
        .bind(&record.product_id)
        .bind(record.quantity)
        .bind(record.min_threshold)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    /// Gets the stock record for a (branch, product) pair.
    pub async fn get(&self, branch_id: &str, product_id: &str) -> DbResult<Option<StockRecord>> {
        let record = sqlx::query_as::<_, StockRecord>(
            r#"
            SELECT branch_id, product_id, quantity, min_threshold, updated_at
            FROM stock_records
            WHERE branch_id = ?1 AND product_id = ?2
            "#,
        )
        .bind(branch_id)
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Lists records at or below their reorder threshold.
    pub async fn low_stock(&self, branch_id: &str) -> DbResult<Vec<StockRecord>> {
        let records = sqlx::query_as::<_, StockRecord>(
            r#"
            SELECT branch_id, product_id, quantity, min_threshold, updated_at
            FROM stock_records
            WHERE branch_id = ?1 AND quantity <= min_threshold
            ORDER BY quantity ASC
            "#,
        )
        .bind(branch_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Adjusts the quantity of a stock record by `delta` (negative to
    /// decrement), inside the caller's transaction.
    ///
    /// The guard `quantity + delta >= 0` rides on the UPDATE itself, so
    /// the quantity can never go negative no matter how the callers
    /// interleave. Returns the new quantity.
    ///
    /// ## Errors
    /// - [`CoreError::ProductNotProvisioned`] - no record for the pair
    /// - [`CoreError::InsufficientStock`] - guard failed; record untouched
    pub async fn adjust(
        conn: &mut SqliteConnection,
        branch_id: &str,
        product_id: &str,
        delta: i64,
    ) -> DbResult<i64> {
        debug!(branch_id, product_id, delta, "Adjusting stock");

        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE stock_records
            SET quantity = quantity + ?3, updated_at = ?4
            WHERE branch_id = ?1 AND product_id = ?2 AND quantity + ?3 >= 0
            "#,
        )
        .bind(branch_id)
        .bind(product_id)
        .bind(delta)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            // Guard failed: distinguish a missing record from a short one
            let available: Option<i64> = sqlx::query_scalar(
                "SELECT quantity FROM stock_records WHERE branch_id = ?1 AND product_id = ?2",
            )
            .bind(branch_id)
            .bind(product_id)
            .fetch_optional(&mut *conn)
            .await?;

            return match available {
                None => Err(DbError::Domain(CoreError::ProductNotProvisioned {
                    branch_id: branch_id.to_string(),
                    product_id: product_id.to_string(),
                })),
                Some(available) => Err(DbError::Domain(CoreError::InsufficientStock {
                    product_id: product_id.to_string(),
                    available,
                    requested: -delta,
                })),
            };
        }

        let quantity: i64 = sqlx::query_scalar(
            "SELECT quantity FROM stock_records WHERE branch_id = ?1 AND product_id = ?2",
        )
        .bind(branch_id)
        .bind(product_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(quantity)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
