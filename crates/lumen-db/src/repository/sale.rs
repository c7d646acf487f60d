//! # Sale Repository
//!
//! Database operations for sales and sale lines.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Lifecycle                                    │
//! │                                                                         │
//! │  1. CREATE                                                             │
//! │     └── insert() → Sale { status: Pending, totals: 0 }                 │
//! │                                                                         │
//! │  2. BUILD                                                              │
//! │     └── insert_line() / update_line() / void_line()                    │
//! │     └── apply_totals() after every mutation (single writer of          │
//! │         all derived fields)                                            │
//! │                                                                         │
//! │  3. COLLECT                                                            │
//! │     └── record_payment() → Partial, then Paid at zero balance          │
//! │                                                                         │
//! │  4. (OPTIONAL) VOID                                                    │
//! │     └── mark_void() → totals zeroed, lines kept for audit              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The derived columns (totals, buckets, balance, status) are written
//! only by `apply_totals`; every other method leaves them alone.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use lumen_core::{
    CardKind, FulfillmentStatus, PaymentMethod, Sale, SaleLine, SaleTotals,
};

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Gets a sale by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Sale>> {
        let sale = sqlx::query_as::<_, Sale>("SELECT * FROM sales WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(sale)
    }

    /// Gets all lines of a sale, voided included, in entry order.
    pub async fn get_lines(&self, sale_id: &str) -> DbResult<Vec<SaleLine>> {
        let lines = sqlx::query_as::<_, SaleLine>(
            "SELECT * FROM sale_lines WHERE sale_id = ?1 ORDER BY created_at",
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }

    /// Lists the most recent sales at a branch.
    pub async fn list_recent(&self, branch_id: &str, limit: u32) -> DbResult<Vec<Sale>> {
        let sales = sqlx::query_as::<_, Sale>(
            "SELECT * FROM sales WHERE branch_id = ?1 ORDER BY issued_at DESC LIMIT ?2",
        )
        .bind(branch_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(sales)
    }

    /// Lists sales bound to a cash session, voided included.
    pub async fn list_by_session(&self, session_id: &str) -> DbResult<Vec<Sale>> {
        let sales = sqlx::query_as::<_, Sale>(
            "SELECT * FROM sales WHERE session_id = ?1 ORDER BY issued_at",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(sales)
    }

    // -------------------------------------------------------------------------
    // Transaction-scoped operations
    // -------------------------------------------------------------------------

    /// Inserts a sale header inside the caller's transaction.
    pub async fn insert(conn: &mut SqliteConnection, sale: &Sale) -> DbResult<()> {
        debug!(id = %sale.id, customer = %sale.customer_name, "Inserting sale");

        sqlx::query(
            r#"
            INSERT INTO sales (
                id, seller_id, branch_id, session_id,
                customer_name, customer_doc_type, customer_doc_number, customer_address,
                issued_at, status, fulfillment,
                subtotal_cents, tax_cents, total_cents,
                taxed_cents, exempt_cents, unaffected_cents, free_cents,
                advance_cents, balance_cents,
                payment_method, payment_reference, card_kind,
                void_reason, notes, delivery_due, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4,
                ?5, ?6, ?7, ?8,
                ?9, ?10, ?11,
                ?12, ?13, ?14,
                ?15, ?16, ?17, ?18,
                ?19, ?20,
                ?21, ?22, ?23,
                ?24, ?25, ?26, ?27
            )
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.seller_id)
        .bind(&sale.branch_id)
        .bind(&sale.session_id)
        .bind(&sale.customer_name)
        .bind(sale.customer_doc_type)
        .bind(&sale.customer_doc_number)
        .bind(&sale.customer_address)
        .bind(sale.issued_at)
        .bind(sale.status)
        .bind(sale.fulfillment)
        .bind(sale.subtotal_cents)
        .bind(sale.tax_cents)
        .bind(sale.total_cents)
        .bind(sale.taxed_cents)
        .bind(sale.exempt_cents)
        .bind(sale.unaffected_cents)
        .bind(sale.free_cents)
        .bind(sale.advance_cents)
        .bind(sale.balance_cents)
        .bind(sale.payment_method)
        .bind(&sale.payment_reference)
        .bind(sale.card_kind)
        .bind(&sale.void_reason)
        .bind(&sale.notes)
        .bind(sale.delivery_due)
        .bind(sale.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Fetches a sale inside the caller's transaction.
    pub async fn fetch(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<Sale> {
        let sale = sqlx::query_as::<_, Sale>("SELECT * FROM sales WHERE id = ?1")
            .bind(sale_id)
            .fetch_optional(&mut *conn)
            .await?;

        sale.ok_or_else(|| DbError::not_found("Sale", sale_id))
    }

    /// Fetches all lines of a sale inside the caller's transaction.
    pub async fn fetch_lines(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<Vec<SaleLine>> {
        let lines = sqlx::query_as::<_, SaleLine>(
            "SELECT * FROM sale_lines WHERE sale_id = ?1 ORDER BY created_at",
        )
        .bind(sale_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(lines)
    }

    /// Fetches one line by ID inside the caller's transaction.
    pub async fn fetch_line(conn: &mut SqliteConnection, line_id: &str) -> DbResult<SaleLine> {
        let line = sqlx::query_as::<_, SaleLine>("SELECT * FROM sale_lines WHERE id = ?1")
            .bind(line_id)
            .fetch_optional(&mut *conn)
            .await?;

        line.ok_or_else(|| DbError::not_found("Sale line", line_id))
    }

    /// Inserts a sale line inside the caller's transaction.
    ///
    /// ## Snapshot Pattern
    /// Product details (description, brand, unit value/price) are copied
    /// onto the line. This preserves the sale history even if catalog
    /// prices change later.
    pub async fn insert_line(conn: &mut SqliteConnection, line: &SaleLine) -> DbResult<()> {
        debug!(sale_id = %line.sale_id, product_id = %line.product_id, "Adding sale line");

        sqlx::query(
            r#"
            INSERT INTO sale_lines (
                id, sale_id, product_id, quantity,
                unit_value_cents, unit_price_cents,
                subtotal_cents, tax_cents, total_cents, discount_cents,
                voided, description_snapshot, brand_snapshot, tax_category, created_at
            ) VALUES (
                ?1, ?2, ?3, ?4,
                ?5, ?6,
                ?7, ?8, ?9, ?10,
                ?11, ?12, ?13, ?14, ?15
            )
            "#,
        )
        .bind(&line.id)
        .bind(&line.sale_id)
        .bind(&line.product_id)
        .bind(line.quantity)
        .bind(line.unit_value_cents)
        .bind(line.unit_price_cents)
        .bind(line.subtotal_cents)
        .bind(line.tax_cents)
        .bind(line.total_cents)
        .bind(line.discount_cents)
        .bind(line.voided)
        .bind(&line.description_snapshot)
        .bind(&line.brand_snapshot)
        .bind(line.tax_category)
        .bind(line.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Rewrites a line's quantity and recomputed money fields.
    pub async fn update_line_figures(
        conn: &mut SqliteConnection,
        line_id: &str,
        quantity: i64,
        subtotal_cents: i64,
        tax_cents: i64,
        total_cents: i64,
        discount_cents: i64,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sale_lines SET
                quantity = ?2,
                subtotal_cents = ?3,
                tax_cents = ?4,
                total_cents = ?5,
                discount_cents = ?6
            WHERE id = ?1 AND voided = 0
            "#,
        )
        .bind(line_id)
        .bind(quantity)
        .bind(subtotal_cents)
        .bind(tax_cents)
        .bind(total_cents)
        .bind(discount_cents)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Sale line (active)", line_id));
        }

        Ok(())
    }

    /// Marks a line voided; the row stays for audit.
    pub async fn mark_line_void(conn: &mut SqliteConnection, line_id: &str) -> DbResult<()> {
        let result = sqlx::query("UPDATE sale_lines SET voided = 1 WHERE id = ?1 AND voided = 0")
            .bind(line_id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Sale line (active)", line_id));
        }

        Ok(())
    }

    /// Voids every active line of a sale. Used by the sale void script
    /// after stock has been restored.
    pub async fn mark_lines_void(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<()> {
        sqlx::query("UPDATE sale_lines SET voided = 1 WHERE sale_id = ?1 AND voided = 0")
            .bind(sale_id)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }

    /// Writes a sale's derived fields from a recomputed [`SaleTotals`].
    ///
    /// The single writer of totals, buckets, balance and status.
    pub async fn apply_totals(
        conn: &mut SqliteConnection,
        sale_id: &str,
        totals: &SaleTotals,
        updated_at: DateTime<Utc>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sales SET
                subtotal_cents = ?2,
                tax_cents = ?3,
                total_cents = ?4,
                taxed_cents = ?5,
                exempt_cents = ?6,
                unaffected_cents = ?7,
                free_cents = ?8,
                advance_cents = ?9,
                balance_cents = ?10,
                status = ?11,
                updated_at = ?12
            WHERE id = ?1
            "#,
        )
        .bind(sale_id)
        .bind(totals.subtotal.cents())
        .bind(totals.tax.cents())
        .bind(totals.total.cents())
        .bind(totals.breakdown.taxed.cents())
        .bind(totals.breakdown.exempt.cents())
        .bind(totals.breakdown.unaffected.cents())
        .bind(totals.breakdown.free.cents())
        .bind(totals.advance.cents())
        .bind(totals.balance.cents())
        .bind(totals.status)
        .bind(updated_at)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Sale", sale_id));
        }

        Ok(())
    }

    /// Stamps payment routing fields onto a sale: the bound session and
    /// the last tender's method details.
    pub async fn record_payment_fields(
        conn: &mut SqliteConnection,
        sale_id: &str,
        session_id: &str,
        method: PaymentMethod,
        reference: Option<&str>,
        card_kind: Option<CardKind>,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE sales SET
                session_id = ?2,
                payment_method = ?3,
                payment_reference = ?4,
                card_kind = ?5
            WHERE id = ?1
            "#,
        )
        .bind(sale_id)
        .bind(session_id)
        .bind(method)
        .bind(reference)
        .bind(card_kind)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Marks a sale void with its reason and moves fulfillment to VOID.
    ///
    /// Totals are zeroed by the caller via `apply_totals`; this only
    /// flips the flags.
    pub async fn mark_void(
        conn: &mut SqliteConnection,
        sale_id: &str,
        reason: &str,
        updated_at: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE sales SET
                void_reason = ?2,
                fulfillment = 'void',
                updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(sale_id)
        .bind(reason)
        .bind(updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Moves a sale's fulfillment state, optionally setting the promised
    /// delivery date.
    pub async fn update_fulfillment(
        conn: &mut SqliteConnection,
        sale_id: &str,
        fulfillment: FulfillmentStatus,
        delivery_due: Option<NaiveDate>,
        updated_at: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE sales SET
                fulfillment = ?2,
                delivery_due = COALESCE(?3, delivery_due),
                updated_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(sale_id)
        .bind(fulfillment)
        .bind(delivery_due)
        .bind(updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}
