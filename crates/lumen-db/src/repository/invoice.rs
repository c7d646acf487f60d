//! # Invoice Repository
//!
//! Fiscal document numbering, storage and submission state.
//!
//! ## Numbering
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  Series / Sequence Assignment                           │
//! │                                                                         │
//! │  RUC customer  → Factura → series F001                                 │
//! │  anyone else   → Boleta  → series B001                                 │
//! │                                                                         │
//! │  sequence = MAX(sequence in series) + 1                                │
//! │                                                                         │
//! │  Assigned INSIDE the settling transaction, so two registers            │
//! │  settling at once cannot read the same MAX and both commit:            │
//! │  UNIQUE (series, sequence) kills the loser, the whole payment          │
//! │  rolls back, and the register simply retries.                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Invoices are immutable after creation except for the submission
//! fields, which move only through the recording methods here.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use uuid::Uuid;

use crate::error::{DbError, DbResult};
use lumen_core::{
    CoreError, Invoice, InvoiceDocType, InvoiceLine, IssuerProfile, Sale, SaleLine,
    SubmissionOutcome, SubmissionStatus, CURRENCY_PEN,
};

/// Repository for invoice operations.
#[derive(Debug, Clone)]
pub struct InvoiceRepository {
    pool: SqlitePool,
}

impl InvoiceRepository {
    /// Creates a new InvoiceRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InvoiceRepository { pool }
    }

    /// Gets an invoice by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Invoice>> {
        let invoice = sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(invoice)
    }

    /// Gets the invoice of a sale, if one was generated.
    pub async fn get_by_sale(&self, sale_id: &str) -> DbResult<Option<Invoice>> {
        let invoice = sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE sale_id = ?1")
            .bind(sale_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(invoice)
    }

    /// Gets the frozen lines of an invoice.
    pub async fn get_lines(&self, invoice_id: &str) -> DbResult<Vec<InvoiceLine>> {
        let lines = sqlx::query_as::<_, InvoiceLine>(
            "SELECT * FROM invoice_lines WHERE invoice_id = ?1",
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }

    /// Lists documents awaiting transmission, oldest first.
    ///
    /// The submission worker drains this.
    pub async fn list_pending(&self, limit: u32) -> DbResult<Vec<Invoice>> {
        let invoices = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT * FROM invoices
            WHERE submission_status = 'pending'
            ORDER BY issued_at ASC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(invoices)
    }

    /// Serializes a document and its lines into the JSON payload handed
    /// to the submission client.
    pub async fn submission_payload(&self, invoice_id: &str) -> DbResult<String> {
        let invoice = self
            .get_by_id(invoice_id)
            .await?
            .ok_or_else(|| DbError::not_found("Invoice", invoice_id))?;
        let lines = self.get_lines(invoice_id).await?;

        let payload = serde_json::json!({
            "document": invoice,
            "lines": lines,
        });
        serde_json::to_string(&payload).map_err(|e| DbError::Internal(e.to_string()))
    }

    // -------------------------------------------------------------------------
    // Transaction-scoped operations
    // -------------------------------------------------------------------------

    /// Next sequence number for a series, inside the caller's transaction.
    pub async fn next_sequence(conn: &mut SqliteConnection, series: &str) -> DbResult<i64> {
        let max: Option<i64> =
            sqlx::query_scalar("SELECT MAX(sequence) FROM invoices WHERE series = ?1")
                .bind(series)
                .fetch_one(&mut *conn)
                .await?;

        Ok(max.unwrap_or(0) + 1)
    }

    /// Fetches a sale's invoice inside the caller's transaction.
    pub async fn fetch_by_sale(
        conn: &mut SqliteConnection,
        sale_id: &str,
    ) -> DbResult<Option<Invoice>> {
        let invoice = sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE sale_id = ?1")
            .bind(sale_id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(invoice)
    }

    /// Generates the fiscal document for a settled sale, inside the
    /// settling transaction.
    ///
    /// Picks the document type and series from the frozen customer
    /// document, claims the next sequence, and freezes the active sale
    /// lines into immutable invoice lines. Idempotent per sale: an
    /// existing document is returned untouched.
    pub async fn create_for_sale(
        conn: &mut SqliteConnection,
        sale: &Sale,
        lines: &[SaleLine],
        issuer: &IssuerProfile,
    ) -> DbResult<Invoice> {
        if let Some(existing) = Self::fetch_by_sale(conn, &sale.id).await? {
            return Ok(existing);
        }

        let doc_type = InvoiceDocType::for_customer(sale.customer_doc_type);
        let series = doc_type.series();
        let sequence = Self::next_sequence(conn, series).await?;

        let invoice = Invoice {
            id: Uuid::new_v4().to_string(),
            sale_id: sale.id.clone(),
            doc_type,
            series: series.to_string(),
            sequence,
            issued_at: Utc::now(),
            issuer_ruc: issuer.ruc.clone(),
            issuer_name: issuer.legal_name.clone(),
            issuer_address: issuer.address.clone(),
            recipient_doc_code: sale.customer_doc_type.receptor_code().to_string(),
            recipient_doc_number: sale.customer_doc_number.clone(),
            recipient_name: sale.customer_name.clone(),
            recipient_address: sale.customer_address.clone(),
            currency: CURRENCY_PEN.to_string(),
            taxed_cents: sale.taxed_cents,
            exempt_cents: sale.exempt_cents,
            unaffected_cents: sale.unaffected_cents,
            free_cents: sale.free_cents,
            tax_cents: sale.tax_cents,
            total_cents: sale.total_cents,
            submission_status: SubmissionStatus::Pending,
            submission_message: None,
            response_code: None,
            content_hash: None,
            submitted_at: None,
            answered_at: None,
        };

        Self::insert(conn, &invoice).await?;

        for line in lines.iter().filter(|l| !l.voided) {
            let frozen = InvoiceLine {
                id: Uuid::new_v4().to_string(),
                invoice_id: invoice.id.clone(),
                product_id: line.product_id.clone(),
                description: line.description_snapshot.clone(),
                brand: line.brand_snapshot.clone(),
                quantity: line.quantity,
                unit_value_cents: line.unit_value_cents,
                unit_price_cents: line.unit_price_cents,
                subtotal_cents: line.subtotal_cents,
                tax_cents: line.tax_cents,
                discount_cents: line.discount_cents,
                total_cents: line.total_cents,
                tax_category: line.tax_category,
            };
            Self::insert_line(conn, &frozen).await?;
        }

        info!(
            sale_id = %sale.id,
            document = %invoice.document_number(),
            total_cents = invoice.total_cents,
            "Invoice generated"
        );
        Ok(invoice)
    }

    /// Inserts an invoice header inside the caller's transaction.
    ///
    /// The UNIQUE (series, sequence) and UNIQUE (sale_id) constraints
    /// guard numbering races and double generation; either violation
    /// rolls the settling transaction back.
    async fn insert(conn: &mut SqliteConnection, invoice: &Invoice) -> DbResult<()> {
        debug!(
            id = %invoice.id,
            document = %invoice.document_number(),
            "Inserting invoice"
        );

        sqlx::query(
            r#"
            INSERT INTO invoices (
                id, sale_id, doc_type, series, sequence, issued_at,
                issuer_ruc, issuer_name, issuer_address,
                recipient_doc_code, recipient_doc_number, recipient_name, recipient_address,
                currency,
                taxed_cents, exempt_cents, unaffected_cents, free_cents,
                tax_cents, total_cents,
                submission_status, submission_message, response_code, content_hash,
                submitted_at, answered_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6,
                ?7, ?8, ?9,
                ?10, ?11, ?12, ?13,
                ?14,
                ?15, ?16, ?17, ?18,
                ?19, ?20,
                ?21, ?22, ?23, ?24,
                ?25, ?26
            )
            "#,
        )
        .bind(&invoice.id)
        .bind(&invoice.sale_id)
        .bind(invoice.doc_type)
        .bind(&invoice.series)
        .bind(invoice.sequence)
        .bind(invoice.issued_at)
        .bind(&invoice.issuer_ruc)
        .bind(&invoice.issuer_name)
        .bind(&invoice.issuer_address)
        .bind(&invoice.recipient_doc_code)
        .bind(&invoice.recipient_doc_number)
        .bind(&invoice.recipient_name)
        .bind(&invoice.recipient_address)
        .bind(&invoice.currency)
        .bind(invoice.taxed_cents)
        .bind(invoice.exempt_cents)
        .bind(invoice.unaffected_cents)
        .bind(invoice.free_cents)
        .bind(invoice.tax_cents)
        .bind(invoice.total_cents)
        .bind(invoice.submission_status)
        .bind(&invoice.submission_message)
        .bind(&invoice.response_code)
        .bind(&invoice.content_hash)
        .bind(invoice.submitted_at)
        .bind(invoice.answered_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Inserts a frozen invoice line inside the caller's transaction.
    async fn insert_line(conn: &mut SqliteConnection, line: &InvoiceLine) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO invoice_lines (
                id, invoice_id, product_id, description, brand,
                quantity, unit_value_cents, unit_price_cents,
                subtotal_cents, tax_cents, discount_cents, total_cents, tax_category
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&line.id)
        .bind(&line.invoice_id)
        .bind(&line.product_id)
        .bind(&line.description)
        .bind(&line.brand)
        .bind(line.quantity)
        .bind(line.unit_value_cents)
        .bind(line.unit_price_cents)
        .bind(line.subtotal_cents)
        .bind(line.tax_cents)
        .bind(line.discount_cents)
        .bind(line.total_cents)
        .bind(line.tax_category)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Marks an invoice VOID when its sale is voided.
    ///
    /// Only documents the authority has not received may be voided
    /// this way; SENT/ACCEPTED require a credit note.
    pub async fn mark_void(
        conn: &mut SqliteConnection,
        invoice: &Invoice,
        reason: &str,
    ) -> DbResult<()> {
        if invoice.submission_status.blocks_void() {
            return Err(DbError::Domain(CoreError::InvoiceAlreadySent {
                document: invoice.document_number(),
            }));
        }

        sqlx::query(
            "UPDATE invoices SET submission_status = 'void', submission_message = ?2 WHERE id = ?1",
        )
        .bind(&invoice.id)
        .bind(reason)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    // -------------------------------------------------------------------------
    // Submission recording
    // -------------------------------------------------------------------------

    /// Marks a document SENT when the submission client dispatches it.
    ///
    /// Only PENDING/REJECTED/OBSERVED documents may be (re)sent.
    pub async fn record_sent(&self, invoice_id: &str) -> DbResult<Invoice> {
        let invoice = self
            .get_by_id(invoice_id)
            .await?
            .ok_or_else(|| DbError::not_found("Invoice", invoice_id))?;

        if !invoice.submission_status.can_submit() {
            return Err(DbError::Domain(CoreError::InvoiceAlreadySent {
                document: invoice.document_number(),
            }));
        }

        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE invoices SET
                submission_status = 'sent',
                submitted_at = ?2
            WHERE id = ?1
            "#,
        )
        .bind(invoice_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        info!(document = %invoice.document_number(), "Invoice marked sent");

        self.get_by_id(invoice_id)
            .await?
            .ok_or_else(|| DbError::not_found("Invoice", invoice_id))
    }

    /// Records the authority's verdict on a transmitted document.
    ///
    /// The outcome is stored verbatim; the core never interprets the
    /// response beyond its status.
    pub async fn record_submission(
        &self,
        invoice_id: &str,
        outcome: &SubmissionOutcome,
    ) -> DbResult<Invoice> {
        let invoice = self
            .get_by_id(invoice_id)
            .await?
            .ok_or_else(|| DbError::not_found("Invoice", invoice_id))?;

        if invoice.submission_status == SubmissionStatus::Void {
            return Err(DbError::Domain(CoreError::InvoiceAlreadySent {
                document: invoice.document_number(),
            }));
        }

        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE invoices SET
                submission_status = ?2,
                submission_message = ?3,
                response_code = ?4,
                content_hash = COALESCE(?5, content_hash),
                answered_at = ?6
            WHERE id = ?1
            "#,
        )
        .bind(invoice_id)
        .bind(outcome.status)
        .bind(&outcome.message)
        .bind(&outcome.response_code)
        .bind(&outcome.content_hash)
        .bind(now)
        .execute(&self.pool)
        .await?;

        info!(
            document = %invoice.document_number(),
            status = ?outcome.status,
            "Submission outcome recorded"
        );

        self.get_by_id(invoice_id)
            .await?
            .ok_or_else(|| DbError::not_found("Invoice", invoice_id))
    }
}
