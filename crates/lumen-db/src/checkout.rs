//! # Checkout Scripts
//!
//! The transaction scripts that drive a sale from creation to fiscal
//! document, composing the repositories into atomic multi-step
//! operations.
//!
//! ## One Operation, One Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 register_payment (settling tender)                      │
//! │                                                                         │
//! │  BEGIN                                                                  │
//! │   ├── fetch session        (must be OPEN)                               │
//! │   ├── fetch sale           (not void, not yet invoiced)                 │
//! │   ├── guard amount         (0 < amount ≤ balance)                       │
//! │   ├── stamp payment fields (session binding, method, card kind)         │
//! │   ├── recompute totals     (advance ← advance + amount)                 │
//! │   └── balance == 0 && total > 0?                                        │
//! │         └── generate invoice: series by customer doc,                   │
//! │             sequence = MAX(series) + 1, freeze non-void lines           │
//! │  COMMIT                                                                 │
//! │                                                                         │
//! │  Any failure anywhere rolls the whole thing back: no payment            │
//! │  without its invoice, no invoice without its payment.                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every script that touches totals ends by recomputing them from the
//! stored lines; nothing else writes the derived columns.

use chrono::{Days, NaiveDate, Utc};
use sqlx::SqliteConnection;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::pool::Database;
use crate::repository::catalog::CatalogRepository;
use crate::repository::invoice::InvoiceRepository;
use crate::repository::sale::SaleRepository;
use crate::repository::session::SessionRepository;
use crate::repository::stock::StockLedger;
use lumen_core::{
    validation, CardKind, CoreError, CustomerSnapshot, FulfillmentStatus, Invoice, IssuerProfile,
    LineFigures, Money, PaymentMethod, Sale, SaleLine, SaleStatus, SaleTotals, ValidationError,
};

/// Working days the lab gets before the promised pickup date.
const LAB_DUE_DAYS: u64 = 5;

// =============================================================================
// Outcome Types
// =============================================================================

/// Result of registering a payment.
#[derive(Debug, Clone)]
pub enum PaymentOutcome {
    /// The payment settled the sale; the fiscal document was generated
    /// in the same transaction.
    Settled { sale: Sale, invoice: Invoice },
    /// The sale still carries a balance.
    Partial { sale: Sale },
}

impl PaymentOutcome {
    /// The sale after the payment, whichever arm.
    pub fn sale(&self) -> &Sale {
        match self {
            PaymentOutcome::Settled { sale, .. } => sale,
            PaymentOutcome::Partial { sale } => sale,
        }
    }
}

/// A sale with its lines and (if generated) its invoice, for display
/// and printing.
#[derive(Debug, Clone)]
pub struct SaleSnapshot {
    pub sale: Sale,
    pub lines: Vec<SaleLine>,
    pub invoice: Option<Invoice>,
}

// =============================================================================
// Checkout Service
// =============================================================================

/// Orchestrates the sale lifecycle over the repositories.
///
/// Cheap to clone; holds the shared pool and the issuing company's
/// registration data stamped onto every invoice.
#[derive(Debug, Clone)]
pub struct CheckoutService {
    db: Database,
    issuer: IssuerProfile,
}

impl CheckoutService {
    /// Creates a new CheckoutService.
    pub fn new(db: Database, issuer: IssuerProfile) -> Self {
        CheckoutService { db, issuer }
    }

    // -------------------------------------------------------------------------
    // Sale creation
    // -------------------------------------------------------------------------

    /// Creates an empty PENDING sale with the customer frozen onto it.
    ///
    /// RUC customers must carry a valid 11-digit RUC and an address
    /// (facturas require both); DNI numbers must be 8 digits.
    pub async fn create_sale(
        &self,
        seller_id: &str,
        branch_id: &str,
        customer: CustomerSnapshot,
        notes: Option<&str>,
    ) -> DbResult<Sale> {
        validation::validate_customer(&customer)?;

        let now = Utc::now();
        let sale = Sale {
            id: Uuid::new_v4().to_string(),
            seller_id: seller_id.to_string(),
            branch_id: branch_id.to_string(),
            session_id: None,
            customer_name: customer.name,
            customer_doc_type: customer.doc_type,
            customer_doc_number: customer.doc_number,
            customer_address: customer.address,
            issued_at: now,
            status: SaleStatus::Pending,
            fulfillment: FulfillmentStatus::Pending,
            subtotal_cents: 0,
            tax_cents: 0,
            total_cents: 0,
            taxed_cents: 0,
            exempt_cents: 0,
            unaffected_cents: 0,
            free_cents: 0,
            advance_cents: 0,
            balance_cents: 0,
            payment_method: None,
            payment_reference: None,
            card_kind: None,
            void_reason: None,
            notes: notes.map(str::to_string),
            delivery_due: None,
            updated_at: now,
        };

        let mut conn = self.db.pool().acquire().await?;
        SaleRepository::insert(&mut conn, &sale).await?;

        info!(id = %sale.id, customer = %sale.customer_name, "Sale created");
        Ok(sale)
    }

    // -------------------------------------------------------------------------
    // Line operations
    // -------------------------------------------------------------------------

    /// Adds a product line to a sale, decrementing stock in the same
    /// transaction.
    ///
    /// The line freezes the catalog's description, brand and prices at
    /// this moment. Fails without side effects when stock is short or
    /// the product is not provisioned at the branch.
    pub async fn add_line(
        &self,
        sale_id: &str,
        product_id: &str,
        quantity: i64,
        discount_cents: i64,
    ) -> DbResult<SaleLine> {
        validation::validate_uuid("sale_id", sale_id)?;
        validation::validate_quantity(quantity)?;
        validation::validate_discount(discount_cents)?;

        let mut tx = self.db.pool().begin().await?;

        let sale = SaleRepository::fetch(&mut tx, sale_id).await?;
        Self::guard_mutable(&mut tx, &sale).await?;

        let product =
            CatalogRepository::fetch_sellable(&mut tx, product_id, &sale.branch_id).await?;
        StockLedger::adjust(&mut tx, &sale.branch_id, product_id, -quantity).await?;

        let figures = LineFigures::compute(
            product.unit_value(),
            quantity,
            product.tax_category,
            Money::from_cents(discount_cents),
        );
        validation::validate_discount_bound(
            discount_cents,
            (figures.subtotal + figures.tax).cents(),
        )?;

        let line = SaleLine {
            id: Uuid::new_v4().to_string(),
            sale_id: sale_id.to_string(),
            product_id: product_id.to_string(),
            quantity,
            unit_value_cents: product.unit_value_cents,
            unit_price_cents: product.unit_price().cents(),
            subtotal_cents: figures.subtotal.cents(),
            tax_cents: figures.tax.cents(),
            total_cents: figures.total.cents(),
            discount_cents,
            voided: false,
            description_snapshot: product.description.clone(),
            brand_snapshot: product.brand.clone(),
            tax_category: product.tax_category,
            created_at: Utc::now(),
        };

        SaleRepository::insert_line(&mut tx, &line).await?;
        Self::recompute(&mut tx, sale_id, sale.advance_cents).await?;

        tx.commit().await?;

        debug!(sale_id, product_id, quantity, "Line added");
        Ok(line)
    }

    /// Changes a line's quantity, settling the stock difference.
    ///
    /// Growing the line decrements stock by the difference; shrinking
    /// it restores the difference.
    pub async fn change_line_quantity(&self, line_id: &str, quantity: i64) -> DbResult<SaleLine> {
        validation::validate_uuid("line_id", line_id)?;
        validation::validate_quantity(quantity)?;

        let mut tx = self.db.pool().begin().await?;

        let line = SaleRepository::fetch_line(&mut tx, line_id).await?;
        if line.voided {
            return Err(DbError::not_found("Sale line (active)", line_id));
        }
        let sale = SaleRepository::fetch(&mut tx, &line.sale_id).await?;
        Self::guard_mutable(&mut tx, &sale).await?;

        let delta = line.quantity - quantity;
        if delta != 0 {
            StockLedger::adjust(&mut tx, &sale.branch_id, &line.product_id, delta).await?;
        }

        let figures = LineFigures::compute(
            Money::from_cents(line.unit_value_cents),
            quantity,
            line.tax_category,
            Money::from_cents(line.discount_cents),
        );
        validation::validate_discount_bound(
            line.discount_cents,
            (figures.subtotal + figures.tax).cents(),
        )?;
        SaleRepository::update_line_figures(
            &mut tx,
            line_id,
            quantity,
            figures.subtotal.cents(),
            figures.tax.cents(),
            figures.total.cents(),
            line.discount_cents,
        )
        .await?;

        Self::recompute(&mut tx, &line.sale_id, sale.advance_cents).await?;
        let updated = SaleRepository::fetch_line(&mut tx, line_id).await?;

        tx.commit().await?;
        Ok(updated)
    }

    /// Voids a line, restoring its stock. The row stays for audit and
    /// drops out of the totals.
    pub async fn void_line(&self, line_id: &str) -> DbResult<()> {
        validation::validate_uuid("line_id", line_id)?;

        let mut tx = self.db.pool().begin().await?;

        let line = SaleRepository::fetch_line(&mut tx, line_id).await?;
        if line.voided {
            return Err(DbError::not_found("Sale line (active)", line_id));
        }
        let sale = SaleRepository::fetch(&mut tx, &line.sale_id).await?;
        Self::guard_mutable(&mut tx, &sale).await?;

        StockLedger::adjust(&mut tx, &sale.branch_id, &line.product_id, line.quantity).await?;
        SaleRepository::mark_line_void(&mut tx, line_id).await?;
        Self::recompute(&mut tx, &line.sale_id, sale.advance_cents).await?;

        tx.commit().await?;

        debug!(sale_id = %line.sale_id, line_id, "Line voided");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Payments
    // -------------------------------------------------------------------------

    /// Registers a payment, resolving the cashier's OPEN session at the
    /// sale's branch.
    ///
    /// Convenience over [`register_payment_with_session`] for register
    /// terminals where the cashier identity is ambient. A session open
    /// at a different branch does not count; the cashier must open one
    /// where the sale lives.
    ///
    /// [`register_payment_with_session`]: CheckoutService::register_payment_with_session
    pub async fn register_payment(
        &self,
        sale_id: &str,
        cashier_id: &str,
        amount_cents: i64,
        method: PaymentMethod,
        reference: Option<&str>,
        card_kind: Option<CardKind>,
    ) -> DbResult<PaymentOutcome> {
        validation::validate_uuid("sale_id", sale_id)?;

        let sale = self
            .db
            .sales()
            .get_by_id(sale_id)
            .await?
            .ok_or_else(|| DbError::not_found("Sale", sale_id))?;
        let session = self
            .db
            .sessions()
            .find_open_for_cashier(cashier_id)
            .await?
            .filter(|s| s.branch_id == sale.branch_id)
            .ok_or(DbError::Domain(CoreError::NoOpenSession {
                cashier_id: cashier_id.to_string(),
            }))?;

        self.register_payment_with_session(sale_id, &session.id, amount_cents, method, reference, card_kind)
            .await
    }

    /// Registers a payment against an explicit session.
    ///
    /// ## Rules
    /// - amount must be positive and at most the outstanding balance
    /// - card payments must say debit or credit
    /// - all of a sale's payments route through one session; a second
    ///   session is rejected with [`CoreError::SessionMismatch`]
    /// - when the balance reaches zero on a non-empty sale, the fiscal
    ///   invoice is generated in the same transaction
    pub async fn register_payment_with_session(
        &self,
        sale_id: &str,
        session_id: &str,
        amount_cents: i64,
        method: PaymentMethod,
        reference: Option<&str>,
        card_kind: Option<CardKind>,
    ) -> DbResult<PaymentOutcome> {
        validation::validate_uuid("sale_id", sale_id)?;
        validation::validate_uuid("session_id", session_id)?;
        validation::validate_payment_fields(method, card_kind)?;
        if amount_cents <= 0 {
            return Err(DbError::Domain(CoreError::InvalidPaymentAmount {
                reason: "amount must be positive".to_string(),
            }));
        }

        let mut tx = self.db.pool().begin().await?;

        let session = SessionRepository::fetch(&mut tx, session_id).await?;
        if !session.is_open() {
            return Err(DbError::Domain(CoreError::SessionNotOpen {
                session_id: session_id.to_string(),
            }));
        }

        let sale = SaleRepository::fetch(&mut tx, sale_id).await?;
        Self::guard_mutable(&mut tx, &sale).await?;

        if session.branch_id != sale.branch_id {
            return Err(DbError::Domain(CoreError::Validation(
                ValidationError::InvalidFormat {
                    field: "session_id".to_string(),
                    reason: format!(
                        "session belongs to branch {}, sale to branch {}",
                        session.branch_id, sale.branch_id
                    ),
                },
            )));
        }

        if let Some(bound) = &sale.session_id {
            if bound != session_id {
                return Err(DbError::Domain(CoreError::SessionMismatch {
                    sale_id: sale_id.to_string(),
                    bound_session: bound.clone(),
                    current_session: session_id.to_string(),
                }));
            }
        }

        if amount_cents > sale.balance_cents {
            return Err(DbError::Domain(CoreError::PaymentExceedsBalance {
                amount_cents,
                balance_cents: sale.balance_cents,
            }));
        }

        SaleRepository::record_payment_fields(&mut tx, sale_id, session_id, method, reference, card_kind)
            .await?;

        let new_advance = sale.advance_cents + amount_cents;
        let totals = Self::recompute(&mut tx, sale_id, new_advance).await?;

        let outcome = if totals.is_settled() {
            let updated = SaleRepository::fetch(&mut tx, sale_id).await?;
            let lines = SaleRepository::fetch_lines(&mut tx, sale_id).await?;
            let invoice =
                InvoiceRepository::create_for_sale(&mut tx, &updated, &lines, &self.issuer).await?;
            PaymentOutcome::Settled {
                sale: updated,
                invoice,
            }
        } else {
            let updated = SaleRepository::fetch(&mut tx, sale_id).await?;
            PaymentOutcome::Partial { sale: updated }
        };

        tx.commit().await?;

        info!(
            sale_id,
            amount_cents,
            settled = matches!(outcome, PaymentOutcome::Settled { .. }),
            "Payment registered"
        );
        Ok(outcome)
    }

    // -------------------------------------------------------------------------
    // Voiding
    // -------------------------------------------------------------------------

    /// Voids a sale: restores stock for every active line, voids the
    /// lines, zeroes the totals and records the reason. Rows stay for
    /// audit.
    ///
    /// Refused once the order has been delivered. A PENDING (or
    /// rejected/observed) invoice is voided alongside, carrying the
    /// reason; once the authority holds the document the void is
    /// refused and a credit note is the only way out.
    pub async fn void_sale(&self, sale_id: &str, reason: &str) -> DbResult<Sale> {
        validation::validate_uuid("sale_id", sale_id)?;
        validation::validate_void_reason(reason)?;

        let mut tx = self.db.pool().begin().await?;

        let sale = SaleRepository::fetch(&mut tx, sale_id).await?;
        if sale.is_void() {
            return Err(DbError::Domain(CoreError::SaleAlreadyVoid {
                sale_id: sale_id.to_string(),
            }));
        }
        if sale.fulfillment == FulfillmentStatus::Delivered {
            return Err(DbError::Domain(CoreError::IllegalFulfillmentTransition {
                sale_id: sale_id.to_string(),
                reason: "order already delivered".to_string(),
            }));
        }

        if let Some(invoice) = InvoiceRepository::fetch_by_sale(&mut tx, sale_id).await? {
            InvoiceRepository::mark_void(&mut tx, &invoice, reason.trim()).await?;
        }

        let lines = SaleRepository::fetch_lines(&mut tx, sale_id).await?;
        for line in lines.iter().filter(|l| !l.voided) {
            StockLedger::adjust(&mut tx, &sale.branch_id, &line.product_id, line.quantity).await?;
        }
        SaleRepository::mark_lines_void(&mut tx, sale_id).await?;

        let now = Utc::now();
        SaleRepository::mark_void(&mut tx, sale_id, reason.trim(), now).await?;
        SaleRepository::apply_totals(&mut tx, sale_id, &SaleTotals::voided(), now).await?;

        let voided = SaleRepository::fetch(&mut tx, sale_id).await?;
        tx.commit().await?;

        info!(sale_id, reason = %reason.trim(), "Sale voided");
        Ok(voided)
    }

    // -------------------------------------------------------------------------
    // Fulfillment
    // -------------------------------------------------------------------------

    /// Sends the order to the lab: PENDING → IN_LAB.
    ///
    /// Sets the promised pickup date (default: 5 days out). Requires at
    /// least one active line.
    pub async fn send_to_lab(&self, sale_id: &str, due: Option<NaiveDate>) -> DbResult<Sale> {
        validation::validate_uuid("sale_id", sale_id)?;

        let mut tx = self.db.pool().begin().await?;

        let sale = SaleRepository::fetch(&mut tx, sale_id).await?;
        Self::guard_fulfillment(&sale, FulfillmentStatus::Pending, "send to lab")?;

        let lines = SaleRepository::fetch_lines(&mut tx, sale_id).await?;
        if !lines.iter().any(|l| !l.voided) {
            return Err(DbError::Domain(CoreError::IllegalFulfillmentTransition {
                sale_id: sale_id.to_string(),
                reason: "sale has no active lines".to_string(),
            }));
        }

        let today = Utc::now().date_naive();
        let due = due.or_else(|| today.checked_add_days(Days::new(LAB_DUE_DAYS)));

        SaleRepository::update_fulfillment(&mut tx, sale_id, FulfillmentStatus::InLab, due, Utc::now())
            .await?;
        let updated = SaleRepository::fetch(&mut tx, sale_id).await?;

        tx.commit().await?;
        Ok(updated)
    }

    /// Marks the order ready for pickup: IN_LAB → READY.
    pub async fn mark_ready(&self, sale_id: &str) -> DbResult<Sale> {
        validation::validate_uuid("sale_id", sale_id)?;

        let mut tx = self.db.pool().begin().await?;

        let sale = SaleRepository::fetch(&mut tx, sale_id).await?;
        Self::guard_fulfillment(&sale, FulfillmentStatus::InLab, "mark ready")?;

        SaleRepository::update_fulfillment(&mut tx, sale_id, FulfillmentStatus::Ready, None, Utc::now())
            .await?;
        let updated = SaleRepository::fetch(&mut tx, sale_id).await?;

        tx.commit().await?;
        Ok(updated)
    }

    /// Hands the order over: READY → DELIVERED, stamping today as the
    /// delivery date.
    ///
    /// Refused while a balance is outstanding; the customer settles at
    /// the register first.
    pub async fn mark_delivered(&self, sale_id: &str) -> DbResult<Sale> {
        validation::validate_uuid("sale_id", sale_id)?;

        let mut tx = self.db.pool().begin().await?;

        let sale = SaleRepository::fetch(&mut tx, sale_id).await?;
        Self::guard_fulfillment(&sale, FulfillmentStatus::Ready, "deliver")?;

        if sale.balance_cents > 0 {
            return Err(DbError::Domain(CoreError::IllegalFulfillmentTransition {
                sale_id: sale_id.to_string(),
                reason: format!(
                    "outstanding balance of {} cents",
                    sale.balance_cents
                ),
            }));
        }

        let now = Utc::now();
        SaleRepository::update_fulfillment(
            &mut tx,
            sale_id,
            FulfillmentStatus::Delivered,
            Some(now.date_naive()),
            now,
        )
        .await?;
        let updated = SaleRepository::fetch(&mut tx, sale_id).await?;

        tx.commit().await?;

        info!(sale_id, "Order delivered");
        Ok(updated)
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Full snapshot of a sale for display and printing.
    pub async fn snapshot(&self, sale_id: &str) -> DbResult<SaleSnapshot> {
        validation::validate_uuid("sale_id", sale_id)?;

        let sale = self
            .db
            .sales()
            .get_by_id(sale_id)
            .await?
            .ok_or_else(|| DbError::not_found("Sale", sale_id))?;
        let lines = self.db.sales().get_lines(sale_id).await?;
        let invoice = self.db.invoices().get_by_sale(sale_id).await?;

        Ok(SaleSnapshot {
            sale,
            lines,
            invoice,
        })
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    /// Rejects mutations on void or already-invoiced sales.
    async fn guard_mutable(conn: &mut SqliteConnection, sale: &Sale) -> DbResult<()> {
        if sale.is_void() {
            return Err(DbError::Domain(CoreError::SaleAlreadyVoid {
                sale_id: sale.id.clone(),
            }));
        }
        if let Some(invoice) = InvoiceRepository::fetch_by_sale(conn, &sale.id).await? {
            return Err(DbError::Domain(CoreError::SaleAlreadyInvoiced {
                sale_id: sale.id.clone(),
                document: invoice.document_number(),
            }));
        }
        Ok(())
    }

    fn guard_fulfillment(sale: &Sale, expected: FulfillmentStatus, action: &str) -> DbResult<()> {
        if sale.is_void() {
            return Err(DbError::Domain(CoreError::SaleAlreadyVoid {
                sale_id: sale.id.clone(),
            }));
        }
        if sale.fulfillment != expected {
            return Err(DbError::Domain(CoreError::IllegalFulfillmentTransition {
                sale_id: sale.id.clone(),
                reason: format!("cannot {action} from {:?}", sale.fulfillment),
            }));
        }
        Ok(())
    }

    /// Recomputes a sale's derived fields from its stored lines and
    /// writes them back. The only writer of those columns.
    async fn recompute(
        conn: &mut SqliteConnection,
        sale_id: &str,
        advance_cents: i64,
    ) -> DbResult<SaleTotals> {
        let lines = SaleRepository::fetch_lines(conn, sale_id).await?;
        let totals = SaleTotals::recompute(&lines, Money::from_cents(advance_cents), false);
        SaleRepository::apply_totals(conn, sale_id, &totals, Utc::now()).await?;
        Ok(totals)
    }

}

// =============================================================================
// Scenario Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use lumen_core::{DocType, InvoiceDocType, SubmissionOutcome, SubmissionStatus, TaxCategory};

    fn issuer() -> IssuerProfile {
        IssuerProfile {
            ruc: "20601234567".to_string(),
            legal_name: "ÓPTICA LUMEN S.A.C.".to_string(),
            address: "Av. Larco 345, Miraflores, Lima".to_string(),
        }
    }

    async fn setup() -> (Database, CheckoutService) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let checkout = CheckoutService::new(db.clone(), issuer());
        (db, checkout)
    }

    /// One taxed product (value S/100.00, price S/118.00) with stock at b1.
    async fn seed_product(db: &Database, stock: i64) -> String {
        let product = db
            .catalog()
            .create(None, "Luna monofocal CR-39", "Essilor", TaxCategory::Taxed, 10_000)
            .await
            .unwrap();
        db.stock().provision("b1", &product.id, stock, 1).await.unwrap();
        product.id
    }

    fn dni_customer() -> CustomerSnapshot {
        CustomerSnapshot {
            name: "María Quispe".to_string(),
            doc_type: DocType::Dni,
            doc_number: "45781236".to_string(),
            address: String::new(),
        }
    }

    fn ruc_customer() -> CustomerSnapshot {
        CustomerSnapshot {
            name: "COMERCIAL ANDINA E.I.R.L.".to_string(),
            doc_type: DocType::Ruc,
            doc_number: "20512345678".to_string(),
            address: "Jr. Unión 120, Cusco".to_string(),
        }
    }

    async fn open_session(db: &Database) -> String {
        db.sessions()
            .open("reg-1", "cash-1", "b1", 10_000, None)
            .await
            .unwrap()
            .id
    }

    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_add_line_computes_igv_totals() {
        let (db, checkout) = setup().await;
        let product_id = seed_product(&db, 10).await;

        let sale = checkout
            .create_sale("seller-1", "b1", dni_customer(), None)
            .await
            .unwrap();
        checkout.add_line(&sale.id, &product_id, 1, 0).await.unwrap();

        let sale = db.sales().get_by_id(&sale.id).await.unwrap().unwrap();
        assert_eq!(sale.subtotal_cents, 10_000);
        assert_eq!(sale.tax_cents, 1_800);
        assert_eq!(sale.total_cents, 11_800);
        assert_eq!(sale.taxed_cents, 10_000);
        assert_eq!(sale.balance_cents, 11_800);
        assert_eq!(sale.status, SaleStatus::Pending);
    }

    #[tokio::test]
    async fn test_partial_then_settling_payment_generates_invoice() {
        let (db, checkout) = setup().await;
        let product_id = seed_product(&db, 10).await;
        let session_id = open_session(&db).await;

        let sale = checkout
            .create_sale("seller-1", "b1", dni_customer(), None)
            .await
            .unwrap();
        checkout.add_line(&sale.id, &product_id, 1, 0).await.unwrap();

        // S/50.00 down payment
        let outcome = checkout
            .register_payment_with_session(&sale.id, &session_id, 5_000, PaymentMethod::Cash, None, None)
            .await
            .unwrap();
        let partial = match outcome {
            PaymentOutcome::Partial { sale } => sale,
            other => panic!("expected partial, got {:?}", other),
        };
        assert_eq!(partial.status, SaleStatus::Partial);
        assert_eq!(partial.advance_cents, 5_000);
        assert_eq!(partial.balance_cents, 6_800);

        // S/68.00 settles: 5000 + 6800 == 11800
        let outcome = checkout
            .register_payment_with_session(&sale.id, &session_id, 6_800, PaymentMethod::Cash, None, None)
            .await
            .unwrap();
        let (settled, invoice) = match outcome {
            PaymentOutcome::Settled { sale, invoice } => (sale, invoice),
            other => panic!("expected settled, got {:?}", other),
        };
        assert_eq!(settled.status, SaleStatus::Paid);
        assert_eq!(settled.balance_cents, 0);
        assert_eq!(settled.advance_cents, settled.total_cents);

        assert_eq!(invoice.doc_type, InvoiceDocType::Boleta);
        assert_eq!(invoice.series, "B001");
        assert_eq!(invoice.sequence, 1);
        assert_eq!(invoice.total_cents, 11_800);
        assert_eq!(invoice.recipient_doc_code, "1");
        assert_eq!(invoice.submission_status, SubmissionStatus::Pending);

        let lines = db.invoices().get_lines(&invoice.id).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].total_cents, 11_800);
    }

    #[tokio::test]
    async fn test_invoice_sequence_is_monotonic_per_series() {
        let (db, checkout) = setup().await;
        let product_id = seed_product(&db, 10).await;
        let session_id = open_session(&db).await;

        for expected_seq in 1..=3 {
            let sale = checkout
                .create_sale("seller-1", "b1", dni_customer(), None)
                .await
                .unwrap();
            checkout.add_line(&sale.id, &product_id, 1, 0).await.unwrap();
            let outcome = checkout
                .register_payment_with_session(
                    &sale.id,
                    &session_id,
                    11_800,
                    PaymentMethod::Cash,
                    None,
                    None,
                )
                .await
                .unwrap();
            match outcome {
                PaymentOutcome::Settled { invoice, .. } => {
                    assert_eq!(invoice.sequence, expected_seq)
                }
                other => panic!("expected settled, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_ruc_customer_gets_factura() {
        let (db, checkout) = setup().await;
        let product_id = seed_product(&db, 10).await;
        let session_id = open_session(&db).await;

        let sale = checkout
            .create_sale("seller-1", "b1", ruc_customer(), None)
            .await
            .unwrap();
        checkout.add_line(&sale.id, &product_id, 1, 0).await.unwrap();
        let outcome = checkout
            .register_payment_with_session(&sale.id, &session_id, 11_800, PaymentMethod::Transfer, None, None)
            .await
            .unwrap();

        match outcome {
            PaymentOutcome::Settled { invoice, .. } => {
                assert_eq!(invoice.doc_type, InvoiceDocType::Factura);
                assert_eq!(invoice.series, "F001");
                assert_eq!(invoice.recipient_doc_code, "6");
                assert_eq!(invoice.recipient_doc_number, "20512345678");
                assert!(!invoice.recipient_address.is_empty());
            }
            other => panic!("expected settled, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ruc_customer_without_address_rejected() {
        let (_db, checkout) = setup().await;

        let mut customer = ruc_customer();
        customer.address = String::new();

        let err = checkout
            .create_sale("seller-1", "b1", customer, None)
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_overpayment_rejected_and_state_unchanged() {
        let (db, checkout) = setup().await;
        let product_id = seed_product(&db, 10).await;
        let session_id = open_session(&db).await;

        let sale = checkout
            .create_sale("seller-1", "b1", dni_customer(), None)
            .await
            .unwrap();
        checkout.add_line(&sale.id, &product_id, 1, 0).await.unwrap();

        let err = checkout
            .register_payment_with_session(&sale.id, &session_id, 11_801, PaymentMethod::Cash, None, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(CoreError::PaymentExceedsBalance {
                amount_cents: 11_801,
                balance_cents: 11_800,
            })
        ));

        let sale = db.sales().get_by_id(&sale.id).await.unwrap().unwrap();
        assert_eq!(sale.advance_cents, 0);
        assert_eq!(sale.balance_cents, 11_800);
        assert_eq!(sale.status, SaleStatus::Pending);
        assert!(sale.session_id.is_none());
    }

    #[tokio::test]
    async fn test_payment_on_empty_sale_rejected() {
        let (db, checkout) = setup().await;
        let session_id = open_session(&db).await;

        let sale = checkout
            .create_sale("seller-1", "b1", dni_customer(), None)
            .await
            .unwrap();

        // Empty sale: total 0, balance 0, so any amount exceeds it
        let err = checkout
            .register_payment_with_session(&sale.id, &session_id, 100, PaymentMethod::Cash, None, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(CoreError::PaymentExceedsBalance { .. })
        ));
    }

    #[tokio::test]
    async fn test_card_payment_requires_card_kind() {
        let (db, checkout) = setup().await;
        let product_id = seed_product(&db, 10).await;
        let session_id = open_session(&db).await;

        let sale = checkout
            .create_sale("seller-1", "b1", dni_customer(), None)
            .await
            .unwrap();
        checkout.add_line(&sale.id, &product_id, 1, 0).await.unwrap();

        let err = checkout
            .register_payment_with_session(&sale.id, &session_id, 5_000, PaymentMethod::Card, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::Validation(_))));

        // With a kind the same payment goes through
        let outcome = checkout
            .register_payment_with_session(
                &sale.id,
                &session_id,
                5_000,
                PaymentMethod::Card,
                Some("POS-778812"),
                Some(CardKind::Debit),
            )
            .await
            .unwrap();
        assert_eq!(outcome.sale().card_kind, Some(CardKind::Debit));
    }

    #[tokio::test]
    async fn test_payments_route_through_one_session() {
        let (db, checkout) = setup().await;
        let product_id = seed_product(&db, 10).await;

        let first = db
            .sessions()
            .open("reg-1", "cash-1", "b1", 0, None)
            .await
            .unwrap();
        let second = db
            .sessions()
            .open("reg-2", "cash-2", "b1", 0, None)
            .await
            .unwrap();

        let sale = checkout
            .create_sale("seller-1", "b1", dni_customer(), None)
            .await
            .unwrap();
        checkout.add_line(&sale.id, &product_id, 1, 0).await.unwrap();

        checkout
            .register_payment_with_session(&sale.id, &first.id, 5_000, PaymentMethod::Cash, None, None)
            .await
            .unwrap();

        let err = checkout
            .register_payment_with_session(&sale.id, &second.id, 1_000, PaymentMethod::Cash, None, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(CoreError::SessionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_register_payment_requires_open_session() {
        let (db, checkout) = setup().await;
        let product_id = seed_product(&db, 10).await;

        let sale = checkout
            .create_sale("seller-1", "b1", dni_customer(), None)
            .await
            .unwrap();
        checkout.add_line(&sale.id, &product_id, 1, 0).await.unwrap();

        let err = checkout
            .register_payment(&sale.id, "cash-9", 5_000, PaymentMethod::Cash, None, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(CoreError::NoOpenSession { .. })
        ));
    }

    #[tokio::test]
    async fn test_add_line_insufficient_stock_leaves_sale_untouched() {
        let (db, checkout) = setup().await;
        let product_id = seed_product(&db, 5).await;

        let sale = checkout
            .create_sale("seller-1", "b1", dni_customer(), None)
            .await
            .unwrap();
        checkout.add_line(&sale.id, &product_id, 3, 0).await.unwrap();

        let err = checkout
            .add_line(&sale.id, &product_id, 3, 0)
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(CoreError::InsufficientStock {
                available: 2,
                requested: 3,
                ..
            })
        ));

        // The failed add rolled back entirely: one line, stock at 2
        let lines = db.sales().get_lines(&sale.id).await.unwrap();
        assert_eq!(lines.len(), 1);
        let record = db.stock().get("b1", &product_id).await.unwrap().unwrap();
        assert_eq!(record.quantity, 2);
    }

    #[tokio::test]
    async fn test_change_line_quantity_settles_stock_difference() {
        let (db, checkout) = setup().await;
        let product_id = seed_product(&db, 10).await;

        let sale = checkout
            .create_sale("seller-1", "b1", dni_customer(), None)
            .await
            .unwrap();
        let line = checkout.add_line(&sale.id, &product_id, 2, 0).await.unwrap();
        assert_eq!(db.stock().get("b1", &product_id).await.unwrap().unwrap().quantity, 8);

        let updated = checkout.change_line_quantity(&line.id, 5).await.unwrap();
        assert_eq!(updated.quantity, 5);
        assert_eq!(updated.total_cents, 59_000);
        assert_eq!(db.stock().get("b1", &product_id).await.unwrap().unwrap().quantity, 5);

        checkout.change_line_quantity(&line.id, 1).await.unwrap();
        assert_eq!(db.stock().get("b1", &product_id).await.unwrap().unwrap().quantity, 9);

        let sale = db.sales().get_by_id(&sale.id).await.unwrap().unwrap();
        assert_eq!(sale.total_cents, 11_800);
    }

    #[tokio::test]
    async fn test_void_line_restores_stock_and_drops_from_totals() {
        let (db, checkout) = setup().await;
        let product_id = seed_product(&db, 10).await;

        let sale = checkout
            .create_sale("seller-1", "b1", dni_customer(), None)
            .await
            .unwrap();
        let first = checkout.add_line(&sale.id, &product_id, 2, 0).await.unwrap();
        checkout.add_line(&sale.id, &product_id, 1, 0).await.unwrap();

        checkout.void_line(&first.id).await.unwrap();

        let record = db.stock().get("b1", &product_id).await.unwrap().unwrap();
        assert_eq!(record.quantity, 9);

        let sale = db.sales().get_by_id(&sale.id).await.unwrap().unwrap();
        assert_eq!(sale.total_cents, 11_800);

        // The voided row stays for audit
        let lines = db.sales().get_lines(&sale.id).await.unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines.iter().filter(|l| l.voided).count(), 1);
    }

    #[tokio::test]
    async fn test_void_sale_restores_stock_and_voids_pending_invoice() {
        let (db, checkout) = setup().await;
        let product_id = seed_product(&db, 10).await;
        let session_id = open_session(&db).await;

        let sale = checkout
            .create_sale("seller-1", "b1", dni_customer(), None)
            .await
            .unwrap();
        checkout.add_line(&sale.id, &product_id, 2, 0).await.unwrap();
        checkout
            .register_payment_with_session(&sale.id, &session_id, 23_600, PaymentMethod::Cash, None, None)
            .await
            .unwrap();

        let voided = checkout.void_sale(&sale.id, "cliente desistió").await.unwrap();
        assert_eq!(voided.status, SaleStatus::Void);
        assert_eq!(voided.total_cents, 0);
        assert_eq!(voided.fulfillment, FulfillmentStatus::Void);
        assert_eq!(voided.void_reason.as_deref(), Some("cliente desistió"));

        let record = db.stock().get("b1", &product_id).await.unwrap().unwrap();
        assert_eq!(record.quantity, 10);

        // Lines are voided but kept for audit
        let lines = db.sales().get_lines(&sale.id).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines.iter().all(|l| l.voided));

        let invoice = db.invoices().get_by_sale(&sale.id).await.unwrap().unwrap();
        assert_eq!(invoice.submission_status, SubmissionStatus::Void);
        assert_eq!(invoice.submission_message.as_deref(), Some("cliente desistió"));
    }

    #[tokio::test]
    async fn test_void_rejected_once_invoice_accepted() {
        let (db, checkout) = setup().await;
        let product_id = seed_product(&db, 10).await;
        let session_id = open_session(&db).await;

        let sale = checkout
            .create_sale("seller-1", "b1", dni_customer(), None)
            .await
            .unwrap();
        checkout.add_line(&sale.id, &product_id, 1, 0).await.unwrap();
        let outcome = checkout
            .register_payment_with_session(&sale.id, &session_id, 11_800, PaymentMethod::Cash, None, None)
            .await
            .unwrap();
        let invoice = match outcome {
            PaymentOutcome::Settled { invoice, .. } => invoice,
            other => panic!("expected settled, got {:?}", other),
        };

        db.invoices().record_sent(&invoice.id).await.unwrap();
        db.invoices()
            .record_submission(
                &invoice.id,
                &SubmissionOutcome {
                    status: SubmissionStatus::Accepted,
                    message: "La Boleta ha sido aceptada".to_string(),
                    response_code: Some("0".to_string()),
                    content_hash: Some("sha256:demo".to_string()),
                },
            )
            .await
            .unwrap();

        let err = checkout.void_sale(&sale.id, "error de registro").await.unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(CoreError::InvoiceAlreadySent { .. })
        ));

        // Nothing moved: sale stays paid, stock stays sold
        let sale = db.sales().get_by_id(&sale.id).await.unwrap().unwrap();
        assert_eq!(sale.status, SaleStatus::Paid);
        let record = db.stock().get("b1", &product_id).await.unwrap().unwrap();
        assert_eq!(record.quantity, 9);
    }

    #[tokio::test]
    async fn test_invoiced_sale_is_frozen() {
        let (db, checkout) = setup().await;
        let product_id = seed_product(&db, 10).await;
        let session_id = open_session(&db).await;

        let sale = checkout
            .create_sale("seller-1", "b1", dni_customer(), None)
            .await
            .unwrap();
        let line = checkout.add_line(&sale.id, &product_id, 1, 0).await.unwrap();
        checkout
            .register_payment_with_session(&sale.id, &session_id, 11_800, PaymentMethod::Cash, None, None)
            .await
            .unwrap();

        let err = checkout.add_line(&sale.id, &product_id, 1, 0).await.unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(CoreError::SaleAlreadyInvoiced { .. })
        ));

        let err = checkout.change_line_quantity(&line.id, 2).await.unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(CoreError::SaleAlreadyInvoiced { .. })
        ));

        let err = checkout.void_line(&line.id).await.unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(CoreError::SaleAlreadyInvoiced { .. })
        ));
    }

    #[tokio::test]
    async fn test_session_close_expected_counts_non_void_sales() {
        let (db, checkout) = setup().await;
        let product_id = seed_product(&db, 10).await;
        let session_id = open_session(&db).await; // float S/100.00

        // Settled sale of S/118.00
        let paid = checkout
            .create_sale("seller-1", "b1", dni_customer(), None)
            .await
            .unwrap();
        checkout.add_line(&paid.id, &product_id, 1, 0).await.unwrap();
        checkout
            .register_payment_with_session(&paid.id, &session_id, 11_800, PaymentMethod::Cash, None, None)
            .await
            .unwrap();

        // Partially paid sale of S/118.00 with S/50.00 in, then voided:
        // drops out of expected entirely
        let voided = checkout
            .create_sale("seller-1", "b1", dni_customer(), None)
            .await
            .unwrap();
        checkout.add_line(&voided.id, &product_id, 1, 0).await.unwrap();
        checkout
            .register_payment_with_session(&voided.id, &session_id, 5_000, PaymentMethod::Cash, None, None)
            .await
            .unwrap();
        checkout.void_sale(&voided.id, "producto dañado").await.unwrap();

        // Count is short S/5.00
        let closed = db
            .sessions()
            .close(&session_id, "cash-1", 21_300, None)
            .await
            .unwrap();
        assert_eq!(closed.expected_cents, Some(21_800));
        assert_eq!(closed.variance_cents, Some(-500));
    }

    #[tokio::test]
    async fn test_fulfillment_flow_gates_delivery_on_balance() {
        let (db, checkout) = setup().await;
        let product_id = seed_product(&db, 10).await;
        let session_id = open_session(&db).await;

        let sale = checkout
            .create_sale("seller-1", "b1", dni_customer(), None)
            .await
            .unwrap();
        checkout.add_line(&sale.id, &product_id, 1, 0).await.unwrap();
        checkout
            .register_payment_with_session(&sale.id, &session_id, 5_000, PaymentMethod::Cash, None, None)
            .await
            .unwrap();

        let in_lab = checkout.send_to_lab(&sale.id, None).await.unwrap();
        assert_eq!(in_lab.fulfillment, FulfillmentStatus::InLab);
        assert!(in_lab.delivery_due.is_some());

        let ready = checkout.mark_ready(&sale.id).await.unwrap();
        assert_eq!(ready.fulfillment, FulfillmentStatus::Ready);

        // Balance outstanding: handover refused
        let err = checkout.mark_delivered(&sale.id).await.unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(CoreError::IllegalFulfillmentTransition { .. })
        ));

        checkout
            .register_payment_with_session(&sale.id, &session_id, 6_800, PaymentMethod::Cash, None, None)
            .await
            .unwrap();
        let delivered = checkout.mark_delivered(&sale.id).await.unwrap();
        assert_eq!(delivered.fulfillment, FulfillmentStatus::Delivered);
        assert_eq!(delivered.delivery_due, Some(Utc::now().date_naive()));

        // A delivered order can no longer be voided
        let err = checkout.void_sale(&sale.id, "arrepentimiento").await.unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(CoreError::IllegalFulfillmentTransition { .. })
        ));
    }

    /// Race the guarded stock UPDATE: two registers adding 3 units each
    /// against stock 5 on a shared file-backed pool. One wins, one gets
    /// the shortage, and the quantity never goes negative.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_stop_at_available_stock() {
        let path = std::env::temp_dir().join(format!("lumen-checkout-{}.db", Uuid::new_v4()));
        let db = Database::new(DbConfig::new(&path).max_connections(5))
            .await
            .unwrap();
        let checkout = CheckoutService::new(db.clone(), issuer());
        let product_id = seed_product(&db, 5).await;

        let mut sale_ids = Vec::new();
        for _ in 0..2 {
            let sale = checkout
                .create_sale("seller-1", "b1", dni_customer(), None)
                .await
                .unwrap();
            sale_ids.push(sale.id);
        }

        let mut handles = Vec::new();
        for sale_id in sale_ids {
            let checkout = checkout.clone();
            let product_id = product_id.clone();
            handles.push(tokio::spawn(async move {
                // Lock waits are retried; only the domain verdict counts
                loop {
                    match checkout.add_line(&sale_id, &product_id, 3, 0).await {
                        Ok(_) => return true,
                        Err(err) if err.is_transient() => continue,
                        Err(err) => {
                            assert!(matches!(
                                err.as_domain(),
                                Some(CoreError::InsufficientStock { .. })
                            ));
                            return false;
                        }
                    }
                }
            }));
        }

        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);

        let record = db.stock().get("b1", &product_id).await.unwrap().unwrap();
        assert_eq!(record.quantity, 2);

        db.close().await;
        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(format!("{}-wal", path.display()));
        let _ = std::fs::remove_file(format!("{}-shm", path.display()));
    }

    #[tokio::test]
    async fn test_discount_exceeding_line_gross_rejected() {
        let (db, checkout) = setup().await;
        let product_id = seed_product(&db, 10).await;

        let sale = checkout
            .create_sale("seller-1", "b1", dni_customer(), None)
            .await
            .unwrap();

        // Gross of one unit is 11_800; a larger discount would store a
        // negative line total
        let err = checkout
            .add_line(&sale.id, &product_id, 1, 12_000)
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::Validation(_))));

        // The rejected add left no trace: no line, no stock movement
        assert!(db.sales().get_lines(&sale.id).await.unwrap().is_empty());
        let record = db.stock().get("b1", &product_id).await.unwrap().unwrap();
        assert_eq!(record.quantity, 10);
    }

    #[tokio::test]
    async fn test_shrinking_line_below_its_discount_rejected() {
        let (db, checkout) = setup().await;
        let product_id = seed_product(&db, 10).await;

        let sale = checkout
            .create_sale("seller-1", "b1", dni_customer(), None)
            .await
            .unwrap();
        // Two units gross 23_600 carry the discount comfortably
        let line = checkout
            .add_line(&sale.id, &product_id, 2, 15_000)
            .await
            .unwrap();

        // One unit gross 11_800 no longer covers it
        let err = checkout
            .change_line_quantity(&line.id, 1)
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::Validation(_))));

        let kept = db.sales().get_lines(&sale.id).await.unwrap();
        assert_eq!(kept[0].quantity, 2);
        let record = db.stock().get("b1", &product_id).await.unwrap().unwrap();
        assert_eq!(record.quantity, 8);
    }

    #[tokio::test]
    async fn test_register_payment_ignores_session_at_other_branch() {
        let (db, checkout) = setup().await;
        let product_id = seed_product(&db, 10).await;

        // The cashier's only open session is at another branch
        db.sessions()
            .open("reg-9", "cash-1", "b2", 0, None)
            .await
            .unwrap();

        let sale = checkout
            .create_sale("seller-1", "b1", dni_customer(), None)
            .await
            .unwrap();
        checkout.add_line(&sale.id, &product_id, 1, 0).await.unwrap();

        let err = checkout
            .register_payment(&sale.id, "cash-1", 1_000, PaymentMethod::Cash, None, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(CoreError::NoOpenSession { .. })
        ));
    }

    #[tokio::test]
    async fn test_payment_from_other_branch_session_rejected() {
        let (db, checkout) = setup().await;
        let product_id = seed_product(&db, 10).await;
        let other = db
            .sessions()
            .open("reg-9", "cash-9", "b2", 0, None)
            .await
            .unwrap();

        let sale = checkout
            .create_sale("seller-1", "b1", dni_customer(), None)
            .await
            .unwrap();
        checkout.add_line(&sale.id, &product_id, 1, 0).await.unwrap();

        let err = checkout
            .register_payment_with_session(&sale.id, &other.id, 1_000, PaymentMethod::Cash, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_send_empty_sale_to_lab_rejected() {
        let (_db, checkout) = setup().await;

        let sale = checkout
            .create_sale("seller-1", "b1", dni_customer(), None)
            .await
            .unwrap();
        let err = checkout.send_to_lab(&sale.id, None).await.unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(CoreError::IllegalFulfillmentTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_skipping_fulfillment_states_rejected() {
        let (db, checkout) = setup().await;
        let product_id = seed_product(&db, 10).await;

        let sale = checkout
            .create_sale("seller-1", "b1", dni_customer(), None)
            .await
            .unwrap();
        checkout.add_line(&sale.id, &product_id, 1, 0).await.unwrap();

        // PENDING → READY skips IN_LAB
        let err = checkout.mark_ready(&sale.id).await.unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(CoreError::IllegalFulfillmentTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_snapshot_carries_lines_and_invoice() {
        let (db, checkout) = setup().await;
        let product_id = seed_product(&db, 10).await;
        let session_id = open_session(&db).await;

        let sale = checkout
            .create_sale("seller-1", "b1", dni_customer(), None)
            .await
            .unwrap();
        checkout.add_line(&sale.id, &product_id, 1, 0).await.unwrap();

        let snapshot = checkout.snapshot(&sale.id).await.unwrap();
        assert_eq!(snapshot.lines.len(), 1);
        assert!(snapshot.invoice.is_none());

        checkout
            .register_payment_with_session(&sale.id, &session_id, 11_800, PaymentMethod::Cash, None, None)
            .await
            .unwrap();

        let snapshot = checkout.snapshot(&sale.id).await.unwrap();
        let invoice = snapshot.invoice.expect("settled sale has an invoice");
        assert_eq!(invoice.document_number(), "B001-1");
    }

    #[tokio::test]
    async fn test_void_sale_twice_rejected() {
        let (db, checkout) = setup().await;
        let product_id = seed_product(&db, 10).await;

        let sale = checkout
            .create_sale("seller-1", "b1", dni_customer(), None)
            .await
            .unwrap();
        checkout.add_line(&sale.id, &product_id, 1, 0).await.unwrap();
        checkout.void_sale(&sale.id, "duplicado").await.unwrap();

        let err = checkout.void_sale(&sale.id, "duplicado").await.unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(CoreError::SaleAlreadyVoid { .. })
        ));

        // Stock restored exactly once
        let record = db.stock().get("b1", &product_id).await.unwrap().unwrap();
        assert_eq!(record.quantity, 10);
    }
}
