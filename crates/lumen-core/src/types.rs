//! # Domain Types
//!
//! Core domain types used throughout Lumen POS.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                │
//! │                                                                     │
//! │  ┌───────────────┐  ┌───────────────┐  ┌───────────────┐            │
//! │  │     Sale      │  │   SaleLine    │  │  CashSession  │            │
//! │  │  ───────────  │  │  ───────────  │  │  ───────────  │            │
//! │  │  id (UUID)    │  │  id (UUID)    │  │  id (UUID)    │            │
//! │  │  status       │  │  snapshots    │  │  opening float│            │
//! │  │  totals       │  │  line totals  │  │  variance     │            │
//! │  └───────────────┘  └───────────────┘  └───────────────┘            │
//! │                                                                     │
//! │  ┌───────────────┐  ┌───────────────┐  ┌───────────────┐            │
//! │  │  StockRecord  │  │    Invoice    │  │  InvoiceLine  │            │
//! │  │  (branch,     │  │  series/seq   │  │  frozen copy  │            │
//! │  │   product)    │  │  snapshots    │  │  of SaleLine  │            │
//! │  └───────────────┘  └───────────────┘  └───────────────┘            │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has an immutable UUID v4 `id` used for relations. Invoices
//! additionally carry a business identity: `series` + `sequence` (the fiscal
//! document number, e.g. `B001-42`).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// 1 basis point = 0.01% = 1/10000. 1800 bps = 18% (Peruvian IGV).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// The general IGV sales-tax rate (18%).
    #[inline]
    pub const fn igv() -> Self {
        TaxRate(crate::IGV_RATE_BPS)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Zero tax rate.
    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

// =============================================================================
// Tax Category
// =============================================================================

/// IGV affectation category of a product (SUNAT catalog 07).
///
/// Determines which fiscal bucket a line's subtotal lands in and whether
/// the 18% IGV applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum TaxCategory {
    /// Gravado (code 10): taxed at the IGV rate.
    Taxed,
    /// Exonerado (code 20): exempt.
    Exempt,
    /// Inafecto (code 30): outside the tax's scope.
    Unaffected,
    /// Gratuito (code 31): given free of charge.
    Free,
}

impl TaxCategory {
    /// SUNAT affectation code used on fiscal documents.
    pub const fn sunat_code(&self) -> &'static str {
        match self {
            TaxCategory::Taxed => "10",
            TaxCategory::Exempt => "20",
            TaxCategory::Unaffected => "30",
            TaxCategory::Free => "31",
        }
    }

    /// Whether lines in this category accrue IGV.
    #[inline]
    pub const fn is_taxed(&self) -> bool {
        matches!(self, TaxCategory::Taxed)
    }
}

// =============================================================================
// Customer Documents
// =============================================================================

/// Identity document type of the customer on a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    /// DNI - national identity document (8 digits).
    Dni,
    /// RUC - taxpayer registration (11 digits); sales to a RUC become facturas.
    Ruc,
    /// Carnet de extranjería (foreign resident card).
    ForeignCard,
    /// No document given (walk-in customer).
    Unspecified,
}

impl DocType {
    /// SUNAT receptor document code (catalog 06) for fiscal documents.
    pub const fn receptor_code(&self) -> &'static str {
        match self {
            DocType::Dni => "1",
            DocType::Ruc => "6",
            _ => "-",
        }
    }
}

/// Customer data frozen onto the sale at creation time.
///
/// The sale keeps its own copy so later client-directory edits never
/// alter historical sales or the invoices generated from them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerSnapshot {
    pub name: String,
    pub doc_type: DocType,
    pub doc_number: String,
    /// Required for RUC customers (facturas), optional otherwise.
    pub address: String,
}

impl CustomerSnapshot {
    /// The anonymous walk-in customer.
    pub fn generic() -> Self {
        CustomerSnapshot {
            name: "CLIENTE GENÉRICO".to_string(),
            doc_type: DocType::Unspecified,
            doc_number: String::new(),
            address: String::new(),
        }
    }
}

// =============================================================================
// Catalog Product (read-only collaborator data)
// =============================================================================

/// A catalog product as seen by the checkout path.
///
/// The catalog service owns the full product lifecycle; the sale core only
/// reads the fields it snapshots onto lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CatalogProduct {
    /// Unique identifier (UUID v4).
    pub id: String,
    /// Owning branch for branch-scoped products; `None` means global.
    pub branch_owner: Option<String>,
    /// Description printed on fiscal documents.
    pub description: String,
    pub brand: String,
    pub tax_category: TaxCategory,
    /// Unit value in cents, tax-exclusive.
    pub unit_value_cents: i64,
    /// Whether product is active (soft delete).
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl CatalogProduct {
    /// Returns the tax-exclusive unit value.
    #[inline]
    pub fn unit_value(&self) -> Money {
        Money::from_cents(self.unit_value_cents)
    }

    /// Tax-inclusive shelf price: value + IGV for taxed products,
    /// the bare value otherwise.
    pub fn unit_price(&self) -> Money {
        if self.tax_category.is_taxed() {
            self.unit_value() + self.unit_value().calculate_tax(TaxRate::igv())
        } else {
            self.unit_value()
        }
    }
}

// =============================================================================
// Stock Record
// =============================================================================

/// Quantity-on-hand counter for one product at one branch.
///
/// Keyed by (branch, product); mutated only through the stock ledger's
/// guarded adjust operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockRecord {
    pub branch_id: String,
    pub product_id: String,
    /// Units on hand; never negative.
    pub quantity: i64,
    /// Reorder threshold for low-stock reporting.
    pub min_threshold: i64,
    pub updated_at: DateTime<Utc>,
}

impl StockRecord {
    /// Whether the record is at or below its reorder threshold.
    #[inline]
    pub fn is_low(&self) -> bool {
        self.quantity <= self.min_threshold
    }
}

// =============================================================================
// Cash Session
// =============================================================================

/// The lifecycle state of a cash session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Till is open and accepting payments.
    Open,
    /// Closed with a counted total; terminal state.
    Closed,
    /// Administratively voided; terminal state.
    Void,
}

/// A bounded period during which a cashier operates a register.
///
/// Invariant: at most one OPEN session per cashier and one per register.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CashSession {
    pub id: String,
    pub register_id: String,
    pub cashier_id: String,
    pub branch_id: String,
    pub opened_at: DateTime<Utc>,
    /// Cash float the session started with.
    pub opening_float_cents: i64,
    pub closed_at: Option<DateTime<Utc>>,
    /// Declared count at close.
    pub closing_count_cents: Option<i64>,
    /// opening float + Σ non-void sale totals routed through this session.
    pub expected_cents: Option<i64>,
    /// closing count − expected. Negative means the till is short.
    pub variance_cents: Option<i64>,
    pub status: SessionStatus,
    pub notes: Option<String>,
}

impl CashSession {
    #[inline]
    pub fn opening_float(&self) -> Money {
        Money::from_cents(self.opening_float_cents)
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.status == SessionStatus::Open
    }
}

// =============================================================================
// Sale
// =============================================================================

/// Payment state of a sale. Derived from totals, never set directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    /// No payment yet (or empty sale).
    Pending,
    /// Some advance paid, balance outstanding.
    Partial,
    /// Balance reached zero on a non-empty sale; invoice exists.
    Paid,
    /// Logically cancelled; stock restored, totals zeroed.
    Void,
}

impl Default for SaleStatus {
    fn default() -> Self {
        SaleStatus::Pending
    }
}

/// Order-fulfillment state, tracked independently of payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStatus {
    Pending,
    /// Sent to the lab for preparation.
    InLab,
    /// Ready for customer pickup.
    Ready,
    /// Handed over; requires a settled balance.
    Delivered,
    Void,
}

impl Default for FulfillmentStatus {
    fn default() -> Self {
        FulfillmentStatus::Pending
    }
}

/// How a payment was tendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Transfer,
    /// Mobile wallet (Yape/Plin).
    Wallet,
    /// Split tender across methods.
    Mixed,
}

/// Card subtype, required when the method is `Card`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum CardKind {
    Debit,
    Credit,
}

/// A customer transaction: header totals plus a set of lines.
///
/// All `*_cents` totals, `balance_cents` and `status` are derived fields
/// written exclusively by the recompute step of the checkout scripts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Sale {
    pub id: String,
    pub seller_id: String,
    pub branch_id: String,
    /// Cash session the payments route through; bound at first payment.
    pub session_id: Option<String>,
    pub customer_name: String,
    pub customer_doc_type: DocType,
    pub customer_doc_number: String,
    pub customer_address: String,
    pub issued_at: DateTime<Utc>,
    pub status: SaleStatus,
    pub fulfillment: FulfillmentStatus,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    /// Fiscal buckets: subtotals by tax category.
    pub taxed_cents: i64,
    pub exempt_cents: i64,
    pub unaffected_cents: i64,
    pub free_cents: i64,
    /// Amount paid so far.
    pub advance_cents: i64,
    /// max(total − advance, 0).
    pub balance_cents: i64,
    pub payment_method: Option<PaymentMethod>,
    pub payment_reference: Option<String>,
    pub card_kind: Option<CardKind>,
    pub void_reason: Option<String>,
    pub notes: Option<String>,
    /// Promised pickup date, set when the sale goes to the lab.
    pub delivery_due: Option<NaiveDate>,
    pub updated_at: DateTime<Utc>,
}

impl Sale {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    #[inline]
    pub fn balance(&self) -> Money {
        Money::from_cents(self.balance_cents)
    }

    #[inline]
    pub fn advance(&self) -> Money {
        Money::from_cents(self.advance_cents)
    }

    #[inline]
    pub fn is_void(&self) -> bool {
        self.status == SaleStatus::Void
    }

    /// Facturas require a customer address; boletas do not.
    #[inline]
    pub fn requires_address(&self) -> bool {
        self.customer_doc_type == DocType::Ruc
    }
}

// =============================================================================
// Sale Line
// =============================================================================

/// One product/quantity entry within a sale.
///
/// Uses the snapshot pattern: unit value/price, description and brand are
/// copied from the catalog at line creation and frozen, so later catalog
/// price changes never rewrite sale history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SaleLine {
    pub id: String,
    pub sale_id: String,
    pub product_id: String,
    /// Units sold; at least 1.
    pub quantity: i64,
    /// Tax-exclusive unit value at sale time (frozen).
    pub unit_value_cents: i64,
    /// Tax-inclusive unit price at sale time (frozen).
    pub unit_price_cents: i64,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub discount_cents: i64,
    /// Voided lines are kept for audit but excluded from totals.
    pub voided: bool,
    pub description_snapshot: String,
    pub brand_snapshot: String,
    pub tax_category: TaxCategory,
    pub created_at: DateTime<Utc>,
}

impl SaleLine {
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    #[inline]
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.subtotal_cents)
    }
}

// =============================================================================
// Invoice
// =============================================================================

/// Fiscal document kind, derived from the customer's document type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum InvoiceDocType {
    /// Business invoice, issued to RUC customers.
    Factura,
    /// Retail receipt, issued to everyone else.
    Boleta,
}

impl InvoiceDocType {
    /// Document type for a given customer document.
    pub const fn for_customer(doc: DocType) -> Self {
        match doc {
            DocType::Ruc => InvoiceDocType::Factura,
            _ => InvoiceDocType::Boleta,
        }
    }

    /// Fixed series this document type is numbered in.
    pub const fn series(&self) -> &'static str {
        match self {
            InvoiceDocType::Factura => crate::SERIES_FACTURA,
            InvoiceDocType::Boleta => crate::SERIES_BOLETA,
        }
    }

    /// SUNAT document-type code (catalog 01).
    pub const fn sunat_code(&self) -> &'static str {
        match self {
            InvoiceDocType::Factura => "01",
            InvoiceDocType::Boleta => "03",
        }
    }
}

/// State of the document with the fiscal authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    /// Generated locally, not yet transmitted.
    Pending,
    Sent,
    Accepted,
    /// Accepted with observations.
    Observed,
    Rejected,
    Void,
}

impl SubmissionStatus {
    /// Whether the document may be (re)submitted to the authority.
    pub const fn can_submit(&self) -> bool {
        matches!(
            self,
            SubmissionStatus::Pending | SubmissionStatus::Rejected | SubmissionStatus::Observed
        )
    }

    /// Once the authority has the document, voiding the sale requires a
    /// credit note instead.
    pub const fn blocks_void(&self) -> bool {
        matches!(self, SubmissionStatus::Sent | SubmissionStatus::Accepted)
    }
}

/// The issuing company's registration data, stamped onto every invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerProfile {
    pub ruc: String,
    pub legal_name: String,
    pub address: String,
}

/// An immutable fiscal document generated once a sale is fully paid.
///
/// Exactly one per sale. Only the submission fields change after creation,
/// and only via the submission-recording path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Invoice {
    pub id: String,
    pub sale_id: String,
    pub doc_type: InvoiceDocType,
    /// Fixed per document type (F001 facturas, B001 boletas).
    pub series: String,
    /// Monotonic per series; assigned inside the creating transaction.
    pub sequence: i64,
    pub issued_at: DateTime<Utc>,
    pub issuer_ruc: String,
    pub issuer_name: String,
    pub issuer_address: String,
    /// SUNAT receptor document code: 1 = DNI, 6 = RUC, '-' = none.
    pub recipient_doc_code: String,
    pub recipient_doc_number: String,
    pub recipient_name: String,
    pub recipient_address: String,
    /// ISO 4217; always PEN for now.
    pub currency: String,
    pub taxed_cents: i64,
    pub exempt_cents: i64,
    pub unaffected_cents: i64,
    pub free_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub submission_status: SubmissionStatus,
    pub submission_message: Option<String>,
    pub response_code: Option<String>,
    pub content_hash: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub answered_at: Option<DateTime<Utc>>,
}

impl Invoice {
    /// Full document number, e.g. `B001-42`.
    pub fn document_number(&self) -> String {
        format!("{}-{}", self.series, self.sequence)
    }
}

/// A frozen copy of one non-void sale line at invoice-generation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct InvoiceLine {
    pub id: String,
    pub invoice_id: String,
    pub product_id: String,
    pub description: String,
    pub brand: String,
    pub quantity: i64,
    pub unit_value_cents: i64,
    pub unit_price_cents: i64,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
    pub tax_category: TaxCategory,
}

/// Result reported back by the external fiscal-submission client.
///
/// The core records it verbatim; it never performs the network call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    pub status: SubmissionStatus,
    pub message: String,
    pub response_code: Option<String>,
    pub content_hash: Option<String>,
}

// =============================================================================
// Unit Tests
// =============================================================================
