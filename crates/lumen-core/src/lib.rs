//! # lumen-core: Pure Business Logic for Lumen POS
//!
//! This crate is the **heart** of the sale/cash transaction core. It contains
//! all business logic as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                       Lumen POS Architecture                        │
//! │                                                                     │
//! │  ┌───────────────────────────────────────────────────────────────┐ │
//! │  │                 Request layer (out of scope)                  │ │
//! │  │   createSale, addSaleLine, registerPayment, openCashSession   │ │
//! │  └─────────────────────────────┬─────────────────────────────────┘ │
//! │                                │                                   │
//! │  ┌─────────────────────────────▼─────────────────────────────────┐ │
//! │  │              ★ lumen-core (THIS CRATE) ★                      │ │
//! │  │                                                               │ │
//! │  │  ┌─────────┐  ┌─────────┐  ┌─────────┐  ┌────────────┐        │ │
//! │  │  │  types  │  │  money  │  │ totals  │  │ validation │        │ │
//! │  │  │  Sale   │  │  Money  │  │ buckets │  │   rules    │        │ │
//! │  │  │ Invoice │  │ TaxRate │  │ balance │  │   checks   │        │ │
//! │  │  └─────────┘  └─────────┘  └─────────┘  └────────────┘        │ │
//! │  │                                                               │ │
//! │  │  NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │ │
//! │  └─────────────────────────────┬─────────────────────────────────┘ │
//! │                                │                                   │
//! │  ┌─────────────────────────────▼─────────────────────────────────┐ │
//! │  │                 lumen-db (Database Layer)                     │ │
//! │  │    SQLite repositories, checkout transaction scripts          │ │
//! │  └───────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Sale, SaleLine, CashSession, Invoice, ...)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`totals`] - The single recompute function for all derived sale fields
//! - [`error`] - Domain error taxonomy
//! - [`validation`] - Input validation rules
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: same input = same output, always
//! 2. **No I/O**: database, network, file system access is FORBIDDEN here
//! 3. **Integer Money**: all monetary values are in cents (i64)
//! 4. **Derived Fields Have One Writer**: totals, balance and sale status
//!    come out of [`totals::SaleTotals::recompute`] and nowhere else
//!
//! ## Example Usage
//!
//! ```rust
//! use lumen_core::money::Money;
//! use lumen_core::totals::LineFigures;
//! use lumen_core::types::TaxCategory;
//!
//! // S/50.00 tax-exclusive, two units, taxed at 18% IGV
//! let figures = LineFigures::compute(
//!     Money::from_cents(5_000),
//!     2,
//!     TaxCategory::Taxed,
//!     Money::zero(),
//! );
//! assert_eq!(figures.total.cents(), 11_800); // 100.00 + 18.00
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod totals;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use totals::{LineFigures, SaleTotals, TaxBreakdown};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// General IGV sales-tax rate in basis points (18%).
pub const IGV_RATE_BPS: u32 = 1800;

/// Fixed series for facturas (RUC customers).
pub const SERIES_FACTURA: &str = "F001";

/// Fixed series for boletas (everyone else).
pub const SERIES_BOLETA: &str = "B001";

/// Maximum quantity of a single line.
///
/// ## Business Reason
/// Prevents accidental over-ordering (e.g., typing 1000 instead of 10).
pub const MAX_LINE_QUANTITY: i64 = 999;

/// Currency code stamped on fiscal documents.
pub const CURRENCY_PEN: &str = "PEN";
