//! # Totals Module
//!
//! The single source of truth for every derived figure on a sale.
//!
//! ## Single-Writer Rule
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  Every mutating checkout operation ends with:                       │
//! │                                                                     │
//! │    lines (non-void) ──► SaleTotals::recompute ──► one UPDATE        │
//! │                                                                     │
//! │  Nothing else ever writes subtotal/tax/total/buckets/balance or     │
//! │  the sale status, so stored totals can never disagree with the      │
//! │  persisted lines.                                                   │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## State Derivation
//! - VOID if the sale is voided
//! - PAID if balance == 0 and total > 0
//! - PARTIAL if 0 < advance < total
//! - PENDING otherwise

use crate::money::Money;
use crate::types::{SaleLine, SaleStatus, TaxCategory, TaxRate};

// =============================================================================
// Line Figures
// =============================================================================

/// Computed money fields of a single sale line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineFigures {
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
}

impl LineFigures {
    /// Computes a line's figures from its frozen snapshot data.
    ///
    /// subtotal = unit value × quantity (tax-exclusive);
    /// tax = subtotal × IGV for taxed lines, zero otherwise;
    /// total = subtotal + tax − discount.
    pub fn compute(
        unit_value: Money,
        quantity: i64,
        category: TaxCategory,
        discount: Money,
    ) -> Self {
        let subtotal = unit_value.multiply_quantity(quantity);
        let tax = if category.is_taxed() {
            subtotal.calculate_tax(TaxRate::igv())
        } else {
            Money::zero()
        };
        let total = subtotal + tax - discount;

        LineFigures {
            subtotal,
            tax,
            total,
        }
    }
}

// =============================================================================
// Tax Breakdown
// =============================================================================

/// Line subtotals bucketed by tax category, for fiscal reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaxBreakdown {
    pub taxed: Money,
    pub exempt: Money,
    pub unaffected: Money,
    pub free: Money,
}

impl TaxBreakdown {
    /// Adds a line subtotal to its category bucket.
    fn add(&mut self, category: TaxCategory, subtotal: Money) {
        match category {
            TaxCategory::Taxed => self.taxed += subtotal,
            TaxCategory::Exempt => self.exempt += subtotal,
            TaxCategory::Unaffected => self.unaffected += subtotal,
            TaxCategory::Free => self.free += subtotal,
        }
    }

    /// Sum of all buckets; equals the sale subtotal.
    pub fn subtotal(&self) -> Money {
        self.taxed + self.exempt + self.unaffected + self.free
    }
}

// =============================================================================
// Sale Totals
// =============================================================================

/// The full derived state of a sale: totals, buckets, balance and status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaleTotals {
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
    pub breakdown: TaxBreakdown,
    pub advance: Money,
    pub balance: Money,
    pub status: SaleStatus,
}

impl SaleTotals {
    /// Recomputes a sale's derived fields from its lines.
    ///
    /// Voided lines are excluded; they remain stored for audit only.
    /// `voided` refers to the sale itself: a voided sale derives VOID
    /// regardless of its lines.
    pub fn recompute(lines: &[SaleLine], advance: Money, voided: bool) -> Self {
        let mut breakdown = TaxBreakdown::default();
        let mut tax = Money::zero();

        for line in lines.iter().filter(|l| !l.voided) {
            breakdown.add(line.tax_category, line.subtotal());
            tax += Money::from_cents(line.tax_cents);
        }

        let subtotal = breakdown.subtotal();
        let total = subtotal + tax;
        let balance = total.saturating_sub_zero(advance);
        let status = derive_status(total, advance, balance, voided);

        SaleTotals {
            subtotal,
            tax,
            total,
            breakdown,
            advance,
            balance,
            status,
        }
    }

    /// The all-zero totals a sale takes when voided.
    pub fn voided() -> Self {
        SaleTotals {
            subtotal: Money::zero(),
            tax: Money::zero(),
            total: Money::zero(),
            breakdown: TaxBreakdown::default(),
            advance: Money::zero(),
            balance: Money::zero(),
            status: SaleStatus::Void,
        }
    }

    /// True once the sale is fully paid and non-empty; the trigger for
    /// invoice generation.
    #[inline]
    pub fn is_settled(&self) -> bool {
        self.balance.is_zero() && self.total.is_positive()
    }
}

fn derive_status(total: Money, advance: Money, balance: Money, voided: bool) -> SaleStatus {
    if voided {
        SaleStatus::Void
    } else if balance.is_zero() && total.is_positive() {
        SaleStatus::Paid
    } else if advance.is_positive() && balance.is_positive() {
        SaleStatus::Partial
    } else {
        SaleStatus::Pending
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
