//! # Error Types
//!
//! Domain-specific error types for lumen-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                 │
//! │                                                                     │
//! │  lumen-core errors (this file)                                      │
//! │  ├── CoreError        - Business rule violations                    │
//! │  └── ValidationError  - Input validation failures                   │
//! │                                                                     │
//! │  lumen-db errors (separate crate)                                   │
//! │  └── DbError          - Database failures; wraps CoreError so a     │
//! │                         rule violation aborts the transaction and   │
//! │                         reaches the caller typed                    │
//! │                                                                     │
//! │  Flow: ValidationError → CoreError → DbError → caller               │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (ids, amounts, quantities)
//! 3. Errors are enum variants, never String
//! 4. Every rejection leaves all entities exactly as they were

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations of the sale/cash transaction core.
///
/// Recoverable for the caller unless noted: the enclosing transaction has
/// been rolled back and no partial state was committed.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Not enough stock at the branch to cover the requested decrement.
    ///
    /// Recoverable: retry with a smaller quantity or restock. The failed
    /// call left the stock record untouched.
    #[error("Insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        available: i64,
        requested: i64,
    },

    /// No StockRecord exists for the (branch, product) pair.
    ///
    /// Fatal configuration error: provisioning is owned by catalog
    /// management and records are never silently created here.
    #[error("Product {product_id} is not provisioned at branch {branch_id}")]
    ProductNotProvisioned {
        branch_id: String,
        product_id: String,
    },

    /// The cashier or the register already has an OPEN session.
    #[error("{owner} already has an open cash session")]
    SessionAlreadyOpen { owner: String },

    /// The caller has no OPEN session to route a payment through.
    #[error("No open cash session for cashier {cashier_id}")]
    NoOpenSession { cashier_id: String },

    /// The sale's payments are bound to a different session than the
    /// caller's current one; all of a sale's payments route through one
    /// consistent session.
    #[error("Sale {sale_id} is bound to session {bound_session}, not {current_session}")]
    SessionMismatch {
        sale_id: String,
        bound_session: String,
        current_session: String,
    },

    /// Only the session's own cashier may close it (manager override is the
    /// surrounding authorization layer's call).
    #[error("Session {session_id} belongs to cashier {owner_id}")]
    SessionOwnedByOther {
        session_id: String,
        owner_id: String,
    },

    /// The session is not OPEN (already closed or voided).
    #[error("Session {session_id} is not open")]
    SessionNotOpen { session_id: String },

    /// Payment amount exceeds the outstanding balance.
    ///
    /// Recoverable: resubmit a smaller amount. Advance and balance are
    /// unchanged.
    #[error("Payment of {amount_cents} exceeds outstanding balance of {balance_cents}")]
    PaymentExceedsBalance {
        amount_cents: i64,
        balance_cents: i64,
    },

    /// Payment amount must be strictly positive.
    #[error("Invalid payment amount: {reason}")]
    InvalidPaymentAmount { reason: String },

    /// Operation on a sale that is already voided.
    #[error("Sale {sale_id} is already void")]
    SaleAlreadyVoid { sale_id: String },

    /// Line/payment mutations are frozen once a fiscal invoice exists.
    #[error("Sale {sale_id} already has invoice {document}; it can no longer be modified")]
    SaleAlreadyInvoiced { sale_id: String, document: String },

    /// The invoice was already sent to / accepted by the fiscal authority;
    /// voiding the sale now requires a credit note (out of scope).
    ///
    /// Fatal for the void path.
    #[error("Invoice {document} was already transmitted to the fiscal authority; issue a credit note instead")]
    InvoiceAlreadySent { document: String },

    /// The requested fulfillment transition is not allowed.
    #[error("Illegal fulfillment transition for sale {sale_id}: {reason}")]
    IllegalFulfillmentTransition { sale_id: String, reason: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors, raised before any business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., a RUC that is not 11 digits).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            product_id: "p-9".to_string(),
            available: 3,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for product p-9: available 3, requested 5"
        );
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "customer_address".to_string(),
        };
        assert_eq!(err.to_string(), "customer_address is required");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::MustBePositive {
            field: "quantity".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
