//! # Validation Module
//!
//! Input validation for the checkout path.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                              │
//! │                                                                     │
//! │  Layer 1: Request layer (out of scope here)                         │
//! │  ├── Type validation (deserialization)                              │
//! │  └── Authorization                                                  │
//! │           │                                                         │
//! │           ▼                                                         │
//! │  Layer 2: THIS MODULE - domain input rules                          │
//! │  ├── Document formats (RUC = 11 digits, DNI = 8)                    │
//! │  ├── Quantities, amounts, discounts                                 │
//! │           │                                                         │
//! │           ▼                                                         │
//! │  Layer 3: Database (SQLite)                                         │
//! │  ├── CHECK (quantity >= 0) on stock                                 │
//! │  └── Partial unique indexes on open sessions                        │
//! │                                                                     │
//! │  Defense in depth: multiple layers catch different errors           │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::types::{CardKind, CustomerSnapshot, DocType, PaymentMethod};
use crate::MAX_LINE_QUANTITY;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Customer Document Validators
// =============================================================================

/// Validates a customer snapshot before a sale is created.
///
/// ## Rules
/// - Name must not be empty
/// - RUC numbers are exactly 11 digits, DNI exactly 8
/// - RUC customers (facturas) must provide an address
pub fn validate_customer(customer: &CustomerSnapshot) -> ValidationResult<()> {
    if customer.name.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "customer_name".to_string(),
        });
    }

    match customer.doc_type {
        DocType::Ruc => {
            validate_digits("customer_doc_number", &customer.doc_number, 11)?;
            if customer.address.trim().is_empty() {
                return Err(ValidationError::Required {
                    field: "customer_address".to_string(),
                });
            }
        }
        DocType::Dni if !customer.doc_number.is_empty() => {
            validate_digits("customer_doc_number", &customer.doc_number, 8)?;
        }
        _ => {}
    }

    Ok(())
}

/// Validates that an ID issued by this system parses as a UUID.
///
/// Branch, register and cashier identifiers come from outside and are
/// opaque strings; sale, line, session and invoice IDs are ours and
/// must be well-formed before they reach a query.
pub fn validate_uuid(field: &str, id: &str) -> ValidationResult<()> {
    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "not a valid UUID".to_string(),
    })?;
    Ok(())
}

fn validate_digits(field: &str, value: &str, expected_len: usize) -> ValidationResult<()> {
    if value.len() != expected_len || !value.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: format!("must be exactly {expected_len} digits"),
        });
    }
    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a sale line quantity.
pub fn validate_quantity(quantity: i64) -> ValidationResult<()> {
    if quantity < 1 || quantity > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }
    Ok(())
}

/// Validates a line discount in cents (non-negative).
pub fn validate_discount(discount_cents: i64) -> ValidationResult<()> {
    if discount_cents < 0 {
        return Err(ValidationError::MustBePositive {
            field: "discount".to_string(),
        });
    }
    Ok(())
}

/// Validates a line discount against the line's gross amount
/// (subtotal + tax). A discount may zero a line out but never push its
/// total negative.
pub fn validate_discount_bound(discount_cents: i64, gross_cents: i64) -> ValidationResult<()> {
    if discount_cents > gross_cents {
        return Err(ValidationError::OutOfRange {
            field: "discount".to_string(),
            min: 0,
            max: gross_cents,
        });
    }
    Ok(())
}

/// Validates a cash session's opening float (non-negative).
pub fn validate_opening_float(opening_float_cents: i64) -> ValidationResult<()> {
    if opening_float_cents < 0 {
        return Err(ValidationError::MustBePositive {
            field: "opening_float".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Payment Field Validators
// =============================================================================

/// Validates the payment method fields.
///
/// A card payment must say whether it was debit or credit; any other
/// method must not carry a card kind.
pub fn validate_payment_fields(
    method: PaymentMethod,
    card_kind: Option<CardKind>,
) -> ValidationResult<()> {
    match (method, card_kind) {
        (PaymentMethod::Card, None) => Err(ValidationError::Required {
            field: "card_kind".to_string(),
        }),
        (PaymentMethod::Card, Some(_)) => Ok(()),
        (_, Some(_)) => Err(ValidationError::InvalidFormat {
            field: "card_kind".to_string(),
            reason: "only applies to card payments".to_string(),
        }),
        _ => Ok(()),
    }
}

/// Validates a void reason (must be non-empty, bounded for storage).
pub fn validate_void_reason(reason: &str) -> ValidationResult<()> {
    if reason.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "void_reason".to_string(),
        });
    }
    if reason.len() > 500 {
        return Err(ValidationError::TooLong {
            field: "void_reason".to_string(),
            max: 500,
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
