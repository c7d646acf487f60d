//! # lumen-db: Storage and Checkout Layer for Lumen POS
//!
//! This crate persists the sale/cash transaction core of Lumen POS and
//! drives its multi-step operations. It uses SQLite for branch-local
//! storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Lumen POS Data Flow                              │
//! │                                                                         │
//! │  Register terminal / branch API                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     lumen-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────────┐   ┌───────────────┐   ┌──────────────┐      │   │
//! │  │   │  Checkout    │   │  Repositories │   │  Migrations  │      │   │
//! │  │   │ (checkout.rs)│──►│ stock/session │   │  (embedded)  │      │   │
//! │  │   │ transaction  │   │ sale/invoice/ │   │ 001_init.sql │      │   │
//! │  │   │ scripts      │   │ catalog       │   │              │      │   │
//! │  │   └──────────────┘   └───────┬───────┘   └──────────────┘      │   │
//! │  │                             │ uses lumen-core for all          │   │
//! │  │                             │ money math and rule checks       │   │
//! │  └─────────────────────────────┼──────────────────────────────────┘   │
//! │                                ▼                                       │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                SQLite Database (WAL, one per branch)            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations (stock, session, sale, ...)
//! - [`checkout`] - Transaction scripts composing the repositories
//!
//! ## Usage
//!
//! ```rust,ignore
//! use lumen_db::{CheckoutService, Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/lumen.db")).await?;
//! let checkout = CheckoutService::new(db.clone(), issuer_profile);
//!
//! let sale = checkout.create_sale(&seller, &branch, customer, None).await?;
//! checkout.add_line(&sale.id, &product_id, 1, 0).await?;
//! let outcome = checkout
//!     .register_payment(&sale.id, &cashier, amount, method, None, None)
//!     .await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod checkout;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use checkout::{CheckoutService, PaymentOutcome, SaleSnapshot};
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::catalog::CatalogRepository;
pub use repository::invoice::InvoiceRepository;
pub use repository::sale::SaleRepository;
pub use repository::session::SessionRepository;
pub use repository::stock::StockLedger;
