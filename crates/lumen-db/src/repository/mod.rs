//! # Repository Module
//!
//! Database repository implementations for Lumen POS.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern Explained                         │
//! │                                                                         │
//! │  The Repository pattern abstracts database access behind a clean API.  │
//! │                                                                         │
//! │  Checkout script                                                       │
//! │       │                                                                 │
//! │       │  db.sessions().open(register, cashier, ...)                     │
//! │       │  ↓                                                              │
//! │       ▼                                                                 │
//! │  SessionRepository                                                     │
//! │  ├── open(&self, ...)                                                   │
//! │  ├── get_by_id(&self, id)                                               │
//! │  └── close(&self, ...)                                                  │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Transaction-Scoped Methods
//!
//! Repository methods come in two flavors:
//! - `&self` methods run against the pool, used for stand-alone reads
//!   and single-statement writes
//! - Associated functions taking `&mut SqliteConnection` run inside a
//!   caller-owned transaction; the checkout scripts compose several of
//!   these into one atomic operation
//!
//! ## Available Repositories
//!
//! - [`catalog::CatalogRepository`] - Product reads and provisioning
//! - [`stock::StockLedger`] - Guarded per-branch quantity adjustments
//! - [`session::SessionRepository`] - Cash session lifecycle
//! - [`sale::SaleRepository`] - Sale and sale line operations
//! - [`invoice::InvoiceRepository`] - Fiscal document numbering and state

pub mod catalog;
pub mod invoice;
pub mod sale;
pub mod session;
pub mod stock;
