//! # souq-db: Ledger Layer for the Souq Order Pipeline
//!
//! All database operations for the order lifecycle & reservation engine:
//! the stock, loyalty, token and slot ledgers, the order and return rows,
//! and the services that move them together under one transaction per
//! request.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Souq Backend Architecture                         │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  souq-core (Business Logic)                     │   │
//! │  │        types • status tables • policy • codes • money           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 ★ souq-db (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐  ┌────────────────┐  ┌────────────────────────┐ │   │
//! │  │   │   pool   │  │  repository/   │  │       service/         │ │   │
//! │  │   │ sqlite + │  │ stock loyalty  │  │ OrderService           │ │   │
//! │  │   │ begin()  │  │ token slot     │  │ TokenService           │ │   │
//! │  │   │          │  │ order account  │  │ ReturnService          │ │   │
//! │  │   │          │  │ returns        │  │ (one tx per request)   │ │   │
//! │  │   └──────────┘  └────────────────┘  └────────────────────────┘ │   │
//! │  │                                                                 │   │
//! │  │   migrations (embedded) • retry (backoff) • notify (port)       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Design Decisions
//!
//! 1. **SQLite + WAL**: the database is the synchronization point; no
//!    in-memory ledger state exists anywhere
//! 2. **Guarded updates**: preconditions ride on the UPDATE statement, and
//!    `rows_affected == 0` is how a request learns it lost a race
//! 3. **Explicit unit of work**: repositories are free functions over
//!    `&mut SqliteConnection`; only services open and commit transactions
//! 4. **Embedded migrations**: schema ships inside the binary

pub mod error;
pub mod migrations;
pub mod notify;
pub mod pool;
pub mod repository;
pub mod retry;
pub mod service;

// Re-export commonly used types
pub use error::{DbError, DbResult};
pub use notify::{Notifier, NotifyEvent, RecordingNotifier, TracingNotifier};
pub use pool::{Database, DbConfig};
pub use service::orders::{
    CancelOrderResponse, CreateOrderItem, CreateOrderRequest, OrderService, OrderSnapshot,
};
pub use service::returns::{
    CreateReturnRequest, ReturnItemRequest, ReturnService, ReturnSnapshot,
};
pub use service::tokens::{TokenService, TokenValidation};
pub use service::Actor;
