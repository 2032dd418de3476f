//! # Ledger Repositories
//!
//! Database operations for each ledger, as free functions over an explicit
//! connection.
//!
//! ## The Unit-of-Work Rule
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │             Why every mutator takes &mut SqliteConnection               │
//! │                                                                         │
//! │  Service (one request)                                                  │
//! │       │                                                                 │
//! │       │  let mut tx = db.begin().await?;                               │
//! │       │                                                                 │
//! │       ├── stock::reserve(&mut tx, ...)      ┐                          │
//! │       ├── slot::acquire(&mut tx, ...)       │ all on the SAME          │
//! │       ├── token::consume(&mut tx, ...)      │ transaction             │
//! │       ├── loyalty::spend(&mut tx, ...)      │                          │
//! │       └── order::insert(&mut tx, ...)       ┘                          │
//! │       │                                                                 │
//! │       └── tx.commit().await?   ← all ledgers move together or not      │
//! │                                  at all                                 │
//! │                                                                         │
//! │  There is NO ambient database handle inside a repository; the caller   │
//! │  decides the transaction boundary, always.                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Guarded Updates
//!
//! Conflict checks ride on the UPDATE itself
//! (`... WHERE stock_quantity - reserved_quantity >= ?`); a statement that
//! affected zero rows means the precondition failed, and the repository
//! re-reads the row to report the blocking fact in the error.
//!
//! ## Available Repositories
//!
//! - [`stock`] - Stock ledger: reserve / commit / release / restock
//! - [`loyalty`] - Loyalty ledger: earn / spend / deduct / refund + audit log
//! - [`token`] - Redemption token rows: insert / consume / cancel
//! - [`slot`] - Delivery slot capacity counters
//! - [`order`] - Order rows, items, guarded status moves
//! - [`account`] - User account: wallet, warnings, auto-block
//! - [`returns`] - Return rows, items, guarded resolution

pub mod account;
pub mod loyalty;
pub mod order;
pub mod returns;
pub mod slot;
pub mod stock;
pub mod token;
