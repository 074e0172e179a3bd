// Mutual Credit - Core Library
// A mutual-credit marketplace ledger: bounded-balance accounts, offers with
// tags, and a buyer-initiated, seller-approved transaction workflow backed by
// an embedded SQLite store.

pub mod db;
pub mod engine;
pub mod entities;
pub mod errors;

// Re-export commonly used types
pub use engine::CreditEngine;
pub use entities::{Account, AccountLimits, Offer, Transaction, TxStatus};
pub use errors::{CreditError, CreditResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
