// Entity Models for the mutual-credit ledger
//
// Each entity is a plain row-shaped value:
// - Accounts are keyed by an opaque member ID supplied by the caller
// - Offers and transactions get generated UUID identities
// - The engine (not the entities) enforces cross-entity invariants

pub mod account;
pub mod offer;
pub mod transaction;

pub use account::{Account, AccountLimits};
pub use offer::Offer;
pub use transaction::{ParseStatusError, Transaction, TxStatus};
