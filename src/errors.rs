// ⚠️ Error taxonomy for the credit engine
// Every failure a caller can recover from gets its own variant; the adapter
// renders `Display` straight back to the user.

use thiserror::Error;

/// Result type used across the engine.
pub type CreditResult<T> = Result<T, CreditError>;

/// Ledger-level error.
///
/// Invariant violations (balance floors/ceilings, status transitions,
/// ownership) are permanent until external state changes; the engine never
/// retries them. `Store` wraps driver-level failures and is the only
/// potentially transient variant.
#[derive(Debug, Error)]
pub enum CreditError {
    #[error("no account with ID {0} exists")]
    AccountNotFound(String),

    #[error("an account with ID {0} already exists")]
    AccountExists(String),

    /// Account still owns offers or is party to pending transactions.
    #[error("account {0} still has offers or open transactions")]
    AccountInUse(String),

    #[error("no offer with ID {0} exists")]
    OfferNotFound(String),

    /// Offer is referenced by at least one pending transaction.
    #[error("offer {0} has pending transactions and cannot be deleted")]
    OfferInUse(String),

    #[error("no transaction with ID {0} exists")]
    TransactionNotFound(String),

    #[error("buyer and seller must be different accounts")]
    SelfTransaction,

    #[error("offer price must be positive, got {0}")]
    InvalidPrice(i64),

    #[error("min balance {min} must be below max balance {max}")]
    InvalidLimits { min: i64, max: i64 },

    #[error("buyer balance too low for transaction")]
    MinBalance,

    #[error("seller balance too high for transaction")]
    MaxBalance,

    #[error("transaction status is not pending")]
    TransactionStatus,

    /// Actor is not the owner/buyer/seller the operation requires.
    #[error("account {actor} may not modify another member's {entity}")]
    PermissionDenied {
        actor: String,
        entity: &'static str,
    },

    #[error("storage error: {0}")]
    Store(#[from] rusqlite::Error),
}

impl CreditError {
    pub(crate) fn permission(actor: impl Into<String>, entity: &'static str) -> Self {
        CreditError::PermissionDenied {
            actor: actor.into(),
            entity,
        }
    }
}
