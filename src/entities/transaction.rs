// 🔁 Transaction Entity - buyer-initiated, seller-approved exchange
//
// A transaction is born PENDING and moves exactly once into one terminal
// state. Balances move only on APPROVED; CANCELLED and DENIED never touch
// money, so there is nothing to reverse.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// STATUS
// ============================================================================

/// Transaction lifecycle: `PENDING -> {APPROVED, CANCELLED, DENIED}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TxStatus {
    Pending,
    Approved,
    Cancelled,
    Denied,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Pending => "PENDING",
            TxStatus::Approved => "APPROVED",
            TxStatus::Cancelled => "CANCELLED",
            TxStatus::Denied => "DENIED",
        }
    }

    /// Terminal states admit no further transition.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TxStatus::Pending)
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a stored status string is not one of the four known states.
#[derive(Debug, Error)]
#[error("unknown transaction status: {0}")]
pub struct ParseStatusError(pub String);

impl FromStr for TxStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TxStatus::Pending),
            "APPROVED" => Ok(TxStatus::Approved),
            "CANCELLED" => Ok(TxStatus::Cancelled),
            "DENIED" => Ok(TxStatus::Denied),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

// ============================================================================
// TRANSACTION ENTITY
// ============================================================================

/// Transaction row.
///
/// The seller is derived transitively through the offer and deliberately not
/// stored here. `closed_at` is set only on the terminal transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub buyer_id: String,
    pub offer_id: String,
    pub status: TxStatus,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// New buy request, open and unreserved.
    pub fn pending(buyer_id: impl Into<String>, offer_id: impl Into<String>) -> Self {
        Transaction {
            id: uuid::Uuid::new_v4().to_string(),
            buyer_id: buyer_id.into(),
            offer_id: offer_id.into(),
            status: TxStatus::Pending,
            created_at: Utc::now(),
            closed_at: None,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            TxStatus::Pending,
            TxStatus::Approved,
            TxStatus::Cancelled,
            TxStatus::Denied,
        ] {
            assert_eq!(status.as_str().parse::<TxStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_unknown_status_rejected() {
        let err = "REFUNDED".parse::<TxStatus>().unwrap_err();
        assert_eq!(err.0, "REFUNDED");
    }

    #[test]
    fn test_only_pending_is_open() {
        assert!(!TxStatus::Pending.is_terminal());
        assert!(TxStatus::Approved.is_terminal());
        assert!(TxStatus::Cancelled.is_terminal());
        assert!(TxStatus::Denied.is_terminal());
    }

    #[test]
    fn test_pending_constructor() {
        let tx = Transaction::pending("buyer", "offer");
        assert_eq!(tx.status, TxStatus::Pending);
        assert!(tx.closed_at.is_none());
        assert!(!tx.id.is_empty());
    }
}
