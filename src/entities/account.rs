// 💳 Account Entity - member identity with a bounded credit balance
//
// Mutual credit: balances may go negative down to a per-account floor,
// representing credit extended to the member rather than pre-funded money.

use serde::{Deserialize, Serialize};

use crate::errors::{CreditError, CreditResult};

// ============================================================================
// ACCOUNT LIMITS
// ============================================================================

/// Per-account balance range.
///
/// `min_balance` is the credit floor (usually negative), `max_balance` the
/// ceiling. Every committed mutation must keep the balance inside this range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountLimits {
    pub min_balance: i64,
    pub max_balance: i64,
}

impl AccountLimits {
    pub fn new(min_balance: i64, max_balance: i64) -> Self {
        AccountLimits {
            min_balance,
            max_balance,
        }
    }

    /// Reject inverted or empty ranges.
    pub fn validate(&self) -> CreditResult<()> {
        if self.min_balance >= self.max_balance {
            return Err(CreditError::InvalidLimits {
                min: self.min_balance,
                max: self.max_balance,
            });
        }
        Ok(())
    }

    /// Check a candidate balance against the range.
    pub fn contains(&self, balance: i64) -> bool {
        self.min_balance <= balance && balance <= self.max_balance
    }
}

impl Default for AccountLimits {
    fn default() -> Self {
        // Community default carried over from the original deployment
        AccountLimits {
            min_balance: -1000,
            max_balance: 1000,
        }
    }
}

// ============================================================================
// ACCOUNT ENTITY
// ============================================================================

/// Account row.
///
/// Identity: the member ID (opaque, supplied by the adapter, never reused).
/// The balance is only ever written by the engine's approval path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub balance: i64,
    pub limits: AccountLimits,
}

impl Account {
    /// New account opens at zero balance.
    pub fn new(id: impl Into<String>, limits: AccountLimits) -> Self {
        Account {
            id: id.into(),
            balance: 0,
            limits,
        }
    }

    /// Would debiting `amount` drop this account below its floor?
    pub fn debit_would_underflow(&self, amount: i64) -> bool {
        self.balance - amount < self.limits.min_balance
    }

    /// Would crediting `amount` push this account above its ceiling?
    pub fn credit_would_overflow(&self, amount: i64) -> bool {
        self.balance + amount > self.limits.max_balance
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = AccountLimits::default();
        assert_eq!(limits.min_balance, -1000);
        assert_eq!(limits.max_balance, 1000);
        assert!(limits.validate().is_ok());
    }

    #[test]
    fn test_inverted_limits_rejected() {
        let limits = AccountLimits::new(100, -100);
        assert!(matches!(
            limits.validate(),
            Err(CreditError::InvalidLimits { min: 100, max: -100 })
        ));

        // empty range is just as useless
        assert!(AccountLimits::new(50, 50).validate().is_err());
    }

    #[test]
    fn test_new_account_opens_at_zero() {
        let account = Account::new("member-1", AccountLimits::default());
        assert_eq!(account.balance, 0);
        assert!(account.limits.contains(account.balance));
    }

    #[test]
    fn test_floor_and_ceiling_checks() {
        let mut account = Account::new("member-1", AccountLimits::new(-100, 100));
        assert!(!account.debit_would_underflow(100));
        assert!(account.debit_would_underflow(101));

        account.balance = 90;
        assert!(!account.credit_would_overflow(10));
        assert!(account.credit_would_overflow(11));
    }
}
