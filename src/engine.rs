// Ledger Engine - sole mutator of balances and transaction status.
//
// Reservation-by-computation: creating a buy request moves no money. The
// affordability check derives available balance from live PENDING rows, and
// balances change only inside the approval unit of work. Cancel/deny never
// touch balances, so there is no reversal logic to get wrong.

use rusqlite::Connection;
use std::path::Path;
use tracing::{debug, info};

use crate::db;
use crate::entities::{Account, AccountLimits, Offer, Transaction, TxStatus};
use crate::errors::{CreditError, CreditResult};

/// The ledger engine. Owns the store connection; construct one explicitly and
/// hand it to whatever adapter fronts it.
pub struct CreditEngine {
    conn: Connection,
    default_limits: AccountLimits,
}

impl CreditEngine {
    /// Open (and if needed initialize) a ledger at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> CreditResult<Self> {
        Self::new(Connection::open(path)?)
    }

    /// In-memory ledger, used by tests and throwaway sessions.
    pub fn open_in_memory() -> CreditResult<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    pub fn new(conn: Connection) -> CreditResult<Self> {
        db::setup_database(&conn)?;
        Ok(CreditEngine {
            conn,
            default_limits: AccountLimits::default(),
        })
    }

    /// Override the range applied to accounts created without explicit limits.
    pub fn with_default_limits(mut self, limits: AccountLimits) -> CreditResult<Self> {
        limits.validate()?;
        self.default_limits = limits;
        Ok(self)
    }

    pub fn default_limits(&self) -> AccountLimits {
        self.default_limits
    }

    // ========================================================================
    // ACCOUNTS
    // ========================================================================

    /// Create an account for a member with the engine's default range.
    pub fn create_account(&mut self, account_id: &str) -> CreditResult<()> {
        self.create_account_with_limits(account_id, self.default_limits)
    }

    /// Create an account with an explicit balance range.
    ///
    /// The existence pre-check only produces a friendlier error; the primary
    /// key constraint is what actually wins the race.
    pub fn create_account_with_limits(
        &mut self,
        account_id: &str,
        limits: AccountLimits,
    ) -> CreditResult<()> {
        limits.validate()?;

        if db::get_account(&self.conn, account_id)?.is_some() {
            return Err(CreditError::AccountExists(account_id.to_string()));
        }

        let account = Account::new(account_id, limits);
        match db::insert_account(&self.conn, &account) {
            Ok(()) => {
                info!(account_id, "account created");
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(CreditError::AccountExists(account_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Admin-only removal. Refused while the account still owns offers or is
    /// party to pending transactions, so no live row is left dangling.
    pub fn delete_account(&mut self, account_id: &str) -> CreditResult<()> {
        let tx = self.conn.transaction()?;

        if db::get_account(&tx, account_id)?.is_none() {
            return Err(CreditError::AccountNotFound(account_id.to_string()));
        }
        if db::count_offers_by_seller(&tx, account_id)? > 0
            || db::count_open_transactions_for_account(&tx, account_id)? > 0
        {
            return Err(CreditError::AccountInUse(account_id.to_string()));
        }

        db::delete_account(&tx, account_id)?;
        tx.commit()?;
        info!(account_id, "account deleted");
        Ok(())
    }

    fn require_account(&self, account_id: &str) -> CreditResult<Account> {
        db::get_account(&self.conn, account_id)?
            .ok_or_else(|| CreditError::AccountNotFound(account_id.to_string()))
    }

    pub fn balance(&self, account_id: &str) -> CreditResult<i64> {
        Ok(self.require_account(account_id)?.balance)
    }

    pub fn account_limits(&self, account_id: &str) -> CreditResult<AccountLimits> {
        Ok(self.require_account(account_id)?.limits)
    }

    /// How much this account can still commit to new buy requests: current
    /// balance minus the sum of its own pending debits, relative to its floor.
    /// Recomputed from live rows on every call - there is no cached
    /// reserved-amount field to drift.
    pub fn available_balance(&self, account_id: &str) -> CreditResult<i64> {
        let account = self.require_account(account_id)?;
        let pending_debits = db::total_pending_debits(&self.conn, account_id)?;
        Ok(account.balance - pending_debits - account.limits.min_balance)
    }

    /// Sum of prices across the account's own pending buy requests.
    pub fn total_pending_debits(&self, account_id: &str) -> CreditResult<i64> {
        self.require_account(account_id)?;
        Ok(db::total_pending_debits(&self.conn, account_id)?)
    }

    /// Sum of prices of pending sales against this account's offers - how
    /// much credit may still land here.
    pub fn total_pending_credits(&self, account_id: &str) -> CreditResult<i64> {
        self.require_account(account_id)?;
        Ok(db::total_pending_credits(&self.conn, account_id)?)
    }

    /// The account's open buy requests.
    pub fn pending_buys(&self, account_id: &str) -> CreditResult<Vec<Transaction>> {
        Ok(db::get_pending_for_buyer(&self.conn, account_id)?)
    }

    /// Open buy requests against the account's offers.
    pub fn pending_sales(&self, account_id: &str) -> CreditResult<Vec<Transaction>> {
        Ok(db::get_pending_for_seller(&self.conn, account_id)?)
    }

    // ========================================================================
    // OFFERS
    // ========================================================================

    /// List something for sale. Returns the generated offer ID.
    pub fn create_offer(
        &mut self,
        seller_id: &str,
        description: &str,
        price: i64,
        title: &str,
    ) -> CreditResult<String> {
        if price <= 0 {
            return Err(CreditError::InvalidPrice(price));
        }

        let tx = self.conn.transaction()?;
        if db::get_account(&tx, seller_id)?.is_none() {
            return Err(CreditError::AccountNotFound(seller_id.to_string()));
        }

        let offer = Offer::new(seller_id, description, price, title);
        db::insert_offer(&tx, &offer)?;
        tx.commit()?;

        info!(seller_id, offer_id = %offer.id, price, "offer created");
        Ok(offer.id)
    }

    pub fn offer(&self, offer_id: &str) -> CreditResult<Offer> {
        db::get_offer(&self.conn, offer_id)?
            .ok_or_else(|| CreditError::OfferNotFound(offer_id.to_string()))
    }

    /// Offers owned by `seller_id`. An unknown seller is a valid query and
    /// yields an empty list; read paths do not require account existence.
    pub fn offers_by_seller(&self, seller_id: &str) -> CreditResult<Vec<Offer>> {
        Ok(db::get_offers_by_seller(&self.conn, seller_id)?)
    }

    /// Browse offers carrying a tag.
    pub fn offers_by_tag(&self, tag: &str) -> CreditResult<Vec<Offer>> {
        Ok(db::get_offers_by_tag(&self.conn, tag)?)
    }

    /// Owner-only removal of an offer and its tags.
    ///
    /// Policy: deletion is refused while PENDING transactions reference the
    /// offer. Buyers must cancel (or the seller deny) those first; approved
    /// history is no obstacle.
    pub fn delete_offer(&mut self, requester_id: &str, offer_id: &str) -> CreditResult<()> {
        let tx = self.conn.transaction()?;

        let offer = db::get_offer(&tx, offer_id)?
            .ok_or_else(|| CreditError::OfferNotFound(offer_id.to_string()))?;
        if offer.seller_id != requester_id {
            return Err(CreditError::permission(requester_id, "offer"));
        }
        if db::count_pending_for_offer(&tx, offer_id)? > 0 {
            return Err(CreditError::OfferInUse(offer_id.to_string()));
        }

        db::delete_tags_for_offer(&tx, offer_id)?;
        db::delete_offer(&tx, offer_id)?;
        tx.commit()?;

        info!(offer_id, "offer deleted");
        Ok(())
    }

    /// Attach tags to an offer. Each tag is processed independently and
    /// re-adding an existing tag is a no-op. Returns the resulting tag set.
    pub fn add_tags(
        &mut self,
        requester_id: &str,
        offer_id: &str,
        tags: &[String],
    ) -> CreditResult<Vec<String>> {
        let tx = self.conn.transaction()?;

        let offer = db::get_offer(&tx, offer_id)?
            .ok_or_else(|| CreditError::OfferNotFound(offer_id.to_string()))?;
        if offer.seller_id != requester_id {
            return Err(CreditError::permission(requester_id, "offer"));
        }

        for tag in tags {
            db::insert_offer_tag(&tx, offer_id, tag)?;
        }
        let result = db::get_offer_tags(&tx, offer_id)?;
        tx.commit()?;

        debug!(offer_id, tags = result.len(), "tags added");
        Ok(result)
    }

    /// Detach tags from an offer; removing an absent tag is a no-op.
    /// Returns the resulting tag set.
    pub fn remove_tags(
        &mut self,
        requester_id: &str,
        offer_id: &str,
        tags: &[String],
    ) -> CreditResult<Vec<String>> {
        let tx = self.conn.transaction()?;

        let offer = db::get_offer(&tx, offer_id)?
            .ok_or_else(|| CreditError::OfferNotFound(offer_id.to_string()))?;
        if offer.seller_id != requester_id {
            return Err(CreditError::permission(requester_id, "offer"));
        }

        for tag in tags {
            db::delete_offer_tag(&tx, offer_id, tag)?;
        }
        let result = db::get_offer_tags(&tx, offer_id)?;
        tx.commit()?;

        debug!(offer_id, tags = result.len(), "tags removed");
        Ok(result)
    }

    /// Current tag set of an existing offer.
    pub fn tags(&self, offer_id: &str) -> CreditResult<Vec<String>> {
        if db::get_offer(&self.conn, offer_id)?.is_none() {
            return Err(CreditError::OfferNotFound(offer_id.to_string()));
        }
        Ok(db::get_offer_tags(&self.conn, offer_id)?)
    }

    // ========================================================================
    // TRANSACTIONS
    // ========================================================================

    /// Buyer requests an offer. No money moves; the request only has to fit
    /// inside the buyer's available balance once all of their other pending
    /// buys are honored. Returns the new transaction ID.
    pub fn create_transaction(&mut self, buyer_id: &str, offer_id: &str) -> CreditResult<String> {
        let tx = self.conn.transaction()?;

        let offer = db::get_offer(&tx, offer_id)?
            .ok_or_else(|| CreditError::OfferNotFound(offer_id.to_string()))?;
        if offer.seller_id == buyer_id {
            return Err(CreditError::SelfTransaction);
        }

        let buyer = db::get_account(&tx, buyer_id)?
            .ok_or_else(|| CreditError::AccountNotFound(buyer_id.to_string()))?;
        let pending_debits = db::total_pending_debits(&tx, buyer_id)?;
        let available = buyer.balance - pending_debits - buyer.limits.min_balance;
        if offer.price > available {
            return Err(CreditError::MinBalance);
        }

        let record = Transaction::pending(buyer_id, offer_id);
        db::insert_transaction(&tx, &record)?;
        tx.commit()?;

        info!(buyer_id, offer_id, tx_id = %record.id, "buy request created");
        Ok(record.id)
    }

    /// Seller approves a pending transaction: the only operation that moves
    /// credit. Balances and price are re-read here, not trusted from request
    /// time, and all three writes commit together or not at all.
    pub fn approve_transaction(&mut self, seller_id: &str, tx_id: &str) -> CreditResult<()> {
        let tx = self.conn.transaction()?;

        let record = db::get_transaction(&tx, tx_id)?
            .ok_or_else(|| CreditError::TransactionNotFound(tx_id.to_string()))?;
        let offer = db::get_offer(&tx, &record.offer_id)?
            .ok_or_else(|| CreditError::OfferNotFound(record.offer_id.clone()))?;
        if offer.seller_id != seller_id {
            return Err(CreditError::permission(seller_id, "transaction"));
        }
        if record.status != TxStatus::Pending {
            return Err(CreditError::TransactionStatus);
        }

        let buyer = db::get_account(&tx, &record.buyer_id)?
            .ok_or_else(|| CreditError::AccountNotFound(record.buyer_id.clone()))?;
        let seller = db::get_account(&tx, seller_id)?
            .ok_or_else(|| CreditError::AccountNotFound(seller_id.to_string()))?;

        if seller.credit_would_overflow(offer.price) {
            return Err(CreditError::MaxBalance);
        }
        if buyer.debit_would_underflow(offer.price) {
            return Err(CreditError::MinBalance);
        }

        // CAS on status: a concurrent approval of the same ID changes 0 rows
        // here and fails without touching balances.
        let changed = db::close_transaction(&tx, tx_id, TxStatus::Approved, chrono::Utc::now())?;
        if changed == 0 {
            return Err(CreditError::TransactionStatus);
        }
        db::update_account_balance(&tx, &buyer.id, buyer.balance - offer.price)?;
        db::update_account_balance(&tx, &seller.id, seller.balance + offer.price)?;
        tx.commit()?;

        info!(
            tx_id,
            buyer_id = %buyer.id,
            seller_id,
            price = offer.price,
            "transaction approved"
        );
        Ok(())
    }

    /// Approve several transactions in one call. Each ID is processed
    /// independently; one failure does not abort the rest of the batch.
    pub fn approve_transactions(
        &mut self,
        seller_id: &str,
        tx_ids: &[String],
    ) -> Vec<(String, CreditResult<()>)> {
        tx_ids
            .iter()
            .map(|tx_id| (tx_id.clone(), self.approve_transaction(seller_id, tx_id)))
            .collect()
    }

    /// Buyer withdraws their own pending request. Nothing was ever debited,
    /// so there is no balance change.
    pub fn cancel_transaction(&mut self, buyer_id: &str, tx_id: &str) -> CreditResult<()> {
        let tx = self.conn.transaction()?;

        let record = db::get_transaction(&tx, tx_id)?
            .ok_or_else(|| CreditError::TransactionNotFound(tx_id.to_string()))?;
        if record.buyer_id != buyer_id {
            return Err(CreditError::permission(buyer_id, "transaction"));
        }
        if record.status != TxStatus::Pending {
            return Err(CreditError::TransactionStatus);
        }

        let changed = db::close_transaction(&tx, tx_id, TxStatus::Cancelled, chrono::Utc::now())?;
        if changed == 0 {
            return Err(CreditError::TransactionStatus);
        }
        tx.commit()?;

        info!(tx_id, buyer_id, "transaction cancelled");
        Ok(())
    }

    /// Seller declines a pending request against one of their offers.
    pub fn deny_transaction(&mut self, seller_id: &str, tx_id: &str) -> CreditResult<()> {
        let tx = self.conn.transaction()?;

        let record = db::get_transaction(&tx, tx_id)?
            .ok_or_else(|| CreditError::TransactionNotFound(tx_id.to_string()))?;
        let offer = db::get_offer(&tx, &record.offer_id)?
            .ok_or_else(|| CreditError::OfferNotFound(record.offer_id.clone()))?;
        if offer.seller_id != seller_id {
            return Err(CreditError::permission(seller_id, "transaction"));
        }
        if record.status != TxStatus::Pending {
            return Err(CreditError::TransactionStatus);
        }

        let changed = db::close_transaction(&tx, tx_id, TxStatus::Denied, chrono::Utc::now())?;
        if changed == 0 {
            return Err(CreditError::TransactionStatus);
        }
        tx.commit()?;

        info!(tx_id, seller_id, "transaction denied");
        Ok(())
    }

    pub fn transaction(&self, tx_id: &str) -> CreditResult<Transaction> {
        db::get_transaction(&self.conn, tx_id)?
            .ok_or_else(|| CreditError::TransactionNotFound(tx_id.to_string()))
    }

    /// Resolve the seller of a transaction through its offer.
    pub fn transaction_seller(&self, tx_id: &str) -> CreditResult<String> {
        let record = self.transaction(tx_id)?;
        Ok(self.offer(&record.offer_id)?.seller_id)
    }
}

// ============================================================================
// TESTS
// ============================================================================
