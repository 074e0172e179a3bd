// Persistent store for the mutual-credit ledger.
//
// Keyed CRUD plus the handful of aggregate queries the engine needs.
// Every statement is parameterized; nothing here enforces cross-entity
// invariants - that is the engine's job. Uniqueness constraints at this
// layer are the real source of truth for "already exists" races.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::entities::{Account, AccountLimits, Offer, Transaction, TxStatus};

pub fn setup_database(conn: &Connection) -> rusqlite::Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS accounts (
            id TEXT PRIMARY KEY,
            balance INTEGER NOT NULL,
            max_balance INTEGER NOT NULL,
            min_balance INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS offers (
            id TEXT PRIMARY KEY,
            seller_id TEXT NOT NULL,
            description TEXT NOT NULL,
            price INTEGER NOT NULL,
            title TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS offer_tags (
            offer_id TEXT NOT NULL,
            tag TEXT NOT NULL,
            PRIMARY KEY (offer_id, tag)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS transactions (
            id TEXT PRIMARY KEY,
            buyer_id TEXT NOT NULL,
            offer_id TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            closed_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_offers_seller ON offers(seller_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tx_buyer_status ON transactions(buyer_id, status)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tx_offer ON transactions(offer_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// ACCOUNTS
// ============================================================================

pub fn insert_account(conn: &Connection, account: &Account) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO accounts (id, balance, max_balance, min_balance)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            account.id,
            account.balance,
            account.limits.max_balance,
            account.limits.min_balance,
        ],
    )?;
    Ok(())
}

pub fn get_account(conn: &Connection, account_id: &str) -> rusqlite::Result<Option<Account>> {
    conn.query_row(
        "SELECT id, balance, max_balance, min_balance
         FROM accounts
         WHERE id = ?1",
        params![account_id],
        |row| {
            Ok(Account {
                id: row.get(0)?,
                balance: row.get(1)?,
                limits: AccountLimits {
                    max_balance: row.get(2)?,
                    min_balance: row.get(3)?,
                },
            })
        },
    )
    .optional()
}

pub fn update_account_balance(
    conn: &Connection,
    account_id: &str,
    balance: i64,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE accounts SET balance = ?1 WHERE id = ?2",
        params![balance, account_id],
    )
}

pub fn delete_account(conn: &Connection, account_id: &str) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM accounts WHERE id = ?1", params![account_id])
}

// ============================================================================
// OFFERS & TAGS
// ============================================================================

pub fn insert_offer(conn: &Connection, offer: &Offer) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO offers (id, seller_id, description, price, title)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            offer.id,
            offer.seller_id,
            offer.description,
            offer.price,
            offer.title,
        ],
    )?;
    Ok(())
}

fn offer_from_row(row: &Row<'_>) -> rusqlite::Result<Offer> {
    Ok(Offer {
        id: row.get(0)?,
        seller_id: row.get(1)?,
        description: row.get(2)?,
        price: row.get(3)?,
        title: row.get(4)?,
    })
}

pub fn get_offer(conn: &Connection, offer_id: &str) -> rusqlite::Result<Option<Offer>> {
    conn.query_row(
        "SELECT id, seller_id, description, price, title
         FROM offers
         WHERE id = ?1",
        params![offer_id],
        offer_from_row,
    )
    .optional()
}

/// Offers in insertion order; unknown sellers yield an empty list.
pub fn get_offers_by_seller(conn: &Connection, seller_id: &str) -> rusqlite::Result<Vec<Offer>> {
    let mut stmt = conn.prepare(
        "SELECT id, seller_id, description, price, title
         FROM offers
         WHERE seller_id = ?1
         ORDER BY rowid",
    )?;

    let offers = stmt
        .query_map(params![seller_id], offer_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(offers)
}

pub fn get_offers_by_tag(conn: &Connection, tag: &str) -> rusqlite::Result<Vec<Offer>> {
    let mut stmt = conn.prepare(
        "SELECT o.id, o.seller_id, o.description, o.price, o.title
         FROM offers o
         JOIN offer_tags t ON t.offer_id = o.id
         WHERE t.tag = ?1
         ORDER BY o.rowid",
    )?;

    let offers = stmt
        .query_map(params![tag], offer_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(offers)
}

pub fn delete_offer(conn: &Connection, offer_id: &str) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM offers WHERE id = ?1", params![offer_id])
}

pub fn count_offers_by_seller(conn: &Connection, seller_id: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM offers WHERE seller_id = ?1",
        params![seller_id],
        |row| row.get(0),
    )
}

/// Tag insert is idempotent at the store level: the (offer_id, tag) primary
/// key plus OR IGNORE makes a duplicate add a no-op.
pub fn insert_offer_tag(conn: &Connection, offer_id: &str, tag: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT OR IGNORE INTO offer_tags (offer_id, tag) VALUES (?1, ?2)",
        params![offer_id, tag],
    )
}

pub fn delete_offer_tag(conn: &Connection, offer_id: &str, tag: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM offer_tags WHERE offer_id = ?1 AND tag = ?2",
        params![offer_id, tag],
    )
}

pub fn delete_tags_for_offer(conn: &Connection, offer_id: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM offer_tags WHERE offer_id = ?1",
        params![offer_id],
    )
}

pub fn get_offer_tags(conn: &Connection, offer_id: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT tag FROM offer_tags
         WHERE offer_id = ?1
         ORDER BY tag",
    )?;

    let tags = stmt
        .query_map(params![offer_id], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(tags)
}

// ============================================================================
// TRANSACTIONS
// ============================================================================

pub fn insert_transaction(conn: &Connection, tx: &Transaction) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO transactions (id, buyer_id, offer_id, status, created_at, closed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            tx.id,
            tx.buyer_id,
            tx.offer_id,
            tx.status.as_str(),
            tx.created_at.to_rfc3339(),
            tx.closed_at.map(|dt| dt.to_rfc3339()),
        ],
    )?;
    Ok(())
}

fn parse_timestamp(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn tx_from_row(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    let status: String = row.get(3)?;
    let created_at: String = row.get(4)?;
    let closed_at: Option<String> = row.get(5)?;

    Ok(Transaction {
        id: row.get(0)?,
        buyer_id: row.get(1)?,
        offer_id: row.get(2)?,
        status: status
            .parse::<TxStatus>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?,
        created_at: parse_timestamp(4, created_at)?,
        closed_at: closed_at.map(|s| parse_timestamp(5, s)).transpose()?,
    })
}

pub fn get_transaction(conn: &Connection, tx_id: &str) -> rusqlite::Result<Option<Transaction>> {
    conn.query_row(
        "SELECT id, buyer_id, offer_id, status, created_at, closed_at
         FROM transactions
         WHERE id = ?1",
        params![tx_id],
        tx_from_row,
    )
    .optional()
}

/// Compare-and-set close: flips the status and stamps `closed_at` only if the
/// row is still PENDING. Returns the number of rows changed - 0 means some
/// other caller already closed it.
pub fn close_transaction(
    conn: &Connection,
    tx_id: &str,
    status: TxStatus,
    closed_at: DateTime<Utc>,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE transactions
         SET status = ?1, closed_at = ?2
         WHERE id = ?3 AND status = 'PENDING'",
        params![status.as_str(), closed_at.to_rfc3339(), tx_id],
    )
}

/// Pending buy requests where the account is the buyer.
pub fn get_pending_for_buyer(
    conn: &Connection,
    account_id: &str,
) -> rusqlite::Result<Vec<Transaction>> {
    let mut stmt = conn.prepare(
        "SELECT id, buyer_id, offer_id, status, created_at, closed_at
         FROM transactions
         WHERE buyer_id = ?1 AND status = 'PENDING'
         ORDER BY rowid",
    )?;

    let txs = stmt
        .query_map(params![account_id], tx_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(txs)
}

/// Pending sales: the seller side is derived through the offer.
pub fn get_pending_for_seller(
    conn: &Connection,
    account_id: &str,
) -> rusqlite::Result<Vec<Transaction>> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.buyer_id, t.offer_id, t.status, t.created_at, t.closed_at
         FROM transactions t
         JOIN offers o ON o.id = t.offer_id
         WHERE o.seller_id = ?1 AND t.status = 'PENDING'
         ORDER BY t.rowid",
    )?;

    let txs = stmt
        .query_map(params![account_id], tx_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(txs)
}

/// Sum of prices the account has committed to across its own pending buys.
pub fn total_pending_debits(conn: &Connection, account_id: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COALESCE(SUM(o.price), 0)
         FROM transactions t
         JOIN offers o ON o.id = t.offer_id
         WHERE t.buyer_id = ?1 AND t.status = 'PENDING'",
        params![account_id],
        |row| row.get(0),
    )
}

/// Sum of prices that may still land in the account from pending sales.
pub fn total_pending_credits(conn: &Connection, account_id: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COALESCE(SUM(o.price), 0)
         FROM transactions t
         JOIN offers o ON o.id = t.offer_id
         WHERE o.seller_id = ?1 AND t.status = 'PENDING'",
        params![account_id],
        |row| row.get(0),
    )
}

pub fn count_pending_for_offer(conn: &Connection, offer_id: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM transactions WHERE offer_id = ?1 AND status = 'PENDING'",
        params![offer_id],
        |row| row.get(0),
    )
}

/// Pending transactions the account is party to, on either side.
pub fn count_open_transactions_for_account(
    conn: &Connection,
    account_id: &str,
) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*)
         FROM transactions t
         LEFT JOIN offers o ON o.id = t.offer_id
         WHERE t.status = 'PENDING' AND (t.buyer_id = ?1 OR o.seller_id = ?1)",
        params![account_id],
        |row| row.get(0),
    )
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_account_round_trip() {
        let conn = test_conn();
        let account = Account::new("alice", AccountLimits::new(-100, 100));

        insert_account(&conn, &account).unwrap();
        let loaded = get_account(&conn, "alice").unwrap().unwrap();

        assert_eq!(loaded, account);
        assert!(get_account(&conn, "nobody").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_account_hits_constraint() {
        let conn = test_conn();
        let account = Account::new("alice", AccountLimits::default());

        insert_account(&conn, &account).unwrap();
        let err = insert_account(&conn, &account).unwrap_err();

        match err {
            rusqlite::Error::SqliteFailure(e, _) => {
                assert_eq!(e.code, rusqlite::ErrorCode::ConstraintViolation);
            }
            other => panic!("expected constraint violation, got {other:?}"),
        }
    }

    #[test]
    fn test_tag_insert_is_idempotent() {
        let conn = test_conn();

        assert_eq!(insert_offer_tag(&conn, "offer-1", "food").unwrap(), 1);
        assert_eq!(insert_offer_tag(&conn, "offer-1", "food").unwrap(), 0);
        assert_eq!(get_offer_tags(&conn, "offer-1").unwrap(), vec!["food"]);

        // removing a missing tag changes nothing
        assert_eq!(delete_offer_tag(&conn, "offer-1", "garden").unwrap(), 0);
    }

    #[test]
    fn test_close_transaction_cas() {
        let conn = test_conn();
        let tx = Transaction::pending("buyer", "offer-1");
        insert_transaction(&conn, &tx).unwrap();

        let now = Utc::now();
        assert_eq!(
            close_transaction(&conn, &tx.id, TxStatus::Approved, now).unwrap(),
            1
        );
        // second close loses the race: row is no longer PENDING
        assert_eq!(
            close_transaction(&conn, &tx.id, TxStatus::Cancelled, now).unwrap(),
            0
        );

        let loaded = get_transaction(&conn, &tx.id).unwrap().unwrap();
        assert_eq!(loaded.status, TxStatus::Approved);
        assert!(loaded.closed_at.is_some());
    }

    #[test]
    fn test_pending_aggregates() {
        let conn = test_conn();

        let offer_a = Offer::new("seller", "veg box", 30, "veg");
        let offer_b = Offer::new("seller", "bike repair", 45, "repair");
        insert_offer(&conn, &offer_a).unwrap();
        insert_offer(&conn, &offer_b).unwrap();

        insert_transaction(&conn, &Transaction::pending("buyer", &offer_a.id)).unwrap();
        insert_transaction(&conn, &Transaction::pending("buyer", &offer_b.id)).unwrap();

        let mut closed = Transaction::pending("buyer", &offer_a.id);
        closed.status = TxStatus::Cancelled;
        closed.closed_at = Some(Utc::now());
        insert_transaction(&conn, &closed).unwrap();

        // only PENDING rows count toward either aggregate
        assert_eq!(total_pending_debits(&conn, "buyer").unwrap(), 75);
        assert_eq!(total_pending_credits(&conn, "seller").unwrap(), 75);
        assert_eq!(total_pending_debits(&conn, "seller").unwrap(), 0);
        assert_eq!(count_pending_for_offer(&conn, &offer_a.id).unwrap(), 1);
        assert_eq!(count_open_transactions_for_account(&conn, "buyer").unwrap(), 2);
        assert_eq!(count_open_transactions_for_account(&conn, "seller").unwrap(), 2);
    }

    #[test]
    fn test_offers_by_seller_insertion_order() {
        let conn = test_conn();

        let first = Offer::new("seller", "a", 1, "first");
        let second = Offer::new("seller", "b", 2, "second");
        insert_offer(&conn, &first).unwrap();
        insert_offer(&conn, &second).unwrap();

        let offers = get_offers_by_seller(&conn, "seller").unwrap();
        assert_eq!(offers.len(), 2);
        assert_eq!(offers[0].title, "first");
        assert_eq!(offers[1].title, "second");

        assert!(get_offers_by_seller(&conn, "stranger").unwrap().is_empty());
    }

    #[test]
    fn test_offers_by_tag() {
        let conn = test_conn();

        let offer = Offer::new("seller", "veg box", 30, "veg");
        insert_offer(&conn, &offer).unwrap();
        insert_offer_tag(&conn, &offer.id, "food").unwrap();

        let tagged = get_offers_by_tag(&conn, "food").unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].id, offer.id);
        assert!(get_offers_by_tag(&conn, "tools").unwrap().is_empty());
    }
}
