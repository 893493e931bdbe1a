//! SQLite record store: users, friends, transactions, splits, settlements.
//! Mutation-shaped operations run inside one SQLite transaction so callers
//! never observe a partially-applied settlement or a transaction without its
//! splits.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection};

use crate::currency::{Currency, RateTable};
use crate::error::Result;
use crate::ids::{FriendId, SettlementId, SplitId, TransactionId, UserId};
use crate::models::{
    Friend, LineItem, Settlement, SettlementDirection, Split, SplitAllocation, SplitMethod,
    Transaction, User,
};

const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct Store {
    conn: Connection,
}

/// Pending update to one split's settlement progress, applied atomically with
/// the settlement record that caused it.
#[derive(Clone, Debug)]
pub struct SplitPatch {
    pub split_id: SplitId,
    pub settled_amount: f64,
    pub is_settled: bool,
    pub settled_at: DateTime<Utc>,
}

impl Store {
    /// Open (and migrate) the database under the given directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        std::fs::create_dir_all(dir.as_ref())?;
        let db_path = dir.as_ref().join("aequum.db");
        tracing::debug!(?db_path, "storage::open");
        let conn = Connection::open(db_path)?;
        create_tables(&conn)?;
        Ok(Store { conn })
    }

    /// Fresh in-memory database, used by tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        create_tables(&conn)?;
        Ok(Store { conn })
    }

    // --- Users ---

    /// Insert a user together with their self friend as one atomic unit, so
    /// the "exactly one self friend per owner" invariant holds from creation.
    pub fn user_create(&mut self, user: &User, self_friend: &Friend) -> Result<()> {
        let tx = self.conn.transaction()?;
        insert_user(&tx, user)?;
        insert_friend(&tx, self_friend)?;
        tx.commit()?;
        Ok(())
    }

    pub fn user_get(&self, id: &UserId) -> Result<Option<User>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, email, phone, default_currency, created_at, updated_at
             FROM users WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![id.as_str()], map_user)?;
        Ok(rows.next().transpose()?)
    }

    pub fn user_update(&self, user: &User) -> Result<bool> {
        let affected = self.conn.execute(
            "UPDATE users SET name = ?2, email = ?3, phone = ?4, default_currency = ?5,
             updated_at = ?6 WHERE id = ?1",
            params![
                user.id.as_str(),
                user.name,
                user.email,
                user.phone,
                user.default_currency.as_str(),
                user.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(affected > 0)
    }

    // --- Friends ---

    pub fn friend_insert(&self, friend: &Friend) -> Result<()> {
        insert_friend(&self.conn, friend)
    }

    pub fn friend_get(&self, id: &FriendId) -> Result<Option<Friend>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM friends WHERE id = ?1",
            FRIEND_COLUMNS
        ))?;
        let mut rows = stmt.query_map(params![id.as_str()], map_friend)?;
        Ok(rows.next().transpose()?)
    }

    pub fn friends_by_owner(&self, owner: &UserId) -> Result<Vec<Friend>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM friends WHERE owner_id = ?1 ORDER BY created_at ASC",
            FRIEND_COLUMNS
        ))?;
        let rows = stmt.query_map(params![owner.as_str()], map_friend)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// The owner's self-reference friend record.
    pub fn self_friend(&self, owner: &UserId) -> Result<Option<Friend>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM friends WHERE owner_id = ?1 AND is_self = 1",
            FRIEND_COLUMNS
        ))?;
        let mut rows = stmt.query_map(params![owner.as_str()], map_friend)?;
        Ok(rows.next().transpose()?)
    }

    /// Dummy -> linked promotion. Refuses to overwrite an existing link.
    pub fn friend_set_linked_user(&self, id: &FriendId, linked: &UserId) -> Result<bool> {
        let affected = self.conn.execute(
            "UPDATE friends SET linked_user_id = ?2, is_dummy = 0, updated_at = ?3
             WHERE id = ?1 AND linked_user_id IS NULL",
            params![id.as_str(), linked.as_str(), Utc::now().to_rfc3339()],
        )?;
        Ok(affected > 0)
    }

    pub fn friend_delete(&self, id: &FriendId) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM friends WHERE id = ?1", params![id.as_str()])?;
        Ok(affected > 0)
    }

    pub fn friend_split_count(&self, id: &FriendId) -> Result<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM splits WHERE friend_id = ?1",
            params![id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // --- Transactions & splits ---

    /// Insert a transaction and all of its splits as one atomic unit.
    pub fn transaction_create(&mut self, txn: &Transaction, splits: &[Split]) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO transactions (id, creator_id, payer_friend_id, title, category,
             amount, currency, split_method, line_items_json, rate_snapshot_json,
             occurred_on, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                txn.id.as_str(),
                txn.creator_id.as_str(),
                txn.payer_friend_id.as_str(),
                txn.title,
                txn.category,
                txn.amount,
                txn.currency.as_str(),
                txn.split_method.as_str(),
                serde_json::to_string(&txn.line_items)?,
                serde_json::to_string(&txn.rate_snapshot)?,
                txn.occurred_on.format(DATE_FORMAT).to_string(),
                txn.created_at.to_rfc3339(),
            ],
        )?;
        for split in splits {
            tx.execute(
                "INSERT INTO splits (id, transaction_id, friend_id, amount, percent,
                 settled_amount, is_settled, settled_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    split.id.as_str(),
                    split.transaction_id.as_str(),
                    split.friend_id.as_str(),
                    split.amount,
                    split.percent,
                    split.settled_amount,
                    split.is_settled as i32,
                    split.settled_at.map(|t| t.to_rfc3339()),
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn transaction_get(&self, id: &TransactionId) -> Result<Option<Transaction>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM transactions WHERE id = ?1",
            TXN_COLUMNS
        ))?;
        let mut rows = stmt.query_map(params![id.as_str()], map_transaction)?;
        Ok(rows.next().transpose()?)
    }

    /// Delete a transaction and cascade to its splits.
    pub fn transaction_delete(&mut self, id: &TransactionId) -> Result<bool> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM splits WHERE transaction_id = ?1",
            params![id.as_str()],
        )?;
        let affected = tx.execute(
            "DELETE FROM transactions WHERE id = ?1",
            params![id.as_str()],
        )?;
        tx.commit()?;
        Ok(affected > 0)
    }

    pub fn splits_by_transaction(&self, id: &TransactionId) -> Result<Vec<Split>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM splits WHERE transaction_id = ?1",
            SPLIT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![id.as_str()], map_split)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn splits_by_friend(&self, id: &FriendId) -> Result<Vec<Split>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM splits WHERE friend_id = ?1",
            SPLIT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![id.as_str()], map_split)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn split_get(&self, id: &SplitId) -> Result<Option<Split>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM splits WHERE id = ?1", SPLIT_COLUMNS))?;
        let mut rows = stmt.query_map(params![id.as_str()], map_split)?;
        Ok(rows.next().transpose()?)
    }

    // --- Settlements ---

    /// Insert a settlement with its allocation breakdown and patch the
    /// touched splits, all as one atomic unit. A concurrent second settlement
    /// against the same friend serializes instead of double-allocating.
    pub fn settlement_commit(
        &mut self,
        settlement: &Settlement,
        patches: &[SplitPatch],
    ) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO settlements (id, creator_id, friend_id, amount, currency, direction,
             note, balance_before, rate_snapshot_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                settlement.id.as_str(),
                settlement.creator_id.as_str(),
                settlement.friend_id.as_str(),
                settlement.amount,
                settlement.currency.as_str(),
                settlement.direction.as_str(),
                settlement.note,
                settlement.balance_before,
                settlement
                    .rate_snapshot
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                settlement.created_at.to_rfc3339(),
            ],
        )?;
        for allocation in &settlement.allocations {
            tx.execute(
                "INSERT INTO settlement_allocations (settlement_id, split_id, amount_applied,
                 fully_settled) VALUES (?1, ?2, ?3, ?4)",
                params![
                    settlement.id.as_str(),
                    allocation.split_id.as_str(),
                    allocation.amount_applied,
                    allocation.fully_settled as i32,
                ],
            )?;
        }
        for patch in patches {
            tx.execute(
                "UPDATE splits SET settled_amount = ?2, is_settled = ?3, settled_at = ?4
                 WHERE id = ?1",
                params![
                    patch.split_id.as_str(),
                    patch.settled_amount,
                    patch.is_settled as i32,
                    patch.settled_at.to_rfc3339(),
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Settlements recorded by `creator` against `friend`, allocations
    /// included, oldest first.
    pub fn settlements_between(
        &self,
        creator: &UserId,
        friend: &FriendId,
    ) -> Result<Vec<Settlement>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, creator_id, friend_id, amount, currency, direction, note,
             balance_before, rate_snapshot_json, created_at
             FROM settlements WHERE creator_id = ?1 AND friend_id = ?2
             ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![creator.as_str(), friend.as_str()], map_settlement)?;
        let mut settlements = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        for settlement in &mut settlements {
            settlement.allocations = self.allocations_for(&settlement.id)?;
        }
        Ok(settlements)
    }

    fn allocations_for(&self, id: &SettlementId) -> Result<Vec<SplitAllocation>> {
        let mut stmt = self.conn.prepare(
            "SELECT split_id, amount_applied, fully_settled
             FROM settlement_allocations WHERE settlement_id = ?1 ORDER BY rowid ASC",
        )?;
        let rows = stmt.query_map(params![id.as_str()], |row| {
            Ok(SplitAllocation {
                split_id: id_col(row, 0)?,
                amount_applied: row.get(1)?,
                fully_settled: row.get::<_, i32>(2)? != 0,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT,
            phone TEXT,
            default_currency TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS friends (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            linked_user_id TEXT,
            name TEXT NOT NULL,
            email TEXT,
            phone TEXT,
            is_dummy INTEGER NOT NULL DEFAULT 0,
            is_self INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_friends_owner ON friends(owner_id);
        CREATE TABLE IF NOT EXISTS transactions (
            id TEXT PRIMARY KEY,
            creator_id TEXT NOT NULL,
            payer_friend_id TEXT NOT NULL,
            title TEXT NOT NULL,
            category TEXT NOT NULL,
            amount REAL NOT NULL,
            currency TEXT NOT NULL,
            split_method TEXT NOT NULL,
            line_items_json TEXT NOT NULL,
            rate_snapshot_json TEXT NOT NULL,
            occurred_on TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_transactions_creator ON transactions(creator_id);
        CREATE TABLE IF NOT EXISTS splits (
            id TEXT PRIMARY KEY,
            transaction_id TEXT NOT NULL,
            friend_id TEXT NOT NULL,
            amount REAL NOT NULL,
            percent REAL,
            settled_amount REAL,
            is_settled INTEGER NOT NULL DEFAULT 0,
            settled_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_splits_transaction ON splits(transaction_id);
        CREATE INDEX IF NOT EXISTS idx_splits_friend ON splits(friend_id);
        CREATE TABLE IF NOT EXISTS settlements (
            id TEXT PRIMARY KEY,
            creator_id TEXT NOT NULL,
            friend_id TEXT NOT NULL,
            amount REAL NOT NULL,
            currency TEXT NOT NULL,
            direction TEXT NOT NULL,
            note TEXT,
            balance_before REAL,
            rate_snapshot_json TEXT,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_settlements_friend ON settlements(creator_id, friend_id);
        CREATE TABLE IF NOT EXISTS settlement_allocations (
            settlement_id TEXT NOT NULL,
            split_id TEXT NOT NULL,
            amount_applied REAL NOT NULL,
            fully_settled INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_allocations_settlement ON settlement_allocations(settlement_id);
        "#,
    )?;
    Ok(())
}

fn insert_user(conn: &Connection, user: &User) -> Result<()> {
    conn.execute(
        "INSERT INTO users (id, name, email, phone, default_currency, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            user.id.as_str(),
            user.name,
            user.email,
            user.phone,
            user.default_currency.as_str(),
            user.created_at.to_rfc3339(),
            user.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn insert_friend(conn: &Connection, friend: &Friend) -> Result<()> {
    conn.execute(
        "INSERT INTO friends (id, owner_id, linked_user_id, name, email, phone, is_dummy,
         is_self, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            friend.id.as_str(),
            friend.owner_id.as_str(),
            friend.linked_user_id.as_ref().map(|id| id.as_str()),
            friend.name,
            friend.email,
            friend.phone,
            friend.is_dummy as i32,
            friend.is_self as i32,
            friend.created_at.to_rfc3339(),
            friend.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

// --- Row mapping ---

const FRIEND_COLUMNS: &str =
    "id, owner_id, linked_user_id, name, email, phone, is_dummy, is_self, created_at, updated_at";
const TXN_COLUMNS: &str = "id, creator_id, payer_friend_id, title, category, amount, currency, \
     split_method, line_items_json, rate_snapshot_json, occurred_on, created_at";
const SPLIT_COLUMNS: &str =
    "id, transaction_id, friend_id, amount, percent, settled_amount, is_settled, settled_at";

#[derive(Debug)]
struct CorruptColumn(&'static str, String);

impl fmt::Display for CorruptColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "corrupt {} value: {}", self.0, self.1)
    }
}

impl std::error::Error for CorruptColumn {}

fn corrupt(idx: usize, what: &'static str, value: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        Box::new(CorruptColumn(what, value)),
    )
}

fn ts_col(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| corrupt(idx, "timestamp", s))
}

fn opt_ts_col(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let s: Option<String> = row.get(idx)?;
    match s {
        None => Ok(None),
        Some(s) => DateTime::parse_from_rfc3339(&s)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|_| corrupt(idx, "timestamp", s)),
    }
}

fn date_col(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let s: String = row.get(idx)?;
    NaiveDate::parse_from_str(&s, DATE_FORMAT).map_err(|_| corrupt(idx, "date", s))
}

fn currency_col(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Currency> {
    let s: String = row.get(idx)?;
    Currency::from_str(&s).ok_or_else(|| corrupt(idx, "currency", s))
}

fn id_col<T: std::str::FromStr>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    T::from_str(&s).map_err(|_| corrupt(idx, "id", s))
}

fn opt_id_col<T: std::str::FromStr>(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<T>> {
    let s: Option<String> = row.get(idx)?;
    match s {
        None => Ok(None),
        Some(s) => T::from_str(&s).map(Some).map_err(|_| corrupt(idx, "id", s)),
    }
}

fn json_col<T: serde::de::DeserializeOwned>(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    serde_json::from_str(&s).map_err(|e| corrupt(idx, "json", e.to_string()))
}

fn map_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: id_col(row, 0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        default_currency: currency_col(row, 4)?,
        created_at: ts_col(row, 5)?,
        updated_at: ts_col(row, 6)?,
    })
}

fn map_friend(row: &rusqlite::Row<'_>) -> rusqlite::Result<Friend> {
    Ok(Friend {
        id: id_col(row, 0)?,
        owner_id: id_col(row, 1)?,
        linked_user_id: opt_id_col(row, 2)?,
        name: row.get(3)?,
        email: row.get(4)?,
        phone: row.get(5)?,
        is_dummy: row.get::<_, i32>(6)? != 0,
        is_self: row.get::<_, i32>(7)? != 0,
        created_at: ts_col(row, 8)?,
        updated_at: ts_col(row, 9)?,
    })
}

fn map_transaction(row: &rusqlite::Row<'_>) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: id_col(row, 0)?,
        creator_id: id_col(row, 1)?,
        payer_friend_id: id_col(row, 2)?,
        title: row.get(3)?,
        category: row.get(4)?,
        amount: row.get(5)?,
        currency: currency_col(row, 6)?,
        split_method: {
            let s: String = row.get(7)?;
            SplitMethod::from_str(&s).ok_or_else(|| corrupt(7, "split_method", s))?
        },
        line_items: json_col::<Vec<LineItem>>(row, 8)?,
        rate_snapshot: json_col::<RateTable>(row, 9)?,
        occurred_on: date_col(row, 10)?,
        created_at: ts_col(row, 11)?,
    })
}

fn map_split(row: &rusqlite::Row<'_>) -> rusqlite::Result<Split> {
    Ok(Split {
        id: id_col(row, 0)?,
        transaction_id: id_col(row, 1)?,
        friend_id: id_col(row, 2)?,
        amount: row.get(3)?,
        percent: row.get(4)?,
        settled_amount: row.get(5)?,
        is_settled: row.get::<_, i32>(6)? != 0,
        settled_at: opt_ts_col(row, 7)?,
    })
}

fn map_settlement(row: &rusqlite::Row<'_>) -> rusqlite::Result<Settlement> {
    Ok(Settlement {
        id: id_col(row, 0)?,
        creator_id: id_col(row, 1)?,
        friend_id: id_col(row, 2)?,
        amount: row.get(3)?,
        currency: currency_col(row, 4)?,
        direction: {
            let s: String = row.get(5)?;
            SettlementDirection::from_str(&s).ok_or_else(|| corrupt(5, "direction", s))?
        },
        note: row.get(6)?,
        balance_before: row.get(7)?,
        rate_snapshot: {
            let s: Option<String> = row.get(8)?;
            s.map(|s| serde_json::from_str(&s).map_err(|e| corrupt(8, "json", e.to_string())))
                .transpose()?
        },
        allocations: Vec::new(),
        created_at: ts_col(row, 9)?,
    })
}
