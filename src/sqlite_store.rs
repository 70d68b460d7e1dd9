use crate::error::StoreError;
use crate::identity::{short_id_for, IdentityStore};
use crate::player::AccountId;
use rusqlite::{Connection, OptionalExtension};
use std::sync::Mutex;

/// SQLite-backed identity store.
pub struct SqliteIdentityStore {
    conn: Mutex<Connection>,
}

impl SqliteIdentityStore {
    /// Open (or create) a SQLite database at the given path.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS players (
                account_id INTEGER PRIMARY KEY,
                short_id TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL
            );",
        )?;
        Ok(SqliteIdentityStore { conn: Mutex::new(conn) })
    }
}

// SQLite integers are signed; account ids are stored bit-for-bit.
fn to_sql(account: AccountId) -> i64 {
    account as i64
}

fn from_sql(raw: i64) -> AccountId {
    raw as AccountId
}

impl IdentityStore for SqliteIdentityStore {
    fn resolve_or_create(&self, account: AccountId, display_name: &str) -> Result<String, StoreError> {
        let short_id = short_id_for(account)?;
        let conn = self.conn.lock().map_err(|_| StoreError::LockError)?;
        conn.execute(
            "INSERT INTO players (account_id, short_id, name) VALUES (?1, ?2, ?3)
             ON CONFLICT(account_id) DO UPDATE SET name = excluded.name",
            rusqlite::params![to_sql(account), short_id, display_name],
        )?;
        Ok(short_id)
    }

    fn lookup_short_id(&self, account: AccountId) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockError)?;
        let short_id = conn
            .query_row(
                "SELECT short_id FROM players WHERE account_id = ?1",
                rusqlite::params![to_sql(account)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(short_id)
    }

    fn lookup_name_by_short_id(&self, short_id: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockError)?;
        let name = conn
            .query_row(
                "SELECT name FROM players WHERE short_id = ?1",
                rusqlite::params![short_id.trim()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(name)
    }

    fn lookup_account_by_short_id(&self, short_id: &str) -> Result<Option<AccountId>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockError)?;
        let account: Option<i64> = conn
            .query_row(
                "SELECT account_id FROM players WHERE short_id = ?1",
                rusqlite::params![short_id.trim()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(account.map(from_sql))
    }
}
