//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `accounts` - Bank accounts transactions are imported into
//! - `transactions` - Transaction inserts, lookups and user edits
//! - `transaction_filter` - Dynamic WHERE clauses for the filtered view
//! - `merchant_cache` - Per-user merchant categorization cache
//! - `categories` - Per-user category allow-list and its cascades
//! - `recurring` - Recurring detection snapshots

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use tracing::info;

use crate::error::{Error, Result};

mod accounts;
mod categories;
mod merchant_cache;
mod recurring;
mod recurring_insights;
mod transaction_filter;
mod transactions;

#[cfg(test)]
mod tests;

pub use categories::{DEFAULT_CATEGORIES, SYSTEM_CATEGORY};
pub use merchant_cache::CacheSuggestion;
pub use recurring::RecurringSnapshot;
pub use transaction_filter::{DateRange, FilterResult, TransactionFilter};
pub use transactions::{TransactionInsertResult, TransactionUpdate};

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Environment variable for database encryption key
pub const DB_KEY_ENV: &str = "SPENDWISE_DB_KEY";

/// Derive an encryption key from a passphrase using Argon2
///
/// Uses a fixed application salt so the same passphrase always produces the same key,
/// regardless of database path.
fn derive_key(passphrase: &str) -> Result<String> {
    use argon2::{password_hash::SaltString, Argon2, PasswordHasher};

    // Fixed application salt - changing this would invalidate all existing encrypted databases
    const APP_SALT: &[u8; 16] = b"spendwise-salt-1";

    let salt = SaltString::encode_b64(APP_SALT)
        .map_err(|e| Error::Encryption(format!("Failed to create salt: {}", e)))?;

    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| Error::Encryption(format!("Failed to derive key: {}", e)))?;

    let hash_str = hash
        .hash
        .ok_or_else(|| Error::Encryption("No hash output".to_string()))?;
    Ok(hex::encode(hash_str.as_bytes()))
}

/// Current time as stored in timestamp columns.
///
/// Microsecond RFC 3339 in UTC, so string comparison orders correctly.
pub(crate) fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp (RFC 3339, or SQLite's "YYYY-MM-DD HH:MM:SS")
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|dt| dt.and_utc())
        })
        .unwrap_or_else(|_| Utc::now())
}

/// Parse a stored calendar date ("YYYY-MM-DD")
pub(crate) fn parse_date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap_or_default()
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
}

impl Database {
    /// Create a new database connection pool with encryption
    ///
    /// Requires `SPENDWISE_DB_KEY` environment variable to be set.
    /// Returns an error if it is not; use `new_unencrypted()` for development.
    pub fn new(path: &str) -> Result<Self> {
        match std::env::var(DB_KEY_ENV).ok() {
            Some(key) => Self::new_with_key(path, Some(&key)),
            None => Err(Error::Encryption(format!(
                "Database encryption required. Set {} environment variable with your passphrase, \
                or use --no-encrypt for unencrypted databases.",
                DB_KEY_ENV
            ))),
        }
    }

    /// Create a new unencrypted database connection pool
    pub fn new_unencrypted(path: &str) -> Result<Self> {
        Self::new_with_key(path, None)
    }

    /// Create a new database with an explicit encryption key
    pub fn new_with_key(path: &str, passphrase: Option<&str>) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);

        let pool = if let Some(pass) = passphrase {
            let key = derive_key(pass)?;
            let key_pragma = format!("PRAGMA key = 'x\"{}\"';", key);

            // Every pooled connection needs the key before first use
            let manager = manager.with_init(move |conn| {
                conn.execute_batch(&key_pragma)?;
                Ok(())
            });

            Pool::builder().max_size(10).build(manager)?
        } else {
            Pool::builder().max_size(10).build(manager)?
        };

        let db = Self {
            pool,
            db_path: path.to_string(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create a throwaway database (for testing)
    ///
    /// Note: Uses a temporary file rather than `:memory:` because each pooled
    /// connection would otherwise see its own empty database.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir()
            .join(format!("spendwise_test_{}_{}.db", std::process::id(), id))
            .to_string_lossy()
            .into_owned();

        // Remove any leftovers from an earlier run
        let _ = std::fs::remove_file(&path);

        Self::new_unencrypted(&path)
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            -- WAL: readers don't block the single writer
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;

            CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                institution TEXT,
                account_type TEXT,
                number_last4 TEXT,
                currency TEXT NOT NULL DEFAULT 'CAD',
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_accounts_user ON accounts(user_id);

            -- Transactions: only category, category_source, note_user, date and
            -- amount change after insert
            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                account_id INTEGER REFERENCES accounts(id),
                date TEXT NOT NULL,
                description_raw TEXT NOT NULL,
                merchant_key TEXT NOT NULL,
                amount REAL NOT NULL,
                currency TEXT NOT NULL DEFAULT 'CAD',
                category TEXT NOT NULL DEFAULT 'Uncategorized',
                category_source TEXT NOT NULL DEFAULT 'uncategorized',
                note_user TEXT,
                is_expense INTEGER NOT NULL,
                import_hash TEXT UNIQUE,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_transactions_user_expense_date
                ON transactions(user_id, is_expense, date);
            CREATE INDEX IF NOT EXISTS idx_transactions_user_merchant
                ON transactions(user_id, merchant_key);

            -- Per-user category allow-list ("Uncategorized" is never stored)
            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                name TEXT NOT NULL COLLATE NOCASE,
                color TEXT,
                sort_order INTEGER NOT NULL DEFAULT 0,
                is_system INTEGER NOT NULL DEFAULT 0,
                UNIQUE(user_id, name)
            );

            -- Merchant categorization cache, one row per (user, merchant key)
            CREATE TABLE IF NOT EXISTS merchant_cache (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                merchant_key TEXT NOT NULL,
                suggested_category TEXT NOT NULL,
                suggested_note TEXT,
                confidence TEXT NOT NULL DEFAULT 'low',
                explanation TEXT,
                created_at TEXT NOT NULL,
                last_used_at TEXT NOT NULL,
                UNIQUE(user_id, merchant_key)
            );

            -- Per-user snapshot marker. generation increases on every
            -- mutation; computed_at is NULL while the snapshot is stale.
            CREATE TABLE IF NOT EXISTS recurring_snapshots (
                user_id INTEGER PRIMARY KEY,
                generation INTEGER NOT NULL DEFAULT 0,
                config_key TEXT,
                computed_at TEXT
            );

            -- Snapshot rows; replaced wholesale on every recompute
            CREATE TABLE IF NOT EXISTS recurring_cache (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                merchant_key TEXT NOT NULL,
                merchant_name TEXT NOT NULL,
                category TEXT NOT NULL,
                frequency TEXT NOT NULL,
                typical_amount REAL NOT NULL,
                monthly_amount REAL NOT NULL,
                amount_variance TEXT NOT NULL,
                confidence TEXT NOT NULL,
                transaction_count INTEGER NOT NULL,
                interval_days REAL,
                first_transaction_date TEXT NOT NULL,
                last_transaction_date TEXT NOT NULL,
                next_expected_date TEXT,
                transaction_ids TEXT NOT NULL,      -- JSON array
                sample_descriptions TEXT NOT NULL,  -- JSON array
                UNIQUE(user_id, merchant_key)
            );

            -- Last generated recurring insights; JSON payload columns
            CREATE TABLE IF NOT EXISTS recurring_insights (
                user_id INTEGER PRIMARY KEY,
                summary TEXT NOT NULL,
                insights TEXT NOT NULL,
                upcoming TEXT NOT NULL,
                source TEXT NOT NULL,
                analyzed_at TEXT NOT NULL
            );
            "#,
        )?;

        info!(path = %self.db_path, "Database migrations complete");
        Ok(())
    }
}
