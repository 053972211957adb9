//! Account operations

use rusqlite::{params, OptionalExtension};

use super::{now_timestamp, parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{Account, NewAccount, DEFAULT_CURRENCY};

impl Database {
    /// Find an account by type and last four digits, creating it if missing
    pub fn upsert_account(
        &self,
        user_id: i64,
        account_type: &str,
        number_last4: &str,
    ) -> Result<i64> {
        let conn = self.conn()?;

        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM accounts WHERE user_id = ? AND account_type = ? AND number_last4 = ?",
                params![user_id, account_type, number_last4],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(id) = existing {
            return Ok(id);
        }

        let name = format!("{} •••• {}", account_type, number_last4);
        conn.execute(
            "INSERT INTO accounts (user_id, name, account_type, number_last4, currency, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                user_id,
                name,
                account_type,
                number_last4,
                DEFAULT_CURRENCY,
                now_timestamp()
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Create an account from user input
    pub fn create_account(&self, user_id: i64, account: &NewAccount) -> Result<Account> {
        let name = account.name.trim();
        if name.is_empty() {
            return Err(Error::Validation("Account name is required".into()));
        }
        let currency = account.currency.trim().to_uppercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(Error::Validation(format!(
                "Invalid currency code: {}",
                account.currency
            )));
        }
        let number_last4 = account.number_last4.as_deref().map(last4);

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO accounts (user_id, name, institution, account_type, number_last4, currency, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                user_id,
                name,
                account.institution,
                account.account_type,
                number_last4,
                currency,
                now_timestamp()
            ],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);

        self.get_account(user_id, id)?
            .ok_or_else(|| Error::NotFound(format!("Account {}", id)))
    }

    /// List a user's accounts
    pub fn list_accounts(&self, user_id: i64) -> Result<Vec<Account>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, name, institution, account_type, number_last4, currency, created_at
             FROM accounts WHERE user_id = ? ORDER BY name",
        )?;

        let accounts = stmt
            .query_map(params![user_id], Self::row_to_account)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(accounts)
    }

    /// Get one of a user's accounts by ID
    pub fn get_account(&self, user_id: i64, id: i64) -> Result<Option<Account>> {
        let conn = self.conn()?;
        let account = conn
            .query_row(
                "SELECT id, user_id, name, institution, account_type, number_last4, currency, created_at
                 FROM accounts WHERE user_id = ? AND id = ?",
                params![user_id, id],
                Self::row_to_account,
            )
            .optional()?;
        Ok(account)
    }

    fn row_to_account(row: &rusqlite::Row) -> rusqlite::Result<Account> {
        let created_at_str: String = row.get(7)?;
        Ok(Account {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            institution: row.get(3)?,
            account_type: row.get(4)?,
            number_last4: row.get(5)?,
            currency: row.get(6)?,
            created_at: parse_datetime(&created_at_str),
        })
    }
}

/// Keep only the last four characters of an account number
fn last4(number: &str) -> String {
    let trimmed = number.trim();
    let chars: Vec<char> = trimmed.chars().collect();
    chars[chars.len().saturating_sub(4)..].iter().collect()
}
