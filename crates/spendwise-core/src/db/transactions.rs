//! Transaction operations

use chrono::NaiveDate;
use rusqlite::{params, params_from_iter, OptionalExtension};

use super::recurring::INVALIDATE_SNAPSHOT_SQL;
use super::transaction_filter::TransactionFilter;
use super::{now_timestamp, parse_date, parse_datetime, Database};
use crate::error::Result;
use crate::merchant;
use crate::models::{CategorySource, NewTransaction, Transaction, UNCATEGORIZED};

const TRANSACTION_COLUMNS: &str = "t.id, t.user_id, t.account_id, t.date, t.description_raw, \
     t.merchant_key, t.amount, t.currency, t.category, t.category_source, t.note_user, \
     t.is_expense, t.created_at";

/// Result of inserting a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionInsertResult {
    /// Transaction was inserted successfully, contains new transaction ID
    Inserted(i64),
    /// Transaction was a duplicate, contains existing transaction ID
    Duplicate(i64),
}

/// User edit of a transaction's date and/or amount
#[derive(Debug, Clone, Default)]
pub struct TransactionUpdate {
    pub date: Option<NaiveDate>,
    pub amount: Option<f64>,
}

impl Database {
    /// Insert a transaction, skipping it when `import_hash` is already present
    ///
    /// The merchant key is derived here so every stored row carries one.
    /// Any insert invalidates the user's recurring snapshot.
    pub fn insert_transaction(
        &self,
        user_id: i64,
        account_id: Option<i64>,
        tx: &NewTransaction,
        import_hash: Option<&str>,
    ) -> Result<TransactionInsertResult> {
        let conn = self.conn()?;

        if let Some(hash) = import_hash {
            let existing: Option<i64> = conn
                .query_row(
                    "SELECT id FROM transactions WHERE import_hash = ?",
                    params![hash],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(existing_id) = existing {
                return Ok(TransactionInsertResult::Duplicate(existing_id));
            }
        }

        let (category, source) = match &tx.category {
            Some(category) => (category.as_str(), CategorySource::User),
            None => (UNCATEGORIZED, CategorySource::Uncategorized),
        };

        conn.execute(
            r#"
            INSERT INTO transactions (user_id, account_id, date, description_raw, merchant_key,
                amount, currency, category, category_source, note_user, is_expense, import_hash,
                created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                user_id,
                account_id,
                tx.date.to_string(),
                tx.description_raw,
                merchant::normalize(&tx.description_raw),
                tx.amount,
                tx.currency,
                category,
                source.as_str(),
                tx.note_user,
                tx.amount < 0.0,
                import_hash,
                now_timestamp(),
            ],
        )?;
        let id = conn.last_insert_rowid();

        conn.execute(
            INVALIDATE_SNAPSHOT_SQL,
            params![user_id],
        )?;

        Ok(TransactionInsertResult::Inserted(id))
    }

    /// Get one of a user's transactions by ID
    pub fn get_transaction(&self, user_id: i64, id: i64) -> Result<Option<Transaction>> {
        let conn = self.conn()?;
        let tx = conn
            .query_row(
                &format!(
                    "SELECT {} FROM transactions t WHERE t.user_id = ? AND t.id = ?",
                    TRANSACTION_COLUMNS
                ),
                params![user_id, id],
                Self::row_to_transaction,
            )
            .optional()?;
        Ok(tx)
    }

    /// Get the subset of `ids` that belong to the user, ordered by ID
    pub fn get_transactions_by_ids(&self, user_id: i64, ids: &[i64]) -> Result<Vec<Transaction>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn()?;
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM transactions t WHERE t.user_id = ? AND t.id IN ({}) ORDER BY t.id",
            TRANSACTION_COLUMNS, placeholders
        );

        let mut query_params: Vec<i64> = Vec::with_capacity(ids.len() + 1);
        query_params.push(user_id);
        query_params.extend_from_slice(ids);

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(query_params), Self::row_to_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// All of a user's transactions, oldest first
    pub fn list_user_transactions(&self, user_id: i64) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM transactions t WHERE t.user_id = ? ORDER BY t.date, t.id",
            TRANSACTION_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![user_id], Self::row_to_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// IDs of the user's transactions still marked uncategorized
    pub fn list_uncategorized_ids(&self, user_id: i64) -> Result<Vec<i64>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id FROM transactions WHERE user_id = ? AND category_source = 'uncategorized'
             ORDER BY id",
        )?;
        let ids = stmt
            .query_map(params![user_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    /// The user's most recent transactions for one merchant key
    pub fn merchant_transactions(
        &self,
        user_id: i64,
        merchant_key: &str,
        limit: usize,
    ) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM transactions t WHERE t.user_id = ? AND t.merchant_key = ?
             ORDER BY t.date DESC, t.id DESC LIMIT ?",
            TRANSACTION_COLUMNS
        ))?;
        let rows = stmt
            .query_map(
                params![user_id, merchant_key, limit as i64],
                Self::row_to_transaction,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Record an AI category on every uncategorized transaction of a merchant.
    ///
    /// Returns the number of rows changed.
    pub fn apply_ai_category_to_merchant(
        &self,
        user_id: i64,
        merchant_key: &str,
        category: &str,
        note: Option<&str>,
    ) -> Result<usize> {
        let conn = self.conn()?;
        let updated = conn.execute(
            r#"
            UPDATE transactions
            SET category = ?, category_source = 'ai', note_user = COALESCE(note_user, ?)
            WHERE user_id = ? AND merchant_key = ? AND category_source = 'uncategorized'
            "#,
            params![category, note, user_id, merchant_key],
        )?;
        Ok(updated)
    }

    /// Record an AI category on a transaction.
    ///
    /// The `category_source != 'user'` guard lives in the UPDATE itself so a
    /// human edit landing mid-batch still wins. A suggested note only fills an
    /// empty `note_user`. Returns whether the row changed.
    pub fn apply_ai_category(
        &self,
        user_id: i64,
        id: i64,
        category: &str,
        note: Option<&str>,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            r#"
            UPDATE transactions
            SET category = ?, category_source = 'ai', note_user = COALESCE(note_user, ?)
            WHERE user_id = ? AND id = ? AND category_source != 'user'
            "#,
            params![category, note, user_id, id],
        )?;
        Ok(updated > 0)
    }

    /// Set a category chosen by the user (source becomes `user`)
    pub fn set_transaction_category(
        &self,
        user_id: i64,
        id: i64,
        category: &str,
    ) -> Result<Option<Transaction>> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE transactions SET category = ?, category_source = 'user' WHERE user_id = ? AND id = ?",
            params![category, user_id, id],
        )?;
        drop(conn);
        self.get_transaction(user_id, id)
    }

    /// Set or clear the user's note
    pub fn set_transaction_note(
        &self,
        user_id: i64,
        id: i64,
        note: Option<&str>,
    ) -> Result<Option<Transaction>> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE transactions SET note_user = ? WHERE user_id = ? AND id = ?",
            params![note, user_id, id],
        )?;
        drop(conn);
        self.get_transaction(user_id, id)
    }

    /// Apply a date/amount edit; `is_expense` follows the new amount
    pub fn update_transaction(
        &self,
        user_id: i64,
        id: i64,
        update: &TransactionUpdate,
    ) -> Result<Option<Transaction>> {
        let conn = self.conn()?;
        if let Some(date) = update.date {
            conn.execute(
                "UPDATE transactions SET date = ? WHERE user_id = ? AND id = ?",
                params![date.to_string(), user_id, id],
            )?;
        }
        if let Some(amount) = update.amount {
            conn.execute(
                "UPDATE transactions SET amount = ?, is_expense = ? WHERE user_id = ? AND id = ?",
                params![amount, amount < 0.0, user_id, id],
            )?;
        }
        if update.date.is_some() || update.amount.is_some() {
            conn.execute(
                INVALIDATE_SNAPSHOT_SQL,
                params![user_id],
            )?;
        }
        drop(conn);
        self.get_transaction(user_id, id)
    }

    /// One page of filtered transactions, newest first
    pub fn search_transactions(
        &self,
        user_id: i64,
        filter: &TransactionFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let mut built = filter.build(user_id);

        let sql = format!(
            "SELECT {} FROM transactions t {} ORDER BY t.date DESC, t.id DESC LIMIT ? OFFSET ?",
            TRANSACTION_COLUMNS, built.where_clause
        );

        built.params.push(Box::new(limit));
        built.params.push(Box::new(offset));
        let param_refs = built.params_refs();

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Every transaction matching the filter (for aggregates)
    pub fn filtered_transactions(
        &self,
        user_id: i64,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let built = filter.build(user_id);

        let sql = format!(
            "SELECT {} FROM transactions t {} ORDER BY t.date, t.id",
            TRANSACTION_COLUMNS, built.where_clause
        );

        let param_refs = built.params_refs();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Count transactions matching the filter
    pub fn count_transactions(&self, user_id: i64, filter: &TransactionFilter) -> Result<i64> {
        let conn = self.conn()?;
        let built = filter.build(user_id);
        let sql = format!("SELECT COUNT(*) FROM transactions t {}", built.where_clause);
        let param_refs = built.params_refs();
        let count = conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))?;
        Ok(count)
    }

    pub(crate) fn row_to_transaction(row: &rusqlite::Row) -> rusqlite::Result<Transaction> {
        let date_str: String = row.get(3)?;
        let source_str: String = row.get(9)?;
        let created_at_str: String = row.get(12)?;
        Ok(Transaction {
            id: row.get(0)?,
            user_id: row.get(1)?,
            account_id: row.get(2)?,
            date: parse_date(&date_str),
            description_raw: row.get(4)?,
            merchant_key: row.get(5)?,
            amount: row.get(6)?,
            currency: row.get(7)?,
            category: row.get(8)?,
            category_source: source_str.parse().unwrap_or_default(),
            note_user: row.get(10)?,
            is_expense: row.get(11)?,
            created_at: parse_datetime(&created_at_str),
        })
    }
}
