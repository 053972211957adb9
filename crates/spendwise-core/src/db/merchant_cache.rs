//! Merchant categorization cache operations
//!
//! One row per (user, merchant key). Writes are single-statement upserts so
//! concurrent categorizations of the same merchant never produce duplicates:
//! suggestion fields are last-writer-wins, while `last_used_at` only moves
//! forward.

use rusqlite::{params, OptionalExtension};

use super::{now_timestamp, parse_datetime, Database};
use crate::error::Result;
use crate::models::{Confidence, MerchantCacheEntry};

/// A validated categorization ready to be cached
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSuggestion {
    pub category: String,
    pub note: Option<String>,
    pub confidence: Confidence,
    pub explanation: Option<String>,
}

const CACHE_COLUMNS: &str = "id, user_id, merchant_key, suggested_category, suggested_note, \
     confidence, explanation, created_at, last_used_at";

impl Database {
    /// Look up a cached categorization
    pub fn get_cached_merchant(
        &self,
        user_id: i64,
        merchant_key: &str,
    ) -> Result<Option<MerchantCacheEntry>> {
        let conn = self.conn()?;
        let entry = conn
            .query_row(
                &format!(
                    "SELECT {} FROM merchant_cache WHERE user_id = ? AND merchant_key = ?",
                    CACHE_COLUMNS
                ),
                params![user_id, merchant_key],
                Self::row_to_cache_entry,
            )
            .optional()?;
        Ok(entry)
    }

    /// Insert or update a cached categorization, returning the stored row
    pub fn put_cached_merchant(
        &self,
        user_id: i64,
        merchant_key: &str,
        suggestion: &CacheSuggestion,
    ) -> Result<MerchantCacheEntry> {
        let conn = self.conn()?;
        let now = now_timestamp();

        conn.execute(
            r#"
            INSERT INTO merchant_cache (user_id, merchant_key, suggested_category, suggested_note,
                confidence, explanation, created_at, last_used_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, merchant_key) DO UPDATE SET
                suggested_category = excluded.suggested_category,
                suggested_note = excluded.suggested_note,
                confidence = excluded.confidence,
                explanation = excluded.explanation,
                last_used_at = MAX(merchant_cache.last_used_at, excluded.last_used_at)
            "#,
            params![
                user_id,
                merchant_key,
                suggestion.category,
                suggestion.note,
                suggestion.confidence.as_str(),
                suggestion.explanation,
                now,
                now,
            ],
        )?;

        let entry = conn.query_row(
            &format!(
                "SELECT {} FROM merchant_cache WHERE user_id = ? AND merchant_key = ?",
                CACHE_COLUMNS
            ),
            params![user_id, merchant_key],
            Self::row_to_cache_entry,
        )?;
        Ok(entry)
    }

    /// Record a cache hit. Returns false when no entry exists.
    pub fn touch_cached_merchant(&self, user_id: i64, merchant_key: &str) -> Result<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE merchant_cache SET last_used_at = MAX(last_used_at, ?)
             WHERE user_id = ? AND merchant_key = ?",
            params![now_timestamp(), user_id, merchant_key],
        )?;
        Ok(updated > 0)
    }

    /// List a user's cache entries, most recently used first
    pub fn list_cached_merchants(&self, user_id: i64) -> Result<Vec<MerchantCacheEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM merchant_cache WHERE user_id = ? ORDER BY last_used_at DESC",
            CACHE_COLUMNS
        ))?;
        let entries = stmt
            .query_map(params![user_id], Self::row_to_cache_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn row_to_cache_entry(row: &rusqlite::Row) -> rusqlite::Result<MerchantCacheEntry> {
        let confidence_str: String = row.get(5)?;
        let created_at_str: String = row.get(7)?;
        let last_used_at_str: String = row.get(8)?;
        Ok(MerchantCacheEntry {
            id: row.get(0)?,
            user_id: row.get(1)?,
            merchant_key: row.get(2)?,
            suggested_category: row.get(3)?,
            suggested_note: row.get(4)?,
            confidence: Confidence::parse_lenient(&confidence_str),
            explanation: row.get(6)?,
            created_at: parse_datetime(&created_at_str),
            last_used_at: parse_datetime(&last_used_at_str),
        })
    }
}
