//! Recurring detection snapshot storage
//!
//! A snapshot is the last computed set of recurring groups for a user plus a
//! fingerprint of the detection config it was computed with. Every mutation
//! that affects detection bumps the user's generation and clears the marker.
//! A detection run only stores its result if the generation it started from
//! is still current, so a scan that raced with an insert is never kept.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, TransactionBehavior};

use super::{now_timestamp, parse_date, parse_datetime, Database};
use crate::error::Result;
use crate::models::{AmountVariance, Confidence, Frequency, RecurringGroup};

/// Marks a user's snapshot stale. Takes the user id as its only parameter.
pub(super) const INVALIDATE_SNAPSHOT_SQL: &str = r#"
    INSERT INTO recurring_snapshots (user_id, generation) VALUES (?, 1)
    ON CONFLICT(user_id) DO UPDATE SET
        generation = generation + 1,
        config_key = NULL,
        computed_at = NULL
"#;

/// A stored detection result
#[derive(Debug, Clone)]
pub struct RecurringSnapshot {
    /// Fingerprint of the detection config
    pub config_key: String,
    pub computed_at: DateTime<Utc>,
    pub groups: Vec<RecurringGroup>,
}

impl Database {
    /// Current snapshot generation for a user (0 before any mutation)
    pub fn recurring_generation(&self, user_id: i64) -> Result<i64> {
        let conn = self.conn()?;
        let generation = conn
            .query_row(
                "SELECT generation FROM recurring_snapshots WHERE user_id = ?",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(generation.unwrap_or(0))
    }

    /// Load the user's current snapshot, if one is valid
    pub fn load_recurring_snapshot(&self, user_id: i64) -> Result<Option<RecurringSnapshot>> {
        let conn = self.conn()?;

        let marker: Option<(String, String)> = conn
            .query_row(
                "SELECT config_key, computed_at FROM recurring_snapshots
                 WHERE user_id = ? AND computed_at IS NOT NULL AND config_key IS NOT NULL",
                params![user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((config_key, computed_at)) = marker else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            r#"
            SELECT merchant_key, merchant_name, category, frequency, typical_amount,
                   monthly_amount, amount_variance, confidence, transaction_count, interval_days,
                   first_transaction_date, last_transaction_date, next_expected_date,
                   transaction_ids, sample_descriptions
            FROM recurring_cache
            WHERE user_id = ?
            ORDER BY monthly_amount DESC, merchant_key
            "#,
        )?;
        let groups = stmt
            .query_map(params![user_id], Self::row_to_recurring_group)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Some(RecurringSnapshot {
            config_key,
            computed_at: parse_datetime(&computed_at),
            groups,
        }))
    }

    /// Replace the user's snapshot with freshly computed groups
    ///
    /// `generation` is the value read before the transactions were scanned.
    /// Returns false, storing nothing, when the user's data changed since.
    pub fn save_recurring_snapshot(
        &self,
        user_id: i64,
        generation: i64,
        config_key: &str,
        groups: &[RecurringGroup],
    ) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current: i64 = tx
            .query_row(
                "SELECT generation FROM recurring_snapshots WHERE user_id = ?",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);
        if current != generation {
            return Ok(false);
        }

        tx.execute(
            "DELETE FROM recurring_cache WHERE user_id = ?",
            params![user_id],
        )?;

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO recurring_cache (user_id, merchant_key, merchant_name, category,
                    frequency, typical_amount, monthly_amount, amount_variance, confidence,
                    transaction_count, interval_days, first_transaction_date,
                    last_transaction_date, next_expected_date, transaction_ids,
                    sample_descriptions)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )?;
            for group in groups {
                stmt.execute(params![
                    user_id,
                    group.merchant_key,
                    group.merchant_name,
                    group.category,
                    group.frequency.as_str(),
                    group.typical_amount,
                    group.monthly_amount,
                    group.amount_variance.as_str(),
                    group.confidence.as_str(),
                    group.transaction_count as i64,
                    group.interval_days,
                    group.first_transaction_date.to_string(),
                    group.last_transaction_date.to_string(),
                    group.next_expected_date.map(|d| d.to_string()),
                    serde_json::to_string(&group.transaction_ids)?,
                    serde_json::to_string(&group.sample_descriptions)?,
                ])?;
            }
        }

        tx.execute(
            r#"
            INSERT INTO recurring_snapshots (user_id, generation, config_key, computed_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                config_key = excluded.config_key,
                computed_at = excluded.computed_at
            "#,
            params![user_id, generation, config_key, now_timestamp()],
        )?;

        tx.commit()?;
        Ok(true)
    }

    /// Mark the user's snapshot stale
    pub fn invalidate_recurring_snapshot(&self, user_id: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(INVALIDATE_SNAPSHOT_SQL, params![user_id])?;
        Ok(())
    }

    fn row_to_recurring_group(row: &rusqlite::Row) -> rusqlite::Result<RecurringGroup> {
        let frequency_str: String = row.get(3)?;
        let variance_str: String = row.get(6)?;
        let confidence_str: String = row.get(7)?;
        let count: i64 = row.get(8)?;
        let first_str: String = row.get(10)?;
        let last_str: String = row.get(11)?;
        let next_str: Option<String> = row.get(12)?;
        let ids_json: String = row.get(13)?;
        let samples_json: String = row.get(14)?;

        Ok(RecurringGroup {
            merchant_key: row.get(0)?,
            merchant_name: row.get(1)?,
            category: row.get(2)?,
            frequency: frequency_str.parse().unwrap_or(Frequency::Unknown),
            typical_amount: row.get(4)?,
            monthly_amount: row.get(5)?,
            amount_variance: variance_str.parse().unwrap_or(AmountVariance::Variable),
            confidence: Confidence::parse_lenient(&confidence_str),
            transaction_count: count.max(0) as usize,
            interval_days: row.get(9)?,
            first_transaction_date: parse_date(&first_str),
            last_transaction_date: parse_date(&last_str),
            next_expected_date: next_str.as_deref().map(parse_date),
            transaction_ids: serde_json::from_str(&ids_json).unwrap_or_default(),
            sample_descriptions: serde_json::from_str(&samples_json).unwrap_or_default(),
        })
    }
}
