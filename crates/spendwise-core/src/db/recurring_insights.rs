//! Cached recurring-payment insights, one row per user

use chrono::SecondsFormat;
use rusqlite::{params, OptionalExtension};

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::insights::{InsightSource, RecurringInsights};

impl Database {
    /// Load the user's cached recurring insights regardless of age
    pub fn load_recurring_insights(&self, user_id: i64) -> Result<Option<RecurringInsights>> {
        let conn = self.conn()?;

        let row: Option<(String, String, String, String, String)> = conn
            .query_row(
                "SELECT summary, insights, upcoming, source, analyzed_at
                 FROM recurring_insights WHERE user_id = ?",
                params![user_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .optional()?;

        let Some((summary, insights, upcoming, source, analyzed_at)) = row else {
            return Ok(None);
        };

        Ok(Some(RecurringInsights {
            summary: serde_json::from_str(&summary)?,
            insights: serde_json::from_str(&insights)?,
            upcoming: serde_json::from_str(&upcoming)?,
            source: source.parse().unwrap_or(InsightSource::Rules),
            generated_at: parse_datetime(&analyzed_at),
            from_cache: true,
        }))
    }

    /// Store (or replace) the user's recurring insights
    pub fn save_recurring_insights(&self, user_id: i64, insights: &RecurringInsights) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO recurring_insights (user_id, summary, insights, upcoming, source, analyzed_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                summary = excluded.summary,
                insights = excluded.insights,
                upcoming = excluded.upcoming,
                source = excluded.source,
                analyzed_at = excluded.analyzed_at
            "#,
            params![
                user_id,
                serde_json::to_string(&insights.summary)?,
                serde_json::to_string(&insights.insights)?,
                serde_json::to_string(&insights.upcoming)?,
                insights.source.as_str(),
                insights
                    .generated_at
                    .to_rfc3339_opts(SecondsFormat::Micros, true),
            ],
        )?;
        Ok(())
    }
}
