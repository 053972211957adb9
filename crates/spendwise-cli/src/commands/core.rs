//! Shared command utilities
//!
//! - `open_db` - Open the database, encrypted unless --no-encrypt
//! - `resolve_period` - Turn --range/--from/--to into a date window

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use spendwise_core::db::{Database, DateRange};

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .context("Database path must be valid UTF-8")?;
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

/// Resolve a preset range, overridden by explicit --from/--to dates
pub fn resolve_period(
    range: &str,
    from: Option<&str>,
    to: Option<&str>,
    today: NaiveDate,
) -> Result<(NaiveDate, NaiveDate)> {
    let preset: DateRange = range.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let (preset_start, preset_end) = preset.resolve(today);

    let start = from
        .map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .transpose()
        .context("Invalid --from date format (use YYYY-MM-DD)")?
        .unwrap_or(preset_start);
    let end = to
        .map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .transpose()
        .context("Invalid --to date format (use YYYY-MM-DD)")?
        .unwrap_or(preset_end);

    if start > end {
        anyhow::bail!("Start date {} is after end date {}", start, end);
    }
    Ok((start, end))
}
