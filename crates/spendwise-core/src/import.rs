//! CSV import for bank exports
//!
//! Two layouts are recognized from the header row:
//! - RBC: `Account Type,Account Number,Transaction Date,Description 1,Description 2,CAD$,USD$`
//! - Generic: `Date,Description,Amount`
//!
//! Rows that fail to parse are skipped and counted instead of aborting the
//! whole file. Every row gets a SHA-256 import hash so re-importing the same
//! export inserts nothing.

use std::collections::HashMap;
use std::io::Read;

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::db::{Database, TransactionInsertResult};
use crate::error::{Error, Result};
use crate::models::{NewTransaction, DEFAULT_CURRENCY};

/// Supported CSV layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CsvFormat {
    Rbc,
    Generic,
}

impl CsvFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rbc => "rbc",
            Self::Generic => "generic",
        }
    }
}

/// Bank account details found in the file itself (RBC only)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceAccount {
    pub account_type: String,
    pub number_last4: String,
}

/// Parsed rows of one CSV file
#[derive(Debug, Clone)]
pub struct ParsedCsv {
    pub format: CsvFormat,
    pub transactions: Vec<NewTransaction>,
    /// Rows that could not be parsed
    pub failed_rows: usize,
    pub account: Option<SourceAccount>,
}

/// Outcome of importing a file into the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSummary {
    pub inserted_count: usize,
    /// Duplicates plus rows that failed to parse
    pub skipped_count: usize,
    pub failed_rows: usize,
    pub account_id: Option<i64>,
    pub inserted_ids: Vec<i64>,
}

/// Column positions, resolved from the header by name
enum Columns {
    Rbc {
        account_type: usize,
        account_number: usize,
        date: usize,
        description_1: usize,
        description_2: Option<usize>,
        cad: usize,
        usd: Option<usize>,
    },
    Generic {
        date: usize,
        description: usize,
        amount: usize,
    },
}

impl Columns {
    fn format(&self) -> CsvFormat {
        match self {
            Columns::Rbc { .. } => CsvFormat::Rbc,
            Columns::Generic { .. } => CsvFormat::Generic,
        }
    }
}

fn position(headers: &StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.trim().trim_start_matches('\u{feff}').eq_ignore_ascii_case(name))
}

fn resolve_columns(headers: &StringRecord) -> Option<Columns> {
    let rbc = (
        position(headers, "Account Type"),
        position(headers, "Account Number"),
        position(headers, "Transaction Date"),
        position(headers, "Description 1"),
        position(headers, "CAD$"),
    );
    if let (Some(account_type), Some(account_number), Some(date), Some(description_1), Some(cad)) =
        rbc
    {
        return Some(Columns::Rbc {
            account_type,
            account_number,
            date,
            description_1,
            description_2: position(headers, "Description 2"),
            cad,
            usd: position(headers, "USD$"),
        });
    }

    match (
        position(headers, "Date"),
        position(headers, "Description"),
        position(headers, "Amount"),
    ) {
        (Some(date), Some(description), Some(amount)) => Some(Columns::Generic {
            date,
            description,
            amount,
        }),
        _ => None,
    }
}

/// Detect the CSV layout from a header line
///
/// Returns None if the format is not recognized.
pub fn detect_format(header: &str) -> Option<CsvFormat> {
    let headers = StringRecord::from(header.trim().split(',').collect::<Vec<_>>());
    resolve_columns(&headers).map(|c| c.format())
}

/// Parse a CSV export into transactions
pub fn parse_csv<R: Read>(reader: R) -> Result<ParsedCsv> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(Error::Import("CSV file is empty".into()));
    }
    let columns = resolve_columns(&headers).ok_or_else(|| {
        Error::Import(format!(
            "Unrecognized CSV header: {}",
            headers.iter().collect::<Vec<_>>().join(",")
        ))
    })?;

    let mut parsed = ParsedCsv {
        format: columns.format(),
        transactions: Vec::new(),
        failed_rows: 0,
        account: None,
    };

    for (line, result) in rdr.records().enumerate() {
        let row = result
            .map_err(Error::from)
            .and_then(|record| parse_row(&columns, &record));

        match row {
            Ok((tx, account)) => {
                if parsed.account.is_none() {
                    parsed.account = account;
                }
                parsed.transactions.push(tx);
            }
            Err(e) => {
                // +2: header row and 1-based numbering
                debug!(line = line + 2, error = %e, "Skipping CSV row");
                parsed.failed_rows += 1;
            }
        }
    }

    debug!(
        format = parsed.format.as_str(),
        rows = parsed.transactions.len(),
        failed = parsed.failed_rows,
        "Parsed CSV"
    );
    Ok(parsed)
}

fn field<'r>(record: &'r StringRecord, idx: usize) -> &'r str {
    record.get(idx).map(str::trim).unwrap_or("")
}

fn parse_row(
    columns: &Columns,
    record: &StringRecord,
) -> Result<(NewTransaction, Option<SourceAccount>)> {
    match *columns {
        Columns::Rbc {
            account_type,
            account_number,
            date,
            description_1,
            description_2,
            cad,
            usd,
        } => {
            let date = parse_date(field(record, date))?;

            let (amount, currency) = match (field(record, cad), usd.map(|i| field(record, i))) {
                (cad, _) if !cad.is_empty() => (parse_amount(cad)?, DEFAULT_CURRENCY),
                (_, Some(usd)) if !usd.is_empty() => (parse_amount(usd)?, "USD"),
                _ => return Err(Error::Import("Missing amount".into())),
            };

            let description = [Some(description_1), description_2]
                .into_iter()
                .flatten()
                .map(|i| field(record, i))
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            if description.is_empty() {
                return Err(Error::Import("Missing description".into()));
            }

            let number = field(record, account_number);
            let account = (!number.is_empty()).then(|| SourceAccount {
                account_type: field(record, account_type).to_string(),
                number_last4: last4(number),
            });

            let mut tx = NewTransaction::new(date, &description, amount);
            tx.currency = currency.to_string();
            Ok((tx, account))
        }
        Columns::Generic {
            date,
            description,
            amount,
        } => {
            let date = parse_date(field(record, date))?;
            let description = field(record, description);
            if description.is_empty() {
                return Err(Error::Import("Missing description".into()));
            }
            let amount = parse_amount(field(record, amount))?;
            Ok((NewTransaction::new(date, description, amount), None))
        }
    }
}

fn last4(number: &str) -> String {
    let chars: Vec<char> = number.chars().collect();
    chars[chars.len().saturating_sub(4)..].iter().collect()
}

/// Import hash over the row's identity within one user's account
///
/// `occurrence` numbers identical rows within one file (0 for the first), so
/// two real same-day charges both survive while a re-imported file still
/// deduplicates.
pub fn import_hash(
    user_id: i64,
    account_id: Option<i64>,
    tx: &NewTransaction,
    occurrence: usize,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.to_be_bytes());
    hasher.update(account_id.unwrap_or(0).to_be_bytes());
    hasher.update(tx.date.to_string().as_bytes());
    hasher.update(tx.description_raw.as_bytes());
    hasher.update(tx.amount.to_be_bytes());
    hasher.update((occurrence as u64).to_be_bytes());
    hex::encode(hasher.finalize())
}

/// Parse a CSV export and store its transactions
///
/// Without `account_id`, an RBC file's own account columns pick (or create)
/// the account; generic files are imported without one.
pub fn import_csv<R: Read>(
    db: &Database,
    user_id: i64,
    reader: R,
    account_id: Option<i64>,
) -> Result<ImportSummary> {
    let parsed = parse_csv(reader)?;

    let account_id = match (account_id, &parsed.account) {
        (Some(id), _) => {
            db.get_account(user_id, id)?
                .ok_or_else(|| Error::NotFound(format!("Account {} not found", id)))?;
            Some(id)
        }
        (None, Some(source)) => {
            Some(db.upsert_account(user_id, &source.account_type, &source.number_last4)?)
        }
        (None, None) => None,
    };

    let mut inserted_ids = Vec::new();
    let mut duplicates = 0;
    let mut seen: HashMap<(NaiveDate, &str, u64), usize> = HashMap::new();
    for tx in &parsed.transactions {
        let occurrence = seen
            .entry((tx.date, tx.description_raw.as_str(), tx.amount.to_bits()))
            .or_insert(0);
        let hash = import_hash(user_id, account_id, tx, *occurrence);
        *occurrence += 1;
        match db.insert_transaction(user_id, account_id, tx, Some(&hash))? {
            TransactionInsertResult::Inserted(id) => inserted_ids.push(id),
            TransactionInsertResult::Duplicate(_) => duplicates += 1,
        }
    }

    if parsed.failed_rows > 0 {
        warn!(failed = parsed.failed_rows, "Some CSV rows could not be parsed");
    }
    info!(
        user_id,
        format = parsed.format.as_str(),
        inserted = inserted_ids.len(),
        duplicates,
        "Imported transactions"
    );

    Ok(ImportSummary {
        inserted_count: inserted_ids.len(),
        skipped_count: duplicates + parsed.failed_rows,
        failed_rows: parsed.failed_rows,
        account_id,
        inserted_ids,
    })
}

/// Parse a date string in MM/DD/YYYY or YYYY-MM-DD form
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();

    let formats = [
        "%m/%d/%Y", // 01/15/2024
        "%Y-%m-%d", // 2024-01-15
    ];

    for fmt in formats {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(date);
        }
    }

    Err(Error::Import(format!("Unable to parse date: {}", s)))
}

/// Parse an amount string, handling currency symbols, commas and
/// accounting-style parentheses
pub fn parse_amount(s: &str) -> Result<f64> {
    let cleaned: String = s
        .trim()
        .replace(['$', ',', ' '], "")
        .replace('(', "-")
        .replace(')', "");

    cleaned
        .parse::<f64>()
        .ok()
        .filter(|a| a.is_finite())
        .ok_or_else(|| Error::Import(format!("Unable to parse amount: {}", s)))
}
