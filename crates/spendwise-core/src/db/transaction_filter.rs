//! Transaction filter builder for constructing dynamic SQL queries
//!
//! Filtering is a pass-through concern: the filtered view and the dashboard
//! both build a `TransactionFilter`, fetch the matching rows, and hand them to
//! the aggregation engine.

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

/// Preset date windows relative to today
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateRange {
    Last7Days,
    Last30Days,
    ThisMonth,
    LastMonth,
    Last3Months,
    Last6Months,
    ThisYear,
    AllTime,
}

impl DateRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Last7Days => "last_7_days",
            Self::Last30Days => "last_30_days",
            Self::ThisMonth => "this_month",
            Self::LastMonth => "last_month",
            Self::Last3Months => "last_3_months",
            Self::Last6Months => "last_6_months",
            Self::ThisYear => "this_year",
            Self::AllTime => "all_time",
        }
    }

    /// Inclusive `(start, end)` for this window as seen on `today`
    pub fn resolve(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let first_of_month = today.with_day(1).unwrap_or(today);
        match self {
            Self::Last7Days => (today - Days::new(7), today),
            Self::Last30Days => (today - Days::new(30), today),
            Self::ThisMonth => (first_of_month, today),
            Self::LastMonth => {
                let end = first_of_month - Days::new(1);
                (end.with_day(1).unwrap_or(end), end)
            }
            Self::Last3Months => (today - Months::new(3), today),
            Self::Last6Months => (today - Months::new(6), today),
            Self::ThisYear => (
                NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today),
                today,
            ),
            Self::AllTime => (
                NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or(today),
                today,
            ),
        }
    }
}

impl std::str::FromStr for DateRange {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "last_7_days" => Ok(Self::Last7Days),
            "last_30_days" => Ok(Self::Last30Days),
            "this_month" => Ok(Self::ThisMonth),
            "last_month" => Ok(Self::LastMonth),
            "last_3_months" => Ok(Self::Last3Months),
            "last_6_months" => Ok(Self::Last6Months),
            "this_year" => Ok(Self::ThisYear),
            "all_time" => Ok(Self::AllTime),
            _ => Err(format!("Unknown date range: {}", s)),
        }
    }
}

/// Builder for constructing transaction query filters
///
/// The lifetime `'query` represents how long the borrowed filter parameters
/// (search term, category list) must remain valid.
#[derive(Debug, Default, Clone)]
pub struct TransactionFilter<'query> {
    pub account_id: Option<i64>,
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    pub categories: Option<&'query [String]>,
    pub search: Option<&'query str>,
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
}

/// Result of building a filter - contains SQL components and parameters
pub struct FilterResult {
    /// WHERE clause including "WHERE" keyword (always scoped to the user)
    pub where_clause: String,
    /// Parameters for the query (boxed for rusqlite compatibility)
    pub params: Vec<Box<dyn rusqlite::ToSql>>,
}

impl<'query> TransactionFilter<'query> {
    /// Create a new filter builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set account_id filter
    pub fn account_id(mut self, id: Option<i64>) -> Self {
        self.account_id = id;
        self
    }

    /// Set inclusive date range filter
    pub fn date_range(mut self, range: Option<(NaiveDate, NaiveDate)>) -> Self {
        self.date_range = range;
        self
    }

    /// Restrict to any of these categories (empty slice = no restriction)
    pub fn categories(mut self, categories: Option<&'query [String]>) -> Self {
        self.categories = categories;
        self
    }

    /// Set merchant search (description, note and merchant key)
    pub fn search(mut self, query: Option<&'query str>) -> Self {
        self.search = query;
        self
    }

    /// Set signed amount bounds (inclusive)
    pub fn amount_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_amount = min;
        self.max_amount = max;
        self
    }

    /// Build the filter components
    pub fn build(&self, user_id: i64) -> FilterResult {
        let mut conditions = vec!["t.user_id = ?".to_string()];
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(user_id)];

        if let Some(aid) = self.account_id {
            conditions.push("t.account_id = ?".to_string());
            params.push(Box::new(aid));
        }

        if let Some((from_date, to_date)) = self.date_range {
            conditions.push("t.date >= ? AND t.date <= ?".to_string());
            params.push(Box::new(from_date.to_string()));
            params.push(Box::new(to_date.to_string()));
        }

        if let Some(categories) = self.categories {
            if !categories.is_empty() {
                let placeholders = vec!["?"; categories.len()].join(", ");
                conditions.push(format!("t.category IN ({})", placeholders));
                for category in categories {
                    params.push(Box::new(category.clone()));
                }
            }
        }

        if let Some(q) = self.search {
            if !q.trim().is_empty() {
                conditions.push(
                    "(t.description_raw LIKE ? COLLATE NOCASE OR t.note_user LIKE ? COLLATE NOCASE \
                     OR t.merchant_key LIKE ? COLLATE NOCASE)"
                        .to_string(),
                );
                let pattern = format!("%{}%", q.trim());
                params.push(Box::new(pattern.clone()));
                params.push(Box::new(pattern.clone()));
                params.push(Box::new(pattern));
            }
        }

        if let Some(min) = self.min_amount {
            conditions.push("t.amount >= ?".to_string());
            params.push(Box::new(min));
        }

        if let Some(max) = self.max_amount {
            conditions.push("t.amount <= ?".to_string());
            params.push(Box::new(max));
        }

        FilterResult {
            where_clause: format!("WHERE {}", conditions.join(" AND ")),
            params,
        }
    }
}

impl FilterResult {
    /// Get parameter references for query execution
    pub fn params_refs(&self) -> Vec<&dyn rusqlite::ToSql> {
        self.params.iter().map(|p| p.as_ref()).collect()
    }
}
