//! Domain models for Spendwise

use std::collections::BTreeMap;

use chrono::{DateTime, Days, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Category value for transactions nobody has categorized yet.
///
/// Never stored as a user category; it is only ever a transaction value.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Default currency for imported and manual transactions
pub const DEFAULT_CURRENCY: &str = "CAD";

/// Provenance of a transaction's category, governing overwrite precedence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CategorySource {
    #[default]
    Uncategorized,
    /// Assigned by a deterministic rule
    Rule,
    /// Assigned by the AI categorization provider
    Ai,
    /// Set by a human; never overwritten automatically
    User,
}

impl CategorySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uncategorized => "uncategorized",
            Self::Rule => "rule",
            Self::Ai => "ai",
            Self::User => "user",
        }
    }
}

impl std::str::FromStr for CategorySource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "uncategorized" => Ok(Self::Uncategorized),
            "rule" => Ok(Self::Rule),
            "ai" => Ok(Self::Ai),
            "user" => Ok(Self::User),
            _ => Err(format!("Unknown category source: {}", s)),
        }
    }
}

impl std::fmt::Display for CategorySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Qualitative reliability rating for a categorization or a recurring group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    #[default]
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    /// Parse an untrusted confidence string, treating anything unknown as low
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or(Self::Low)
    }
}

impl std::str::FromStr for Confidence {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            _ => Err(format!("Unknown confidence: {}", s)),
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Charge frequency inferred for a recurring group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Weekly,
    Biweekly,
    Monthly,
    Quarterly,
    Yearly,
    /// Enough history, but the median interval matches no band
    Irregular,
    /// Fewer than two intervals to judge from
    Unknown,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::Biweekly => "biweekly",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Yearly => "yearly",
            Self::Irregular => "irregular",
            Self::Unknown => "unknown",
        }
    }

    /// Whether this frequency predicts a next charge date
    pub fn is_periodic(&self) -> bool {
        !matches!(self, Self::Irregular | Self::Unknown)
    }

    /// Factor converting one charge into a monthly-equivalent cost
    pub fn monthly_multiplier(&self) -> f64 {
        match self {
            Self::Weekly => 4.33,
            Self::Biweekly => 2.17,
            Self::Monthly => 1.0,
            Self::Quarterly => 1.0 / 3.0,
            Self::Yearly => 1.0 / 12.0,
            Self::Irregular | Self::Unknown => 0.0,
        }
    }

    /// Predict the charge after `last`.
    ///
    /// Month-based frequencies step by calendar months (clamped to the end of
    /// shorter months) so a charge on the 26th stays on the 26th.
    pub fn advance(&self, last: NaiveDate) -> Option<NaiveDate> {
        match self {
            Self::Weekly => last.checked_add_days(Days::new(7)),
            Self::Biweekly => last.checked_add_days(Days::new(14)),
            Self::Monthly => last.checked_add_months(Months::new(1)),
            Self::Quarterly => last.checked_add_months(Months::new(3)),
            Self::Yearly => last.checked_add_months(Months::new(12)),
            Self::Irregular | Self::Unknown => None,
        }
    }
}

impl std::str::FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "weekly" => Ok(Self::Weekly),
            "biweekly" | "bi-weekly" => Ok(Self::Biweekly),
            "monthly" => Ok(Self::Monthly),
            "quarterly" => Ok(Self::Quarterly),
            "yearly" | "annual" => Ok(Self::Yearly),
            "irregular" => Ok(Self::Irregular),
            "unknown" => Ok(Self::Unknown),
            _ => Err(format!("Unknown frequency: {}", s)),
        }
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether a recurring group's charge amount holds steady
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmountVariance {
    Stable,
    Variable,
}

impl AmountVariance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stable => "stable",
            Self::Variable => "variable",
        }
    }
}

impl std::str::FromStr for AmountVariance {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stable" | "fixed" => Ok(Self::Stable),
            "variable" => Ok(Self::Variable),
            _ => Err(format!("Unknown amount variance: {}", s)),
        }
    }
}

/// A bank account transactions are imported into
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub institution: Option<String>,
    pub account_type: Option<String>,
    pub number_last4: Option<String>,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

/// Fields accepted when creating an account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAccount {
    pub name: String,
    #[serde(default)]
    pub institution: Option<String>,
    #[serde(default)]
    pub account_type: Option<String>,
    #[serde(default)]
    pub number_last4: Option<String>,
    #[serde(default = "default_currency")]
    pub currency: String,
}

impl NewAccount {
    /// An account with only a name
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            institution: None,
            account_type: None,
            number_last4: None,
            currency: default_currency(),
        }
    }
}

/// A stored transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub user_id: i64,
    pub account_id: Option<i64>,
    pub date: NaiveDate,
    pub description_raw: String,
    /// Normalized grouping key, derived at import time
    pub merchant_key: String,
    /// Signed amount: negative = expense, positive = income
    pub amount: f64,
    pub currency: String,
    pub category: String,
    pub category_source: CategorySource,
    pub note_user: Option<String>,
    pub is_expense: bool,
    pub created_at: DateTime<Utc>,
}

/// A transaction to be inserted (from CSV import or manual entry)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransaction {
    pub date: NaiveDate,
    pub description_raw: String,
    pub amount: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    /// A category given at creation time counts as a user choice
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub note_user: Option<String>,
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

impl NewTransaction {
    pub fn new(date: NaiveDate, description_raw: &str, amount: f64) -> Self {
        Self {
            date,
            description_raw: description_raw.to_string(),
            amount,
            currency: default_currency(),
            category: None,
            note_user: None,
        }
    }
}

/// A cached categorization for one (user, merchant key) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerchantCacheEntry {
    pub id: i64,
    pub user_id: i64,
    pub merchant_key: String,
    pub suggested_category: String,
    pub suggested_note: Option<String>,
    pub confidence: Confidence,
    pub explanation: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

/// A user's spending category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub color: Option<String>,
    pub sort_order: i64,
    /// System categories cannot be renamed or deleted
    pub is_system: bool,
}

/// Transactions sharing a merchant key, inferred to repeat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringGroup {
    pub merchant_key: String,
    pub merchant_name: String,
    pub category: String,
    pub frequency: Frequency,
    /// Median of absolute amounts
    pub typical_amount: f64,
    /// `typical_amount` normalized to a monthly-equivalent cost
    pub monthly_amount: f64,
    pub amount_variance: AmountVariance,
    pub confidence: Confidence,
    pub transaction_count: usize,
    /// Median days between consecutive charges
    pub interval_days: Option<f64>,
    pub first_transaction_date: NaiveDate,
    pub last_transaction_date: NaiveDate,
    pub next_expected_date: Option<NaiveDate>,
    pub transaction_ids: Vec<i64>,
    pub sample_descriptions: Vec<String>,
}

/// A recurring charge expected within an upcoming window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpcomingPayment {
    pub merchant_key: String,
    pub merchant_name: String,
    pub category: String,
    pub frequency: Frequency,
    pub amount: f64,
    pub expected_date: NaiveDate,
    pub days_until: i64,
}

/// Net amount for one calendar day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayTotal {
    pub date: NaiveDate,
    pub net: f64,
}

/// Totals over a transaction set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    /// Sum of negative amounts (signed negative)
    pub total_spent: f64,
    /// Sum of positive amounts
    pub total_income: f64,
    pub by_category: BTreeMap<String, f64>,
    /// One entry per distinct date, ascending
    pub by_day: Vec<DayTotal>,
}
