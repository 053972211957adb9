//! AI backend request and response types
//!
//! These types are backend-agnostic and used across all AI implementations.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::RecurringGroup;

/// What the provider is told about one merchant
#[derive(Debug, Clone, Default, Serialize)]
pub struct MerchantContext {
    /// Normalized merchant key; the provider must echo it back
    pub merchant_key: String,
    /// Up to three raw descriptions seen for this merchant
    pub sample_descriptions: Vec<String>,
    /// Signed amount of one representative transaction
    pub representative_amount: f64,
}

/// One merchant categorization as returned by a provider
///
/// Every field is untrusted: `category` must be checked against the user's
/// allow-list and `confidence` parsed leniently before anything is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerchantSuggestion {
    pub merchant_key: String,
    pub category: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub confidence: Option<String>,
    #[serde(default)]
    pub explanation: Option<String>,
}

/// One transaction shown to the provider as context
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleTransaction {
    pub date: NaiveDate,
    pub description: String,
    pub amount: f64,
    pub category: String,
}

/// Aggregates a spending-insights request is built from
#[derive(Debug, Clone, Default, Serialize)]
pub struct SpendingOverview {
    /// Sum of negative amounts (signed negative)
    pub total_spent: f64,
    pub total_income: f64,
    /// Spend per category, as positive numbers
    pub spent_by_category: BTreeMap<String, f64>,
    pub sample_transactions: Vec<SampleTransaction>,
}

/// Recurring payments plus the last 30 days of cash flow
#[derive(Debug, Clone, Default)]
pub struct RecurringOverview {
    pub payments: Vec<RecurringGroup>,
    pub monthly_expenses: f64,
    pub monthly_income: f64,
}

/// How urgent an insight is
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightPriority {
    #[default]
    Info,
    Suggestion,
    Warning,
}

impl InsightPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Suggestion => "suggestion",
            Self::Warning => "warning",
        }
    }

    /// Anything unrecognized is `Info`
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "suggestion" => Self::Suggestion,
            "warning" | "alert" => Self::Warning,
            _ => Self::Info,
        }
    }
}

/// A titled observation about the user's recurring payments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightItem {
    /// cost_analysis, optimization, anomaly, prediction or info
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    pub priority: InsightPriority,
}
