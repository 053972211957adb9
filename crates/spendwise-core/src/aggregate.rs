//! Totals over a transaction set
//!
//! Filtering happens upstream (see `db::TransactionFilter`); everything here
//! is a pure function of the rows it is given.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{AggregateResult, DayTotal, Transaction};

/// Compute spend, income, per-category and per-day totals
///
/// `by_day` is in ascending date order with one entry per distinct date.
/// `total_spent + total_income` always equals the sum of the input amounts.
pub fn aggregate(transactions: &[Transaction]) -> AggregateResult {
    let mut result = AggregateResult::default();
    let mut by_day: BTreeMap<_, f64> = BTreeMap::new();

    for tx in transactions {
        if tx.amount < 0.0 {
            result.total_spent += tx.amount;
        } else {
            result.total_income += tx.amount;
        }
        *result.by_category.entry(tx.category.clone()).or_insert(0.0) += tx.amount;
        *by_day.entry(tx.date).or_insert(0.0) += tx.amount;
    }

    result.by_day = by_day
        .into_iter()
        .map(|(date, net)| DayTotal { date, net })
        .collect();
    result
}

/// Headline numbers for the dashboard
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub total_spent: f64,
    pub total_income: f64,
    pub net: f64,
    /// `net / total_income` as a percentage; 0 without income
    pub savings_rate: f64,
    pub transaction_count: usize,
    /// Category with the largest spend
    pub top_category: Option<String>,
    /// Spend in `top_category`, as a positive number
    pub top_category_amount: f64,
    pub by_category: BTreeMap<String, f64>,
    pub by_day: Vec<DayTotal>,
}

impl DashboardSummary {
    pub fn from_transactions(transactions: &[Transaction]) -> Self {
        let totals = aggregate(transactions);

        let net = totals.total_income + totals.total_spent;
        let savings_rate = if totals.total_income > 0.0 {
            round_cents(net / totals.total_income * 100.0)
        } else {
            0.0
        };

        // Expense-only sums; a category with refunds nets against its spend
        let mut spent_by_category: BTreeMap<&str, f64> = BTreeMap::new();
        for tx in transactions.iter().filter(|t| t.amount < 0.0) {
            *spent_by_category.entry(tx.category.as_str()).or_insert(0.0) += -tx.amount;
        }
        let top = spent_by_category
            .into_iter()
            .max_by(|a, b| a.1.total_cmp(&b.1));

        Self {
            total_spent: round_cents(totals.total_spent),
            total_income: round_cents(totals.total_income),
            net: round_cents(net),
            savings_rate,
            transaction_count: transactions.len(),
            top_category: top.map(|(name, _)| name.to_string()),
            top_category_amount: top.map(|(_, amount)| round_cents(amount)).unwrap_or(0.0),
            by_category: totals.by_category,
            by_day: totals.by_day,
        }
    }
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
