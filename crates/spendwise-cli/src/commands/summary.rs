//! Summary command implementation

use anyhow::Result;
use chrono::NaiveDate;
use spendwise_core::aggregate::DashboardSummary;
use spendwise_core::db::{Database, TransactionFilter};

use super::format_amount;

pub fn cmd_summary(
    db: &Database,
    user_id: i64,
    start: NaiveDate,
    end: NaiveDate,
    account_id: Option<i64>,
) -> Result<DashboardSummary> {
    let filter = TransactionFilter::new()
        .account_id(account_id)
        .date_range(Some((start, end)));
    let transactions = db.filtered_transactions(user_id, &filter)?;
    let summary = DashboardSummary::from_transactions(&transactions);

    println!();
    println!("╭─────────────────────────────────────────╮");
    println!("│          💰 Spendwise Summary           │");
    println!("╰─────────────────────────────────────────╯");
    println!();
    println!("  Period:        {} to {}", start, end);
    println!("  Transactions:  {}", summary.transaction_count);
    println!();
    println!("  Income:        {:>12}", format_amount(summary.total_income));
    println!("  Spent:         {:>12}", format_amount(summary.total_spent));
    println!("  Net:           {:>12}", format_amount(summary.net));
    if summary.total_income > 0.0 {
        println!("  Savings rate:  {:>11.1}%", summary.savings_rate);
    }

    if !summary.by_category.is_empty() {
        println!();
        println!("  By category:");

        let mut categories: Vec<(&String, &f64)> = summary.by_category.iter().collect();
        categories.sort_by(|a, b| a.1.total_cmp(b.1));
        for (name, amount) in categories {
            println!("    {:<20} {:>12}", name, format_amount(*amount));
        }
    }
    println!();

    Ok(summary)
}
