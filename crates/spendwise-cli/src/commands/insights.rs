//! Insight commands

use anyhow::Result;
use chrono::NaiveDate;
use spendwise_core::ai::{AIClient, InsightPriority};
use spendwise_core::db::{Database, TransactionFilter};
use spendwise_core::insights::{InsightSource, InsightsService, RecurringInsights, SpendingInsights};

use super::{format_amount, truncate};

fn source_label(source: InsightSource) -> &'static str {
    match source {
        InsightSource::Ai => "AI",
        InsightSource::Rules => "rules",
    }
}

pub async fn cmd_insights(
    db: &Database,
    user_id: i64,
    ai: Option<&AIClient>,
    start: NaiveDate,
    end: NaiveDate,
    account_id: Option<i64>,
) -> Result<SpendingInsights> {
    let filter = TransactionFilter::new()
        .account_id(account_id)
        .date_range(Some((start, end)));
    let result = InsightsService::new(db, ai)
        .spending_insights(user_id, &filter)
        .await?;

    println!();
    println!("💡 Insights for {} to {} ({})", start, end, source_label(result.source));
    println!("   ─────────────────────────────────────────────");
    for insight in &result.insights {
        println!("   • {}", insight);
    }
    println!();

    Ok(result)
}

pub async fn cmd_recurring_insights(
    db: &Database,
    user_id: i64,
    ai: Option<&AIClient>,
    refresh: bool,
    today: NaiveDate,
) -> Result<RecurringInsights> {
    let result = InsightsService::new(db, ai)
        .recurring_insights(user_id, refresh, today)
        .await?;

    println!();
    println!(
        "🔁 Recurring insights ({}{})",
        source_label(result.source),
        if result.from_cache {
            format!(", from {}", result.generated_at.format("%Y-%m-%d"))
        } else {
            String::new()
        }
    );
    println!("   ─────────────────────────────────────────────");
    println!(
        "   {} payments  •  {}/month  •  {}/year  •  {:.1}% of expenses",
        result.summary.count,
        format_amount(result.summary.total_monthly),
        format_amount(result.summary.total_yearly),
        result.summary.percentage_of_expenses
    );
    println!();

    for item in &result.insights {
        let marker = match item.priority {
            InsightPriority::Info => "ℹ️ ",
            InsightPriority::Suggestion => "💡",
            InsightPriority::Warning => "⚠️ ",
        };
        println!("   {} {}: {}", marker, item.title, item.message);
    }

    if !result.upcoming.is_empty() {
        println!();
        println!("   Due in the next two weeks:");
        for payment in &result.upcoming {
            println!(
                "   {}  {:<28} {:>10}",
                payment.expected_date,
                truncate(&payment.merchant_name, 28),
                format_amount(payment.amount)
            );
        }
    }
    println!();

    Ok(result)
}
