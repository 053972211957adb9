//! Recurring payment commands (recurring, upcoming)

use anyhow::Result;
use chrono::NaiveDate;
use spendwise_core::db::Database;
use spendwise_core::models::{RecurringGroup, UpcomingPayment};
use spendwise_core::recurring::{DetectionConfig, RecurringDetection, RecurringDetector, RecurringSummary};

use super::{format_amount, truncate};

pub fn cmd_recurring(db: &Database, user_id: i64, refresh: bool) -> Result<RecurringSummary> {
    let summary = RecurringDetector::new(db).recurring_payments(user_id, refresh)?;

    println!();
    println!("🔁 Recurring Payments");
    println!("   ─────────────────────────────────────────────────────────────");

    if summary.recurring_payments.is_empty() {
        println!("   No recurring payments found yet.");
        println!("   Import a few months of history to detect them.");
        println!();
        return Ok(summary);
    }

    for group in &summary.recurring_payments {
        print_group(group);
    }

    println!("   ─────────────────────────────────────────────────────────────");
    println!(
        "   {} payments  •  {}/month  •  {}/year",
        summary.total_count,
        format_amount(summary.total_monthly),
        format_amount(summary.total_yearly)
    );
    println!();

    Ok(summary)
}

/// Every detected group, including irregular ones
pub fn cmd_recurring_detect(
    db: &Database,
    user_id: i64,
    min_occurrences: Option<usize>,
    refresh: bool,
) -> Result<RecurringDetection> {
    let mut config = DetectionConfig::default();
    if let Some(min) = min_occurrences {
        config = config.with_min_occurrences(min);
    }

    let detection = RecurringDetector::new(db)
        .with_config(config)
        .detect(user_id, refresh)?;

    println!();
    println!(
        "🔍 {} recurring group(s){}",
        detection.total_count,
        if detection.from_snapshot {
            format!(" (snapshot from {})", detection.computed_at.format("%Y-%m-%d %H:%M"))
        } else {
            String::new()
        }
    );
    println!("   ─────────────────────────────────────────────────────────────");
    for group in &detection.recurring {
        print_group(group);
    }
    println!();

    Ok(detection)
}

fn print_group(group: &RecurringGroup) {
    let next = group
        .next_expected_date
        .map(|d| d.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "   {:<28} {:>10} {:<10} next {:<10} [{}]",
        truncate(&group.merchant_name, 28),
        format_amount(group.typical_amount),
        group.frequency.as_str(),
        next,
        group.category
    );
}

pub fn cmd_upcoming(
    db: &Database,
    user_id: i64,
    days: i64,
    today: NaiveDate,
) -> Result<Vec<UpcomingPayment>> {
    let upcoming = RecurringDetector::new(db).upcoming(user_id, days, today)?;

    println!();
    println!("📅 Upcoming charges (next {} days)", days);
    println!("   ─────────────────────────────────────────────────────────────");

    if upcoming.is_empty() {
        println!("   Nothing expected.");
    }

    let mut total = 0.0;
    for payment in &upcoming {
        total += payment.amount;
        let when = match payment.days_until {
            0 => "today".to_string(),
            1 => "tomorrow".to_string(),
            n => format!("in {} days", n),
        };
        println!(
            "   {}  {:<28} {:>10}  ({})",
            payment.expected_date,
            truncate(&payment.merchant_name, 28),
            format_amount(payment.amount),
            when
        );
    }

    if !upcoming.is_empty() {
        println!("   ─────────────────────────────────────────────────────────────");
        println!("   Total: {}", format_amount(total));
    }
    println!();

    Ok(upcoming)
}
