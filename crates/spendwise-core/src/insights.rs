//! Spending and recurring-payment insights
//!
//! Both kinds of insight ask the AI provider first and fall back to fixed
//! rule-based text when no provider is configured or the call fails, so a
//! request never fails because of the provider. Recurring insights are
//! cached per user for [`INSIGHTS_CACHE_DAYS`].

use std::collections::BTreeMap;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::ai::{
    AIBackend, AIClient, InsightItem, InsightPriority, RecurringOverview, SampleTransaction,
    SpendingOverview,
};
use crate::db::{Database, TransactionFilter};
use crate::error::Result;
use crate::models::{RecurringGroup, Transaction, UpcomingPayment};
use crate::recurring::{monthly_totals, upcoming_payments, DetectionConfig, RecurringDetector};

/// Days a stored recurring analysis stays valid
pub const INSIGHTS_CACHE_DAYS: i64 = 30;

/// Transactions sent to the provider as examples
const MAX_SAMPLE_TRANSACTIONS: usize = 10;

/// Window for upcoming payments in a recurring analysis
const UPCOMING_WINDOW_DAYS: u64 = 14;
const MAX_UPCOMING: usize = 5;

/// Who wrote an insight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightSource {
    Ai,
    Rules,
}

impl InsightSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ai => "ai",
            Self::Rules => "rules",
        }
    }
}

impl std::str::FromStr for InsightSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ai" => Ok(Self::Ai),
            "rules" => Ok(Self::Rules),
            _ => Err(format!("Unknown insight source: {}", s)),
        }
    }
}

/// Narrative insights for a filtered period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpendingInsights {
    pub insights: Vec<String>,
    pub source: InsightSource,
}

/// Cost of the user's recurring payments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecurringInsightsSummary {
    pub total_monthly: f64,
    pub total_yearly: f64,
    pub count: usize,
    /// `total_monthly` against the last 30 days of expenses
    pub percentage_of_expenses: f64,
    /// Monthly-equivalent cost per category
    pub by_category: BTreeMap<String, f64>,
}

/// A recurring-payments analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringInsights {
    pub summary: RecurringInsightsSummary,
    pub insights: Vec<InsightItem>,
    /// Charges due within two weeks of the analysis, soonest first
    pub upcoming: Vec<UpcomingPayment>,
    pub source: InsightSource,
    pub generated_at: DateTime<Utc>,
    /// Served from the per-user cache
    pub from_cache: bool,
}

/// Insight generation for one database
pub struct InsightsService<'a> {
    db: &'a Database,
    ai: Option<&'a AIClient>,
    detection: DetectionConfig,
}

impl<'a> InsightsService<'a> {
    pub fn new(db: &'a Database, ai: Option<&'a AIClient>) -> Self {
        Self {
            db,
            ai,
            detection: DetectionConfig::default(),
        }
    }

    /// Detect recurring payments with this config
    pub fn with_detection(mut self, config: DetectionConfig) -> Self {
        self.detection = config;
        self
    }

    /// Insights about the transactions matching `filter`
    pub async fn spending_insights(
        &self,
        user_id: i64,
        filter: &TransactionFilter<'_>,
    ) -> Result<SpendingInsights> {
        let transactions = self.db.filtered_transactions(user_id, filter)?;
        let overview = spending_overview(&transactions);

        if let Some(ai) = self.ai {
            match ai.spending_insights(&overview).await {
                Ok(insights) => {
                    info!(user_id, count = insights.len(), "Spending insights from provider");
                    return Ok(SpendingInsights {
                        insights,
                        source: InsightSource::Ai,
                    });
                }
                Err(e) => warn!(user_id, error = %e, "Spending insights failed, using rules"),
            }
        }

        Ok(SpendingInsights {
            insights: rule_spending_insights(&overview, self.ai.is_some()),
            source: InsightSource::Rules,
        })
    }

    /// Recurring-payment insights, from the cache unless stale or `force_refresh`
    pub async fn recurring_insights(
        &self,
        user_id: i64,
        force_refresh: bool,
        today: NaiveDate,
    ) -> Result<RecurringInsights> {
        if !force_refresh {
            if let Some(cached) = self.db.load_recurring_insights(user_id)? {
                let age = Utc::now() - cached.generated_at;
                if age.num_days() <= INSIGHTS_CACHE_DAYS {
                    debug!(user_id, age_days = age.num_days(), "Serving cached recurring insights");
                    return Ok(cached);
                }
                debug!(user_id, age_days = age.num_days(), "Cached recurring insights are stale");
            }
        }

        let analysis = self.analyze_recurring(user_id, today).await?;
        self.db.save_recurring_insights(user_id, &analysis)?;
        Ok(analysis)
    }

    async fn analyze_recurring(&self, user_id: i64, today: NaiveDate) -> Result<RecurringInsights> {
        let payments: Vec<RecurringGroup> = RecurringDetector::new(self.db)
            .with_config(self.detection.clone())
            .recurring_payments(user_id, false)?
            .recurring_payments
            .into_iter()
            .filter(|g| g.category != "Income")
            .collect();

        if payments.is_empty() {
            info!(user_id, "No recurring payments to analyze");
            return Ok(empty_recurring_insights());
        }

        let (monthly_expenses, monthly_income) = self.last_30_days(user_id, today)?;
        let summary = recurring_summary(&payments, monthly_expenses);
        let mut upcoming = upcoming_payments(&payments, today, UPCOMING_WINDOW_DAYS);
        upcoming.truncate(MAX_UPCOMING);

        let overview = RecurringOverview {
            payments,
            monthly_expenses,
            monthly_income,
        };

        let (insights, source) = match self.ai {
            Some(ai) => match ai.recurring_insights(&overview).await {
                Ok(items) => (items, InsightSource::Ai),
                Err(e) => {
                    warn!(user_id, error = %e, "Recurring insights failed, using rules");
                    (rule_recurring_insights(&summary), InsightSource::Rules)
                }
            },
            None => (rule_recurring_insights(&summary), InsightSource::Rules),
        };

        info!(
            user_id,
            payments = summary.count,
            source = source.as_str(),
            "Recurring insights generated"
        );

        Ok(RecurringInsights {
            summary,
            insights,
            upcoming,
            source,
            generated_at: Utc::now(),
            from_cache: false,
        })
    }

    /// Expenses (positive) and income over the 30 days up to `today`
    fn last_30_days(&self, user_id: i64, today: NaiveDate) -> Result<(f64, f64)> {
        let start = today.checked_sub_days(Days::new(30)).unwrap_or(today);
        let filter = TransactionFilter::new().date_range(Some((start, today)));
        let transactions = self.db.filtered_transactions(user_id, &filter)?;

        let expenses: f64 = transactions.iter().filter(|t| t.amount < 0.0).map(|t| -t.amount).sum();
        let income: f64 = transactions.iter().filter(|t| t.amount > 0.0).map(|t| t.amount).sum();
        Ok((expenses, income))
    }
}

/// Totals, per-category spend and the first few transactions of a period
pub fn spending_overview(transactions: &[Transaction]) -> SpendingOverview {
    let mut overview = SpendingOverview::default();
    for tx in transactions {
        if tx.amount < 0.0 {
            overview.total_spent += tx.amount;
            *overview
                .spent_by_category
                .entry(tx.category.clone())
                .or_insert(0.0) += -tx.amount;
        } else {
            overview.total_income += tx.amount;
        }
    }
    overview.sample_transactions = transactions
        .iter()
        .take(MAX_SAMPLE_TRANSACTIONS)
        .map(|t| SampleTransaction {
            date: t.date,
            description: t.description_raw.clone(),
            amount: t.amount,
            category: t.category.clone(),
        })
        .collect();
    overview
}

/// Fixed insights used when the provider cannot answer
pub fn rule_spending_insights(overview: &SpendingOverview, provider_configured: bool) -> Vec<String> {
    let mut insights = vec![
        format!(
            "Your total spending for this period was ${:.2}.",
            overview.total_spent.abs()
        ),
        format!("Your total income was ${:.2}.", overview.total_income),
    ];

    let largest = overview
        .spent_by_category
        .iter()
        .max_by(|a, b| a.1.total_cmp(b.1));
    if let Some((category, amount)) = largest {
        insights.push(format!(
            "Your largest spending category was {} at ${:.2}.",
            category, amount
        ));
    }

    if !provider_configured {
        insights.push("Connect an AI provider to get AI-powered insights.".to_string());
    }
    insights
}

/// Monthly cost and share of expenses for a set of recurring payments
pub fn recurring_summary(payments: &[RecurringGroup], monthly_expenses: f64) -> RecurringInsightsSummary {
    let totals = monthly_totals(payments);

    let mut by_category: BTreeMap<String, f64> = BTreeMap::new();
    for payment in payments {
        *by_category.entry(payment.category.clone()).or_insert(0.0) += payment.monthly_amount;
    }
    for amount in by_category.values_mut() {
        *amount = round_to(*amount, 2);
    }

    let percentage_of_expenses = if monthly_expenses > 0.0 {
        round_to(totals.total_monthly / monthly_expenses * 100.0, 1)
    } else {
        0.0
    };

    RecurringInsightsSummary {
        total_monthly: totals.total_monthly,
        total_yearly: totals.total_yearly,
        count: payments.len(),
        percentage_of_expenses,
        by_category,
    }
}

/// Fixed recurring insights used when the provider cannot answer
pub fn rule_recurring_insights(summary: &RecurringInsightsSummary) -> Vec<InsightItem> {
    let mut insights = vec![InsightItem {
        kind: "cost_analysis".to_string(),
        title: "Monthly Recurring Costs".to_string(),
        message: format!(
            "You spend ${:.2}/month (${:.2}/year) on {} recurring payments",
            summary.total_monthly, summary.total_yearly, summary.count
        ),
        priority: InsightPriority::Info,
    }];

    if summary.by_category.len() > 1 {
        let top = summary
            .by_category
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1));
        if let Some((category, amount)) = top {
            insights.push(InsightItem {
                kind: "cost_analysis".to_string(),
                title: format!("Largest Category: {}", category),
                message: format!("${:.2}/month goes to {}", amount, category),
                priority: InsightPriority::Info,
            });
        }
    }

    if summary.percentage_of_expenses >= 5.0 {
        insights.push(InsightItem {
            kind: "cost_analysis".to_string(),
            title: "Expense Proportion".to_string(),
            message: format!(
                "Recurring payments make up {:.1}% of your monthly expenses",
                summary.percentage_of_expenses
            ),
            priority: if summary.percentage_of_expenses < 20.0 {
                InsightPriority::Info
            } else {
                InsightPriority::Warning
            },
        });
    }

    insights
}

fn empty_recurring_insights() -> RecurringInsights {
    RecurringInsights {
        summary: RecurringInsightsSummary::default(),
        insights: vec![InsightItem {
            kind: "info".to_string(),
            title: "No Recurring Payments".to_string(),
            message: "No recurring payments detected yet. Add more transactions or run analysis."
                .to_string(),
            priority: InsightPriority::Info,
        }],
        upcoming: Vec::new(),
        source: InsightSource::Rules,
        generated_at: Utc::now(),
        from_cache: false,
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
