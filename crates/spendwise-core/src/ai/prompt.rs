//! Provider prompts

use super::types::{MerchantContext, RecurringOverview, SpendingOverview};

/// Build the batch categorization prompt for a set of merchants
pub fn categorization_prompt(merchants: &[MerchantContext], categories: &[String]) -> String {
    let merchant_lines = merchants
        .iter()
        .map(|m| {
            let kind = if m.representative_amount < 0.0 {
                "expense"
            } else {
                "income"
            };
            let samples = m
                .sample_descriptions
                .iter()
                .map(|d| format!("\"{}\"", d))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "  - merchant_key: {}, samples: [{}], amount: ${:.2} ({})",
                m.merchant_key,
                samples,
                m.representative_amount.abs(),
                kind
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are a financial transaction categorization expert. Categorize each merchant below into one spending category.

Available categories:
{categories}

Rules:
1. Choose ONLY from the available categories above
2. Consider both the raw descriptions and the amount
3. Use "Income" for deposits, paychecks and refunds
4. Use "Other" if you are uncertain
5. For each merchant provide:
   - category: one of the available categories
   - note: a short user-friendly label (max 30 characters)
   - confidence: "high", "medium" or "low"
   - explanation: one sentence on what this merchant likely is

Merchants:
{merchant_lines}

Return ONLY a JSON array with one object per merchant, echoing merchant_key exactly:
[
  {{"merchant_key": "MCDONALDS", "category": "Eating Out", "note": "Fast food", "confidence": "high", "explanation": "McDonald's is a fast food restaurant."}}
]"#,
        categories = categories.join(", "),
        merchant_lines = merchant_lines,
    )
}

/// Build the spending-insights prompt for one filtered period
pub fn spending_insights_prompt(overview: &SpendingOverview) -> String {
    let context = serde_json::to_string_pretty(overview).unwrap_or_default();

    format!(
        r#"You are a personal finance assistant generating concise insights for a user.

Based on the following structured data about their spending over a period:

{context}

Generate 3-5 friendly, non-judgmental insights about:
- Overall spending patterns
- Notable categories
- Potential areas of concern or optimization
- Any unusual patterns

Return ONLY valid JSON with key "insights" containing an array of insight strings.
Example: {{"insights": ["Your total spending was $1234.56.", "Transport costs were lower than usual."]}}"#,
        context = context,
    )
}

/// Build the recurring-payments insights prompt
pub fn recurring_insights_prompt(overview: &RecurringOverview) -> String {
    let payment_lines = overview
        .payments
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let next = p
                .next_expected_date
                .map(|d| d.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            format!(
                "{}. {}: ${:.2}/{} ({}) - {} - Next: {}",
                i + 1,
                p.merchant_name,
                p.typical_amount,
                p.frequency.as_str(),
                p.amount_variance.as_str(),
                p.category,
                next
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Analyze these recurring payments and generate insights:

Recurring payments:
{payment_lines}

Financial context (last 30 days):
- Total expenses: ${expenses:.2}
- Total income: ${income:.2}

Generate insights of these types:
1. cost_analysis: summarize total recurring costs
2. optimization: ways to save money (bundles, unused services)
3. anomaly: unusual patterns or concerns
4. prediction: upcoming payment reminders and cash flow

Use priority "info" for neutral observations, "suggestion" for recommendations
and "warning" for concerns.

Return ONLY a JSON object:
{{
  "insights": [
    {{"type": "cost_analysis", "title": "Monthly Recurring Costs", "message": "You spend $150/month on recurring payments", "priority": "info"}}
  ]
}}"#,
        payment_lines = payment_lines,
        expenses = overview.monthly_expenses,
        income = overview.monthly_income,
    )
}
