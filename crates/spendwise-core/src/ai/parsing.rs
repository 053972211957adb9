//! JSON parsing helpers for AI backend responses
//!
//! Models often wrap the payload in prose or code fences, so the JSON span is
//! located first and only that slice is deserialized.

use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};

use super::types::{InsightItem, InsightPriority, MerchantSuggestion};

/// Truncate raw model output for inclusion in an error message
fn truncate_raw(raw: &str) -> String {
    if raw.chars().count() > 200 {
        format!("{}...", raw.chars().take(200).collect::<String>())
    } else {
        raw.to_string()
    }
}

/// Parse a categorization response: a JSON array of merchant suggestions
///
/// A bare object is accepted as a one-element array, which some models emit
/// when asked about a single merchant. Elements are validated one at a time:
/// an element without a usable `merchant_key` is dropped, and a missing or
/// non-string `category` becomes an empty string so the caller coerces it to
/// "Uncategorized". One bad element never discards its neighbours.
pub fn parse_suggestions(response: &str) -> Result<Vec<MerchantSuggestion>> {
    let response = response.trim();

    let start = response.find('[');
    let end = response.rfind(']');

    let elements = match (start, end) {
        (Some(s), Some(e)) if s < e => {
            let json_str = &response[s..=e];
            serde_json::from_str::<Vec<Value>>(json_str).map_err(|e| {
                Error::InvalidData(format!(
                    "Invalid JSON from AI: {} | Raw: {}",
                    e,
                    truncate_raw(json_str)
                ))
            })?
        }
        _ => vec![parse_single_object(response)?],
    };

    let total = elements.len();
    let suggestions: Vec<MerchantSuggestion> =
        elements.iter().filter_map(suggestion_from_value).collect();
    if suggestions.len() < total {
        debug!(
            dropped = total - suggestions.len(),
            "Dropped suggestions without a merchant key"
        );
    }
    Ok(suggestions)
}

fn parse_single_object(response: &str) -> Result<Value> {
    let start = response.find('{');
    let end = response.rfind('}');

    match (start, end) {
        (Some(s), Some(e)) if s < e => {
            let json_str = &response[s..=e];
            serde_json::from_str(json_str).map_err(|e| {
                Error::InvalidData(format!(
                    "Invalid JSON from AI: {} | Raw: {}",
                    e,
                    truncate_raw(json_str)
                ))
            })
        }
        _ => Err(Error::InvalidData(format!(
            "No JSON found in AI response | Raw: {}",
            truncate_raw(response)
        ))),
    }
}

/// Non-empty trimmed string field, or None for anything else
fn string_field(value: &Value, field: &str) -> Option<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn suggestion_from_value(value: &Value) -> Option<MerchantSuggestion> {
    let merchant_key = string_field(value, "merchant_key")?;

    Some(MerchantSuggestion {
        merchant_key,
        category: string_field(value, "category").unwrap_or_default(),
        note: string_field(value, "note"),
        confidence: string_field(value, "confidence"),
        explanation: string_field(value, "explanation"),
    })
}

/// Parse a spending-insights response: `{"insights": ["...", ...]}`
///
/// Every entry must be a non-empty string and at least one must be present;
/// anything else is an error so the caller can fall back to rule-based text.
pub fn parse_insight_strings(response: &str) -> Result<Vec<String>> {
    let object = parse_single_object(response.trim())?;
    let entries = object
        .get("insights")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::InvalidData("AI response has no insights array".into()))?;

    let insights = entries
        .iter()
        .map(|entry| {
            entry
                .as_str()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .ok_or_else(|| {
                    Error::InvalidData(format!(
                        "Insight is not a string: {}",
                        truncate_raw(&entry.to_string())
                    ))
                })
        })
        .collect::<Result<Vec<_>>>()?;

    if insights.is_empty() {
        return Err(Error::InvalidData("AI response has no insights".into()));
    }
    Ok(insights)
}

/// Parse a recurring-insights response: an object with an `insights` array
///
/// Entries without a title or message are dropped; a missing type becomes
/// `info` and an unknown priority becomes `Info`. Errors when nothing usable
/// remains.
pub fn parse_insight_items(response: &str) -> Result<Vec<InsightItem>> {
    let object = parse_single_object(response.trim())?;
    let entries = object
        .get("insights")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::InvalidData("AI response has no insights array".into()))?;

    let items: Vec<InsightItem> = entries
        .iter()
        .filter_map(|entry| {
            Some(InsightItem {
                kind: string_field(entry, "type").unwrap_or_else(|| "info".to_string()),
                title: string_field(entry, "title")?,
                message: string_field(entry, "message")?,
                priority: string_field(entry, "priority")
                    .map(|p| InsightPriority::parse_lenient(&p))
                    .unwrap_or_default(),
            })
        })
        .collect();

    if items.len() < entries.len() {
        debug!(dropped = entries.len() - items.len(), "Dropped incomplete insights");
    }
    if items.is_empty() {
        return Err(Error::InvalidData("AI response has no usable insights".into()));
    }
    Ok(items)
}
