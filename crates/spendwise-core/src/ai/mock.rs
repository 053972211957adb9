//! Mock backend for testing
//!
//! Returns keyword-based categories by default. Tests can pin responses per
//! merchant, make merchants drop out of the first few responses, or make every
//! call fail. Clones share counters, so a test can keep a handle after giving
//! the backend away.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::types::{
    InsightItem, InsightPriority, MerchantContext, MerchantSuggestion, RecurringOverview,
    SpendingOverview,
};
use super::AIBackend;

/// Mock AI backend for testing
#[derive(Clone, Default)]
pub struct MockBackend {
    /// Whether health_check should return true
    pub healthy: bool,
    /// Every categorization call fails with ProviderUnavailable
    failing: bool,
    /// Pinned (category, confidence) per merchant key
    responses: HashMap<String, (String, String)>,
    /// Remaining responses each merchant key is left out of
    omissions: Arc<Mutex<HashMap<String, usize>>>,
    calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<Vec<String>>>>,
}

impl MockBackend {
    /// Create a new mock backend (healthy by default)
    pub fn new() -> Self {
        Self {
            healthy: true,
            ..Default::default()
        }
    }

    /// Create a backend whose every call fails, as if the provider were down
    pub fn failing() -> Self {
        Self {
            healthy: false,
            failing: true,
            ..Default::default()
        }
    }

    /// Always answer `category` for this merchant key
    pub fn with_response(mut self, merchant_key: &str, category: &str) -> Self {
        self.responses.insert(
            merchant_key.to_string(),
            (category.to_string(), "high".to_string()),
        );
        self
    }

    /// Leave this merchant out of the next `times` responses
    pub fn omitting(self, merchant_key: &str, times: usize) -> Self {
        if let Ok(mut omissions) = self.omissions.lock() {
            omissions.insert(merchant_key.to_string(), times);
        }
        self
    }

    /// Number of provider calls made
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Merchant keys sent in each call, in call order
    pub fn requests(&self) -> Vec<Vec<String>> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn keyword_category(merchant_key: &str) -> &'static str {
        match merchant_key {
            k if k.contains("NETFLIX") || k.contains("SPOTIFY") => "Subscription",
            k if k.contains("LOBLAWS") || k.contains("METRO") || k.contains("COSTCO") => {
                "Groceries"
            }
            k if k.contains("MCDONALD") || k.contains("STARBUCKS") || k.contains("TIM") => {
                "Eating Out"
            }
            k if k.contains("PRESTO") || k.contains("SHELL") || k.contains("UBER") => "Transport",
            k if k.contains("AMAZON") => "Shopping",
            k if k.contains("HYDRO") || k.contains("ROGERS") => "Utilities",
            k if k.contains("PAYROLL") || k.contains("DEPOSIT") => "Income",
            _ => "Other",
        }
    }

    fn should_omit(&self, merchant_key: &str) -> bool {
        let Ok(mut omissions) = self.omissions.lock() else {
            return false;
        };
        match omissions.get_mut(merchant_key) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl AIBackend for MockBackend {
    async fn categorize_merchants(
        &self,
        merchants: &[MerchantContext],
        _categories: &[String],
    ) -> Result<Vec<MerchantSuggestion>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(merchants.iter().map(|m| m.merchant_key.clone()).collect());
        }

        if self.failing {
            return Err(Error::ProviderUnavailable(
                "mock provider is down".to_string(),
            ));
        }

        let suggestions = merchants
            .iter()
            .filter(|m| !self.should_omit(&m.merchant_key))
            .map(|m| {
                let (category, confidence) = self
                    .responses
                    .get(&m.merchant_key)
                    .cloned()
                    .unwrap_or_else(|| {
                        (
                            Self::keyword_category(&m.merchant_key).to_string(),
                            "medium".to_string(),
                        )
                    });
                MerchantSuggestion {
                    merchant_key: m.merchant_key.clone(),
                    category,
                    note: Some(format!("Mock note for {}", m.merchant_key)),
                    confidence: Some(confidence),
                    explanation: Some("mock".to_string()),
                }
            })
            .collect();

        Ok(suggestions)
    }

    async fn spending_insights(&self, overview: &SpendingOverview) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(Error::ProviderUnavailable(
                "mock provider is down".to_string(),
            ));
        }
        Ok(vec![format!(
            "Mock insight: you spent ${:.2} this period.",
            overview.total_spent.abs()
        )])
    }

    async fn recurring_insights(&self, overview: &RecurringOverview) -> Result<Vec<InsightItem>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(Error::ProviderUnavailable(
                "mock provider is down".to_string(),
            ));
        }
        Ok(vec![InsightItem {
            kind: "optimization".to_string(),
            title: "Mock Review".to_string(),
            message: format!("Review your {} recurring payments", overview.payments.len()),
            priority: InsightPriority::Suggestion,
        }])
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}
