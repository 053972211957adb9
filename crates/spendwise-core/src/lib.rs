//! Spendwise Core Library
//!
//! Shared functionality for the Spendwise spending tracker:
//! - Database access and migrations
//! - CSV import for bank exports
//! - Merchant key normalization
//! - Per-user merchant categorization cache
//! - Batch categorization through a pluggable AI provider
//! - Recurring payment detection
//! - Spend and income aggregation
//! - Spending and recurring-payment insights

pub mod aggregate;
pub mod ai;
pub mod cache;
pub mod categorize;
pub mod db;
pub mod error;
pub mod import;
pub mod insights;
pub mod merchant;
pub mod models;
pub mod recurring;

/// Test utilities including a mock chat-completions server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use aggregate::{aggregate, DashboardSummary};
pub use ai::{
    AIBackend, AIClient, InsightItem, InsightPriority, MerchantContext, MerchantSuggestion,
    MockBackend, OpenAICompatibleBackend,
};
pub use cache::MerchantCategorizationCache;
pub use categorize::{
    BatchCategorizationResult, BatchCategorizer, CategorizationConfig, MerchantCategorization,
    PerTransactionResult,
};
pub use db::{Database, DateRange, TransactionFilter, TransactionInsertResult, TransactionUpdate};
pub use error::{Error, Result};
pub use import::{import_csv, CsvFormat, ImportSummary};
pub use insights::{
    InsightSource, InsightsService, RecurringInsights, RecurringInsightsSummary, SpendingInsights,
};
pub use recurring::{
    DetectionConfig, FrequencyBand, RecurringDetection, RecurringDetector, RecurringSummary,
};
