//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `accounts` - Account listing and creation
//! - `categories` - Category management (list, add, rename, delete, reset, reorder)
//! - `categorize` - Batch categorization through the merchant cache
//! - `core` - Shared utilities (open_db, resolve_period)
//! - `import` - CSV import
//! - `insights` - Spending and recurring-payment insights
//! - `recurring` - Recurring payments and upcoming charges
//! - `serve` - Web server command
//! - `summary` - Spending summary for a date window

pub mod accounts;
pub mod categories;
pub mod categorize;
pub mod core;
pub mod import;
pub mod insights;
pub mod recurring;
pub mod serve;
pub mod summary;

// Re-export command functions for main.rs
pub use accounts::*;
pub use categories::*;
pub use categorize::*;
pub use core::*;
pub use import::*;
pub use insights::*;
pub use recurring::*;
pub use serve::*;
pub use summary::*;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Format a signed amount as currency, e.g. `-$15.99`
pub fn format_amount(amount: f64) -> String {
    if amount < 0.0 {
        format!("-${:.2}", -amount)
    } else {
        format!("${:.2}", amount)
    }
}
