//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Spendwise - Track where the money goes every month
#[derive(Parser)]
#[command(name = "spendwise")]
#[command(about = "Self-hosted spending tracker with recurring payment detection", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "spendwise.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set SPENDWISE_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    /// User whose data the command works on
    #[arg(long, default_value = "1", global = true)]
    pub user: i64,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Directory with the dashboard build to serve
        #[arg(long)]
        static_dir: Option<PathBuf>,
    },

    /// Import transactions from a bank CSV export (RBC or Date,Description,Amount)
    Import {
        /// CSV file to import
        #[arg(short, long)]
        file: PathBuf,

        /// Account ID to import into (RBC exports create their own account)
        #[arg(short, long)]
        account: Option<i64>,

        /// Categorize the imported transactions afterwards
        #[arg(long)]
        categorize: bool,
    },

    /// Categorize transactions by merchant using the cache and AI provider
    Categorize {
        /// Transaction IDs (default: every uncategorized transaction)
        ids: Vec<i64>,

        /// Show suggestions without writing them to transactions
        #[arg(long)]
        dry_run: bool,
    },

    /// Show recurring payments and what they cost
    Recurring {
        /// Minimum charges before a merchant counts as recurring
        #[arg(long)]
        min_occurrences: Option<usize>,

        /// Include irregular groups, not just periodic ones
        #[arg(long)]
        all: bool,

        /// Recompute instead of using the stored snapshot
        #[arg(long)]
        refresh: bool,
    },

    /// Show recurring charges expected soon
    Upcoming {
        /// Days to look ahead (1-30)
        #[arg(short, long, default_value = "7")]
        days: i64,
    },

    /// Spending summary for a date window
    Summary {
        /// Preset window: last_7_days, last_30_days, this_month, last_month,
        /// last_3_months, last_6_months, this_year, all_time
        #[arg(long, default_value = "last_30_days")]
        range: String,

        /// Start date (YYYY-MM-DD), overrides --range
        #[arg(long)]
        from: Option<String>,

        /// End date (YYYY-MM-DD), overrides --range
        #[arg(long)]
        to: Option<String>,

        /// Only this account
        #[arg(short, long)]
        account: Option<i64>,
    },

    /// Spending insights for a date window, or recurring-payment insights
    Insights {
        /// Review recurring payments instead of spending
        #[arg(long)]
        recurring: bool,

        /// Regenerate recurring insights instead of using the cached ones
        #[arg(long, requires = "recurring")]
        refresh: bool,

        /// Preset window (same names as `summary --range`)
        #[arg(long, default_value = "last_30_days")]
        range: String,

        /// Start date (YYYY-MM-DD), overrides --range
        #[arg(long)]
        from: Option<String>,

        /// End date (YYYY-MM-DD), overrides --range
        #[arg(long)]
        to: Option<String>,

        /// Only this account
        #[arg(short, long)]
        account: Option<i64>,
    },

    /// Manage accounts
    Accounts {
        #[command(subcommand)]
        action: Option<AccountsAction>,
    },

    /// Manage categories
    Categories {
        #[command(subcommand)]
        action: Option<CategoriesAction>,
    },
}

#[derive(Subcommand)]
pub enum AccountsAction {
    /// List accounts (default)
    List,

    /// Add an account
    Add {
        /// Account name
        name: String,

        /// Bank or card issuer
        #[arg(long)]
        institution: Option<String>,

        /// Account type (e.g. "Chequing", "Visa")
        #[arg(long = "type")]
        account_type: Option<String>,

        /// Last four digits of the account number
        #[arg(long)]
        last4: Option<String>,

        /// Currency code
        #[arg(long, default_value = "CAD")]
        currency: String,
    },
}

#[derive(Subcommand)]
pub enum CategoriesAction {
    /// List categories (default)
    List,

    /// Add a category
    Add {
        /// Category name
        name: String,

        /// Display color (hex, e.g. "#3b82f6")
        #[arg(short, long)]
        color: Option<String>,
    },

    /// Rename a category (transactions and cached suggestions follow)
    Rename {
        /// Current name
        old_name: String,

        /// New name
        new_name: String,
    },

    /// Delete a category; its transactions become uncategorized
    Delete {
        /// Category name
        name: String,
    },

    /// Give the named categories the leading positions, in the order given
    Reorder {
        /// Category names
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Restore the default categories and uncategorize every transaction
    Reset {
        /// Skip the confirmation check
        #[arg(short, long)]
        yes: bool,
    },
}
