//! Spendwise CLI - Spending tracker with recurring payment detection
//!
//! Usage:
//!   spendwise import --file CSV     Import transactions (RBC or generic layout)
//!   spendwise categorize            Categorize uncategorized transactions
//!   spendwise recurring             Show recurring payments
//!   spendwise insights [--recurring] Spending or recurring-payment insights
//!   spendwise accounts add NAME     Add an account
//!   spendwise serve --port 3000     Start web server

mod cli;
mod commands;


use anyhow::Result;
use chrono::Local;
use clap::Parser;
use spendwise_core::ai::AIClient;
use spendwise_core::models::NewAccount;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let user = cli.user;

    match cli.command {
        Commands::Serve {
            port,
            host,
            static_dir,
        } => {
            commands::cmd_serve(&cli.db, &host, port, static_dir.as_deref(), user, cli.no_encrypt)
                .await
        }
        Commands::Import {
            file,
            account,
            categorize,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let ai = AIClient::from_env();
            commands::cmd_import(&db, user, &file, account, categorize, ai.as_ref()).await?;
            Ok(())
        }
        Commands::Categorize { ids, dry_run } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let ai = AIClient::from_env();
            commands::cmd_categorize(&db, user, ai.as_ref(), &ids, dry_run).await?;
            Ok(())
        }
        Commands::Recurring {
            min_occurrences,
            all,
            refresh,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            if all || min_occurrences.is_some() {
                commands::cmd_recurring_detect(&db, user, min_occurrences, refresh)?;
            } else {
                commands::cmd_recurring(&db, user, refresh)?;
            }
            Ok(())
        }
        Commands::Upcoming { days } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_upcoming(&db, user, days, Local::now().date_naive())?;
            Ok(())
        }
        Commands::Summary {
            range,
            from,
            to,
            account,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let (start, end) = commands::resolve_period(
                &range,
                from.as_deref(),
                to.as_deref(),
                Local::now().date_naive(),
            )?;
            commands::cmd_summary(&db, user, start, end, account)?;
            Ok(())
        }
        Commands::Insights {
            recurring,
            refresh,
            range,
            from,
            to,
            account,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let ai = AIClient::from_env();
            let today = Local::now().date_naive();
            if recurring {
                commands::cmd_recurring_insights(&db, user, ai.as_ref(), refresh, today).await?;
            } else {
                let (start, end) =
                    commands::resolve_period(&range, from.as_deref(), to.as_deref(), today)?;
                commands::cmd_insights(&db, user, ai.as_ref(), start, end, account).await?;
            }
            Ok(())
        }
        Commands::Accounts { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None | Some(AccountsAction::List) => {
                    commands::cmd_accounts_list(&db, user)?;
                }
                Some(AccountsAction::Add {
                    name,
                    institution,
                    account_type,
                    last4,
                    currency,
                }) => {
                    let account = NewAccount {
                        name,
                        institution,
                        account_type,
                        number_last4: last4,
                        currency,
                    };
                    commands::cmd_accounts_add(&db, user, &account)?;
                }
            }
            Ok(())
        }
        Commands::Categories { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None | Some(CategoriesAction::List) => commands::cmd_categories_list(&db, user),
                Some(CategoriesAction::Add { name, color }) => {
                    commands::cmd_categories_add(&db, user, &name, color.as_deref())
                }
                Some(CategoriesAction::Rename { old_name, new_name }) => {
                    commands::cmd_categories_rename(&db, user, &old_name, &new_name)
                }
                Some(CategoriesAction::Delete { name }) => {
                    commands::cmd_categories_delete(&db, user, &name)
                }
                Some(CategoriesAction::Reorder { names }) => {
                    commands::cmd_categories_reorder(&db, user, &names)
                }
                Some(CategoriesAction::Reset { yes }) => {
                    commands::cmd_categories_reset(&db, user, yes)
                }
            }
        }
    }
}
