//! Account commands

use anyhow::Result;
use spendwise_core::db::Database;
use spendwise_core::models::{Account, NewAccount};

pub fn cmd_accounts_list(db: &Database, user_id: i64) -> Result<Vec<Account>> {
    let accounts = db.list_accounts(user_id)?;

    println!();
    println!("🏦 Accounts");
    println!("   ─────────────────────────────────────────────");
    if accounts.is_empty() {
        println!("   No accounts yet. Import an RBC export or add one.");
    }
    for account in &accounts {
        println!(
            "   {:>4}  {:<24} {:<12} {} {}",
            account.id,
            account.name,
            account.institution.as_deref().unwrap_or("-"),
            account
                .number_last4
                .as_deref()
                .map(|n| format!("••{}", n))
                .unwrap_or_default(),
            account.currency
        );
    }
    println!();

    Ok(accounts)
}

pub fn cmd_accounts_add(db: &Database, user_id: i64, account: &NewAccount) -> Result<Account> {
    let created = db.create_account(user_id, account)?;
    println!("✅ Created account '{}' (ID: {})", created.name, created.id);
    Ok(created)
}
