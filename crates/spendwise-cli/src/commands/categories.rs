//! Category management commands

use anyhow::{Context, Result};
use spendwise_core::db::Database;
use spendwise_core::models::Category;

pub fn cmd_categories_list(db: &Database, user_id: i64) -> Result<()> {
    let categories = db.list_categories(user_id)?;

    println!();
    println!("🏷️  Categories");
    println!("   ─────────────────────────────");
    for category in &categories {
        println!(
            "   {:>4}  {:<24} {}{}",
            category.id,
            category.name,
            category.color.as_deref().unwrap_or(""),
            if category.is_system { "  (system)" } else { "" }
        );
    }
    println!();

    Ok(())
}

/// Find a category by name, case-insensitively
fn find_category(db: &Database, user_id: i64, name: &str) -> Result<Category> {
    db.list_categories(user_id)?
        .into_iter()
        .find(|c| c.name.eq_ignore_ascii_case(name.trim()))
        .with_context(|| format!("Category not found: {}", name))
}

pub fn cmd_categories_add(db: &Database, user_id: i64, name: &str, color: Option<&str>) -> Result<()> {
    let category = db.create_category(user_id, name, color)?;
    println!("✅ Created category '{}' (ID: {})", category.name, category.id);
    Ok(())
}

pub fn cmd_categories_rename(db: &Database, user_id: i64, old_name: &str, new_name: &str) -> Result<()> {
    let category = find_category(db, user_id, old_name)?;
    let renamed = db.rename_category(user_id, category.id, new_name)?;
    println!("✅ Renamed '{}' to '{}'", category.name, renamed.name);
    Ok(())
}

pub fn cmd_categories_delete(db: &Database, user_id: i64, name: &str) -> Result<()> {
    let category = find_category(db, user_id, name)?;
    let reset = db.delete_category(user_id, category.id)?;
    println!("✅ Deleted category '{}'", category.name);
    if reset > 0 {
        println!("   {} transaction(s) moved back to Uncategorized", reset);
    }
    Ok(())
}

pub fn cmd_categories_reset(db: &Database, user_id: i64, yes: bool) -> Result<()> {
    if !yes {
        println!("⚠️  This restores the default categories and uncategorizes every transaction.");
        println!("   Cached merchant suggestions are kept.");
        println!("   Run again with --yes to proceed.");
        return Ok(());
    }

    let categories = db.reset_categories(user_id)?;
    println!("✅ Restored {} default categories", categories.len());
    Ok(())
}

/// Reorder categories by name
pub fn cmd_categories_reorder(db: &Database, user_id: i64, names: &[String]) -> Result<()> {
    let ids = names
        .iter()
        .map(|name| find_category(db, user_id, name).map(|c| c.id))
        .collect::<Result<Vec<_>>>()?;

    let categories = db.reorder_categories(user_id, &ids)?;
    let order: Vec<&str> = categories.iter().map(|c| c.name.as_str()).collect();
    println!("✅ New order: {}", order.join(", "));
    Ok(())
}
