//! Category operations
//!
//! Each user owns a category list that doubles as the allow-list for AI
//! suggestions. Defaults are seeded lazily the first time a user's list is
//! read. "Other" is a system category and cannot be renamed or deleted.

use rusqlite::{params, OptionalExtension};
use tracing::info;

use super::recurring::INVALIDATE_SNAPSHOT_SQL;
use super::Database;
use crate::error::{Error, Result};
use crate::models::{Category, UNCATEGORIZED};

/// Name of the immutable fallback category
pub const SYSTEM_CATEGORY: &str = "Other";

/// Seeded categories: (name, color)
pub const DEFAULT_CATEGORIES: &[(&str, &str)] = &[
    ("Groceries", "#22c55e"),
    ("Rent", "#ef4444"),
    ("Transport", "#f59e0b"),
    ("Eating Out", "#3b82f6"),
    ("Shopping", "#8b5cf6"),
    ("Subscription", "#ec4899"),
    ("Utilities", "#6366f1"),
    ("Income", "#10b981"),
];

const SYSTEM_CATEGORY_COLOR: &str = "#6b7280";
const SYSTEM_SORT_ORDER: i64 = 99;
const MAX_CATEGORY_NAME: usize = 50;

impl Database {
    /// List a user's categories in display order, seeding defaults if empty
    pub fn list_categories(&self, user_id: i64) -> Result<Vec<Category>> {
        let categories = self.query_categories(user_id)?;
        if !categories.is_empty() {
            return Ok(categories);
        }

        self.seed_default_categories(user_id)?;
        self.query_categories(user_id)
    }

    /// Category names valid for assignment (never includes "Uncategorized")
    pub fn category_names(&self, user_id: i64) -> Result<Vec<String>> {
        Ok(self
            .list_categories(user_id)?
            .into_iter()
            .map(|c| c.name)
            .collect())
    }

    /// Canonical spelling of a category name, matched case-insensitively
    pub fn resolve_category_name(&self, user_id: i64, name: &str) -> Result<Option<String>> {
        let wanted = name.trim();
        if wanted.eq_ignore_ascii_case(UNCATEGORIZED) {
            return Ok(Some(UNCATEGORIZED.to_string()));
        }
        Ok(self
            .category_names(user_id)?
            .into_iter()
            .find(|n| n.eq_ignore_ascii_case(wanted)))
    }

    /// Create a category, appended before the system category
    pub fn create_category(
        &self,
        user_id: i64,
        name: &str,
        color: Option<&str>,
    ) -> Result<Category> {
        let name = validate_category_name(name)?;
        let existing = self.list_categories(user_id)?;

        if existing.iter().any(|c| c.name.eq_ignore_ascii_case(&name)) {
            return Err(Error::Validation(format!(
                "Category '{}' already exists",
                name
            )));
        }

        let sort_order = existing.iter().filter(|c| !c.is_system).count() as i64 + 1;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO categories (user_id, name, color, sort_order, is_system) VALUES (?, ?, ?, ?, 0)",
            params![user_id, name, color.unwrap_or(SYSTEM_CATEGORY_COLOR), sort_order],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);

        self.get_category(user_id, id)?
            .ok_or_else(|| Error::NotFound(format!("Category {}", id)))
    }

    /// Get one of a user's categories by ID
    pub fn get_category(&self, user_id: i64, id: i64) -> Result<Option<Category>> {
        let conn = self.conn()?;
        let category = conn
            .query_row(
                "SELECT id, user_id, name, color, sort_order, is_system
                 FROM categories WHERE user_id = ? AND id = ?",
                params![user_id, id],
                Self::row_to_category,
            )
            .optional()?;
        Ok(category)
    }

    /// Rename a category, carrying the new name into transactions and cache
    pub fn rename_category(&self, user_id: i64, id: i64, new_name: &str) -> Result<Category> {
        let new_name = validate_category_name(new_name)?;
        let category = self.editable_category(user_id, id)?;

        if !category.name.eq_ignore_ascii_case(&new_name)
            && self
                .query_categories(user_id)?
                .iter()
                .any(|c| c.id != id && c.name.eq_ignore_ascii_case(&new_name))
        {
            return Err(Error::Validation(format!(
                "Category '{}' already exists",
                new_name
            )));
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE categories SET name = ? WHERE user_id = ? AND id = ?",
            params![new_name, user_id, id],
        )?;
        let moved = tx.execute(
            "UPDATE transactions SET category = ? WHERE user_id = ? AND category = ?",
            params![new_name, user_id, category.name],
        )?;
        tx.execute(
            "UPDATE merchant_cache SET suggested_category = ? WHERE user_id = ? AND suggested_category = ?",
            params![new_name, user_id, category.name],
        )?;
        tx.execute(
            INVALIDATE_SNAPSHOT_SQL,
            params![user_id],
        )?;
        tx.commit()?;
        drop(conn);

        info!(user_id, from = %category.name, to = %new_name, transactions = moved, "Renamed category");

        self.get_category(user_id, id)?
            .ok_or_else(|| Error::NotFound(format!("Category {}", id)))
    }

    /// Delete a category. Its transactions fall back to "Uncategorized";
    /// cached merchant suggestions are kept. Returns the number of
    /// transactions reset.
    pub fn delete_category(&self, user_id: i64, id: i64) -> Result<usize> {
        let category = self.editable_category(user_id, id)?;

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let reset = tx.execute(
            "UPDATE transactions SET category = ?, category_source = 'uncategorized'
             WHERE user_id = ? AND category = ?",
            params![UNCATEGORIZED, user_id, category.name],
        )?;
        tx.execute(
            "DELETE FROM categories WHERE user_id = ? AND id = ?",
            params![user_id, id],
        )?;
        tx.execute(
            INVALIDATE_SNAPSHOT_SQL,
            params![user_id],
        )?;
        tx.commit()?;

        info!(user_id, category = %category.name, transactions = reset, "Deleted category");
        Ok(reset)
    }

    /// Restore the default categories. Every transaction of the user becomes
    /// uncategorized; cached merchant suggestions are kept.
    pub fn reset_categories(&self, user_id: i64) -> Result<Vec<Category>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let reset = tx.execute(
            "UPDATE transactions SET category = ?, category_source = 'uncategorized' WHERE user_id = ?",
            params![UNCATEGORIZED, user_id],
        )?;
        tx.execute("DELETE FROM categories WHERE user_id = ?", params![user_id])?;
        tx.execute(
            INVALIDATE_SNAPSHOT_SQL,
            params![user_id],
        )?;
        tx.commit()?;
        drop(conn);

        info!(user_id, transactions = reset, "Reset categories to defaults");
        self.list_categories(user_id)
    }

    /// Reorder categories by ID. Listed categories take positions in list
    /// order; the system category always stays last.
    pub fn reorder_categories(&self, user_id: i64, category_ids: &[i64]) -> Result<Vec<Category>> {
        if category_ids.is_empty() {
            return Err(Error::Validation("category_ids must not be empty".into()));
        }

        let existing = self.list_categories(user_id)?;
        let mut seen = std::collections::HashSet::new();
        for id in category_ids {
            if !seen.insert(*id) || !existing.iter().any(|c| c.id == *id) {
                return Err(Error::Validation(format!("Invalid category id: {}", id)));
            }
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for (position, id) in category_ids.iter().enumerate() {
            tx.execute(
                "UPDATE categories SET sort_order = ? WHERE user_id = ? AND id = ? AND is_system = 0",
                params![position as i64 + 1, user_id, id],
            )?;
        }
        tx.commit()?;
        drop(conn);

        info!(user_id, count = category_ids.len(), "Reordered categories");
        self.list_categories(user_id)
    }

    fn editable_category(&self, user_id: i64, id: i64) -> Result<Category> {
        let category = self
            .get_category(user_id, id)?
            .ok_or_else(|| Error::NotFound("Category not found".to_string()))?;
        if category.is_system {
            return Err(Error::Validation(
                "System categories cannot be modified".to_string(),
            ));
        }
        Ok(category)
    }

    fn query_categories(&self, user_id: i64) -> Result<Vec<Category>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, name, color, sort_order, is_system
             FROM categories WHERE user_id = ? ORDER BY sort_order, id",
        )?;
        let categories = stmt
            .query_map(params![user_id], Self::row_to_category)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(categories)
    }

    fn seed_default_categories(&self, user_id: i64) -> Result<()> {
        let conn = self.conn()?;
        for (i, (name, color)) in DEFAULT_CATEGORIES.iter().enumerate() {
            conn.execute(
                "INSERT OR IGNORE INTO categories (user_id, name, color, sort_order, is_system)
                 VALUES (?, ?, ?, ?, 0)",
                params![user_id, name, color, i as i64 + 1],
            )?;
        }
        conn.execute(
            "INSERT OR IGNORE INTO categories (user_id, name, color, sort_order, is_system)
             VALUES (?, ?, ?, ?, 1)",
            params![user_id, SYSTEM_CATEGORY, SYSTEM_CATEGORY_COLOR, SYSTEM_SORT_ORDER],
        )?;
        info!(user_id, "Seeded default categories");
        Ok(())
    }

    fn row_to_category(row: &rusqlite::Row) -> rusqlite::Result<Category> {
        Ok(Category {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            color: row.get(3)?,
            sort_order: row.get(4)?,
            is_system: row.get(5)?,
        })
    }
}

fn validate_category_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_CATEGORY_NAME {
        return Err(Error::Validation(format!(
            "Category name must be 1-{} characters",
            MAX_CATEGORY_NAME
        )));
    }
    if name.eq_ignore_ascii_case(UNCATEGORIZED) {
        return Err(Error::Validation(format!(
            "'{}' is reserved",
            UNCATEGORIZED
        )));
    }
    Ok(name.to_string())
}
