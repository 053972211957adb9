//! Import command implementation

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use spendwise_core::{
    ai::AIClient,
    categorize::BatchCategorizer,
    db::Database,
    import::{import_csv, ImportSummary},
};

use super::categorize::print_categorization;

pub async fn cmd_import(
    db: &Database,
    user_id: i64,
    file: &Path,
    account_id: Option<i64>,
    categorize: bool,
    ai: Option<&AIClient>,
) -> Result<ImportSummary> {
    println!("📥 Importing {}...", file.display());

    let csv_file =
        File::open(file).with_context(|| format!("Failed to open file: {}", file.display()))?;
    let summary = import_csv(db, user_id, csv_file, account_id)?;

    println!("✅ Import complete!");
    println!("   Imported: {}", summary.inserted_count);
    println!("   Skipped: {}", summary.skipped_count);
    if summary.failed_rows > 0 {
        println!("   ⚠️  Unreadable rows: {}", summary.failed_rows);
    }
    if let Some(id) = summary.account_id {
        println!("   Account: #{}", id);
    }

    if categorize && !summary.inserted_ids.is_empty() {
        println!();
        println!("🏷️  Categorizing imported transactions...");
        if ai.is_none() {
            println!("   💡 Tip: Set OPENAI_COMPATIBLE_API_KEY so new merchants can be categorized");
        }

        let result = BatchCategorizer::new(db, ai)
            .categorize_batch(user_id, &summary.inserted_ids, true)
            .await?;
        print_categorization(&result);
    }

    Ok(summary)
}
