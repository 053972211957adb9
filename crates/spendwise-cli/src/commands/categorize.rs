//! Categorize command implementation

use anyhow::Result;
use spendwise_core::ai::{AIBackend, AIClient};
use spendwise_core::categorize::{BatchCategorizationResult, BatchCategorizer};
use spendwise_core::db::Database;

pub async fn cmd_categorize(
    db: &Database,
    user_id: i64,
    ai: Option<&AIClient>,
    ids: &[i64],
    dry_run: bool,
) -> Result<BatchCategorizationResult> {
    match ai {
        Some(client) => println!("🤖 AI provider: {} ({})", client.host(), client.model()),
        None => {
            println!("💡 Tip: Set OPENAI_COMPATIBLE_API_KEY to categorize new merchants");
            println!("   Only merchants already in the cache will be categorized.");
        }
    }
    if dry_run {
        println!("   Dry run: transactions will not be changed");
    }

    let categorizer = BatchCategorizer::new(db, ai);
    let result = if ids.is_empty() {
        categorizer.categorize_uncategorized(user_id, !dry_run).await?
    } else {
        categorizer.categorize_batch(user_id, ids, !dry_run).await?
    };

    if result.total_processed == 0 {
        println!("✅ Nothing to categorize.");
        return Ok(result);
    }

    print_categorization(&result);
    Ok(result)
}

/// Print per-transaction outcomes and the totals
pub(crate) fn print_categorization(result: &BatchCategorizationResult) {
    for r in &result.results {
        match &r.error {
            Some(err) => println!("   ❌ #{:<6} {}", r.transaction_id, err),
            None => println!(
                "   {} #{:<6} {} ({})",
                if r.applied { "✓" } else { "·" },
                r.transaction_id,
                r.category,
                r.confidence.as_str()
            ),
        }
    }

    println!();
    println!(
        "   Processed: {}  Successful: {}  Failed: {}",
        result.total_processed, result.successful, result.failed
    );
    if result.failed > 0 {
        println!("   ⚠️  Failed transactions stay uncategorized; run again to retry.");
    }
}
