//! Batch categorization engine
//!
//! Resolves a set of transactions to categories merchant by merchant:
//! cache hits resolve immediately, misses go to the AI provider in bounded
//! batches, and merchants the provider fails on are retried a fixed number of
//! times. A batch never fails wholesale because of the provider; residual
//! failures are reported per transaction.
//!
//! Provider output is untrusted. Categories are matched against the user's
//! allow-list (anything else becomes "Uncategorized") and confidences are
//! parsed leniently before anything is cached or applied.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::ai::{AIBackend, AIClient, MerchantContext, MerchantSuggestion};
use crate::cache::MerchantCategorizationCache;
use crate::db::{CacheSuggestion, Database};
use crate::error::{Error, Result};
use crate::models::{CategorySource, Confidence, Transaction, UNCATEGORIZED};

/// Longest note kept from a provider suggestion
pub const MAX_NOTE_CHARS: usize = 30;

/// Sample descriptions sent to the provider per merchant
const MAX_SAMPLES: usize = 3;

/// Tuning for batch categorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorizationConfig {
    /// Maximum merchants per provider call
    pub batch_size: usize,
    /// Extra attempts for merchants a call failed on
    pub max_retries: usize,
}

impl Default for CategorizationConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_retries: 2,
        }
    }
}

/// Outcome for one requested transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerTransactionResult {
    pub transaction_id: i64,
    pub category: String,
    pub note: Option<String>,
    pub confidence: Confidence,
    /// Whether the category was written to the transaction
    pub applied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of a batch call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchCategorizationResult {
    pub results: Vec<PerTransactionResult>,
    pub total_processed: usize,
    pub successful: usize,
    pub failed: usize,
}

/// How one merchant key was resolved
#[derive(Debug, Clone)]
enum Resolution {
    Resolved {
        category: String,
        note: Option<String>,
        confidence: Confidence,
        explanation: Option<String>,
    },
    Failed(String),
}

/// Outcome of categorizing a single merchant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerchantCategorization {
    pub merchant_key: String,
    pub category: String,
    pub note: Option<String>,
    pub confidence: Confidence,
    pub explanation: Option<String>,
    /// Answered from the cache without a provider call
    pub cached: bool,
    /// Uncategorized transactions of this merchant that took the category
    pub applied_count: usize,
}

/// Batch categorization engine
///
/// Transactions are read from `db`; cached categorizations go through
/// `cache`, which defaults to the same database.
pub struct BatchCategorizer<'a> {
    db: &'a Database,
    cache: &'a dyn MerchantCategorizationCache,
    ai: Option<&'a AIClient>,
    config: CategorizationConfig,
}

impl<'a> BatchCategorizer<'a> {
    /// Create an engine backed by the database cache
    pub fn new(db: &'a Database, ai: Option<&'a AIClient>) -> Self {
        Self {
            db,
            cache: db,
            ai,
            config: CategorizationConfig::default(),
        }
    }

    /// Use a different cache implementation
    pub fn with_cache(mut self, cache: &'a dyn MerchantCategorizationCache) -> Self {
        self.cache = cache;
        self
    }

    /// Override batch size and retry count
    pub fn with_config(mut self, config: CategorizationConfig) -> Self {
        self.config = CategorizationConfig {
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
        };
        self
    }

    /// Categorize every transaction of the user still marked uncategorized
    pub async fn categorize_uncategorized(
        &self,
        user_id: i64,
        auto_apply: bool,
    ) -> Result<BatchCategorizationResult> {
        let ids = self.db.list_uncategorized_ids(user_id)?;
        self.categorize_batch(user_id, &ids, auto_apply).await
    }

    /// Categorize the given transactions
    ///
    /// Unknown ids (or ids owned by another user) fail the whole call with a
    /// validation error before any work is done. Duplicate ids are processed
    /// once. With `auto_apply`, resolved categories are written to
    /// transactions whose category was not set by a human.
    pub async fn categorize_batch(
        &self,
        user_id: i64,
        transaction_ids: &[i64],
        auto_apply: bool,
    ) -> Result<BatchCategorizationResult> {
        let mut seen = HashSet::new();
        let ids: Vec<i64> = transaction_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();

        if ids.is_empty() {
            return Ok(BatchCategorizationResult::default());
        }

        let transactions = self.db.get_transactions_by_ids(user_id, &ids)?;
        let by_id: HashMap<i64, &Transaction> = transactions.iter().map(|t| (t.id, t)).collect();

        let unknown: Vec<String> = ids
            .iter()
            .filter(|id| !by_id.contains_key(id))
            .map(|id| id.to_string())
            .collect();
        if !unknown.is_empty() {
            return Err(Error::Validation(format!(
                "Unknown transaction ids: {}",
                unknown.join(", ")
            )));
        }

        // Requested order, without transactions a human already categorized
        let ordered: Vec<&Transaction> = ids.iter().filter_map(|id| by_id.get(id).copied()).collect();
        let pending: Vec<&Transaction> = ordered
            .iter()
            .copied()
            .filter(|t| t.category_source != CategorySource::User)
            .collect();

        let categories = self.db.category_names(user_id)?;
        let resolutions = self.resolve_merchants(user_id, &pending, &categories).await?;

        let mut results = Vec::with_capacity(ordered.len());
        let mut any_applied = false;

        for tx in ordered {
            if tx.category_source == CategorySource::User {
                results.push(PerTransactionResult {
                    transaction_id: tx.id,
                    category: tx.category.clone(),
                    note: tx.note_user.clone(),
                    confidence: Confidence::High,
                    applied: false,
                    error: None,
                });
                continue;
            }

            let result = match resolutions.get(&tx.merchant_key) {
                Some(Resolution::Resolved {
                    category,
                    note,
                    confidence,
                    ..
                }) => {
                    let applied = auto_apply
                        && category != UNCATEGORIZED
                        && self
                            .db
                            .apply_ai_category(user_id, tx.id, category, note.as_deref())?;
                    any_applied |= applied;
                    PerTransactionResult {
                        transaction_id: tx.id,
                        category: category.clone(),
                        note: note.clone(),
                        confidence: *confidence,
                        applied,
                        error: None,
                    }
                }
                Some(Resolution::Failed(error)) => failed_result(tx.id, error.clone()),
                None => failed_result(tx.id, "Merchant was not resolved".to_string()),
            };
            results.push(result);
        }

        if any_applied {
            self.db.invalidate_recurring_snapshot(user_id)?;
        }

        let failed = results.iter().filter(|r| r.error.is_some()).count();
        let summary = BatchCategorizationResult {
            total_processed: results.len(),
            successful: results.len() - failed,
            failed,
            results,
        };

        info!(
            user_id,
            total = summary.total_processed,
            successful = summary.successful,
            failed = summary.failed,
            "Batch categorization complete"
        );
        Ok(summary)
    }

    /// Categorize one merchant and apply the result to its uncategorized
    /// transactions.
    ///
    /// A valid cache entry answers without a provider call. Otherwise the
    /// provider is asked about this merchant alone, using `samples` or, when
    /// none are given, the user's recent descriptions for the merchant.
    pub async fn categorize_merchant(
        &self,
        user_id: i64,
        merchant_key: &str,
        samples: &[String],
    ) -> Result<MerchantCategorization> {
        let merchant_key = merchant_key.trim();
        if merchant_key.is_empty() {
            return Err(Error::Validation("merchant_key must not be empty".to_string()));
        }

        let recent = self
            .db
            .merchant_transactions(user_id, merchant_key, MAX_SAMPLES)?;
        let mut sample_descriptions: Vec<String> = samples
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .take(MAX_SAMPLES)
            .collect();
        if sample_descriptions.is_empty() {
            sample_descriptions = recent.iter().map(|t| t.description_raw.clone()).collect();
        }
        if sample_descriptions.is_empty() {
            sample_descriptions.push(merchant_key.to_string());
        }

        let context = MerchantContext {
            merchant_key: merchant_key.to_string(),
            sample_descriptions,
            representative_amount: recent.first().map(|t| t.amount).unwrap_or_default(),
        };

        let categories = self.db.category_names(user_id)?;
        let cached = self
            .cache
            .get(user_id, merchant_key)?
            .filter(|entry| coerce_category(&entry.suggested_category, &categories) != UNCATEGORIZED);

        let (resolution, from_cache) = match cached {
            Some(entry) => {
                self.cache.touch(user_id, merchant_key)?;
                let resolution = Resolution::Resolved {
                    category: coerce_category(&entry.suggested_category, &categories),
                    note: entry.suggested_note,
                    confidence: entry.confidence,
                    explanation: entry.explanation,
                };
                (resolution, true)
            }
            None => {
                let ai = self.ai.ok_or_else(|| {
                    Error::ProviderUnavailable("no AI provider configured".to_string())
                })?;
                let mut resolutions = HashMap::new();
                self.resolve_chunk(user_id, ai, &[context], &categories, &mut resolutions)
                    .await?;
                let resolution = resolutions
                    .remove(merchant_key)
                    .unwrap_or_else(|| Resolution::Failed("Merchant was not resolved".to_string()));
                (resolution, false)
            }
        };

        let (category, note, confidence, explanation) = match resolution {
            Resolution::Resolved {
                category,
                note,
                confidence,
                explanation,
            } => (category, note, confidence, explanation),
            Resolution::Failed(error) => return Err(Error::ProviderUnavailable(error)),
        };

        let applied_count = if category == UNCATEGORIZED {
            0
        } else {
            self.db
                .apply_ai_category_to_merchant(user_id, merchant_key, &category, note.as_deref())?
        };
        if applied_count > 0 {
            self.db.invalidate_recurring_snapshot(user_id)?;
        }

        info!(user_id, merchant_key, category = %category, applied_count, from_cache, "Merchant categorized");
        Ok(MerchantCategorization {
            merchant_key: merchant_key.to_string(),
            category,
            note,
            confidence,
            explanation,
            cached: from_cache,
            applied_count,
        })
    }

    /// Resolve each distinct merchant key among `transactions`
    async fn resolve_merchants(
        &self,
        user_id: i64,
        transactions: &[&Transaction],
        categories: &[String],
    ) -> Result<HashMap<String, Resolution>> {
        let mut resolutions = HashMap::new();
        let mut misses: Vec<MerchantContext> = Vec::new();
        let mut miss_index: HashMap<&str, usize> = HashMap::new();

        for &tx in transactions {
            let key = tx.merchant_key.as_str();
            if resolutions.contains_key(key) {
                continue;
            }
            if let Some(&i) = miss_index.get(key) {
                let samples = &mut misses[i].sample_descriptions;
                if samples.len() < MAX_SAMPLES && !samples.contains(&tx.description_raw) {
                    samples.push(tx.description_raw.clone());
                }
                continue;
            }

            // An entry whose category left the allow-list counts as a miss
            let cached = self.cache.get(user_id, key)?.and_then(|entry| {
                let category = coerce_category(&entry.suggested_category, categories);
                if category == UNCATEGORIZED {
                    debug!(merchant_key = key, stale = %entry.suggested_category, "Stale cache entry");
                    None
                } else {
                    Some((category, entry))
                }
            });

            match cached {
                Some((category, entry)) => {
                    self.cache.touch(user_id, key)?;
                    debug!(merchant_key = key, "Merchant cache hit");
                    resolutions.insert(
                        key.to_string(),
                        Resolution::Resolved {
                            category,
                            note: entry.suggested_note,
                            confidence: entry.confidence,
                            explanation: entry.explanation,
                        },
                    );
                }
                None => {
                    miss_index.insert(key, misses.len());
                    misses.push(MerchantContext {
                        merchant_key: key.to_string(),
                        sample_descriptions: vec![tx.description_raw.clone()],
                        representative_amount: tx.amount,
                    });
                }
            }
        }

        if misses.is_empty() {
            return Ok(resolutions);
        }

        let Some(ai) = self.ai else {
            warn!(merchants = misses.len(), "No AI provider configured");
            for ctx in misses {
                resolutions.insert(
                    ctx.merchant_key,
                    Resolution::Failed("AI provider not configured".to_string()),
                );
            }
            return Ok(resolutions);
        };

        for chunk in misses.chunks(self.config.batch_size) {
            self.resolve_chunk(user_id, ai, chunk, categories, &mut resolutions)
                .await?;
        }

        Ok(resolutions)
    }

    /// Ask the provider about one chunk, retrying only the merchants it failed on
    async fn resolve_chunk(
        &self,
        user_id: i64,
        ai: &AIClient,
        chunk: &[MerchantContext],
        categories: &[String],
        resolutions: &mut HashMap<String, Resolution>,
    ) -> Result<()> {
        let mut pending: Vec<MerchantContext> = chunk.to_vec();
        let mut last_error = String::new();
        let mut attempt = 0;

        while !pending.is_empty() && attempt <= self.config.max_retries {
            attempt += 1;

            let suggestions = match ai.categorize_merchants(&pending, categories).await {
                Ok(suggestions) => suggestions,
                Err(e) => {
                    warn!(attempt, merchants = pending.len(), error = %e, "Categorization attempt failed");
                    last_error = e.to_string();
                    if matches!(e, Error::ProviderUnavailable(_)) {
                        break;
                    }
                    continue;
                }
            };

            let mut by_key: HashMap<String, MerchantSuggestion> = HashMap::new();
            for suggestion in suggestions {
                by_key
                    .entry(suggestion.merchant_key.trim().to_string())
                    .or_insert(suggestion);
            }

            let mut still_pending = Vec::new();
            for ctx in pending {
                match by_key.remove(&ctx.merchant_key) {
                    Some(suggestion) => {
                        let resolution = self.accept(user_id, &ctx.merchant_key, suggestion, categories)?;
                        resolutions.insert(ctx.merchant_key, resolution);
                    }
                    None => still_pending.push(ctx),
                }
            }

            if !still_pending.is_empty() {
                last_error = "No suggestion returned for merchant".to_string();
                debug!(attempt, missing = still_pending.len(), "Provider omitted merchants");
            }
            pending = still_pending;
        }

        for ctx in pending {
            resolutions.insert(ctx.merchant_key, Resolution::Failed(last_error.clone()));
        }
        Ok(())
    }

    /// Validate a provider suggestion and write it through to the cache
    fn accept(
        &self,
        user_id: i64,
        merchant_key: &str,
        suggestion: MerchantSuggestion,
        categories: &[String],
    ) -> Result<Resolution> {
        let category = coerce_category(&suggestion.category, categories);
        let confidence = suggestion
            .confidence
            .as_deref()
            .map(Confidence::parse_lenient)
            .unwrap_or_default();
        let note = suggestion
            .note
            .map(|n| truncate_chars(n.trim(), MAX_NOTE_CHARS))
            .filter(|n| !n.is_empty());

        // A coerced answer is not worth remembering; the next batch asks again
        if category != UNCATEGORIZED {
            self.cache.put(
                user_id,
                merchant_key,
                &CacheSuggestion {
                    category: category.clone(),
                    note: note.clone(),
                    confidence,
                    explanation: suggestion.explanation.clone(),
                },
            )?;
        } else {
            debug!(merchant_key, suggested = %suggestion.category, "Coerced unknown category");
        }

        Ok(Resolution::Resolved {
            category,
            note,
            confidence,
            explanation: suggestion.explanation,
        })
    }
}

fn failed_result(transaction_id: i64, error: String) -> PerTransactionResult {
    PerTransactionResult {
        transaction_id,
        category: UNCATEGORIZED.to_string(),
        note: None,
        confidence: Confidence::Low,
        applied: false,
        error: Some(error),
    }
}

/// Match a category against the allow-list case-insensitively
fn coerce_category(category: &str, allowed: &[String]) -> String {
    let wanted = category.trim();
    allowed
        .iter()
        .find(|c| c.eq_ignore_ascii_case(wanted))
        .cloned()
        .unwrap_or_else(|| UNCATEGORIZED.to_string())
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
