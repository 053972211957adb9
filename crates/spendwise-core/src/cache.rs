//! Merchant categorization cache
//!
//! The categorization engine only sees this trait, so it can run against the
//! database or an in-memory double. Implementations must upsert atomically on
//! (user, merchant key) and never move `last_used_at` backwards.

use crate::db::{CacheSuggestion, Database};
use crate::error::Result;
use crate::models::MerchantCacheEntry;

/// Persistent (user, merchant key) → categorization mapping
pub trait MerchantCategorizationCache: Send + Sync {
    /// Look up an entry; `None` is a miss
    fn get(&self, user_id: i64, merchant_key: &str) -> Result<Option<MerchantCacheEntry>>;

    /// Insert or update an entry, returning what is now stored
    fn put(
        &self,
        user_id: i64,
        merchant_key: &str,
        suggestion: &CacheSuggestion,
    ) -> Result<MerchantCacheEntry>;

    /// Record a hit. Returns false when the entry doesn't exist.
    fn touch(&self, user_id: i64, merchant_key: &str) -> Result<bool>;
}

impl MerchantCategorizationCache for Database {
    fn get(&self, user_id: i64, merchant_key: &str) -> Result<Option<MerchantCacheEntry>> {
        self.get_cached_merchant(user_id, merchant_key)
    }

    fn put(
        &self,
        user_id: i64,
        merchant_key: &str,
        suggestion: &CacheSuggestion,
    ) -> Result<MerchantCacheEntry> {
        self.put_cached_merchant(user_id, merchant_key, suggestion)
    }

    fn touch(&self, user_id: i64, merchant_key: &str) -> Result<bool> {
        self.touch_cached_merchant(user_id, merchant_key)
    }
}
