//! Account directory: account id → account name (C2).
//!
//! A process-local, append-only cache with single-writer-on-miss semantics,
//! grounded on the per-account health-state cache in this codebase's
//! provider-health tracking: a shared `RwLock<HashMap<..>>` behind a small
//! struct, safe for concurrent reads with lookups serialized only on miss.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::types::AccountId;

/// Resolves an account id to its display name. The production
/// implementation calls the organizations API; [`StaticAccountNames`] is a
/// fixture for tests.
#[async_trait]
pub trait AccountNameLookup: Send + Sync {
    async fn lookup(&self, account_id: &AccountId) -> Result<String>;
}

/// A fixture lookup that returns a pre-populated name or the account id
/// itself when unknown.
pub struct StaticAccountNames(HashMap<AccountId, String>);

impl StaticAccountNames {
    pub fn new(names: HashMap<AccountId, String>) -> Self {
        Self(names)
    }
}

#[async_trait]
impl AccountNameLookup for StaticAccountNames {
    async fn lookup(&self, account_id: &AccountId) -> Result<String> {
        Ok(self
            .0
            .get(account_id)
            .cloned()
            .unwrap_or_else(|| account_id.clone()))
    }
}

/// Process-local account-name cache. Safe for concurrent reads; inserts on
/// a cache miss are serialized by the write lock but never block other
/// readers of already-cached entries for long since misses are rare after
/// warm-up.
pub struct AccountDirectory {
    cache: Arc<RwLock<HashMap<AccountId, String>>>,
    lookup: Arc<dyn AccountNameLookup>,
}

impl AccountDirectory {
    pub fn new(lookup: Arc<dyn AccountNameLookup>) -> Self {
        Self {
            cache: Arc::new(RwLock::new(HashMap::new())),
            lookup,
        }
    }

    /// Resolves `account_id` to a display name, populating the cache on
    /// first lookup.
    pub async fn resolve(&self, account_id: &AccountId) -> Result<String> {
        if let Some(name) = self.cache.read().await.get(account_id) {
            return Ok(name.clone());
        }

        let name = self.lookup.lookup(account_id).await?;
        self.cache
            .write()
            .await
            .entry(account_id.clone())
            .or_insert_with(|| name.clone());
        Ok(name)
    }

    /// Number of entries currently cached, for diagnostics/tests.
    pub async fn cached_len(&self) -> usize {
        self.cache.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_and_caches() {
        let mut names = HashMap::new();
        names.insert("111111111111".to_string(), "prod".to_string());
        let directory = AccountDirectory::new(Arc::new(StaticAccountNames::new(names)));

        assert_eq!(
            directory.resolve(&"111111111111".to_string()).await.unwrap(),
            "prod"
        );
        assert_eq!(directory.cached_len().await, 1);

        // Unknown accounts fall back to the id itself, and are cached too.
        assert_eq!(
            directory.resolve(&"222222222222".to_string()).await.unwrap(),
            "222222222222"
        );
        assert_eq!(directory.cached_len().await, 2);
    }
}
