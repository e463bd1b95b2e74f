// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Resolver registry with an LRU cache of resolved documents.
//!
//! Chain-account documents change when keys are rotated or apps are
//! authorized, so entries expire after a TTL and can be invalidated
//! explicitly by whoever pushed the change.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use lru::LruCache;

use super::{ChainDidResolver, DidDocument, DidResolver, DidUrl, JwkDidResolver};
use crate::chain::ChainClient;
use crate::config::SdkConfig;
use crate::error::{Result, SdkError};

/// Default number of cached documents.
pub const DEFAULT_CACHE_CAPACITY: usize = 256;
/// Default lifetime of a cached document.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

struct CacheEntry {
    document: DidDocument,
    inserted_at: Instant,
}

/// Dispatches DID resolution to the resolver registered for its method.
pub struct Resolver {
    resolvers: HashMap<String, Arc<dyn DidResolver>>,
    cache: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::with_cache(DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL)
    }
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty registry with the given cache capacity and TTL.
    pub fn with_cache(capacity: usize, ttl: Duration) -> Self {
        Self {
            resolvers: HashMap::new(),
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            ttl,
        }
    }

    /// Registry with `did:jwk` and the configured chain method.
    pub fn standard(config: &SdkConfig, chain: Arc<dyn ChainClient>) -> Self {
        Self::new()
            .register(Arc::new(JwkDidResolver))
            .register(Arc::new(ChainDidResolver::new(
                chain,
                config.chain_did_method.clone(),
                config.chain_id.clone(),
            )))
    }

    /// Add (or replace) the resolver for its method.
    pub fn register(mut self, resolver: Arc<dyn DidResolver>) -> Self {
        self.resolvers.insert(resolver.method().to_string(), resolver);
        self
    }

    pub fn supports(&self, method: &str) -> bool {
        self.resolvers.contains_key(method)
    }

    /// Resolve `did`, serving from cache when fresh.
    pub async fn resolve(&self, did: &DidUrl) -> Result<DidDocument> {
        let key = did.did();
        if let Some(document) = self.cached(&key) {
            return Ok(document);
        }
        self.resolve_uncached(did).await
    }

    /// Resolve `did` from its method resolver and refresh the cache.
    pub async fn resolve_uncached(&self, did: &DidUrl) -> Result<DidDocument> {
        let resolver = self
            .resolvers
            .get(did.method())
            .ok_or_else(|| SdkError::ResolverNotFound(did.method().to_string()))?;
        let document = resolver.resolve(did).await?;

        if let Ok(mut cache) = self.cache.lock() {
            cache.put(
                did.did(),
                CacheEntry {
                    document: document.clone(),
                    inserted_at: Instant::now(),
                },
            );
        }
        Ok(document)
    }

    /// Drop the cached document of `did`.
    pub fn invalidate(&self, did: &DidUrl) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.pop(&did.did());
        }
    }

    fn cached(&self, key: &str) -> Option<DidDocument> {
        let mut cache = self.cache.lock().ok()?;
        if let Some(entry) = cache.get(key) {
            if entry.inserted_at.elapsed() < self.ttl {
                return Some(entry.document.clone());
            }
            cache.pop(key);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{AccountName, InMemoryChain};
    use crate::did::{did_from_public_key, ChainDid};
    use crate::keys::{generate_random_private_key, KeyLevel, PublicKey};

    fn key() -> PublicKey {
        PublicKey::from_signing_key(&generate_random_private_key())
    }

    #[tokio::test]
    async fn unknown_method_is_reported() {
        let resolver = Resolver::new().register(Arc::new(JwkDidResolver));
        let did: DidUrl = "did:web:example.com".parse().unwrap();
        let err = resolver.resolve(&did).await.unwrap_err();
        assert!(matches!(err, SdkError::ResolverNotFound(ref m) if m == "web"));
    }

    #[tokio::test]
    async fn cache_serves_until_invalidated() {
        let chain = InMemoryChain::new();
        let account: AccountName = "alice".parse().unwrap();
        let first = key();
        chain
            .create_person(&account, "alice", "salt", &[(KeyLevel::Local, first.clone())])
            .await;

        let config = SdkConfig::default();
        let resolver = Resolver::standard(&config, Arc::new(chain.clone()));
        let url = ChainDid::new(config.chain_id.clone(), account.clone())
            .with_permission("local")
            .to_url(&config.chain_did_method);

        let doc = resolver.resolve(&url).await.unwrap();
        assert_eq!(doc.keys_for(&url), vec![&first]);

        // Re-register the person with a new key behind the cache's back.
        let second = key();
        chain
            .create_person(&account, "alice", "salt", &[(KeyLevel::Local, second.clone())])
            .await;
        let doc = resolver.resolve(&url).await.unwrap();
        assert_eq!(doc.keys_for(&url), vec![&first]);

        resolver.invalidate(&url);
        let doc = resolver.resolve(&url).await.unwrap();
        assert_eq!(doc.keys_for(&url), vec![&second]);
    }

    #[tokio::test]
    async fn expired_entries_are_refetched() {
        let resolver = Resolver::with_cache(4, Duration::ZERO).register(Arc::new(JwkDidResolver));
        let did = did_from_public_key(&key()).unwrap();
        resolver.resolve(&did).await.unwrap();
        assert!(resolver.cached(&did.did()).is_none());
    }
}
