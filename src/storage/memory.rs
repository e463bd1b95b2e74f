// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory storage backend.
//!
//! Scopes created from the same factory share one map, so two handles on
//! the same scope observe each other's writes (like two tabs sharing
//! browser storage).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Storage, StorageFactory, StorageResult};

type Scopes = HashMap<String, HashMap<String, serde_json::Value>>;

/// Factory for [`InMemoryStorage`] scopes.
#[derive(Clone, Default)]
pub struct InMemoryStorageFactory {
    scopes: Arc<RwLock<Scopes>>,
}

impl InMemoryStorageFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held in a scope.
    pub async fn len(&self, scope: &str) -> usize {
        self.scopes.read().await.get(scope).map_or(0, HashMap::len)
    }
}

impl StorageFactory for InMemoryStorageFactory {
    fn create(&self, scope: &str) -> Arc<dyn Storage> {
        Arc::new(InMemoryStorage {
            scope: scope.to_string(),
            scopes: Arc::clone(&self.scopes),
        })
    }
}

/// A single in-memory scope.
pub struct InMemoryStorage {
    scope: String,
    scopes: Arc<RwLock<Scopes>>,
}

impl InMemoryStorage {
    /// Standalone scope not shared with any factory.
    pub fn standalone(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            scopes: Arc::default(),
        }
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn retrieve(&self, key: &str) -> StorageResult<Option<serde_json::Value>> {
        let scopes = self.scopes.read().await;
        Ok(scopes.get(&self.scope).and_then(|s| s.get(key)).cloned())
    }

    async fn store(&self, key: &str, value: serde_json::Value) -> StorageResult<()> {
        let mut scopes = self.scopes.write().await;
        scopes
            .entry(self.scope.clone())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        let mut scopes = self.scopes.write().await;
        if let Some(scope) = scopes.get_mut(&self.scope) {
            scope.remove(key);
        }
        Ok(())
    }

    async fn clear(&self) -> StorageResult<()> {
        self.scopes.write().await.remove(&self.scope);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        name: String,
    }

    #[tokio::test]
    async fn scopes_are_isolated() {
        let factory = InMemoryStorageFactory::new();
        let a = factory.create("a");
        let b = factory.create("b");

        a.store("k", serde_json::json!(1)).await.unwrap();
        assert_eq!(a.retrieve("k").await.unwrap(), Some(serde_json::json!(1)));
        assert_eq!(b.retrieve("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn same_scope_handles_share_data() {
        let factory = InMemoryStorageFactory::new();
        let first = factory.create("session");
        let second = factory.create("session");

        first
            .store_json("user", &Record { name: "alice".into() })
            .await
            .unwrap();
        let read: Option<Record> = second.retrieve_json("user").await.unwrap();
        assert_eq!(read, Some(Record { name: "alice".into() }));
    }

    #[tokio::test]
    async fn clear_only_touches_own_scope() {
        let factory = InMemoryStorageFactory::new();
        let a = factory.create("a");
        let b = factory.create("b");
        a.store("k", serde_json::json!("x")).await.unwrap();
        b.store("k", serde_json::json!("y")).await.unwrap();

        a.clear().await.unwrap();

        assert_eq!(factory.len("a").await, 0);
        assert_eq!(factory.len("b").await, 1);
    }

    #[tokio::test]
    async fn remove_missing_key_is_ok() {
        let storage = InMemoryStorage::standalone("x");
        storage.remove("nothing").await.unwrap();
    }
}
