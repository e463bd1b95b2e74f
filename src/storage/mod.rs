// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Collaborator
//!
//! Async, scope-namespaced key/value storage. The SDK only consumes this
//! interface; persistent backends (browser storage, device keychains,
//! embedded databases) live with the host application.
//!
//! ## Scopes
//!
//! ```text
//! keymanager/
//!   key.<LEVEL>     # StoredKey (PKCS#8 PEM, public key, challenge MAC)
//! session/
//!   user            # SessionRecord (account, username, status)
//! ```

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

pub use memory::{InMemoryStorage, InMemoryStorageFactory};

/// Error type for storage operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// Value could not be (de)serialized
    #[error("Storage serialization error: {0}")]
    Serialization(String),
    /// Backend failure (I/O, lock poisoning, quota)
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Stable error code.
    pub fn code(&self) -> &'static str {
        match self {
            StorageError::Serialization(_) => "StorageSerialization",
            StorageError::Backend(_) => "StorageBackend",
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// One storage scope.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Read a value, `None` if the key was never stored.
    async fn retrieve(&self, key: &str) -> StorageResult<Option<serde_json::Value>>;

    /// Write a value, replacing any previous one.
    async fn store(&self, key: &str, value: serde_json::Value) -> StorageResult<()>;

    /// Delete a single key. Deleting a missing key is not an error.
    async fn remove(&self, key: &str) -> StorageResult<()>;

    /// Delete every key in this scope.
    async fn clear(&self) -> StorageResult<()>;
}

impl dyn Storage {
    /// Read and deserialize a value.
    pub async fn retrieve_json<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        match self.retrieve(key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Serialize and write a value.
    pub async fn store_json<T: Serialize + Sync>(&self, key: &str, value: &T) -> StorageResult<()> {
        let value = serde_json::to_value(value)?;
        self.store(key, value).await
    }
}

/// Creates storage scopes.
pub trait StorageFactory: Send + Sync {
    fn create(&self, scope: &str) -> Arc<dyn Storage>;
}
