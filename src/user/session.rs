// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session record of the wallet user.
//!
//! ## Storage Layout
//!
//! ```text
//! session/
//!   user    # SessionRecord
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::chain::{AccountName, Person, PersonStatus};
use crate::error::Result;
use crate::storage::{Storage, StorageFactory};

/// Storage scope of [`SessionState`].
pub const SESSION_SCOPE: &str = "session";

const SESSION_KEY: &str = "user";

/// Who the wallet is signed in as.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_name: Option<AccountName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Salt of the password-derived owner key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_salt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PersonStatus>,
}

impl SessionRecord {
    pub fn from_person(person: &Person, username: &str) -> Self {
        Self {
            account_name: Some(person.account_name.clone()),
            username: Some(username.to_string()),
            password_salt: Some(person.password_salt.clone()),
            status: Some(person.status),
        }
    }
}

/// Persisted [`SessionRecord`].
pub struct SessionState {
    storage: Arc<dyn Storage>,
}

impl SessionState {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub fn from_factory(factory: &dyn StorageFactory) -> Self {
        Self::new(factory.create(SESSION_SCOPE))
    }

    /// Current record, empty when nobody is signed in.
    pub async fn load(&self) -> Result<SessionRecord> {
        Ok(self
            .storage
            .retrieve_json::<SessionRecord>(SESSION_KEY)
            .await?
            .unwrap_or_default())
    }

    pub async fn save(&self, record: &SessionRecord) -> Result<()> {
        self.storage.store_json(SESSION_KEY, record).await?;
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        self.storage.clear().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorageFactory;

    #[tokio::test]
    async fn empty_until_saved() {
        let factory = InMemoryStorageFactory::new();
        let session = SessionState::from_factory(&factory);
        assert_eq!(session.load().await.unwrap(), SessionRecord::default());

        let record = SessionRecord {
            account_name: Some("alice".parse().unwrap()),
            username: Some("alice".into()),
            password_salt: None,
            status: Some(PersonStatus::Ready),
        };
        session.save(&record).await.unwrap();
        assert_eq!(SessionState::from_factory(&factory).load().await.unwrap(), record);

        session.clear().await.unwrap();
        assert_eq!(factory.len(SESSION_SCOPE).await, 0);
    }
}
