// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory chain for tests and local tooling.
//!
//! Keeps persons, apps and accounts in maps and applies the three SDK
//! actions with the same authority rules as the contracts: the signer's key
//! must satisfy the action's required permission (directly or through a
//! parent permission).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::client::{ChainClient, ChainError};
use super::types::*;
use crate::error::Result;
use crate::keys::{KeyLevel, PublicKey, Signer};

#[derive(Default)]
struct ChainState {
    persons: HashMap<AccountName, Person>,
    apps: HashMap<AccountName, App>,
    accounts: HashMap<AccountName, Account>,
    pushed: Vec<ChainAction>,
}

/// In-memory [`ChainClient`].
#[derive(Clone, Default)]
pub struct InMemoryChain {
    state: Arc<RwLock<ChainState>>,
}

impl InMemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a person with the standard permission tree
    /// (`owner` → `active` → `pin` / `biometric` / `local`).
    pub async fn create_person(
        &self,
        account: &AccountName,
        username: &str,
        password_salt: &str,
        keys: &[(KeyLevel, PublicKey)],
    ) -> Person {
        let person = Person {
            account_name: account.clone(),
            username_hash: hash_username(username),
            password_salt: password_salt.to_string(),
            status: PersonStatus::Ready,
        };

        let permissions = KeyLevel::chain_bound()
            .filter_map(|level| {
                let name = level.permission()?;
                let keys = keys
                    .iter()
                    .filter(|(l, _)| *l == level)
                    .map(|(_, k)| k.clone())
                    .collect::<Vec<_>>();
                // Unused optional levels are not created on chain.
                if keys.is_empty() && !matches!(level, KeyLevel::Password | KeyLevel::Active) {
                    return None;
                }
                Some(Permission {
                    name: name.to_string(),
                    parent: default_parent(level).to_string(),
                    keys,
                    linked_actions: Vec::new(),
                })
            })
            .collect();

        let mut state = self.state.write().await;
        state.accounts.insert(
            account.clone(),
            Account {
                name: account.clone(),
                permissions,
            },
        );
        state.persons.insert(account.clone(), person.clone());
        person
    }

    /// Register an app. Apps get an `owner` / `active` tree holding `key`.
    pub async fn create_app(&self, app: App, key: &PublicKey) {
        let mut state = self.state.write().await;
        state.accounts.insert(
            app.account_name.clone(),
            Account {
                name: app.account_name.clone(),
                permissions: vec![
                    Permission {
                        name: "owner".into(),
                        parent: String::new(),
                        keys: vec![key.clone()],
                        linked_actions: Vec::new(),
                    },
                    Permission {
                        name: "active".into(),
                        parent: "owner".into(),
                        keys: vec![key.clone()],
                        linked_actions: Vec::new(),
                    },
                ],
            },
        );
        state.apps.insert(app.account_name.clone(), app);
    }

    /// Actions applied so far, oldest first.
    pub async fn pushed_actions(&self) -> Vec<ChainAction> {
        self.state.read().await.pushed.clone()
    }

    fn apply(state: &mut ChainState, action: &ChainAction) -> std::result::Result<(), ChainError> {
        match action {
            ChainAction::LoginWithApp {
                account,
                app,
                parent,
                key,
            } => {
                if !state.apps.contains_key(app) {
                    return Err(ChainError::DataQueryNoRowDataFound(format!("app {app}")));
                }
                let entry = account_mut(state, account)?;
                match entry.permissions.iter_mut().find(|p| p.name == app.as_str()) {
                    Some(permission) => {
                        if !permission.keys.contains(key) {
                            permission.keys.push(key.clone());
                        }
                    }
                    None => entry.permissions.push(Permission {
                        name: app.to_string(),
                        parent: parent.clone(),
                        keys: vec![key.clone()],
                        linked_actions: Vec::new(),
                    }),
                }
            }
            ChainAction::LinkAuth {
                account,
                permission,
                contract,
                action,
            } => {
                let entry = account_mut(state, account)?;
                let target = entry
                    .permissions
                    .iter_mut()
                    .find(|p| &p.name == permission)
                    .ok_or_else(|| {
                        ChainError::TransactionFailed(format!(
                            "permission {account}@{permission} does not exist"
                        ))
                    })?;
                let linked = LinkedAction {
                    contract: contract.clone(),
                    action: action.clone(),
                };
                if !target.linked_actions.contains(&linked) {
                    target.linked_actions.push(linked);
                }
            }
            ChainAction::UpdateKeysPer { account, keys } => {
                let entry = account_mut(state, account)?;
                for (level, key) in keys {
                    let Some(name) = level.permission() else {
                        return Err(ChainError::TransactionFailed(format!(
                            "{level} has no on-chain permission"
                        )));
                    };
                    match entry.permissions.iter_mut().find(|p| p.name == name) {
                        Some(permission) => permission.keys = vec![key.clone()],
                        None => entry.permissions.push(Permission {
                            name: name.to_string(),
                            parent: default_parent(*level).to_string(),
                            keys: vec![key.clone()],
                            linked_actions: Vec::new(),
                        }),
                    }
                }
            }
        }
        Ok(())
    }
}

fn default_parent(level: KeyLevel) -> &'static str {
    match level {
        KeyLevel::Password => "",
        KeyLevel::Active => "owner",
        _ => "active",
    }
}

fn account_mut<'a>(
    state: &'a mut ChainState,
    account: &AccountName,
) -> std::result::Result<&'a mut Account, ChainError> {
    state
        .accounts
        .get_mut(account)
        .ok_or_else(|| ChainError::AccountDoesntExist(account.to_string()))
}

#[async_trait]
impl ChainClient for InMemoryChain {
    async fn get_person(&self, lookup: &PersonLookup) -> Result<Person> {
        let state = self.state.read().await;
        let person = match lookup {
            PersonLookup::Username(username) => {
                let hash = hash_username(username);
                state
                    .persons
                    .values()
                    .find(|p| p.username_hash == hash)
                    .cloned()
                    .ok_or_else(|| ChainError::UsernameNotFound(username.clone()))?
            }
            PersonLookup::Account(account) => state
                .persons
                .get(account)
                .cloned()
                .ok_or_else(|| ChainError::AccountDoesntExist(account.to_string()))?,
        };
        Ok(person)
    }

    async fn get_app(&self, lookup: &AppLookup) -> Result<App> {
        let state = self.state.read().await;
        let found = match lookup {
            AppLookup::Origin(origin) => state.apps.values().find(|a| &a.origin == origin),
            AppLookup::Account(account) => state.apps.get(account),
            AppLookup::Username(username) => {
                let hash = hash_username(username);
                state.apps.values().find(|a| a.username_hash == hash)
            }
        };
        found.cloned().ok_or_else(|| {
            ChainError::DataQueryNoRowDataFound(format!("app for {lookup:?}")).into()
        })
    }

    async fn get_account(&self, account: &AccountName) -> Result<Account> {
        let state = self.state.read().await;
        state
            .accounts
            .get(account)
            .cloned()
            .ok_or_else(|| ChainError::AccountDoesntExist(account.to_string()).into())
    }

    async fn push_action(&self, action: ChainAction, signer: &dyn Signer) -> Result<()> {
        let key = signer.public_key().await?;
        let digest = serde_json::to_vec(&action)?;
        let signature = signer.sign(&digest).await?;
        if !key.verify(&digest, &signature) {
            return Err(ChainError::TransactionFailed("signature does not match key".into()).into());
        }

        let mut state = self.state.write().await;
        let authorized = state
            .accounts
            .get(action.actor())
            .ok_or_else(|| ChainError::AccountDoesntExist(action.actor().to_string()))?
            .authorizes(action.required_permission(), &key);
        if !authorized {
            return Err(ChainError::MissingAuthority(format!(
                "{}@{}",
                action.actor(),
                action.required_permission()
            ))
            .into());
        }

        Self::apply(&mut state, &action)?;
        tracing::debug!(action = action.name(), actor = %action.actor(), "Applied chain action");
        state.pushed.push(action);
        Ok(())
    }
}
