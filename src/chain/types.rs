// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Chain record types consumed by the SDK.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::SdkError;
use crate::keys::{KeyLevel, PublicKey};

/// Maximum length of account and permission names.
const MAX_NAME_LEN: usize = 12;

/// A chain account (or permission) name.
///
/// 1 to 12 characters from `a-z`, `1-5` and `.`, not ending in `.`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountName(String);

impl AccountName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for AccountName {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid_chars = s
            .chars()
            .all(|c| c.is_ascii_lowercase() || ('1'..='5').contains(&c) || c == '.');
        if s.is_empty() || s.len() > MAX_NAME_LEN || !valid_chars || s.ends_with('.') {
            return Err(SdkError::InvalidData(format!("Invalid account name `{s}`")));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for AccountName {
    type Error = SdkError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AccountName> for String {
    fn from(value: AccountName) -> Self {
        value.0
    }
}

impl std::fmt::Display for AccountName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// SHA-256 hex of a username, as stored on chain.
pub fn hash_username(username: &str) -> String {
    hex::encode(Sha256::digest(username.trim().to_lowercase().as_bytes()))
}

/// Lifecycle of a person account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PersonStatus {
    Creating,
    Ready,
    Deactivated,
}

/// A person record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub account_name: AccountName,
    pub username_hash: String,
    pub password_salt: String,
    pub status: PersonStatus,
}

/// Lifecycle of an app registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppStatus {
    Pending,
    Ready,
    Deactivated,
}

/// A registered app (relying party or the SSO broker itself).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct App {
    pub account_name: AccountName,
    pub app_name: String,
    pub username_hash: String,
    pub origin: String,
    pub description: String,
    pub logo_url: String,
    pub background_color: String,
    pub accent_color: String,
    pub status: AppStatus,
}

/// How to look up a person.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersonLookup {
    /// By plain username (hashed before lookup)
    Username(String),
    Account(AccountName),
}

/// How to look up an app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppLookup {
    Origin(String),
    Account(AccountName),
    /// By plain username (hashed before lookup)
    Username(String),
}

/// A contract action a permission is allowed to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedAction {
    pub contract: AccountName,
    pub action: String,
}

/// One permission of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub name: String,
    /// Empty for `owner`
    pub parent: String,
    pub keys: Vec<PublicKey>,
    #[serde(default)]
    pub linked_actions: Vec<LinkedAction>,
}

/// An account with its permission tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub name: AccountName,
    pub permissions: Vec<Permission>,
}

impl Account {
    pub fn permission(&self, name: &str) -> Option<&Permission> {
        self.permissions.iter().find(|p| p.name == name)
    }

    /// Whether `key` is listed directly on `permission`.
    pub fn has_key(&self, permission: &str, key: &PublicKey) -> bool {
        self.permission(permission)
            .is_some_and(|p| p.keys.iter().any(|k| k == key))
    }

    /// Whether `key` satisfies `permission` directly or through an ancestor.
    pub fn authorizes(&self, permission: &str, key: &PublicKey) -> bool {
        let mut current = self.permission(permission);
        // Bounded by the number of permissions to survive malformed cycles.
        for _ in 0..=self.permissions.len() {
            let Some(p) = current else {
                return false;
            };
            if p.keys.iter().any(|k| k == key) {
                return true;
            }
            if p.parent.is_empty() {
                return false;
            }
            current = self.permission(&p.parent);
        }
        false
    }
}

/// Actions the SDK pushes to the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "lowercase")]
pub enum ChainAction {
    /// Authorize `key` under a permission named after `app`.
    #[serde(rename = "loginwithapp")]
    LoginWithApp {
        account: AccountName,
        app: AccountName,
        parent: String,
        key: PublicKey,
    },
    /// Allow `permission` to run `contract::action`.
    #[serde(rename = "linkauth")]
    LinkAuth {
        account: AccountName,
        permission: String,
        contract: AccountName,
        action: String,
    },
    /// Replace the keys of the level-bound permissions.
    #[serde(rename = "updatekeysper")]
    UpdateKeysPer {
        account: AccountName,
        keys: BTreeMap<KeyLevel, PublicKey>,
    },
}

impl ChainAction {
    /// On-chain action name.
    pub fn name(&self) -> &'static str {
        match self {
            ChainAction::LoginWithApp { .. } => "loginwithapp",
            ChainAction::LinkAuth { .. } => "linkauth",
            ChainAction::UpdateKeysPer { .. } => "updatekeysper",
        }
    }

    /// Account the action runs as.
    pub fn actor(&self) -> &AccountName {
        match self {
            ChainAction::LoginWithApp { account, .. }
            | ChainAction::LinkAuth { account, .. }
            | ChainAction::UpdateKeysPer { account, .. } => account,
        }
    }

    /// Permission whose key must sign the action.
    pub fn required_permission(&self) -> &str {
        match self {
            ChainAction::LoginWithApp { parent, .. } => parent,
            ChainAction::LinkAuth { .. } => "local",
            ChainAction::UpdateKeysPer { .. } => "owner",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_random_private_key;

    fn key() -> PublicKey {
        PublicKey::from_signing_key(&generate_random_private_key())
    }

    #[test]
    fn account_names_are_validated() {
        assert!("alice.acc".parse::<AccountName>().is_ok());
        assert!("a1b2c3d4e5".parse::<AccountName>().is_ok());
        assert!("".parse::<AccountName>().is_err());
        assert!("Alice".parse::<AccountName>().is_err());
        assert!("alice6".parse::<AccountName>().is_err());
        assert!("alice.".parse::<AccountName>().is_err());
        assert!("abcdefghijklm".parse::<AccountName>().is_err());
        assert!(serde_json::from_str::<AccountName>("\"BAD\"").is_err());
    }

    #[test]
    fn username_hash_normalizes_case() {
        assert_eq!(hash_username("Alice"), hash_username("alice "));
        assert_eq!(hash_username("alice").len(), 64);
    }

    #[test]
    fn authorization_walks_parents() {
        let owner_key = key();
        let local_key = key();
        let account = Account {
            name: "alice".parse().unwrap(),
            permissions: vec![
                Permission {
                    name: "owner".into(),
                    parent: String::new(),
                    keys: vec![owner_key.clone()],
                    linked_actions: vec![],
                },
                Permission {
                    name: "active".into(),
                    parent: "owner".into(),
                    keys: vec![],
                    linked_actions: vec![],
                },
                Permission {
                    name: "local".into(),
                    parent: "active".into(),
                    keys: vec![local_key.clone()],
                    linked_actions: vec![],
                },
            ],
        };

        assert!(account.authorizes("local", &local_key));
        assert!(account.authorizes("local", &owner_key));
        assert!(!account.authorizes("owner", &local_key));
        assert!(!account.authorizes("missing", &owner_key));
        assert!(account.has_key("local", &local_key));
        assert!(!account.has_key("active", &owner_key));
    }

    #[test]
    fn actions_serialize_with_name_tag() {
        let action = ChainAction::LinkAuth {
            account: "alice".parse().unwrap(),
            permission: "app.a".into(),
            contract: "token".parse().unwrap(),
            action: "transfer".into(),
        };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["name"], "linkauth");
        assert_eq!(action.required_permission(), "local");
    }
}
