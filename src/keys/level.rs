// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Security levels that keys are bound to.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SdkError;

/// Security level of a stored key.
///
/// ## Chain permissions
///
/// Chain-bound levels map one-to-one onto account permissions:
///
/// | Level | Permission |
/// |-------|------------|
/// | `Password` | `owner` |
/// | `Active` | `active` |
/// | `Pin` | `pin` |
/// | `Biometric` | `biometric` |
/// | `Local` | `local` |
///
/// The browser levels hold app-side ephemeral keys and have no permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyLevel {
    /// Derived from the account password, controls `owner`
    Password,
    /// Protected by a PIN
    Pin,
    /// Unlocked by device biometrics
    Biometric,
    /// Device-local key used for everyday signing
    Local,
    /// Account `active` key
    Active,
    /// App key held in browser local storage
    BrowserLocalStorage,
    /// App key held in browser session storage
    BrowserSessionStorage,
}

impl KeyLevel {
    /// Every level, in order.
    pub const ALL: [KeyLevel; 7] = [
        KeyLevel::Password,
        KeyLevel::Pin,
        KeyLevel::Biometric,
        KeyLevel::Local,
        KeyLevel::Active,
        KeyLevel::BrowserLocalStorage,
        KeyLevel::BrowserSessionStorage,
    ];

    /// Canonical name, as used in storage keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyLevel::Password => "PASSWORD",
            KeyLevel::Pin => "PIN",
            KeyLevel::Biometric => "BIOMETRIC",
            KeyLevel::Local => "LOCAL",
            KeyLevel::Active => "ACTIVE",
            KeyLevel::BrowserLocalStorage => "BROWSER_LOCAL_STORAGE",
            KeyLevel::BrowserSessionStorage => "BROWSER_SESSION_STORAGE",
        }
    }

    /// Whether sign and check calls need the user's challenge.
    pub fn requires_challenge(&self) -> bool {
        matches!(self, KeyLevel::Password | KeyLevel::Pin)
    }

    /// On-chain permission bound to this level.
    pub fn permission(&self) -> Option<&'static str> {
        match self {
            KeyLevel::Password => Some("owner"),
            KeyLevel::Active => Some("active"),
            KeyLevel::Pin => Some("pin"),
            KeyLevel::Biometric => Some("biometric"),
            KeyLevel::Local => Some("local"),
            KeyLevel::BrowserLocalStorage | KeyLevel::BrowserSessionStorage => None,
        }
    }

    /// Inverse of [`KeyLevel::permission`].
    pub fn from_permission(permission: &str) -> Option<KeyLevel> {
        KeyLevel::ALL
            .into_iter()
            .find(|level| level.permission() == Some(permission))
    }

    /// Levels that have an on-chain permission.
    pub fn chain_bound() -> impl Iterator<Item = KeyLevel> {
        KeyLevel::ALL.into_iter().filter(|l| l.permission().is_some())
    }
}

impl FromStr for KeyLevel {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KeyLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| SdkError::InvalidKeyLevel(s.to_string()))
    }
}

impl std::fmt::Display for KeyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_names_only() {
        assert_eq!("PIN".parse::<KeyLevel>().unwrap(), KeyLevel::Pin);
        assert_eq!(
            "BROWSER_LOCAL_STORAGE".parse::<KeyLevel>().unwrap(),
            KeyLevel::BrowserLocalStorage
        );
        let err = "pin".parse::<KeyLevel>().unwrap_err();
        assert!(matches!(err, SdkError::InvalidKeyLevel(ref s) if s == "pin"));
    }

    #[test]
    fn permission_mapping_is_bijective() {
        for level in KeyLevel::chain_bound() {
            let permission = level.permission().unwrap();
            assert_eq!(KeyLevel::from_permission(permission), Some(level));
        }
        assert_eq!(KeyLevel::from_permission("owner"), Some(KeyLevel::Password));
        assert_eq!(KeyLevel::from_permission("app.permission"), None);
        assert_eq!(KeyLevel::chain_bound().count(), 5);
    }

    #[test]
    fn only_password_and_pin_need_challenge() {
        let protected: Vec<_> = KeyLevel::ALL
            .into_iter()
            .filter(KeyLevel::requires_challenge)
            .collect();
        assert_eq!(protected, vec![KeyLevel::Password, KeyLevel::Pin]);
    }

    #[test]
    fn serde_uses_canonical_names() {
        let json = serde_json::to_string(&KeyLevel::BrowserSessionStorage).unwrap();
        assert_eq!(json, "\"BROWSER_SESSION_STORAGE\"");
        assert_eq!(json.trim_matches('"'), KeyLevel::BrowserSessionStorage.as_str());
    }
}
