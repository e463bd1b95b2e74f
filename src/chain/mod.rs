// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Blockchain Collaborator
//!
//! The SDK never interprets contract state itself. It reads person, app and
//! account records and pushes three actions through [`ChainClient`]:
//!
//! - `loginwithapp` - authorize an app key under the user's account
//! - `linkauth` - link a permission to a contract action
//! - `updatekeysper` - rotate the keys of the level-bound permissions
//!
//! [`InMemoryChain`] implements the same authority rules in process.

pub mod client;
pub mod memory;
pub mod types;

pub use client::{ChainClient, ChainError};
pub use memory::InMemoryChain;
pub use types::{
    hash_username, Account, AccountName, App, AppLookup, AppStatus, ChainAction, LinkedAction,
    Permission, Person, PersonLookup, PersonStatus,
};
