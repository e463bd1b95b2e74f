// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Keys
//!
//! secp256k1 keys bound to security levels, and the signers built on them.
//!
//! - `level` - the closed [`KeyLevel`] enum and its chain permission mapping
//! - `manager` - the [`KeyManager`] trait and its storage-backed implementation
//! - `public_key` - [`PublicKey`] text and JWK forms
//! - `signer` - [`Signer`] handles for JWTs and chain actions

pub mod level;
pub mod manager;
pub mod public_key;
pub mod signer;

use argon2::Argon2;
use k256::ecdsa::SigningKey;
use k256::elliptic_curve::rand_core::{OsRng, RngCore};

pub use level::KeyLevel;
pub use manager::{KeyManager, SignatureFormat, SignedData, StorageKeyManager};
pub use public_key::{Jwk, PublicKey};
pub use signer::{KeyManagerSigner, LocalSigner, Signer};

use crate::error::{Result, SdkError};

/// Length of password salts.
pub const PASSWORD_SALT_LEN: usize = 32;

/// Generate a random secp256k1 key.
pub fn generate_random_private_key() -> SigningKey {
    SigningKey::random(&mut OsRng)
}

/// Generate a random hex salt for password key derivation.
pub fn generate_salt() -> String {
    let mut salt = [0u8; PASSWORD_SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    hex::encode(salt)
}

/// Derive a secp256k1 key from a password with Argon2id.
///
/// The same password and salt always give the same key, which is how a
/// user recovers their `owner` key on a new device.
pub fn generate_private_key_from_password(password: &str, salt: &str) -> Result<SigningKey> {
    if password.is_empty() {
        return Err(SdkError::MissingParams("password".to_string()));
    }
    let mut seed = [0u8; 32];
    Argon2::default()
        .hash_password_into(password.as_bytes(), salt.as_bytes(), &mut seed)
        .map_err(|e| SdkError::InvalidData(format!("Password key derivation failed: {e}")))?;

    SigningKey::from_slice(&seed)
        .map_err(|e| SdkError::Internal(format!("Derived key is not a valid scalar: {e}")))
}
