// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! `did:jwk` - DIDs that embed their own public key.
//!
//! Used for the ephemeral app keys of the relying party and the broker.

use async_trait::async_trait;

use super::{DidDocument, DidResolver, DidUrl, VerificationMethod};
use crate::encoding::{b64url_decode_json, b64url_encode_json};
use crate::error::{Result, SdkError};
use crate::keys::{Jwk, PublicKey};

pub const JWK_DID_METHOD: &str = "jwk";

/// Fragment of the single verification method.
const JWK_KEY_FRAGMENT: &str = "0";

/// `did:jwk:<base64url(JWK)>#0` for `key`.
pub fn did_from_public_key(key: &PublicKey) -> Result<DidUrl> {
    let id = b64url_encode_json(&key.to_jwk())?;
    Ok(DidUrl::new(JWK_DID_METHOD, id, Some(JWK_KEY_FRAGMENT.to_string())))
}

/// Resolver for `did:jwk`. Needs no I/O.
#[derive(Debug, Default, Clone, Copy)]
pub struct JwkDidResolver;

#[async_trait]
impl DidResolver for JwkDidResolver {
    fn method(&self) -> &str {
        JWK_DID_METHOD
    }

    async fn resolve(&self, did: &DidUrl) -> Result<DidDocument> {
        if did.method() != JWK_DID_METHOD {
            return Err(SdkError::InvalidDid(did.to_string()));
        }
        let jwk: Jwk = b64url_decode_json(did.id())
            .map_err(|_| SdkError::InvalidDid(format!("{did} does not embed a JWK")))?;
        let public_key = PublicKey::from_jwk(&jwk)?;

        let id = did.without_fragment();
        Ok(DidDocument {
            verification_methods: vec![VerificationMethod {
                id: id.with_fragment(JWK_KEY_FRAGMENT),
                public_key,
            }],
            id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_random_private_key;

    #[tokio::test]
    async fn resolves_embedded_key() {
        let key = PublicKey::from_signing_key(&generate_random_private_key());
        let did = did_from_public_key(&key).unwrap();
        assert_eq!(did.method(), "jwk");
        assert_eq!(did.fragment(), Some("0"));

        let doc = JwkDidResolver.resolve(&did).await.unwrap();
        assert_eq!(doc.keys_for(&did), vec![&key]);
        assert!(doc.keys_for(&did.with_fragment("1")).is_empty());
    }

    #[tokio::test]
    async fn rejects_garbage_ids() {
        let did: DidUrl = "did:jwk:bm90LWEtandr#0".parse().unwrap();
        let err = JwkDidResolver.resolve(&did).await.unwrap_err();
        assert_eq!(err.code(), "InvalidDid");
    }
}
