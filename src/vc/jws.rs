// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Compact JWS with ES256K (ECDSA secp256k1 / SHA-256).
//!
//! Hand-rolled because the ES256K curve is not covered by the general JWT
//! crates. Signatures are the 64-byte `r || s` form required by RFC 8812.

use k256::ecdsa::Signature;
use serde::{Deserialize, Serialize};

use crate::did::DidUrl;
use crate::encoding::{b64url_decode, b64url_decode_json, b64url_encode, b64url_encode_json};
use crate::error::{Result, SdkError};
use crate::keys::Signer;

pub const ALG_ES256K: &str = "ES256K";
pub const TYP_JWT: &str = "JWT";

/// Protected header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwsHeader {
    pub alg: String,
    pub typ: String,
    /// DID URL of the signing key
    pub kid: DidUrl,
}

impl JwsHeader {
    pub fn es256k(kid: DidUrl) -> Self {
        Self {
            alg: ALG_ES256K.to_string(),
            typ: TYP_JWT.to_string(),
            kid,
        }
    }
}

/// A decoded, not yet verified, compact JWS.
#[derive(Debug, Clone)]
pub struct DecodedJws {
    pub header: JwsHeader,
    pub payload: Vec<u8>,
    /// `<header>.<payload>` as transmitted
    pub signing_input: String,
    pub signature: Signature,
}

/// Serialize `claims` and sign them as a compact JWS.
pub async fn encode<C: Serialize>(header: &JwsHeader, claims: &C, signer: &dyn Signer) -> Result<String> {
    let signing_input = format!("{}.{}", b64url_encode_json(header)?, b64url_encode_json(claims)?);
    let signature = signer.sign(signing_input.as_bytes()).await?;
    Ok(format!("{signing_input}.{}", b64url_encode(&signature.to_bytes())))
}

/// Split and decode a compact JWS without checking the signature.
pub fn decode(token: &str) -> Result<DecodedJws> {
    let malformed = || SdkError::InvalidData("JWT must have three segments".to_string());
    let (signing_input, signature) = token.rsplit_once('.').ok_or_else(malformed)?;
    let (header, payload) = signing_input.split_once('.').ok_or_else(malformed)?;
    if payload.contains('.') {
        return Err(malformed());
    }

    let header: JwsHeader = b64url_decode_json(header)?;
    if header.alg != ALG_ES256K {
        return Err(SdkError::InvalidData(format!("Unsupported JWS alg {}", header.alg)));
    }
    let signature = Signature::from_slice(&b64url_decode(signature)?)
        .map_err(|e| SdkError::InvalidData(format!("Malformed ES256K signature: {e}")))?;

    Ok(DecodedJws {
        header,
        payload: b64url_decode(payload)?,
        signing_input: signing_input.to_string(),
        signature,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::did::did_from_public_key;
    use crate::keys::{generate_random_private_key, LocalSigner, PublicKey};

    #[tokio::test]
    async fn encoded_token_verifies_against_signer_key() {
        let private_key = generate_random_private_key();
        let public_key = PublicKey::from_signing_key(&private_key);
        let signer = LocalSigner::new(private_key);
        let header = JwsHeader::es256k(did_from_public_key(&public_key).unwrap());

        let token = encode(&header, &serde_json::json!({"hello": "world"}), &signer)
            .await
            .unwrap();
        let decoded = decode(&token).unwrap();

        assert_eq!(decoded.header, header);
        assert_eq!(decoded.signing_input.split('.').count(), 2);
        assert!(public_key.verify(decoded.signing_input.as_bytes(), &decoded.signature));
        let claims: serde_json::Value = serde_json::from_slice(&decoded.payload).unwrap();
        assert_eq!(claims["hello"], "world");
    }

    #[test]
    fn rejects_wrong_shape_and_alg() {
        assert!(decode("a.b").is_err());
        assert!(decode("a.b.c.d").is_err());

        let header = b64url_encode(br#"{"alg":"HS256","typ":"JWT","kid":"did:jwk:x#0"}"#);
        let err = decode(&format!("{header}.e30.AAAA")).unwrap_err();
        assert_eq!(err.code(), "InvalidData");
    }
}
