// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! secp256k1 public keys and their text / JWK forms.

use std::str::FromStr;

use k256::ecdsa::signature::Verifier;
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use k256::{EncodedPoint, FieldBytes};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::encoding::{b64url_decode, b64url_encode};
use crate::error::SdkError;

/// JWK `kty` for elliptic curve keys.
const JWK_KTY_EC: &str = "EC";
/// JWK `crv` for secp256k1.
const JWK_CRV_SECP256K1: &str = "secp256k1";

/// A secp256k1 public key.
///
/// Text form is the lowercase hex of the compressed SEC1 point (66 chars).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    pub fn from_verifying_key(key: VerifyingKey) -> Self {
        Self(key)
    }

    pub fn from_signing_key(key: &SigningKey) -> Self {
        Self(key.verifying_key().clone())
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.0
    }

    /// Compressed SEC1 bytes.
    pub fn to_sec1_bytes(&self) -> Vec<u8> {
        self.0.to_encoded_point(true).as_bytes().to_vec()
    }

    /// Check an ECDSA (SHA-256) signature over `data`.
    pub fn verify(&self, data: &[u8], signature: &Signature) -> bool {
        self.0.verify(data, signature).is_ok()
    }

    /// JWK representation.
    pub fn to_jwk(&self) -> Jwk {
        let point = self.0.to_encoded_point(false);
        Jwk {
            kty: JWK_KTY_EC.to_string(),
            crv: JWK_CRV_SECP256K1.to_string(),
            x: point.x().map(|x| b64url_encode(x)).unwrap_or_default(),
            y: point.y().map(|y| b64url_encode(y)).unwrap_or_default(),
        }
    }

    /// Parse from a JWK.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, SdkError> {
        if jwk.kty != JWK_KTY_EC || jwk.crv != JWK_CRV_SECP256K1 {
            return Err(SdkError::InvalidData(format!(
                "Unsupported JWK {}/{}",
                jwk.kty, jwk.crv
            )));
        }
        let x = b64url_decode(&jwk.x)?;
        let y = b64url_decode(&jwk.y)?;
        if x.len() != 32 || y.len() != 32 {
            return Err(SdkError::InvalidData("JWK coordinates must be 32 bytes".to_string()));
        }
        let point = EncodedPoint::from_affine_coordinates(
            FieldBytes::from_slice(&x),
            FieldBytes::from_slice(&y),
            false,
        );
        VerifyingKey::from_encoded_point(&point)
            .map(Self)
            .map_err(|e| SdkError::InvalidData(format!("Invalid JWK point: {e}")))
    }
}

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(self.to_sec1_bytes()))
    }
}

impl FromStr for PublicKey {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(s))?;
        VerifyingKey::from_sec1_bytes(&bytes)
            .map(Self)
            .map_err(|e| SdkError::InvalidData(format!("Invalid public key: {e}")))
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Minimal EC JSON Web Key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    pub crv: String,
    pub x: String,
    pub y: String,
}

#[cfg(test)]
mod tests {
    use k256::ecdsa::signature::Signer;
    use k256::elliptic_curve::rand_core::OsRng;

    use super::*;

    #[test]
    fn text_form_round_trips() {
        let key = PublicKey::from_signing_key(&SigningKey::random(&mut OsRng));
        let text = key.to_string();
        assert_eq!(text.len(), 66);
        assert_eq!(text.parse::<PublicKey>().unwrap(), key);
        assert!(text.chars().all(|c| !c.is_ascii_uppercase()));
        assert_eq!(format!("0x{}", text.to_uppercase()).parse::<PublicKey>().unwrap(), key);
    }

    #[test]
    fn jwk_form_round_trips() {
        let key = PublicKey::from_signing_key(&SigningKey::random(&mut OsRng));
        let jwk = key.to_jwk();
        assert_eq!(jwk.crv, "secp256k1");
        assert_eq!(PublicKey::from_jwk(&jwk).unwrap(), key);
    }

    #[test]
    fn rejects_other_curves() {
        let key = PublicKey::from_signing_key(&SigningKey::random(&mut OsRng));
        let mut jwk = key.to_jwk();
        jwk.crv = "P-256".to_string();
        assert!(PublicKey::from_jwk(&jwk).is_err());
    }

    #[test]
    fn verifies_own_signatures_only() {
        let signing = SigningKey::random(&mut OsRng);
        let other = PublicKey::from_signing_key(&SigningKey::random(&mut OsRng));
        let signature: Signature = signing.sign(b"hello");

        assert!(PublicKey::from_signing_key(&signing).verify(b"hello", &signature));
        assert!(!PublicKey::from_signing_key(&signing).verify(b"hullo", &signature));
        assert!(!other.verify(b"hello", &signature));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!("not-a-key".parse::<PublicKey>().is_err());
        assert!("02ff".parse::<PublicKey>().is_err());
        let err = "0x02a".parse::<PublicKey>().unwrap_err();
        assert_eq!(err.code(), "InvalidData");
    }
}
