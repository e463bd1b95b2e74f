// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Credentials with a self-describing `{payload, type}` subject.

use std::ops::Deref;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::credential::{Issuer, SignOptions, VerifiableCredential};
use crate::error::{Result, SdkError};

/// A payload carried by a [`TypedCredential`].
pub trait CredentialPayload: Serialize + DeserializeOwned + Clone + Send + Sync {
    /// Tag stored next to the payload.
    const TYPE: &'static str;

    /// Reject payloads with missing or malformed fields.
    fn validate(&self) -> Result<()>;
}

/// Subject of a typed credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedSubject<T> {
    pub payload: T,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Subject of a credential whose type is not yet known.
pub type UntypedCredential = VerifiableCredential<TypedSubject<serde_json::Value>>;

/// Read the type tag of a JWT without decoding its payload schema.
pub fn peek_type(jwt: &str) -> Result<String> {
    let credential = UntypedCredential::from_jwt(jwt)?;
    Ok(credential.credential_subject().kind.clone())
}

/// A [`VerifiableCredential`] whose subject is a `T` tagged `T::TYPE`.
///
/// Every constructor checks the tag and validates the payload.
#[derive(Debug, Clone)]
pub struct TypedCredential<T> {
    inner: VerifiableCredential<TypedSubject<T>>,
}

impl<T: CredentialPayload> TypedCredential<T> {
    /// Validate and sign `payload` under `issuer`.
    pub async fn sign(payload: T, issuer: &Issuer, options: SignOptions) -> Result<Self> {
        payload.validate()?;
        let subject = TypedSubject {
            payload,
            kind: T::TYPE.to_string(),
        };
        let inner = VerifiableCredential::sign(&[T::TYPE], subject, issuer, options).await?;
        Ok(Self { inner })
    }

    /// Decode a JWT, checking the tag before the payload schema.
    pub fn from_jwt(jwt: &str) -> Result<Self> {
        let kind = peek_type(jwt)?;
        if kind != T::TYPE {
            return Err(SdkError::InvalidRequestType(format!(
                "expected {}, got {kind}",
                T::TYPE
            )));
        }
        Self::from_credential(VerifiableCredential::from_jwt(jwt)?)
    }

    pub fn from_credential(inner: VerifiableCredential<TypedSubject<T>>) -> Result<Self> {
        let subject = inner.credential_subject();
        if subject.kind != T::TYPE {
            return Err(SdkError::InvalidRequestType(subject.kind.clone()));
        }
        subject.payload.validate()?;
        Ok(Self { inner })
    }

    pub fn payload(&self) -> &T {
        &self.inner.credential_subject().payload
    }

    pub fn credential(&self) -> &VerifiableCredential<TypedSubject<T>> {
        &self.inner
    }
}

impl<T> Deref for TypedCredential<T> {
    type Target = VerifiableCredential<TypedSubject<T>>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T> Serialize for TypedCredential<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.inner.jwt())
    }
}

impl<'de, T: CredentialPayload> Deserialize<'de> for TypedCredential<T> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let jwt = String::deserialize(deserializer)?;
        Self::from_jwt(&jwt).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::did::{did_from_public_key, JwkDidResolver, Resolver};
    use crate::keys::{generate_random_private_key, LocalSigner, PublicKey};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Greeting {
        text: String,
    }

    impl CredentialPayload for Greeting {
        const TYPE: &'static str = "Greeting";

        fn validate(&self) -> Result<()> {
            if self.text.is_empty() {
                return Err(SdkError::MissingParams("text".to_string()));
            }
            Ok(())
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Farewell {
        text: String,
    }

    impl CredentialPayload for Farewell {
        const TYPE: &'static str = "Farewell";

        fn validate(&self) -> Result<()> {
            Ok(())
        }
    }

    fn issuer() -> Issuer {
        let private_key = generate_random_private_key();
        let did = did_from_public_key(&PublicKey::from_signing_key(&private_key)).unwrap();
        Issuer::new(did, Arc::new(LocalSigner::new(private_key)))
    }

    #[tokio::test]
    async fn tag_round_trips_and_verifies() {
        let greeting = Greeting { text: "hi".into() };
        let vc = TypedCredential::sign(greeting.clone(), &issuer(), SignOptions::default())
            .await
            .unwrap();
        assert_eq!(peek_type(vc.jwt()).unwrap(), "Greeting");

        let decoded = TypedCredential::<Greeting>::from_jwt(vc.jwt()).unwrap();
        assert_eq!(decoded.payload(), &greeting);
        let resolver = Resolver::new().register(Arc::new(JwkDidResolver));
        assert!(decoded.verify(&resolver).await.unwrap());
    }

    #[tokio::test]
    async fn mismatched_tag_is_invalid_request_type() {
        let vc = TypedCredential::sign(Greeting { text: "hi".into() }, &issuer(), SignOptions::default())
            .await
            .unwrap();
        let err = TypedCredential::<Farewell>::from_jwt(vc.jwt()).unwrap_err();
        assert_eq!(err.code(), "InvalidRequestType");
    }

    #[tokio::test]
    async fn invalid_payload_is_rejected_on_both_paths() {
        let err = TypedCredential::sign(Greeting { text: String::new() }, &issuer(), SignOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "MissingParams");

        // Signed through the untyped path, then decoded as a Greeting.
        let subject = TypedSubject {
            payload: serde_json::json!({"text": ""}),
            kind: "Greeting".to_string(),
        };
        let raw = VerifiableCredential::sign(&["Greeting"], subject, &issuer(), SignOptions::default())
            .await
            .unwrap();
        let err = TypedCredential::<Greeting>::from_jwt(raw.jwt()).unwrap_err();
        assert_eq!(err.code(), "MissingParams");
    }
}
