// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWT-encoded verifiable credentials.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use super::jws::{self, JwsHeader};
use crate::config::{SdkConfig, DEFAULT_CHAIN_DID_METHOD, DEFAULT_CLOCK_SKEW_LEEWAY};
use crate::did::{DidUrl, Resolver};
use crate::error::{Result, SdkError};
use crate::keys::Signer;

/// W3C credentials context.
pub const VC_CONTEXT: &str = "https://www.w3.org/2018/credentials/v1";
/// Base credential type, always listed first.
pub const VC_BASE_TYPE: &str = "VerifiableCredential";

/// The key a credential is signed with, named by its DID URL.
#[derive(Clone)]
pub struct Issuer {
    pub did_url: DidUrl,
    pub signer: Arc<dyn Signer>,
}

impl Issuer {
    pub fn new(did_url: DidUrl, signer: Arc<dyn Signer>) -> Self {
        Self { did_url, signer }
    }
}

impl std::fmt::Debug for Issuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Issuer").field("did_url", &self.did_url).finish()
    }
}

/// Optional claims for [`VerifiableCredential::sign`].
#[derive(Debug, Clone, Default)]
pub struct SignOptions {
    /// Credential id; a `urn:uuid:` is generated when absent
    pub id: Option<String>,
    pub subject: Option<DidUrl>,
    pub issued_at: Option<DateTime<Utc>>,
    /// Defaults to `issued_at`
    pub not_before: Option<DateTime<Utc>>,
    pub expires_in: Option<Duration>,
}

impl SignOptions {
    pub fn subject(mut self, subject: DidUrl) -> Self {
        self.subject = Some(subject);
        self
    }

    pub fn expires_in(mut self, ttl: Duration) -> Self {
        self.expires_in = Some(ttl);
        self
    }
}

/// Knobs for [`VerifiableCredential::verify_with`].
#[derive(Debug, Clone)]
pub struct VerifyOptions {
    /// Tolerance applied to `nbf` and `exp`
    pub leeway: Duration,
    /// Evaluation time, now when absent
    pub now: Option<DateTime<Utc>>,
    /// DID method of chain accounts, for checks that bind a signer to an account
    pub chain_did_method: String,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            leeway: DEFAULT_CLOCK_SKEW_LEEWAY,
            now: None,
            chain_did_method: DEFAULT_CHAIN_DID_METHOD.to_string(),
        }
    }
}

impl From<&SdkConfig> for VerifyOptions {
    fn from(config: &SdkConfig) -> Self {
        Self {
            leeway: config.clock_skew_leeway,
            now: None,
            chain_did_method: config.chain_did_method.clone(),
        }
    }
}

/// The `vc` claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VcClaim<T> {
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    #[serde(rename = "type")]
    pub types: Vec<String>,
    #[serde(rename = "credentialSubject")]
    pub credential_subject: T,
}

/// Registered JWT claims plus `vc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JwtClaims<T> {
    pub iss: DidUrl,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<DidUrl>,
    pub nbf: i64,
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    pub jti: String,
    pub vc: VcClaim<T>,
}

/// A signed credential and its decoded claims.
///
/// Immutable: the JWT is produced once by [`sign`](Self::sign) or accepted
/// once by [`from_jwt`](Self::from_jwt), and every accessor projects the
/// decoded claims.
#[derive(Debug, Clone)]
pub struct VerifiableCredential<T> {
    jwt: String,
    header: JwsHeader,
    claims: JwtClaims<T>,
}

impl<T> VerifiableCredential<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Sign `credential_subject` under `issuer`.
    pub async fn sign(
        types: &[&str],
        credential_subject: T,
        issuer: &Issuer,
        options: SignOptions,
    ) -> Result<Self> {
        let issued_at = options.issued_at.unwrap_or_else(Utc::now);
        let not_before = options.not_before.unwrap_or(issued_at);
        let expiration = options
            .expires_in
            .map(|ttl| {
                chrono::Duration::from_std(ttl)
                    .map(|ttl| issued_at + ttl)
                    .map_err(|_| SdkError::InvalidData("Credential lifetime is out of range".to_string()))
            })
            .transpose()?;

        let mut all_types = vec![VC_BASE_TYPE.to_string()];
        all_types.extend(types.iter().filter(|t| **t != VC_BASE_TYPE).map(|t| t.to_string()));

        let claims = JwtClaims {
            iss: issuer.did_url.without_fragment(),
            sub: options.subject,
            nbf: not_before.timestamp(),
            iat: issued_at.timestamp(),
            exp: expiration.map(|e| e.timestamp()),
            jti: options
                .id
                .unwrap_or_else(|| format!("urn:uuid:{}", Uuid::new_v4())),
            vc: VcClaim {
                context: vec![VC_CONTEXT.to_string()],
                types: all_types,
                credential_subject,
            },
        };
        let header = JwsHeader::es256k(issuer.did_url.clone());
        let jwt = jws::encode(&header, &claims, issuer.signer.as_ref()).await?;

        Ok(Self { jwt, header, claims })
    }

    /// Decode a JWT. Nothing is trusted until [`verify`](Self::verify).
    pub fn from_jwt(jwt: &str) -> Result<Self> {
        let decoded = jws::decode(jwt)?;
        let claims: JwtClaims<T> = serde_json::from_slice(&decoded.payload)?;
        Ok(Self {
            jwt: jwt.to_string(),
            header: decoded.header,
            claims,
        })
    }
}

impl<T> VerifiableCredential<T> {
    /// Check the signature and the temporal claims with default options.
    pub async fn verify(&self, resolver: &Resolver) -> Result<bool> {
        self.verify_with(resolver, &VerifyOptions::default()).await
    }

    /// `Ok(false)` for a bad signature, a mismatched issuer or a credential
    /// outside its validity window. `Err` when the issuer cannot be
    /// resolved or the token is malformed.
    pub async fn verify_with(&self, resolver: &Resolver, options: &VerifyOptions) -> Result<bool> {
        let kid = &self.header.kid;
        if !kid.same_did(&self.claims.iss) {
            tracing::debug!(kid = %kid, iss = %self.claims.iss, "Credential kid does not name its issuer");
            return Ok(false);
        }
        if !self.is_temporally_valid(options) {
            tracing::debug!(jti = %self.claims.jti, "Credential outside its validity window");
            return Ok(false);
        }

        let decoded = jws::decode(&self.jwt)?;
        let message = decoded.signing_input.as_bytes();

        let document = resolver.resolve(kid).await?;
        if document
            .keys_for(kid)
            .iter()
            .any(|key| key.verify(message, &decoded.signature))
        {
            return Ok(true);
        }

        // The cached document may predate a key rotation.
        let document = resolver.resolve_uncached(kid).await?;
        Ok(document
            .keys_for(kid)
            .iter()
            .any(|key| key.verify(message, &decoded.signature)))
    }

    fn is_temporally_valid(&self, options: &VerifyOptions) -> bool {
        let now = options.now.unwrap_or_else(Utc::now).timestamp();
        let leeway = i64::try_from(options.leeway.as_secs()).unwrap_or(i64::MAX);
        if now.saturating_add(leeway) < self.claims.nbf {
            return false;
        }
        match self.claims.exp {
            Some(exp) => now.saturating_sub(leeway) < exp,
            None => true,
        }
    }

    pub fn jwt(&self) -> &str {
        &self.jwt
    }

    pub fn id(&self) -> &str {
        &self.claims.jti
    }

    /// Issuer DID (no fragment).
    pub fn issuer(&self) -> &DidUrl {
        &self.claims.iss
    }

    /// DID URL of the signing key.
    pub fn key_id(&self) -> &DidUrl {
        &self.header.kid
    }

    pub fn subject(&self) -> Option<&DidUrl> {
        self.claims.sub.as_ref()
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        timestamp(self.claims.iat)
    }

    pub fn not_before(&self) -> DateTime<Utc> {
        timestamp(self.claims.nbf)
    }

    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        self.claims.exp.map(timestamp)
    }

    pub fn types(&self) -> &[String] {
        &self.claims.vc.types
    }

    pub fn credential_subject(&self) -> &T {
        &self.claims.vc.credential_subject
    }

    pub fn claims(&self) -> &JwtClaims<T> {
        &self.claims
    }
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}
