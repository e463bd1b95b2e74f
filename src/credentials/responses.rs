// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Responses the wallet signs for an app's requests.

use serde::{Deserialize, Serialize};

use crate::chain::AccountName;
use crate::did::{DidUrl, Resolver};
use crate::error::{Result, SdkError};
use crate::vc::{peek_type, CredentialPayload, TypedCredential, VerifyOptions};

pub const LOGIN_RESPONSE_TYPE: &str = "LoginResponse";
pub const DATA_RESPONSE_TYPE: &str = "DataResponse";

/// The account the user logged in with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponsePayload {
    pub account_name: AccountName,
}

impl CredentialPayload for LoginResponsePayload {
    const TYPE: &'static str = LOGIN_RESPONSE_TYPE;

    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Fields the user agreed to share.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataResponsePayload {
    pub data: SharedData,
}

impl CredentialPayload for DataResponsePayload {
    const TYPE: &'static str = DATA_RESPONSE_TYPE;

    fn validate(&self) -> Result<()> {
        if self.data.username.as_deref() == Some("") {
            return Err(SdkError::InvalidData("shared username is empty".to_string()));
        }
        Ok(())
    }
}

pub type LoginResponse = TypedCredential<LoginResponsePayload>;
pub type DataResponse = TypedCredential<DataResponsePayload>;

/// Any response, decoded once by its tag.
#[derive(Debug, Clone)]
pub enum WalletResponse {
    Login(LoginResponse),
    Data(DataResponse),
}

impl WalletResponse {
    /// Decode a response JWT. Unknown tags are [`SdkError::InvalidRequestType`].
    pub fn from_jwt(jwt: &str) -> Result<Self> {
        match peek_type(jwt)?.as_str() {
            LOGIN_RESPONSE_TYPE => Ok(Self::Login(LoginResponse::from_jwt(jwt)?)),
            DATA_RESPONSE_TYPE => Ok(Self::Data(DataResponse::from_jwt(jwt)?)),
            other => Err(SdkError::InvalidRequestType(other.to_string())),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Login(_) => LOGIN_RESPONSE_TYPE,
            Self::Data(_) => DATA_RESPONSE_TYPE,
        }
    }

    pub fn jwt(&self) -> &str {
        match self {
            Self::Login(r) => r.jwt(),
            Self::Data(r) => r.jwt(),
        }
    }

    pub fn issuer(&self) -> &DidUrl {
        match self {
            Self::Login(r) => r.issuer(),
            Self::Data(r) => r.issuer(),
        }
    }

    /// DID URL of the signing key.
    pub fn key_id(&self) -> &DidUrl {
        match self {
            Self::Login(r) => r.key_id(),
            Self::Data(r) => r.key_id(),
        }
    }

    pub fn subject(&self) -> Option<&DidUrl> {
        match self {
            Self::Login(r) => r.subject(),
            Self::Data(r) => r.subject(),
        }
    }

    pub fn as_login(&self) -> Option<&LoginResponse> {
        match self {
            Self::Login(r) => Some(r),
            Self::Data(_) => None,
        }
    }

    pub fn as_data(&self) -> Option<&DataResponse> {
        match self {
            Self::Data(r) => Some(r),
            Self::Login(_) => None,
        }
    }

    pub async fn verify(&self, resolver: &Resolver, options: &VerifyOptions) -> Result<bool> {
        match self {
            Self::Login(r) => r.verify_with(resolver, options).await,
            Self::Data(r) => r.verify_with(resolver, options).await,
        }
    }
}

impl From<LoginResponse> for WalletResponse {
    fn from(value: LoginResponse) -> Self {
        Self::Login(value)
    }
}

impl From<DataResponse> for WalletResponse {
    fn from(value: DataResponse) -> Self {
        Self::Data(value)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::did::{did_from_public_key, JwkDidResolver};
    use crate::keys::{generate_random_private_key, LocalSigner, PublicKey};
    use crate::vc::{Issuer, SignOptions};

    fn issuer() -> Issuer {
        let private_key = generate_random_private_key();
        let did = did_from_public_key(&PublicKey::from_signing_key(&private_key)).unwrap();
        Issuer::new(did, Arc::new(LocalSigner::new(private_key)))
    }

    #[tokio::test]
    async fn dispatches_on_tag() {
        let issuer = issuer();
        let login = LoginResponse::sign(
            LoginResponsePayload {
                account_name: "alice".parse().unwrap(),
            },
            &issuer,
            SignOptions::default(),
        )
        .await
        .unwrap();
        let data = DataResponse::sign(
            DataResponsePayload {
                data: SharedData {
                    username: Some("alice".into()),
                },
            },
            &issuer,
            SignOptions::default(),
        )
        .await
        .unwrap();

        let decoded = WalletResponse::from_jwt(login.jwt()).unwrap();
        assert_eq!(decoded.kind(), LOGIN_RESPONSE_TYPE);
        assert_eq!(decoded.as_login().unwrap().payload().account_name.as_str(), "alice");

        let decoded = WalletResponse::from_jwt(data.jwt()).unwrap();
        assert_eq!(decoded.as_data().unwrap().payload().data.username.as_deref(), Some("alice"));

        let resolver = Resolver::new().register(Arc::new(JwkDidResolver));
        assert!(decoded.verify(&resolver, &VerifyOptions::default()).await.unwrap());
    }

    #[tokio::test]
    async fn request_jwt_is_not_a_response() {
        let request = crate::credentials::DataSharingRequest::sign(
            crate::credentials::DataSharingRequestPayload { username: true },
            &issuer(),
            SignOptions::default(),
        )
        .await
        .unwrap();
        let err = WalletResponse::from_jwt(request.jwt()).unwrap_err();
        assert!(matches!(err, SdkError::InvalidRequestType(ref t) if t == "DataSharingRequest"));
    }

    #[test]
    fn data_response_omits_unshared_fields() {
        let payload = DataResponsePayload {
            data: SharedData::default(),
        };
        assert_eq!(serde_json::to_string(&payload).unwrap(), r#"{"data":{}}"#);
    }
}
