// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Messages exchanged over the channel.
//!
//! A message is a typed credential whose issuer is the sender and whose
//! subject is the recipient.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::chain::AccountName;
use crate::did::DidUrl;
use crate::error::{ErrorBody, Result, SdkError};
use crate::managers::{DualWalletRequestsPayload, DualWalletResponsePayload};
use crate::vc::{CredentialPayload, Issuer, SignOptions, TypedCredential};

pub const AUTHENTICATION_MESSAGE_TYPE: &str = "AuthenticationMessage";
pub const IDENTIFY_MESSAGE_TYPE: &str = "IdentifyMessage";
pub const LOGIN_REQUESTS_MESSAGE_TYPE: &str = "LoginRequestsMessage";
pub const LOGIN_REQUEST_RESPONSE_MESSAGE_TYPE: &str = "LoginRequestResponseMessage";
pub const LINK_AUTH_REQUEST_MESSAGE_TYPE: &str = "LinkAuthRequestMessage";
pub const LINK_AUTH_REQUEST_RESPONSE_MESSAGE_TYPE: &str = "LinkAuthRequestResponseMessage";

/// Lifetime of channel messages.
pub const MESSAGE_TTL: Duration = Duration::from_secs(5 * 60);

pub type Message<T> = TypedCredential<T>;

/// Sign `payload` from `issuer` to `recipient`.
pub async fn sign_message<T: CredentialPayload>(
    payload: T,
    issuer: &Issuer,
    recipient: &DidUrl,
) -> Result<Message<T>> {
    let options = SignOptions::default()
        .subject(recipient.without_fragment())
        .expires_in(MESSAGE_TTL);
    Message::sign(payload, issuer, options).await
}

/// Proves control of the sender DID to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationPayload {}

impl CredentialPayload for AuthenticationPayload {
    const TYPE: &'static str = AUTHENTICATION_MESSAGE_TYPE;

    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// The wallet announces itself to a waiting broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyPayload {
    pub account_name: AccountName,
}

impl CredentialPayload for IdentifyPayload {
    const TYPE: &'static str = IDENTIFY_MESSAGE_TYPE;

    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// The broker forwards both request legs to the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequestsPayload {
    pub requests: DualWalletRequestsPayload,
}

impl CredentialPayload for LoginRequestsPayload {
    const TYPE: &'static str = LOGIN_REQUESTS_MESSAGE_TYPE;

    fn validate(&self) -> Result<()> {
        if self.requests.sso.is_empty() {
            return Err(SdkError::MissingParams("sso requests".to_string()));
        }
        Ok(())
    }
}

/// The wallet's answer to a [`LoginRequestsPayload`] message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequestResponsePayload {
    /// Id of the answered `LoginRequestsMessage`
    pub request_id: String,
    pub response: DualWalletResponsePayload,
}

impl CredentialPayload for LoginRequestResponsePayload {
    const TYPE: &'static str = LOGIN_REQUEST_RESPONSE_MESSAGE_TYPE;

    fn validate(&self) -> Result<()> {
        if self.request_id.is_empty() {
            return Err(SdkError::MissingParams("requestId".to_string()));
        }
        Ok(())
    }
}

/// Ask the wallet to link the sender's permission to `contract::action`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkAuthRequestPayload {
    pub contract: AccountName,
    pub action: String,
}

impl CredentialPayload for LinkAuthRequestPayload {
    const TYPE: &'static str = LINK_AUTH_REQUEST_MESSAGE_TYPE;

    fn validate(&self) -> Result<()> {
        if self.action.is_empty() {
            return Err(SdkError::MissingParams("action".to_string()));
        }
        Ok(())
    }
}

/// Outcome of a link-auth request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkAuthResponsePayload {
    /// Id of the answered `LinkAuthRequestMessage`
    pub request_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl CredentialPayload for LinkAuthResponsePayload {
    const TYPE: &'static str = LINK_AUTH_REQUEST_RESPONSE_MESSAGE_TYPE;

    fn validate(&self) -> Result<()> {
        if self.request_id.is_empty() {
            return Err(SdkError::MissingParams("requestId".to_string()));
        }
        if !self.success && self.error.is_none() {
            return Err(SdkError::MissingParams("error of failed link-auth".to_string()));
        }
        Ok(())
    }
}

pub type AuthenticationMessage = Message<AuthenticationPayload>;
pub type IdentifyMessage = Message<IdentifyPayload>;
pub type LoginRequestsMessage = Message<LoginRequestsPayload>;
pub type LoginRequestResponseMessage = Message<LoginRequestResponsePayload>;
pub type LinkAuthRequestMessage = Message<LinkAuthRequestPayload>;
pub type LinkAuthRequestResponseMessage = Message<LinkAuthResponsePayload>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::jwk_issuer;

    #[tokio::test]
    async fn messages_are_addressed_to_recipient_did() {
        let sender = jwk_issuer();
        let recipient: DidUrl = "did:antelope:c1:alice#local".parse().unwrap();
        let message = sign_message(AuthenticationPayload {}, &sender, &recipient)
            .await
            .unwrap();

        assert_eq!(message.subject().unwrap().to_string(), "did:antelope:c1:alice");
        assert_eq!(message.issuer(), &sender.did_url.without_fragment());
        assert!(message.expiration().is_some());
    }

    #[test]
    fn failed_link_auth_needs_error() {
        let payload = LinkAuthResponsePayload {
            request_id: "urn:uuid:1".into(),
            success: false,
            error: None,
        };
        assert_eq!(payload.validate().unwrap_err().code(), "MissingParams");
    }
}
