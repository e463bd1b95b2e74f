// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! SDK error taxonomy.
//!
//! Every failure the SDK surfaces is one variant of [`SdkError`]. Each variant
//! carries a stable string code (see [`SdkError::code`]) that is safe to put
//! on the wire, and a [`ErrorCategory`] telling the caller whether a retry or
//! a fresh consent flow makes sense.

use serde::{Deserialize, Serialize};

use crate::chain::ChainError;
use crate::keys::KeyLevel;
use crate::storage::StorageError;

/// Result alias used throughout the SDK.
pub type Result<T> = std::result::Result<T, SdkError>;

/// Broad grouping of error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Local input validation. Never retried.
    Validation,
    /// Authorization or key consistency. May trigger a fresh consent flow.
    Authorization,
    /// Channel failures. The caller may retry the handshake step.
    Transport,
    /// Fatal to the current protocol attempt.
    Protocol,
    /// Raised by the blockchain or storage collaborator.
    Collaborator,
    /// Bug or broken invariant inside the SDK.
    Internal,
}

/// SDK error type.
#[derive(Debug, thiserror::Error)]
pub enum SdkError {
    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Missing parameter: {0}")]
    MissingParams(String),

    #[error("Invalid key level: {0}")]
    InvalidKeyLevel(String),

    #[error("Invalid request type: {0}")]
    InvalidRequestType(String),

    #[error("Invalid DID: {0}")]
    InvalidDid(String),

    #[error("No key stored for level {0}")]
    KeyNotFound(KeyLevel),

    #[error("Password or PIN is invalid")]
    PasswordInvalid,

    #[error("User is not logged in with app {0}")]
    UserNotLoggedInWithThisApp(String),

    #[error("Sender is not authorized: {0}")]
    SenderNotAuthorized(String),

    #[error("Local keys do not match on-chain permissions: {0}")]
    AccountKeysMismatch(String),

    #[error("Requests from issuer {issuer} resolve to different apps")]
    IssuerAppMismatch { issuer: String },

    #[error("Communication channel is not connected")]
    CommunicationNotConnected,

    #[error("Communication timed out: {0}")]
    CommunicationTimeout(String),

    #[error("Communication channel is not logged in")]
    CommunicationNotLoggedIn,

    #[error("Message could not be sent: {0}")]
    MessageSendFailed(String),

    #[error("JWT is not valid: {0}")]
    JwtNotValid(String),

    #[error("Wrong origin: {0}")]
    WrongOrigin(String),

    #[error("Origin not found: {0}")]
    OriginNotFound(String),

    #[error("No resolver registered for DID method {0}")]
    ResolverNotFound(String),

    #[error("Link-auth failed: {0}")]
    LinkAuthFailed(String),

    #[error("User declined: {0}")]
    UserDeclined(String),

    /// Failure reported by another peer through a delivery
    #[error("Peer reported {code}: {reason}")]
    Remote { code: String, reason: String },

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SdkError {
    /// Stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            SdkError::InvalidData(_) => "InvalidData",
            SdkError::MissingParams(_) => "MissingParams",
            SdkError::InvalidKeyLevel(_) => "InvalidKeyLevel",
            SdkError::InvalidRequestType(_) => "InvalidRequestType",
            SdkError::InvalidDid(_) => "InvalidDid",
            SdkError::KeyNotFound(_) => "KeyNotFound",
            SdkError::PasswordInvalid => "PasswordInvalid",
            SdkError::UserNotLoggedInWithThisApp(_) => "UserNotLoggedInWithThisApp",
            SdkError::SenderNotAuthorized(_) => "SenderNotAuthorized",
            SdkError::AccountKeysMismatch(_) => "AccountKeysMismatch",
            SdkError::IssuerAppMismatch { .. } => "IssuerAppMismatch",
            SdkError::CommunicationNotConnected => "CommunicationNotConnected",
            SdkError::CommunicationTimeout(_) => "CommunicationTimeout",
            SdkError::CommunicationNotLoggedIn => "CommunicationNotLoggedIn",
            SdkError::MessageSendFailed(_) => "MessageSendFailed",
            SdkError::JwtNotValid(_) => "JwtNotValid",
            SdkError::WrongOrigin(_) => "WrongOrigin",
            SdkError::OriginNotFound(_) => "OriginNotFound",
            SdkError::ResolverNotFound(_) => "ResolverNotFound",
            SdkError::LinkAuthFailed(_) => "LinkAuthFailed",
            SdkError::UserDeclined(_) => "UserDeclined",
            SdkError::Remote { .. } => "Remote",
            SdkError::Chain(e) => e.code(),
            SdkError::Storage(e) => e.code(),
            SdkError::Internal(_) => "Internal",
        }
    }

    /// Category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            SdkError::InvalidData(_)
            | SdkError::MissingParams(_)
            | SdkError::InvalidKeyLevel(_)
            | SdkError::InvalidRequestType(_)
            | SdkError::InvalidDid(_) => ErrorCategory::Validation,
            SdkError::KeyNotFound(_)
            | SdkError::PasswordInvalid
            | SdkError::UserNotLoggedInWithThisApp(_)
            | SdkError::SenderNotAuthorized(_)
            | SdkError::AccountKeysMismatch(_) => ErrorCategory::Authorization,
            SdkError::CommunicationNotConnected
            | SdkError::CommunicationTimeout(_)
            | SdkError::CommunicationNotLoggedIn
            | SdkError::MessageSendFailed(_) => ErrorCategory::Transport,
            SdkError::IssuerAppMismatch { .. }
            | SdkError::JwtNotValid(_)
            | SdkError::WrongOrigin(_)
            | SdkError::OriginNotFound(_)
            | SdkError::ResolverNotFound(_)
            | SdkError::LinkAuthFailed(_)
            | SdkError::UserDeclined(_)
            | SdkError::Remote { .. } => ErrorCategory::Protocol,
            SdkError::Chain(_) | SdkError::Storage(_) => ErrorCategory::Collaborator,
            SdkError::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Serializable `{code, reason}` body used by failure deliveries.
    ///
    /// A [`SdkError::Remote`] keeps the peer's own code and reason.
    pub fn to_body(&self) -> ErrorBody {
        if let SdkError::UserDeclined(reason) = self {
            return ErrorBody::new(self.code(), reason.clone());
        }
        if let SdkError::Remote { code, reason } = self {
            return ErrorBody::new(code.clone(), reason.clone());
        }
        ErrorBody {
            code: self.code().to_string(),
            reason: self.to_string(),
        }
    }
}

impl From<serde_json::Error> for SdkError {
    fn from(e: serde_json::Error) -> Self {
        SdkError::InvalidData(format!("JSON: {e}"))
    }
}

impl From<hex::FromHexError> for SdkError {
    fn from(e: hex::FromHexError) -> Self {
        SdkError::InvalidData(format!("hex: {e}"))
    }
}

impl From<url::ParseError> for SdkError {
    fn from(e: url::ParseError) -> Self {
        SdkError::InvalidData(format!("URL: {e}"))
    }
}

impl From<ErrorBody> for SdkError {
    fn from(body: ErrorBody) -> Self {
        if body.code == "UserDeclined" {
            return SdkError::UserDeclined(body.reason);
        }
        SdkError::Remote {
            code: body.code,
            reason: body.reason,
        }
    }
}

/// Failure shape carried by redirect and message deliveries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub reason: String,
}

impl ErrorBody {
    pub fn new(code: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.reason)
    }
}
