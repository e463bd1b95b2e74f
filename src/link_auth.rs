// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Just-in-time permission linking.
//!
//! An app holding `did:<method>:<chain>:<account>#<permission>` asks the
//! user's wallet to link `<permission>` to `contract::action`. The wallet
//! only answers its own account's permissions; anything else is dropped
//! without a reply so the sender learns nothing about the account.

use std::sync::Arc;
use std::time::Duration;

use crate::chain::AccountName;
use crate::communication::{
    sign_message, Communication, InboundMessage, LinkAuthRequestPayload, LinkAuthResponsePayload,
};
use crate::did::{ChainDid, DidUrl, Resolver};
use crate::error::{Result, SdkError};
use crate::keys::KeyLevel;
use crate::user::WalletUser;
use crate::vc::{CredentialPayload, Issuer, VerifyOptions};

/// One link-auth round trip.
pub struct LinkAuthCall {
    /// The app's permission key on the user's account
    pub issuer: Issuer,
    /// The wallet to ask
    pub wallet: DidUrl,
    pub contract: AccountName,
    pub action: String,
}

/// Ask the wallet to link the caller's permission and wait for its reply.
///
/// Only a reply signed by one of the wallet's own keys counts; other keys
/// on the account are ignored. The reply listener is registered before the
/// request leaves and is released on every outcome. No reply within `timeout` is a
/// `CommunicationTimeout`; a reply with `success: false` is `LinkAuthFailed`.
pub async fn request_link_auth(
    communication: &Communication,
    resolver: &Resolver,
    call: &LinkAuthCall,
    timeout: Duration,
) -> Result<()> {
    let request = sign_message(
        LinkAuthRequestPayload {
            contract: call.contract.clone(),
            action: call.action.clone(),
        },
        &call.issuer,
        &call.wallet,
    )
    .await?;

    let request_id = request.id().to_string();
    let wallet = call.wallet.clone();
    let pending = communication.expect_message(LinkAuthResponsePayload::TYPE, move |message| {
        message
            .decode::<LinkAuthResponsePayload>()
            .is_ok_and(|r| {
                r.payload().request_id == request_id
                    && r.issuer().same_did(&wallet)
                    && ChainDid::from_wallet_key(r.key_id(), wallet.method()).is_ok()
            })
    });
    communication.send(&request).await?;
    tracing::debug!(id = request.id(), contract = %call.contract, action = %call.action, "Link-auth requested");

    let reply = pending
        .recv(timeout)
        .await?
        .decode::<LinkAuthResponsePayload>()?;
    if !reply.verify(resolver).await? {
        return Err(SdkError::JwtNotValid("LinkAuthRequestResponseMessage".to_string()));
    }
    if !reply.payload().success {
        let reason = reply
            .payload()
            .error
            .as_ref()
            .map_or_else(|| "no reason given".to_string(), ToString::to_string);
        return Err(SdkError::LinkAuthFailed(reason));
    }
    tracing::info!(contract = %call.contract, action = %call.action, "Link-auth confirmed");
    Ok(())
}

/// Wallet-side handler for link-auth requests.
pub struct LinkAuthResponder;

impl LinkAuthResponder {
    /// Answer link-auth requests on `communication` as `user`. Returns the
    /// subscription id.
    pub fn register(communication: &Communication, user: Arc<WalletUser>) -> u64 {
        let channel = communication.clone();
        communication.subscribe_message(
            move |message| {
                let channel = channel.clone();
                let user = user.clone();
                let message = message.clone();
                tokio::spawn(async move {
                    if let Err(e) = respond(&channel, &user, &message).await {
                        tracing::warn!(error = %e, "Link-auth reply failed");
                    }
                });
            },
            Some(LinkAuthRequestPayload::TYPE),
        )
    }
}

async fn respond(channel: &Communication, user: &WalletUser, message: &InboundMessage) -> Result<()> {
    let request = message.decode::<LinkAuthRequestPayload>()?;
    let account = user.account_name().await?;

    let sender = match ChainDid::from_url(request.key_id(), &user.config().chain_did_method) {
        Ok(sender) if sender.account == account && request.issuer().same_did(request.key_id()) => sender,
        _ => {
            tracing::debug!(sender = %request.key_id(), "Dropped link-auth from foreign sender");
            return Ok(());
        }
    };
    let Some(permission) = sender.permission else {
        tracing::debug!(sender = %request.key_id(), "Dropped link-auth without permission");
        return Ok(());
    };
    let verified = request
        .verify_with(user.resolver(), &VerifyOptions::from(user.config()))
        .await
        .unwrap_or(false);
    if !verified {
        tracing::debug!(sender = %request.key_id(), "Dropped unverifiable link-auth");
        return Ok(());
    }

    let payload = request.payload();
    let outcome = user.link_auth(&permission, &payload.contract, &payload.action).await;
    let reply = LinkAuthResponsePayload {
        request_id: request.id().to_string(),
        success: outcome.is_ok(),
        error: outcome.err().map(|e| e.to_body()),
    };
    let issuer = user.issuer(KeyLevel::Local).await?;
    channel
        .send(&sign_message(reply, &issuer, request.issuer()).await?)
        .await?;
    Ok(())
}
