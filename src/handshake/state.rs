// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Handshake state machine.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SdkError};

/// Progress of one dual-wallet handshake.
///
/// The happy path is linear. Each peer only observes some of the states,
/// so a move may skip ahead but never go back. `Failed` is reachable from
/// every non-final state and `Declined` from every non-final state before
/// the wallet answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HandshakeState {
    /// Relying party signs its requests
    Init,
    /// Broker received the bundle and built its own leg
    Redirected,
    /// Broker waits for the wallet to identify itself
    WaitingForAgent,
    /// Both legs were forwarded to the wallet
    RequestSent,
    /// Wallet verified the requests and asks the user
    Consent,
    ResponseSent,
    /// Broker split the response into its legs
    Callback,
    /// Relying party received its leg
    ExternalCallback,
    Terminal,
    Failed,
    Declined,
}

impl HandshakeState {
    /// Position on the happy path, `None` for the failure states.
    fn step(&self) -> Option<u8> {
        Some(match self {
            HandshakeState::Init => 0,
            HandshakeState::Redirected => 1,
            HandshakeState::WaitingForAgent => 2,
            HandshakeState::RequestSent => 3,
            HandshakeState::Consent => 4,
            HandshakeState::ResponseSent => 5,
            HandshakeState::Callback => 6,
            HandshakeState::ExternalCallback => 7,
            HandshakeState::Terminal => 8,
            HandshakeState::Failed | HandshakeState::Declined => return None,
        })
    }

    /// No transition leaves a final state.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            HandshakeState::Terminal | HandshakeState::Failed | HandshakeState::Declined
        )
    }

    pub fn can_advance(&self, next: HandshakeState) -> bool {
        if self.is_final() {
            return false;
        }
        match (self.step(), next) {
            (_, HandshakeState::Failed) => true,
            (Some(current), HandshakeState::Declined) => current < 5,
            (Some(current), next) => next.step().is_some_and(|n| n > current),
            (None, _) => false,
        }
    }

    /// The state after moving to `next`, or `InvalidData` for an illegal move.
    pub fn advance(self, next: HandshakeState) -> Result<HandshakeState> {
        if !self.can_advance(next) {
            return Err(SdkError::InvalidData(format!(
                "illegal handshake transition {self:?} -> {next:?}"
            )));
        }
        tracing::debug!(from = ?self, to = ?next, "Handshake transition");
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_moves_forward_only() {
        let state = HandshakeState::Init
            .advance(HandshakeState::Redirected)
            .unwrap()
            .advance(HandshakeState::ExternalCallback)
            .unwrap();
        assert_eq!(
            state.advance(HandshakeState::Redirected).unwrap_err().code(),
            "InvalidData"
        );
        assert!(state.advance(state).is_err());
        assert_eq!(
            state.advance(HandshakeState::Terminal).unwrap(),
            HandshakeState::Terminal
        );
    }

    #[test]
    fn final_states_are_sticky() {
        for state in [
            HandshakeState::Terminal,
            HandshakeState::Failed,
            HandshakeState::Declined,
        ] {
            assert!(state.advance(HandshakeState::Failed).is_err());
            assert!(state.advance(HandshakeState::Init).is_err());
        }
    }

    #[test]
    fn decline_only_before_the_response() {
        assert!(HandshakeState::Consent.can_advance(HandshakeState::Declined));
        assert!(HandshakeState::RequestSent.can_advance(HandshakeState::Declined));
        assert!(!HandshakeState::ResponseSent.can_advance(HandshakeState::Declined));
        assert!(HandshakeState::ResponseSent.can_advance(HandshakeState::Failed));
    }
}
