/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Sending messages to the other validators.

use std::sync::Arc;

use ed25519_dalek::VerifyingKey;

use crate::{
    ibft::messages::IbftMessage,
    networking::{network::Network, sending::SenderHandle},
    types::validator_set::ValidatorSet,
};

/// Sends consensus messages to every validator, except for the ones that already have the message.
///
/// Messages created by the local node are broadcast. Relayed messages go to validators only, one
/// `send` per recipient, and a validator never receives a relayed message that it authored or that it
/// sent to the local node.
pub(crate) struct PeerFanout<N: Network> {
    sender_handle: SenderHandle<N>,
    validator_set: Arc<ValidatorSet>,
    me: VerifyingKey,
}

impl<N: Network> PeerFanout<N> {
    pub(crate) fn new(
        sender_handle: SenderHandle<N>,
        validator_set: Arc<ValidatorSet>,
        me: VerifyingKey,
    ) -> Self {
        Self {
            sender_handle,
            validator_set,
            me,
        }
    }

    /// Broadcast a message created by the local node. Returns the number of validators it is meant for.
    pub(crate) fn send_own(&mut self, message: &IbftMessage) -> usize {
        self.sender_handle.broadcast(message.clone());
        self.validator_set
            .validators()
            .filter(|validator| **validator != self.me)
            .count()
    }

    /// Relay a message received from `sender` to every validator other than `sender`, the message's
    /// author and the local node. Returns the number of recipients.
    pub(crate) fn relay(&mut self, message: &IbftMessage, sender: &VerifyingKey) -> usize {
        let author = *message.author();
        self.send_excluding(message, &[*sender, author])
    }

    fn send_excluding(&mut self, message: &IbftMessage, excluded: &[VerifyingKey]) -> usize {
        let recipients: Vec<VerifyingKey> = self
            .validator_set
            .validators()
            .filter(|validator| **validator != self.me && !excluded.contains(validator))
            .copied()
            .collect();
        for recipient in &recipients {
            self.sender_handle.send(*recipient, message.clone());
        }
        recipients.len()
    }
}
