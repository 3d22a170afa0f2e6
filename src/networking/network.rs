/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`Network`] trait, which users implement to connect IBFT-rs to their peer-to-peer network.

use ed25519_dalek::VerifyingKey;

use crate::{ibft::messages::IbftMessage, types::validator_set::ValidatorSet};

/// Pluggable peer-to-peer networking.
///
/// Peers are identified by their validator `VerifyingKey`s. Implementations are responsible for
/// connection management, encoding and framing. A received message must be re-assembled with
/// [`SignedPayload::from_parts`](crate::types::signed_payload::SignedPayload::from_parts), so messages
/// with bad signatures never reach [`recv`](Self::recv)'s caller.
pub trait Network: Clone + Send {
    /// Inform the network provider of the validator set on start-up.
    fn init_validator_set(&mut self, validator_set: ValidatorSet);

    /// Send a message to all peers without blocking.
    fn broadcast(&mut self, message: IbftMessage);

    /// Send a message to the specified peer without blocking.
    fn send(&mut self, peer: VerifyingKey, message: IbftMessage);

    /// Receive a message from any peer. Returns immediately with a `None` if no message is available now.
    fn recv(&mut self) -> Option<(VerifyingKey, IbftMessage)>;

    /// Receive the identity of a peer whose connection was lost. Returns immediately with a `None` if
    /// no peer disconnected since the last call.
    fn recv_disconnection(&mut self) -> Option<VerifyingKey> {
        None
    }
}
