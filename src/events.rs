/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of the events that IBFT-rs emits, for event handling and logging.
//!
//! An event is emitted after the action it describes has been completed. Events are published by the
//! algorithm thread onto a channel, and handled on the event bus thread by the handlers registered
//! through [`ReplicaSpec`](crate::replica::ReplicaSpec), including the default logging handlers in
//! [`logging`](crate::logging) if `log_events` is set.
//!
//! Events fall into four groups:
//! 1. Sending a message: [`Propose`](Event::Propose), [`Prepare`](Event::Prepare),
//!    [`Commit`](Event::Commit), [`RoundChange`](Event::RoundChange), [`NewRound`](Event::NewRound).
//! 2. Receiving a message: the `Receive*` variants.
//! 3. Round progress: [`StartRound`](Event::StartRound), [`RoundTimeout`](Event::RoundTimeout),
//!    [`CollectPreparedCertificate`](Event::CollectPreparedCertificate),
//!    [`CollectRoundChangeCertificate`](Event::CollectRoundChangeCertificate),
//!    [`CommitBlock`](Event::CommitBlock).
//! 4. Gossip decisions: [`RelayMessage`](Event::RelayMessage), [`BufferMessage`](Event::BufferMessage),
//!    [`DropMessage`](Event::DropMessage).

use std::{
    sync::mpsc::Sender,
    time::{Duration, SystemTime},
};

use ed25519_dalek::VerifyingKey;

use crate::{
    gossip::filter::DropReason,
    ibft::messages::{Commit, MessageKind, NewRound, Prepare, Proposal, RoundChange},
    types::data_types::{BlockHeight, ConsensusRoundIdentifier, CryptoHash},
};

pub enum Event {
    // Events that involve sending a message.
    Propose(ProposeEvent),
    Prepare(PrepareEvent),
    Commit(CommitEvent),
    RoundChange(RoundChangeEvent),
    NewRound(NewRoundEvent),

    // Events that involve receiving a message.
    ReceiveProposal(ReceiveProposalEvent),
    ReceivePrepare(ReceivePrepareEvent),
    ReceiveCommit(ReceiveCommitEvent),
    ReceiveRoundChange(ReceiveRoundChangeEvent),
    ReceiveNewRound(ReceiveNewRoundEvent),

    // Events that mark progress through rounds and heights.
    StartRound(StartRoundEvent),
    RoundTimeout(RoundTimeoutEvent),
    CollectPreparedCertificate(CollectPreparedCertificateEvent),
    CollectRoundChangeCertificate(CollectRoundChangeCertificateEvent),
    CommitBlock(CommitBlockEvent),

    // Events that record what the gossip layer did with an inbound message.
    RelayMessage(RelayMessageEvent),
    BufferMessage(BufferMessageEvent),
    DropMessage(DropMessageEvent),
}

impl Event {
    /// Publish this event on `event_publisher`, if event handling is enabled.
    ///
    /// Events are dropped silently if the event bus has already shut down.
    pub(crate) fn publish(self, event_publisher: &Option<Sender<Event>>) {
        if let Some(event_publisher) = event_publisher {
            let _ = event_publisher.send(self);
        }
    }
}

/// The local validator broadcast a proposal.
pub struct ProposeEvent {
    pub timestamp: SystemTime,
    pub proposal: Proposal,
}

/// The local validator broadcast a prepare.
pub struct PrepareEvent {
    pub timestamp: SystemTime,
    pub prepare: Prepare,
}

/// The local validator broadcast a commit.
pub struct CommitEvent {
    pub timestamp: SystemTime,
    pub commit: Commit,
}

/// The local validator broadcast a round change.
pub struct RoundChangeEvent {
    pub timestamp: SystemTime,
    pub round_change: RoundChange,
}

/// The local validator broadcast a new round message.
pub struct NewRoundEvent {
    pub timestamp: SystemTime,
    pub new_round: NewRound,
}

/// A proposal was delivered to the controller. `origin` is the peer it was received from.
pub struct ReceiveProposalEvent {
    pub timestamp: SystemTime,
    pub origin: VerifyingKey,
    pub proposal: Proposal,
}

pub struct ReceivePrepareEvent {
    pub timestamp: SystemTime,
    pub origin: VerifyingKey,
    pub prepare: Prepare,
}

pub struct ReceiveCommitEvent {
    pub timestamp: SystemTime,
    pub origin: VerifyingKey,
    pub commit: Commit,
}

pub struct ReceiveRoundChangeEvent {
    pub timestamp: SystemTime,
    pub origin: VerifyingKey,
    pub round_change: RoundChange,
}

pub struct ReceiveNewRoundEvent {
    pub timestamp: SystemTime,
    pub origin: VerifyingKey,
    pub new_round: NewRound,
}

/// The local validator started `round`, in which `proposer` proposes.
pub struct StartRoundEvent {
    pub timestamp: SystemTime,
    pub round: ConsensusRoundIdentifier,
    pub proposer: VerifyingKey,
}

/// `round` expired after `timeout` without a block being committed.
pub struct RoundTimeoutEvent {
    pub timestamp: SystemTime,
    pub round: ConsensusRoundIdentifier,
    pub timeout: Duration,
}

/// A quorum prepared the block with hash `digest` in `round`.
pub struct CollectPreparedCertificateEvent {
    pub timestamp: SystemTime,
    pub round: ConsensusRoundIdentifier,
    pub digest: CryptoHash,
}

/// The local validator, as proposer of `round`, collected round changes from `signers` validators.
pub struct CollectRoundChangeCertificateEvent {
    pub timestamp: SystemTime,
    pub round: ConsensusRoundIdentifier,
    pub signers: usize,
}

/// A block was decided and appended to the chain.
pub struct CommitBlockEvent {
    pub timestamp: SystemTime,
    pub block: CryptoHash,
    pub height: BlockHeight,
    pub round: ConsensusRoundIdentifier,
}

/// A message received from `origin` was forwarded to `recipients` other validators.
pub struct RelayMessageEvent {
    pub timestamp: SystemTime,
    pub origin: VerifyingKey,
    pub author: VerifyingKey,
    pub round: ConsensusRoundIdentifier,
    pub kind: MessageKind,
    pub recipients: usize,
}

/// A message for a future round was buffered until the local validator reaches its round.
pub struct BufferMessageEvent {
    pub timestamp: SystemTime,
    pub origin: VerifyingKey,
    pub author: VerifyingKey,
    pub round: ConsensusRoundIdentifier,
    pub kind: MessageKind,
}

/// A message was neither relayed nor delivered.
pub struct DropMessageEvent {
    pub timestamp: SystemTime,
    pub origin: VerifyingKey,
    pub author: VerifyingKey,
    pub round: ConsensusRoundIdentifier,
    pub kind: MessageKind,
    pub reason: DropReason,
}
