/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for structured messages that are sent between validators as part of the IBFT protocol.
//!
//! Every message is a [`SignedPayload`] over one of the payload types defined here. The wire encoding of
//! these messages is left to the [`Network`](crate::networking::network::Network) implementation, which
//! must preserve every field, and must re-assemble received messages using
//! [`SignedPayload::from_parts`] so that their signatures are checked.

use std::fmt::{self, Display, Formatter};

use borsh::BorshSerialize;
use ed25519_dalek::VerifyingKey;

use crate::types::{
    block::{borsh_bytes, Block},
    data_types::{ConsensusRoundIdentifier, CryptoHash, SignatureBytes},
    signed_payload::SignedPayload,
};

use super::certificates::{PreparedCertificate, RoundChangeCertificate};

/// A block proposed for `round` by the round's proposer.
#[derive(Clone, PartialEq, Eq, BorshSerialize)]
pub struct ProposalPayload {
    pub round: ConsensusRoundIdentifier,
    pub block: Block,
}

/// A validator's statement that it accepted the proposal with hash `digest` in `round`.
#[derive(Clone, PartialEq, Eq, BorshSerialize)]
pub struct PreparePayload {
    pub round: ConsensusRoundIdentifier,
    pub digest: CryptoHash,
}

/// A validator's statement that it saw a quorum of prepares for `digest` in `round`.
///
/// `commit_seal` is the author's signature over `digest`, which is embedded in the sealed block once
/// the block is decided.
#[derive(Clone, PartialEq, Eq, BorshSerialize)]
pub struct CommitPayload {
    pub round: ConsensusRoundIdentifier,
    pub digest: CryptoHash,
    pub commit_seal: SignatureBytes,
}

/// A validator's request to move to `round` (the *target* round).
///
/// If the validator reached the prepared state in an earlier round of the same height, it carries the
/// [`PreparedCertificate`] of the latest such round, so that the proposer of `round` re-proposes the
/// prepared block.
#[derive(Clone, PartialEq, Eq, BorshSerialize)]
pub struct RoundChangePayload {
    pub round: ConsensusRoundIdentifier,
    pub prepared_certificate: Option<PreparedCertificate>,
}

/// The proposer's justification for starting `round`: a quorum of round changes targeting `round`, and
/// the proposal for `round`.
#[derive(Clone, PartialEq, Eq, BorshSerialize)]
pub struct NewRoundPayload {
    pub round: ConsensusRoundIdentifier,
    pub round_change_certificate: RoundChangeCertificate,
    pub proposal: Proposal,
}

pub type Proposal = SignedPayload<ProposalPayload>;

pub type Prepare = SignedPayload<PreparePayload>;

pub type Commit = SignedPayload<CommitPayload>;

pub type RoundChange = SignedPayload<RoundChangePayload>;

pub type NewRound = SignedPayload<NewRoundPayload>;

/// Every message variant exchanged in the IBFT protocol.
#[derive(Clone, PartialEq, Eq)]
pub enum IbftMessage {
    Proposal(Proposal),
    Prepare(Prepare),
    Commit(Commit),
    RoundChange(RoundChange),
    NewRound(NewRound),
}

impl IbftMessage {
    /// Returns the round identifier associated with a given [IbftMessage].
    pub fn round(&self) -> ConsensusRoundIdentifier {
        match self {
            IbftMessage::Proposal(proposal) => proposal.payload().round,
            IbftMessage::Prepare(prepare) => prepare.payload().round,
            IbftMessage::Commit(commit) => commit.payload().round,
            IbftMessage::RoundChange(round_change) => round_change.payload().round,
            IbftMessage::NewRound(new_round) => new_round.payload().round,
        }
    }

    /// Returns the validator that created (signed) a given [IbftMessage].
    pub fn author(&self) -> &VerifyingKey {
        match self {
            IbftMessage::Proposal(proposal) => proposal.author(),
            IbftMessage::Prepare(prepare) => prepare.author(),
            IbftMessage::Commit(commit) => commit.author(),
            IbftMessage::RoundChange(round_change) => round_change.author(),
            IbftMessage::NewRound(new_round) => new_round.author(),
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            IbftMessage::Proposal(_) => MessageKind::Proposal,
            IbftMessage::Prepare(_) => MessageKind::Prepare,
            IbftMessage::Commit(_) => MessageKind::Commit,
            IbftMessage::RoundChange(_) => MessageKind::RoundChange,
            IbftMessage::NewRound(_) => MessageKind::NewRound,
        }
    }

    /// Returns the hash of the signed body of the message.
    pub fn content_hash(&self) -> CryptoHash {
        match self {
            IbftMessage::Proposal(proposal) => proposal.content_hash(),
            IbftMessage::Prepare(prepare) => prepare.content_hash(),
            IbftMessage::Commit(commit) => commit.content_hash(),
            IbftMessage::RoundChange(round_change) => round_change.content_hash(),
            IbftMessage::NewRound(new_round) => new_round.content_hash(),
        }
    }

    /// Returns the number of bytes the message occupies when encoded.
    pub fn size(&self) -> u64 {
        let encoded_len = match self {
            IbftMessage::Proposal(proposal) => borsh_bytes(proposal).len(),
            IbftMessage::Prepare(prepare) => borsh_bytes(prepare).len(),
            IbftMessage::Commit(commit) => borsh_bytes(commit).len(),
            IbftMessage::RoundChange(round_change) => borsh_bytes(round_change).len(),
            IbftMessage::NewRound(new_round) => borsh_bytes(new_round).len(),
        };
        encoded_len as u64
    }

    /// The key that identifies this exact message for duplicate detection.
    pub fn key(&self) -> MessageKey {
        MessageKey {
            author: self.author().to_bytes(),
            round: self.round(),
            kind: self.kind(),
            content_hash: self.content_hash(),
        }
    }
}

impl From<Proposal> for IbftMessage {
    fn from(value: Proposal) -> Self {
        IbftMessage::Proposal(value)
    }
}

impl From<Prepare> for IbftMessage {
    fn from(value: Prepare) -> Self {
        IbftMessage::Prepare(value)
    }
}

impl From<Commit> for IbftMessage {
    fn from(value: Commit) -> Self {
        IbftMessage::Commit(value)
    }
}

impl From<RoundChange> for IbftMessage {
    fn from(value: RoundChange) -> Self {
        IbftMessage::RoundChange(value)
    }
}

impl From<NewRound> for IbftMessage {
    fn from(value: NewRound) -> Self {
        IbftMessage::NewRound(value)
    }
}

/// The kind of an [`IbftMessage`], without its contents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Proposal,
    Prepare,
    Commit,
    RoundChange,
    NewRound,
}

impl Display for MessageKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::Proposal => "Proposal",
            MessageKind::Prepare => "Prepare",
            MessageKind::Commit => "Commit",
            MessageKind::RoundChange => "RoundChange",
            MessageKind::NewRound => "NewRound",
        };
        f.write_str(name)
    }
}

/// Identifies a message by `(author, round, kind, content hash)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageKey {
    pub author: [u8; 32],
    pub round: ConsensusRoundIdentifier,
    pub kind: MessageKind,
    pub content_hash: CryptoHash,
}
