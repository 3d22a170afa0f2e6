/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`GossipFilter`], which decides what happens to every consensus message received from a peer.
//!
//! ## Decision procedure
//!
//! Every inbound message is checked against the local node's current round identifier, in this
//! order:
//! 1. If its author is not in the validator set, it is dropped.
//! 2. If the exact same message (same author, round, kind and content) was seen before, it is dropped.
//! 3. If it is for an earlier height, it is dropped.
//! 4. If it is for the current height and a round no later than the current round, it is
//!    [delivered](FilterDecision::Deliver) to the controller and relayed to peers.
//! 5. Otherwise, i.e., it is for a later round or a later height, it is buffered in the
//!    [`FutureMessageBuffer`] until the local node catches up.
//!
//! Whenever the current round identifier advances, [`flush`](GossipFilter::flush) releases the
//! buffered messages that have become current. Those messages have already been seen, so they skip
//! the duplicate check.

use std::{
    collections::HashSet,
    fmt::{self, Display, Formatter},
    sync::Arc,
};

use ed25519_dalek::VerifyingKey;

use crate::{
    ibft::messages::{IbftMessage, MessageKey},
    types::{
        data_types::{BlockHeight, BufferSize, ConsensusRoundIdentifier},
        validator_set::ValidatorSet,
    },
};

use super::buffer::{BufferRejection, BufferedMessage, FutureMessageBuffer};

/// What the [`GossipFilter`] decided to do with an inbound message.
pub enum FilterDecision {
    /// The message is for the current round or an earlier round of the current height: deliver it to the
    /// controller and relay it.
    Deliver(IbftMessage),
    /// The message is for a future round and was stored.
    Buffer,
    /// The message was discarded.
    Drop(DropReason),
}

/// Why a message was not relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The author is not a member of the validator set.
    UnknownSigner,
    /// The message was seen before.
    Duplicate,
    /// The message is for a height that was already decided.
    PastHeight,
    /// The future message buffer had no room for the message.
    BufferFull,
    /// The controller found the message invalid.
    Rejected,
}

impl Display for DropReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let reason = match self {
            DropReason::UnknownSigner => "UnknownSigner",
            DropReason::Duplicate => "Duplicate",
            DropReason::PastHeight => "PastHeight",
            DropReason::BufferFull => "BufferFull",
            DropReason::Rejected => "Rejected",
        };
        f.write_str(reason)
    }
}

pub struct GossipFilter {
    validator_set: Arc<ValidatorSet>,
    seen: HashSet<MessageKey>,
    buffer: FutureMessageBuffer,
}

impl GossipFilter {
    pub fn new(
        validator_set: Arc<ValidatorSet>,
        buffer_capacity: BufferSize,
        per_author_buffer_limit: usize,
    ) -> GossipFilter {
        GossipFilter {
            validator_set,
            seen: HashSet::new(),
            buffer: FutureMessageBuffer::new(buffer_capacity, per_author_buffer_limit),
        }
    }

    /// Decide what to do with `message`, received from `origin`, given that the local node is in
    /// `current`.
    pub fn evaluate(
        &mut self,
        origin: VerifyingKey,
        message: IbftMessage,
        current: ConsensusRoundIdentifier,
    ) -> FilterDecision {
        if !self.validator_set.contains(message.author()) {
            return FilterDecision::Drop(DropReason::UnknownSigner);
        }

        let key = message.key();
        if self.seen.contains(&key) {
            return FilterDecision::Drop(DropReason::Duplicate);
        }

        let round = message.round();
        if round.height < current.height {
            return FilterDecision::Drop(DropReason::PastHeight);
        }

        self.seen.insert(key);
        if round <= current {
            return FilterDecision::Deliver(message);
        }

        match self.buffer.insert(origin, message) {
            Ok(evicted) => {
                self.unsee(&evicted);
                FilterDecision::Buffer
            }
            Err(BufferRejection::CapacityExceeded | BufferRejection::AuthorLimitReached) => {
                // Let a later copy of the message be buffered if space frees up.
                self.seen.remove(&key);
                FilterDecision::Drop(DropReason::BufferFull)
            }
        }
    }

    /// Record that a message the local node created itself was seen, so that copies relayed back to it
    /// are dropped as duplicates.
    pub fn mark_seen(&mut self, message: &IbftMessage) {
        self.seen.insert(message.key());
    }

    /// Release the buffered messages that are current in `current`, in round order, paired with the
    /// peers they were received from. Buffered messages and duplicate-detection state for heights below
    /// `current.height` are discarded.
    pub fn flush(&mut self, current: ConsensusRoundIdentifier) -> Vec<(VerifyingKey, IbftMessage)> {
        self.retire_heights_below(current.height);
        self.buffer
            .take_ready(current)
            .into_iter()
            .map(|buffered| (buffered.origin, buffered.message))
            .collect()
    }

    /// Forget the buffered messages received from a peer that disconnected.
    pub fn peer_disconnected(&mut self, peer: &VerifyingKey) -> usize {
        let removed = self.buffer.remove_origin(peer);
        self.unsee(&removed);
        removed.len()
    }

    /// The number of messages waiting in the future message buffer.
    pub fn buffered_count(&self) -> usize {
        self.buffer.len()
    }

    fn retire_heights_below(&mut self, height: BlockHeight) {
        self.seen.retain(|key| key.round.height >= height);
    }

    fn unsee(&mut self, messages: &[BufferedMessage]) {
        for buffered in messages {
            self.seen.remove(&buffered.message.key());
        }
    }
}
