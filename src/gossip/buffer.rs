/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Bounded storage for messages that arrive before the local node reaches their round.

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    mem,
    ops::Bound::{Excluded, Unbounded},
};

use ed25519_dalek::VerifyingKey;

use crate::{
    ibft::messages::IbftMessage,
    types::data_types::{BufferSize, ConsensusRoundIdentifier},
};

/// A message held in the [`FutureMessageBuffer`], together with the peer it was received from.
pub(crate) struct BufferedMessage {
    pub(crate) origin: VerifyingKey,
    pub(crate) message: IbftMessage,
    size: u64,
}

/// Why [`FutureMessageBuffer::insert`] refused a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BufferRejection {
    /// The buffer is full of messages for rounds no later than the message's round.
    CapacityExceeded,
    /// The message's author already has the maximum number of messages in the buffer.
    AuthorLimitReached,
}

/// Message buffer for messages of future rounds, keyed by round identifier.
///
/// ## Bounds
///
/// The buffer is bounded in two ways:
/// 1. By `capacity`, the total number of bytes its messages (and their origins) may occupy. If
///    inserting a message would exceed the capacity, just enough messages of rounds *higher* than the
///    message's round are evicted to make space, highest rounds first. If that is not possible, the
///    message is refused.
/// 2. By `per_author_limit`, the number of messages any single author may have in the buffer, so that
///    a single validator cannot fill the buffer with messages for far-future rounds.
pub(crate) struct FutureMessageBuffer {
    capacity: BufferSize,
    per_author_limit: usize,
    buffer: BTreeMap<ConsensusRoundIdentifier, VecDeque<BufferedMessage>>,
    size: BufferSize,
    entries_per_author: HashMap<[u8; 32], usize>,
}

impl FutureMessageBuffer {
    pub(crate) fn new(capacity: BufferSize, per_author_limit: usize) -> Self {
        Self {
            capacity,
            per_author_limit,
            buffer: BTreeMap::new(),
            size: BufferSize::new(0),
            entries_per_author: HashMap::new(),
        }
    }

    /// Try inserting `message`, received from `origin`, into the buffer.
    ///
    /// Returns the messages evicted to make space for it.
    pub(crate) fn insert(
        &mut self,
        origin: VerifyingKey,
        message: IbftMessage,
    ) -> Result<Vec<BufferedMessage>, BufferRejection> {
        let author = message.author().to_bytes();
        if self.entries_per_author.get(&author).copied().unwrap_or(0) >= self.per_author_limit {
            return Err(BufferRejection::AuthorLimitReached);
        }

        let round = message.round();
        let bytes_requested = mem::size_of::<VerifyingKey>() as u64 + message.size();
        let bytes_needed = (self.size.int() + bytes_requested).saturating_sub(self.capacity.int());

        let mut evicted = Vec::new();
        if bytes_needed > 0 {
            // Only messages for higher rounds than this one may make way for it.
            let evictable: u64 = self
                .buffer
                .range((Excluded(round), Unbounded))
                .flat_map(|(_, queue)| queue.iter())
                .map(|buffered| buffered.size)
                .sum();
            if evictable < bytes_needed {
                return Err(BufferRejection::CapacityExceeded);
            }
            evicted = self.remove_highest_round_msgs(bytes_needed);
        }

        self.size += bytes_requested;
        *self.entries_per_author.entry(author).or_insert(0) += 1;
        self.buffer
            .entry(round)
            .or_default()
            .push_back(BufferedMessage {
                origin,
                message,
                size: bytes_requested,
            });
        Ok(evicted)
    }

    /// Remove and return, in round order, every message for a round of `current.height` no later than
    /// `current`. Messages for earlier heights are discarded. Messages for later rounds stay.
    pub(crate) fn take_ready(&mut self, current: ConsensusRoundIdentifier) -> Vec<BufferedMessage> {
        let future = self.buffer.split_off(&current.next_round());
        let not_future = mem::replace(&mut self.buffer, future);

        let mut ready = Vec::new();
        for (round, queue) in not_future {
            for buffered in queue {
                self.forget(&buffered);
                if round.height == current.height {
                    ready.push(buffered);
                }
            }
        }
        ready
    }

    /// Remove every message received from `origin`.
    pub(crate) fn remove_origin(&mut self, origin: &VerifyingKey) -> Vec<BufferedMessage> {
        let mut removed = Vec::new();
        for queue in self.buffer.values_mut() {
            let (from_origin, others): (VecDeque<_>, VecDeque<_>) = mem::take(queue)
                .into_iter()
                .partition(|buffered| &buffered.origin == origin);
            *queue = others;
            removed.extend(from_origin);
        }
        self.buffer.retain(|_, queue| !queue.is_empty());
        removed.iter().for_each(|buffered| self.forget(buffered));
        removed
    }

    pub(crate) fn len(&self) -> usize {
        self.buffer.values().map(VecDeque::len).sum()
    }

    #[cfg(test)]
    pub(crate) fn size(&self) -> BufferSize {
        self.size
    }

    /// Removes just enough of the highest-round messages to free at least `bytes_to_remove` bytes.
    fn remove_highest_round_msgs(&mut self, bytes_to_remove: u64) -> Vec<BufferedMessage> {
        let mut bytes_removed = 0;
        let mut removed = Vec::new();
        while bytes_removed < bytes_to_remove {
            let Some(mut entry) = self.buffer.last_entry() else {
                break;
            };
            if let Some(buffered) = entry.get_mut().pop_back() {
                bytes_removed += buffered.size;
                removed.push(buffered);
            }
            if entry.get().is_empty() {
                entry.remove();
            }
        }
        removed.iter().for_each(|buffered| self.forget(buffered));
        removed
    }

    // Update the size and per-author counts for a message that left the buffer.
    fn forget(&mut self, buffered: &BufferedMessage) {
        self.size -= buffered.size;
        let author = buffered.message.author().to_bytes();
        if let Some(count) = self.entries_per_author.get_mut(&author) {
            *count -= 1;
            if *count == 0 {
                self.entries_per_author.remove(&author);
            }
        }
    }
}
