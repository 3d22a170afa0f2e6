/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The algorithm thread, which serializes everything that changes consensus state.
//!
//! The algorithm thread owns the [`IbftController`], the [`GossipFilter`], and the [`PeerFanout`], and
//! is the only thread that touches them. Everything else reaches it through a single queue of
//! [`ConsensusEvent`]s:
//! 1. Messages and disconnections, enqueued by the poller thread in [`receiving`](crate::networking::receiving).
//! 2. New chain heads, enqueued by the host through a [`ChainEventHandle`](crate::replica::ChainEventHandle).
//!
//! Timers are not events in the queue. The thread waits on the queue only until the controller's
//! earliest timer deadline, and then fires the expired timers itself.
//!
//! ## Processing an event
//!
//! Processing an event may cause the controller to create messages, which may in turn cause it to
//! create more messages once they are delivered back to it. The algorithm therefore keeps a worklist of
//! messages to deliver, and *settles* after every event by repeating the following until there is
//! nothing left to do:
//! 1. Broadcast every message in the controller's outbox, mark it as seen, and add it to the worklist.
//! 2. If the controller's round advanced, add the buffered messages that became current to the worklist.
//! 3. Deliver the next message in the worklist to the controller. A message received from a peer is
//!    relayed to the validators that cannot have it yet, unless the controller rejected it.

use std::{
    collections::VecDeque,
    sync::mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError},
    thread::{self, JoinHandle},
    time::{Duration, Instant, SystemTime},
};

use ed25519_dalek::VerifyingKey;

use crate::{
    chain::Chain,
    events::*,
    gossip::{
        fanout::PeerFanout,
        filter::{DropReason, FilterDecision, GossipFilter},
    },
    ibft::{
        implementation::{IbftController, MessageVerdict},
        messages::IbftMessage,
    },
    networking::network::Network,
    types::{block::BlockHeader, data_types::ConsensusRoundIdentifier},
};

/// The longest the algorithm thread waits on its queue before checking for the shutdown signal.
const MAX_WAIT: Duration = Duration::from_millis(100);

/// An input to the algorithm thread.
pub(crate) enum ConsensusEvent {
    /// A message received from the peer `origin`.
    Message {
        origin: VerifyingKey,
        message: IbftMessage,
    },
    /// The connection to a peer was lost.
    PeerDisconnected(VerifyingKey),
    /// The chain grew to `header`, possibly through blocks that were not decided by the local node.
    NewChainHead(BlockHeader),
}

/// A message waiting to be delivered to the controller.
enum Delivery {
    /// Created by the local node.
    Own(IbftMessage),
    /// Received from the peer `origin`.
    Peer {
        origin: VerifyingKey,
        message: IbftMessage,
    },
}

pub(crate) struct Algorithm<N: Network, C: Chain> {
    controller: IbftController<C>,
    filter: GossipFilter,
    fanout: PeerFanout<N>,
    worklist: VecDeque<Delivery>,
    flushed_round: ConsensusRoundIdentifier,
    event_publisher: Option<Sender<Event>>,
}

impl<N: Network, C: Chain> Algorithm<N, C> {
    pub(crate) fn new(
        controller: IbftController<C>,
        filter: GossipFilter,
        fanout: PeerFanout<N>,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        let flushed_round = controller.current_round();
        Self {
            controller,
            filter,
            fanout,
            worklist: VecDeque::new(),
            flushed_round,
            event_publisher,
        }
    }

    #[cfg(test)]
    pub(crate) fn controller(&self) -> &IbftController<C> {
        &self.controller
    }

    /// The instant at which [`process_timers`](Self::process_timers) next needs to be called.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.controller.next_deadline()
    }

    pub(crate) fn process(&mut self, event: ConsensusEvent) {
        match event {
            ConsensusEvent::Message { origin, message } => self.on_receive(origin, message),
            ConsensusEvent::PeerDisconnected(peer) => {
                let forgotten = self.filter.peer_disconnected(&peer);
                log::debug!("Peer disconnected, forgot {} buffered messages", forgotten);
            }
            ConsensusEvent::NewChainHead(header) => {
                self.controller.handle_new_chain_head(header);
            }
        }
        self.settle();
    }

    /// Fire the timers that expired at `now`.
    pub(crate) fn process_timers(&mut self, now: Instant) {
        self.controller.fire_expired_timers(now);
        self.settle();
    }

    fn on_receive(&mut self, origin: VerifyingKey, message: IbftMessage) {
        let (author, round, kind) = (*message.author(), message.round(), message.kind());
        match self
            .filter
            .evaluate(origin, message, self.controller.current_round())
        {
            FilterDecision::Deliver(message) => {
                self.worklist.push_back(Delivery::Peer { origin, message })
            }
            FilterDecision::Buffer => Event::BufferMessage(BufferMessageEvent {
                timestamp: SystemTime::now(),
                origin,
                author,
                round,
                kind,
            })
            .publish(&self.event_publisher),
            FilterDecision::Drop(reason) => Event::DropMessage(DropMessageEvent {
                timestamp: SystemTime::now(),
                origin,
                author,
                round,
                kind,
                reason,
            })
            .publish(&self.event_publisher),
        }
    }

    fn settle(&mut self) {
        loop {
            for message in self.controller.take_outbox() {
                self.filter.mark_seen(&message);
                self.fanout.send_own(&message);
                self.worklist.push_back(Delivery::Own(message));
            }

            let current = self.controller.current_round();
            if current != self.flushed_round {
                self.flushed_round = current;
                for (origin, message) in self.filter.flush(current) {
                    self.worklist.push_back(Delivery::Peer { origin, message });
                }
            }

            match self.worklist.pop_front() {
                Some(delivery) => self.deliver(delivery),
                None => break,
            }
        }
    }

    fn deliver(&mut self, delivery: Delivery) {
        let current = self.controller.current_round();
        match delivery {
            Delivery::Own(message) => {
                // The height was decided while the message waited.
                if message.round().height >= current.height {
                    self.dispatch(message);
                }
            }
            Delivery::Peer { origin, message } => {
                let (author, round, kind) = (*message.author(), message.round(), message.kind());
                if round.height < current.height {
                    Event::DropMessage(DropMessageEvent {
                        timestamp: SystemTime::now(),
                        origin,
                        author,
                        round,
                        kind,
                        reason: DropReason::PastHeight,
                    })
                    .publish(&self.event_publisher);
                    return;
                }

                self.publish_receive_event(origin, &message);
                if self.dispatch(message.clone()) == MessageVerdict::Rejected {
                    Event::DropMessage(DropMessageEvent {
                        timestamp: SystemTime::now(),
                        origin,
                        author,
                        round,
                        kind,
                        reason: DropReason::Rejected,
                    })
                    .publish(&self.event_publisher);
                    return;
                }

                let recipients = self.fanout.relay(&message, &origin);
                Event::RelayMessage(RelayMessageEvent {
                    timestamp: SystemTime::now(),
                    origin,
                    author,
                    round,
                    kind,
                    recipients,
                })
                .publish(&self.event_publisher);
            }
        }
    }

    fn dispatch(&mut self, message: IbftMessage) -> MessageVerdict {
        match message {
            IbftMessage::Proposal(proposal) => self.controller.handle_proposal(proposal),
            IbftMessage::Prepare(prepare) => self.controller.handle_prepare(prepare),
            IbftMessage::Commit(commit) => self.controller.handle_commit(commit),
            IbftMessage::RoundChange(round_change) => {
                self.controller.handle_round_change(round_change)
            }
            IbftMessage::NewRound(new_round) => self.controller.handle_new_round(new_round),
        }
    }

    fn publish_receive_event(&self, origin: VerifyingKey, message: &IbftMessage) {
        if self.event_publisher.is_none() {
            return;
        }
        let timestamp = SystemTime::now();
        let event = match message.clone() {
            IbftMessage::Proposal(proposal) => Event::ReceiveProposal(ReceiveProposalEvent {
                timestamp,
                origin,
                proposal,
            }),
            IbftMessage::Prepare(prepare) => Event::ReceivePrepare(ReceivePrepareEvent {
                timestamp,
                origin,
                prepare,
            }),
            IbftMessage::Commit(commit) => Event::ReceiveCommit(ReceiveCommitEvent {
                timestamp,
                origin,
                commit,
            }),
            IbftMessage::RoundChange(round_change) => {
                Event::ReceiveRoundChange(ReceiveRoundChangeEvent {
                    timestamp,
                    origin,
                    round_change,
                })
            }
            IbftMessage::NewRound(new_round) => Event::ReceiveNewRound(ReceiveNewRoundEvent {
                timestamp,
                origin,
                new_round,
            }),
        };
        event.publish(&self.event_publisher);
    }
}

/// Spawn the algorithm thread, which processes `event_queue` and fires timers until it receives the
/// shutdown signal.
pub(crate) fn start_algorithm<N: Network + 'static, C: Chain + 'static>(
    mut algorithm: Algorithm<N, C>,
    event_queue: Receiver<ConsensusEvent>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) => return,
            Err(TryRecvError::Empty) => (),
            Err(TryRecvError::Disconnected) => {
                panic!("Algorithm thread disconnected from main thread")
            }
        }

        algorithm.process_timers(Instant::now());

        let wait = match algorithm.next_deadline() {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()).min(MAX_WAIT),
            None => MAX_WAIT,
        };
        match event_queue.recv_timeout(wait) {
            Ok(event) => algorithm.process(event),
            Err(RecvTimeoutError::Timeout) => (),
            Err(RecvTimeoutError::Disconnected) => return,
        }
    })
}
