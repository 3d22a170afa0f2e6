/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The event bus thread, which runs the handlers registered for each kind of [`Event`].

use std::{
    sync::mpsc::{Receiver, TryRecvError},
    thread::{self, JoinHandle},
};

use crate::{events::*, logging::Logger};

pub(crate) type HandlerPtr<T> = Box<dyn Fn(&T) + Send>;

/// Stores the handlers registered for each kind of event, including the default logging handlers if
/// logging is enabled.
pub(crate) struct EventHandlers {
    pub(crate) propose_handlers: Vec<HandlerPtr<ProposeEvent>>,
    pub(crate) prepare_handlers: Vec<HandlerPtr<PrepareEvent>>,
    pub(crate) commit_handlers: Vec<HandlerPtr<CommitEvent>>,
    pub(crate) round_change_handlers: Vec<HandlerPtr<RoundChangeEvent>>,
    pub(crate) new_round_handlers: Vec<HandlerPtr<NewRoundEvent>>,

    pub(crate) receive_proposal_handlers: Vec<HandlerPtr<ReceiveProposalEvent>>,
    pub(crate) receive_prepare_handlers: Vec<HandlerPtr<ReceivePrepareEvent>>,
    pub(crate) receive_commit_handlers: Vec<HandlerPtr<ReceiveCommitEvent>>,
    pub(crate) receive_round_change_handlers: Vec<HandlerPtr<ReceiveRoundChangeEvent>>,
    pub(crate) receive_new_round_handlers: Vec<HandlerPtr<ReceiveNewRoundEvent>>,

    pub(crate) start_round_handlers: Vec<HandlerPtr<StartRoundEvent>>,
    pub(crate) round_timeout_handlers: Vec<HandlerPtr<RoundTimeoutEvent>>,
    pub(crate) collect_prepared_certificate_handlers:
        Vec<HandlerPtr<CollectPreparedCertificateEvent>>,
    pub(crate) collect_round_change_certificate_handlers:
        Vec<HandlerPtr<CollectRoundChangeCertificateEvent>>,
    pub(crate) commit_block_handlers: Vec<HandlerPtr<CommitBlockEvent>>,

    pub(crate) relay_message_handlers: Vec<HandlerPtr<RelayMessageEvent>>,
    pub(crate) buffer_message_handlers: Vec<HandlerPtr<BufferMessageEvent>>,
    pub(crate) drop_message_handlers: Vec<HandlerPtr<DropMessageEvent>>,
}

// Start a handler list with the user's handler, followed by the default logger if logging is enabled.
fn handlers<T: Logger>(log_events: bool, user_handler: Option<HandlerPtr<T>>) -> Vec<HandlerPtr<T>> {
    let mut handlers = Vec::new();
    if let Some(handler) = user_handler {
        handlers.push(handler)
    }
    if log_events {
        handlers.push(T::get_logger())
    }
    handlers
}

impl EventHandlers {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        log_events: bool,
        propose_handler: Option<HandlerPtr<ProposeEvent>>,
        prepare_handler: Option<HandlerPtr<PrepareEvent>>,
        commit_handler: Option<HandlerPtr<CommitEvent>>,
        round_change_handler: Option<HandlerPtr<RoundChangeEvent>>,
        new_round_handler: Option<HandlerPtr<NewRoundEvent>>,
        receive_proposal_handler: Option<HandlerPtr<ReceiveProposalEvent>>,
        receive_prepare_handler: Option<HandlerPtr<ReceivePrepareEvent>>,
        receive_commit_handler: Option<HandlerPtr<ReceiveCommitEvent>>,
        receive_round_change_handler: Option<HandlerPtr<ReceiveRoundChangeEvent>>,
        receive_new_round_handler: Option<HandlerPtr<ReceiveNewRoundEvent>>,
        start_round_handler: Option<HandlerPtr<StartRoundEvent>>,
        round_timeout_handler: Option<HandlerPtr<RoundTimeoutEvent>>,
        collect_prepared_certificate_handler: Option<HandlerPtr<CollectPreparedCertificateEvent>>,
        collect_round_change_certificate_handler: Option<
            HandlerPtr<CollectRoundChangeCertificateEvent>,
        >,
        commit_block_handler: Option<HandlerPtr<CommitBlockEvent>>,
        relay_message_handler: Option<HandlerPtr<RelayMessageEvent>>,
        buffer_message_handler: Option<HandlerPtr<BufferMessageEvent>>,
        drop_message_handler: Option<HandlerPtr<DropMessageEvent>>,
    ) -> EventHandlers {
        EventHandlers {
            propose_handlers: handlers(log_events, propose_handler),
            prepare_handlers: handlers(log_events, prepare_handler),
            commit_handlers: handlers(log_events, commit_handler),
            round_change_handlers: handlers(log_events, round_change_handler),
            new_round_handlers: handlers(log_events, new_round_handler),
            receive_proposal_handlers: handlers(log_events, receive_proposal_handler),
            receive_prepare_handlers: handlers(log_events, receive_prepare_handler),
            receive_commit_handlers: handlers(log_events, receive_commit_handler),
            receive_round_change_handlers: handlers(log_events, receive_round_change_handler),
            receive_new_round_handlers: handlers(log_events, receive_new_round_handler),
            start_round_handlers: handlers(log_events, start_round_handler),
            round_timeout_handlers: handlers(log_events, round_timeout_handler),
            collect_prepared_certificate_handlers: handlers(
                log_events,
                collect_prepared_certificate_handler,
            ),
            collect_round_change_certificate_handlers: handlers(
                log_events,
                collect_round_change_certificate_handler,
            ),
            commit_block_handlers: handlers(log_events, commit_block_handler),
            relay_message_handlers: handlers(log_events, relay_message_handler),
            buffer_message_handlers: handlers(log_events, buffer_message_handler),
            drop_message_handlers: handlers(log_events, drop_message_handler),
        }
    }

    /// Check whether no handler is registered for any event, in which case events need not be
    /// published at all.
    pub(crate) fn is_empty(&self) -> bool {
        self.propose_handlers.is_empty()
            && self.prepare_handlers.is_empty()
            && self.commit_handlers.is_empty()
            && self.round_change_handlers.is_empty()
            && self.new_round_handlers.is_empty()
            && self.receive_proposal_handlers.is_empty()
            && self.receive_prepare_handlers.is_empty()
            && self.receive_commit_handlers.is_empty()
            && self.receive_round_change_handlers.is_empty()
            && self.receive_new_round_handlers.is_empty()
            && self.start_round_handlers.is_empty()
            && self.round_timeout_handlers.is_empty()
            && self.collect_prepared_certificate_handlers.is_empty()
            && self.collect_round_change_certificate_handlers.is_empty()
            && self.commit_block_handlers.is_empty()
            && self.relay_message_handlers.is_empty()
            && self.buffer_message_handlers.is_empty()
            && self.drop_message_handlers.is_empty()
    }

    pub(crate) fn fire_handlers(&self, event: Event) {
        match event {
            Event::Propose(propose_event) => {
                fire(&self.propose_handlers, &propose_event)
            }
            Event::Prepare(prepare_event) => {
                fire(&self.prepare_handlers, &prepare_event)
            }
            Event::Commit(commit_event) => fire(&self.commit_handlers, &commit_event),
            Event::RoundChange(round_change_event) => {
                fire(&self.round_change_handlers, &round_change_event)
            }
            Event::NewRound(new_round_event) => {
                fire(&self.new_round_handlers, &new_round_event)
            }

            Event::ReceiveProposal(receive_proposal_event) => {
                fire(&self.receive_proposal_handlers, &receive_proposal_event)
            }
            Event::ReceivePrepare(receive_prepare_event) => {
                fire(&self.receive_prepare_handlers, &receive_prepare_event)
            }
            Event::ReceiveCommit(receive_commit_event) => {
                fire(&self.receive_commit_handlers, &receive_commit_event)
            }
            Event::ReceiveRoundChange(receive_round_change_event) => fire(
                &self.receive_round_change_handlers,
                &receive_round_change_event,
            ),
            Event::ReceiveNewRound(receive_new_round_event) => {
                fire(&self.receive_new_round_handlers, &receive_new_round_event)
            }

            Event::StartRound(start_round_event) => {
                fire(&self.start_round_handlers, &start_round_event)
            }
            Event::RoundTimeout(round_timeout_event) => {
                fire(&self.round_timeout_handlers, &round_timeout_event)
            }
            Event::CollectPreparedCertificate(collect_pc_event) => {
                fire(&self.collect_prepared_certificate_handlers, &collect_pc_event)
            }
            Event::CollectRoundChangeCertificate(collect_rcc_event) => fire(
                &self.collect_round_change_certificate_handlers,
                &collect_rcc_event,
            ),
            Event::CommitBlock(commit_block_event) => {
                fire(&self.commit_block_handlers, &commit_block_event)
            }

            Event::RelayMessage(relay_message_event) => {
                fire(&self.relay_message_handlers, &relay_message_event)
            }
            Event::BufferMessage(buffer_message_event) => {
                fire(&self.buffer_message_handlers, &buffer_message_event)
            }
            Event::DropMessage(drop_message_event) => {
                fire(&self.drop_message_handlers, &drop_message_event)
            }
        }
    }
}

fn fire<T>(handlers: &[HandlerPtr<T>], event: &T) {
    handlers.iter().for_each(|handler| handler(event))
}

/// Spawn the event bus thread, which fires the handlers for every event received from the algorithm
/// thread until it receives the shutdown signal.
pub(crate) fn start_event_bus(
    event_handlers: EventHandlers,
    event_subscriber: Receiver<Event>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) => return,
            Err(TryRecvError::Empty) => (),
            Err(TryRecvError::Disconnected) => {
                panic!("Event bus thread disconnected from main thread")
            }
        }

        match event_subscriber.try_recv() {
            Ok(event) => event_handlers.fire_handlers(event),
            Err(TryRecvError::Empty) => thread::yield_now(),
            // The algorithm thread exited. Wait for the shutdown signal.
            Err(TryRecvError::Disconnected) => thread::yield_now(),
        }
    })
}
