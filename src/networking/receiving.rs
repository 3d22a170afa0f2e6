/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions for receiving messages from the P2P network.

use std::{
    sync::mpsc::{Receiver, Sender, TryRecvError},
    thread::{self, JoinHandle},
};

use crate::algorithm::ConsensusEvent;

use super::network::Network;

/// Spawn the poller thread, which polls the [`Network`] for messages and disconnections and feeds them
/// into the algorithm thread's event queue.
///
/// The poller exits when it receives the shutdown signal, or when the algorithm thread has gone away.
pub(crate) fn start_polling<N: Network + 'static>(
    mut network: N,
    to_algorithm: Sender<ConsensusEvent>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) => return,
            Err(TryRecvError::Empty) => (),
            Err(TryRecvError::Disconnected) => {
                panic!("Poller thread disconnected from main thread")
            }
        }

        let event = if let Some((origin, message)) = network.recv() {
            ConsensusEvent::Message { origin, message }
        } else if let Some(peer) = network.recv_disconnection() {
            ConsensusEvent::PeerDisconnected(peer)
        } else {
            thread::yield_now();
            continue;
        };

        if to_algorithm.send(event).is_err() {
            return;
        }
    })
}
