/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Dissemination of consensus messages between validators.
//!
//! Every message received from a peer passes through the [`GossipFilter`](filter::GossipFilter), which
//! drops messages from unknown signers, duplicates, and messages for decided heights, buffers
//! messages for future rounds, and lets messages for the current round through. Those are relayed by
//! [`PeerFanout`](fanout::PeerFanout) to the validators that cannot have them yet, i.e., everyone
//! except the peer that sent it, its author, and the local node.

pub(crate) mod buffer;

pub(crate) mod fanout;

pub mod filter;
