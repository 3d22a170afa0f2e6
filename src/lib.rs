//! A Rust implementation of the Istanbul BFT (IBFT) consensus round engine, with consensus message
//! gossip.
//!
//! A fixed set of validators agree, one height at a time, on the next block of a chain. Up to
//! `f = floor((n - 1) / 3)` of the `n` validators may be faulty. Honest validators never decide
//! different blocks at the same height, and keep deciding blocks as long as messages eventually arrive.
//!
//! ## Using IBFT-rs
//!
//! Users provide a [`Chain`](chain::Chain) implementation, which produces, validates, and stores blocks,
//! and a [`Network`](networking::network::Network) implementation, which moves messages between
//! validators. The [replica](replica) module then starts the threads that run consensus:
//! 1. The poller thread, which drains the network.
//! 2. The [algorithm](algorithm) thread, which owns all consensus state: the
//!    [controller](ibft::implementation::IbftController), the [gossip filter](gossip::filter), and the
//!    round timers.
//! 3. The event bus thread, which runs user-registered [event](events) handlers and the default
//!    [loggers](logging).
//!
//! ## Code organization
//!
//! - [`types`]: data types shared by every component.
//! - [`ibft`]: the round engine.
//! - [`gossip`]: deciding whether to deliver, relay, buffer, or drop each received message.
//! - [`networking`] and [`chain`]: the pluggable interfaces.
//! - [`round_timer`]: round timeouts.

pub mod types;

pub mod ibft;

pub mod gossip;

pub mod networking;

pub mod chain;

pub mod round_timer;

pub mod events;

pub(crate) mod event_bus;

pub mod logging;

pub(crate) mod algorithm;

pub mod replica;
