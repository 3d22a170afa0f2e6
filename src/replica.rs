/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Methods to build and run a replica.
//!
//! IBFT-rs works to decide a single chain of blocks in multiple processes. In our terminology, these
//! processes are called 'replicas'. The replicas that take part in deciding blocks are called
//! 'validators', and each of them is uniquely identified by an
//! [Ed25519 verifying key](ed25519_dalek::VerifyingKey).
//!
//! The key components of this module are:
//! - The builder-pattern interface to construct a [specification of the replica](ReplicaSpec) with:
//!   1. `ReplicaSpec::builder` to construct a `ReplicaSpecBuilder`,
//!   2. The setters of the `ReplicaSpecBuilder`, and
//!   3. The `ReplicaSpecBuilder::build` method to construct a [`ReplicaSpec`],
//! - The function to [start](ReplicaSpec::start) a [`Replica`] given its specification,
//! - [The type](Replica) which keeps the replica alive, and
//! - [The handle](ChainEventHandle) through which the host announces chain growth to the replica.
//!
//! ## Starting a replica
//!
//! Here is an example that demonstrates how to build and start running a replica using the builder
//! pattern:
//!
//! ```ignore
//! let replica =
//!     ReplicaSpec::builder()
//!     .chain(chain)
//!     .network(network)
//!     .configuration(configuration)
//!     .on_commit_block(commit_block_handler)
//!     .on_round_timeout(round_timeout_handler)
//!     .build()
//!     .start()?;
//! ```
//!
//! ### Required setters
//!
//! The required setters are for providing the trait implementations required to run a replica:
//! - `.chain(...)`
//! - `.network(...)`
//! - `.configuration(...)`
//!
//! ### Optional setters
//!
//! The optional setters are for registering user-defined event handlers for events from
//! [`crate::events`]:
//! - `.on_propose(...)`
//! - `.on_prepare(...)`
//! - `.on_commit(...)`
//! - `.on_round_change(...)`
//! - `.on_new_round(...)`
//! - `.on_receive_proposal(...)`
//! - `.on_receive_prepare(...)`
//! - `.on_receive_commit(...)`
//! - `.on_receive_round_change(...)`
//! - `.on_receive_new_round(...)`
//! - `.on_start_round(...)`
//! - `.on_round_timeout(...)`
//! - `.on_collect_prepared_certificate(...)`
//! - `.on_collect_round_change_certificate(...)`
//! - `.on_commit_block(...)`
//! - `.on_relay_message(...)`
//! - `.on_buffer_message(...)`
//! - `.on_drop_message(...)`
//!
//! The replica's [configuration](Configuration) can also be defined using the builder pattern, for
//! example:
//!
//! ```ignore
//! let configuration =
//!     Configuration::builder()
//!     .me(signing_key)
//!     .validator_set(validator_set)
//!     .block_period(Duration::from_secs(2))
//!     .round_timeout_base(Duration::from_secs(1))
//!     .round_timeout_multiplier(2.0)
//!     .max_round_timeout(Duration::from_secs(60))
//!     .future_msg_buffer_capacity(BufferSize::new(1024 * 1024))
//!     .per_author_buffer_limit(256)
//!     .log_events(true)
//!     .build()
//! ```

use std::{
    fmt::{self, Display, Formatter},
    sync::{
        mpsc::{self, Sender},
        Arc,
    },
    thread::JoinHandle,
    time::Duration,
};

use ed25519_dalek::SigningKey;
use typed_builder::TypedBuilder;

use crate::{
    algorithm::{start_algorithm, Algorithm, ConsensusEvent},
    chain::Chain,
    event_bus::*,
    events::*,
    gossip::{fanout::PeerFanout, filter::GossipFilter},
    ibft::implementation::{IbftConfiguration, IbftController},
    networking::{network::Network, receiving::start_polling, sending::SenderHandle},
    round_timer::RoundTimeouts,
    types::{
        block::BlockHeader, crypto_primitives::Keypair, data_types::BufferSize,
        validator_set::ValidatorSet,
    },
};

/// Stores the user-defined parameters required to start the replica, that is:
/// 1. The replica's [signing key](ed25519_dalek::SigningKey).
/// 2. The validator set, which stays the same for the lifetime of the replica.
/// 3. The block period, the minimum time between the timestamps of consecutive blocks. The proposer
///    of round 0 waits until the block period since the chain head's timestamp has elapsed before it
///    proposes.
/// 4. The round timeouts: round `r` lasts `round_timeout_base * round_timeout_multiplier^r`, but never
///    more than `max_round_timeout`. The multiplier must be at least 1.0.
/// 5. The future message buffer capacity, the maximum number of bytes that messages for future rounds
///    may occupy. If this capacity is about to be exceeded, messages for the highest rounds are removed
///    to make space for messages for lower rounds.
/// 6. The per-author buffer limit, the maximum number of messages of any single validator that the
///    future message buffer holds.
/// 7. The "Log Events" flag, if set to "true" then logs should be printed.
///
/// ## Log Events
///
/// IBFT-rs logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
/// printed onto a terminal or to a file, set up a [logging
/// implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [Configuration]. On the builder call the following methods to construct a valid [Configuration].

    Required:
    - `.me(...)`
    - `.validator_set(...)`
    - `.block_period(...)`
    - `.round_timeout_base(...)`
    - `.round_timeout_multiplier(...)`
    - `.max_round_timeout(...)`
    - `.future_msg_buffer_capacity(...)`
    - `.per_author_buffer_limit(...)`
    - `.log_events(...)`
"))]
pub struct Configuration {
    #[builder(setter(doc = "Set the replica's signing key, used to sign messages and commit seals. Required."))]
    pub me: SigningKey,
    #[builder(setter(doc = "Set the validator set. It must not be empty. Required."))]
    pub validator_set: ValidatorSet,
    #[builder(setter(doc = "Set the minimum time between the timestamps of consecutive blocks. Required."))]
    pub block_period: Duration,
    #[builder(setter(doc = "Set the duration of round 0. Required."))]
    pub round_timeout_base: Duration,
    #[builder(setter(doc = "Set the factor by which the duration of each round exceeds the duration of the previous one. Required."))]
    pub round_timeout_multiplier: f64,
    #[builder(setter(doc = "Set the maximum duration of any round. Required."))]
    pub max_round_timeout: Duration,
    #[builder(setter(doc = "Set the maximum number of bytes that can be stored in the replica's future message buffer at any given moment. Required."))]
    pub future_msg_buffer_capacity: BufferSize,
    #[builder(setter(doc = "Set the maximum number of messages of a single validator that the future message buffer holds. Required."))]
    pub per_author_buffer_limit: usize,
    #[builder(setter(doc = "Enable logging? Required."))]
    pub log_events: bool,
}

impl From<&Configuration> for IbftConfiguration {
    fn from(configuration: &Configuration) -> Self {
        IbftConfiguration {
            keypair: Keypair::new(configuration.me.clone()),
            block_period: configuration.block_period,
            round_timeouts: RoundTimeouts {
                base: configuration.round_timeout_base,
                multiplier: configuration.round_timeout_multiplier,
                cap: configuration.max_round_timeout,
            },
        }
    }
}

/// Stores all necessary parameters and trait implementations required to run the [`Replica`].
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [ReplicaSpec]. On the builder call the following methods to construct a valid [ReplicaSpec].

    Required:
    - `.chain(...)`
    - `.network(...)`
    - `.configuration(...)`

    Optional:
    - `.on_propose(...)`
    - `.on_prepare(...)`
    - `.on_commit(...)`
    - `.on_round_change(...)`
    - `.on_new_round(...)`
    - `.on_receive_proposal(...)`
    - `.on_receive_prepare(...)`
    - `.on_receive_commit(...)`
    - `.on_receive_round_change(...)`
    - `.on_receive_new_round(...)`
    - `.on_start_round(...)`
    - `.on_round_timeout(...)`
    - `.on_collect_prepared_certificate(...)`
    - `.on_collect_round_change_certificate(...)`
    - `.on_commit_block(...)`
    - `.on_relay_message(...)`
    - `.on_buffer_message(...)`
    - `.on_drop_message(...)`
"))]
pub struct ReplicaSpec<C: Chain + 'static, N: Network + 'static> {
    // Required parameters
    #[builder(setter(doc = "Set the chain that blocks are decided for. The argument must implement the [Chain](crate::chain::Chain) trait. Required."))]
    chain: C,
    #[builder(setter(doc = "Set the implementation of peer-to-peer networking. The argument must implement the [Network](crate::networking::network::Network) trait. Required."))]
    network: N,
    #[builder(setter(doc = "Set the [configuration](Configuration), which contains the necessary parameters to run a replica. Required."))]
    configuration: Configuration,
    // Optional parameters
    #[builder(default, setter(transform = |handler: impl Fn(&ProposeEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ProposeEvent>),
    doc = "Register a handler closure to be invoked after the replica broadcasts a proposal for a block. Optional."))]
    on_propose: Option<HandlerPtr<ProposeEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&PrepareEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<PrepareEvent>),
    doc = "Register a handler closure to be invoked after the replica broadcasts a prepare. Optional."))]
    on_prepare: Option<HandlerPtr<PrepareEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&CommitEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CommitEvent>),
    doc = "Register a handler closure to be invoked after the replica broadcasts a commit. Optional."))]
    on_commit: Option<HandlerPtr<CommitEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&RoundChangeEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<RoundChangeEvent>),
    doc = "Register a handler closure to be invoked after the replica broadcasts a round change. Optional."))]
    on_round_change: Option<HandlerPtr<RoundChangeEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&NewRoundEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<NewRoundEvent>),
    doc = "Register a handler closure to be invoked after the replica, as the proposer of a round, broadcasts a new round message. Optional."))]
    on_new_round: Option<HandlerPtr<NewRoundEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveProposalEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveProposalEvent>),
    doc = "Register a handler closure to be invoked after the replica receives a proposal for a block. Optional."))]
    on_receive_proposal: Option<HandlerPtr<ReceiveProposalEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceivePrepareEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceivePrepareEvent>),
    doc = "Register a handler closure to be invoked after the replica receives a prepare. Optional."))]
    on_receive_prepare: Option<HandlerPtr<ReceivePrepareEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveCommitEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveCommitEvent>),
    doc = "Register a handler closure to be invoked after the replica receives a commit. Optional."))]
    on_receive_commit: Option<HandlerPtr<ReceiveCommitEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveRoundChangeEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveRoundChangeEvent>),
    doc = "Register a handler closure to be invoked after the replica receives a round change. Optional."))]
    on_receive_round_change: Option<HandlerPtr<ReceiveRoundChangeEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveNewRoundEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveNewRoundEvent>),
    doc = "Register a handler closure to be invoked after the replica receives a new round message. Optional."))]
    on_receive_new_round: Option<HandlerPtr<ReceiveNewRoundEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&StartRoundEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<StartRoundEvent>),
    doc = "Register a handler closure to be invoked after the replica enters a new round. Optional."))]
    on_start_round: Option<HandlerPtr<StartRoundEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&RoundTimeoutEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<RoundTimeoutEvent>),
    doc = "Register a handler closure to be invoked after the replica's round times out. Optional."))]
    on_round_timeout: Option<HandlerPtr<RoundTimeoutEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&CollectPreparedCertificateEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CollectPreparedCertificateEvent>),
    doc = "Register a handler closure to be invoked after the replica collects a prepared certificate. Optional."))]
    on_collect_prepared_certificate: Option<HandlerPtr<CollectPreparedCertificateEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&CollectRoundChangeCertificateEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CollectRoundChangeCertificateEvent>),
    doc = "Register a handler closure to be invoked after the replica, as the proposer of a round, collects a round change certificate. Optional."))]
    on_collect_round_change_certificate: Option<HandlerPtr<CollectRoundChangeCertificateEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&CommitBlockEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CommitBlockEvent>),
    doc = "Register a handler closure to be invoked after a block is decided and appended to the chain. Optional."))]
    on_commit_block: Option<HandlerPtr<CommitBlockEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&RelayMessageEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<RelayMessageEvent>),
    doc = "Register a handler closure to be invoked after the replica relays a message to its peers. Optional."))]
    on_relay_message: Option<HandlerPtr<RelayMessageEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&BufferMessageEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<BufferMessageEvent>),
    doc = "Register a handler closure to be invoked after the replica buffers a message for a future round. Optional."))]
    on_buffer_message: Option<HandlerPtr<BufferMessageEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&DropMessageEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<DropMessageEvent>),
    doc = "Register a handler closure to be invoked after the replica drops a message. Optional."))]
    on_drop_message: Option<HandlerPtr<DropMessageEvent>>,
}

impl<C: Chain + 'static, N: Network + 'static> ReplicaSpec<C, N> {
    /// Starts all threads and channels associated with running a replica, and returns the handles to
    /// them in a [`Replica`] struct.
    pub fn start(mut self) -> Result<Replica, ReplicaError> {
        if self.configuration.validator_set.is_empty() {
            return Err(ReplicaError::EmptyValidatorSet);
        }
        let multiplier = self.configuration.round_timeout_multiplier;
        if multiplier.is_nan() || multiplier < 1.0 {
            return Err(ReplicaError::InvalidRoundTimeoutMultiplier);
        }
        let me = self.configuration.me.verifying_key();
        if !self.configuration.validator_set.contains(&me) {
            log::warn!("Starting a replica whose signing key is not in the validator set");
        }

        let validator_set = Arc::new(self.configuration.validator_set.clone());
        self.network
            .init_validator_set(self.configuration.validator_set.clone());

        let event_handlers = EventHandlers::new(
            self.configuration.log_events,
            self.on_propose,
            self.on_prepare,
            self.on_commit,
            self.on_round_change,
            self.on_new_round,
            self.on_receive_proposal,
            self.on_receive_prepare,
            self.on_receive_commit,
            self.on_receive_round_change,
            self.on_receive_new_round,
            self.on_start_round,
            self.on_round_timeout,
            self.on_collect_prepared_certificate,
            self.on_collect_round_change_certificate,
            self.on_commit_block,
            self.on_relay_message,
            self.on_buffer_message,
            self.on_drop_message,
        );

        let (event_publisher, event_subscriber) = if !event_handlers.is_empty() {
            Some(mpsc::channel()).unzip()
        } else {
            (None, None)
        };

        let (event_queue_sender, event_queue) = mpsc::channel();

        let (poller_shutdown, poller_shutdown_receiver) = mpsc::channel();
        let poller = start_polling(
            self.network.clone(),
            event_queue_sender.clone(),
            poller_shutdown_receiver,
        );

        let controller = IbftController::new(
            IbftConfiguration::from(&self.configuration),
            validator_set.clone(),
            self.chain,
            event_publisher.clone(),
        );
        let filter = GossipFilter::new(
            validator_set.clone(),
            self.configuration.future_msg_buffer_capacity,
            self.configuration.per_author_buffer_limit,
        );
        let fanout = PeerFanout::new(SenderHandle::new(self.network), validator_set, me);
        let algorithm = Algorithm::new(controller, filter, fanout, event_publisher);

        let (algorithm_shutdown, algorithm_shutdown_receiver) = mpsc::channel();
        let algorithm = start_algorithm(algorithm, event_queue, algorithm_shutdown_receiver);

        let (event_bus_shutdown, event_bus) = match event_subscriber {
            Some(event_subscriber) => {
                let (event_bus_shutdown, event_bus_shutdown_receiver) = mpsc::channel();
                let event_bus = start_event_bus(
                    event_handlers,
                    event_subscriber,
                    event_bus_shutdown_receiver,
                );
                (Some(event_bus_shutdown), Some(event_bus))
            }
            None => (None, None),
        };

        Ok(Replica {
            chain_events: event_queue_sender,
            poller: Some(poller),
            poller_shutdown,
            algorithm: Some(algorithm),
            algorithm_shutdown,
            event_bus,
            event_bus_shutdown,
        })
    }
}

/// Why a replica could not be started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicaError {
    /// The configured validator set has no members, so no proposer can be selected.
    EmptyValidatorSet,
    /// Round timeouts must not shrink from one round to the next.
    InvalidRoundTimeoutMultiplier,
}

impl Display for ReplicaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ReplicaError::EmptyValidatorSet => write!(f, "The validator set cannot be empty"),
            ReplicaError::InvalidRoundTimeoutMultiplier => {
                write!(f, "The round timeout multiplier must be at least 1.0")
            }
        }
    }
}

impl std::error::Error for ReplicaError {}

/// A handle to the background threads of an IBFT-rs replica. When this value is dropped, all
/// background threads are gracefully shut down.
pub struct Replica {
    chain_events: Sender<ConsensusEvent>,
    poller: Option<JoinHandle<()>>,
    poller_shutdown: Sender<()>,
    algorithm: Option<JoinHandle<()>>,
    algorithm_shutdown: Sender<()>,
    event_bus: Option<JoinHandle<()>>,
    event_bus_shutdown: Option<Sender<()>>,
}

impl Replica {
    /// Get a handle through which the host can tell the replica that the chain grew.
    pub fn chain_event_handle(&self) -> ChainEventHandle {
        ChainEventHandle {
            sender: self.chain_events.clone(),
        }
    }
}

impl Drop for Replica {
    fn drop(&mut self) {
        // The order of thread shutdown matters. The algorithm thread receives events from the poller,
        // and publishes events to the event bus.

        self.poller_shutdown.send(()).unwrap();
        self.poller.take().unwrap().join().unwrap();

        self.algorithm_shutdown.send(()).unwrap();
        self.algorithm.take().unwrap().join().unwrap();

        self.event_bus_shutdown
            .iter()
            .for_each(|shutdown| shutdown.send(()).unwrap());
        if let Some(event_bus) = self.event_bus.take() {
            event_bus.join().unwrap();
        }
    }
}

/// Announces chain growth to a running replica.
///
/// The replica itself learns of the blocks it decides. Blocks decided without it, e.g., synced from
/// peers by the host while the replica lagged behind, must be announced through this handle, so that the
/// replica moves to the next height and releases buffered messages for it.
#[derive(Clone)]
pub struct ChainEventHandle {
    sender: Sender<ConsensusEvent>,
}

impl ChainEventHandle {
    /// Tell the replica that `header` is the new chain head. Heads below the height the replica is
    /// deciding are ignored.
    pub fn new_chain_head(&self, header: BlockHeader) {
        // The replica shut down.
        let _ = self.sender.send(ConsensusEvent::NewChainHead(header));
    }
}
