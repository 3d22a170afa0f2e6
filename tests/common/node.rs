use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use ed25519_dalek::SigningKey;
use ibft_rs::{
    events::{
        CommitBlockEvent, NewRoundEvent, ReceiveProposalEvent, RoundChangeEvent, RoundTimeoutEvent,
        StartRoundEvent,
    },
    replica::{Configuration, Replica, ReplicaSpec},
    types::{block::SealedBlock, data_types::BufferSize, validator_set::ValidatorSet},
};

use super::{
    chain::MemChain,
    logging::{first_seven_base64_chars, log_with_context},
    network::NetworkStub,
};

/// Things the Nodes will have in common:
/// - Validator Set.
/// - Configuration.
///
/// Things that they will differ in:
/// - Chain instance.
/// - Network instance.
/// - Keypair.
pub(crate) struct Node {
    verifying_key: [u8; 32],
    chain: MemChain,
    round_timeouts: Arc<AtomicUsize>,
    new_rounds: Arc<AtomicUsize>,
    replica: Replica,
}

impl Node {
    pub(crate) fn new(keypair: SigningKey, network: NetworkStub, validator_set: ValidatorSet) -> Node {
        let verifying_key = keypair.verifying_key().to_bytes();
        let chain = MemChain::new();
        let round_timeouts = Arc::new(AtomicUsize::new(0));
        let new_rounds = Arc::new(AtomicUsize::new(0));

        let configuration = Configuration::builder()
            .me(keypair)
            .validator_set(validator_set)
            .block_period(Duration::from_secs(1))
            .round_timeout_base(Duration::from_secs(2))
            .round_timeout_multiplier(2.0)
            .max_round_timeout(Duration::from_secs(30))
            .future_msg_buffer_capacity(BufferSize::new(1024 * 1024))
            .per_author_buffer_limit(100)
            .log_events(false)
            .build();

        let replica = ReplicaSpec::builder()
            .chain(chain.clone())
            .network(network)
            .configuration(configuration)
            .on_start_round(start_round_handler(verifying_key))
            .on_receive_proposal(receive_proposal_handler(verifying_key))
            .on_round_change(round_change_handler(verifying_key))
            .on_round_timeout(round_timeout_handler(verifying_key, round_timeouts.clone()))
            .on_new_round(new_round_handler(verifying_key, new_rounds.clone()))
            .on_commit_block(commit_block_handler(verifying_key))
            .build()
            .start()
            .unwrap();

        Node {
            verifying_key,
            chain,
            round_timeouts,
            new_rounds,
            replica,
        }
    }

    /// The number of blocks this node's chain holds.
    pub(crate) fn height(&self) -> u64 {
        self.chain.height()
    }

    pub(crate) fn blocks(&self) -> Vec<SealedBlock> {
        self.chain.blocks()
    }

    pub(crate) fn round_timeouts(&self) -> usize {
        self.round_timeouts.load(Ordering::SeqCst)
    }

    /// The number of NewRound messages this node broadcast as a proposer.
    pub(crate) fn new_rounds(&self) -> usize {
        self.new_rounds.load(Ordering::SeqCst)
    }

    pub(crate) fn verifying_key(&self) -> [u8; 32] {
        self.verifying_key
    }
}

fn start_round_handler(verifying_key: [u8; 32]) -> impl Fn(&StartRoundEvent) + Send + 'static {
    move |start_round_event| {
        log_with_context(
            Some(verifying_key),
            &format!(
                "Started Round, round: {}, proposer: {}",
                start_round_event.round,
                first_seven_base64_chars(&start_round_event.proposer.to_bytes())
            ),
        );
    }
}

fn receive_proposal_handler(
    verifying_key: [u8; 32],
) -> impl Fn(&ReceiveProposalEvent) + Send + 'static {
    move |receive_proposal_event| {
        let payload = receive_proposal_event.proposal.payload();
        log_with_context(
            Some(verifying_key),
            &format!(
                "Received Proposal, origin: {}, round: {}, block hash: {}, block height: {}",
                first_seven_base64_chars(&receive_proposal_event.origin.to_bytes()),
                payload.round,
                first_seven_base64_chars(&payload.block.hash.bytes()),
                payload.block.height(),
            ),
        );
    }
}

fn round_change_handler(verifying_key: [u8; 32]) -> impl Fn(&RoundChangeEvent) + Send + 'static {
    move |round_change_event| {
        let payload = round_change_event.round_change.payload();
        log_with_context(
            Some(verifying_key),
            &format!(
                "Sent Round Change, round: {}, prepared: {}",
                payload.round,
                payload.prepared_certificate.is_some()
            ),
        );
    }
}

fn round_timeout_handler(
    verifying_key: [u8; 32],
    round_timeouts: Arc<AtomicUsize>,
) -> impl Fn(&RoundTimeoutEvent) + Send + 'static {
    move |round_timeout_event| {
        round_timeouts.fetch_add(1, Ordering::SeqCst);
        log_with_context(
            Some(verifying_key),
            &format!(
                "Round Timed Out, round: {}, after: {:?}",
                round_timeout_event.round, round_timeout_event.timeout
            ),
        );
    }
}

fn new_round_handler(
    verifying_key: [u8; 32],
    new_rounds: Arc<AtomicUsize>,
) -> impl Fn(&NewRoundEvent) + Send + 'static {
    move |new_round_event| {
        new_rounds.fetch_add(1, Ordering::SeqCst);
        log_with_context(
            Some(verifying_key),
            &format!(
                "Sent New Round, round: {}",
                new_round_event.new_round.payload().round
            ),
        );
    }
}

fn commit_block_handler(verifying_key: [u8; 32]) -> impl Fn(&CommitBlockEvent) + Send + 'static {
    move |commit_block_event: &CommitBlockEvent| {
        log_with_context(
            Some(verifying_key),
            &format!(
                "Committed Block, block hash: {}, height: {}",
                first_seven_base64_chars(&commit_block_event.block.bytes()),
                commit_block_event.height
            ),
        );
    }
}
