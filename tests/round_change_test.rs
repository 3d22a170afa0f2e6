use std::{thread, time::Duration};

use ed25519_dalek::SigningKey;
use ibft_rs::{
    replica::{Configuration, ReplicaError, ReplicaSpec},
    types::{data_types::BufferSize, validator_set::ValidatorSet},
};
use log::LevelFilter;
use rand_core::OsRng;

mod common;

use crate::common::{chain::MemChain, logging::setup_logger, network::mock_network, node::Node};

#[test]
fn round_change_test() {
    setup_logger(LevelFilter::Trace);

    // 1. Initialize test components.

    // 1.1. Create signing keys for 4 replicas, ordered like the validator set orders them.
    let mut csprg = OsRng {};
    let mut keypairs: Vec<SigningKey> = (0..4).map(|_| SigningKey::generate(&mut csprg)).collect();
    keypairs.sort_by_key(|kp| kp.verifying_key().to_bytes());

    // 1.2. Create a mock network connecting the 4 replicas.
    let mut network_stubs = mock_network(keypairs.iter().map(|kp| kp.verifying_key()));

    let validator_set: ValidatorSet = keypairs.iter().map(|kp| kp.verifying_key()).collect();

    // 1.3. Keep the proposer of round 0 at height 1 offline. Messages sent to it are lost.
    let offline = keypairs.remove(1);
    network_stubs.remove(1);
    log::debug!(
        "Replica {:?} stays offline.",
        &offline.verifying_key().to_bytes()[..4]
    );

    // 1.4. Start the other 3 replicas, which form a quorum.
    let nodes: Vec<Node> = keypairs
        .into_iter()
        .zip(network_stubs)
        .map(|(keypair, network)| Node::new(keypair, network, validator_set.clone()))
        .collect();

    // 2. Poll the chain of every online replica until each holds 2 blocks. The first block can only be
    // decided after a round change.
    log::debug!("Polling the chain of every online replica until each holds 2 blocks.");
    while nodes.iter().any(|node| node.height() < 2) {
        thread::sleep(Duration::from_millis(500));
    }

    // 3. Check that round 0 of height 1 timed out everywhere, and that the proposer of round 1 justified
    // its proposal with a NewRound message.
    assert!(nodes.iter().all(|node| node.round_timeouts() >= 1));
    assert!(nodes.iter().map(|node| node.new_rounds()).sum::<usize>() >= 1);

    let first_blocks: Vec<_> = nodes.iter().map(|node| node.blocks()[0].clone()).collect();
    for sealed_block in &first_blocks {
        assert!(sealed_block.round.int() >= 1);
        assert!(sealed_block.seals_are_correct());
        assert!(sealed_block
            .commit_seals
            .iter()
            .all(|(signer, _)| *signer != offline.verifying_key()));
        assert_eq!(sealed_block.block.hash, first_blocks[0].block.hash);
    }
    for node in &nodes {
        log::debug!(
            "Replica {:?} decided {} blocks after {} round timeouts.",
            &node.verifying_key()[..4],
            node.height(),
            node.round_timeouts()
        );
    }
}

#[test]
fn empty_validator_set_test() {
    setup_logger(LevelFilter::Trace);

    let mut csprg = OsRng {};
    let keypair = SigningKey::generate(&mut csprg);
    let network = mock_network([keypair.verifying_key()].into_iter()).remove(0);

    let configuration = Configuration::builder()
        .me(keypair)
        .validator_set(ValidatorSet::new())
        .block_period(Duration::from_secs(1))
        .round_timeout_base(Duration::from_secs(2))
        .round_timeout_multiplier(2.0)
        .max_round_timeout(Duration::from_secs(30))
        .future_msg_buffer_capacity(BufferSize::new(1024))
        .per_author_buffer_limit(10)
        .log_events(false)
        .build();

    let result = ReplicaSpec::builder()
        .chain(MemChain::new())
        .network(network)
        .configuration(configuration)
        .build()
        .start();

    assert!(matches!(result, Err(ReplicaError::EmptyValidatorSet)));
}

#[test]
fn invalid_round_timeout_multiplier_test() {
    setup_logger(LevelFilter::Trace);

    let mut csprg = OsRng {};
    let keypair = SigningKey::generate(&mut csprg);
    let network = mock_network([keypair.verifying_key()].into_iter()).remove(0);
    let validator_set: ValidatorSet = [keypair.verifying_key()].into_iter().collect();

    for multiplier in [-2.0, 0.5, f64::NAN] {
        let configuration = Configuration::builder()
            .me(keypair.clone())
            .validator_set(validator_set.clone())
            .block_period(Duration::from_secs(1))
            .round_timeout_base(Duration::from_secs(2))
            .round_timeout_multiplier(multiplier)
            .max_round_timeout(Duration::from_secs(30))
            .future_msg_buffer_capacity(BufferSize::new(1024))
            .per_author_buffer_limit(10)
            .log_events(false)
            .build();

        let result = ReplicaSpec::builder()
            .chain(MemChain::new())
            .network(network.clone())
            .configuration(configuration)
            .build()
            .start();

        assert!(matches!(
            result,
            Err(ReplicaError::InvalidRoundTimeoutMultiplier)
        ));
    }
}
