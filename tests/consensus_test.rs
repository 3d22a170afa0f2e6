use std::{thread, time::Duration};

use ed25519_dalek::SigningKey;
use ibft_rs::types::validator_set::ValidatorSet;
use log::LevelFilter;
use rand_core::OsRng;

mod common;

use crate::common::{logging::setup_logger, network::mock_network, node::Node};

#[test]
fn consensus_test() {
    setup_logger(LevelFilter::Trace);

    // 1. Initialize test components.

    // 1.1. Create signing keys for 4 replicas, which tolerate 1 faulty replica.
    let mut csprg = OsRng {};
    let keypairs: Vec<SigningKey> = (0..4).map(|_| SigningKey::generate(&mut csprg)).collect();

    // 1.2. Create a mock network connecting the 4 replicas.
    let network_stubs = mock_network(keypairs.iter().map(|kp| kp.verifying_key()));

    // 1.3. Every replica is a validator.
    let validator_set: ValidatorSet = keypairs.iter().map(|kp| kp.verifying_key()).collect();

    // 1.4. Simultaneously start all replicas.
    let nodes: Vec<Node> = keypairs
        .into_iter()
        .zip(network_stubs)
        .map(|(keypair, network)| Node::new(keypair, network, validator_set.clone()))
        .collect();

    // 2. Poll the chain of every replica until each holds 3 blocks.
    log::debug!("Polling the chain of every replica until each holds 3 blocks.");
    while nodes.iter().any(|node| node.height() < 3) {
        thread::sleep(Duration::from_millis(500));
    }

    // 3. Check that the replicas decided the same blocks, and that every block is sealed by a quorum.
    let reference: Vec<_> = nodes[0].blocks().into_iter().take(3).collect();
    for node in &nodes[1..] {
        let blocks: Vec<_> = node.blocks().into_iter().take(3).collect();
        assert!(blocks
            .iter()
            .zip(&reference)
            .all(|(block, other)| block.block.hash == other.block.hash));
    }
    for (index, sealed_block) in reference.iter().enumerate() {
        assert_eq!(sealed_block.block.height().int(), index as u64 + 1);
        assert!(sealed_block.block.is_correct());
        assert!(sealed_block.seals_are_correct());
        assert!(sealed_block.commit_seals.len() >= validator_set.quorum());
        assert!(sealed_block
            .commit_seals
            .iter()
            .all(|(signer, _)| validator_set.contains(signer)));
    }

    // 4. Consecutive blocks respect the block period.
    for pair in reference.windows(2) {
        assert!(pair[1].block.header.timestamp >= pair[0].block.header.timestamp + 1);
        assert_eq!(pair[1].block.header.parent_hash, pair[0].block.hash);
    }
}
