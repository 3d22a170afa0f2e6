/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that determine what roles a replica should play in a given round.

use ed25519_dalek::VerifyingKey;

use crate::types::{data_types::ConsensusRoundIdentifier, validator_set::ValidatorSet};

/// Select the proposer of `round`.
///
/// The proposer rotates through the [sorted](ValidatorSet#ordering-of-validators) validator list:
/// it is the validator at index `(height + round) mod n`. So within a height every round change moves
/// the proposer role to the next validator, and round 0 of consecutive heights is proposed by
/// consecutive validators.
///
/// # Panics
///
/// Panics if `validator_set` is empty. Replicas refuse to start with an empty validator set.
pub fn select_proposer(
    round: ConsensusRoundIdentifier,
    validator_set: &ValidatorSet,
) -> VerifyingKey {
    let n = validator_set.len() as u64;
    assert!(n > 0, "The validator set cannot be empty!");
    let index = (round.height.int() % n + round.round.int() as u64 % n) % n;
    *validator_set
        .get(index as usize)
        .expect("index is reduced modulo the number of validators")
}

/// Determine whether `validator` should act as the proposer in `round`.
pub fn is_proposer(
    validator: &VerifyingKey,
    round: ConsensusRoundIdentifier,
    validator_set: &ValidatorSet,
) -> bool {
    !validator_set.is_empty() && validator == &select_proposer(round, validator_set)
}
