/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`ValidatorSet`] type, which stores the identities of the validators taking part in consensus.

use std::slice;

pub use ed25519_dalek::VerifyingKey;

/// Stores the identities of validators.
///
/// ## Ordering of validators
///
/// `ValidatorSet` internally maintains the list of validators in ascending order of the bytes of their
/// `VerifyingKey`s, and avails the methods [`validators`](ValidatorSet::validators) and
/// [`position`](ValidatorSet::position) that users can use to get them in this order. Proposer
/// selection depends on this order, so every replica must compute the same order from the same keys.
///
/// ## Fault tolerance
///
/// Every validator has equal weight. A validator set of `n` validators tolerates
/// [`max_faulty`](Self::max_faulty) `f = floor((n - 1) / 3)` faulty validators, and a decision needs the
/// signatures of [`quorum`](Self::quorum) `2f + 1` distinct validators.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct ValidatorSet {
    // The verifying keys of validators are included here in ascending order.
    validators: Vec<VerifyingKey>,
}

impl ValidatorSet {
    /// Create an empty validator set.
    pub fn new() -> ValidatorSet {
        Self {
            validators: Vec::new(),
        }
    }

    /// Put a `validator` into the validator set, placing them in a position that preserves the
    /// [ordering of validators](Self#ordering-of-validators). Putting an existing validator is a no-op.
    pub fn put(&mut self, validator: &VerifyingKey) {
        let validator_bytes = validator.to_bytes();
        if let Err(insert_pos) = self
            .validators
            .binary_search_by(|v| v.to_bytes().cmp(&validator_bytes))
        {
            self.validators.insert(insert_pos, *validator);
        }
    }

    /// Check whether the validator set contains `validator`.
    pub fn contains(&self, validator: &VerifyingKey) -> bool {
        self.position(validator).is_some()
    }

    /// Get an iterator through validators' verifying keys which walks through them in ascending order.
    pub fn validators(&self) -> slice::Iter<VerifyingKey> {
        self.validators.iter()
    }

    /// Get the validator at `index` in the [sorted order](Self#ordering-of-validators).
    pub fn get(&self, index: usize) -> Option<&VerifyingKey> {
        self.validators.get(index)
    }

    /// Get the number of validators currently in the validator set.
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// Check whether the validator set is empty (i.e., `self.len() == 0`).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the index of the given `validator` in the [sorted order](Self#ordering-of-validators) of
    /// `VerifyingKey`s in the validator set, if it is actually in the validator set.
    pub fn position(&self, validator: &VerifyingKey) -> Option<usize> {
        let validator_bytes = validator.to_bytes();
        self.validators
            .binary_search_by(|v| v.to_bytes().cmp(&validator_bytes))
            .ok()
    }

    /// The maximum number of faulty validators the validator set tolerates, `floor((n - 1) / 3)`.
    pub fn max_faulty(&self) -> usize {
        self.len().saturating_sub(1) / 3
    }

    /// The number of distinct validators whose signatures form a quorum, `2f + 1`.
    pub fn quorum(&self) -> usize {
        2 * self.max_faulty() + 1
    }
}

impl FromIterator<VerifyingKey> for ValidatorSet {
    fn from_iter<I: IntoIterator<Item = VerifyingKey>>(iter: I) -> Self {
        let mut validator_set = ValidatorSet::new();
        iter.into_iter().for_each(|validator| validator_set.put(&validator));
        validator_set
    }
}
