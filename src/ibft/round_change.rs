/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Collection of [`RoundChange`] messages at one height.
//!
//! The proposer of round `r > 0` may only propose once it holds a [`RoundChangeCertificate`] for `r`,
//! i.e., round changes targeting `r` from a quorum of distinct validators. [`RoundChangeManager`]
//! keeps the round changes received at the current height, grouped by target round, until the height
//! retires.

use std::{collections::BTreeMap, sync::Arc};

use crate::types::{
    data_types::{BlockHeight, RoundNumber},
    validator_set::ValidatorSet,
};

use super::{
    certificates::{Certificate, RoundChangeCertificate},
    messages::RoundChange,
};

/// What happened to a round change offered to [`RoundChangeManager::add_round_change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundChangeOutcome {
    Added,
    /// The signer already sent a round change for the same target round.
    Duplicate,
    /// The round change is for another height, or carries an incorrect prepared certificate.
    Invalid,
}

pub struct RoundChangeManager {
    height: BlockHeight,
    validator_set: Arc<ValidatorSet>,
    round_changes: BTreeMap<RoundNumber, Vec<RoundChange>>,
}

impl RoundChangeManager {
    pub fn new(height: BlockHeight, validator_set: Arc<ValidatorSet>) -> RoundChangeManager {
        RoundChangeManager {
            height,
            validator_set,
            round_changes: BTreeMap::new(),
        }
    }

    /// Store `round_change` if it is valid and is the first from its signer for its target round.
    ///
    /// A round change is valid if it targets a round of this manager's height, and any prepared
    /// certificate it carries is correct and from an earlier round of the same height.
    pub fn add_round_change(&mut self, round_change: RoundChange) -> RoundChangeOutcome {
        let target = round_change.payload().round;
        if target.height != self.height || !self.validator_set.contains(round_change.author()) {
            return RoundChangeOutcome::Invalid;
        }
        if let Some(prepared_certificate) = &round_change.payload().prepared_certificate {
            let prepared_round = prepared_certificate.round();
            if prepared_round.height != target.height
                || prepared_round.round >= target.round
                || !prepared_certificate.is_correct(&self.validator_set)
            {
                return RoundChangeOutcome::Invalid;
            }
        }

        let collected = self.round_changes.entry(target.round).or_default();
        if collected
            .iter()
            .any(|existing| existing.author() == round_change.author())
        {
            return RoundChangeOutcome::Duplicate;
        }
        collected.push(round_change);
        RoundChangeOutcome::Added
    }

    /// Build a [`RoundChangeCertificate`] for `round` if a quorum of round changes targeting it were
    /// collected.
    pub fn certificate_for(&self, round: RoundNumber) -> Option<RoundChangeCertificate> {
        let collected = self.round_changes.get(&round)?;
        RoundChangeCertificate::extract(collected, &self.validator_set).ok()
    }

    /// The number of distinct validators that sent round changes targeting `round`.
    pub fn count_for(&self, round: RoundNumber) -> usize {
        self.round_changes.get(&round).map_or(0, Vec::len)
    }

    /// Forget the round changes targeting rounds lower than `round`.
    pub fn discard_rounds_below(&mut self, round: RoundNumber) {
        self.round_changes = self.round_changes.split_off(&round);
    }
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::SigningKey;
    use rand_core::OsRng;

    use super::*;
    use crate::{
        ibft::{factory::MessageFactory, messages::Prepare, certificates::PreparedCertificate},
        types::{
            block::{Block, BlockHeader},
            crypto_primitives::Keypair,
            data_types::{ConsensusRoundIdentifier, Data},
        },
    };

    fn setup() -> (Vec<MessageFactory>, Arc<ValidatorSet>) {
        let mut csprg = OsRng {};
        let factories: Vec<MessageFactory> = (0..4)
            .map(|_| MessageFactory::new(Keypair::new(SigningKey::generate(&mut csprg))))
            .collect();
        let validator_set = factories.iter().map(|f| f.local_address()).collect();
        (factories, Arc::new(validator_set))
    }

    fn round_id(height: u64, round: u32) -> ConsensusRoundIdentifier {
        ConsensusRoundIdentifier::new(BlockHeight::new(height), RoundNumber::new(round))
    }

    #[test]
    fn certificate_forms_once_a_quorum_targets_the_round() {
        let (factories, validator_set) = setup();
        let mut manager = RoundChangeManager::new(BlockHeight::new(1), validator_set);
        let target = round_id(1, 1);

        for (i, factory) in factories[..3].iter().enumerate() {
            assert!(manager.certificate_for(target.round).is_none(), "after {} round changes", i);
            assert_eq!(
                manager.add_round_change(factory.create_round_change(target, None)),
                RoundChangeOutcome::Added
            );
        }
        assert_eq!(
            manager.add_round_change(factories[0].create_round_change(target, None)),
            RoundChangeOutcome::Duplicate
        );
        assert_eq!(manager.count_for(target.round), 3);

        let certificate = manager.certificate_for(target.round).unwrap();
        assert_eq!(certificate.round_changes.len(), 3);
        assert!(manager.certificate_for(RoundNumber::new(2)).is_none());

        manager.discard_rounds_below(RoundNumber::new(2));
        assert_eq!(manager.count_for(target.round), 0);
    }

    #[test]
    fn round_changes_for_other_heights_or_with_bad_certificates_are_invalid() {
        let (factories, validator_set) = setup();
        let mut manager = RoundChangeManager::new(BlockHeight::new(1), validator_set.clone());

        assert_eq!(
            manager.add_round_change(factories[0].create_round_change(round_id(2, 1), None)),
            RoundChangeOutcome::Invalid
        );

        // A prepared certificate signed by a non-proposer.
        let round = round_id(1, 0);
        let proposer = crate::ibft::roles::select_proposer(round, &validator_set);
        let impostor = factories
            .iter()
            .find(|f| f.local_address() != proposer)
            .unwrap();
        let block = Block::new(round.height, BlockHeader::genesis().hash(), 1, Data::default());
        let proposal = impostor.create_proposal(round, block);
        let prepares: Vec<Prepare> = factories
            .iter()
            .map(|f| f.create_prepare(round, proposal.payload().block.hash))
            .collect();
        let bad_certificate =
            PreparedCertificate::extract(&proposal, &prepares, &validator_set).unwrap();

        assert_eq!(
            manager.add_round_change(
                factories[1].create_round_change(round_id(1, 1), Some(bad_certificate))
            ),
            RoundChangeOutcome::Invalid
        );
        assert_eq!(manager.count_for(RoundNumber::new(1)), 0);
    }
}
