/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Quorum counting, and the certificates that prove a quorum of validators did something.
//!
//! Two certificates exist:
//! 1. [`PreparedCertificate`]: proof that a quorum prepared a proposal in some round. Carried in round
//!    changes so that a block that may have been committed by someone is re-proposed.
//! 2. [`RoundChangeCertificate`]: proof that a quorum wants to move to a round. Carried in
//!    [`NewRound`](super::messages::NewRound) messages.
//!
//! Quorum is always counted over *distinct* signers that are members of the validator set. Duplicate
//! signatures from one validator and signatures from non-validators never count.

use std::{
    collections::HashSet,
    fmt::{self, Display, Formatter},
};

use borsh::BorshSerialize;
use ed25519_dalek::VerifyingKey;

use crate::types::{
    data_types::ConsensusRoundIdentifier, signed_payload::SignedPayload,
    validator_set::ValidatorSet,
};

use super::{
    messages::{Prepare, Proposal, RoundChange},
    roles::is_proposer,
};

/// Count the distinct members of `validator_set` among `signers`.
pub fn distinct_signers<'a>(
    signers: impl IntoIterator<Item = &'a VerifyingKey>,
    validator_set: &ValidatorSet,
) -> usize {
    signers
        .into_iter()
        .filter(|signer| validator_set.contains(signer))
        .map(|signer| signer.to_bytes())
        .collect::<HashSet<[u8; 32]>>()
        .len()
}

/// Check whether the distinct validators that signed `messages` form a quorum of `validator_set`.
///
/// Adding messages to `messages` never turns a `true` into a `false`.
pub fn has_quorum<'a, T: BorshSerialize + 'a>(
    messages: impl IntoIterator<Item = &'a SignedPayload<T>>,
    validator_set: &ValidatorSet,
) -> bool {
    distinct_signers(messages.into_iter().map(|m| m.author()), validator_set)
        >= validator_set.quorum()
}

/// Certificates serve as proof that a quorum of validators has done something. Their correctness can
/// be checked against the validator set.
pub trait Certificate {
    fn is_correct(&self, validator_set: &ValidatorSet) -> bool;
}

/// Proof that a quorum of validators prepared `proposal`.
///
/// The proposal itself counts as its author's prepare, so `prepares` needs signatures from a quorum
/// minus one other validators. `prepares` never contains two prepares from the same signer, and never
/// contains a prepare from the proposal's author.
#[derive(Clone, PartialEq, Eq, BorshSerialize)]
pub struct PreparedCertificate {
    pub proposal: Proposal,
    pub prepares: Vec<Prepare>,
}

impl PreparedCertificate {
    /// Build a certificate from `proposal` and the subset of `prepares` that match it.
    ///
    /// Prepares for other rounds or other digests, prepares from non-validators, and repeated prepares
    /// from one signer are left out.
    ///
    /// # Errors
    ///
    /// [`CertificateError::InsufficientQuorum`] if the matching prepares together with the proposal do
    /// not reach quorum.
    pub fn extract<'a>(
        proposal: &Proposal,
        prepares: impl IntoIterator<Item = &'a Prepare>,
        validator_set: &ValidatorSet,
    ) -> Result<PreparedCertificate, CertificateError> {
        let round = proposal.payload().round;
        let digest = proposal.payload().block.hash;
        let proposer = proposal.author().to_bytes();

        let mut seen = HashSet::new();
        let matching: Vec<Prepare> = prepares
            .into_iter()
            .filter(|prepare| {
                prepare.payload().round == round
                    && prepare.payload().digest == digest
                    && prepare.author().to_bytes() != proposer
                    && validator_set.contains(prepare.author())
                    && seen.insert(prepare.author().to_bytes())
            })
            .cloned()
            .collect();

        let certificate = PreparedCertificate {
            proposal: proposal.clone(),
            prepares: matching,
        };
        let signers = certificate.signer_count(validator_set);
        if signers >= validator_set.quorum() {
            Ok(certificate)
        } else {
            Err(CertificateError::InsufficientQuorum {
                signers,
                quorum: validator_set.quorum(),
            })
        }
    }

    /// The round the certified proposal was made in.
    pub fn round(&self) -> ConsensusRoundIdentifier {
        self.proposal.payload().round
    }

    fn signer_count(&self, validator_set: &ValidatorSet) -> usize {
        distinct_signers(
            std::iter::once(self.proposal.author())
                .chain(self.prepares.iter().map(|prepare| prepare.author())),
            validator_set,
        )
    }
}

impl Certificate for PreparedCertificate {
    /// Checks that the proposal was made by the proposer of its round and carries a well-formed block,
    /// that every prepare is for the same round and block, and that the distinct validators among
    /// the proposer and the preparers form a quorum.
    fn is_correct(&self, validator_set: &ValidatorSet) -> bool {
        let round = self.round();
        let block = &self.proposal.payload().block;
        is_proposer(self.proposal.author(), round, validator_set)
            && block.is_correct()
            && block.height() == round.height
            && self.prepares.iter().all(|prepare| {
                prepare.payload().round == round && prepare.payload().digest == block.hash
            })
            && self.signer_count(validator_set) >= validator_set.quorum()
    }
}

/// Proof that a quorum of validators wants to move to `round`.
#[derive(Clone, PartialEq, Eq, BorshSerialize)]
pub struct RoundChangeCertificate {
    pub round_changes: Vec<RoundChange>,
}

impl RoundChangeCertificate {
    /// Build a certificate out of `round_changes`, which should all target the same round.
    ///
    /// The target round is taken from the first round change. Round changes targeting other rounds,
    /// from non-validators, or repeated by one signer are left out.
    ///
    /// # Errors
    ///
    /// [`CertificateError::InsufficientQuorum`] if fewer than a quorum of distinct validators remain.
    pub fn extract<'a>(
        round_changes: impl IntoIterator<Item = &'a RoundChange>,
        validator_set: &ValidatorSet,
    ) -> Result<RoundChangeCertificate, CertificateError> {
        let mut round_changes = round_changes.into_iter().peekable();
        let target = match round_changes.peek() {
            Some(first) => first.payload().round,
            None => {
                return Err(CertificateError::InsufficientQuorum {
                    signers: 0,
                    quorum: validator_set.quorum(),
                })
            }
        };

        let mut seen = HashSet::new();
        let unique: Vec<RoundChange> = round_changes
            .filter(|round_change| {
                round_change.payload().round == target
                    && validator_set.contains(round_change.author())
                    && seen.insert(round_change.author().to_bytes())
            })
            .cloned()
            .collect();

        if unique.len() >= validator_set.quorum() {
            Ok(RoundChangeCertificate {
                round_changes: unique,
            })
        } else {
            Err(CertificateError::InsufficientQuorum {
                signers: unique.len(),
                quorum: validator_set.quorum(),
            })
        }
    }

    /// The round change with the highest-round prepared certificate among those in this certificate.
    pub fn highest_prepared_certificate(&self) -> Option<&PreparedCertificate> {
        self.round_changes
            .iter()
            .filter_map(|round_change| round_change.payload().prepared_certificate.as_ref())
            .max_by_key(|prepared_certificate| prepared_certificate.round())
    }

    /// Checks that this certificate justifies moving to `round`: every round change targets `round`, a
    /// quorum of distinct validators signed them, and every prepared certificate they carry is correct
    /// and from an earlier round of the same height.
    pub fn is_correct_for(&self, round: ConsensusRoundIdentifier, validator_set: &ValidatorSet) -> bool {
        self.round_changes.iter().all(|round_change| {
            round_change.payload().round == round
                && match &round_change.payload().prepared_certificate {
                    Some(prepared_certificate) => {
                        prepared_certificate.round().height == round.height
                            && prepared_certificate.round().round < round.round
                            && prepared_certificate.is_correct(validator_set)
                    }
                    None => true,
                }
        }) && has_quorum(&self.round_changes, validator_set)
    }
}

/// Enumerates the ways a certificate can fail to be extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateError {
    /// Fewer than a quorum of distinct validators signed the candidate messages.
    InsufficientQuorum { signers: usize, quorum: usize },
}

impl Display for CertificateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CertificateError::InsufficientQuorum { signers, quorum } => write!(
                f,
                "{} distinct validator signatures collected, but a quorum is {}",
                signers, quorum
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::SigningKey;
    use rand_core::OsRng;

    use super::*;
    use crate::{
        ibft::{factory::MessageFactory, roles::select_proposer},
        types::{
            block::{Block, BlockHeader},
            crypto_primitives::Keypair,
            data_types::{BlockHeight, CryptoHash, Data, RoundNumber},
        },
    };

    struct Fixture {
        factories: Vec<MessageFactory>,
        validator_set: ValidatorSet,
    }

    impl Fixture {
        fn new(n: usize) -> Fixture {
            let mut csprg = OsRng {};
            let keypairs: Vec<Keypair> = (0..n)
                .map(|_| Keypair::new(SigningKey::generate(&mut csprg)))
                .collect();
            let validator_set: ValidatorSet = keypairs.iter().map(|k| k.public()).collect();
            let factories = keypairs.into_iter().map(MessageFactory::new).collect();
            Fixture {
                factories,
                validator_set,
            }
        }

        fn factory_of(&self, validator: &VerifyingKey) -> &MessageFactory {
            self.factories
                .iter()
                .find(|factory| &factory.local_address() == validator)
                .unwrap()
        }

        fn proposer_factory(&self, round: ConsensusRoundIdentifier) -> &MessageFactory {
            self.factory_of(&select_proposer(round, &self.validator_set))
        }

        fn non_proposer_factories(&self, round: ConsensusRoundIdentifier) -> Vec<&MessageFactory> {
            let proposer = select_proposer(round, &self.validator_set);
            self.factories
                .iter()
                .filter(|factory| factory.local_address() != proposer)
                .collect()
        }

        fn proposal(&self, round: ConsensusRoundIdentifier) -> Proposal {
            let block = Block::new(round.height, BlockHeader::genesis().hash(), 1, Data::default());
            self.proposer_factory(round).create_proposal(round, block)
        }
    }

    fn round_id(height: u64, round: u32) -> ConsensusRoundIdentifier {
        ConsensusRoundIdentifier::new(BlockHeight::new(height), RoundNumber::new(round))
    }

    #[test]
    fn quorum_is_monotone_and_counts_distinct_validators_only() {
        let fixture = Fixture::new(4);
        let round = round_id(1, 0);
        let mut round_changes: Vec<RoundChange> = Vec::new();

        let mut previous = false;
        for factory in &fixture.factories {
            round_changes.push(factory.create_round_change(round, None));
            // Repeat each round change: duplicates must not inflate the count.
            round_changes.push(factory.create_round_change(round, None));
            let now = has_quorum(&round_changes, &fixture.validator_set);
            assert!(now || !previous);
            previous = now;
        }
        assert!(previous);

        let first_two: Vec<RoundChange> = round_changes[..4].to_vec();
        assert!(!has_quorum(&first_two, &fixture.validator_set));

        let outsider = MessageFactory::new(Keypair::new(SigningKey::generate(&mut OsRng {})));
        let mut with_outsider = round_changes[..4].to_vec();
        with_outsider.push(outsider.create_round_change(round, None));
        assert!(!has_quorum(&with_outsider, &fixture.validator_set));
    }

    #[test]
    fn single_round_change_does_not_make_a_certificate() {
        let fixture = Fixture::new(4);
        let round_change = fixture.factories[0].create_round_change(round_id(1, 1), None);
        assert_eq!(
            RoundChangeCertificate::extract([&round_change], &fixture.validator_set).err(),
            Some(CertificateError::InsufficientQuorum {
                signers: 1,
                quorum: 3
            })
        );
    }

    #[test]
    fn round_change_certificate_ignores_other_targets_and_duplicates() {
        let fixture = Fixture::new(4);
        let target = round_id(1, 1);
        let mut round_changes: Vec<RoundChange> = fixture.factories[..2]
            .iter()
            .map(|factory| factory.create_round_change(target, None))
            .collect();
        round_changes.push(fixture.factories[0].create_round_change(target, None));
        round_changes.push(fixture.factories[2].create_round_change(round_id(1, 2), None));
        assert!(RoundChangeCertificate::extract(&round_changes, &fixture.validator_set).is_err());

        round_changes.push(fixture.factories[3].create_round_change(target, None));
        let certificate =
            RoundChangeCertificate::extract(&round_changes, &fixture.validator_set).unwrap();
        assert_eq!(certificate.round_changes.len(), 3);
        assert!(certificate.is_correct_for(target, &fixture.validator_set));
        assert!(!certificate.is_correct_for(round_id(1, 2), &fixture.validator_set));
    }

    #[test]
    fn proposal_counts_as_its_authors_prepare() {
        let fixture = Fixture::new(4);
        let round = round_id(1, 0);
        let proposal = fixture.proposal(round);
        let digest = proposal.payload().block.hash;
        let preparers = fixture.non_proposer_factories(round);

        let one_prepare = vec![preparers[0].create_prepare(round, digest)];
        assert!(PreparedCertificate::extract(&proposal, &one_prepare, &fixture.validator_set).is_err());

        let two_prepares = vec![
            preparers[0].create_prepare(round, digest),
            preparers[1].create_prepare(round, digest),
        ];
        let certificate =
            PreparedCertificate::extract(&proposal, &two_prepares, &fixture.validator_set).unwrap();
        assert!(certificate.is_correct(&fixture.validator_set));
        assert_eq!(certificate.round(), round);

        // A prepare from the proposer itself adds nothing.
        let proposer_prepare = vec![
            preparers[0].create_prepare(round, digest),
            fixture.proposer_factory(round).create_prepare(round, digest),
        ];
        assert!(
            PreparedCertificate::extract(&proposal, &proposer_prepare, &fixture.validator_set)
                .is_err()
        );
    }

    #[test]
    fn prepares_for_other_blocks_do_not_count() {
        let fixture = Fixture::new(4);
        let round = round_id(1, 0);
        let proposal = fixture.proposal(round);
        let preparers = fixture.non_proposer_factories(round);
        let other_digest = CryptoHash::new([7u8; 32]);

        let prepares = vec![
            preparers[0].create_prepare(round, proposal.payload().block.hash),
            preparers[1].create_prepare(round, other_digest),
            preparers[2].create_prepare(round_id(1, 1), proposal.payload().block.hash),
        ];
        assert!(PreparedCertificate::extract(&proposal, &prepares, &fixture.validator_set).is_err());
    }

    #[test]
    fn prepared_certificate_from_wrong_proposer_is_incorrect() {
        let fixture = Fixture::new(4);
        let round = round_id(1, 0);
        let impostor = fixture.non_proposer_factories(round)[0];
        let block = Block::new(round.height, BlockHeader::genesis().hash(), 1, Data::default());
        let proposal = impostor.create_proposal(round, block);
        let prepares: Vec<Prepare> = fixture
            .factories
            .iter()
            .map(|factory| factory.create_prepare(round, proposal.payload().block.hash))
            .collect();

        let certificate =
            PreparedCertificate::extract(&proposal, &prepares, &fixture.validator_set).unwrap();
        assert!(!certificate.is_correct(&fixture.validator_set));
    }

    #[test]
    fn highest_prepared_certificate_is_selected() {
        let fixture = Fixture::new(4);
        let certificate_in = |round: ConsensusRoundIdentifier| {
            let proposal = fixture.proposal(round);
            let prepares: Vec<Prepare> = fixture
                .factories
                .iter()
                .map(|factory| factory.create_prepare(round, proposal.payload().block.hash))
                .collect();
            PreparedCertificate::extract(&proposal, &prepares, &fixture.validator_set).unwrap()
        };

        let target = round_id(1, 3);
        let round_changes = vec![
            fixture.factories[0].create_round_change(target, Some(certificate_in(round_id(1, 0)))),
            fixture.factories[1].create_round_change(target, Some(certificate_in(round_id(1, 2)))),
            fixture.factories[2].create_round_change(target, None),
        ];
        let certificate =
            RoundChangeCertificate::extract(&round_changes, &fixture.validator_set).unwrap();
        assert!(certificate.is_correct_for(target, &fixture.validator_set));
        assert_eq!(
            certificate.highest_prepared_certificate().map(|pc| pc.round()),
            Some(round_id(1, 2))
        );
    }
}
