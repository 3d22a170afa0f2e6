/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The state of a single round of consensus at a single height.
//!
//! A [`RoundState`] holds the (at most one) proposal accepted in its round, and tallies the prepares
//! and commits received for every block hash. Each validator gets at most one prepare and one commit
//! per round: a second one for a different hash is an equivocation, and is not tallied.
//!
//! A round state knows nothing about the network or about other rounds: the
//! [controller](super::implementation::IbftController) validates messages before adding them, reads
//! the tallies to decide when to move between [`RoundPhase`]s, and creates the node's own messages.

use std::{
    collections::{hash_map::Entry, HashMap},
    sync::Arc,
};

use borsh::BorshSerialize;

use crate::types::{
    block::SealedBlock,
    data_types::{ConsensusRoundIdentifier, CryptoHash},
    signed_payload::SignedPayload,
    validator_set::ValidatorSet,
};

use super::{
    certificates::{distinct_signers, PreparedCertificate},
    messages::{Commit, Prepare, Proposal},
};

/// The phases a round goes through.
///
/// ```text
/// AwaitingProposal ──proposal──► Preparing ──prepare quorum──► Prepared ──commit quorum──► Committed
///        │                           │                            │
///        └───────────────────────────┴──────── round timeout ─────┴──────────► RoundChanging
/// ```
///
/// A round can also go from `Preparing` straight to `Committed` if a quorum of commits arrives before a
/// quorum of prepares does.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoundPhase {
    AwaitingProposal,
    Preparing,
    Prepared,
    Committed,
    /// The round timed out and the node moved on to a later round. The state is kept as history, and is
    /// never modified again.
    RoundChanging,
}

/// What happened to a prepare or commit added to a [`RoundState`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TallyOutcome {
    Added,
    /// The signer already sent this message.
    Duplicate,
    /// The signer already sent a message of the same kind for a different hash in this round.
    Conflicting,
    /// The round was left and its state is history.
    Frozen,
}

/// Everything the local node knows about one round.
pub struct RoundState {
    round: ConsensusRoundIdentifier,
    validator_set: Arc<ValidatorSet>,
    phase: RoundPhase,
    proposal: Option<Proposal>,
    prepares: Tally<Prepare>,
    commits: Tally<Commit>,
    prepared_certificate: Option<PreparedCertificate>,
}

impl RoundState {
    pub fn new(round: ConsensusRoundIdentifier, validator_set: Arc<ValidatorSet>) -> RoundState {
        RoundState {
            round,
            validator_set,
            phase: RoundPhase::AwaitingProposal,
            proposal: None,
            prepares: Tally::new(),
            commits: Tally::new(),
            prepared_certificate: None,
        }
    }

    pub fn round(&self) -> ConsensusRoundIdentifier {
        self.round
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn proposal(&self) -> Option<&Proposal> {
        self.proposal.as_ref()
    }

    /// The certificate collected when this round became prepared, if it did.
    pub fn prepared_certificate(&self) -> Option<&PreparedCertificate> {
        self.prepared_certificate.as_ref()
    }

    /// Accept `proposal` as the round's candidate, moving from `AwaitingProposal` to `Preparing`.
    ///
    /// Returns `false` and leaves the state unchanged if the round is not awaiting a proposal, e.g.,
    /// because a proposal was already accepted.
    ///
    /// # Precondition
    ///
    /// `proposal` is for this round, from this round's proposer, and has passed block validation.
    pub fn set_proposal(&mut self, proposal: Proposal) -> bool {
        if self.phase != RoundPhase::AwaitingProposal {
            return false;
        }
        self.proposal = Some(proposal);
        self.phase = RoundPhase::Preparing;
        true
    }

    /// Tally `prepare` under its digest.
    pub fn add_prepare(&mut self, prepare: Prepare) -> TallyOutcome {
        if self.is_frozen() {
            return TallyOutcome::Frozen;
        }
        let digest = prepare.payload().digest;
        self.prepares.add(digest, prepare, true)
    }

    /// Record the digest a prepare from the round's proposer is for, without tallying it. The proposal
    /// already counts as the proposer's prepare, but the proposer is still held to one prepared digest.
    pub fn add_proposer_prepare(&mut self, prepare: Prepare) -> TallyOutcome {
        if self.is_frozen() {
            return TallyOutcome::Frozen;
        }
        let digest = prepare.payload().digest;
        self.prepares.add(digest, prepare, false)
    }

    /// Tally `commit` under its digest.
    pub fn add_commit(&mut self, commit: Commit) -> TallyOutcome {
        if self.is_frozen() {
            return TallyOutcome::Frozen;
        }
        let digest = commit.payload().digest;
        self.commits.add(digest, commit, true)
    }

    /// The number of distinct validators that prepared `digest`, counting the accepted proposal as its
    /// author's prepare if the proposal is for `digest`.
    pub fn prepare_count(&self, digest: &CryptoHash) -> usize {
        let proposer = self
            .proposal
            .as_ref()
            .filter(|proposal| &proposal.payload().block.hash == digest)
            .map(|proposal| proposal.author());
        let preparers = self
            .prepares
            .messages_for(digest)
            .map(|prepare| prepare.author());
        distinct_signers(proposer.into_iter().chain(preparers), &self.validator_set)
    }

    /// The number of distinct validators that committed `digest`.
    pub fn commit_count(&self, digest: &CryptoHash) -> usize {
        distinct_signers(
            self.commits
                .messages_for(digest)
                .map(|commit| commit.author()),
            &self.validator_set,
        )
    }

    /// Move from `Preparing` to `Prepared` if a quorum prepared the accepted proposal. Returns the
    /// digest of the proposal if the transition happened.
    pub fn try_prepare(&mut self) -> Option<CryptoHash> {
        if self.phase != RoundPhase::Preparing {
            return None;
        }
        let proposal = self.proposal.as_ref()?;
        let digest = proposal.payload().block.hash;
        if self.prepare_count(&digest) < self.validator_set.quorum() {
            return None;
        }

        self.prepared_certificate = PreparedCertificate::extract(
            proposal,
            self.prepares.messages_for(&digest),
            &self.validator_set,
        )
        .ok();
        self.phase = RoundPhase::Prepared;
        Some(digest)
    }

    /// Move to `Committed` if a quorum committed the accepted proposal, returning the proposed block
    /// sealed with the commit seals of the quorum.
    pub fn try_commit(&mut self) -> Option<SealedBlock> {
        if !matches!(self.phase, RoundPhase::Preparing | RoundPhase::Prepared) {
            return None;
        }
        let proposal = self.proposal.as_ref()?;
        let digest = proposal.payload().block.hash;
        if self.commit_count(&digest) < self.validator_set.quorum() {
            return None;
        }

        let commit_seals = self
            .commits
            .messages_for(&digest)
            .filter(|commit| self.validator_set.contains(commit.author()))
            .map(|commit| (*commit.author(), commit.payload().commit_seal))
            .collect();
        let sealed_block = SealedBlock {
            block: proposal.payload().block.clone(),
            round: self.round.round,
            commit_seals,
        };
        self.phase = RoundPhase::Committed;
        Some(sealed_block)
    }

    /// Freeze the round because the node moved on to a later round. A committed round stays committed.
    pub fn freeze(&mut self) {
        if self.phase != RoundPhase::Committed {
            self.phase = RoundPhase::RoundChanging;
        }
    }

    fn is_frozen(&self) -> bool {
        self.phase == RoundPhase::RoundChanging
    }
}

// Messages of one kind, tallied per digest. Every signer is bound to the first digest it signed.
struct Tally<M> {
    by_digest: HashMap<CryptoHash, Vec<M>>,
    digest_of_signer: HashMap<[u8; 32], CryptoHash>,
}

impl<T: BorshSerialize> Tally<SignedPayload<T>> {
    fn new() -> Self {
        Tally {
            by_digest: HashMap::new(),
            digest_of_signer: HashMap::new(),
        }
    }

    fn add(&mut self, digest: CryptoHash, message: SignedPayload<T>, count: bool) -> TallyOutcome {
        match self.digest_of_signer.entry(message.author().to_bytes()) {
            Entry::Occupied(entry) if *entry.get() == digest => TallyOutcome::Duplicate,
            Entry::Occupied(_) => TallyOutcome::Conflicting,
            Entry::Vacant(entry) => {
                entry.insert(digest);
                if count {
                    self.by_digest.entry(digest).or_default().push(message);
                }
                TallyOutcome::Added
            }
        }
    }

    fn messages_for(&self, digest: &CryptoHash) -> impl Iterator<Item = &SignedPayload<T>> {
        self.by_digest.get(digest).into_iter().flatten()
    }
}
