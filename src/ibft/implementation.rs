/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Event-driven implementation of the IBFT round engine.
//!
//! Main type: [`IbftController`].

use std::{
    cmp::max,
    collections::BTreeMap,
    mem,
    sync::{mpsc::Sender, Arc},
    time::{Duration, Instant, SystemTime},
};

use ed25519_dalek::VerifyingKey;

use crate::{
    chain::{Chain, ProduceBlockRequest, ProduceBlockResponse, ValidateBlockRequest, ValidateBlockResponse},
    events::*,
    round_timer::{instant_of_timestamp, secs_since_unix_epoch, RoundTimeouts, Timer},
    types::{
        block::{Block, BlockHeader, SealedBlock},
        crypto_primitives::{verify_signature, Keypair},
        data_types::{ConsensusRoundIdentifier, RoundNumber},
        validator_set::ValidatorSet,
    },
};

use super::{
    certificates::PreparedCertificate,
    factory::MessageFactory,
    messages::{Commit, IbftMessage, NewRound, Prepare, Proposal, RoundChange},
    round_change::{RoundChangeManager, RoundChangeOutcome},
    round_state::{RoundPhase, RoundState, TallyOutcome},
    roles::{is_proposer, select_proposer},
};

/// The verdict of the controller on a message delivered to it.
///
/// Only `Rejected` messages are withheld from gossip. `Ignored` messages are well-formed but carry no
/// new information for the local node (e.g., they are for a round it already left), and may still be
/// useful to peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageVerdict {
    Accepted,
    Ignored,
    Rejected,
}

/// Configuration parameters for the [`IbftController`].
#[derive(Clone)]
pub(crate) struct IbftConfiguration {
    pub(crate) keypair: Keypair,
    pub(crate) block_period: Duration,
    pub(crate) round_timeouts: RoundTimeouts,
}

/// A single participant in the IBFT protocol, running consensus for one height at a time.
///
/// # Usage
///
/// The controller is the only mutator of consensus state, and is meant to be driven by a single thread
/// in an event-oriented fashion. Its event handlers are:
/// - [`handle_proposal`](Self::handle_proposal), [`handle_prepare`](Self::handle_prepare),
///   [`handle_commit`](Self::handle_commit), [`handle_round_change`](Self::handle_round_change), and
///   [`handle_new_round`](Self::handle_new_round): called when a message for the current height is
///   delivered.
/// - [`handle_new_chain_head`](Self::handle_new_chain_head): called when the chain grows.
/// - [`handle_round_expiry`](Self::handle_round_expiry) and
///   [`handle_block_timer_expiry`](Self::handle_block_timer_expiry): called when timers expire.
///   [`fire_expired_timers`](Self::fire_expired_timers) calls them for every expired timer.
///
/// Messages the controller creates are placed in an outbox, drained with
/// [`take_outbox`](Self::take_outbox). The caller is expected to send them to the other validators
/// *and* to deliver them back to the controller, like any other message.
pub struct IbftController<C: Chain> {
    factory: MessageFactory,
    validator_set: Arc<ValidatorSet>,
    chain: C,
    block_period: Duration,
    round_timeouts: RoundTimeouts,

    chain_head: BlockHeader,
    current: ConsensusRoundIdentifier,
    round_states: BTreeMap<RoundNumber, RoundState>,
    round_changes: RoundChangeManager,
    latest_prepared_certificate: Option<PreparedCertificate>,
    new_round_sent: Option<ConsensusRoundIdentifier>,

    round_timer: Timer,
    block_timer: Timer,
    outbox: Vec<IbftMessage>,
    event_publisher: Option<Sender<Event>>,
}

impl<C: Chain> IbftController<C> {
    /// Create a controller and start consensus for the height after `chain`'s head.
    pub(crate) fn new(
        config: IbftConfiguration,
        validator_set: Arc<ValidatorSet>,
        chain: C,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        let chain_head = chain.chain_head_header();
        let first_round = ConsensusRoundIdentifier::new(chain_head.height + 1, RoundNumber::init());
        let mut controller = Self {
            factory: MessageFactory::new(config.keypair),
            round_changes: RoundChangeManager::new(first_round.height, validator_set.clone()),
            validator_set,
            chain,
            block_period: config.block_period,
            round_timeouts: config.round_timeouts,
            chain_head: chain_head.clone(),
            current: first_round,
            round_states: BTreeMap::new(),
            latest_prepared_certificate: None,
            new_round_sent: None,
            round_timer: Timer::new(),
            block_timer: Timer::new(),
            outbox: Vec::new(),
            event_publisher,
        };
        controller.enter_height(chain_head);
        controller
    }

    /// The round the local node is currently in.
    pub fn current_round(&self) -> ConsensusRoundIdentifier {
        self.current
    }

    pub fn chain_head(&self) -> &BlockHeader {
        &self.chain_head
    }

    pub fn chain(&self) -> &C {
        &self.chain
    }

    pub fn local_address(&self) -> VerifyingKey {
        self.factory.local_address()
    }

    /// The state of `round` at the current height, if the local node has entered it.
    pub fn round_state(&self, round: RoundNumber) -> Option<&RoundState> {
        self.round_states.get(&round)
    }

    /// Take the messages created by the controller since the last call.
    pub fn take_outbox(&mut self) -> Vec<IbftMessage> {
        mem::take(&mut self.outbox)
    }

    /// The earliest pending timer deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.round_timer.deadline(), self.block_timer.deadline()) {
            (Some(round), Some(block)) => Some(round.min(block)),
            (round, block) => round.or(block),
        }
    }

    /// Handle every timer that has expired at `now`.
    pub fn fire_expired_timers(&mut self, now: Instant) {
        if let Some(round) = self.block_timer.take_expired(now) {
            self.handle_block_timer_expiry(round);
        }
        if let Some(round) = self.round_timer.take_expired(now) {
            self.handle_round_expiry(round);
        }
    }

    /// Process a proposal for round 0. Proposals for later rounds are only valid inside a
    /// [`NewRound`](super::messages::NewRoundPayload) message.
    pub fn handle_proposal(&mut self, proposal: Proposal) -> MessageVerdict {
        let round = proposal.payload().round;
        if round != self.current {
            return MessageVerdict::Ignored;
        }
        if round.round != RoundNumber::init()
            || !is_proposer(proposal.author(), round, &self.validator_set)
        {
            log::debug!("Rejected proposal for {} from a non-proposer or for a later round", round);
            return MessageVerdict::Rejected;
        }
        if !self.is_awaiting_proposal() {
            return MessageVerdict::Ignored;
        }
        if !self.block_is_valid(&proposal.payload().block) {
            log::debug!("Rejected proposal for {} with an invalid block", round);
            return MessageVerdict::Rejected;
        }

        self.accept_proposal(proposal)
    }

    /// Tally a prepare for the current height.
    pub fn handle_prepare(&mut self, prepare: Prepare) -> MessageVerdict {
        let round = prepare.payload().round;
        if round.height != self.current.height || round.round > self.current.round {
            return MessageVerdict::Ignored;
        }
        // The proposal already counts as its author's prepare, so the proposer's own prepare is only
        // checked against the other prepares it signed.
        let from_proposer = is_proposer(prepare.author(), round, &self.validator_set);
        let outcome = match self.round_states.get_mut(&round.round) {
            Some(state) if from_proposer => state.add_proposer_prepare(prepare),
            Some(state) => state.add_prepare(prepare),
            None => return MessageVerdict::Ignored,
        };
        match outcome {
            TallyOutcome::Conflicting => {
                log::debug!("Rejected prepare for {} conflicting with an earlier one", round);
                MessageVerdict::Rejected
            }
            TallyOutcome::Added if !from_proposer => {
                if round == self.current {
                    self.check_round_progress();
                }
                MessageVerdict::Accepted
            }
            _ => MessageVerdict::Ignored,
        }
    }

    /// Tally a commit for the current height. Commits whose commit seal is not the author's signature
    /// over the committed hash are rejected, and so are commits for a different hash than the one their
    /// author already committed in the same round.
    pub fn handle_commit(&mut self, commit: Commit) -> MessageVerdict {
        let round = commit.payload().round;
        if round.height != self.current.height || round.round > self.current.round {
            return MessageVerdict::Ignored;
        }
        let payload = commit.payload();
        if !verify_signature(commit.author(), &payload.digest.bytes(), &payload.commit_seal) {
            log::debug!("Rejected commit for {} with an invalid commit seal", round);
            return MessageVerdict::Rejected;
        }
        let outcome = match self.round_states.get_mut(&round.round) {
            Some(state) => state.add_commit(commit),
            None => return MessageVerdict::Ignored,
        };
        match outcome {
            TallyOutcome::Conflicting => {
                log::debug!("Rejected commit for {} conflicting with an earlier one", round);
                MessageVerdict::Rejected
            }
            TallyOutcome::Added => {
                if round == self.current {
                    self.check_round_progress();
                }
                MessageVerdict::Accepted
            }
            TallyOutcome::Duplicate | TallyOutcome::Frozen => MessageVerdict::Ignored,
        }
    }

    /// Collect a round change targeting a round of the current height. If the local node is the proposer
    /// of the current round and this completes a quorum, a `NewRound` is sent.
    pub fn handle_round_change(&mut self, round_change: RoundChange) -> MessageVerdict {
        let target = round_change.payload().round;
        if target.height != self.current.height || target.round < self.current.round {
            return MessageVerdict::Ignored;
        }

        match self.round_changes.add_round_change(round_change) {
            RoundChangeOutcome::Invalid => {
                log::debug!("Rejected round change targeting {}", target);
                MessageVerdict::Rejected
            }
            RoundChangeOutcome::Duplicate => MessageVerdict::Ignored,
            RoundChangeOutcome::Added => {
                self.try_send_new_round();
                MessageVerdict::Accepted
            }
        }
    }

    /// Process the proposer's justification for starting a round after round 0, and the proposal it
    /// carries.
    ///
    /// The message is valid if:
    /// 1. It is signed by the proposer of its round, who also signed the proposal for the same round.
    /// 2. Its round change certificate holds correct round changes for its round from a quorum.
    /// 3. If any round change carries a prepared certificate, the proposal re-proposes the block of the
    ///    highest-round one.
    /// 4. The proposed block is valid.
    ///
    /// Breaking 1, 3, or 4 gets the message rejected. A certificate that does not justify the round (2)
    /// only gets it ignored: the message is still passed on to peers.
    pub fn handle_new_round(&mut self, new_round: NewRound) -> MessageVerdict {
        let payload = new_round.payload();
        let round = payload.round;
        if round != self.current {
            return MessageVerdict::Ignored;
        }

        let proposal = &payload.proposal;
        let certificate = &payload.round_change_certificate;
        let well_formed = is_proposer(new_round.author(), round, &self.validator_set)
            && proposal.author() == new_round.author()
            && proposal.payload().round == round;
        if !well_formed {
            log::debug!("Rejected new round message for {} not from its proposer", round);
            return MessageVerdict::Rejected;
        }
        if round.round == RoundNumber::init()
            || !certificate.is_correct_for(round, &self.validator_set)
        {
            log::debug!("Ignored new round message for {} with an insufficient certificate", round);
            return MessageVerdict::Ignored;
        }
        let reproposes_highest = certificate
            .highest_prepared_certificate()
            .map_or(true, |prepared| {
                prepared.proposal.payload().block.hash == proposal.payload().block.hash
            });
        if !reproposes_highest {
            log::debug!("Rejected new round message for {} ignoring a prepared block", round);
            return MessageVerdict::Rejected;
        }
        if !self.is_awaiting_proposal() {
            return MessageVerdict::Ignored;
        }
        if !self.block_is_valid(&proposal.payload().block) {
            log::debug!("Rejected new round message for {} with an invalid block", round);
            return MessageVerdict::Rejected;
        }

        let proposal = proposal.clone();
        self.accept_proposal(proposal)
    }

    /// Start the next height if `header` is at least as high as the height being decided. Returns
    /// whether a new height was started.
    pub fn handle_new_chain_head(&mut self, header: BlockHeader) -> bool {
        if header.height < self.current.height {
            return false;
        }
        self.enter_height(header);
        true
    }

    /// Ask for a round change because `round` timed out. Stale expiries, for rounds other than the
    /// current one, are ignored. Returns whether the expiry was acted upon.
    pub fn handle_round_expiry(&mut self, round: ConsensusRoundIdentifier) -> bool {
        if round != self.current {
            return false;
        }

        Event::RoundTimeout(RoundTimeoutEvent {
            timestamp: SystemTime::now(),
            round,
            timeout: self.round_timeouts.timeout(round.round),
        })
        .publish(&self.event_publisher);

        let target = round.next_round();
        self.enter_round(target);

        let round_change = self
            .factory
            .create_round_change(target, self.latest_prepared_certificate.clone());
        Event::RoundChange(RoundChangeEvent {
            timestamp: SystemTime::now(),
            round_change: round_change.clone(),
        })
        .publish(&self.event_publisher);
        self.outbox.push(round_change.into());
        true
    }

    /// Propose a block for round 0 of the current height, if the local node is its proposer and the
    /// block timer for it expired. Returns whether a proposal was made.
    pub fn handle_block_timer_expiry(&mut self, round: ConsensusRoundIdentifier) -> bool {
        if round != self.current
            || round.round != RoundNumber::init()
            || !is_proposer(&self.local_address(), round, &self.validator_set)
            || !self.is_awaiting_proposal()
        {
            return false;
        }

        let block = self.produce_block();
        let proposal = self.factory.create_proposal(round, block);
        Event::Propose(ProposeEvent {
            timestamp: SystemTime::now(),
            proposal: proposal.clone(),
        })
        .publish(&self.event_publisher);
        self.outbox.push(proposal.into());
        true
    }

    /// Reset all per-height state and enter round 0 of the height after `chain_head`.
    fn enter_height(&mut self, chain_head: BlockHeader) {
        let first_round = ConsensusRoundIdentifier::new(chain_head.height + 1, RoundNumber::init());
        self.round_states.clear();
        self.round_changes = RoundChangeManager::new(first_round.height, self.validator_set.clone());
        self.latest_prepared_certificate = None;
        self.new_round_sent = None;
        self.block_timer.cancel();

        let proposal_time = chain_head.timestamp.saturating_add(self.block_period.as_secs());
        self.chain_head = chain_head;
        self.enter_round(first_round);

        if is_proposer(&self.local_address(), first_round, &self.validator_set) {
            let now = Instant::now();
            self.block_timer
                .start(first_round, instant_of_timestamp(proposal_time, now));
        }
    }

    /// Make `round` the current round, freezing the state of the round that was current before.
    fn enter_round(&mut self, round: ConsensusRoundIdentifier) {
        if let Some(previous) = self.round_states.get_mut(&self.current.round) {
            previous.freeze();
        }

        self.current = round;
        self.round_states
            .insert(round.round, RoundState::new(round, self.validator_set.clone()));
        self.round_changes.discard_rounds_below(round.round);
        self.round_timer
            .start(round, Instant::now() + self.round_timeouts.timeout(round.round));

        Event::StartRound(StartRoundEvent {
            timestamp: SystemTime::now(),
            round,
            proposer: select_proposer(round, &self.validator_set),
        })
        .publish(&self.event_publisher);

        self.try_send_new_round();
    }

    /// Accept a validated proposal for the current round, and prepare it unless the local node proposed it.
    fn accept_proposal(&mut self, proposal: Proposal) -> MessageVerdict {
        let digest = proposal.payload().block.hash;
        let proposed_by_me = proposal.author() == &self.local_address();
        let accepted = match self.round_states.get_mut(&self.current.round) {
            Some(state) => state.set_proposal(proposal),
            None => false,
        };
        if !accepted {
            return MessageVerdict::Ignored;
        }

        if !proposed_by_me {
            let prepare = self.factory.create_prepare(self.current, digest);
            Event::Prepare(PrepareEvent {
                timestamp: SystemTime::now(),
                prepare: prepare.clone(),
            })
            .publish(&self.event_publisher);
            self.outbox.push(prepare.into());
        }

        self.check_round_progress();
        MessageVerdict::Accepted
    }

    /// Move the current round to `Prepared` and `Committed` as quorums are reached.
    fn check_round_progress(&mut self) {
        let Some(state) = self.round_states.get_mut(&self.current.round) else {
            return;
        };

        if let Some(digest) = state.try_prepare() {
            self.latest_prepared_certificate = state.prepared_certificate().cloned();
            Event::CollectPreparedCertificate(CollectPreparedCertificateEvent {
                timestamp: SystemTime::now(),
                round: self.current,
                digest,
            })
            .publish(&self.event_publisher);

            let commit_seal = self.factory.create_commit_seal(digest);
            let commit = self.factory.create_commit(self.current, digest, commit_seal);
            Event::Commit(CommitEvent {
                timestamp: SystemTime::now(),
                commit: commit.clone(),
            })
            .publish(&self.event_publisher);
            self.outbox.push(commit.into());
        }

        let sealed_block = self
            .round_states
            .get_mut(&self.current.round)
            .and_then(RoundState::try_commit);
        if let Some(sealed_block) = sealed_block {
            self.commit_block(sealed_block);
        }
    }

    /// Hand a decided block to the chain, and move to the next height if the chain accepted it.
    fn commit_block(&mut self, sealed_block: SealedBlock) {
        let header = sealed_block.block.header.clone();
        let block_hash = sealed_block.block.hash;
        match self.chain.append_block(sealed_block) {
            Ok(()) => {
                Event::CommitBlock(CommitBlockEvent {
                    timestamp: SystemTime::now(),
                    block: block_hash,
                    height: header.height,
                    round: self.current,
                })
                .publish(&self.event_publisher);
                self.handle_new_chain_head(header);
            }
            Err(err) => {
                // The round carries on until it times out.
                log::warn!("Failed to append block decided in {}: {}", self.current, err);
            }
        }
    }

    /// As the proposer of the current round (after round 0), send a `NewRound` once round changes from a
    /// quorum targeting the round were collected.
    fn try_send_new_round(&mut self) {
        let round = self.current;
        if round.round == RoundNumber::init()
            || self.new_round_sent == Some(round)
            || !is_proposer(&self.local_address(), round, &self.validator_set)
            || !self.is_awaiting_proposal()
        {
            return;
        }
        let Some(certificate) = self.round_changes.certificate_for(round.round) else {
            return;
        };

        Event::CollectRoundChangeCertificate(CollectRoundChangeCertificateEvent {
            timestamp: SystemTime::now(),
            round,
            signers: certificate.round_changes.len(),
        })
        .publish(&self.event_publisher);

        // A block that may have been committed by someone in an earlier round must be re-proposed.
        let block = match certificate.highest_prepared_certificate() {
            Some(prepared) => prepared.proposal.payload().block.clone(),
            None => self.produce_block(),
        };
        let proposal = self.factory.create_proposal(round, block);
        let new_round = self.factory.create_new_round(round, certificate, proposal);
        self.new_round_sent = Some(round);

        Event::NewRound(NewRoundEvent {
            timestamp: SystemTime::now(),
            new_round: new_round.clone(),
        })
        .publish(&self.event_publisher);
        self.outbox.push(new_round.into());
    }

    fn produce_block(&mut self) -> Block {
        let ProduceBlockResponse { data } = self
            .chain
            .produce_block(ProduceBlockRequest::new(self.current, &self.chain_head));
        let timestamp = max(
            secs_since_unix_epoch(SystemTime::now()),
            self.chain_head
                .timestamp
                .saturating_add(self.block_period.as_secs()),
        );
        Block::new(self.current.height, self.chain_head.hash(), timestamp, data)
    }

    /// Check that `block` is well-formed, extends the chain head, and is valid according to the chain.
    fn block_is_valid(&mut self, block: &Block) -> bool {
        block.is_correct()
            && block.height() == self.current.height
            && block.header.parent_hash == self.chain_head.hash()
            && block.header.timestamp >= self.chain_head.timestamp
            && matches!(
                self.chain
                    .validate_block(ValidateBlockRequest::new(block, &self.chain_head)),
                ValidateBlockResponse::Valid
            )
    }

    fn is_awaiting_proposal(&self) -> bool {
        self.round_states
            .get(&self.current.round)
            .is_some_and(|state| state.phase() == RoundPhase::AwaitingProposal)
    }
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::SigningKey;
    use rand_core::OsRng;

    use super::*;
    use crate::{
        chain::ChainError,
        ibft::certificates::RoundChangeCertificate,
        types::data_types::{BlockHeight, Data, Datum},
    };

    struct TestChain {
        head: BlockHeader,
    }

    impl Chain for TestChain {
        fn chain_head_header(&self) -> BlockHeader {
            self.head.clone()
        }

        fn produce_block(&mut self, _: ProduceBlockRequest) -> ProduceBlockResponse {
            ProduceBlockResponse {
                data: Data::new(vec![Datum::new(vec![1])]),
            }
        }

        fn validate_block(&mut self, _: ValidateBlockRequest) -> ValidateBlockResponse {
            ValidateBlockResponse::Valid
        }

        fn append_block(&mut self, sealed_block: SealedBlock) -> Result<(), ChainError> {
            self.head = sealed_block.block.header;
            Ok(())
        }
    }

    fn round_id(height: u64, round: u32) -> ConsensusRoundIdentifier {
        ConsensusRoundIdentifier::new(BlockHeight::new(height), RoundNumber::new(round))
    }

    /// A controller for one of four validators that proposes neither round (1, 0) nor round (1, 1),
    /// with factories for all four validators, in validator set order.
    fn setup() -> (IbftController<TestChain>, Vec<MessageFactory>, Arc<ValidatorSet>) {
        let mut csprg = OsRng {};
        let mut keypairs: Vec<Keypair> = (0..4)
            .map(|_| Keypair::new(SigningKey::generate(&mut csprg)))
            .collect();
        keypairs.sort_by_key(|keypair| keypair.public().to_bytes());
        let validator_set: ValidatorSet = keypairs.iter().map(Keypair::public).collect();
        let validator_set = Arc::new(validator_set);

        let proposers = [
            select_proposer(round_id(1, 0), &validator_set),
            select_proposer(round_id(1, 1), &validator_set),
        ];
        let local = keypairs
            .iter()
            .position(|keypair| !proposers.contains(&keypair.public()))
            .unwrap();
        let config = IbftConfiguration {
            keypair: keypairs[local].clone(),
            block_period: Duration::from_secs(0),
            round_timeouts: RoundTimeouts {
                base: Duration::from_secs(3600),
                multiplier: 2.0,
                cap: Duration::from_secs(7200),
            },
        };
        let chain = TestChain {
            head: BlockHeader::genesis(),
        };
        let controller = IbftController::new(config, validator_set.clone(), chain, None);
        let factories = keypairs.into_iter().map(MessageFactory::new).collect();
        (controller, factories, validator_set)
    }

    fn factory_of<'a>(factories: &'a [MessageFactory], key: &VerifyingKey) -> &'a MessageFactory {
        factories
            .iter()
            .find(|factory| &factory.local_address() == key)
            .unwrap()
    }

    fn block(timestamp: u64) -> Block {
        Block::new(
            BlockHeight::new(1),
            BlockHeader::genesis().hash(),
            timestamp,
            Data::new(vec![Datum::new(vec![timestamp as u8])]),
        )
    }

    /// Time round (1, 0) out, leaving the controller in round (1, 1).
    fn move_to_round_one(controller: &mut IbftController<TestChain>) {
        assert!(controller.handle_round_expiry(round_id(1, 0)));
        let _ = controller.take_outbox();
        assert_eq!(controller.current_round(), round_id(1, 1));
    }

    fn awaiting_proposal(controller: &IbftController<TestChain>) -> bool {
        controller
            .round_state(controller.current_round().round)
            .is_some_and(|state| state.phase() == RoundPhase::AwaitingProposal)
    }

    /// Round changes targeting `round` from the first `count` validators that are not the local node.
    fn round_changes(
        controller: &IbftController<TestChain>,
        factories: &[MessageFactory],
        round: ConsensusRoundIdentifier,
        count: usize,
    ) -> Vec<RoundChange> {
        factories
            .iter()
            .filter(|factory| factory.local_address() != controller.local_address())
            .take(count)
            .map(|factory| factory.create_round_change(round, None))
            .collect()
    }

    #[test]
    fn stale_round_expiries_are_ignored() {
        let (mut controller, _, _) = setup();
        move_to_round_one(&mut controller);

        assert!(!controller.handle_round_expiry(round_id(1, 0)));
        assert!(!controller.handle_round_expiry(round_id(1, 5)));
        assert!(controller.take_outbox().is_empty());
        assert_eq!(controller.current_round(), round_id(1, 1));
    }

    #[test]
    fn new_round_from_a_validator_that_is_not_the_proposer_is_rejected() {
        let (mut controller, factories, validator_set) = setup();
        move_to_round_one(&mut controller);
        let round = round_id(1, 1);

        // The proposer of round (1, 0) is not the proposer of round (1, 1).
        let impostor = factory_of(&factories, &select_proposer(round_id(1, 0), &validator_set));
        let certificate = RoundChangeCertificate {
            round_changes: round_changes(&controller, &factories, round, 3),
        };
        let proposal = impostor.create_proposal(round, block(5));
        let new_round = impostor.create_new_round(round, certificate, proposal);

        assert_eq!(controller.handle_new_round(new_round), MessageVerdict::Rejected);
        assert!(awaiting_proposal(&controller));
    }

    #[test]
    fn new_round_with_a_certificate_below_quorum_is_ignored() {
        let (mut controller, factories, validator_set) = setup();
        move_to_round_one(&mut controller);
        let round = round_id(1, 1);

        let proposer = factory_of(&factories, &select_proposer(round, &validator_set));
        let certificate = RoundChangeCertificate {
            round_changes: round_changes(&controller, &factories, round, 2),
        };
        let proposal = proposer.create_proposal(round, block(5));
        let new_round = proposer.create_new_round(round, certificate, proposal);

        assert_eq!(controller.handle_new_round(new_round), MessageVerdict::Ignored);
        assert!(awaiting_proposal(&controller));
        assert!(controller.take_outbox().is_empty());
    }

    #[test]
    fn new_round_must_repropose_the_highest_prepared_block() {
        let (mut controller, factories, validator_set) = setup();
        move_to_round_one(&mut controller);
        let round = round_id(1, 1);

        // Round (1, 0) was prepared by its proposer and two others for the block stamped 3.
        let first_proposer = factory_of(&factories, &select_proposer(round_id(1, 0), &validator_set));
        let prepared_proposal = first_proposer.create_proposal(round_id(1, 0), block(3));
        let prepared_digest = prepared_proposal.payload().block.hash;
        let prepares: Vec<Prepare> = factories
            .iter()
            .filter(|factory| factory.local_address() != first_proposer.local_address())
            .take(2)
            .map(|factory| factory.create_prepare(round_id(1, 0), prepared_digest))
            .collect();
        let prepared_certificate =
            PreparedCertificate::extract(&prepared_proposal, &prepares, &validator_set).unwrap();

        let mut collected = round_changes(&controller, &factories, round, 3);
        let carrier = factory_of(&factories, collected[0].author());
        collected[0] = carrier.create_round_change(round, Some(prepared_certificate));
        let certificate = RoundChangeCertificate {
            round_changes: collected,
        };

        let proposer = factory_of(&factories, &select_proposer(round, &validator_set));
        let fresh = proposer.create_proposal(round, block(5));
        let new_round = proposer.create_new_round(round, certificate.clone(), fresh);
        assert_eq!(controller.handle_new_round(new_round), MessageVerdict::Rejected);
        assert!(awaiting_proposal(&controller));

        let reproposal = proposer.create_proposal(round, block(3));
        let new_round = proposer.create_new_round(round, certificate, reproposal);
        assert_eq!(controller.handle_new_round(new_round), MessageVerdict::Accepted);
        let state = controller.round_state(round.round).unwrap();
        assert_eq!(state.phase(), RoundPhase::Preparing);
        assert_eq!(
            state.proposal().map(|proposal| proposal.payload().block.hash),
            Some(prepared_digest)
        );
    }
}
