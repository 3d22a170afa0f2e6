//! Subprotocol for deciding blocks, one height at a time.
//!
//! ## Rounds
//!
//! Consensus on the block at a height proceeds in rounds, numbered from 0. Every round has a single
//! proposer, [selected](roles::select_proposer) by rotating through the validator set. A round
//! generally proceeds as follows:
//! 1. The proposer broadcasts a [`Proposal`](messages::Proposal) for a block extending the chain head.
//!    In round 0, this happens once the block period since the chain head's timestamp has elapsed.
//! 2. Validators check the proposal: it must come from the proposer of the round, and the block must be
//!    well-formed, extend the chain head, and be valid according to the [`Chain`](crate::chain::Chain).
//!    If so, they broadcast a [`Prepare`](messages::Prepare) for the block's hash. The proposal itself
//!    counts as the proposer's prepare.
//! 3. Once prepares from a quorum are collected, the round is *prepared*: validators remember the
//!    [`PreparedCertificate`](certificates::PreparedCertificate) and broadcast a
//!    [`Commit`](messages::Commit) carrying a commit seal, i.e., a signature over the block hash.
//! 4. Once commits from a quorum are collected, the block is sealed with their commit seals and
//!    appended to the chain, and consensus starts on the next height.
//!
//! ## Round changes
//!
//! If a round does not commit a block before its round timer expires, validators move to the next
//! round and broadcast a [`RoundChange`](messages::RoundChange) for it, carrying the latest prepared
//! certificate they hold, if any. Round timeouts grow exponentially with the round number.
//!
//! The proposer of the new round waits for round changes from a quorum, and then broadcasts a
//! [`NewRound`](messages::NewRound) with the collected
//! [`RoundChangeCertificate`](certificates::RoundChangeCertificate) and a proposal. If any of the round
//! changes carries a prepared certificate, the proposal must re-propose the block of the highest-round
//! one, since that block may have been committed by some validator. This is what keeps conflicting
//! blocks from being committed at the same height.
//!
//! ## Code organization
//!
//! [`implementation`] holds the [`IbftController`](implementation::IbftController), which owns the
//! per-height state and implements the steps above. The state of a single round lives in
//! [`round_state`], and round changes for the current height are collected in [`round_change`].

pub mod certificates;

pub(crate) mod factory;

pub mod implementation;

pub mod messages;

pub mod roles;

pub mod round_change;

pub mod round_state;
