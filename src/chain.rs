/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`Chain`] trait, through which the consensus engine reaches the blockchain it extends.
//!
//! IBFT-rs does not build, execute, or store blocks. It asks the user's `Chain` implementation to
//! [produce](Chain::produce_block) the contents of a block when the local validator proposes,
//! to [validate](Chain::validate_block) blocks proposed by others, and to
//! [append](Chain::append_block) blocks once consensus decides them.
//!
//! ## Determinism
//!
//! `validate_block` must give the same answer on every honest replica for the same block and the
//! same chain head. Otherwise honest replicas may fail to reach a quorum of prepares.

use std::fmt::{self, Display, Formatter};

use crate::types::{
    block::{Block, BlockHeader, SealedBlock},
    data_types::{ConsensusRoundIdentifier, Data},
};

pub trait Chain: Send {
    /// The header of the latest block in the chain. Consensus runs for the height after it.
    fn chain_head_header(&self) -> BlockHeader;

    /// Called when the local validator is the proposer of `request.round()` and has to propose a new
    /// block extending `request.parent()`.
    fn produce_block(&mut self, request: ProduceBlockRequest) -> ProduceBlockResponse;

    /// Called when a proposal is received, to check that the proposed block may extend the chain.
    fn validate_block(&mut self, request: ValidateBlockRequest) -> ValidateBlockResponse;

    /// Called when consensus decides `sealed_block`. The block extends the current chain head.
    fn append_block(&mut self, sealed_block: SealedBlock) -> Result<(), ChainError>;
}

pub struct ProduceBlockRequest<'a> {
    round: ConsensusRoundIdentifier,
    parent: &'a BlockHeader,
}

impl<'a> ProduceBlockRequest<'a> {
    pub(crate) fn new(round: ConsensusRoundIdentifier, parent: &'a BlockHeader) -> Self {
        Self { round, parent }
    }

    pub fn round(&self) -> ConsensusRoundIdentifier {
        self.round
    }

    pub fn parent(&self) -> &BlockHeader {
        self.parent
    }
}

pub struct ProduceBlockResponse {
    pub data: Data,
}

pub struct ValidateBlockRequest<'a> {
    block: &'a Block,
    parent: &'a BlockHeader,
}

impl<'a> ValidateBlockRequest<'a> {
    pub(crate) fn new(block: &'a Block, parent: &'a BlockHeader) -> Self {
        Self { block, parent }
    }

    pub fn block(&self) -> &Block {
        self.block
    }

    pub fn parent(&self) -> &BlockHeader {
        self.parent
    }
}

pub enum ValidateBlockResponse {
    Valid,
    Invalid,
}

/// The ways [`Chain::append_block`] can fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// The sealed block does not extend the chain head.
    NotNextBlock { head: BlockHeader },

    /// The implementation could not persist the block.
    Storage(String),
}

impl Display for ChainError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ChainError::NotNextBlock { head } => {
                write!(f, "block does not extend the chain head at height {}", head.height)
            }
            ChainError::Storage(reason) => write!(f, "failed to store block: {}", reason),
        }
    }
}
