/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the block types that consensus decides on.

use borsh::{BorshDeserialize, BorshSerialize};
use ed25519_dalek::VerifyingKey;

use super::{
    crypto_primitives::{hash_bytes, verify_signature},
    data_types::{BlockHeight, CryptoHash, Data, RoundNumber, SignatureBytes},
};

/// The fields of a block that its hash commits to.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct BlockHeader {
    pub height: BlockHeight,
    pub parent_hash: CryptoHash,
    /// Seconds since the Unix Epoch.
    pub timestamp: u64,
    pub data_hash: CryptoHash,
}

impl BlockHeader {
    /// Compute the hash of the block that has this header.
    pub fn hash(&self) -> CryptoHash {
        hash_bytes(&borsh_bytes(self))
    }

    /// The header of the first block in the chain, which is not decided by consensus.
    pub fn genesis() -> BlockHeader {
        BlockHeader {
            height: BlockHeight::new(0),
            parent_hash: CryptoHash::new([0u8; 32]),
            timestamp: 0,
            data_hash: hash_bytes(&[]),
        }
    }
}

#[derive(Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub hash: CryptoHash,
    pub data: Data,
}

impl Block {
    /// Create a block at `height` extending the block with `parent_hash`, computing its data hash and its
    /// hash.
    pub fn new(height: BlockHeight, parent_hash: CryptoHash, timestamp: u64, data: Data) -> Block {
        let header = BlockHeader {
            height,
            parent_hash,
            timestamp,
            data_hash: hash_bytes(&borsh_bytes(&data)),
        };
        Block {
            hash: header.hash(),
            header,
            data,
        }
    }

    pub fn height(&self) -> BlockHeight {
        self.header.height
    }

    /// Checks if `hash` and `data_hash` are consistent with the contents of the block.
    pub fn is_correct(&self) -> bool {
        self.hash == self.header.hash()
            && self.header.data_hash == hash_bytes(&borsh_bytes(&self.data))
    }
}

/// A decided block together with the commit seals of the quorum of validators that committed it.
#[derive(Clone)]
pub struct SealedBlock {
    pub block: Block,
    /// The round in which the block was decided.
    pub round: RoundNumber,
    pub commit_seals: Vec<(VerifyingKey, SignatureBytes)>,
}

impl SealedBlock {
    /// Check that every commit seal is a signature over the block's hash made by the validator it is
    /// paired with.
    pub fn seals_are_correct(&self) -> bool {
        self.commit_seals
            .iter()
            .all(|(validator, seal)| verify_signature(validator, &self.block.hash.bytes(), seal))
    }
}

/// Serialize `value` with Borsh.
pub(crate) fn borsh_bytes<T: BorshSerialize>(value: &T) -> Vec<u8> {
    // Safety: writing into a `Vec<u8>` never returns an IO error.
    value
        .try_to_vec()
        .expect("Borsh serialization into a Vec<u8> cannot fail")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::data_types::Datum;

    #[test]
    fn block_hash_commits_to_header_and_data() {
        let parent = BlockHeader::genesis();
        let block = Block::new(
            BlockHeight::new(1),
            parent.hash(),
            100,
            Data::new(vec![Datum::new(vec![1, 2, 3])]),
        );
        assert!(block.is_correct());

        let mut tampered = block.clone();
        tampered.data = Data::new(vec![Datum::new(vec![4])]);
        assert!(!tampered.is_correct());

        let other = Block::new(BlockHeight::new(1), parent.hash(), 101, block.data.clone());
        assert_ne!(block.hash, other.hash);
    }
}
