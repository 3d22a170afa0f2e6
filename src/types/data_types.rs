/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! "Inert" data types that are sent around and inspected, but have no active behavior.
//!
//! These types follow the newtype pattern, and the API for using them is defined in this module.

use std::{
    cmp::Ordering,
    fmt::{self, Debug, Display, Formatter},
    ops::{Add, AddAssign, SubAssign},
};

use borsh::{BorshDeserialize, BorshSerialize};

/// Height of a block in the blockchain, i.e., the chain position that a consensus instance decides.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct BlockHeight(u64);

impl BlockHeight {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }

    pub fn to_le_bytes(&self) -> [u8; 8] {
        self.0.to_le_bytes()
    }
}

impl Display for BlockHeight {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Add<u64> for BlockHeight {
    type Output = BlockHeight;

    fn add(self, rhs: u64) -> Self::Output {
        BlockHeight::new(self.0.add(rhs))
    }
}

/// An attempt, within a height, to reach agreement on a block.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct RoundNumber(u32);

impl RoundNumber {
    pub const fn new(int: u32) -> Self {
        Self(int)
    }

    pub const fn init() -> Self {
        Self(0)
    }

    pub const fn int(&self) -> u32 {
        self.0
    }
}

impl Display for RoundNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Add<u32> for RoundNumber {
    type Output = RoundNumber;

    fn add(self, rhs: u32) -> Self::Output {
        RoundNumber(self.0.saturating_add(rhs))
    }
}

/// Identifies exactly one consensus instance: a `round` of agreement on the block at `height`.
///
/// ## Ordering
///
/// Identifiers are totally ordered by `height` first and `round` second, so every round of a height
/// precedes every round of the next height.
#[derive(Clone, Copy, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct ConsensusRoundIdentifier {
    pub height: BlockHeight,
    pub round: RoundNumber,
}

impl ConsensusRoundIdentifier {
    pub const fn new(height: BlockHeight, round: RoundNumber) -> Self {
        Self { height, round }
    }

    /// The identifier of the next round at the same height.
    pub fn next_round(&self) -> Self {
        Self::new(self.height, self.round + 1)
    }

    /// The identifier of round 0 at the next height.
    pub fn next_height(&self) -> Self {
        Self::new(self.height + 1, RoundNumber::init())
    }
}

impl PartialOrd for ConsensusRoundIdentifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ConsensusRoundIdentifier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.height
            .cmp(&other.height)
            .then_with(|| self.round.cmp(&other.round))
    }
}

impl Display for ConsensusRoundIdentifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.height, self.round)
    }
}

impl Debug for ConsensusRoundIdentifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

/// A SHA-256 hash. Used to identify blocks and the contents of signed payloads.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize)]
pub struct CryptoHash([u8; 32]);

impl CryptoHash {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }
}

impl Display for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Debug for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Data stored in a [block][crate::types::block::Block].
#[derive(Clone, PartialEq, Eq, Hash, Default, BorshDeserialize, BorshSerialize)]
pub struct Data(Vec<Datum>);

impl Data {
    pub fn new(datum_vec: Vec<Datum>) -> Self {
        Self(datum_vec)
    }

    pub const fn vec(&self) -> &Vec<Datum> {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Datum> {
        self.0.iter()
    }
}

/// Single datum stored in a block's [`Data`].
#[derive(Clone, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct Datum(Vec<u8>);

impl Datum {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> &Vec<u8> {
        &self.0
    }
}

/// Signature represented in bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct SignatureBytes([u8; 64]);

impl SignatureBytes {
    pub const fn new(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 64] {
        self.0
    }
}

impl Debug for SignatureBytes {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0[..8].fmt(f)
    }
}

/// Size of a buffer (in bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct BufferSize(u64);

impl BufferSize {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl AddAssign<u64> for BufferSize {
    fn add_assign(&mut self, rhs: u64) {
        self.0.add_assign(rhs)
    }
}

impl SubAssign<u64> for BufferSize {
    fn sub_assign(&mut self, rhs: u64) {
        self.0 = self.0.saturating_sub(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_id(height: u64, round: u32) -> ConsensusRoundIdentifier {
        ConsensusRoundIdentifier::new(BlockHeight::new(height), RoundNumber::new(round))
    }

    #[test]
    fn round_identifiers_order_by_height_then_round() {
        assert!(round_id(1, 9) < round_id(2, 0));
        assert!(round_id(2, 0) < round_id(2, 1));
        assert_eq!(round_id(3, 4), round_id(3, 4));

        let mut ids = vec![round_id(2, 1), round_id(1, 5), round_id(2, 0), round_id(1, 0)];
        ids.sort();
        assert_eq!(
            ids,
            vec![round_id(1, 0), round_id(1, 5), round_id(2, 0), round_id(2, 1)]
        );
    }

    #[test]
    fn next_round_and_next_height() {
        assert_eq!(round_id(4, 2).next_round(), round_id(4, 3));
        assert_eq!(round_id(4, 2).next_height(), round_id(5, 0));
    }
}
