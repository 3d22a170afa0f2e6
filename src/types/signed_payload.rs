/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Message bodies bundled with their author's identity and signature.

use std::io::{self, Write};

use borsh::BorshSerialize;
use ed25519_dalek::VerifyingKey;

use super::{
    block::borsh_bytes,
    crypto_primitives::{hash_bytes, verify_signature, Keypair},
    data_types::{CryptoHash, SignatureBytes},
};

/// Data types that contain: 1. A message, and 2. A digital signature over said message whose
/// correctness can be verified against a `VerifyingKey`.
pub(crate) trait SignedMessage {
    /// Get the bytes that are passed as input into the signing function to form the signature
    /// of the `SignedMessage`.
    fn message_bytes(&self) -> Vec<u8>;

    /// Get the signature of the `SignedMessage`.
    fn signature_bytes(&self) -> SignatureBytes;

    /// Verify that `signature_bytes` is a signature created by `verifying_key` over `message_bytes`.
    fn is_correct(&self, verifying_key: &VerifyingKey) -> bool {
        verify_signature(verifying_key, &self.message_bytes(), &self.signature_bytes())
    }
}

/// A message body `T` signed by its `author`.
///
/// The signature is over the Borsh encoding of `T`. A `SignedPayload` can only be created by signing a
/// payload with a keypair, or through [`from_parts`](Self::from_parts), which checks the signature,
/// so every value of this type carries a signature that verifies against its author.
///
/// Two `SignedPayload`s are equal if they have the same body, author, and signature.
#[derive(Clone, PartialEq, Eq)]
pub struct SignedPayload<T> {
    payload: T,
    author: VerifyingKey,
    signature: SignatureBytes,
}

impl<T: BorshSerialize> SignedPayload<T> {
    /// Sign `payload` with `keypair`.
    pub(crate) fn sign(keypair: &Keypair, payload: T) -> Self {
        let signature = keypair.sign(&borsh_bytes(&payload));
        Self {
            payload,
            author: keypair.public(),
            signature,
        }
    }

    /// Assemble a `SignedPayload` from a body, the identity of its claimed author, and a signature,
    /// e.g., after decoding them from the wire.
    ///
    /// # Errors
    ///
    /// Returns [`SignedPayloadError::InvalidSignature`] if `signature` is not a signature made by
    /// `author` over `payload`.
    pub fn from_parts(
        payload: T,
        author: VerifyingKey,
        signature: SignatureBytes,
    ) -> Result<Self, SignedPayloadError> {
        let signed_payload = Self {
            payload,
            author,
            signature,
        };
        if signed_payload.is_correct(&author) {
            Ok(signed_payload)
        } else {
            Err(SignedPayloadError::InvalidSignature)
        }
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn author(&self) -> &VerifyingKey {
        &self.author
    }

    pub fn signature(&self) -> SignatureBytes {
        self.signature
    }

    /// The SHA-256 hash of the signed body. Two payloads with the same author and the same content hash
    /// are the same message.
    pub fn content_hash(&self) -> CryptoHash {
        hash_bytes(&self.message_bytes())
    }
}

impl<T: BorshSerialize> SignedMessage for SignedPayload<T> {
    fn message_bytes(&self) -> Vec<u8> {
        borsh_bytes(&self.payload)
    }

    fn signature_bytes(&self) -> SignatureBytes {
        self.signature
    }
}

// Signed payloads are nested inside other payloads (e.g., a `RoundChange` carrying a prepared
// certificate), so the outer signature must also cover the inner authors and signatures.
impl<T: BorshSerialize> BorshSerialize for SignedPayload<T> {
    fn serialize<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.payload.serialize(writer)?;
        self.author.to_bytes().serialize(writer)?;
        self.signature.serialize(writer)
    }
}

/// The ways [`SignedPayload::from_parts`] can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignedPayloadError {
    /// The signature does not verify against the claimed author.
    InvalidSignature,
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::SigningKey;
    use rand_core::OsRng;

    use super::*;
    use crate::types::data_types::{BlockHeight, ConsensusRoundIdentifier, RoundNumber};

    #[test]
    fn from_parts_rejects_signatures_by_someone_else() {
        let mut csprg = OsRng {};
        let alice = Keypair::new(SigningKey::generate(&mut csprg));
        let bob = Keypair::new(SigningKey::generate(&mut csprg));
        let round = ConsensusRoundIdentifier::new(BlockHeight::new(1), RoundNumber::new(0));

        let signed = SignedPayload::sign(&alice, round);
        assert!(SignedPayload::from_parts(round, alice.public(), signed.signature()).is_ok());
        assert_eq!(
            SignedPayload::from_parts(round, bob.public(), signed.signature()).err(),
            Some(SignedPayloadError::InvalidSignature)
        );

        let other_round = round.next_round();
        assert!(SignedPayload::from_parts(other_round, alice.public(), signed.signature()).is_err());
    }

    #[test]
    fn equal_bodies_from_one_author_are_equal() {
        let mut csprg = OsRng {};
        let alice = Keypair::new(SigningKey::generate(&mut csprg));
        let round = ConsensusRoundIdentifier::new(BlockHeight::new(1), RoundNumber::new(0));

        let first = SignedPayload::sign(&alice, round);
        let second = SignedPayload::sign(&alice, round);
        assert!(first == second);
        assert_eq!(first.content_hash(), second.content_hash());
    }
}
