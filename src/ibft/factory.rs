/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`MessageFactory`], which creates signed messages on behalf of the local validator.

use ed25519_dalek::VerifyingKey;

use crate::types::{
    block::Block,
    crypto_primitives::Keypair,
    data_types::{ConsensusRoundIdentifier, CryptoHash, SignatureBytes},
    signed_payload::SignedPayload,
};

use super::{
    certificates::{PreparedCertificate, RoundChangeCertificate},
    messages::*,
};

/// Creates messages signed with the local validator's key.
///
/// The signing key is held in memory, so creating a message never fails.
#[derive(Clone)]
pub struct MessageFactory {
    keypair: Keypair,
}

impl MessageFactory {
    pub(crate) fn new(keypair: Keypair) -> MessageFactory {
        MessageFactory { keypair }
    }

    /// The identity every message created by this factory is signed with.
    pub fn local_address(&self) -> VerifyingKey {
        self.keypair.public()
    }

    pub fn create_proposal(&self, round: ConsensusRoundIdentifier, block: Block) -> Proposal {
        SignedPayload::sign(&self.keypair, ProposalPayload { round, block })
    }

    pub fn create_prepare(&self, round: ConsensusRoundIdentifier, digest: CryptoHash) -> Prepare {
        SignedPayload::sign(&self.keypair, PreparePayload { round, digest })
    }

    pub fn create_commit(
        &self,
        round: ConsensusRoundIdentifier,
        digest: CryptoHash,
        commit_seal: SignatureBytes,
    ) -> Commit {
        SignedPayload::sign(
            &self.keypair,
            CommitPayload {
                round,
                digest,
                commit_seal,
            },
        )
    }

    pub fn create_round_change(
        &self,
        round: ConsensusRoundIdentifier,
        prepared_certificate: Option<PreparedCertificate>,
    ) -> RoundChange {
        SignedPayload::sign(
            &self.keypair,
            RoundChangePayload {
                round,
                prepared_certificate,
            },
        )
    }

    pub fn create_new_round(
        &self,
        round: ConsensusRoundIdentifier,
        round_change_certificate: RoundChangeCertificate,
        proposal: Proposal,
    ) -> NewRound {
        SignedPayload::sign(
            &self.keypair,
            NewRoundPayload {
                round,
                round_change_certificate,
                proposal,
            },
        )
    }

    /// Sign the hash of a block to be decided. The seal ends up in the
    /// [`SealedBlock`](crate::types::block::SealedBlock).
    pub fn create_commit_seal(&self, digest: CryptoHash) -> SignatureBytes {
        self.keypair.sign(&digest.bytes())
    }
}
