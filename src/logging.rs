/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The logs defined in this module are printed if the user enabled them via the replica's
//! [configuration](crate::replica::Configuration).
//!
//! IBFT-rs logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
//! printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two values are
//! always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. Round identifiers are printed as two
//! values, the height followed by the round. For example, the following snippet is how a
//! [ReceiveProposal](crate::events::ReceiveProposalEvent) is printed:
//!
//! ```text
//! ReceiveProposal, 1701329264, Id5u7f6, fNGCJyk, 12, 0
//! ```
//!
//! In the snippet:
//! - The third value is the first seven characters of the Base64 encoding of the verifying key of the
//!   peer the proposal was received from.
//! - The fourth value is the first seven characters of the Base64 encoding of the hash of the proposed
//!   block.
//! - The fifth and sixth values are the height and round of the proposal.

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};

use crate::{events::*, ibft::certificates::PreparedCertificate, round_timer::secs_since_unix_epoch};

// Names of each event in PascalCase for printing:
pub const PROPOSE: &str = "Propose";
pub const PREPARE: &str = "Prepare";
pub const COMMIT: &str = "Commit";
pub const ROUND_CHANGE: &str = "RoundChange";
pub const NEW_ROUND: &str = "NewRound";

pub const RECEIVE_PROPOSAL: &str = "ReceiveProposal";
pub const RECEIVE_PREPARE: &str = "ReceivePrepare";
pub const RECEIVE_COMMIT: &str = "ReceiveCommit";
pub const RECEIVE_ROUND_CHANGE: &str = "ReceiveRoundChange";
pub const RECEIVE_NEW_ROUND: &str = "ReceiveNewRound";

pub const START_ROUND: &str = "StartRound";
pub const ROUND_TIMEOUT: &str = "RoundTimeout";
pub const COLLECT_PREPARED_CERTIFICATE: &str = "CollectPreparedCertificate";
pub const COLLECT_ROUND_CHANGE_CERTIFICATE: &str = "CollectRoundChangeCertificate";
pub const COMMIT_BLOCK: &str = "CommitBlock";

pub const RELAY_MESSAGE: &str = "RelayMessage";
pub const BUFFER_MESSAGE: &str = "BufferMessage";
pub const DROP_MESSAGE: &str = "DropMessage";

/// Implemented by event types. Used to get a closure that logs the event.
pub(crate) trait Logger {
    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> Box<dyn Fn(&Self) + Send>;
}

impl Logger for ProposeEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |propose_event: &ProposeEvent| {
            let payload = propose_event.proposal.payload();
            log::info!(
                "{}, {}, {}, {}, {}",
                PROPOSE,
                secs_since_unix_epoch(propose_event.timestamp),
                first_seven_base64_chars(&payload.block.hash.bytes()),
                payload.round.height,
                payload.round.round
            )
        };
        Box::new(logger)
    }
}

impl Logger for PrepareEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |prepare_event: &PrepareEvent| {
            let payload = prepare_event.prepare.payload();
            log::info!(
                "{}, {}, {}, {}, {}",
                PREPARE,
                secs_since_unix_epoch(prepare_event.timestamp),
                first_seven_base64_chars(&payload.digest.bytes()),
                payload.round.height,
                payload.round.round
            )
        };
        Box::new(logger)
    }
}

impl Logger for CommitEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |commit_event: &CommitEvent| {
            let payload = commit_event.commit.payload();
            log::info!(
                "{}, {}, {}, {}, {}",
                COMMIT,
                secs_since_unix_epoch(commit_event.timestamp),
                first_seven_base64_chars(&payload.digest.bytes()),
                payload.round.height,
                payload.round.round
            )
        };
        Box::new(logger)
    }
}

impl Logger for RoundChangeEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |round_change_event: &RoundChangeEvent| {
            let payload = round_change_event.round_change.payload();
            log::info!(
                "{}, {}, {}, {}, {}",
                ROUND_CHANGE,
                secs_since_unix_epoch(round_change_event.timestamp),
                payload.round.height,
                payload.round.round,
                prepared_round_info(payload.prepared_certificate.as_ref())
            )
        };
        Box::new(logger)
    }
}

impl Logger for NewRoundEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |new_round_event: &NewRoundEvent| {
            let payload = new_round_event.new_round.payload();
            log::info!(
                "{}, {}, {}, {}, {}, {}",
                NEW_ROUND,
                secs_since_unix_epoch(new_round_event.timestamp),
                first_seven_base64_chars(&payload.proposal.payload().block.hash.bytes()),
                payload.round.height,
                payload.round.round,
                payload.round_change_certificate.round_changes.len()
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveProposalEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_proposal_event: &ReceiveProposalEvent| {
            let payload = receive_proposal_event.proposal.payload();
            log::info!(
                "{}, {}, {}, {}, {}, {}",
                RECEIVE_PROPOSAL,
                secs_since_unix_epoch(receive_proposal_event.timestamp),
                first_seven_base64_chars(&receive_proposal_event.origin.to_bytes()),
                first_seven_base64_chars(&payload.block.hash.bytes()),
                payload.round.height,
                payload.round.round
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceivePrepareEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_prepare_event: &ReceivePrepareEvent| {
            let prepare = &receive_prepare_event.prepare;
            log::info!(
                "{}, {}, {}, {}, {}, {}, {}",
                RECEIVE_PREPARE,
                secs_since_unix_epoch(receive_prepare_event.timestamp),
                first_seven_base64_chars(&receive_prepare_event.origin.to_bytes()),
                first_seven_base64_chars(&prepare.author().to_bytes()),
                first_seven_base64_chars(&prepare.payload().digest.bytes()),
                prepare.payload().round.height,
                prepare.payload().round.round
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveCommitEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_commit_event: &ReceiveCommitEvent| {
            let commit = &receive_commit_event.commit;
            log::info!(
                "{}, {}, {}, {}, {}, {}, {}",
                RECEIVE_COMMIT,
                secs_since_unix_epoch(receive_commit_event.timestamp),
                first_seven_base64_chars(&receive_commit_event.origin.to_bytes()),
                first_seven_base64_chars(&commit.author().to_bytes()),
                first_seven_base64_chars(&commit.payload().digest.bytes()),
                commit.payload().round.height,
                commit.payload().round.round
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveRoundChangeEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_round_change_event: &ReceiveRoundChangeEvent| {
            let round_change = &receive_round_change_event.round_change;
            log::info!(
                "{}, {}, {}, {}, {}, {}, {}",
                RECEIVE_ROUND_CHANGE,
                secs_since_unix_epoch(receive_round_change_event.timestamp),
                first_seven_base64_chars(&receive_round_change_event.origin.to_bytes()),
                first_seven_base64_chars(&round_change.author().to_bytes()),
                round_change.payload().round.height,
                round_change.payload().round.round,
                prepared_round_info(round_change.payload().prepared_certificate.as_ref())
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveNewRoundEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_new_round_event: &ReceiveNewRoundEvent| {
            let payload = receive_new_round_event.new_round.payload();
            log::info!(
                "{}, {}, {}, {}, {}, {}",
                RECEIVE_NEW_ROUND,
                secs_since_unix_epoch(receive_new_round_event.timestamp),
                first_seven_base64_chars(&receive_new_round_event.origin.to_bytes()),
                first_seven_base64_chars(&payload.proposal.payload().block.hash.bytes()),
                payload.round.height,
                payload.round.round
            )
        };
        Box::new(logger)
    }
}

impl Logger for StartRoundEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |start_round_event: &StartRoundEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                START_ROUND,
                secs_since_unix_epoch(start_round_event.timestamp),
                start_round_event.round.height,
                start_round_event.round.round,
                first_seven_base64_chars(&start_round_event.proposer.to_bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for RoundTimeoutEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |round_timeout_event: &RoundTimeoutEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                ROUND_TIMEOUT,
                secs_since_unix_epoch(round_timeout_event.timestamp),
                round_timeout_event.round.height,
                round_timeout_event.round.round,
                round_timeout_event.timeout.as_millis()
            )
        };
        Box::new(logger)
    }
}

impl Logger for CollectPreparedCertificateEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |collect_pc_event: &CollectPreparedCertificateEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                COLLECT_PREPARED_CERTIFICATE,
                secs_since_unix_epoch(collect_pc_event.timestamp),
                first_seven_base64_chars(&collect_pc_event.digest.bytes()),
                collect_pc_event.round.height,
                collect_pc_event.round.round
            )
        };
        Box::new(logger)
    }
}

impl Logger for CollectRoundChangeCertificateEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |collect_rcc_event: &CollectRoundChangeCertificateEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                COLLECT_ROUND_CHANGE_CERTIFICATE,
                secs_since_unix_epoch(collect_rcc_event.timestamp),
                collect_rcc_event.round.height,
                collect_rcc_event.round.round,
                collect_rcc_event.signers
            )
        };
        Box::new(logger)
    }
}

impl Logger for CommitBlockEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |commit_block_event: &CommitBlockEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                COMMIT_BLOCK,
                secs_since_unix_epoch(commit_block_event.timestamp),
                first_seven_base64_chars(&commit_block_event.block.bytes()),
                commit_block_event.height,
                commit_block_event.round.round
            )
        };
        Box::new(logger)
    }
}

impl Logger for RelayMessageEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |relay_message_event: &RelayMessageEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}, {}, {}",
                RELAY_MESSAGE,
                secs_since_unix_epoch(relay_message_event.timestamp),
                relay_message_event.kind,
                first_seven_base64_chars(&relay_message_event.origin.to_bytes()),
                first_seven_base64_chars(&relay_message_event.author.to_bytes()),
                relay_message_event.round.height,
                relay_message_event.round.round,
                relay_message_event.recipients
            )
        };
        Box::new(logger)
    }
}

impl Logger for BufferMessageEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |buffer_message_event: &BufferMessageEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}, {}",
                BUFFER_MESSAGE,
                secs_since_unix_epoch(buffer_message_event.timestamp),
                buffer_message_event.kind,
                first_seven_base64_chars(&buffer_message_event.origin.to_bytes()),
                first_seven_base64_chars(&buffer_message_event.author.to_bytes()),
                buffer_message_event.round.height,
                buffer_message_event.round.round
            )
        };
        Box::new(logger)
    }
}

impl Logger for DropMessageEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |drop_message_event: &DropMessageEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}, {}, {}",
                DROP_MESSAGE,
                secs_since_unix_epoch(drop_message_event.timestamp),
                drop_message_event.kind,
                first_seven_base64_chars(&drop_message_event.origin.to_bytes()),
                first_seven_base64_chars(&drop_message_event.author.to_bytes()),
                drop_message_event.round.height,
                drop_message_event.round.round,
                drop_message_event.reason
            )
        };
        Box::new(logger)
    }
}

// Get a more readable representation of a bytesequence by base64-encoding it and taking the first 7 characters.
fn first_seven_base64_chars(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}

// The round a round change was prepared in, or "-" if it carries no prepared certificate.
fn prepared_round_info(prepared_certificate: Option<&PreparedCertificate>) -> String {
    match prepared_certificate {
        Some(prepared_certificate) => prepared_certificate.round().round.to_string(),
        None => String::from("-"),
    }
}
