/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Round and block timers.
//!
//! Timers in IBFT-rs are not threads. A [`Timer`] is a deadline tagged with the round it was started
//! for. The algorithm thread waits on its event queue until the earliest pending deadline, and then
//! turns expired timers into round-expiry or block-timer-expiry events. An expiry whose round is no
//! longer the current round is stale and is ignored by the controller.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::types::data_types::{ConsensusRoundIdentifier, RoundNumber};

/// How long each round lasts before the node asks for a round change.
///
/// The timeout of round `r` is `base * multiplier^r`, but never more than `cap`.
#[derive(Clone, Copy, Debug)]
pub struct RoundTimeouts {
    pub base: Duration,
    pub multiplier: f64,
    pub cap: Duration,
}

impl RoundTimeouts {
    pub fn timeout(&self, round: RoundNumber) -> Duration {
        // Exponents beyond this already exceed any reasonable cap.
        let exponent = round.int().min(1024) as i32;
        let secs = self.base.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.cap.as_secs_f64() {
            self.cap
        } else {
            Duration::from_secs_f64(secs.max(0.0))
        }
    }
}

/// A single pending deadline, tagged with the round it belongs to.
#[derive(Default)]
pub(crate) struct Timer {
    pending: Option<(ConsensusRoundIdentifier, Instant)>,
}

impl Timer {
    pub(crate) fn new() -> Timer {
        Timer { pending: None }
    }

    /// Start the timer for `round`, replacing any pending deadline.
    pub(crate) fn start(&mut self, round: ConsensusRoundIdentifier, deadline: Instant) {
        self.pending = Some((round, deadline));
    }

    pub(crate) fn cancel(&mut self) {
        self.pending = None;
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.pending.map(|(_, deadline)| deadline)
    }

    #[cfg(test)]
    pub(crate) fn round(&self) -> Option<ConsensusRoundIdentifier> {
        self.pending.map(|(round, _)| round)
    }

    /// If the deadline has passed at `now`, clear the timer and return the round it was started for.
    pub(crate) fn take_expired(&mut self, now: Instant) -> Option<ConsensusRoundIdentifier> {
        match self.pending {
            Some((round, deadline)) if deadline <= now => {
                self.pending = None;
                Some(round)
            }
            _ => None,
        }
    }
}

/// Convert `timestamp` (seconds since the Unix Epoch) into an `Instant`, given that `now` is the
/// `Instant` corresponding to `SystemTime::now()`. Timestamps in the past map to `now`.
pub(crate) fn instant_of_timestamp(timestamp: u64, now: Instant) -> Instant {
    let target = UNIX_EPOCH + Duration::from_secs(timestamp);
    match target.duration_since(SystemTime::now()) {
        Ok(until_target) => now + until_target,
        Err(_) => now,
    }
}

/// Seconds since the Unix Epoch.
pub(crate) fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}
