//! Per-connection identifier tracking and retransmission bookkeeping.
//!
//! Each connection owns one [`IdTracker`] with 256 slots, one per wire
//! identifier. A slot binds an identifier to a pending transaction and
//! carries everything needed to match and verify the reply: the request
//! code, the post-signing authenticator, and the retry clock.

use std::time::{Duration, Instant};

use crate::core::config::RetryPolicy;
use crate::core::constants::{AUTHENTICATOR_LEN, ID_SPACE};
use crate::core::error::TrackError;
use crate::core::types::TxnId;
use crate::packet::PacketCode;

/// One allocated identifier slot.
#[derive(Debug, Clone)]
pub struct TrackEntry {
    /// The transaction bound to this identifier.
    pub txn: TxnId,
    /// Request packet code.
    pub code: PacketCode,
    /// Request authenticator as sent on the wire; reply verification
    /// material.
    pub authenticator: [u8; AUTHENTICATOR_LEN],
    /// When the first transmission went out; `None` until then.
    pub start: Option<Instant>,
    /// Current retransmission interval.
    pub rt: Duration,
    /// Transmissions so far.
    pub count: u32,
}

/// Decision from the retry timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retransmit and re-arm the timer with this interval.
    Retry(Duration),
    /// Give up: the policy's count or duration limit was reached.
    Expired,
}

/// Identifier allocation for one connection.
#[derive(Debug)]
pub struct IdTracker {
    slots: Vec<Option<TrackEntry>>,
    free: usize,
    cursor: u8,
}

impl IdTracker {
    /// Create a tracker with all 256 identifiers free.
    pub fn new() -> Self {
        Self {
            slots: (0..ID_SPACE).map(|_| None).collect(),
            free: ID_SPACE,
            // Allocation starts at a random identifier.
            cursor: rand::random(),
        }
    }

    /// Number of free identifiers.
    pub fn free_slots(&self) -> usize {
        self.free
    }

    /// Bind a free identifier to a transaction.
    pub fn alloc(&mut self, txn: TxnId, code: PacketCode) -> Result<u8, TrackError> {
        if self.free == 0 {
            return Err(TrackError::IdSpaceExhausted);
        }
        for offset in 0..ID_SPACE {
            let id = self.cursor.wrapping_add(offset as u8);
            if self.slots[id as usize].is_none() {
                self.slots[id as usize] = Some(TrackEntry {
                    txn,
                    code,
                    authenticator: [0u8; AUTHENTICATOR_LEN],
                    start: None,
                    rt: Duration::ZERO,
                    count: 0,
                });
                self.cursor = id.wrapping_add(1);
                self.free -= 1;
                return Ok(id);
            }
        }
        Err(TrackError::IdSpaceExhausted)
    }

    /// Look up the entry bound to a wire identifier.
    pub fn find(&self, id: u8) -> Option<&TrackEntry> {
        self.slots[id as usize].as_ref()
    }

    /// Release an identifier. Returns the entry if one was bound.
    pub fn free_entry(&mut self, id: u8) -> Option<TrackEntry> {
        let entry = self.slots[id as usize].take();
        if entry.is_some() {
            self.free += 1;
        }
        entry
    }

    /// Start the retry clock for a slot after its first transmission.
    ///
    /// Records the signed authenticator and send time; returns the initial
    /// retransmission interval.
    pub fn start(
        &mut self,
        id: u8,
        authenticator: [u8; AUTHENTICATOR_LEN],
        now: Instant,
        policy: &RetryPolicy,
    ) -> Duration {
        if let Some(entry) = self.slots[id as usize].as_mut() {
            entry.authenticator = authenticator;
            entry.start = Some(now);
            entry.rt = policy.irt;
            entry.count = 1;
        }
        policy.irt
    }

    /// Decide between retransmitting and giving up when the retry timer
    /// fires.
    pub fn retry_or_expire(
        &mut self,
        id: u8,
        policy: &RetryPolicy,
        now: Instant,
    ) -> RetryDecision {
        let Some(entry) = self.slots[id as usize].as_mut() else {
            return RetryDecision::Expired;
        };
        if policy.mrc != 0 && entry.count >= policy.mrc {
            return RetryDecision::Expired;
        }
        if let Some(start) = entry.start {
            if !policy.mrd.is_zero() && now.duration_since(start) >= policy.mrd {
                return RetryDecision::Expired;
            }
        }
        entry.count += 1;
        entry.rt = (entry.rt * 2).min(policy.mrt);
        RetryDecision::Retry(entry.rt)
    }
}

impl Default for IdTracker {
    fn default() -> Self {
        Self::new()
    }
}
