//! Epoch schedule
//!
//! Epoch boundaries are `start + k * duration`. The schedule answers every
//! time-gated question the treasury asks; the caller supplies `now`.

use serde::{Deserialize, Serialize};

use crate::error::{TreasuryError, TreasuryResult};
use crate::value_objects::Timestamp;

/// Seconds in a day
pub const SECONDS_PER_DAY: u64 = 86_400;

/// Default epoch length (90 days)
pub const DEFAULT_EPOCH_DURATION: u64 = 90 * SECONDS_PER_DAY;

/// Default closing margin of the pre-inform window (3 days)
pub const DEFAULT_PRE_INFORM_MARGIN: u64 = 3 * SECONDS_PER_DAY;

/// Fixed epoch grid plus the pre-inform closing margin.
///
/// # Invariants
/// - `duration > 0`
/// - `pre_inform_margin < duration`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochSchedule {
    start: Timestamp,
    duration: u64,
    pre_inform_margin: u64,
}

impl EpochSchedule {
    /// Create a schedule
    ///
    /// # Errors
    /// Returns `TreasuryError::InvalidTerms` if the duration is zero or the
    /// margin swallows the whole epoch
    pub fn new(start: Timestamp, duration: u64, pre_inform_margin: u64) -> TreasuryResult<Self> {
        if duration == 0 {
            return Err(TreasuryError::InvalidTerms("Epoch duration must be positive".to_string()));
        }
        if pre_inform_margin >= duration {
            return Err(TreasuryError::InvalidTerms(format!(
                "Pre-inform margin {}s must be shorter than the epoch ({}s)",
                pre_inform_margin, duration
            )));
        }
        Ok(Self { start, duration, pre_inform_margin })
    }

    /// Schedule with the default 3-day pre-inform margin
    pub fn with_default_margin(start: Timestamp, duration: u64) -> TreasuryResult<Self> {
        Self::new(start, duration, DEFAULT_PRE_INFORM_MARGIN)
    }

    /// First epoch boundary
    pub fn start(&self) -> Timestamp {
        self.start
    }

    /// Epoch length in seconds
    pub fn duration(&self) -> u64 {
        self.duration
    }

    /// Closing margin of the pre-inform window in seconds
    pub fn pre_inform_margin(&self) -> u64 {
        self.pre_inform_margin
    }

    /// Largest boundary `<= now`; the first boundary while `now` precedes it
    pub fn current_epoch_start(&self, now: Timestamp) -> Timestamp {
        if now <= self.start {
            return self.start;
        }
        let elapsed = now - self.start;
        self.start + (elapsed - elapsed % self.duration)
    }

    /// Smallest boundary `> now`
    pub fn next_epoch_start(&self, now: Timestamp) -> Timestamp {
        if now < self.start {
            return self.start;
        }
        self.current_epoch_start(now) + self.duration
    }

    /// Seconds until the next boundary
    pub fn period_to_next_epoch(&self, now: Timestamp) -> u64 {
        self.next_epoch_start(now) - now
    }

    /// Pre-inform is open until `pre_inform_margin` before the next boundary
    pub fn is_in_pre_inform_window(&self, now: Timestamp) -> bool {
        self.period_to_next_epoch(now) > self.pre_inform_margin
    }

    /// Harvest is due one full epoch after the last harvest watermark
    pub fn is_harvest_due(&self, now: Timestamp, last_harvest: Timestamp) -> bool {
        now >= last_harvest.saturating_add(self.duration)
    }

    /// Zero-based index of the epoch containing `now`
    pub fn epoch_index(&self, now: Timestamp) -> u64 {
        (self.current_epoch_start(now) - self.start) / self.duration
    }
}

// =============================================================================
// Tests
// =============================================================================
