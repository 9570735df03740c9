//! Lock-free link counters.
//!
//! Counters are bumped from completion handlers, which may run concurrently
//! with each other and with teardown. Every update is a single relaxed
//! fetch-add; readers take a [`LinkCounterSnapshot`].

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter snapshot returned by [`LinkCounters::snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LinkCounterSnapshot {
    /// Inbound completions handled, whatever their status
    pub inbound_completions: u64,
    /// Inbound completions that ended with a non-success status
    pub inbound_errors: u64,
    /// State reports decoded and published
    pub reports_decoded: u64,
    /// Reports with a foreign tag
    pub reports_ignored: u64,
    /// Outbound transfers dispatched
    pub outbound_accepted: u64,
    /// Stop commands folded into a pending resend
    pub outbound_coalesced: u64,
    /// Commands discarded because the slot was busy
    pub outbound_dropped: u64,
    /// Commands refused (inactive link or transport failure)
    pub outbound_rejected: u64,
    /// Automatic stop resends issued from the completion handler
    pub stop_resends: u64,
    /// Completions synthesized at teardown for unresponsive transfers
    pub forced_cancellations: u64,
}

/// Atomic counters for one link.
#[derive(Debug, Default)]
pub struct LinkCounters {
    inbound_completions: AtomicU64,
    inbound_errors: AtomicU64,
    reports_decoded: AtomicU64,
    reports_ignored: AtomicU64,
    outbound_accepted: AtomicU64,
    outbound_coalesced: AtomicU64,
    outbound_dropped: AtomicU64,
    outbound_rejected: AtomicU64,
    stop_resends: AtomicU64,
    forced_cancellations: AtomicU64,
}

impl LinkCounters {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inbound_completions: AtomicU64::new(0),
            inbound_errors: AtomicU64::new(0),
            reports_decoded: AtomicU64::new(0),
            reports_ignored: AtomicU64::new(0),
            outbound_accepted: AtomicU64::new(0),
            outbound_coalesced: AtomicU64::new(0),
            outbound_dropped: AtomicU64::new(0),
            outbound_rejected: AtomicU64::new(0),
            stop_resends: AtomicU64::new(0),
            forced_cancellations: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn inc_inbound_completion(&self) {
        self.inbound_completions.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_inbound_error(&self) {
        self.inbound_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_report_decoded(&self) {
        self.reports_decoded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_report_ignored(&self) {
        self.reports_ignored.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_outbound_accepted(&self) {
        self.outbound_accepted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_outbound_coalesced(&self) {
        self.outbound_coalesced.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_outbound_dropped(&self) {
        self.outbound_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_outbound_rejected(&self) {
        self.outbound_rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_stop_resend(&self) {
        self.stop_resends.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_forced_cancellations_by(&self, amount: u64) {
        self.forced_cancellations.fetch_add(amount, Ordering::Relaxed);
    }

    /// Read every counter.
    ///
    /// Values are individually exact but not captured atomically as a set.
    #[must_use]
    pub fn snapshot(&self) -> LinkCounterSnapshot {
        LinkCounterSnapshot {
            inbound_completions: self.inbound_completions.load(Ordering::Relaxed),
            inbound_errors: self.inbound_errors.load(Ordering::Relaxed),
            reports_decoded: self.reports_decoded.load(Ordering::Relaxed),
            reports_ignored: self.reports_ignored.load(Ordering::Relaxed),
            outbound_accepted: self.outbound_accepted.load(Ordering::Relaxed),
            outbound_coalesced: self.outbound_coalesced.load(Ordering::Relaxed),
            outbound_dropped: self.outbound_dropped.load(Ordering::Relaxed),
            outbound_rejected: self.outbound_rejected.load(Ordering::Relaxed),
            stop_resends: self.stop_resends.load(Ordering::Relaxed),
            forced_cancellations: self.forced_cancellations.load(Ordering::Relaxed),
        }
    }
}
