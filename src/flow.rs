//! approximate outbound flow-control bookkeeping.
//!
//! The real `h2` crate (unlike the low-level Python `h2` library the original
//! implementation drove by hand) does not expose a connection-wide outbound window getter
//! on its public client API: flow control is handled transparently inside `send_data`/
//! `poll_capacity`. To still give [`crate::Connection::blocked`] an O(1), synchronous
//! "is this connection almost out of outbound window" signal, we keep our own budget,
//! debited when a request's body is handed to `h2` and credited back when that stream
//! finishes (success or failure) — the same HTTP/2 default connection window (65535
//! bytes) the peer starts every connection with, restored the same way a `WINDOW_UPDATE`
//! would restore it in practice for small, quickly-consumed APNs-style bodies.

use core::sync::atomic::{AtomicI64, Ordering};

/// default HTTP/2 connection-level flow-control window (RFC 7540 section 6.9.2).
pub const DEFAULT_CONNECTION_WINDOW: i64 = 65_535;

pub(crate) struct OutboundBudget {
    remaining: AtomicI64,
}

impl OutboundBudget {
    pub(crate) fn new(initial: i64) -> Self {
        Self {
            remaining: AtomicI64::new(initial),
        }
    }

    /// current estimate of remaining outbound window, in bytes. may go negative if more
    /// requests were admitted than the estimate had room for; callers only compare it
    /// against a threshold.
    pub(crate) fn remaining(&self) -> i64 {
        self.remaining.load(Ordering::Acquire)
    }

    pub(crate) fn debit(&self, body_len: usize) {
        self.remaining.fetch_sub(body_len as i64, Ordering::AcqRel);
    }

    pub(crate) fn credit(&self, body_len: usize) {
        self.remaining.fetch_add(body_len as i64, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debit_then_credit_round_trips() {
        let budget = OutboundBudget::new(DEFAULT_CONNECTION_WINDOW);
        budget.debit(5000);
        assert_eq!(budget.remaining(), DEFAULT_CONNECTION_WINDOW - 5000);
        budget.credit(5000);
        assert_eq!(budget.remaining(), DEFAULT_CONNECTION_WINDOW);
    }

    #[test]
    fn can_go_below_threshold() {
        let budget = OutboundBudget::new(6500);
        budget.debit(5000);
        assert!(budget.remaining() <= 6000);
    }
}
