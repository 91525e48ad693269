//! Snowflake-style identifier generation.
//!
//! Ids are 63-bit positive integers: 41 bits of milliseconds since a fixed
//! epoch, 10 bits of node id, 12 bits of per-millisecond sequence. They are
//! time-ordered and strictly monotonic within a process; monotonicity does
//! not hold across processes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// 2024-01-01T00:00:00Z, milliseconds since the Unix epoch.
const EPOCH_MS: u64 = 1_704_067_200_000;

const NODE_BITS: u64 = 10;
const SEQUENCE_BITS: u64 = 12;
const NODE_MAX: u64 = (1 << NODE_BITS) - 1;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;

/// Process-scoped generator of time-ordered 63-bit ids.
///
/// Construct once at coordinator build time and share by `Arc`; every call
/// site draws from the same monotonic sequence.
#[derive(Debug)]
pub struct IdGenerator {
    node_id: u64,
    // Packed as (milliseconds << SEQUENCE_BITS) | sequence.
    state: AtomicU64,
}

impl IdGenerator {
    /// Creates a generator for `node_id` (wrapped into 10 bits).
    #[must_use]
    pub fn new(node_id: u64) -> Self {
        Self {
            node_id: node_id & NODE_MAX,
            state: AtomicU64::new(0),
        }
    }

    /// Returns the next id, strictly greater than every id this generator
    /// has produced before.
    pub fn next_id(&self) -> i64 {
        loop {
            let observed = self.state.load(Ordering::Acquire);
            let now = Self::current_millis();
            let observed_ms = observed >> SEQUENCE_BITS;

            let proposed = if now > observed_ms {
                now << SEQUENCE_BITS
            } else {
                // Clock stalled or ran backwards; keep the observed
                // millisecond and bump the sequence, borrowing from the
                // timestamp when the sequence overflows.
                let sequence = (observed & SEQUENCE_MASK) + 1;
                if sequence > SEQUENCE_MASK {
                    (observed_ms + 1) << SEQUENCE_BITS
                } else {
                    (observed_ms << SEQUENCE_BITS) | sequence
                }
            };

            if self
                .state
                .compare_exchange(observed, proposed, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                let millis = proposed >> SEQUENCE_BITS;
                let sequence = proposed & SEQUENCE_MASK;
                let id =
                    (millis << (NODE_BITS + SEQUENCE_BITS)) | (self.node_id << SEQUENCE_BITS) | sequence;
                // Keep the result in the positive i64 range.
                #[allow(clippy::cast_possible_wrap)]
                return (id & (i64::MAX as u64)) as i64;
            }
        }
    }

    fn current_millis() -> u64 {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        #[allow(clippy::cast_possible_truncation)]
        let unix_ms = since_epoch.as_millis() as u64;
        unix_ms.saturating_sub(EPOCH_MS)
    }
}
