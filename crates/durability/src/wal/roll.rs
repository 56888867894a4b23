//! Segment roll policies
//!
//! The log does not decide on its own when to start a new segment. Before
//! each append it asks a [`RollPolicy`], and rolls first if told to.

use keeperlog_core::TxnHeader;

/// What the current tail segment holds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentStats {
    /// zxid the segment is named after
    pub first_zxid: u64,
    /// Records appended to it
    pub records: u64,
    /// Bytes written, file header included
    pub bytes: u64,
}

/// Decides when the log rolls to a new segment
pub trait RollPolicy: Send + Sync {
    /// Called before appending `next` to the tail described by `tail`.
    fn should_roll(&self, tail: &SegmentStats, next: &TxnHeader) -> bool;
}

/// Never roll; one segment per process run
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverRoll;

impl RollPolicy for NeverRoll {
    fn should_roll(&self, _tail: &SegmentStats, _next: &TxnHeader) -> bool {
        false
    }
}

/// Roll after every `n` records
#[derive(Debug, Clone, Copy)]
pub struct RollEveryN(pub u64);

impl RollPolicy for RollEveryN {
    fn should_roll(&self, tail: &SegmentStats, _next: &TxnHeader) -> bool {
        self.0 > 0 && tail.records >= self.0
    }
}

/// Roll once the tail reaches `bytes`
#[derive(Debug, Clone, Copy)]
pub struct RollAtSize(pub u64);

impl RollPolicy for RollAtSize {
    fn should_roll(&self, tail: &SegmentStats, _next: &TxnHeader) -> bool {
        tail.bytes >= self.0
    }
}
