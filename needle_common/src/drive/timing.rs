//! Mains timing types shared between interrupt context and the control loop.
//!
//! Interrupt handlers publish an `(id, timestamp)` pair through a
//! [`StampCell`] so a reader never sees an id from one edge with the
//! timestamp of another. Timestamps keep all 64 bits; ages stay exact
//! however long the input has been quiet.

use core::sync::atomic::{AtomicU32, AtomicU64, Ordering, fence};

use serde::{Deserialize, Serialize};

/// One accepted zero-cross edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZeroCrossEvent {
    /// Monotonic microsecond timestamp of the edge.
    pub timestamp_us: u64,
    /// Half-cycle id, strictly increasing by one per accepted edge.
    pub cycle_id: u32,
}

/// A firing request for exactly one half-cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiringCommand {
    /// Delay from the zero-cross to the gate pulse [µs].
    pub delay_us: u32,
    /// Half-cycle this command is valid for.
    pub cycle_id: u32,
}

/// Mains synchronisation as seen by the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainsStatus {
    /// Edges arrive; `half_cycle_us` is the measured (or nominal) period.
    Synced {
        event: ZeroCrossEvent,
        half_cycle_us: u32,
    },
    /// No edge seen yet since boot.
    Waiting,
    /// No accepted edge within the mains-loss timeout.
    Lost,
}

impl MainsStatus {
    #[inline]
    pub const fn event(&self) -> Option<ZeroCrossEvent> {
        match self {
            Self::Synced { event, .. } => Some(*event),
            _ => None,
        }
    }
}

// ─── Stamp Cell ─────────────────────────────────────────────────────

/// Single-writer `(id, timestamp)` cell with odd/even versioning.
///
/// The writer bumps the version to odd, stores both fields and bumps it to
/// even. Readers retry until they see the same even version before and
/// after the read. The writer must not be preempted by a reader of the
/// same cell (interrupt writes, loop reads).
#[derive(Debug, Default)]
pub struct StampCell {
    version: AtomicU32,
    id: AtomicU32,
    timestamp_us: AtomicU64,
}

impl StampCell {
    pub const fn new() -> Self {
        Self {
            version: AtomicU32::new(0),
            id: AtomicU32::new(0),
            timestamp_us: AtomicU64::new(0),
        }
    }

    /// Publish a new pair. Single writer only.
    #[inline]
    pub fn store(&self, id: u32, timestamp_us: u64) {
        let v = self.version.load(Ordering::Relaxed);
        self.version.store(v.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);
        self.id.store(id, Ordering::Relaxed);
        self.timestamp_us.store(timestamp_us, Ordering::Relaxed);
        self.version.store(v.wrapping_add(2), Ordering::Release);
    }

    /// Consistent `(id, timestamp_us)`.
    #[inline]
    pub fn load(&self) -> (u32, u64) {
        loop {
            let before = self.version.load(Ordering::Acquire);
            if before % 2 == 1 {
                core::hint::spin_loop();
                continue;
            }
            let id = self.id.load(Ordering::Relaxed);
            let ts = self.timestamp_us.load(Ordering::Relaxed);
            fence(Ordering::Acquire);
            if self.version.load(Ordering::Relaxed) == before {
                return (id, ts);
            }
        }
    }

    /// Id only. Single word, no version check needed.
    #[inline]
    pub fn id(&self) -> u32 {
        self.id.load(Ordering::Acquire)
    }
}

/// Pack two 32-bit fields into one word (high, low).
#[inline]
pub const fn pack(high: u32, low: u32) -> u64 {
    ((high as u64) << 32) | low as u64
}

/// Inverse of [`pack`].
#[inline]
pub const fn split(word: u64) -> (u32, u32) {
    ((word >> 32) as u32, word as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_split_pair() {
        let w = pack(7, 12_345);
        assert_eq!(split(w), (7, 12_345));
        assert_eq!(split(pack(u32::MAX, 0)), (u32::MAX, 0));
    }

    #[test]
    fn stamp_cell_keeps_full_timestamp() {
        let cell = StampCell::new();
        assert_eq!(cell.load(), (0, 0));
        let late = (1u64 << 32) * 3 + 17;
        cell.store(5, late);
        assert_eq!(cell.load(), (5, late));
        assert_eq!(cell.id(), 5);
    }

    #[test]
    fn stamp_cell_concurrent_reads_are_consistent() {
        use std::sync::Arc;
        let cell = Arc::new(StampCell::new());
        let writer = {
            let cell = Arc::clone(&cell);
            std::thread::spawn(move || {
                for i in 1..=20_000u32 {
                    cell.store(i, u64::from(i) << 33);
                }
            })
        };
        for _ in 0..20_000 {
            let (id, ts) = cell.load();
            assert_eq!(ts, u64::from(id) << 33);
        }
        writer.join().unwrap();
    }

    #[test]
    fn mains_status_event() {
        let ev = ZeroCrossEvent {
            timestamp_us: 10,
            cycle_id: 1,
        };
        let s = MainsStatus::Synced {
            event: ev,
            half_cycle_us: 10_000,
        };
        assert_eq!(s.event(), Some(ev));
        assert_eq!(MainsStatus::Lost.event(), None);
    }
}
