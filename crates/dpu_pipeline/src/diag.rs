//! Diagnostic checksum ring
//!
//! Frame-done interrupts push one checksum entry per composed frame; a
//! diagnostic reader drains them with a blocking read. Producers never block:
//! when the ring is full the oldest entry is overwritten, the overflow flag is
//! raised once and a single warning is logged until the ring is drained or
//! cleared.

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use dpu_hw::{DpuError, DpuResult};

/// Number of checksum words per entry
pub const CHECKSUM_VALUES: usize = 3;

/// The single supported checksum source
pub const CHECKSUM_SOURCE: &str = "auto";

/// One ring entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumEntry {
    pub frame_number: Option<u64>,
    pub values: [u32; CHECKSUM_VALUES],
}

struct RingInner {
    slots: Vec<Option<ChecksumEntry>>,
    head: usize,
    len: usize,
    overflowed: bool,
    overflow_events: u64,
}

/// Fixed-capacity circular buffer with a blocking reader
pub struct DiagnosticRing {
    inner: Mutex<RingInner>,
    ready: Condvar,
}

impl DiagnosticRing {
    /// Create a ring holding up to `capacity` entries (at least one)
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(RingInner {
                slots: vec![None; capacity.max(1)],
                head: 0,
                len: 0,
                overflowed: false,
                overflow_events: 0,
            }),
            ready: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().slots.len()
    }

    /// Insert an entry; never blocks beyond the short critical section
    pub fn push(&self, entry: ChecksumEntry) {
        {
            let mut inner = self.inner.lock();
            let capacity = inner.slots.len();
            if inner.len == capacity {
                let head = inner.head;
                inner.slots[head] = Some(entry);
                inner.head = (head + 1) % capacity;
                if !inner.overflowed {
                    inner.overflowed = true;
                    inner.overflow_events += 1;
                    log::warn!("Checksum ring overflowed, overwriting oldest entries");
                }
            } else {
                let tail = (inner.head + inner.len) % capacity;
                inner.slots[tail] = Some(entry);
                inner.len += 1;
            }
        }
        self.ready.notify_one();
    }

    fn pop(inner: &mut RingInner) -> Option<ChecksumEntry> {
        if inner.len == 0 {
            return None;
        }
        let head = inner.head;
        let entry = inner.slots[head].take();
        inner.head = (head + 1) % inner.slots.len();
        inner.len -= 1;
        if inner.len == 0 {
            inner.overflowed = false;
        }
        entry
    }

    /// Take the oldest entry, blocking until one is available
    pub fn read(&self) -> ChecksumEntry {
        let mut inner = self.inner.lock();
        loop {
            if let Some(entry) = Self::pop(&mut inner) {
                return entry;
            }
            self.ready.wait(&mut inner);
        }
    }

    pub fn try_read(&self) -> Option<ChecksumEntry> {
        Self::pop(&mut self.inner.lock())
    }

    /// Take the oldest entry, waiting at most `timeout`
    pub fn read_timeout(&self, timeout: Duration) -> Option<ChecksumEntry> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            if let Some(entry) = Self::pop(&mut inner) {
                return Some(entry);
            }
            if self.ready.wait_until(&mut inner, deadline).timed_out() {
                return Self::pop(&mut inner);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn overflowed(&self) -> bool {
        self.inner.lock().overflowed
    }

    /// How many times the overflow flag went up
    pub fn overflow_events(&self) -> u64 {
        self.inner.lock().overflow_events
    }

    /// Current contents, oldest first, without draining
    pub fn snapshot(&self) -> Vec<ChecksumEntry> {
        let inner = self.inner.lock();
        let capacity = inner.slots.len();
        (0..inner.len)
            .filter_map(|i| inner.slots[(inner.head + i) % capacity])
            .collect()
    }

    /// Drop every entry and re-arm the overflow flag
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.slots.iter_mut().for_each(|slot| *slot = None);
        inner.head = 0;
        inner.len = 0;
        inner.overflowed = false;
    }
}

/// Named checksum capture feed on top of a [`DiagnosticRing`]
pub struct ChecksumFeed {
    ring: DiagnosticRing,
    running: AtomicBool,
}

impl ChecksumFeed {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: DiagnosticRing::new(capacity),
            running: AtomicBool::new(false),
        }
    }

    /// Start capturing from `source`; only [`CHECKSUM_SOURCE`] exists
    pub fn start(&self, source: &str) -> DpuResult<()> {
        if source != CHECKSUM_SOURCE {
            return Err(DpuError::InvalidArgument(format!(
                "unknown checksum source '{}'",
                source
            )));
        }
        self.ring.clear();
        self.running.store(true, Ordering::Release);
        log::debug!("Checksum feed started");
        Ok(())
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        log::debug!("Checksum feed stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn values_per_entry(&self) -> usize {
        CHECKSUM_VALUES
    }

    /// Record one frame; ignored while stopped
    pub fn record(&self, frame_number: Option<u64>, values: [u32; CHECKSUM_VALUES]) {
        if self.is_running() {
            self.ring.push(ChecksumEntry { frame_number, values });
        }
    }

    /// Blocking sequential read
    pub fn read(&self) -> ChecksumEntry {
        self.ring.read()
    }

    pub fn read_timeout(&self, timeout: Duration) -> Option<ChecksumEntry> {
        self.ring.read_timeout(timeout)
    }

    pub fn ring(&self) -> &DiagnosticRing {
        &self.ring
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn entry(n: u64) -> ChecksumEntry {
        ChecksumEntry {
            frame_number: Some(n),
            values: [n as u32, 0, 0],
        }
    }

    #[test]
    fn test_fifo_order() {
        let ring = DiagnosticRing::new(4);
        ring.push(entry(1));
        ring.push(entry(2));
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.try_read(), Some(entry(1)));
        assert_eq!(ring.try_read(), Some(entry(2)));
        assert_eq!(ring.try_read(), None);
        assert!(!ring.overflowed());
    }

    #[test]
    fn test_overflow_keeps_latest() {
        let ring = DiagnosticRing::new(3);
        for n in 0..4 {
            ring.push(entry(n));
        }
        assert!(ring.overflowed());
        assert_eq!(ring.overflow_events(), 1);
        assert_eq!(ring.snapshot(), vec![entry(1), entry(2), entry(3)]);

        ring.clear();
        assert!(!ring.overflowed());
        assert!(ring.is_empty());
    }

    #[test]
    fn test_overflow_rearms_when_drained() {
        let ring = DiagnosticRing::new(2);
        for n in 0..3 {
            ring.push(entry(n));
        }
        assert!(ring.overflowed());

        assert_eq!(ring.try_read(), Some(entry(1)));
        assert!(ring.overflowed());
        assert_eq!(ring.try_read(), Some(entry(2)));
        assert!(!ring.overflowed());

        for n in 3..6 {
            ring.push(entry(n));
        }
        assert!(ring.overflowed());
        assert_eq!(ring.overflow_events(), 2);
    }

    #[test]
    fn test_blocking_reader_woken() {
        let ring = Arc::new(DiagnosticRing::new(2));
        let reader = Arc::clone(&ring);
        let handle = thread::spawn(move || reader.read());
        thread::sleep(Duration::from_millis(10));
        ring.push(entry(9));
        assert_eq!(handle.join().unwrap(), entry(9));
    }

    #[test]
    fn test_read_timeout_empty() {
        let ring = DiagnosticRing::new(2);
        assert_eq!(ring.read_timeout(Duration::from_millis(5)), None);
    }

    #[test]
    fn test_feed_source_and_running() {
        let feed = ChecksumFeed::new(4);
        assert_eq!(feed.values_per_entry(), 3);
        assert!(feed.start("crc").is_err());

        feed.record(Some(1), [1, 2, 3]);
        assert!(feed.ring().is_empty());

        feed.start(CHECKSUM_SOURCE).unwrap();
        feed.record(Some(2), [4, 5, 6]);
        assert_eq!(feed.read().values, [4, 5, 6]);

        feed.stop();
        feed.record(Some(3), [0; 3]);
        assert!(feed.ring().is_empty());
    }
}
