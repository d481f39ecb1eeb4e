//! Repeater buffer pool
//!
//! A small set of pre-mapped buffers a capture output can write into and hand
//! to a downstream consumer without copying. Indices are exclusively owned by
//! one capture job from `acquire` until the consumer gives them back.
//!
//! ```text
//!   acquire ──► capture job ──► publish ──► link ──► consumer
//!      ▲                                                │
//!      └──────────────────── release ◄──────────────────┘
//! ```

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use dpu_hw::{DpuError, DpuResult};

/// One pre-mapped buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepeaterBuffer {
    pub addr: u64,
    pub size: u64,
}

/// A filled buffer travelling over the pass-through link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeaterFrame {
    pub index: usize,
    pub buffer: RepeaterBuffer,
    /// Capture job that filled the buffer
    pub job_id: u64,
}

#[derive(Debug, Default)]
struct PoolInner {
    buffers: Vec<RepeaterBuffer>,
    in_use: Vec<bool>,
    active: bool,
    next: usize,
}

/// Bounded pool of repeater buffers
pub struct RepeaterPool {
    inner: Mutex<PoolInner>,
    link_tx: Sender<RepeaterFrame>,
    link_rx: Receiver<RepeaterFrame>,
}

impl RepeaterPool {
    /// Create an empty, inactive pool whose link holds at most `depth` frames
    pub fn new(depth: usize) -> Self {
        let (link_tx, link_rx) = bounded(depth.max(1));
        Self {
            inner: Mutex::new(PoolInner::default()),
            link_tx,
            link_rx,
        }
    }

    /// Attach the buffers and mark the pool active
    pub fn attach(&self, buffers: Vec<RepeaterBuffer>) -> DpuResult<()> {
        if buffers.is_empty() {
            return Err(DpuError::InvalidArgument("no repeater buffers to attach".into()));
        }
        let mut inner = self.inner.lock();
        if inner.active {
            return Err(DpuError::Busy("repeater buffers already attached".into()));
        }
        inner.in_use = vec![false; buffers.len()];
        inner.buffers = buffers;
        inner.next = 0;
        inner.active = true;
        log::info!("Attached {} repeater buffers", inner.buffers.len());
        Ok(())
    }

    /// Tear down; outstanding indices become invalid
    pub fn detach(&self) {
        let mut inner = self.inner.lock();
        if !inner.active {
            return;
        }
        *inner = PoolInner::default();
        while self.link_rx.try_recv().is_ok() {}
        log::info!("Detached repeater buffers");
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock().active
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().buffers.len()
    }

    /// Number of indices currently owned by a job or consumer
    pub fn in_use(&self) -> usize {
        self.inner.lock().in_use.iter().filter(|used| **used).count()
    }

    /// Take the next free index, round-robin
    pub fn acquire(&self) -> Option<usize> {
        let mut inner = self.inner.lock();
        if !inner.active {
            return None;
        }
        let count = inner.buffers.len();
        for step in 0..count {
            let index = (inner.next + step) % count;
            if !inner.in_use[index] {
                inner.in_use[index] = true;
                inner.next = (index + 1) % count;
                return Some(index);
            }
        }
        None
    }

    pub fn buffer(&self, index: usize) -> Option<RepeaterBuffer> {
        self.inner.lock().buffers.get(index).copied()
    }

    /// Hand a filled buffer to the downstream consumer. The index stays owned
    /// until the consumer calls [`RepeaterPool::release`].
    pub fn publish(&self, index: usize, job_id: u64) {
        let Some(buffer) = self.buffer(index) else {
            log::warn!("Publishing stale repeater index {}", index);
            return;
        };
        match self.link_tx.try_send(RepeaterFrame { index, buffer, job_id }) {
            Ok(()) => log::trace!("Published repeater buffer {} for job {}", index, job_id),
            Err(TrySendError::Full(frame)) | Err(TrySendError::Disconnected(frame)) => {
                log::warn!("Repeater link full, dropping buffer {}", frame.index);
                self.release(frame.index);
            }
        }
    }

    /// Return an index to the pool
    pub fn release(&self, index: usize) {
        let mut inner = self.inner.lock();
        if let Some(used) = inner.in_use.get_mut(index) {
            *used = false;
        }
    }

    /// Receiving end of the pass-through link
    pub fn subscribe(&self) -> Receiver<RepeaterFrame> {
        self.link_rx.clone()
    }
}

impl Default for RepeaterPool {
    fn default() -> Self {
        Self::new(4)
    }
}

/// Buffers laid out back to back from `base`
pub fn contiguous_buffers(base: u64, size: u64, count: usize) -> Vec<RepeaterBuffer> {
    (0..count as u64)
        .map(|i| RepeaterBuffer {
            addr: base + i * size,
            size,
        })
        .collect()
}
