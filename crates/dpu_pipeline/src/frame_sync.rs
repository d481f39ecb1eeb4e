//! Frame-sync (vertical sync) arming and timing
//!
//! The frame-sync interrupt is reference counted: the output holds one
//! reference while enabled and the interrupt handler takes a temporary one
//! while it signals a completion, so a concurrent disable cannot switch the
//! interrupt off underneath the signal.

use dpu_hw::DeconOps;

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Frame-sync reference count and timestamp history of one output
#[derive(Debug, Clone)]
pub struct FrameSync {
    refs: u32,
    refresh_hz: u32,
    last_timestamp_ns: Option<u64>,
    count: u64,
    arm_count: u64,
}

impl FrameSync {
    /// Create a new disarmed frame sync for a mode refreshing at `refresh_hz`
    pub fn new(refresh_hz: u32) -> Self {
        Self {
            refs: 0,
            refresh_hz: refresh_hz.max(1),
            last_timestamp_ns: None,
            count: 0,
            arm_count: 0,
        }
    }

    /// Take a reference, arming the interrupt on the first one
    pub fn get(&mut self, decon: &mut dyn DeconOps) {
        if self.acquire() {
            decon.set_frame_sync_irq(true);
        }
    }

    /// Drop a reference, disarming the interrupt on the last one
    pub fn put(&mut self, decon: &mut dyn DeconOps) {
        if self.release() {
            decon.set_frame_sync_irq(false);
        }
    }

    /// Count a reference; true when the interrupt must now be armed
    pub fn acquire(&mut self) -> bool {
        self.refs += 1;
        if self.refs == 1 {
            self.arm_count += 1;
            true
        } else {
            false
        }
    }

    /// Drop a counted reference; true when the interrupt must now be disarmed
    pub fn release(&mut self) -> bool {
        if self.refs == 0 {
            log::warn!("Unbalanced frame sync put");
            return false;
        }
        self.refs -= 1;
        self.refs == 0
    }

    pub fn is_armed(&self) -> bool {
        self.refs > 0
    }

    pub fn refs(&self) -> u32 {
        self.refs
    }

    /// Times the interrupt went from disarmed to armed
    pub fn arm_count(&self) -> u64 {
        self.arm_count
    }

    /// Record a frame-sync edge
    pub fn record(&mut self, timestamp_ns: u64) -> u64 {
        self.last_timestamp_ns = Some(timestamp_ns);
        self.count += 1;
        self.count
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn last_timestamp(&self) -> Option<u64> {
        self.last_timestamp_ns
    }

    /// Frame period, honouring a requested refresh rate
    pub fn period_ns(&self, hint_hz: Option<u32>) -> u64 {
        let hz = hint_hz.filter(|hz| *hz > 0).unwrap_or(self.refresh_hz);
        NANOS_PER_SEC / hz as u64
    }

    /// Predict the first frame-sync edge after `now_ns`
    pub fn predict_next(&self, now_ns: u64, hint_hz: Option<u32>) -> u64 {
        let period = self.period_ns(hint_hz);
        let Some(last) = self.last_timestamp_ns else {
            return now_ns + period;
        };
        if now_ns < last {
            return last + period;
        }
        let elapsed_periods = (now_ns - last) / period + 1;
        last + elapsed_periods * period
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dpu_hw::{HwFactory, SimEvent, SimHw};

    #[test]
    fn test_refcounted_arming() {
        let hw = SimHw::new();
        let mut decon = hw.decon(0);
        let mut sync = FrameSync::new(60);

        sync.get(decon.as_mut());
        sync.get(decon.as_mut());
        assert_eq!(sync.arm_count(), 1);
        sync.put(decon.as_mut());
        assert!(sync.is_armed());
        sync.put(decon.as_mut());
        assert!(!sync.is_armed());
        sync.put(decon.as_mut());

        let toggles = hw.count(|e| matches!(e, SimEvent::DeconFrameSyncIrq { .. }));
        assert_eq!(toggles, 2);
    }

    #[test]
    fn test_acquire_release_report_toggles() {
        let mut sync = FrameSync::new(60);
        assert!(sync.acquire());
        assert!(!sync.acquire());
        assert!(!sync.release());
        assert!(sync.release());
        assert!(!sync.release());
        assert_eq!(sync.arm_count(), 1);
        assert_eq!(sync.refs(), 0);
    }

    #[test]
    fn test_prediction() {
        let mut sync = FrameSync::new(100);
        assert_eq!(sync.period_ns(None), 10_000_000);
        assert_eq!(sync.predict_next(5, None), 10_000_005);

        sync.record(1_000);
        assert_eq!(sync.predict_next(500, None), 10_001_000);
        assert_eq!(sync.predict_next(10_001_000, None), 20_001_000);
        assert_eq!(sync.predict_next(2_000, Some(50)), 20_001_000);
    }
}
