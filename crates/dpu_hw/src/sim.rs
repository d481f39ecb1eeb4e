//! Simulated register blocks
//!
//! Stands in for the register bus when no hardware is attached: every call is
//! recorded in a shared event log, registers are mirrored so dumps look like
//! the real thing, and programming failures can be injected.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

use crate::builder::{HardwareConfig, PlaneLayout};
use crate::error::{DpuError, DpuResult};
use crate::hal::{
    CaptureConfig, DeconOps, DppIrqLine, DppOps, FrameUpdate, HwFactory, RegisterDump, WritebackOps,
};
use crate::restriction::DeviceClass;

/// One recorded register-level operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    DppProgram { id: u32, config: Box<HardwareConfig> },
    DppEnable { id: u32 },
    DppDisable { id: u32 },
    DppIrq { id: u32, line: DppIrqLine, enabled: bool },
    DppProtection { id: u32, enabled: bool },
    DeconEnable { id: u32 },
    DeconDisable { id: u32 },
    DeconFrameSyncIrq { id: u32, enabled: bool },
    DeconUpdate { id: u32, frame: Box<FrameUpdate> },
    DeconReadback { id: u32, enabled: bool },
    WbProgram { id: u32, config: Box<CaptureConfig> },
    WbStart { id: u32 },
    WbStop { id: u32 },
    WbIrq { id: u32, enabled: bool },
    WbClock { id: u32, enabled: bool },
}

#[derive(Debug, Default)]
struct SimState {
    events: Vec<SimEvent>,
    fail_dpp_program: HashSet<u32>,
    fail_decon_update: HashSet<u32>,
    fail_wb_program: HashSet<u32>,
    checksum_seed: u32,
}

/// Factory and shared log of the simulated blocks
#[derive(Debug, Clone, Default)]
pub struct SimHw {
    state: Arc<Mutex<SimState>>,
}

impl SimHw {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far
    pub fn events(&self) -> Vec<SimEvent> {
        self.state.lock().events.clone()
    }

    /// Take and clear the recorded events
    pub fn drain_events(&self) -> Vec<SimEvent> {
        std::mem::take(&mut self.state.lock().events)
    }

    /// Count recorded events matching a predicate
    pub fn count(&self, pred: impl Fn(&SimEvent) -> bool) -> usize {
        self.state.lock().events.iter().filter(|e| pred(e)).count()
    }

    /// Make the next `program` of layer processor `id` fail
    pub fn fail_next_dpp_program(&self, id: u32) {
        self.state.lock().fail_dpp_program.insert(id);
    }

    /// Make the next `update` of output `id` fail
    pub fn fail_next_decon_update(&self, id: u32) {
        self.state.lock().fail_decon_update.insert(id);
    }

    /// Make the next `program` of capture sink `id` fail
    pub fn fail_next_wb_program(&self, id: u32) {
        self.state.lock().fail_wb_program.insert(id);
    }

    fn record(&self, event: SimEvent) {
        log::trace!("sim: {:?}", event);
        self.state.lock().events.push(event);
    }
}

impl HwFactory for SimHw {
    fn dpp(&self, id: u32, class: DeviceClass) -> Box<dyn DppOps> {
        Box::new(SimDpp {
            id,
            class,
            hw: self.clone(),
            regs: Vec::new(),
            enabled: false,
        })
    }

    fn decon(&self, id: u32) -> Box<dyn DeconOps> {
        Box::new(SimDecon {
            id,
            hw: self.clone(),
            enabled: false,
            last_sequence: 0,
        })
    }

    fn writeback(&self, id: u32) -> Box<dyn WritebackOps> {
        Box::new(SimWriteback {
            id,
            hw: self.clone(),
            last: None,
            running: false,
        })
    }
}

/// Simulated layer processor
pub struct SimDpp {
    id: u32,
    class: DeviceClass,
    hw: SimHw,
    regs: Vec<(u32, u32)>,
    enabled: bool,
}

impl DppOps for SimDpp {
    fn program(&mut self, config: &HardwareConfig) -> DpuResult<()> {
        if self.hw.state.lock().fail_dpp_program.remove(&self.id) {
            return Err(DpuError::ProgramFailed {
                device: format!("DPP{}", self.id),
                reason: "shadow update rejected".into(),
            });
        }

        self.regs.clear();
        self.regs.push((0x0010, (config.src.x << 16) | config.src.y));
        self.regs.push((0x0014, (config.src.w << 16) | config.src.h));
        self.regs.push((0x0040, (config.dst.w << 16) | config.dst.h));
        self.regs.push((0x0044, config.h_ratio));
        self.regs.push((0x0048, config.v_ratio));
        self.regs.push((0x0050, config.rotation.bits()));
        match config.planes {
            PlaneLayout::Direct { addresses, .. } => {
                for (index, addr) in addresses.iter().enumerate() {
                    self.regs.push((0x0100 + 4 * index as u32, *addr as u32));
                }
            }
            PlaneLayout::Sbwc { luma, chroma, .. } => {
                self.regs.push((0x0100, luma.header_addr as u32));
                self.regs.push((0x0104, luma.payload_addr as u32));
                self.regs.push((0x0108, chroma.header_addr as u32));
                self.regs.push((0x010c, chroma.payload_addr as u32));
            }
        }
        self.regs.push((0x0200, config.recovery_threshold));

        self.hw.record(SimEvent::DppProgram {
            id: self.id,
            config: Box::new(config.clone()),
        });
        Ok(())
    }

    fn enable(&mut self) {
        self.enabled = true;
        self.hw.record(SimEvent::DppEnable { id: self.id });
    }

    fn disable(&mut self) {
        self.enabled = false;
        self.hw.record(SimEvent::DppDisable { id: self.id });
    }

    fn set_irq_enabled(&mut self, line: DppIrqLine, enabled: bool) {
        self.hw.record(SimEvent::DppIrq {
            id: self.id,
            line,
            enabled,
        });
    }

    fn set_protection(&mut self, enabled: bool) {
        self.hw.record(SimEvent::DppProtection { id: self.id, enabled });
    }

    fn dump_registers(&self) -> RegisterDump {
        let mut dump = RegisterDump::new(format!("DPP{} ({})", self.id, self.class));
        dump.push(0x0000, self.enabled as u32);
        for (offset, value) in &self.regs {
            dump.push(*offset, *value);
        }
        dump
    }
}

/// Simulated output block
pub struct SimDecon {
    id: u32,
    hw: SimHw,
    enabled: bool,
    last_sequence: u64,
}

impl DeconOps for SimDecon {
    fn enable(&mut self) -> DpuResult<()> {
        self.enabled = true;
        self.hw.record(SimEvent::DeconEnable { id: self.id });
        Ok(())
    }

    fn disable(&mut self) -> DpuResult<()> {
        self.enabled = false;
        self.hw.record(SimEvent::DeconDisable { id: self.id });
        Ok(())
    }

    fn set_frame_sync_irq(&mut self, enabled: bool) {
        self.hw.record(SimEvent::DeconFrameSyncIrq { id: self.id, enabled });
    }

    fn update(&mut self, frame: &FrameUpdate) -> DpuResult<()> {
        if self.hw.state.lock().fail_decon_update.remove(&self.id) {
            return Err(DpuError::ProgramFailed {
                device: format!("DECON{}", self.id),
                reason: "shadow update timed out".into(),
            });
        }
        self.last_sequence = frame.sequence;
        self.hw.record(SimEvent::DeconUpdate {
            id: self.id,
            frame: Box::new(frame.clone()),
        });
        Ok(())
    }

    fn set_readback(&mut self, enabled: bool) {
        self.hw.record(SimEvent::DeconReadback { id: self.id, enabled });
    }

    fn read_checksum(&mut self) -> [u32; 3] {
        let mut state = self.hw.state.lock();
        state.checksum_seed = state.checksum_seed.wrapping_add(1);
        let seed = state.checksum_seed;
        [seed, seed.rotate_left(8), seed.rotate_left(16)]
    }

    fn dump_registers(&self) -> RegisterDump {
        let mut dump = RegisterDump::new(format!("DECON{}", self.id));
        dump.push(0x0000, self.enabled as u32);
        dump.push(0x0004, self.last_sequence as u32);
        dump
    }
}

/// Simulated capture sink
pub struct SimWriteback {
    id: u32,
    hw: SimHw,
    last: Option<CaptureConfig>,
    running: bool,
}

impl WritebackOps for SimWriteback {
    fn program(&mut self, config: &CaptureConfig) -> DpuResult<()> {
        if self.hw.state.lock().fail_wb_program.remove(&self.id) {
            return Err(DpuError::ProgramFailed {
                device: format!("WB{}", self.id),
                reason: "address not mapped".into(),
            });
        }
        self.last = Some(config.clone());
        self.hw.record(SimEvent::WbProgram {
            id: self.id,
            config: Box::new(config.clone()),
        });
        Ok(())
    }

    fn start(&mut self) {
        self.running = true;
        self.hw.record(SimEvent::WbStart { id: self.id });
    }

    fn stop(&mut self) {
        self.running = false;
        self.hw.record(SimEvent::WbStop { id: self.id });
    }

    fn set_irq_enabled(&mut self, enabled: bool) {
        self.hw.record(SimEvent::WbIrq { id: self.id, enabled });
    }

    fn set_clock(&mut self, enabled: bool) {
        self.hw.record(SimEvent::WbClock { id: self.id, enabled });
    }

    fn dump_registers(&self) -> RegisterDump {
        let mut dump = RegisterDump::new(format!("WB{}", self.id));
        dump.push(0x0000, self.running as u32);
        if let Some(config) = &self.last {
            dump.push(0x0010, (config.area.w << 16) | config.area.h);
            dump.push(0x0100, config.planes[0] as u32);
        }
        dump
    }
}
