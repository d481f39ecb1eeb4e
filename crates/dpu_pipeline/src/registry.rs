//! Device registry
//!
//! Explicit map from stable device id to device handle, built once from a
//! [`DpuConfig`]. Owns the worker threads: one commit worker per output and a
//! single deferred worker shared by every interrupt handler.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

use dpu_hw::{DestinationMode, DpuError, DpuResult, HwFactory};

use crate::capture::{CaptureId, CaptureOutput};
use crate::completion::Completion;
use crate::config::{DpuConfig, RuntimeConfig};
use crate::layer_processor::{DppId, DppIrqHandle, LayerProcessor};
use crate::output::{CommitRequest, OutputController, OutputId, OutputIrq};
use crate::repeater::{contiguous_buffers, RepeaterPool};
use crate::worker::{CommitWorker, DeferredHandle, DeferredWorker};

/// Every registered device of one DPU
pub struct DeviceRegistry {
    // Workers go first so they are joined before the devices they drive
    workers: BTreeMap<OutputId, CommitWorker>,
    deferred: DeferredWorker,
    layers: BTreeMap<DppId, Arc<Mutex<LayerProcessor>>>,
    outputs: BTreeMap<OutputId, Arc<Mutex<OutputController>>>,
    output_irqs: BTreeMap<OutputId, OutputIrq>,
    captures: BTreeMap<CaptureId, Arc<CaptureOutput>>,
    runtime: RuntimeConfig,
}

impl DeviceRegistry {
    /// Register every device the configuration names and start the workers
    pub fn from_config(config: &DpuConfig, hw: &dyn HwFactory) -> DpuResult<Self> {
        config.validate()?;
        let deferred = DeferredWorker::spawn()?;

        let mut captures = BTreeMap::new();
        for capture in &config.captures {
            let pool = Arc::new(RepeaterPool::new(capture.link_depth));
            if capture.repeater_buffers > 0 {
                pool.attach(contiguous_buffers(
                    capture.repeater_base,
                    capture.repeater_buffer_size,
                    capture.repeater_buffers,
                ))?;
            }
            let device = CaptureOutput::new(capture.id, hw.writeback(capture.id), pool, deferred.handle());
            device.enable();
            captures.insert(capture.id, Arc::new(device));
        }

        let mut layers = BTreeMap::new();
        for layer in &config.layers {
            let device = LayerProcessor::new(layer.id, layer.class, hw.dpp(layer.id, layer.class), deferred.handle());
            layers.insert(layer.id, Arc::new(Mutex::new(device)));
        }

        let mut outputs = BTreeMap::new();
        let mut output_irqs = BTreeMap::new();
        for output in &config.outputs {
            let mut mode = DestinationMode::new(output.width, output.height);
            if let Some(khz) = output.bus_clock_khz {
                mode = mode.with_bus_clock(khz);
            }
            let (align_w, align_h) = output.partial_align;
            let mut controller = OutputController::new(output.id, mode, hw.decon(output.id), deferred.handle())
                .with_refresh(output.refresh_hz)
                .with_operation_mode(output.operation_mode)
                .with_partial_alignment(align_w, align_h)
                .with_frame_done_timeout(config.runtime.frame_done_timeout)
                .with_checksum_capacity(config.diag_ring_capacity);

            for id in &output.layers {
                let layer = layers
                    .get(id)
                    .ok_or_else(|| DpuError::NotFound(format!("DPP{}", id)))?;
                controller.attach_layer(Arc::clone(layer))?;
            }
            if let Some(id) = output.capture {
                let capture = captures
                    .get(&id)
                    .ok_or_else(|| DpuError::NotFound(format!("capture {}", id)))?;
                controller.attach_capture(Arc::clone(capture));
            }

            output_irqs.insert(output.id, controller.irq_handle());
            outputs.insert(output.id, Arc::new(Mutex::new(controller)));
        }

        let mut workers = BTreeMap::new();
        for (id, output) in &outputs {
            let worker = CommitWorker::spawn(Arc::clone(output), config.runtime.commit_queue_depth)?;
            workers.insert(*id, worker);
        }

        log::info!(
            "DPU registry ready: {} layers, {} outputs, {} captures",
            layers.len(),
            outputs.len(),
            captures.len()
        );

        Ok(Self {
            workers,
            deferred,
            layers,
            outputs,
            output_irqs,
            captures,
            runtime: config.runtime.clone(),
        })
    }

    pub fn layer(&self, id: DppId) -> DpuResult<Arc<Mutex<LayerProcessor>>> {
        self.layers
            .get(&id)
            .cloned()
            .ok_or_else(|| DpuError::NotFound(format!("DPP{}", id)))
    }

    /// Interrupt handle of a layer processor
    pub fn layer_irq(&self, id: DppId) -> DpuResult<DppIrqHandle> {
        Ok(self.layer(id)?.lock().irq_handle())
    }

    pub fn output(&self, id: OutputId) -> DpuResult<Arc<Mutex<OutputController>>> {
        self.outputs
            .get(&id)
            .cloned()
            .ok_or_else(|| DpuError::NotFound(format!("output {}", id)))
    }

    /// Interrupt entry points of an output
    pub fn output_irq(&self, id: OutputId) -> DpuResult<OutputIrq> {
        self.output_irqs
            .get(&id)
            .cloned()
            .ok_or_else(|| DpuError::NotFound(format!("output {}", id)))
    }

    pub fn capture(&self, id: CaptureId) -> DpuResult<Arc<CaptureOutput>> {
        self.captures
            .get(&id)
            .cloned()
            .ok_or_else(|| DpuError::NotFound(format!("capture {}", id)))
    }

    pub fn commit_worker(&self, id: OutputId) -> DpuResult<&CommitWorker> {
        self.workers
            .get(&id)
            .ok_or_else(|| DpuError::NotFound(format!("output {}", id)))
    }

    /// Run a commit on the output's worker and wait for its result
    pub fn commit(&self, output: OutputId, request: CommitRequest) -> DpuResult<Completion> {
        self.commit_worker(output)?.commit(request)
    }

    pub fn layer_ids(&self) -> impl Iterator<Item = DppId> + '_ {
        self.layers.keys().copied()
    }

    pub fn output_ids(&self) -> impl Iterator<Item = OutputId> + '_ {
        self.outputs.keys().copied()
    }

    pub fn capture_ids(&self) -> impl Iterator<Item = CaptureId> + '_ {
        self.captures.keys().copied()
    }

    pub fn deferred(&self) -> DeferredHandle {
        self.deferred.handle()
    }

    pub fn runtime(&self) -> &RuntimeConfig {
        &self.runtime
    }

    /// Stop the workers and power every device down
    pub fn shutdown(&mut self) {
        for worker in self.workers.values_mut() {
            worker.stop();
        }
        for (id, output) in &self.outputs {
            if let Err(err) = output.lock().disable() {
                log::warn!("Output {} failed to power down: {}", id, err);
            }
        }
        for capture in self.captures.values() {
            capture.disable();
        }
        self.deferred.stop();
        log::info!("DPU registry shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dpu_hw::{DeviceClass, ErrorKind, SimHw};

    #[test]
    fn test_default_topology_registers() {
        let hw = SimHw::new();
        let registry = DeviceRegistry::from_config(&DpuConfig::default(), &hw).unwrap();

        assert_eq!(registry.layer_ids().collect::<Vec<_>>(), vec![0, 1, 2, 3]);
        assert_eq!(registry.layer(3).unwrap().lock().class(), DeviceClass::Vgrfs);
        assert_eq!(registry.layer(0).unwrap().lock().bound_output(), Some(0));
        assert!(registry.capture(0).unwrap().pool().is_active());
        assert!(registry.output(0).unwrap().lock().capture().is_some());
    }

    #[test]
    fn test_unknown_ids_are_not_found() {
        let hw = SimHw::new();
        let registry = DeviceRegistry::from_config(&DpuConfig::default(), &hw).unwrap();

        assert_eq!(registry.layer(9).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(registry.output(9).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(registry.capture(9).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(
            registry.commit(9, CommitRequest::new()).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_commit_through_worker() {
        let hw = SimHw::new();
        let mut registry = DeviceRegistry::from_config(&DpuConfig::default(), &hw).unwrap();

        let done = registry.commit(0, CommitRequest::new()).unwrap();
        assert!(done.is_complete());
        registry.shutdown();
    }
}
