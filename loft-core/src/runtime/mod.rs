//! Device bookkeeping for kernel dispatch.
//!
//! Everything the dispatch layer consults between compiling a kernel and
//! enqueueing it: the device registry, per-buffer residency state, and
//! launch-geometry schedulers, owned together by an explicitly constructed
//! [`Runtime`] context.
//!
//! Assumptions:
//! - The native driver binding enumerates hardware and registers descriptors;
//!   this crate never talks to a driver.
//! - Transfers and enqueues happen outside; the state here only answers
//!   whether they are needed and how large the launch should be.

use log::info;
use thiserror::Error;

use crate::config::Tunables;

pub mod device;
pub mod residency;
pub mod schedule;

pub use device::{DeviceDescriptor, DeviceId, DeviceKind, DeviceLimits, DeviceRegistry, MAX_DIMS};
pub use residency::{BufferId, BufferResidency, DeviceBufferState, ResidencyTable, SharingMode};
pub use schedule::{CpuScheduler, GenericScheduler, KernelScheduler, TaskMetadata, WorkSizes};

/// Error constructing the runtime context.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("no devices registered")]
    NoDevices,

    #[error("default device index {index} out of range ({count} devices registered)")]
    DefaultDeviceOutOfRange { index: usize, count: usize },
}

/// Explicitly constructed runtime context.
///
/// Owns the registry, the residency table, and the tunables. Construction
/// validates the configured default device; teardown releases all residency
/// state on every exit path, through [`Runtime::shutdown`] or `Drop`.
#[derive(Debug)]
pub struct Runtime {
    registry: DeviceRegistry,
    residency: ResidencyTable,
    tunables: Tunables,
}

impl Runtime {
    pub fn new(registry: DeviceRegistry, tunables: Tunables) -> Result<Runtime, RuntimeError> {
        if registry.is_empty() {
            return Err(RuntimeError::NoDevices);
        }
        if tunables.default_device >= registry.len() {
            return Err(RuntimeError::DefaultDeviceOutOfRange {
                index: tunables.default_device,
                count: registry.len(),
            });
        }
        info!(
            "runtime up: {} device(s), default d{}",
            registry.len(),
            tunables.default_device
        );
        Ok(Runtime { registry, residency: ResidencyTable::new(), tunables })
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn residency(&self) -> &ResidencyTable {
        &self.residency
    }

    pub fn tunables(&self) -> &Tunables {
        &self.tunables
    }

    /// The configured default device. In range by construction.
    pub fn default_device(&self) -> DeviceId {
        DeviceId(self.tunables.default_device as u32)
    }

    pub fn device(&self, id: DeviceId) -> Option<&DeviceDescriptor> {
        self.registry.get(id)
    }

    /// Scheduler variant for a device: CPU-optimized for CPU-class devices,
    /// generic otherwise.
    pub fn scheduler_for(&self, device: &DeviceDescriptor) -> Box<dyn KernelScheduler> {
        match device.kind {
            DeviceKind::Cpu => Box::new(CpuScheduler::new(self.tunables.cpu_unit_scale)),
            DeviceKind::Gpu | DeviceKind::Accelerator => Box::new(GenericScheduler),
        }
    }

    /// Tear the context down, releasing all residency state.
    pub fn shutdown(self) {}
}

impl Drop for Runtime {
    fn drop(&mut self) {
        let buffers = self.residency.len();
        self.residency.clear();
        info!("runtime down: released {} tracked buffer(s)", buffers);
    }
}
