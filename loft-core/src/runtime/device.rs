//! Device descriptors and the registry the runtime context draws from.
//!
//! The native binding layer that enumerates real accelerator hardware stays
//! outside this crate; whatever it finds is registered here as plain
//! descriptors carrying the limits the scheduler needs.

use std::fmt;

/// Highest number of NDRange dimensions a launch can declare.
pub const MAX_DIMS: usize = 3;

/// Index into the [`DeviceRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId(pub u32);

impl DeviceId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for DeviceId {
    fn from(id: u32) -> Self {
        DeviceId(id)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.0)
    }
}

/// Device class, used to pick a scheduler variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Cpu,
    Gpu,
    Accelerator,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeviceKind::Cpu => "cpu",
            DeviceKind::Gpu => "gpu",
            DeviceKind::Accelerator => "accelerator",
        })
    }
}

/// Hardware limits the launch-geometry computation reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    /// Number of parallel compute units on the device.
    pub max_compute_units: u32,

    /// Largest work-item count per NDRange dimension.
    pub max_work_item_sizes: [u64; MAX_DIMS],
}

/// One registered device.
#[derive(Debug, Clone)]
pub struct DeviceDescriptor {
    pub name: String,
    pub kind: DeviceKind,
    pub limits: DeviceLimits,
}

impl DeviceDescriptor {
    pub fn new(name: impl Into<String>, kind: DeviceKind, limits: DeviceLimits) -> Self {
        DeviceDescriptor { name: name.into(), kind, limits }
    }
}

/// Ordered list of devices known to the runtime. Ids are assigned in
/// registration order and stay stable for the registry's lifetime.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: Vec<DeviceDescriptor>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        DeviceRegistry { devices: Vec::new() }
    }

    /// Register a device and return its id.
    pub fn register(&mut self, descriptor: DeviceDescriptor) -> DeviceId {
        let id = DeviceId(self.devices.len() as u32);
        self.devices.push(descriptor);
        id
    }

    pub fn get(&self, id: DeviceId) -> Option<&DeviceDescriptor> {
        self.devices.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// All device ids in registration order.
    pub fn device_ids(&self) -> impl Iterator<Item = DeviceId> {
        (0..self.devices.len() as u32).map(DeviceId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> DeviceLimits {
        DeviceLimits { max_compute_units: 8, max_work_item_sizes: [256, 256, 64] }
    }

    #[test]
    fn test_registration_order_assigns_ids() {
        let mut registry = DeviceRegistry::new();
        let cpu = registry.register(DeviceDescriptor::new("host", DeviceKind::Cpu, limits()));
        let gpu = registry.register(DeviceDescriptor::new("igpu", DeviceKind::Gpu, limits()));

        assert_eq!(cpu, DeviceId(0));
        assert_eq!(gpu, DeviceId(1));
        assert_eq!(registry.get(cpu).unwrap().name, "host");
        assert_eq!(registry.get(gpu).unwrap().kind, DeviceKind::Gpu);
        assert_eq!(registry.device_ids().collect::<Vec<_>>(), vec![cpu, gpu]);
    }

    #[test]
    fn test_unknown_device_is_none() {
        let registry = DeviceRegistry::new();
        assert!(registry.get(DeviceId(0)).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_display() {
        assert_eq!(DeviceId(2).to_string(), "d2");
        assert_eq!(DeviceKind::Cpu.to_string(), "cpu");
    }
}
