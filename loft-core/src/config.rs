//! Runtime tunables read from the environment.
//!
//! The heavyweight property system of the surrounding framework stays outside
//! this crate; the two knobs the core actually consumes live here with
//! ordinary env-var overrides.

use log::warn;

/// Overrides the CPU compute-unit coefficient (positive float, default 1.0).
pub const CPU_UNIT_SCALE_VAR: &str = "LOFT_CPU_UNIT_SCALE";

/// Overrides the default device registry index (default 0).
pub const DEFAULT_DEVICE_VAR: &str = "LOFT_DEVICE";

/// Knobs consumed by the runtime context and the CPU scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct Tunables {
    /// Scale applied to a CPU device's compute-unit count when sizing
    /// dimension 0 of an uncoarsened launch.
    pub cpu_unit_scale: f64,
    /// Registry index of the device the runtime context selects by default.
    pub default_device: usize,
}

impl Default for Tunables {
    fn default() -> Self {
        Tunables {
            cpu_unit_scale: 1.0,
            default_device: 0,
        }
    }
}

impl Tunables {
    /// Reads the environment, warning and keeping the default on malformed
    /// values.
    pub fn from_env() -> Self {
        let mut tunables = Tunables::default();

        if let Some(raw) = read_var(CPU_UNIT_SCALE_VAR) {
            match raw.parse::<f64>() {
                Ok(scale) if scale.is_finite() && scale > 0.0 => {
                    tunables.cpu_unit_scale = scale;
                }
                _ => warn!("ignoring {CPU_UNIT_SCALE_VAR}={raw}: expected a positive number"),
            }
        }

        if let Some(raw) = read_var(DEFAULT_DEVICE_VAR) {
            match raw.parse::<usize>() {
                Ok(index) => tunables.default_device = index,
                _ => warn!("ignoring {DEFAULT_DEVICE_VAR}={raw}: expected a device index"),
            }
        }

        tunables
    }
}

fn read_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}
