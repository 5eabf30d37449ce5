//! Device Registry
//!
//! Central lookup of devices by ID and capability. Scan engines and the
//! alignment controller resolve the identifiers they are given through it.
//!
//! ```rust,ignore
//! let mut registry = DeviceRegistry::new();
//! let stage = Arc::new(MockStage::new());
//! registry.register_movable("sample_x", stage.clone(), "mm")?;
//! registry.register_readable(
//!     "diode",
//!     Arc::new(GaussianDetector::new(stage, 1.1, 0.1, 1000.0)),
//!     "counts",
//! )?;
//!
//! if let Some(device) = registry.get_movable("sample_x") {
//!     device.move_abs(1.0).await?;
//! }
//! ```

use crate::hardware::capabilities::{Movable, Readable};
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Unique identifier for a registered device
///
/// Format: lowercase alphanumeric with underscores (e.g., "sample_x", "diode")
pub type DeviceId = String;

struct RegisteredDevice {
    movable: Option<Arc<dyn Movable>>,
    readable: Option<Arc<dyn Readable>>,
    units: String,
}

/// Registry of devices available to scans
#[derive(Default)]
pub struct DeviceRegistry {
    devices: HashMap<DeviceId, RegisteredDevice>,
}

impl DeviceRegistry {
    /// Create a new empty device registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a positioner
    ///
    /// # Errors
    /// Returns error if the device ID is already registered
    pub fn register_movable(
        &mut self,
        id: &str,
        device: Arc<dyn Movable>,
        units: &str,
    ) -> Result<()> {
        self.insert(
            id,
            RegisteredDevice {
                movable: Some(device),
                readable: None,
                units: units.to_string(),
            },
        )
    }

    /// Register a scalar detector
    ///
    /// # Errors
    /// Returns error if the device ID is already registered
    pub fn register_readable(
        &mut self,
        id: &str,
        device: Arc<dyn Readable>,
        units: &str,
    ) -> Result<()> {
        self.insert(
            id,
            RegisteredDevice {
                movable: None,
                readable: Some(device),
                units: units.to_string(),
            },
        )
    }

    fn insert(&mut self, id: &str, device: RegisteredDevice) -> Result<()> {
        if self.devices.contains_key(id) {
            return Err(anyhow!("Device '{}' is already registered", id));
        }
        self.devices.insert(id.to_string(), device);
        Ok(())
    }

    /// Get a device as Movable (if it supports this capability)
    pub fn get_movable(&self, id: &str) -> Option<Arc<dyn Movable>> {
        self.devices.get(id).and_then(|d| d.movable.clone())
    }

    /// Get a device as Readable (if it supports this capability)
    pub fn get_readable(&self, id: &str) -> Option<Arc<dyn Readable>> {
        self.devices.get(id).and_then(|d| d.readable.clone())
    }

    /// Units of a registered device
    pub fn units(&self, id: &str) -> Option<&str> {
        self.devices.get(id).map(|d| d.units.as_str())
    }
}
