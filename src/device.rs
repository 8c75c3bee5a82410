//! Device discovery and reporting
//!
//! Discovery runs exactly once per session, during one-time setup: driver
//! init, device count, then per ordinal a device handle, identity queries,
//! and one context. The device list is fixed in length and identity for the
//! rest of the process; there is no re-enumeration or hot-plug handling.
//!
//! Any per-device failure aborts the whole setup, uniformly with
//! library-load failures, so a half-discovered device list is never kept.

use std::fmt;

use tracing::debug;

use crate::driver::{Context, Device, DeviceApi, Module};
use crate::error::Result;

// ============================================================================
// Per-Device State
// ============================================================================

/// One discovered compute device with its context and current module slot
pub struct DeviceContext {
    /// Device ordinal (0-based)
    pub ordinal: i32,
    /// Device name as reported by the driver
    pub name: String,
    /// Compute capability (major, minor)
    pub compute_capability: (i32, i32),
    /// Driver device handle
    pub(crate) device: Device,
    /// Context bound to this device
    pub(crate) context: Context,
    /// Module holding the most recent compile, replaced every invocation
    pub(crate) module: Option<Module>,
}

impl DeviceContext {
    /// Suggested compiler architecture tag for this device
    #[must_use]
    pub fn arch_tag(&self) -> String {
        format!("sm_{}{}", self.compute_capability.0, self.compute_capability.1)
    }

    /// Driver device handle
    #[must_use]
    pub fn device(&self) -> Device {
        self.device
    }
}

/// Discover all devices and create one context per device.
///
/// # Errors
///
/// Returns the first driver error; a partial device list is never returned.
pub fn discover(api: &dyn DeviceApi) -> Result<Vec<DeviceContext>> {
    api.init()?;
    let count = api.device_count()?;
    debug!(count, "discovered compute devices");

    let mut devices = Vec::with_capacity(count.max(0) as usize);
    for ordinal in 0..count {
        let device = api.device(ordinal)?;
        let name = api.device_name(device)?;
        let compute_capability = api.compute_capability(device)?;
        let context = api.create_context(device)?;
        devices.push(DeviceContext {
            ordinal,
            name,
            compute_capability,
            device,
            context,
            module: None,
        });
    }
    Ok(devices)
}

// ============================================================================
// Device Inventory Report
// ============================================================================

/// One row of the inventory report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceReportRow {
    /// Device ordinal
    pub ordinal: i32,
    /// Device name
    pub name: String,
    /// Compute capability (major, minor)
    pub compute_capability: (i32, i32),
}

/// The `-GPUInfo` inventory: every device's identity and capability, plus
/// the capability spread when more than one device is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceReport {
    rows: Vec<DeviceReportRow>,
}

impl DeviceReport {
    /// Snapshot a report from the discovered device list
    #[must_use]
    pub fn new(devices: &[DeviceContext]) -> Self {
        let rows = devices
            .iter()
            .map(|d| DeviceReportRow {
                ordinal: d.ordinal,
                name: d.name.clone(),
                compute_capability: d.compute_capability,
            })
            .collect();
        Self { rows }
    }

    /// Report rows in ordinal order
    #[must_use]
    pub fn rows(&self) -> &[DeviceReportRow] {
        &self.rows
    }

    /// Highest compute capability across devices
    #[must_use]
    pub fn max_capability(&self) -> Option<(i32, i32)> {
        self.rows.iter().map(|r| r.compute_capability).max()
    }

    /// Lowest compute capability across devices
    #[must_use]
    pub fn min_capability(&self) -> Option<(i32, i32)> {
        self.rows.iter().map(|r| r.compute_capability).min()
    }
}

impl fmt::Display for DeviceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Found CUDA capable devices: {}", self.rows.len())?;
        for row in &self.rows {
            let (major, minor) = row.compute_capability;
            writeln!(f, "GPU {}: {}", row.ordinal, row.name)?;
            writeln!(f, "Compute capability: {major}.{minor}")?;
            writeln!(f, "Suggested architecture: -arch=sm_{major}{minor}")?;
        }
        if self.rows.len() > 1 {
            if let (Some((max_major, max_minor)), Some((min_major, min_minor))) =
                (self.max_capability(), self.min_capability())
            {
                writeln!(f, "Max compute capability: {max_major}.{max_minor}")?;
                writeln!(f, "Min compute capability: {min_major}.{min_minor}")?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// Per-Invocation Device Listing
// ============================================================================

/// Printed on every multi-device invocation so users can correlate the
/// `_GPU<i>` handle suffixes with physical devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceListing {
    entries: Vec<(i32, String)>,
}

impl DeviceListing {
    /// Build a listing when more than one device is present
    #[must_use]
    pub fn new(devices: &[DeviceContext]) -> Option<Self> {
        if devices.len() <= 1 {
            return None;
        }
        Some(Self {
            entries: devices.iter().map(|d| (d.ordinal, d.name.clone())).collect(),
        })
    }

    /// (ordinal, name) pairs in ordinal order
    #[must_use]
    pub fn entries(&self) -> &[(i32, String)] {
        &self.entries
    }
}

impl fmt::Display for DeviceListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (ordinal, name) in &self.entries {
            writeln!(f, "GPU: {name}    kernel handle suffix: _GPU{ordinal}")?;
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;

    fn fake_device(ordinal: i32, name: &str, cc: (i32, i32)) -> DeviceContext {
        DeviceContext {
            ordinal,
            name: name.to_string(),
            compute_capability: cc,
            device: Device::from_raw(ordinal),
            context: Context::from_raw(ptr::null_mut()),
            module: None,
        }
    }

    #[test]
    fn test_arch_tag() {
        let dev = fake_device(0, "Test", (8, 6));
        assert_eq!(dev.arch_tag(), "sm_86");
    }

    #[test]
    fn test_report_single_device_omits_spread() {
        let devices = vec![fake_device(0, "NVIDIA A100", (8, 0))];
        let text = DeviceReport::new(&devices).to_string();
        assert!(text.contains("Found CUDA capable devices: 1"));
        assert!(text.contains("GPU 0: NVIDIA A100"));
        assert!(text.contains("Compute capability: 8.0"));
        assert!(text.contains("-arch=sm_80"));
        assert!(!text.contains("Max compute capability"));
    }

    #[test]
    fn test_report_multi_device_capability_spread() {
        let devices = vec![
            fake_device(0, "NVIDIA A100", (8, 0)),
            fake_device(1, "NVIDIA T4", (7, 5)),
        ];
        let report = DeviceReport::new(&devices);
        assert_eq!(report.max_capability(), Some((8, 0)));
        assert_eq!(report.min_capability(), Some((7, 5)));
        let text = report.to_string();
        assert!(text.contains("Max compute capability: 8.0"));
        assert!(text.contains("Min compute capability: 7.5"));
    }

    #[test]
    fn test_capability_ordering_is_pairwise() {
        // 7.5 outranks 7.0 but not 8.0; tuple ordering gets this right
        let devices = vec![
            fake_device(0, "a", (7, 5)),
            fake_device(1, "b", (8, 0)),
            fake_device(2, "c", (7, 0)),
        ];
        let report = DeviceReport::new(&devices);
        assert_eq!(report.max_capability(), Some((8, 0)));
        assert_eq!(report.min_capability(), Some((7, 0)));
    }

    #[test]
    fn test_listing_absent_for_single_device() {
        let devices = vec![fake_device(0, "only", (8, 0))];
        assert!(DeviceListing::new(&devices).is_none());
    }

    #[test]
    fn test_listing_names_all_devices() {
        let devices = vec![
            fake_device(0, "NVIDIA A100", (8, 0)),
            fake_device(1, "NVIDIA T4", (7, 5)),
        ];
        let listing = DeviceListing::new(&devices).unwrap();
        let text = listing.to_string();
        assert!(text.contains("NVIDIA A100"));
        assert!(text.contains("_GPU0"));
        assert!(text.contains("NVIDIA T4"));
        assert!(text.contains("_GPU1"));
    }
}
