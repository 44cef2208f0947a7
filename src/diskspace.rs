//! Disk-space accounting
//!
//! Captured measurements fill up the device over time; callers use
//! [`DiskConsumption`] to decide when to stop capturing or delete
//! already-synchronized data.

use serde::{Deserialize, Serialize};

/// The minimum free space in megabytes required for capturing. Filling the
/// disk completely would slow down the device and could render it unusable.
pub const MINIMUM_MEGABYTES_REQUIRED: u64 = 100;

/// A snapshot of the disk space used by and still available to the app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskConsumption {
    /// The count of bytes currently used by this app.
    pub consumed_bytes: u64,
    /// The count of bytes still available for this app.
    pub available_bytes: u64,
}

impl DiskConsumption {
    /// Creates a new snapshot from the given byte counts.
    pub fn new(consumed_bytes: u64, available_bytes: u64) -> Self {
        Self { consumed_bytes, available_bytes }
    }

    /// The available space in whole megabytes.
    pub fn available_megabytes(&self) -> u64 {
        self.available_bytes / (1024 * 1024)
    }

    /// Whether more than [`MINIMUM_MEGABYTES_REQUIRED`] megabytes are still
    /// available for capturing.
    pub fn enough_space_available(&self) -> bool {
        self.available_megabytes() > MINIMUM_MEGABYTES_REQUIRED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEGABYTE: u64 = 1024 * 1024;

    #[test]
    fn test_enough_space_above_threshold() {
        let consumption = DiskConsumption::new(0, 101 * MEGABYTE);
        assert!(consumption.enough_space_available());
    }

    #[test]
    fn test_exactly_threshold_is_not_enough() {
        let consumption = DiskConsumption::new(0, 100 * MEGABYTE);
        assert!(!consumption.enough_space_available());
    }

    #[test]
    fn test_empty_disk_is_not_enough() {
        let consumption = DiskConsumption::new(50 * MEGABYTE, 0);
        assert!(!consumption.enough_space_available());
    }

    #[test]
    fn test_available_megabytes_rounds_down() {
        let consumption = DiskConsumption::new(0, 2 * MEGABYTE - 1);
        assert_eq!(consumption.available_megabytes(), 1);
    }

    #[test]
    fn test_serialization_round_trip() {
        let consumption = DiskConsumption::new(42, 1024);
        let json = serde_json::to_string(&consumption).unwrap();
        let parsed: DiskConsumption = serde_json::from_str(&json).unwrap();
        assert_eq!(consumption, parsed);
    }
}
