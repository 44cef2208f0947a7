//! The schema-versioned settings record
//!
//! A [`Settings`] value is the unit of persistence: it is replaced whole on
//! every write and carries the schema version which the migration pipeline
//! uses to decide which upgrade steps still have to run.

use serde::{Deserialize, Serialize};

/// The schema version the migration pipeline upgrades persisted records to.
///
/// Increase this when a migration becomes necessary, e.g. when a new field
/// is added, so a correct default is written instead of the serialization
/// default for that data type like `""` or `0`.
pub const CURRENT_VERSION: u32 = 1;

/// Default for [`Settings::center_map`].
pub const DEFAULT_CENTER_MAP: bool = true;

/// Default for [`Settings::upload_enabled`].
pub const DEFAULT_UPLOAD_ENABLED: bool = true;

/// Default for [`Settings::sensor_frequency`] in Hz.
pub const DEFAULT_SENSOR_FREQUENCY: i32 = 100;

/// Default for [`Settings::report_errors`].
pub const DEFAULT_REPORT_ERRORS: bool = false;

/// Default for [`Settings::accepted_terms`]; `0` means no terms accepted.
pub const DEFAULT_ACCEPTED_TERMS: i32 = 0;

/// Modality written when no modality was ever selected, or when a previously
/// selected modality is no longer supported.
pub const DEFAULT_MODALITY: &str = "UNKNOWN";

/// User settings shared by the Cyface UIs and libraries.
///
/// Readers always observe a record at [`CURRENT_VERSION`]; records at lower
/// versions only exist inside the migration pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Schema version of this record; `0` means the record was created but
    /// never populated with real values.
    #[serde(default)]
    pub version: u32,

    /// Whether the map should be centered on the current location.
    #[serde(default)]
    pub center_map: bool,

    /// Whether captured data should be uploaded or synchronized.
    #[serde(default)]
    pub upload_enabled: bool,

    /// The maximum frequency with which the IMU sensor should collect data,
    /// e.g. 100 Hz.
    #[serde(default)]
    pub sensor_frequency: i32,

    /// Whether the user opted in to error reporting.
    #[serde(default)]
    pub report_errors: bool,

    /// The currently selected modality, e.g. `"CAR"`.
    #[serde(default)]
    pub modality: String,

    /// The version of the terms accepted by the user, e.g. `5`.
    #[serde(default)]
    pub accepted_terms: i32,
}

impl Default for Settings {
    /// An unpopulated record at version `0`: all fields hold the
    /// serialization zero-values, not the documented user-facing defaults.
    /// The version-0-to-1 migration step replaces them.
    fn default() -> Self {
        Self {
            version: 0,
            center_map: false,
            upload_enabled: false,
            sensor_frequency: 0,
            report_errors: false,
            modality: String::new(),
            accepted_terms: 0,
        }
    }
}

impl Settings {
    /// A record populated with the documented defaults, at [`CURRENT_VERSION`].
    pub fn with_defaults() -> Self {
        Self {
            version: CURRENT_VERSION,
            center_map: DEFAULT_CENTER_MAP,
            upload_enabled: DEFAULT_UPLOAD_ENABLED,
            sensor_frequency: DEFAULT_SENSOR_FREQUENCY,
            report_errors: DEFAULT_REPORT_ERRORS,
            modality: DEFAULT_MODALITY.to_string(),
            accepted_terms: DEFAULT_ACCEPTED_TERMS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unpopulated() {
        let settings = Settings::default();
        assert_eq!(settings.version, 0);
        assert!(!settings.center_map);
        assert!(!settings.upload_enabled);
        assert_eq!(settings.sensor_frequency, 0);
        assert_eq!(settings.modality, "");
    }

    #[test]
    fn test_with_defaults_is_current() {
        let settings = Settings::with_defaults();
        assert_eq!(settings.version, CURRENT_VERSION);
        assert!(settings.center_map);
        assert!(settings.upload_enabled);
        assert_eq!(settings.sensor_frequency, 100);
        assert!(!settings.report_errors);
        assert_eq!(settings.modality, "UNKNOWN");
        assert_eq!(settings.accepted_terms, 0);
    }

    #[test]
    fn test_serialization_round_trip() {
        let settings = Settings::with_defaults();
        let json = serde_json::to_string(&settings).unwrap();
        let parsed: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(settings, parsed);
    }

    #[test]
    fn test_missing_fields_deserialize_to_zero_values() {
        // Records written by older schema versions may lack newer fields.
        let parsed: Settings = serde_json::from_str(r#"{"version":1}"#).unwrap();
        assert_eq!(parsed.version, 1);
        assert!(!parsed.center_map);
        assert_eq!(parsed.sensor_frequency, 0);
    }
}
