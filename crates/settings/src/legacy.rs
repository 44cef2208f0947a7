//! Read-only access to the legacy flat preferences file
//!
//! The legacy store is an unversioned key-value file which is only read once,
//! when the structured settings file is created. It is never written or
//! deleted by this crate.

use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tokio::fs;
use tracing::warn;

use crate::store::{Result, SettingsError};

/// File name of the legacy flat preferences store, historically.
///
/// *Don't change this, this is migration code!*
pub const LEGACY_FILE_NAME: &str = "AppPreferences.json";

/// Identifies the accepted terms version in the legacy preferences.
pub const ACCEPTED_TERMS_KEY: &str = "de.cyface.app.accepted_terms";

/// Identifies if the user opted in to error reporting in the legacy
/// preferences.
pub const ACCEPTED_REPORTING_KEY: &str = "de.cyface.app.accepted_reporting";

/// Identifies the selected modality in the legacy preferences.
pub const MODALITY_KEY: &str = "de.cyface.app.modality";

/// Identifies the map centering flag in the legacy preferences.
pub const CENTER_MAP_KEY: &str = "de.cyface.app.zoom_to_location";

/// Identifies the synchronization flag in the legacy preferences.
pub const SYNCHRONIZATION_KEY: &str = "de.cyface.app.synchronization_enabled";

/// Identifies the preferred sensor frequency in the legacy preferences.
pub const SENSOR_FREQUENCY_KEY: &str = "de.cyface.app.sensor_frequency";

/// A snapshot of the legacy flat preferences file.
///
/// Legacy values were never schema-checked, so every accessor recovers
/// locally: a key holding a value of the wrong type yields the caller's
/// default instead of aborting the whole import.
#[derive(Debug, Clone, Default)]
pub struct LegacyPreferences {
    values: HashMap<String, Value>,
}

impl LegacyPreferences {
    /// Reads the legacy preferences file, or returns `None` if it does not
    /// exist.
    ///
    /// An existing but unparseable file behaves as an empty key set, so the
    /// import still runs and produces the documented defaults.
    pub async fn read(path: &Path) -> Result<Option<Self>> {
        let contents = match fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SettingsError::Storage(e)),
        };

        match serde_json::from_str::<HashMap<String, Value>>(&contents) {
            Ok(values) => Ok(Some(Self { values })),
            Err(e) => {
                warn!("Legacy preferences file unparseable, importing defaults: {e}");
                Ok(Some(Self::default()))
            }
        }
    }

    /// Builds a snapshot from in-memory values (for testing).
    pub fn from_values(values: HashMap<String, Value>) -> Self {
        Self { values }
    }

    /// Returns the boolean stored under `key`, failing on a wrong-typed value.
    pub fn try_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.values.get(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(_) => Err(SettingsError::InvalidLegacyValue {
                key: key.to_string(),
                expected: "boolean",
            }),
        }
    }

    /// Returns the integer stored under `key`, failing on a wrong-typed value.
    pub fn try_int(&self, key: &str) -> Result<Option<i32>> {
        match self.values.get(key) {
            None => Ok(None),
            Some(Value::Number(n)) => match n.as_i64().and_then(|v| i32::try_from(v).ok()) {
                Some(v) => Ok(Some(v)),
                None => Err(SettingsError::InvalidLegacyValue {
                    key: key.to_string(),
                    expected: "integer",
                }),
            },
            Some(_) => Err(SettingsError::InvalidLegacyValue {
                key: key.to_string(),
                expected: "integer",
            }),
        }
    }

    /// Returns the string stored under `key`, failing on a wrong-typed value.
    pub fn try_string(&self, key: &str) -> Result<Option<String>> {
        match self.values.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(SettingsError::InvalidLegacyValue {
                key: key.to_string(),
                expected: "string",
            }),
        }
    }

    /// Returns the boolean stored under `key`, recovering to `default` when
    /// the key is absent or wrong-typed.
    pub fn bool_or(&self, key: &str, default: bool) -> bool {
        match self.try_bool(key) {
            Ok(value) => value.unwrap_or(default),
            Err(e) => {
                warn!("{e}, using default {default}");
                default
            }
        }
    }

    /// Returns the integer stored under `key`, recovering to `default` when
    /// the key is absent or wrong-typed.
    pub fn int_or(&self, key: &str, default: i32) -> i32 {
        match self.try_int(key) {
            Ok(value) => value.unwrap_or(default),
            Err(e) => {
                warn!("{e}, using default {default}");
                default
            }
        }
    }

    /// Returns the string stored under `key`, recovering to `None` when the
    /// key is absent or wrong-typed.
    pub fn string(&self, key: &str) -> Option<String> {
        match self.try_string(key) {
            Ok(value) => value,
            Err(e) => {
                warn!("{e}, using no value");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn prefs(pairs: &[(&str, Value)]) -> LegacyPreferences {
        LegacyPreferences::from_values(
            pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
        )
    }

    #[tokio::test]
    async fn test_read_missing_file_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(LEGACY_FILE_NAME);

        let result = LegacyPreferences::read(&path).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_read_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(LEGACY_FILE_NAME);
        std::fs::write(&path, r#"{"de.cyface.app.synchronization_enabled":false}"#).unwrap();

        let prefs = LegacyPreferences::read(&path).await.unwrap().unwrap();
        assert_eq!(prefs.try_bool(SYNCHRONIZATION_KEY).unwrap(), Some(false));
    }

    #[tokio::test]
    async fn test_read_unparseable_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(LEGACY_FILE_NAME);
        std::fs::write(&path, "not json at all").unwrap();

        let prefs = LegacyPreferences::read(&path).await.unwrap().unwrap();
        assert_eq!(prefs.try_bool(CENTER_MAP_KEY).unwrap(), None);
    }

    #[test]
    fn test_try_bool_wrong_type_fails() {
        let prefs = prefs(&[(CENTER_MAP_KEY, json!("yes"))]);
        let err = prefs.try_bool(CENTER_MAP_KEY).unwrap_err();
        assert!(matches!(err, SettingsError::InvalidLegacyValue { .. }));
    }

    #[test]
    fn test_try_int_rejects_out_of_range() {
        let prefs = prefs(&[(SENSOR_FREQUENCY_KEY, json!(i64::MAX))]);
        assert!(prefs.try_int(SENSOR_FREQUENCY_KEY).is_err());
    }

    #[test]
    fn test_recovering_accessors_fall_back_to_default() {
        let prefs = prefs(&[
            (CENTER_MAP_KEY, json!(12)),
            (SENSOR_FREQUENCY_KEY, json!("fast")),
            (MODALITY_KEY, json!(true)),
        ]);

        assert!(prefs.bool_or(CENTER_MAP_KEY, true));
        assert_eq!(prefs.int_or(SENSOR_FREQUENCY_KEY, 100), 100);
        assert_eq!(prefs.string(MODALITY_KEY), None);
    }

    #[test]
    fn test_recovering_accessors_return_present_values() {
        let prefs = prefs(&[
            (CENTER_MAP_KEY, json!(false)),
            (SENSOR_FREQUENCY_KEY, json!(200)),
            (MODALITY_KEY, json!("BICYCLE")),
        ]);

        assert!(!prefs.bool_or(CENTER_MAP_KEY, true));
        assert_eq!(prefs.int_or(SENSOR_FREQUENCY_KEY, 100), 200);
        assert_eq!(prefs.string(MODALITY_KEY), Some("BICYCLE".to_string()));
    }
}
