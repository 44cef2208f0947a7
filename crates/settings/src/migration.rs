//! Schema migrations for the settings record
//!
//! Every persisted record carries a schema version. A [`MigrationPipeline`]
//! holds one pure step per source version and applies them in increasing
//! order until the record reaches the target version. A version without a
//! step is a packaging bug and fails loudly instead of being skipped.

use std::collections::BTreeMap;
use tracing::info;

use crate::legacy::{
    LegacyPreferences, ACCEPTED_REPORTING_KEY, ACCEPTED_TERMS_KEY, CENTER_MAP_KEY, MODALITY_KEY,
    SENSOR_FREQUENCY_KEY, SYNCHRONIZATION_KEY,
};
use crate::record::{
    Settings, CURRENT_VERSION, DEFAULT_ACCEPTED_TERMS, DEFAULT_CENTER_MAP, DEFAULT_MODALITY,
    DEFAULT_REPORT_ERRORS, DEFAULT_SENSOR_FREQUENCY, DEFAULT_UPLOAD_ENABLED,
};
use crate::store::{Result, SettingsError};

/// A pure transform advancing a record by exactly one schema version.
pub struct MigrationStep {
    source_version: u32,
    apply: Box<dyn Fn(Settings) -> Settings + Send + Sync>,
}

impl MigrationStep {
    /// Creates a step upgrading records at `source_version` to
    /// `source_version + 1`.
    pub fn new<F>(source_version: u32, apply: F) -> Self
    where
        F: Fn(Settings) -> Settings + Send + Sync + 'static,
    {
        Self { source_version, apply: Box::new(apply) }
    }
}

/// An ordered, gap-checked sequence of migration steps.
pub struct MigrationPipeline {
    steps: BTreeMap<u32, MigrationStep>,
    target_version: u32,
}

impl MigrationPipeline {
    /// Builds a pipeline, validating at construction that a step exists for
    /// every source version below `target_version`.
    pub fn new(steps: Vec<MigrationStep>, target_version: u32) -> Result<Self> {
        let steps: BTreeMap<u32, MigrationStep> =
            steps.into_iter().map(|s| (s.source_version, s)).collect();

        for version in 0..target_version {
            if !steps.contains_key(&version) {
                return Err(SettingsError::MigrationGap { version });
            }
        }

        Ok(Self { steps, target_version })
    }

    /// The pipeline shipped with this crate, targeting [`CURRENT_VERSION`].
    pub fn standard() -> Self {
        // The step set is complete by construction, so new() cannot fail here.
        Self::new(vec![MigrationStep::new(0, upgrade_v0_to_v1)], CURRENT_VERSION)
            .unwrap_or_else(|_| unreachable!("standard pipeline has no gaps"))
    }

    /// The version this pipeline upgrades records to.
    pub fn target_version(&self) -> u32 {
        self.target_version
    }

    /// Applies steps in increasing version order until the record reaches
    /// the target version.
    ///
    /// A record above the target version also fails: it was written by a
    /// newer build and no step here knows how to handle it.
    pub fn run(&self, mut state: Settings) -> Result<Settings> {
        if state.version > self.target_version {
            return Err(SettingsError::MigrationGap { version: state.version });
        }

        while state.version < self.target_version {
            let version = state.version;
            let step = self
                .steps
                .get(&version)
                .ok_or(SettingsError::MigrationGap { version })?;

            info!("Migrating settings from version {} to {}", version, version + 1);
            state = (step.apply)(state);

            // A step that fails to advance the version would loop forever.
            if state.version != version + 1 {
                return Err(SettingsError::InvalidMigrationStep {
                    version,
                    produced: state.version,
                });
            }
        }

        Ok(state)
    }
}

/// Imports the legacy flat preferences into a version-1 record.
///
/// Each key falls back to its historical default when absent or wrong-typed.
/// The legacy file itself stays untouched; idempotence is guaranteed by the
/// structured file's version, never by re-reading legacy state.
pub fn import_legacy(prefs: &LegacyPreferences) -> Settings {
    info!("Importing legacy preferences into settings version 1");
    Settings {
        // Ensure the imported values below are used instead of the
        // version-0-to-1 defaults.
        version: 1,
        center_map: prefs.bool_or(CENTER_MAP_KEY, DEFAULT_CENTER_MAP),
        upload_enabled: prefs.bool_or(SYNCHRONIZATION_KEY, DEFAULT_UPLOAD_ENABLED),
        sensor_frequency: prefs.int_or(SENSOR_FREQUENCY_KEY, DEFAULT_SENSOR_FREQUENCY),
        report_errors: prefs.bool_or(ACCEPTED_REPORTING_KEY, DEFAULT_REPORT_ERRORS),
        modality: prefs.string(MODALITY_KEY).unwrap_or_default(),
        accepted_terms: prefs.int_or(ACCEPTED_TERMS_KEY, DEFAULT_ACCEPTED_TERMS),
    }
}

/// Version 0 means the structured file exists but was never populated, so
/// every field still holds its serialization zero-value. This step replaces
/// all of them with the documented defaults unconditionally.
fn upgrade_v0_to_v1(_state: Settings) -> Settings {
    Settings {
        version: 1,
        center_map: DEFAULT_CENTER_MAP,
        upload_enabled: DEFAULT_UPLOAD_ENABLED,
        sensor_frequency: DEFAULT_SENSOR_FREQUENCY,
        report_errors: DEFAULT_REPORT_ERRORS,
        modality: DEFAULT_MODALITY.to_string(),
        accepted_terms: DEFAULT_ACCEPTED_TERMS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::collections::HashMap;

    fn prefs(pairs: &[(&str, Value)]) -> LegacyPreferences {
        LegacyPreferences::from_values(
            pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
        )
    }

    #[test]
    fn test_standard_pipeline_targets_current_version() {
        assert_eq!(MigrationPipeline::standard().target_version(), CURRENT_VERSION);
    }

    #[test]
    fn test_standard_pipeline_upgrades_unpopulated_record() {
        let pipeline = MigrationPipeline::standard();

        // Raw version-0 values must not survive the upgrade.
        let migrated = pipeline
            .run(Settings { sensor_frequency: 42, modality: "CAR".to_string(), ..Settings::default() })
            .unwrap();

        assert_eq!(migrated, Settings::with_defaults());
    }

    #[test]
    fn test_current_record_passes_through_unchanged() {
        let pipeline = MigrationPipeline::standard();
        let record = Settings { accepted_terms: 5, ..Settings::with_defaults() };

        let migrated = pipeline.run(record.clone()).unwrap();
        assert_eq!(migrated, record);
    }

    #[test]
    fn test_gap_in_step_set_fails_construction() {
        // Steps for 0 and 2 but not 1.
        let result = MigrationPipeline::new(
            vec![
                MigrationStep::new(0, upgrade_v0_to_v1),
                MigrationStep::new(2, |mut s| {
                    s.version = 3;
                    s
                }),
            ],
            3,
        );

        assert!(matches!(result, Err(SettingsError::MigrationGap { version: 1 })));
    }

    #[test]
    fn test_step_that_does_not_advance_version_fails() {
        let pipeline =
            MigrationPipeline::new(vec![MigrationStep::new(0, |s| s)], 1).unwrap();

        let result = pipeline.run(Settings::default());
        assert!(matches!(
            result,
            Err(SettingsError::InvalidMigrationStep { version: 0, produced: 0 })
        ));
    }

    #[test]
    fn test_record_above_target_version_fails() {
        let pipeline = MigrationPipeline::standard();
        let record = Settings { version: 9, ..Settings::with_defaults() };

        let result = pipeline.run(record);
        assert!(matches!(result, Err(SettingsError::MigrationGap { version: 9 })));
    }

    #[test]
    fn test_import_legacy_uses_present_values_and_defaults() {
        let prefs = prefs(&[
            (SYNCHRONIZATION_KEY, json!(false)),
            (SENSOR_FREQUENCY_KEY, json!(200)),
        ]);

        let imported = import_legacy(&prefs);
        assert_eq!(imported.version, 1);
        assert!(!imported.upload_enabled);
        assert_eq!(imported.sensor_frequency, 200);
        // Absent keys take the documented defaults.
        assert!(imported.center_map);
        assert!(!imported.report_errors);
        assert_eq!(imported.accepted_terms, 0);
        assert_eq!(imported.modality, "");
    }

    #[test]
    fn test_import_legacy_empty_file_yields_defaults() {
        let imported = import_legacy(&LegacyPreferences::from_values(HashMap::new()));

        assert_eq!(imported.version, 1);
        assert!(imported.center_map);
        assert!(imported.upload_enabled);
        assert_eq!(imported.sensor_frequency, 100);
        assert!(!imported.report_errors);
        assert_eq!(imported.modality, "");
        assert_eq!(imported.accepted_terms, 0);
    }

    #[test]
    fn test_import_legacy_recovers_per_key_on_wrong_types() {
        let prefs = prefs(&[
            (CENTER_MAP_KEY, json!("yes")),
            (SENSOR_FREQUENCY_KEY, json!(25)),
        ]);

        let imported = import_legacy(&prefs);
        // Wrong-typed key recovers to its own default, valid keys import.
        assert!(imported.center_map);
        assert_eq!(imported.sensor_frequency, 25);
    }
}
