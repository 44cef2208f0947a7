//! Cross-cutting utilities for Cyface applications
//!
//! This crate bundles the schema-versioned settings store with small
//! shared value types such as disk-space accounting.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod diskspace;

pub use diskspace::{DiskConsumption, MINIMUM_MEGABYTES_REQUIRED};
pub use settings::{
    AppSettings, CorruptionPolicy, LegacyPreferences, MigrationPipeline, MigrationStep, Settings,
    SettingsConfig, SettingsError, CURRENT_VERSION,
};
