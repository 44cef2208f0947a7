//! Schema-versioned user settings for Cyface applications
//!
//! This crate provides a durable settings store with a one-time import
//! from the legacy flat preferences file and ordered schema migrations.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod legacy;
pub mod migration;
pub mod record;
pub mod store;

pub use legacy::LegacyPreferences;
pub use migration::{MigrationPipeline, MigrationStep};
pub use record::{Settings, CURRENT_VERSION};
pub use store::{AppSettings, CorruptionPolicy, SettingsConfig, SettingsError};
