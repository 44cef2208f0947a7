//! The durable settings store
//!
//! One store handle exists per settings file and process, obtained through
//! [`AppSettings::load`]. First access runs the migration pipeline to
//! completion and commits the result before the handle becomes usable, so
//! readers never observe a partially migrated record.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, Weak};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::warn;

use crate::legacy::LegacyPreferences;
use crate::migration::{import_legacy, MigrationPipeline};
use crate::record::Settings;

/// Settings error types
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Durable storage cannot be opened, read, or written
    #[error("Storage unavailable: {0}")]
    Storage(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The settings file is present but fails to deserialize or verify
    #[error("Settings file corrupt: {0}")]
    Corrupt(String),

    /// No migration step is defined for an encountered schema version
    #[error("No migration step for settings version {version}")]
    MigrationGap {
        /// The schema version without a step
        version: u32,
    },

    /// A migration step produced a record at the wrong schema version
    #[error("Migration step for version {version} produced version {produced} instead of advancing by one")]
    InvalidMigrationStep {
        /// The source version the step ran against
        version: u32,
        /// The version the step actually produced
        produced: u32,
    },

    /// A legacy key holds a value of the wrong type
    #[error("Invalid legacy value for key {key}, expected {expected}")]
    InvalidLegacyValue {
        /// The legacy preference key
        key: String,
        /// The expected value type
        expected: &'static str,
    },
}

/// Result type for settings operations
pub type Result<T> = std::result::Result<T, SettingsError>;

/// Policy applied when the settings file is present but corrupt.
///
/// The safe default is to fail loudly; resetting silently loses whatever
/// the user had configured and must be opted into deliberately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorruptionPolicy {
    /// Fail store construction with [`SettingsError::Corrupt`].
    #[default]
    Fail,
    /// Log the corruption and start over from an unpopulated record, which
    /// the migration pipeline then fills with the documented defaults.
    ResetToDefaults,
}

/// Settings store configuration
#[derive(Debug, Clone)]
pub struct SettingsConfig {
    /// Path of the structured settings file. Must live in persistent app
    /// storage, not a cache directory, or settings are lost on eviction.
    pub path: PathBuf,
    /// Path of the legacy flat preferences file, if one may exist.
    pub legacy_path: Option<PathBuf>,
    /// What to do when the settings file fails to deserialize.
    pub corruption_policy: CorruptionPolicy,
}

impl SettingsConfig {
    /// Create a new configuration for the given settings file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            legacy_path: None,
            corruption_policy: CorruptionPolicy::default(),
        }
    }

    /// Set the legacy preferences file to import from on first creation
    pub fn legacy_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.legacy_path = Some(path.into());
        self
    }

    /// Set the corruption policy
    pub fn corruption_policy(mut self, policy: CorruptionPolicy) -> Self {
        self.corruption_policy = policy;
        self
    }
}

/// On-disk envelope around the settings record.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedEnvelope {
    /// Checksum of the serialized settings, for corruption detection
    checksum: String,
    /// The settings record itself
    settings: Settings,
}

impl PersistedEnvelope {
    fn new(settings: &Settings) -> Result<Self> {
        let json = serde_json::to_string(settings)?;
        let checksum = format!("{:x}", md5::compute(&json));
        Ok(Self { checksum, settings: settings.clone() })
    }

    fn verify_checksum(&self) -> Result<()> {
        let json = serde_json::to_string(&self.settings)?;
        let computed = format!("{:x}", md5::compute(&json));

        if computed != self.checksum {
            return Err(SettingsError::Corrupt(format!(
                "checksum mismatch: expected {}, got {}",
                self.checksum, computed
            )));
        }

        Ok(())
    }
}

/// Handle registry keyed by settings-file path.
///
/// Guarantees at most one live store handle per file and process, and
/// therefore at most one concurrent migration run per file: the registry
/// lock is held across store construction, so concurrent first accesses
/// queue up behind the one that constructs.
static REGISTRY: OnceLock<Mutex<HashMap<PathBuf, Weak<AppSettings>>>> = OnceLock::new();

fn registry() -> &'static Mutex<HashMap<PathBuf, Weak<AppSettings>>> {
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Durable, process-shared access to the current [`Settings`] record.
///
/// # Example
///
/// ```no_run
/// use settings::{AppSettings, SettingsConfig};
///
/// #[tokio::main]
/// async fn main() -> settings::store::Result<()> {
///     let store = AppSettings::load(SettingsConfig::new("settings.json")).await?;
///
///     store.set_upload_enabled(false).await?;
///     assert!(!store.get().await.upload_enabled);
///     Ok(())
/// }
/// ```
pub struct AppSettings {
    config: SettingsConfig,
    /// Current record; the write lock also serializes read-modify-write
    /// cycles in [`AppSettings::update`].
    state: RwLock<Settings>,
    /// Whole-record change notifications; subscribers project the fields
    /// they care about.
    tx: watch::Sender<Settings>,
}

impl AppSettings {
    /// Returns the store handle for the given settings file, constructing
    /// it on first access.
    ///
    /// Construction reads whatever is persisted (nothing, a legacy flat
    /// preferences file, or an older-versioned record), migrates it to the
    /// current schema version and commits the result to disk before the
    /// handle is handed out. Later calls for the same file return the
    /// existing handle, so only one handle per file exists in a process:
    /// the registry keys on the canonical path, so two spellings of the
    /// same file (relative segments, symlinked directories) cannot yield
    /// two handles with independent locks.
    pub async fn load(mut config: SettingsConfig) -> Result<Arc<Self>> {
        config.path = Self::canonical_path(&config.path).await?;

        let mut registry = registry().lock().await;

        if let Some(existing) = registry.get(&config.path).and_then(Weak::upgrade) {
            return Ok(existing);
        }

        let store = Arc::new(Self::open(config).await?);
        registry.insert(store.config.path.clone(), Arc::downgrade(&store));
        Ok(store)
    }

    /// Resolves the canonical form of the settings-file path.
    ///
    /// The file itself may not exist yet, so the containing directory is
    /// canonicalized and the file name re-joined.
    async fn canonical_path(path: &Path) -> Result<PathBuf> {
        let file_name = path.file_name().ok_or_else(|| {
            SettingsError::Storage(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("settings path has no file name: {}", path.display()),
            ))
        })?;

        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        Ok(fs::canonicalize(parent).await?.join(file_name))
    }

    /// Loads the persisted record, runs the migration pipeline and commits.
    async fn open(config: SettingsConfig) -> Result<Self> {
        let loaded = Self::read_record(&config).await?;
        let had_structured_file = loaded.is_some();

        // Legacy import only applies while no structured file was ever
        // written; afterwards the record version alone decides what runs.
        let state = match loaded {
            Some(record) => record,
            None => match &config.legacy_path {
                Some(legacy_path) => match LegacyPreferences::read(legacy_path).await? {
                    Some(prefs) => import_legacy(&prefs),
                    None => Settings::default(),
                },
                None => Settings::default(),
            },
        };

        let pipeline = MigrationPipeline::standard();
        let migrated = pipeline.run(state.clone())?;

        // Commit before the store becomes readable, so a crash cannot leave
        // a pre-migration record behind an already-visible handle.
        if !had_structured_file || migrated != state {
            Self::write_record(&config.path, &migrated).await?;
        }

        let (tx, _) = watch::channel(migrated.clone());
        Ok(Self { config, state: RwLock::new(migrated), tx })
    }

    /// Reads and verifies the persisted record, or `None` if no structured
    /// file exists yet.
    async fn read_record(config: &SettingsConfig) -> Result<Option<Settings>> {
        let contents = match fs::read_to_string(&config.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SettingsError::Storage(e)),
        };

        let parsed = serde_json::from_str::<PersistedEnvelope>(&contents)
            .map_err(|e| SettingsError::Corrupt(e.to_string()))
            .and_then(|envelope| {
                envelope.verify_checksum()?;
                Ok(envelope.settings)
            });

        match parsed {
            Ok(settings) => Ok(Some(settings)),
            Err(e) => match config.corruption_policy {
                CorruptionPolicy::Fail => Err(e),
                CorruptionPolicy::ResetToDefaults => {
                    warn!("Settings file corrupt, resetting to defaults: {e}");
                    // The file existed, so legacy import stays skipped and
                    // the version-0 upgrade fills in the defaults.
                    Ok(Some(Settings::default()))
                }
            },
        }
    }

    /// Writes the record atomically using a temp file and rename.
    async fn write_record(path: &Path, settings: &Settings) -> Result<()> {
        let envelope = PersistedEnvelope::new(settings)?;
        let json = serde_json::to_string_pretty(&envelope)?;
        let temp_path = path.with_extension("tmp");

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, path).await?;
        Ok(())
    }

    /// Get the current settings record
    pub async fn get(&self) -> Settings {
        self.state.read().await.clone()
    }

    /// Applies a transform to the current record and persists the result
    /// atomically.
    ///
    /// The write lock is held across the whole read-modify-write cycle, so
    /// concurrent `update` calls in this process never lose each other's
    /// changes. If persisting fails the in-memory record stays unchanged
    /// and the error propagates.
    pub async fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Settings),
    {
        let mut state = self.state.write().await;

        let mut updated = state.clone();
        f(&mut updated);
        // Transforms may not move the record off the current schema version.
        updated.version = state.version;

        Self::write_record(&self.config.path, &updated).await?;
        *state = updated.clone();
        drop(state);

        let _ = self.tx.send(updated);
        Ok(())
    }

    /// Subscribe to whole-record change notifications
    pub fn subscribe(&self) -> watch::Receiver<Settings> {
        self.tx.subscribe()
    }

    /// Whether the map should be centered on the current location
    pub async fn center_map(&self) -> bool {
        self.state.read().await.center_map
    }

    /// Saves whether the map should be centered on the current location
    pub async fn set_center_map(&self, value: bool) -> Result<()> {
        self.update(|s| s.center_map = value).await
    }

    /// Whether captured data should be uploaded or synchronized
    pub async fn upload_enabled(&self) -> bool {
        self.state.read().await.upload_enabled
    }

    /// Saves whether captured data should be uploaded or synchronized
    pub async fn set_upload_enabled(&self, value: bool) -> Result<()> {
        self.update(|s| s.upload_enabled = value).await
    }

    /// The maximum frequency with which the IMU sensor should collect data
    pub async fn sensor_frequency(&self) -> i32 {
        self.state.read().await.sensor_frequency
    }

    /// Saves the sensor frequency
    pub async fn set_sensor_frequency(&self, value: i32) -> Result<()> {
        self.update(|s| s.sensor_frequency = value).await
    }

    /// Whether the user opted in to error reporting
    pub async fn report_errors(&self) -> bool {
        self.state.read().await.report_errors
    }

    /// Saves whether errors should be reported
    pub async fn set_report_errors(&self, value: bool) -> Result<()> {
        self.update(|s| s.report_errors = value).await
    }

    /// The currently selected modality, e.g. `"CAR"`
    pub async fn modality(&self) -> String {
        self.state.read().await.modality.clone()
    }

    /// Saves the currently selected modality
    pub async fn set_modality(&self, value: impl Into<String>) -> Result<()> {
        let value = value.into();
        self.update(|s| s.modality = value).await
    }

    /// The version of the terms accepted by the user
    pub async fn accepted_terms(&self) -> i32 {
        self.state.read().await.accepted_terms
    }

    /// Saves the version of the terms accepted by the user
    pub async fn set_accepted_terms(&self, value: i32) -> Result<()> {
        self.update(|s| s.accepted_terms = value).await
    }
}
