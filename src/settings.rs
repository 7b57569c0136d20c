//! Persisted key-value state shared by the presenter and the traffic observer.
//!
//! Everything in here is optional and absent-tolerant: the file may be
//! missing, partially filled, or written by an older build. Writers always
//! replace whole fields, so concurrent updates are last-write-wins.

use std::{
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, atomic::AtomicU64, atomic::Ordering},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app_dirs;

const SETTINGS_FILE_NAME: &str = "settings.toml";

/// Errors that may occur while loading or saving persisted settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings directory could not be resolved or created.
    #[error(transparent)]
    AppDir(#[from] app_dirs::AppDirError),
    /// Failed to read the settings file.
    #[error("Failed to read {path}: {source}")]
    Read {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Failed to write the settings file.
    #[error("Failed to write {path}: {source}")]
    Write {
        /// Path that failed to write.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Failed to parse the settings file as TOML.
    #[error("Invalid settings at {path}: {source}")]
    ParseToml {
        /// TOML file path.
        path: PathBuf,
        /// TOML parse error.
        source: toml::de::Error,
    },
    /// Failed to serialize settings to TOML.
    #[error("Failed to serialize settings for {path}: {source}")]
    SerializeToml {
        /// TOML file path.
        path: PathBuf,
        /// TOML serialization error.
        source: toml::ser::Error,
    },
}

/// Last values the user typed into the request form.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormValues {
    /// Carton identifier as entered (kept as text until validation).
    pub carton_id: Option<String>,
    /// Vendor identifier.
    pub vendor_id: Option<String>,
    /// SKU code.
    pub sku_code: Option<String>,
    /// Number of requests to send.
    pub request_count: Option<u32>,
    /// Delay between requests in milliseconds.
    pub delay_ms: Option<u64>,
}

/// Payload fields last seen on the wire by the traffic observer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapturedPayload {
    /// Captured carton identifier, rendered as text for pre-fill.
    pub carton_id: String,
    /// Captured vendor identifier.
    pub vendor_id: String,
    /// Captured SKU code.
    pub sku_code: String,
}

/// All persisted state, loaded at startup and rewritten on change.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Most recent passively captured session cookie header, if any.
    pub captured_cookie: Option<String>,
    /// Last entered form values.
    pub form: FormValues,
    /// Most recent passively captured payload, if any.
    pub captured_payload: Option<CapturedPayload>,
}

/// Resolve the settings file path inside the app root.
pub fn settings_path() -> Result<PathBuf, SettingsError> {
    Ok(app_dirs::app_root_dir()?.join(SETTINGS_FILE_NAME))
}

/// Load settings from `path`, returning defaults if the file is missing.
pub fn load_from_path(path: &Path) -> Result<Settings, SettingsError> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| SettingsError::ParseToml {
        path: path.to_path_buf(),
        source,
    })
}

/// Write settings to `path` atomically to prevent partial files on crash.
pub fn save_to_path(settings: &Settings, path: &Path) -> Result<(), SettingsError> {
    let data = toml::to_string_pretty(settings).map_err(|source| SettingsError::SerializeToml {
        path: path.to_path_buf(),
        source,
    })?;
    atomic_write(path, data.as_bytes()).map_err(|source| SettingsError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<(), std::io::Error> {
    static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);
    let dir = path.parent().ok_or_else(|| {
        std::io::Error::other("settings path has no parent directory")
    })?;
    std::fs::create_dir_all(dir)?;
    let tmp_path = dir.join(format!(
        ".{}.tmp-{}-{}",
        path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "settings".to_string()),
        std::process::id(),
        TMP_COUNTER.fetch_add(1, Ordering::Relaxed),
    ));

    let mut file = std::fs::File::create(&tmp_path)?;
    if let Err(err) = file.write_all(data).and_then(|()| file.sync_all()) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(err);
    }
    drop(file);
    if let Err(err) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(err);
    }
    #[cfg(unix)]
    {
        std::fs::File::open(dir)?.sync_all()?;
    }
    Ok(())
}

/// Shared handle over the persisted settings.
///
/// The observer thread and the UI both hold clones; mutations go through
/// [`SettingsStore::update`] which persists under the lock so writers cannot
/// interleave partial states.
#[derive(Clone)]
pub struct SettingsStore {
    inner: Arc<Mutex<StoreInner>>,
}

struct StoreInner {
    path: PathBuf,
    settings: Settings,
}

impl SettingsStore {
    /// Open the store at the default platform location.
    pub fn open() -> Result<Self, SettingsError> {
        Self::open_at(settings_path()?)
    }

    /// Open the store backed by a specific file.
    pub fn open_at(path: PathBuf) -> Result<Self, SettingsError> {
        let settings = load_from_path(&path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(StoreInner { path, settings })),
        })
    }

    /// Return a copy of the current settings.
    pub fn snapshot(&self) -> Settings {
        self.lock().settings.clone()
    }

    /// Mutate the settings and persist the result.
    pub fn update(
        &self,
        mutate: impl FnOnce(&mut Settings),
    ) -> Result<(), SettingsError> {
        let mut inner = self.lock();
        mutate(&mut inner.settings);
        save_to_path(&inner.settings, &inner.path)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempdir().unwrap();
        let loaded = load_from_path(&dir.path().join("settings.toml")).unwrap();
        assert_eq!(loaded, Settings::default());
    }

    #[test]
    fn roundtrips_through_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let store = SettingsStore::open_at(path.clone()).unwrap();
        store
            .update(|settings| {
                settings.form.vendor_id = Some("V123".to_string());
                settings.captured_cookie = Some("sid=abc".to_string());
            })
            .unwrap();

        let reloaded = load_from_path(&path).unwrap();
        assert_eq!(reloaded.form.vendor_id.as_deref(), Some("V123"));
        assert_eq!(reloaded.captured_cookie.as_deref(), Some("sid=abc"));
        assert_eq!(reloaded.captured_payload, None);
    }

    #[test]
    fn tolerates_unknown_and_missing_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(
            &path,
            "captured_cookie = \"sid=1\"\nfuture_knob = true\n\n[form]\nsku_code = \"SKU-9\"\n",
        )
        .unwrap();
        let loaded = load_from_path(&path).unwrap();
        assert_eq!(loaded.captured_cookie.as_deref(), Some("sid=1"));
        assert_eq!(loaded.form.sku_code.as_deref(), Some("SKU-9"));
        assert_eq!(loaded.form.carton_id, None);
    }

    #[test]
    fn last_write_wins_between_clones() {
        let dir = tempdir().unwrap();
        let store = SettingsStore::open_at(dir.path().join("settings.toml")).unwrap();
        let observer_side = store.clone();
        store
            .update(|settings| settings.captured_cookie = Some("sid=first".to_string()))
            .unwrap();
        observer_side
            .update(|settings| settings.captured_cookie = Some("sid=second".to_string()))
            .unwrap();
        assert_eq!(store.snapshot().captured_cookie.as_deref(), Some("sid=second"));
    }

    #[test]
    fn atomic_write_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        save_to_path(&Settings::default(), &path).unwrap();
        save_to_path(&Settings::default(), &path).unwrap();
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["settings.toml".to_string()]);
    }
}
