// Persisted app settings and library configuration.
//
// `settings.json` lives next to the library data and records the active
// store mode plus the watched folder list. A corrupt settings file is
// replaced with defaults rather than blocking startup.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{
    APP_NAME, APP_ORGANIZATION, APP_QUALIFIER, DEBOUNCE_MAX_DELAY_FACTOR, DEBOUNCE_WINDOW_MS,
    MAX_ITEM_COUNT, SETTINGS_FILENAME, WATCH_DEPTH,
};
use crate::error::{Result, ShoeboxError};
use crate::store::StoreMode;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub store_mode: StoreMode,
    #[serde(default)]
    pub watched_folders: Vec<String>,
}

/// Tunable parameters for one library instance.
#[derive(Debug, Clone)]
pub struct LibraryConfig {
    /// Item count at which the library migrates between backends.
    pub max_item_count: usize,
    /// Debounce window for coalescing filesystem events, in milliseconds.
    pub debounce_window_ms: u64,
    /// Upper bound on how long continuous activity may postpone a flush,
    /// as a multiple of the debounce window.
    pub debounce_max_delay_factor: u32,
    /// Folder nesting levels the watcher observes.
    pub watch_depth: usize,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            max_item_count: MAX_ITEM_COUNT,
            debounce_window_ms: DEBOUNCE_WINDOW_MS,
            debounce_max_delay_factor: DEBOUNCE_MAX_DELAY_FACTOR,
            watch_depth: WATCH_DEPTH,
        }
    }
}

/// Resolve the per-user data directory.
pub fn default_data_dir() -> Result<PathBuf> {
    directories::ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| ShoeboxError::InvalidPath("no user data directory available".into()))
}

pub fn settings_path(data_dir: &Path) -> PathBuf {
    data_dir.join(SETTINGS_FILENAME)
}

pub fn load_settings(data_dir: &Path) -> Settings {
    let path = settings_path(data_dir);
    if !path.exists() {
        return Settings::default();
    }
    match fs::read_to_string(&path) {
        Ok(text) => match serde_json::from_str(&text) {
            Ok(settings) => settings,
            Err(e) => {
                log::error!("settings file corrupt, resetting to defaults: {}", e);
                Settings::default()
            }
        },
        Err(e) => {
            log::error!("failed to read settings: {}", e);
            Settings::default()
        }
    }
}

pub fn save_settings(data_dir: &Path, settings: &Settings) -> Result<()> {
    fs::create_dir_all(data_dir)?;
    let path = settings_path(data_dir);
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_string_pretty(settings)?)?;
    fs::rename(&tmp, &path)?;
    Ok(())
}
