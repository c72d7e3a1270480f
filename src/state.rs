use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::db::{DbError, StoryDb};
use crate::error::ServiceError;
use crate::types::Config;

/// Shared application state: the loaded config and the open database.
pub struct AppState {
    pub config: Mutex<Config>,
    pub db: Mutex<Option<StoryDb>>,
}

impl AppState {
    /// Load config and open the database. A database that fails to open is
    /// logged and left closed; operations then fail with a storage error.
    pub fn new() -> Self {
        let config = match load_config() {
            Ok(config) => config,
            Err(e) => {
                log::warn!("{e}. Using default configuration.");
                Config::default()
            }
        };

        let db = match StoryDb::open(config.db_path.as_deref().map(Path::new)) {
            Ok(db) => Some(db),
            Err(e) => {
                log::warn!("Failed to open story database: {e}. DB features disabled.");
                None
            }
        };

        Self::with_parts(config, db)
    }

    pub fn with_parts(config: Config, db: Option<StoryDb>) -> Self {
        AppState {
            config: Mutex::new(config),
            db: Mutex::new(db),
        }
    }

    /// Run `f` against the open database.
    pub fn with_db<T, F>(&self, f: F) -> Result<T, ServiceError>
    where
        F: FnOnce(&StoryDb) -> Result<T, ServiceError>,
    {
        let guard = self.db.lock();
        let db = guard.as_ref().ok_or(ServiceError::Storage(DbError::NotOpen))?;
        f(db)
    }

    /// Snapshot of the current config.
    pub fn config(&self) -> Config {
        self.config.lock().clone()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

pub fn config_path() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or("Could not find home directory")?;
    Ok(home.join(".storydesk").join("config.json"))
}

/// Load config from ~/.storydesk/config.json. A missing file yields defaults.
pub fn load_config() -> Result<Config, String> {
    load_config_from(&config_path()?)
}

pub fn load_config_from(path: &Path) -> Result<Config, String> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let content = fs::read_to_string(path).map_err(|e| format!("Failed to read config: {}", e))?;
    if content.trim().is_empty() {
        return Ok(Config::default());
    }

    serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {}", e))
}

/// Apply `mutator` to the in-memory config and write it back to disk.
pub fn create_or_update_config(
    state: &AppState,
    mutator: impl FnOnce(&mut Config),
) -> Result<Config, String> {
    write_config_with(state, &config_path()?, mutator)
}

fn write_config_with(
    state: &AppState,
    path: &Path,
    mutator: impl FnOnce(&mut Config),
) -> Result<Config, String> {
    let mut guard = state.config.lock();
    let mut config = guard.clone();
    mutator(&mut config);

    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| format!("Failed to create config dir: {}", e))?;
        }
    }

    let content = serde_json::to_string_pretty(&config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, content).map_err(|e| format!("Failed to write config: {}", e))?;

    *guard = config.clone();
    Ok(config)
}
