//! Durable configuration store.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use agent_primitives::ServerLocator;
use tracing::{debug, warn};

use crate::{AgentSettings, ConfigResult};

/// Thread-safe holder of the agent's settings.
///
/// All writes go through one mutex. A file-backed store rewrites its file after
/// every mutation; a failed write is logged and the in-memory value is kept,
/// so callers never observe a half-applied change.
#[derive(Debug)]
pub struct ConfigStore {
    path: Option<PathBuf>,
    settings: Mutex<AgentSettings>,
}

impl ConfigStore {
    /// Creates a store that never touches disk.
    #[must_use]
    pub fn in_memory(settings: AgentSettings) -> Self {
        Self {
            path: None,
            settings: Mutex::new(settings),
        }
    }

    /// Opens a JSON settings file, falling back to defaults when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`](crate::ConfigError) when the file exists but
    /// cannot be read, decoded, or validated.
    pub fn open(path: impl Into<PathBuf>) -> ConfigResult<Self> {
        let path = path.into();
        let settings = if path.exists() {
            let data = fs::read(&path)?;
            let settings: AgentSettings = serde_json::from_slice(&data)?;
            debug!(path = %path.display(), "loaded agent configuration");
            settings
        } else {
            debug!(path = %path.display(), "no agent configuration file; using defaults");
            AgentSettings::default()
        };
        settings.validate()?;

        Ok(Self {
            path: Some(path),
            settings: Mutex::new(settings),
        })
    }

    /// Returns the backing file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns a copy of the current settings.
    #[must_use]
    pub fn snapshot(&self) -> AgentSettings {
        self.lock().clone()
    }

    /// Applies `change` and persists the result.
    pub fn update(&self, change: impl FnOnce(&mut AgentSettings)) {
        let mut guard = self.lock();
        change(&mut guard);
        self.persist(&guard);
    }

    /// Name the agent registers under.
    #[must_use]
    pub fn agent_name(&self) -> String {
        self.lock().agent_name.clone()
    }

    /// Server the agent currently points at.
    #[must_use]
    pub fn server_locator(&self) -> ServerLocator {
        self.lock().server.clone()
    }

    /// Points the agent at a new server.
    pub fn set_server_locator(&self, locator: ServerLocator) {
        self.update(|settings| settings.server = locator);
    }

    /// Security token currently held, if any.
    #[must_use]
    pub fn security_token(&self) -> Option<String> {
        self.lock().security_token.clone()
    }

    /// Stores or clears the security token.
    pub fn set_security_token(&self, token: Option<String>) {
        self.update(|settings| settings.security_token = token);
    }

    /// Directory holding the persisted failover list.
    #[must_use]
    pub fn data_directory(&self) -> PathBuf {
        self.lock().data_directory.clone()
    }

    /// Relocates the data directory.
    pub fn set_data_directory(&self, dir: impl Into<PathBuf>) {
        let dir = dir.into();
        self.update(|settings| settings.data_directory = dir);
    }

    fn lock(&self) -> MutexGuard<'_, AgentSettings> {
        self.settings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, settings: &AgentSettings) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(err) = write_settings(path, settings) {
            warn!(path = %path.display(), %err, "failed to persist agent configuration");
        }
    }
}

fn write_settings(path: &Path, settings: &AgentSettings) -> ConfigResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_vec_pretty(settings)?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
