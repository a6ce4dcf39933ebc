use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::{CoreError, CoreErrorKind, ManagerId};
use crate::persistence::PersistenceResult;
use crate::persistence::file_store::write_atomic;

pub const CONFIG_FILE: &str = "config.json";

/// Engine settings, stored as PascalCase JSON. Missing keys take defaults.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct EngineConfig {
    pub disabled_managers: BTreeSet<ManagerId>,
    pub elevation_helper_path: String,
    pub updates_check_interval_secs: u64,
    pub allow_parallel_installs: bool,
    pub unknown_source_resolve_wait_ms: u64,
    pub source_reload_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            disabled_managers: BTreeSet::new(),
            elevation_helper_path: "gsudo".to_string(),
            updates_check_interval_secs: 3600,
            allow_parallel_installs: false,
            unknown_source_resolve_wait_ms: 3000,
            source_reload_timeout_secs: 10,
        }
    }
}

impl EngineConfig {
    pub fn path(settings_dir: &Path) -> PathBuf {
        settings_dir.join(CONFIG_FILE)
    }

    /// Reads `<settings_dir>/config.json`; an absent file yields defaults.
    pub fn load(settings_dir: &Path) -> PersistenceResult<Self> {
        let path = Self::path(settings_dir);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(error) => {
                return Err(config_error(&path, &error.to_string()));
            }
        };
        serde_json::from_str(&raw).map_err(|error| config_error(&path, &error.to_string()))
    }

    pub fn save(&self, settings_dir: &Path) -> PersistenceResult<()> {
        let path = Self::path(settings_dir);
        let json = serde_json::to_string_pretty(self)
            .map_err(|error| config_error(&path, &error.to_string()))?;
        write_atomic(&path, &json)?;
        Ok(())
    }

    pub fn is_enabled(&self, manager: ManagerId) -> bool {
        !self.disabled_managers.contains(&manager)
    }

    pub fn set_enabled(&mut self, manager: ManagerId, enabled: bool) {
        if enabled {
            self.disabled_managers.remove(&manager);
        } else {
            self.disabled_managers.insert(manager);
        }
    }

    pub fn updates_check_interval(&self) -> Duration {
        Duration::from_secs(self.updates_check_interval_secs)
    }

    pub fn unknown_source_resolve_wait(&self) -> Duration {
        Duration::from_millis(self.unknown_source_resolve_wait_ms)
    }

    pub fn source_reload_timeout(&self) -> Duration {
        Duration::from_secs(self.source_reload_timeout_secs)
    }
}

fn config_error(path: &Path, message: &str) -> CoreError {
    CoreError::new(
        CoreErrorKind::StorageFailure,
        format!("config {}: {message}", path.display()),
    )
}
