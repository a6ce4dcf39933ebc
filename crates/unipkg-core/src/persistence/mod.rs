pub mod file_store;

pub use file_store::{FileStore, StoreError};

use crate::models::{CoreError, IgnoredUpdate, InstallationOptions, ManagerId};

pub type PersistenceResult<T> = Result<T, CoreError>;

pub const PERMANENT_IGNORED_FILE: &str = "PermanentlyIgnoredPackageUpdates";
pub const SKIPPED_VERSIONS_FILE: &str = "SingleVersionIgnoredPackageUpdates";
pub const HISTORY_FILE: &str = "OperationHistory";
pub const OPTIONS_DIR: &str = "InstallationOptions";
pub const HISTORY_LIMIT: usize = 100;

pub trait IgnoredUpdatesStore: Send + Sync {
    fn list_ignored(&self) -> PersistenceResult<Vec<IgnoredUpdate>>;

    fn add_ignored(&self, record: &IgnoredUpdate) -> PersistenceResult<()>;

    /// Drops every record, permanent or per-version, for `id` under the
    /// source's manager.
    fn remove_ignored(&self, id: &str, source: &str) -> PersistenceResult<()>;

    fn is_ignored(&self, id: &str, source: &str, new_version: &str) -> PersistenceResult<bool> {
        Ok(self
            .list_ignored()?
            .iter()
            .any(|record| record.matches(id, source, new_version)))
    }
}

pub trait OptionsStore: Send + Sync {
    /// Stored options, or defaults when none were saved.
    fn load_options(&self, manager: ManagerId, id: &str) -> PersistenceResult<InstallationOptions>;

    fn save_options(
        &self,
        manager: ManagerId,
        id: &str,
        options: &InstallationOptions,
    ) -> PersistenceResult<()>;

    fn remove_options(&self, manager: ManagerId, id: &str) -> PersistenceResult<()>;
}

pub trait HistoryStore: Send + Sync {
    /// Prepends `entry`, keeping at most `HISTORY_LIMIT` entries.
    fn append_history(&self, entry: &str) -> PersistenceResult<()>;

    /// Entries, newest first.
    fn list_history(&self) -> PersistenceResult<Vec<String>>;
}
