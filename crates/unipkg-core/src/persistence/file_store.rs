use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::models::{
    CoreError, CoreErrorKind, IgnoredUpdate, InstallationOptions, ManagerId,
};
use crate::models::package::source_key;
use crate::persistence::{
    HISTORY_FILE, HISTORY_LIMIT, HistoryStore, IgnoredUpdatesStore, OPTIONS_DIR,
    OptionsStore, PERMANENT_IGNORED_FILE, PersistenceResult, SKIPPED_VERSIONS_FILE,
};


#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("i/o on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("ignored-updates cache lock poisoned")]
    Poisoned,
}

impl From<StoreError> for CoreError {
    fn from(error: StoreError) -> Self {
        CoreError::new(CoreErrorKind::StorageFailure, error.to_string())
    }
}

/// Settings files under one directory. Each write replaces its file through
/// a temporary sibling and a rename; readers never see a partial file.
pub struct FileStore {
    root: PathBuf,
    ignored: Mutex<Option<Vec<IgnoredUpdate>>>,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ignored: Mutex::new(None),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn settings_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub(crate) fn options_path(&self, manager: ManagerId, id: &str) -> PathBuf {
        self.root
            .join(OPTIONS_DIR)
            .join(format!("{}.{}.json", manager.storage_key(), file_safe(id)))
    }

    fn read_ignored_files(&self) -> Result<Vec<IgnoredUpdate>, StoreError> {
        let mut records = Vec::new();
        for name in [PERMANENT_IGNORED_FILE, SKIPPED_VERSIONS_FILE] {
            let raw = read_optional(&self.settings_path(name))?;
            records.extend(
                raw.split(';')
                    .filter(|entry| !entry.trim().is_empty())
                    .filter_map(|entry| {
                        let decoded = IgnoredUpdate::decode(entry);
                        if decoded.is_none() {
                            tracing::warn!(entry, file = name, "dropping malformed ignored-update record");
                        }
                        decoded
                    }),
            );
        }
        Ok(records)
    }

    fn write_ignored_files(&self, records: &[IgnoredUpdate]) -> Result<(), StoreError> {
        let encode = |permanent: bool| {
            records
                .iter()
                .filter(|record| matches!(record, IgnoredUpdate::Permanent { .. }) == permanent)
                .map(IgnoredUpdate::encode)
                .collect::<Vec<_>>()
                .join(";")
        };
        write_atomic(&self.settings_path(PERMANENT_IGNORED_FILE), &encode(true))?;
        write_atomic(&self.settings_path(SKIPPED_VERSIONS_FILE), &encode(false))
    }

    /// Applies `change` to the current records and rewrites both files. The
    /// cache is rebuilt from what was written.
    fn update_ignored(
        &self,
        change: impl FnOnce(&mut Vec<IgnoredUpdate>),
    ) -> Result<(), StoreError> {
        let mut cache = self.ignored.lock().map_err(|_| StoreError::Poisoned)?;
        let mut records = match cache.take() {
            Some(records) => records,
            None => self.read_ignored_files()?,
        };
        change(&mut records);
        self.write_ignored_files(&records)?;
        *cache = Some(records);
        Ok(())
    }
}

impl IgnoredUpdatesStore for FileStore {
    fn list_ignored(&self) -> PersistenceResult<Vec<IgnoredUpdate>> {
        let mut cache = self.ignored.lock().map_err(|_| StoreError::Poisoned)?;
        if let Some(records) = cache.as_ref() {
            return Ok(records.clone());
        }
        let records = self.read_ignored_files()?;
        *cache = Some(records.clone());
        Ok(records)
    }

    fn add_ignored(&self, record: &IgnoredUpdate) -> PersistenceResult<()> {
        self.update_ignored(|records| {
            // One record per package: a new skip replaces an older one.
            let (id, source) = match record {
                IgnoredUpdate::Permanent { id, source }
                | IgnoredUpdate::SkipVersion { id, source, .. } => (id, source),
            };
            records.retain(|existing| !same_package(existing, id, source));
            records.push(record.clone());
        })?;
        Ok(())
    }

    fn remove_ignored(&self, id: &str, source: &str) -> PersistenceResult<()> {
        let key = source_key(source);
        self.update_ignored(|records| {
            records.retain(|existing| !same_package(existing, id.trim(), &key));
        })?;
        Ok(())
    }
}

fn same_package(record: &IgnoredUpdate, id: &str, source: &str) -> bool {
    match record {
        IgnoredUpdate::Permanent {
            id: existing,
            source: existing_source,
        }
        | IgnoredUpdate::SkipVersion {
            id: existing,
            source: existing_source,
            ..
        } => existing == id && existing_source == source,
    }
}

impl OptionsStore for FileStore {
    fn load_options(&self, manager: ManagerId, id: &str) -> PersistenceResult<InstallationOptions> {
        let path = self.options_path(manager, id);
        let raw = read_optional(&path)?;
        if raw.trim().is_empty() {
            return Ok(InstallationOptions::default());
        }
        InstallationOptions::from_json(&raw)
            .map_err(|source| StoreError::Json { path, source }.into())
    }

    fn save_options(
        &self,
        manager: ManagerId,
        id: &str,
        options: &InstallationOptions,
    ) -> PersistenceResult<()> {
        let path = self.options_path(manager, id);
        let json = options.to_json().map_err(|source| StoreError::Json {
            path: path.clone(),
            source,
        })?;
        write_atomic(&path, &json)?;
        Ok(())
    }

    fn remove_options(&self, manager: ManagerId, id: &str) -> PersistenceResult<()> {
        let path = self.options_path(manager, id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io { path, source }.into()),
        }
    }
}

/// History is stored newest first, one JSON string per line, so entries may
/// hold any text without colliding with the record boundary.
impl HistoryStore for FileStore {
    fn append_history(&self, entry: &str) -> PersistenceResult<()> {
        let path = self.settings_path(HISTORY_FILE);
        let mut entries = self.list_history()?;
        entries.insert(0, entry.trim().to_string());
        entries.truncate(HISTORY_LIMIT);
        let mut encoded = String::new();
        for entry in &entries {
            let line = serde_json::to_string(entry).map_err(|source| StoreError::Json {
                path: path.clone(),
                source,
            })?;
            encoded.push_str(&line);
            encoded.push('\n');
        }
        write_atomic(&path, &encoded)?;
        Ok(())
    }

    fn list_history(&self) -> PersistenceResult<Vec<String>> {
        let raw = read_optional(&self.settings_path(HISTORY_FILE))?;
        Ok(decode_history(&raw))
    }
}

fn decode_history(raw: &str) -> Vec<String> {
    raw.lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<String>(line) {
            Ok(entry) => Some(entry),
            Err(error) => {
                tracing::debug!(error = %error, "skipping unreadable history record");
                None
            }
        })
        .collect()
}

/// Package ids may carry path separators (`@types/node`, `main/7zip`).
fn file_safe(id: &str) -> String {
    id.trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect()
}

fn read_optional(path: &Path) -> Result<String, StoreError> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(raw),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(String::new()),
        Err(source) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<(), StoreError> {
    let io_error = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);
    fs::write(&temp, contents).map_err(io_error)?;
    fs::rename(&temp, path).map_err(io_error)
}
