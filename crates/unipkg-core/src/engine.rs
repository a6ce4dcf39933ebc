use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::adapters::{ManagerAdapter, default_adapters};
use crate::config::EngineConfig;
use crate::details::{DetailsFetcher, UreqFetcher};
use crate::execution::{ProcessExecutor, TokioProcessExecutor};
use crate::models::{
    CoreError, CoreErrorKind, IgnoredUpdate, InstallationOptions, ManagerId, OperationKind,
    Package, UpgradablePackage,
};
use crate::orchestration::{
    Aggregator, InstallationCoordinator, OperationHandle, OrchestrationResult,
};
use crate::persistence::{FileStore, HistoryStore, IgnoredUpdatesStore, OptionsStore};

/// Everything a host needs, rooted at one settings directory.
pub struct Engine {
    settings_dir: PathBuf,
    config: Mutex<EngineConfig>,
    store: Arc<FileStore>,
    aggregator: Aggregator,
    coordinator: InstallationCoordinator,
}

impl Engine {
    /// Opens the engine with the process-backed adapters.
    pub fn open(settings_dir: impl Into<PathBuf>) -> OrchestrationResult<Self> {
        let executor: Arc<dyn ProcessExecutor> = Arc::new(TokioProcessExecutor);
        let fetcher: Arc<dyn DetailsFetcher> = Arc::new(UreqFetcher::new());
        let adapters = default_adapters(executor.clone(), fetcher);
        Self::with_adapters(settings_dir, adapters, executor)
    }

    pub fn with_adapters(
        settings_dir: impl Into<PathBuf>,
        adapters: Vec<Arc<dyn ManagerAdapter>>,
        executor: Arc<dyn ProcessExecutor>,
    ) -> OrchestrationResult<Self> {
        let settings_dir = settings_dir.into();
        let config = EngineConfig::load(&settings_dir)?;
        let store = Arc::new(FileStore::new(&settings_dir));
        let aggregator = Aggregator::new(
            adapters,
            store.clone() as Arc<dyn IgnoredUpdatesStore>,
            &config,
        )?;
        let coordinator = InstallationCoordinator::new(
            executor,
            Some(store.clone() as Arc<dyn HistoryStore>),
            &config,
        );
        tracing::info!(settings_dir = %settings_dir.display(), "engine opened");

        Ok(Self {
            settings_dir,
            config: Mutex::new(config),
            store,
            aggregator,
            coordinator,
        })
    }

    pub fn settings_dir(&self) -> &Path {
        &self.settings_dir
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub fn coordinator(&self) -> &InstallationCoordinator {
        &self.coordinator
    }

    pub fn config(&self) -> EngineConfig {
        self.lock_config().clone()
    }

    /// Replaces the settings, persists them, and applies them to the running
    /// aggregator and coordinator.
    pub fn update_config(&self, config: EngineConfig) -> OrchestrationResult<()> {
        config.save(&self.settings_dir)?;
        for manager in self.aggregator.managers() {
            self.aggregator
                .set_enabled(manager, config.is_enabled(manager));
        }
        self.coordinator.apply_config(&config);
        *self.lock_config() = config;
        Ok(())
    }

    pub fn set_manager_enabled(&self, manager: ManagerId, enabled: bool) -> OrchestrationResult<()> {
        let mut config = self.config();
        config.set_enabled(manager, enabled);
        self.update_config(config)
    }

    /// Starts an operation. Without explicit options the package's saved
    /// options are used.
    pub async fn start_operation(
        &self,
        kind: OperationKind,
        package: Package,
        options: Option<InstallationOptions>,
    ) -> OrchestrationResult<OperationHandle> {
        let manager = package.manager;
        if !self.aggregator.is_enabled(manager) {
            return Err(CoreError::new(
                CoreErrorKind::NotInstalled,
                format!("manager '{}' is not enabled", manager.display_name()),
            )
            .for_manager(manager)
            .for_action(kind.action()));
        }
        let adapter = self.aggregator.adapter(manager).ok_or_else(|| {
            CoreError::new(
                CoreErrorKind::InvalidInput,
                format!("no adapter is registered for '{}'", manager.display_name()),
            )
            .for_manager(manager)
        })?;
        let options = match options {
            Some(options) => options,
            None => self
                .store
                .load_options(manager, &package.id)
                .unwrap_or_else(|error| {
                    tracing::warn!(
                        manager = ?manager,
                        package = %package.id,
                        message = %error.message,
                        "saved installation options are unreadable, using defaults"
                    );
                    InstallationOptions::default()
                }),
        };
        self.coordinator.start(adapter, kind, package, options).await
    }

    pub fn load_options(&self, manager: ManagerId, id: &str) -> OrchestrationResult<InstallationOptions> {
        self.store.load_options(manager, id)
    }

    pub fn save_options(
        &self,
        manager: ManagerId,
        id: &str,
        options: &InstallationOptions,
    ) -> OrchestrationResult<()> {
        self.store.save_options(manager, id, options)
    }

    /// Ignores every future update of `update`'s package, or only the
    /// offered version when `skip_version_only` is set.
    pub fn ignore_update(
        &self,
        update: &UpgradablePackage,
        skip_version_only: bool,
    ) -> OrchestrationResult<()> {
        let package = &update.package;
        let record = if skip_version_only {
            IgnoredUpdate::skip_version(&package.id, &update.new_version, &package.source)
        } else {
            IgnoredUpdate::permanent(&package.id, &package.source)
        };
        tracing::info!(manager = ?package.manager, id = %package.id, skip_version_only, "ignoring update");
        self.store.add_ignored(&record)
    }

    pub fn unignore_update(&self, id: &str, source: &str) -> OrchestrationResult<()> {
        self.store.remove_ignored(id, source)
    }

    pub fn ignored_updates(&self) -> OrchestrationResult<Vec<IgnoredUpdate>> {
        self.store.list_ignored()
    }

    pub fn history(&self) -> OrchestrationResult<Vec<String>> {
        self.store.list_history()
    }

    fn lock_config(&self) -> MutexGuard<'_, EngineConfig> {
        self.config
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
