use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep, timeout};

use crate::adapters::{
    AdapterRequest, AdapterResponse, AdapterResult, DetailsRequest, DetectRequest,
    ListInstalledRequest, ListUpdatesRequest, ManagerAdapter, SearchRequest, SourceRequest,
    execute_with_capability_check,
};
use crate::config::EngineConfig;
use crate::models::{
    CoreError, CoreErrorKind, ManagerAction, ManagerId, ManagerSource, Package, PackageDetails,
    PackageKey, UpgradablePackage,
};
use crate::orchestration::OrchestrationResult;
use crate::persistence::IgnoredUpdatesStore;

const UNKNOWN_SOURCE_POLL: Duration = Duration::from_millis(100);

type AdapterFuture<T> = Pin<Box<dyn Future<Output = AdapterResult<Vec<T>>> + Send>>;

/// Something an aggregate run can deduplicate.
pub trait AggregateItem: Clone + Send + 'static {
    fn key(&self) -> PackageKey;
    fn manager(&self) -> ManagerId;
}

impl AggregateItem for Package {
    fn key(&self) -> PackageKey {
        Package::key(self)
    }

    fn manager(&self) -> ManagerId {
        self.manager
    }
}

impl AggregateItem for UpgradablePackage {
    fn key(&self) -> PackageKey {
        UpgradablePackage::key(self)
    }

    fn manager(&self) -> ManagerId {
        self.package.manager
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AggregateEvent<T> {
    /// Items from one adapter that no earlier adapter reported.
    Batch { manager: ManagerId, items: Vec<T> },
    AdapterCompleted {
        manager: ManagerId,
        found: usize,
        error: Option<CoreError>,
    },
    Finished { total: usize },
}

/// Per-run completion flag of one adapter.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AdapterEntry {
    pub manager: ManagerId,
    pub completed: bool,
}

#[derive(Debug, Default)]
struct RunProgress {
    entries: Vec<AdapterEntry>,
    loaded: usize,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AggregateResult<T> {
    pub items: Vec<T>,
    pub completed: Vec<ManagerId>,
    pub errors: Vec<(ManagerId, CoreError)>,
}

/// Handle on one fan-out across the enabled adapters.
pub struct AggregateRun<T> {
    events: mpsc::UnboundedReceiver<AggregateEvent<T>>,
    progress: Arc<Mutex<RunProgress>>,
}

impl<T: AggregateItem> AggregateRun<T> {
    pub async fn next_event(&mut self) -> Option<AggregateEvent<T>> {
        self.events.recv().await
    }

    /// True once every adapter taking part in the run has finished.
    pub fn is_fully_loaded(&self) -> bool {
        lock(&self.progress).entries.iter().all(|entry| entry.completed)
    }

    /// Deduplicated items received so far.
    pub fn loaded_count(&self) -> usize {
        lock(&self.progress).loaded
    }

    pub fn entries(&self) -> Vec<AdapterEntry> {
        lock(&self.progress).entries.clone()
    }

    /// Drains the run. Items come back ordered by manager, then id and
    /// source, so the result does not depend on completion order.
    pub async fn collect(mut self) -> AggregateResult<T> {
        let mut items = Vec::new();
        let mut completed = Vec::new();
        let mut errors = Vec::new();
        while let Some(event) = self.next_event().await {
            match event {
                AggregateEvent::Batch { items: batch, .. } => items.extend(batch),
                AggregateEvent::AdapterCompleted { manager, error, .. } => {
                    completed.push(manager);
                    if let Some(error) = error {
                        errors.push((manager, error));
                    }
                }
                AggregateEvent::Finished { .. } => break,
            }
        }
        items.sort_by(|a, b| (a.manager(), a.key()).cmp(&(b.manager(), b.key())));
        completed.sort();
        AggregateResult {
            items,
            completed,
            errors,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ManagerStatus {
    pub manager: ManagerId,
    pub display_name: String,
    pub enabled: bool,
    pub found: bool,
    pub version: Option<String>,
    pub executable_path: Option<PathBuf>,
}

struct RegisteredAdapter {
    adapter: Arc<dyn ManagerAdapter>,
    enabled: bool,
}

/// Sources of installed packages, used to fill in updates reported without
/// one.
#[derive(Default)]
struct InstalledIndex {
    sources: HashMap<(ManagerId, String), String>,
    loaded: bool,
}

struct AggregatorInner {
    adapters: RwLock<Vec<RegisteredAdapter>>,
    ignored: Arc<dyn IgnoredUpdatesStore>,
    installed: Mutex<InstalledIndex>,
    unknown_source_wait: Duration,
    source_reload_timeout: Duration,
}

#[derive(Clone)]
pub struct Aggregator {
    inner: Arc<AggregatorInner>,
}

impl Aggregator {
    pub fn new(
        adapters: impl IntoIterator<Item = Arc<dyn ManagerAdapter>>,
        ignored: Arc<dyn IgnoredUpdatesStore>,
        config: &EngineConfig,
    ) -> OrchestrationResult<Self> {
        let mut registered: Vec<RegisteredAdapter> = Vec::new();
        for adapter in adapters {
            let manager = adapter.descriptor().id;
            if registered
                .iter()
                .any(|entry| entry.adapter.descriptor().id == manager)
            {
                return Err(CoreError {
                    manager: Some(manager),
                    task: None,
                    action: None,
                    kind: CoreErrorKind::InvalidInput,
                    message: format!("duplicate adapter registration for manager '{manager:?}'"),
                });
            }
            registered.push(RegisteredAdapter {
                adapter,
                enabled: config.is_enabled(manager),
            });
        }

        Ok(Self {
            inner: Arc::new(AggregatorInner {
                adapters: RwLock::new(registered),
                ignored,
                installed: Mutex::new(InstalledIndex::default()),
                unknown_source_wait: config.unknown_source_resolve_wait(),
                source_reload_timeout: config.source_reload_timeout(),
            }),
        })
    }

    pub fn managers(&self) -> Vec<ManagerId> {
        read(&self.inner.adapters)
            .iter()
            .map(|entry| entry.adapter.descriptor().id)
            .collect()
    }

    pub fn adapter(&self, manager: ManagerId) -> Option<Arc<dyn ManagerAdapter>> {
        read(&self.inner.adapters)
            .iter()
            .find(|entry| entry.adapter.descriptor().id == manager)
            .map(|entry| entry.adapter.clone())
    }

    pub fn is_enabled(&self, manager: ManagerId) -> bool {
        read(&self.inner.adapters)
            .iter()
            .any(|entry| entry.adapter.descriptor().id == manager && entry.enabled)
    }

    /// Returns false when no adapter is registered for `manager`.
    pub fn set_enabled(&self, manager: ManagerId, enabled: bool) -> bool {
        let mut adapters = self
            .inner
            .adapters
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match adapters
            .iter_mut()
            .find(|entry| entry.adapter.descriptor().id == manager)
        {
            Some(entry) => {
                entry.enabled = enabled;
                tracing::info!(manager = ?manager, enabled, "manager availability changed");
                true
            }
            None => false,
        }
    }

    fn enabled_adapters(&self) -> Vec<Arc<dyn ManagerAdapter>> {
        read(&self.inner.adapters)
            .iter()
            .filter(|entry| entry.enabled)
            .map(|entry| entry.adapter.clone())
            .collect()
    }

    /// Installed packages from every enabled adapter. Also refreshes the
    /// index used to resolve update sources.
    pub fn list_installed(&self) -> AggregateRun<Package> {
        {
            let mut index = lock(&self.inner.installed);
            index.sources.clear();
            index.loaded = false;
        }

        let inner = self.inner.clone();
        let finished_inner = self.inner.clone();
        self.spawn_run(
            Arc::new(move |adapter: Arc<dyn ManagerAdapter>| {
                let inner = inner.clone();
                Box::pin(async move {
                    let request = AdapterRequest::ListInstalled(ListInstalledRequest);
                    let packages = match execute_blocking(adapter, request).await? {
                        AdapterResponse::InstalledPackages(packages) => packages,
                        other => return Err(unexpected_response(ManagerAction::ListInstalled, &other)),
                    };
                    let mut index = lock(&inner.installed);
                    for package in &packages {
                        index
                            .sources
                            .insert((package.manager, package.id.clone()), package.source.clone());
                    }
                    Ok(packages)
                }) as AdapterFuture<Package>
            }),
            Some(Box::new(move || {
                lock(&finished_inner.installed).loaded = true;
            })),
        )
    }

    pub fn search(&self, query: &str) -> AggregateRun<Package> {
        let query = query.trim().to_string();
        self.spawn_run(
            Arc::new(move |adapter: Arc<dyn ManagerAdapter>| {
                let query = query.clone();
                Box::pin(async move {
                    let request = AdapterRequest::Search(SearchRequest { query });
                    match execute_blocking(adapter, request).await? {
                        AdapterResponse::SearchResults(packages) => Ok(packages),
                        other => Err(unexpected_response(ManagerAction::Search, &other)),
                    }
                }) as AdapterFuture<Package>
            }),
            None,
        )
    }

    /// Available updates, with unknown sources resolved against installed
    /// packages and ignored updates removed.
    pub fn list_updates(&self) -> AggregateRun<UpgradablePackage> {
        let inner = self.inner.clone();
        self.spawn_run(
            Arc::new(move |adapter: Arc<dyn ManagerAdapter>| {
                let inner = inner.clone();
                Box::pin(async move {
                    let request = AdapterRequest::ListUpdates(ListUpdatesRequest);
                    let mut updates = match execute_blocking(adapter, request).await? {
                        AdapterResponse::Updates(updates) => updates,
                        other => return Err(unexpected_response(ManagerAction::ListUpdates, &other)),
                    };
                    resolve_unknown_sources(&inner, &mut updates).await;
                    Ok(filter_ignored(inner.ignored.as_ref(), updates))
                }) as AdapterFuture<UpgradablePackage>
            }),
            None,
        )
    }

    /// Single-shot details lookup. A failing adapter yields the declared
    /// defaults.
    pub async fn details(&self, package: &Package) -> OrchestrationResult<PackageDetails> {
        let adapter = self.require_adapter(package.manager, ManagerAction::Details)?;
        let request = AdapterRequest::Details(DetailsRequest {
            package: package.clone(),
        });
        match execute_blocking(adapter, request).await {
            Ok(AdapterResponse::Details(details)) => Ok(*details),
            Ok(other) => Err(unexpected_response(ManagerAction::Details, &other)),
            Err(error) => {
                tracing::warn!(
                    manager = ?package.manager,
                    id = %package.id,
                    kind = ?error.kind,
                    message = %error.message,
                    "details lookup failed; returning defaults"
                );
                Ok(PackageDetails::default())
            }
        }
    }

    /// Sources of every enabled adapter that manages custom sources. An
    /// adapter that does not answer within the reload timeout is skipped.
    pub async fn load_sources(&self) -> Vec<ManagerSource> {
        let limit = self.inner.source_reload_timeout;
        let tasks: Vec<_> = self
            .enabled_adapters()
            .into_iter()
            .filter(|adapter| adapter.descriptor().features.supports_custom_sources)
            .map(|adapter| {
                let manager = adapter.descriptor().id;
                let task = tokio::spawn(timeout(
                    limit,
                    execute_blocking(adapter, AdapterRequest::ListSources),
                ));
                (manager, task)
            })
            .collect();

        let mut sources = Vec::new();
        for (manager, task) in tasks {
            match task.await {
                Ok(Ok(Ok(AdapterResponse::Sources(found)))) => sources.extend(found),
                Ok(Ok(Ok(other))) => {
                    let error = unexpected_response(ManagerAction::ListSources, &other);
                    tracing::warn!(manager = ?manager, message = %error.message, "source listing failed");
                }
                Ok(Ok(Err(error))) => {
                    tracing::warn!(manager = ?manager, kind = ?error.kind, message = %error.message, "source listing failed");
                }
                Ok(Err(_)) => {
                    tracing::warn!(manager = ?manager, timeout_secs = limit.as_secs(), "source listing timed out");
                }
                Err(join_error) => {
                    tracing::error!(manager = ?manager, error = %join_error, "source listing task failed");
                }
            }
        }
        sources
    }

    pub async fn add_source(&self, source: ManagerSource) -> OrchestrationResult<()> {
        let manager = source.manager;
        self.change_sources(manager, AdapterRequest::AddSource(SourceRequest { source }))
            .await
    }

    pub async fn remove_source(&self, source: ManagerSource) -> OrchestrationResult<()> {
        let manager = source.manager;
        self.change_sources(manager, AdapterRequest::RemoveSource(SourceRequest { source }))
            .await
    }

    pub async fn refresh_sources(&self, manager: ManagerId) -> OrchestrationResult<()> {
        self.change_sources(manager, AdapterRequest::RefreshSources)
            .await
    }

    async fn change_sources(
        &self,
        manager: ManagerId,
        request: AdapterRequest,
    ) -> OrchestrationResult<()> {
        let action = request.action();
        let adapter = self.require_adapter(manager, action)?;
        match execute_blocking(adapter, request).await? {
            AdapterResponse::SourcesChanged => Ok(()),
            other => Err(unexpected_response(action, &other)),
        }
    }

    /// Probes every registered adapter, enabled or not, concurrently.
    pub async fn detect_managers(&self) -> Vec<ManagerStatus> {
        let entries: Vec<(Arc<dyn ManagerAdapter>, bool)> = read(&self.inner.adapters)
            .iter()
            .map(|entry| (entry.adapter.clone(), entry.enabled))
            .collect();

        let tasks: Vec<_> = entries
            .into_iter()
            .map(|(adapter, enabled)| {
                let descriptor = adapter.descriptor().clone();
                let task = tokio::spawn(execute_blocking(
                    adapter,
                    AdapterRequest::Detect(DetectRequest),
                ));
                (descriptor, enabled, task)
            })
            .collect();

        let mut statuses = Vec::new();
        for (descriptor, enabled, task) in tasks {
            let info = match task.await {
                Ok(Ok(AdapterResponse::Detection(info))) => Some(info),
                Ok(Ok(_)) => None,
                Ok(Err(error)) => {
                    tracing::debug!(manager = ?descriptor.id, error = %error, "detection failed");
                    None
                }
                Err(join_error) => {
                    tracing::error!(manager = ?descriptor.id, error = %join_error, "detection task failed");
                    None
                }
            };
            let (found, version, executable_path) = match info {
                Some(info) => (info.installed, info.version, info.executable_path),
                None => (false, None, None),
            };
            statuses.push(ManagerStatus {
                manager: descriptor.id,
                display_name: descriptor.display_name.to_string(),
                enabled,
                found,
                version,
                executable_path,
            });
        }
        statuses
    }

    fn require_adapter(
        &self,
        manager: ManagerId,
        action: ManagerAction,
    ) -> OrchestrationResult<Arc<dyn ManagerAdapter>> {
        if !self.is_enabled(manager) {
            return Err(CoreError {
                manager: Some(manager),
                task: None,
                action: Some(action),
                kind: CoreErrorKind::NotInstalled,
                message: format!("manager '{}' is not enabled", manager.display_name()),
            });
        }
        self.adapter(manager).ok_or_else(|| CoreError {
            manager: Some(manager),
            task: None,
            action: Some(action),
            kind: CoreErrorKind::InvalidInput,
            message: format!("no adapter is registered for manager '{manager:?}'"),
        })
    }

    fn spawn_run<T: AggregateItem>(
        &self,
        fetch: Arc<dyn Fn(Arc<dyn ManagerAdapter>) -> AdapterFuture<T> + Send + Sync>,
        on_finished: Option<Box<dyn FnOnce() + Send>>,
    ) -> AggregateRun<T> {
        let adapters = self.enabled_adapters();
        let progress = Arc::new(Mutex::new(RunProgress {
            entries: adapters
                .iter()
                .map(|adapter| AdapterEntry {
                    manager: adapter.descriptor().id,
                    completed: false,
                })
                .collect(),
            loaded: 0,
        }));
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (result_tx, mut result_rx) = mpsc::unbounded_channel();

        for adapter in adapters {
            let manager = adapter.descriptor().id;
            let result_tx = result_tx.clone();
            let future = fetch(adapter);
            tokio::spawn(async move {
                let result = future.await;
                let _ = result_tx.send((manager, result));
            });
        }
        drop(result_tx);

        let run_progress = progress.clone();
        tokio::spawn(async move {
            let mut seen: HashSet<PackageKey> = HashSet::new();
            let mut total = 0;
            while let Some((manager, result)) = result_rx.recv().await {
                let (fresh, error) = match result {
                    Ok(items) => {
                        let fresh: Vec<T> = items
                            .into_iter()
                            .filter(|item| seen.insert(item.key()))
                            .collect();
                        (fresh, None)
                    }
                    Err(error) => {
                        tracing::warn!(
                            manager = ?manager,
                            kind = ?error.kind,
                            message = %error.message,
                            "adapter failed; treating as an empty result"
                        );
                        (Vec::new(), Some(error))
                    }
                };
                let found = fresh.len();
                total += found;
                {
                    let mut progress = lock(&run_progress);
                    progress.loaded += found;
                    if let Some(entry) = progress
                        .entries
                        .iter_mut()
                        .find(|entry| entry.manager == manager)
                    {
                        entry.completed = true;
                    }
                }
                if found > 0 {
                    let _ = event_tx.send(AggregateEvent::Batch {
                        manager,
                        items: fresh,
                    });
                }
                let _ = event_tx.send(AggregateEvent::AdapterCompleted {
                    manager,
                    found,
                    error,
                });
            }
            if let Some(on_finished) = on_finished {
                on_finished();
            }
            let _ = event_tx.send(AggregateEvent::Finished { total });
        });

        AggregateRun {
            events: event_rx,
            progress,
        }
    }
}

async fn execute_blocking(
    adapter: Arc<dyn ManagerAdapter>,
    request: AdapterRequest,
) -> AdapterResult<AdapterResponse> {
    let manager = adapter.descriptor().id;
    let action = request.action();
    tokio::task::spawn_blocking(move || execute_with_capability_check(adapter.as_ref(), request))
        .await
        .map_err(|join_error| CoreError {
            manager: Some(manager),
            task: None,
            action: Some(action),
            kind: CoreErrorKind::Internal,
            message: format!("adapter execution join failure: {join_error}"),
        })?
        .map_err(|error| CoreError {
            manager: error.manager.or(Some(manager)),
            action: error.action.or(Some(action)),
            ..error
        })
}

/// Waits, polling, for the installed-package index to name a source for
/// updates that arrived without one. Gives up after the configured wait or
/// once the index is complete.
async fn resolve_unknown_sources(inner: &AggregatorInner, updates: &mut [UpgradablePackage]) {
    if !updates.iter().any(|update| update.package.has_unknown_source()) {
        return;
    }
    let deadline = Instant::now() + inner.unknown_source_wait;
    loop {
        let loaded = {
            let index = lock(&inner.installed);
            for update in updates
                .iter_mut()
                .filter(|update| update.package.has_unknown_source())
            {
                let key = (update.package.manager, update.package.id.clone());
                if let Some(source) = index.sources.get(&key) {
                    update.package.resolve_source(source.clone());
                }
            }
            index.loaded
        };

        let pending = updates
            .iter()
            .filter(|update| update.package.has_unknown_source())
            .count();
        if pending == 0 || loaded || Instant::now() >= deadline {
            if pending > 0 {
                tracing::debug!(pending, "finalizing updates with unresolved sources");
            }
            return;
        }
        sleep(UNKNOWN_SOURCE_POLL).await;
    }
}

fn filter_ignored(
    store: &dyn IgnoredUpdatesStore,
    updates: Vec<UpgradablePackage>,
) -> Vec<UpgradablePackage> {
    let records = match store.list_ignored() {
        Ok(records) => records,
        Err(error) => {
            tracing::warn!(kind = ?error.kind, message = %error.message, "ignored updates unavailable");
            return updates;
        }
    };
    updates
        .into_iter()
        .filter(|update| {
            !records.iter().any(|record| {
                record.matches(&update.package.id, &update.package.source, &update.new_version)
            })
        })
        .collect()
}

fn unexpected_response(action: ManagerAction, response: &AdapterResponse) -> CoreError {
    CoreError {
        manager: None,
        task: None,
        action: Some(action),
        kind: CoreErrorKind::Internal,
        message: format!("unexpected adapter response for {action:?}: {response:?}"),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}
