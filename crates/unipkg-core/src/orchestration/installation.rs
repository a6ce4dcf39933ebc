use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::{Notify, mpsc};

use crate::adapters::{ManagerAdapter, OperationRequest};
use crate::config::EngineConfig;
use crate::execution::{
    LineReader, OutputLine, ProcessExecutor, ProcessExitStatus, ProcessSpawnRequest,
    ProcessTerminationMode, spawn_validated, split_lines,
};
use crate::models::{
    CoreError, CoreErrorKind, InstallationOptions, ManagerId, OperationKind, OperationResultCode,
    Package, TaskId,
};
use crate::orchestration::{InstallQueue, OrchestrationResult};
use crate::parsing::{ElevationMarkerScope, VerdictRule, markers_for};
use crate::persistence::HistoryStore;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
pub enum OperationState {
    Pending,
    Running,
    Succeeded,
    Failed,
    NeedsElevation,
}

impl OperationState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::NeedsElevation
        )
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct OperationOutcome {
    pub state: OperationState,
    pub result_code: OperationResultCode,
    pub full_output: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum OperationEvent {
    Started,
    Progress { line: OutputLine, progress: u32 },
    Finished(OperationOutcome),
}

/// Pollable view of one operation.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct OperationSnapshot {
    pub id: TaskId,
    pub kind: OperationKind,
    pub package: Package,
    pub state: OperationState,
    pub progress: u32,
    pub last_line: Option<OutputLine>,
    pub output: Vec<String>,
    pub result_code: Option<OperationResultCode>,
    pub elevated: bool,
}

pub struct OperationHandle {
    pub id: TaskId,
    events: mpsc::UnboundedReceiver<OperationEvent>,
}

impl OperationHandle {
    pub async fn next_event(&mut self) -> Option<OperationEvent> {
        self.events.recv().await
    }

    /// Drains the progress stream and returns the terminal outcome.
    pub async fn wait(mut self) -> OperationOutcome {
        while let Some(event) = self.next_event().await {
            if let OperationEvent::Finished(outcome) = event {
                return outcome;
            }
        }
        OperationOutcome {
            state: OperationState::Failed,
            result_code: OperationResultCode::Failed,
            full_output: "operation ended without a result".to_string(),
        }
    }
}

struct OperationEntry {
    snapshot: OperationSnapshot,
    cancel: Arc<Notify>,
}

struct CoordinatorInner {
    executor: Arc<dyn ProcessExecutor>,
    queue: InstallQueue,
    history: Option<Arc<dyn HistoryStore>>,
    elevation_helper: Mutex<PathBuf>,
    operations: Mutex<HashMap<TaskId, OperationEntry>>,
    next_id: AtomicU64,
}

/// Runs install, update and uninstall commands through the install queue.
#[derive(Clone)]
pub struct InstallationCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl InstallationCoordinator {
    pub fn new(
        executor: Arc<dyn ProcessExecutor>,
        history: Option<Arc<dyn HistoryStore>>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                executor,
                queue: InstallQueue::new(config.allow_parallel_installs),
                history,
                elevation_helper: Mutex::new(PathBuf::from(&config.elevation_helper_path)),
                operations: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn queue(&self) -> &InstallQueue {
        &self.inner.queue
    }

    pub fn apply_config(&self, config: &EngineConfig) {
        self.inner
            .queue
            .set_allow_parallel(config.allow_parallel_installs);
        *lock(&self.inner.elevation_helper) = PathBuf::from(&config.elevation_helper_path);
    }

    /// Builds the command for `kind`, queues it and returns the progress
    /// stream. Options are first narrowed to what the manager supports.
    pub async fn start(
        &self,
        adapter: Arc<dyn ManagerAdapter>,
        kind: OperationKind,
        package: Package,
        options: InstallationOptions,
    ) -> OrchestrationResult<OperationHandle> {
        let descriptor = adapter.descriptor().clone();
        let manager = descriptor.id;
        if package.manager != manager {
            return Err(CoreError::new(
                CoreErrorKind::InvalidInput,
                format!(
                    "package '{}' belongs to {} but was routed to {}",
                    package.id,
                    package.manager.display_name(),
                    manager.display_name()
                ),
            )
            .for_manager(manager)
            .for_action(kind.action()));
        }

        let options = descriptor.features.sanitize(&options);
        let elevate = options.run_as_administrator;
        let request = OperationRequest {
            kind,
            package: package.clone(),
            options,
        };
        let spawn_request = tokio::task::spawn_blocking(move || adapter.operation_request(&request))
            .await
            .map_err(|join_error| {
                CoreError::new(
                    CoreErrorKind::Internal,
                    format!("operation request join failure: {join_error}"),
                )
                .for_manager(manager)
                .for_action(kind.action())
            })??;

        let id = TaskId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let mut spawn_request = spawn_request.task_id(id);
        if elevate {
            let helper = lock(&self.inner.elevation_helper).clone();
            spawn_request = spawn_request.elevated_with(helper);
        }

        let cancel = Arc::new(Notify::new());
        lock(&self.inner.operations).insert(
            id,
            OperationEntry {
                snapshot: OperationSnapshot {
                    id,
                    kind,
                    package,
                    state: OperationState::Pending,
                    progress: 0,
                    last_line: None,
                    output: Vec::new(),
                    result_code: None,
                    elevated: spawn_request.requires_elevation,
                },
                cancel: cancel.clone(),
            },
        );
        let ahead = self.inner.queue.enqueue(id);
        tracing::info!(manager = ?manager, task_id = id.0, operation = kind.label(), ahead, "operation queued");

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let inner = self.inner.clone();
        tokio::spawn(run_operation(inner, id, spawn_request, event_tx, cancel));

        Ok(OperationHandle {
            id,
            events: event_rx,
        })
    }

    pub fn snapshot(&self, id: TaskId) -> Option<OperationSnapshot> {
        lock(&self.inner.operations)
            .get(&id)
            .map(|entry| entry.snapshot.clone())
    }

    pub fn operations(&self) -> Vec<OperationSnapshot> {
        let mut snapshots: Vec<_> = lock(&self.inner.operations)
            .values()
            .map(|entry| entry.snapshot.clone())
            .collect();
        snapshots.sort_by_key(|snapshot| snapshot.id);
        snapshots
    }

    /// Pending operations leave the queue; running ones have their process
    /// killed. Returns false for unknown or finished operations.
    pub fn cancel(&self, id: TaskId) -> bool {
        let operations = lock(&self.inner.operations);
        let Some(entry) = operations.get(&id) else {
            return false;
        };
        match entry.snapshot.state {
            OperationState::Pending => self.inner.queue.remove(id),
            OperationState::Running => {
                entry.cancel.notify_one();
                true
            }
            _ => false,
        }
    }

    /// Drops a finished operation from the table.
    pub fn forget(&self, id: TaskId) -> bool {
        let mut operations = lock(&self.inner.operations);
        match operations.get(&id) {
            Some(entry) if entry.snapshot.state.is_terminal() => {
                operations.remove(&id);
                true
            }
            _ => false,
        }
    }
}

async fn run_operation(
    inner: Arc<CoordinatorInner>,
    id: TaskId,
    request: ProcessSpawnRequest,
    events: mpsc::UnboundedSender<OperationEvent>,
    cancel: Arc<Notify>,
) {
    let manager = request.manager;
    let kind = operation_kind(&request);

    let Some(_slot) = inner.queue.acquire(id).await else {
        let outcome = OperationOutcome {
            state: OperationState::Failed,
            result_code: OperationResultCode::Failed,
            full_output: "Operation cancelled before it started".to_string(),
        };
        finish(&inner, id, manager, kind, outcome, &events);
        return;
    };

    update(&inner, id, |snapshot| snapshot.state = OperationState::Running);
    let _ = events.send(OperationEvent::Started);
    tracing::info!(manager = ?manager, task_id = id.0, "operation running");

    let mut output = Vec::new();
    let outcome = match drive_process(&inner, id, request, &events, &cancel, &mut output).await {
        Ok(outcome) => outcome,
        Err(error) => {
            tracing::error!(
                manager = ?manager,
                task_id = id.0,
                kind = ?error.kind,
                message = %error.message,
                "operation process failed"
            );
            output.push(error.message);
            OperationOutcome {
                state: OperationState::Failed,
                result_code: OperationResultCode::Failed,
                full_output: output.join("\n"),
            }
        }
    };
    finish(&inner, id, manager, kind, outcome, &events);
}

async fn drive_process(
    inner: &CoordinatorInner,
    id: TaskId,
    request: ProcessSpawnRequest,
    events: &mpsc::UnboundedSender<OperationEvent>,
    cancel: &Notify,
    output: &mut Vec<String>,
) -> OrchestrationResult<OperationOutcome> {
    let manager = request.manager;
    let kind = operation_kind(&request);
    let process = spawn_validated(inner.executor.as_ref(), request)?;

    let mut cancelled = false;
    if let Some(stdout) = process.take_stdout() {
        let mut reader = LineReader::new(stdout);
        loop {
            tokio::select! {
                line = reader.next_line() => match line {
                    Some(line) => record_line(inner, id, manager, line, events, output),
                    None => break,
                },
                _ = cancel.notified(), if !cancelled => {
                    cancelled = true;
                    tracing::info!(manager = ?manager, task_id = id.0, "cancelling running operation");
                    process.terminate(ProcessTerminationMode::Immediate)?;
                }
            }
        }
    }

    let finished = process.wait().await?;
    for line in split_lines(&finished.stdout) {
        record_line(inner, id, manager, line, events, output);
    }
    output.extend(
        split_lines(&finished.stderr)
            .into_iter()
            .filter(|line| line.is_final)
            .map(|line| line.text),
    );

    let full_output = output.join("\n");
    if cancelled {
        return Ok(OperationOutcome {
            state: OperationState::Failed,
            result_code: OperationResultCode::Failed,
            full_output: format!("{full_output}\nOperation cancelled"),
        });
    }

    let (state, result_code) = classify_outcome(manager, kind, finished.status, &full_output);
    Ok(OperationOutcome {
        state,
        result_code,
        full_output,
    })
}

fn record_line(
    inner: &CoordinatorInner,
    id: TaskId,
    manager: ManagerId,
    line: OutputLine,
    events: &mpsc::UnboundedSender<OperationEvent>,
    output: &mut Vec<String>,
) {
    if line.is_final {
        output.push(line.text.clone());
    }
    let counter = markers_for(manager).progress_for(&line.text);
    let mut progress = 0;
    update(inner, id, |snapshot| {
        if let Some(counter) = counter {
            snapshot.progress = snapshot.progress.max(counter);
        }
        if line.is_final {
            snapshot.output.push(line.text.clone());
        }
        snapshot.last_line = Some(line.clone());
        progress = snapshot.progress;
    });
    let _ = events.send(OperationEvent::Progress { line, progress });
}

/// Maps an exit status and the collected output to a terminal state.
///
/// Killed processes always fail. Managers that decide by output text skip
/// the exit code entirely. Everyone else goes through the manager's
/// exit-code tables first, then the elevation, no-update, failure and
/// success markers, and finally the plain exit code. Elevation markers
/// scoped to failed uninstalls never override a zero exit code.
pub fn classify_outcome(
    manager: ManagerId,
    kind: OperationKind,
    status: ProcessExitStatus,
    output: &str,
) -> (OperationState, OperationResultCode) {
    let markers = markers_for(manager);
    let ProcessExitStatus::ExitCode(code) = status else {
        return (OperationState::Failed, OperationResultCode::Failed);
    };
    let needs_elevation = (OperationState::NeedsElevation, markers.elevation_result);

    if let VerdictRule::Output {
        uninstall_confirmation,
    } = markers.verdict
    {
        if markers.elevation_marker_in(output).is_some() {
            return needs_elevation;
        }
        let succeeded = match kind {
            OperationKind::Uninstall => output.contains(uninstall_confirmation),
            _ => !markers.has_failure_marker(output),
        };
        return if !succeeded {
            (OperationState::Failed, OperationResultCode::Failed)
        } else if markers.has_no_update_marker(output) {
            (
                OperationState::Succeeded,
                OperationResultCode::NoApplicableUpdateFound,
            )
        } else {
            (OperationState::Succeeded, OperationResultCode::OperationSucceeded)
        };
    }

    if markers.elevation_scope == ElevationMarkerScope::Always
        && markers.elevation_marker_in(output).is_some()
    {
        return needs_elevation;
    }
    if markers.elevation_exit_codes.contains(&code) {
        return needs_elevation;
    }
    if markers.cancelled_exit_codes.contains(&code) {
        return (OperationState::Failed, OperationResultCode::Cancelled);
    }
    if markers.hash_failure_exit_codes.contains(&code) {
        return (OperationState::Failed, OperationResultCode::IncorrectHash);
    }
    if markers.restart_exit_codes.contains(&code) {
        return (OperationState::Succeeded, OperationResultCode::NeedsRestart);
    }
    if markers.success_exit_codes.contains(&code)
        || (kind == OperationKind::Uninstall && markers.uninstall_success_exit_codes.contains(&code))
    {
        return (OperationState::Succeeded, OperationResultCode::OperationSucceeded);
    }
    if markers.elevation_scope == ElevationMarkerScope::FailedUninstall
        && kind == OperationKind::Uninstall
        && code != 0
        && markers.elevation_marker_in(output).is_some()
    {
        return needs_elevation;
    }
    if markers.has_no_update_marker(output) {
        return (
            OperationState::Succeeded,
            OperationResultCode::NoApplicableUpdateFound,
        );
    }
    if markers.has_failure_marker(output) {
        return (OperationState::Failed, OperationResultCode::Failed);
    }
    if code == 0 || markers.has_success_marker(output) {
        return (OperationState::Succeeded, OperationResultCode::OperationSucceeded);
    }
    (OperationState::Failed, OperationResultCode::Failed)
}

fn finish(
    inner: &CoordinatorInner,
    id: TaskId,
    manager: ManagerId,
    kind: OperationKind,
    outcome: OperationOutcome,
    events: &mpsc::UnboundedSender<OperationEvent>,
) {
    let mut package = None;
    update(inner, id, |snapshot| {
        snapshot.state = outcome.state;
        snapshot.result_code = Some(outcome.result_code);
        package = Some(snapshot.package.clone());
    });

    match outcome.state {
        OperationState::Succeeded => tracing::info!(
            manager = ?manager,
            task_id = id.0,
            result = ?outcome.result_code,
            "operation succeeded"
        ),
        state => tracing::warn!(
            manager = ?manager,
            task_id = id.0,
            state = ?state,
            result = ?outcome.result_code,
            "operation did not succeed"
        ),
    }

    if let (Some(history), Some(package)) = (&inner.history, package) {
        let entry = history_entry(kind, &package, &outcome);
        if let Err(error) = history.append_history(&entry) {
            tracing::warn!(task_id = id.0, kind = ?error.kind, message = %error.message, "failed to record operation history");
        }
    }

    let _ = events.send(OperationEvent::Finished(outcome));
}

fn history_entry(kind: OperationKind, package: &Package, outcome: &OperationOutcome) -> String {
    let finished_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default();
    format!(
        "{manager} {label} of {name} ({id}, {source}): {state:?} [{code}]\nFinished at {finished_at} (unix seconds)\n{output}",
        manager = package.manager.display_name(),
        label = kind.label(),
        name = package.name,
        id = package.id,
        source = package.source,
        state = outcome.state,
        code = outcome.result_code.code(),
        output = outcome.full_output,
    )
}

fn operation_kind(request: &ProcessSpawnRequest) -> OperationKind {
    match request.action {
        crate::models::ManagerAction::Update => OperationKind::Update,
        crate::models::ManagerAction::Uninstall => OperationKind::Uninstall,
        _ => OperationKind::Install,
    }
}

fn update(inner: &CoordinatorInner, id: TaskId, apply: impl FnOnce(&mut OperationSnapshot)) {
    if let Some(entry) = lock(&inner.operations).get_mut(&id) {
        apply(&mut entry.snapshot);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::{OperationState, classify_outcome};
    use crate::execution::ProcessExitStatus;
    use crate::models::{ManagerId, OperationKind, OperationResultCode};

    #[test]
    fn chocolatey_reboot_code_is_a_restart_success() {
        let (state, code) = classify_outcome(
            ManagerId::Chocolatey,
            OperationKind::Install,
            ProcessExitStatus::ExitCode(3010),
            "",
        );
        assert_eq!(state, OperationState::Succeeded);
        assert_eq!(code, OperationResultCode::NeedsRestart);
    }

    #[test]
    fn chocolatey_missing_package_uninstall_counts_as_success() {
        let (state, _) = classify_outcome(
            ManagerId::Chocolatey,
            OperationKind::Uninstall,
            ProcessExitStatus::ExitCode(1605),
            "",
        );
        assert_eq!(state, OperationState::Succeeded);

        let (state, _) = classify_outcome(
            ManagerId::Chocolatey,
            OperationKind::Install,
            ProcessExitStatus::ExitCode(1605),
            "",
        );
        assert_eq!(state, OperationState::Failed);
    }

    #[test]
    fn nonzero_exit_without_markers_fails() {
        let (state, code) = classify_outcome(
            ManagerId::Npm,
            OperationKind::Install,
            ProcessExitStatus::ExitCode(7),
            "something went sideways",
        );
        assert_eq!(state, OperationState::Failed);
        assert_eq!(code, OperationResultCode::Failed);
    }

    const OFFICE_INSTALL_LOG: &str = "Found Microsoft 365 Apps [Microsoft.Office] Version 16.0.16031.20000\n\
        Starting package install...\n\
        Successfully installed";

    #[test]
    fn winget_version_digits_do_not_read_as_elevation() {
        for kind in [OperationKind::Install, OperationKind::Update, OperationKind::Uninstall] {
            let (state, code) = classify_outcome(
                ManagerId::Winget,
                kind,
                ProcessExitStatus::ExitCode(0),
                OFFICE_INSTALL_LOG,
            );
            assert_eq!(state, OperationState::Succeeded, "{kind:?}");
            assert_eq!(code, OperationResultCode::OperationSucceeded);
        }
    }

    #[test]
    fn winget_access_denied_needs_elevation_only_for_failed_uninstalls() {
        let output = "Uninstall failed with exit code: 1603";
        let (state, _) = classify_outcome(
            ManagerId::Winget,
            OperationKind::Uninstall,
            ProcessExitStatus::ExitCode(1603),
            output,
        );
        assert_eq!(state, OperationState::NeedsElevation);

        let (state, _) = classify_outcome(
            ManagerId::Winget,
            OperationKind::Install,
            ProcessExitStatus::ExitCode(1603),
            output,
        );
        assert_eq!(state, OperationState::Failed);
    }

    #[test]
    fn winget_exit_codes_decide_before_text() {
        let hresult = |code: u32| ProcessExitStatus::ExitCode(code as i32);
        let cases = [
            (0x8A15_0019, OperationState::NeedsElevation, OperationResultCode::NeedsElevation),
            (0x8A15_002B, OperationState::Succeeded, OperationResultCode::OperationSucceeded),
            (0x8A15_010E, OperationState::Succeeded, OperationResultCode::OperationSucceeded),
            (0x8A15_0077, OperationState::Failed, OperationResultCode::Cancelled),
            (0x8A15_0011, OperationState::Failed, OperationResultCode::IncorrectHash),
            (0x8A15_0109, OperationState::Succeeded, OperationResultCode::NeedsRestart),
        ];
        for (code, state, result) in cases {
            assert_eq!(
                classify_outcome(ManagerId::Winget, OperationKind::Install, hresult(code), ""),
                (state, result),
                "{code:#x}"
            );
        }
    }

    #[test]
    fn scoop_install_with_error_fails_despite_clean_exit() {
        let output = "Installing 'ghostty' (1.0) [64bit]\nERROR 'ghostty' isn't supported on this architecture";
        let (state, _) = classify_outcome(
            ManagerId::Scoop,
            OperationKind::Install,
            ProcessExitStatus::ExitCode(0),
            output,
        );
        assert_eq!(state, OperationState::Failed);
    }

    #[test]
    fn scoop_install_ignores_exit_code_without_error() {
        let output = "Installing 'git' (2.44.0) [64bit]\n'git' (2.44.0) was installed successfully!";
        let (state, _) = classify_outcome(
            ManagerId::Scoop,
            OperationKind::Update,
            ProcessExitStatus::ExitCode(1),
            output,
        );
        assert_eq!(state, OperationState::Succeeded);
    }

    #[test]
    fn scoop_uninstall_needs_confirmation_phrase() {
        let (state, _) = classify_outcome(
            ManagerId::Scoop,
            OperationKind::Uninstall,
            ProcessExitStatus::ExitCode(0),
            "Uninstalling 'git' (2.44.0).\nRemoving shim for 'git'.\n'git' was uninstalled.",
        );
        assert_eq!(state, OperationState::Succeeded);

        let (state, _) = classify_outcome(
            ManagerId::Scoop,
            OperationKind::Uninstall,
            ProcessExitStatus::ExitCode(0),
            "'gti' isn't installed.",
        );
        assert_eq!(state, OperationState::Failed);
    }

    #[test]
    fn scoop_global_install_without_admin_needs_scoop_elevation() {
        let (state, code) = classify_outcome(
            ManagerId::Scoop,
            OperationKind::Install,
            ProcessExitStatus::ExitCode(1),
            "ERROR: you need admin rights to install global apps",
        );
        assert_eq!(state, OperationState::NeedsElevation);
        assert_eq!(code, OperationResultCode::NeedsScoopElevation);
    }

    #[test]
    fn killed_process_fails() {
        let (state, _) = classify_outcome(
            ManagerId::Winget,
            OperationKind::Install,
            ProcessExitStatus::Terminated,
            "",
        );
        assert_eq!(state, OperationState::Failed);
    }
}
