use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use unipkg_core::Engine;
use unipkg_core::adapters::{
    AdapterRequest, AdapterResponse, AdapterResult, ManagerAdapter, OperationRequest,
};
use unipkg_core::config::EngineConfig;
use unipkg_core::execution::{
    CommandSpec, ExecutionResult, ProcessExecutor, ProcessExitStatus, ProcessOutput,
    ProcessSpawnRequest, ProcessTerminationMode, ProcessWaitFuture, RunningProcess,
};
use unipkg_core::models::{
    Capability, CoreErrorKind, IgnoredUpdate, InstallationOptions, InstallationScope,
    ManagerCapabilities, ManagerDescriptor, ManagerId, OperationKind, Package, UpgradablePackage,
};
use unipkg_core::orchestration::OperationState;
use unipkg_core::persistence::OPTIONS_DIR;

const CAPABILITIES: &[Capability] = &[
    Capability::ListUpdates,
    Capability::Install,
    Capability::Update,
    Capability::Uninstall,
];

struct UpdatesAdapter {
    descriptor: ManagerDescriptor,
    updates: Vec<UpgradablePackage>,
}

impl ManagerAdapter for UpdatesAdapter {
    fn descriptor(&self) -> &ManagerDescriptor {
        &self.descriptor
    }

    fn execute(&self, request: AdapterRequest) -> AdapterResult<AdapterResponse> {
        match request {
            AdapterRequest::ListUpdates(_) => Ok(AdapterResponse::Updates(self.updates.clone())),
            other => panic!("unexpected request: {other:?}"),
        }
    }

    fn operation_request(&self, request: &OperationRequest) -> AdapterResult<ProcessSpawnRequest> {
        let mut command = CommandSpec::new("tool").arg(request.package.id.clone());
        if request.options.installation_scope == Some(InstallationScope::Machine) {
            command = command.arg("--machine");
        }
        Ok(ProcessSpawnRequest::new(
            self.descriptor.id,
            request.kind.task_type(),
            request.kind.action(),
            command,
        ))
    }
}

struct RecordingExecutor {
    commands: std::sync::Mutex<Vec<Vec<String>>>,
}

struct DoneProcess;

impl RunningProcess for DoneProcess {
    fn pid(&self) -> Option<u32> {
        None
    }

    fn terminate(&self, _mode: ProcessTerminationMode) -> ExecutionResult<()> {
        Ok(())
    }

    fn wait(self: Box<Self>) -> ProcessWaitFuture {
        Box::pin(async {
            let now = SystemTime::now();
            Ok(ProcessOutput {
                status: ProcessExitStatus::ExitCode(0),
                stdout: b"done\n".to_vec(),
                stderr: Vec::new(),
                started_at: now,
                finished_at: now,
            })
        })
    }
}

impl ProcessExecutor for RecordingExecutor {
    fn spawn(&self, request: ProcessSpawnRequest) -> ExecutionResult<Box<dyn RunningProcess>> {
        self.commands
            .lock()
            .expect("commands")
            .push(request.command.args.clone());
        Ok(Box::new(DoneProcess))
    }
}

fn settings_dir() -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    std::env::temp_dir().join(format!("unipkg-engine-{nanos}"))
}

fn upgrade(id: &str, to: &str) -> UpgradablePackage {
    UpgradablePackage {
        package: Package::new(ManagerId::Winget, id, id, "1.0.0", "Winget: winget"),
        new_version: to.to_string(),
    }
}

fn open_engine(dir: &PathBuf, executor: Arc<RecordingExecutor>) -> Engine {
    let adapter: Arc<dyn ManagerAdapter> = Arc::new(UpdatesAdapter {
        descriptor: ManagerDescriptor {
            id: ManagerId::Winget,
            display_name: "Winget",
            capabilities: CAPABILITIES,
            features: ManagerCapabilities {
                supports_custom_scopes: true,
                scopes: &[InstallationScope::User, InstallationScope::Machine],
                ..ManagerCapabilities::NONE
            },
        },
        updates: vec![upgrade("Git.Git", "2.44.0"), upgrade("Mozilla.Firefox", "125.0")],
    });
    Engine::with_adapters(dir, vec![adapter], executor).expect("engine")
}

fn recording_executor() -> Arc<RecordingExecutor> {
    Arc::new(RecordingExecutor {
        commands: std::sync::Mutex::new(Vec::new()),
    })
}

#[tokio::test]
async fn ignoring_an_update_survives_reopening_the_engine() {
    let dir = settings_dir();
    let engine = open_engine(&dir, recording_executor());
    engine
        .ignore_update(&upgrade("Git.Git", "2.44.0"), false)
        .expect("ignore");
    drop(engine);

    let engine = open_engine(&dir, recording_executor());
    let ids: Vec<String> = engine
        .aggregator()
        .list_updates()
        .collect()
        .await
        .items
        .into_iter()
        .map(|update| update.package.id)
        .collect();
    assert_eq!(ids, vec!["Mozilla.Firefox"]);
    assert_eq!(
        engine.ignored_updates().expect("ignored"),
        vec![IgnoredUpdate::permanent("Git.Git", "winget")]
    );

    engine
        .unignore_update("Git.Git", "Winget: winget")
        .expect("unignore");
    assert_eq!(engine.aggregator().list_updates().collect().await.items.len(), 2);
    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn disabling_a_manager_is_persisted_and_blocks_operations() {
    let dir = settings_dir();
    let engine = open_engine(&dir, recording_executor());
    engine
        .set_manager_enabled(ManagerId::Winget, false)
        .expect("disable");

    let reloaded = EngineConfig::load(&dir).expect("config");
    assert!(!reloaded.is_enabled(ManagerId::Winget));
    assert!(engine.aggregator().list_updates().collect().await.items.is_empty());

    let error = match engine
        .start_operation(
            OperationKind::Install,
            Package::new(ManagerId::Winget, "Git", "Git.Git", "2.44.0", "Winget: winget"),
            None,
        )
        .await
    {
        Ok(_) => panic!("disabled managers cannot run operations"),
        Err(error) => error,
    };
    assert_eq!(error.kind, CoreErrorKind::NotInstalled);

    drop(engine);
    let engine = open_engine(&dir, recording_executor());
    assert!(!engine.aggregator().is_enabled(ManagerId::Winget));
    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn saved_options_apply_when_none_are_passed() {
    let dir = settings_dir();
    let executor = recording_executor();
    let engine = open_engine(&dir, executor.clone());
    engine
        .save_options(
            ManagerId::Winget,
            "Git.Git",
            &InstallationOptions {
                installation_scope: Some(InstallationScope::Machine),
                ..InstallationOptions::default()
            },
        )
        .expect("save");

    let package = Package::new(ManagerId::Winget, "Git", "Git.Git", "2.44.0", "Winget: winget");
    let outcome = engine
        .start_operation(OperationKind::Install, package, None)
        .await
        .expect("start")
        .wait()
        .await;
    assert_eq!(outcome.state, OperationState::Succeeded);
    assert_eq!(outcome.full_output, "done");

    let commands = executor.commands.lock().expect("commands").clone();
    assert_eq!(commands, vec![vec!["Git.Git".to_string(), "--machine".to_string()]]);
    assert_eq!(engine.history().expect("history").len(), 1);
    let _ = std::fs::remove_dir_all(dir);
}

fn write_saved_options(dir: &PathBuf, id: &str, raw: &str) {
    let options_dir = dir.join(OPTIONS_DIR);
    std::fs::create_dir_all(&options_dir).expect("options dir");
    std::fs::write(options_dir.join(format!("Winget.{id}.json")), raw).expect("write options");
}

#[tokio::test]
async fn legacy_options_with_blank_scope_still_install() {
    let dir = settings_dir();
    let executor = recording_executor();
    let engine = open_engine(&dir, executor.clone());
    write_saved_options(
        &dir,
        "Git.Git",
        r#"{"RunAsAdministrator":false,"InstallationScope":"","Version":"","CustomParameters":[]}"#,
    );

    let package = Package::new(ManagerId::Winget, "Git", "Git.Git", "2.44.0", "Winget: winget");
    let outcome = engine
        .start_operation(OperationKind::Install, package, None)
        .await
        .expect("start")
        .wait()
        .await;

    assert_eq!(outcome.state, OperationState::Succeeded);
    let commands = executor.commands.lock().expect("commands").clone();
    assert_eq!(commands, vec![vec!["Git.Git".to_string()]]);
    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn unreadable_saved_options_fall_back_to_defaults() {
    let dir = settings_dir();
    let executor = recording_executor();
    let engine = open_engine(&dir, executor.clone());
    write_saved_options(&dir, "Mozilla.Firefox", "{\"InstallationScope\": ");

    let package = Package::new(
        ManagerId::Winget,
        "Firefox",
        "Mozilla.Firefox",
        "125.0",
        "Winget: winget",
    );
    let outcome = engine
        .start_operation(OperationKind::Update, package, None)
        .await
        .expect("start")
        .wait()
        .await;

    assert_eq!(outcome.state, OperationState::Succeeded);
    let commands = executor.commands.lock().expect("commands").clone();
    assert_eq!(commands, vec![vec!["Mozilla.Firefox".to_string()]]);
    let _ = std::fs::remove_dir_all(dir);
}
