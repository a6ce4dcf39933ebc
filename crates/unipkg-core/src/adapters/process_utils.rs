use crate::adapters::manager::AdapterResult;
use crate::execution::{
    ProcessExecutor, ProcessExitStatus, ProcessOutput, ProcessSpawnRequest, spawn_validated,
};
use crate::models::{CoreError, CoreErrorKind};

fn run_to_completion(
    executor: &dyn ProcessExecutor,
    request: ProcessSpawnRequest,
) -> AdapterResult<ProcessOutput> {
    let process = spawn_validated(executor, request)?;
    let handle = tokio::runtime::Handle::current();
    handle.block_on(process.wait())
}

/// Runs a command and returns stdout, failing on a nonzero exit.
pub(crate) fn run_and_collect_stdout(
    executor: &dyn ProcessExecutor,
    request: ProcessSpawnRequest,
) -> AdapterResult<String> {
    let manager = request.manager;
    let task_type = request.task_type;
    let action = request.action;

    let output = run_to_completion(executor, request)?;

    match output.status {
        ProcessExitStatus::ExitCode(0) => Ok(String::from_utf8_lossy(&output.stdout).into_owned()),
        ProcessExitStatus::ExitCode(code) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(CoreError {
                manager: Some(manager),
                task: Some(task_type),
                action: Some(action),
                kind: CoreErrorKind::ProcessFailure,
                message: format!("process exited with code {code}: {}", stderr.trim()),
            })
        }
        ProcessExitStatus::Terminated => Err(CoreError {
            manager: Some(manager),
            task: Some(task_type),
            action: Some(action),
            kind: CoreErrorKind::ProcessFailure,
            message: "process was terminated by signal".to_string(),
        }),
    }
}

/// Runs a listing command and returns whatever it printed. Package managers
/// routinely exit nonzero while still printing a usable table (winget when
/// nothing is installed, npm outdated when anything is outdated), so the exit
/// code only produces a warning.
pub(crate) fn run_and_collect_listing(
    executor: &dyn ProcessExecutor,
    request: ProcessSpawnRequest,
) -> AdapterResult<String> {
    let manager = request.manager;
    let action = request.action;

    let output = run_to_completion(executor, request)?;

    if output.status != ProcessExitStatus::ExitCode(0) {
        tracing::warn!(
            manager = ?manager,
            action = ?action,
            status = ?output.status,
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "listing command exited unsuccessfully; parsing its output anyway"
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Version probes never fail detection; a missing tool just yields no text.
pub(crate) fn run_and_collect_version_output(
    executor: &dyn ProcessExecutor,
    request: ProcessSpawnRequest,
) -> String {
    let manager = request.manager;
    match run_and_collect_stdout(executor, request) {
        Ok(output) => output,
        Err(error) => {
            tracing::debug!(manager = ?manager, error = %error, "version probe failed");
            String::new()
        }
    }
}

/// First non-empty line of a version probe, trimmed.
pub(crate) fn first_version_line(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}
