use std::process::Stdio;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::execution::{
    ExecutionResult, ProcessExecutor, ProcessExitStatus, ProcessOutput, ProcessSpawnRequest,
    ProcessStdout, ProcessTerminationMode, ProcessWaitFuture, RunningProcess,
};
use crate::models::{CoreError, CoreErrorKind, ManagerAction, ManagerId, TaskType};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// How long captured pipes may keep draining once the child has exited.
/// Descendants that inherit a pipe can hold it open indefinitely.
const PIPE_DRAIN_WINDOW: Duration = Duration::from_millis(250);

/// Runs package-manager commands as tokio child processes.
///
/// Stderr is drained by a background task from the moment the child starts,
/// so a manager that logs heavily to stderr never blocks on a full pipe
/// while its stdout is being streamed.
pub struct TokioProcessExecutor;

impl ProcessExecutor for TokioProcessExecutor {
    fn spawn(&self, request: ProcessSpawnRequest) -> ExecutionResult<Box<dyn RunningProcess>> {
        let context = ProcessContext::of(&request);
        let mut child = build_command(&request).spawn().map_err(|error| {
            context.failure(format!(
                "failed to spawn {}: {error}",
                request.command.program.display()
            ))
        })?;

        let stderr = collect_pipe(child.stderr.take());
        tracing::debug!(
            manager = ?context.manager,
            action = ?context.action,
            pid = ?child.id(),
            program = %request.command.program.display(),
            "spawned manager process"
        );

        Ok(Box::new(TokioRunningProcess {
            pid: child.id(),
            child: Mutex::new(Some(child)),
            stderr: Mutex::new(stderr),
            started_at: SystemTime::now(),
            timeout: request.timeout,
            context,
        }))
    }
}

fn build_command(request: &ProcessSpawnRequest) -> Command {
    let spec = &request.command;
    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .envs(&spec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = &spec.working_dir {
        command.current_dir(dir);
    }
    #[cfg(unix)]
    command.process_group(0);
    #[cfg(windows)]
    command.creation_flags(CREATE_NO_WINDOW);
    command
}

/// Reads a pipe to the end on a background task.
fn collect_pipe<R>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut pipe = pipe?;
    Some(tokio::spawn(async move {
        let mut buffer = Vec::new();
        if let Err(error) = pipe.read_to_end(&mut buffer).await {
            tracing::debug!(error = %error, "process pipe closed with error");
        }
        buffer
    }))
}

async fn drained(collector: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    let Some(collector) = collector else {
        return Vec::new();
    };
    match tokio::time::timeout(PIPE_DRAIN_WINDOW, collector).await {
        Ok(Ok(buffer)) => buffer,
        _ => Vec::new(),
    }
}

#[derive(Clone, Copy, Debug)]
struct ProcessContext {
    manager: ManagerId,
    task_type: TaskType,
    action: ManagerAction,
}

impl ProcessContext {
    fn of(request: &ProcessSpawnRequest) -> Self {
        Self {
            manager: request.manager,
            task_type: request.task_type,
            action: request.action,
        }
    }

    fn error(self, kind: CoreErrorKind, message: String) -> CoreError {
        CoreError {
            manager: Some(self.manager),
            task: Some(self.task_type),
            action: Some(self.action),
            kind,
            message,
        }
    }

    fn failure(self, message: String) -> CoreError {
        self.error(CoreErrorKind::ProcessFailure, message)
    }
}

struct TokioRunningProcess {
    child: Mutex<Option<Child>>,
    stderr: Mutex<Option<JoinHandle<Vec<u8>>>>,
    pid: Option<u32>,
    started_at: SystemTime,
    timeout: Option<Duration>,
    context: ProcessContext,
}

impl RunningProcess for TokioRunningProcess {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    #[cfg(unix)]
    fn terminate(&self, mode: ProcessTerminationMode) -> ExecutionResult<()> {
        let Some(pid) = self.pid else {
            return Ok(());
        };
        let signal = match mode {
            ProcessTerminationMode::Immediate => libc::SIGKILL,
            ProcessTerminationMode::Graceful { .. } => libc::SIGTERM,
        };
        match signal_group(pid, signal) {
            Ok(()) => Ok(()),
            Err(error) if error.raw_os_error() == Some(libc::ESRCH) => Ok(()),
            Err(error) => Err(self.context.failure(format!(
                "failed to send signal {signal} to process group {pid}: {error}"
            ))),
        }
    }

    #[cfg(not(unix))]
    fn terminate(&self, _mode: ProcessTerminationMode) -> ExecutionResult<()> {
        let mut guard = self
            .child
            .lock()
            .map_err(|_| self.context.failure("process handle lock poisoned".to_string()))?;
        match guard.as_mut() {
            Some(child) => child
                .start_kill()
                .map_err(|error| self.context.failure(format!("failed to kill process: {error}"))),
            None => Ok(()),
        }
    }

    fn take_stdout(&self) -> Option<ProcessStdout> {
        let stdout = self.child.lock().ok()?.as_mut()?.stdout.take()?;
        Some(Box::pin(stdout))
    }

    fn wait(self: Box<Self>) -> ProcessWaitFuture {
        let Self {
            child,
            stderr,
            pid,
            started_at,
            timeout,
            context,
        } = *self;
        let child = child.into_inner().ok().flatten();
        let stderr = stderr.into_inner().ok().flatten();

        Box::pin(async move {
            let mut child = child
                .ok_or_else(|| context.failure("child process already consumed".to_string()))?;
            let stdout = collect_pipe(child.stdout.take());

            let exited = match timeout {
                Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                    Ok(exited) => exited,
                    Err(_) => {
                        kill_tree(pid, &mut child);
                        let _ = tokio::time::timeout(Duration::from_secs(1), child.wait()).await;
                        for collector in [stdout, stderr].into_iter().flatten() {
                            collector.abort();
                        }
                        tracing::warn!(
                            manager = ?context.manager,
                            action = ?context.action,
                            timeout_ms = limit.as_millis() as u64,
                            "manager process timed out"
                        );
                        return Err(context.error(
                            CoreErrorKind::Timeout,
                            format!("process timed out after {}ms", limit.as_millis()),
                        ));
                    }
                },
                None => child.wait().await,
            }
            .map_err(|error| context.failure(format!("failed to wait for process: {error}")))?;

            let status = exited
                .code()
                .map_or(ProcessExitStatus::Terminated, ProcessExitStatus::ExitCode);
            Ok(ProcessOutput {
                status,
                stdout: drained(stdout).await,
                stderr: drained(stderr).await,
                started_at,
                finished_at: SystemTime::now(),
            })
        })
    }
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: libc::c_int) -> std::io::Result<()> {
    // A negative pid addresses the whole group created with `process_group(0)`.
    let result = unsafe { libc::kill(-(pid as libc::pid_t), signal) };
    if result == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(unix)]
fn kill_tree(pid: Option<u32>, _child: &mut Child) {
    if let Some(pid) = pid {
        let _ = signal_group(pid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_tree(_pid: Option<u32>, child: &mut Child) {
    let _ = child.start_kill();
}
