use std::path::PathBuf;
use std::sync::Arc;

use crate::adapters::detect_utils::{env_dir, find_executable, user_dir};
use crate::adapters::dotnet::{
    DOTNET_COMMAND, DotnetSource, OUTDATED_COMMAND, ToolScope, dotnet_detect_request,
    dotnet_install_outdated_helper_request, dotnet_list_request, dotnet_outdated_request,
    dotnet_search_request, dotnet_tool_probe_request,
};
use crate::adapters::manager::{AdapterResult, DetectOutput};
use crate::adapters::process_utils::{
    run_and_collect_listing, run_and_collect_stdout, run_and_collect_version_output,
};
use crate::details::{DetailsFetcher, encode_path_segment};
use crate::execution::{ProcessExecutor, ProcessSpawnRequest};

pub struct ProcessDotnetSource {
    executor: Arc<dyn ProcessExecutor>,
    fetcher: Arc<dyn DetailsFetcher>,
}

impl ProcessDotnetSource {
    pub fn new(executor: Arc<dyn ProcessExecutor>, fetcher: Arc<dyn DetailsFetcher>) -> Self {
        Self { executor, fetcher }
    }

    fn dotnet() -> Option<PathBuf> {
        let extra: Vec<PathBuf> = [
            env_dir("ProgramFiles", &["dotnet"]),
            user_dir(&[".dotnet"]),
        ]
        .into_iter()
        .flatten()
        .collect();
        find_executable(DOTNET_COMMAND, &extra)
    }

    fn global_tool(name: &str) -> Option<PathBuf> {
        let extra: Vec<PathBuf> = user_dir(&[".dotnet", "tools"]).into_iter().collect();
        find_executable(name, &extra)
    }

    fn configure_request(&self, mut request: ProcessSpawnRequest) -> ProcessSpawnRequest {
        request.command = request
            .command
            .env("DOTNET_CLI_TELEMETRY_OPTOUT", "1")
            .env("DOTNET_NOLOGO", "1");

        // Local tools resolve against a manifest in the home tree.
        if request.command.working_dir.is_none()
            && let Some(home) = user_dir(&[])
        {
            request.command = request.command.working_dir(home);
        }

        let program = request.command.program.to_str().map(str::to_string);
        let resolved = match program.as_deref() {
            Some(DOTNET_COMMAND) => Self::dotnet(),
            Some(OUTDATED_COMMAND) => Self::global_tool(OUTDATED_COMMAND),
            _ => None,
        };
        if let Some(exe) = resolved {
            request.command.program = exe;
        }
        request
    }

    fn listing(&self, request: ProcessSpawnRequest) -> AdapterResult<String> {
        run_and_collect_listing(self.executor.as_ref(), self.configure_request(request))
    }

    fn strict(&self, request: ProcessSpawnRequest) -> AdapterResult<String> {
        run_and_collect_stdout(self.executor.as_ref(), self.configure_request(request))
    }
}

impl DotnetSource for ProcessDotnetSource {
    fn detect(&self) -> AdapterResult<DetectOutput> {
        let Some(executable_path) = Self::dotnet() else {
            return Ok(DetectOutput {
                executable_path: None,
                version_output: String::new(),
            });
        };

        if let Err(error) = self.strict(dotnet_tool_probe_request(None)) {
            tracing::debug!(error = %error, "dotnet is present but cannot manage tools");
            return Ok(DetectOutput {
                executable_path: None,
                version_output: String::new(),
            });
        }

        let request = self.configure_request(dotnet_detect_request(None));
        Ok(DetectOutput {
            executable_path: Some(executable_path),
            version_output: run_and_collect_version_output(self.executor.as_ref(), request),
        })
    }

    fn list_installed(&self, scope: ToolScope) -> AdapterResult<String> {
        self.listing(dotnet_list_request(None, scope))
    }

    fn list_outdated(&self) -> AdapterResult<String> {
        if Self::global_tool(OUTDATED_COMMAND).is_none() {
            tracing::info!("installing {OUTDATED_COMMAND} for update checks");
            self.strict(dotnet_install_outdated_helper_request(None))?;
        }
        self.listing(dotnet_outdated_request(None))
    }

    fn search(&self, query: &str) -> AdapterResult<String> {
        self.listing(dotnet_search_request(None, query))
    }

    fn nuget_metadata(&self, id: &str) -> AdapterResult<String> {
        let url = format!(
            "https://azuresearch-usnc.nuget.org/query?q=packageid:{}&prerelease=true&semVerLevel=2.0.0",
            encode_path_segment(id)
        );
        self.fetcher.get_text(&url)
    }

    fn prepare(&self, request: ProcessSpawnRequest) -> ProcessSpawnRequest {
        self.configure_request(request)
    }
}
