use std::path::PathBuf;
use std::sync::Arc;

use crate::adapters::detect_utils::{env_dir, find_executable, user_dir};
use crate::adapters::manager::{AdapterResult, DetectOutput};
use crate::adapters::npm::{
    NPM_COMMAND, NpmScope, NpmSource, npm_detect_request, npm_info_request,
    npm_list_installed_request, npm_list_outdated_request, npm_search_request,
};
use crate::adapters::process_utils::{
    run_and_collect_listing, run_and_collect_stdout, run_and_collect_version_output,
};
use crate::execution::{ProcessExecutor, ProcessSpawnRequest};

pub struct ProcessNpmSource {
    executor: Arc<dyn ProcessExecutor>,
}

impl ProcessNpmSource {
    pub fn new(executor: Arc<dyn ProcessExecutor>) -> Self {
        Self { executor }
    }

    fn executable() -> Option<PathBuf> {
        let extra: Vec<PathBuf> = [
            env_dir("ProgramFiles", &["nodejs"]),
            env_dir("APPDATA", &["npm"]),
        ]
        .into_iter()
        .flatten()
        .collect();
        find_executable(NPM_COMMAND, &extra)
    }

    fn configure_request(&self, mut request: ProcessSpawnRequest) -> ProcessSpawnRequest {
        request.command = request
            .command
            .env("NPM_CONFIG_UPDATE_NOTIFIER", "false")
            .env("NPM_CONFIG_FUND", "false")
            .env("NPM_CONFIG_AUDIT", "false");

        // Local packages live in the user's home tree.
        if request.command.working_dir.is_none()
            && let Some(home) = user_dir(&[])
        {
            request.command = request.command.working_dir(home);
        }

        if request.command.program.to_str() == Some(NPM_COMMAND)
            && let Some(exe) = Self::executable()
        {
            request.command.program = exe;
        }

        request
    }

    fn listing(&self, request: ProcessSpawnRequest) -> AdapterResult<String> {
        run_and_collect_listing(self.executor.as_ref(), self.configure_request(request))
    }
}

impl NpmSource for ProcessNpmSource {
    fn detect(&self) -> AdapterResult<DetectOutput> {
        let executable_path = Self::executable();
        let version_output = if executable_path.is_some() {
            let request = self.configure_request(npm_detect_request(None));
            run_and_collect_version_output(self.executor.as_ref(), request)
        } else {
            String::new()
        };
        Ok(DetectOutput {
            executable_path,
            version_output,
        })
    }

    fn list_installed(&self, scope: NpmScope) -> AdapterResult<String> {
        self.listing(npm_list_installed_request(None, scope))
    }

    fn list_outdated(&self, scope: NpmScope) -> AdapterResult<String> {
        self.listing(npm_list_outdated_request(None, scope))
    }

    fn search(&self, query: &str) -> AdapterResult<String> {
        self.listing(npm_search_request(None, query))
    }

    fn info(&self, id: &str) -> AdapterResult<String> {
        run_and_collect_stdout(
            self.executor.as_ref(),
            self.configure_request(npm_info_request(None, id)),
        )
    }

    fn prepare(&self, request: ProcessSpawnRequest) -> ProcessSpawnRequest {
        self.configure_request(request)
    }
}
