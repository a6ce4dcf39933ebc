use std::path::PathBuf;
use std::sync::Arc;

use crate::adapters::chocolatey::{
    ChocolateySource, choco_detect_request, choco_info_request, choco_list_request,
    choco_outdated_request, choco_search_request, choco_source_add_request,
    choco_source_list_request, choco_source_remove_request, choco_versions_request,
};
use crate::adapters::detect_utils::{env_dir, find_executable};
use crate::adapters::manager::{AdapterResult, DetectOutput};
use crate::adapters::process_utils::{
    run_and_collect_listing, run_and_collect_stdout, run_and_collect_version_output,
};
use crate::execution::{ProcessExecutor, ProcessSpawnRequest};

pub struct ProcessChocolateySource {
    executor: Arc<dyn ProcessExecutor>,
}

impl ProcessChocolateySource {
    pub fn new(executor: Arc<dyn ProcessExecutor>) -> Self {
        Self { executor }
    }

    fn executable() -> Option<PathBuf> {
        let extra: Vec<PathBuf> = [
            env_dir("ChocolateyInstall", &["bin"]),
            env_dir("ProgramData", &["chocolatey", "bin"]),
        ]
        .into_iter()
        .flatten()
        .collect();
        find_executable("choco", &extra)
    }

    fn configure_request(&self, mut request: ProcessSpawnRequest) -> ProcessSpawnRequest {
        if request.command.program.to_str() == Some("choco")
            && let Some(exe) = Self::executable()
        {
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

impl ChocolateySource for ProcessChocolateySource {
    fn detect(&self) -> AdapterResult<DetectOutput> {
        let executable_path = Self::executable();
        let version_output = if executable_path.is_some() {
            let request = self.configure_request(choco_detect_request(None));
            run_and_collect_version_output(self.executor.as_ref(), request)
        } else {
            String::new()
        };
        Ok(DetectOutput {
            executable_path,
            version_output,
        })
    }

    fn list_installed(&self) -> AdapterResult<String> {
        self.listing(choco_list_request(None))
    }

    fn list_outdated(&self) -> AdapterResult<String> {
        self.listing(choco_outdated_request(None))
    }

    fn search(&self, query: &str) -> AdapterResult<String> {
        self.listing(choco_search_request(None, query))
    }

    fn info(&self, id: &str) -> AdapterResult<String> {
        self.strict(choco_info_request(None, id))
    }

    fn versions(&self, id: &str) -> AdapterResult<String> {
        self.listing(choco_versions_request(None, id))
    }

    fn list_sources(&self) -> AdapterResult<String> {
        self.listing(choco_source_list_request(None))
    }

    fn add_source(&self, name: &str, url: &str) -> AdapterResult<String> {
        self.strict(choco_source_add_request(None, name, url))
    }

    fn remove_source(&self, name: &str) -> AdapterResult<String> {
        self.strict(choco_source_remove_request(None, name))
    }

    fn prepare(&self, request: ProcessSpawnRequest) -> ProcessSpawnRequest {
        self.configure_request(request)
    }
}
