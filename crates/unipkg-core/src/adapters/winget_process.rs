use std::path::PathBuf;
use std::sync::Arc;

use crate::adapters::detect_utils::{env_dir, find_executable};
use crate::adapters::manager::{AdapterResult, DetectOutput};
use crate::adapters::process_utils::{
    run_and_collect_listing, run_and_collect_stdout, run_and_collect_version_output,
};
use crate::adapters::winget::{
    WingetSource, winget_detect_request, winget_list_request, winget_search_request,
    winget_show_request, winget_source_add_request, winget_source_list_request,
    winget_source_remove_request, winget_source_update_request, winget_updates_request,
    winget_versions_request,
};
use crate::execution::{ProcessExecutor, ProcessSpawnRequest};

pub struct ProcessWingetSource {
    executor: Arc<dyn ProcessExecutor>,
}

impl ProcessWingetSource {
    pub fn new(executor: Arc<dyn ProcessExecutor>) -> Self {
        Self { executor }
    }

    fn executable() -> Option<PathBuf> {
        let extra: Vec<PathBuf> = env_dir("LOCALAPPDATA", &["Microsoft", "WindowsApps"])
            .into_iter()
            .collect();
        find_executable("winget", &extra)
    }

    fn configure_request(&self, mut request: ProcessSpawnRequest) -> ProcessSpawnRequest {
        if request.command.program.to_str() == Some("winget")
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

impl WingetSource for ProcessWingetSource {
    fn detect(&self) -> AdapterResult<DetectOutput> {
        let executable_path = Self::executable();
        let request = self.configure_request(winget_detect_request(None));
        let version_output = run_and_collect_version_output(self.executor.as_ref(), request);
        Ok(DetectOutput {
            executable_path,
            version_output,
        })
    }

    fn list_installed(&self) -> AdapterResult<String> {
        self.listing(winget_list_request(None))
    }

    fn list_updates(&self) -> AdapterResult<String> {
        self.listing(winget_updates_request(None))
    }

    fn search(&self, query: &str) -> AdapterResult<String> {
        self.listing(winget_search_request(None, query))
    }

    fn show(&self, id: &str) -> AdapterResult<String> {
        self.strict(winget_show_request(None, id))
    }

    fn show_versions(&self, id: &str) -> AdapterResult<String> {
        self.strict(winget_versions_request(None, id))
    }

    fn list_sources(&self) -> AdapterResult<String> {
        self.listing(winget_source_list_request(None))
    }

    fn add_source(&self, name: &str, url: &str) -> AdapterResult<String> {
        self.strict(winget_source_add_request(None, name, url))
    }

    fn remove_source(&self, name: &str) -> AdapterResult<String> {
        self.strict(winget_source_remove_request(None, name))
    }

    fn update_sources(&self) -> AdapterResult<String> {
        self.strict(winget_source_update_request(None))
    }

    fn prepare(&self, request: ProcessSpawnRequest) -> ProcessSpawnRequest {
        self.configure_request(request)
    }
}
