use std::sync::Arc;

use crate::adapters::detect_utils::powershell_executable;
use crate::adapters::manager::{AdapterResult, DetectOutput};
use crate::adapters::powershell::{
    PowerShellSource, powershell_detect_request, powershell_info_request,
    powershell_list_request, powershell_repository_add_request,
    powershell_repository_list_request, powershell_repository_remove_request,
    powershell_search_request, powershell_updates_request, powershell_versions_request,
};
use crate::adapters::process_utils::{
    run_and_collect_listing, run_and_collect_stdout, run_and_collect_version_output,
};
use crate::adapters::scoop::POWERSHELL_COMMAND;
use crate::execution::{ProcessExecutor, ProcessSpawnRequest};

pub struct ProcessPowerShellSource {
    executor: Arc<dyn ProcessExecutor>,
}

impl ProcessPowerShellSource {
    pub fn new(executor: Arc<dyn ProcessExecutor>) -> Self {
        Self { executor }
    }

    fn configure_request(&self, mut request: ProcessSpawnRequest) -> ProcessSpawnRequest {
        if request.command.program.to_str() == Some(POWERSHELL_COMMAND)
            && let Some(exe) = powershell_executable()
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

impl PowerShellSource for ProcessPowerShellSource {
    fn detect(&self) -> AdapterResult<DetectOutput> {
        let executable_path = powershell_executable();
        let version_output = if executable_path.is_some() {
            let request = self.configure_request(powershell_detect_request(None));
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
        self.listing(powershell_list_request(None))
    }

    fn list_updates(&self) -> AdapterResult<String> {
        self.listing(powershell_updates_request(None))
    }

    fn search(&self, query: &str) -> AdapterResult<String> {
        self.listing(powershell_search_request(None, query))
    }

    fn module_info(&self, id: &str) -> AdapterResult<String> {
        self.strict(powershell_info_request(None, id))
    }

    fn module_versions(&self, id: &str) -> AdapterResult<String> {
        self.listing(powershell_versions_request(None, id))
    }

    fn list_repositories(&self) -> AdapterResult<String> {
        self.listing(powershell_repository_list_request(None))
    }

    fn register_repository(&self, name: &str, url: &str) -> AdapterResult<String> {
        self.strict(powershell_repository_add_request(None, name, url))
    }

    fn unregister_repository(&self, name: &str) -> AdapterResult<String> {
        self.strict(powershell_repository_remove_request(None, name))
    }

    fn prepare(&self, request: ProcessSpawnRequest) -> ProcessSpawnRequest {
        self.configure_request(request)
    }
}
