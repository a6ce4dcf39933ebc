use std::path::PathBuf;
use std::sync::Arc;

use crate::adapters::detect_utils::{find_executable, powershell_executable, user_dir};
use crate::adapters::manager::{AdapterResult, DetectOutput};
use crate::adapters::process_utils::{
    run_and_collect_listing, run_and_collect_stdout, run_and_collect_version_output,
};
use crate::adapters::scoop::{
    POWERSHELL_COMMAND, SCOOP_SEARCH_COMMAND, ScoopSource, scoop_bucket_add_request,
    scoop_bucket_list_request, scoop_bucket_remove_request, scoop_cat_request,
    scoop_detect_request, scoop_list_request, scoop_search_request, scoop_status_request,
    scoop_update_request,
};
use crate::execution::{ProcessExecutor, ProcessSpawnRequest};

pub struct ProcessScoopSource {
    executor: Arc<dyn ProcessExecutor>,
}

impl ProcessScoopSource {
    pub fn new(executor: Arc<dyn ProcessExecutor>) -> Self {
        Self { executor }
    }

    fn shims() -> Vec<PathBuf> {
        user_dir(&["scoop", "shims"]).into_iter().collect()
    }

    fn configure_request(&self, mut request: ProcessSpawnRequest) -> ProcessSpawnRequest {
        let program = request.command.program.to_str().map(str::to_string);
        match program.as_deref() {
            Some(POWERSHELL_COMMAND) => {
                if let Some(exe) = powershell_executable() {
                    request.command.program = exe;
                }
            }
            Some(SCOOP_SEARCH_COMMAND) => {
                if let Some(exe) = find_executable(SCOOP_SEARCH_COMMAND, &Self::shims()) {
                    request.command.program = exe;
                }
            }
            _ => {}
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

impl ScoopSource for ProcessScoopSource {
    fn detect(&self) -> AdapterResult<DetectOutput> {
        let executable_path = find_executable("scoop", &Self::shims());
        let version_output = if executable_path.is_some() {
            let request = self.configure_request(scoop_detect_request(None));
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
        self.listing(scoop_list_request(None))
    }

    fn status(&self) -> AdapterResult<String> {
        self.listing(scoop_status_request(None))
    }

    fn search(&self, query: &str) -> AdapterResult<String> {
        self.listing(scoop_search_request(None, query))
    }

    fn manifest(&self, id: &str) -> AdapterResult<String> {
        self.strict(scoop_cat_request(None, id))
    }

    fn list_buckets(&self) -> AdapterResult<String> {
        self.listing(scoop_bucket_list_request(None))
    }

    fn add_bucket(&self, name: &str, url: &str) -> AdapterResult<String> {
        self.strict(scoop_bucket_add_request(None, name, url))
    }

    fn remove_bucket(&self, name: &str) -> AdapterResult<String> {
        self.strict(scoop_bucket_remove_request(None, name))
    }

    fn update(&self) -> AdapterResult<String> {
        self.strict(scoop_update_request(None))
    }

    fn prepare(&self, request: ProcessSpawnRequest) -> ProcessSpawnRequest {
        self.configure_request(request)
    }
}
