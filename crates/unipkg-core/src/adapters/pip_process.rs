use std::path::PathBuf;
use std::sync::Arc;

use crate::adapters::detect_utils::{find_executable, user_dir};
use crate::adapters::manager::{AdapterResult, DetectOutput};
use crate::adapters::pip::{
    PIP_SEARCH_COMMAND, PYTHON_COMMAND, PipSource, pip_detect_request,
    pip_index_versions_request, pip_install_search_helper_request, pip_list_outdated_request,
    pip_list_request, pip_search_request, pip_show_request,
};
use crate::adapters::process_utils::{
    run_and_collect_listing, run_and_collect_stdout, run_and_collect_version_output,
};
use crate::details::{DetailsFetcher, encode_path_segment};
use crate::execution::{ProcessExecutor, ProcessSpawnRequest};

pub struct ProcessPipSource {
    executor: Arc<dyn ProcessExecutor>,
    fetcher: Arc<dyn DetailsFetcher>,
}

impl ProcessPipSource {
    pub fn new(executor: Arc<dyn ProcessExecutor>, fetcher: Arc<dyn DetailsFetcher>) -> Self {
        Self { executor, fetcher }
    }

    fn python() -> Option<PathBuf> {
        find_executable(PYTHON_COMMAND, &[]).or_else(|| find_executable("python3", &[]))
    }

    /// Console scripts installed by `pip install --user` land outside PATH.
    fn search_helper() -> Option<PathBuf> {
        let extra: Vec<PathBuf> = [
            user_dir(&[".local", "bin"]),
            user_dir(&["AppData", "Roaming", "Python", "Scripts"]),
        ]
        .into_iter()
        .flatten()
        .collect();
        find_executable(PIP_SEARCH_COMMAND, &extra)
    }

    fn configure_request(&self, mut request: ProcessSpawnRequest) -> ProcessSpawnRequest {
        request.command = request
            .command
            .env("PIP_DISABLE_PIP_VERSION_CHECK", "1")
            .env("PIP_NO_INPUT", "1")
            .env("PYTHONIOENCODING", "utf-8");

        let program = request.command.program.to_str().map(str::to_string);
        let resolved = match program.as_deref() {
            Some(PYTHON_COMMAND) => Self::python(),
            Some(PIP_SEARCH_COMMAND) => Self::search_helper(),
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
}

impl PipSource for ProcessPipSource {
    fn detect(&self) -> AdapterResult<DetectOutput> {
        let executable_path = Self::python();
        let version_output = if executable_path.is_some() {
            let request = self.configure_request(pip_detect_request(None));
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
        self.listing(pip_list_request(None))
    }

    fn list_outdated(&self) -> AdapterResult<String> {
        self.listing(pip_list_outdated_request(None))
    }

    fn search(&self, query: &str) -> AdapterResult<String> {
        if Self::search_helper().is_none() {
            tracing::info!("installing {PIP_SEARCH_COMMAND} for pip search");
            run_and_collect_stdout(
                self.executor.as_ref(),
                self.configure_request(pip_install_search_helper_request(None)),
            )?;
        }
        self.listing(pip_search_request(None, query))
    }

    fn show(&self, id: &str) -> AdapterResult<String> {
        self.listing(pip_show_request(None, id))
    }

    fn index_versions(&self, id: &str) -> AdapterResult<String> {
        self.listing(pip_index_versions_request(None, id))
    }

    fn pypi_json(&self, id: &str) -> AdapterResult<String> {
        let url = format!("https://pypi.org/pypi/{}/json", encode_path_segment(id));
        self.fetcher.get_text(&url)
    }

    fn prepare(&self, request: ProcessSpawnRequest) -> ProcessSpawnRequest {
        self.configure_request(request)
    }
}
