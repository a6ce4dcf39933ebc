pub mod chocolatey;
pub mod chocolatey_process;
pub(crate) mod detect_utils;
pub mod dotnet;
pub mod dotnet_process;
pub mod manager;
pub mod npm;
pub mod npm_process;
pub mod pip;
pub mod pip_process;
pub mod powershell;
pub mod powershell_process;
pub(crate) mod process_utils;
pub mod scoop;
pub mod scoop_process;
pub mod winget;
pub mod winget_process;

use std::sync::Arc;

use crate::details::DetailsFetcher;
use crate::execution::ProcessExecutor;

pub use chocolatey::{
    ChocolateyAdapter, ChocolateySource, choco_detect_request, choco_info_request,
    choco_list_request, choco_operation_request, choco_outdated_request, choco_search_request,
    choco_source_add_request, choco_source_list_request, choco_source_remove_request,
    choco_versions_request,
};
pub use chocolatey_process::ProcessChocolateySource;
pub use dotnet::{
    DotnetAdapter, DotnetSource, ToolScope, dotnet_detect_request,
    dotnet_install_outdated_helper_request, dotnet_list_request, dotnet_operation_request,
    dotnet_outdated_request, dotnet_search_request, dotnet_tool_probe_request,
};
pub use dotnet_process::ProcessDotnetSource;
pub use manager::{
    AdapterRequest, AdapterResponse, AdapterResult, DetailsRequest, DetectOutput, DetectRequest,
    ListInstalledRequest, ListUpdatesRequest, ManagerAdapter, OperationRequest, SearchRequest,
    SourceRequest, ensure_action_supported, ensure_request_supported,
    execute_with_capability_check, validate_package_identifier,
};
pub use npm::{
    NpmAdapter, NpmScope, NpmSource, npm_detect_request, npm_info_request,
    npm_list_installed_request, npm_list_outdated_request, npm_operation_request,
    npm_search_request,
};
pub use npm_process::ProcessNpmSource;
pub use pip::{
    PipAdapter, PipSource, pip_detect_request, pip_index_versions_request,
    pip_install_search_helper_request, pip_list_outdated_request, pip_list_request,
    pip_operation_request, pip_search_request, pip_show_request,
};
pub use pip_process::ProcessPipSource;
pub use powershell::{
    PowerShellAdapter, PowerShellSource, powershell_detect_request, powershell_info_request,
    powershell_list_request, powershell_operation_request, powershell_repository_add_request,
    powershell_repository_list_request, powershell_repository_remove_request,
    powershell_search_request, powershell_updates_request, powershell_versions_request,
};
pub use powershell_process::ProcessPowerShellSource;
pub use scoop::{
    ScoopAdapter, ScoopSource, scoop_bucket_add_request, scoop_bucket_list_request,
    scoop_bucket_remove_request, scoop_cat_request, scoop_detect_request, scoop_list_request,
    scoop_operation_request, scoop_search_request, scoop_status_request, scoop_update_request,
};
pub use scoop_process::ProcessScoopSource;
pub use winget::{
    WingetAdapter, WingetSource, winget_detect_request, winget_list_request,
    winget_operation_request, winget_search_request, winget_show_request,
    winget_source_add_request, winget_source_list_request, winget_source_remove_request,
    winget_source_update_request, winget_updates_request, winget_versions_request,
};
pub use winget_process::ProcessWingetSource;

/// One process-backed adapter per supported manager, in display order.
pub fn default_adapters(
    executor: Arc<dyn ProcessExecutor>,
    fetcher: Arc<dyn DetailsFetcher>,
) -> Vec<Arc<dyn ManagerAdapter>> {
    vec![
        Arc::new(WingetAdapter::new(ProcessWingetSource::new(executor.clone()))),
        Arc::new(ScoopAdapter::new(ProcessScoopSource::new(executor.clone()))),
        Arc::new(ChocolateyAdapter::new(ProcessChocolateySource::new(
            executor.clone(),
        ))),
        Arc::new(PipAdapter::new(ProcessPipSource::new(
            executor.clone(),
            fetcher.clone(),
        ))),
        Arc::new(NpmAdapter::new(ProcessNpmSource::new(executor.clone()))),
        Arc::new(DotnetAdapter::new(ProcessDotnetSource::new(
            executor.clone(),
            fetcher,
        ))),
        Arc::new(PowerShellAdapter::new(ProcessPowerShellSource::new(executor))),
    ]
}
