use std::time::Duration;

use serde::Deserialize;

use crate::adapters::manager::{
    AdapterRequest, AdapterResponse, AdapterResult, DetectOutput, ManagerAdapter,
    OperationRequest, ensure_action_supported, ensure_request_supported,
    validate_package_identifier,
};
use crate::adapters::process_utils::first_version_line;
use crate::execution::{CommandSpec, ProcessSpawnRequest};
use crate::models::package::{qualified_source, set_if_present};
use crate::models::{
    Capability, CoreError, CoreErrorKind, DetectionInfo, InstallationScope, ManagerAction,
    ManagerCapabilities, ManagerDescriptor, ManagerId, OperationKind, Package, PackageDetails,
    TaskId, TaskType, UpgradablePackage,
};
use crate::parsing::{TableScanner, format_package_id_as_name, markers_for};

const DOTNET_CAPABILITIES: &[Capability] = &[
    Capability::Detect,
    Capability::Search,
    Capability::ListInstalled,
    Capability::ListUpdates,
    Capability::Details,
    Capability::Install,
    Capability::Update,
    Capability::Uninstall,
    Capability::Sources,
];

const DOTNET_FEATURES: ManagerCapabilities = ManagerCapabilities {
    can_run_as_admin: true,
    supports_custom_versions: true,
    supports_custom_architectures: true,
    supports_custom_scopes: true,
    supports_pre_release: true,
    supports_custom_locations: true,
    architectures: &["x86", "x64", "arm64", "arm"],
    scopes: &[InstallationScope::User, InstallationScope::Machine],
    ..ManagerCapabilities::NONE
};

const DOTNET_DESCRIPTOR: ManagerDescriptor = ManagerDescriptor {
    id: ManagerId::DotnetTool,
    display_name: ".NET Tool",
    capabilities: DOTNET_CAPABILITIES,
    features: DOTNET_FEATURES,
};

pub(crate) const DOTNET_COMMAND: &str = "dotnet";
pub(crate) const OUTDATED_COMMAND: &str = "dotnet-tools-outdated";
const FEED_SOURCE: &str = "nuget.org";
const DETECT_TIMEOUT: Duration = Duration::from_secs(10);
const LIST_TIMEOUT: Duration = Duration::from_secs(60);
const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);
const HELPER_INSTALL_TIMEOUT: Duration = Duration::from_secs(300);

/// Global tools live in `~/.dotnet/tools`; local tools are pinned by a
/// `dotnet-tools.json` manifest in the working directory.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ToolScope {
    Local,
    Global,
}

impl ToolScope {
    fn label(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Global => "global",
        }
    }

    fn source(self) -> String {
        qualified_source(ManagerId::DotnetTool, self.label())
    }
}

pub trait DotnetSource: Send + Sync {
    fn detect(&self) -> AdapterResult<DetectOutput>;
    fn list_installed(&self, scope: ToolScope) -> AdapterResult<String>;
    fn list_outdated(&self) -> AdapterResult<String>;
    fn search(&self, query: &str) -> AdapterResult<String>;
    /// NuGet search-service document for an exact package id.
    fn nuget_metadata(&self, id: &str) -> AdapterResult<String>;

    fn prepare(&self, request: ProcessSpawnRequest) -> ProcessSpawnRequest {
        request
    }
}

pub struct DotnetAdapter<S: DotnetSource> {
    source: S,
}

impl<S: DotnetSource> DotnetAdapter<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

impl<S: DotnetSource> ManagerAdapter for DotnetAdapter<S> {
    fn descriptor(&self) -> &ManagerDescriptor {
        &DOTNET_DESCRIPTOR
    }

    fn execute(&self, request: AdapterRequest) -> AdapterResult<AdapterResponse> {
        ensure_request_supported(self.descriptor(), &request)?;

        match request {
            AdapterRequest::Detect(_) => Ok(AdapterResponse::Detection(
                match self.source.detect() {
                    Ok(output) => {
                        let version = first_version_line(&output.version_output);
                        DetectionInfo {
                            installed: output.executable_path.is_some() && version.is_some(),
                            executable_path: output.executable_path,
                            version,
                        }
                    }
                    Err(error) => {
                        tracing::debug!(manager = ?ManagerId::DotnetTool, error = %error, "detection failed");
                        DetectionInfo::not_found()
                    }
                },
            )),
            AdapterRequest::ListInstalled(_) => {
                let mut packages = Vec::new();
                for scope in [ToolScope::Local, ToolScope::Global] {
                    let raw = self.source.list_installed(scope)?;
                    packages.extend(parse_dotnet_tool_list(&raw, scope));
                }
                Ok(AdapterResponse::InstalledPackages(packages))
            }
            AdapterRequest::ListUpdates(_) => {
                let raw = self.source.list_outdated()?;
                Ok(AdapterResponse::Updates(parse_dotnet_outdated(&raw)))
            }
            AdapterRequest::Search(search) => {
                let raw = self.source.search(&search.query)?;
                Ok(AdapterResponse::SearchResults(parse_dotnet_search(&raw)))
            }
            AdapterRequest::Details(details) => {
                let package = &details.package;
                validate_package_identifier(
                    ManagerId::DotnetTool,
                    ManagerAction::Details,
                    &package.id,
                )?;
                let raw = self.source.nuget_metadata(&package.id)?;
                Ok(AdapterResponse::Details(Box::new(parse_nuget_metadata(
                    &raw, package,
                )?)))
            }
            // Feeds come from NuGet.Config.
            AdapterRequest::ListSources => Ok(AdapterResponse::Sources(Vec::new())),
            AdapterRequest::AddSource(_)
            | AdapterRequest::RemoveSource(_)
            | AdapterRequest::RefreshSources => Ok(AdapterResponse::SourcesChanged),
        }
    }

    fn operation_request(&self, request: &OperationRequest) -> AdapterResult<ProcessSpawnRequest> {
        let action = request.kind.action();
        ensure_action_supported(self.descriptor(), action)?;
        validate_package_identifier(ManagerId::DotnetTool, action, &request.package.id)?;
        Ok(self.source.prepare(dotnet_operation_request(None, request)))
    }
}

fn tool_command() -> CommandSpec {
    CommandSpec::new(DOTNET_COMMAND).arg("tool")
}

/// `dotnet tool -h` fails on runtimes without the SDK, which cannot manage
/// tools.
pub fn dotnet_tool_probe_request(task_id: Option<TaskId>) -> ProcessSpawnRequest {
    dotnet_request(
        task_id,
        TaskType::Detection,
        ManagerAction::Detect,
        tool_command().arg("-h"),
        DETECT_TIMEOUT,
    )
}

pub fn dotnet_detect_request(task_id: Option<TaskId>) -> ProcessSpawnRequest {
    dotnet_request(
        task_id,
        TaskType::Detection,
        ManagerAction::Detect,
        CommandSpec::new(DOTNET_COMMAND).arg("--version"),
        DETECT_TIMEOUT,
    )
}

pub fn dotnet_list_request(task_id: Option<TaskId>, scope: ToolScope) -> ProcessSpawnRequest {
    let mut command = tool_command().arg("list");
    if scope == ToolScope::Global {
        command = command.arg("--global");
    }
    dotnet_request(
        task_id,
        TaskType::Refresh,
        ManagerAction::ListInstalled,
        command,
        LIST_TIMEOUT,
    )
}

pub fn dotnet_outdated_request(task_id: Option<TaskId>) -> ProcessSpawnRequest {
    dotnet_request(
        task_id,
        TaskType::Refresh,
        ManagerAction::ListUpdates,
        CommandSpec::new(OUTDATED_COMMAND),
        LIST_TIMEOUT,
    )
}

pub fn dotnet_install_outdated_helper_request(task_id: Option<TaskId>) -> ProcessSpawnRequest {
    dotnet_request(
        task_id,
        TaskType::Refresh,
        ManagerAction::ListUpdates,
        tool_command().args(["install", "--global", OUTDATED_COMMAND]),
        HELPER_INSTALL_TIMEOUT,
    )
}

pub fn dotnet_search_request(task_id: Option<TaskId>, query: &str) -> ProcessSpawnRequest {
    dotnet_request(
        task_id,
        TaskType::Search,
        ManagerAction::Search,
        tool_command().arg("search").arg(query),
        SEARCH_TIMEOUT,
    )
}

pub fn dotnet_operation_request(
    task_id: Option<TaskId>,
    request: &OperationRequest,
) -> ProcessSpawnRequest {
    let options = &request.options;
    let verb = match request.kind {
        OperationKind::Install => "install",
        OperationKind::Update => "update",
        OperationKind::Uninstall => "uninstall",
    };
    let mut command = tool_command()
        .args([verb, request.package.id.as_str()])
        .args(options.custom_parameters.iter().cloned());

    let location = options
        .custom_install_location
        .as_deref()
        .map(str::trim)
        .filter(|location| !location.is_empty());
    if let Some(location) = location {
        command = command.args(["--tool-path", location]);
    } else if is_global(request) {
        command = command.arg("--global");
    }

    if request.kind != OperationKind::Uninstall {
        if let Some(architecture) = options.requested_architecture().and_then(dotnet_architecture)
        {
            command = command.args(["-a", architecture]);
        }
        if options.pre_release {
            command = command.arg("--prerelease");
        }
    }
    if request.kind == OperationKind::Install
        && let Some(version) = options.requested_version()
    {
        command = command.args(["--version", version]);
    }

    dotnet_request(
        task_id,
        request.kind.task_type(),
        request.kind.action(),
        command,
        LIST_TIMEOUT,
    )
    .without_timeout()
}

/// Installs default to global tools, since a local install needs a manifest
/// in the working directory. Updates and removals follow where the tool was
/// listed from.
fn is_global(request: &OperationRequest) -> bool {
    match request.options.installation_scope {
        Some(InstallationScope::Machine) => true,
        Some(InstallationScope::User) => false,
        None if request.kind == OperationKind::Install => true,
        None => request.package.source != ToolScope::Local.source(),
    }
}

fn dotnet_architecture(architecture: &str) -> Option<&'static str> {
    match architecture.to_ascii_lowercase().as_str() {
        "x86" => Some("x86"),
        "x64" => Some("x64"),
        "arm" | "arm32" => Some("arm32"),
        "arm64" => Some("arm64"),
        _ => None,
    }
}

fn dotnet_request(
    task_id: Option<TaskId>,
    task_type: TaskType,
    action: ManagerAction,
    command: CommandSpec,
    timeout: Duration,
) -> ProcessSpawnRequest {
    let mut request = ProcessSpawnRequest::new(ManagerId::DotnetTool, task_type, action, command)
        .requires_elevation(false)
        .timeout(timeout);
    if let Some(task_id) = task_id {
        request = request.task_id(task_id);
    }
    request
}

fn tool_package(id: &str, version: &str, source: String) -> Package {
    Package::new(
        ManagerId::DotnetTool,
        format_package_id_as_name(id),
        id,
        version,
        source,
    )
}

fn table_rows(raw: &str, min_fields: usize) -> Vec<Vec<String>> {
    let markers = markers_for(ManagerId::DotnetTool);
    TableScanner::new(ManagerId::DotnetTool)
        .min_fields(min_fields)
        .rows_from_output(raw)
        .into_iter()
        .filter(|fields| !markers.rejects(&fields[0], &fields[0], &fields[1]))
        .collect()
}

/// `Package Id  Version  Commands [Manifest]` rows after the dashed rule.
pub(crate) fn parse_dotnet_tool_list(raw: &str, scope: ToolScope) -> Vec<Package> {
    table_rows(raw, 2)
        .into_iter()
        .map(|fields| tool_package(&fields[0], &fields[1], scope.source()))
        .collect()
}

/// `dotnet-tools-outdated` checks global tools only.
pub(crate) fn parse_dotnet_outdated(raw: &str) -> Vec<UpgradablePackage> {
    table_rows(raw, 3)
        .into_iter()
        .map(|fields| {
            UpgradablePackage::new(
                tool_package(&fields[0], &fields[1], ToolScope::Global.source()),
                fields[2].as_str(),
            )
        })
        .collect()
}

pub(crate) fn parse_dotnet_search(raw: &str) -> Vec<Package> {
    table_rows(raw, 2)
        .into_iter()
        .map(|fields| {
            tool_package(
                &fields[0],
                &fields[1],
                qualified_source(ManagerId::DotnetTool, FEED_SOURCE),
            )
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct NugetSearchResponse {
    #[serde(default)]
    data: Vec<NugetSearchEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct NugetSearchEntry {
    id: String,
    version: String,
    description: String,
    authors: Vec<String>,
    owners: Vec<String>,
    project_url: String,
    license_url: String,
    tags: Vec<String>,
    versions: Vec<NugetVersion>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NugetVersion {
    version: String,
}

pub(crate) fn parse_nuget_metadata(raw: &str, package: &Package) -> AdapterResult<PackageDetails> {
    let response: NugetSearchResponse =
        serde_json::from_str(raw).map_err(|e| parse_error(&format!("invalid NuGet JSON: {e}")))?;

    let id = package.id.as_str();
    let mut details = PackageDetails {
        installer_type: "NuPkg (zipped manifest)".to_string(),
        manifest_url: format!("https://www.nuget.org/packages/{id}"),
        ..PackageDetails::default()
    };

    let Some(entry) = response
        .data
        .into_iter()
        .find(|entry| entry.id.eq_ignore_ascii_case(id))
    else {
        tracing::debug!(manager = ?ManagerId::DotnetTool, id, "package not found on NuGet");
        return Ok(details);
    };

    set_if_present(&mut details.description, &entry.description);
    set_if_present(&mut details.author, &entry.authors.join(", "));
    set_if_present(&mut details.publisher, &entry.owners.join(", "));
    set_if_present(&mut details.homepage_url, &entry.project_url);
    set_if_present(&mut details.license_url, &entry.license_url);
    details.tags = entry.tags;

    let version = if package.version.trim().is_empty() {
        entry.version.as_str()
    } else {
        package.version.trim()
    };
    let lower = entry.id.to_lowercase();
    details.installer_url = format!(
        "https://api.nuget.org/v3-flatcontainer/{lower}/{version}/{lower}.{version}.nupkg"
    );

    details.versions = entry
        .versions
        .into_iter()
        .rev()
        .map(|v| v.version)
        .filter(|v| !v.is_empty())
        .collect();

    Ok(details)
}

fn parse_error(message: &str) -> CoreError {
    CoreError {
        manager: Some(ManagerId::DotnetTool),
        task: None,
        action: None,
        kind: CoreErrorKind::ParseFailure,
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::adapters::manager::{
        AdapterRequest, AdapterResponse, AdapterResult, DetailsRequest, DetectOutput,
        ManagerAdapter, OperationRequest,
    };
    use crate::models::{
        InstallationOptions, InstallationScope, ManagerId, OperationKind, Package,
    };

    use super::{
        DotnetAdapter, DotnetSource, ToolScope, dotnet_operation_request,
        parse_dotnet_outdated, parse_dotnet_search, parse_dotnet_tool_list,
        parse_nuget_metadata,
    };

    const LIST_GLOBAL_FIXTURE: &str = include_str!("../../tests/fixtures/dotnet/list_global.txt");
    const LIST_LOCAL_FIXTURE: &str = include_str!("../../tests/fixtures/dotnet/list_local.txt");
    const OUTDATED_FIXTURE: &str = include_str!("../../tests/fixtures/dotnet/outdated.txt");
    const SEARCH_FIXTURE: &str = include_str!("../../tests/fixtures/dotnet/search.txt");
    const NUGET_FIXTURE: &str = include_str!("../../tests/fixtures/dotnet/nuget_search.json");

    fn dotnet_ef(source: &str) -> Package {
        Package::new(ManagerId::DotnetTool, "Dotnet Ef", "dotnet-ef", "8.0.2", source)
    }

    #[test]
    fn parses_global_and_local_tool_lists() {
        let global = parse_dotnet_tool_list(LIST_GLOBAL_FIXTURE, ToolScope::Global);
        let ids: Vec<&str> = global.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["dotnet-ef", "dotnetsay"]);
        assert_eq!(global[0].version, "8.0.2");
        assert_eq!(global[0].source, ".NET Tool: global");

        let local = parse_dotnet_tool_list(LIST_LOCAL_FIXTURE, ToolScope::Local);
        assert_eq!(local.len(), 1);
        assert_eq!(local[0].id, "csharpier");
        assert_eq!(local[0].source, ".NET Tool: local");
    }

    #[test]
    fn parses_outdated_helper_table() {
        let updates = parse_dotnet_outdated(OUTDATED_FIXTURE);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].package.id, "dotnet-ef");
        assert_eq!(updates[0].installed_version(), "8.0.2");
        assert_eq!(updates[0].new_version, "8.0.4");
    }

    #[test]
    fn parses_search_table() {
        let results = parse_dotnet_search(SEARCH_FIXTURE);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "dotnet-ef");
        assert_eq!(results[0].version, "8.0.4");
        assert_eq!(results[1].source, ".NET Tool: nuget.org");
    }

    #[test]
    fn parses_nuget_metadata() {
        let details =
            parse_nuget_metadata(NUGET_FIXTURE, &dotnet_ef(".NET Tool: global")).expect("parse");
        assert_eq!(
            details.description,
            "Entity Framework Core Tools for the .NET Command-Line Interface."
        );
        assert_eq!(details.author, "Microsoft");
        assert_eq!(details.homepage_url, "https://docs.microsoft.com/ef/core/");
        assert_eq!(
            details.installer_url,
            "https://api.nuget.org/v3-flatcontainer/dotnet-ef/8.0.2/dotnet-ef.8.0.2.nupkg"
        );
        assert_eq!(details.versions, vec!["8.0.4", "8.0.3", "8.0.2"]);
        assert_eq!(details.tags, vec!["Entity", "Framework", "Core"]);
    }

    fn args(kind: OperationKind, source: &str, options: InstallationOptions) -> Vec<String> {
        dotnet_operation_request(
            None,
            &OperationRequest {
                kind,
                package: dotnet_ef(source),
                options,
            },
        )
        .command
        .args
    }

    #[test]
    fn operation_requests_map_scope_location_and_architecture() {
        assert_eq!(
            args(
                OperationKind::Install,
                ".NET Tool: nuget.org",
                InstallationOptions {
                    version: Some("8.0.0".to_string()),
                    architecture: Some("arm".to_string()),
                    pre_release: true,
                    ..InstallationOptions::default()
                }
            ),
            vec![
                "tool", "install", "dotnet-ef", "--global", "-a", "arm32", "--prerelease",
                "--version", "8.0.0",
            ]
        );
        assert_eq!(
            args(
                OperationKind::Update,
                ".NET Tool: local",
                InstallationOptions::default()
            ),
            vec!["tool", "update", "dotnet-ef"]
        );
        assert_eq!(
            args(
                OperationKind::Uninstall,
                ".NET Tool: global",
                InstallationOptions {
                    custom_install_location: Some("D:\\tools".to_string()),
                    architecture: Some("x64".to_string()),
                    ..InstallationOptions::default()
                }
            ),
            vec!["tool", "uninstall", "dotnet-ef", "--tool-path", "D:\\tools"]
        );
        assert_eq!(
            args(
                OperationKind::Install,
                ".NET Tool: nuget.org",
                InstallationOptions {
                    installation_scope: Some(InstallationScope::User),
                    ..InstallationOptions::default()
                }
            ),
            vec!["tool", "install", "dotnet-ef"]
        );
    }

    struct StubDotnetSource;

    impl DotnetSource for StubDotnetSource {
        fn detect(&self) -> AdapterResult<DetectOutput> {
            Ok(DetectOutput {
                executable_path: Some(PathBuf::from("C:\\Program Files\\dotnet\\dotnet.exe")),
                version_output: "8.0.204\n".to_string(),
            })
        }

        fn list_installed(&self, scope: ToolScope) -> AdapterResult<String> {
            Ok(match scope {
                ToolScope::Local => LIST_LOCAL_FIXTURE.to_string(),
                ToolScope::Global => LIST_GLOBAL_FIXTURE.to_string(),
            })
        }

        fn list_outdated(&self) -> AdapterResult<String> {
            Ok(OUTDATED_FIXTURE.to_string())
        }

        fn search(&self, _query: &str) -> AdapterResult<String> {
            Ok(SEARCH_FIXTURE.to_string())
        }

        fn nuget_metadata(&self, _id: &str) -> AdapterResult<String> {
            Ok(NUGET_FIXTURE.to_string())
        }
    }

    #[test]
    fn details_request_uses_registry_metadata() {
        let adapter = DotnetAdapter::new(StubDotnetSource);
        let response = adapter
            .execute(AdapterRequest::Details(DetailsRequest {
                package: dotnet_ef(".NET Tool: global"),
            }))
            .expect("details");
        match response {
            AdapterResponse::Details(details) => {
                assert_eq!(details.manifest_url, "https://www.nuget.org/packages/dotnet-ef");
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }
}
