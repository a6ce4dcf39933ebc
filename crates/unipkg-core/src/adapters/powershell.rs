use std::time::Duration;

use crate::adapters::manager::{
    AdapterRequest, AdapterResponse, AdapterResult, DetectOutput, ManagerAdapter,
    OperationRequest, ensure_action_supported, ensure_request_supported,
    validate_package_identifier,
};
use crate::adapters::process_utils::first_version_line;
use crate::adapters::scoop::POWERSHELL_COMMAND;
use crate::execution::{CommandSpec, ProcessSpawnRequest};
use crate::models::package::{qualified_source, set_if_present};
use crate::models::{
    Capability, DetectionInfo, InstallationScope, ManagerAction, ManagerCapabilities,
    ManagerDescriptor, ManagerId, ManagerSource, OperationKind, Package, PackageDetails, TaskId,
    TaskType, UpgradablePackage,
};
use crate::parsing::{
    Delimiter, Fields, ScanStart, TableScanner, format_package_id_as_name, markers_for,
    split_tags,
};

const POWERSHELL_CAPABILITIES: &[Capability] = &[
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

const POWERSHELL_FEATURES: ManagerCapabilities = ManagerCapabilities {
    can_run_as_admin: true,
    can_skip_integrity_checks: true,
    supports_custom_versions: true,
    supports_custom_scopes: true,
    supports_pre_release: true,
    supports_custom_sources: true,
    scopes: &[InstallationScope::User, InstallationScope::Machine],
    ..ManagerCapabilities::NONE
};

const POWERSHELL_DESCRIPTOR: ManagerDescriptor = ManagerDescriptor {
    id: ManagerId::PowerShell,
    display_name: "PowerShell",
    capabilities: POWERSHELL_CAPABILITIES,
    features: POWERSHELL_FEATURES,
};

const SHELL_PREFIX: &[&str] = &["-NoProfile", "-ExecutionPolicy", "Bypass", "-Command"];
pub(crate) const GALLERY_FEED: &str = "https://www.powershellgallery.com/api/v2";
const GALLERY_PAGE: &str = "https://www.powershellgallery.com/packages";
const DETECT_TIMEOUT: Duration = Duration::from_secs(15);
const LIST_TIMEOUT: Duration = Duration::from_secs(120);
const UPDATES_TIMEOUT: Duration = Duration::from_secs(600);
const SEARCH_TIMEOUT: Duration = Duration::from_secs(60);
const SOURCE_TIMEOUT: Duration = Duration::from_secs(120);

/// Prints `name|installed|latest|repository` for every installed module
/// with a newer release in its repository.
const UPDATE_CHECK_SCRIPT: &str = "Get-InstalledModule | ForEach-Object { \
$latest = Find-Module -Name $_.Name -Repository $_.Repository -ErrorAction SilentlyContinue; \
if ($latest -and ([version]$latest.Version -gt [version]$_.Version)) { \
Write-Output ($_.Name + '|' + $_.Version + '|' + $latest.Version + '|' + $_.Repository) } }";

const DETAIL_PROPERTIES: &str = "Name,Version,Author,CompanyName,Copyright,LicenseUri,\
ProjectUri,Description,PublishedDate,ReleaseNotes,Tags,Repository";

pub trait PowerShellSource: Send + Sync {
    fn detect(&self) -> AdapterResult<DetectOutput>;
    fn list_installed(&self) -> AdapterResult<String>;
    fn list_updates(&self) -> AdapterResult<String>;
    fn search(&self, query: &str) -> AdapterResult<String>;
    fn module_info(&self, id: &str) -> AdapterResult<String>;
    fn module_versions(&self, id: &str) -> AdapterResult<String>;
    fn list_repositories(&self) -> AdapterResult<String>;
    fn register_repository(&self, name: &str, url: &str) -> AdapterResult<String>;
    fn unregister_repository(&self, name: &str) -> AdapterResult<String>;

    fn prepare(&self, request: ProcessSpawnRequest) -> ProcessSpawnRequest {
        request
    }
}

pub struct PowerShellAdapter<S: PowerShellSource> {
    source: S,
}

impl<S: PowerShellSource> PowerShellAdapter<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

impl<S: PowerShellSource> ManagerAdapter for PowerShellAdapter<S> {
    fn descriptor(&self) -> &ManagerDescriptor {
        &POWERSHELL_DESCRIPTOR
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
                        tracing::debug!(manager = ?ManagerId::PowerShell, error = %error, "detection failed");
                        DetectionInfo::not_found()
                    }
                },
            )),
            AdapterRequest::ListInstalled(_) => {
                let raw = self.source.list_installed()?;
                Ok(AdapterResponse::InstalledPackages(parse_module_table(&raw)))
            }
            AdapterRequest::ListUpdates(_) => {
                let raw = self.source.list_updates()?;
                Ok(AdapterResponse::Updates(parse_module_updates(&raw)))
            }
            AdapterRequest::Search(search) => {
                let raw = self.source.search(&search.query)?;
                Ok(AdapterResponse::SearchResults(parse_module_table(&raw)))
            }
            AdapterRequest::Details(details) => {
                let package = &details.package;
                validate_package_identifier(
                    ManagerId::PowerShell,
                    ManagerAction::Details,
                    &package.id,
                )?;
                let info = self.source.module_info(&package.id)?;
                let versions = self.source.module_versions(&package.id).unwrap_or_else(|error| {
                    tracing::debug!(manager = ?ManagerId::PowerShell, error = %error, "version listing failed");
                    String::new()
                });
                Ok(AdapterResponse::Details(Box::new(parse_module_details(
                    &info, &versions, package,
                ))))
            }
            AdapterRequest::ListSources => {
                let raw = self.source.list_repositories()?;
                Ok(AdapterResponse::Sources(parse_repositories(&raw)))
            }
            AdapterRequest::AddSource(change) => {
                validate_package_identifier(
                    ManagerId::PowerShell,
                    ManagerAction::AddSource,
                    &change.source.name,
                )?;
                self.source
                    .register_repository(&change.source.name, &change.source.url)?;
                Ok(AdapterResponse::SourcesChanged)
            }
            AdapterRequest::RemoveSource(change) => {
                validate_package_identifier(
                    ManagerId::PowerShell,
                    ManagerAction::RemoveSource,
                    &change.source.name,
                )?;
                self.source.unregister_repository(&change.source.name)?;
                Ok(AdapterResponse::SourcesChanged)
            }
            AdapterRequest::RefreshSources => Ok(AdapterResponse::SourcesChanged),
        }
    }

    fn operation_request(&self, request: &OperationRequest) -> AdapterResult<ProcessSpawnRequest> {
        let action = request.kind.action();
        ensure_action_supported(self.descriptor(), action)?;
        validate_package_identifier(ManagerId::PowerShell, action, &request.package.id)?;
        Ok(self.source.prepare(powershell_operation_request(None, request)))
    }
}

fn shell() -> CommandSpec {
    CommandSpec::new(POWERSHELL_COMMAND).args(SHELL_PREFIX.iter().copied())
}

/// Single-quoted PowerShell literal.
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub fn powershell_detect_request(task_id: Option<TaskId>) -> ProcessSpawnRequest {
    powershell_request(
        task_id,
        TaskType::Detection,
        ManagerAction::Detect,
        shell().arg("$PSVersionTable.PSVersion.ToString()"),
        DETECT_TIMEOUT,
    )
}

pub fn powershell_list_request(task_id: Option<TaskId>) -> ProcessSpawnRequest {
    powershell_request(
        task_id,
        TaskType::Refresh,
        ManagerAction::ListInstalled,
        shell().arg("Get-InstalledModule"),
        LIST_TIMEOUT,
    )
}

pub fn powershell_updates_request(task_id: Option<TaskId>) -> ProcessSpawnRequest {
    powershell_request(
        task_id,
        TaskType::Refresh,
        ManagerAction::ListUpdates,
        shell().arg(UPDATE_CHECK_SCRIPT),
        UPDATES_TIMEOUT,
    )
}

pub fn powershell_search_request(task_id: Option<TaskId>, query: &str) -> ProcessSpawnRequest {
    powershell_request(
        task_id,
        TaskType::Search,
        ManagerAction::Search,
        shell()
            .args(["Find-Module", "-Name"])
            .arg(quote(&format!("*{}*", query.trim()))),
        SEARCH_TIMEOUT,
    )
}

pub fn powershell_info_request(task_id: Option<TaskId>, id: &str) -> ProcessSpawnRequest {
    powershell_request(
        task_id,
        TaskType::Details,
        ManagerAction::Details,
        shell()
            .args(["Find-Module", "-Name"])
            .arg(quote(id))
            .args(["|", "Format-List", DETAIL_PROPERTIES]),
        SEARCH_TIMEOUT,
    )
}

pub fn powershell_versions_request(task_id: Option<TaskId>, id: &str) -> ProcessSpawnRequest {
    powershell_request(
        task_id,
        TaskType::Details,
        ManagerAction::Details,
        shell()
            .args(["Find-Module", "-Name"])
            .arg(quote(id))
            .arg("-AllVersions"),
        SEARCH_TIMEOUT,
    )
}

pub fn powershell_repository_list_request(task_id: Option<TaskId>) -> ProcessSpawnRequest {
    powershell_request(
        task_id,
        TaskType::Sources,
        ManagerAction::ListSources,
        shell().arg("Get-PSRepository"),
        SOURCE_TIMEOUT,
    )
}

/// The gallery itself can only be restored with `-Default`.
pub fn powershell_repository_add_request(
    task_id: Option<TaskId>,
    name: &str,
    url: &str,
) -> ProcessSpawnRequest {
    let mut command = shell().arg("Register-PSRepository");
    if url.trim_end_matches('/') == GALLERY_FEED {
        command = command.arg("-Default");
    } else {
        command = command
            .arg("-Name")
            .arg(quote(name))
            .arg("-SourceLocation")
            .arg(quote(url));
    }
    powershell_request(
        task_id,
        TaskType::Sources,
        ManagerAction::AddSource,
        command,
        SOURCE_TIMEOUT,
    )
}

pub fn powershell_repository_remove_request(
    task_id: Option<TaskId>,
    name: &str,
) -> ProcessSpawnRequest {
    powershell_request(
        task_id,
        TaskType::Sources,
        ManagerAction::RemoveSource,
        shell()
            .args(["Unregister-PSRepository", "-Name"])
            .arg(quote(name)),
        SOURCE_TIMEOUT,
    )
}

pub fn powershell_operation_request(
    task_id: Option<TaskId>,
    request: &OperationRequest,
) -> ProcessSpawnRequest {
    let options = &request.options;
    let verb = match request.kind {
        OperationKind::Install => "Install-Module",
        OperationKind::Update => "Update-Module",
        OperationKind::Uninstall => "Uninstall-Module",
    };
    let mut command = shell()
        .args([verb, "-Name", request.package.id.as_str(), "-Confirm:$false", "-Force"])
        .args(options.custom_parameters.iter().cloned());

    if request.kind != OperationKind::Uninstall {
        if options.pre_release {
            command = command.arg("-AllowPrerelease");
        }
        let scope = match options.installation_scope {
            Some(InstallationScope::Machine) => "AllUsers",
            _ => "CurrentUser",
        };
        command = command.args(["-Scope", scope]);
    }

    if request.kind == OperationKind::Install {
        if options.skip_hash_check {
            command = command.arg("-SkipPublisherCheck");
        }
        if let Some(version) = options.requested_version() {
            command = command.args(["-RequiredVersion", version]);
        }
    }

    powershell_request(
        task_id,
        request.kind.task_type(),
        request.kind.action(),
        command,
        LIST_TIMEOUT,
    )
    .without_timeout()
}

fn powershell_request(
    task_id: Option<TaskId>,
    task_type: TaskType,
    action: ManagerAction,
    command: CommandSpec,
    timeout: Duration,
) -> ProcessSpawnRequest {
    let mut request = ProcessSpawnRequest::new(ManagerId::PowerShell, task_type, action, command)
        .requires_elevation(false)
        .timeout(timeout);
    if let Some(task_id) = task_id {
        request = request.task_id(task_id);
    }
    request
}

fn module_package(name: &str, version: &str, repository: &str) -> Package {
    Package::new(
        ManagerId::PowerShell,
        format_package_id_as_name(name),
        name,
        version,
        qualified_source(ManagerId::PowerShell, repository),
    )
}

/// `Version  Name  Repository  Description` tables from `Get-InstalledModule`
/// and `Find-Module`.
pub(crate) fn parse_module_table(raw: &str) -> Vec<Package> {
    let markers = markers_for(ManagerId::PowerShell);
    TableScanner::new(ManagerId::PowerShell)
        .min_fields(3)
        .rows_from_output(raw)
        .into_iter()
        .filter(|fields| !markers.rejects(&fields[1], &fields[1], &fields[0]))
        .map(|fields| module_package(&fields[1], &fields[0], &fields[2]))
        .collect()
}

pub(crate) fn parse_module_updates(raw: &str) -> Vec<UpgradablePackage> {
    let markers = markers_for(ManagerId::PowerShell);
    TableScanner::new(ManagerId::PowerShell)
        .start(ScanStart::Immediately)
        .delimiter(Delimiter::Char('|'))
        .min_fields(4)
        .rows_from_output(raw)
        .into_iter()
        .filter(|fields| !fields[0].starts_with(">>"))
        .filter(|fields| !markers.rejects(&fields[0], &fields[0], &fields[1]))
        // `[version]` pads `2.1` to `2.1.0`, which is not a real update.
        .filter(|fields| {
            let (current, latest) = (&fields[1], &fields[2]);
            *latest != format!("{current}.0") && *latest != format!("{current}.0.0")
        })
        .map(|fields| {
            UpgradablePackage::new(
                module_package(&fields[0], &fields[1], &fields[3]),
                fields[2].as_str(),
            )
        })
        .collect()
}

/// `Name  InstallationPolicy  SourceLocation` rows from `Get-PSRepository`.
pub(crate) fn parse_repositories(raw: &str) -> Vec<ManagerSource> {
    TableScanner::new(ManagerId::PowerShell)
        .min_fields(3)
        .rows_from_output(raw)
        .into_iter()
        .map(|fields| ManagerSource {
            manager: ManagerId::PowerShell,
            name: fields[0].clone(),
            url: fields[2].clone(),
        })
        .collect()
}

fn unbrace(value: &str) -> &str {
    value.trim().trim_start_matches('{').trim_end_matches('}').trim()
}

pub(crate) fn parse_module_details(info: &str, versions: &str, package: &Package) -> PackageDetails {
    let fields = Fields::parse(info);
    let id = package.id.as_str();
    let version = match fields.value("Version") {
        "" => package.version.as_str(),
        found => found,
    };

    let mut details = PackageDetails {
        installer_type: "NuPkg (zipped manifest)".to_string(),
        manifest_url: format!("{GALLERY_PAGE}/{id}"),
        ..PackageDetails::default()
    };
    if !version.is_empty() {
        details.installer_url = format!("{GALLERY_FEED}/package/{id}/{version}");
        details.release_notes_url = format!("{GALLERY_PAGE}/{id}/{version}");
    }

    set_if_present(&mut details.author, fields.value("Author"));
    set_if_present(&mut details.publisher, unbrace(fields.value("CompanyName")));
    set_if_present(&mut details.license, fields.value("Copyright"));
    set_if_present(&mut details.license_url, fields.value("LicenseUri"));
    set_if_present(&mut details.homepage_url, fields.value("ProjectUri"));
    set_if_present(&mut details.description, fields.value("Description"));
    set_if_present(&mut details.release_notes, fields.value("ReleaseNotes"));
    set_if_present(&mut details.update_date, fields.value("PublishedDate"));
    details.tags = split_tags(unbrace(fields.value("Tags")));
    details.scopes = vec!["CurrentUser".to_string(), "AllUsers".to_string()];

    details.versions = TableScanner::new(ManagerId::PowerShell)
        .rows_from_output(versions)
        .into_iter()
        .filter(|fields| fields[1].eq_ignore_ascii_case(id))
        .map(|fields| fields[0].clone())
        .collect();

    details
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use crate::adapters::manager::{
        AdapterRequest, AdapterResponse, AdapterResult, DetectOutput, ManagerAdapter,
        OperationRequest, SourceRequest,
    };
    use crate::models::{
        InstallationOptions, InstallationScope, ManagerId, ManagerSource, OperationKind, Package,
    };

    use super::{
        GALLERY_FEED, PowerShellAdapter, PowerShellSource, parse_module_details,
        parse_module_table, parse_module_updates, parse_repositories,
        powershell_operation_request, powershell_repository_add_request,
        powershell_search_request,
    };

    const INSTALLED_FIXTURE: &str = include_str!("../../tests/fixtures/powershell/installed.txt");
    const UPDATES_FIXTURE: &str = include_str!("../../tests/fixtures/powershell/updates.txt");
    const SEARCH_FIXTURE: &str = include_str!("../../tests/fixtures/powershell/search.txt");
    const INFO_FIXTURE: &str = include_str!("../../tests/fixtures/powershell/info.txt");
    const VERSIONS_FIXTURE: &str = include_str!("../../tests/fixtures/powershell/versions.txt");
    const REPOSITORIES_FIXTURE: &str =
        include_str!("../../tests/fixtures/powershell/repositories.txt");

    fn psreadline() -> Package {
        Package::new(
            ManagerId::PowerShell,
            "PSReadLine",
            "PSReadLine",
            "2.3.4",
            "PowerShell: PSGallery",
        )
    }

    #[test]
    fn parses_installed_modules() {
        let packages = parse_module_table(INSTALLED_FIXTURE);
        let ids: Vec<&str> = packages.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["PSReadLine", "Pester", "PowerShellGet"]);
        assert_eq!(packages[1].version, "5.5.0");
        assert_eq!(packages[1].source, "PowerShell: PSGallery");
    }

    #[test]
    fn parses_search_results() {
        let packages = parse_module_table(SEARCH_FIXTURE);
        assert_eq!(packages.len(), 2);
        assert_eq!(packages[0].id, "Az.Accounts");
        assert_eq!(packages[0].name, "Az Accounts");
    }

    #[test]
    fn parses_update_rows_and_drops_padded_versions() {
        let updates = parse_module_updates(UPDATES_FIXTURE);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].package.id, "Pester");
        assert_eq!(updates[0].installed_version(), "5.5.0");
        assert_eq!(updates[0].new_version, "5.6.1");
    }

    #[test]
    fn parses_repositories() {
        let sources = parse_repositories(REPOSITORIES_FIXTURE);
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].name, "PSGallery");
        assert_eq!(sources[0].url, GALLERY_FEED);
        assert_eq!(sources[1].name, "Internal");
    }

    #[test]
    fn parses_module_details() {
        let details = parse_module_details(INFO_FIXTURE, VERSIONS_FIXTURE, &psreadline());
        assert_eq!(details.author, "Microsoft Corporation");
        assert_eq!(details.publisher, "Microsoft Corporation");
        assert_eq!(details.homepage_url, "https://github.com/PowerShell/PSReadLine");
        assert_eq!(
            details.manifest_url,
            "https://www.powershellgallery.com/packages/PSReadLine"
        );
        assert_eq!(
            details.installer_url,
            "https://www.powershellgallery.com/api/v2/package/PSReadLine/2.3.5"
        );
        assert!(details.release_notes.contains("Fix a crash"));
        assert_eq!(details.tags, vec!["Windows", "Linux", "macOS"]);
        assert_eq!(details.versions, vec!["2.3.5", "2.3.4", "2.2.6"]);
    }

    fn args(kind: OperationKind, options: InstallationOptions) -> Vec<String> {
        powershell_operation_request(
            None,
            &OperationRequest {
                kind,
                package: psreadline(),
                options,
            },
        )
        .command
        .args
    }

    #[test]
    fn operation_requests_map_scope_version_and_publisher_check() {
        let install = args(
            OperationKind::Install,
            InstallationOptions {
                version: Some("2.3.4".to_string()),
                installation_scope: Some(InstallationScope::Machine),
                skip_hash_check: true,
                pre_release: true,
                ..InstallationOptions::default()
            },
        );
        assert_eq!(
            &install[4..],
            &[
                "Install-Module",
                "-Name",
                "PSReadLine",
                "-Confirm:$false",
                "-Force",
                "-AllowPrerelease",
                "-Scope",
                "AllUsers",
                "-SkipPublisherCheck",
                "-RequiredVersion",
                "2.3.4",
            ]
        );

        let uninstall = args(
            OperationKind::Uninstall,
            InstallationOptions {
                pre_release: true,
                ..InstallationOptions::default()
            },
        );
        assert_eq!(
            &uninstall[4..],
            &["Uninstall-Module", "-Name", "PSReadLine", "-Confirm:$false", "-Force"]
        );

        let update = args(OperationKind::Update, InstallationOptions::default());
        assert_eq!(&update[9..], &["-Scope", "CurrentUser"]);
    }

    #[test]
    fn search_and_repository_arguments_are_quoted() {
        let search = powershell_search_request(None, "o'brien");
        assert_eq!(search.command.args.last().map(String::as_str), Some("'*o''brien*'"));

        let default = powershell_repository_add_request(None, "PSGallery", GALLERY_FEED);
        assert_eq!(
            &default.command.args[4..],
            &["Register-PSRepository", "-Default"]
        );
        let custom = powershell_repository_add_request(None, "Internal", "https://feed.local/v2");
        assert_eq!(
            &custom.command.args[4..],
            &[
                "Register-PSRepository",
                "-Name",
                "'Internal'",
                "-SourceLocation",
                "'https://feed.local/v2'",
            ]
        );
    }

    #[derive(Default)]
    struct StubPowerShellSource {
        calls: Mutex<Vec<String>>,
    }

    impl StubPowerShellSource {
        fn record(&self, call: String) {
            self.calls.lock().expect("calls").push(call);
        }
    }

    impl PowerShellSource for StubPowerShellSource {
        fn detect(&self) -> AdapterResult<DetectOutput> {
            Ok(DetectOutput {
                executable_path: None,
                version_output: String::new(),
            })
        }

        fn list_installed(&self) -> AdapterResult<String> {
            Ok(INSTALLED_FIXTURE.to_string())
        }

        fn list_updates(&self) -> AdapterResult<String> {
            Ok(UPDATES_FIXTURE.to_string())
        }

        fn search(&self, _query: &str) -> AdapterResult<String> {
            Ok(SEARCH_FIXTURE.to_string())
        }

        fn module_info(&self, _id: &str) -> AdapterResult<String> {
            Ok(INFO_FIXTURE.to_string())
        }

        fn module_versions(&self, _id: &str) -> AdapterResult<String> {
            Ok(VERSIONS_FIXTURE.to_string())
        }

        fn list_repositories(&self) -> AdapterResult<String> {
            Ok(REPOSITORIES_FIXTURE.to_string())
        }

        fn register_repository(&self, name: &str, url: &str) -> AdapterResult<String> {
            self.record(format!("register {name} {url}"));
            Ok(String::new())
        }

        fn unregister_repository(&self, name: &str) -> AdapterResult<String> {
            self.record(format!("unregister {name}"));
            Ok(String::new())
        }
    }

    #[test]
    fn source_changes_reach_the_repository_cmdlets() {
        let adapter = PowerShellAdapter::new(StubPowerShellSource::default());
        let source = ManagerSource {
            manager: ManagerId::PowerShell,
            name: "Internal".to_string(),
            url: "https://feed.local/v2".to_string(),
        };

        for request in [
            AdapterRequest::AddSource(SourceRequest {
                source: source.clone(),
            }),
            AdapterRequest::RemoveSource(SourceRequest { source }),
        ] {
            match adapter.execute(request).expect("source change") {
                AdapterResponse::SourcesChanged => {}
                other => panic!("unexpected response: {other:?}"),
            }
        }

        let calls = adapter.source.calls.lock().expect("calls").clone();
        assert_eq!(
            calls,
            vec!["register Internal https://feed.local/v2", "unregister Internal"]
        );
    }

    #[test]
    fn missing_shell_is_reported_as_not_installed() {
        let adapter = PowerShellAdapter::new(StubPowerShellSource::default());
        match adapter
            .execute(AdapterRequest::Detect(crate::adapters::manager::DetectRequest))
            .expect("detect")
        {
            AdapterResponse::Detection(info) => assert!(!info.installed),
            other => panic!("unexpected response: {other:?}"),
        }
    }
}
