use std::time::Duration;

use crate::adapters::manager::{
    AdapterRequest, AdapterResponse, AdapterResult, DetectOutput, ManagerAdapter,
    OperationRequest, ensure_action_supported, ensure_request_supported,
    validate_package_identifier,
};
use crate::adapters::process_utils::first_version_line;
use crate::execution::line_reader::final_lines;
use crate::execution::{CommandSpec, ProcessSpawnRequest};
use crate::models::package::set_if_present;
use crate::models::{
    Capability, DetectionInfo, ManagerAction, ManagerCapabilities, ManagerDescriptor, ManagerId,
    ManagerSource, OperationKind, Package, PackageDetails, TaskId, TaskType, UpgradablePackage,
};
use crate::parsing::{
    Delimiter, Fields, ScanStart, TableScanner, format_package_id_as_name, markers_for,
    split_tags,
};

const CHOCOLATEY_CAPABILITIES: &[Capability] = &[
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

const CHOCOLATEY_FEATURES: ManagerCapabilities = ManagerCapabilities {
    can_run_as_admin: true,
    can_skip_integrity_checks: true,
    can_run_interactively: true,
    can_remove_data_on_uninstall: false,
    supports_custom_versions: true,
    supports_custom_architectures: true,
    supports_custom_scopes: false,
    supports_pre_release: true,
    supports_custom_locations: false,
    supports_custom_sources: true,
    architectures: &["x86"],
    scopes: &[],
};

const CHOCOLATEY_DESCRIPTOR: ManagerDescriptor = ManagerDescriptor {
    id: ManagerId::Chocolatey,
    display_name: "Chocolatey",
    capabilities: CHOCOLATEY_CAPABILITIES,
    features: CHOCOLATEY_FEATURES,
};

const CHOCO_COMMAND: &str = "choco";
const SOURCE_LABEL: &str = "Chocolatey";
const DETECT_TIMEOUT: Duration = Duration::from_secs(10);
const LIST_TIMEOUT: Duration = Duration::from_secs(120);
const SEARCH_TIMEOUT: Duration = Duration::from_secs(60);
const SOURCE_TIMEOUT: Duration = Duration::from_secs(60);

pub trait ChocolateySource: Send + Sync {
    fn detect(&self) -> AdapterResult<DetectOutput>;
    fn list_installed(&self) -> AdapterResult<String>;
    fn list_outdated(&self) -> AdapterResult<String>;
    fn search(&self, query: &str) -> AdapterResult<String>;
    fn info(&self, id: &str) -> AdapterResult<String>;
    fn versions(&self, id: &str) -> AdapterResult<String>;
    fn list_sources(&self) -> AdapterResult<String>;
    fn add_source(&self, name: &str, url: &str) -> AdapterResult<String>;
    fn remove_source(&self, name: &str) -> AdapterResult<String>;

    fn prepare(&self, request: ProcessSpawnRequest) -> ProcessSpawnRequest {
        request
    }
}

pub struct ChocolateyAdapter<S: ChocolateySource> {
    source: S,
}

impl<S: ChocolateySource> ChocolateyAdapter<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

impl<S: ChocolateySource> ManagerAdapter for ChocolateyAdapter<S> {
    fn descriptor(&self) -> &ManagerDescriptor {
        &CHOCOLATEY_DESCRIPTOR
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
                        tracing::debug!(manager = ?ManagerId::Chocolatey, error = %error, "detection failed");
                        DetectionInfo::not_found()
                    }
                },
            )),
            AdapterRequest::ListInstalled(_) => {
                let raw = self.source.list_installed()?;
                Ok(AdapterResponse::InstalledPackages(parse_choco_list(&raw)))
            }
            AdapterRequest::ListUpdates(_) => {
                let raw = self.source.list_outdated()?;
                Ok(AdapterResponse::Updates(parse_choco_outdated(&raw)))
            }
            AdapterRequest::Search(search) => {
                let raw = self.source.search(&search.query)?;
                Ok(AdapterResponse::SearchResults(parse_choco_list(&raw)))
            }
            AdapterRequest::Details(details) => {
                let id = details.package.id.as_str();
                validate_package_identifier(ManagerId::Chocolatey, ManagerAction::Details, id)?;
                let info = self.source.info(id)?;
                let versions = self.source.versions(id).unwrap_or_else(|error| {
                    tracing::debug!(manager = ?ManagerId::Chocolatey, error = %error, "version listing failed");
                    String::new()
                });
                Ok(AdapterResponse::Details(Box::new(parse_choco_info(
                    &info, &versions,
                ))))
            }
            AdapterRequest::ListSources => {
                let raw = self.source.list_sources()?;
                Ok(AdapterResponse::Sources(parse_choco_sources(&raw)))
            }
            AdapterRequest::AddSource(change) => {
                validate_package_identifier(
                    ManagerId::Chocolatey,
                    ManagerAction::AddSource,
                    &change.source.name,
                )?;
                self.source
                    .add_source(&change.source.name, &change.source.url)?;
                Ok(AdapterResponse::SourcesChanged)
            }
            AdapterRequest::RemoveSource(change) => {
                validate_package_identifier(
                    ManagerId::Chocolatey,
                    ManagerAction::RemoveSource,
                    &change.source.name,
                )?;
                self.source.remove_source(&change.source.name)?;
                Ok(AdapterResponse::SourcesChanged)
            }
            // Feeds are queried live on every call.
            AdapterRequest::RefreshSources => Ok(AdapterResponse::SourcesChanged),
        }
    }

    fn operation_request(&self, request: &OperationRequest) -> AdapterResult<ProcessSpawnRequest> {
        let action = request.kind.action();
        ensure_action_supported(self.descriptor(), action)?;
        validate_package_identifier(ManagerId::Chocolatey, action, &request.package.id)?;
        Ok(self.source.prepare(choco_operation_request(None, request)))
    }
}

pub fn choco_detect_request(task_id: Option<TaskId>) -> ProcessSpawnRequest {
    choco_request(
        task_id,
        TaskType::Detection,
        ManagerAction::Detect,
        CommandSpec::new(CHOCO_COMMAND).arg("-v"),
        DETECT_TIMEOUT,
    )
}

pub fn choco_list_request(task_id: Option<TaskId>) -> ProcessSpawnRequest {
    choco_request(
        task_id,
        TaskType::Refresh,
        ManagerAction::ListInstalled,
        CommandSpec::new(CHOCO_COMMAND).arg("list"),
        LIST_TIMEOUT,
    )
}

pub fn choco_outdated_request(task_id: Option<TaskId>) -> ProcessSpawnRequest {
    choco_request(
        task_id,
        TaskType::Refresh,
        ManagerAction::ListUpdates,
        CommandSpec::new(CHOCO_COMMAND).arg("outdated"),
        LIST_TIMEOUT,
    )
}

pub fn choco_search_request(task_id: Option<TaskId>, query: &str) -> ProcessSpawnRequest {
    choco_request(
        task_id,
        TaskType::Search,
        ManagerAction::Search,
        CommandSpec::new(CHOCO_COMMAND).arg("search").arg(query),
        SEARCH_TIMEOUT,
    )
}

pub fn choco_info_request(task_id: Option<TaskId>, id: &str) -> ProcessSpawnRequest {
    choco_request(
        task_id,
        TaskType::Details,
        ManagerAction::Details,
        CommandSpec::new(CHOCO_COMMAND).args(["info", id]),
        SEARCH_TIMEOUT,
    )
}

pub fn choco_versions_request(task_id: Option<TaskId>, id: &str) -> ProcessSpawnRequest {
    choco_request(
        task_id,
        TaskType::Details,
        ManagerAction::Details,
        CommandSpec::new(CHOCO_COMMAND).args(["search", id, "--exact", "--all-versions"]),
        SEARCH_TIMEOUT,
    )
}

pub fn choco_source_list_request(task_id: Option<TaskId>) -> ProcessSpawnRequest {
    choco_request(
        task_id,
        TaskType::Sources,
        ManagerAction::ListSources,
        CommandSpec::new(CHOCO_COMMAND).args(["source", "list"]),
        SOURCE_TIMEOUT,
    )
}

pub fn choco_source_add_request(
    task_id: Option<TaskId>,
    name: &str,
    url: &str,
) -> ProcessSpawnRequest {
    choco_request(
        task_id,
        TaskType::Sources,
        ManagerAction::AddSource,
        CommandSpec::new(CHOCO_COMMAND).args([
            "source", "add", "--name", name, "--source", url, "-y",
        ]),
        SOURCE_TIMEOUT,
    )
}

pub fn choco_source_remove_request(task_id: Option<TaskId>, name: &str) -> ProcessSpawnRequest {
    choco_request(
        task_id,
        TaskType::Sources,
        ManagerAction::RemoveSource,
        CommandSpec::new(CHOCO_COMMAND).args(["source", "remove", "--name", name, "-y"]),
        SOURCE_TIMEOUT,
    )
}

pub fn choco_operation_request(
    task_id: Option<TaskId>,
    request: &OperationRequest,
) -> ProcessSpawnRequest {
    let options = &request.options;
    let verb = match request.kind {
        OperationKind::Install => "install",
        OperationKind::Update => "upgrade",
        OperationKind::Uninstall => "uninstall",
    };
    let mut command =
        CommandSpec::new(CHOCO_COMMAND).args([verb, request.package.id.as_str(), "-y"]);

    if options.interactive_installation {
        command = command.arg("--notsilent");
    }

    if request.kind != OperationKind::Uninstall {
        command = command.arg("--no-progress");
        if options
            .requested_architecture()
            .is_some_and(|arch| arch.eq_ignore_ascii_case("x86"))
        {
            command = command.arg("--forcex86");
        }
        if options.pre_release {
            command = command.arg("--prerelease");
        }
        if options.skip_hash_check {
            command = command.args(["--ignore-checksums", "--force"]);
        }
        if let Some(version) = options.requested_version() {
            command = command.args([format!("--version={version}"), "--allow-downgrade".into()]);
        }
    }

    command = command.args(options.custom_parameters.iter().cloned());

    choco_request(
        task_id,
        request.kind.task_type(),
        request.kind.action(),
        command,
        LIST_TIMEOUT,
    )
    .without_timeout()
}

fn choco_request(
    task_id: Option<TaskId>,
    task_type: TaskType,
    action: ManagerAction,
    command: CommandSpec,
    timeout: Duration,
) -> ProcessSpawnRequest {
    let mut request = ProcessSpawnRequest::new(ManagerId::Chocolatey, task_type, action, command)
        .requires_elevation(false)
        .timeout(timeout);
    if let Some(task_id) = task_id {
        request = request.task_id(task_id);
    }
    request
}

/// `choco list` and `choco search` print `id version [extra...]` rows with no
/// header separator, preceded by a `Chocolatey vX` banner.
pub(crate) fn parse_choco_list(raw: &str) -> Vec<Package> {
    let markers = markers_for(ManagerId::Chocolatey);
    TableScanner::new(ManagerId::Chocolatey)
        .start(ScanStart::Immediately)
        .rows_from_output(raw)
        .into_iter()
        .filter_map(|fields| {
            let id = fields[0].as_str();
            let version = fields[1].as_str();
            if id == "Chocolatey" || markers.rejects(id, id, version) {
                return None;
            }
            Some(Package::new(
                ManagerId::Chocolatey,
                format_package_id_as_name(id),
                id,
                version,
                SOURCE_LABEL,
            ))
        })
        .collect()
}

/// Rows are `id|current|available|pinned`; pinned packages are not offered.
pub(crate) fn parse_choco_outdated(raw: &str) -> Vec<UpgradablePackage> {
    let markers = markers_for(ManagerId::Chocolatey);
    TableScanner::new(ManagerId::Chocolatey)
        .start(ScanStart::Immediately)
        .delimiter(Delimiter::Char('|'))
        .min_fields(3)
        .rows_from_output(raw)
        .into_iter()
        .filter_map(|fields| {
            let id = fields[0].as_str();
            let current = fields[1].as_str();
            let available = fields[2].as_str();
            let pinned = fields.get(3).is_some_and(|pinned| pinned == "true");
            if pinned
                || markers.rejects(id, id, current)
                || markers.blacklist_versions.contains(&available)
            {
                return None;
            }
            Some(UpgradablePackage::new(
                Package::new(
                    ManagerId::Chocolatey,
                    format_package_id_as_name(id),
                    id,
                    current,
                    SOURCE_LABEL,
                ),
                available,
            ))
        })
        .collect()
}

/// Lines look like `name - url | Priority 0|Bypass Proxy - False|...`.
pub(crate) fn parse_choco_sources(raw: &str) -> Vec<ManagerSource> {
    final_lines(raw)
        .into_iter()
        .filter(|line| line.contains(" - ") && line.contains('|'))
        .filter_map(|line| {
            let head = line.split('|').next()?.trim();
            let (name, rest) = head.split_once(" - ")?;
            let name = name.split(" [").next()?.trim();
            let url = rest.split_whitespace().next()?;
            Some(ManagerSource {
                manager: ManagerId::Chocolatey,
                name: name.to_string(),
                url: url.to_string(),
            })
        })
        .collect()
}

pub(crate) fn parse_choco_info(info: &str, versions: &str) -> PackageDetails {
    let body: Vec<&str> = info
        .lines()
        .filter(|line| !line.trim_end().ends_with("packages found."))
        .collect();
    let fields = Fields::parse(&body.join("\n"));
    let mut details = PackageDetails::default();

    let title = fields.value("Title").lines().next().unwrap_or_default();
    if let Some((_, published)) = title.split_once("Published:") {
        set_if_present(&mut details.update_date, published);
    }
    set_if_present(&mut details.author, fields.value("Author"));
    set_if_present(&mut details.publisher, fields.value("Maintainer(s)"));
    set_if_present(&mut details.homepage_url, fields.value("Software Site"));
    set_if_present(&mut details.license_url, fields.value("Software License"));
    set_if_present(
        &mut details.manifest_url,
        fields.value("Chocolatey Package Source"),
    );
    set_if_present(&mut details.description, fields.value("Description"));
    set_if_present(&mut details.release_notes, fields.value("Release Notes"));

    let checksum = fields.value("Package Checksum");
    let hash = checksum
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .trim_matches('\'');
    set_if_present(&mut details.installer_hash, hash);

    details.tags = split_tags(fields.value("Tags"));
    details.installer_type = "NuPkg (zipped manifest)".to_string();
    details.architectures = vec!["x64".to_string(), "x86".to_string()];

    details.versions = final_lines(versions)
        .into_iter()
        .filter(|line| line.contains("[Approved]") || line.contains("[Pending]"))
        .filter_map(|line| line.split_whitespace().nth(1).map(str::to_string))
        .collect();

    details
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::adapters::manager::OperationRequest;
    use crate::models::{InstallationOptions, ManagerId, OperationKind, Package};

    use super::{
        choco_operation_request, parse_choco_info, parse_choco_list, parse_choco_outdated,
        parse_choco_sources,
    };

    const LIST_FIXTURE: &str = include_str!("../../tests/fixtures/chocolatey/list.txt");
    const OUTDATED_FIXTURE: &str = include_str!("../../tests/fixtures/chocolatey/outdated.txt");
    const SEARCH_FIXTURE: &str = include_str!("../../tests/fixtures/chocolatey/search.txt");
    const INFO_FIXTURE: &str = include_str!("../../tests/fixtures/chocolatey/info.txt");
    const VERSIONS_FIXTURE: &str = include_str!("../../tests/fixtures/chocolatey/versions.txt");
    const SOURCES_FIXTURE: &str = include_str!("../../tests/fixtures/chocolatey/sources.txt");

    fn git() -> Package {
        Package::new(ManagerId::Chocolatey, "Git", "git", "2.43.0", "Chocolatey")
    }

    #[test]
    fn parses_local_list_and_skips_banner_and_footer() {
        let packages = parse_choco_list(LIST_FIXTURE);
        let ids: Vec<&str> = packages.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["7zip", "7zip.install", "chocolatey", "git"]);
        assert_eq!(packages[1].name, "7zip (Install)");
        assert_eq!(packages[3].version, "2.44.0");
        assert_eq!(packages[3].source, "Chocolatey");
    }

    #[test]
    fn parses_outdated_pipe_rows_and_drops_pinned() {
        let updates = parse_choco_outdated(OUTDATED_FIXTURE);
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].package.id, "7zip");
        assert_eq!(updates[0].installed_version(), "22.1");
        assert_eq!(updates[0].new_version, "23.1.0");
        assert_eq!(updates[1].package.id, "nodejs");
    }

    #[test]
    fn parses_search_results() {
        let results = parse_choco_list(SEARCH_FIXTURE);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "7zip");
        assert_eq!(results[1].version, "23.1.0");
    }

    #[test]
    fn parses_sources_with_disabled_marker() {
        let sources = parse_choco_sources(SOURCES_FIXTURE);
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].name, "chocolatey");
        assert_eq!(sources[0].url, "https://community.chocolatey.org/api/v2/");
        assert_eq!(sources[1].name, "internal");
    }

    #[test]
    fn parses_info_block() {
        let details = parse_choco_info(INFO_FIXTURE, VERSIONS_FIXTURE);
        assert_eq!(details.update_date, "2/23/2024");
        assert_eq!(details.homepage_url, "https://git-scm.com/");
        assert_eq!(details.installer_hash, "Zm9vYmFyYmF6==");
        assert_eq!(details.tags, vec!["git", "vcs", "dvcs"]);
        assert!(details.description.starts_with("Git for Windows"));
        assert!(details.description.contains("Package parameters"));
        assert_eq!(details.versions, vec!["2.44.0", "2.43.0"]);
    }

    #[test]
    fn operation_request_maps_options_to_flags() {
        let install = choco_operation_request(
            None,
            &OperationRequest {
                kind: OperationKind::Install,
                package: git(),
                options: InstallationOptions {
                    interactive_installation: true,
                    architecture: Some("x86".to_string()),
                    skip_hash_check: true,
                    version: Some("2.40.0".to_string()),
                    custom_parameters: vec!["--params=\"/NoShellIntegration\"".to_string()],
                    ..InstallationOptions::default()
                },
            },
        );
        assert_eq!(install.command.program, PathBuf::from("choco"));
        assert_eq!(
            install.command.args,
            vec![
                "install",
                "git",
                "-y",
                "--notsilent",
                "--no-progress",
                "--forcex86",
                "--ignore-checksums",
                "--force",
                "--version=2.40.0",
                "--allow-downgrade",
                "--params=\"/NoShellIntegration\"",
            ]
        );

        let uninstall = choco_operation_request(
            None,
            &OperationRequest {
                kind: OperationKind::Uninstall,
                package: git(),
                options: InstallationOptions {
                    skip_hash_check: true,
                    ..InstallationOptions::default()
                },
            },
        );
        assert_eq!(uninstall.command.args, vec!["uninstall", "git", "-y"]);
    }
}
