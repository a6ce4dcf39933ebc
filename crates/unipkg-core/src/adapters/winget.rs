use std::time::Duration;

use crate::adapters::manager::{
    AdapterRequest, AdapterResponse, AdapterResult, DetectOutput, ManagerAdapter,
    OperationRequest, ensure_action_supported, ensure_request_supported,
    validate_package_identifier,
};
use crate::execution::line_reader::final_lines;
use crate::execution::{CommandSpec, ProcessSpawnRequest};
use crate::models::package::set_if_present;
use crate::models::{
    Capability, DetectionInfo, InstallationOptions, InstallationScope, ManagerAction,
    ManagerCapabilities, ManagerDescriptor, ManagerId, ManagerSource, OperationKind, Package,
    PackageDetails, TaskId, TaskType, UpgradablePackage, qualified_source,
};
use crate::parsing::{ColumnLayout, Fields, TableScanner, markers_for, split_tags};

const WINGET_CAPABILITIES: &[Capability] = &[
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

const WINGET_FEATURES: ManagerCapabilities = ManagerCapabilities {
    can_run_as_admin: true,
    can_skip_integrity_checks: true,
    can_run_interactively: true,
    can_remove_data_on_uninstall: false,
    supports_custom_versions: true,
    supports_custom_architectures: true,
    supports_custom_scopes: true,
    supports_pre_release: false,
    supports_custom_locations: true,
    supports_custom_sources: true,
    architectures: &["x64", "x86", "arm64"],
    scopes: &[InstallationScope::User, InstallationScope::Machine],
};

const WINGET_DESCRIPTOR: ManagerDescriptor = ManagerDescriptor {
    id: ManagerId::Winget,
    display_name: "Winget",
    capabilities: WINGET_CAPABILITIES,
    features: WINGET_FEATURES,
};

const WINGET_COMMAND: &str = "winget";
const DETECT_TIMEOUT: Duration = Duration::from_secs(10);
const LIST_TIMEOUT: Duration = Duration::from_secs(120);
const SEARCH_TIMEOUT: Duration = Duration::from_secs(60);
const SOURCE_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_SOURCE: &str = "winget";

pub trait WingetSource: Send + Sync {
    fn detect(&self) -> AdapterResult<DetectOutput>;
    fn list_installed(&self) -> AdapterResult<String>;
    fn list_updates(&self) -> AdapterResult<String>;
    fn search(&self, query: &str) -> AdapterResult<String>;
    fn show(&self, id: &str) -> AdapterResult<String>;
    fn show_versions(&self, id: &str) -> AdapterResult<String>;
    fn list_sources(&self) -> AdapterResult<String>;
    fn add_source(&self, name: &str, url: &str) -> AdapterResult<String>;
    fn remove_source(&self, name: &str) -> AdapterResult<String>;
    fn update_sources(&self) -> AdapterResult<String>;

    /// Final touches on a request before it is spawned, such as resolving
    /// the program path.
    fn prepare(&self, request: ProcessSpawnRequest) -> ProcessSpawnRequest {
        request
    }
}

pub struct WingetAdapter<S: WingetSource> {
    source: S,
}

impl<S: WingetSource> WingetAdapter<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

impl<S: WingetSource> ManagerAdapter for WingetAdapter<S> {
    fn descriptor(&self) -> &ManagerDescriptor {
        &WINGET_DESCRIPTOR
    }

    fn execute(&self, request: AdapterRequest) -> AdapterResult<AdapterResponse> {
        ensure_request_supported(self.descriptor(), &request)?;

        match request {
            AdapterRequest::Detect(_) => Ok(AdapterResponse::Detection(
                match self.source.detect() {
                    Ok(output) => {
                        let version = parse_winget_version(&output.version_output);
                        DetectionInfo {
                            installed: output.executable_path.is_some() || version.is_some(),
                            executable_path: output.executable_path,
                            version,
                        }
                    }
                    Err(error) => {
                        tracing::debug!(manager = ?ManagerId::Winget, error = %error, "detection failed");
                        DetectionInfo::not_found()
                    }
                },
            )),
            AdapterRequest::ListInstalled(_) => {
                let raw = self.source.list_installed()?;
                Ok(AdapterResponse::InstalledPackages(parse_winget_installed(
                    &raw,
                )))
            }
            AdapterRequest::ListUpdates(_) => {
                let raw = self.source.list_updates()?;
                Ok(AdapterResponse::Updates(parse_winget_updates(&raw)))
            }
            AdapterRequest::Search(search) => {
                let raw = self.source.search(&search.query)?;
                Ok(AdapterResponse::SearchResults(parse_winget_search(&raw)))
            }
            AdapterRequest::Details(details) => {
                let id = details.package.id.as_str();
                validate_package_identifier(ManagerId::Winget, ManagerAction::Details, id)?;
                let show = self.source.show(id)?;
                let versions = self.source.show_versions(id).unwrap_or_else(|error| {
                    tracing::debug!(manager = ?ManagerId::Winget, error = %error, "version listing failed");
                    String::new()
                });
                Ok(AdapterResponse::Details(Box::new(parse_winget_details(
                    id, &show, &versions,
                ))))
            }
            AdapterRequest::ListSources => {
                let raw = self.source.list_sources()?;
                Ok(AdapterResponse::Sources(parse_winget_sources(&raw)))
            }
            AdapterRequest::AddSource(change) => {
                validate_package_identifier(
                    ManagerId::Winget,
                    ManagerAction::AddSource,
                    &change.source.name,
                )?;
                self.source
                    .add_source(&change.source.name, &change.source.url)?;
                Ok(AdapterResponse::SourcesChanged)
            }
            AdapterRequest::RemoveSource(change) => {
                validate_package_identifier(
                    ManagerId::Winget,
                    ManagerAction::RemoveSource,
                    &change.source.name,
                )?;
                self.source.remove_source(&change.source.name)?;
                Ok(AdapterResponse::SourcesChanged)
            }
            AdapterRequest::RefreshSources => {
                self.source.update_sources()?;
                Ok(AdapterResponse::SourcesChanged)
            }
        }
    }

    fn operation_request(&self, request: &OperationRequest) -> AdapterResult<ProcessSpawnRequest> {
        let action = request.kind.action();
        ensure_action_supported(self.descriptor(), action)?;
        validate_package_identifier(ManagerId::Winget, action, &request.package.id)?;
        Ok(self.source.prepare(winget_operation_request(None, request)))
    }
}

pub fn winget_detect_request(task_id: Option<TaskId>) -> ProcessSpawnRequest {
    winget_request(
        task_id,
        TaskType::Detection,
        ManagerAction::Detect,
        CommandSpec::new(WINGET_COMMAND).arg("--version"),
        DETECT_TIMEOUT,
    )
}

pub fn winget_list_request(task_id: Option<TaskId>) -> ProcessSpawnRequest {
    winget_request(
        task_id,
        TaskType::Refresh,
        ManagerAction::ListInstalled,
        CommandSpec::new(WINGET_COMMAND).args([
            "list",
            "--accept-source-agreements",
            "--disable-interactivity",
        ]),
        LIST_TIMEOUT,
    )
}

pub fn winget_updates_request(task_id: Option<TaskId>) -> ProcessSpawnRequest {
    winget_request(
        task_id,
        TaskType::Refresh,
        ManagerAction::ListUpdates,
        CommandSpec::new(WINGET_COMMAND).args([
            "upgrade",
            "--include-unknown",
            "--accept-source-agreements",
            "--disable-interactivity",
        ]),
        LIST_TIMEOUT,
    )
}

pub fn winget_search_request(task_id: Option<TaskId>, query: &str) -> ProcessSpawnRequest {
    winget_request(
        task_id,
        TaskType::Search,
        ManagerAction::Search,
        CommandSpec::new(WINGET_COMMAND)
            .arg("search")
            .arg(query)
            .args(["--accept-source-agreements", "--disable-interactivity"]),
        SEARCH_TIMEOUT,
    )
}

pub fn winget_show_request(task_id: Option<TaskId>, id: &str) -> ProcessSpawnRequest {
    winget_request(
        task_id,
        TaskType::Details,
        ManagerAction::Details,
        CommandSpec::new(WINGET_COMMAND)
            .args(["show", "--id", id, "--exact"])
            .args(["--accept-source-agreements", "--disable-interactivity"]),
        SEARCH_TIMEOUT,
    )
}

pub fn winget_versions_request(task_id: Option<TaskId>, id: &str) -> ProcessSpawnRequest {
    winget_request(
        task_id,
        TaskType::Details,
        ManagerAction::Details,
        CommandSpec::new(WINGET_COMMAND)
            .args(["show", "--id", id, "--exact", "--versions"])
            .args(["--accept-source-agreements", "--disable-interactivity"]),
        SEARCH_TIMEOUT,
    )
}

pub fn winget_source_list_request(task_id: Option<TaskId>) -> ProcessSpawnRequest {
    winget_request(
        task_id,
        TaskType::Sources,
        ManagerAction::ListSources,
        CommandSpec::new(WINGET_COMMAND).args(["source", "list"]),
        SOURCE_TIMEOUT,
    )
}

pub fn winget_source_add_request(
    task_id: Option<TaskId>,
    name: &str,
    url: &str,
) -> ProcessSpawnRequest {
    winget_request(
        task_id,
        TaskType::Sources,
        ManagerAction::AddSource,
        CommandSpec::new(WINGET_COMMAND)
            .args(["source", "add", "--name", name, "--arg", url])
            .args(["--accept-source-agreements", "--disable-interactivity"]),
        SOURCE_TIMEOUT,
    )
}

pub fn winget_source_remove_request(task_id: Option<TaskId>, name: &str) -> ProcessSpawnRequest {
    winget_request(
        task_id,
        TaskType::Sources,
        ManagerAction::RemoveSource,
        CommandSpec::new(WINGET_COMMAND).args([
            "source",
            "remove",
            "--name",
            name,
            "--disable-interactivity",
        ]),
        SOURCE_TIMEOUT,
    )
}

pub fn winget_source_update_request(task_id: Option<TaskId>) -> ProcessSpawnRequest {
    winget_request(
        task_id,
        TaskType::Sources,
        ManagerAction::RefreshSources,
        CommandSpec::new(WINGET_COMMAND).args(["source", "update", "--disable-interactivity"]),
        SOURCE_TIMEOUT,
    )
}

pub fn winget_operation_request(
    task_id: Option<TaskId>,
    request: &OperationRequest,
) -> ProcessSpawnRequest {
    let id = request.package.id.as_str();
    let mut command = CommandSpec::new(WINGET_COMMAND);
    command = match request.kind {
        OperationKind::Install => command.args(["install", "--id", id, "--exact"]),
        OperationKind::Update => {
            command.args(["upgrade", "--id", id, "--exact", "--include-unknown"])
        }
        OperationKind::Uninstall => command.args(["uninstall", "--id", id, "--exact"]),
    };
    command = command.args(winget_option_args(request.kind, &request.options));
    if request.kind != OperationKind::Uninstall {
        command = command.arg("--accept-package-agreements");
    }

    winget_request(
        task_id,
        request.kind.task_type(),
        request.kind.action(),
        command,
        LIST_TIMEOUT,
    )
    .without_timeout()
}

fn winget_option_args(kind: OperationKind, options: &InstallationOptions) -> Vec<String> {
    let mut args = vec!["--accept-source-agreements".to_string()];

    if kind != OperationKind::Uninstall
        && let Some(architecture) = options.requested_architecture()
    {
        args.push("--architecture".to_string());
        args.push(architecture.to_ascii_lowercase());
    }

    args.extend(options.custom_parameters.iter().cloned());

    if let Some(scope) = options.installation_scope {
        args.push("--scope".to_string());
        args.push(
            match scope {
                InstallationScope::User => "user",
                InstallationScope::Machine => "machine",
            }
            .to_string(),
        );
    }

    if options.interactive_installation {
        args.push("--interactive".to_string());
    } else {
        args.push("--disable-interactivity".to_string());
        args.push("--silent".to_string());
    }

    if kind != OperationKind::Uninstall && options.skip_hash_check {
        args.push("--ignore-security-hash".to_string());
    }

    if kind != OperationKind::Uninstall
        && let Some(version) = options.requested_version()
    {
        args.push("--version".to_string());
        args.push(version.to_string());
        args.push("--force".to_string());
    }

    if kind == OperationKind::Install
        && let Some(location) = options.custom_install_location.as_deref()
        && !location.trim().is_empty()
    {
        args.push("--location".to_string());
        args.push(location.trim().to_string());
    }

    args
}

fn winget_request(
    task_id: Option<TaskId>,
    task_type: TaskType,
    action: ManagerAction,
    command: CommandSpec,
    timeout: Duration,
) -> ProcessSpawnRequest {
    let mut request = ProcessSpawnRequest::new(ManagerId::Winget, task_type, action, command)
        .requires_elevation(false)
        .timeout(timeout);
    if let Some(task_id) = task_id {
        request = request.task_id(task_id);
    }
    request
}

pub(crate) fn parse_winget_version(output: &str) -> Option<String> {
    let line = output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())?;
    // Example: v1.7.10861
    let version = line.strip_prefix('v').unwrap_or(line).trim();
    let looks_like_version = version
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit());
    looks_like_version.then(|| version.to_string())
}

/// Data rows of the first table in `raw`, with the layout read from its
/// header. Stops at the summary footer and at the pinned-packages section
/// that `winget upgrade` appends.
fn winget_table(raw: &str, titles: &[&str]) -> Vec<(ColumnLayout, String)> {
    let lines = final_lines(raw);
    let mut layout: Option<ColumnLayout> = None;
    let mut in_rows = false;
    let mut rows = Vec::new();

    for line in lines {
        let Some(current) = layout.as_ref() else {
            if let Some(candidate) = ColumnLayout::from_header(&line, titles)
                && candidate.has("Name")
                && candidate.has("Id")
            {
                layout = Some(candidate);
            }
            continue;
        };

        if !in_rows {
            in_rows = line.starts_with("---");
            continue;
        }

        if is_winget_footer(&line) {
            break;
        }
        rows.push((current.clone(), line));
    }

    rows
}

fn is_winget_footer(line: &str) -> bool {
    let starts_with_count = line
        .split_whitespace()
        .next()
        .is_some_and(|token| token.chars().all(|c| c.is_ascii_digit()));
    let lowered = line.to_lowercase();
    (starts_with_count && (lowered.contains("available") || lowered.contains("package")))
        || lowered.contains("explicit targeting")
        || lowered.contains("cannot be determined")
}

fn strip_version_marker(version: &str) -> String {
    version
        .trim_start_matches(['<', '>'])
        .trim()
        .to_string()
}

/// Source label for an installed package that winget did not attribute to
/// one of its repositories.
pub(crate) fn infer_winget_source(id: &str) -> String {
    let label = if id.starts_with("MSIX\\") {
        "Microsoft Store"
    } else if id.starts_with("ARP\\") || id.contains('{') || id.contains(' ') {
        if id.contains("Steam App") {
            "Steam"
        } else {
            "Local PC"
        }
    } else if id.starts_with("GOG") || is_gog_uninstaller(id) {
        "GOG"
    } else if is_store_product_id(id) {
        "msstore"
    } else if id.contains('.') {
        DEFAULT_SOURCE
    } else {
        "Local PC"
    };
    qualified_source(ManagerId::Winget, label)
}

fn is_gog_uninstaller(id: &str) -> bool {
    id.strip_suffix("_is1")
        .is_some_and(|stem| !stem.is_empty() && stem.chars().all(|c| c.is_ascii_digit()))
}

fn is_store_product_id(id: &str) -> bool {
    (12..=14).contains(&id.len())
        && id
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        && id.chars().any(|c| c.is_ascii_digit())
}

pub(crate) fn parse_winget_installed(raw: &str) -> Vec<Package> {
    let markers = markers_for(ManagerId::Winget);
    winget_table(raw, &["Name", "Id", "Version", "Available", "Source"])
        .into_iter()
        .filter_map(|(layout, line)| {
            let name = layout.field(&line, "Name")?;
            let id = layout.field(&line, "Id")?;
            let version = strip_version_marker(&layout.field(&line, "Version")?);
            if markers.rejects(&name, &id, &version) {
                return None;
            }
            let source = match layout.field(&line, "Source") {
                Some(source) if !source.is_empty() => qualified_source(ManagerId::Winget, &source),
                _ => infer_winget_source(&id),
            };
            Some(Package::new(ManagerId::Winget, name, id, version, source))
        })
        .collect()
}

pub(crate) fn parse_winget_updates(raw: &str) -> Vec<UpgradablePackage> {
    let markers = markers_for(ManagerId::Winget);
    winget_table(raw, &["Name", "Id", "Version", "Available", "Source"])
        .into_iter()
        .filter_map(|(layout, line)| {
            let name = layout.field(&line, "Name")?;
            let id = layout.field(&line, "Id")?;
            let version = strip_version_marker(&layout.field(&line, "Version")?);
            let available = layout.field(&line, "Available")?;
            if available.is_empty() || markers.rejects(&name, &id, &version) {
                tracing::debug!(manager = ?ManagerId::Winget, line = %line, "dropping update row");
                return None;
            }
            let source = layout
                .field(&line, "Source")
                .filter(|source| !source.is_empty())
                .unwrap_or_else(|| DEFAULT_SOURCE.to_string());
            Some(UpgradablePackage::new(
                Package::new(
                    ManagerId::Winget,
                    name,
                    id,
                    version,
                    qualified_source(ManagerId::Winget, &source),
                ),
                available,
            ))
        })
        .collect()
}

pub(crate) fn parse_winget_search(raw: &str) -> Vec<Package> {
    let markers = markers_for(ManagerId::Winget);
    winget_table(raw, &["Name", "Id", "Version", "Match", "Source"])
        .into_iter()
        .filter_map(|(layout, line)| {
            let name = layout.field(&line, "Name")?;
            let id = layout.field(&line, "Id")?;
            let version = layout.field(&line, "Version")?;
            if markers.rejects(&name, &id, &version) {
                return None;
            }
            let source = layout
                .field(&line, "Source")
                .filter(|source| !source.is_empty())
                .unwrap_or_else(|| DEFAULT_SOURCE.to_string());
            Some(Package::new(
                ManagerId::Winget,
                name,
                id,
                version,
                qualified_source(ManagerId::Winget, &source),
            ))
        })
        .collect()
}

pub(crate) fn parse_winget_sources(raw: &str) -> Vec<ManagerSource> {
    TableScanner::new(ManagerId::Winget)
        .rows_from_output(raw)
        .into_iter()
        .map(|fields| ManagerSource {
            manager: ManagerId::Winget,
            name: fields[0].clone(),
            url: fields[1].clone(),
        })
        .collect()
}

pub(crate) fn parse_winget_details(id: &str, show: &str, versions: &str) -> PackageDetails {
    let fields = Fields::parse(show);
    let mut details = PackageDetails::default();

    set_if_present(&mut details.description, fields.value("Description"));
    set_if_present(&mut details.publisher, fields.value("Publisher"));
    set_if_present(&mut details.author, fields.value("Author"));
    set_if_present(&mut details.homepage_url, fields.value("Homepage"));
    set_if_present(&mut details.license, fields.value("License"));
    set_if_present(&mut details.license_url, fields.value("License Url"));
    set_if_present(&mut details.installer_type, fields.value("Installer Type"));
    set_if_present(&mut details.installer_url, fields.value("Installer Url"));
    set_if_present(&mut details.installer_hash, fields.value("Installer SHA256"));
    set_if_present(&mut details.update_date, fields.value("Release Date"));
    set_if_present(&mut details.release_notes, fields.value("Release Notes"));
    set_if_present(
        &mut details.release_notes_url,
        fields.value("Release Notes Url"),
    );
    details.tags = split_tags(fields.value("Tags"));
    details.architectures = WINGET_FEATURES
        .architectures
        .iter()
        .map(|arch| arch.to_string())
        .collect();
    details.scopes = vec!["user".to_string(), "machine".to_string()];
    details.manifest_url = winget_manifest_url(id);

    details.versions = TableScanner::new(ManagerId::Winget)
        .min_fields(1)
        .rows_from_output(versions)
        .into_iter()
        .map(|fields| fields[0].clone())
        .collect();

    details
}

fn winget_manifest_url(id: &str) -> String {
    let first = id
        .chars()
        .next()
        .map(|c| c.to_ascii_lowercase())
        .unwrap_or('_');
    format!(
        "https://github.com/microsoft/winget-pkgs/tree/master/manifests/{first}/{}",
        id.replace('.', "/")
    )
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::adapters::manager::{
        AdapterRequest, AdapterResponse, AdapterResult, DetailsRequest, DetectOutput,
        DetectRequest, ListInstalledRequest, ManagerAdapter, OperationRequest,
    };
    use crate::models::{
        CoreError, CoreErrorKind, InstallationOptions, InstallationScope, ManagerId,
        OperationKind, Package, TaskId,
    };

    use super::{
        WingetAdapter, WingetSource, infer_winget_source, parse_winget_details,
        parse_winget_installed, parse_winget_search, parse_winget_sources, parse_winget_updates,
        parse_winget_version, winget_detect_request, winget_operation_request,
    };

    const LIST_FIXTURE: &str = include_str!("../../tests/fixtures/winget/list.txt");
    const UPGRADE_FIXTURE: &str = include_str!("../../tests/fixtures/winget/upgrade.txt");
    const SEARCH_FIXTURE: &str = include_str!("../../tests/fixtures/winget/search.txt");
    const SHOW_FIXTURE: &str = include_str!("../../tests/fixtures/winget/show.txt");
    const VERSIONS_FIXTURE: &str = include_str!("../../tests/fixtures/winget/versions.txt");
    const SOURCES_FIXTURE: &str = include_str!("../../tests/fixtures/winget/sources.txt");

    fn git() -> Package {
        Package::new(ManagerId::Winget, "Git", "Git.Git", "2.43.0", "Winget: winget")
    }

    #[test]
    fn parses_version_with_v_prefix() {
        assert_eq!(parse_winget_version("v1.7.10861\n").as_deref(), Some("1.7.10861"));
        assert_eq!(parse_winget_version("not installed"), None);
    }

    #[test]
    fn parses_installed_list_and_infers_missing_sources() {
        let packages = parse_winget_installed(LIST_FIXTURE);
        assert_eq!(packages.len(), 5);

        assert_eq!(packages[0].name, "7-Zip 23.01 (x64)");
        assert_eq!(packages[0].id, "7zip.7zip");
        assert_eq!(packages[0].version, "23.01");
        assert_eq!(packages[0].source, "Winget: winget");

        assert_eq!(packages[1].id, "Git.Git");
        assert_eq!(packages[1].source, "Winget: winget");

        assert_eq!(packages[2].id, "9NBLGGH4NNS1");
        assert_eq!(packages[2].source, "Winget: msstore");

        assert_eq!(packages[3].id, "Steam App 440");
        assert_eq!(packages[3].source, "Winget: Steam");

        assert_eq!(packages[4].id, "{4F3C2A1B-0000-1111-2222-333344445555}");
        assert_eq!(packages[4].source, "Winget: Local PC");
    }

    #[test]
    fn parses_upgrades_and_ignores_pinned_section() {
        let updates = parse_winget_updates(UPGRADE_FIXTURE);
        assert_eq!(updates.len(), 2);

        assert_eq!(updates[0].package.id, "Git.Git");
        assert_eq!(updates[0].installed_version(), "2.43.0");
        assert_eq!(updates[0].new_version, "2.44.0");
        assert_eq!(updates[0].package.source, "Winget: winget");

        assert_eq!(updates[1].package.id, "Microsoft.Edge");
        assert_eq!(updates[1].installed_version(), "120.0.2210.91");
    }

    #[test]
    fn parses_search_with_optional_match_column() {
        let results = parse_winget_search(SEARCH_FIXTURE);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].id, "7zip.7zip");
        assert_eq!(results[0].version, "23.01");
        assert_eq!(results[2].id, "9NBLGGH4NNS2");
        assert_eq!(results[2].source, "Winget: msstore");
    }

    #[test]
    fn parses_show_output_into_details() {
        let details = parse_winget_details("Git.Git", SHOW_FIXTURE, VERSIONS_FIXTURE);
        assert_eq!(details.publisher, "The Git Development Community");
        assert_eq!(details.license, "GPL-2.0");
        assert_eq!(details.homepage_url, "https://gitforwindows.org/");
        assert_eq!(details.installer_type, "inno");
        assert!(details.installer_hash.starts_with("3E9A"));
        assert_eq!(details.update_date, "2024-02-23");
        assert_eq!(details.tags, vec!["bash", "git", "vcs"]);
        assert!(details.release_notes.contains("Git for Windows"));
        assert_eq!(details.versions, vec!["2.44.0", "2.43.0", "2.42.0.2"]);
        assert_eq!(
            details.manifest_url,
            "https://github.com/microsoft/winget-pkgs/tree/master/manifests/g/Git/Git"
        );
    }

    #[test]
    fn parses_sources_table() {
        let sources = parse_winget_sources(SOURCES_FIXTURE);
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].name, "msstore");
        assert_eq!(sources[1].url, "https://cdn.winget.microsoft.com/cache");
    }

    #[test]
    fn infers_sources_from_identifier_shape() {
        assert_eq!(infer_winget_source("MSIX\\Foo_1.0"), "Winget: Microsoft Store");
        assert_eq!(infer_winget_source("1207658924_is1"), "Winget: GOG");
        assert_eq!(infer_winget_source("Mozilla.Firefox"), "Winget: winget");
        assert_eq!(infer_winget_source("SomeTool"), "Winget: Local PC");
    }

    #[test]
    fn operation_requests_carry_sanitized_options() {
        let install = winget_operation_request(
            Some(TaskId(7)),
            &OperationRequest {
                kind: OperationKind::Install,
                package: git(),
                options: InstallationOptions {
                    architecture: Some("X64".to_string()),
                    installation_scope: Some(InstallationScope::Machine),
                    skip_hash_check: true,
                    version: Some("2.40.0".to_string()),
                    custom_parameters: vec!["--override".to_string(), "/VERYSILENT".to_string()],
                    ..InstallationOptions::default()
                },
            },
        );
        assert_eq!(install.task_id, Some(TaskId(7)));
        assert_eq!(install.command.program, PathBuf::from("winget"));
        assert_eq!(install.timeout, None);
        assert_eq!(
            install.command.args,
            vec![
                "install",
                "--id",
                "Git.Git",
                "--exact",
                "--accept-source-agreements",
                "--architecture",
                "x64",
                "--override",
                "/VERYSILENT",
                "--scope",
                "machine",
                "--disable-interactivity",
                "--silent",
                "--ignore-security-hash",
                "--version",
                "2.40.0",
                "--force",
                "--accept-package-agreements",
            ]
        );

        let uninstall = winget_operation_request(
            None,
            &OperationRequest {
                kind: OperationKind::Uninstall,
                package: git(),
                options: InstallationOptions {
                    interactive_installation: true,
                    skip_hash_check: true,
                    architecture: Some("x64".to_string()),
                    ..InstallationOptions::default()
                },
            },
        );
        assert_eq!(
            uninstall.command.args,
            vec![
                "uninstall",
                "--id",
                "Git.Git",
                "--exact",
                "--accept-source-agreements",
                "--interactive",
            ]
        );

        let update = winget_operation_request(
            None,
            &OperationRequest {
                kind: OperationKind::Update,
                package: git(),
                options: InstallationOptions::default(),
            },
        );
        assert_eq!(update.command.args[0..5], ["upgrade", "--id", "Git.Git", "--exact", "--include-unknown"]);
        assert_eq!(update.command.args.last().map(String::as_str), Some("--accept-package-agreements"));
    }

    #[test]
    fn detect_request_is_bounded() {
        let detect = winget_detect_request(None);
        assert_eq!(detect.command.args, vec!["--version"]);
        assert!(detect.timeout.is_some());
    }

    struct StubWingetSource {
        list_calls: Arc<AtomicUsize>,
        detect_fails: bool,
    }

    impl WingetSource for StubWingetSource {
        fn detect(&self) -> AdapterResult<DetectOutput> {
            if self.detect_fails {
                return Err(CoreError::new(CoreErrorKind::ProcessFailure, "not on PATH"));
            }
            Ok(DetectOutput {
                executable_path: Some(PathBuf::from("C:\\winget.exe")),
                version_output: "v1.7.10861".to_string(),
            })
        }

        fn list_installed(&self) -> AdapterResult<String> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            Ok(LIST_FIXTURE.to_string())
        }

        fn list_updates(&self) -> AdapterResult<String> {
            Ok(UPGRADE_FIXTURE.to_string())
        }

        fn search(&self, _query: &str) -> AdapterResult<String> {
            Ok(SEARCH_FIXTURE.to_string())
        }

        fn show(&self, _id: &str) -> AdapterResult<String> {
            Ok(SHOW_FIXTURE.to_string())
        }

        fn show_versions(&self, _id: &str) -> AdapterResult<String> {
            Err(CoreError::new(CoreErrorKind::ProcessFailure, "offline"))
        }

        fn list_sources(&self) -> AdapterResult<String> {
            Ok(SOURCES_FIXTURE.to_string())
        }

        fn add_source(&self, _name: &str, _url: &str) -> AdapterResult<String> {
            Ok(String::new())
        }

        fn remove_source(&self, _name: &str) -> AdapterResult<String> {
            Ok(String::new())
        }

        fn update_sources(&self) -> AdapterResult<String> {
            Ok(String::new())
        }
    }

    fn adapter(detect_fails: bool) -> (WingetAdapter<StubWingetSource>, Arc<AtomicUsize>) {
        let list_calls = Arc::new(AtomicUsize::new(0));
        let adapter = WingetAdapter::new(StubWingetSource {
            list_calls: list_calls.clone(),
            detect_fails,
        });
        (adapter, list_calls)
    }

    #[test]
    fn detection_failure_reports_not_installed() {
        let (adapter, _) = adapter(true);
        let response = adapter
            .execute(AdapterRequest::Detect(DetectRequest))
            .expect("detection never errors");
        match response {
            AdapterResponse::Detection(info) => {
                assert!(!info.installed);
                assert_eq!(info.version, None);
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn installed_listing_is_repeatable() {
        let (adapter, list_calls) = adapter(false);
        let first = adapter
            .execute(AdapterRequest::ListInstalled(ListInstalledRequest))
            .expect("list installed");
        let second = adapter
            .execute(AdapterRequest::ListInstalled(ListInstalledRequest))
            .expect("list installed");
        assert_eq!(first, second);
        assert_eq!(list_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn details_survive_missing_version_listing() {
        let (adapter, _) = adapter(false);
        let response = adapter
            .execute(AdapterRequest::Details(DetailsRequest { package: git() }))
            .expect("details");
        match response {
            AdapterResponse::Details(details) => {
                assert_eq!(details.license, "GPL-2.0");
                assert!(details.versions.is_empty());
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn rejects_option_like_package_ids() {
        let (adapter, _) = adapter(false);
        let mut package = git();
        package.id = "--source=evil".to_string();
        let error = adapter
            .operation_request(&OperationRequest {
                kind: OperationKind::Install,
                package,
                options: InstallationOptions::default(),
            })
            .expect_err("option-like id must be rejected");
        assert_eq!(error.kind, CoreErrorKind::InvalidInput);
    }
}
