use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::adapters::manager::{
    AdapterRequest, AdapterResponse, AdapterResult, DetectOutput, ManagerAdapter,
    OperationRequest, ensure_action_supported, ensure_request_supported,
    validate_package_identifier,
};
use crate::execution::{CommandSpec, ProcessSpawnRequest};
use crate::models::package::set_if_present;
use crate::models::{
    Capability, CoreError, CoreErrorKind, DetectionInfo, InstallationScope, ManagerAction,
    ManagerCapabilities, ManagerDescriptor, ManagerId, OperationKind, Package, PackageDetails,
    TaskId, TaskType, UpgradablePackage,
};
use crate::parsing::{Delimiter, Fields, TableScanner, format_package_id_as_name, markers_for};

const PIP_CAPABILITIES: &[Capability] = &[
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

const PIP_FEATURES: ManagerCapabilities = ManagerCapabilities {
    can_run_as_admin: true,
    supports_custom_versions: true,
    supports_custom_scopes: true,
    supports_pre_release: true,
    scopes: &[InstallationScope::User],
    ..ManagerCapabilities::NONE
};

const PIP_DESCRIPTOR: ManagerDescriptor = ManagerDescriptor {
    id: ManagerId::Pip,
    display_name: "Pip",
    capabilities: PIP_CAPABILITIES,
    features: PIP_FEATURES,
};

pub(crate) const PYTHON_COMMAND: &str = "python";
pub(crate) const PIP_SEARCH_COMMAND: &str = "parse_pip_search";
const SOURCE_LABEL: &str = "Pip";
const DETECT_TIMEOUT: Duration = Duration::from_secs(10);
const LIST_TIMEOUT: Duration = Duration::from_secs(60);
const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);
const HELPER_INSTALL_TIMEOUT: Duration = Duration::from_secs(300);

/// Flags shared by every pip operation so that it never prompts.
const QUIET_FLAGS: [&str; 4] = [
    "--no-input",
    "--no-color",
    "--no-python-version-warning",
    "--no-cache",
];

pub trait PipSource: Send + Sync {
    fn detect(&self) -> AdapterResult<DetectOutput>;
    fn list_installed(&self) -> AdapterResult<String>;
    fn list_outdated(&self) -> AdapterResult<String>;
    fn search(&self, query: &str) -> AdapterResult<String>;
    fn show(&self, id: &str) -> AdapterResult<String>;
    fn index_versions(&self, id: &str) -> AdapterResult<String>;
    /// Raw body of `https://pypi.org/pypi/<id>/json`.
    fn pypi_json(&self, id: &str) -> AdapterResult<String>;

    fn prepare(&self, request: ProcessSpawnRequest) -> ProcessSpawnRequest {
        request
    }
}

pub struct PipAdapter<S: PipSource> {
    source: S,
}

impl<S: PipSource> PipAdapter<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    fn details(&self, id: &str) -> AdapterResult<PackageDetails> {
        let mut details = PackageDetails::default();

        match self.source.show(id) {
            Ok(raw) => apply_pip_show(&mut details, &raw),
            Err(error) => {
                tracing::debug!(manager = ?ManagerId::Pip, id, error = %error, "pip show failed")
            }
        }

        match self.source.pypi_json(id) {
            Ok(raw) => apply_pypi_json(&mut details, &raw)?,
            Err(error) => {
                tracing::warn!(manager = ?ManagerId::Pip, id, error = %error, "PyPI lookup failed")
            }
        }

        match self.source.index_versions(id) {
            Ok(raw) => details.versions = parse_pip_index_versions(&raw),
            Err(error) => {
                tracing::debug!(manager = ?ManagerId::Pip, id, error = %error, "version listing failed")
            }
        }

        Ok(details)
    }
}

impl<S: PipSource> ManagerAdapter for PipAdapter<S> {
    fn descriptor(&self) -> &ManagerDescriptor {
        &PIP_DESCRIPTOR
    }

    fn execute(&self, request: AdapterRequest) -> AdapterResult<AdapterResponse> {
        ensure_request_supported(self.descriptor(), &request)?;

        match request {
            AdapterRequest::Detect(_) => Ok(AdapterResponse::Detection(
                match self.source.detect() {
                    Ok(output) => {
                        let version = parse_pip_version(&output.version_output);
                        DetectionInfo {
                            installed: output.executable_path.is_some() && version.is_some(),
                            executable_path: output.executable_path,
                            version,
                        }
                    }
                    Err(error) => {
                        tracing::debug!(manager = ?ManagerId::Pip, error = %error, "detection failed");
                        DetectionInfo::not_found()
                    }
                },
            )),
            AdapterRequest::ListInstalled(_) => {
                let raw = self.source.list_installed()?;
                Ok(AdapterResponse::InstalledPackages(parse_pip_list(&raw)?))
            }
            AdapterRequest::ListUpdates(_) => {
                let raw = self.source.list_outdated()?;
                Ok(AdapterResponse::Updates(parse_pip_outdated(&raw)?))
            }
            AdapterRequest::Search(search) => {
                let raw = self.source.search(&search.query)?;
                Ok(AdapterResponse::SearchResults(parse_pip_search(&raw)))
            }
            AdapterRequest::Details(details) => {
                let id = details.package.id.as_str();
                validate_package_identifier(ManagerId::Pip, ManagerAction::Details, id)?;
                Ok(AdapterResponse::Details(Box::new(self.details(id)?)))
            }
            // Pip installs from the configured index only.
            AdapterRequest::ListSources => Ok(AdapterResponse::Sources(Vec::new())),
            AdapterRequest::AddSource(_)
            | AdapterRequest::RemoveSource(_)
            | AdapterRequest::RefreshSources => Ok(AdapterResponse::SourcesChanged),
        }
    }

    fn operation_request(&self, request: &OperationRequest) -> AdapterResult<ProcessSpawnRequest> {
        let action = request.kind.action();
        ensure_action_supported(self.descriptor(), action)?;
        validate_package_identifier(ManagerId::Pip, action, &request.package.id)?;
        Ok(self.source.prepare(pip_operation_request(None, request)))
    }
}

fn pip_command() -> CommandSpec {
    CommandSpec::new(PYTHON_COMMAND).args(["-m", "pip"])
}

pub fn pip_detect_request(task_id: Option<TaskId>) -> ProcessSpawnRequest {
    pip_request(
        task_id,
        TaskType::Detection,
        ManagerAction::Detect,
        pip_command().arg("--version"),
        DETECT_TIMEOUT,
    )
}

pub fn pip_list_request(task_id: Option<TaskId>) -> ProcessSpawnRequest {
    pip_request(
        task_id,
        TaskType::Refresh,
        ManagerAction::ListInstalled,
        pip_command().args(["list", "--format=json", "--disable-pip-version-check"]),
        LIST_TIMEOUT,
    )
}

pub fn pip_list_outdated_request(task_id: Option<TaskId>) -> ProcessSpawnRequest {
    pip_request(
        task_id,
        TaskType::Refresh,
        ManagerAction::ListUpdates,
        pip_command().args([
            "list",
            "--outdated",
            "--format=json",
            "--disable-pip-version-check",
        ]),
        LIST_TIMEOUT,
    )
}

/// PyPI retired the XML-RPC search endpoint; the `parse_pip_search` helper
/// scrapes the web search instead.
pub fn pip_search_request(task_id: Option<TaskId>, query: &str) -> ProcessSpawnRequest {
    pip_request(
        task_id,
        TaskType::Search,
        ManagerAction::Search,
        CommandSpec::new(PIP_SEARCH_COMMAND).arg(query),
        SEARCH_TIMEOUT,
    )
}

pub fn pip_install_search_helper_request(task_id: Option<TaskId>) -> ProcessSpawnRequest {
    pip_request(
        task_id,
        TaskType::Search,
        ManagerAction::Search,
        pip_command()
            .args(["install", PIP_SEARCH_COMMAND])
            .args(QUIET_FLAGS),
        HELPER_INSTALL_TIMEOUT,
    )
}

pub fn pip_show_request(task_id: Option<TaskId>, id: &str) -> ProcessSpawnRequest {
    pip_request(
        task_id,
        TaskType::Details,
        ManagerAction::Details,
        pip_command().args(["show", "-v", id]),
        SEARCH_TIMEOUT,
    )
}

pub fn pip_index_versions_request(task_id: Option<TaskId>, id: &str) -> ProcessSpawnRequest {
    pip_request(
        task_id,
        TaskType::Details,
        ManagerAction::Details,
        pip_command().args(["index", "versions", id]),
        SEARCH_TIMEOUT,
    )
}

pub fn pip_operation_request(
    task_id: Option<TaskId>,
    request: &OperationRequest,
) -> ProcessSpawnRequest {
    let options = &request.options;
    let id = request.package.id.as_str();

    let mut command = match request.kind {
        OperationKind::Uninstall => pip_command().args(["uninstall", id, "--yes"]),
        OperationKind::Install | OperationKind::Update => {
            let target = match options.requested_version() {
                Some(version) => format!("{id}=={version}"),
                None => id.to_string(),
            };
            let verb = if request.kind == OperationKind::Update {
                pip_command().args(["install", "--upgrade"])
            } else {
                pip_command().arg("install")
            };
            verb.arg(target)
        }
    };
    command = command
        .args(QUIET_FLAGS)
        .args(options.custom_parameters.iter().cloned());

    if request.kind != OperationKind::Uninstall {
        if options.pre_release {
            command = command.arg("--pre");
        }
        if options.installation_scope == Some(InstallationScope::User) {
            command = command.arg("--user");
        }
    }

    pip_request(
        task_id,
        request.kind.task_type(),
        request.kind.action(),
        command,
        LIST_TIMEOUT,
    )
    .without_timeout()
}

fn pip_request(
    task_id: Option<TaskId>,
    task_type: TaskType,
    action: ManagerAction,
    command: CommandSpec,
    timeout: Duration,
) -> ProcessSpawnRequest {
    let mut request = ProcessSpawnRequest::new(ManagerId::Pip, task_type, action, command)
        .requires_elevation(false)
        .timeout(timeout);
    if let Some(task_id) = task_id {
        request = request.task_id(task_id);
    }
    request
}

#[derive(Debug, Deserialize)]
struct PipListEntry {
    name: String,
    version: String,
}

#[derive(Debug, Deserialize)]
struct PipOutdatedEntry {
    name: String,
    version: String,
    latest_version: String,
}

fn pip_package(id: &str, version: &str) -> Package {
    Package::new(
        ManagerId::Pip,
        format_package_id_as_name(id),
        id,
        version,
        SOURCE_LABEL,
    )
}

pub(crate) fn parse_pip_version(output: &str) -> Option<String> {
    let line = output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())?;
    // pip 24.0 from C:\Python312\Lib\site-packages\pip (python 3.12)
    let rest = line.strip_prefix("pip ")?;
    let version = rest.split_whitespace().next()?.trim();
    if version.is_empty() {
        return None;
    }
    Some(version.to_string())
}

/// pip can print `[notice]` lines ahead of the JSON document; parsing starts
/// at the first line that opens a JSON array.
fn json_payload(output: &str) -> &str {
    let mut offset = 0;
    for line in output.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if trimmed.starts_with("[{") || trimmed.starts_with("[]") {
            return &output[offset..];
        }
        offset += line.len();
    }
    output
}

pub(crate) fn parse_pip_list(output: &str) -> AdapterResult<Vec<Package>> {
    let entries: Vec<PipListEntry> = serde_json::from_str(json_payload(output))
        .map_err(|e| parse_error(&format!("invalid pip list JSON: {e}")))?;

    Ok(entries
        .into_iter()
        .filter(|entry| !entry.name.trim().is_empty())
        .map(|entry| pip_package(entry.name.trim(), entry.version.trim()))
        .collect())
}

pub(crate) fn parse_pip_outdated(output: &str) -> AdapterResult<Vec<UpgradablePackage>> {
    let entries: Vec<PipOutdatedEntry> = serde_json::from_str(json_payload(output))
        .map_err(|e| parse_error(&format!("invalid pip outdated JSON: {e}")))?;

    Ok(entries
        .into_iter()
        .filter(|entry| !entry.name.trim().is_empty() && !entry.latest_version.trim().is_empty())
        .map(|entry| {
            UpgradablePackage::new(
                pip_package(entry.name.trim(), entry.version.trim()),
                entry.latest_version.trim(),
            )
        })
        .collect())
}

/// `name | version | released | description` rows after a dashed rule.
pub(crate) fn parse_pip_search(raw: &str) -> Vec<Package> {
    let markers = markers_for(ManagerId::Pip);
    TableScanner::new(ManagerId::Pip)
        .delimiter(Delimiter::Char('|'))
        .rows_from_output(raw)
        .into_iter()
        .filter(|fields| !markers.rejects(&fields[0], &fields[0], &fields[1]))
        .map(|fields| pip_package(&fields[0], &fields[1]))
        .collect()
}

pub(crate) fn parse_pip_index_versions(raw: &str) -> Vec<String> {
    raw.lines()
        .find_map(|line| line.trim().strip_prefix("Available versions:"))
        .map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|version| !version.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Fills what the locally installed metadata knows; PyPI data applied later
/// takes precedence.
pub(crate) fn apply_pip_show(details: &mut PackageDetails, raw: &str) {
    let fields = Fields::parse(raw);
    set_if_present(&mut details.description, fields.value("Summary"));
    set_if_present(&mut details.author, fields.value("Author"));
    set_if_present(&mut details.homepage_url, fields.value("Home-page"));
    set_if_present(&mut details.license, fields.value("License"));
    set_if_present(&mut details.installer_type, fields.value("Installer"));
    apply_classifiers(details, fields.value("Classifiers").lines());
}

pub(crate) fn apply_pypi_json(details: &mut PackageDetails, raw: &str) -> AdapterResult<()> {
    let document: Value = serde_json::from_str(raw)
        .map_err(|e| parse_error(&format!("invalid PyPI JSON: {e}")))?;

    let info = &document["info"];
    let text = |key: &str| info[key].as_str().unwrap_or_default();
    set_if_present(&mut details.author, text("author"));
    set_if_present(&mut details.publisher, text("maintainer"));
    set_if_present(&mut details.description, text("summary"));
    set_if_present(&mut details.manifest_url, text("package_url"));
    // Long license texts are useless in a single field.
    if !text("license").contains('\n') {
        set_if_present(&mut details.license, text("license"));
    }
    let homepage = info["project_urls"]["Homepage"]
        .as_str()
        .unwrap_or_else(|| text("home_page"));
    set_if_present(&mut details.homepage_url, homepage);
    set_if_present(
        &mut details.release_notes_url,
        info["project_urls"]["Changelog"].as_str().unwrap_or_default(),
    );

    if let Some(classifiers) = info["classifiers"].as_array() {
        apply_classifiers(details, classifiers.iter().filter_map(Value::as_str));
    }

    let file = document["urls"]
        .as_array()
        .and_then(|files| files.first())
        .unwrap_or(&Value::Null);
    set_if_present(
        &mut details.installer_hash,
        file["digests"]["sha256"].as_str().unwrap_or_default(),
    );
    if let Some(url) = file["url"].as_str() {
        set_if_present(&mut details.installer_url, url);
        let extension = url.rsplit('.').next().unwrap_or_default();
        let installer_type = if extension == "whl" {
            "Wheel"
        } else {
            extension
        };
        set_if_present(&mut details.installer_type, installer_type);
    }
    if let Some(size) = file["size"].as_u64() {
        details.installer_size = size;
    }
    if let Some(upload) = file["upload_time"].as_str() {
        set_if_present(&mut details.update_date, upload.split('T').next().unwrap_or(upload));
    }

    Ok(())
}

/// `License :: OSI Approved :: MIT License` sets the license, `Topic :: ...`
/// lines become tags.
fn apply_classifiers<'a>(details: &mut PackageDetails, classifiers: impl Iterator<Item = &'a str>) {
    for classifier in classifiers {
        let Some(leaf) = classifier.rsplit("::").next().map(str::trim) else {
            continue;
        };
        if classifier.starts_with("License ::") {
            set_if_present(&mut details.license, leaf);
        } else if classifier.starts_with("Topic ::") && !details.tags.iter().any(|t| t == leaf)
        {
            details.tags.push(leaf.to_string());
        }
    }
}

fn parse_error(message: &str) -> CoreError {
    CoreError {
        manager: Some(ManagerId::Pip),
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
        ManagerAdapter, OperationRequest, SourceRequest,
    };
    use crate::models::{
        CoreError, CoreErrorKind, InstallationOptions, InstallationScope, ManagerId,
        ManagerSource, OperationKind, Package,
    };

    use super::{
        PipAdapter, PipSource, parse_pip_index_versions, parse_pip_list, parse_pip_outdated,
        parse_pip_search, parse_pip_version, pip_operation_request,
    };

    const VERSION_FIXTURE: &str = include_str!("../../tests/fixtures/pip/version.txt");
    const LIST_FIXTURE: &str = include_str!("../../tests/fixtures/pip/list.json");
    const OUTDATED_FIXTURE: &str = include_str!("../../tests/fixtures/pip/outdated.json");
    const SEARCH_FIXTURE: &str = include_str!("../../tests/fixtures/pip/search.txt");
    const SHOW_FIXTURE: &str = include_str!("../../tests/fixtures/pip/show.txt");
    const PYPI_FIXTURE: &str = include_str!("../../tests/fixtures/pip/pypi.json");
    const INDEX_FIXTURE: &str = include_str!("../../tests/fixtures/pip/index_versions.txt");

    fn black() -> Package {
        Package::new(ManagerId::Pip, "Black", "black", "24.2.0", "Pip")
    }

    #[test]
    fn parses_pip_version_line() {
        assert_eq!(parse_pip_version(VERSION_FIXTURE), Some("24.0".to_string()));
        assert_eq!(parse_pip_version("Python 3.12.1"), None);
    }

    #[test]
    fn parses_installed_json_after_notices() {
        let packages = parse_pip_list(LIST_FIXTURE).expect("parse list");
        assert_eq!(packages.len(), 3);
        assert_eq!(packages[0].id, "black");
        assert_eq!(packages[1].name, "Python Dateutil");
        assert!(packages.iter().all(|p| p.source == "Pip"));
    }

    #[test]
    fn parses_outdated_json() {
        let updates = parse_pip_outdated(OUTDATED_FIXTURE).expect("parse outdated");
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].package.id, "black");
        assert_eq!(updates[0].installed_version(), "24.2.0");
        assert_eq!(updates[0].new_version, "24.3.0");
    }

    #[test]
    fn malformed_list_is_a_parse_failure() {
        let error = parse_pip_list("not json").expect_err("must fail");
        assert_eq!(error.kind, CoreErrorKind::ParseFailure);
    }

    #[test]
    fn parses_search_table() {
        let results = parse_pip_search(SEARCH_FIXTURE);
        let ids: Vec<&str> = results.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["requests", "requests-oauthlib", "requests-toolbelt"]);
        assert_eq!(results[0].version, "2.31.0");
    }

    #[test]
    fn parses_index_versions() {
        assert_eq!(
            parse_pip_index_versions(INDEX_FIXTURE),
            vec!["24.3.0", "24.2.0", "24.1.1"]
        );
        assert!(parse_pip_index_versions("ERROR: No matching distribution").is_empty());
    }

    #[test]
    fn operation_request_maps_scope_version_and_prerelease() {
        let request = pip_operation_request(
            None,
            &OperationRequest {
                kind: OperationKind::Install,
                package: black(),
                options: InstallationOptions {
                    version: Some("23.12.1".to_string()),
                    pre_release: true,
                    installation_scope: Some(InstallationScope::User),
                    custom_parameters: vec!["--no-deps".to_string()],
                    ..InstallationOptions::default()
                },
            },
        );
        assert_eq!(request.command.program, PathBuf::from("python"));
        assert_eq!(
            request.command.args,
            vec![
                "-m",
                "pip",
                "install",
                "black==23.12.1",
                "--no-input",
                "--no-color",
                "--no-python-version-warning",
                "--no-cache",
                "--no-deps",
                "--pre",
                "--user",
            ]
        );
        assert!(request.timeout.is_none());

        let update = pip_operation_request(
            None,
            &OperationRequest {
                kind: OperationKind::Update,
                package: black(),
                options: InstallationOptions::default(),
            },
        );
        assert_eq!(&update.command.args[..5], ["-m", "pip", "install", "--upgrade", "black"]);

        let uninstall = pip_operation_request(
            None,
            &OperationRequest {
                kind: OperationKind::Uninstall,
                package: black(),
                options: InstallationOptions {
                    pre_release: true,
                    ..InstallationOptions::default()
                },
            },
        );
        assert_eq!(&uninstall.command.args[..5], ["-m", "pip", "uninstall", "black", "--yes"]);
        assert!(!uninstall.command.args.contains(&"--pre".to_string()));
    }

    struct StubPipSource {
        pypi: Option<&'static str>,
    }

    impl PipSource for StubPipSource {
        fn detect(&self) -> AdapterResult<DetectOutput> {
            Ok(DetectOutput {
                executable_path: Some(PathBuf::from("/usr/bin/python3")),
                version_output: VERSION_FIXTURE.to_string(),
            })
        }

        fn list_installed(&self) -> AdapterResult<String> {
            Ok(LIST_FIXTURE.to_string())
        }

        fn list_outdated(&self) -> AdapterResult<String> {
            Ok(OUTDATED_FIXTURE.to_string())
        }

        fn search(&self, _query: &str) -> AdapterResult<String> {
            Ok(SEARCH_FIXTURE.to_string())
        }

        fn show(&self, _id: &str) -> AdapterResult<String> {
            Ok(SHOW_FIXTURE.to_string())
        }

        fn index_versions(&self, _id: &str) -> AdapterResult<String> {
            Ok(INDEX_FIXTURE.to_string())
        }

        fn pypi_json(&self, _id: &str) -> AdapterResult<String> {
            self.pypi.map(str::to_string).ok_or_else(|| {
                CoreError::new(CoreErrorKind::Network, "offline")
            })
        }
    }

    fn details(adapter: &PipAdapter<StubPipSource>) -> crate::models::PackageDetails {
        let response = adapter
            .execute(AdapterRequest::Details(DetailsRequest { package: black() }))
            .expect("details");
        match response {
            AdapterResponse::Details(details) => *details,
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn details_prefer_pypi_and_fall_back_to_local_metadata() {
        let online = details(&PipAdapter::new(StubPipSource {
            pypi: Some(PYPI_FIXTURE),
        }));
        assert_eq!(online.description, "The uncompromising code formatter.");
        assert_eq!(online.homepage_url, "https://github.com/psf/black");
        assert_eq!(online.license, "MIT License");
        assert_eq!(online.installer_type, "Wheel");
        assert_eq!(online.installer_size, 1_600_000);
        assert_eq!(online.installer_hash, "abc123");
        assert_eq!(online.update_date, "2024-03-15");
        assert_eq!(online.tags, vec!["Quality Assurance"]);
        assert_eq!(online.versions.len(), 3);

        let offline = details(&PipAdapter::new(StubPipSource { pypi: None }));
        assert_eq!(offline.description, "The uncompromising code formatter.");
        assert_eq!(offline.author, "Łukasz Langa");
        assert_eq!(offline.homepage_url, "https://github.com/psf/black");
        assert_eq!(offline.versions.len(), 3);
    }

    #[test]
    fn source_changes_are_accepted_without_effect() {
        let adapter = PipAdapter::new(StubPipSource { pypi: None });
        match adapter.execute(AdapterRequest::ListSources) {
            Ok(AdapterResponse::Sources(sources)) => assert!(sources.is_empty()),
            other => panic!("unexpected response: {other:?}"),
        }

        let response = adapter
            .execute(AdapterRequest::AddSource(SourceRequest {
                source: ManagerSource {
                    manager: ManagerId::Pip,
                    name: "mirror".to_string(),
                    url: "https://mirror.example.com/simple".to_string(),
                },
            }))
            .expect("no-op");
        assert_eq!(response, AdapterResponse::SourcesChanged);
    }

    #[test]
    fn detect_reads_pip_version() {
        let adapter = PipAdapter::new(StubPipSource { pypi: None });
        match adapter.execute(AdapterRequest::Detect(crate::adapters::manager::DetectRequest)) {
            Ok(AdapterResponse::Detection(info)) => {
                assert!(info.installed);
                assert_eq!(info.version.as_deref(), Some("24.0"));
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }
}
