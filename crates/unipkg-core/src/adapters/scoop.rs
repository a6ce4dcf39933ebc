use std::time::Duration;

use serde_json::Value;

use crate::adapters::manager::{
    AdapterRequest, AdapterResponse, AdapterResult, DetectOutput, ManagerAdapter,
    OperationRequest, ensure_action_supported, ensure_request_supported,
    validate_package_identifier,
};
use crate::execution::line_reader::final_lines;
use crate::execution::{CommandSpec, ProcessSpawnRequest};
use crate::models::package::set_if_present;
use crate::models::{
    Capability, CoreError, CoreErrorKind, DetectionInfo, InstallationScope, ManagerAction,
    ManagerCapabilities, ManagerDescriptor, ManagerId, ManagerSource, OperationKind, Package,
    PackageDetails, TaskId, TaskType, UNKNOWN_SOURCE, UpgradablePackage, qualified_source,
};
use crate::parsing::{TableScanner, format_package_id_as_name, markers_for};

const SCOOP_CAPABILITIES: &[Capability] = &[
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

const SCOOP_FEATURES: ManagerCapabilities = ManagerCapabilities {
    can_run_as_admin: true,
    can_skip_integrity_checks: true,
    can_run_interactively: false,
    can_remove_data_on_uninstall: true,
    supports_custom_versions: false,
    supports_custom_architectures: true,
    supports_custom_scopes: true,
    supports_pre_release: false,
    supports_custom_locations: false,
    supports_custom_sources: true,
    architectures: &["x64", "x86", "arm64"],
    scopes: &[InstallationScope::User, InstallationScope::Machine],
};

const SCOOP_DESCRIPTOR: ManagerDescriptor = ManagerDescriptor {
    id: ManagerId::Scoop,
    display_name: "Scoop",
    capabilities: SCOOP_CAPABILITIES,
    features: SCOOP_FEATURES,
};

/// Scoop is a PowerShell script; every call goes through the shell.
pub(crate) const POWERSHELL_COMMAND: &str = "powershell";
const SCOOP_PREFIX: &[&str] = &["-NoProfile", "-ExecutionPolicy", "Bypass", "-Command", "scoop"];
pub(crate) const SCOOP_SEARCH_COMMAND: &str = "scoop-search";
const GLOBAL_SOURCE_PREFIX: &str = "Scoop (Global)";
const DETECT_TIMEOUT: Duration = Duration::from_secs(15);
const LIST_TIMEOUT: Duration = Duration::from_secs(120);
const SEARCH_TIMEOUT: Duration = Duration::from_secs(60);
const SOURCE_TIMEOUT: Duration = Duration::from_secs(180);

pub trait ScoopSource: Send + Sync {
    fn detect(&self) -> AdapterResult<DetectOutput>;
    fn list_installed(&self) -> AdapterResult<String>;
    fn status(&self) -> AdapterResult<String>;
    fn search(&self, query: &str) -> AdapterResult<String>;
    fn manifest(&self, id: &str) -> AdapterResult<String>;
    fn list_buckets(&self) -> AdapterResult<String>;
    fn add_bucket(&self, name: &str, url: &str) -> AdapterResult<String>;
    fn remove_bucket(&self, name: &str) -> AdapterResult<String>;
    fn update(&self) -> AdapterResult<String>;

    fn prepare(&self, request: ProcessSpawnRequest) -> ProcessSpawnRequest {
        request
    }
}

pub struct ScoopAdapter<S: ScoopSource> {
    source: S,
}

impl<S: ScoopSource> ScoopAdapter<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

impl<S: ScoopSource> ManagerAdapter for ScoopAdapter<S> {
    fn descriptor(&self) -> &ManagerDescriptor {
        &SCOOP_DESCRIPTOR
    }

    fn execute(&self, request: AdapterRequest) -> AdapterResult<AdapterResponse> {
        ensure_request_supported(self.descriptor(), &request)?;

        match request {
            AdapterRequest::Detect(_) => Ok(AdapterResponse::Detection(
                match self.source.detect() {
                    Ok(output) => {
                        let version = parse_scoop_version(&output.version_output);
                        DetectionInfo {
                            installed: output.executable_path.is_some() && version.is_some(),
                            executable_path: output.executable_path,
                            version,
                        }
                    }
                    Err(error) => {
                        tracing::debug!(manager = ?ManagerId::Scoop, error = %error, "detection failed");
                        DetectionInfo::not_found()
                    }
                },
            )),
            AdapterRequest::ListInstalled(_) => {
                let raw = self.source.list_installed()?;
                Ok(AdapterResponse::InstalledPackages(parse_scoop_list(&raw)))
            }
            AdapterRequest::ListUpdates(_) => {
                let raw = self.source.status()?;
                Ok(AdapterResponse::Updates(parse_scoop_status(&raw)))
            }
            AdapterRequest::Search(search) => {
                let raw = self.source.search(&search.query)?;
                Ok(AdapterResponse::SearchResults(parse_scoop_search(&raw)))
            }
            AdapterRequest::Details(details) => {
                let id = details.package.id.as_str();
                validate_package_identifier(ManagerId::Scoop, ManagerAction::Details, id)?;
                let raw = self.source.manifest(id)?;
                let parsed = parse_scoop_manifest(&raw, id, &details.package.source)?;
                Ok(AdapterResponse::Details(Box::new(parsed)))
            }
            AdapterRequest::ListSources => {
                let raw = self.source.list_buckets()?;
                Ok(AdapterResponse::Sources(parse_scoop_buckets(&raw)))
            }
            AdapterRequest::AddSource(change) => {
                validate_package_identifier(
                    ManagerId::Scoop,
                    ManagerAction::AddSource,
                    &change.source.name,
                )?;
                self.source
                    .add_bucket(&change.source.name, &change.source.url)?;
                Ok(AdapterResponse::SourcesChanged)
            }
            AdapterRequest::RemoveSource(change) => {
                validate_package_identifier(
                    ManagerId::Scoop,
                    ManagerAction::RemoveSource,
                    &change.source.name,
                )?;
                self.source.remove_bucket(&change.source.name)?;
                Ok(AdapterResponse::SourcesChanged)
            }
            AdapterRequest::RefreshSources => {
                self.source.update()?;
                Ok(AdapterResponse::SourcesChanged)
            }
        }
    }

    fn operation_request(&self, request: &OperationRequest) -> AdapterResult<ProcessSpawnRequest> {
        let action = request.kind.action();
        ensure_action_supported(self.descriptor(), action)?;
        validate_package_identifier(ManagerId::Scoop, action, &request.package.id)?;
        Ok(self.source.prepare(scoop_operation_request(None, request)))
    }
}

fn scoop_command() -> CommandSpec {
    CommandSpec::new(POWERSHELL_COMMAND).args(SCOOP_PREFIX.iter().copied())
}

pub fn scoop_detect_request(task_id: Option<TaskId>) -> ProcessSpawnRequest {
    scoop_request(
        task_id,
        TaskType::Detection,
        ManagerAction::Detect,
        scoop_command().arg("--version"),
        DETECT_TIMEOUT,
    )
}

pub fn scoop_list_request(task_id: Option<TaskId>) -> ProcessSpawnRequest {
    scoop_request(
        task_id,
        TaskType::Refresh,
        ManagerAction::ListInstalled,
        scoop_command().arg("list"),
        LIST_TIMEOUT,
    )
}

pub fn scoop_status_request(task_id: Option<TaskId>) -> ProcessSpawnRequest {
    scoop_request(
        task_id,
        TaskType::Refresh,
        ManagerAction::ListUpdates,
        scoop_command().arg("status"),
        LIST_TIMEOUT,
    )
}

pub fn scoop_search_request(task_id: Option<TaskId>, query: &str) -> ProcessSpawnRequest {
    scoop_request(
        task_id,
        TaskType::Search,
        ManagerAction::Search,
        CommandSpec::new(SCOOP_SEARCH_COMMAND).arg(query),
        SEARCH_TIMEOUT,
    )
}

pub fn scoop_cat_request(task_id: Option<TaskId>, id: &str) -> ProcessSpawnRequest {
    scoop_request(
        task_id,
        TaskType::Details,
        ManagerAction::Details,
        scoop_command().args(["cat", id]),
        SEARCH_TIMEOUT,
    )
}

pub fn scoop_bucket_list_request(task_id: Option<TaskId>) -> ProcessSpawnRequest {
    scoop_request(
        task_id,
        TaskType::Sources,
        ManagerAction::ListSources,
        scoop_command().args(["bucket", "list"]),
        SOURCE_TIMEOUT,
    )
}

pub fn scoop_bucket_add_request(
    task_id: Option<TaskId>,
    name: &str,
    url: &str,
) -> ProcessSpawnRequest {
    scoop_request(
        task_id,
        TaskType::Sources,
        ManagerAction::AddSource,
        scoop_command().args(["bucket", "add", name, url]),
        SOURCE_TIMEOUT,
    )
}

pub fn scoop_bucket_remove_request(task_id: Option<TaskId>, name: &str) -> ProcessSpawnRequest {
    scoop_request(
        task_id,
        TaskType::Sources,
        ManagerAction::RemoveSource,
        scoop_command().args(["bucket", "rm", name]),
        SOURCE_TIMEOUT,
    )
}

pub fn scoop_update_request(task_id: Option<TaskId>) -> ProcessSpawnRequest {
    scoop_request(
        task_id,
        TaskType::Sources,
        ManagerAction::RefreshSources,
        scoop_command().arg("update"),
        SOURCE_TIMEOUT,
    )
}

pub fn scoop_operation_request(
    task_id: Option<TaskId>,
    request: &OperationRequest,
) -> ProcessSpawnRequest {
    let package = &request.package;
    let options = &request.options;
    let is_global = package.source.starts_with(GLOBAL_SOURCE_PREFIX)
        || options.installation_scope == Some(InstallationScope::Machine);

    let mut command = scoop_command();
    command = match request.kind {
        OperationKind::Install => {
            let target = match scoop_bucket(&package.source) {
                Some(bucket) => format!("{bucket}/{}", package.id),
                None => package.id.clone(),
            };
            command.args(["install".to_string(), target])
        }
        OperationKind::Update => command.args(["update", package.id.as_str()]),
        OperationKind::Uninstall => command.args(["uninstall", package.id.as_str()]),
    };

    if is_global {
        command = command.arg("--global");
    }
    command = command.args(options.custom_parameters.iter().cloned());

    match request.kind {
        OperationKind::Uninstall => {
            if options.remove_data_on_uninstall {
                command = command.arg("--purge");
            }
        }
        OperationKind::Install | OperationKind::Update => {
            if options.skip_hash_check {
                command = command.arg("--skip");
            }
        }
    }

    if request.kind == OperationKind::Install
        && let Some(architecture) = options.requested_architecture()
        && let Some(flag) = scoop_architecture(architecture)
    {
        command = command.args(["--arch", flag]);
    }

    // Global apps live under %ProgramData% and need an elevated shell.
    scoop_request(
        task_id,
        request.kind.task_type(),
        request.kind.action(),
        command,
        LIST_TIMEOUT,
    )
    .requires_elevation(is_global)
    .without_timeout()
}

fn scoop_architecture(architecture: &str) -> Option<&'static str> {
    match architecture.to_ascii_lowercase().as_str() {
        "x64" => Some("64bit"),
        "x86" => Some("32bit"),
        "arm64" => Some("arm64"),
        _ => None,
    }
}

/// Bucket part of a `Scoop: <bucket>` source, when it names a real bucket.
fn scoop_bucket(source: &str) -> Option<&str> {
    let (_, bucket) = source.split_once(':')?;
    let bucket = bucket.trim();
    let usable = !bucket.is_empty()
        && bucket != UNKNOWN_SOURCE
        && !bucket.contains("...")
        && !bucket.contains('\\')
        && !bucket.contains('/');
    usable.then_some(bucket)
}

fn scoop_request(
    task_id: Option<TaskId>,
    task_type: TaskType,
    action: ManagerAction,
    command: CommandSpec,
    timeout: Duration,
) -> ProcessSpawnRequest {
    let mut request = ProcessSpawnRequest::new(ManagerId::Scoop, task_type, action, command)
        .requires_elevation(false)
        .timeout(timeout);
    if let Some(task_id) = task_id {
        request = request.task_id(task_id);
    }
    request
}

pub(crate) fn parse_scoop_version(output: &str) -> Option<String> {
    // Example:
    // Current Scoop version:
    // v0.4.1 - Released at 2024-04-01
    let lines = final_lines(output);
    let mut after_header = false;
    for line in &lines {
        if line.starts_with("Current Scoop version") {
            after_header = true;
            continue;
        }
        if let Some(rest) = line.strip_prefix('v')
            && rest.starts_with(|c: char| c.is_ascii_digit())
        {
            return rest.split_whitespace().next().map(str::to_string);
        }
        if after_header {
            return line.split_whitespace().next().map(str::to_string);
        }
    }
    None
}

fn scoop_source(bucket: &str, global: bool) -> String {
    if global {
        format!("{GLOBAL_SOURCE_PREFIX}: {}", bucket.trim())
    } else {
        qualified_source(ManagerId::Scoop, bucket)
    }
}

pub(crate) fn parse_scoop_list(raw: &str) -> Vec<Package> {
    let markers = markers_for(ManagerId::Scoop);
    TableScanner::new(ManagerId::Scoop)
        .min_fields(3)
        .rows_from_output(raw)
        .into_iter()
        .filter_map(|fields| {
            let id = fields[0].as_str();
            let version = fields[1].as_str();
            if markers.rejects(id, id, version) {
                return None;
            }
            let global = fields.iter().skip(3).any(|field| field == "Global");
            Some(Package::new(
                ManagerId::Scoop,
                format_package_id_as_name(id),
                id,
                version,
                scoop_source(&fields[2], global),
            ))
        })
        .collect()
}

/// `scoop status` rows carry no bucket; the source is left unknown for the
/// aggregator to resolve against the installed list.
pub(crate) fn parse_scoop_status(raw: &str) -> Vec<UpgradablePackage> {
    let markers = markers_for(ManagerId::Scoop);
    TableScanner::new(ManagerId::Scoop)
        .min_fields(3)
        .rows_from_output(raw)
        .into_iter()
        .filter_map(|fields| {
            let id = fields[0].as_str();
            let installed = fields[1].as_str();
            let latest = fields[2].as_str();
            let held = fields.windows(2).any(|pair| pair[0] == "Held" && pair[1] == "package");
            if held
                || markers.rejects(id, id, installed)
                || markers.blacklist_versions.contains(&latest)
            {
                return None;
            }
            Some(UpgradablePackage::new(
                Package::new(
                    ManagerId::Scoop,
                    format_package_id_as_name(id),
                    id,
                    installed,
                    qualified_source(ManagerId::Scoop, UNKNOWN_SOURCE),
                ),
                latest,
            ))
        })
        .collect()
}

/// `scoop-search` groups results under `'bucket' bucket:` headings.
pub(crate) fn parse_scoop_search(raw: &str) -> Vec<Package> {
    let markers = markers_for(ManagerId::Scoop);
    let mut bucket: Option<String> = None;
    let mut packages = Vec::new();

    for line in final_lines(raw) {
        if line.starts_with('\'') {
            bucket = line
                .split_whitespace()
                .next()
                .map(|name| name.trim_matches('\'').to_string());
            continue;
        }
        let Some(bucket) = bucket.as_deref() else {
            continue;
        };
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 2 {
            tracing::debug!(manager = ?ManagerId::Scoop, line = %line, "dropping malformed row");
            continue;
        }
        let id = fields[0];
        let version = fields[1].trim_start_matches('(').trim_end_matches(')');
        if markers.rejects(id, id, version) {
            continue;
        }
        packages.push(Package::new(
            ManagerId::Scoop,
            format_package_id_as_name(id),
            id,
            version,
            qualified_source(ManagerId::Scoop, bucket),
        ));
    }

    packages
}

pub(crate) fn parse_scoop_buckets(raw: &str) -> Vec<ManagerSource> {
    TableScanner::new(ManagerId::Scoop)
        .rows_from_output(raw)
        .into_iter()
        .map(|fields| {
            let url = fields
                .iter()
                .skip(1)
                .find(|field| field.starts_with("http://") || field.starts_with("https://"))
                .cloned()
                .unwrap_or_default();
            ManagerSource {
                manager: ManagerId::Scoop,
                name: fields[0].clone(),
                url,
            }
        })
        .collect()
}

pub(crate) fn parse_scoop_manifest(
    raw: &str,
    id: &str,
    source: &str,
) -> AdapterResult<PackageDetails> {
    let manifest: Value = serde_json::from_str(raw.trim())
        .map_err(|error| parse_error(&format!("invalid scoop manifest JSON: {error}")))?;
    let mut details = PackageDetails::default();

    set_if_present(&mut details.description, &joined_text(&manifest["description"]));
    set_if_present(&mut details.release_notes, &joined_text(&manifest["notes"]));

    if let Some(homepage) = manifest["homepage"].as_str() {
        set_if_present(&mut details.homepage_url, homepage);
        set_if_present(&mut details.author, &author_from_homepage(homepage));
    }

    match &manifest["license"] {
        Value::String(license) => set_if_present(&mut details.license, license),
        Value::Object(license) => {
            set_if_present(
                &mut details.license,
                license.get("identifier").and_then(Value::as_str).unwrap_or_default(),
            );
            set_if_present(
                &mut details.license_url,
                license.get("url").and_then(Value::as_str).unwrap_or_default(),
            );
        }
        _ => {}
    }

    let (url, hash) = match (&manifest["url"], &manifest["architecture"]) {
        (Value::Null, Value::Object(architectures)) => {
            let preferred = architectures
                .get("64bit")
                .or_else(|| architectures.values().next())
                .cloned()
                .unwrap_or(Value::Null);
            (first_text(&preferred["url"]), first_text(&preferred["hash"]))
        }
        (url, _) => (first_text(url), first_text(&manifest["hash"])),
    };
    set_if_present(&mut details.installer_url, &url);
    set_if_present(&mut details.installer_hash, &hash);
    details.installer_type = if manifest["innosetup"].as_bool() == Some(true) {
        "Inno Setup (extracted)".to_string()
    } else {
        "Scoop package".to_string()
    };

    if let Value::Object(architectures) = &manifest["architecture"] {
        details.architectures = architectures.keys().cloned().collect();
    }
    if let Some(version) = manifest["version"].as_str() {
        details.versions = vec![version.to_string()];
    }
    details.scopes = vec!["user".to_string(), "global".to_string()];
    if let Some(url) = bucket_manifest_url(source, id) {
        details.manifest_url = url;
    }

    Ok(details)
}

fn joined_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

fn first_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Array(items) => items
            .first()
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    }
}

fn author_from_homepage(homepage: &str) -> String {
    if let Some(rest) = homepage.strip_prefix("https://github.com/") {
        return rest.split('/').next().unwrap_or_default().to_string();
    }
    let host = homepage
        .split("://")
        .nth(1)
        .unwrap_or(homepage)
        .split('/')
        .next()
        .unwrap_or_default();
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() >= 2 {
        labels[labels.len() - 2].to_string()
    } else {
        host.to_string()
    }
}

fn bucket_manifest_url(source: &str, id: &str) -> Option<String> {
    let repository = match scoop_bucket(source)? {
        "main" => "ScoopInstaller/Main",
        "extras" => "ScoopInstaller/Extras",
        "versions" => "ScoopInstaller/Versions",
        "java" => "ScoopInstaller/Java",
        "php" => "ScoopInstaller/PHP",
        "nonportable" => "ScoopInstaller/Nonportable",
        "nerd-fonts" => "matthewjberger/scoop-nerd-fonts",
        _ => return None,
    };
    Some(format!(
        "https://github.com/{repository}/blob/master/bucket/{id}.json"
    ))
}

fn parse_error(message: &str) -> CoreError {
    CoreError {
        manager: Some(ManagerId::Scoop),
        task: None,
        action: None,
        kind: CoreErrorKind::ParseFailure,
        message: message.to_string(),
    }
}
