use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::adapters::manager::{
    AdapterRequest, AdapterResponse, AdapterResult, DetectOutput, ManagerAdapter,
    OperationRequest, ensure_action_supported, ensure_request_supported,
    validate_package_identifier,
};
use crate::execution::{CommandSpec, ProcessSpawnRequest};
use crate::models::package::{qualified_source, set_if_present};
use crate::models::{
    Capability, CoreError, CoreErrorKind, DetectionInfo, InstallationScope, ManagerAction,
    ManagerCapabilities, ManagerDescriptor, ManagerId, OperationKind, Package, PackageDetails,
    TaskId, TaskType, UpgradablePackage,
};
use crate::parsing::format_package_id_as_name;

const NPM_CAPABILITIES: &[Capability] = &[
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

const NPM_FEATURES: ManagerCapabilities = ManagerCapabilities {
    can_run_as_admin: true,
    supports_custom_versions: true,
    supports_custom_scopes: true,
    scopes: &[InstallationScope::User, InstallationScope::Machine],
    ..ManagerCapabilities::NONE
};

const NPM_DESCRIPTOR: ManagerDescriptor = ManagerDescriptor {
    id: ManagerId::Npm,
    display_name: "Npm",
    capabilities: NPM_CAPABILITIES,
    features: NPM_FEATURES,
};

pub(crate) const NPM_COMMAND: &str = "npm";
const GLOBAL_SOURCE: &str = "global";
const DETECT_TIMEOUT: Duration = Duration::from_secs(10);
const LIST_TIMEOUT: Duration = Duration::from_secs(60);
const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Which `node_modules` tree a listing covers: the user's home directory or
/// the global prefix.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NpmScope {
    Local,
    Global,
}

impl NpmScope {
    fn source(self) -> String {
        match self {
            Self::Local => ManagerId::Npm.display_name().to_string(),
            Self::Global => qualified_source(ManagerId::Npm, GLOBAL_SOURCE),
        }
    }
}

pub trait NpmSource: Send + Sync {
    fn detect(&self) -> AdapterResult<DetectOutput>;
    fn list_installed(&self, scope: NpmScope) -> AdapterResult<String>;
    fn list_outdated(&self, scope: NpmScope) -> AdapterResult<String>;
    fn search(&self, query: &str) -> AdapterResult<String>;
    fn info(&self, id: &str) -> AdapterResult<String>;

    fn prepare(&self, request: ProcessSpawnRequest) -> ProcessSpawnRequest {
        request
    }
}

pub struct NpmAdapter<S: NpmSource> {
    source: S,
}

impl<S: NpmSource> NpmAdapter<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

impl<S: NpmSource> ManagerAdapter for NpmAdapter<S> {
    fn descriptor(&self) -> &ManagerDescriptor {
        &NPM_DESCRIPTOR
    }

    fn execute(&self, request: AdapterRequest) -> AdapterResult<AdapterResponse> {
        ensure_request_supported(self.descriptor(), &request)?;

        match request {
            AdapterRequest::Detect(_) => Ok(AdapterResponse::Detection(
                match self.source.detect() {
                    Ok(output) => {
                        let version = parse_npm_version(&output.version_output);
                        DetectionInfo {
                            installed: output.executable_path.is_some() && version.is_some(),
                            executable_path: output.executable_path,
                            version,
                        }
                    }
                    Err(error) => {
                        tracing::debug!(manager = ?ManagerId::Npm, error = %error, "detection failed");
                        DetectionInfo::not_found()
                    }
                },
            )),
            AdapterRequest::ListInstalled(_) => {
                let mut packages = Vec::new();
                for scope in [NpmScope::Local, NpmScope::Global] {
                    let raw = self.source.list_installed(scope)?;
                    packages.extend(parse_npm_list_installed(&raw, scope)?);
                }
                Ok(AdapterResponse::InstalledPackages(packages))
            }
            AdapterRequest::ListUpdates(_) => {
                let mut updates = Vec::new();
                for scope in [NpmScope::Local, NpmScope::Global] {
                    let raw = self.source.list_outdated(scope)?;
                    updates.extend(parse_npm_outdated(&raw, scope)?);
                }
                Ok(AdapterResponse::Updates(updates))
            }
            AdapterRequest::Search(search) => {
                let raw = self.source.search(&search.query)?;
                Ok(AdapterResponse::SearchResults(parse_npm_search(&raw)?))
            }
            AdapterRequest::Details(details) => {
                let id = details.package.id.as_str();
                validate_package_identifier(ManagerId::Npm, ManagerAction::Details, id)?;
                let raw = self.source.info(id)?;
                Ok(AdapterResponse::Details(Box::new(parse_npm_info(&raw, id)?)))
            }
            // The registry comes from .npmrc; there is nothing to manage here.
            AdapterRequest::ListSources => Ok(AdapterResponse::Sources(Vec::new())),
            AdapterRequest::AddSource(_)
            | AdapterRequest::RemoveSource(_)
            | AdapterRequest::RefreshSources => Ok(AdapterResponse::SourcesChanged),
        }
    }

    fn operation_request(&self, request: &OperationRequest) -> AdapterResult<ProcessSpawnRequest> {
        let action = request.kind.action();
        ensure_action_supported(self.descriptor(), action)?;
        validate_package_identifier(ManagerId::Npm, action, &request.package.id)?;
        Ok(self.source.prepare(npm_operation_request(None, request)))
    }
}

fn scope_args(scope: NpmScope) -> &'static [&'static str] {
    match scope {
        NpmScope::Local => &[],
        NpmScope::Global => &["--global"],
    }
}

pub fn npm_detect_request(task_id: Option<TaskId>) -> ProcessSpawnRequest {
    npm_request(
        task_id,
        TaskType::Detection,
        ManagerAction::Detect,
        CommandSpec::new(NPM_COMMAND).arg("--version"),
        DETECT_TIMEOUT,
    )
}

pub fn npm_list_installed_request(task_id: Option<TaskId>, scope: NpmScope) -> ProcessSpawnRequest {
    npm_request(
        task_id,
        TaskType::Refresh,
        ManagerAction::ListInstalled,
        CommandSpec::new(NPM_COMMAND)
            .args(["list", "--depth=0", "--json"])
            .args(scope_args(scope).iter().copied()),
        LIST_TIMEOUT,
    )
}

pub fn npm_list_outdated_request(task_id: Option<TaskId>, scope: NpmScope) -> ProcessSpawnRequest {
    npm_request(
        task_id,
        TaskType::Refresh,
        ManagerAction::ListUpdates,
        CommandSpec::new(NPM_COMMAND)
            .args(["outdated", "--json"])
            .args(scope_args(scope).iter().copied()),
        LIST_TIMEOUT,
    )
}

pub fn npm_search_request(task_id: Option<TaskId>, query: &str) -> ProcessSpawnRequest {
    npm_request(
        task_id,
        TaskType::Search,
        ManagerAction::Search,
        CommandSpec::new(NPM_COMMAND)
            .args(["search", "--json", "--searchlimit=50"])
            .arg(query),
        SEARCH_TIMEOUT,
    )
}

pub fn npm_info_request(task_id: Option<TaskId>, id: &str) -> ProcessSpawnRequest {
    npm_request(
        task_id,
        TaskType::Details,
        ManagerAction::Details,
        CommandSpec::new(NPM_COMMAND).args(["info", id, "--json"]),
        SEARCH_TIMEOUT,
    )
}

/// Global installs are selected by the machine scope or by updating and
/// removing a package that was listed from the global tree.
pub fn npm_operation_request(
    task_id: Option<TaskId>,
    request: &OperationRequest,
) -> ProcessSpawnRequest {
    let options = &request.options;
    let id = request.package.id.as_str();
    let global = options.installation_scope == Some(InstallationScope::Machine)
        || (request.kind != OperationKind::Install && is_global_source(&request.package.source));

    let mut command = CommandSpec::new(NPM_COMMAND);
    command = match request.kind {
        OperationKind::Install => command.arg("install").arg(match options.requested_version() {
            Some(version) => format!("{id}@{version}"),
            None => id.to_string(),
        }),
        OperationKind::Update => command.arg("install").arg(format!(
            "{id}@{}",
            options.requested_version().unwrap_or("latest")
        )),
        OperationKind::Uninstall => command.args(["uninstall", id]),
    };
    if global {
        command = command.arg("--global");
    }
    command = command.args(options.custom_parameters.iter().cloned());

    npm_request(
        task_id,
        request.kind.task_type(),
        request.kind.action(),
        command,
        LIST_TIMEOUT,
    )
    .without_timeout()
}

fn is_global_source(source: &str) -> bool {
    source
        .split_once(':')
        .is_some_and(|(_, name)| name.trim() == GLOBAL_SOURCE)
}

fn npm_request(
    task_id: Option<TaskId>,
    task_type: TaskType,
    action: ManagerAction,
    command: CommandSpec,
    timeout: Duration,
) -> ProcessSpawnRequest {
    let mut request = ProcessSpawnRequest::new(ManagerId::Npm, task_type, action, command)
        .requires_elevation(false)
        .timeout(timeout);
    if let Some(task_id) = task_id {
        request = request.task_id(task_id);
    }
    request
}

fn npm_package(id: &str, version: &str, scope: NpmScope) -> Package {
    Package::new(
        ManagerId::Npm,
        format_package_id_as_name(id),
        id,
        version,
        scope.source(),
    )
}

pub(crate) fn parse_npm_version(output: &str) -> Option<String> {
    let line = output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())?;
    let version = line.split_whitespace().next()?.trim();
    if version.is_empty() || !version.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    Some(version.to_owned())
}

pub(crate) fn parse_npm_list_installed(
    output: &str,
    scope: NpmScope,
) -> AdapterResult<Vec<Package>> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let json: Value = serde_json::from_str(trimmed)
        .map_err(|e| parse_error(&format!("invalid npm list JSON: {e}")))?;

    let mut dependencies = BTreeMap::new();
    if let Some(map) = json.get("dependencies").and_then(Value::as_object) {
        for (name, payload) in map {
            let version = if let Some(version) = payload.get("version").and_then(Value::as_str) {
                Some(version.trim().to_string())
            } else {
                payload.as_str().map(|version| version.trim().to_string())
            };

            if let Some(version) = version
                && !version.is_empty()
            {
                dependencies.insert(name.clone(), version);
            }
        }
    }

    Ok(dependencies
        .into_iter()
        .map(|(name, version)| npm_package(&name, &version, scope))
        .collect())
}

/// `npm outdated` exits 1 whenever something is outdated and prints `{}`
/// when nothing is.
pub(crate) fn parse_npm_outdated(
    output: &str,
    scope: NpmScope,
) -> AdapterResult<Vec<UpgradablePackage>> {
    let trimmed = output.trim();
    if trimmed.is_empty() || trimmed == "{}" {
        return Ok(Vec::new());
    }

    let json: Value = serde_json::from_str(trimmed)
        .map_err(|e| parse_error(&format!("invalid npm outdated JSON: {e}")))?;

    let Some(map) = json.as_object() else {
        return Ok(Vec::new());
    };

    let text = |payload: &Value, key: &str| {
        payload
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    let mut updates: Vec<UpgradablePackage> = map
        .iter()
        .filter_map(|(name, payload)| {
            // Declared but never installed.
            let current = text(payload, "current")?;
            let latest = text(payload, "latest").or_else(|| text(payload, "wanted"))?;
            Some(UpgradablePackage::new(
                npm_package(name, &current, scope),
                latest,
            ))
        })
        .collect();

    updates.sort_by(|a, b| a.package.id.cmp(&b.package.id));
    Ok(updates)
}

#[derive(Debug, Deserialize)]
struct NpmSearchEntry {
    name: Option<String>,
    version: Option<String>,
}

/// Older npm releases print one JSON object per line instead of an array.
pub(crate) fn parse_npm_search(output: &str) -> AdapterResult<Vec<Package>> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let entries: Vec<NpmSearchEntry> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed)
            .map_err(|e| parse_error(&format!("invalid npm search JSON: {e}")))?
    } else {
        trimmed
            .lines()
            .map(str::trim)
            .filter(|line| line.starts_with('{'))
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(entry) => Some(entry),
                Err(error) => {
                    tracing::debug!(manager = ?ManagerId::Npm, line, error = %error, "skipping unparsable search line");
                    None
                }
            })
            .collect()
    };

    Ok(entries
        .into_iter()
        .filter_map(|entry| {
            let name = entry.name?.trim().to_string();
            let version = entry.version?.trim().to_string();
            (!name.is_empty()).then(|| npm_package(&name, &version, NpmScope::Local))
        })
        .collect())
}

pub(crate) fn parse_npm_info(output: &str, id: &str) -> AdapterResult<PackageDetails> {
    let json: Value = serde_json::from_str(output.trim())
        .map_err(|e| parse_error(&format!("invalid npm info JSON: {e}")))?;

    let text = |value: &Value| value.as_str().unwrap_or_default().trim().to_string();
    let mut details = PackageDetails {
        installer_type: "Tarball".to_string(),
        manifest_url: format!("https://www.npmjs.com/package/{id}"),
        release_notes_url: format!("https://www.npmjs.com/package/{id}?activeTab=versions"),
        ..PackageDetails::default()
    };

    set_if_present(&mut details.description, &text(&json["description"]));
    set_if_present(&mut details.homepage_url, &text(&json["homepage"]));
    set_if_present(&mut details.license, &person_or_text(&json["license"], "type"));
    set_if_present(&mut details.author, &person_or_text(&json["author"], "name"));
    if let Some(maintainer) = json["maintainers"].as_array().and_then(|m| m.first()) {
        set_if_present(&mut details.publisher, &person_or_text(maintainer, "name"));
    }

    let dist = &json["dist"];
    set_if_present(&mut details.installer_url, &text(&dist["tarball"]));
    set_if_present(&mut details.installer_hash, &text(&dist["integrity"]));
    if let Some(size) = dist["unpackedSize"].as_u64() {
        details.installer_size = size;
    }

    let version = text(&json["version"]);
    let published = if version.is_empty() {
        text(&json["time"]["modified"])
    } else {
        text(&json["time"][version.as_str()])
    };
    set_if_present(
        &mut details.update_date,
        published.split('T').next().unwrap_or_default(),
    );

    details.tags = json["keywords"]
        .as_array()
        .map(|keywords| {
            keywords
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    // Newest first.
    details.versions = json["versions"]
        .as_array()
        .map(|versions| {
            versions
                .iter()
                .rev()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(details)
}

/// npm metadata stores people and licenses either as plain strings
/// (`"Jane <jane@example.com>"`) or as objects.
fn person_or_text(value: &Value, key: &str) -> String {
    let raw = match value {
        Value::String(text) => text.as_str(),
        Value::Object(map) => map.get(key).and_then(Value::as_str).unwrap_or_default(),
        _ => "",
    };
    raw.split('<').next().unwrap_or_default().trim().to_string()
}

fn parse_error(message: &str) -> CoreError {
    CoreError {
        manager: Some(ManagerId::Npm),
        task: None,
        action: None,
        kind: CoreErrorKind::ParseFailure,
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Mutex;

    use crate::adapters::manager::{
        AdapterRequest, AdapterResponse, AdapterResult, DetectOutput, DetectRequest,
        ListInstalledRequest, ListUpdatesRequest, ManagerAdapter, OperationRequest,
    };
    use crate::models::{
        CoreErrorKind, InstallationOptions, InstallationScope, ManagerId, OperationKind, Package,
    };

    use super::{
        NpmAdapter, NpmScope, NpmSource, npm_operation_request, parse_npm_info,
        parse_npm_list_installed, parse_npm_outdated, parse_npm_search, parse_npm_version,
    };

    const VERSION_FIXTURE: &str = include_str!("../../tests/fixtures/npm/version.txt");
    const LIST_LOCAL_FIXTURE: &str = include_str!("../../tests/fixtures/npm/list_local.json");
    const LIST_GLOBAL_FIXTURE: &str = include_str!("../../tests/fixtures/npm/list_global.json");
    const OUTDATED_FIXTURE: &str = include_str!("../../tests/fixtures/npm/outdated_global.json");
    const SEARCH_FIXTURE: &str = include_str!("../../tests/fixtures/npm/search_array.json");
    const SEARCH_NDJSON_FIXTURE: &str =
        include_str!("../../tests/fixtures/npm/search_ndjson.jsonl");
    const INFO_FIXTURE: &str = include_str!("../../tests/fixtures/npm/info.json");

    #[test]
    fn parses_npm_version_from_fixture() {
        assert_eq!(parse_npm_version(VERSION_FIXTURE), Some("10.5.0".to_string()));
        assert_eq!(parse_npm_version("npm ERR! something"), None);
    }

    #[test]
    fn global_and_local_trees_carry_distinct_sources() {
        let global = parse_npm_list_installed(LIST_GLOBAL_FIXTURE, NpmScope::Global)
            .expect("parse global");
        let ids: Vec<&str> = global.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["@angular/cli", "npm", "typescript"]);
        assert!(global.iter().all(|p| p.source == "Npm: global"));

        let local =
            parse_npm_list_installed(LIST_LOCAL_FIXTURE, NpmScope::Local).expect("parse local");
        assert_eq!(local.len(), 1);
        assert_eq!(local[0].source, "Npm");
        assert_eq!(local[0].name, "Left Pad");
    }

    #[test]
    fn outdated_skips_uninstalled_entries() {
        let updates = parse_npm_outdated(OUTDATED_FIXTURE, NpmScope::Global).expect("parse");
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].package.id, "npm");
        assert_eq!(updates[0].installed_version(), "10.5.0");
        assert_eq!(updates[0].new_version, "10.8.1");
        assert_eq!(updates[1].package.id, "typescript");
        assert!(parse_npm_outdated("{}", NpmScope::Local).expect("empty").is_empty());
    }

    #[test]
    fn parses_search_results_in_both_formats() {
        let array = parse_npm_search(SEARCH_FIXTURE).expect("array");
        assert_eq!(array.len(), 2);
        assert_eq!(array[0].id, "typescript");
        assert_eq!(array[0].version, "5.4.5");

        let lines = parse_npm_search(SEARCH_NDJSON_FIXTURE).expect("ndjson");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].id, "ts-node");
    }

    #[test]
    fn invalid_list_is_a_parse_failure() {
        let error =
            parse_npm_list_installed("{not json", NpmScope::Local).expect_err("must fail");
        assert_eq!(error.kind, CoreErrorKind::ParseFailure);
    }

    #[test]
    fn parses_info_document() {
        let details = parse_npm_info(INFO_FIXTURE, "typescript").expect("info");
        assert_eq!(details.description, "TypeScript is a language for application scale JavaScript development");
        assert_eq!(details.license, "Apache-2.0");
        assert_eq!(details.author, "Microsoft Corp.");
        assert_eq!(details.publisher, "typescript-bot");
        assert_eq!(details.installer_size, 32_000_000);
        assert_eq!(details.update_date, "2024-04-17");
        assert_eq!(details.versions, vec!["5.4.5", "5.4.4", "5.4.3"]);
        assert_eq!(details.manifest_url, "https://www.npmjs.com/package/typescript");
        assert_eq!(details.tags, vec!["TypeScript", "Microsoft"]);
    }

    fn operation(kind: OperationKind, source: &str, options: InstallationOptions) -> Vec<String> {
        npm_operation_request(
            None,
            &OperationRequest {
                kind,
                package: Package::new(ManagerId::Npm, "Typescript", "typescript", "5.3.3", source),
                options,
            },
        )
        .command
        .args
    }

    #[test]
    fn operation_requests_follow_scope_and_version() {
        assert_eq!(
            operation(
                OperationKind::Install,
                "Npm",
                InstallationOptions {
                    version: Some("5.4.0".to_string()),
                    installation_scope: Some(InstallationScope::Machine),
                    ..InstallationOptions::default()
                }
            ),
            vec!["install", "typescript@5.4.0", "--global"]
        );
        assert_eq!(
            operation(OperationKind::Update, "Npm: global", InstallationOptions::default()),
            vec!["install", "typescript@latest", "--global"]
        );
        assert_eq!(
            operation(OperationKind::Uninstall, "Npm", InstallationOptions::default()),
            vec!["uninstall", "typescript"]
        );
    }

    #[derive(Default)]
    struct StubNpmSource {
        calls: Mutex<Vec<String>>,
    }

    impl NpmSource for StubNpmSource {
        fn detect(&self) -> AdapterResult<DetectOutput> {
            Ok(DetectOutput {
                executable_path: Some(PathBuf::from("/usr/local/bin/npm")),
                version_output: VERSION_FIXTURE.to_string(),
            })
        }

        fn list_installed(&self, scope: NpmScope) -> AdapterResult<String> {
            self.calls
                .lock()
                .expect("calls lock")
                .push(format!("list {scope:?}"));
            Ok(match scope {
                NpmScope::Local => LIST_LOCAL_FIXTURE.to_string(),
                NpmScope::Global => LIST_GLOBAL_FIXTURE.to_string(),
            })
        }

        fn list_outdated(&self, scope: NpmScope) -> AdapterResult<String> {
            Ok(match scope {
                NpmScope::Local => "{}".to_string(),
                NpmScope::Global => OUTDATED_FIXTURE.to_string(),
            })
        }

        fn search(&self, _query: &str) -> AdapterResult<String> {
            Ok(SEARCH_FIXTURE.to_string())
        }

        fn info(&self, _id: &str) -> AdapterResult<String> {
            Ok(INFO_FIXTURE.to_string())
        }
    }

    #[test]
    fn installed_listing_covers_both_trees() {
        let adapter = NpmAdapter::new(StubNpmSource::default());
        match adapter.execute(AdapterRequest::ListInstalled(ListInstalledRequest)) {
            Ok(AdapterResponse::InstalledPackages(packages)) => assert_eq!(packages.len(), 4),
            other => panic!("unexpected response: {other:?}"),
        }
        assert_eq!(
            *adapter.source.calls.lock().expect("calls lock"),
            vec!["list Local", "list Global"]
        );

        match adapter.execute(AdapterRequest::ListUpdates(ListUpdatesRequest)) {
            Ok(AdapterResponse::Updates(updates)) => assert_eq!(updates.len(), 2),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn execute_detect_returns_detection_response() {
        let adapter = NpmAdapter::new(StubNpmSource::default());
        match adapter.execute(AdapterRequest::Detect(DetectRequest)) {
            Ok(AdapterResponse::Detection(info)) => {
                assert!(info.installed);
                assert_eq!(info.version.as_deref(), Some("10.5.0"));
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }
}
