use std::path::PathBuf;

use crate::execution::ProcessSpawnRequest;
use crate::models::{
    ActionSafety, CoreError, CoreErrorKind, DetectionInfo, InstallationOptions, ManagerAction,
    ManagerDescriptor, ManagerId, ManagerSource, OperationKind, Package, PackageDetails,
    UpgradablePackage,
};

pub type AdapterResult<T> = Result<T, CoreError>;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DetectRequest;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ListInstalledRequest;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ListUpdatesRequest;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SearchRequest {
    pub query: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DetailsRequest {
    pub package: Package,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SourceRequest {
    pub source: ManagerSource,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AdapterRequest {
    Detect(DetectRequest),
    ListInstalled(ListInstalledRequest),
    ListUpdates(ListUpdatesRequest),
    Search(SearchRequest),
    Details(DetailsRequest),
    ListSources,
    AddSource(SourceRequest),
    RemoveSource(SourceRequest),
    RefreshSources,
}

impl AdapterRequest {
    pub fn action(&self) -> ManagerAction {
        match self {
            Self::Detect(_) => ManagerAction::Detect,
            Self::ListInstalled(_) => ManagerAction::ListInstalled,
            Self::ListUpdates(_) => ManagerAction::ListUpdates,
            Self::Search(_) => ManagerAction::Search,
            Self::Details(_) => ManagerAction::Details,
            Self::ListSources => ManagerAction::ListSources,
            Self::AddSource(_) => ManagerAction::AddSource,
            Self::RemoveSource(_) => ManagerAction::RemoveSource,
            Self::RefreshSources => ManagerAction::RefreshSources,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AdapterResponse {
    Detection(DetectionInfo),
    InstalledPackages(Vec<Package>),
    Updates(Vec<UpgradablePackage>),
    SearchResults(Vec<Package>),
    Details(Box<PackageDetails>),
    Sources(Vec<ManagerSource>),
    SourcesChanged,
}

/// A mutating operation handed to the installation coordinator.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OperationRequest {
    pub kind: OperationKind,
    pub package: Package,
    pub options: InstallationOptions,
}

/// Raw output of a version probe.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DetectOutput {
    pub executable_path: Option<PathBuf>,
    pub version_output: String,
}

pub trait ManagerAdapter: Send + Sync {
    fn descriptor(&self) -> &ManagerDescriptor;

    fn action_safety(&self, action: ManagerAction) -> ActionSafety {
        action.safety()
    }

    /// Runs a read-only or source-management request to completion.
    fn execute(&self, request: AdapterRequest) -> AdapterResult<AdapterResponse>;

    /// Builds the command line for an install, update or uninstall. The
    /// coordinator spawns it, streams its output and classifies the outcome.
    fn operation_request(&self, request: &OperationRequest) -> AdapterResult<ProcessSpawnRequest>;
}

pub fn ensure_action_supported(
    descriptor: &ManagerDescriptor,
    action: ManagerAction,
) -> AdapterResult<()> {
    if descriptor.supports(action.required_capability()) {
        return Ok(());
    }
    Err(CoreError {
        manager: Some(descriptor.id),
        task: None,
        action: Some(action),
        kind: CoreErrorKind::UnsupportedCapability,
        message: format!(
            "{} does not support {:?}",
            descriptor.display_name, action
        ),
    })
}

pub fn ensure_request_supported(
    descriptor: &ManagerDescriptor,
    request: &AdapterRequest,
) -> AdapterResult<()> {
    ensure_action_supported(descriptor, request.action())
}

pub fn execute_with_capability_check(
    adapter: &dyn ManagerAdapter,
    request: AdapterRequest,
) -> AdapterResult<AdapterResponse> {
    ensure_request_supported(adapter.descriptor(), &request)?;
    adapter.execute(request)
}

/// Rejects identifiers that would be read as a flag or break argument
/// boundaries.
pub fn validate_package_identifier(
    manager: ManagerId,
    action: ManagerAction,
    identifier: &str,
) -> AdapterResult<()> {
    let trimmed = identifier.trim();
    let invalid = trimmed.is_empty()
        || trimmed.starts_with('-')
        || trimmed
            .chars()
            .any(|c| c.is_control() || matches!(c, '"' | '`' | ';' | '&' | '|' | '<' | '>'));
    if invalid {
        return Err(CoreError {
            manager: Some(manager),
            task: None,
            action: Some(action),
            kind: CoreErrorKind::InvalidInput,
            message: format!("invalid package identifier '{identifier}'"),
        });
    }
    Ok(())
}
