use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::models::{InstallationOptions, InstallationScope};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum ManagerId {
    Winget,
    Scoop,
    Chocolatey,
    Pip,
    Npm,
    DotnetTool,
    PowerShell,
}

impl ManagerId {
    pub const ALL: [ManagerId; 7] = [
        ManagerId::Winget,
        ManagerId::Scoop,
        ManagerId::Chocolatey,
        ManagerId::Pip,
        ManagerId::Npm,
        ManagerId::DotnetTool,
        ManagerId::PowerShell,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Winget => "Winget",
            Self::Scoop => "Scoop",
            Self::Chocolatey => "Chocolatey",
            Self::Pip => "Pip",
            Self::Npm => "Npm",
            Self::DotnetTool => ".NET Tool",
            Self::PowerShell => "PowerShell",
        }
    }

    /// Display name with spaces and dots removed, used to key persisted files.
    pub fn storage_key(self) -> String {
        self.display_name()
            .chars()
            .filter(|c| *c != ' ' && *c != '.')
            .collect()
    }

    pub fn from_display_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|manager| manager.display_name().eq_ignore_ascii_case(name))
    }
}

/// Operations a manager adapter can be asked to perform.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
pub enum Capability {
    Detect,
    Search,
    ListInstalled,
    ListUpdates,
    Details,
    Install,
    Update,
    Uninstall,
    Sources,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
pub enum ManagerAction {
    Detect,
    Search,
    ListInstalled,
    ListUpdates,
    Details,
    ListSources,
    AddSource,
    RemoveSource,
    RefreshSources,
    Install,
    Update,
    Uninstall,
}

impl ManagerAction {
    pub fn safety(self) -> ActionSafety {
        match self {
            Self::Detect
            | Self::Search
            | Self::ListInstalled
            | Self::ListUpdates
            | Self::Details
            | Self::ListSources => ActionSafety::ReadOnly,
            Self::AddSource
            | Self::RemoveSource
            | Self::RefreshSources
            | Self::Install
            | Self::Update
            | Self::Uninstall => ActionSafety::Mutating,
        }
    }

    pub fn required_capability(self) -> Capability {
        match self {
            Self::Detect => Capability::Detect,
            Self::Search => Capability::Search,
            Self::ListInstalled => Capability::ListInstalled,
            Self::ListUpdates => Capability::ListUpdates,
            Self::Details => Capability::Details,
            Self::ListSources | Self::AddSource | Self::RemoveSource | Self::RefreshSources => {
                Capability::Sources
            }
            Self::Install => Capability::Install,
            Self::Update => Capability::Update,
            Self::Uninstall => Capability::Uninstall,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ActionSafety {
    ReadOnly,
    Mutating,
}

/// Static feature flags of a manager. Options outside this set are cleared
/// before a command line is built.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct ManagerCapabilities {
    pub can_run_as_admin: bool,
    pub can_skip_integrity_checks: bool,
    pub can_run_interactively: bool,
    pub can_remove_data_on_uninstall: bool,
    pub supports_custom_versions: bool,
    pub supports_custom_architectures: bool,
    pub supports_custom_scopes: bool,
    pub supports_pre_release: bool,
    pub supports_custom_locations: bool,
    pub supports_custom_sources: bool,
    pub architectures: &'static [&'static str],
    pub scopes: &'static [InstallationScope],
}

impl ManagerCapabilities {
    pub const NONE: ManagerCapabilities = ManagerCapabilities {
        can_run_as_admin: false,
        can_skip_integrity_checks: false,
        can_run_interactively: false,
        can_remove_data_on_uninstall: false,
        supports_custom_versions: false,
        supports_custom_architectures: false,
        supports_custom_scopes: false,
        supports_pre_release: false,
        supports_custom_locations: false,
        supports_custom_sources: false,
        architectures: &[],
        scopes: &[],
    };

    pub fn sanitize(&self, options: &InstallationOptions) -> InstallationOptions {
        let mut sanitized = options.clone();
        if !self.can_run_as_admin {
            sanitized.run_as_administrator = false;
        }
        if !self.can_skip_integrity_checks {
            sanitized.skip_hash_check = false;
        }
        if !self.can_run_interactively {
            sanitized.interactive_installation = false;
        }
        if !self.can_remove_data_on_uninstall {
            sanitized.remove_data_on_uninstall = false;
        }
        if !self.supports_custom_versions {
            sanitized.version = None;
        }
        if !self.supports_pre_release {
            sanitized.pre_release = false;
        }
        if !self.supports_custom_locations {
            sanitized.custom_install_location = None;
        }
        if let Some(architecture) = sanitized.architecture.as_deref()
            && !(self.supports_custom_architectures
                && self
                    .architectures
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(architecture)))
        {
            sanitized.architecture = None;
        }
        if let Some(scope) = sanitized.installation_scope
            && !(self.supports_custom_scopes && self.scopes.contains(&scope))
        {
            sanitized.installation_scope = None;
        }
        sanitized
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ManagerDescriptor {
    pub id: ManagerId,
    pub display_name: &'static str,
    pub capabilities: &'static [Capability],
    pub features: ManagerCapabilities,
}

impl ManagerDescriptor {
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct DetectionInfo {
    pub installed: bool,
    pub executable_path: Option<PathBuf>,
    pub version: Option<String>,
}

impl DetectionInfo {
    pub fn not_found() -> Self {
        Self {
            installed: false,
            executable_path: None,
            version: None,
        }
    }
}
