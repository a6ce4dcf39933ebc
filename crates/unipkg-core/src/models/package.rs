use serde::{Deserialize, Serialize};

use crate::models::ManagerId;

pub const UNKNOWN_SOURCE: &str = "Unknown";
pub const NOT_AVAILABLE: &str = "Not available";

/// Identity of a package across adapters.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct PackageKey {
    pub id: String,
    pub source: String,
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Package {
    pub name: String,
    pub id: String,
    pub version: String,
    pub source: String,
    pub manager: ManagerId,
}

impl Package {
    pub fn new(
        manager: ManagerId,
        name: impl Into<String>,
        id: impl Into<String>,
        version: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            version: version.into(),
            source: source.into(),
            manager,
        }
    }

    pub fn key(&self) -> PackageKey {
        PackageKey {
            id: self.id.clone(),
            source: self.source.clone(),
        }
    }

    /// `Scoop: Unknown`, or a bare `Unknown`, marks a source that still
    /// has to be cross-referenced against installed packages.
    pub fn has_unknown_source(&self) -> bool {
        let tail = self
            .source
            .split_once(':')
            .map(|(_, tail)| tail)
            .unwrap_or(self.source.as_str());
        tail.trim() == UNKNOWN_SOURCE
    }

    pub fn resolve_source(&mut self, source: impl Into<String>) {
        self.source = source.into();
    }

    /// Lowercased manager part of the source, as used by the ignored-updates
    /// records.
    pub fn source_key(&self) -> String {
        source_key(&self.source)
    }
}

pub fn qualified_source(manager: ManagerId, name: &str) -> String {
    let name = name.trim();
    if name.is_empty() {
        manager.display_name().to_string()
    } else {
        format!("{}: {name}", manager.display_name())
    }
}

pub fn source_key(source: &str) -> String {
    source
        .to_lowercase()
        .split(':')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpgradablePackage {
    /// `package.version` holds the installed version.
    #[serde(flatten)]
    pub package: Package,
    pub new_version: String,
}

impl UpgradablePackage {
    pub fn new(package: Package, new_version: impl Into<String>) -> Self {
        Self {
            package,
            new_version: new_version.into(),
        }
    }

    pub fn installed_version(&self) -> &str {
        &self.package.version
    }

    pub fn key(&self) -> PackageKey {
        self.package.key()
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ManagerSource {
    pub manager: ManagerId,
    pub name: String,
    pub url: String,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PackageDetails {
    pub description: String,
    pub author: String,
    pub publisher: String,
    pub license: String,
    pub license_url: String,
    pub homepage_url: String,
    pub installer_url: String,
    pub installer_hash: String,
    pub installer_type: String,
    pub installer_size: u64,
    pub versions: Vec<String>,
    pub architectures: Vec<String>,
    pub scopes: Vec<String>,
    pub tags: Vec<String>,
    pub release_notes: String,
    pub release_notes_url: String,
    pub update_date: String,
    pub manifest_url: String,
}

impl Default for PackageDetails {
    fn default() -> Self {
        let na = || NOT_AVAILABLE.to_string();
        Self {
            description: na(),
            author: na(),
            publisher: na(),
            license: na(),
            license_url: na(),
            homepage_url: na(),
            installer_url: na(),
            installer_hash: na(),
            installer_type: na(),
            installer_size: 0,
            versions: Vec::new(),
            architectures: Vec::new(),
            scopes: Vec::new(),
            tags: Vec::new(),
            release_notes: na(),
            release_notes_url: na(),
            update_date: na(),
            manifest_url: na(),
        }
    }
}

/// Assigns `value` to `field` when it is non-empty after trimming.
pub(crate) fn set_if_present(field: &mut String, value: &str) {
    let value = value.trim();
    if !value.is_empty() {
        *field = value.to_string();
    }
}
