use serde::de::IntoDeserializer;
use serde::de::value::StrDeserializer;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum InstallationScope {
    #[serde(alias = "Current user", alias = "user", alias = "CurrentUser")]
    User,
    #[serde(
        alias = "Local machine",
        alias = "machine",
        alias = "Global",
        alias = "AllUsers"
    )]
    Machine,
}

/// Per-package options. Persisted as JSON with PascalCase keys; absent keys
/// fall back to their defaults.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct InstallationOptions {
    pub run_as_administrator: bool,
    pub interactive_installation: bool,
    pub skip_hash_check: bool,
    pub pre_release: bool,
    pub remove_data_on_uninstall: bool,
    pub version: Option<String>,
    pub architecture: Option<String>,
    #[serde(deserialize_with = "blank_scope_is_unset")]
    pub installation_scope: Option<InstallationScope>,
    pub custom_install_location: Option<String>,
    pub custom_parameters: Vec<String>,
}

/// Older settings files store an unset scope as an empty string.
fn blank_scope_is_unset<'de, D>(deserializer: D) -> Result<Option<InstallationScope>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(name) => {
            let name: StrDeserializer<'_, D::Error> = name.into_deserializer();
            InstallationScope::deserialize(name).map(Some)
        }
    }
}

impl InstallationOptions {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    pub fn requested_version(&self) -> Option<&str> {
        self.version
            .as_deref()
            .map(str::trim)
            .filter(|version| !version.is_empty())
    }

    pub fn requested_architecture(&self) -> Option<&str> {
        self.architecture
            .as_deref()
            .map(str::trim)
            .filter(|architecture| !architecture.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::{InstallationOptions, InstallationScope};

    #[test]
    fn json_round_trip_preserves_every_flag_combination() {
        for mask in 0u8..32 {
            let options = InstallationOptions {
                run_as_administrator: mask & 1 != 0,
                interactive_installation: mask & 2 != 0,
                skip_hash_check: mask & 4 != 0,
                pre_release: mask & 8 != 0,
                remove_data_on_uninstall: mask & 16 != 0,
                version: (mask % 3 == 0).then(|| "1.4.0".to_string()),
                architecture: (mask % 2 == 0).then(|| "x64".to_string()),
                installation_scope: match mask % 3 {
                    0 => None,
                    1 => Some(InstallationScope::User),
                    _ => Some(InstallationScope::Machine),
                },
                custom_install_location: (mask > 16).then(|| "D:\\Apps".to_string()),
                custom_parameters: if mask % 4 == 0 {
                    Vec::new()
                } else {
                    vec!["--silent".to_string(), "/norestart".to_string()]
                },
            };

            let raw = options.to_json().expect("serialize options");
            let decoded = InstallationOptions::from_json(&raw).expect("deserialize options");
            assert_eq!(decoded, options, "mask {mask} did not round-trip");
        }
    }

    #[test]
    fn uses_pascal_case_keys() {
        let options = InstallationOptions {
            skip_hash_check: true,
            ..InstallationOptions::default()
        };
        let raw = options.to_json().expect("serialize options");
        assert!(raw.contains("\"SkipHashCheck\":true"));
        assert!(raw.contains("\"CustomParameters\":[]"));
    }

    #[test]
    fn missing_keys_and_legacy_scope_names_deserialize() {
        let decoded = InstallationOptions::from_json(
            r#"{"RunAsAdministrator":true,"InstallationScope":"Local machine"}"#,
        )
        .expect("deserialize options");

        assert!(decoded.run_as_administrator);
        assert!(!decoded.interactive_installation);
        assert_eq!(decoded.installation_scope, Some(InstallationScope::Machine));
        assert!(decoded.custom_parameters.is_empty());
    }

    #[test]
    fn empty_legacy_scope_reads_as_unset() {
        let decoded = InstallationOptions::from_json(
            r#"{"InstallationScope":"","Version":"","Architecture":"","CustomParameters":[]}"#,
        )
        .expect("deserialize options");

        assert_eq!(decoded.installation_scope, None);
        assert_eq!(decoded.requested_version(), None);
        assert_eq!(decoded.requested_architecture(), None);

        let decoded = InstallationOptions::from_json(r#"{"InstallationScope":null}"#)
            .expect("deserialize options");
        assert_eq!(decoded.installation_scope, None);
    }

    #[test]
    fn unknown_scope_is_still_rejected() {
        assert!(InstallationOptions::from_json(r#"{"InstallationScope":"Galaxy"}"#).is_err());
    }

    #[test]
    fn blank_version_is_not_requested() {
        let options = InstallationOptions {
            version: Some("  ".to_string()),
            ..InstallationOptions::default()
        };
        assert_eq!(options.requested_version(), None);
    }
}
