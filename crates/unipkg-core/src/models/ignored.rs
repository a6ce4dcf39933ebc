use serde::Serialize;

/// A record suppressing update notifications. `source` is the lowercased
/// manager part of a package source (`winget`, `scoop`, ...).
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize)]
pub enum IgnoredUpdate {
    Permanent {
        id: String,
        source: String,
    },
    SkipVersion {
        id: String,
        version: String,
        source: String,
    },
}

impl IgnoredUpdate {
    pub fn permanent(id: &str, source: &str) -> Self {
        Self::Permanent {
            id: id.trim().to_string(),
            source: crate::models::package::source_key(source),
        }
    }

    pub fn skip_version(id: &str, version: &str, source: &str) -> Self {
        Self::SkipVersion {
            id: id.trim().to_string(),
            version: normalize_version(version),
            source: crate::models::package::source_key(source),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Permanent { id, .. } | Self::SkipVersion { id, .. } => id,
        }
    }

    /// Delimited form written to the settings file.
    pub fn encode(&self) -> String {
        match self {
            Self::Permanent { id, source } => format!("{id},{source}"),
            Self::SkipVersion {
                id,
                version,
                source,
            } => format!("{id},{version},{source}"),
        }
    }

    pub fn decode(raw: &str) -> Option<Self> {
        let fields: Vec<&str> = raw.trim().split(',').map(str::trim).collect();
        match fields.as_slice() {
            [id, source] if !id.is_empty() => Some(Self::Permanent {
                id: id.to_string(),
                source: source.to_lowercase(),
            }),
            [id, version, source] if !id.is_empty() => Some(Self::SkipVersion {
                id: id.to_string(),
                version: normalize_version(version),
                source: source.to_lowercase(),
            }),
            _ => None,
        }
    }

    /// Whether this record hides an update of `id` from `source` to
    /// `new_version`.
    pub fn matches(&self, id: &str, source: &str, new_version: &str) -> bool {
        let source = crate::models::package::source_key(source);
        match self {
            Self::Permanent {
                id: ignored_id,
                source: ignored_source,
            } => ignored_id == id && *ignored_source == source,
            Self::SkipVersion {
                id: ignored_id,
                version,
                source: ignored_source,
            } => {
                ignored_id == id
                    && *ignored_source == source
                    && *version == normalize_version(new_version)
            }
        }
    }
}

pub(crate) fn normalize_version(version: &str) -> String {
    version.trim().to_lowercase().replace(',', ".")
}

#[cfg(test)]
mod tests {
    use super::IgnoredUpdate;

    #[test]
    fn encodes_and_decodes_both_record_kinds() {
        let permanent = IgnoredUpdate::permanent("Git.Git", "Winget: winget");
        assert_eq!(permanent.encode(), "Git.Git,winget");
        assert_eq!(IgnoredUpdate::decode("Git.Git,winget"), Some(permanent));

        let skip = IgnoredUpdate::skip_version("7zip", "23,01", "Scoop: main");
        assert_eq!(skip.encode(), "7zip,23.01,scoop");
        assert_eq!(IgnoredUpdate::decode("7zip,23.01,scoop"), Some(skip));
    }

    #[test]
    fn decode_rejects_malformed_records() {
        assert_eq!(IgnoredUpdate::decode(""), None);
        assert_eq!(IgnoredUpdate::decode("only-id"), None);
        assert_eq!(IgnoredUpdate::decode("a,b,c,d"), None);
    }

    #[test]
    fn skip_version_matches_only_that_version() {
        let skip = IgnoredUpdate::skip_version("black", "24.10.0", "Pip");
        assert!(skip.matches("black", "Pip", "24.10.0"));
        assert!(!skip.matches("black", "Pip", "24.11.0"));
        assert!(!skip.matches("black", "Npm", "24.10.0"));
    }
}
