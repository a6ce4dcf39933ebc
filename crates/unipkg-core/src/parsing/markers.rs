use crate::models::{ManagerId, OperationResultCode};

/// Words that show up in the first column of log lines from every manager.
pub const COMMON_NOISE_TOKENS: &[&str] = &["+", "At", "The", "But", "Au"];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ProgressMarker {
    pub needle: &'static str,
    pub counter: u32,
}

/// Which operations the elevation markers are checked for.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ElevationMarkerScope {
    /// Every operation, before the exit code is looked at.
    Always,
    /// Only uninstalls that exited with a nonzero code not covered by an
    /// exit-code table.
    FailedUninstall,
}

/// How an operation is decided once no exit-code table matched.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VerdictRule {
    /// The exit code decides, refined by the marker lists.
    ExitCode,
    /// The exit code is ignored. Uninstalls succeed only when the
    /// confirmation phrase is printed; other operations fail only when a
    /// failure marker is printed.
    Output { uninstall_confirmation: &'static str },
}

/// Per-manager strings and exit codes that drive parsing and outcome
/// classification. Substring matching against CLI text is locale and version
/// sensitive; exit codes take precedence where a manager defines them.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ManagerMarkers {
    pub manager: ManagerId,
    pub blacklist_tokens: &'static [&'static str],
    pub blacklist_versions: &'static [&'static str],
    pub elevation_markers: &'static [&'static str],
    pub elevation_scope: ElevationMarkerScope,
    pub success_markers: &'static [&'static str],
    /// Text that fails an operation even when the exit code is zero.
    pub failure_markers: &'static [&'static str],
    pub no_update_markers: &'static [&'static str],
    pub progress_markers: &'static [ProgressMarker],
    pub success_exit_codes: &'static [i32],
    pub uninstall_success_exit_codes: &'static [i32],
    pub restart_exit_codes: &'static [i32],
    pub hash_failure_exit_codes: &'static [i32],
    pub elevation_exit_codes: &'static [i32],
    pub cancelled_exit_codes: &'static [i32],
    pub verdict: VerdictRule,
    pub elevation_result: OperationResultCode,
}

const WINGET_INCORRECT_HASH: i32 = 0x8A15_0011_u32 as i32;
const WINGET_NEEDS_RESTART: i32 = 0x8A15_0109_u32 as i32;
const WINGET_NEEDS_ADMIN: i32 = 0x8A15_0019_u32 as i32;
const WINGET_ALREADY_INSTALLED: &[i32] = &[
    0x8A15_002B_u32 as i32,
    0x8A15_010D_u32 as i32,
    0x8A15_004F_u32 as i32,
    0x8A15_010E_u32 as i32,
];
const WINGET_CANCELLED: &[i32] = &[
    0x8A15_0077_u32 as i32,
    0x8A15_010C_u32 as i32,
    0x8A15_0005_u32 as i32,
];

const CHOCO_NOISE: &[&str] = &[
    "Did",
    "Features?",
    "Validation",
    "-",
    "being",
    "It",
    "Error",
    "L'accs",
    "Maximum",
    "This",
    "'chocolatey'",
    "Operable",
    "operable",
    "Invalid",
];

const CHOCO_NOISE_VERSIONS: &[&str] = &[
    "Did",
    "Features?",
    "Validation",
    "-",
    "being",
    "It",
    "Error",
    "L'accs",
    "Maximum",
    "This",
    "packages",
    "current version",
    "installed version",
    "is",
    "program",
    "validations",
    "argument",
    "no",
];

static MARKERS: [ManagerMarkers; 7] = [
    ManagerMarkers {
        manager: ManagerId::Winget,
        blacklist_tokens: &["", "have", "the", "Id"],
        blacklist_versions: &["have", "an", "'winget", "pin'", "Version"],
        elevation_markers: &["1603", "0x80070005", "Access is denied"],
        elevation_scope: ElevationMarkerScope::FailedUninstall,
        success_markers: &[],
        failure_markers: &[],
        no_update_markers: &[
            "No applicable upgrade found",
            "No newer package versions are available from the configured sources",
        ],
        progress_markers: &[],
        success_exit_codes: WINGET_ALREADY_INSTALLED,
        uninstall_success_exit_codes: &[],
        restart_exit_codes: &[WINGET_NEEDS_RESTART],
        hash_failure_exit_codes: &[WINGET_INCORRECT_HASH],
        elevation_exit_codes: &[WINGET_NEEDS_ADMIN],
        cancelled_exit_codes: WINGET_CANCELLED,
        verdict: VerdictRule::ExitCode,
        elevation_result: OperationResultCode::NeedsElevation,
    },
    ManagerMarkers {
        manager: ManagerId::Scoop,
        blacklist_tokens: &["Scoop", "Name", "WARN", "ERROR"],
        blacklist_versions: &["the", "is", "install", "Version"],
        elevation_markers: &[
            "requires admin rights",
            "requires administrator rights",
            "you need admin rights to install global apps",
        ],
        elevation_scope: ElevationMarkerScope::Always,
        success_markers: &[
            "was installed successfully",
            "is already installed",
            "was uninstalled",
        ],
        failure_markers: &["ERROR"],
        no_update_markers: &["Latest versions for all apps are installed"],
        progress_markers: &[
            ProgressMarker {
                needle: "was installed successfully!",
                counter: 6,
            },
            ProgressMarker {
                needle: "was uninstalled",
                counter: 6,
            },
            ProgressMarker {
                needle: "] 100%",
                counter: 4,
            },
            ProgressMarker {
                needle: "Downloading",
                counter: 4,
            },
            ProgressMarker {
                needle: "Removing shim for",
                counter: 4,
            },
            ProgressMarker {
                needle: "Uninstalling",
                counter: 1,
            },
            ProgressMarker {
                needle: "Installing",
                counter: 1,
            },
        ],
        success_exit_codes: &[],
        uninstall_success_exit_codes: &[],
        restart_exit_codes: &[],
        hash_failure_exit_codes: &[],
        elevation_exit_codes: &[],
        cancelled_exit_codes: &[],
        verdict: VerdictRule::Output {
            uninstall_confirmation: "was uninstalled",
        },
        elevation_result: OperationResultCode::NeedsScoopElevation,
    },
    ManagerMarkers {
        manager: ManagerId::Chocolatey,
        blacklist_tokens: CHOCO_NOISE,
        blacklist_versions: CHOCO_NOISE_VERSIONS,
        elevation_markers: &[
            "Run as administrator",
            "The requested operation requires elevation",
            "Exception calling \"CreateDirectory\" with \"1\" argument(s): \"Access to the path",
        ],
        elevation_scope: ElevationMarkerScope::Always,
        success_markers: &[],
        failure_markers: &[],
        no_update_markers: &[],
        progress_markers: &[
            ProgressMarker {
                needle: "Progress: Downloading",
                counter: 3,
            },
            ProgressMarker {
                needle: "Installing",
                counter: 5,
            },
        ],
        success_exit_codes: &[1641, 3010],
        uninstall_success_exit_codes: &[1605, 1614, 1641],
        restart_exit_codes: &[3010],
        hash_failure_exit_codes: &[],
        elevation_exit_codes: &[],
        cancelled_exit_codes: &[],
        verdict: VerdictRule::ExitCode,
        elevation_result: OperationResultCode::NeedsElevation,
    },
    ManagerMarkers {
        manager: ManagerId::Pip,
        blacklist_tokens: &["WARNING:", "[notice]", "Package", "ERROR:"],
        blacklist_versions: &["Ignoring", "invalie", "Version"],
        elevation_markers: &[
            "[WinError 5] Access is denied",
            "Consider using the `--user` option",
            "[Errno 13] Permission denied",
        ],
        elevation_scope: ElevationMarkerScope::Always,
        success_markers: &["Requirement already satisfied"],
        failure_markers: &[],
        no_update_markers: &[],
        progress_markers: &[
            ProgressMarker {
                needle: "Collecting",
                counter: 1,
            },
            ProgressMarker {
                needle: "Downloading",
                counter: 3,
            },
            ProgressMarker {
                needle: "Installing collected packages",
                counter: 5,
            },
            ProgressMarker {
                needle: "Successfully installed",
                counter: 6,
            },
        ],
        success_exit_codes: &[],
        uninstall_success_exit_codes: &[],
        restart_exit_codes: &[],
        hash_failure_exit_codes: &[],
        elevation_exit_codes: &[],
        cancelled_exit_codes: &[],
        verdict: VerdictRule::ExitCode,
        elevation_result: OperationResultCode::NeedsPipElevation,
    },
    ManagerMarkers {
        manager: ManagerId::Npm,
        blacklist_tokens: &["npm", "Package", "NAME", "WARN", "ERR!"],
        blacklist_versions: &["Current", "VERSION"],
        elevation_markers: &["EACCES", "EPERM", "operation not permitted"],
        elevation_scope: ElevationMarkerScope::Always,
        success_markers: &[],
        failure_markers: &[],
        no_update_markers: &[],
        progress_markers: &[],
        success_exit_codes: &[],
        uninstall_success_exit_codes: &[],
        restart_exit_codes: &[],
        hash_failure_exit_codes: &[],
        elevation_exit_codes: &[],
        cancelled_exit_codes: &[],
        verdict: VerdictRule::ExitCode,
        elevation_result: OperationResultCode::NeedsElevation,
    },
    ManagerMarkers {
        manager: ManagerId::DotnetTool,
        blacklist_tokens: &["Package", "Tool", "Skipping"],
        blacklist_versions: &["Version", "Latest"],
        elevation_markers: &["Access to the path", "requires elevated permissions"],
        elevation_scope: ElevationMarkerScope::Always,
        success_markers: &["is already installed"],
        failure_markers: &[],
        no_update_markers: &[],
        progress_markers: &[],
        success_exit_codes: &[],
        uninstall_success_exit_codes: &[],
        restart_exit_codes: &[],
        hash_failure_exit_codes: &[],
        elevation_exit_codes: &[],
        cancelled_exit_codes: &[],
        verdict: VerdictRule::ExitCode,
        elevation_result: OperationResultCode::NeedsElevation,
    },
    ManagerMarkers {
        manager: ManagerId::PowerShell,
        blacklist_tokens: &["Version", "Name", "WARNING:"],
        blacklist_versions: &["Version"],
        elevation_markers: &["AdminPrivilegesAreRequired", "Administrator rights are required"],
        elevation_scope: ElevationMarkerScope::Always,
        success_markers: &[],
        failure_markers: &[],
        no_update_markers: &[],
        progress_markers: &[
            ProgressMarker {
                needle: "installing",
                counter: 7,
            },
            ProgressMarker {
                needle: "removing",
                counter: 5,
            },
            ProgressMarker {
                needle: "downloading",
                counter: 3,
            },
        ],
        success_exit_codes: &[],
        uninstall_success_exit_codes: &[],
        restart_exit_codes: &[],
        hash_failure_exit_codes: &[],
        elevation_exit_codes: &[],
        cancelled_exit_codes: &[],
        verdict: VerdictRule::ExitCode,
        elevation_result: OperationResultCode::NeedsElevation,
    },
];

pub fn markers_for(manager: ManagerId) -> &'static ManagerMarkers {
    let index = match manager {
        ManagerId::Winget => 0,
        ManagerId::Scoop => 1,
        ManagerId::Chocolatey => 2,
        ManagerId::Pip => 3,
        ManagerId::Npm => 4,
        ManagerId::DotnetTool => 5,
        ManagerId::PowerShell => 6,
    };
    &MARKERS[index]
}

impl ManagerMarkers {
    /// Whether a parsed row is log noise rather than a package.
    pub fn rejects(&self, name: &str, id: &str, version: &str) -> bool {
        let is_noise = |field: &str| {
            self.blacklist_tokens.contains(&field) || COMMON_NOISE_TOKENS.contains(&field)
        };
        id.trim().is_empty()
            || is_noise(name)
            || is_noise(id)
            || self.blacklist_versions.contains(&version)
    }

    pub fn elevation_marker_in(&self, output: &str) -> Option<&'static str> {
        self.elevation_markers
            .iter()
            .copied()
            .find(|marker| output.contains(marker))
    }

    pub fn has_success_marker(&self, output: &str) -> bool {
        self.success_markers
            .iter()
            .any(|marker| output.contains(marker))
    }

    pub fn has_failure_marker(&self, output: &str) -> bool {
        self.failure_markers
            .iter()
            .any(|marker| output.contains(marker))
    }

    pub fn has_no_update_marker(&self, output: &str) -> bool {
        self.no_update_markers
            .iter()
            .any(|marker| output.contains(marker))
    }

    /// Progress counter for a line, when the manager reports progress through
    /// recognisable phrases. Markers are matched case-insensitively, first
    /// match wins.
    pub fn progress_for(&self, line: &str) -> Option<u32> {
        let lowered = line.to_lowercase();
        self.progress_markers
            .iter()
            .find(|marker| lowered.contains(&marker.needle.to_lowercase()))
            .map(|marker| marker.counter)
    }
}

#[cfg(test)]
mod tests {
    use super::{VerdictRule, markers_for};
    use crate::models::{ManagerId, OperationResultCode};

    #[test]
    fn table_is_indexed_by_manager() {
        for manager in ManagerId::ALL {
            assert_eq!(markers_for(manager).manager, manager);
            assert!(
                !markers_for(manager).elevation_markers.is_empty(),
                "{manager:?} has no elevation markers"
            );
        }
    }

    #[test]
    fn winget_exit_codes_are_hresults() {
        let markers = markers_for(ManagerId::Winget);
        assert_eq!(markers.hash_failure_exit_codes, &[-1978335215]);
        assert_eq!(markers.restart_exit_codes, &[-1978334967]);
        assert_eq!(markers.elevation_exit_codes, &[-1978335207]);
        assert!(markers.success_exit_codes.contains(&-1978335189));
        assert_eq!(markers.cancelled_exit_codes.len(), 3);
    }

    #[test]
    fn only_scoop_decides_by_output() {
        for manager in ManagerId::ALL {
            let expected_output_rule = manager == ManagerId::Scoop;
            assert_eq!(
                matches!(markers_for(manager).verdict, VerdictRule::Output { .. }),
                expected_output_rule,
                "{manager:?}"
            );
        }
    }

    #[test]
    fn progress_markers_are_case_insensitive() {
        let scoop = markers_for(ManagerId::Scoop);
        assert_eq!(scoop.progress_for("Installing 'git' (2.44.0)"), Some(1));
        assert_eq!(scoop.progress_for("'git' (2.44.0) was installed successfully!"), Some(6));

        let powershell = markers_for(ManagerId::PowerShell);
        assert_eq!(powershell.progress_for("Downloading package 'Az'"), Some(3));
        assert_eq!(powershell.progress_for("nothing to see"), None);
    }

    #[test]
    fn elevation_result_codes_follow_manager() {
        assert_eq!(
            markers_for(ManagerId::Pip).elevation_result,
            OperationResultCode::NeedsPipElevation
        );
        assert_eq!(
            markers_for(ManagerId::Scoop).elevation_result,
            OperationResultCode::NeedsScoopElevation
        );
    }

    #[test]
    fn rejects_common_and_manager_noise() {
        let choco = markers_for(ManagerId::Chocolatey);
        assert!(choco.rejects("Did", "Did", "you"));
        assert!(choco.rejects("5", "5", "packages"));
        assert!(!choco.rejects("Git", "git", "2.44.0"));
        assert!(choco.rejects("The", "The", "1.0"));
    }
}
