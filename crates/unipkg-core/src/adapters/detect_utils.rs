use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Extensions tried for a bare program name on Windows, in `PATHEXT` order.
fn executable_extensions() -> Vec<String> {
    if cfg!(windows) {
        let pathext = std::env::var("PATHEXT").unwrap_or_else(|_| ".COM;.EXE;.BAT;.CMD".into());
        let mut extensions: Vec<String> = pathext
            .split(';')
            .filter(|ext| !ext.is_empty())
            .map(|ext| ext.to_ascii_lowercase())
            .collect();
        extensions.push(".ps1".to_string());
        extensions
    } else {
        vec![String::new()]
    }
}

/// Resolves `binary_name` against `extra_paths`, then `PATH`, then the
/// manager's usual install roots.
pub(crate) fn find_executable(binary_name: &str, extra_paths: &[PathBuf]) -> Option<PathBuf> {
    if binary_name.trim().is_empty() {
        return None;
    }

    if binary_name.contains('/') || binary_name.contains('\\') {
        let absolute = PathBuf::from(binary_name);
        return absolute.is_file().then_some(absolute);
    }

    let mut seen = HashSet::new();
    let mut candidates = Vec::new();
    let extensions = executable_extensions();

    let mut push_dir = |dir: &Path| {
        for extension in &extensions {
            push_candidate_path(
                dir.join(format!("{binary_name}{extension}")),
                &mut candidates,
                &mut seen,
            );
        }
    };

    for extra in extra_paths {
        push_dir(extra);
    }
    if let Some(path_var) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&path_var) {
            push_dir(&dir);
        }
    }

    candidates.into_iter().find(|candidate| candidate.is_file())
}

fn push_candidate_path(
    candidate: PathBuf,
    candidates: &mut Vec<PathBuf>,
    seen: &mut HashSet<String>,
) {
    let rendered = candidate.to_string_lossy().to_string();
    if rendered.is_empty() {
        return;
    }

    if seen.insert(rendered) {
        candidates.push(candidate);
    }
}

/// Windows PowerShell, falling back to PowerShell 7 (`pwsh`).
pub(crate) fn powershell_executable() -> Option<PathBuf> {
    find_executable("powershell", &[]).or_else(|| find_executable("pwsh", &[]))
}

/// `%USERPROFILE%\scoop\shims` and similar per-user roots.
pub(crate) fn user_dir(relative: &[&str]) -> Option<PathBuf> {
    let home = std::env::var_os("USERPROFILE")
        .or_else(|| std::env::var_os("HOME"))
        .map(PathBuf::from)?;
    Some(relative.iter().fold(home, |path, part| path.join(part)))
}

pub(crate) fn env_dir(variable: &str, relative: &[&str]) -> Option<PathBuf> {
    let root = std::env::var_os(variable).map(PathBuf::from)?;
    Some(relative.iter().fold(root, |path, part| path.join(part)))
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::find_executable;

    #[cfg(unix)]
    #[test]
    fn finds_executable_in_extra_path_before_path() {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("unipkg-detect-{nanos}"));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        let tool = dir.join("unipkg-fake-tool");
        std::fs::write(&tool, "#!/bin/sh\n").expect("write tool");

        let found = find_executable("unipkg-fake-tool", std::slice::from_ref(&dir));
        assert_eq!(found, Some(tool));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_and_empty_names_are_not_found() {
        assert_eq!(find_executable("", &[]), None);
        assert_eq!(
            find_executable("definitely-not-a-real-binary-unipkg", &[]),
            None
        );
    }
}
