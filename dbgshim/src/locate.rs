// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::env;
use std::path::{Path, PathBuf};

const LIB_NAME: &str = "libdbgshim.so";

/// Well-known roots of system-wide .NET installs on Linux.
const SYSTEM_DOTNET_ROOTS: &[&str] = &["/usr/share/dotnet", "/usr/lib/dotnet"];

/// Compute the ordered list of candidate helper-library paths.
///
/// The caller tries each in turn and keeps the first one that actually
/// loads; the full list is reported back on total failure so a missing
/// install is diagnosable from the error alone.
pub fn candidate_paths(explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(path) = explicit {
        candidates.push(path.to_path_buf());
    }

    if let Ok(path) = env::var("DBGSHIM_PATH") {
        candidates.push(PathBuf::from(path));
    }

    if let Ok(root) = env::var("DOTNET_ROOT") {
        push_runtime_dirs(&mut candidates, Path::new(&root));
    }

    for root in SYSTEM_DOTNET_ROOTS {
        push_runtime_dirs(&mut candidates, Path::new(root));
    }

    if let Ok(path) = env::var("NETCOREDBG_PATH") {
        if let Some(dir) = PathBuf::from(path).parent() {
            candidates.push(dir.join(LIB_NAME));
        }
    }

    if let Ok(home) = env::var("HOME") {
        candidates.push(Path::new(&home).join(".netcoredbg").join(LIB_NAME));
    }

    candidates.push(PathBuf::from("/usr/local/lib").join(LIB_NAME));

    candidates
}

/// Append `<root>/shared/Microsoft.NETCore.App/<version>/libdbgshim.so` for
/// every installed runtime version, newest first.
fn push_runtime_dirs(candidates: &mut Vec<PathBuf>, root: &Path) {
    let shared = root.join("shared").join("Microsoft.NETCore.App");

    let Ok(entries) = std::fs::read_dir(&shared) else {
        return;
    };

    let mut versions: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().into_string().ok())
        .collect();

    sort_versions_descending(&mut versions);

    for version in versions {
        candidates.push(shared.join(version).join(LIB_NAME));
    }
}

/// Sort dotted version directory names newest-first. Components compare
/// numerically where possible; non-numeric names sort after numeric ones.
pub(crate) fn sort_versions_descending(versions: &mut [String]) {
    versions.sort_by(|a, b| version_key(b).cmp(&version_key(a)));
}

fn version_key(name: &str) -> (bool, Vec<u64>) {
    let parts: Option<Vec<u64>> = name
        .split(['.', '-'])
        .map(|p| p.parse::<u64>().ok())
        .collect();

    match parts {
        Some(nums) => (true, nums),
        None => (false, Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newest_version_first() {
        let mut versions = vec![
            "6.0.25".to_string(),
            "8.0.1".to_string(),
            "7.0.14".to_string(),
            "8.0.10".to_string(),
        ];
        sort_versions_descending(&mut versions);
        assert_eq!(versions, vec!["8.0.10", "8.0.1", "7.0.14", "6.0.25"]);
    }

    #[test]
    fn numeric_versions_sort_before_noise() {
        let mut versions = vec!["garbage".to_string(), "6.0.0".to_string()];
        sort_versions_descending(&mut versions);
        assert_eq!(versions[0], "6.0.0");
    }

    #[test]
    fn explicit_path_comes_first() {
        let explicit = PathBuf::from("/opt/custom/libdbgshim.so");
        let candidates = candidate_paths(Some(&explicit));
        assert_eq!(candidates[0], explicit);
    }

    #[test]
    fn system_fallback_comes_last() {
        let candidates = candidate_paths(None);
        assert_eq!(
            candidates.last().map(|p| p.as_path()),
            Some(Path::new("/usr/local/lib/libdbgshim.so"))
        );
    }
}
