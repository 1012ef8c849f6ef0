//! Workspace-root confinement for file tools.

use std::path::{Path, PathBuf};

/// Resolve a user-supplied path against the working directory. Rejects `..`
/// components and absolute paths that leave the workspace root.
pub fn resolve_in_workdir(workdir: &Path, path: &str) -> Result<PathBuf, String> {
    if path.trim().is_empty() {
        return Err("path cannot be empty".to_string());
    }

    let candidate = Path::new(path);
    if candidate
        .components()
        .any(|component| matches!(component, std::path::Component::ParentDir))
    {
        return Err(format!("invalid path '{path}': contains '..'"));
    }

    if candidate.is_absolute() {
        if candidate.starts_with(workdir) {
            return Ok(candidate.to_path_buf());
        }
        return Err(format!(
            "path '{path}' is outside the working directory"
        ));
    }

    Ok(workdir.join(candidate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_relative_paths() {
        let resolved = resolve_in_workdir(Path::new("/work"), "sub/file.txt").unwrap();
        assert_eq!(resolved, PathBuf::from("/work/sub/file.txt"));
    }

    #[test]
    fn rejects_parent_components() {
        assert!(resolve_in_workdir(Path::new("/work"), "../escape").is_err());
        assert!(resolve_in_workdir(Path::new("/work"), "a/../../b").is_err());
    }

    #[test]
    fn absolute_paths_must_stay_inside() {
        assert!(resolve_in_workdir(Path::new("/work"), "/work/ok.txt").is_ok());
        assert!(resolve_in_workdir(Path::new("/work"), "/etc/passwd").is_err());
    }

    #[test]
    fn rejects_empty_path() {
        assert!(resolve_in_workdir(Path::new("/work"), "").is_err());
    }
}
