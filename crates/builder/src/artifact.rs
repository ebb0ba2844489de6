//! Locating the build output inside a workspace.

use std::path::{Path, PathBuf};

use slipway_core::{DeployConfig, DetectionResult};

/// Where the artifact ended up, plus a warning when the expected
/// directory was missing.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// The directory handed to the provider adapter.
    pub path: PathBuf,
    /// Set when the declared build directory did not exist and the
    /// workspace root was used instead; names the directories that do
    /// exist.
    pub fallback_warning: Option<String>,
}

/// Resolve the artifact directory after a build (or build skip).
///
/// The intake config's `build_directory` beats the detected one. A
/// missing directory falls back to the workspace root -- the deployment
/// continues, with a warning naming what is actually there.
#[must_use]
pub fn resolve(workspace: &Path, detection: &DetectionResult, config: &DeployConfig) -> Resolution {
    let declared = config
        .build_directory
        .clone()
        .or_else(|| detection.build_directory.clone());

    let Some(declared) = declared.filter(|d| !d.is_empty() && d != ".") else {
        return Resolution {
            path: workspace.to_path_buf(),
            fallback_warning: None,
        };
    };

    let candidate = workspace.join(&declared);
    if candidate.is_dir() {
        return Resolution {
            path: candidate,
            fallback_warning: None,
        };
    }

    let existing = existing_directories(workspace);
    Resolution {
        path: workspace.to_path_buf(),
        fallback_warning: Some(format!(
            "build directory {declared:?} not found, deploying workspace root (directories present: {})",
            if existing.is_empty() { "none".to_owned() } else { existing.join(", ") },
        )),
    }
}

fn existing_directories(workspace: &Path) -> Vec<String> {
    let mut dirs: Vec<String> = std::fs::read_dir(workspace)
        .into_iter()
        .flatten()
        .flatten()
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    dirs.sort();
    dirs
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use slipway_core::{PackageManager, ProjectType};
    use tempfile::TempDir;

    use super::*;

    fn detection(build_directory: Option<&str>) -> DetectionResult {
        DetectionResult {
            project_type: ProjectType::Spa,
            framework: "Vite".into(),
            has_package_manifest: true,
            has_build_script: true,
            build_command: Some("npm run build".into()),
            build_directory: build_directory.map(str::to_owned),
            is_pure_static: false,
            package_manager: PackageManager::Npm,
            estimated_size_mb: 1.0,
            environment_variable_refs: BTreeSet::new(),
        }
    }

    #[test]
    fn existing_build_directory_is_used() {
        let ws = TempDir::new().unwrap();
        std::fs::create_dir(ws.path().join("dist")).unwrap();
        let resolution = resolve(ws.path(), &detection(Some("dist")), &DeployConfig::default());
        assert_eq!(resolution.path, ws.path().join("dist"));
        assert!(resolution.fallback_warning.is_none());
    }

    #[test]
    fn missing_directory_falls_back_with_warning() {
        let ws = TempDir::new().unwrap();
        std::fs::create_dir(ws.path().join("src")).unwrap();
        std::fs::create_dir(ws.path().join("public")).unwrap();
        let resolution = resolve(ws.path(), &detection(Some("dist")), &DeployConfig::default());
        assert_eq!(resolution.path, ws.path());
        let warning = resolution.fallback_warning.unwrap();
        assert!(warning.contains("dist"));
        assert!(warning.contains("public, src"));
    }

    #[test]
    fn dot_directory_means_workspace_root() {
        let ws = TempDir::new().unwrap();
        let resolution = resolve(ws.path(), &detection(Some(".")), &DeployConfig::default());
        assert_eq!(resolution.path, ws.path());
        assert!(resolution.fallback_warning.is_none());
    }

    #[test]
    fn config_override_beats_detection() {
        let ws = TempDir::new().unwrap();
        std::fs::create_dir(ws.path().join("www")).unwrap();
        std::fs::create_dir(ws.path().join("dist")).unwrap();
        let config = DeployConfig {
            name: "x".into(),
            build_command: None,
            build_directory: Some("www".into()),
            env_vars: Default::default(),
        };
        let resolution = resolve(ws.path(), &detection(Some("dist")), &config);
        assert_eq!(resolution.path, ws.path().join("www"));
    }

    #[test]
    fn empty_workspace_warning_says_none() {
        let ws = TempDir::new().unwrap();
        let resolution = resolve(ws.path(), &detection(Some("dist")), &DeployConfig::default());
        assert!(resolution.fallback_warning.unwrap().contains("none"));
    }
}
