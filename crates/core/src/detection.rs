//! The result of analyzing a workspace tree.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Broad category of the detected project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectType {
    /// Plain files, no client-side routing.
    Static,
    /// Single-page application.
    Spa,
    /// Server-side rendered application.
    Ssr,
    /// Nothing recognizable.
    Unknown,
}

impl std::fmt::Display for ProjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Static => "static",
            Self::Spa => "spa",
            Self::Ssr => "ssr",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Package manager inferred from lockfile presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    /// npm (the default when no lockfile matches).
    Npm,
    /// yarn classic/berry.
    Yarn,
    /// pnpm.
    Pnpm,
    /// bun.
    Bun,
}

impl PackageManager {
    /// The command that installs dependencies reproducibly.
    #[must_use]
    pub fn install_command(&self) -> &'static str {
        match self {
            Self::Npm => "npm ci",
            Self::Yarn => "yarn install --frozen-lockfile",
            Self::Pnpm => "pnpm install",
            Self::Bun => "bun install",
        }
    }

    /// The `<pm> run build` invocation for this manager.
    #[must_use]
    pub fn run_build_command(&self) -> &'static str {
        match self {
            Self::Npm => "npm run build",
            Self::Yarn => "yarn run build",
            Self::Pnpm => "pnpm run build",
            Self::Bun => "bun run build",
        }
    }
}

impl std::fmt::Display for PackageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Npm => "npm",
            Self::Yarn => "yarn",
            Self::Pnpm => "pnpm",
            Self::Bun => "bun",
        };
        f.write_str(s)
    }
}

/// Deterministic analysis of a cloned workspace.
///
/// Same bytes in, same result out; the detector never fails, it degrades
/// to the `Unknown`/static defaults instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Broad project category.
    pub project_type: ProjectType,
    /// Human-readable framework name ("Next.js", "Vite + React", ...).
    pub framework: String,
    /// Whether a package manifest was found (and parsed).
    pub has_package_manifest: bool,
    /// Whether the manifest declares a `build` script.
    pub has_build_script: bool,
    /// Command that produces the artifact, if a build is needed.
    #[serde(default)]
    pub build_command: Option<String>,
    /// Directory the build writes its output to, relative to the root.
    #[serde(default)]
    pub build_directory: Option<String>,
    /// `index.html` with no manifest: deployable as-is, no build.
    pub is_pure_static: bool,
    /// Package manager inferred from lockfiles.
    pub package_manager: PackageManager,
    /// Workspace size excluding dependencies, VCS data, and build output.
    pub estimated_size_mb: f64,
    /// Environment variable names referenced by the source.
    #[serde(default)]
    pub environment_variable_refs: BTreeSet<String>,
}

impl DetectionResult {
    /// Whether the pipeline can skip the build step entirely.
    #[must_use]
    pub fn skips_build(&self) -> bool {
        self.is_pure_static || self.build_command.is_none()
    }
}
