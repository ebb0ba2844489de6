//! File-tree utilities shared by the detector and the size estimator.

use std::collections::BTreeSet;
use std::path::Path;

use regex::Regex;
use walkdir::WalkDir;

/// Directories excluded from size estimation and source scans:
/// dependencies, VCS data, and known build output.
const EXCLUDED_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    ".svn",
    ".hg",
    "dist",
    "build",
    ".next",
    ".nuxt",
    ".output",
    "out",
    "_site",
    "coverage",
];

/// How deep scans look into the tree. Two levels keeps analysis
/// proportional to the top of the repository.
pub const SCAN_DEPTH: usize = 2;

/// Source files larger than this are skipped by the reference scan.
const MAX_SCANNED_FILE_BYTES: u64 = 512 * 1024;

fn is_excluded(name: &str) -> bool {
    EXCLUDED_DIRS.contains(&name)
}

/// Returns `true` if `root/name` exists as a file.
#[must_use]
pub fn file_exists(root: &Path, name: &str) -> bool {
    root.join(name).is_file()
}

/// Returns `true` if any file directly under `root` matches
/// `prefix<anything>` -- used for `vite.config.*`-style markers.
#[must_use]
pub fn file_with_prefix_exists(root: &Path, prefix: &str) -> bool {
    let Ok(entries) = std::fs::read_dir(root) else {
        return false;
    };
    for entry in entries.flatten() {
        if let Some(name) = entry.file_name().to_str() {
            if name.starts_with(prefix) && entry.path().is_file() {
                return true;
            }
        }
    }
    false
}

/// Workspace size in megabytes, excluding dependencies, VCS data, and
/// build output. Unreadable entries count as zero.
#[must_use]
pub fn estimated_size_mb(root: &Path) -> f64 {
    let mut bytes: u64 = 0;
    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        entry
            .file_name()
            .to_str()
            .map_or(true, |name| !is_excluded(name))
    });
    for entry in walker.flatten() {
        if entry.file_type().is_file() {
            if let Ok(meta) = entry.metadata() {
                bytes += meta.len();
            }
        }
    }
    bytes as f64 / (1024.0 * 1024.0)
}

/// Environment variable names referenced by source files near the top
/// of the tree (`process.env.X` and `import.meta.env.X`).
#[must_use]
pub fn environment_variable_refs(root: &Path) -> BTreeSet<String> {
    // Infallible: the patterns are literals.
    let patterns = [
        Regex::new(r"process\.env\.([A-Z_][A-Z0-9_]*)"),
        Regex::new(r"import\.meta\.env\.([A-Z_][A-Z0-9_]*)"),
    ];

    let mut refs = BTreeSet::new();
    let walker = WalkDir::new(root)
        .max_depth(SCAN_DEPTH)
        .into_iter()
        .filter_entry(|entry| {
            entry
                .file_name()
                .to_str()
                .map_or(true, |name| !is_excluded(name))
        });
    for entry in walker.flatten() {
        if !entry.file_type().is_file() || !is_scannable_source(entry.path()) {
            continue;
        }
        if entry
            .metadata()
            .map_or(true, |meta| meta.len() > MAX_SCANNED_FILE_BYTES)
        {
            continue;
        }
        let Ok(contents) = std::fs::read_to_string(entry.path()) else {
            continue;
        };
        for pattern in patterns.iter().flatten() {
            for capture in pattern.captures_iter(&contents) {
                if let Some(name) = capture.get(1) {
                    refs.insert(name.as_str().to_owned());
                }
            }
        }
    }
    refs
}

fn is_scannable_source(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("js" | "jsx" | "ts" | "tsx" | "mjs" | "cjs" | "vue" | "svelte" | "html")
    )
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn file_exists_checks_files_only() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "index.html", "<html></html>");
        std::fs::create_dir(dir.path().join("src")).unwrap();
        assert!(file_exists(dir.path(), "index.html"));
        assert!(!file_exists(dir.path(), "src"));
        assert!(!file_exists(dir.path(), "missing.html"));
    }

    #[test]
    fn prefix_match_finds_config_variants() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "vite.config.ts", "export default {}");
        assert!(file_with_prefix_exists(dir.path(), "vite.config."));
        assert!(!file_with_prefix_exists(dir.path(), "next.config."));
    }

    #[test]
    fn size_excludes_node_modules_and_build_output() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/app.js", &"x".repeat(1024));
        write(dir.path(), "node_modules/dep/big.js", &"x".repeat(1024 * 1024));
        write(dir.path(), "dist/bundle.js", &"x".repeat(1024 * 1024));
        let mb = estimated_size_mb(dir.path());
        assert!(mb < 0.5, "expected excluded dirs to be skipped, got {mb}");
    }

    #[test]
    fn env_refs_found_in_sources() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "src/config.js",
            "const url = process.env.API_URL;\nconst key = import.meta.env.VITE_KEY;",
        );
        write(dir.path(), "README.md", "process.env.IGNORED_IN_DOCS");
        let refs = environment_variable_refs(dir.path());
        assert!(refs.contains("API_URL"));
        assert!(refs.contains("VITE_KEY"));
        assert!(!refs.contains("IGNORED_IN_DOCS"));
    }

    #[test]
    fn env_refs_respect_depth_bound() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a/b/c/deep.js", "process.env.TOO_DEEP");
        let refs = environment_variable_refs(dir.path());
        assert!(refs.is_empty());
    }
}
