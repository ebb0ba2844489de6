//! The priority-ordered framework detection rules.

use std::path::Path;

use slipway_core::{DetectionResult, PackageManager, ProjectType};

use crate::manifest::Manifest;
use crate::tree;

/// Analyze a workspace directory.
///
/// First matching rule wins; unrecognized trees degrade to a static
/// site rooted at `.`. Never fails.
#[must_use]
pub fn detect(root: &Path) -> DetectionResult {
    let manifest = Manifest::load(root);
    let package_manager = package_manager(root);
    let has_package_manifest = manifest.is_some();
    let has_build_script = manifest.as_ref().is_some_and(Manifest::has_build_script);

    let rule = match_rule(root, manifest.as_ref());

    let build_command = if rule.needs_build && has_build_script {
        Some(package_manager.run_build_command().to_owned())
    } else {
        None
    };

    // An explicit output flag in the build script beats the inferred
    // directory.
    let build_directory = manifest
        .as_ref()
        .and_then(|m| m.script("build"))
        .and_then(parse_output_flag)
        .or_else(|| Some(rule.build_directory.to_owned()));

    DetectionResult {
        project_type: rule.project_type,
        framework: rule.framework,
        has_package_manifest,
        has_build_script,
        build_command,
        build_directory,
        is_pure_static: rule.is_pure_static,
        package_manager,
        estimated_size_mb: tree::estimated_size_mb(root),
        environment_variable_refs: tree::environment_variable_refs(root),
    }
}

struct Rule {
    project_type: ProjectType,
    framework: String,
    build_directory: &'static str,
    is_pure_static: bool,
    needs_build: bool,
}

impl Rule {
    fn built(project_type: ProjectType, framework: impl Into<String>, dir: &'static str) -> Self {
        Self {
            project_type,
            framework: framework.into(),
            build_directory: dir,
            is_pure_static: false,
            needs_build: true,
        }
    }
}

fn match_rule(root: &Path, manifest: Option<&Manifest>) -> Rule {
    let dep = |name: &str| manifest.is_some_and(|m| m.has_dependency(name));

    // 1. Vite, refined by which view library is also present.
    if dep("vite") || tree::file_with_prefix_exists(root, "vite.config.") {
        let framework = if dep("react") {
            "Vite + React"
        } else if dep("vue") {
            "Vite + Vue"
        } else {
            "Vite"
        };
        return Rule::built(ProjectType::Spa, framework, "dist");
    }
    // 2. Next.js.
    if dep("next") || tree::file_with_prefix_exists(root, "next.config.") {
        return Rule::built(ProjectType::Ssr, "Next.js", ".next");
    }
    // 3. Gatsby.
    if dep("gatsby") {
        return Rule::built(ProjectType::Static, "Gatsby", "public");
    }
    // 4. Remix.
    if dep("@remix-run/react") || dep("@remix-run/node") {
        return Rule::built(ProjectType::Ssr, "Remix", "build");
    }
    // 5. Nuxt.
    if dep("nuxt") || dep("nuxt3") {
        return Rule::built(ProjectType::Ssr, "Nuxt", ".nuxt/dist");
    }
    // 6. Vue CLI.
    if dep("@vue/cli-service") {
        return Rule::built(ProjectType::Spa, "Vue CLI", "dist");
    }
    // 7. Angular.
    if dep("@angular/core") || tree::file_exists(root, "angular.json") {
        return Rule::built(ProjectType::Spa, "Angular", "dist");
    }
    // 8. Svelte.
    if dep("svelte") {
        return Rule::built(ProjectType::Spa, "Svelte", "dist");
    }
    // 9. Create React App.
    if dep("react-scripts") {
        return Rule::built(ProjectType::Spa, "Create React App", "build");
    }
    // 10. Generic React.
    if dep("react") {
        return Rule::built(ProjectType::Spa, "React", "build");
    }
    // 11. Generic Vue.
    if dep("vue") {
        return Rule::built(ProjectType::Spa, "Vue", "dist");
    }
    // 12. Eleventy.
    if dep("@11ty/eleventy") || tree::file_exists(root, ".eleventy.js") {
        return Rule::built(ProjectType::Static, "Eleventy", "_site");
    }
    // 13. Plain files: index.html and no manifest means deployable as-is.
    if manifest.is_none() && tree::file_exists(root, "index.html") {
        return Rule {
            project_type: ProjectType::Static,
            framework: "Static HTML".into(),
            build_directory: ".",
            is_pure_static: true,
            needs_build: false,
        };
    }
    // 14. Unrecognized manifest that can still build something.
    if manifest.is_some_and(Manifest::has_build_script) {
        return Rule::built(ProjectType::Spa, "Unknown (build script)", "dist");
    }
    // 15. Nothing recognizable; serve the tree as-is.
    Rule {
        project_type: ProjectType::Static,
        framework: "Unknown".into(),
        build_directory: ".",
        is_pure_static: false,
        needs_build: false,
    }
}

/// Package manager from lockfile presence; first match wins.
fn package_manager(root: &Path) -> PackageManager {
    if tree::file_exists(root, "bun.lockb") || tree::file_exists(root, "bun.lock") {
        PackageManager::Bun
    } else if tree::file_exists(root, "pnpm-lock.yaml") {
        PackageManager::Pnpm
    } else if tree::file_exists(root, "yarn.lock") {
        PackageManager::Yarn
    } else {
        PackageManager::Npm
    }
}

/// Extract an explicit output directory from a build script
/// (`--outDir dist`, `--out-dir=www`, `--output x`, `--dist y`).
fn parse_output_flag(script: &str) -> Option<String> {
    const FLAGS: &[&str] = &["--outDir", "--out-dir", "--output", "--dist"];

    let tokens: Vec<&str> = script.split_whitespace().collect();
    for (index, token) in tokens.iter().enumerate() {
        for flag in FLAGS {
            if let Some(rest) = token.strip_prefix(flag) {
                if let Some(value) = rest.strip_prefix('=') {
                    if !value.is_empty() {
                        return Some(value.to_owned());
                    }
                } else if rest.is_empty() {
                    if let Some(value) = tokens.get(index + 1) {
                        if !value.starts_with('-') {
                            return Some((*value).to_owned());
                        }
                    }
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    fn manifest(root: &Path, json: &str) {
        write(root, "package.json", json);
    }

    #[test]
    fn vite_react_detected() {
        let dir = TempDir::new().unwrap();
        manifest(
            dir.path(),
            r#"{"dependencies": {"react": "18"}, "devDependencies": {"vite": "5"},
                "scripts": {"build": "vite build"}}"#,
        );
        let result = detect(dir.path());
        assert_eq!(result.project_type, ProjectType::Spa);
        assert_eq!(result.framework, "Vite + React");
        assert_eq!(result.build_directory.as_deref(), Some("dist"));
        assert_eq!(result.build_command.as_deref(), Some("npm run build"));
        assert!(!result.is_pure_static);
    }

    #[test]
    fn vite_config_file_alone_is_a_marker() {
        let dir = TempDir::new().unwrap();
        manifest(dir.path(), r#"{"scripts": {"build": "vite build"}}"#);
        write(dir.path(), "vite.config.mjs", "export default {}");
        let result = detect(dir.path());
        assert_eq!(result.framework, "Vite");
    }

    #[test]
    fn next_beats_react() {
        let dir = TempDir::new().unwrap();
        manifest(
            dir.path(),
            r#"{"dependencies": {"next": "14", "react": "18"},
                "scripts": {"build": "next build"}}"#,
        );
        let result = detect(dir.path());
        assert_eq!(result.project_type, ProjectType::Ssr);
        assert_eq!(result.framework, "Next.js");
        assert_eq!(result.build_directory.as_deref(), Some(".next"));
    }

    #[test]
    fn vite_beats_next() {
        // Rule order is priority order: a repo listing both is a Vite app.
        let dir = TempDir::new().unwrap();
        manifest(
            dir.path(),
            r#"{"dependencies": {"next": "14"}, "devDependencies": {"vite": "5"},
                "scripts": {"build": "vite build"}}"#,
        );
        assert_eq!(detect(dir.path()).framework, "Vite");
    }

    #[test]
    fn gatsby_is_static() {
        let dir = TempDir::new().unwrap();
        manifest(
            dir.path(),
            r#"{"dependencies": {"gatsby": "5"}, "scripts": {"build": "gatsby build"}}"#,
        );
        let result = detect(dir.path());
        assert_eq!(result.project_type, ProjectType::Static);
        assert_eq!(result.build_directory.as_deref(), Some("public"));
    }

    #[test]
    fn remix_nuxt_vue_cli_angular_svelte_cra() {
        let cases: &[(&str, &str, &str)] = &[
            (r#"{"dependencies": {"@remix-run/react": "2"}}"#, "Remix", "build"),
            (r#"{"dependencies": {"nuxt": "3"}}"#, "Nuxt", ".nuxt/dist"),
            (r#"{"devDependencies": {"@vue/cli-service": "5"}}"#, "Vue CLI", "dist"),
            (r#"{"dependencies": {"@angular/core": "17"}}"#, "Angular", "dist"),
            (r#"{"devDependencies": {"svelte": "4"}}"#, "Svelte", "dist"),
            (r#"{"dependencies": {"react-scripts": "5"}}"#, "Create React App", "build"),
        ];
        for (json, framework, dir_name) in cases {
            let dir = TempDir::new().unwrap();
            manifest(dir.path(), json);
            let result = detect(dir.path());
            assert_eq!(&result.framework, framework);
            assert_eq!(result.build_directory.as_deref(), Some(*dir_name));
        }
    }

    #[test]
    fn generic_react_and_vue() {
        let dir = TempDir::new().unwrap();
        manifest(dir.path(), r#"{"dependencies": {"react": "18"}}"#);
        let result = detect(dir.path());
        assert_eq!(result.framework, "React");
        assert_eq!(result.build_directory.as_deref(), Some("build"));

        let dir = TempDir::new().unwrap();
        manifest(dir.path(), r#"{"dependencies": {"vue": "3"}}"#);
        let result = detect(dir.path());
        assert_eq!(result.framework, "Vue");
        assert_eq!(result.build_directory.as_deref(), Some("dist"));
    }

    #[test]
    fn pure_static_site() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "index.html", "<html></html>");
        let result = detect(dir.path());
        assert_eq!(result.project_type, ProjectType::Static);
        assert_eq!(result.framework, "Static HTML");
        assert!(result.is_pure_static);
        assert_eq!(result.build_directory.as_deref(), Some("."));
        assert!(result.build_command.is_none());
        assert!(result.skips_build());
    }

    #[test]
    fn index_html_with_manifest_is_not_pure_static() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "index.html", "<html></html>");
        manifest(dir.path(), r#"{"scripts": {"build": "esbuild ."}}"#);
        let result = detect(dir.path());
        assert!(!result.is_pure_static);
        assert_eq!(result.framework, "Unknown (build script)");
        assert_eq!(result.build_directory.as_deref(), Some("dist"));
    }

    #[test]
    fn empty_tree_degrades_to_static_root() {
        let dir = TempDir::new().unwrap();
        let result = detect(dir.path());
        assert_eq!(result.project_type, ProjectType::Static);
        assert_eq!(result.framework, "Unknown");
        assert_eq!(result.build_directory.as_deref(), Some("."));
        assert!(!result.is_pure_static);
        assert!(result.skips_build());
    }

    #[test]
    fn malformed_manifest_degrades_to_no_manifest() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "package.json", "{broken");
        write(dir.path(), "index.html", "<html></html>");
        let result = detect(dir.path());
        assert!(!result.has_package_manifest);
        assert!(result.is_pure_static);
    }

    #[test]
    fn lockfile_priority_bun_pnpm_yarn_npm() {
        let dir = TempDir::new().unwrap();
        manifest(dir.path(), r#"{"dependencies": {"react": "18"}, "scripts": {"build": "x"}}"#);
        write(dir.path(), "yarn.lock", "");
        assert_eq!(detect(dir.path()).package_manager, PackageManager::Yarn);
        write(dir.path(), "pnpm-lock.yaml", "");
        assert_eq!(detect(dir.path()).package_manager, PackageManager::Pnpm);
        write(dir.path(), "bun.lockb", "");
        assert_eq!(detect(dir.path()).package_manager, PackageManager::Bun);
    }

    #[test]
    fn build_command_follows_package_manager() {
        let dir = TempDir::new().unwrap();
        manifest(
            dir.path(),
            r#"{"devDependencies": {"vite": "5"}, "scripts": {"build": "vite build"}}"#,
        );
        write(dir.path(), "pnpm-lock.yaml", "");
        let result = detect(dir.path());
        assert_eq!(result.build_command.as_deref(), Some("pnpm run build"));
    }

    #[test]
    fn output_flag_overrides_inferred_directory() {
        let dir = TempDir::new().unwrap();
        manifest(
            dir.path(),
            r#"{"devDependencies": {"vite": "5"},
                "scripts": {"build": "vite build --outDir www"}}"#,
        );
        assert_eq!(detect(dir.path()).build_directory.as_deref(), Some("www"));
    }

    #[test]
    fn output_flag_forms() {
        assert_eq!(parse_output_flag("vite build --outDir www"), Some("www".into()));
        assert_eq!(parse_output_flag("vite build --outDir=www"), Some("www".into()));
        assert_eq!(parse_output_flag("tool --out-dir public"), Some("public".into()));
        assert_eq!(parse_output_flag("tool --output web"), Some("web".into()));
        assert_eq!(parse_output_flag("tool --dist site"), Some("site".into()));
        assert_eq!(parse_output_flag("vite build"), None);
        // A trailing flag with no value is ignored.
        assert_eq!(parse_output_flag("vite build --outDir"), None);
        assert_eq!(parse_output_flag("vite build --outDir --minify"), None);
    }

    #[test]
    fn detection_is_deterministic() {
        let dir = TempDir::new().unwrap();
        manifest(
            dir.path(),
            r#"{"dependencies": {"react": "18"}, "devDependencies": {"vite": "5"},
                "scripts": {"build": "vite build"}}"#,
        );
        write(dir.path(), "src/main.jsx", "console.log(import.meta.env.VITE_API);");
        let first = detect(dir.path());
        let second = detect(dir.path());
        assert_eq!(first, second);
        assert!(first.environment_variable_refs.contains("VITE_API"));
    }
}
