//! Lenient `package.json` access.

use std::path::Path;

use serde_json::Value;

/// A parsed package manifest.
///
/// Loading never fails: a missing or malformed file degrades to "no
/// manifest", which is exactly how the detection rules treat it.
#[derive(Debug, Clone)]
pub struct Manifest {
    raw: Value,
}

impl Manifest {
    /// Load `root/package.json`, if present and well-formed.
    #[must_use]
    pub fn load(root: &Path) -> Option<Self> {
        let contents = std::fs::read_to_string(root.join("package.json")).ok()?;
        let raw: Value = serde_json::from_str(&contents).ok()?;
        raw.is_object().then_some(Self { raw })
    }

    /// The `name` field.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.raw.get("name").and_then(Value::as_str)
    }

    /// Returns `true` if `name` appears in `dependencies` or
    /// `devDependencies`.
    #[must_use]
    pub fn has_dependency(&self, name: &str) -> bool {
        ["dependencies", "devDependencies"].iter().any(|section| {
            self.raw
                .get(*section)
                .and_then(Value::as_object)
                .is_some_and(|deps| deps.contains_key(name))
        })
    }

    /// The named script, if declared.
    #[must_use]
    pub fn script(&self, name: &str) -> Option<&str> {
        self.raw
            .get("scripts")
            .and_then(|scripts| scripts.get(name))
            .and_then(Value::as_str)
    }

    /// Returns `true` if a `build` script is declared.
    #[must_use]
    pub fn has_build_script(&self) -> bool {
        self.script("build").is_some()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn manifest_from(json: &str) -> Option<Manifest> {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("package.json"), json).unwrap();
        Manifest::load(dir.path())
    }

    #[test]
    fn missing_manifest_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(Manifest::load(dir.path()).is_none());
    }

    #[test]
    fn malformed_manifest_is_none() {
        assert!(manifest_from("{not json").is_none());
        assert!(manifest_from("[1, 2]").is_none());
    }

    #[test]
    fn dependencies_cover_both_sections() {
        let manifest = manifest_from(
            r#"{"dependencies": {"react": "^18.0.0"}, "devDependencies": {"vite": "^5.0.0"}}"#,
        )
        .unwrap();
        assert!(manifest.has_dependency("react"));
        assert!(manifest.has_dependency("vite"));
        assert!(!manifest.has_dependency("next"));
    }

    #[test]
    fn scripts_lookup() {
        let manifest =
            manifest_from(r#"{"scripts": {"build": "vite build --outDir web"}}"#).unwrap();
        assert!(manifest.has_build_script());
        assert_eq!(manifest.script("build"), Some("vite build --outDir web"));
        assert!(manifest.script("test").is_none());
    }

    #[test]
    fn name_field() {
        let manifest = manifest_from(r#"{"name": "my-site"}"#).unwrap();
        assert_eq!(manifest.name(), Some("my-site"));
    }
}
