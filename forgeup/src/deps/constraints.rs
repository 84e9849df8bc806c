//! Protected-package constraint set.
//!
//! Before any install in a run, the installed version of the protected
//! package is read back from the target environment and pinned in a
//! constraints file. Every install of the run passes that file, so no
//! component can upgrade or downgrade the accelerator stack. Companion
//! packages are left out on purpose; they resolve against the pin.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use super::error::InstallError;

/// Pins derived from the environment at snapshot time. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstraintSet {
    pins: Vec<(String, String)>,
    path: Option<PathBuf>,
}

impl ConstraintSet {
    /// A set with no pins and no file.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A set pinning `package` to exactly `version`.
    pub fn pinned(package: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            pins: vec![(package.into(), version.into())],
            path: None,
        }
    }

    /// Check if the set pins nothing.
    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    /// Pinned version of `package`, if any.
    pub fn version_of(&self, package: &str) -> Option<&str> {
        self.pins
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(package))
            .map(|(_, version)| version.as_str())
    }

    /// Path of the written constraints file.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Constraints file content, one `name==version` per line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (name, version) in &self.pins {
            let _ = writeln!(out, "{}=={}", name, version);
        }
        out
    }

    /// Write the file into `dir` and remember its path.
    ///
    /// An empty set writes nothing.
    pub async fn write_to(mut self, dir: &Path) -> Result<Self, InstallError> {
        if self.is_empty() {
            return Ok(self);
        }
        let path = dir.join(format!("forgeup-constraints-{}.txt", std::process::id()));
        let file_error = |source: std::io::Error| InstallError::ConstraintsFile {
            path: path.clone(),
            source,
        };
        tokio::fs::create_dir_all(dir).await.map_err(file_error)?;
        tokio::fs::write(&path, self.render())
            .await
            .map_err(file_error)?;
        self.path = Some(path);
        Ok(self)
    }
}

/// Extract the `Version:` field from `pip show` style output.
pub fn parse_show_version(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        let value = value.trim();
        (key.trim().eq_ignore_ascii_case("version") && !value.is_empty())
            .then(|| value.to_string())
    })
}

/// Check if `pip show` style output says the package is not installed.
///
/// Both pip and uv report this as `Package(s) not found`; any other failure
/// of the query is not evidence that the package is absent.
pub fn reports_not_found(output: &str) -> bool {
    output.to_ascii_lowercase().contains("package(s) not found")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reports_not_found() {
        assert!(reports_not_found("warning: Package(s) not found for: torch"));
        assert!(reports_not_found("WARNING: Package(s) not found: torch"));
        assert!(!reports_not_found("error: No interpreter found for path `/env/bin/python`"));
        assert!(!reports_not_found(""));
    }

    #[test]
    fn test_parse_show_version() {
        let output = "Name: torch\nVersion: 2.3.1+cu121\nLocation: /env/lib\nRequires: filelock\n";
        assert_eq!(parse_show_version(output), Some("2.3.1+cu121".to_string()));
        assert_eq!(parse_show_version("Name: torch\n"), None);
        assert_eq!(parse_show_version("Version:   \n"), None);
    }

    #[test]
    fn test_render_and_lookup() {
        let set = ConstraintSet::pinned("torch", "2.1.0");
        assert_eq!(set.render(), "torch==2.1.0\n");
        assert_eq!(set.version_of("Torch"), Some("2.1.0"));
        assert_eq!(set.version_of("torchvision"), None);
        assert!(ConstraintSet::empty().render().is_empty());
    }

    #[tokio::test]
    async fn test_write_to() {
        let dir = tempfile::TempDir::new().unwrap();
        let set = ConstraintSet::pinned("torch", "2.1.0")
            .write_to(&dir.path().join("tmp"))
            .await
            .unwrap();

        let path = set.path().unwrap();
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("forgeup-constraints-"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "torch==2.1.0\n");
    }

    #[tokio::test]
    async fn test_empty_set_writes_nothing() {
        let dir = tempfile::TempDir::new().unwrap();
        let set = ConstraintSet::empty().write_to(dir.path()).await.unwrap();
        assert!(set.path().is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
