//! Declarative input manifests.
//!
//! Both the asset manifest (category → URLs) and the component manifest
//! (name → mirrors) share one JSON shape: an object whose values are arrays
//! of strings. Key order is preserved so work is scheduled in file order.
//!
//! ```json
//! {
//!   "checkpoints": ["https://example.com/sd_xl_base_1.0.safetensors"],
//!   "loras": []
//! }
//! ```

use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

/// Errors raised while loading a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest file could not be read.
    #[error("failed to read manifest {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The manifest is not valid JSON.
    #[error("failed to parse manifest: {0}")]
    Parse(#[from] serde_json::Error),

    /// The JSON does not have the expected shape.
    #[error("invalid manifest: {0}")]
    Shape(String),
}

/// Ordered mapping of name to locator list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<(String, Vec<String>)>,
}

impl Manifest {
    /// Create an empty manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Locators are trimmed and blank ones dropped.
    pub fn with_entry<I, S>(mut self, name: impl Into<String>, locators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let locators = locators
            .into_iter()
            .map(Into::into)
            .map(|s: String| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        self.entries.push((name.into(), locators));
        self
    }

    /// Load a manifest from a JSON file.
    pub fn from_path(path: &Path) -> Result<Self, ManifestError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Parse a manifest from a JSON string.
    pub fn from_json_str(raw: &str) -> Result<Self, ManifestError> {
        let value: Value = serde_json::from_str(raw)?;
        let Value::Object(map) = value else {
            return Err(ManifestError::Shape("top level must be an object".into()));
        };

        let mut manifest = Manifest::new();
        for (name, locators) in map {
            if name.trim().is_empty() {
                return Err(ManifestError::Shape("empty entry name".into()));
            }
            let Value::Array(items) = locators else {
                return Err(ManifestError::Shape(format!(
                    "entry {:?} must be an array of strings",
                    name
                )));
            };
            let mut urls = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) => urls.push(s),
                    other => {
                        return Err(ManifestError::Shape(format!(
                            "entry {:?} contains a non-string locator: {}",
                            name, other
                        )))
                    }
                }
            }
            manifest = manifest.with_entry(name, urls);
        }
        Ok(manifest)
    }

    /// Entries in file order.
    pub fn entries(&self) -> &[(String, Vec<String>)] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the manifest has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of locators across all entries.
    pub fn locator_count(&self) -> usize {
        self.entries.iter().map(|(_, l)| l.len()).sum()
    }
}
