//! Per-asset work tracking.

use std::fmt;
use std::path::{Path, PathBuf};

use super::error::FetchError;
use super::filename;

/// Lifecycle of a single work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkStatus {
    Pending,
    Running,
    Success,
    Failed,
    /// The destination already existed before any transfer.
    Skipped,
}

/// One asset to materialize.
#[derive(Debug, Clone)]
pub struct WorkItem {
    /// Manifest category (subdirectory under `models/`).
    pub category: String,
    /// Source URL.
    pub url: String,
    /// Directory the file lands in.
    pub dest_dir: PathBuf,
    /// Filename derived from the URL, when it encodes one.
    pub url_filename: Option<String>,
    /// Current status.
    pub status: WorkStatus,
    /// Attempts made so far.
    pub attempts: u32,
}

impl WorkItem {
    /// Create a pending item for `url` in `models_dir/category`.
    pub fn new(category: &str, url: &str, models_dir: &Path) -> Self {
        Self {
            category: category.to_string(),
            url: url.to_string(),
            dest_dir: models_dir.join(category),
            url_filename: filename::from_url(url),
            status: WorkStatus::Pending,
            attempts: 0,
        }
    }

    /// Final path, if the URL alone determines it.
    pub fn known_destination(&self) -> Option<PathBuf> {
        self.url_filename.as_ref().map(|name| self.dest_dir.join(name))
    }

    /// Label used in logs and failure reports.
    pub fn label(&self) -> String {
        format!("{}/{}", self.category, self.url)
    }
}

/// A file counts as present only when it exists, is non-empty, and has no
/// aria2c control file next to it.
///
/// aria2c writes straight to the final name, so an interrupted transfer
/// leaves a truncated file plus `<name>.aria2`. Such a file is not present;
/// the next run hands it back to aria2c, which resumes it.
pub fn is_materialized(path: &Path) -> bool {
    let complete = std::fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false);
    complete && !control_file(path).exists()
}

/// aria2c's resume control file for `path`.
pub fn control_file(path: &Path) -> PathBuf {
    let mut control = path.as_os_str().to_owned();
    control.push(".aria2");
    PathBuf::from(control)
}

/// What one transport produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transferred {
    /// Resolved final filename.
    pub filename: String,
    /// Bytes written (0 when already present).
    pub bytes: u64,
    /// The resolved destination turned out to exist already.
    pub already_present: bool,
}

/// How a fetch ended.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Written to the destination by the named transport.
    Downloaded { via: &'static str },
    /// The destination existed once the final name was known.
    AlreadyPresent,
    /// Every transport failed; carries the last error.
    Failed(FetchError),
}

/// Result of fetching one asset. Never an `Err`: failures are data.
#[derive(Debug)]
pub struct FetchResult {
    /// Resolved filename, when one was determined.
    pub filename: Option<String>,
    /// Bytes written to the final destination.
    pub bytes: u64,
    /// Outcome.
    pub outcome: FetchOutcome,
}

impl FetchResult {
    pub(crate) fn failed(error: FetchError) -> Self {
        Self {
            filename: None,
            bytes: 0,
            outcome: FetchOutcome::Failed(error),
        }
    }

    /// Check if the asset is now on disk.
    pub fn success(&self) -> bool {
        !matches!(self.outcome, FetchOutcome::Failed(_))
    }
}

impl fmt::Display for FetchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.filename.as_deref().unwrap_or("<unresolved>");
        match &self.outcome {
            FetchOutcome::Downloaded { via } => {
                write!(f, "{} ({} bytes via {})", name, self.bytes, via)
            }
            FetchOutcome::AlreadyPresent => write!(f, "{} (already present)", name),
            FetchOutcome::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_item_known_destination() {
        let item = WorkItem::new(
            "checkpoints",
            "https://host/a/model.safetensors",
            Path::new("/base/models"),
        );
        assert_eq!(
            item.known_destination(),
            Some(PathBuf::from("/base/models/checkpoints/model.safetensors"))
        );
        assert_eq!(item.status, WorkStatus::Pending);
        assert_eq!(item.label(), "checkpoints/https://host/a/model.safetensors");
    }

    #[test]
    fn test_work_item_opaque_url() {
        let item = WorkItem::new("loras", "https://civitai.com/api/download/models/9", Path::new("/m"));
        assert!(item.known_destination().is_none());
    }

    #[test]
    fn test_is_materialized_requires_content() {
        let dir = tempfile::TempDir::new().unwrap();
        let empty = dir.path().join("empty.bin");
        let full = dir.path().join("full.bin");
        std::fs::write(&empty, b"").unwrap();
        std::fs::write(&full, b"x").unwrap();

        assert!(!is_materialized(&empty));
        assert!(is_materialized(&full));
        assert!(!is_materialized(&dir.path().join("missing.bin")));
        assert!(!is_materialized(dir.path()));
    }

    #[test]
    fn test_interrupted_aria2_transfer_is_not_materialized() {
        let dir = tempfile::TempDir::new().unwrap();
        let partial = dir.path().join("big.safetensors");
        std::fs::write(&partial, b"first half").unwrap();
        std::fs::write(dir.path().join("big.safetensors.aria2"), b"ctl").unwrap();

        assert_eq!(control_file(&partial), dir.path().join("big.safetensors.aria2"));
        assert!(!is_materialized(&partial));

        std::fs::remove_file(control_file(&partial)).unwrap();
        assert!(is_materialized(&partial));
    }

    #[test]
    fn test_fetch_result_success() {
        let ok = FetchResult {
            filename: Some("a.bin".into()),
            bytes: 3,
            outcome: FetchOutcome::Downloaded { via: "http" },
        };
        assert!(ok.success());
        assert_eq!(ok.to_string(), "a.bin (3 bytes via http)");

        let failed = FetchResult::failed(FetchError::EmptyContent { url: "u".into() });
        assert!(!failed.success());
    }
}
