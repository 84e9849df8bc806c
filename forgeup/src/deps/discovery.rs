//! Dependency manifest discovery.

use std::io;
use std::path::{Path, PathBuf};

use super::error::InstallError;

/// File name of a component's dependency manifest.
pub const REQUIREMENTS_FILE: &str = "requirements.txt";

/// Find `<base_dir>/*/requirements.txt` files that have content.
///
/// Zero-byte manifests are ignored entirely. A missing base directory means
/// there are no components yet. Results are sorted by path.
pub async fn find_manifests(base_dir: &Path) -> Result<Vec<PathBuf>, InstallError> {
    let discovery_error = |source: io::Error| InstallError::Discovery {
        path: base_dir.to_path_buf(),
        source,
    };

    let mut entries = match tokio::fs::read_dir(base_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(discovery_error(e)),
    };

    let mut manifests = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(discovery_error)? {
        let candidate = entry.path().join(REQUIREMENTS_FILE);
        match tokio::fs::metadata(&candidate).await {
            Ok(meta) if meta.is_file() && meta.len() > 0 => manifests.push(candidate),
            Ok(meta) if meta.is_file() => {
                tracing::debug!(path = %candidate.display(), "Skipping empty requirements file");
            }
            _ => {}
        }
    }

    manifests.sort();
    Ok(manifests)
}
