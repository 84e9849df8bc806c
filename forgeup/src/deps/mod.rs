//! Dependency installation.
//!
//! ```text
//! custom_nodes/*/requirements.txt (non-empty)
//!         │
//!         ▼
//! uv pip show <protected>  ──►  ConstraintSet  ──►  forgeup-constraints-<pid>.txt
//!                                                        │
//!         ┌──────────────────────────────────────────────┘
//!         ▼
//! uv pip install --python=<interp> --no-cache -r <req> -c <constraints>
//! ```
//!
//! Installs have no wall-clock timeout: native-extension builds can take a
//! long time and are allowed to.

mod constraints;
mod discovery;
mod error;
mod installer;

pub use constraints::{parse_show_version, ConstraintSet};
pub use discovery::{find_manifests, REQUIREMENTS_FILE};
pub use error::InstallError;
pub use installer::DependencyInstaller;
