//! Remediation seam between the supervisor and the installer.

use futures::future::BoxFuture;

use crate::deps::{DependencyInstaller, InstallError};

/// Installs a single package on behalf of the supervisor.
pub trait Remediator: Send + Sync {
    fn install<'a>(&'a self, package: &'a str) -> BoxFuture<'a, Result<(), InstallError>>;
}

impl Remediator for DependencyInstaller {
    fn install<'a>(&'a self, package: &'a str) -> BoxFuture<'a, Result<(), InstallError>> {
        Box::pin(self.install_package(package))
    }
}
