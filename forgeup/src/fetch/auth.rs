//! Bearer-token authorization for gated hosts.

use std::sync::atomic::{AtomicBool, Ordering};

use reqwest::Url;

use crate::config::AuthConfig;

/// Decides which requests carry the bearer token.
#[derive(Debug)]
pub struct Authorizer {
    config: AuthConfig,
    warned: AtomicBool,
}

impl Authorizer {
    /// Create an authorizer from configuration.
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config,
            warned: AtomicBool::new(false),
        }
    }

    /// Create an authorizer that never authorizes anything.
    pub fn disabled() -> Self {
        Self::new(AuthConfig {
            token: None,
            hosts: Vec::new(),
        })
    }

    /// Check if the URL's host (or a parent domain of it) is gated.
    pub fn requires_auth(&self, url: &str) -> bool {
        let Some(host) = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
        else {
            return false;
        };

        self.config.hosts.iter().any(|gated| {
            let gated = gated.trim().trim_start_matches('.').to_ascii_lowercase();
            !gated.is_empty()
                && (host == gated
                    || host
                        .strip_suffix(gated.as_str())
                        .is_some_and(|prefix| prefix.ends_with('.')))
        })
    }

    /// `Authorization` header value for the URL, if any.
    ///
    /// A gated URL without a configured token is fetched unauthenticated;
    /// the first such request logs a warning.
    pub fn bearer_for(&self, url: &str) -> Option<String> {
        if !self.requires_auth(url) {
            return None;
        }
        match &self.config.token {
            Some(token) => Some(format!("Bearer {}", token)),
            None => {
                if !self.warned.swap(true, Ordering::Relaxed) {
                    tracing::warn!(
                        url = %url,
                        "Gated host but no auth token configured, downloading unauthenticated"
                    );
                }
                None
            }
        }
    }
}
