//! Classification of child output lines.

use std::sync::OnceLock;

use regex::Regex;

/// Substrings that mean the server finished starting up.
pub const DEFAULT_STARTUP_MARKERS: &[&str] = &[
    "Starting server",
    "Server started",
    "Serving on",
    "ComfyUI startup time",
    "Total VRAM",
    "Device: cuda",
];

const MISSING_MODULE_PATTERN: &str = r"No module named '([^']+)'";

fn missing_module_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(MISSING_MODULE_PATTERN).ok())
        .as_ref()
}

/// What a single output line means to the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    StartupComplete,
    /// Import failure naming the missing module.
    MissingModule(String),
    Other,
}

/// Maps output lines to [`LineEvent`]s.
#[derive(Debug, Clone)]
pub struct LineClassifier {
    startup_markers: Vec<String>,
    missing_module: Option<Regex>,
}

impl Default for LineClassifier {
    fn default() -> Self {
        Self {
            startup_markers: DEFAULT_STARTUP_MARKERS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            missing_module: missing_module_re().cloned(),
        }
    }
}

impl LineClassifier {
    /// Replace the startup markers.
    pub fn with_startup_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.startup_markers = markers.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the missing-module pattern. Capture group 1 is the module.
    pub fn with_missing_module_pattern(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.missing_module = Some(Regex::new(pattern)?);
        Ok(self)
    }

    /// Classify one line. Missing-module reports win over startup markers.
    pub fn classify(&self, line: &str) -> LineEvent {
        let missing = self
            .missing_module
            .as_ref()
            .and_then(|re| re.captures(line))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string());
        if let Some(module) = missing {
            return LineEvent::MissingModule(module);
        }

        if self.startup_markers.iter().any(|m| line.contains(m.as_str())) {
            LineEvent::StartupComplete
        } else {
            LineEvent::Other
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_module() {
        let classifier = LineClassifier::default();
        assert_eq!(
            classifier.classify("ModuleNotFoundError: No module named 'omegaconf'"),
            LineEvent::MissingModule("omegaconf".to_string())
        );
        assert_eq!(
            classifier.classify("No module named 'cv2.ximgproc'"),
            LineEvent::MissingModule("cv2.ximgproc".to_string())
        );
    }

    #[test]
    fn test_startup_markers() {
        let classifier = LineClassifier::default();
        assert_eq!(
            classifier.classify("To see the GUI go to: http://0.0.0.0:8188 Starting server"),
            LineEvent::StartupComplete
        );
        assert_eq!(
            classifier.classify("Total VRAM 24564 MB, total RAM 64221 MB"),
            LineEvent::StartupComplete
        );
        assert_eq!(classifier.classify("Loading custom nodes"), LineEvent::Other);
        assert_eq!(classifier.classify(""), LineEvent::Other);
    }

    #[test]
    fn test_injected_markers_and_pattern() {
        let classifier = LineClassifier::default()
            .with_startup_markers(["READY"])
            .with_missing_module_pattern(r"missing: (\S+)")
            .unwrap();

        assert_eq!(classifier.classify("READY"), LineEvent::StartupComplete);
        assert_eq!(classifier.classify("Starting server"), LineEvent::Other);
        assert_eq!(
            classifier.classify("missing: kornia"),
            LineEvent::MissingModule("kornia".to_string())
        );
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(LineClassifier::default()
            .with_missing_module_pattern("(")
            .is_err());
    }
}
