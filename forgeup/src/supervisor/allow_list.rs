//! Modules eligible for automatic installation.

use std::collections::BTreeSet;

/// Optional modules the supervisor may install on demand.
pub const DEFAULT_OPTIONAL_MODULES: &[&str] = &[
    "aiohttp",
    "requests",
    "psutil",
    "scipy",
    "comfyui-frontend-package",
    "torchsde",
    "omegaconf",
    "accelerate",
    "diffusers",
    "controlnet_aux",
    "opencv-python",
    "mediapipe",
    "ultralytics",
    "insightface",
    "basicsr",
    "facexlib",
    "gfpgan",
    "realesrgan",
    "codeformer",
    "clip",
    "open_clip_torch",
    "timm",
    "kornia",
    "albumentations",
    "imageio",
    "imageio-ffmpeg",
    "av",
    "moviepy",
    "pytorch_lightning",
    "wandb",
    "tensorboard",
    "tensorboardX",
    "onnxruntime",
    "onnxruntime-gpu",
    "comfyui_controlnet_aux",
    "comfyui_ultralytics",
    "comfyui_insightface",
    "comfyui_face_restoration",
    "comfyui_anime_segmentation",
    "comfyui_face_detection",
    "comfyui_face_parsing",
    "comfyui_face_landmark",
    "comfyui_face_swap",
    "comfyui_face_enhancement",
];

/// Import names whose distribution package is named differently.
const IMPORT_ALIASES: &[(&str, &str)] = &[
    ("cv2", "opencv-python"),
    ("open_clip", "open_clip_torch"),
];

/// Closed set of installable modules.
#[derive(Debug, Clone)]
pub struct AllowList {
    modules: BTreeSet<String>,
}

impl Default for AllowList {
    fn default() -> Self {
        Self::new(DEFAULT_OPTIONAL_MODULES.iter().copied())
    }
}

impl AllowList {
    /// Create an allow-list from explicit module names.
    pub fn new<I, S>(modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            modules: modules
                .into_iter()
                .map(Into::into)
                .map(|m: String| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    /// The default list plus `extra`.
    pub fn with_extra(mut self, extra: &[String]) -> Self {
        self.modules.extend(
            extra
                .iter()
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty()),
        );
        self
    }

    /// Package to install for a missing module, or `None` if it is not allowed.
    ///
    /// Matches the full dotted name first, then its top-level package, then
    /// a known import alias whose package is itself allowed.
    pub fn resolve(&self, module: &str) -> Option<String> {
        let module = module.trim();
        if self.modules.contains(module) {
            return Some(module.to_string());
        }
        let top = module.split('.').next().unwrap_or(module);
        if self.modules.contains(top) {
            return Some(top.to_string());
        }
        IMPORT_ALIASES
            .iter()
            .find(|(import, _)| *import == top)
            .map(|(_, package)| *package)
            .filter(|package| self.modules.contains(*package))
            .map(str::to_string)
    }

    /// Check if the module may be installed.
    pub fn allows(&self, module: &str) -> bool {
        self.resolve(module).is_some()
    }

    /// Number of allowed names.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Check if nothing is allowed.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
