//! Viewer configuration, optionally read from a JSON file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    camera::CameraController, controls::ShadingParams, kernel::KernelDefines,
    scene::{SceneError, SceneLayout, SPHERE_STRIDE},
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error(transparent)]
    Scene(#[from] SceneError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    // Window
    pub window_width: u32,
    pub window_height: u32,
    /// Render target is the window size divided by this.
    pub render_scale: u32,

    // Kernel
    pub kernel_path: PathBuf,
    pub kernel: KernelDefines,
    pub compile_budget_ms: u64,

    // Scene
    pub scene: SceneLayout,
    /// Fixed seed for reproducible scenes; entropy when absent.
    pub seed: Option<u64>,

    pub camera: CameraController,
    pub shading: ShadingParams,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            window_width: 1280,
            window_height: 960,
            render_scale: 2,
            kernel_path: PathBuf::from("src/asset/shader/ray_trace.wgsl"),
            kernel: KernelDefines::default(),
            compile_budget_ms: 250,
            scene: SceneLayout::default(),
            seed: None,
            camera: CameraController::default(),
            shading: ShadingParams::default(),
        }
    }
}

impl ViewerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_width == 0 || self.window_height == 0 {
            return Err(ConfigError::Invalid("window size must be non-zero".into()));
        }
        if self.render_scale == 0 {
            return Err(ConfigError::Invalid("render_scale must be at least 1".into()));
        }
        let KernelDefines {
            spheres_count,
            group_size_x,
            group_size_y,
        } = self.kernel;
        if group_size_x == 0 || group_size_y == 0 {
            return Err(ConfigError::Invalid("workgroup size must be non-zero".into()));
        }
        let scene_bytes = u64::from(spheres_count) * SPHERE_STRIDE;
        let max_binding = u64::from(wgpu::Limits::default().max_uniform_buffer_binding_size);
        if scene_bytes > max_binding {
            return Err(ConfigError::Invalid(format!(
                "spheres_count {spheres_count} needs {scene_bytes} bytes of scene uniform, the limit is {max_binding}"
            )));
        }
        if self.camera.min_radius <= 0.0 {
            return Err(ConfigError::Invalid("camera min_radius must be positive".into()));
        }
        self.scene.validate(spheres_count as usize)?;
        Ok(())
    }

    /// Size of the accumulation target for a given window size.
    pub fn render_target_size(&self, window_width: u32, window_height: u32) -> (u32, u32) {
        (
            (window_width / self.render_scale).max(1),
            (window_height / self.render_scale).max(1),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ViewerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.render_target_size(1280, 960), (640, 480));
        assert_eq!(config.render_target_size(1, 1), (1, 1));
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("viewer.json");
        std::fs::write(
            &path,
            r#"{ "seed": 7, "kernel": { "spheres_count": 12 }, "scene": { "preserve_reserved_light": true } }"#,
        )
        .unwrap();

        let config = ViewerConfig::load(&path).unwrap();
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.kernel.spheres_count, 12);
        assert_eq!(config.kernel.group_size_x, 16);
        assert!(config.scene.preserve_reserved_light);
        assert_eq!(config.shading, ShadingParams::default());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let config = ViewerConfig {
            render_scale: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = ViewerConfig::default();
        config.kernel.spheres_count = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Scene(_))));
    }

    #[test]
    fn scene_must_fit_one_uniform_binding() {
        let mut config = ViewerConfig::default();
        config.kernel.spheres_count = 2048;
        config.validate().unwrap();

        config.kernel.spheres_count = 2049;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("viewer.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(ViewerConfig::load(&path), Err(ConfigError::Parse { .. })));
    }
}
