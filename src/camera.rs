use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

use crate::util::math::degree_to_radian;

/// Lower polar bound keeping the eye off the +Y pole.
pub const MIN_POLAR: f32 = 0.02;
pub const MAX_POLAR: f32 = PI;

/// Orbit around the origin in spherical coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraRig {
    /// Radians, unbounded, wraps through the trig functions.
    pub azimuth: f32,
    /// Radians, kept in `[MIN_POLAR, MAX_POLAR]`.
    pub polar: f32,
    pub radius: f32,
}

impl Default for CameraRig {
    fn default() -> Self {
        Self {
            azimuth: 0.0,
            polar: degree_to_radian(45.0),
            radius: 10.0,
        }
    }
}

impl CameraRig {
    pub fn new(azimuth: f32, polar: f32, radius: f32) -> Self {
        Self {
            azimuth,
            polar: polar.clamp(MIN_POLAR, MAX_POLAR),
            radius,
        }
    }

    pub fn apply_drag(&mut self, delta: glam::Vec2, sensitivity: f32) {
        self.azimuth -= delta.x * sensitivity;
        self.polar -= delta.y * sensitivity;
        // NaN deltas would slip through clamp
        if !self.polar.is_finite() {
            self.polar = MIN_POLAR;
        }
        self.polar = self.polar.clamp(MIN_POLAR, MAX_POLAR);
    }

    pub fn apply_zoom(&mut self, scroll_delta: f32, sensitivity: f32, min_radius: f32) {
        self.radius = (self.radius - scroll_delta * sensitivity).max(min_radius);
    }

    pub fn eye_position(&self) -> glam::Vec3 {
        let (sin_azimuth, cos_azimuth) = self.azimuth.sin_cos();
        let (sin_polar, cos_polar) = self.polar.sin_cos();
        glam::Vec3::new(sin_azimuth * sin_polar, cos_polar, cos_azimuth * sin_polar) * self.radius
    }
}

/// Sensitivities and limits for mapping pointer input onto the rig.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraController {
    pub initial_azimuth: f32,
    pub initial_polar: f32,
    pub initial_radius: f32,
    pub drag_speed: f32,
    pub zoom_speed: f32,
    pub min_radius: f32,
}

impl Default for CameraController {
    fn default() -> Self {
        let rig = CameraRig::default();
        Self {
            initial_azimuth: rig.azimuth,
            initial_polar: rig.polar,
            initial_radius: rig.radius,
            drag_speed: 0.003,
            zoom_speed: 0.1,
            min_radius: 0.1,
        }
    }
}

impl CameraController {
    pub fn rig(&self) -> CameraRig {
        CameraRig::new(self.initial_azimuth, self.initial_polar, self.initial_radius)
    }

    /// Returns true when the rig moved.
    pub fn drag(&self, rig: &mut CameraRig, delta: glam::Vec2) -> bool {
        if delta == glam::Vec2::ZERO {
            return false;
        }
        rig.apply_drag(delta, self.drag_speed);
        tracing::trace!(azimuth = rig.azimuth, polar = rig.polar, "camera orbit");
        true
    }

    /// Returns true when the rig moved.
    pub fn zoom(&self, rig: &mut CameraRig, scroll_delta: f32) -> bool {
        if scroll_delta == 0.0 {
            return false;
        }
        rig.apply_zoom(scroll_delta, self.zoom_speed, self.min_radius);
        tracing::trace!(radius = rig.radius, "camera zoom");
        true
    }
}
