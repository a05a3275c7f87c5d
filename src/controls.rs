use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use winit::event::VirtualKeyCode;

use crate::input::FrameInput;

/// User tunable shading inputs of the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadingParams {
    pub ambient_light_intensity: f32,
    pub sphere_lights_intensity: f32,
    pub metal_roughness: f32,
    pub refractive_index: f32,
    pub dof_radius: f32,
    pub dof_focal_plane: f32,
}

impl Default for ShadingParams {
    fn default() -> Self {
        Self {
            ambient_light_intensity: 15.0,
            sphere_lights_intensity: 1.0,
            metal_roughness: 0.0,
            refractive_index: 1.5,
            dof_radius: 0.0,
            dof_focal_plane: 8.0,
        }
    }
}

impl ShadingParams {
    pub fn get(&self, parameter: Parameter) -> f32 {
        match parameter {
            Parameter::AmbientLightIntensity => self.ambient_light_intensity,
            Parameter::SphereLightsIntensity => self.sphere_lights_intensity,
            Parameter::MetalRoughness => self.metal_roughness,
            Parameter::RefractiveIndex => self.refractive_index,
            Parameter::DofRadius => self.dof_radius,
            Parameter::DofFocalPlane => self.dof_focal_plane,
        }
    }

    /// Store `value` clamped into the parameter's range.
    pub fn set(&mut self, parameter: Parameter, value: f32) {
        let value = value.clamp(*parameter.range().start(), *parameter.range().end());
        let slot = match parameter {
            Parameter::AmbientLightIntensity => &mut self.ambient_light_intensity,
            Parameter::SphereLightsIntensity => &mut self.sphere_lights_intensity,
            Parameter::MetalRoughness => &mut self.metal_roughness,
            Parameter::RefractiveIndex => &mut self.refractive_index,
            Parameter::DofRadius => &mut self.dof_radius,
            Parameter::DofFocalPlane => &mut self.dof_focal_plane,
        };
        *slot = value;
    }

    /// Clamp every field into its range.
    pub fn clamped(mut self) -> Self {
        for parameter in Parameter::ALL {
            self.set(parameter, self.get(parameter));
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parameter {
    AmbientLightIntensity,
    SphereLightsIntensity,
    MetalRoughness,
    RefractiveIndex,
    DofRadius,
    DofFocalPlane,
}

impl Parameter {
    pub const ALL: [Parameter; 6] = [
        Parameter::AmbientLightIntensity,
        Parameter::SphereLightsIntensity,
        Parameter::MetalRoughness,
        Parameter::RefractiveIndex,
        Parameter::DofRadius,
        Parameter::DofFocalPlane,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Parameter::AmbientLightIntensity => "ambient light intensity",
            Parameter::SphereLightsIntensity => "sphere lights intensity",
            Parameter::MetalRoughness => "metal roughness",
            Parameter::RefractiveIndex => "refractive index",
            Parameter::DofRadius => "dof radius",
            Parameter::DofFocalPlane => "dof focal plane",
        }
    }

    pub fn range(self) -> RangeInclusive<f32> {
        match self {
            Parameter::AmbientLightIntensity => 0.0..=20.0,
            Parameter::SphereLightsIntensity => 0.0..=20.0,
            Parameter::MetalRoughness => 0.0..=1.0,
            Parameter::RefractiveIndex => 0.5..=2.0,
            Parameter::DofRadius => 0.0..=0.2,
            Parameter::DofFocalPlane => 0.0..=20.0,
        }
    }

    /// One nudge moves a hundredth of the range.
    pub fn nudge(self) -> f32 {
        (self.range().end() - self.range().start()) / 100.0
    }
}

/// Overlay that edits shading parameters. Drawing it is up to the implementor.
pub trait UiLayer {
    fn visible(&self) -> bool;
    fn toggle_visible(&mut self);
    /// While true, pointer and key actions belong to the UI.
    fn is_capturing_input(&self) -> bool;
    /// Apply this frame's edits; returns true if any value changed.
    fn apply(&mut self, input: &FrameInput, params: &mut ShadingParams) -> bool;
    /// One line summary for the window title or a text overlay.
    fn status(&self, params: &ShadingParams) -> String;
}

/// Keyboard driven slider panel: Tab / Shift+Tab select, Left / Right nudge.
#[derive(Debug, Clone)]
pub struct ControlPanel {
    visible: bool,
    selected: usize,
    capturing: bool,
}

impl Default for ControlPanel {
    fn default() -> Self {
        Self {
            visible: true,
            selected: 0,
            capturing: false,
        }
    }
}

impl ControlPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected(&self) -> Parameter {
        Parameter::ALL[self.selected]
    }
}

impl UiLayer for ControlPanel {
    fn visible(&self) -> bool {
        self.visible
    }

    fn toggle_visible(&mut self) {
        self.visible = !self.visible;
        self.capturing = false;
    }

    fn is_capturing_input(&self) -> bool {
        self.capturing
    }

    fn apply(&mut self, input: &FrameInput, params: &mut ShadingParams) -> bool {
        // Key repeat never reaches the panel, so only the press itself nudges.
        self.capturing = self.visible
            && input
                .pressed
                .iter()
                .any(|key| matches!(key, VirtualKeyCode::Left | VirtualKeyCode::Right));
        if !self.visible {
            return false;
        }

        let count = Parameter::ALL.len();
        let mut changed = false;
        for key in &input.pressed {
            match key {
                VirtualKeyCode::Tab if input.shift => self.selected = (self.selected + count - 1) % count,
                VirtualKeyCode::Tab => self.selected = (self.selected + 1) % count,
                VirtualKeyCode::Left | VirtualKeyCode::Right => {
                    let parameter = self.selected();
                    let direction = if *key == VirtualKeyCode::Left { -1.0 } else { 1.0 };
                    let before = params.get(parameter);
                    params.set(parameter, before + direction * parameter.nudge());
                    changed |= params.get(parameter) != before;
                }
                _ => {}
            }
        }
        changed
    }

    fn status(&self, params: &ShadingParams) -> String {
        let parameter = self.selected();
        let range = parameter.range();
        format!(
            "{} {:.3} [{}, {}]",
            parameter.label(),
            params.get(parameter),
            range.start(),
            range.end()
        )
    }
}
